use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use numpy::{PyArray1, PyReadonlyArray2, ToPyArray};

use fastbdt::{
    Classifier, ClassifierParams, ClassifierParamsBuilder, FastBdtError, FitResult, FittedModel,
    ModelFormat,
};
use ndarray::Array1;

fn to_py_err(e: FastBdtError) -> PyErr {
    match e {
        FastBdtError::Io(e) => PyIOError::new_err(e.to_string()),
        e => PyValueError::new_err(e.to_string()),
    }
}

#[derive(Debug)]
#[pyclass(name = "Classifier")]
pub struct ClassifierPy {
    params: ClassifierParams,
    model: Option<Classifier>,
}

impl ClassifierPy {
    fn fitted(&self) -> PyResult<&Classifier> {
        self.model
            .as_ref()
            .ok_or_else(|| PyRuntimeError::new_err("classifier is not fitted"))
    }
}

#[derive(Debug)]
#[pyclass(name = "FitResult")]
pub struct FitResultPy(FitResult);

#[pymethods]
impl ClassifierPy {
    #[new]
    #[allow(non_snake_case, clippy::too_many_arguments)]
    #[pyo3(signature = (
        binning = Vec::new(),
        nTrees = 100,
        depth = 3,
        shrinkage = 0.1,
        subsample = 0.5,
        transform2probability = true,
        purityTransformation = Vec::new(),
        sPlot = false,
        flatnessLoss = -1.0,
        numberOfFlatnessFeatures = 0,
        seed = 42,
    ))]
    pub fn new(
        binning: Vec<u32>,
        nTrees: usize,
        depth: usize,
        shrinkage: f64,
        subsample: f64,
        transform2probability: bool,
        purityTransformation: Vec<bool>,
        sPlot: bool,
        flatnessLoss: f64,
        numberOfFlatnessFeatures: usize,
        seed: u64,
    ) -> Self {
        let params = ClassifierParamsBuilder::new()
            .binning(binning)
            .n_trees(nTrees)
            .depth(depth)
            .shrinkage(shrinkage)
            .subsample(subsample)
            .transform_to_probability(transform2probability)
            .purity_transformation(purityTransformation)
            .s_plot(sPlot)
            .flatness_loss(flatnessLoss)
            .n_flatness_features(numberOfFlatnessFeatures)
            .seed(seed)
            .build();
        Self {
            params,
            model: None,
        }
    }

    #[pyo3(signature = (x, y, w = None))]
    pub fn fit<'py>(
        &mut self,
        x: PyReadonlyArray2<'py, f64>,
        y: Vec<bool>,
        w: Option<Vec<f64>>,
    ) -> PyResult<FitResultPy> {
        let y = Array1::from(y);
        let w = w.map(Array1::from);
        let (fit_result, model) =
            Classifier::fit(x.as_array(), y.view(), w.as_ref().map(|w| w.view()), &self.params)
                .map_err(to_py_err)?;
        self.model = Some(model);
        Ok(FitResultPy(fit_result))
    }

    pub fn predict<'py>(
        &self,
        py: Python<'py>,
        x: PyReadonlyArray2<'py, f64>,
    ) -> PyResult<Bound<'py, PyArray1<f64>>> {
        let y_hat = self.fitted()?.predict_batch(x.as_array()).map_err(to_py_err)?;
        Ok(y_hat.to_pyarray(py))
    }

    #[pyo3(signature = (path, json = false))]
    pub fn save(&self, path: &str, json: bool) -> PyResult<()> {
        let format = if json { ModelFormat::Json } else { ModelFormat::Binary };
        self.fitted()?.save(path, format).map_err(to_py_err)
    }

    pub fn load(&mut self, path: &str) -> PyResult<()> {
        let model = Classifier::load(path).map_err(to_py_err)?;
        self.params = model.params().clone();
        self.model = Some(model);
        Ok(())
    }

    fn __repr__(&self) -> String {
        match &self.model {
            Some(model) => model.to_string(),
            None => format!("Classifier(unfitted, {:?})", self.params),
        }
    }
}

#[pymethods]
impl FitResultPy {
    pub fn get_error(&self) -> f64 {
        self.0.err
    }

    pub fn get_residuals<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray1<f64>>> {
        Ok(self.0.residuals.to_pyarray(py))
    }

    pub fn get_y_hat<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray1<f64>>> {
        Ok(self.0.y_hat.to_pyarray(py))
    }

    fn __repr__(&self) -> String {
        format!(
            "FitResult(err={}, residuals={}, y_hat={})",
            self.0.err, self.0.residuals, self.0.y_hat
        )
    }
}

#[pymodule]
fn fastbdt_py(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ClassifierPy>()?;
    m.add_class::<FitResultPy>()?;
    Ok(())
}
