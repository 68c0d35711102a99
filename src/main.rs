use std::process::ExitCode;

use fastbdt::{
    dataset::Dataset, logging, Classifier, ClassifierParamsBuilder, FittedModel, ModelFormat,
};
use ndarray::{ArrayView1, ArrayView2};
use tracing::error;

const WEIGHT_FILE: &str = "unittest.weightfile";
const N_FEATURES: usize = 4;

fn score(model: &Classifier, x: ArrayView2<f64>, y: ArrayView1<bool>) -> fastbdt::Result<f64> {
    let p = model.predict_batch(x)?;
    Ok(y.iter()
        .zip(&p)
        .map(|(&label, &p)| (f64::from(u8::from(label)) - p).powi(2))
        .sum())
}

fn run(input: &str, target_label: i64) -> fastbdt::Result<()> {
    let data = Dataset::from_path(input, N_FEATURES, b',')?;
    let x = data.x();
    let y = data.targets(target_label);

    let params = ClassifierParamsBuilder::new()
        .binning(vec![5; N_FEATURES])
        .n_trees(10)
        .depth(3)
        .shrinkage(0.1)
        .subsample(0.5)
        .s_plot(false)
        .purity_transformation(vec![false; N_FEATURES])
        .n_flatness_features(0)
        .flatness_loss(-1.0)
        .transform_to_probability(true)
        .build();

    let (_, classifier) = Classifier::fit(x, y.view(), Some(data.weights()), &params)?;
    println!("Score {}", score(&classifier, x, y.view())?);

    classifier.save(WEIGHT_FILE, ModelFormat::Binary)?;
    print!("{classifier}");

    let reloaded = Classifier::load(WEIGHT_FILE)?;
    println!("Score {}", score(&reloaded, x, y.view())?);
    print!("{reloaded}");
    Ok(())
}

fn main() -> ExitCode {
    if let Err(e) = logging::init() {
        eprintln!("Failed to initialize logging: {e}");
    }

    let args: Vec<String> = std::env::args().collect();
    let Some(input) = args.get(1) else {
        let program = args.first().map_or("fastbdt", String::as_str);
        eprintln!("Usage: {program} <input_file> [target_label]");
        return ExitCode::FAILURE;
    };
    let target_label = match args.get(2) {
        None => 1,
        Some(arg) => match arg.parse::<i64>() {
            Ok(label) => label,
            Err(_) => {
                eprintln!("Invalid target label: {arg}");
                return ExitCode::FAILURE;
            }
        },
    };

    match run(input, target_label) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
