//! Delimited text datasets: one row per line, `n_features` numeric columns
//! followed by an integer class label.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Errors raised while reading a dataset file.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed line {line}: expected at least {expected} fields, got {got}")]
    Malformed { line: u64, expected: usize, got: usize },

    #[error("line {line}: cannot parse {token:?}")]
    Parse { line: u64, token: String },
}

#[derive(Debug, Clone)]
pub struct Dataset {
    x: Array2<f64>,
    labels: Vec<i64>,
    weights: Array1<f64>,
}

impl Dataset {
    pub fn from_path<P: AsRef<Path>>(path: P, n_features: usize, delimiter: u8) -> crate::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::from_reader(file, n_features, delimiter)?)
    }

    /// Parses rows until EOF. Empty fields are skipped, extra trailing fields
    /// are ignored and every row weighs 1.0.
    pub fn from_reader<R: Read>(reader: R, n_features: usize, delimiter: u8) -> Result<Self, DatasetError> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .delimiter(delimiter)
            .from_reader(reader);

        let mut values = Vec::new();
        let mut labels = Vec::new();
        for result in rdr.records() {
            let record = result?;
            let line = record.position().map_or(0, |pos| pos.line());
            let tokens: Vec<&str> = record.iter().filter(|token| !token.is_empty()).collect();
            if tokens.len() < n_features + 1 {
                return Err(DatasetError::Malformed {
                    line,
                    expected: n_features + 1,
                    got: tokens.len(),
                });
            }

            for token in &tokens[..n_features] {
                values.push(parse_token::<f64>(token, line)?);
            }
            labels.push(parse_token::<i64>(tokens[n_features], line)?);
        }

        let n_rows = labels.len();
        let x = Array2::from_shape_vec((n_rows, n_features), values)
            .map_err(|_| DatasetError::Malformed {
                line: 0,
                expected: n_features,
                got: 0,
            })?;
        Ok(Self {
            x,
            labels,
            weights: Array1::ones(n_rows),
        })
    }

    pub fn n_rows(&self) -> usize {
        self.labels.len()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    pub fn x(&self) -> ArrayView2<'_, f64> {
        self.x.view()
    }

    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    /// Binary targets: `true` where the class label equals `target_label`.
    pub fn targets(&self, target_label: i64) -> Array1<bool> {
        self.labels.iter().map(|&label| label == target_label).collect()
    }

    pub fn weights(&self) -> ArrayView1<'_, f64> {
        self.weights.view()
    }
}

fn parse_token<T: std::str::FromStr>(token: &str, line: u64) -> Result<T, DatasetError> {
    token.parse().map_err(|_| DatasetError::Parse {
        line,
        token: token.to_string(),
    })
}
