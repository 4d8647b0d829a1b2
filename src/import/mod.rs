//! CSV import and export of activation and prediction matrices.
//!
//! Activations computed elsewhere (one row per image, one column per
//! feature or class) can be scored without rerunning the classifier.
//! Leading identifier columns such as file names can be skipped.
//!
//! ## Example
//!
//! ```rust,ignore
//! use model_eval::import::MatrixImporter;
//!
//! let logits = MatrixImporter::new()
//!     .has_headers(true)
//!     .skip_columns(1)
//!     .import("logits.csv")?;
//! ```

use std::fmt::Display;
use std::io::Read;
use std::path::Path;

use ndarray::{Array2, ArrayView2};

use crate::error::{Error, Result};

/// Reads a numeric matrix from CSV.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatrixImporter {
    has_headers: bool,
    skip_columns: usize,
}

impl MatrixImporter {
    /// Importer for header-less CSV with only numeric columns.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat the first row as column names.
    #[must_use]
    pub fn has_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }

    /// Ignore this many leading columns in every row.
    #[must_use]
    pub fn skip_columns(mut self, skip_columns: usize) -> Self {
        self.skip_columns = skip_columns;
        self
    }

    /// Import the matrix in the CSV file at `path`.
    pub fn import(&self, path: impl AsRef<Path>) -> Result<Array2<f64>> {
        let file = std::fs::File::open(path)?;
        self.import_reader(file)
    }

    /// Import a matrix from any CSV source.
    ///
    /// Every row must have the same number of values. Errors carry the
    /// 1-based line number of the offending row.
    pub fn import_reader<R: Read>(&self, source: R) -> Result<Array2<f64>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(self.has_headers)
            .flexible(true)
            .from_reader(source);
        let header_lines = usize::from(self.has_headers);

        let mut width = None;
        let mut rows = 0;
        let mut data = Vec::new();

        for (idx, record) in reader.records().enumerate() {
            let line = idx + 1 + header_lines;
            let record = record.map_err(|e| Error::CsvImport {
                line,
                reason: e.to_string(),
            })?;

            let before = data.len();
            for (col, cell) in record.iter().enumerate().skip(self.skip_columns) {
                let cell = cell.trim();
                let value = cell.parse::<f64>().map_err(|_| Error::CsvImport {
                    line,
                    reason: format!("column {}: cannot parse {cell:?} as a number", col + 1),
                })?;
                data.push(value);
            }

            let count = data.len() - before;
            match width {
                None if count == 0 => {
                    return Err(Error::CsvImport {
                        line,
                        reason: "row has no numeric columns".to_string(),
                    });
                }
                None => width = Some(count),
                Some(w) if w != count => {
                    return Err(Error::CsvImport {
                        line,
                        reason: format!("expected {w} values, got {count}"),
                    });
                }
                Some(_) => {}
            }
            rows += 1;
        }

        let Some(width) = width else {
            return Err(Error::CsvImport {
                line: 0,
                reason: "no data rows".to_string(),
            });
        };
        Ok(Array2::from_shape_vec((rows, width), data)?)
    }
}

/// Read a numeric CSV matrix, optionally with a header row.
pub fn read_matrix_csv(path: impl AsRef<Path>, has_headers: bool) -> Result<Array2<f64>> {
    MatrixImporter::new().has_headers(has_headers).import(path)
}

/// Write `matrix` as CSV, one row per line, with optional column names.
pub fn write_matrix_csv<T: Display>(
    path: impl AsRef<Path>,
    matrix: ArrayView2<'_, T>,
    headers: Option<&[String]>,
) -> Result<()> {
    if let Some(headers) = headers
        && headers.len() != matrix.ncols()
    {
        return Err(Error::shape(
            "headers",
            format!("{} column names", matrix.ncols()),
            headers.len(),
        ));
    }

    let mut wtr = csv::Writer::from_path(path)?;
    if let Some(headers) = headers {
        wtr.write_record(headers)?;
    }
    for row in matrix.rows() {
        wtr.write_record(row.iter().map(ToString::to_string))?;
    }
    wtr.flush()?;
    Ok(())
}
