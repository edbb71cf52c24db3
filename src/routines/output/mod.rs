use crate::algorithms::{Algorithm, Status};
use anyhow::{Context, Result};
use csv::WriterBuilder;
use ndarray::{Array1, Array2, Axis};
use ndarray_csv::Array2Writer;
use serde::Serialize;
use std::fs::{create_dir_all, File, OpenOptions};
use std::path::{Path, PathBuf};

pub mod trace;

pub use trace::{Trace, TraceSample};

/// Defines the result of a single optimizer run
///
/// A [FactorizationResult] contains the final candidate matrix, the final
/// vector for the fixed-point method, and the trace of recorded losses.
#[derive(Debug, Clone, Serialize)]
pub struct FactorizationResult {
    algorithm: Algorithm,
    status: Status,
    iterations: usize,
    loss: f64,
    relative_change: Option<f64>,
    x: Array2<f64>,
    v: Option<Array1<f64>>,
    trace: Trace,
}

impl FactorizationResult {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        algorithm: Algorithm,
        status: Status,
        iterations: usize,
        loss: f64,
        relative_change: Option<f64>,
        x: Array2<f64>,
        v: Option<Array1<f64>>,
        trace: Trace,
    ) -> Self {
        Self {
            algorithm,
            status,
            iterations,
            loss,
            relative_change,
            x,
            v,
            trace,
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
    pub fn status(&self) -> &Status {
        &self.status
    }
    pub fn iterations(&self) -> usize {
        self.iterations
    }
    /// Loss of the final candidate matrix
    pub fn loss(&self) -> f64 {
        self.loss
    }
    /// Achieved relative change of the vector, for the fixed-point method
    pub fn relative_change(&self) -> Option<f64> {
        self.relative_change
    }
    /// The final candidate matrix
    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }
    /// The final vector, for the fixed-point method
    pub fn v(&self) -> Option<&Array1<f64>> {
        self.v.as_ref()
    }
    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Writes `trace.csv`, `x.csv`, `v.csv` (if any) and `result.json` to the given folder
    pub fn write_outputs(&self, folder: &str) -> Result<()> {
        tracing::debug!("Writing outputs to {}", folder);
        self.trace.write(folder)?;
        self.write_x(folder)?;
        self.write_v(folder)?;
        self.write_summary(folder)?;
        Ok(())
    }

    fn write_x(&self, folder: &str) -> Result<()> {
        let outputfile = OutputFile::new(folder, "x.csv")?;
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_writer(outputfile.file());
        writer
            .serialize_array2(&self.x)
            .context("Failed to write the final matrix")?;
        writer.flush()?;
        Ok(())
    }

    fn write_v(&self, folder: &str) -> Result<()> {
        let Some(v) = &self.v else {
            return Ok(());
        };
        let column = v.view().insert_axis(Axis(1)).to_owned();
        let outputfile = OutputFile::new(folder, "v.csv")?;
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_writer(outputfile.file());
        writer
            .serialize_array2(&column)
            .context("Failed to write the final vector")?;
        writer.flush()?;
        Ok(())
    }

    fn write_summary(&self, folder: &str) -> Result<()> {
        let outputfile = OutputFile::new(folder, "result.json")?;
        serde_json::to_writer_pretty(outputfile.file(), self)
            .context("Failed to write the result summary")?;
        Ok(())
    }
}

/// Helper for creating an output file, creating parent folders as needed
#[derive(Debug)]
pub struct OutputFile {
    file: File,
    relative_path: PathBuf,
}

impl OutputFile {
    pub fn new(folder: &str, file_name: &str) -> Result<Self> {
        let relative_path = Path::new(&folder).join(file_name);

        if let Some(parent) = relative_path.parent() {
            create_dir_all(parent)
                .with_context(|| format!("Failed to create directories for {:?}", parent))?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&relative_path)
            .with_context(|| format!("Failed to open file: {:?}", relative_path))?;

        Ok(OutputFile {
            file,
            relative_path,
        })
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn file_owned(self) -> File {
        self.file
    }

    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }
}
