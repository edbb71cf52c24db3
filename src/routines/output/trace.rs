use anyhow::Result;
use csv::WriterBuilder;
use serde::{Serialize, Serializer};
use std::time::Instant;

use crate::routines::output::OutputFile;

/// A single sample of an optimization run
/// - `iteration`: the iteration index at which the loss was recorded
/// - `time`: wall-clock seconds since the optimizer was created
/// - `loss`: the factorization loss at that point
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct TraceSample {
    iteration: usize,
    time: f64,
    loss: f64,
}

impl TraceSample {
    pub fn iteration(&self) -> usize {
        self.iteration
    }
    pub fn time(&self) -> f64 {
        self.time
    }
    pub fn loss(&self) -> f64 {
        self.loss
    }
}

/// Append-only record of `(iteration, time, loss)` samples for one optimizer run.
///
/// Each optimizer owns its [Trace] and appends to it explicitly once per
/// recorded loss. Timestamps are normalized on read by subtracting the first
/// sample's timestamp, so one-time warm-up costs do not show up in the timings.
/// Serialized traces carry the normalized samples, matching `trace.csv`.
#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    #[serde(skip)]
    start: Instant,
    #[serde(serialize_with = "serialize_normalized")]
    samples: Vec<TraceSample>,
}

fn serialize_normalized<S: Serializer>(
    samples: &[TraceSample],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    normalize(samples).serialize(serializer)
}

fn normalize(samples: &[TraceSample]) -> Vec<TraceSample> {
    let offset = samples.first().map(|s| s.time).unwrap_or(0.0);
    samples
        .iter()
        .map(|s| TraceSample {
            time: s.time - offset,
            ..*s
        })
        .collect()
}

impl Default for Trace {
    fn default() -> Self {
        Self::new()
    }
}

impl Trace {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            samples: Vec::new(),
        }
    }

    /// Append a sample, timestamped now.
    pub fn record(&mut self, iteration: usize, loss: f64) {
        let time = self.start.elapsed().as_secs_f64();
        self.samples.push(TraceSample {
            iteration,
            time,
            loss,
        });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Raw samples, timestamps relative to the creation of the trace.
    pub fn samples(&self) -> &[TraceSample] {
        &self.samples
    }

    pub fn last(&self) -> Option<&TraceSample> {
        self.samples.last()
    }

    /// Samples with the first sample's timestamp subtracted from every timestamp.
    pub fn normalized(&self) -> Vec<TraceSample> {
        normalize(&self.samples)
    }

    /// Ordered loss values.
    pub fn losses(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.loss).collect()
    }

    /// Ordered, first-sample-normalized elapsed times.
    pub fn times(&self) -> Vec<f64> {
        self.normalized().iter().map(|s| s.time).collect()
    }

    /// Writes the normalized trace to `trace.csv` in the given folder
    pub fn write(&self, folder: &str) -> Result<()> {
        tracing::debug!("Writing trace...");
        let outputfile = OutputFile::new(folder, "trace.csv")?;
        let mut writer = WriterBuilder::new()
            .has_headers(true)
            .from_writer(outputfile.file());

        for sample in self.normalized() {
            writer.serialize(sample)?;
        }
        writer.flush()?;
        tracing::debug!("Trace written to {:?}", outputfile.relative_path());
        Ok(())
    }
}
