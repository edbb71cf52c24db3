use crate::algorithms::{dispatch_algorithm, Algorithm};
use crate::routines::initialization::initial_vector;
use crate::routines::logger;
use crate::routines::output::FactorizationResult;
use crate::routines::settings::{Settings, WorkloadKind, WorkloadSettings};
use crate::structs::workload::Workload;

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::time::Instant;

/// Builds the workload matrix described by the settings
pub fn load_workload(settings: &WorkloadSettings) -> Result<Workload> {
    match settings.kind {
        WorkloadKind::PrefixSum => Workload::prefix_sum(settings.size),
        WorkloadKind::Identity => Workload::identity(settings.size),
        WorkloadKind::File => {
            let path = settings
                .path
                .as_ref()
                .context("A workload of kind `file` requires a `path`")?;
            Workload::from_csv(path)
        }
    }
}

/// Primary entrypoint for mfcore
///
/// Sets up logging, builds the workload, runs the optimizer selected in
/// `settings.config.algorithm` and writes the output files if enabled.
pub fn fit(settings: Settings) -> Result<FactorizationResult> {
    let now = Instant::now();
    logger::setup_log(&settings)?;
    tracing::info!("Starting mfcore");

    let workload = load_workload(&settings.workload)?;
    tracing::info!(
        "Workload has {} queries over {} entries",
        workload.matrix().nrows(),
        workload.dim()
    );

    match settings.output.write {
        true => tracing::info!("Output files will be written to {}", settings.output.path),
        false => tracing::info!(
            "Output files will not be written - set `write = true` in the [output] section to enable output files"
        ),
    }

    let result = fit_internal(&settings, &workload)?;

    if settings.output.write {
        result.write_outputs(&settings.output.path)?;
    }

    tracing::info!("Factorization took {:.2?}", now.elapsed());
    Ok(result)
}

/// Runs the configured optimizer without logging setup or output files
pub fn fit_internal(settings: &Settings, workload: &Workload) -> Result<FactorizationResult> {
    settings.validate()?;
    run(settings.config.algorithm, settings, workload)
}

/// Runs every optimizer on the same workload and initial vector, in parallel
///
/// Results are returned in the order of [Algorithm::all]. When output is
/// enabled, each optimizer writes to its own subfolder of the output path.
pub fn compare(settings: Settings) -> Result<Vec<FactorizationResult>> {
    let now = Instant::now();
    logger::setup_log(&settings)?;
    tracing::info!("Comparing all optimizers");

    let workload = load_workload(&settings.workload)?;
    let results = compare_internal(&settings, &workload)?;

    if settings.output.write {
        for result in &results {
            let folder = format!(
                "{}/{}",
                settings.output.path.trim_end_matches('/'),
                result.algorithm().as_str()
            );
            result.write_outputs(&folder)?;
        }
    }

    for result in &results {
        tracing::info!(
            "{:>16}: loss {:.6} after {} iterations",
            result.algorithm().to_string(),
            result.loss(),
            result.iterations()
        );
    }
    tracing::info!("Comparison took {:.2?}", now.elapsed());
    Ok(results)
}

/// Runs every optimizer on a shared workload without logging setup or output files
pub fn compare_internal(settings: &Settings, workload: &Workload) -> Result<Vec<FactorizationResult>> {
    settings.validate()?;
    Algorithm::all()
        .to_vec()
        .into_par_iter()
        .map(|algorithm| run(algorithm, settings, workload))
        .collect()
}

fn run(algorithm: Algorithm, settings: &Settings, workload: &Workload) -> Result<FactorizationResult> {
    let v0 = initial_vector(workload.dim(), &settings.initialization)?;
    let mut optimizer = dispatch_algorithm(algorithm, settings, workload, &v0)?;
    let result = optimizer
        .fit()
        .with_context(|| format!("The {} optimizer failed", algorithm))?;
    Ok(result)
}
