use crate::algorithms::Algorithm;
use crate::routines::output::OutputFile;
use anyhow::{bail, Result};
use config::Config as eConfig;
use serde::Deserialize;
use serde_derive::Serialize;

/// Contains all settings for mfcore
#[derive(Debug, Deserialize, Clone, Serialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Settings {
    /// General configuration settings
    pub config: Config,
    /// The workload matrix to factorize
    pub workload: WorkloadSettings,
    /// How the initial vector is generated
    pub initialization: Initialization,
    /// Hyperparameters for projected gradient descent
    pub gradient_descent: GradientDescentConfig,
    /// Hyperparameters for the vector fixed-point iteration
    pub fixed_point: FixedPointConfig,
    /// Hyperparameters for the Newton-direction method
    pub newton: NewtonConfig,
    /// Backtracking line search shared by the descent methods
    pub line_search: LineSearch,
    /// Numerical policy for matrix operations
    pub numerics: Numerics,
    /// Configuration for logging
    pub log: Log,
    /// Configuration for the output files
    pub output: Output,
}

impl Settings {
    pub fn new() -> Self {
        Settings::default()
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        self.workload.validate()?;
        self.initialization.validate()?;
        self.gradient_descent.validate()?;
        self.fixed_point.validate()?;
        self.newton.validate()?;
        self.line_search.validate()?;
        self.numerics.validate()?;
        Ok(())
    }
}

/// General configuration settings
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Denotes the optimizer to use
    pub algorithm: Algorithm,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            algorithm: Algorithm::FixedPoint,
        }
    }
}

/// The kind of workload matrix to factorize
#[derive(Debug, Deserialize, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadKind {
    /// Lower-triangular all-ones matrix
    PrefixSum,
    /// Identity matrix
    Identity,
    /// Dense matrix read from a headerless CSV file
    File,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct WorkloadSettings {
    pub kind: WorkloadKind,
    /// Size `n` of generated workloads
    pub size: usize,
    /// Path to the CSV file, required when `kind = "file"`
    pub path: Option<String>,
}

impl Default for WorkloadSettings {
    fn default() -> Self {
        WorkloadSettings {
            kind: WorkloadKind::PrefixSum,
            size: 16,
            path: None,
        }
    }
}

impl WorkloadSettings {
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            WorkloadKind::File if self.path.is_none() => {
                bail!("A workload of kind `file` requires a `path`")
            }
            WorkloadKind::PrefixSum | WorkloadKind::Identity if self.size == 0 => {
                bail!("Workload size must be at least 1")
            }
            _ => Ok(()),
        }
    }
}

/// Strategy for the initial (strictly positive) vector
#[derive(Debug, Deserialize, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InitialVector {
    /// The all-ones vector
    Ones,
    /// A scrambled Sobol sample within `[lower, upper]`
    Sobol,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Initialization {
    pub method: InitialVector,
    /// The seed for the Sobol sequence
    pub seed: usize,
    /// Lower bound of sampled entries, must be positive
    pub lower: f64,
    /// Upper bound of sampled entries
    pub upper: f64,
}

impl Default for Initialization {
    fn default() -> Self {
        Initialization {
            method: InitialVector::Ones,
            seed: 22,
            lower: 0.5,
            upper: 1.5,
        }
    }
}

impl Initialization {
    pub fn validate(&self) -> Result<()> {
        if !(self.lower > 0.0) {
            bail!(
                "Lower bound of the initial vector ({}) must be positive",
                self.lower
            );
        }
        if self.lower > self.upper {
            bail!(
                "Lower bound ({}) is greater than upper bound ({})",
                self.lower,
                self.upper
            );
        }
        Ok(())
    }
}

/// Hyperparameters for projected gradient descent
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct GradientDescentConfig {
    /// Number of iterations; there is no convergence test
    pub iterations: usize,
    /// Initial step size of every backtracking search
    pub step_size: f64,
    /// Use Armijo backtracking. If false, a fixed step is taken without checks
    pub armijo: bool,
}

impl Default for GradientDescentConfig {
    fn default() -> Self {
        GradientDescentConfig {
            iterations: 100,
            step_size: 1.0,
            armijo: true,
        }
    }
}

impl GradientDescentConfig {
    pub fn validate(&self) -> Result<()> {
        validate_step_size(self.step_size)
    }
}

/// Hyperparameters for the vector fixed-point iteration
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct FixedPointConfig {
    /// Stop once the relative change of the vector is below this value
    pub tolerance: f64,
    /// Optional iteration budget. If `None`, only the tolerance stops the iteration
    pub max_iterations: Option<usize>,
    /// Record the loss at every iteration. Disable for speed
    pub record_loss: bool,
}

impl Default for FixedPointConfig {
    fn default() -> Self {
        FixedPointConfig {
            tolerance: 1e-8,
            max_iterations: Some(10_000),
            record_loss: true,
        }
    }
}

impl FixedPointConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance > 0.0) {
            bail!("Fixed-point tolerance ({}) must be positive", self.tolerance);
        }
        Ok(())
    }
}

/// Hyperparameters for the Newton-direction method
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct NewtonConfig {
    /// Number of outer iterations
    pub iterations: usize,
    /// Initial step size of every backtracking search
    pub step_size: f64,
    /// Number of conjugate-gradient steps per Newton direction
    pub inner_iterations: usize,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        NewtonConfig {
            iterations: 50,
            step_size: 1.0,
            inner_iterations: 5,
        }
    }
}

impl NewtonConfig {
    pub fn validate(&self) -> Result<()> {
        if self.inner_iterations == 0 {
            bail!("Newton method requires at least one inner iteration");
        }
        validate_step_size(self.step_size)
    }
}

/// Armijo backtracking parameters
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct LineSearch {
    /// Factor applied to the step after each rejected trial
    pub shrink: f64,
    /// Sufficient-decrease constant
    pub sufficient_decrease: f64,
    /// Smallest step tried before the search is declared stalled
    pub min_step: f64,
    /// Maximum number of trial steps per search
    pub max_trials: usize,
}

impl Default for LineSearch {
    fn default() -> Self {
        LineSearch {
            shrink: 0.1,
            sufficient_decrease: 0.25,
            min_step: 1e-12,
            max_trials: 64,
        }
    }
}

impl LineSearch {
    pub fn validate(&self) -> Result<()> {
        if !(self.shrink > 0.0 && self.shrink < 1.0) {
            bail!("Line search shrink factor ({}) must be in (0, 1)", self.shrink);
        }
        if !(self.sufficient_decrease > 0.0 && self.sufficient_decrease < 1.0) {
            bail!(
                "Sufficient-decrease constant ({}) must be in (0, 1)",
                self.sufficient_decrease
            );
        }
        if !(self.min_step > 0.0) {
            bail!("Minimum step ({}) must be positive", self.min_step);
        }
        if self.max_trials == 0 {
            bail!("Line search requires at least one trial step");
        }
        Ok(())
    }
}

/// Numerical policy for matrix operations
///
/// All arithmetic is carried out in `f64`. The eigenvalue floor is applied by
/// every matrix square root.
#[derive(Debug, Deserialize, Clone, Serialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Numerics {
    pub eigen_floor: f64,
}

impl Numerics {
    pub fn validate(&self) -> Result<()> {
        if !(self.eigen_floor >= 0.0) {
            bail!("Eigenvalue floor ({}) must be non-negative", self.eigen_floor);
        }
        Ok(())
    }
}

/// Defines the logging configuration
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Log {
    /// The maximum log level to display
    ///
    /// The log level is defined as a string, and can be one of the following:
    /// - `trace`
    /// - `debug`
    /// - `info`
    /// - `warn`
    /// - `error`
    pub level: String,
    /// The file to write the log to, inside the output folder
    pub file: String,
    /// Whether to write logs
    ///
    /// If set to `false`, a global subscriber will not be set by mfcore.
    pub write: bool,
}

impl Default for Log {
    fn default() -> Self {
        Log {
            level: String::from("info"),
            file: String::from("log.txt"),
            write: true,
        }
    }
}

/// Configuration for the output files
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Output {
    /// Whether to write the output files
    pub write: bool,
    /// The (relative) path to write the output files to
    pub path: String,
}

impl Default for Output {
    fn default() -> Self {
        Output {
            write: true,
            path: String::from("outputs/"),
        }
    }
}

impl Output {
    /// Parses the output folder location
    ///
    /// If a `#` symbol is found, it is replaced by the first number for which the folder does not exist yet.
    pub fn parse_output_folder(&mut self) -> Result<()> {
        if self.path.is_empty() {
            self.path = Output::default().path;
        }

        match self.path.matches('#').count() {
            0 => Ok(()),
            1 => {
                let mut num = 1;
                while std::path::Path::new(&self.path.replace('#', &num.to_string())).exists() {
                    num += 1;
                }
                self.path = self.path.replace('#', &num.to_string());
                Ok(())
            }
            _ => bail!("Only one `#` symbol is allowed in the output path"),
        }
    }
}

fn validate_step_size(step_size: f64) -> Result<()> {
    if !(step_size.is_finite() && step_size > 0.0) {
        bail!("Step size ({}) must be positive and finite", step_size);
    }
    Ok(())
}

/// Parses the settings from a TOML configuration file
///
/// The settings are validated, and a copy is written to the output folder if output is enabled.
///
/// Entries in the TOML file may be overridden by environment variables prefixed with `MFCORE_`.
/// Nested entries are separated by a double underscore, e.g. `MFCORE_NEWTON__INNER_ITERATIONS=10`.
pub fn read(path: impl Into<String>) -> Result<Settings> {
    let settings_path = path.into();

    let parsed = eConfig::builder()
        .add_source(config::File::with_name(&settings_path).format(config::FileFormat::Toml))
        .add_source(
            config::Environment::with_prefix("MFCORE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let mut settings: Settings = parsed.try_deserialize()?;
    settings.validate()?;
    settings.output.parse_output_folder()?;

    if settings.output.write {
        if let Err(error) = write_settings_to_file(&settings) {
            bail!("Could not write settings to file: {}", error);
        }
    }

    Ok(settings)
}

/// Writes a copy of the parsed settings to `settings.json` in the output folder
pub fn write_settings_to_file(settings: &Settings) -> Result<()> {
    let serialized = serde_json::to_string_pretty(settings)?;

    let outputfile = OutputFile::new(settings.output.path.as_str(), "settings.json")?;
    let mut file = outputfile.file_owned();
    std::io::Write::write_all(&mut file, serialized.as_bytes())?;
    Ok(())
}
