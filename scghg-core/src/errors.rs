use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a valuation engine.
///
/// These are propagated unchanged through the sweep.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Damage function input not found: {0}")]
    MissingDamageFunction(PathBuf),
    #[error("Malformed damage function formula for sector {sector}: {formula}")]
    MalformedFormula { sector: String, formula: String },
    #[error(
        "Engine cannot compute coefficients for sector {0}; \
         a damage function file is required"
    )]
    CoefficientsUnavailable(String),
    #[error("Engine input could not be read from {path}: {message}")]
    Input { path: PathBuf, message: String },
}

/// Error type for the aggregation pipeline.
#[derive(Error, Debug)]
pub enum ScghgError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Alignment error: {0}")]
    Alignment(String),
    #[error("Domain error: {0}")]
    Domain(String),
    #[error("Valuation engine failed: {0}")]
    Engine(#[from] EngineError),
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON encoding failed for {path}: {source}")]
    Encoding {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("NetCDF error at {path}: {message}")]
    NetCdf { path: PathBuf, message: String },
    #[error(
        "Sweep cell failed (sector={sector}, eta={eta}, rho={rho}, \
         pulse_year={pulse_year}): {source}"
    )]
    Cell {
        sector: String,
        eta: f64,
        rho: f64,
        pulse_year: i64,
        #[source]
        source: Box<ScghgError>,
    },
}

impl ScghgError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ScghgError::Io {
            path: path.into(),
            source,
        }
    }

    /// The innermost error, looking through any cell context.
    pub fn root(&self) -> &ScghgError {
        match self {
            ScghgError::Cell { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Convenience type for `Result<T, ScghgError>`.
pub type ScghgResult<T> = Result<T, ScghgError>;
