use thiserror::Error;

/// Fatal problems with the input catalog. Raised before any computation starts.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("input format error: {0}")]
    InputFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CatalogError {
    pub fn missing_column(rule: &str) -> Self {
        CatalogError::InputFormat(format!("could not find a {rule} column"))
    }
}

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("embedding service error: {0}")]
    Service(String),

    #[error("invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{name} must be within [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f64 },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing artifact {0}; run `casedup find` first")]
    MissingArtifact(String),
}

/// Errors of the library entry points. Embedding failures never appear here:
/// they are kept in [`crate::pipeline::Analysis::semantic`] so exact results
/// survive them.
#[derive(Error, Debug)]
pub enum DedupError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Report(#[from] ReportError),
}

pub type Result<T> = std::result::Result<T, DedupError>;
