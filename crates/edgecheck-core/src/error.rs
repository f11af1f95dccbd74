use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

/// Errors raised by a stream probe before it can produce a verdict.
///
/// These never reach the result tree as errors; the prober folds them into
/// a failed probe result.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unreadable probe output: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors surfaced by a health check or the suite runner.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("unknown check(s): {unknown}. Available checks: {available}")]
    UnknownChecks { unknown: String, available: String },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("check failed: {0}")]
    Execution(String),
}
