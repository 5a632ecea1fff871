use crate::core::registry::ExtensionKind;
use thiserror::Error;

/// Errors raised inside a task process while driving a bound implementation.
///
/// These are the conduit equivalent of the host's generic task failure: they
/// are never retried here, the host runtime decides what happens next.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{kind} {operation} failed: {source}")]
    Failed {
        kind: ExtensionKind,
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("record reader is closed")]
    Closed,

    #[error("{kind} proxy cannot {operation} while {state}")]
    Lifecycle {
        kind: ExtensionKind,
        operation: &'static str,
        state: &'static str,
    },

    #[error("task io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TaskError {
    pub fn failed(kind: ExtensionKind, operation: &'static str, source: anyhow::Error) -> Self {
        TaskError::Failed {
            kind,
            operation,
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum FerrumConduitError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("argument error: {0}")]
    ArgumentError(String),

    #[error("Could not load job setup script ({script:?}): {message:?}")]
    JobConfigurationError {
        script: String,
        message: String,
        #[source]
        source: Box<FerrumConduitError>,
    },

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("host error: {0}")]
    HostError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("xml config error: {0}")]
    XmlError(#[from] serde_xml_rs::Error),

    #[error("setup file error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FerrumConduitError {
    /// Wraps an error raised while evaluating a setup so the runner can print
    /// one readable line instead of whatever the setup produced.
    pub fn job_configuration(script: &str, cause: FerrumConduitError) -> Self {
        FerrumConduitError::JobConfigurationError {
            script: script.to_string(),
            message: cause.to_string(),
            source: Box::new(cause),
        }
    }
}

pub type Result<T> = std::result::Result<T, FerrumConduitError>;
