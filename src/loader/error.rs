use thiserror::Error;

/// Errors produced by the loading pipeline.
///
/// Every variant carries the module key and a rendered reason so the error
/// can be cloned into every waiter of a shared phase future and re-raised
/// verbatim from a sticky link failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoaderError {
    #[error("Failed to resolve module {name}: {reason}")]
    Resolve { name: String, reason: String },

    #[error("Failed to fetch module {key}: {reason}")]
    Fetch { key: String, reason: String },

    #[error("Failed to instantiate module {key}: {reason}")]
    Instantiate { key: String, reason: String },

    #[error("Dependency {dependency} of module {key} could not be satisfied: {cause}")]
    Satisfy {
        key: String,
        dependency: String,
        #[source]
        cause: Box<LoaderError>,
    },

    #[error("Failed to link module {key}: {reason}")]
    Link { key: String, reason: String },

    #[error("Evaluation of module {key} failed: {reason}")]
    Evaluate { key: String, reason: String },

    #[error("Invalid loader usage on module {key}: {reason}")]
    Usage { key: String, reason: String },
}

impl LoaderError {
    /// Module key (or requested name, for resolution failures) the error is about.
    pub fn key(&self) -> &str {
        match self {
            LoaderError::Resolve { name, .. } => name,
            LoaderError::Fetch { key, .. }
            | LoaderError::Instantiate { key, .. }
            | LoaderError::Satisfy { key, .. }
            | LoaderError::Link { key, .. }
            | LoaderError::Evaluate { key, .. }
            | LoaderError::Usage { key, .. } => key,
        }
    }

    /// Only fetch failures are retried by a later request.
    pub fn is_retryable(&self) -> bool {
        match self {
            LoaderError::Fetch { .. } => true,
            LoaderError::Satisfy { cause, .. } => cause.is_retryable(),
            _ => false,
        }
    }

    /// The failure that started a chain of satisfy errors.
    pub fn root_cause(&self) -> &LoaderError {
        match self {
            LoaderError::Satisfy { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Wraps a dependency failure once; errors already carrying dependency
    /// context pass through, so the error names the importer closest to the
    /// failure.
    pub(crate) fn satisfy(
        key: impl ToString,
        dependency: impl ToString,
        cause: LoaderError,
    ) -> Self {
        match cause {
            LoaderError::Satisfy { .. } => cause,
            cause => LoaderError::Satisfy {
                key: key.to_string(),
                dependency: dependency.to_string(),
                cause: Box::new(cause),
            },
        }
    }

    pub(crate) fn fetch(key: impl ToString, err: &anyhow::Error) -> Self {
        LoaderError::Fetch {
            key: key.to_string(),
            reason: format!("{err:#}"),
        }
    }

    pub(crate) fn instantiate(key: impl ToString, err: &anyhow::Error) -> Self {
        LoaderError::Instantiate {
            key: key.to_string(),
            reason: format!("{err:#}"),
        }
    }

    pub(crate) fn link(key: impl ToString, err: &anyhow::Error) -> Self {
        LoaderError::Link {
            key: key.to_string(),
            reason: format!("{err:#}"),
        }
    }

    pub(crate) fn evaluate(key: impl ToString, err: &anyhow::Error) -> Self {
        LoaderError::Evaluate {
            key: key.to_string(),
            reason: format!("{err:#}"),
        }
    }

    pub(crate) fn usage(key: impl ToString, reason: impl Into<String>) -> Self {
        LoaderError::Usage {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LoaderError>;
