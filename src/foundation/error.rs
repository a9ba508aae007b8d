use crate::render::backend::{FailureKind, RenderFailure};

/// Convenience result type used across vidstamp.
pub type VidstampResult<T> = Result<T, VidstampError>;

/// Top-level error taxonomy.
///
/// Only [`VidstampError::Template`] and [`VidstampError::Config`] abort a batch; every other
/// variant is captured into the failing item's report entry.
#[derive(thiserror::Error, Debug)]
pub enum VidstampError {
    /// Malformed template or unsupported layer kind.
    #[error("template error: {0}")]
    Template(String),

    /// A placeholder referenced by the template has no field in the record.
    #[error("binding error: record has no field '{missing_key}'")]
    Binding {
        /// The placeholder key that could not be resolved.
        missing_key: String,
    },

    /// A bound value is out of its declared range (e.g. a non-positive duration).
    #[error("validation error: {0}")]
    Validation(String),

    /// An asset could not be loaded into the asset cache.
    #[error("asset load error: '{source_ref}': {message}")]
    CacheLoad {
        /// Source path or URI of the asset.
        source_ref: String,
        /// Human-readable failure detail.
        message: String,
        /// Whether retrying the load may succeed.
        transient: bool,
    },

    /// The external rendering capability reported a failure.
    #[error("render failure: {0}")]
    Render(RenderFailure),

    /// Invalid batch configuration.
    #[error("config error: {0}")]
    Config(String),

    /// The batch was cancelled before the item was dispatched.
    #[error("cancelled")]
    Cancelled,

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VidstampError {
    /// Build a [`VidstampError::Template`] value.
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    /// Build a [`VidstampError::Binding`] value.
    pub fn binding(missing_key: impl Into<String>) -> Self {
        Self::Binding {
            missing_key: missing_key.into(),
        }
    }

    /// Build a [`VidstampError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`VidstampError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`VidstampError::CacheLoad`] value.
    pub fn cache_load(source_ref: impl Into<String>, message: impl Into<String>, transient: bool) -> Self {
        Self::CacheLoad {
            source_ref: source_ref.into(),
            message: message.into(),
            transient,
        }
    }

    /// Whether retrying the failed operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::CacheLoad { transient, .. } => *transient,
            Self::Render(f) => f.kind == FailureKind::Transient,
            _ => false,
        }
    }
}

impl From<RenderFailure> for VidstampError {
    fn from(value: RenderFailure) -> Self {
        Self::Render(value)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
