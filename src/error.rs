use thiserror::Error;

/// Everything that can go wrong between `load` and the value reaching its
/// waiter. A failing batch fails every key queued into it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError<E> {
    /// `try_load` was called without a key.
    #[error("load() must be called with a key")]
    InvalidKey,

    /// `try_load_many` was called without a sequence of keys.
    #[error("load_many() must be called with a sequence of keys")]
    InvalidArgument,

    /// A key was queued into, or a dispatch was requested for, a batch that
    /// has already been dispatched.
    #[error("batch has already been dispatched")]
    AlreadyDispatched,

    /// The batch function returned something that is neither a sequence of
    /// values nor a key/value mapping.
    #[error("batch function must return a sequence or a mapping of values, got {0}")]
    ShapeMismatch(String),

    /// The batch function returned a sequence of the wrong length.
    #[error("batch function returned {actual} values for {expected} keys")]
    SizeMismatch { expected: usize, actual: usize },

    /// The batch result has no entry for a queued key.
    #[error("batch function did not resolve key {0}")]
    MissingKey(String),

    /// The batch went away before producing a result.
    #[error("batch was dropped before it resolved")]
    Canceled,

    /// The batch function itself failed.
    #[error("batch function failed: {0}")]
    BatchFn(E),
}

/// Raised when converting a batch function output into a [`BatchResult`].
///
/// [`BatchResult`]: crate::BatchResult
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ShapeMismatch(pub String);

impl<E> From<ShapeMismatch> for LoadError<E> {
    fn from(err: ShapeMismatch) -> Self {
        LoadError::ShapeMismatch(err.0)
    }
}
