//! Crate-wide error type for the geometry, selection and compositing layers.

/// Errors raised by stencil, region, outline and masked-buffer operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// An enum-like code or argument combination that is not supported.
    InvalidArgument(String),
    /// The object was released and can no longer be used.
    AlreadyReleased(&'static str),
    /// An index or coordinate fell outside its valid range.
    OutOfRange {
        param: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
    /// The operation is not valid in the object's current state.
    InvalidOperation(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn out_of_range(param: &'static str, value: i64, min: i64, max: i64) -> Self {
        Error::OutOfRange { param, value, min, max }
    }

    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidArgument(e) => write!(f, "Invalid argument: {}", e),
            Error::AlreadyReleased(what) => write!(f, "{} has already been released", what),
            Error::OutOfRange { param, value, min, max } => write!(
                f,
                "'{}' out of range: {} (valid range {}..={})",
                param, value, min, max
            ),
            Error::InvalidOperation(e) => write!(f, "Invalid operation: {}", e),
        }
    }
}

impl std::error::Error for Error {}
