//! Unified error type for the imagemill service.
//!
//! All modules funnel their failures into [`Error`], which carries enough
//! context for API handlers to derive an HTTP status code via
//! [`Error::http_status`].

/// Unified error type covering all failure modes in imagemill.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The upload itself is unacceptable (missing filename, disallowed
    /// extension, oversized file).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A request parameter is outside its enumerated domain (unknown format
    /// or mode, setting out of range).
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A required external encoder is not installed.
    #[error("Encoder unavailable: {0}")]
    EncoderUnavailable(String),

    /// The external converter exceeded the configured wall-clock timeout.
    #[error("Conversion timed out after {0} seconds")]
    Timeout(u64),

    /// The external converter exited nonzero or produced no output.
    #[error("Conversion failed [{tool}]: {message}")]
    ConversionFailed {
        /// Name of the tool that failed.
        tool: String,
        /// Truncated diagnostic output.
        message: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidInput(_) => 400,
            Error::InvalidParameter(_) => 422,
            Error::EncoderUnavailable(_) => 503,
            Error::Timeout(_) => 504,
            Error::ConversionFailed { .. } => 500,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Convenience constructor for [`Error::ConversionFailed`].
    pub fn conversion_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConversionFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_display() {
        let err = Error::InvalidInput("unsupported file format: .exe".into());
        assert_eq!(
            err.to_string(),
            "Invalid input: unsupported file format: .exe"
        );
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn invalid_parameter_display() {
        let err = Error::InvalidParameter("setting must be 0-100".into());
        assert_eq!(err.http_status(), 422);
    }

    #[test]
    fn encoder_unavailable_display() {
        let err = Error::EncoderUnavailable("heif-enc".into());
        assert_eq!(err.to_string(), "Encoder unavailable: heif-enc");
        assert_eq!(err.http_status(), 503);
    }

    #[test]
    fn timeout_display() {
        let err = Error::Timeout(300);
        assert_eq!(err.to_string(), "Conversion timed out after 300 seconds");
        assert_eq!(err.http_status(), 504);
    }

    #[test]
    fn conversion_failed_display() {
        let err = Error::conversion_failed("magick", "exit code 1");
        assert_eq!(err.to_string(), "Conversion failed [magick]: exit code 1");
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.http_status(), 500);
    }
}
