//! Error taxonomy
//!
//! Every fallible operation in the crate returns [`ReportError`].
//! Callers that do not care about the distinction can bubble it up
//! through `anyhow`; the variants exist so the lifecycle layer can tell
//! a rejected argument apart from broken OS machinery.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    /// Caller-supplied input was rejected: unknown event-class name,
    /// unrecognized signal spec, invalid filename. The stored
    /// configuration is left untouched.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Signal machinery could not be brought up (pipe, watchdog thread,
    /// loop-wake registration). Also logged to stderr at the failure
    /// site with the underlying OS error.
    #[error("initialization failed: {0}")]
    InitializationFailure(String),

    /// `sigaction` itself failed while installing or restoring the
    /// relay handler.
    #[error("signal handler installation failed: {0}")]
    HandlerInstall(String),

    /// The signal trigger class was requested on a platform without
    /// signal support.
    #[error("signal-triggered reports are not supported on this platform")]
    Unsupported,

    /// Report file creation or writing failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_detail() {
        let err = ReportError::InvalidArgument("bogus event".into());
        assert!(err.to_string().contains("bogus event"));
    }

    #[test]
    fn test_io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ReportError = io.into();
        assert!(matches!(err, ReportError::Io(_)));
    }
}
