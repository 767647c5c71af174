use crate::error::{ErrorKind, EtlError};

/// Retry behavior for a failed window execution.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RetryDirective {
    /// The window can be re-run after the configured delay.
    Timed,
    /// Re-running the window cannot help.
    NoRetry,
}

/// How a failed window execution should be handled by the orchestration layer.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ErrorHandlingPolicy {
    retry_directive: RetryDirective,
    solution: Option<&'static str>,
}

impl ErrorHandlingPolicy {
    const fn new(retry_directive: RetryDirective, solution: Option<&'static str>) -> Self {
        Self {
            retry_directive,
            solution,
        }
    }

    pub fn retry_directive(&self) -> RetryDirective {
        self.retry_directive
    }

    /// Returns an optional operator-facing solution message.
    pub fn solution(&self) -> Option<&'static str> {
        self.solution
    }
}

/// Builds the [`ErrorHandlingPolicy`] for an error returned by a window execution.
///
/// Failures that leave the window `RUNNING` with no rows written are retriable. An aggregate
/// refresh failure is not: its window is already completed, so a re-run would be a no-op.
pub fn build_error_handling_policy(error: &EtlError) -> ErrorHandlingPolicy {
    match error.kind() {
        ErrorKind::SourceQueryFailed
        | ErrorKind::StateLookupFailed
        | ErrorKind::DestinationWriteFailed
        | ErrorKind::DestinationQueryFailed
        | ErrorKind::DestinationConnectionFailed
        | ErrorKind::StateStoreFailed
        | ErrorKind::WindowTimeout
        | ErrorKind::IoError => ErrorHandlingPolicy::new(RetryDirective::Timed, None),

        ErrorKind::AggregateRefreshFailed => ErrorHandlingPolicy::new(
            RetryDirective::NoRetry,
            Some("Rows are durable and the window is completed. Re-run the aggregate refresh manually."),
        ),
        ErrorKind::ConfigError => ErrorHandlingPolicy::new(
            RetryDirective::NoRetry,
            Some("Fix the collapser configuration and restart."),
        ),
        ErrorKind::InvalidState => ErrorHandlingPolicy::new(
            RetryDirective::NoRetry,
            Some("Inspect the processing state table for the window fingerprint."),
        ),

        #[cfg(feature = "failpoints")]
        ErrorKind::WithNoRetry => {
            ErrorHandlingPolicy::new(RetryDirective::NoRetry, Some("Cannot retry this error."))
        }
        #[cfg(feature = "failpoints")]
        ErrorKind::WithTimedRetry => ErrorHandlingPolicy::new(
            RetryDirective::Timed,
            Some("Will automatically retry after the configured delay."),
        ),

        _ => ErrorHandlingPolicy::new(
            RetryDirective::NoRetry,
            Some("There is no single prescribed solution for this error. Inspect the logs of the failed window."),
        ),
    }
}
