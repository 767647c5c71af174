use etl::error::EtlError;
use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

/// Result type for collapser operations.
pub type CollapserResult<T> = Result<T, CollapserError>;

/// Captured backtrace wrapper to avoid thiserror's unstable feature detection.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for the collapser service.
///
/// Wraps [`EtlError`] for window failures and provides variants for the service's own setup.
#[derive(Debug)]
pub enum CollapserError {
    /// Window execution or ClickHouse error.
    Etl(EtlError),
    /// Configuration or telemetry setup error.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    /// I/O error.
    Io(std::io::Error, CapturedBacktrace),
}

impl CollapserError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            CollapserError::Etl(_) => "window error",
            CollapserError::Config(_, _) => "configuration error",
            CollapserError::Io(_, _) => "i/o error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            CollapserError::Etl(err) => err.backtrace(),
            CollapserError::Config(_, cb) => Some(&cb.0),
            CollapserError::Io(_, cb) => Some(&cb.0),
        }
    }

    /// Returns the wrapped [`EtlError`], if any.
    pub fn as_etl_error(&self) -> Option<&EtlError> {
        match self {
            CollapserError::Etl(err) => Some(err),
            _ => None,
        }
    }

    /// Creates a configuration error from any error source.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        CollapserError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a user-oriented report for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("collapser failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {}\n", self));

        if !matches!(self, CollapserError::Etl(err) if err.errors().is_some()) {
            let mut source = Error::source(self);
            let mut idx = 1usize;
            while let Some(err) = source {
                out.push_str(&format!("cause {idx}: {err}\n"));
                source = err.source();
                idx += 1;
            }
        }

        if should_render_backtrace()
            && let Some(backtrace) = self.backtrace()
        {
            out.push_str("backtrace:\n");
            out.push_str(&backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for CollapserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollapserError::Etl(err) => write!(f, "{err}"),
            CollapserError::Config(source, _) => write!(f, "configuration error: {source}"),
            CollapserError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for CollapserError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CollapserError::Etl(err) => err.source(),
            CollapserError::Config(source, _) => Some(source.as_ref()),
            CollapserError::Io(source, _) => Some(source),
        }
    }
}

impl From<std::io::Error> for CollapserError {
    fn from(err: std::io::Error) -> Self {
        CollapserError::Io(err, CapturedBacktrace::capture())
    }
}

impl From<EtlError> for CollapserError {
    fn from(err: EtlError) -> Self {
        CollapserError::Etl(err)
    }
}

#[cfg(test)]
mod tests {
    use etl::error::ErrorKind;
    use etl::etl_error;

    use super::*;

    #[test]
    fn report_names_category_and_error() {
        let err = CollapserError::from(etl_error!(
            ErrorKind::WindowTimeout,
            "Window execution timed out"
        ));

        let report = err.render_report();
        assert!(report.starts_with("collapser failed\n"));
        assert!(report.contains("category: window error\n"));
        assert!(report.contains("Window execution timed out"));
        assert_eq!(err.as_etl_error().map(EtlError::kind), Some(ErrorKind::WindowTimeout));
    }
}
