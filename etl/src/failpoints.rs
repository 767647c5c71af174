use fail::fail_point;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};

/// Fires after rows are written and before the window is marked completed.
pub const RUN_WINDOW_BEFORE_COMPLETE: &str = "run_window.before_complete";

/// Fires after the running state is stored and before events are fetched.
pub const RUN_WINDOW_AFTER_BEGIN: &str = "run_window.after_begin";

/// Returns an error when the named fail point is configured with `return`.
///
/// The optional parameter selects the error kind: `no_retry` (default) or `timed_retry`.
pub fn etl_fail_point(name: &str) -> EtlResult<()> {
    fail_point!(name, |parameter| {
        let error_kind = match parameter.as_deref() {
            Some("timed_retry") => ErrorKind::WithTimedRetry,
            _ => ErrorKind::WithNoRetry,
        };

        bail!(
            error_kind,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
