use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::bail;
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::types::{Window, WindowFingerprint};

/// Lifecycle status of a processing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowStatus {
    Running,
    Completed,
}

impl WindowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowStatus::Running => "RUNNING",
            WindowStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for WindowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WindowStatus {
    type Err = EtlError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "RUNNING" => Ok(WindowStatus::Running),
            "COMPLETED" => Ok(WindowStatus::Completed),
            other => bail!(
                ErrorKind::InvalidState,
                "Unknown window status",
                format!("status `{other}`")
            ),
        }
    }
}

/// Persisted record of one window of one pipeline.
///
/// Created as [`WindowStatus::Running`] before any event is fetched and moved to
/// [`WindowStatus::Completed`] exactly once, together with the number of rows written. A
/// record left running marks a window awaiting retry.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingWindowState {
    pub pipeline_name: String,
    pub window: Window,
    pub fingerprint: WindowFingerprint,
    pub status: WindowStatus,
    pub records_processed: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProcessingWindowState {
    /// Creates the running record of `window`.
    pub fn running(pipeline_name: &str, window: Window, started_at: DateTime<Utc>) -> Self {
        Self {
            pipeline_name: pipeline_name.to_string(),
            window,
            fingerprint: WindowFingerprint::new(pipeline_name, window.end()),
            status: WindowStatus::Running,
            records_processed: 0,
            started_at,
            completed_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == WindowStatus::Completed
    }

    /// Moves the record to completed with the final row count.
    ///
    /// Fails with [`ErrorKind::InvalidState`] when the record is already completed.
    pub fn complete(&mut self, records_processed: u64, completed_at: DateTime<Utc>) -> EtlResult<()> {
        if self.status != WindowStatus::Running {
            bail!(
                ErrorKind::InvalidState,
                "Only a running window can be completed",
                format!("window {} with fingerprint {} is {}", self.window, self.fingerprint, self.status)
            );
        }

        self.status = WindowStatus::Completed;
        self.records_processed = records_processed;
        self.completed_at = Some(completed_at);

        Ok(())
    }
}
