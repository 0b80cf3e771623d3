//! Canonical task and step statuses with alias-tolerant normalization.
//!
//! Historical producers wrote a handful of spellings for the same state
//! (`complete`, `in_progress`, `canceled`, `error`, `queued`). Deserialization
//! accepts all of them and maps onto the canonical set; serialization always
//! emits the canonical spelling, so normalization is idempotent.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Top-level lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Source uploaded, state materialized, not yet queued.
    Uploaded,
    /// Waiting in the task queue.
    Queued,
    /// Claimed by a worker and running.
    Processing,
    /// Every non-skipped step finished.
    Completed,
    /// At least one step failed.
    Failed,
    /// Cancelled by the user.
    Cancelled,
}

impl TaskStatus {
    /// Canonical wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Map a raw status string (any known alias) onto the canonical set.
    ///
    /// Unknown or empty values fall back to [`TaskStatus::Queued`].
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "uploaded" => Self::Uploaded,
            "processing" | "in_progress" | "running" => Self::Processing,
            "completed" | "complete" => Self::Completed,
            "failed" | "error" => Self::Failed,
            "cancelled" | "canceled" => Self::Cancelled,
            _ => Self::Queued,
        }
    }

    /// Whether the status is terminal; terminal statuses never transition back.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl Serialize for TaskStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::normalize(&raw))
    }
}

/// Status of an individual pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StepStatus {
    /// Not yet started.
    #[default]
    Pending,
    /// Currently executing.
    Processing,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Halted by user cancellation.
    Cancelled,
    /// Disabled by the task plan; terminal at creation.
    Skipped,
}

impl StepStatus {
    /// Canonical wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
        }
    }

    /// Map a raw step status string (any known alias) onto the canonical set.
    ///
    /// Unknown or empty values fall back to [`StepStatus::Pending`], matching
    /// the behavior expected of progress consumers.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "processing" | "in_progress" | "running" => Self::Processing,
            "completed" | "complete" => Self::Completed,
            "failed" | "error" => Self::Failed,
            "cancelled" | "canceled" => Self::Cancelled,
            "skipped" => Self::Skipped,
            _ => Self::Pending,
        }
    }

    /// Whether the step can still transition to another status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Skipped
        )
    }
}

impl Serialize for StepStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StepStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        match raw {
            serde_json::Value::String(text) => Ok(Self::normalize(&text)),
            serde_json::Value::Null => Ok(Self::Pending),
            other => Err(de::Error::custom(format!(
                "step status must be a string, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_status_normalization_maps_aliases() {
        let cases = [
            ("complete", StepStatus::Completed),
            ("completed", StepStatus::Completed),
            ("in_progress", StepStatus::Processing),
            ("running", StepStatus::Processing),
            ("canceled", StepStatus::Cancelled),
            ("error", StepStatus::Failed),
            ("queued", StepStatus::Pending),
            ("waiting", StepStatus::Pending),
            ("skipped", StepStatus::Skipped),
            ("", StepStatus::Pending),
            ("  Completed ", StepStatus::Completed),
        ];
        for (raw, expected) in cases {
            assert_eq!(StepStatus::normalize(raw), expected, "raw = {raw:?}");
        }
    }

    #[test]
    fn step_status_normalization_is_idempotent() {
        for raw in ["complete", "in_progress", "canceled", "error", "queued", "bogus"] {
            let once = StepStatus::normalize(raw);
            let twice = StepStatus::normalize(once.as_str());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn task_status_terminality() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Uploaded.is_terminal());
    }

    #[test]
    fn statuses_round_trip_through_serde() {
        for status in [
            StepStatus::Pending,
            StepStatus::Processing,
            StepStatus::Completed,
            StepStatus::Failed,
            StepStatus::Cancelled,
            StepStatus::Skipped,
        ] {
            let json = serde_json::to_string(&status).expect("serialize");
            let back: StepStatus = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(status, back);
        }
        let legacy: StepStatus = serde_json::from_str("\"in_progress\"").expect("alias");
        assert_eq!(legacy, StepStatus::Processing);
    }
}
