// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The error taxonomy shared by every component: drivers, writer, engine,
//! queue and executor all classify failures into one of these kinds so the
//! queue can decide retry vs. terminal (spec §7).

use std::fmt;

/// Classification of a failure, independent of where it originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed configuration, path escape, invalid cron, unsupported option.
    InvalidInput,
    /// The driver cannot perform the requested operation at all.
    NotSupported,
    /// Missing job / server / source.
    NotFound,
    /// Job or server is disabled.
    Disabled,
    /// Network/timeout/5xx from the data server, or a transient filesystem error.
    Transient,
    /// Context cancellation or an explicit queue cancel.
    Cancelled,
}

impl ErrorKind {
    /// Whether the queue should schedule a retry for this kind (spec §4.6/§7).
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }

    pub fn is_permanent(self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidInput | ErrorKind::NotSupported | ErrorKind::NotFound | ErrorKind::Disabled
        )
    }

    pub fn is_cancelled(self) -> bool {
        matches!(self, ErrorKind::Cancelled)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::NotSupported => "not_supported",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Disabled => "disabled",
            ErrorKind::Transient => "transient",
            ErrorKind::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// An error carrying its classification, as produced by drivers, the
/// writer, the engine, and the executor. The queue only ever looks at
/// `kind` to decide retry vs. terminal.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {source}")]
pub struct TaskError {
    pub kind: ErrorKind,
    #[source]
    pub source: anyhow::Error,
}

impl TaskError {
    pub fn new(kind: ErrorKind, source: impl Into<anyhow::Error>) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }

    pub fn invalid_input(msg: impl fmt::Display) -> Self {
        Self::new(ErrorKind::InvalidInput, anyhow::anyhow!("{msg}"))
    }

    pub fn not_supported(msg: impl fmt::Display) -> Self {
        Self::new(ErrorKind::NotSupported, anyhow::anyhow!("{msg}"))
    }

    pub fn not_found(msg: impl fmt::Display) -> Self {
        Self::new(ErrorKind::NotFound, anyhow::anyhow!("{msg}"))
    }

    pub fn disabled(msg: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Disabled, anyhow::anyhow!("{msg}"))
    }

    pub fn transient(msg: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Transient, anyhow::anyhow!("{msg}"))
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, anyhow::anyhow!("operation cancelled"))
    }
}

impl From<std::io::Error> for TaskError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::InvalidInput | std::io::ErrorKind::InvalidData => {
                ErrorKind::InvalidInput
            }
            std::io::ErrorKind::PermissionDenied => ErrorKind::Disabled,
            _ => ErrorKind::Transient,
        };
        Self::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(ErrorKind::Transient.is_retryable());
        assert!(!ErrorKind::InvalidInput.is_retryable());
        assert!(!ErrorKind::Cancelled.is_retryable());
    }

    #[test]
    fn permanent_kinds_cover_config_and_lookup_failures() {
        for kind in [
            ErrorKind::InvalidInput,
            ErrorKind::NotSupported,
            ErrorKind::NotFound,
            ErrorKind::Disabled,
        ] {
            assert!(kind.is_permanent(), "{kind} should be permanent");
        }
        assert!(!ErrorKind::Transient.is_permanent());
        assert!(!ErrorKind::Cancelled.is_permanent());
    }

    #[test]
    fn io_not_found_maps_to_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: TaskError = io_err.into();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn io_other_maps_to_transient_default() {
        let io_err = std::io::Error::other("boom");
        let err: TaskError = io_err.into();
        assert_eq!(err.kind, ErrorKind::Transient);
    }
}
