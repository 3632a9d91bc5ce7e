//! Progress reporting.
//!
//! The pipeline emits [`ProgressState`] snapshots to a caller-supplied
//! [`ConversionProgressCallback`]:
//!
//! 1. once before any page settles: `current = 0`, [`TaskStatus::Starting`];
//! 2. once per settled page (success or failure): `current` = settled count,
//!    [`TaskStatus::Running`];
//! 3. once after the document, heading reconciliation included, is final:
//!    `current = total`, [`TaskStatus::Finished`].
//!
//! `Running` may already report `current == total` while post-processing is
//! still under way, so only `Finished` means the result is ready. A fatal
//! error ends the conversion without a `Finished` event.
//!
//! Callbacks are fire-and-forget; the pipeline does not catch panics raised
//! inside them.
//!
//! # Example
//!
//! ```rust
//! use layout_pdf2md::{ConversionConfig, ProgressState, TaskStatus};
//! use std::sync::Arc;
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(|state: ProgressState| {
//!         if state.task_status == TaskStatus::Finished {
//!             eprintln!("done: {} pages", state.total);
//!         }
//!     }))
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Lifecycle stage of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Starting,
    Running,
    Finished,
}

/// A progress snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    /// Pages settled so far.
    pub current: usize,
    /// Pages selected for conversion.
    pub total: usize,
    pub task_status: TaskStatus,
}

impl ProgressState {
    pub fn starting(total: usize) -> Self {
        Self {
            current: 0,
            total,
            task_status: TaskStatus::Starting,
        }
    }

    pub fn running(current: usize, total: usize) -> Self {
        Self {
            current,
            total,
            task_status: TaskStatus::Running,
        }
    }

    pub fn finished(total: usize) -> Self {
        Self {
            current: total,
            total,
            task_status: TaskStatus::Finished,
        }
    }
}

/// Receives progress snapshots.
///
/// Must be `Send + Sync`: the CLI forwards events to an indicatif bar and
/// library users often forward them to a channel owned by another task.
/// Any `Fn(ProgressState) + Send + Sync` closure implements it.
pub trait ConversionProgressCallback: Send + Sync {
    fn on_progress(&self, state: ProgressState);
}

impl<F> ConversionProgressCallback for F
where
    F: Fn(ProgressState) + Send + Sync,
{
    fn on_progress(&self, state: ProgressState) {
        self(state)
    }
}

/// Type stored in [`crate::config::ConversionConfig::progress_callback`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

/// Forward `state` to the callback when one is configured.
pub(crate) fn emit(cb: Option<&ProgressCallback>, state: ProgressState) {
    if let Some(cb) = cb {
        cb.on_progress(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn closure_callback_receives_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb: ProgressCallback = Arc::new(move |s: ProgressState| sink.lock().unwrap().push(s));

        emit(Some(&cb), ProgressState::starting(3));
        emit(Some(&cb), ProgressState::running(1, 3));
        emit(Some(&cb), ProgressState::finished(3));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].task_status, TaskStatus::Starting);
        assert_eq!(seen[1].current, 1);
        assert_eq!(seen[2], ProgressState { current: 3, total: 3, task_status: TaskStatus::Finished });
    }

    #[test]
    fn missing_callback_is_ignored() {
        emit(None, ProgressState::finished(10));
    }

    #[test]
    fn status_serialises_lowercase() {
        let json = serde_json::to_string(&ProgressState::running(2, 5)).unwrap();
        assert_eq!(json, r#"{"current":2,"total":5,"task_status":"running"}"#);
    }
}
