//! Progress display using indicatif
//!
//! The CLI shows a spinner while each side is exported; the GUI and tests
//! run with progress disabled.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::info;

/// Progress tracker for export runs
#[derive(Debug, Clone, Copy)]
pub struct ProgressTracker {
    enabled: bool,
}

impl ProgressTracker {
    /// Create a new progress tracker
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Create a spinner for indeterminate operations
    pub fn create_spinner(&self, message: &str) -> Option<ProgressBar> {
        if !self.enabled {
            return None;
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));

        info!("Started spinner for: {}", message);
        Some(pb)
    }

    /// Finish progress with success message
    pub fn finish_progress(pb: Option<ProgressBar>, success_message: &str) {
        if let Some(progress) = pb {
            progress.finish_with_message(success_message.to_string());
            info!("Progress completed: {}", success_message);
        }
    }

    /// Finish progress with error message
    pub fn finish_with_error(pb: Option<ProgressBar>, error_message: &str) {
        if let Some(progress) = pb {
            progress.abandon_with_message(format!("❌ {}", error_message));
        }
    }
}
