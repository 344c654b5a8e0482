//! User-facing activity log
//!
//! Export runs report what they do as plain lines. Where those lines end
//! up depends on the front end: the terminal for the CLI, a channel that
//! the GUI drains every frame, or a buffer in tests.

use std::fmt;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Destination for activity lines
pub trait ActivitySink: Send + Sync {
    fn post(&self, message: &str);
}

impl ActivitySink for Sender<String> {
    fn post(&self, message: &str) {
        // The receiver is gone once the window closes; nothing left to show
        let _ = self.send(message.to_string());
    }
}

/// Prints activity lines to stdout
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ActivitySink for ConsoleSink {
    fn post(&self, message: &str) {
        println!("{}", message);
    }
}

/// Keeps activity lines in memory
#[derive(Debug, Default)]
pub struct ActivityBuffer {
    lines: Mutex<Vec<String>>,
}

impl ActivityBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

impl ActivitySink for ActivityBuffer {
    fn post(&self, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(message.to_string());
        }
    }
}

/// How much detail a run reports, selected in the dialog as 0 to 3
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Only essential information
    #[default]
    Minimal = 0,
    /// Mapping file contents as they are loaded
    Normal = 1,
    /// Classification of every footprint
    Verbose = 2,
    /// Matching patterns and sort keys
    Debug = 3,
}

impl Verbosity {
    pub const ALL: [Verbosity; 4] = [
        Verbosity::Minimal,
        Verbosity::Normal,
        Verbosity::Verbose,
        Verbosity::Debug,
    ];

    /// Out-of-range levels saturate at `Debug`
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Verbosity::Minimal,
            1 => Verbosity::Normal,
            2 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    }

    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn description(self) -> &'static str {
        match self {
            Verbosity::Minimal => "Minimal logging: Only essential information will be logged.",
            Verbosity::Normal => {
                "Normal logging: Regular activity and important events will be logged."
            }
            Verbosity::Verbose => {
                "Verbose logging: Detailed logging of normal and important events."
            }
            Verbosity::Debug => {
                "Debug logging: All possible details including debugging information will be logged."
            }
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.level())
    }
}

/// Activity log handle passed into a run
#[derive(Clone)]
pub struct ActivityLog {
    sink: Arc<dyn ActivitySink>,
    verbosity: Verbosity,
}

impl ActivityLog {
    pub fn new(sink: Arc<dyn ActivitySink>, verbosity: Verbosity) -> Self {
        Self { sink, verbosity }
    }

    /// A log that only mirrors to tracing
    pub fn silent() -> Self {
        Self::new(Arc::new(NullSink), Verbosity::Minimal)
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn with_verbosity(&self, verbosity: Verbosity) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            verbosity,
        }
    }

    pub fn info(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!("{}", message);
        self.sink.post(message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        warn!("{}", message);
        self.sink.post(message);
    }

    /// Report a detail line when the verbosity reaches `level`
    pub fn detail<F, S>(&self, level: Verbosity, message: F)
    where
        F: FnOnce() -> S,
        S: AsRef<str>,
    {
        if self.verbosity >= level {
            let message = message();
            debug!("{}", message.as_ref());
            self.sink.post(message.as_ref());
        }
    }
}

impl fmt::Debug for ActivityLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityLog")
            .field("verbosity", &self.verbosity)
            .finish_non_exhaustive()
    }
}

struct NullSink;

impl ActivitySink for NullSink {
    fn post(&self, _message: &str) {}
}
