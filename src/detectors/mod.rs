//! Individual detection probes.
//!
//! Every probe is synchronous, runs on the caller's thread and returns a
//! [`ProbeResult`]. A probe never fails: a missing mechanism or an
//! unreadable source resolves to the probe's conservative default.

pub mod artifacts;
pub mod env_vars;
pub mod images;
pub mod procfs;
pub mod ptrace;
pub mod root;

/// Outcome of a single probe invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResult {
    pub detected: bool,
    pub reason: Option<String>,
}

impl ProbeResult {
    /// Nothing found.
    pub fn clear() -> Self {
        Self::default()
    }

    /// A definitive positive hit.
    pub fn detected(reason: impl Into<String>) -> Self {
        Self {
            detected: true,
            reason: Some(reason.into()),
        }
    }

    pub fn is_detected(&self) -> bool {
        self.detected
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}
