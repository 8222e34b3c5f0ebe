//! Environment Detection Module
//!
//! Reports which detection mechanisms this process can actually use, so a
//! clean verdict on a platform with gaps is not mistaken for full coverage.
//!
//! # Factors Considered
//!
//! - **procfs**: thread, mapping and identity probes read `/proc/self`
//! - **Trace attach**: the debugger probe needs `ptrace` or `sysctl`
//! - **Image enumeration / segment walk**: binary probes need loader APIs
//! - **Sentinel**: only compiled in on supported architectures
//! - **Yama ptrace_scope**: informational, restricts who may attach to us

use std::fs::File;
use std::io::{BufRead, BufReader};

use tracing::{info, warn};

use crate::detectors::{images, procfs, ptrace};
use crate::integrity;
use crate::platform::Platform;

const YAMA_PTRACE_SCOPE: &str = "/proc/sys/kernel/yama/ptrace_scope";

/// Detection coverage of the running process.
#[derive(Debug, Clone)]
pub struct EnvironmentState {
    pub platform: Platform,
    pub procfs_available: bool,
    pub trace_attach_available: bool,
    pub image_enumeration_available: bool,
    pub segment_walk_available: bool,
    pub sentinel_available: bool,
    /// Yama `ptrace_scope`, when the LSM is present.
    pub ptrace_scope: Option<u8>,
    /// Human-readable coverage gaps
    pub warnings: Vec<String>,
}

impl EnvironmentState {
    pub fn detect() -> Self {
        let mut state = Self {
            platform: Platform::current(),
            procfs_available: procfs::procfs_available(),
            trace_attach_available: ptrace::trace_attach_available(),
            image_enumeration_available: images::image_enumeration_available(),
            segment_walk_available: images::segment_walk_available(),
            sentinel_available: integrity::sentinel_available(),
            ptrace_scope: detect_ptrace_scope(),
            warnings: Vec::new(),
        };
        state.collect_warnings();
        state
    }

    fn collect_warnings(&mut self) {
        if !self.procfs_available {
            self.warnings.push(
                "no procfs: thread, mapping and identity probes report healthy".to_string(),
            );
        }
        if !self.trace_attach_available {
            self.warnings
                .push("no trace-attach primitive: debugger probe reports healthy".to_string());
        }
        if !self.image_enumeration_available {
            self.warnings
                .push("loaded images cannot be listed: library probe reports healthy".to_string());
        }
        if !self.segment_walk_available {
            self.warnings
                .push("main image segments cannot be walked: segment probe reports healthy".to_string());
        }
        if !self.sentinel_available {
            self.warnings.push(
                "no integrity sentinel on this architecture: integrity always intact".to_string(),
            );
        }
        if self.platform == Platform::Other {
            self.warnings
                .push("no root/jailbreak policy for this platform: never compromised".to_string());
        }
    }

    /// True when every probe has its mechanism available.
    pub fn full_coverage(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn print_summary(&self) {
        info!("[ENV] Platform: {}", self.platform.name());
        info!("[ENV] procfs: {}", self.procfs_available);
        info!("[ENV] Trace attach: {}", self.trace_attach_available);
        info!("[ENV] Image enumeration: {}", self.image_enumeration_available);
        info!("[ENV] Segment walk: {}", self.segment_walk_available);
        info!("[ENV] Integrity sentinel: {}", self.sentinel_available);
        info!(
            "[ENV] ptrace_scope: {}",
            self.ptrace_scope
                .map_or("unknown".to_string(), |v| v.to_string())
        );

        for warning in &self.warnings {
            warn!("[ENV] {}", warning);
        }
    }
}

fn detect_ptrace_scope() -> Option<u8> {
    let file = File::open(YAMA_PTRACE_SCOPE).ok()?;
    let reader = BufReader::new(file);
    let line = reader.lines().next()?.ok()?;
    line.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_detection() {
        let state = EnvironmentState::detect();
        assert_eq!(state.platform, Platform::current());
        assert_eq!(state.full_coverage(), state.warnings.is_empty());
        if let Some(scope) = state.ptrace_scope {
            assert!(scope <= 3);
        }
    }

    #[cfg(all(target_os = "linux", has_sentinel))]
    #[test]
    fn test_linux_gaps() {
        let state = EnvironmentState::detect();
        assert!(state.procfs_available);
        assert!(state.trace_attach_available);
        // Desktop Linux has no Mach-O segments and no root policy.
        assert_eq!(state.warnings.len(), 2);
    }
}
