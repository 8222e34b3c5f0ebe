//! Platform policies.
//!
//! A [`SecurityProbeSet`] answers two questions for the aggregator: which
//! checks make up the compromise verdict on this platform, and how a single
//! [`DetectionSource`] is probed. The concrete set is chosen at build time
//! through [`PlatformProbes`]; tests inject their own.

pub mod android;
pub mod apple;
pub mod generic;

use std::path::Path;

use tracing::debug;

use crate::detectors::{artifacts, env_vars, images, procfs, ptrace, root, ProbeResult};
use crate::engine::config::ShieldConfig;
use crate::engine::policy::DetectionSource;
use crate::integrity;

pub use android::AndroidProbes;
pub use apple::AppleProbes;
pub use generic::GenericProbes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Android,
    Apple,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(target_vendor = "apple") {
            Platform::Apple
        } else {
            Platform::Other
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Apple => "apple",
            Platform::Other => "other",
        }
    }
}

/// Platform-specific probe dispatch.
pub trait SecurityProbeSet: Send + Sync {
    fn platform(&self) -> Platform;

    /// Checks OR-ed into the compromise verdict. Empty means never compromised.
    fn compromise_checks(&self) -> &[DetectionSource];

    /// Runs one probe. Positive always means "bad".
    fn probe(&self, source: DetectionSource) -> ProbeResult;
}

#[cfg(target_os = "android")]
pub type PlatformProbes = AndroidProbes;

#[cfg(target_vendor = "apple")]
pub type PlatformProbes = AppleProbes;

#[cfg(not(any(target_os = "android", target_vendor = "apple")))]
pub type PlatformProbes = GenericProbes;

/// Probe implementation shared by every platform set.
pub fn evaluate(config: &ShieldConfig, source: DetectionSource) -> ProbeResult {
    match source {
        DetectionSource::Debugger => ptrace::detect_attached_debugger(),
        DetectionSource::InjectedThread => procfs::detect_injected_thread(&config.thread_marker),
        DetectionSource::SuspiciousMappings => {
            procfs::detect_suspicious_mappings(&config.mapping_marker)
        }
        DetectionSource::ProcessIdentity => {
            if procfs::procfs_available() {
                procfs::check_identity_self(&config.trusted_identity)
            } else {
                debug!("[PLATFORM] no procfs, process identity not checked");
                ProbeResult::clear()
            }
        }
        DetectionSource::Integrity => {
            if integrity::verify() {
                ProbeResult::clear()
            } else {
                ProbeResult::detected("integrity sentinel differs from its reference")
            }
        }
        DetectionSource::RootBinaries => artifacts::detect_root_binaries(),
        DetectionSource::DangerousProperties => root::detect_dangerous_properties(),
        DetectionSource::WritableSystem => {
            procfs::detect_writable_system(Path::new(procfs::PROC_MOUNTS))
        }
        DetectionSource::RootPackages => artifacts::detect_root_packages(),
        DetectionSource::InstrumentationServer => {
            artifacts::detect_artifacts([&config.instrumentation_server_path])
        }
        DetectionSource::JailbreakArtifacts => artifacts::detect_jailbreak_artifacts(),
        DetectionSource::SandboxEscape => root::detect_sandbox_escape(),
        DetectionSource::InstrumentationEnv => env_vars::detect_instrumentation_env(),
        DetectionSource::InstrumentationFiles => artifacts::detect_instrumentation_files(),
        DetectionSource::LoadedLibraries => images::detect_loaded_libraries(),
        DetectionSource::ExportedSymbols => images::detect_exported_symbols(),
        DetectionSource::InjectedSegments => images::detect_injected_segments(),
    }
}
