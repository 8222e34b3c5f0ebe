//! Runtime self-protection engine.
//!
//! Detects debuggers, dynamic instrumentation (Frida-class toolkits),
//! rooted or jailbroken devices and tampering with a code sentinel, which
//! it can repair on its own from a background watchdog. Results are
//! exposed as plain booleans through [`capabilities`].

pub mod capabilities;
pub mod detectors;
pub mod encoding;
pub mod engine;
pub mod error;
mod ffi;
pub mod integrity;
pub mod platform;
#[cfg(test)]
mod testutil;

pub use capabilities::{
    checksum, decode, detect_attached_debugger, detect_exported_symbols,
    detect_injected_segments, detect_injected_thread, detect_instrumentation_env,
    detect_instrumentation_files, detect_jailbreak_artifacts, detect_loaded_libraries,
    detect_process_identity, detect_suspicious_mappings, is_compromised,
    run_anti_instrumentation, run_health_checks, start_watchdog, stop_watchdog,
    verify_integrity, SecurityCapabilities, CAPABILITIES,
};
pub use detectors::ProbeResult;
pub use encoding::Signature;
pub use engine::config::ShieldConfig;
pub use engine::policy::{Assessment, DecisionEngine, DetectionSource, Evidence, Verdict};
pub use error::{Result, ShieldError};
pub use platform::{Platform, PlatformProbes, SecurityProbeSet};
