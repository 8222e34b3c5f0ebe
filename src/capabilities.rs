//! Capability surface.
//!
//! The free functions are what a host links against from Rust. The same
//! operations are exposed to foreign bridges through the `#[repr(C)]`
//! [`CAPABILITIES`] table, whose entries never unwind across the boundary.
//!
//! Debugger, thread, mapping and integrity functions return true when the
//! condition was DETECTED. [`detect_process_identity`] and
//! [`run_health_checks`] return true when the process is HEALTHY.

use std::panic::{self, UnwindSafe};
use std::sync::OnceLock;

use tracing::error;

use crate::detectors::ProbeResult;
use crate::encoding;
use crate::engine::config::ShieldConfig;
use crate::engine::policy::{DecisionEngine, DetectionSource};
use crate::integrity::{self, watchdog};
use crate::platform::{PlatformProbes, SecurityProbeSet};

static PROBES: OnceLock<PlatformProbes> = OnceLock::new();

/// Probe set for this build, configured from the environment on first use.
pub fn probes() -> &'static PlatformProbes {
    PROBES.get_or_init(|| PlatformProbes::new(ShieldConfig::from_env()))
}

fn probe(source: DetectionSource) -> bool {
    probes().probe(source).detected
}

/// True when every health check passes. Stops at the first failure.
pub fn run_health_checks() -> bool {
    DecisionEngine::new(probes()).run_health_checks().is_trusted()
}

/// True when the device is rooted, jailbroken or instrumented.
pub fn is_compromised() -> bool {
    !DecisionEngine::new(probes())
        .run_compromise_checks()
        .is_trusted()
}

/// True when any instrumentation footprint check fires.
pub fn run_anti_instrumentation() -> bool {
    !DecisionEngine::new(probes())
        .run_anti_instrumentation()
        .is_trusted()
}

/// See [`crate::detectors::ptrace::detect_attached_debugger`] for the side
/// effect of a negative result.
pub fn detect_attached_debugger() -> bool {
    probe(DetectionSource::Debugger)
}

pub fn detect_injected_thread() -> bool {
    probe(DetectionSource::InjectedThread)
}

pub fn detect_suspicious_mappings() -> bool {
    probe(DetectionSource::SuspiciousMappings)
}

/// True when the process identity matches the trusted identifier.
pub fn detect_process_identity() -> bool {
    !probe(DetectionSource::ProcessIdentity)
}

/// True when the integrity sentinel is intact.
pub fn verify_integrity() -> bool {
    integrity::verify()
}

pub fn detect_instrumentation_env() -> bool {
    probe(DetectionSource::InstrumentationEnv)
}

pub fn detect_instrumentation_files() -> bool {
    probe(DetectionSource::InstrumentationFiles)
}

pub fn detect_loaded_libraries() -> bool {
    probe(DetectionSource::LoadedLibraries)
}

pub fn detect_exported_symbols() -> bool {
    probe(DetectionSource::ExportedSymbols)
}

pub fn detect_injected_segments() -> bool {
    probe(DetectionSource::InjectedSegments)
}

pub fn detect_jailbreak_artifacts() -> bool {
    probe(DetectionSource::JailbreakArtifacts)
}

pub fn decode(input: &[u8], key: u8) -> Vec<u8> {
    encoding::decode(input, key)
}

pub fn checksum(bytes: &[u8]) -> u32 {
    encoding::checksum(bytes)
}

/// Arms the process-wide self-heal watchdog. Calling it again while it runs
/// does nothing.
pub fn start_watchdog() {
    if let Err(err) = watchdog::global().start() {
        error!("[CAPS] watchdog not started: {}", err);
    }
}

/// Stops the process-wide watchdog. Returns true if it was running.
pub fn stop_watchdog() -> bool {
    watchdog::global().stop()
}

/// Latest [`ProbeResult`] for one source, with its reason. Used by the demo
/// binary to print why a capability fired.
pub fn explain(source: DetectionSource) -> ProbeResult {
    probes().probe(source)
}

/// Function table handed to foreign bridges.
#[repr(C)]
pub struct SecurityCapabilities {
    pub run_health_checks: extern "C" fn() -> bool,
    pub detect_attached_debugger: extern "C" fn() -> bool,
    pub detect_injected_thread: extern "C" fn() -> bool,
    pub detect_suspicious_mappings: extern "C" fn() -> bool,
    pub detect_process_identity: extern "C" fn() -> bool,
    pub verify_integrity: extern "C" fn() -> bool,
    /// `(input, len, key, out, out_cap) -> required length`. `out` is only
    /// written when `out_cap` is at least the required length.
    pub decode: unsafe extern "C" fn(*const u8, usize, u8, *mut u8, usize) -> usize,
    pub checksum: unsafe extern "C" fn(*const u8, usize) -> u32,
    pub is_compromised: extern "C" fn() -> bool,
    pub start_watchdog: extern "C" fn(),
    pub stop_watchdog: extern "C" fn() -> bool,
    pub detect_instrumentation_env: extern "C" fn() -> bool,
    pub detect_instrumentation_files: extern "C" fn() -> bool,
    pub detect_loaded_libraries: extern "C" fn() -> bool,
    pub detect_exported_symbols: extern "C" fn() -> bool,
    pub detect_injected_segments: extern "C" fn() -> bool,
    pub run_anti_instrumentation: extern "C" fn() -> bool,
    pub detect_jailbreak_artifacts: extern "C" fn() -> bool,
}

pub static CAPABILITIES: SecurityCapabilities = SecurityCapabilities {
    run_health_checks: c_run_health_checks,
    detect_attached_debugger: c_detect_attached_debugger,
    detect_injected_thread: c_detect_injected_thread,
    detect_suspicious_mappings: c_detect_suspicious_mappings,
    detect_process_identity: c_detect_process_identity,
    verify_integrity: c_verify_integrity,
    decode: c_decode,
    checksum: c_checksum,
    is_compromised: c_is_compromised,
    start_watchdog: c_start_watchdog,
    stop_watchdog: c_stop_watchdog,
    detect_instrumentation_env: c_detect_instrumentation_env,
    detect_instrumentation_files: c_detect_instrumentation_files,
    detect_loaded_libraries: c_detect_loaded_libraries,
    detect_exported_symbols: c_detect_exported_symbols,
    detect_injected_segments: c_detect_injected_segments,
    run_anti_instrumentation: c_run_anti_instrumentation,
    detect_jailbreak_artifacts: c_detect_jailbreak_artifacts,
};

#[no_mangle]
pub extern "C" fn security_core_capabilities() -> *const SecurityCapabilities {
    &CAPABILITIES
}

/// Runs `f`, mapping a panic to `fallback`.
fn guarded<T>(name: &str, fallback: T, f: impl FnOnce() -> T + UnwindSafe) -> T {
    panic::catch_unwind(f).unwrap_or_else(|_| {
        error!("[CAPS] {} panicked", name);
        fallback
    })
}

macro_rules! c_bool {
    ($($c_name:ident => $rust:path, $fallback:expr;)+) => {
        $(
            extern "C" fn $c_name() -> bool {
                guarded(stringify!($rust), $fallback, $rust)
            }
        )+
    };
}

// Fallbacks mirror the probe defaults: "not detected" for detectors,
// "healthy" for health-style capabilities.
c_bool! {
    c_run_health_checks => run_health_checks, true;
    c_detect_attached_debugger => detect_attached_debugger, false;
    c_detect_injected_thread => detect_injected_thread, false;
    c_detect_suspicious_mappings => detect_suspicious_mappings, false;
    c_detect_process_identity => detect_process_identity, true;
    c_verify_integrity => verify_integrity, true;
    c_is_compromised => is_compromised, false;
    c_stop_watchdog => stop_watchdog, false;
    c_detect_instrumentation_env => detect_instrumentation_env, false;
    c_detect_instrumentation_files => detect_instrumentation_files, false;
    c_detect_loaded_libraries => detect_loaded_libraries, false;
    c_detect_exported_symbols => detect_exported_symbols, false;
    c_detect_injected_segments => detect_injected_segments, false;
    c_run_anti_instrumentation => run_anti_instrumentation, false;
    c_detect_jailbreak_artifacts => detect_jailbreak_artifacts, false;
}

extern "C" fn c_start_watchdog() {
    guarded("start_watchdog", (), start_watchdog)
}

/// # Safety
/// `input` must point to `len` readable bytes (or be null), `out` to
/// `out_cap` writable bytes (or be null).
unsafe extern "C" fn c_decode(
    input: *const u8,
    len: usize,
    key: u8,
    out: *mut u8,
    out_cap: usize,
) -> usize {
    let input = raw_slice(input, len);
    if out.is_null() || out_cap < input.len() {
        return input.len();
    }
    let plain = encoding::decode(input, key);
    std::ptr::copy_nonoverlapping(plain.as_ptr(), out, plain.len());
    plain.len()
}

/// # Safety
/// `bytes` must point to `len` readable bytes, or be null.
unsafe extern "C" fn c_checksum(bytes: *const u8, len: usize) -> u32 {
    encoding::checksum(raw_slice(bytes, len))
}

unsafe fn raw_slice<'a>(ptr: *const u8, len: usize) -> &'a [u8] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_checksum() {
        let data = b"123456789";
        let crc = unsafe { (CAPABILITIES.checksum)(data.as_ptr(), data.len()) };
        assert_eq!(crc, 0xCBF4_3926);
        assert_eq!(unsafe { (CAPABILITIES.checksum)(std::ptr::null(), 5) }, 0);
    }

    #[test]
    fn test_table_decode_into_buffer() {
        let encoded = [0xCC, 0xD8, 0xC3, 0xCE, 0xCB];
        let mut out = [0u8; 8];
        let written = unsafe {
            (CAPABILITIES.decode)(encoded.as_ptr(), encoded.len(), 0xAA, out.as_mut_ptr(), out.len())
        };
        assert_eq!(written, 5);
        assert_eq!(&out[..written], b"frida");
    }

    #[test]
    fn test_table_decode_reports_required_length() {
        let encoded = [0xCC, 0xD8, 0xC3];
        let mut out = [0u8; 2];
        let needed = unsafe {
            (CAPABILITIES.decode)(encoded.as_ptr(), encoded.len(), 0xAA, out.as_mut_ptr(), out.len())
        };
        assert_eq!(needed, 3);
        assert_eq!(out, [0, 0]);

        let needed = unsafe {
            (CAPABILITIES.decode)(encoded.as_ptr(), encoded.len(), 0xAA, std::ptr::null_mut(), 0)
        };
        assert_eq!(needed, 3);
    }

    #[test]
    fn test_exported_table_pointer() {
        let table = security_core_capabilities();
        assert!(std::ptr::eq(table, &CAPABILITIES));
    }

    #[test]
    fn test_rust_surface_decode_and_checksum() {
        assert_eq!(decode(&decode(b"gum_init", 0x5C), 0x5C), b"gum_init");
        assert_eq!(checksum(b""), 0);
    }

    #[cfg(not(any(target_os = "android", target_vendor = "apple")))]
    #[test]
    fn test_generic_platform_never_compromised() {
        assert!(!is_compromised());
        assert!(!(CAPABILITIES.is_compromised)());
    }

    #[test]
    fn test_guarded_maps_panic_to_fallback() {
        assert!(guarded("boom", true, || panic!("boom")));
        assert_eq!(guarded("ok", 0, || 7), 7);
    }
}
