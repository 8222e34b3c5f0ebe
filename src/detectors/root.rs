//! Root and jailbreak specific probes that do not fit a generic scanner:
//! Android system properties and the Apple sandbox-escape write test.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, warn};

use crate::detectors::ProbeResult;

/// Properties whose value reveals a debuggable or insecure build.
pub const DANGEROUS_PROPERTIES: [(&str, &str); 2] = [("ro.debuggable", "1"), ("ro.secure", "0")];

/// A location app sandboxes are never allowed to write to.
pub const SANDBOX_PROBE_PATH: &str = "/private/jailbreak.txt";

pub fn is_dangerous_property(name: &str, value: &str) -> bool {
    DANGEROUS_PROPERTIES
        .iter()
        .any(|(dangerous, bad)| *dangerous == name && value.trim() == *bad)
}

/// Evaluates every dangerous property through `read`.
pub fn detect_dangerous_properties_with<F>(read: F) -> ProbeResult
where
    F: Fn(&str) -> Option<String>,
{
    for (name, _) in DANGEROUS_PROPERTIES {
        if let Some(value) = read(name) {
            if is_dangerous_property(name, &value) {
                return ProbeResult::detected(format!("{}={}", name, value.trim()));
            }
        }
    }
    ProbeResult::clear()
}

pub fn detect_dangerous_properties() -> ProbeResult {
    detect_dangerous_properties_with(read_system_property)
}

/// Reads an Android system property. `None` when unset or unsupported.
#[cfg(target_os = "android")]
pub fn read_system_property(name: &str) -> Option<String> {
    use std::ffi::{CStr, CString};

    use crate::ffi::{__system_property_get, PROP_VALUE_MAX};

    let c_name = CString::new(name).ok()?;
    let mut value = [0 as libc::c_char; PROP_VALUE_MAX];
    // SAFETY: `value` is PROP_VALUE_MAX bytes, the documented maximum
    // bionic writes including the terminator.
    let len = unsafe { __system_property_get(c_name.as_ptr(), value.as_mut_ptr()) };
    if len <= 0 {
        return None;
    }
    // SAFETY: bionic NUL-terminates the value.
    let value = unsafe { CStr::from_ptr(value.as_ptr()) };
    Some(value.to_string_lossy().into_owned())
}

#[cfg(not(target_os = "android"))]
pub fn read_system_property(_name: &str) -> Option<String> {
    None
}

/// Tries to create a file in a directory the sandbox forbids.
///
/// Success means the sandbox is gone; the probe file is removed right
/// away. An existing probe file is also treated as evidence, but is left in
/// place since we did not create it.
pub fn detect_sandbox_escape_at(path: &Path) -> ProbeResult {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => {
            drop(file);
            if let Err(err) = fs::remove_file(path) {
                warn!("[ROOT] could not remove probe file {}: {}", path.display(), err);
            }
            ProbeResult::detected(format!("wrote outside the sandbox: {}", path.display()))
        }
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            ProbeResult::detected(format!("probe file already present: {}", path.display()))
        }
        Err(err) => {
            debug!("[ROOT] sandbox write refused for {}: {}", path.display(), err);
            ProbeResult::clear()
        }
    }
}

pub fn detect_sandbox_escape() -> ProbeResult {
    detect_sandbox_escape_at(Path::new(SANDBOX_PROBE_PATH))
}
