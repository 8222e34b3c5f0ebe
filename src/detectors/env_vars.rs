use std::ffi::OsStr;

use tracing::debug;

use crate::detectors::ProbeResult;
use crate::encoding::Signature;

/// Variables read by the Frida loader and gadget at start-up.
pub const INSTRUMENTATION_ENV_VARS: [Signature; 3] = [
    crate::signature!(b"FRIDA_DNS_SERVER"),
    crate::signature!(b"FRIDA_EXTRA_ARGS"),
    crate::signature!(b"FRIDA_LOADER"),
];

/// True if any known instrumentation variable is set, whatever its value.
pub fn detect_instrumentation_env() -> ProbeResult {
    let names = INSTRUMENTATION_ENV_VARS.iter().map(Signature::reveal_str);
    detect_env_markers(names)
}

/// Checks each name for presence in the process environment.
pub fn detect_env_markers<I, S>(names: I) -> ProbeResult
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    for name in names {
        let name = name.as_ref();
        if std::env::var_os(name).is_some() {
            debug!("[ENV] instrumentation variable present: {:?}", name);
            return ProbeResult::detected(format!(
                "instrumentation variable {} is set",
                name.to_string_lossy()
            ));
        }
    }
    ProbeResult::clear()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_present() {
        let name = "SECURITY_CORE_TEST_MARKER_PRESENT";
        std::env::set_var(name, "");
        let result = detect_env_markers([name]);
        std::env::remove_var(name);

        assert!(result.detected);
        assert!(result.reason().is_some_and(|r| r.contains(name)));
    }

    #[test]
    fn test_marker_absent() {
        let result = detect_env_markers(["SECURITY_CORE_TEST_MARKER_NEVER_SET"]);
        assert_eq!(result, ProbeResult::clear());
    }

    #[test]
    fn test_known_variables_decode() {
        let names: Vec<String> = INSTRUMENTATION_ENV_VARS
            .iter()
            .map(Signature::reveal_str)
            .collect();
        assert_eq!(names, ["FRIDA_DNS_SERVER", "FRIDA_EXTRA_ARGS", "FRIDA_LOADER"]);
    }
}
