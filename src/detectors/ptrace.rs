//! Debugger probe built on the trace-attach primitive.

#[cfg(any(target_os = "linux", target_os = "android"))]
use std::sync::atomic::{AtomicBool, Ordering};

use crate::detectors::ProbeResult;

/// Set once our own `PTRACE_TRACEME` succeeded and the parent became tracer.
#[cfg(any(target_os = "linux", target_os = "android"))]
static SELF_CLAIMED: AtomicBool = AtomicBool::new(false);

/// Detects an attached debugger by claiming the tracer role on ourselves.
///
/// Mechanism:
/// A process can have only one tracer. If a debugger is already attached,
/// `ptrace(PTRACE_TRACEME)` fails with `EPERM`.
///
/// Limitations:
/// - Point-in-time: a debugger attaching after this call is not seen, and
///   one that detached just before is missed.
/// - Trivial to bypass by hooking `ptrace` (LD_PRELOAD, inline hooks).
/// - Side effect: when the claim SUCCEEDS, the parent becomes our tracer.
///   Signals delivered afterwards stop the process until the parent reaps
///   them, so this probe is run once per verdict, never in a loop. Later
///   calls recognise the parent tracer we installed and stay negative.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn detect_attached_debugger() -> ProbeResult {
    // SAFETY: PTRACE_TRACEME takes no pointer arguments.
    let res = unsafe { libc::ptrace(libc::PTRACE_TRACEME, 0, 0, 0) };

    if res != -1 {
        SELF_CLAIMED.store(true, Ordering::Relaxed);
        return ProbeResult::clear();
    }

    let err = std::io::Error::last_os_error();
    let tracer = std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| parse_tracer_pid(&status))
        .unwrap_or(0);
    if SELF_CLAIMED.load(Ordering::Relaxed) {
        // TracerPid is the tracing thread; the parent may have forked from
        // any of its threads.
        let tracer_tgid = std::fs::read_to_string(format!("/proc/{}/status", tracer))
            .ok()
            .and_then(|status| parse_tgid(&status));
        // SAFETY: getppid has no preconditions.
        let parent = unsafe { libc::getppid() } as u32;
        if is_parent_tracer(tracer, tracer_tgid, parent) {
            return ProbeResult::clear();
        }
    }
    ProbeResult::detected(format!(
        "ptrace(PTRACE_TRACEME) failed: {} (TracerPid {})",
        err, tracer
    ))
}

/// True when the tracer thread `tracer` belongs to the `parent` process.
pub fn is_parent_tracer(tracer: u32, tracer_tgid: Option<u32>, parent: u32) -> bool {
    tracer != 0 && (tracer == parent || tracer_tgid == Some(parent))
}

/// Leading fields of `extern_proc`, up to `p_flag`.
#[repr(C)]
#[cfg_attr(not(target_vendor = "apple"), allow(dead_code))]
struct ExternProcPrefix {
    p_un: [*mut libc::c_void; 2],
    p_vmspace: *mut libc::c_void,
    p_sigacts: *mut libc::c_void,
    p_flag: libc::c_int,
}

#[cfg_attr(not(target_vendor = "apple"), allow(dead_code))]
const P_FLAG_OFFSET: usize = std::mem::offset_of!(ExternProcPrefix, p_flag);

/// Apple platforms: ask the kernel for `P_TRACED` on our own process.
///
/// Only the `p_flag` field of `kinfo_proc` is needed, read at its offset
/// in `extern_proc` (see [`ExternProcPrefix`]) instead of mirroring the
/// whole struct.
#[cfg(target_vendor = "apple")]
pub fn detect_attached_debugger() -> ProbeResult {
    const P_TRACED: i32 = 0x0000_0800;
    const KINFO_PROC_SIZE: usize = 648;

    let mut buf = [0u8; KINFO_PROC_SIZE];
    let mut size: libc::size_t = KINFO_PROC_SIZE;

    // SAFETY: `buf` and `size` describe a writable buffer of the given size.
    let result = unsafe {
        let mut mib: [libc::c_int; 4] = [
            libc::CTL_KERN,
            libc::KERN_PROC,
            libc::KERN_PROC_PID,
            libc::getpid(),
        ];
        libc::sysctl(
            mib.as_mut_ptr(),
            4,
            buf.as_mut_ptr().cast::<libc::c_void>(),
            &mut size,
            std::ptr::null_mut(),
            0,
        )
    };

    if result != 0 || size < P_FLAG_OFFSET + 4 {
        return ProbeResult::clear();
    }

    let mut flag = [0u8; 4];
    flag.copy_from_slice(&buf[P_FLAG_OFFSET..P_FLAG_OFFSET + 4]);
    if i32::from_ne_bytes(flag) & P_TRACED != 0 {
        ProbeResult::detected("kernel reports P_TRACED for this process")
    } else {
        ProbeResult::clear()
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_vendor = "apple")))]
pub fn detect_attached_debugger() -> ProbeResult {
    ProbeResult::clear()
}

/// True when this platform has a usable trace-attach check.
pub fn trace_attach_available() -> bool {
    cfg!(any(
        target_os = "linux",
        target_os = "android",
        target_vendor = "apple"
    ))
}

/// Extracts `TracerPid` from the contents of `/proc/<pid>/status`.
pub fn parse_tracer_pid(status: &str) -> Option<u32> {
    parse_status_field(status, "TracerPid:")
}

/// Extracts the thread group (process) id from `/proc/<tid>/status`.
pub fn parse_tgid(status: &str) -> Option<u32> {
    parse_status_field(status, "Tgid:")
}

fn parse_status_field(status: &str, field: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix(field))
        .and_then(|raw| raw.trim().parse::<u32>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tracer_pid() {
        let status = "Name:\tapp\nState:\tS (sleeping)\nTracerPid:\t4242\nUid:\t0\n";
        assert_eq!(parse_tracer_pid(status), Some(4242));
        assert_eq!(parse_tracer_pid("TracerPid:\t0\n"), Some(0));
        assert_eq!(parse_tracer_pid("TracerPid:\t\n"), None);
        assert_eq!(parse_tracer_pid("Name:\tapp\n"), None);
    }

    #[test]
    fn test_parse_tgid() {
        let status = "Name:\tworker\nTgid:\t3378\nPid:\t3379\nTracerPid:\t0\n";
        assert_eq!(parse_tgid(status), Some(3378));
        assert_eq!(parse_tgid("Pid:\t3379\n"), None);
    }

    #[test]
    fn test_parent_tracer_from_worker_thread() {
        assert!(is_parent_tracer(3378, Some(3378), 3378));
        assert!(is_parent_tracer(3379, Some(3378), 3378));
        assert!(is_parent_tracer(3378, None, 3378));
        assert!(!is_parent_tracer(4000, Some(4000), 3378));
        assert!(!is_parent_tracer(3379, None, 3378));
        assert!(!is_parent_tracer(0, Some(3378), 3378));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_p_flag_follows_four_pointers() {
        assert_eq!(P_FLAG_OFFSET, 32);
    }
}
