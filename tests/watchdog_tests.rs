use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use security_core::integrity::watchdog::{self, Watchdog};
use security_core::integrity;

/// The sentinel is process-wide; one test at a time.
static SERIAL: Mutex<()> = Mutex::new(());

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn watchdog_heals_tampered_sentinel() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    if !integrity::sentinel_available() {
        return;
    }

    let watchdog = Watchdog::new(Duration::from_millis(20));
    assert!(watchdog.start().unwrap());

    let tampered = vec![0xCC; integrity::capture_reference().len()];
    integrity::overwrite_sentinel(&tampered).unwrap();

    assert!(wait_until(Duration::from_secs(5), || watchdog.heals() >= 1));
    assert!(integrity::verify());
    assert_eq!(watchdog.heal_failures(), 0);
    assert!(watchdog.stop());
}

#[test]
fn second_start_does_not_add_a_patrol() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());

    let watchdog = Watchdog::new(Duration::from_millis(100));
    assert!(watchdog.start().unwrap());
    assert!(!watchdog.start().unwrap());
    assert!(watchdog.is_running());

    thread::sleep(Duration::from_millis(350));
    let iterations = watchdog.iterations();
    assert!(watchdog.stop());

    // One patrol makes about four passes in 350ms; two would make eight.
    assert!(iterations >= 1);
    assert!(iterations <= 6, "{} iterations", iterations);
}

#[test]
fn stop_is_prompt_and_restartable() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());

    let watchdog = Watchdog::new(Duration::from_secs(60));
    assert!(watchdog.start().unwrap());
    assert!(wait_until(Duration::from_secs(5), || watchdog.iterations() >= 1));

    let started = Instant::now();
    assert!(watchdog.stop());
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!watchdog.is_running());
    assert!(!watchdog.stop());

    assert!(watchdog.start().unwrap());
    assert!(watchdog.stop());
}

#[test]
fn global_watchdog_start_is_idempotent() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());

    security_core::start_watchdog();
    security_core::start_watchdog();
    assert!(watchdog::global().is_running());

    assert!(security_core::stop_watchdog());
    assert!(!security_core::stop_watchdog());
    assert!(security_core::verify_integrity());
}

#[test]
fn only_one_patrol_runs_per_process() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());

    security_core::start_watchdog();
    let extra = Watchdog::new(Duration::from_millis(50));
    assert!(!extra.start().unwrap());
    assert!(!extra.is_running());
    assert!(watchdog::patrol_active());

    assert!(security_core::stop_watchdog());
    assert!(!watchdog::patrol_active());

    assert!(extra.start().unwrap());
    security_core::start_watchdog();
    assert!(!watchdog::global().is_running());
    assert!(extra.stop());
}
