use std::thread;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use security_core::engine::environment::EnvironmentState;
use security_core::integrity::{self, watchdog};
use security_core::{capabilities, DecisionEngine, DetectionSource, Verdict};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    println!("==================================================");
    println!("        Runtime Self-Protection Engine            ");
    println!("==================================================");

    // ===================================================================
    // ENVIRONMENT DETECTION
    // ===================================================================

    println!("\n[*] Phase 0: Environment Detection");
    let env_state = EnvironmentState::detect();
    env_state.print_summary();

    let probes = capabilities::probes();
    let engine = DecisionEngine::new(probes);

    // ===================================================================
    // INSTRUMENTATION FOOTPRINT
    // ===================================================================

    println!("\n[*] Phase 1: Instrumentation Footprint");
    let footprint = engine.run_anti_instrumentation();
    println!("{}", footprint.summary());

    // ===================================================================
    // HEALTH CHECKS (short-circuit; debugger probe first)
    // ===================================================================

    println!("[*] Phase 2: Health Checks");
    let health = engine.run_health_checks();
    println!("{}", health.summary());

    // ===================================================================
    // ROOT / JAILBREAK POLICY
    // ===================================================================

    println!("[*] Phase 3: Compromise Checks");
    let compromise = engine.run_compromise_checks();
    println!("{}", compromise.summary());

    // ===================================================================
    // SELF-HEAL DRILL
    // ===================================================================

    println!("[*] Phase 4: Self-Heal Drill");
    self_heal_drill();

    // ===================================================================
    // FINAL VERDICT
    // ===================================================================

    let identity = capabilities::explain(DetectionSource::ProcessIdentity);
    if let Some(reason) = identity.reason() {
        info!("[MAIN] identity: {}", reason);
    }

    let verdict = if health.is_trusted() && compromise.is_trusted() && footprint.is_trusted() {
        Verdict::Trusted
    } else {
        Verdict::Compromised
    };

    println!("\n==================================================");
    println!("[*] Final Verdict: {:?}", verdict);
    println!("==================================================");
}

fn self_heal_drill() {
    if !integrity::sentinel_available() {
        warn!("[MAIN] no integrity sentinel on this target, drill skipped");
        return;
    }

    let snapshot = integrity::capture_reference();
    let watchdog = watchdog::global();
    capabilities::start_watchdog();

    let tampered = vec![0xCC; snapshot.len()];
    if let Err(err) = integrity::overwrite_sentinel(&tampered) {
        warn!("[MAIN] could not tamper with the sentinel: {}", err);
        capabilities::stop_watchdog();
        return;
    }
    info!("[MAIN] sentinel overwritten, intact = {}", capabilities::verify_integrity());

    // Two full intervals is enough for at least one patrol pass.
    thread::sleep(watchdog.interval() * 2 + Duration::from_millis(100));

    info!(
        "[MAIN] after watchdog: intact = {}, heals = {}, failures = {}",
        capabilities::verify_integrity(),
        watchdog.heals(),
        watchdog.heal_failures()
    );
    capabilities::stop_watchdog();
}
