use std::sync::atomic::{AtomicUsize, Ordering};

use security_core::platform::android::ANDROID_COMPROMISE_CHECKS;
use security_core::platform::apple::APPLE_COMPROMISE_CHECKS;
use security_core::{
    DecisionEngine, DetectionSource, Platform, ProbeResult, SecurityProbeSet, Verdict,
};

/// Fails exactly one source and counts every probe call.
struct OneFailure {
    failing: Option<DetectionSource>,
    policy: &'static [DetectionSource],
    calls: AtomicUsize,
}

impl OneFailure {
    fn new(failing: Option<DetectionSource>, policy: &'static [DetectionSource]) -> Self {
        Self {
            failing,
            policy,
            calls: AtomicUsize::new(0),
        }
    }
}

impl SecurityProbeSet for OneFailure {
    fn platform(&self) -> Platform {
        Platform::Android
    }

    fn compromise_checks(&self) -> &[DetectionSource] {
        self.policy
    }

    fn probe(&self, source: DetectionSource) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if Some(source) == self.failing {
            ProbeResult::detected("scripted")
        } else {
            ProbeResult::clear()
        }
    }
}

#[test]
fn debugger_failure_skips_remaining_health_checks() {
    let probes = OneFailure::new(Some(DetectionSource::Debugger), &ANDROID_COMPROMISE_CHECKS);
    let assessment = DecisionEngine::new(&probes).run_health_checks();

    assert_eq!(assessment.decide(), Verdict::Compromised);
    assert_eq!(probes.calls.load(Ordering::SeqCst), 1);
    assert_eq!(assessment.evidence()[0].details, "scripted");
}

#[test]
fn integrity_failure_is_reached_last() {
    let probes = OneFailure::new(Some(DetectionSource::Integrity), &ANDROID_COMPROMISE_CHECKS);
    let assessment = DecisionEngine::new(&probes).run_health_checks();

    assert!(!assessment.is_trusted());
    assert_eq!(probes.calls.load(Ordering::SeqCst), 5);
}

#[test]
fn android_policy_evaluates_every_check_after_first_hit() {
    let probes = OneFailure::new(Some(DetectionSource::RootBinaries), &ANDROID_COMPROMISE_CHECKS);
    let assessment = DecisionEngine::new(&probes).run_compromise_checks();

    assert!(assessment.fired(DetectionSource::RootBinaries));
    assert_eq!(probes.calls.load(Ordering::SeqCst), ANDROID_COMPROMISE_CHECKS.len());
}

#[test]
fn apple_policy_flags_sandbox_escape() {
    let probes = OneFailure::new(Some(DetectionSource::SandboxEscape), &APPLE_COMPROMISE_CHECKS);
    let assessment = DecisionEngine::new(&probes).run_compromise_checks();

    assert_eq!(assessment.decide(), Verdict::Compromised);
    assert_eq!(assessment.evaluated(), &APPLE_COMPROMISE_CHECKS);
}

#[test]
fn clean_probes_are_trusted_everywhere() {
    let probes = OneFailure::new(None, &ANDROID_COMPROMISE_CHECKS);
    let engine = DecisionEngine::new(&probes);

    assert!(engine.run_health_checks().is_trusted());
    assert!(engine.run_compromise_checks().is_trusted());
    assert!(engine.run_anti_instrumentation().is_trusted());
}

#[test]
fn trait_objects_are_accepted() {
    let probes: Box<dyn SecurityProbeSet> =
        Box::new(OneFailure::new(Some(DetectionSource::LoadedLibraries), &[]));
    let assessment = DecisionEngine::new(probes.as_ref()).run_anti_instrumentation();
    assert!(assessment.fired(DetectionSource::LoadedLibraries));
    assert!(DecisionEngine::new(probes.as_ref()).run_compromise_checks().is_trusted());
}
