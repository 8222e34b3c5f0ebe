use std::fmt;

use tracing::{info, warn};

use crate::detectors::ProbeResult;
use crate::platform::SecurityProbeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Trusted,
    Compromised,
}

/// Detection source taxonomy.
///
/// For every source, a positive [`ProbeResult`] means "bad": a debugger is
/// attached, the identity does NOT match, the sentinel is NOT intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectionSource {
    // Health checks
    Debugger,
    InjectedThread,
    SuspiciousMappings,
    ProcessIdentity,
    Integrity,

    // Root / jailbreak
    RootBinaries,
    DangerousProperties,
    WritableSystem,
    RootPackages,
    InstrumentationServer,
    JailbreakArtifacts,
    SandboxEscape,

    // Instrumentation footprint
    InstrumentationEnv,
    InstrumentationFiles,
    LoadedLibraries,
    ExportedSymbols,
    InjectedSegments,
}

impl DetectionSource {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Debugger => "debugger",
            Self::InjectedThread => "injected_thread",
            Self::SuspiciousMappings => "suspicious_mappings",
            Self::ProcessIdentity => "process_identity",
            Self::Integrity => "integrity",
            Self::RootBinaries => "root_binaries",
            Self::DangerousProperties => "dangerous_properties",
            Self::WritableSystem => "writable_system",
            Self::RootPackages => "root_packages",
            Self::InstrumentationServer => "instrumentation_server",
            Self::JailbreakArtifacts => "jailbreak_artifacts",
            Self::SandboxEscape => "sandbox_escape",
            Self::InstrumentationEnv => "instrumentation_env",
            Self::InstrumentationFiles => "instrumentation_files",
            Self::LoadedLibraries => "loaded_libraries",
            Self::ExportedSymbols => "exported_symbols",
            Self::InjectedSegments => "injected_segments",
        }
    }
}

impl fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Health checks, cheapest first. Evaluation stops at the first hit.
pub const HEALTH_CHECK_ORDER: [DetectionSource; 5] = [
    DetectionSource::Debugger,
    DetectionSource::InjectedThread,
    DetectionSource::SuspiciousMappings,
    DetectionSource::ProcessIdentity,
    DetectionSource::Integrity,
];

/// Instrumentation footprint checks, all evaluated.
pub const ANTI_INSTRUMENTATION_CHECKS: [DetectionSource; 5] = [
    DetectionSource::LoadedLibraries,
    DetectionSource::InstrumentationEnv,
    DetectionSource::InstrumentationFiles,
    DetectionSource::ExportedSymbols,
    DetectionSource::InjectedSegments,
];

/// Evidence record for a positive probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evidence {
    pub source: DetectionSource,
    pub details: String,
}

/// What one aggregate run evaluated and what it found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assessment {
    evaluated: Vec<DetectionSource>,
    evidence: Vec<Evidence>,
}

impl Assessment {
    /// Records a probe outcome. Returns true if it was a detection.
    pub fn report(&mut self, source: DetectionSource, result: ProbeResult) -> bool {
        self.evaluated.push(source);
        if !result.detected {
            return false;
        }

        let details = result
            .reason
            .unwrap_or_else(|| "no details".to_string());
        warn!("[ENGINE] {} | {}", source, details);
        self.evidence.push(Evidence { source, details });
        true
    }

    pub fn decide(&self) -> Verdict {
        if self.evidence.is_empty() {
            Verdict::Trusted
        } else {
            Verdict::Compromised
        }
    }

    pub fn is_trusted(&self) -> bool {
        self.decide() == Verdict::Trusted
    }

    pub fn evaluated(&self) -> &[DetectionSource] {
        &self.evaluated
    }

    pub fn evidence(&self) -> &[Evidence] {
        &self.evidence
    }

    pub fn fired(&self, source: DetectionSource) -> bool {
        self.evidence.iter().any(|e| e.source == source)
    }

    /// Returns a summary suitable for logging
    pub fn summary(&self) -> String {
        let mut s = format!(
            "Verdict: {:?} | evaluated {} probe(s), {} positive\n",
            self.decide(),
            self.evaluated.len(),
            self.evidence.len()
        );
        for e in &self.evidence {
            s.push_str(&format!("  {}: {}\n", e.source, e.details));
        }
        s
    }
}

/// Composes probe outcomes into verdicts for one probe set.
pub struct DecisionEngine<'a, P: SecurityProbeSet + ?Sized> {
    probes: &'a P,
}

impl<'a, P: SecurityProbeSet + ?Sized> DecisionEngine<'a, P> {
    pub fn new(probes: &'a P) -> Self {
        Self { probes }
    }

    /// "Everything is fine" aggregate.
    ///
    /// Runs [`HEALTH_CHECK_ORDER`] and returns at the first unhealthy
    /// probe; later probes are not invoked.
    pub fn run_health_checks(&self) -> Assessment {
        let mut assessment = Assessment::default();
        for source in HEALTH_CHECK_ORDER {
            if assessment.report(source, self.probes.probe(source)) {
                return assessment;
            }
        }
        info!("[ENGINE] all health checks passed");
        assessment
    }

    /// "Device is rooted/jailbroken" aggregate.
    ///
    /// Every check of the platform policy is evaluated, even after a hit,
    /// so the assessment lists every signal that fired.
    pub fn run_compromise_checks(&self) -> Assessment {
        self.run_all(self.probes.compromise_checks())
    }

    /// Instrumentation footprint aggregate, all checks evaluated.
    pub fn run_anti_instrumentation(&self) -> Assessment {
        self.run_all(&ANTI_INSTRUMENTATION_CHECKS)
    }

    fn run_all(&self, sources: &[DetectionSource]) -> Assessment {
        let mut assessment = Assessment::default();
        for &source in sources {
            assessment.report(source, self.probes.probe(source));
        }
        assessment
    }
}
