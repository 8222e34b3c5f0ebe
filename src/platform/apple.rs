use crate::detectors::ProbeResult;
use crate::engine::config::ShieldConfig;
use crate::engine::policy::DetectionSource;
use crate::platform::{evaluate, Platform, SecurityProbeSet};

/// Jailbreak and instrumentation signals OR-ed into the Apple verdict.
pub const APPLE_COMPROMISE_CHECKS: [DetectionSource; 6] = [
    DetectionSource::JailbreakArtifacts,
    DetectionSource::SandboxEscape,
    DetectionSource::ExportedSymbols,
    DetectionSource::InstrumentationEnv,
    DetectionSource::InstrumentationFiles,
    DetectionSource::Debugger,
];

#[derive(Debug, Clone, Default)]
pub struct AppleProbes {
    config: ShieldConfig,
}

impl AppleProbes {
    pub fn new(config: ShieldConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }
}

impl SecurityProbeSet for AppleProbes {
    fn platform(&self) -> Platform {
        Platform::Apple
    }

    fn compromise_checks(&self) -> &[DetectionSource] {
        &APPLE_COMPROMISE_CHECKS
    }

    fn probe(&self, source: DetectionSource) -> ProbeResult {
        match source {
            // No procfs here. Code signing pins the bundle identity instead.
            DetectionSource::ProcessIdentity => ProbeResult::clear(),
            _ => evaluate(&self.config, source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_always_healthy() {
        let probes = AppleProbes::new(ShieldConfig::default().with_trusted_identity("nope"));
        assert!(!probes.probe(DetectionSource::ProcessIdentity).detected);
    }

    #[test]
    fn test_policy_covers_jailbreak_signals() {
        let checks = AppleProbes::default().compromise_checks().to_vec();
        assert_eq!(checks.len(), 6);
        assert!(checks.contains(&DetectionSource::SandboxEscape));
        assert!(!checks.contains(&DetectionSource::RootBinaries));
    }
}
