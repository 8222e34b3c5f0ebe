use crate::detectors::ProbeResult;
use crate::engine::config::ShieldConfig;
use crate::engine::policy::DetectionSource;
use crate::platform::{evaluate, Platform, SecurityProbeSet};

/// Root and instrumentation signals OR-ed into the Android verdict.
pub const ANDROID_COMPROMISE_CHECKS: [DetectionSource; 8] = [
    DetectionSource::RootBinaries,
    DetectionSource::DangerousProperties,
    DetectionSource::WritableSystem,
    DetectionSource::RootPackages,
    DetectionSource::InjectedThread,
    DetectionSource::SuspiciousMappings,
    DetectionSource::InstrumentationServer,
    DetectionSource::Debugger,
];

#[derive(Debug, Clone, Default)]
pub struct AndroidProbes {
    config: ShieldConfig,
}

impl AndroidProbes {
    pub fn new(config: ShieldConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }
}

impl SecurityProbeSet for AndroidProbes {
    fn platform(&self) -> Platform {
        Platform::Android
    }

    fn compromise_checks(&self) -> &[DetectionSource] {
        &ANDROID_COMPROMISE_CHECKS
    }

    fn probe(&self, source: DetectionSource) -> ProbeResult {
        evaluate(&self.config, source)
    }
}
