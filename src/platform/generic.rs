use crate::detectors::ProbeResult;
use crate::engine::config::ShieldConfig;
use crate::engine::policy::DetectionSource;
use crate::platform::{evaluate, Platform, SecurityProbeSet};

/// Desktop and server targets. Individual probes still work, but there is
/// no root/jailbreak policy: the compromise verdict is always negative.
#[derive(Debug, Clone, Default)]
pub struct GenericProbes {
    config: ShieldConfig,
}

impl GenericProbes {
    pub fn new(config: ShieldConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }
}

impl SecurityProbeSet for GenericProbes {
    fn platform(&self) -> Platform {
        Platform::Other
    }

    fn compromise_checks(&self) -> &[DetectionSource] {
        &[]
    }

    fn probe(&self, source: DetectionSource) -> ProbeResult {
        evaluate(&self.config, source)
    }
}
