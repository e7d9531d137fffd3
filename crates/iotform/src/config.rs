//! Reconciler configuration.
use snafu::ResultExt;

use crate::{DeserializeSnafu, Result};

/// Bounds on polling a deleted resource until it is no longer describable.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StabilizationConfig {
    /// Probes issued within one invocation before handing back to the framework.
    pub max_attempts: u32,
    pub initial_delay_millis: u64,
    pub max_delay_millis: u64,
    /// Delay requested from the framework when polling ran out within an invocation.
    pub reinvocation_delay_seconds: u32,
    /// Re-invocations tolerated before the delete is reported as failed.
    pub max_reinvocations: u32,
}

impl Default for StabilizationConfig {
    fn default() -> Self {
        StabilizationConfig {
            max_attempts: 5,
            initial_delay_millis: 500,
            max_delay_millis: 8_000,
            reinvocation_delay_seconds: 30,
            max_reinvocations: 10,
        }
    }
}

impl StabilizationConfig {
    /// Delay before the given (zero based) probe attempt.
    pub fn delay(&self, attempt: u32) -> std::time::Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let millis = self
            .initial_delay_millis
            .saturating_mul(factor)
            .min(self.max_delay_millis);
        std::time::Duration::from_millis(millis)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconcilerConfig {
    pub stabilization: StabilizationConfig,
}

impl ReconcilerConfig {
    /// Reads a configuration from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context(DeserializeSnafu {
            name: "reconciler config",
        })
    }
}
