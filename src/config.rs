//! Scheduler tuning knobs.
//!
//! Band boundaries are fixed (see [`crate::sched::band`]); only the aging
//! sweep and burst estimation are tunable.

use crate::errors::{ConfigError, ConfigResult};

/// Default aging credit added per sweep.
pub const DEFAULT_AGING_STEP: u64 = 100;
/// Default credit needed for one priority bump.
pub const DEFAULT_AGING_THRESHOLD: u64 = 1500;
/// Default priority gained per full threshold.
pub const DEFAULT_AGING_BONUS: i32 = 10;
/// Default number of ticks between aging sweeps.
pub const DEFAULT_AGING_INTERVAL_TICKS: u64 = 100;
/// Default weight of the last burst in the burst estimate.
pub const DEFAULT_BURST_WEIGHT_PERCENT: u8 = 50;

/// Configuration for [`Scheduler`](crate::sched::Scheduler) and
/// [`Kernel`](crate::kernel::Kernel).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedConfig {
    /// Aging credit added to every waiting L2/L3 thread per sweep
    pub aging_step: u64,
    /// Credit that converts into one priority bump
    pub aging_threshold: u64,
    /// Priority added per converted threshold
    pub aging_bonus: i32,
    /// Ticks between two aging sweeps
    pub aging_interval_ticks: u64,
    /// Weight (percent) of the measured burst when re-estimating
    pub burst_weight_percent: u8,
}

impl SchedConfig {
    /// Configuration with the stock values.
    pub const fn new() -> Self {
        Self {
            aging_step: DEFAULT_AGING_STEP,
            aging_threshold: DEFAULT_AGING_THRESHOLD,
            aging_bonus: DEFAULT_AGING_BONUS,
            aging_interval_ticks: DEFAULT_AGING_INTERVAL_TICKS,
            burst_weight_percent: DEFAULT_BURST_WEIGHT_PERCENT,
        }
    }

    /// Set the per-sweep aging step.
    pub const fn aging_step(mut self, step: u64) -> Self {
        self.aging_step = step;
        self
    }

    /// Set the aging threshold.
    pub const fn aging_threshold(mut self, threshold: u64) -> Self {
        self.aging_threshold = threshold;
        self
    }

    /// Set the priority bonus per threshold.
    pub const fn aging_bonus(mut self, bonus: i32) -> Self {
        self.aging_bonus = bonus;
        self
    }

    /// Set the number of ticks between aging sweeps.
    pub const fn aging_interval_ticks(mut self, ticks: u64) -> Self {
        self.aging_interval_ticks = ticks;
        self
    }

    /// Set the burst estimate weight.
    pub const fn burst_weight_percent(mut self, weight: u8) -> Self {
        self.burst_weight_percent = weight;
        self
    }

    /// Check every field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.aging_step == 0 {
            return Err(ConfigError::ZeroAgingStep);
        }
        if self.aging_threshold == 0 {
            return Err(ConfigError::ZeroAgingThreshold);
        }
        if self.aging_bonus <= 0 {
            return Err(ConfigError::ZeroAgingBonus);
        }
        if self.aging_interval_ticks == 0 {
            return Err(ConfigError::ZeroAgingInterval);
        }
        if self.burst_weight_percent > 100 {
            return Err(ConfigError::InvalidBurstWeight(self.burst_weight_percent));
        }
        Ok(())
    }

    /// New burst estimate from the previous estimate and the burst just measured.
    pub fn estimate_burst(&self, previous: u64, measured: u64) -> u64 {
        let w = u64::from(self.burst_weight_percent);
        (w * measured + (100 - w) * previous) / 100
    }
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self::new()
    }
}
