//! Stop policies: when an onboarding conversation stops asking questions
//!
//! Two policies exist side by side and are selected by configuration:
//! - `FixedCap`: hard turn cap plus a probabilistic soft stop inside a window
//! - `CoverageGated`: stop as soon as the coverage evaluator says enough was
//!   covered, with the same hard cap

use crate::models::{CoverageReport, StopReason};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_TURNS: usize = 20;
pub const DEFAULT_SOFT_STOP_START: usize = 15;
pub const DEFAULT_SOFT_STOP_EVERY: usize = 5;
pub const DEFAULT_SOFT_STOP_PROBABILITY: f64 = 0.3;

/// Pacing for the fixed-cap policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftStopConfig {
    pub max_turns: usize,
    /// First answer count at which a soft stop may fire
    pub window_start: usize,
    /// Soft stop is only drawn when the answer count is a multiple of this
    pub every: usize,
    /// Chance that a drawn soft stop fires, 0.0..=1.0
    pub probability: f64,
}

impl Default for SoftStopConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            window_start: DEFAULT_SOFT_STOP_START,
            every: DEFAULT_SOFT_STOP_EVERY,
            probability: DEFAULT_SOFT_STOP_PROBABILITY,
        }
    }
}

impl SoftStopConfig {
    /// Whether `answers` falls on a soft-stop checkpoint
    pub fn in_window(&self, answers: usize) -> bool {
        self.every > 0
            && answers >= self.window_start
            && answers < self.max_turns
            && answers % self.every == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    FixedCap,
    CoverageGated,
}

impl std::str::FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "fixed_cap" | "fixed" => Ok(PolicyKind::FixedCap),
            "coverage_gated" | "coverage" => Ok(PolicyKind::CoverageGated),
            other => Err(format!("Unknown stop policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopPolicy {
    FixedCap(SoftStopConfig),
    CoverageGated { max_turns: usize },
}

impl Default for StopPolicy {
    fn default() -> Self {
        StopPolicy::FixedCap(SoftStopConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDecision {
    Continue,
    Stop(StopReason),
}

impl StopPolicy {
    pub fn from_kind(kind: PolicyKind, soft_stop: SoftStopConfig) -> Self {
        match kind {
            PolicyKind::FixedCap => StopPolicy::FixedCap(soft_stop),
            PolicyKind::CoverageGated => StopPolicy::CoverageGated {
                max_turns: soft_stop.max_turns,
            },
        }
    }

    pub fn max_turns(&self) -> usize {
        match self {
            StopPolicy::FixedCap(config) => config.max_turns,
            StopPolicy::CoverageGated { max_turns } => *max_turns,
        }
    }

    /// Whether the coverage evaluator must be consulted before deciding
    pub fn needs_coverage(&self, answers: usize) -> bool {
        matches!(self, StopPolicy::CoverageGated { .. }) && answers < self.max_turns()
    }

    /// Decide after the user's answer number `answers` has been recorded.
    ///
    /// Reaching the cap always stops, whatever the coverage or the draw.
    pub fn decide(
        &self,
        answers: usize,
        coverage: Option<&CoverageReport>,
        rng: &mut dyn RngCore,
    ) -> StopDecision {
        if answers >= self.max_turns() {
            return StopDecision::Stop(StopReason::Capped);
        }

        match self {
            StopPolicy::FixedCap(config) => {
                if config.in_window(answers) {
                    let draw: f64 = rng.gen();
                    let probability = config.probability.clamp(0.0, 1.0);
                    log::debug!(
                        "Soft stop draw at answer {}: {:.3} (p={})",
                        answers,
                        draw,
                        probability
                    );
                    if draw < probability {
                        return StopDecision::Stop(StopReason::SoftStop);
                    }
                }
                StopDecision::Continue
            }
            StopPolicy::CoverageGated { .. } => match coverage {
                Some(report) if report.enough_to_stop => StopDecision::Stop(StopReason::Covered),
                _ => StopDecision::Continue,
            },
        }
    }
}
