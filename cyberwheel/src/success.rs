// src/success.rs
//
// Red action success models.
//
// The deterministic model always succeeds and never touches the RNG, so
// enabling it keeps trajectories identical to a run without a model. The
// defense-aware model lowers the base success rate of each phase by a
// modifier derived from how heavily the defender has invested.

use std::collections::VecDeque;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::killchain::KillChainPhase;

/// Minimum success probability under any defense level.
pub const SUCCESS_FLOOR: f64 = 0.10;

/// Blue actions remembered for defense scoring.
pub const HISTORY_WINDOW: usize = 50;

/// Recent blue actions inspected by the defense score.
const RECENT_ACTIONS: usize = 5;

/// Coarse defense posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DefenseLevel {
    None,
    Low,
    Medium,
    High,
    Maximum,
}

impl DefenseLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 3.0 {
            DefenseLevel::Maximum
        } else if score >= 2.0 {
            DefenseLevel::High
        } else if score >= 1.0 {
            DefenseLevel::Medium
        } else if score >= 0.5 {
            DefenseLevel::Low
        } else {
            DefenseLevel::None
        }
    }

    /// Probability subtracted from the base rate.
    pub fn modifier(self) -> f64 {
        match self {
            DefenseLevel::None => 0.0,
            DefenseLevel::Low => 0.05,
            DefenseLevel::Medium => 0.15,
            DefenseLevel::High => 0.25,
            DefenseLevel::Maximum => 0.40,
        }
    }
}

/// Defender state visible to the success model.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DefenseContext {
    pub decoys: usize,
    pub isolated: usize,
    /// deploy_decoy / isolate_host among the most recent blue actions.
    pub recent_defensive: usize,
}

impl DefenseContext {
    pub fn score(&self) -> f64 {
        self.decoys.min(3) as f64 * 0.5
            + self.isolated.min(2) as f64 * 0.75
            + self.recent_defensive as f64 * 0.25
    }

    pub fn level(&self) -> DefenseLevel {
        DefenseLevel::from_score(self.score())
    }
}

/// Rolling window of blue action kinds.
#[derive(Debug, Clone, Default)]
pub struct DefenseHistory {
    actions: VecDeque<&'static str>,
}

impl DefenseHistory {
    pub fn record(&mut self, kind: &'static str) {
        if self.actions.len() == HISTORY_WINDOW {
            self.actions.pop_front();
        }
        self.actions.push_back(kind);
    }

    pub fn recent_defensive(&self) -> usize {
        self.actions
            .iter()
            .rev()
            .take(RECENT_ACTIONS)
            .filter(|k| matches!(**k, "deploy_decoy" | "isolate_host"))
            .count()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }
}

/// Decides whether an otherwise valid red action succeeds.
pub trait SuccessModel: Send {
    fn success_probability(&self, phase: KillChainPhase, ctx: &DefenseContext) -> f64;

    fn attempt(&self, phase: KillChainPhase, ctx: &DefenseContext, rng: &mut dyn rand::RngCore)
        -> bool;
}

/// Every valid action succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysSucceed;

impl SuccessModel for AlwaysSucceed {
    fn success_probability(&self, _phase: KillChainPhase, _ctx: &DefenseContext) -> f64 {
        1.0
    }

    fn attempt(&self, _: KillChainPhase, _: &DefenseContext, _: &mut dyn rand::RngCore) -> bool {
        true
    }
}

/// Base rate per phase minus the defense modifier, floored.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefenseAwareSuccess;

impl DefenseAwareSuccess {
    pub fn base_rate(phase: KillChainPhase) -> f64 {
        match phase {
            KillChainPhase::PingSweep => 0.85,
            KillChainPhase::PortScan => 0.75,
            KillChainPhase::Discovery => 0.80,
            KillChainPhase::LateralMovement => 0.65,
            KillChainPhase::PrivilegeEscalation => 0.55,
            KillChainPhase::Impact => 0.70,
        }
    }
}

impl SuccessModel for DefenseAwareSuccess {
    fn success_probability(&self, phase: KillChainPhase, ctx: &DefenseContext) -> f64 {
        (Self::base_rate(phase) - ctx.level().modifier()).max(SUCCESS_FLOOR)
    }

    fn attempt(
        &self,
        phase: KillChainPhase,
        ctx: &DefenseContext,
        rng: &mut dyn rand::RngCore,
    ) -> bool {
        rng.gen::<f64>() < self.success_probability(phase, ctx)
    }
}
