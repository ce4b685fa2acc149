// src/rl/reward.rs
//
// Reward shaping for the blue/red engagement.
//
//   reward = sign * (red_term + blue_term + objective_bonus + recurring_sum)
//
// - red_term: -immediate(red) for a successful red action on a valid real
//   target, +10 * immediate(red) for a successful red action on a decoy.
// - blue_term: immediate(blue) on success, scaled by the proactive
//   multiplier when that reward function is selected. Failed blue actions
//   contribute nothing.
// - recurring_sum: every open ledger entry's configured recurring value.
// - sign: +1 when blue is trained, -1 when red is trained.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::blue_actions::BlueActionKind;
use crate::config::{
    EnvConfig, Objective, RewardEntry, RewardFunction, ValidTargetClass, ValidTargets,
};
use crate::killchain::KillChainPhase;
use crate::network::NetworkModel;
use crate::types::Recurring;

/// Ledger id used for red recurring entries.
pub const RED_LEDGER_ID: &str = "0";

/// Bonus for a successful red action on a decoy under the delay objective.
pub const DELAY_BONUS: f64 = 40.0;

/// Scale applied to red rewards earned on decoys.
pub const DECOY_HIT_SCALE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerSide {
    Blue,
    Red,
}

/// One open recurring obligation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringAction {
    pub id: String,
    pub action: String,
    pub side: LedgerSide,
}

/// Open recurring obligations, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct RecurringLedger {
    entries: Vec<RecurringAction>,
}

impl RecurringLedger {
    pub fn add(&mut self, id: &str, action: &str, side: LedgerSide) {
        self.entries.push(RecurringAction {
            id: id.to_string(),
            action: action.to_string(),
            side,
        });
    }

    /// Remove the first blue entry with this id. Returns whether one existed.
    pub fn remove(&mut self, id: &str) -> bool {
        match self
            .entries
            .iter()
            .position(|e| e.side == LedgerSide::Blue && e.id == id)
        {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn entries(&self) -> &[RecurringAction] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Sum of configured recurring values of every open entry.
    pub fn sum(
        &self,
        blue: &HashMap<String, RewardEntry>,
        red: &HashMap<String, RewardEntry>,
    ) -> f64 {
        self.entries
            .iter()
            .map(|e| {
                let table = match e.side {
                    LedgerSide::Blue => blue,
                    LedgerSide::Red => red,
                };
                table.get(&e.action).map(|r| r.recurring).unwrap_or_else(|| {
                    panic!("ledger entry for unknown action '{}'", e.action)
                })
            })
            .sum()
    }
}

/// Everything the calculator needs to know about one step.
#[derive(Debug, Clone)]
pub struct RewardInputs<'a> {
    /// Kill-chain phase attempted, None for a red no-op.
    pub red_phase: Option<KillChainPhase>,
    pub red_success: bool,
    pub target_host: &'a str,
    pub target_is_decoy: bool,
    /// Configured blue action name.
    pub blue_action: &'a str,
    pub blue_kind: BlueActionKind,
    pub blue_success: bool,
    pub blue_id: &'a str,
    pub blue_recurring: Recurring,
    pub headstart: bool,
    /// Global decoy count after both agents acted.
    pub num_decoys: usize,
    pub impacted_decoys: usize,
}

/// Per-step reward decomposition, logged alongside the scalar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub red_term: f64,
    pub blue_term: f64,
    pub blue_multiplier: f64,
    pub objective_bonus: f64,
    pub recurring_term: f64,
    pub sign: f64,
    pub impacted_decoys: usize,
    pub total: f64,
}

/// Combines immediate and recurring terms into the training signal.
#[derive(Debug, Clone)]
pub struct RewardCalculator {
    function: RewardFunction,
    objective: Objective,
    decoy_limit: usize,
    post_play: bool,
    sign: f64,
    blue_rewards: HashMap<String, RewardEntry>,
    red_rewards: HashMap<String, RewardEntry>,
    valid_targets: HashSet<String>,
    ledger: RecurringLedger,
}

impl RewardCalculator {
    pub fn new(
        cfg: &EnvConfig,
        net: &NetworkModel,
        blue_rewards: HashMap<String, RewardEntry>,
    ) -> Self {
        let red_rewards = KillChainPhase::ALL
            .iter()
            .map(|&p| (p.name().to_string(), cfg.red_reward(p)))
            .collect();
        let valid_targets = match &cfg.valid_targets {
            ValidTargets::Named(ValidTargetClass::Servers) => {
                net.server_hosts().into_iter().map(str::to_string).collect()
            }
            ValidTargets::Named(ValidTargetClass::Users) => {
                net.user_hosts().into_iter().map(str::to_string).collect()
            }
            ValidTargets::Named(ValidTargetClass::All) => net.hosts()[..net.num_base_hosts()]
                .iter()
                .map(|h| h.name.clone())
                .collect(),
            ValidTargets::Hosts(hosts) => hosts.iter().cloned().collect(),
        };
        Self {
            function: cfg.reward_function,
            objective: cfg.objective,
            decoy_limit: cfg.decoy_limit,
            post_play: cfg.post_play,
            sign: if cfg.train_red { -1.0 } else { 1.0 },
            blue_rewards,
            red_rewards,
            valid_targets,
            ledger: RecurringLedger::default(),
        }
    }

    pub fn reset(&mut self) {
        self.ledger.clear();
    }

    pub fn ledger(&self) -> &RecurringLedger {
        &self.ledger
    }

    pub fn sign(&self) -> f64 {
        self.sign
    }

    /// Proactive multiplier for a successful blue action.
    pub fn proactive_multiplier(
        &self,
        kind: BlueActionKind,
        num_decoys: usize,
        headstart: bool,
    ) -> f64 {
        if kind != BlueActionKind::DeployDecoyHost {
            return 1.0;
        }
        if num_decoys >= self.decoy_limit {
            3.0
        } else if headstart {
            -3.0
        } else if self.post_play {
            1.0
        } else {
            60.0
        }
    }

    fn objective_bonus(&self, red_hit_decoy: bool) -> f64 {
        match self.objective {
            Objective::Delay if red_hit_decoy => DELAY_BONUS,
            Objective::Delay | Objective::Downtime | Objective::Detect | Objective::General => 0.0,
        }
    }

    /// Compute the step reward and update the ledger.
    pub fn calculate(&mut self, input: &RewardInputs<'_>) -> RewardBreakdown {
        // Red term.
        let mut red_term = 0.0;
        if let (Some(phase), true) = (input.red_phase, input.red_success) {
            let entry = self.red_rewards[phase.name()];
            let scale = if input.target_is_decoy {
                Some(DECOY_HIT_SCALE)
            } else if self.valid_targets.contains(input.target_host) {
                Some(-1.0)
            } else {
                None
            };
            if let Some(scale) = scale {
                red_term = entry.immediate * scale;
                if entry.recurring * scale != 0.0 {
                    self.ledger.add(RED_LEDGER_ID, phase.name(), LedgerSide::Red);
                }
            }
        }

        // Blue term.
        let blue_entry = match self.blue_rewards.get(input.blue_action) {
            Some(entry) => *entry,
            None => panic!("unknown blue action '{}'", input.blue_action),
        };
        let mut blue_multiplier = 1.0;
        let mut objective_bonus = 0.0;
        if self.function == RewardFunction::Proactive {
            objective_bonus = self.objective_bonus(input.red_success && input.target_is_decoy);
            if input.blue_success {
                blue_multiplier =
                    self.proactive_multiplier(input.blue_kind, input.num_decoys, input.headstart);
            }
        }
        let blue_term = if input.blue_success {
            blue_entry.immediate * blue_multiplier
        } else {
            0.0
        };

        // Ledger bookkeeping before summing.
        if input.blue_success {
            match input.blue_recurring {
                Recurring::Add => self.ledger.add(input.blue_id, input.blue_action, LedgerSide::Blue),
                Recurring::Remove => {
                    self.ledger.remove(input.blue_id);
                }
                Recurring::None => {}
            }
        }
        let recurring_term = self.ledger.sum(&self.blue_rewards, &self.red_rewards);

        let total = self.sign * (red_term + blue_term + objective_bonus + recurring_term);
        RewardBreakdown {
            red_term,
            blue_term,
            blue_multiplier,
            objective_bonus,
            recurring_term,
            sign: self.sign,
            impacted_decoys: input.impacted_decoys,
            total,
        }
    }
}
