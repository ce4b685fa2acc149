// src/rl/policy.rs
//
// Policies that choose integer actions for the trained agent.
//
// Learned policies live outside this crate; the ones here are baselines used
// by the evaluator and the CLI:
// - RandomPolicy: uniform over the currently unmasked actions
// - FixedPolicy: always the same action (e.g. blue "nothing")

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Current baseline policy version.
pub const BASELINE_POLICY_VERSION: &str = "baseline-v1.0.0";

/// Interface for anything that maps an observation to an action.
pub trait Policy: Send {
    /// Unique version string for this policy implementation.
    fn version(&self) -> &str;

    /// Optional policy ID (e.g., model checkpoint name).
    fn policy_id(&self) -> Option<&str> {
        None
    }

    /// Choose an action. `mask[i]` is true where action `i` is currently useful.
    fn act(&mut self, observation: &[i64], mask: &[bool]) -> usize;

    /// Called at the start of each episode with that episode's seed.
    fn reset_episode(&mut self, seed: u64, episode_id: u64);
}

/// Uniform choice among unmasked actions, reseeded per episode.
pub struct RandomPolicy {
    rng: ChaCha8Rng,
    scratch: Vec<usize>,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            scratch: Vec::new(),
        }
    }
}

impl Policy for RandomPolicy {
    fn version(&self) -> &str {
        BASELINE_POLICY_VERSION
    }

    fn policy_id(&self) -> Option<&str> {
        Some("random")
    }

    fn act(&mut self, _observation: &[i64], mask: &[bool]) -> usize {
        self.scratch.clear();
        self.scratch
            .extend(mask.iter().enumerate().filter(|(_, &m)| m).map(|(i, _)| i));
        // Fully masked: fall back to the first action.
        self.scratch.choose(&mut self.rng).copied().unwrap_or(0)
    }

    fn reset_episode(&mut self, seed: u64, episode_id: u64) {
        // Offset from the env seed so policy and env streams differ.
        self.rng = ChaCha8Rng::seed_from_u64(seed ^ 0x9e37_79b9_7f4a_7c15 ^ episode_id);
    }
}

/// Always emits the same action.
#[derive(Debug, Clone, Copy)]
pub struct FixedPolicy {
    action: usize,
}

impl FixedPolicy {
    pub fn new(action: usize) -> Self {
        Self { action }
    }
}

impl Policy for FixedPolicy {
    fn version(&self) -> &str {
        BASELINE_POLICY_VERSION
    }

    fn policy_id(&self) -> Option<&str> {
        Some("fixed")
    }

    fn act(&mut self, _observation: &[i64], _mask: &[bool]) -> usize {
        self.action
    }

    fn reset_episode(&mut self, _seed: u64, _episode_id: u64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_policy_respects_mask() {
        let mut policy = RandomPolicy::new(1);
        let mask = [false, true, false, true, false];
        for _ in 0..50 {
            let a = policy.act(&[], &mask);
            assert!(a == 1 || a == 3);
        }
    }

    #[test]
    fn test_random_policy_fully_masked_falls_back() {
        let mut policy = RandomPolicy::new(1);
        assert_eq!(policy.act(&[], &[false, false]), 0);
    }

    #[test]
    fn test_random_policy_is_reproducible_per_episode() {
        let mask = [true; 10];
        let mut a = RandomPolicy::new(0);
        let mut b = RandomPolicy::new(99);
        a.reset_episode(5, 2);
        b.reset_episode(5, 2);
        let xs: Vec<usize> = (0..20).map(|_| a.act(&[], &mask)).collect();
        let ys: Vec<usize> = (0..20).map(|_| b.act(&[], &mask)).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_fixed_policy() {
        let mut policy = FixedPolicy::new(4);
        assert_eq!(policy.act(&[1, 2], &[false; 8]), 4);
        assert_eq!(policy.policy_id(), Some("fixed"));
    }
}
