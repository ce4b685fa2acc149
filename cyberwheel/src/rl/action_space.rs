// src/rl/action_space.rs
//
// Discrete action encodings for both agents.
//
// Layouts:
// - Blue: action = subnet_index * num_action_types + action_type_index
// - Red:  action = host_slot * 6 + phase_index
//
// The red space is sized for the maximum number of trackable hosts so the
// policy head never changes shape; slots that are not populated yet decode
// to an invalid attempt rather than an error.

use serde::{Deserialize, Serialize};

use crate::killchain::{KillChainPhase, KillChainStateMachine};

/// Current action encoding version.
/// Increment when changing either layout.
pub const ACTION_VERSION: u32 = 1;

/// Blue agent action layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlueActionSpace {
    pub version: u32,
    pub num_subnets: usize,
    pub num_action_types: usize,
}

impl BlueActionSpace {
    pub fn new(num_subnets: usize, num_action_types: usize) -> Self {
        Self {
            version: ACTION_VERSION,
            num_subnets,
            num_action_types,
        }
    }

    pub fn size(&self) -> usize {
        self.num_subnets * self.num_action_types
    }

    /// Split an action into (subnet index, action type index).
    ///
    /// Panics if the action is outside the space; policies are expected to
    /// sample from `size()`.
    pub fn decode(&self, action: usize) -> (usize, usize) {
        assert!(
            action < self.size(),
            "blue action {} outside action space of size {}",
            action,
            self.size()
        );
        (action / self.num_action_types, action % self.num_action_types)
    }

    pub fn encode(&self, subnet: usize, action_type: usize) -> usize {
        subnet * self.num_action_types + action_type
    }
}

/// Red agent action layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedActionSpace {
    pub version: u32,
    pub max_hosts: usize,
}

impl RedActionSpace {
    pub fn new(max_hosts: usize) -> Self {
        Self {
            version: ACTION_VERSION,
            max_hosts,
        }
    }

    /// Largest action index the policy can emit, plus one.
    pub fn max_size(&self) -> usize {
        self.max_hosts * KillChainPhase::COUNT
    }

    /// Split an action into (host slot, phase).
    pub fn decode(&self, action: usize) -> (usize, KillChainPhase) {
        let phase = KillChainPhase::ALL[action % KillChainPhase::COUNT];
        (action / KillChainPhase::COUNT, phase)
    }

    pub fn encode(&self, slot: usize, phase: KillChainPhase) -> usize {
        slot * KillChainPhase::COUNT + phase.index()
    }

    /// `max_size()` flags, true where the kill chain allows the action now.
    pub fn mask(&self, killchain: &KillChainStateMachine) -> Vec<bool> {
        let mut mask = vec![false; self.max_size()];
        for (slot, (_, state)) in killchain.views().iter().enumerate().take(self.max_hosts) {
            for phase in KillChainPhase::ALL {
                mask[self.encode(slot, phase)] = state.is_valid(phase);
            }
        }
        mask
    }
}
