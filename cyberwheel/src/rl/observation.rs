// src/rl/observation.rs
//
// Fixed-length observation vectors for both agents.
//
// Blue layout (length 2H + 2, H = non-decoy hosts at build):
//   [0, H)      alert bits for the current step
//   [H, 2H)     history bits, set once a host alerts, cleared only on reset
//   2H          headstart indicator (-1 standard; 1 during headstart, else 0)
//   2H + 1      number of deployed decoys
//
// Red layout (length 7 * max_tracked_hosts):
//   one 7-slot window per tracked host in first-seen order:
//   [type, sweeped, scanned, discovered, on_host, escalated, impacted]
//   type: 0 unknown, 1 workstation, 2 server. Unused windows stay zero.
//
// Lengths never change within an episode; decoys appear only through the
// decoy counter (blue) or as extra windows inside the preallocated buffer (red).

use std::collections::HashMap;

use crate::killchain::KillChainStateMachine;
use crate::network::NetworkModel;
use crate::types::Alert;

/// Current observation schema version.
/// Increment when adding/removing/changing slots.
pub const OBS_VERSION: u32 = 1;

/// Slots per tracked host in the red observation.
pub const RED_WINDOW: usize = 7;

/// Which blue indicator convention to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlueObsMode {
    Standard,
    Proactive,
}

/// Blue agent observation.
#[derive(Debug, Clone)]
pub struct BlueObservation {
    mode: BlueObsMode,
    /// Stable host -> index map built once from the base network.
    mapping: HashMap<String, usize>,
    num_hosts: usize,
    vec: Vec<i64>,
}

impl BlueObservation {
    /// Build the host mapping. Sorted by name when `deterministic`.
    pub fn new(net: &NetworkModel, deterministic: bool, mode: BlueObsMode) -> Self {
        let mut names: Vec<&str> = net.hosts()[..net.num_base_hosts()]
            .iter()
            .map(|h| h.name.as_str())
            .collect();
        if deterministic {
            names.sort_unstable();
        }
        let mapping: HashMap<String, usize> = names
            .into_iter()
            .enumerate()
            .map(|(i, n)| (n.to_string(), i))
            .collect();
        let num_hosts = mapping.len();
        Self {
            mode,
            mapping,
            num_hosts,
            vec: vec![0; 2 * num_hosts + 2],
        }
    }

    pub fn len(&self) -> usize {
        self.vec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }

    pub fn index_of(&self, host: &str) -> Option<usize> {
        self.mapping.get(host).copied()
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.vec
    }

    /// Zero everything and write the indicator for the first step.
    pub fn reset(&mut self, headstart: bool) -> Vec<i64> {
        self.vec.iter_mut().for_each(|v| *v = 0);
        let h = self.num_hosts;
        self.vec[2 * h] = self.indicator(headstart);
        self.vec.clone()
    }

    fn indicator(&self, headstart: bool) -> i64 {
        match (self.mode, headstart) {
            (BlueObsMode::Standard, _) => -1,
            (BlueObsMode::Proactive, true) => 1,
            (BlueObsMode::Proactive, false) => 0,
        }
    }

    /// Rebuild the vector from this step's alerts.
    ///
    /// During a proactive headstart the whole vector is zeroed and alerts are
    /// ignored.
    pub fn update(&mut self, alerts: &[Alert], num_decoys: usize, headstart: bool) -> Vec<i64> {
        let h = self.num_hosts;
        if self.mode == BlueObsMode::Proactive && headstart {
            self.vec.iter_mut().for_each(|v| *v = 0);
        } else {
            self.vec[..h].iter_mut().for_each(|v| *v = 0);
            for alert in alerts {
                // Decoys and unknown hosts have no slot.
                if let Some(&i) = self.mapping.get(&alert.src_host) {
                    self.vec[i] = 1;
                    self.vec[h + i] = 1;
                }
            }
        }
        self.vec[2 * h] = self.indicator(headstart);
        self.vec[2 * h + 1] = num_decoys as i64;
        self.vec.clone()
    }
}

/// Red agent observation, preallocated for the tracked-host bound.
#[derive(Debug, Clone)]
pub struct RedObservation {
    vec: Vec<i64>,
    max_hosts: usize,
}

impl RedObservation {
    pub fn new(max_hosts: usize) -> Self {
        Self {
            vec: vec![0; RED_WINDOW * max_hosts],
            max_hosts,
        }
    }

    pub fn len(&self) -> usize {
        self.vec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.vec
    }

    pub fn reset(&mut self, killchain: &KillChainStateMachine) -> Vec<i64> {
        self.vec.iter_mut().for_each(|v| *v = 0);
        self.update(killchain)
    }

    /// Rewrite each tracked host's window in place.
    pub fn update(&mut self, killchain: &KillChainStateMachine) -> Vec<i64> {
        for (slot, (_, state)) in killchain.views().iter().enumerate().take(self.max_hosts) {
            let offset = slot * RED_WINDOW;
            self.vec[offset..offset + RED_WINDOW].copy_from_slice(&state.window());
        }
        self.vec.clone()
    }
}
