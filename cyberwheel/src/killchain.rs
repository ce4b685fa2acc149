// src/killchain.rs
//
// Per-host attacker progress and action-validity rules.
//
// Phases are strictly ordered. A phase is valid against a host only when
// every earlier phase has succeeded there and the phase itself has not. An
// invalid attempt is a modeled failure: no state changes and no panic.
//
// Flags are monotonic within an episode. They are only cleared by `reset`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::HostType;

/// The six kill-chain phases, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KillChainPhase {
    PingSweep,
    PortScan,
    Discovery,
    LateralMovement,
    PrivilegeEscalation,
    Impact,
}

impl KillChainPhase {
    pub const ALL: [KillChainPhase; 6] = [
        KillChainPhase::PingSweep,
        KillChainPhase::PortScan,
        KillChainPhase::Discovery,
        KillChainPhase::LateralMovement,
        KillChainPhase::PrivilegeEscalation,
        KillChainPhase::Impact,
    ];

    pub const COUNT: usize = 6;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    /// Reward-table and log name.
    pub fn name(self) -> &'static str {
        match self {
            KillChainPhase::PingSweep => "pingsweep",
            KillChainPhase::PortScan => "portscan",
            KillChainPhase::Discovery => "discovery",
            KillChainPhase::LateralMovement => "lateral-movement",
            KillChainPhase::PrivilegeEscalation => "privilege-escalation",
            KillChainPhase::Impact => "impact",
        }
    }
}

impl std::fmt::Display for KillChainPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What the attacker has learned about a host's role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KnownType {
    #[default]
    Unknown,
    Workstation,
    Server,
}

impl KnownType {
    pub fn code(self) -> i64 {
        match self {
            KnownType::Unknown => 0,
            KnownType::Workstation => 1,
            KnownType::Server => 2,
        }
    }
}

impl From<HostType> for KnownType {
    fn from(t: HostType) -> Self {
        match t {
            HostType::Workstation => KnownType::Workstation,
            HostType::Server => KnownType::Server,
        }
    }
}

/// Attacker knowledge about one host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackState {
    pub known_type: KnownType,
    pub sweeped: bool,
    pub scanned: bool,
    pub discovered: bool,
    pub on_host: bool,
    pub escalated: bool,
    pub impacted: bool,
}

impl AttackState {
    fn flags(&self) -> [bool; 6] {
        [
            self.sweeped,
            self.scanned,
            self.discovered,
            self.on_host,
            self.escalated,
            self.impacted,
        ]
    }

    /// All earlier phases done and this one not yet.
    pub fn is_valid(&self, phase: KillChainPhase) -> bool {
        let flags = self.flags();
        let i = phase.index();
        flags[..i].iter().all(|&f| f) && !flags[i]
    }

    /// Set the flag for a phase. Never clears anything.
    pub fn mark(&mut self, phase: KillChainPhase) {
        match phase {
            KillChainPhase::PingSweep => self.sweeped = true,
            KillChainPhase::PortScan => self.scanned = true,
            KillChainPhase::Discovery => self.discovered = true,
            KillChainPhase::LateralMovement => self.on_host = true,
            KillChainPhase::PrivilegeEscalation => self.escalated = true,
            KillChainPhase::Impact => self.impacted = true,
        }
    }

    /// First phase that is currently valid, if any.
    pub fn next_phase(&self) -> Option<KillChainPhase> {
        KillChainPhase::ALL.into_iter().find(|&p| self.is_valid(p))
    }

    /// Observation window: type code followed by the six flags.
    pub fn window(&self) -> [i64; 7] {
        let f = self.flags();
        [
            self.known_type.code(),
            f[0] as i64,
            f[1] as i64,
            f[2] as i64,
            f[3] as i64,
            f[4] as i64,
            f[5] as i64,
        ]
    }
}

/// Tracked attacker view of the network.
#[derive(Debug, Clone)]
pub struct KillChainStateMachine {
    /// (host name, state) in first-seen order.
    views: Vec<(String, AttackState)>,
    index: HashMap<String, usize>,
    max_tracked: usize,
    current_host: String,
}

impl KillChainStateMachine {
    pub fn new(max_tracked: usize) -> Self {
        Self {
            views: Vec::with_capacity(max_tracked),
            index: HashMap::with_capacity(max_tracked),
            max_tracked,
            current_host: String::new(),
        }
    }

    /// Forget everything and start on the entry host.
    pub fn reset(&mut self, entry_host: &str) {
        self.views.clear();
        self.index.clear();
        self.current_host = entry_host.to_string();
        if let Some(i) = self.track(entry_host, false) {
            self.views[i].1.on_host = true;
        }
    }

    /// Start tracking a host. Returns its slot, or None when the bound is hit.
    ///
    /// Already-tracked hosts keep their state; `sweeped` only ever turns on.
    pub fn track(&mut self, host: &str, sweeped: bool) -> Option<usize> {
        if let Some(&i) = self.index.get(host) {
            if sweeped {
                self.views[i].1.sweeped = true;
            }
            return Some(i);
        }
        if self.views.len() >= self.max_tracked {
            log::debug!("tracked host bound {} reached; ignoring {}", self.max_tracked, host);
            return None;
        }
        let i = self.views.len();
        let state = AttackState {
            sweeped,
            ..AttackState::default()
        };
        self.views.push((host.to_string(), state));
        self.index.insert(host.to_string(), i);
        Some(i)
    }

    pub fn is_tracked(&self, host: &str) -> bool {
        self.index.contains_key(host)
    }

    pub fn is_valid(&self, host: &str, phase: KillChainPhase) -> bool {
        self.state(host).is_some_and(|s| s.is_valid(phase))
    }

    /// Record a successful phase against a host.
    ///
    /// `host_type` is only read for Discovery. Lateral movement relocates the
    /// attacker but leaves the source host's flags untouched.
    pub fn advance(&mut self, host: &str, phase: KillChainPhase, host_type: HostType) {
        let Some(&i) = self.index.get(host) else {
            return;
        };
        let state = &mut self.views[i].1;
        state.mark(phase);
        match phase {
            KillChainPhase::Discovery => state.known_type = host_type.into(),
            KillChainPhase::LateralMovement => self.current_host = host.to_string(),
            _ => {}
        }
    }

    pub fn state(&self, host: &str) -> Option<&AttackState> {
        self.index.get(host).map(|&i| &self.views[i].1)
    }

    /// Host name at an action-space slot.
    pub fn host_at(&self, slot: usize) -> Option<&str> {
        self.views.get(slot).map(|(name, _)| name.as_str())
    }

    pub fn views(&self) -> &[(String, AttackState)] {
        &self.views
    }

    pub fn num_tracked(&self) -> usize {
        self.views.len()
    }

    pub fn max_tracked(&self) -> usize {
        self.max_tracked
    }

    pub fn current_host(&self) -> &str {
        &self.current_host
    }
}
