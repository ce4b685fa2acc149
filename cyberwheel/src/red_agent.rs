// src/red_agent.rs
//
// Red agents.
//
// Both agents share `RedCore`, which owns the kill-chain view, resolves the
// entry host, executes one phase against one target and applies the
// side-effects of a success. They differ only in how the (phase, target)
// pair is chosen:
// - RlRedAgent decodes an integer action over tracked hosts x phases.
// - ScriptedRedAgent picks the next valid phase on a target chosen by its
//   strategy. Used as the opponent when blue is trained.

use rand::seq::SliceRandom;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::config::{RedAgentConfig, RedStrategy, SuccessModelKind};
use crate::killchain::{KillChainPhase, KillChainStateMachine, KnownType};
use crate::network::NetworkModel;
use crate::rl::action_space::RedActionSpace;
use crate::success::{AlwaysSucceed, DefenseAwareSuccess, DefenseContext, SuccessModel};

/// What one red turn did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedOutcome {
    /// None for a no-op turn.
    pub phase: Option<KillChainPhase>,
    pub src_host: String,
    pub target_host: String,
    /// The attempt passed the kill-chain and reachability checks.
    pub valid: bool,
    pub success: bool,
    pub target_is_decoy: bool,
    /// Hosts revealed by a successful ping sweep.
    pub swept_hosts: Vec<String>,
}

impl RedOutcome {
    /// A turn where red did nothing.
    pub fn nothing(current_host: &str) -> Self {
        Self {
            phase: None,
            src_host: current_host.to_string(),
            target_host: current_host.to_string(),
            valid: false,
            success: false,
            target_is_decoy: false,
            swept_hosts: Vec::new(),
        }
    }

    pub fn executed(&self) -> bool {
        self.phase.is_some() && self.valid
    }

    pub fn action_name(&self) -> &'static str {
        self.phase.map(KillChainPhase::name).unwrap_or("nothing")
    }

    pub fn is_successful_impact(&self) -> bool {
        self.success && self.phase == Some(KillChainPhase::Impact)
    }
}

pub trait RedAgent: Send {
    fn reset(&mut self, net: &NetworkModel, rng: &mut dyn RngCore);

    /// Take one turn. `action` is ignored by agents that choose for themselves.
    fn act(
        &mut self,
        action: Option<usize>,
        net: &mut NetworkModel,
        defense: &DefenseContext,
        rng: &mut dyn RngCore,
    ) -> RedOutcome;

    fn killchain(&self) -> &KillChainStateMachine;

    /// Number of valid integer actions right now.
    fn action_space_size(&self) -> usize {
        self.killchain().num_tracked() * KillChainPhase::COUNT
    }
}

pub fn build_success_model(kind: SuccessModelKind) -> Box<dyn SuccessModel> {
    match kind {
        SuccessModelKind::Always => Box::new(AlwaysSucceed),
        SuccessModelKind::DefenseAware => Box::new(DefenseAwareSuccess),
    }
}

/// Shared red state and phase execution.
pub struct RedCore {
    entry_host: String,
    killchain: KillChainStateMachine,
    success: Box<dyn SuccessModel>,
    /// Network hosts already offered to the kill-chain view.
    seen_hosts: usize,
}

impl RedCore {
    pub fn new(cfg: &RedAgentConfig, max_tracked: usize, success: Box<dyn SuccessModel>) -> Self {
        Self {
            entry_host: cfg.entry_host.clone(),
            killchain: KillChainStateMachine::new(max_tracked),
            success,
            seen_hosts: 0,
        }
    }

    pub fn reset(&mut self, net: &NetworkModel, rng: &mut dyn RngCore) {
        let entry = if self.entry_host.eq_ignore_ascii_case("random") {
            net.random_user_host(rng)
                .map(str::to_string)
                .unwrap_or_else(|| net.host(0).name.clone())
        } else {
            self.entry_host.clone()
        };
        self.killchain.reset(&entry);
        self.seen_hosts = net.num_hosts();
    }

    /// Track hosts that appeared since the last turn (deployed decoys).
    ///
    /// They are treated as already swept.
    pub fn sync_network(&mut self, net: &NetworkModel) {
        for idx in self.seen_hosts..net.num_hosts() {
            let host = net.host(idx);
            if host.attached {
                self.killchain.track(&host.name, true);
            }
        }
        self.seen_hosts = net.num_hosts();
    }

    /// Attempt `phase` against `target`.
    pub fn execute(
        &mut self,
        phase: KillChainPhase,
        target: &str,
        net: &mut NetworkModel,
        defense: &DefenseContext,
        rng: &mut dyn RngCore,
    ) -> RedOutcome {
        let src = self.killchain.current_host().to_string();
        let mut outcome = RedOutcome {
            phase: Some(phase),
            src_host: src.clone(),
            target_host: target.to_string(),
            valid: false,
            success: false,
            target_is_decoy: false,
            swept_hosts: Vec::new(),
        };
        let Some(t_idx) = net.host_idx(target) else {
            return outcome;
        };
        let host = net.host(t_idx);
        outcome.target_is_decoy = host.decoy;

        let src_isolated = net.host_by_name(&src).is_some_and(|h| h.isolated);
        let reachable = host.attached && (target == src || !(host.isolated || src_isolated));
        if !reachable || !self.killchain.is_valid(target, phase) {
            return outcome;
        }
        outcome.valid = true;
        if !self.success.attempt(phase, defense, rng) {
            return outcome;
        }
        outcome.success = true;

        let host_type = host.host_type;
        let target_subnet = host.subnet;
        self.killchain.advance(target, phase, host_type);
        match phase {
            KillChainPhase::PingSweep => {
                // An isolated attacker only sees its own host.
                let revealed: Vec<(String, bool)> = if src_isolated {
                    vec![(src, true)]
                } else {
                    net.reachable_hosts()
                        .map(|i| {
                            let h = net.host(i);
                            (h.name.clone(), h.subnet == target_subnet)
                        })
                        .collect()
                };
                for (name, same_subnet) in revealed {
                    let newly = !self.killchain.is_tracked(&name);
                    if self.killchain.track(&name, same_subnet).is_some() && newly {
                        outcome.swept_hosts.push(name);
                    }
                }
            }
            KillChainPhase::Impact => net.mark_compromised(t_idx),
            _ => {}
        }
        outcome
    }

    pub fn killchain(&self) -> &KillChainStateMachine {
        &self.killchain
    }
}

/// Red agent driven by an external policy.
pub struct RlRedAgent {
    core: RedCore,
    action_space: RedActionSpace,
}

impl RlRedAgent {
    pub fn new(cfg: &RedAgentConfig, max_tracked: usize, success: Box<dyn SuccessModel>) -> Self {
        Self {
            core: RedCore::new(cfg, max_tracked, success),
            action_space: RedActionSpace::new(max_tracked),
        }
    }

    pub fn action_space(&self) -> &RedActionSpace {
        &self.action_space
    }
}

impl RedAgent for RlRedAgent {
    fn reset(&mut self, net: &NetworkModel, rng: &mut dyn RngCore) {
        self.core.reset(net, rng);
    }

    fn act(
        &mut self,
        action: Option<usize>,
        net: &mut NetworkModel,
        defense: &DefenseContext,
        rng: &mut dyn RngCore,
    ) -> RedOutcome {
        self.core.sync_network(net);
        let current = self.core.killchain().current_host().to_string();
        let Some(action) = action else {
            return RedOutcome::nothing(&current);
        };
        let (slot, phase) = self.action_space.decode(action);
        match self.core.killchain().host_at(slot).map(str::to_string) {
            Some(target) => self.core.execute(phase, &target, net, defense, rng),
            // Slot not populated yet: a modeled failure, not a crash.
            None => RedOutcome {
                phase: Some(phase),
                ..RedOutcome::nothing(&current)
            },
        }
    }

    fn killchain(&self) -> &KillChainStateMachine {
        self.core.killchain()
    }
}

/// Campaign-style attacker that always runs the next valid phase.
pub struct ScriptedRedAgent {
    core: RedCore,
    strategy: RedStrategy,
}

impl ScriptedRedAgent {
    pub fn new(cfg: &RedAgentConfig, max_tracked: usize, success: Box<dyn SuccessModel>) -> Self {
        Self {
            core: RedCore::new(cfg, max_tracked, success),
            strategy: cfg.strategy,
        }
    }

    /// Candidate (host, phase) pairs that can be attempted right now.
    fn candidates(&self, net: &NetworkModel) -> Vec<(String, KillChainPhase)> {
        let current = self.core.killchain().current_host();
        let cut_off = net.host_by_name(current).is_some_and(|h| h.isolated);
        self.core
            .killchain()
            .views()
            .iter()
            .filter(|(name, _)| {
                name == current
                    || (!cut_off
                        && net
                            .host_by_name(name)
                            .is_some_and(|h| h.attached && !h.isolated))
            })
            .filter_map(|(name, state)| state.next_phase().map(|p| (name.clone(), p)))
            .collect()
    }

    fn choose(
        &self,
        net: &NetworkModel,
        rng: &mut dyn RngCore,
    ) -> Option<(String, KillChainPhase)> {
        let candidates = self.candidates(net);
        match self.strategy {
            RedStrategy::Random => candidates.choose(rng).cloned(),
            RedStrategy::ServerFirst => {
                let rank = |name: &str| match self.core.killchain().state(name).map(|s| s.known_type)
                {
                    Some(KnownType::Server) => 0,
                    Some(KnownType::Unknown) | None => 1,
                    Some(KnownType::Workstation) => 2,
                };
                // Stable: first-seen order breaks ties.
                candidates.into_iter().min_by_key(|(name, _)| rank(name))
            }
        }
    }
}

impl RedAgent for ScriptedRedAgent {
    fn reset(&mut self, net: &NetworkModel, rng: &mut dyn RngCore) {
        self.core.reset(net, rng);
    }

    fn act(
        &mut self,
        _action: Option<usize>,
        net: &mut NetworkModel,
        defense: &DefenseContext,
        rng: &mut dyn RngCore,
    ) -> RedOutcome {
        self.core.sync_network(net);
        match self.choose(net, rng) {
            Some((target, phase)) => self.core.execute(phase, &target, net, defense, rng),
            None => RedOutcome::nothing(self.core.killchain().current_host()),
        }
    }

    fn killchain(&self) -> &KillChainStateMachine {
        self.core.killchain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvConfig;
    use crate::types::HostType;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use KillChainPhase::*;

    fn setup() -> (NetworkModel, RedAgentConfig, ChaCha8Rng) {
        let cfg = EnvConfig::example();
        let net = NetworkModel::build(&cfg.network, 2);
        (net, cfg.red_agent, ChaCha8Rng::seed_from_u64(5))
    }

    fn rl_agent(cfg: &RedAgentConfig, net: &NetworkModel) -> RlRedAgent {
        RlRedAgent::new(cfg, net.num_base_hosts() * 2, Box::new(AlwaysSucceed))
    }

    #[test]
    fn discovery_on_fresh_host_fails_without_mutation() {
        let (mut net, cfg, mut rng) = setup();
        let mut red = rl_agent(&cfg, &net);
        red.reset(&net, &mut rng);
        let before = *red.killchain().state("user0").unwrap();

        let out = red.act(Some(2), &mut net, &DefenseContext::default(), &mut rng);
        assert_eq!(out.phase, Some(Discovery));
        assert!(!out.valid);
        assert!(!out.success);
        assert_eq!(*red.killchain().state("user0").unwrap(), before);
    }

    #[test]
    fn pingsweep_reveals_network_with_subnet_mates_swept() {
        let (mut net, cfg, mut rng) = setup();
        let mut red = rl_agent(&cfg, &net);
        red.reset(&net, &mut rng);

        let out = red.act(Some(0), &mut net, &DefenseContext::default(), &mut rng);
        assert!(out.success);
        assert_eq!(out.swept_hosts.len(), 5);
        let kc = red.killchain();
        assert_eq!(kc.num_tracked(), 6);
        assert!(kc.state("user1").unwrap().sweeped);
        assert!(!kc.state("server0").unwrap().sweeped);
        assert_eq!(red.action_space_size(), 36);
    }

    #[test]
    fn out_of_range_slot_is_invalid_attempt() {
        let (mut net, cfg, mut rng) = setup();
        let mut red = rl_agent(&cfg, &net);
        red.reset(&net, &mut rng);
        let out = red.act(Some(5 * 6 + 1), &mut net, &DefenseContext::default(), &mut rng);
        assert_eq!(out.phase, Some(PortScan));
        assert!(!out.valid);
        assert_eq!(out.target_host, "user0");
    }

    #[test]
    fn isolated_target_is_unreachable() {
        let (mut net, cfg, mut rng) = setup();
        let mut red = rl_agent(&cfg, &net);
        red.reset(&net, &mut rng);
        red.act(Some(0), &mut net, &DefenseContext::default(), &mut rng);
        let idx = net.host_idx("user1").unwrap();
        net.set_isolated(idx, true);
        // user1 is slot 1; port scan is phase 1.
        assert_eq!(red.killchain().host_at(1), Some("user1"));
        let out = red.act(Some(6 + 1), &mut net, &DefenseContext::default(), &mut rng);
        assert!(!out.valid);
    }

    #[test]
    fn isolated_source_cannot_reach_other_hosts() {
        let (mut net, cfg, mut rng) = setup();
        let mut red = rl_agent(&cfg, &net);
        red.reset(&net, &mut rng);
        red.act(Some(0), &mut net, &DefenseContext::default(), &mut rng);
        net.set_isolated(net.host_idx("user0").unwrap(), true);
        let blocked = red.act(Some(6 + 1), &mut net, &DefenseContext::default(), &mut rng);
        assert!(!blocked.valid);
        // Work on the current host itself is still possible.
        let local = red.act(Some(1), &mut net, &DefenseContext::default(), &mut rng);
        assert!(local.success);
    }

    #[test]
    fn isolated_source_sweep_reveals_nothing_new() {
        let (mut net, cfg, mut rng) = setup();
        let mut red = rl_agent(&cfg, &net);
        red.reset(&net, &mut rng);
        net.set_isolated(net.host_idx("user0").unwrap(), true);

        let out = red.act(Some(0), &mut net, &DefenseContext::default(), &mut rng);
        assert!(out.success);
        assert!(out.swept_hosts.is_empty());
        let kc = red.killchain();
        assert_eq!(kc.num_tracked(), 1);
        assert!(kc.state("user0").unwrap().sweeped);
        assert!(kc.state("server0").is_none());
    }

    #[test]
    fn new_decoys_are_tracked_as_swept() {
        let (mut net, cfg, mut rng) = setup();
        let mut red = rl_agent(&cfg, &net);
        red.reset(&net, &mut rng);
        let s = net.subnet_idx("server_subnet").unwrap();
        net.add_decoy(s, "decoy-1".into(), HostType::Server, vec![]);
        red.act(None, &mut net, &DefenseContext::default(), &mut rng);
        let st = red.killchain().state("decoy-1").unwrap();
        assert!(st.sweeped);
        assert!(!st.scanned);
    }

    #[test]
    fn scripted_agent_reaches_impact_on_a_server() {
        let (mut net, cfg, mut rng) = setup();
        let mut red = ScriptedRedAgent::new(&cfg, net.num_base_hosts() * 2, Box::new(AlwaysSucceed));
        red.reset(&net, &mut rng);
        let mut impacted = None;
        for _ in 0..40 {
            let out = red.act(None, &mut net, &DefenseContext::default(), &mut rng);
            if out.is_successful_impact() {
                impacted = Some(out.target_host);
                break;
            }
        }
        let target = impacted.expect("scripted red should impact within 40 turns");
        let host = net.host_by_name(&target).unwrap();
        assert_eq!(host.host_type, HostType::Server);
        assert!(host.compromised);
    }

    #[test]
    fn random_entry_host_is_a_workstation() {
        let (net, mut cfg, mut rng) = setup();
        cfg.entry_host = "random".to_string();
        let mut red = rl_agent(&cfg, &net);
        for _ in 0..10 {
            red.reset(&net, &mut rng);
            let entry = red.killchain().current_host().to_string();
            assert_eq!(
                net.host_by_name(&entry).unwrap().host_type,
                HostType::Workstation
            );
        }
    }
}
