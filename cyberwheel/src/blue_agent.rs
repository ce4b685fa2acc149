// src/blue_agent.rs
//
// RL-driven blue agent.
//
// Decodes an integer action into (subnet, catalog entry), resolves the
// concrete target from what blue has seen so far and hands execution to the
// DecoyManager:
// - remove: most recently deployed decoy of the subnet
// - isolate: most recent alert source in the subnet that is not isolated
// - restore: most recently isolated host of the subnet

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::blue_actions::{ActionRegistry, BlueActionKind, DecoyManager};
use crate::config::EnvConfig;
use crate::network::NetworkModel;
use crate::rl::action_space::BlueActionSpace;
use crate::types::{ActionResult, Alert};

/// What one blue turn did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlueTurn {
    /// Configured catalog name.
    pub action_name: String,
    pub kind: BlueActionKind,
    pub result: ActionResult,
}

pub struct RlBlueAgent {
    registry: ActionRegistry,
    manager: DecoyManager,
    action_space: BlueActionSpace,
    /// Per subnet, alert sources ordered oldest to newest, no repeats.
    alert_sources: Vec<Vec<usize>>,
    /// Per subnet, hosts isolated by blue, oldest to newest.
    isolated: Vec<Vec<usize>>,
}

impl RlBlueAgent {
    pub fn new(cfg: &EnvConfig, net: &NetworkModel) -> Self {
        let registry = ActionRegistry::from_config(&cfg.blue_agent);
        let action_space = BlueActionSpace::new(net.num_subnets(), registry.len());
        Self {
            manager: DecoyManager::new(cfg.decoy_limit),
            action_space,
            alert_sources: vec![Vec::new(); net.num_subnets()],
            isolated: vec![Vec::new(); net.num_subnets()],
            registry,
        }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn action_space(&self) -> &BlueActionSpace {
        &self.action_space
    }

    pub fn reset(&mut self) {
        self.registry.reset_shared();
        self.alert_sources.iter_mut().for_each(Vec::clear);
        self.isolated.iter_mut().for_each(Vec::clear);
    }

    /// Catalog entry of the first `nothing`-class action, if configured.
    pub fn nothing_action(&self) -> Option<&str> {
        self.registry
            .actions()
            .iter()
            .find(|a| a.kind == BlueActionKind::Nothing)
            .map(|a| a.name.as_str())
    }

    /// Execute one encoded action.
    ///
    /// Panics if `action` is outside the blue action space.
    pub fn act(&mut self, action: usize, net: &mut NetworkModel, rng: &mut dyn RngCore) -> BlueTurn {
        let (subnet, type_idx) = self.action_space.decode(action);
        let entry = self.registry.action(type_idx);
        let kind = entry.kind;
        let action_name = entry.name.clone();
        let subnet_name = net.subnet(subnet).name.clone();

        let result = match kind {
            BlueActionKind::DeployDecoyHost => {
                let configs = entry.configs.clone();
                self.manager.deploy(net, subnet, &configs, rng)
            }
            BlueActionKind::RemoveDecoyHost => match net.subnet(subnet).decoys.ids.last().cloned() {
                Some(id) => self.manager.remove(net, subnet, &id),
                None => ActionResult::failed("decoy_not_found", Some(subnet_name)),
            },
            BlueActionKind::IsolateHost => match self.isolation_target(subnet, net) {
                Some(host) => {
                    let r = self.manager.isolate(net, host);
                    if r.success {
                        self.isolated[subnet].push(host);
                    }
                    r
                }
                None => ActionResult::failed("no_isolation_target", Some(subnet_name)),
            },
            BlueActionKind::RestoreHost => match self.isolated[subnet].pop() {
                Some(host) => self.manager.restore(net, host),
                None => ActionResult::failed("no_restore_target", Some(subnet_name)),
            },
            BlueActionKind::Nothing => self.manager.nothing(),
        };
        self.registry.record_shared(type_idx, &result);
        if result.success {
            log::debug!("blue {action_name} -> {}", result.id);
        }
        BlueTurn {
            action_name,
            kind,
            result,
        }
    }

    /// Most recent alert source in `subnet` that is still connected.
    fn isolation_target(&self, subnet: usize, net: &NetworkModel) -> Option<usize> {
        self.alert_sources[subnet]
            .iter()
            .rev()
            .copied()
            .find(|&h| !net.host(h).isolated)
    }

    /// Remember alert sources as isolation candidates for their subnet.
    pub fn observe_alerts(&mut self, alerts: &[Alert], net: &NetworkModel) {
        for alert in alerts {
            let Some(idx) = net.host_idx(&alert.src_host) else {
                continue;
            };
            let sources = &mut self.alert_sources[net.host(idx).subnet];
            sources.retain(|&h| h != idx);
            sources.push(idx);
        }
    }

    /// Flags over the full action space, true where the action can succeed.
    pub fn action_mask(&self, net: &NetworkModel) -> Vec<bool> {
        let mut mask = vec![false; self.action_space.size()];
        let global_room = net.num_decoys() < self.manager.decoy_limit();
        for subnet in 0..net.num_subnets() {
            for (type_idx, entry) in self.registry.actions().iter().enumerate() {
                let allowed = match entry.kind {
                    BlueActionKind::DeployDecoyHost => global_room && net.subnet_has_room(subnet),
                    BlueActionKind::RemoveDecoyHost => !net.subnet(subnet).decoys.ids.is_empty(),
                    BlueActionKind::IsolateHost => self.isolation_target(subnet, net).is_some(),
                    BlueActionKind::RestoreHost => !self.isolated[subnet].is_empty(),
                    BlueActionKind::Nothing => true,
                };
                mask[self.action_space.encode(subnet, type_idx)] = allowed;
            }
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blue_actions::DECOY_LIMIT_EXCEEDED;
    use crate::types::Recurring;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    // Example catalog order: deploy, remove, isolate, restore, nothing.
    const DEPLOY: usize = 0;
    const REMOVE: usize = 1;
    const ISOLATE: usize = 2;
    const RESTORE: usize = 3;
    const NOTHING: usize = 4;

    fn setup(limit: usize) -> (RlBlueAgent, NetworkModel, ChaCha8Rng) {
        let mut cfg = EnvConfig::example();
        cfg.decoy_limit = limit;
        let net = NetworkModel::build(&cfg.network, cfg.subnet_decoy_limit());
        let agent = RlBlueAgent::new(&cfg, &net);
        (agent, net, ChaCha8Rng::seed_from_u64(3))
    }

    fn encode(agent: &RlBlueAgent, subnet: usize, action: usize) -> usize {
        agent.action_space().encode(subnet, action)
    }

    #[test]
    fn three_deploys_with_limit_two() {
        let (mut blue, mut net, mut rng) = setup(2);
        let mut results = Vec::new();
        for subnet in 0..3 {
            let a = encode(&blue, subnet, DEPLOY);
            results.push(blue.act(a, &mut net, &mut rng).result);
        }
        assert!(results[0].success && results[1].success);
        assert_eq!(results[2].id, DECOY_LIMIT_EXCEEDED);
        assert_eq!(net.num_decoys(), 2);
        assert_eq!(blue.registry().shared().get("decoys").unwrap().len(), 2);
    }

    #[test]
    fn remove_takes_latest_decoy_of_subnet() {
        let (mut blue, mut net, mut rng) = setup(5);
        let first = blue.act(encode(&blue, 1, DEPLOY), &mut net, &mut rng).result;
        let second = blue.act(encode(&blue, 1, DEPLOY), &mut net, &mut rng).result;
        let removed = blue.act(encode(&blue, 1, REMOVE), &mut net, &mut rng).result;
        assert_eq!(removed.id, second.id);
        assert_eq!(removed.recurring, Recurring::Remove);
        assert_eq!(
            blue.registry().shared().get("decoys").unwrap(),
            [first.id.clone()]
        );

        let empty = blue.act(encode(&blue, 0, REMOVE), &mut net, &mut rng).result;
        assert!(!empty.success);
        assert_eq!(empty.id, "decoy_not_found");
    }

    #[test]
    fn isolate_needs_an_alert_source() {
        let (mut blue, mut net, mut rng) = setup(5);
        let r = blue.act(encode(&blue, 0, ISOLATE), &mut net, &mut rng).result;
        assert_eq!(r.id, "no_isolation_target");

        let alerts = [Alert {
            src_host: "user1".to_string(),
            dst_host: None,
        }];
        blue.observe_alerts(&alerts, &net);
        let r = blue.act(encode(&blue, 0, ISOLATE), &mut net, &mut rng).result;
        assert!(r.success);
        assert_eq!(r.id, "isolate:user1");
        assert!(net.host_by_name("user1").unwrap().isolated);

        let r = blue.act(encode(&blue, 0, RESTORE), &mut net, &mut rng).result;
        assert!(r.success);
        assert!(!net.host_by_name("user1").unwrap().isolated);
        let r = blue.act(encode(&blue, 0, RESTORE), &mut net, &mut rng).result;
        assert_eq!(r.id, "no_restore_target");
    }

    #[test]
    fn isolate_falls_back_to_older_alert_sources() {
        let (mut blue, mut net, mut rng) = setup(5);
        let alerts: Vec<Alert> = ["user0", "user1"]
            .iter()
            .map(|h| Alert {
                src_host: h.to_string(),
                dst_host: None,
            })
            .collect();
        blue.observe_alerts(&alerts, &net);
        let isolate = encode(&blue, 0, ISOLATE);

        let r = blue.act(isolate, &mut net, &mut rng).result;
        assert_eq!(r.id, "isolate:user1");
        assert!(blue.action_mask(&net)[isolate]);

        let r = blue.act(isolate, &mut net, &mut rng).result;
        assert_eq!(r.id, "isolate:user0");
        assert!(!blue.action_mask(&net)[isolate]);

        let r = blue.act(isolate, &mut net, &mut rng).result;
        assert_eq!(r.id, "no_isolation_target");
    }

    #[test]
    fn mask_tracks_feasibility() {
        let (mut blue, mut net, mut rng) = setup(1);
        let mask = blue.action_mask(&net);
        assert_eq!(mask.len(), 15);
        assert!(mask[encode(&blue, 0, DEPLOY)]);
        assert!(!mask[encode(&blue, 0, REMOVE)]);
        assert!(!mask[encode(&blue, 0, ISOLATE)]);
        assert!(mask[encode(&blue, 2, NOTHING)]);

        blue.act(encode(&blue, 0, DEPLOY), &mut net, &mut rng);
        let mask = blue.action_mask(&net);
        assert!(!mask[encode(&blue, 1, DEPLOY)]);
        assert!(mask[encode(&blue, 0, REMOVE)]);
    }

    #[test]
    fn reset_clears_shared_data_and_targets() {
        let (mut blue, mut net, mut rng) = setup(5);
        blue.act(encode(&blue, 0, DEPLOY), &mut net, &mut rng);
        blue.observe_alerts(
            &[Alert {
                src_host: "user0".to_string(),
                dst_host: None,
            }],
            &net,
        );
        blue.reset();
        net.reset();
        assert!(blue.registry().shared().get("decoys").unwrap().is_empty());
        let r = blue.act(encode(&blue, 0, ISOLATE), &mut net, &mut rng).result;
        assert_eq!(r.id, "no_isolation_target");
    }

    #[test]
    #[should_panic(expected = "outside action space")]
    fn out_of_range_action_panics() {
        let (mut blue, mut net, mut rng) = setup(5);
        blue.act(15, &mut net, &mut rng);
    }
}
