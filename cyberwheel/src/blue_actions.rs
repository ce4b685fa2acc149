// src/blue_actions.rs
//
// Blue action system: catalog, registry and the DecoyManager executor.
//
// The registry maps configured class names to constructors at compile time.
// Each configured action becomes one catalog entry with a unique name and an
// (immediate, recurring) reward. Shared-data lists declared in the config are
// owned by the registry and cleared at every episode reset.
//
// Execution never fails loudly: capacity violations and missing targets come
// back as unsuccessful `ActionResult`s with a descriptive id.

use std::collections::{BTreeMap, HashMap};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{ActionConfigs, BlueActionSpec, BlueAgentConfig, RewardEntry};
use crate::network::NetworkModel;
use crate::types::{ActionResult, Recurring};

/// Id reported when a deploy would exceed a decoy cap.
pub const DECOY_LIMIT_EXCEEDED: &str = "decoy_limit_exceeded";

/// Built-in blue action behaviours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlueActionKind {
    DeployDecoyHost,
    RemoveDecoyHost,
    IsolateHost,
    RestoreHost,
    Nothing,
}

impl BlueActionKind {
    /// Name recorded in the defense history.
    pub fn short_name(self) -> &'static str {
        match self {
            BlueActionKind::DeployDecoyHost => "deploy_decoy",
            BlueActionKind::RemoveDecoyHost => "remove_decoy",
            BlueActionKind::IsolateHost => "isolate_host",
            BlueActionKind::RestoreHost => "restore_host",
            BlueActionKind::Nothing => "nothing",
        }
    }
}

/// One catalog entry, built from its config by a registered constructor.
#[derive(Debug, Clone)]
pub struct BlueAction {
    pub name: String,
    pub kind: BlueActionKind,
    pub reward: RewardEntry,
    pub shared_data: Vec<String>,
    pub configs: ActionConfigs,
}

type ActionCtor = fn(&BlueActionSpec) -> BlueAction;

fn with_kind(spec: &BlueActionSpec, kind: BlueActionKind) -> BlueAction {
    BlueAction {
        name: spec.name.clone(),
        kind,
        reward: spec.reward,
        shared_data: spec.shared_data.clone(),
        configs: spec.configs.clone(),
    }
}

fn deploy_decoy_host(spec: &BlueActionSpec) -> BlueAction {
    with_kind(spec, BlueActionKind::DeployDecoyHost)
}

fn remove_decoy_host(spec: &BlueActionSpec) -> BlueAction {
    with_kind(spec, BlueActionKind::RemoveDecoyHost)
}

fn isolate_host(spec: &BlueActionSpec) -> BlueAction {
    with_kind(spec, BlueActionKind::IsolateHost)
}

fn restore_host(spec: &BlueActionSpec) -> BlueAction {
    with_kind(spec, BlueActionKind::RestoreHost)
}

fn nothing(spec: &BlueActionSpec) -> BlueAction {
    with_kind(spec, BlueActionKind::Nothing)
}

const REGISTERED: &[(&str, ActionCtor)] = &[
    ("deploy_decoy_host", deploy_decoy_host),
    ("remove_decoy_host", remove_decoy_host),
    ("isolate_host", isolate_host),
    ("restore_host", restore_host),
    ("nothing", nothing),
];

/// Named lists shared between blue actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedData {
    lists: BTreeMap<String, Vec<String>>,
}

impl SharedData {
    pub fn declare(names: &[String]) -> Self {
        Self {
            lists: names.iter().map(|n| (n.clone(), Vec::new())).collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.lists.get(key).map(Vec::as_slice)
    }

    fn push(&mut self, key: &str, value: &str) {
        if let Some(list) = self.lists.get_mut(key) {
            list.push(value.to_string());
        }
    }

    fn remove(&mut self, key: &str, value: &str) {
        if let Some(list) = self.lists.get_mut(key) {
            if let Some(pos) = list.iter().position(|v| v == value) {
                list.remove(pos);
            }
        }
    }

    pub fn clear(&mut self) {
        for list in self.lists.values_mut() {
            list.clear();
        }
    }
}

/// Blue action catalog plus the shared state its actions write to.
#[derive(Debug, Clone)]
pub struct ActionRegistry {
    actions: Vec<BlueAction>,
    shared: SharedData,
}

impl ActionRegistry {
    /// Constructor registered under a class name.
    pub fn lookup(class: &str) -> Option<ActionCtor> {
        REGISTERED
            .iter()
            .find(|(name, _)| *name == class)
            .map(|(_, ctor)| *ctor)
    }

    pub fn class_names() -> impl Iterator<Item = &'static str> {
        REGISTERED.iter().map(|(name, _)| *name)
    }

    /// Build the catalog from a validated config.
    ///
    /// Panics on an unregistered class; `EnvConfig::validate` rejects those.
    pub fn from_config(cfg: &BlueAgentConfig) -> Self {
        let actions = cfg
            .actions
            .iter()
            .map(|spec| match Self::lookup(&spec.class) {
                Some(ctor) => ctor(spec),
                None => panic!("unregistered blue action class '{}'", spec.class),
            })
            .collect();
        Self {
            actions,
            shared: SharedData::declare(&cfg.shared_data),
        }
    }

    pub fn actions(&self) -> &[BlueAction] {
        &self.actions
    }

    pub fn action(&self, idx: usize) -> &BlueAction {
        &self.actions[idx]
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Reward table keyed by action name.
    pub fn reward_table(&self) -> HashMap<String, RewardEntry> {
        self.actions
            .iter()
            .map(|a| (a.name.clone(), a.reward))
            .collect()
    }

    pub fn shared(&self) -> &SharedData {
        &self.shared
    }

    /// Mirror a successful deploy/remove into the action's shared lists.
    pub fn record_shared(&mut self, action_idx: usize, result: &ActionResult) {
        if !result.success {
            return;
        }
        let action = &self.actions[action_idx];
        for key in &action.shared_data {
            match result.recurring {
                Recurring::Add => self.shared.push(key, &result.id),
                Recurring::Remove => self.shared.remove(key, &result.id),
                Recurring::None => {}
            }
        }
    }

    pub fn reset_shared(&mut self) {
        self.shared.clear();
    }
}

/// Executes blue actions against the network under the decoy caps.
#[derive(Debug, Clone)]
pub struct DecoyManager {
    decoy_limit: usize,
}

impl DecoyManager {
    pub fn new(decoy_limit: usize) -> Self {
        Self { decoy_limit }
    }

    pub fn decoy_limit(&self) -> usize {
        self.decoy_limit
    }

    /// Deploy a decoy into a subnet.
    ///
    /// The decoy name is a v4 UUID drawn from the environment RNG so seeded
    /// runs produce the same names.
    pub fn deploy<R: Rng + ?Sized>(
        &self,
        net: &mut NetworkModel,
        subnet: usize,
        configs: &ActionConfigs,
        rng: &mut R,
    ) -> ActionResult {
        let subnet_name = net.subnet(subnet).name.clone();
        if net.num_decoys() >= self.decoy_limit || !net.subnet_has_room(subnet) {
            return ActionResult::failed(DECOY_LIMIT_EXCEEDED, Some(subnet_name));
        }
        let id = uuid::Builder::from_random_bytes(rng.gen()).into_uuid();
        let name = format!("decoy-{id}");
        net.add_decoy(
            subnet,
            name.clone(),
            configs.decoy_type,
            configs.services.clone(),
        );
        log::debug!("deployed {name} in {subnet_name}");
        ActionResult::ok(name, Recurring::Add, Some(subnet_name))
    }

    /// Remove a specific decoy from a subnet.
    pub fn remove(&self, net: &mut NetworkModel, subnet: usize, id: &str) -> ActionResult {
        let subnet_name = net.subnet(subnet).name.clone();
        if !net.detach_decoy(subnet, id) {
            return ActionResult::failed("decoy_not_found", Some(subnet_name));
        }
        ActionResult::ok(id, Recurring::Remove, Some(subnet_name))
    }

    pub fn isolate(&self, net: &mut NetworkModel, host: usize) -> ActionResult {
        let name = net.host(host).name.clone();
        if net.host(host).isolated {
            return ActionResult::failed("already_isolated", Some(name));
        }
        net.set_isolated(host, true);
        ActionResult::ok(format!("isolate:{name}"), Recurring::Add, Some(name))
    }

    pub fn restore(&self, net: &mut NetworkModel, host: usize) -> ActionResult {
        let name = net.host(host).name.clone();
        if !net.host(host).isolated {
            return ActionResult::failed("not_isolated", Some(name));
        }
        net.set_isolated(host, false);
        ActionResult::ok(format!("isolate:{name}"), Recurring::Remove, Some(name))
    }

    pub fn nothing(&self) -> ActionResult {
        ActionResult::ok("nothing", Recurring::None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvConfig;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn setup(limit: usize, per_subnet: usize) -> (NetworkModel, DecoyManager, ChaCha8Rng) {
        let net = NetworkModel::build(&EnvConfig::example().network, per_subnet);
        (net, DecoyManager::new(limit), ChaCha8Rng::seed_from_u64(42))
    }

    #[test]
    fn third_deploy_exceeds_limit_of_two() {
        let (mut net, mgr, mut rng) = setup(2, 5);
        let cfg = ActionConfigs::default();
        let r1 = mgr.deploy(&mut net, 0, &cfg, &mut rng);
        let r2 = mgr.deploy(&mut net, 1, &cfg, &mut rng);
        let r3 = mgr.deploy(&mut net, 2, &cfg, &mut rng);
        assert!(r1.success && r2.success);
        assert_eq!(r1.recurring, Recurring::Add);
        assert_ne!(r1.id, r2.id);
        assert!(!r3.success);
        assert_eq!(r3.id, DECOY_LIMIT_EXCEEDED);
        assert_eq!(r3.recurring, Recurring::None);
        assert_eq!(net.num_decoys(), 2);
    }

    #[test]
    fn per_subnet_cap_applies() {
        let (mut net, mgr, mut rng) = setup(10, 1);
        let cfg = ActionConfigs::default();
        assert!(mgr.deploy(&mut net, 0, &cfg, &mut rng).success);
        let r = mgr.deploy(&mut net, 0, &cfg, &mut rng);
        assert_eq!(r.id, DECOY_LIMIT_EXCEEDED);
        assert!(mgr.deploy(&mut net, 1, &cfg, &mut rng).success);
    }

    #[test]
    fn decoy_names_are_seed_reproducible() {
        let cfg = ActionConfigs::default();
        let (mut a, mgr, mut rng_a) = setup(2, 2);
        let (mut b, _, mut rng_b) = setup(2, 2);
        let ra = mgr.deploy(&mut a, 0, &cfg, &mut rng_a);
        let rb = mgr.deploy(&mut b, 0, &cfg, &mut rng_b);
        assert_eq!(ra.id, rb.id);
        assert!(ra.id.starts_with("decoy-"));
    }

    #[test]
    fn remove_requires_present_decoy() {
        let (mut net, mgr, mut rng) = setup(2, 2);
        let deployed = mgr.deploy(&mut net, 1, &ActionConfigs::default(), &mut rng);
        let missing = mgr.remove(&mut net, 0, &deployed.id);
        assert!(!missing.success);
        assert_eq!(missing.id, "decoy_not_found");

        let removed = mgr.remove(&mut net, 1, &deployed.id);
        assert!(removed.success);
        assert_eq!(removed.id, deployed.id);
        assert_eq!(removed.recurring, Recurring::Remove);
        assert_eq!(net.num_decoys(), 0);
    }

    #[test]
    fn isolate_and_restore_toggle() {
        let (mut net, mgr, _) = setup(2, 2);
        let h = net.host_idx("user1").unwrap();
        let iso = mgr.isolate(&mut net, h);
        assert!(iso.success);
        assert_eq!(iso.id, "isolate:user1");
        assert!(!mgr.isolate(&mut net, h).success);

        let res = mgr.restore(&mut net, h);
        assert!(res.success);
        assert_eq!(res.id, iso.id);
        assert_eq!(res.recurring, Recurring::Remove);
        assert!(!mgr.restore(&mut net, h).success);
    }

    #[test]
    fn nothing_always_succeeds() {
        let (_, mgr, _) = setup(0, 0);
        let r = mgr.nothing();
        assert!(r.success);
        assert_eq!(r.recurring, Recurring::None);
        assert!(r.target.is_none());
    }

    #[test]
    fn registry_builds_catalog_and_tracks_shared_data() {
        let cfg = EnvConfig::example();
        let mut reg = ActionRegistry::from_config(&cfg.blue_agent);
        assert_eq!(reg.len(), 5);
        assert_eq!(reg.action(0).kind, BlueActionKind::DeployDecoyHost);
        assert_eq!(reg.reward_table()["deploy_decoy"].immediate, -10.0);
        assert_eq!(ActionRegistry::class_names().count(), 5);

        let added = ActionResult::ok("decoy-x", Recurring::Add, None);
        reg.record_shared(0, &added);
        assert_eq!(reg.shared().get("decoys").unwrap(), ["decoy-x".to_string()]);

        let removed = ActionResult::ok("decoy-x", Recurring::Remove, None);
        reg.record_shared(0, &removed);
        assert!(reg.shared().get("decoys").unwrap().is_empty());

        reg.record_shared(0, &added);
        reg.reset_shared();
        assert!(reg.shared().get("decoys").unwrap().is_empty());
    }
}
