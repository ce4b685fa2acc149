// src/config.rs
//
// Environment configuration for Cyberwheel.
//
// A configuration fully defines a reproducible engagement:
// - environment mode (standard or proactive headstart) and trained side
// - network layout (subnets, hosts, services, vulnerabilities)
// - blue action catalog with per-action (immediate, recurring) rewards
// - red agent entry point, targeting strategy and per-phase rewards
// - reward shaping knobs (decoy limit, valid targets, post play, objective)
// - detector and success model selection
//
// Loaded from YAML and validated up front. Configuration errors are fatal;
// nothing in here is consulted for validity once an episode is running.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use crate::blue_actions::ActionRegistry;
use crate::killchain::KillChainPhase;
use crate::types::HostType;

/// Current configuration schema version.
pub const CONFIG_VERSION: u32 = 1;

/// Which environment loop runs the engagement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentMode {
    /// Blue and red act from step 0.
    #[default]
    Standard,
    /// Blue gets a decoy-placement headstart of `decoy_limit` steps.
    Proactive,
}

/// Defender objective used for the proactive objective bonus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    Delay,
    Downtime,
    Detect,
    General,
}

/// Reward formula selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardFunction {
    /// Immediate + recurring terms only.
    Standard,
    /// Decoy-limit and headstart multipliers plus objective bonus.
    #[default]
    Proactive,
}

/// Hosts whose compromise is penalised for blue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValidTargets {
    Named(ValidTargetClass),
    Hosts(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidTargetClass {
    Servers,
    Users,
    All,
}

impl Default for ValidTargets {
    fn default() -> Self {
        ValidTargets::Named(ValidTargetClass::All)
    }
}

/// (immediate, recurring) reward pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardEntry {
    #[serde(default)]
    pub immediate: f64,
    #[serde(default)]
    pub recurring: f64,
}

impl RewardEntry {
    pub fn new(immediate: f64, recurring: f64) -> Self {
        Self {
            immediate,
            recurring,
        }
    }
}

/// A host declared in the network layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub host_type: HostType,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub vulnerabilities: Vec<String>,
}

/// A subnet declared in the network layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubnetSpec {
    pub name: String,
    #[serde(default)]
    pub hosts: Vec<HostSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub subnets: Vec<SubnetSpec>,
}

/// Extra per-action settings. Only decoy deployments read these today.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfigs {
    /// Host type the deployed decoy pretends to be.
    #[serde(default = "default_decoy_type")]
    pub decoy_type: HostType,
    /// Services advertised by the decoy.
    #[serde(default)]
    pub services: Vec<String>,
}

fn default_decoy_type() -> HostType {
    HostType::Server
}

impl Default for ActionConfigs {
    fn default() -> Self {
        Self {
            decoy_type: default_decoy_type(),
            services: Vec::new(),
        }
    }
}

/// One blue action in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueActionSpec {
    /// Unique action name, used as the reward table key.
    pub name: String,
    /// Registered action class (e.g. `deploy_decoy_host`).
    pub class: String,
    #[serde(default)]
    pub reward: RewardEntry,
    /// Shared-data lists this action records into.
    #[serde(default)]
    pub shared_data: Vec<String>,
    #[serde(default)]
    pub configs: ActionConfigs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueAgentConfig {
    /// Named shared lists owned by the action registry.
    #[serde(default)]
    pub shared_data: Vec<String>,
    pub actions: Vec<BlueActionSpec>,
}

impl Default for BlueAgentConfig {
    fn default() -> Self {
        let action = |name: &str, class: &str, immediate: f64, recurring: f64| BlueActionSpec {
            name: name.to_string(),
            class: class.to_string(),
            reward: RewardEntry::new(immediate, recurring),
            shared_data: Vec::new(),
            configs: ActionConfigs::default(),
        };
        Self {
            shared_data: vec!["decoys".to_string()],
            actions: vec![
                BlueActionSpec {
                    shared_data: vec!["decoys".to_string()],
                    ..action("deploy_decoy", "deploy_decoy_host", -10.0, -1.0)
                },
                BlueActionSpec {
                    shared_data: vec!["decoys".to_string()],
                    ..action("remove_decoy", "remove_decoy_host", 0.0, 0.0)
                },
                action("isolate_host", "isolate_host", -5.0, -2.0),
                action("restore_host", "restore_host", 0.0, 0.0),
                action("nothing", "nothing", 0.0, 0.0),
            ],
        }
    }
}

/// How the scripted attacker picks its next target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedStrategy {
    /// Prefer known servers, fall back to any tracked host.
    #[default]
    ServerFirst,
    /// Uniform over tracked hosts with a valid next phase.
    Random,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedAgentConfig {
    /// Entry host name, or `random` for a random workstation.
    #[serde(default = "default_entry_host")]
    pub entry_host: String,
    #[serde(default)]
    pub strategy: RedStrategy,
    /// Reward table keyed by kill-chain phase name.
    #[serde(default = "default_red_rewards")]
    pub rewards: BTreeMap<String, RewardEntry>,
}

fn default_entry_host() -> String {
    "random".to_string()
}

fn default_red_rewards() -> BTreeMap<String, RewardEntry> {
    [
        ("pingsweep", 1.0),
        ("portscan", 2.0),
        ("discovery", 3.0),
        ("lateral-movement", 4.0),
        ("privilege-escalation", 6.0),
        ("impact", 8.0),
    ]
    .into_iter()
    .map(|(name, immediate)| (name.to_string(), RewardEntry::new(immediate, 0.0)))
    .collect()
}

impl Default for RedAgentConfig {
    fn default() -> Self {
        Self {
            entry_host: default_entry_host(),
            strategy: RedStrategy::default(),
            rewards: default_red_rewards(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DetectorConfig {
    #[default]
    Perfect,
    Probabilistic {
        true_positive_rate: f64,
        false_positive_rate: f64,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessModelKind {
    #[default]
    Always,
    DefenseAware,
}

/// Complete environment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub environment: EnvironmentMode,
    /// Train the red agent instead of the blue agent.
    #[serde(default)]
    pub train_red: bool,
    /// Global cap on simultaneously deployed decoys.
    #[serde(default = "default_decoy_limit")]
    pub decoy_limit: usize,
    /// Optional per-subnet cap; defaults to `decoy_limit`.
    #[serde(default)]
    pub per_subnet_decoy_limit: Option<usize>,
    #[serde(default)]
    pub valid_targets: ValidTargets,
    /// Keep the normal multiplier after the headstart phase.
    #[serde(default)]
    pub post_play: bool,
    #[serde(default)]
    pub objective: Objective,
    #[serde(default)]
    pub reward_function: RewardFunction,
    /// Sort host mappings and fix the seed when no seed is passed to reset.
    #[serde(default)]
    pub deterministic: bool,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Step budget per episode.
    #[serde(default = "default_num_steps")]
    pub num_steps: u64,
    /// Assemble per-step info records.
    #[serde(default)]
    pub evaluation: bool,
    pub network: NetworkSpec,
    #[serde(default)]
    pub blue_agent: BlueAgentConfig,
    #[serde(default)]
    pub red_agent: RedAgentConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub success_model: SuccessModelKind,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_decoy_limit() -> usize {
    5
}

fn default_num_steps() -> u64 {
    100
}

impl EnvConfig {
    /// Load a configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parse a configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let cfg: EnvConfig = serde_yaml::from_str(yaml)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Built-in three-subnet layout used by the CLI and tests.
    pub fn example() -> Self {
        let host = |name: &str, host_type: HostType, services: &[&str]| HostSpec {
            name: name.to_string(),
            host_type,
            services: services.iter().map(|s| s.to_string()).collect(),
            vulnerabilities: Vec::new(),
        };
        let subnet = |name: &str, hosts: Vec<HostSpec>| SubnetSpec {
            name: name.to_string(),
            hosts,
        };
        Self {
            version: CONFIG_VERSION,
            environment: EnvironmentMode::Standard,
            train_red: false,
            decoy_limit: default_decoy_limit(),
            per_subnet_decoy_limit: None,
            valid_targets: ValidTargets::default(),
            post_play: false,
            objective: Objective::Delay,
            reward_function: RewardFunction::Proactive,
            deterministic: true,
            seed: None,
            num_steps: default_num_steps(),
            evaluation: false,
            network: NetworkSpec {
                name: "example".to_string(),
                subnets: vec![
                    subnet(
                        "user_subnet",
                        vec![
                            host("user0", HostType::Workstation, &["ssh"]),
                            host("user1", HostType::Workstation, &["ssh"]),
                            host("user2", HostType::Workstation, &["rdp"]),
                        ],
                    ),
                    subnet(
                        "server_subnet",
                        vec![
                            host("server0", HostType::Server, &["http", "ssh"]),
                            host("server1", HostType::Server, &["smb"]),
                        ],
                    ),
                    subnet(
                        "dmz_subnet",
                        vec![host("web0", HostType::Server, &["http"])],
                    ),
                ],
            },
            blue_agent: BlueAgentConfig::default(),
            red_agent: RedAgentConfig {
                entry_host: "user0".to_string(),
                ..RedAgentConfig::default()
            },
            detector: DetectorConfig::Perfect,
            success_model: SuccessModelKind::Always,
        }
    }

    /// Effective per-subnet decoy cap.
    pub fn subnet_decoy_limit(&self) -> usize {
        self.per_subnet_decoy_limit.unwrap_or(self.decoy_limit)
    }

    /// Red reward entry for a phase. Validated to exist for every phase.
    pub fn red_reward(&self, phase: KillChainPhase) -> RewardEntry {
        self.red_agent
            .rewards
            .get(phase.name())
            .copied()
            .unwrap_or_default()
    }

    /// Apply environment overrides.
    ///
    /// Supported variables:
    ///   - CYBERWHEEL_DETERMINISTIC (bool: 1/true/yes or 0/false/no)
    ///   - CYBERWHEEL_DECOY_LIMIT   (usize)
    ///   - CYBERWHEEL_SEED          (u64)
    ///
    /// Any variable that fails to parse is ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        use std::env;

        if let Ok(raw) = env::var("CYBERWHEEL_DETERMINISTIC") {
            let parsed = match raw.to_lowercase().as_str() {
                "1" | "true" | "yes" => Some(true),
                "0" | "false" | "no" => Some(false),
                _ => None,
            };
            match parsed {
                Some(v) => {
                    self.deterministic = v;
                    log::info!("CYBERWHEEL_DETERMINISTIC = {v} (overrode config)");
                }
                None => log::warn!(
                    "could not parse CYBERWHEEL_DETERMINISTIC = {:?}; keeping {}",
                    raw,
                    self.deterministic
                ),
            }
        }

        if let Ok(raw) = env::var("CYBERWHEEL_DECOY_LIMIT") {
            match raw.parse::<usize>() {
                Ok(v) => {
                    self.decoy_limit = v;
                    log::info!("CYBERWHEEL_DECOY_LIMIT = {v} (overrode config)");
                }
                Err(_) => log::warn!(
                    "could not parse CYBERWHEEL_DECOY_LIMIT = {:?} as usize; using {}",
                    raw,
                    self.decoy_limit
                ),
            }
        }

        if let Ok(raw) = env::var("CYBERWHEEL_SEED") {
            match raw.parse::<u64>() {
                Ok(v) => {
                    self.seed = Some(v);
                    log::info!("CYBERWHEEL_SEED = {v} (overrode config)");
                }
                Err(_) => log::warn!("could not parse CYBERWHEEL_SEED = {:?} as u64; ignoring", raw),
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version == 0 {
            return Err(ConfigError::Validation {
                field: "version".to_string(),
                message: "version must be >= 1".to_string(),
            });
        }
        if self.num_steps == 0 {
            return Err(ConfigError::Validation {
                field: "num_steps".to_string(),
                message: "num_steps must be > 0".to_string(),
            });
        }

        // Network: at least one host, unique host and subnet names.
        let mut subnet_names = HashSet::new();
        let mut host_names = HashSet::new();
        for subnet in &self.network.subnets {
            if !subnet_names.insert(subnet.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    kind: "subnet",
                    name: subnet.name.clone(),
                });
            }
            for host in &subnet.hosts {
                if !host_names.insert(host.name.as_str()) {
                    return Err(ConfigError::DuplicateName {
                        kind: "host",
                        name: host.name.clone(),
                    });
                }
            }
        }
        if host_names.is_empty() {
            return Err(ConfigError::EmptyNetwork);
        }
        let has_workstation = self
            .network
            .subnets
            .iter()
            .flat_map(|s| s.hosts.iter())
            .any(|h| h.host_type == HostType::Workstation);

        if self.red_agent.entry_host.eq_ignore_ascii_case("random") {
            if !has_workstation {
                return Err(ConfigError::Validation {
                    field: "red_agent.entry_host".to_string(),
                    message: "random entry requires at least one workstation".to_string(),
                });
            }
        } else if !host_names.contains(self.red_agent.entry_host.as_str()) {
            return Err(ConfigError::UnknownHost(self.red_agent.entry_host.clone()));
        }

        if let ValidTargets::Hosts(hosts) = &self.valid_targets {
            if let Some(missing) = hosts.iter().find(|h| !host_names.contains(h.as_str())) {
                return Err(ConfigError::UnknownHost(missing.clone()));
            }
        }

        // Blue catalog: unique names, registered classes, declared shared data.
        if self.blue_agent.actions.is_empty() {
            return Err(ConfigError::Validation {
                field: "blue_agent.actions".to_string(),
                message: "at least one blue action is required".to_string(),
            });
        }
        let mut action_names = HashSet::new();
        for action in &self.blue_agent.actions {
            if !action_names.insert(action.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    kind: "blue action",
                    name: action.name.clone(),
                });
            }
            if ActionRegistry::lookup(&action.class).is_none() {
                return Err(ConfigError::UnknownActionClass(action.class.clone()));
            }
            if let Some(key) = action
                .shared_data
                .iter()
                .find(|k| !self.blue_agent.shared_data.contains(k))
            {
                return Err(ConfigError::UnknownSharedData {
                    action: action.name.clone(),
                    key: key.clone(),
                });
            }
        }

        // Red training fills blue turns with a no-op, which needs a price.
        if self.train_red && !self.blue_agent.actions.iter().any(|a| a.class == "nothing") {
            return Err(ConfigError::Validation {
                field: "blue_agent.actions".to_string(),
                message: "train_red requires an action of class 'nothing'".to_string(),
            });
        }

        // Red reward table: one entry per phase.
        for phase in KillChainPhase::ALL {
            if !self.red_agent.rewards.contains_key(phase.name()) {
                return Err(ConfigError::MissingRedReward(phase.name().to_string()));
            }
        }

        if let DetectorConfig::Probabilistic {
            true_positive_rate,
            false_positive_rate,
        } = self.detector
        {
            for (field, value) in [
                ("detector.true_positive_rate", true_positive_rate),
                ("detector.false_positive_rate", false_positive_rate),
            ] {
                if !(0.0..=1.0).contains(&value) {
                    return Err(ConfigError::Validation {
                        field: field.to_string(),
                        message: format!("{value} is not a probability"),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Errors that can occur when loading a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },
    #[error("unknown blue action class '{0}'")]
    UnknownActionClass(String),
    #[error("blue action '{action}' uses undeclared shared data '{key}'")]
    UnknownSharedData { action: String, key: String },
    #[error("missing red reward for phase '{0}'")]
    MissingRedReward(String),
    #[error("unknown host '{0}'")]
    UnknownHost(String),
    #[error("network has no hosts")]
    EmptyNetwork,
    #[error("config validation error in '{field}': {message}")]
    Validation { field: String, message: String },
}
