// src/rl/sim_env.rs
//
// Gym-style environment for the blue/red engagement.
//
// - CyberwheelEnv: one network, one blue agent, one red agent, one detector.
// - VecEnv: N independent environments stepped sequentially or on scoped
//   worker threads.
//
// Per tick:
//   1. headstart = proactive mode && step < decoy_limit
//   2. blue acts (a priced no-op when red is trained)
//   3. blue action kind recorded in the defense history
//   4. red acts (no-op during a proactive headstart)
//   5. detector turns the red outcome into alerts
//   6. reward computed
//   7. observation built for the trained agent
//   8. step += 1; done on a successful impact, truncated at num_steps
//
// All randomness comes from one ChaCha8Rng reseeded at reset, so a seed
// fixes the whole trajectory.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::blue_actions::BlueActionKind;
use crate::blue_agent::{BlueTurn, RlBlueAgent};
use crate::config::{ConfigError, EnvConfig, EnvironmentMode};
use crate::detector::{build_detector, Detector};
use crate::network::NetworkModel;
use crate::red_agent::{build_success_model, RedAgent, RedOutcome, RlRedAgent, ScriptedRedAgent};
use crate::success::{DefenseContext, DefenseHistory};
use crate::telemetry::{StepLog, StepRecord};
use crate::types::{ActionResult, Recurring};

use super::action_space::RedActionSpace;
use super::observation::{BlueObsMode, BlueObservation, RedObservation};
use super::reward::{RewardBreakdown, RewardCalculator, RewardInputs};

/// Result of a single environment step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Observation for the trained agent after the step.
    pub observation: Vec<i64>,
    pub reward: f64,
    /// Red achieved a successful impact.
    pub done: bool,
    /// Step budget exhausted without `done`.
    pub truncated: bool,
    /// Present in evaluation mode.
    pub info: Option<StepInfo>,
}

/// Per-step record assembled in evaluation mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Step index after this tick (1-based).
    pub step: u64,
    pub red_action: String,
    pub red_src: String,
    pub red_dst: String,
    pub red_dst_is_decoy: bool,
    pub red_success: bool,
    pub blue_action: String,
    pub blue_id: String,
    pub blue_target: Option<String>,
    pub blue_success: bool,
    /// A successful ping sweep touched or revealed a decoy.
    pub ping_swept_decoy: bool,
    /// Red executed a phase against a decoy.
    pub decoy_attacked: bool,
    pub impacted_decoys: usize,
    /// Step of the first successful impact this episode.
    pub timestep_till_impact: Option<u64>,
    pub headstart: bool,
    pub reward: RewardBreakdown,
    pub termination_reason: Option<String>,
}

/// Returned alongside the first observation of an episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetInfo {
    pub seed: u64,
    pub observation_len: usize,
    pub action_space_size: usize,
    pub max_action_space_size: usize,
    pub num_hosts: usize,
    pub num_subnets: usize,
    pub headstart: bool,
}

/// Single blue/red environment.
pub struct CyberwheelEnv {
    config: EnvConfig,
    net: NetworkModel,
    blue: RlBlueAgent,
    red: Box<dyn RedAgent>,
    red_space: RedActionSpace,
    detector: Box<dyn Detector>,
    reward: RewardCalculator,
    blue_obs: BlueObservation,
    red_obs: RedObservation,
    history: DefenseHistory,
    telemetry: Option<StepLog>,
    rng: ChaCha8Rng,
    seed: u64,
    step: u64,
    done: bool,
    truncated: bool,
    first_impact: Option<u64>,
    last_obs: Vec<i64>,
}

impl CyberwheelEnv {
    /// Build an environment from a configuration, validating it first.
    pub fn new(config: EnvConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let net = NetworkModel::build(&config.network, config.subnet_decoy_limit());
        let max_tracked = 2 * net.num_base_hosts();
        let success = build_success_model(config.success_model);
        let red: Box<dyn RedAgent> = if config.train_red {
            Box::new(RlRedAgent::new(&config.red_agent, max_tracked, success))
        } else {
            Box::new(ScriptedRedAgent::new(&config.red_agent, max_tracked, success))
        };
        let blue = RlBlueAgent::new(&config, &net);
        let reward = RewardCalculator::new(&config, &net, blue.registry().reward_table());
        let obs_mode = match config.environment {
            EnvironmentMode::Standard => BlueObsMode::Standard,
            EnvironmentMode::Proactive => BlueObsMode::Proactive,
        };
        let blue_obs = BlueObservation::new(&net, config.deterministic, obs_mode);
        let seed = config.seed.unwrap_or(0);
        log::debug!(
            "built env '{}' with {} hosts in {} subnets",
            net.name(),
            net.num_base_hosts(),
            net.num_subnets()
        );

        Ok(Self {
            detector: build_detector(&config.detector),
            red_space: RedActionSpace::new(max_tracked),
            red_obs: RedObservation::new(max_tracked),
            history: DefenseHistory::default(),
            telemetry: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
            step: 0,
            done: false,
            truncated: false,
            first_impact: None,
            last_obs: Vec::new(),
            config,
            net,
            blue,
            red,
            reward,
            blue_obs,
        })
    }

    /// Attach a step log; one record is written per step.
    pub fn with_telemetry(mut self, log: StepLog) -> Self {
        self.telemetry = Some(log);
        self
    }

    fn headstart_at(&self, step: u64) -> bool {
        self.config.environment == EnvironmentMode::Proactive
            && step < self.config.decoy_limit as u64
    }

    /// Reset the environment with an optional seed.
    ///
    /// Without a seed the next one is drawn from the current RNG.
    pub fn reset(&mut self, seed: Option<u64>) -> (Vec<i64>, ResetInfo) {
        let seed = seed.unwrap_or_else(|| self.rng.gen());
        self.seed = seed;
        self.rng = ChaCha8Rng::seed_from_u64(seed);

        self.net.reset();
        self.blue.reset();
        self.red.reset(&self.net, &mut self.rng);
        self.detector.reset();
        self.reward.reset();
        self.history.clear();
        self.step = 0;
        self.done = false;
        self.truncated = false;
        self.first_impact = None;

        let headstart = self.headstart_at(0);
        let obs = if self.config.train_red {
            self.red_obs.reset(self.red.killchain())
        } else {
            self.blue_obs.reset(headstart)
        };
        self.last_obs = obs.clone();

        let info = ResetInfo {
            seed,
            observation_len: self.observation_len(),
            action_space_size: self.action_space_size(),
            max_action_space_size: self.max_action_space_size(),
            num_hosts: self.net.num_base_hosts(),
            num_subnets: self.net.num_subnets(),
            headstart,
        };
        (obs, info)
    }

    fn nothing_turn(&self) -> BlueTurn {
        let action_name = match self.blue.nothing_action() {
            Some(name) => name.to_string(),
            None => panic!("no 'nothing' blue action configured"),
        };
        BlueTurn {
            action_name,
            kind: BlueActionKind::Nothing,
            result: ActionResult::ok("nothing", Recurring::None, None),
        }
    }

    /// Advance one tick with the trained agent's action.
    pub fn step(&mut self, action: usize) -> StepResult {
        if self.done || self.truncated {
            return StepResult {
                observation: self.last_obs.clone(),
                reward: 0.0,
                done: self.done,
                truncated: self.truncated,
                info: self.config.evaluation.then(|| StepInfo {
                    step: self.step,
                    termination_reason: Some("Episode already done".to_string()),
                    ..StepInfo::default()
                }),
            };
        }

        let headstart = self.headstart_at(self.step);

        let blue_turn = if self.config.train_red {
            self.nothing_turn()
        } else {
            self.blue.act(action, &mut self.net, &mut self.rng)
        };
        self.history.record(blue_turn.kind.short_name());

        let defense = DefenseContext {
            decoys: self.net.num_decoys(),
            isolated: self.net.num_isolated(),
            recent_defensive: self.history.recent_defensive(),
        };
        let outcome = if headstart {
            RedOutcome::nothing(self.red.killchain().current_host())
        } else {
            let red_action = self.config.train_red.then_some(action);
            self.red
                .act(red_action, &mut self.net, &defense, &mut self.rng)
        };

        let alerts = self.detector.observe(&outcome, &self.net, &mut self.rng);
        // Blue is blind for the whole headstart.
        if !headstart {
            self.blue.observe_alerts(&alerts, &self.net);
        }

        let impacted_decoys = self.net.num_compromised_decoys();
        let breakdown = self.reward.calculate(&RewardInputs {
            red_phase: outcome.phase,
            red_success: outcome.success,
            target_host: &outcome.target_host,
            target_is_decoy: outcome.target_is_decoy,
            blue_action: &blue_turn.action_name,
            blue_kind: blue_turn.kind,
            blue_success: blue_turn.result.success,
            blue_id: &blue_turn.result.id,
            blue_recurring: blue_turn.result.recurring,
            headstart,
            num_decoys: self.net.num_decoys(),
            impacted_decoys,
        });

        self.step += 1;
        let observation = if self.config.train_red {
            self.red_obs.update(self.red.killchain())
        } else {
            self.blue_obs
                .update(&alerts, self.net.num_decoys(), headstart)
        };
        self.last_obs = observation.clone();

        self.done = outcome.is_successful_impact();
        if self.done && self.first_impact.is_none() {
            self.first_impact = Some(self.step);
        }
        self.truncated = !self.done && self.step >= self.config.num_steps;

        let termination_reason = if self.done {
            Some("Impact".to_string())
        } else if self.truncated {
            Some("MaxSteps".to_string())
        } else {
            None
        };
        let ping_swept_decoy = outcome.success
            && outcome.phase == Some(crate::killchain::KillChainPhase::PingSweep)
            && (outcome.target_is_decoy
                || outcome
                    .swept_hosts
                    .iter()
                    .any(|h| self.net.host_by_name(h).is_some_and(|h| h.decoy)));
        let reward = breakdown.total;
        let info = StepInfo {
            step: self.step,
            red_action: outcome.action_name().to_string(),
            red_dst_is_decoy: outcome.target_is_decoy,
            red_success: outcome.success,
            decoy_attacked: outcome.executed() && outcome.target_is_decoy,
            red_src: outcome.src_host,
            red_dst: outcome.target_host,
            blue_action: blue_turn.action_name,
            blue_id: blue_turn.result.id,
            blue_target: blue_turn.result.target,
            blue_success: blue_turn.result.success,
            ping_swept_decoy,
            impacted_decoys,
            timestep_till_impact: self.first_impact,
            headstart,
            reward: breakdown,
            termination_reason,
        };

        if let Some(sink) = self.telemetry.as_mut() {
            let record = StepRecord::new(self.seed, reward, self.done, self.truncated, &info);
            let written = sink.write(&record).and_then(|()| {
                if self.done || self.truncated {
                    sink.flush()
                } else {
                    Ok(())
                }
            });
            // Telemetry never interrupts an episode.
            if let Err(err) = written {
                log::warn!("dropping telemetry after write failure: {err:#}");
                self.telemetry = None;
            }
        }
        if self.done {
            log::debug!("episode seed={} impacted at step {}", self.seed, self.step);
        }

        StepResult {
            observation,
            reward,
            done: self.done,
            truncated: self.truncated,
            info: self.config.evaluation.then_some(info),
        }
    }

    /// Number of actions that currently decode to something meaningful.
    pub fn action_space_size(&self) -> usize {
        if self.config.train_red {
            self.red.action_space_size()
        } else {
            self.blue.action_space().size()
        }
    }

    /// Fixed size of the policy head.
    pub fn max_action_space_size(&self) -> usize {
        if self.config.train_red {
            self.red_space.max_size()
        } else {
            self.blue.action_space().size()
        }
    }

    /// `max_action_space_size()` flags, true where the action is currently useful.
    pub fn action_mask(&self) -> Vec<bool> {
        if self.config.train_red {
            self.red_space.mask(self.red.killchain())
        } else {
            self.blue.action_mask(&self.net)
        }
    }

    pub fn observation_len(&self) -> usize {
        if self.config.train_red {
            self.red_obs.len()
        } else {
            self.blue_obs.len()
        }
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn network(&self) -> &NetworkModel {
        &self.net
    }

    pub fn blue_agent(&self) -> &RlBlueAgent {
        &self.blue
    }

    pub fn red_agent(&self) -> &dyn RedAgent {
        self.red.as_ref()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn current_step(&self) -> u64 {
        self.step
    }

    pub fn is_done(&self) -> bool {
        self.done || self.truncated
    }
}

/// Vectorised environment for parallel rollouts.
///
/// Manages N independent CyberwheelEnv instances, each with its own network.
pub struct VecEnv {
    envs: Vec<CyberwheelEnv>,
}

impl VecEnv {
    pub fn new(n: usize, config: EnvConfig) -> Result<Self, ConfigError> {
        let envs = (0..n)
            .map(|_| CyberwheelEnv::new(config.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { envs })
    }

    pub fn num_envs(&self) -> usize {
        self.envs.len()
    }

    /// Reset all environments with optional per-environment seeds.
    ///
    /// Environments without a seed draw one from their own RNG.
    pub fn reset_all(&mut self, seeds: Option<&[u64]>) -> Vec<(Vec<i64>, ResetInfo)> {
        self.envs
            .iter_mut()
            .enumerate()
            .map(|(i, env)| {
                let seed = seeds.and_then(|s| s.get(i).copied());
                env.reset(seed)
            })
            .collect()
    }

    /// Step all environments in order.
    pub fn step(&mut self, actions: &[usize]) -> Vec<StepResult> {
        assert_eq!(
            actions.len(),
            self.envs.len(),
            "Actions length must match number of environments"
        );

        self.envs
            .iter_mut()
            .zip(actions.iter())
            .map(|(env, &action)| env.step(action))
            .collect()
    }

    /// Step all environments, one scoped thread each.
    ///
    /// Results are identical to `step`; environments share nothing.
    pub fn step_parallel(&mut self, actions: &[usize]) -> Vec<StepResult> {
        assert_eq!(
            actions.len(),
            self.envs.len(),
            "Actions length must match number of environments"
        );

        std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .envs
                .iter_mut()
                .zip(actions.iter())
                .map(|(env, &action)| scope.spawn(move || env.step(action)))
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(result) => result,
                    Err(payload) => std::panic::resume_unwind(payload),
                })
                .collect::<Vec<_>>()
        })
    }

    pub fn envs(&self) -> &[CyberwheelEnv] {
        &self.envs
    }

    pub fn seeds(&self) -> Vec<u64> {
        self.envs.iter().map(|e| e.seed()).collect()
    }

    pub fn dones(&self) -> Vec<bool> {
        self.envs.iter().map(|e| e.is_done()).collect()
    }
}
