//! Cyberwheel core library.
//!
//! A discrete-time red/blue cyber-defense simulation shaped as a
//! reinforcement-learning environment. The binary (`src/main.rs`) is a thin
//! run / evaluate harness around these components.
//!
//! # Architecture
//!
//! - **Network** (`network`): hosts, subnets, decoys and reachability.
//! - **Kill chain** (`killchain`): per-host attack progress as seen by red.
//! - **Blue actions** (`blue_actions`, `blue_agent`): compile-time action
//!   registry, the DecoyManager executor and the RL-driven blue agent.
//! - **Red agents** (`red_agent`, `success`): RL and scripted attackers with
//!   an optional defense-aware success model.
//! - **Detection** (`detector`): red outcomes to alerts.
//! - **RL surface** (`rl`): action spaces, observations, reward shaping,
//!   `CyberwheelEnv` / `VecEnv`, baseline policies and the evaluator.
//! - **Telemetry** (`telemetry`): env-controlled JSONL step log.

pub mod blue_actions;
pub mod blue_agent;
pub mod config;
pub mod detector;
pub mod killchain;
pub mod network;
pub mod red_agent;
pub mod rl;
pub mod success;
pub mod telemetry;
pub mod types;

// --- Re-exports for ergonomic external use ---------------------------------

pub use config::{ConfigError, EnvConfig, EnvironmentMode, Objective, RewardFunction};

pub use blue_actions::{ActionRegistry, BlueActionKind, DecoyManager, SharedData};
pub use blue_agent::{BlueTurn, RlBlueAgent};

pub use detector::{build_detector, Detector, PerfectDetector, ProbabilisticDetector};

pub use killchain::{AttackState, KillChainPhase, KillChainStateMachine};

pub use network::{Host, NetworkModel, Subnet};

pub use red_agent::{RedAgent, RedOutcome, RlRedAgent, ScriptedRedAgent};

pub use success::{DefenseContext, DefenseLevel, SuccessModel};

pub use types::{ActionResult, Alert, HostType, Recurring};

pub use rl::{
    CyberwheelEnv, Evaluator, Policy, RandomPolicy, ResetInfo, RewardBreakdown, StepInfo,
    StepResult, VecEnv,
};
