// src/rl/mod.rs
//
// RL surface of the simulation.
//
// Key components:
// - action_space: versioned integer action layouts for blue and red
// - observation: fixed-length observation vectors for both agents
// - reward: reward shaping and the recurring-reward ledger
// - sim_env: Gym-style CyberwheelEnv + VecEnv
// - policy: Policy trait and baseline policies
// - evaluator: seeded evaluation runs with CSV/JSON output

pub mod action_space;
pub mod evaluator;
pub mod observation;
pub mod policy;
pub mod reward;
pub mod sim_env;

// Re-exports for convenience
pub use action_space::{BlueActionSpace, RedActionSpace, ACTION_VERSION};
pub use evaluator::{ActionLogRow, EvalReport, EvalSummary, Evaluator};
pub use observation::{BlueObsMode, BlueObservation, RedObservation, OBS_VERSION};
pub use policy::{FixedPolicy, Policy, RandomPolicy};
pub use reward::{RecurringLedger, RewardBreakdown, RewardCalculator};
pub use sim_env::{CyberwheelEnv, ResetInfo, StepInfo, StepResult, VecEnv};
