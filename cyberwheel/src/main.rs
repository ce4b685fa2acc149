// src/main.rs
//
// CLI entrypoint for Cyberwheel.
//
// - `run`: step an environment with a baseline policy and print per-episode
//   results. Per-step telemetry follows CYBERWHEEL_TELEMETRY_*.
// - `evaluate`: seeded evaluation episodes, writes actions.csv and
//   eval_summary.json into --output-dir.
//
// Config precedence: --config file (or the built-in example), then
// CYBERWHEEL_* environment overrides, then --seed / --steps.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use cyberwheel::blue_actions::BlueActionKind;
use cyberwheel::config::EnvConfig;
use cyberwheel::rl::{CyberwheelEnv, Evaluator, FixedPolicy, Policy, RandomPolicy};
use cyberwheel::telemetry::StepLog;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PolicyArg {
    /// Uniform over currently useful actions.
    Random,
    /// Blue always does nothing.
    Nothing,
}

#[derive(Debug, Parser)]
#[command(
    name = "cyberwheel",
    about = "Cyberwheel red/blue cyber-defense simulation",
    version
)]
struct Args {
    /// YAML environment config. Defaults to the built-in example network.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base seed; episode i uses seed + i.
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Step budget per episode (overrides the config).
    #[arg(long, global = true)]
    steps: Option<u64>,

    /// Verbosity: -v, -vv
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run episodes and print a line per episode.
    Run {
        #[arg(long, default_value_t = 1)]
        episodes: usize,

        #[arg(long, value_enum, default_value_t = PolicyArg::Random)]
        policy: PolicyArg,
    },
    /// Run evaluation episodes and write the action log and summary.
    Evaluate {
        #[arg(long, default_value_t = 10)]
        episodes: usize,

        #[arg(long, value_enum, default_value_t = PolicyArg::Random)]
        policy: PolicyArg,

        #[arg(long, default_value = "runs/eval")]
        output_dir: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_config(args: &Args) -> Result<EnvConfig> {
    let mut cfg = match &args.config {
        Some(path) => EnvConfig::from_yaml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EnvConfig::example(),
    };
    cfg.apply_env_overrides();
    if let Some(seed) = args.seed {
        cfg.seed = Some(seed);
    }
    if let Some(steps) = args.steps {
        cfg.num_steps = steps;
    }
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

/// Encoded blue action for "nothing" in the first subnet.
fn nothing_action(env: &CyberwheelEnv) -> usize {
    if env.config().train_red {
        log::warn!("--policy nothing only applies to blue; using action 0");
        return 0;
    }
    let blue = env.blue_agent();
    let idx = blue
        .registry()
        .actions()
        .iter()
        .position(|a| a.kind == BlueActionKind::Nothing);
    match idx {
        Some(idx) => blue.action_space().encode(0, idx),
        None => {
            log::warn!("no 'nothing' blue action configured; using action 0");
            0
        }
    }
}

fn build_policy(arg: PolicyArg, env: &CyberwheelEnv, seed: u64) -> Box<dyn Policy> {
    match arg {
        PolicyArg::Random => Box::new(RandomPolicy::new(seed)),
        PolicyArg::Nothing => Box::new(FixedPolicy::new(nothing_action(env))),
    }
}

fn run(cfg: EnvConfig, episodes: usize, policy_arg: PolicyArg) -> Result<()> {
    let base_seed = cfg.seed.unwrap_or(0);
    let mut env = CyberwheelEnv::new(cfg)?;
    if let Some(log) = StepLog::from_env().context("telemetry setup")? {
        env = env.with_telemetry(log);
    }
    let mut policy = build_policy(policy_arg, &env, base_seed);

    for episode in 0..episodes {
        let seed = base_seed.wrapping_add(episode as u64);
        policy.reset_episode(seed, episode as u64);
        let (mut obs, _) = env.reset(Some(seed));
        let mut total = 0.0;
        let (steps, impacted) = loop {
            let action = policy.act(&obs, &env.action_mask());
            let result = env.step(action);
            total += result.reward;
            obs = result.observation;
            if result.done || result.truncated {
                break (env.current_step(), result.done);
            }
        };
        println!(
            "episode={} seed={} steps={} reward={:.3} impacted={}",
            episode, seed, steps, total, impacted
        );
    }
    Ok(())
}

fn evaluate(
    cfg: EnvConfig,
    episodes: usize,
    policy_arg: PolicyArg,
    output_dir: PathBuf,
) -> Result<()> {
    let base_seed = cfg.seed.unwrap_or(0);
    let mut evaluator = Evaluator::new(cfg)?;
    if let Some(log) = StepLog::from_env().context("telemetry setup")? {
        evaluator = evaluator.with_telemetry(log);
    }
    let mut policy = build_policy(policy_arg, evaluator.env(), base_seed);
    let report = evaluator.run(policy.as_mut(), episodes, base_seed);
    let (csv_path, summary_path) = report.write_to_dir(&output_dir)?;

    let s = &report.summary;
    println!(
        "cyberwheel eval | network={} | policy={} | episodes={} | mean_reward={:.3} | impact_rate={:.3} | checksum={}",
        s.network, s.policy, s.num_episodes, s.mean_episodic_reward, s.impact_rate, s.checksum
    );
    println!("wrote {} and {}", csv_path.display(), summary_path.display());
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    let cfg = load_config(&args)?;

    match args.command {
        Command::Run { episodes, policy } => run(cfg, episodes, policy),
        Command::Evaluate {
            episodes,
            policy,
            output_dir,
        } => evaluate(cfg, episodes, policy, output_dir),
    }
}
