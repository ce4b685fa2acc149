// src/rl/evaluator.rs
//
// Evaluation runs: drive an environment with a policy for a number of
// seeded episodes, keep one action-log row per step and summarise.
//
// Outputs (per run directory):
// - actions.csv        one row per step, columns in ACTION_LOG_HEADER order
// - eval_summary.json  aggregate metrics + per-episode summaries + checksum

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{ConfigError, EnvConfig};
use crate::telemetry::StepLog;

use super::policy::Policy;
use super::sim_env::CyberwheelEnv;

/// Output schema version.
pub const EVAL_SCHEMA_VERSION: u32 = 1;

pub const ACTION_LOG_HEADER: &str = "episode,step,red_action_type,red_action_src,\
red_action_dest,red_action_success,blue_action,blue_action_id,blue_action_target,reward";

/// One step of an evaluation episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLogRow {
    pub episode: usize,
    pub step: u64,
    pub red_action_type: String,
    pub red_action_src: String,
    pub red_action_dest: String,
    pub red_action_success: bool,
    pub blue_action: String,
    pub blue_action_id: String,
    pub blue_action_target: String,
    pub reward: f64,
}

impl ActionLogRow {
    fn csv_line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{:.6}",
            self.episode,
            self.step,
            csv_field(&self.red_action_type),
            csv_field(&self.red_action_src),
            csv_field(&self.red_action_dest),
            self.red_action_success,
            csv_field(&self.blue_action),
            csv_field(&self.blue_action_id),
            csv_field(&self.blue_action_target),
            self.reward
        )
    }
}

fn csv_field(s: &str) -> String {
    if s.contains(|c: char| matches!(c, ',' | '"' | '\n')) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Per-episode metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub episode: usize,
    pub seed: u64,
    pub steps: u64,
    pub total_reward: f64,
    pub impacted: bool,
    pub timestep_till_impact: Option<u64>,
    /// Steps where red executed a phase against a decoy.
    pub decoy_hits: usize,
    /// Steps where a ping sweep touched or revealed a decoy.
    pub ping_swept_decoys: usize,
    /// Decoys compromised by the end of the episode.
    pub impacted_decoys: usize,
}

/// Aggregate results written to eval_summary.json.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSummary {
    pub schema_version: u32,
    pub network: String,
    pub policy: String,
    pub base_seed: u64,
    pub num_episodes: usize,
    pub mean_episodic_reward: f64,
    pub impact_rate: f64,
    /// Mean over impacted episodes only.
    pub mean_steps_to_impact: Option<f64>,
    pub mean_decoy_hits: f64,
    pub episodes: Vec<EpisodeSummary>,
    /// SHA-256 over the action log (hex).
    pub checksum: String,
}

impl EvalSummary {
    fn from_episodes(
        network: &str,
        policy: &str,
        base_seed: u64,
        episodes: Vec<EpisodeSummary>,
        rows: &[ActionLogRow],
    ) -> Self {
        let n = episodes.len();
        let mean_episodic_reward = mean_of(&episodes, |e| e.total_reward);
        let impact_rate = mean_of(&episodes, |e| if e.impacted { 1.0 } else { 0.0 });
        let mean_decoy_hits = mean_of(&episodes, |e| e.decoy_hits as f64);
        let impact_steps: Vec<f64> = episodes
            .iter()
            .filter_map(|e| e.timestep_till_impact)
            .map(|s| s as f64)
            .collect();
        let mean_steps_to_impact = (!impact_steps.is_empty())
            .then(|| impact_steps.iter().sum::<f64>() / impact_steps.len() as f64);

        Self {
            schema_version: EVAL_SCHEMA_VERSION,
            network: network.to_string(),
            policy: policy.to_string(),
            base_seed,
            num_episodes: n,
            mean_episodic_reward,
            impact_rate,
            mean_steps_to_impact,
            mean_decoy_hits,
            episodes,
            checksum: compute_checksum(base_seed, rows),
        }
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

fn mean_of<F: Fn(&EpisodeSummary) -> f64>(episodes: &[EpisodeSummary], f: F) -> f64 {
    if episodes.is_empty() {
        0.0
    } else {
        episodes.iter().map(f).sum::<f64>() / episodes.len() as f64
    }
}

/// Deterministic checksum over the action log.
///
/// Rewards are rounded to 6 decimal places so the checksum is stable across
/// platforms.
pub fn compute_checksum(base_seed: u64, rows: &[ActionLogRow]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(base_seed.to_le_bytes());
    for row in rows {
        hasher.update((row.episode as u64).to_le_bytes());
        hasher.update(row.step.to_le_bytes());
        for field in [
            &row.red_action_type,
            &row.red_action_src,
            &row.red_action_dest,
            &row.blue_action,
            &row.blue_action_id,
            &row.blue_action_target,
        ] {
            hasher.update(field.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update([row.red_action_success as u8]);
        let reward_rounded = (row.reward * 1_000_000.0).round() as i64;
        hasher.update(reward_rounded.to_le_bytes());
    }
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Write the action log as CSV with a header row.
pub fn write_actions_csv<P: AsRef<Path>>(path: P, rows: &[ActionLogRow]) -> Result<()> {
    let path = path.as_ref();
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "{ACTION_LOG_HEADER}")?;
    for row in rows {
        writeln!(writer, "{}", row.csv_line())?;
    }
    writer.flush()?;
    Ok(())
}

/// Everything an evaluation run produced.
#[derive(Debug, Clone)]
pub struct EvalReport {
    pub rows: Vec<ActionLogRow>,
    pub summary: EvalSummary,
}

impl EvalReport {
    /// Write `actions.csv` and `eval_summary.json` into `dir`.
    pub fn write_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<(PathBuf, PathBuf)> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output dir {}", dir.display()))?;
        let csv_path = dir.join("actions.csv");
        let summary_path = dir.join("eval_summary.json");
        write_actions_csv(&csv_path, &self.rows)?;
        self.summary.write_to_file(&summary_path)?;
        Ok((csv_path, summary_path))
    }
}

/// Runs seeded evaluation episodes against one environment.
pub struct Evaluator {
    env: CyberwheelEnv,
}

impl Evaluator {
    /// Build the environment with per-step info enabled.
    pub fn new(mut config: EnvConfig) -> Result<Self, ConfigError> {
        config.evaluation = true;
        Ok(Self {
            env: CyberwheelEnv::new(config)?,
        })
    }

    pub fn with_telemetry(self, log: StepLog) -> Self {
        Self {
            env: self.env.with_telemetry(log),
        }
    }

    pub fn env(&self) -> &CyberwheelEnv {
        &self.env
    }

    /// Run `episodes` episodes; episode `i` uses seed `base_seed + i`.
    pub fn run(&mut self, policy: &mut dyn Policy, episodes: usize, base_seed: u64) -> EvalReport {
        let mut rows = Vec::new();
        let mut summaries = Vec::with_capacity(episodes);

        for episode in 0..episodes {
            let seed = base_seed.wrapping_add(episode as u64);
            policy.reset_episode(seed, episode as u64);
            let (mut obs, _) = self.env.reset(Some(seed));
            let mut summary = EpisodeSummary {
                episode,
                seed,
                steps: 0,
                total_reward: 0.0,
                impacted: false,
                timestep_till_impact: None,
                decoy_hits: 0,
                ping_swept_decoys: 0,
                impacted_decoys: 0,
            };

            loop {
                let mask = self.env.action_mask();
                let action = policy.act(&obs, &mask);
                let result = self.env.step(action);
                summary.steps += 1;
                summary.total_reward += result.reward;
                if let Some(info) = result.info.as_ref() {
                    summary.decoy_hits += info.decoy_attacked as usize;
                    summary.ping_swept_decoys += info.ping_swept_decoy as usize;
                    summary.impacted_decoys = info.impacted_decoys;
                    summary.timestep_till_impact = info.timestep_till_impact;
                    rows.push(ActionLogRow {
                        episode,
                        step: info.step,
                        red_action_type: info.red_action.clone(),
                        red_action_src: info.red_src.clone(),
                        red_action_dest: info.red_dst.clone(),
                        red_action_success: info.red_success,
                        blue_action: info.blue_action.clone(),
                        blue_action_id: info.blue_id.clone(),
                        blue_action_target: info.blue_target.clone().unwrap_or_default(),
                        reward: result.reward,
                    });
                }
                obs = result.observation;
                if result.done || result.truncated {
                    summary.impacted = result.done;
                    break;
                }
            }

            log::info!(
                "episode {episode} seed={seed} steps={} reward={:.2} impacted={}",
                summary.steps,
                summary.total_reward,
                summary.impacted
            );
            summaries.push(summary);
        }

        let summary = EvalSummary::from_episodes(
            self.env.network().name(),
            policy.policy_id().unwrap_or(policy.version()),
            base_seed,
            summaries,
            &rows,
        );
        EvalReport { rows, summary }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::policy::{FixedPolicy, RandomPolicy};

    fn short_config() -> EnvConfig {
        let mut cfg = EnvConfig::example();
        cfg.num_steps = 20;
        cfg
    }

    #[test]
    fn test_rows_cover_every_step() {
        let mut eval = Evaluator::new(short_config()).unwrap();
        let report = eval.run(&mut FixedPolicy::new(4), 2, 100);
        let total_steps: u64 = report.summary.episodes.iter().map(|e| e.steps).sum();
        assert_eq!(report.rows.len() as u64, total_steps);
        assert_eq!(report.summary.num_episodes, 2);
        assert_eq!(report.summary.episodes[1].seed, 101);
        assert_eq!(report.rows[0].step, 1);
        assert_eq!(report.rows[0].blue_action, "nothing");
    }

    #[test]
    fn test_checksum_is_reproducible() {
        let run = || {
            let mut eval = Evaluator::new(short_config()).unwrap();
            eval.run(&mut RandomPolicy::new(0), 3, 7).summary
        };
        let a = run();
        let b = run();
        assert_eq!(a.checksum, b.checksum);
        assert_eq!(a.checksum.len(), 64);
        assert_eq!(a, b);
    }

    #[test]
    fn test_checksum_changes_with_seed() {
        let rows = vec![ActionLogRow {
            episode: 0,
            step: 1,
            red_action_type: "pingsweep".to_string(),
            red_action_src: "user0".to_string(),
            red_action_dest: "user0".to_string(),
            red_action_success: true,
            blue_action: "nothing".to_string(),
            blue_action_id: "nothing".to_string(),
            blue_action_target: String::new(),
            reward: -1.0,
        }];
        assert_ne!(compute_checksum(1, &rows), compute_checksum(2, &rows));
    }

    #[test]
    fn test_write_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut eval = Evaluator::new(short_config()).unwrap();
        let report = eval.run(&mut FixedPolicy::new(4), 1, 3);
        let (csv_path, summary_path) = report.write_to_dir(dir.path().join("out")).unwrap();

        let csv = fs::read_to_string(csv_path).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(ACTION_LOG_HEADER));
        assert_eq!(lines.count(), report.rows.len());

        let text = fs::read_to_string(summary_path).unwrap();
        let parsed: EvalSummary = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.checksum, report.summary.checksum);
    }

    #[test]
    fn test_csv_field_quotes_commas() {
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("plain"), "plain");
    }
}
