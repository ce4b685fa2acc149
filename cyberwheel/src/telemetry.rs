//! telemetry.rs
//!
//! Per-step JSONL log for Cyberwheel environments.
//!
//! # Environment variables
//!
//! - `CYBERWHEEL_TELEMETRY_MODE`: `"off"` (default) or `"jsonl"`.
//! - `CYBERWHEEL_TELEMETRY_PATH`: JSONL file, required for `"jsonl"`.
//! - `CYBERWHEEL_TELEMETRY_APPEND`: `"1"`/`"true"`/`"yes"` appends to an
//!   existing file instead of truncating it.
//!
//! # Schema
//!
//! One [`StepRecord`] per environment step: the episode seed, the step
//! outcome and the flattened [`StepInfo`], tagged with `"schema_version": 1`.

use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::rl::sim_env::StepInfo;

/// Current telemetry schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// One line of the step log.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord<'a> {
    pub schema_version: u32,
    pub seed: u64,
    pub reward: f64,
    pub done: bool,
    pub truncated: bool,
    #[serde(flatten)]
    pub info: &'a StepInfo,
}

impl<'a> StepRecord<'a> {
    pub fn new(seed: u64, reward: f64, done: bool, truncated: bool, info: &'a StepInfo) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            seed,
            reward,
            done,
            truncated,
            info,
        }
    }
}

/// Where step records go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryTarget {
    pub path: PathBuf,
    pub append: bool,
}

impl TelemetryTarget {
    /// Read the target from `CYBERWHEEL_TELEMETRY_*`.
    ///
    /// `Ok(None)` when telemetry is off. Asking for `jsonl` without a path
    /// is an error.
    pub fn from_env() -> Result<Option<Self>> {
        let mode = env::var("CYBERWHEEL_TELEMETRY_MODE").unwrap_or_default();
        match mode.to_lowercase().as_str() {
            "" | "off" => return Ok(None),
            "jsonl" => {}
            other => bail!("unknown CYBERWHEEL_TELEMETRY_MODE {other:?} (expected off or jsonl)"),
        }
        let path = match env::var("CYBERWHEEL_TELEMETRY_PATH") {
            Ok(p) if !p.trim().is_empty() => PathBuf::from(p),
            _ => bail!("CYBERWHEEL_TELEMETRY_MODE=jsonl needs CYBERWHEEL_TELEMETRY_PATH"),
        };
        let append = env::var("CYBERWHEEL_TELEMETRY_APPEND")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Ok(Some(Self { path, append }))
    }
}

/// Open JSONL step log.
///
/// The file is created up front so a bad path fails before the first
/// episode rather than in the middle of one.
pub struct StepLog {
    path: PathBuf,
    writer: BufWriter<File>,
    records: u64,
}

impl StepLog {
    pub fn create(target: &TelemetryTarget) -> Result<Self> {
        let path = target.path.clone();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating telemetry dir {}", parent.display()))?;
        }
        let mut options = OpenOptions::new();
        options.create(true);
        if target.append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        let file = options
            .open(&path)
            .with_context(|| format!("opening telemetry file {}", path.display()))?;
        log::info!("telemetry: writing step records to {}", path.display());
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            records: 0,
        })
    }

    /// Open the log configured in the environment, if any.
    pub fn from_env() -> Result<Option<Self>> {
        TelemetryTarget::from_env()?
            .map(|target| Self::create(&target))
            .transpose()
    }

    pub fn write(&mut self, record: &StepRecord<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)
            .with_context(|| format!("writing {}", self.path.display()))?;
        self.writer
            .write_all(b"\n")
            .with_context(|| format!("writing {}", self.path.display()))?;
        self.records += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("flushing {}", self.path.display()))
    }

    /// Records written since the log was opened.
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
