// src/types.rs
//
// Common shared types for the Cyberwheel simulation.

use serde::{Deserialize, Serialize};

/// Role of a host in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostType {
    Workstation, // "user" host
    Server,
}

/// Effect of a blue action on the recurring-reward ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recurring {
    /// Stop the recurring cost keyed by the action id.
    Remove,
    #[default]
    None,
    /// Start a recurring cost keyed by the action id.
    Add,
}

/// Outcome of executing one blue action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Decoy name, `isolate:<host>`, or a failure reason.
    pub id: String,
    pub success: bool,
    pub recurring: Recurring,
    /// Subnet or host the action touched.
    pub target: Option<String>,
}

impl ActionResult {
    pub fn ok(id: impl Into<String>, recurring: Recurring, target: Option<String>) -> Self {
        Self {
            id: id.into(),
            success: true,
            recurring,
            target,
        }
    }

    pub fn failed(reason: impl Into<String>, target: Option<String>) -> Self {
        Self {
            id: reason.into(),
            success: false,
            recurring: Recurring::None,
            target,
        }
    }
}

/// Detector output consumed by the blue observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub src_host: String,
    pub dst_host: Option<String>,
}
