//! Panel and intercom configuration types.
//!
//! [`PanelConfig`] is what the operator enters into the panel's config
//! surface: the shared identity, the session name, and which role row this
//! panel acts as. [`IntercomConfig`] is the session description resolved
//! through the directory service at startup: the ordered channel and role
//! lists plus the per-role intent matrix. The matrix is configuration
//! only — once a panel has synced, the group-shared
//! [`StateStore`](crate::state::StateStore) is the single source of truth
//! and the matrix row is never mutated.

use serde::{Deserialize, Serialize};

/// Operator-supplied panel configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Identity scoping broadcast traffic to one logical group. Used as the
    /// event filter on the shared topic.
    #[serde(default)]
    pub companion_identity: String,

    /// Session name; also the pub/sub topic the panel subscribes to.
    #[serde(default)]
    pub intercom_name: String,

    /// Which row of the role matrix this panel acts as. `None` until the
    /// operator picks a role.
    #[serde(default)]
    pub role_id: Option<usize>,
}

/// One cell of the per-role channel matrix: the configured intent for a
/// (role, channel) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixEntry {
    #[serde(rename = "channelName")]
    pub channel_name: String,
    #[serde(default)]
    pub talking: bool,
    #[serde(rename = "listenActive", default)]
    pub listen_active: bool,
    #[serde(default)]
    pub volume: u8,
}

/// One row of the matrix: the channel intents for a single role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRow {
    #[serde(default)]
    pub channels: Vec<MatrixEntry>,
}

/// Session configuration as resolved by the directory service.
///
/// Channel and role ids are the zero-based indexes into `channels` and
/// `roles`; they are stable and dense for the life of a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntercomConfig {
    pub channels: Vec<String>,
    pub roles: Vec<String>,
    #[serde(default)]
    pub matrix: Vec<RoleRow>,
}

/// A dropdown choice exposed to the external config UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: usize,
    pub label: String,
}

impl IntercomConfig {
    /// Channel dropdown choices, one per configured channel.
    pub fn channel_choices(&self) -> Vec<Choice> {
        self.channels
            .iter()
            .enumerate()
            .map(|(id, label)| Choice {
                id,
                label: label.clone(),
            })
            .collect()
    }

    /// Role dropdown choices, one per configured role.
    pub fn role_choices(&self) -> Vec<Choice> {
        self.roles
            .iter()
            .enumerate()
            .map(|(id, label)| Choice {
                id,
                label: label.clone(),
            })
            .collect()
    }

    /// The matrix row for a role, if the config carries one.
    pub fn role_row(&self, role_id: usize) -> Option<&RoleRow> {
        self.matrix.get(role_id)
    }
}
