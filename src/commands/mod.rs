//! Command dispatcher: user actions in, broadcasts out.
//!
//! Each command turns one user action into exactly one validated mutation
//! and one outbound broadcast. The ordering is fixed: publish first, apply
//! locally only after the publish succeeds, so the store never reflects a
//! change the group was not told about. Publish failures surface to the
//! caller as a failed command; there is no retry here.
//!
//! New values are computed from the authoritative
//! [`StateStore`](crate::state::StateStore), never from the configured
//! role matrix, so command-issued and network-issued updates cannot
//! diverge.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::IntercomConfig;
use crate::errors::{PanelError, StateError};
use crate::events::PanelEvent;
use crate::state::clamp_volume;
use crate::sync::SyncEngine;
use crate::transport::Broadcast;

/// Validated command surface for one panel.
pub struct CommandDispatcher {
    topic: String,
    identity: String,
    config: Arc<IntercomConfig>,
    transport: Arc<dyn Broadcast>,
    engine: Arc<Mutex<SyncEngine>>,
}

impl CommandDispatcher {
    pub fn new(
        topic: impl Into<String>,
        identity: impl Into<String>,
        config: Arc<IntercomConfig>,
        transport: Arc<dyn Broadcast>,
        engine: Arc<Mutex<SyncEngine>>,
    ) -> Self {
        Self {
            topic: topic.into(),
            identity: identity.into(),
            config,
            transport,
            engine,
        }
    }

    /// Commands require a completed sync handshake, a configured matrix row
    /// for the active role, and an in-range channel. Violations are rejected
    /// before any side effect.
    fn validate(&self, channel_id: usize) -> Result<(), StateError> {
        let engine = self.engine.lock();
        if !engine.status().is_ready() {
            return Err(StateError::NotSynced);
        }
        let role_id = engine.role_id();
        if self.config.role_row(role_id).is_none() {
            return Err(StateError::RoleNotConfigured { role_id });
        }
        let channel_count = self.config.channels.len();
        if channel_id >= channel_count {
            return Err(StateError::InvalidChannel {
                channel_id,
                channel_count,
            });
        }
        Ok(())
    }

    /// Publish, then apply the very event that was sent through the same
    /// path inbound events take.
    async fn publish_and_apply(&self, event: PanelEvent) -> Result<(), PanelError> {
        self.transport
            .send(&self.topic, &self.identity, event.clone())
            .await?;
        self.engine.lock().apply(event);
        Ok(())
    }

    /// Toggle the talk state of a channel. Returns the new value.
    pub async fn toggle_talk(&self, channel_id: usize) -> Result<bool, PanelError> {
        self.validate(channel_id)?;
        let (channel_name, talking) = {
            let engine = self.engine.lock();
            (
                engine.store().channel_name(channel_id),
                !engine.store().talking(channel_id),
            )
        };
        log::debug!("toggle talk on channel {channel_id} -> {talking}");
        self.publish_and_apply(PanelEvent::TalkStatusChange {
            channel_name,
            channel_id,
            talking,
        })
        .await?;
        Ok(talking)
    }

    /// Toggle the listen state of a channel. Returns the new value.
    pub async fn toggle_listen(&self, channel_id: usize) -> Result<bool, PanelError> {
        self.validate(channel_id)?;
        let (channel_name, listening) = {
            let engine = self.engine.lock();
            (
                engine.store().channel_name(channel_id),
                !engine.store().listening(channel_id),
            )
        };
        log::debug!("toggle listen on channel {channel_id} -> {listening}");
        self.publish_and_apply(PanelEvent::ListenStatusChange {
            channel_name,
            channel_id,
            listening,
        })
        .await?;
        Ok(listening)
    }

    /// Set a channel volume. The requested value is clamped into `[0, 100]`
    /// before the outbound payload is built, so the wire never carries an
    /// out-of-range volume. Returns the stored value.
    pub async fn set_volume(&self, channel_id: usize, requested: i64) -> Result<u8, PanelError> {
        self.validate(channel_id)?;
        let volume = clamp_volume(requested);
        let channel_name = self.engine.lock().store().channel_name(channel_id);
        log::debug!("set volume on channel {channel_id} -> {volume} (requested {requested})");
        self.publish_and_apply(PanelEvent::VolumeChange {
            channel_name,
            channel_id,
            volume: i64::from(volume),
        })
        .await?;
        Ok(volume)
    }
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("topic", &self.topic)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
