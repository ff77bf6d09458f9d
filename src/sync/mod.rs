//! Sync protocol engine.
//!
//! Brings a panel's local view into agreement with the group and keeps it
//! there. Two mechanisms:
//!
//! 1. **Bootstrap handshake** — after subscribing, the panel broadcasts a
//!    sync request; the first sync response wholesale-replaces the local
//!    store and flips the panel to `Ready`. Responses are applied as full
//!    replacements, so duplicates and late arrivals are harmless.
//! 2. **Incremental application** — every single-field change event
//!    overwrites exactly that field. No ordering is assumed between
//!    publishers; whichever event is applied last for a (channel, field)
//!    pair wins. Re-applying a value is a no-op in effect.
//!
//! The engine is purely synchronous state logic: it never touches the
//! transport. When an inbound event warrants a reply (the coordinator
//! answering a sync request), [`SyncEngine::apply`] returns the reply and
//! the caller publishes it. That keeps the engine unit-testable without a
//! live transport and keeps all store mutations on one logical sequence.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use crate::config::RoleRow;
use crate::events::PanelEvent;
use crate::presentation::{Indicator, PanelStatus, Presentation};
use crate::state::{ChannelState, StateStore};
use crate::transport::Broadcast;

/// The role that answers sync requests for the group. By convention the
/// first role row is the coordinating position.
pub const COORDINATOR_ROLE: usize = 0;

// ---------------------------------------------------------------------------
// SyncOptions
// ---------------------------------------------------------------------------

/// Bounds on the bootstrap handshake: how many times to broadcast the sync
/// request and how long to wait after each attempt.
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub attempts: u32,
    pub timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout: Duration::from_secs(5),
        }
    }
}

// ---------------------------------------------------------------------------
// SyncEngine
// ---------------------------------------------------------------------------

/// Protocol state machine for one panel: status, authoritative store, and
/// the event-application rules. The only network-side writer of the store.
pub struct SyncEngine {
    role_id: usize,
    /// Initial group state for a coordinator that finds nobody to sync
    /// from; `None` for every other role.
    seed: Option<BTreeMap<usize, ChannelState>>,
    status: PanelStatus,
    store: StateStore,
    presentation: Arc<dyn Presentation>,
}

impl SyncEngine {
    pub fn new(
        role_id: usize,
        seed: Option<BTreeMap<usize, ChannelState>>,
        presentation: Arc<dyn Presentation>,
    ) -> Self {
        Self {
            role_id,
            seed,
            status: PanelStatus::Connecting,
            store: StateStore::new(),
            presentation,
        }
    }

    pub fn status(&self) -> &PanelStatus {
        &self.status
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn role_id(&self) -> usize {
        self.role_id
    }

    pub fn is_coordinator(&self) -> bool {
        self.role_id == COORDINATOR_ROLE
    }

    /// Move to a new status, notifying the presentation layer on change.
    pub fn set_status(&mut self, status: PanelStatus) {
        if self.status != status {
            log::info!("panel status: {:?} -> {:?}", self.status, status);
            self.status = status;
            self.presentation.status_changed(&self.status);
        }
    }

    /// The handshake request this panel broadcasts.
    pub fn sync_request(&self) -> PanelEvent {
        PanelEvent::SyncRequest {
            role_id: self.role_id,
        }
    }

    /// Drop all synced state (teardown).
    pub fn reset(&mut self) {
        self.store.clear();
    }

    // -----------------------------------------------------------------------
    // Event application
    // -----------------------------------------------------------------------

    /// Decode and apply a raw inbound payload. Undecodable payloads are
    /// logged and dropped; they are never fatal.
    pub fn apply_value(&mut self, payload: &Value) -> Option<PanelEvent> {
        match PanelEvent::from_value(payload) {
            Ok(event) => self.apply(event),
            Err(err) => {
                log::warn!("ignoring inbound payload: {err}");
                None
            }
        }
    }

    /// Apply one event to the store. Returns a reply to broadcast when the
    /// event warrants one (coordinator answering a sync request).
    ///
    /// This same path performs the optimistic local apply after a command's
    /// publish succeeds, so local and remote mutations cannot diverge.
    pub fn apply(&mut self, event: PanelEvent) -> Option<PanelEvent> {
        match event {
            PanelEvent::TalkStatusChange {
                channel_id,
                talking,
                ..
            } => {
                if self.store.set_talking(channel_id, talking) {
                    self.presentation
                        .indicator_changed(Indicator::Talk, channel_id);
                } else {
                    log::warn!("talk change for unknown channel {channel_id}, ignored");
                }
                None
            }

            PanelEvent::ListenStatusChange {
                channel_id,
                listening,
                ..
            } => {
                if self.store.set_listening(channel_id, listening) {
                    self.presentation
                        .indicator_changed(Indicator::Listen, channel_id);
                } else {
                    log::warn!("listen change for unknown channel {channel_id}, ignored");
                }
                None
            }

            PanelEvent::VolumeChange {
                channel_id, volume, ..
            } => {
                if self.store.set_volume(channel_id, volume) {
                    self.presentation.set_variable_values(vec![(
                        format!("volume{channel_id}"),
                        self.store.volume(channel_id),
                    )]);
                } else {
                    log::warn!("volume change for unknown channel {channel_id}, ignored");
                }
                None
            }

            PanelEvent::SyncResponse { state } => {
                log::info!("sync response received ({} channels)", state.len());
                self.adopt_state(state);
                None
            }

            PanelEvent::SyncRequest { role_id } => {
                if self.is_coordinator() && self.status.is_ready() {
                    log::info!("answering sync request from role {role_id}");
                    Some(PanelEvent::SyncResponse {
                        state: self.store.snapshot(),
                    })
                } else {
                    None
                }
            }
        }
    }

    /// Coordinator fallback when the handshake exhausts its attempts with
    /// no response: adopt the configured matrix row as the group state.
    /// Returns whether anything was seeded.
    pub fn seed_if_unsynced(&mut self) -> bool {
        if self.status.is_ready() {
            return false;
        }
        match self.seed.clone() {
            Some(seed) => {
                log::info!("no sync response; coordinator seeding group state from config");
                self.adopt_state(seed);
                true
            }
            None => false,
        }
    }

    /// Wholesale state adoption: replace the store, regenerate the derived
    /// variable set to match the new channel set, and re-evaluate every
    /// indicator.
    fn adopt_state(&mut self, state: BTreeMap<usize, ChannelState>) {
        self.store.replace_all(state);
        self.presentation
            .define_variables(self.store.variable_definitions());
        self.presentation
            .set_variable_values(self.store.variable_values());
        self.presentation.refresh_indicators();
        self.set_status(PanelStatus::Ready);
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("role_id", &self.role_id)
            .field("status", &self.status)
            .field("channels", &self.store.channel_ids().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Handshake driver
// ---------------------------------------------------------------------------

/// Build the coordinator's seed state from its configured matrix row.
pub fn seed_from_matrix_row(row: &RoleRow) -> BTreeMap<usize, ChannelState> {
    row.channels
        .iter()
        .enumerate()
        .map(|(channel_id, entry)| {
            (
                channel_id,
                ChannelState {
                    channel_name: entry.channel_name.clone(),
                    talking: entry.talking,
                    listening: entry.listen_active,
                    volume: entry.volume,
                },
            )
        })
        .collect()
}

/// Drive the bounded sync handshake: broadcast the request, wait, repeat
/// up to `options.attempts` times, stopping early once a response has made
/// the engine `Ready`. On exhaustion a coordinator seeds itself; any other
/// panel stays `Syncing` — stalled and observable, never fatal.
pub async fn run_handshake(
    transport: Arc<dyn Broadcast>,
    topic: String,
    identity: String,
    engine: Arc<Mutex<SyncEngine>>,
    options: SyncOptions,
) {
    for attempt in 1..=options.attempts {
        if engine.lock().status().is_ready() {
            return;
        }

        let request = engine.lock().sync_request();
        log::info!("sending sync request (attempt {attempt}/{})", options.attempts);
        match transport.send(&topic, &identity, request).await {
            Ok(()) => engine.lock().set_status(PanelStatus::Syncing),
            Err(err) => log::warn!("sync request publish failed: {err}"),
        }

        tokio::time::sleep(options.timeout).await;
    }

    let mut engine = engine.lock();
    if engine.status().is_ready() {
        return;
    }
    if !engine.seed_if_unsynced() {
        log::warn!(
            "sync handshake exhausted after {} attempts; panel remains unsynced",
            options.attempts
        );
    }
}
