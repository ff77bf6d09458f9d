//! Panel instance lifecycle.
//!
//! A [`PanelInstance`] wires one control surface into a session: it
//! resolves the intercom configuration through the directory, validates
//! the operator identity, subscribes to the broadcast topic, runs the sync
//! handshake, and then serves commands and point reads until teardown.
//!
//! All collaborators come in through constructor-injected trait objects,
//! so the whole lifecycle runs against in-memory fakes in tests.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::commands::CommandDispatcher;
use crate::config::{Choice, IntercomConfig, PanelConfig};
use crate::directory::Directory;
use crate::errors::{DirectoryError, PanelError};
use crate::presentation::{PanelStatus, Presentation};
use crate::sync::{
    run_handshake, seed_from_matrix_row, SyncEngine, SyncOptions, COORDINATOR_ROLE,
};
use crate::transport::{Broadcast, Subscription};

/// One control-surface panel participating in a session.
pub struct PanelInstance {
    instance_id: Uuid,
    config: PanelConfig,
    directory: Arc<dyn Directory>,
    transport: Arc<dyn Broadcast>,
    presentation: Arc<dyn Presentation>,
    sync_options: SyncOptions,

    /// Status before the engine exists; the engine owns it afterwards.
    status: PanelStatus,
    intercom: Option<Arc<IntercomConfig>>,
    channel_choices: Vec<Choice>,
    role_choices: Vec<Choice>,
    engine: Option<Arc<Mutex<SyncEngine>>>,
    dispatcher: Option<CommandDispatcher>,
    event_loop: Option<JoinHandle<()>>,
    handshake: Option<JoinHandle<()>>,
}

impl PanelInstance {
    pub fn new(
        config: PanelConfig,
        directory: Arc<dyn Directory>,
        transport: Arc<dyn Broadcast>,
        presentation: Arc<dyn Presentation>,
    ) -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            config,
            directory,
            transport,
            presentation,
            sync_options: SyncOptions::default(),
            status: PanelStatus::Connecting,
            intercom: None,
            channel_choices: Vec::new(),
            role_choices: Vec::new(),
            engine: None,
            dispatcher: None,
            event_loop: None,
            handshake: None,
        }
    }

    pub fn with_sync_options(mut self, options: SyncOptions) -> Self {
        self.sync_options = options;
        self
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Bring the panel up: directory lookup, identity validation,
    /// subscription, sync handshake. Configuration failures leave the panel
    /// in a persistent bad-config status with a human-readable reason and
    /// are also returned as errors.
    pub async fn init(&mut self) -> Result<(), PanelError> {
        log::info!("Initialising panel {}", self.instance_id);
        self.teardown();
        // Drop any previous session so a re-init cannot read stale state.
        self.engine = None;
        self.dispatcher = None;
        self.intercom = None;
        self.channel_choices.clear();
        self.role_choices.clear();
        self.set_status(PanelStatus::Connecting);

        if self.config.intercom_name.is_empty() {
            return self.bad_config("Intercom name not set");
        }

        log::info!("Fetching intercom configuration");
        let intercom = match self
            .directory
            .intercom_config(&self.config.intercom_name)
            .await
        {
            Ok(config) => Arc::new(config),
            Err(DirectoryError::IntercomNotFound { .. }) => {
                return self.bad_config("Intercom not found");
            }
            Err(err) => return self.bad_config(&err.to_string()),
        };
        log::info!(
            "Intercom configuration loaded: {} channels, {} roles",
            intercom.channels.len(),
            intercom.roles.len()
        );

        self.channel_choices = intercom.channel_choices();
        self.role_choices = intercom.role_choices();

        if self.config.companion_identity.is_empty() {
            return self.bad_config("User ID not set");
        }
        match self
            .directory
            .validate_identity(&self.config.companion_identity)
            .await
        {
            Ok(()) => log::info!("Companion ID found"),
            Err(DirectoryError::IdentityNotFound { .. }) => {
                return self.bad_config("Companion ID not found");
            }
            Err(DirectoryError::MalformedIdentity { .. }) => {
                return self.bad_config("Invalid User ID");
            }
            Err(err) => return self.bad_config(&err.to_string()),
        }

        let role_id = match self.config.role_id {
            Some(role_id) if role_id < intercom.roles.len() => role_id,
            Some(_) => return self.bad_config("Role not found"),
            None => return self.bad_config("Role not set"),
        };

        // Only the coordinator carries a fallback seed; everyone else must
        // sync from the group.
        let seed = if role_id == COORDINATOR_ROLE {
            intercom.role_row(role_id).map(seed_from_matrix_row)
        } else {
            None
        };

        let engine = Arc::new(Mutex::new(SyncEngine::new(
            role_id,
            seed,
            self.presentation.clone(),
        )));

        let topic = self.config.intercom_name.clone();
        let identity = self.config.companion_identity.clone();

        log::info!("Connecting to intercom {topic}");
        let subscription = match self.transport.subscribe(&topic, &identity).await {
            Ok(subscription) => subscription,
            Err(err) => {
                // Stalled, not dead: status stays Connecting so the
                // condition is visible, and the error reaches the caller.
                log::error!("subscribe failed, panel stalled: {err}");
                self.engine = Some(engine);
                return Err(err.into());
            }
        };

        self.event_loop = Some(tokio::spawn(run_event_loop(
            subscription,
            engine.clone(),
            self.transport.clone(),
            topic.clone(),
            identity.clone(),
        )));

        self.handshake = Some(tokio::spawn(run_handshake(
            self.transport.clone(),
            topic.clone(),
            identity.clone(),
            engine.clone(),
            self.sync_options,
        )));

        self.dispatcher = Some(CommandDispatcher::new(
            topic,
            identity,
            intercom.clone(),
            self.transport.clone(),
            engine.clone(),
        ));
        self.intercom = Some(intercom);
        self.engine = Some(engine);
        Ok(())
    }

    /// Re-run the full init with a new configuration.
    pub async fn config_updated(&mut self, config: PanelConfig) -> Result<(), PanelError> {
        self.config = config;
        self.init().await
    }

    /// Tear the panel down: stop background tasks, drop the subscription,
    /// discard the synced state.
    pub fn destroy(&mut self) {
        log::debug!("destroy panel {}", self.instance_id);
        self.teardown();
        if let Some(engine) = &self.engine {
            engine.lock().reset();
        }
        self.engine = None;
        self.dispatcher = None;
        self.intercom = None;
    }

    fn teardown(&mut self) {
        if let Some(handle) = self.handshake.take() {
            handle.abort();
        }
        if let Some(handle) = self.event_loop.take() {
            handle.abort();
        }
    }

    fn set_status(&mut self, status: PanelStatus) {
        self.status = status;
        self.presentation.status_changed(&self.status);
    }

    fn bad_config(&mut self, reason: &str) -> Result<(), PanelError> {
        log::error!("{reason}");
        self.set_status(PanelStatus::BadConfig(reason.to_string()));
        Err(PanelError::Configuration {
            reason: reason.to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // Read surface
    // -----------------------------------------------------------------------

    pub fn status(&self) -> PanelStatus {
        match &self.engine {
            Some(engine) => engine.lock().status().clone(),
            None => self.status.clone(),
        }
    }

    /// Command surface; `None` until init succeeds.
    pub fn dispatcher(&self) -> Option<&CommandDispatcher> {
        self.dispatcher.as_ref()
    }

    /// The resolved session configuration; `None` until init succeeds.
    pub fn intercom(&self) -> Option<&IntercomConfig> {
        self.intercom.as_deref()
    }

    /// Channel dropdown choices for the config UI.
    pub fn channel_choices(&self) -> &[Choice] {
        &self.channel_choices
    }

    /// Role dropdown choices for the config UI.
    pub fn role_choices(&self) -> &[Choice] {
        &self.role_choices
    }

    // Indicator reads degrade to neutral values; they never fail, even on
    // an uninitialised panel.

    pub fn talking(&self, channel_id: usize) -> bool {
        self.engine
            .as_ref()
            .map(|engine| engine.lock().store().talking(channel_id))
            .unwrap_or(false)
    }

    pub fn listening(&self, channel_id: usize) -> bool {
        self.engine
            .as_ref()
            .map(|engine| engine.lock().store().listening(channel_id))
            .unwrap_or(false)
    }

    pub fn volume(&self, channel_id: usize) -> u8 {
        self.engine
            .as_ref()
            .map(|engine| engine.lock().store().volume(channel_id))
            .unwrap_or(0)
    }
}

impl Drop for PanelInstance {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for PanelInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanelInstance")
            .field("instance_id", &self.instance_id)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// Feed inbound envelopes through the engine; publish any reply the engine
/// produces (the coordinator answering a sync request). Runs until the
/// subscription closes or the panel is torn down.
async fn run_event_loop(
    mut subscription: Subscription,
    engine: Arc<Mutex<SyncEngine>>,
    transport: Arc<dyn Broadcast>,
    topic: String,
    identity: String,
) {
    while let Some(envelope) = subscription.recv().await {
        log::debug!("message received on {topic}");
        let reply = engine.lock().apply_value(&envelope.payload);
        if let Some(reply) = reply {
            if let Err(err) = transport.send(&topic, &identity, reply).await {
                log::warn!("failed to publish sync response: {err}");
            }
        }
    }
    log::debug!("event loop for {topic} ended");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::{IntercomConfig, MatrixEntry, RoleRow};
    use crate::directory::StaticDirectory;
    use crate::events::PanelEvent;
    use crate::presentation::NullPresentation;
    use crate::transport::LoopbackTransport;

    const INTERCOM: &str = "main-show";

    fn intercom_config() -> IntercomConfig {
        IntercomConfig {
            channels: vec!["Stage".to_string(), "FOH".to_string()],
            roles: vec!["Director".to_string(), "A2".to_string()],
            matrix: vec![
                RoleRow {
                    channels: vec![
                        MatrixEntry {
                            channel_name: "Stage".to_string(),
                            talking: false,
                            listen_active: true,
                            volume: 80,
                        },
                        MatrixEntry {
                            channel_name: "FOH".to_string(),
                            talking: false,
                            listen_active: false,
                            volume: 100,
                        },
                    ],
                },
                RoleRow { channels: Vec::new() },
            ],
        }
    }

    fn fixture() -> (Arc<StaticDirectory>, Arc<LoopbackTransport>, String) {
        let identity = Uuid::new_v4().to_string();
        let directory = Arc::new(
            StaticDirectory::new()
                .with_intercom(INTERCOM, intercom_config())
                .with_identity(identity.clone()),
        );
        let transport = Arc::new(LoopbackTransport::new());
        (directory, transport, identity)
    }

    fn panel(
        directory: &Arc<StaticDirectory>,
        transport: &Arc<LoopbackTransport>,
        identity: &str,
        role_id: usize,
    ) -> PanelInstance {
        PanelInstance::new(
            PanelConfig {
                companion_identity: identity.to_string(),
                intercom_name: INTERCOM.to_string(),
                role_id: Some(role_id),
            },
            directory.clone(),
            transport.clone(),
            Arc::new(NullPresentation),
        )
        .with_sync_options(SyncOptions {
            attempts: 2,
            timeout: Duration::from_millis(30),
        })
    }

    async fn wait_until(deadline: Duration, condition: impl Fn() -> bool) -> bool {
        let limit = tokio::time::Instant::now() + deadline;
        loop {
            if condition() {
                return true;
            }
            if tokio::time::Instant::now() >= limit {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_bad_config_reasons() {
        let (directory, transport, identity) = fixture();

        let cases: Vec<(PanelConfig, &str)> = vec![
            (
                PanelConfig {
                    companion_identity: identity.clone(),
                    intercom_name: String::new(),
                    role_id: Some(0),
                },
                "Intercom name not set",
            ),
            (
                PanelConfig {
                    companion_identity: identity.clone(),
                    intercom_name: "other-show".to_string(),
                    role_id: Some(0),
                },
                "Intercom not found",
            ),
            (
                PanelConfig {
                    companion_identity: String::new(),
                    intercom_name: INTERCOM.to_string(),
                    role_id: Some(0),
                },
                "User ID not set",
            ),
            (
                PanelConfig {
                    companion_identity: Uuid::new_v4().to_string(),
                    intercom_name: INTERCOM.to_string(),
                    role_id: Some(0),
                },
                "Companion ID not found",
            ),
            (
                PanelConfig {
                    companion_identity: "not-a-uuid".to_string(),
                    intercom_name: INTERCOM.to_string(),
                    role_id: Some(0),
                },
                "Invalid User ID",
            ),
            (
                PanelConfig {
                    companion_identity: identity.clone(),
                    intercom_name: INTERCOM.to_string(),
                    role_id: None,
                },
                "Role not set",
            ),
            (
                PanelConfig {
                    companion_identity: identity.clone(),
                    intercom_name: INTERCOM.to_string(),
                    role_id: Some(9),
                },
                "Role not found",
            ),
        ];

        for (config, reason) in cases {
            let mut panel = PanelInstance::new(
                config,
                directory.clone(),
                transport.clone(),
                Arc::new(NullPresentation),
            );
            let err = panel.init().await.unwrap_err();
            assert!(
                matches!(&err, PanelError::Configuration { reason: r } if r == reason),
                "expected reason {reason:?}, got {err:?}"
            );
            assert_eq!(panel.status(), PanelStatus::BadConfig(reason.to_string()));
        }
    }

    #[tokio::test]
    async fn test_reads_on_uninitialised_panel_are_neutral() {
        let (directory, transport, identity) = fixture();
        let panel = panel(&directory, &transport, &identity, 1);
        assert!(!panel.talking(0));
        assert!(!panel.listening(0));
        assert_eq!(panel.volume(0), 0);
        assert_eq!(panel.status(), PanelStatus::Connecting);
    }

    #[tokio::test]
    async fn test_coordinator_seeds_itself_when_alone() {
        let (directory, transport, identity) = fixture();
        let mut coordinator = panel(&directory, &transport, &identity, 0);
        coordinator.init().await.unwrap();

        assert!(
            wait_until(Duration::from_secs(2), || coordinator.status()
                == PanelStatus::Ready)
            .await
        );
        // Seeded from the role-0 matrix row.
        assert!(coordinator.listening(0));
        assert!(!coordinator.listening(1));
        assert_eq!(coordinator.volume(0), 80);
        assert_eq!(coordinator.volume(1), 100);
        assert_eq!(coordinator.channel_choices().len(), 2);
        assert_eq!(coordinator.role_choices().len(), 2);
        assert_eq!(coordinator.intercom().unwrap().channels.len(), 2);
    }

    #[tokio::test]
    async fn test_joiner_syncs_from_ready_coordinator() {
        let (directory, transport, identity) = fixture();
        let mut coordinator = panel(&directory, &transport, &identity, 0);
        coordinator.init().await.unwrap();
        assert!(
            wait_until(Duration::from_secs(2), || coordinator.status()
                == PanelStatus::Ready)
            .await
        );

        let mut joiner = panel(&directory, &transport, &identity, 1);
        joiner.init().await.unwrap();
        assert!(
            wait_until(Duration::from_secs(2), || joiner.status() == PanelStatus::Ready).await
        );

        assert!(joiner.listening(0));
        assert_eq!(joiner.volume(0), 80);
        assert_eq!(joiner.volume(1), 100);
    }

    #[tokio::test]
    async fn test_commands_converge_across_panels() {
        let (directory, transport, identity) = fixture();
        let mut coordinator = panel(&directory, &transport, &identity, 0);
        coordinator.init().await.unwrap();
        assert!(
            wait_until(Duration::from_secs(2), || coordinator.status()
                == PanelStatus::Ready)
            .await
        );

        let mut joiner = panel(&directory, &transport, &identity, 1);
        joiner.init().await.unwrap();
        assert!(
            wait_until(Duration::from_secs(2), || joiner.status() == PanelStatus::Ready).await
        );

        // Joiner toggles talk; the coordinator converges to the same value.
        let new_talking = joiner.dispatcher().unwrap().toggle_talk(0).await.unwrap();
        assert!(new_talking);
        assert!(wait_until(Duration::from_secs(2), || coordinator.talking(0)).await);

        // Coordinator sets an out-of-range volume; both store the clamp.
        let stored = coordinator
            .dispatcher()
            .unwrap()
            .set_volume(1, 120)
            .await
            .unwrap();
        assert_eq!(stored, 100);
        assert!(wait_until(Duration::from_secs(2), || joiner.volume(1) == 100).await);
    }

    #[tokio::test]
    async fn test_conflicting_volume_events_resolve_last_write_wins() {
        let (directory, transport, identity) = fixture();
        let mut coordinator = panel(&directory, &transport, &identity, 0);
        coordinator.init().await.unwrap();
        assert!(
            wait_until(Duration::from_secs(2), || coordinator.status()
                == PanelStatus::Ready)
            .await
        );

        // Two racing writers; the panel applies whichever it receives last.
        for volume in [30, 60] {
            transport
                .send(
                    INTERCOM,
                    &identity,
                    PanelEvent::VolumeChange {
                        channel_name: "Stage".to_string(),
                        channel_id: 0,
                        volume,
                    },
                )
                .await
                .unwrap();
        }
        assert!(wait_until(Duration::from_secs(2), || coordinator.volume(0) == 60).await);

        // Redelivery of the winning event is a no-op.
        transport
            .send(
                INTERCOM,
                &identity,
                PanelEvent::VolumeChange {
                    channel_name: "Stage".to_string(),
                    channel_id: 0,
                    volume: 60,
                },
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(coordinator.volume(0), 60);
    }

    #[tokio::test]
    async fn test_config_updated_replaces_session() {
        let (directory, transport, identity) = fixture();
        let mut instance = panel(&directory, &transport, &identity, 0);
        instance.init().await.unwrap();
        assert!(
            wait_until(Duration::from_secs(2), || instance.status() == PanelStatus::Ready).await
        );

        // Reconfiguring onto an unknown session surfaces the new bad config,
        // not the previous session's Ready status or state.
        let err = instance
            .config_updated(PanelConfig {
                companion_identity: identity.clone(),
                intercom_name: "other-show".to_string(),
                role_id: Some(0),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PanelError::Configuration { .. }));
        assert_eq!(
            instance.status(),
            PanelStatus::BadConfig("Intercom not found".to_string())
        );
        assert_eq!(instance.volume(0), 0);
    }

    #[tokio::test]
    async fn test_destroy_discards_state() {
        let (directory, transport, identity) = fixture();
        let mut coordinator = panel(&directory, &transport, &identity, 0);
        coordinator.init().await.unwrap();
        assert!(
            wait_until(Duration::from_secs(2), || coordinator.status()
                == PanelStatus::Ready)
            .await
        );

        coordinator.destroy();
        assert_eq!(coordinator.volume(0), 0);
        assert!(coordinator.dispatcher().is_none());
    }
}
