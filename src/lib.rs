//! # intercom-panel
//!
//! State synchronization for control-surface intercom panels that share
//! one logical session over an unordered, at-least-once broadcast channel.
//!
//! Each panel mirrors the group's per-channel `{talking, listening,
//! volume}` state locally, bootstraps it through a sync handshake, and
//! keeps it converged by applying single-field change events with a
//! last-write-wins policy. There is no central coordinator and no ordering
//! guarantee between publishers; consistency comes entirely from
//! idempotent, field-granular application.
//!
//! The directory service, the pub/sub transport, and the render layer are
//! external collaborators behind the [`directory::Directory`],
//! [`transport::Broadcast`], and [`presentation::Presentation`] seams.

pub mod commands;
pub mod config;
pub mod directory;
pub mod errors;
pub mod events;
pub mod panel;
pub mod presentation;
pub mod state;
pub mod sync;
pub mod transport;

pub use commands::CommandDispatcher;
pub use config::{IntercomConfig, PanelConfig};
pub use directory::{Directory, HttpDirectory, StaticDirectory};
pub use errors::{DirectoryError, PanelError, ProtocolError, StateError, TransportError};
pub use events::{Envelope, PanelEvent};
pub use panel::PanelInstance;
pub use presentation::{NullPresentation, PanelStatus, Presentation};
pub use state::{ChannelState, StateStore};
pub use sync::{SyncEngine, SyncOptions};
pub use transport::{Broadcast, LoopbackTransport, Subscription};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
