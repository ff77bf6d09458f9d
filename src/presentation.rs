//! Contract between the panel and the external render layer.
//!
//! The presentation layer owns buttons, feedback styling and variable
//! display; this crate only tells it *what* changed. All calls are
//! fire-and-forget notifications: implementations must not fail, and the
//! panel never blocks on them.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Panel status
// ---------------------------------------------------------------------------

/// Externally visible lifecycle status of a panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PanelStatus {
    /// Startup: directory lookup and subscription in progress. A panel
    /// whose subscribe call failed stays here — stalled, not crashed.
    Connecting,
    /// Subscribed and waiting for the group's sync response.
    Syncing,
    /// Synced with the group; commands are accepted.
    Ready,
    /// Fatal configuration problem with a human-readable reason. Persistent:
    /// the panel does not retry on its own.
    BadConfig(String),
}

impl PanelStatus {
    /// Whether the sync handshake has completed.
    pub fn is_ready(&self) -> bool {
        matches!(self, PanelStatus::Ready)
    }
}

// ---------------------------------------------------------------------------
// Indicators and variables
// ---------------------------------------------------------------------------

/// Boolean per-channel indicator kinds the render layer can display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indicator {
    Talk,
    Listen,
}

/// Definition of one exposed numeric variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDefinition {
    /// Stable id, e.g. `volume0` for channel 0.
    pub variable_id: String,
    /// Display name, e.g. `"Stage Volume"`.
    pub name: String,
}

// ---------------------------------------------------------------------------
// Presentation trait
// ---------------------------------------------------------------------------

/// Read-only render layer notifications.
pub trait Presentation: Send + Sync {
    /// One indicator for one channel needs re-evaluation.
    fn indicator_changed(&self, indicator: Indicator, channel_id: usize);

    /// Every indicator needs re-evaluation (after a full resync).
    fn refresh_indicators(&self);

    /// The exposed variable set changed; replaces any previous definitions.
    fn define_variables(&self, definitions: Vec<VariableDefinition>);

    /// Push new values for already-defined variables.
    fn set_variable_values(&self, values: Vec<(String, u8)>);

    /// The panel's lifecycle status changed.
    fn status_changed(&self, status: &PanelStatus);
}

/// Presentation sink that ignores everything. Useful for headless panels.
#[derive(Debug, Default)]
pub struct NullPresentation;

impl Presentation for NullPresentation {
    fn indicator_changed(&self, _indicator: Indicator, _channel_id: usize) {}
    fn refresh_indicators(&self) {}
    fn define_variables(&self, _definitions: Vec<VariableDefinition>) {}
    fn set_variable_values(&self, _values: Vec<(String, u8)>) {}
    fn status_changed(&self, _status: &PanelStatus) {}
}

// ---------------------------------------------------------------------------
// Recording implementation
// ---------------------------------------------------------------------------

/// Everything a [`RecordingPresentation`] has been told, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum PresentationCall {
    IndicatorChanged(Indicator, usize),
    RefreshIndicators,
    DefineVariables(Vec<VariableDefinition>),
    SetVariableValues(Vec<(String, u8)>),
    StatusChanged(PanelStatus),
}

/// Presentation sink that records every notification. Used by tests and
/// by embedders that want to inspect what the panel surfaced.
#[derive(Debug, Default)]
pub struct RecordingPresentation {
    calls: Mutex<Vec<PresentationCall>>,
}

impl RecordingPresentation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded calls.
    pub fn calls(&self) -> Vec<PresentationCall> {
        self.calls.lock().clone()
    }

    /// The most recent status notification, if any.
    pub fn last_status(&self) -> Option<PanelStatus> {
        self.calls
            .lock()
            .iter()
            .rev()
            .find_map(|call| match call {
                PresentationCall::StatusChanged(status) => Some(status.clone()),
                _ => None,
            })
    }

    /// The most recent variable definition set, if any.
    pub fn last_definitions(&self) -> Option<Vec<VariableDefinition>> {
        self.calls
            .lock()
            .iter()
            .rev()
            .find_map(|call| match call {
                PresentationCall::DefineVariables(defs) => Some(defs.clone()),
                _ => None,
            })
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

impl Presentation for RecordingPresentation {
    fn indicator_changed(&self, indicator: Indicator, channel_id: usize) {
        self.calls
            .lock()
            .push(PresentationCall::IndicatorChanged(indicator, channel_id));
    }

    fn refresh_indicators(&self) {
        self.calls.lock().push(PresentationCall::RefreshIndicators);
    }

    fn define_variables(&self, definitions: Vec<VariableDefinition>) {
        self.calls
            .lock()
            .push(PresentationCall::DefineVariables(definitions));
    }

    fn set_variable_values(&self, values: Vec<(String, u8)>) {
        self.calls
            .lock()
            .push(PresentationCall::SetVariableValues(values));
    }

    fn status_changed(&self, status: &PanelStatus) {
        self.calls
            .lock()
            .push(PresentationCall::StatusChanged(status.clone()));
    }
}
