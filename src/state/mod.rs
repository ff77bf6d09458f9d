//! Per-panel mirror of the group-synchronized channel state.
//!
//! [`StateStore`] holds the latest known `{talking, listening, volume}` for
//! every channel. It is populated wholesale by a sync response, then updated
//! field-by-field as events arrive; command handlers apply the same
//! single-field writes after a successful publish. Reads are total: a
//! channel the store has never heard of reads as `false` / `0` / blank so
//! render-time callers never see an error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::presentation::VariableDefinition;

/// Clamp a requested volume into the storable `[0, 100]` range.
pub fn clamp_volume(requested: i64) -> u8 {
    requested.clamp(0, 100) as u8
}

/// Group-synchronized state of one channel. Also the wire shape used inside
/// a sync response, hence the camelCase rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelState {
    #[serde(rename = "channelName")]
    pub channel_name: String,
    pub talking: bool,
    pub listening: bool,
    pub volume: u8,
}

/// The panel's authoritative view of every channel, keyed by the stable
/// zero-based channel id.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    channels: BTreeMap<usize, ChannelState>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// True until the first sync response (or coordinator seed) lands.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Known channel ids, ascending.
    pub fn channel_ids(&self) -> Vec<usize> {
        self.channels.keys().copied().collect()
    }

    /// Full copy of the current state, e.g. for answering a sync request.
    pub fn snapshot(&self) -> BTreeMap<usize, ChannelState> {
        self.channels.clone()
    }

    // -----------------------------------------------------------------------
    // Writers
    // -----------------------------------------------------------------------

    /// Wholesale replacement from a sync response. Volumes are clamped so an
    /// out-of-range value from the wire can never be stored.
    pub fn replace_all(&mut self, mut state: BTreeMap<usize, ChannelState>) {
        for entry in state.values_mut() {
            entry.volume = clamp_volume(i64::from(entry.volume));
        }
        self.channels = state;
    }

    /// Drop everything (teardown).
    pub fn clear(&mut self) {
        self.channels.clear();
    }

    /// Set one channel's talk flag. Returns false if the channel is unknown;
    /// single-field events never allocate state.
    pub fn set_talking(&mut self, channel_id: usize, talking: bool) -> bool {
        match self.channels.get_mut(&channel_id) {
            Some(entry) => {
                entry.talking = talking;
                true
            }
            None => false,
        }
    }

    /// Set one channel's listen flag. Returns false if the channel is unknown.
    pub fn set_listening(&mut self, channel_id: usize, listening: bool) -> bool {
        match self.channels.get_mut(&channel_id) {
            Some(entry) => {
                entry.listening = listening;
                true
            }
            None => false,
        }
    }

    /// Set one channel's volume, clamped into `[0, 100]`. Returns false if
    /// the channel is unknown.
    pub fn set_volume(&mut self, channel_id: usize, requested: i64) -> bool {
        match self.channels.get_mut(&channel_id) {
            Some(entry) => {
                entry.volume = clamp_volume(requested);
                true
            }
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Point reads (total, neutral defaults)
    // -----------------------------------------------------------------------

    pub fn talking(&self, channel_id: usize) -> bool {
        self.channels
            .get(&channel_id)
            .map(|entry| entry.talking)
            .unwrap_or(false)
    }

    pub fn listening(&self, channel_id: usize) -> bool {
        self.channels
            .get(&channel_id)
            .map(|entry| entry.listening)
            .unwrap_or(false)
    }

    pub fn volume(&self, channel_id: usize) -> u8 {
        self.channels
            .get(&channel_id)
            .map(|entry| entry.volume)
            .unwrap_or(0)
    }

    /// Channel display name; blank for an unknown channel.
    pub fn channel_name(&self, channel_id: usize) -> String {
        self.channels
            .get(&channel_id)
            .map(|entry| entry.channel_name.clone())
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Derived variables
    // -----------------------------------------------------------------------

    /// One numeric variable per known channel, regenerated whenever the
    /// channel set changes so definitions and channels match exactly.
    pub fn variable_definitions(&self) -> Vec<VariableDefinition> {
        self.channels
            .iter()
            .map(|(channel_id, entry)| VariableDefinition {
                variable_id: format!("volume{channel_id}"),
                name: format!("{} Volume", entry.channel_name),
            })
            .collect()
    }

    /// Current value of every volume variable, seeded from the store.
    pub fn variable_values(&self) -> Vec<(String, u8)> {
        self.channels
            .iter()
            .map(|(channel_id, entry)| (format!("volume{channel_id}"), entry.volume))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(volume: u8) -> ChannelState {
        ChannelState {
            channel_name: "Stage".to_string(),
            talking: false,
            listening: true,
            volume,
        }
    }

    #[test]
    fn test_clamp_volume_bounds() {
        assert_eq!(clamp_volume(150), 100);
        assert_eq!(clamp_volume(-5), 0);
        assert_eq!(clamp_volume(0), 0);
        assert_eq!(clamp_volume(100), 100);
        assert_eq!(clamp_volume(42), 42);
    }

    #[test]
    fn test_unknown_channel_reads_are_neutral() {
        let store = StateStore::new();
        assert!(!store.talking(7));
        assert!(!store.listening(7));
        assert_eq!(store.volume(7), 0);
        assert_eq!(store.channel_name(7), "");
    }

    #[test]
    fn test_single_field_writes_never_allocate() {
        let mut store = StateStore::new();
        assert!(!store.set_talking(0, true));
        assert!(!store.set_volume(0, 50));
        assert!(store.is_empty());
    }

    #[test]
    fn test_replace_all_then_point_reads() {
        let mut store = StateStore::new();
        store.replace_all(BTreeMap::from([(0, stage(80))]));
        assert!(!store.talking(0));
        assert!(store.listening(0));
        assert_eq!(store.volume(0), 80);
        assert_eq!(store.channel_name(0), "Stage");
    }

    #[test]
    fn test_replace_all_clamps_wire_volumes() {
        let mut store = StateStore::new();
        store.replace_all(BTreeMap::from([(0, stage(250))]));
        assert_eq!(store.volume(0), 100);
    }

    #[test]
    fn test_volume_last_write_wins_and_idempotent() {
        let mut store = StateStore::new();
        store.replace_all(BTreeMap::from([(0, stage(10))]));
        assert!(store.set_volume(0, 30));
        assert!(store.set_volume(0, 70));
        assert_eq!(store.volume(0), 70);
        // Re-applying the same value changes nothing.
        assert!(store.set_volume(0, 70));
        assert_eq!(store.volume(0), 70);
    }

    #[test]
    fn test_variables_track_channel_set() {
        let mut store = StateStore::new();
        store.replace_all(BTreeMap::from([
            (0, stage(80)),
            (
                1,
                ChannelState {
                    channel_name: "FOH".to_string(),
                    talking: true,
                    listening: false,
                    volume: 55,
                },
            ),
        ]));

        let defs = store.variable_definitions();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].variable_id, "volume0");
        assert_eq!(defs[0].name, "Stage Volume");
        assert_eq!(defs[1].variable_id, "volume1");
        assert_eq!(defs[1].name, "FOH Volume");
        assert_eq!(
            store.variable_values(),
            vec![("volume0".to_string(), 80), ("volume1".to_string(), 55)]
        );

        // Resync to a smaller channel set: definitions shrink to match.
        store.replace_all(BTreeMap::from([(0, stage(12))]));
        assert_eq!(store.variable_definitions().len(), 1);
        assert_eq!(store.variable_values(), vec![("volume0".to_string(), 12)]);
    }
}
