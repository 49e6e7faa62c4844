use crate::state::{SourceKey, SourceState};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

pub type SourceMap = BTreeMap<SourceKey, SourceState>;

/// Merges per-source states into one mute flag and announces the flag only
/// when it flips.
pub struct MuteAggregator {
    sources: SourceMap,
    last_emitted: Option<bool>,
    listeners: Vec<mpsc::UnboundedSender<bool>>,
}

impl Default for MuteAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MuteAggregator {
    pub fn new() -> Self {
        Self {
            sources: SourceKey::ALL
                .into_iter()
                .map(|key| (key, SourceState::Disabled))
                .collect(),
            last_emitted: None,
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<bool> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.push(tx);
        rx
    }

    /// Stores `state` for `source` and returns the combined value if this
    /// update changed what was last announced.
    pub fn set_source_state(&mut self, source: SourceKey, state: SourceState) -> Option<bool> {
        self.sources.insert(source, state);
        let muted = combined(&self.sources);
        if self.last_emitted == Some(muted) {
            return None;
        }
        self.last_emitted = Some(muted);
        self.listeners.retain(|tx| tx.send(muted).is_ok());
        Some(muted)
    }

    pub fn sources(&self) -> SourceMap {
        self.sources.clone()
    }

    pub fn source(&self, key: SourceKey) -> Option<&SourceState> {
        self.sources.get(&key)
    }

    pub fn is_muted(&self) -> bool {
        combined(&self.sources)
    }
}

fn combined(sources: &SourceMap) -> bool {
    sources.values().any(SourceState::is_muted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(name: &str, muted: bool) -> SourceState {
        SourceState::Connected {
            name: Some(name.to_string()),
            muted,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<bool>) -> Vec<bool> {
        let mut out = Vec::new();
        while let Ok(v) = rx.try_recv() {
            out.push(v);
        }
        out
    }

    #[test]
    fn all_disabled_is_unmuted() {
        let mut agg = MuteAggregator::new();
        assert!(!agg.is_muted());
        agg.set_source_state(SourceKey::WaveLink, SourceState::Disabled);
        agg.set_source_state(SourceKey::Obs, SourceState::Disabled);
        assert!(!agg.is_muted());
    }

    #[test]
    fn two_muted_sources_announce_once() {
        let mut agg = MuteAggregator::new();
        let mut rx = agg.subscribe();

        assert_eq!(agg.set_source_state(SourceKey::WaveLink, connected("Mic", true)), Some(true));
        assert_eq!(agg.set_source_state(SourceKey::Obs, connected("Input", true)), None);
        assert_eq!(drain(&mut rx), vec![true]);
    }

    #[test]
    fn first_update_is_always_announced() {
        let mut agg = MuteAggregator::new();
        let mut rx = agg.subscribe();
        assert_eq!(agg.set_source_state(SourceKey::Obs, SourceState::Disconnected), Some(false));
        assert_eq!(agg.set_source_state(SourceKey::Obs, SourceState::Disconnected), None);
        assert_eq!(drain(&mut rx), vec![false]);
    }

    #[test]
    fn any_muted_connected_source_wins() {
        let mut agg = MuteAggregator::new();
        agg.set_source_state(SourceKey::WaveLink, connected("Mic", false));
        agg.set_source_state(SourceKey::Obs, connected("Input", true));
        assert!(agg.is_muted());

        // Order of updates does not matter, only the snapshot.
        let mut other = MuteAggregator::new();
        other.set_source_state(SourceKey::Obs, connected("Input", true));
        other.set_source_state(SourceKey::WaveLink, connected("Mic", false));
        assert_eq!(agg.is_muted(), other.is_muted());

        assert_eq!(agg.set_source_state(SourceKey::Obs, SourceState::Disconnected), Some(false));
        assert!(!agg.is_muted());
    }

    #[test]
    fn disconnected_contributes_nothing() {
        let mut agg = MuteAggregator::new();
        agg.set_source_state(SourceKey::WaveLink, connected("Mic", true));
        assert_eq!(agg.set_source_state(SourceKey::WaveLink, SourceState::Disconnected), Some(false));
    }

    #[test]
    fn sources_returns_an_independent_copy() {
        let mut agg = MuteAggregator::new();
        agg.set_source_state(SourceKey::WaveLink, connected("Mic", false));

        let mut copy = agg.sources();
        copy.insert(SourceKey::Obs, connected("Input", true));
        copy.insert(SourceKey::WaveLink, connected("Mic", true));

        assert!(!agg.is_muted());
        assert_eq!(agg.source(SourceKey::Obs), Some(&SourceState::Disabled));
    }

    #[test]
    fn repeated_identical_updates_are_idempotent() {
        let mut agg = MuteAggregator::new();
        let mut rx = agg.subscribe();
        for _ in 0..3 {
            agg.set_source_state(SourceKey::WaveLink, connected("Mic", true));
            assert!(agg.is_muted());
        }
        assert_eq!(drain(&mut rx), vec![true]);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut agg = MuteAggregator::new();
        let rx = agg.subscribe();
        drop(rx);
        let mut live = agg.subscribe();
        agg.set_source_state(SourceKey::WaveLink, connected("Mic", true));
        assert_eq!(agg.listeners.len(), 1);
        assert_eq!(drain(&mut live), vec![true]);
    }
}
