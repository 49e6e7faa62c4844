use crate::protocol::ClientEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum SourceKey {
    WaveLink,
    Obs,
}

impl SourceKey {
    pub const ALL: [SourceKey; 2] = [SourceKey::WaveLink, SourceKey::Obs];

    pub fn label(self) -> &'static str {
        match self {
            SourceKey::WaveLink => "Wave Link",
            SourceKey::Obs => "OBS",
        }
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum SourceState {
    Disabled,
    Disconnected,
    Connected { name: Option<String>, muted: bool },
}

impl SourceState {
    pub fn is_muted(&self) -> bool {
        matches!(self, SourceState::Connected { muted: true, .. })
    }

    /// Next state after `event`. A disabled source never leaves `Disabled`;
    /// a mute report is only meaningful once the source is connected.
    /// Re-discovery of some input keeps the last known mute; losing the input
    /// clears it.
    pub fn apply(&self, event: &ClientEvent) -> SourceState {
        match (self, event) {
            (SourceState::Disabled, _) => SourceState::Disabled,
            (SourceState::Connected { muted, .. }, ClientEvent::Connected(Some(name))) => {
                SourceState::Connected {
                    name: Some(name.clone()),
                    muted: *muted,
                }
            }
            (_, ClientEvent::Connected(name)) => SourceState::Connected {
                name: name.clone(),
                muted: false,
            },
            (SourceState::Connected { name, .. }, ClientEvent::MuteChanged(muted)) => {
                SourceState::Connected {
                    name: name.clone(),
                    muted: *muted,
                }
            }
            (other, ClientEvent::MuteChanged(_)) => other.clone(),
            (_, ClientEvent::Disconnected) => SourceState::Disconnected,
        }
    }
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

    #[test]
    fn connect_then_mute() {
        let s = SourceState::Disconnected
            .apply(&ClientEvent::Connected(Some("Wave:3".into())))
            .apply(&ClientEvent::MuteChanged(true));
        assert_eq!(s, connected("Wave:3", true));
        assert!(s.is_muted());
    }

    #[test]
    fn rediscovery_keeps_last_known_mute() {
        let s = connected("Wave:3", true).apply(&ClientEvent::Connected(Some("Wave:1".into())));
        assert_eq!(s, connected("Wave:1", true));
    }

    #[test]
    fn losing_the_input_clears_mute() {
        let s = connected("Wave:3", true).apply(&ClientEvent::Connected(None));
        assert_eq!(
            s,
            SourceState::Connected {
                name: None,
                muted: false
            }
        );
        assert!(!s.is_muted());
    }

    #[test]
    fn mute_before_connect_is_ignored() {
        let s = SourceState::Disconnected.apply(&ClientEvent::MuteChanged(true));
        assert_eq!(s, SourceState::Disconnected);
    }

    #[test]
    fn disabled_is_sticky() {
        let s = SourceState::Disabled
            .apply(&ClientEvent::Connected(None))
            .apply(&ClientEvent::MuteChanged(true));
        assert_eq!(s, SourceState::Disabled);
    }

    #[test]
    fn disconnect_drops_everything() {
        assert_eq!(
            connected("Mic", true).apply(&ClientEvent::Disconnected),
            SourceState::Disconnected
        );
    }

    #[test]
    fn serializes_tagged() {
        let json = serde_json::to_value(connected("Mic", false)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "connected", "name": "Mic", "muted": false })
        );
        assert_eq!(serde_json::to_value(SourceKey::WaveLink).unwrap(), "waveLink");
    }
}
