use crate::state::SourceKey;

pub use mute_protocol::{obs, wave_link};

/// What a client reports to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Transport is up and discovery finished; `None` when no input qualified.
    Connected(Option<String>),
    Disconnected,
    MuteChanged(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEvent {
    pub source: SourceKey,
    pub event: ClientEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Connect,
}
