//! Watches Elgato Wave Link and OBS Studio for the microphone mute state and
//! merges both into one flag.

pub mod aggregator;
pub mod client;
pub mod config;
pub mod main_loop;
pub mod net;
pub mod obs;
pub mod protocol;
pub mod rpc;
pub mod state;
pub mod wave_link;

pub use aggregator::{MuteAggregator, SourceMap};
pub use client::{ClientHandle, ClientTimings};
pub use config::{Config, ConfigManager};
pub use main_loop::{MainLoop, Presenter};
pub use protocol::{ClientEvent, SourceEvent};
pub use state::{SourceKey, SourceState};
