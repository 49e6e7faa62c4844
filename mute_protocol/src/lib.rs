//! Wire types for the two mixer protocols watched by mute-border.
//!
//! `wave_link` is the JSON-RPC 2.0 dialect spoken by Elgato Wave Link,
//! `obs` is obs-websocket v5.

pub mod obs;
pub mod wave_link;
