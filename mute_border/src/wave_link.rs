//! Elgato Wave Link client.
//!
//! Wave Link speaks JSON-RPC 2.0 over a local websocket. On open we ask for
//! the input list, pick the hardware microphone, and from then on follow two
//! kinds of mute notification: hardware-level (`microphoneConfigChanged`,
//! keyed by the mic's sub-input ids) and mixer-level (`inputMuteChanged` on
//! the local mixer, keyed by the input id).

use crate::client::{ClientHandle, ClientTimings, Connection, EventSink, SessionEnd};
use crate::net::{self, Inbound, WsStream};
use crate::protocol::wave_link::{
    InputConfig, Notification, RpcMessage, RpcRequest, DEFAULT_URL, GET_INPUT_CONFIGS,
    LOCAL_MIXER_ID, MICROPHONE_MUTE_PROPERTY,
};
use crate::protocol::{ClientEvent, Control, SourceEvent};
use crate::rpc::{self, PendingCalls, RpcError, RpcResult};
use crate::state::SourceKey;
use futures_util::StreamExt;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct WaveLinkOptions {
    pub url: String,
    pub timings: ClientTimings,
}

impl Default for WaveLinkOptions {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            timings: ClientTimings::default(),
        }
    }
}

pub fn spawn(options: WaveLinkOptions, events: mpsc::UnboundedSender<SourceEvent>) -> ClientHandle {
    let reconnect_delay = options.timings.reconnect_delay;
    ClientHandle::spawn(
        SourceKey::WaveLink,
        WaveLinkConnection { options },
        reconnect_delay,
        events,
    )
}

/// The input being watched: its mixer identifier plus the hardware channels
/// that belong to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedMic {
    pub identifier: String,
    pub hardware_ids: HashSet<String>,
}

impl WatchedMic {
    fn from_input(input: &InputConfig) -> Self {
        Self {
            identifier: input.identifier.clone(),
            hardware_ids: input.inputs.iter().map(|s| s.identifier.clone()).collect(),
        }
    }

    fn mute_from(&self, notification: &Notification) -> Option<bool> {
        match notification {
            Notification::MicrophoneConfigChanged(ev) => {
                if ev.property == MICROPHONE_MUTE_PROPERTY && self.hardware_ids.contains(&ev.identifier) {
                    ev.value.as_bool()
                } else {
                    None
                }
            }
            Notification::InputMuteChanged(ev) => {
                (ev.identifier == self.identifier && ev.mixer_id == LOCAL_MIXER_ID).then_some(ev.value)
            }
            Notification::InputsChanged => None,
        }
    }
}

/// Decodes descriptors one by one; an entry that does not fit (an odd mixer
/// tuple on a virtual output, say) is skipped instead of failing the list.
fn decode_inputs(value: Value) -> Result<Vec<InputConfig>, RpcError> {
    let Value::Array(entries) = value else {
        return Err(RpcError::Decode("input configs must be an array".to_string()));
    };
    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<InputConfig>(entry) {
            Ok(input) => Some(input),
            Err(e) => {
                debug!(error = %e, "skipping undecodable input descriptor");
                None
            }
        })
        .collect())
}

/// First available input flagged as the Wave hardware mic.
pub fn select_mic(inputs: &[InputConfig]) -> Option<&InputConfig> {
    inputs.iter().find(|i| i.is_wave_mic_input && i.is_available)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Emit(ClientEvent),
    Send(String),
}

/// Protocol state for one open connection. A fresh session is created for
/// every transport, so nothing learned on a previous connection survives.
pub struct WaveLinkSession {
    calls: PendingCalls,
    watched: Option<WatchedMic>,
    discovery: Option<oneshot::Receiver<RpcResult>>,
    open: bool,
}

impl WaveLinkSession {
    pub fn new(rpc_timeout: Duration) -> Self {
        Self {
            calls: PendingCalls::new(rpc_timeout),
            watched: None,
            discovery: None,
            open: true,
        }
    }

    pub fn watched(&self) -> Option<&WatchedMic> {
        self.watched.as_ref()
    }

    pub fn pending_calls(&self) -> usize {
        self.calls.len()
    }

    /// Registers a call and returns the frame to send along with the handle
    /// its outcome arrives on.
    pub fn call(
        &mut self,
        method: &str,
        params: Option<Value>,
        now: Instant,
    ) -> Result<(String, oneshot::Receiver<RpcResult>), RpcError> {
        if !self.open {
            return Err(RpcError::NotConnected);
        }
        let (id, rx) = self.calls.issue(method, now);
        let frame = serde_json::to_string(&RpcRequest::new(id, method, params))
            .map_err(|e| RpcError::Decode(e.to_string()))?;
        Ok((frame, rx))
    }

    /// (Re)runs input discovery. A discovery already in flight is superseded;
    /// its response is still consumed but nobody listens to it.
    pub fn start_discovery(&mut self, now: Instant) -> Result<String, RpcError> {
        let (frame, rx) = self.call(GET_INPUT_CONFIGS, None, now)?;
        self.discovery = Some(rx);
        Ok(frame)
    }

    pub fn finish_discovery(&mut self, result: RpcResult) -> Vec<ClientEvent> {
        self.discovery = None;
        let inputs = match result.and_then(decode_inputs) {
            Ok(inputs) => inputs,
            Err(e) => {
                warn!(error = %e, "failed to get input configs");
                return Vec::new();
            }
        };

        let Some(mic) = select_mic(&inputs) else {
            warn!(inputs = inputs.len(), "no available hardware mic found");
            self.watched = None;
            return vec![ClientEvent::Connected(None)];
        };

        let watched = WatchedMic::from_input(mic);
        let muted = mic.local_mixer.muted;
        info!(
            name = %mic.name,
            muted,
            hw_ids = ?watched.hardware_ids,
            "found mic"
        );
        self.watched = Some(watched);
        vec![
            ClientEvent::Connected(Some(mic.name.clone())),
            ClientEvent::MuteChanged(muted),
        ]
    }

    pub fn handle_text(&mut self, text: &str, now: Instant) -> Vec<Action> {
        let msg: RpcMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "failed to parse message");
                return Vec::new();
            }
        };

        if let Some(id) = msg.id {
            if self.calls.contains(id) {
                let outcome = match msg.error {
                    Some(err) => Err(err.to_string()),
                    None => Ok(msg.result.unwrap_or(Value::Null)),
                };
                self.calls.resolve(id, outcome);
                return Vec::new();
            }
        }

        let Some(method) = msg.method.as_deref() else {
            debug!(id = ?msg.id, "ignoring response with no pending call");
            return Vec::new();
        };
        debug!(method, params = ?msg.params, "event");

        match Notification::decode(method, msg.params.as_ref()) {
            Some(Notification::InputsChanged) => {
                info!("inputs changed, re-fetching");
                match self.start_discovery(now) {
                    Ok(frame) => vec![Action::Send(frame)],
                    Err(e) => {
                        warn!(error = %e, "could not restart discovery");
                        Vec::new()
                    }
                }
            }
            Some(notification) => self
                .watched
                .as_ref()
                .and_then(|w| w.mute_from(&notification))
                .map(|muted| {
                    info!(muted, "mute changed");
                    vec![Action::Emit(ClientEvent::MuteChanged(muted))]
                })
                .unwrap_or_default(),
            None => Vec::new(),
        }
    }

    pub fn expire(&mut self, now: Instant) {
        self.calls.expire(now);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.calls.next_deadline()
    }

    /// Tears down in-flight state: pending calls fail, identity is dropped.
    pub fn close(&mut self) {
        self.open = false;
        self.watched = None;
        self.calls.fail_all();
    }
}

struct WaveLinkConnection {
    options: WaveLinkOptions,
}

impl WaveLinkConnection {
    async fn drive(
        &self,
        ws: &mut WsStream,
        session: &mut WaveLinkSession,
        control: &mut mpsc::UnboundedReceiver<Control>,
        sink: &EventSink,
    ) -> SessionEnd {
        match session.start_discovery(Instant::now()) {
            Ok(frame) => {
                if net::send_text(ws, frame).await.is_err() {
                    return SessionEnd::Dropped;
                }
            }
            Err(e) => warn!(error = %e, "could not start discovery"),
        }

        loop {
            let deadline = session.next_deadline();
            tokio::select! {
                biased;
                cmd = control.recv() => return SessionEnd::from_control(cmd),
                result = rpc::wait_for(&mut session.discovery) => {
                    for event in session.finish_discovery(result) {
                        sink.emit(event);
                    }
                }
                _ = rpc::sleep_until(deadline) => session.expire(Instant::now()),
                incoming = ws.next() => {
                    let text = match net::classify(incoming) {
                        Inbound::Text(text) => text,
                        Inbound::Skip => continue,
                        Inbound::Closed => return SessionEnd::Dropped,
                    };
                    for action in session.handle_text(&text, Instant::now()) {
                        match action {
                            Action::Emit(event) => sink.emit(event),
                            Action::Send(frame) => {
                                if net::send_text(ws, frame).await.is_err() {
                                    return SessionEnd::Dropped;
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

impl Connection for WaveLinkConnection {
    fn run<'a>(
        &'a mut self,
        control: &'a mut mpsc::UnboundedReceiver<Control>,
        sink: &'a EventSink,
    ) -> impl Future<Output = SessionEnd> + Send + 'a {
        async move {
            let url = self.options.url.as_str();
            info!(url, "connecting to wave link");
            let mut ws = tokio::select! {
                res = net::connect(url) => match res {
                    Ok(ws) => ws,
                    Err(e) => {
                        warn!(url, error = %e, "wave link connection failed");
                        return SessionEnd::Dropped;
                    }
                },
                cmd = control.recv() => return SessionEnd::from_control(cmd),
            };
            info!("connected to wave link");

            let mut session = WaveLinkSession::new(self.options.timings.rpc_timeout);
            let end = self.drive(&mut ws, &mut session, control, sink).await;
            session.close();
            if end != SessionEnd::Dropped {
                net::close(&mut ws).await;
            } else {
                info!("disconnected from wave link");
            }
            end
        }
    }
}
