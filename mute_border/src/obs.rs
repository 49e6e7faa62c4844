//! OBS Studio client (obs-websocket v5).
//!
//! The handshake is Hello → Identify → Identified. After that we list the
//! inputs, pick one audio capture input and follow `InputMuteStateChanged`
//! for it. Requests are paired with responses by `requestId`.

use crate::client::{ClientHandle, ClientTimings, Connection, EventSink, SessionEnd};
use crate::config::ObsConfig;
use crate::net::{self, Inbound, WsStream};
use crate::protocol::obs::{
    self, auth_response, Frame, Hello, Identify, InputEntry, InputList, InputMute,
    InputMuteStateChanged, Request, RequestResponse, ServerFrame, EVENT_SUBSCRIPTION_INPUTS,
    GET_INPUT_LIST, GET_INPUT_MUTE, INPUT_MUTE_STATE_CHANGED, RPC_VERSION,
};
use crate::protocol::{ClientEvent, Control, SourceEvent};
use crate::rpc::{self, PendingCalls, RpcError, RpcResult};
use crate::state::SourceKey;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ObsOptions {
    pub url: String,
    pub password: String,
    pub input_name: Option<String>,
    pub timings: ClientTimings,
}

impl ObsOptions {
    pub fn from_config(config: &ObsConfig) -> Self {
        Self {
            url: config.url(),
            password: config.password.clone(),
            input_name: config.input_name.clone(),
            timings: ClientTimings::default(),
        }
    }
}

pub fn spawn(options: ObsOptions, events: mpsc::UnboundedSender<SourceEvent>) -> ClientHandle {
    let reconnect_delay = options.timings.reconnect_delay;
    ClientHandle::spawn(SourceKey::Obs, ObsConnection { options }, reconnect_delay, events)
}

/// Audio capture inputs, in the order OBS listed them.
pub fn audio_inputs(inputs: &[InputEntry]) -> Vec<&InputEntry> {
    inputs.iter().filter(|i| i.is_audio_input()).collect()
}

/// Picks the input to watch: the configured name when present, otherwise the
/// first one that looks like a microphone, otherwise the first one.
pub fn select_input<'a>(inputs: &[&'a InputEntry], preferred: Option<&str>) -> Option<&'a InputEntry> {
    if let Some(name) = preferred.filter(|n| !n.is_empty()) {
        if let Some(found) = inputs.iter().find(|i| i.input_name == name) {
            return Some(*found);
        }
        warn!(name, "configured input not found, auto-detecting");
    }

    inputs
        .iter()
        .find(|i| {
            let lower = i.input_name.to_lowercase();
            lower.contains("mic") || lower.contains("aux")
        })
        .or_else(|| inputs.first())
        .copied()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Emit(ClientEvent),
    Send(String),
}

/// Which discovery step a pending request belongs to.
enum Step {
    InputList(oneshot::Receiver<RpcResult>),
    InputMute {
        name: String,
        rx: oneshot::Receiver<RpcResult>,
    },
}

impl Step {
    fn receiver(&mut self) -> &mut oneshot::Receiver<RpcResult> {
        match self {
            Step::InputList(rx) => rx,
            Step::InputMute { rx, .. } => rx,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitHello,
    AwaitIdentified,
    Ready,
}

/// Protocol state for one open connection.
pub struct ObsSession {
    password: String,
    preferred_input: Option<String>,
    phase: Phase,
    calls: PendingCalls,
    step: Option<Step>,
    current_input: Option<String>,
    open: bool,
}

impl ObsSession {
    pub fn new(password: &str, preferred_input: Option<&str>, rpc_timeout: Duration) -> Self {
        Self {
            password: password.to_string(),
            preferred_input: preferred_input.map(str::to_string),
            phase: Phase::AwaitHello,
            calls: PendingCalls::new(rpc_timeout),
            step: None,
            current_input: None,
            open: true,
        }
    }

    pub fn current_input(&self) -> Option<&str> {
        self.current_input.as_deref()
    }

    pub fn is_identified(&self) -> bool {
        self.phase == Phase::Ready
    }

    pub fn call(
        &mut self,
        request_type: &str,
        request_data: Option<Value>,
        now: Instant,
    ) -> Result<(String, oneshot::Receiver<RpcResult>), RpcError> {
        if !self.open || self.phase != Phase::Ready {
            return Err(RpcError::NotConnected);
        }
        let (id, rx) = self.calls.issue(request_type, now);
        let frame = Frame {
            op: obs::op::REQUEST,
            d: Request {
                request_type: request_type.to_string(),
                request_id: id.to_string(),
                request_data,
            },
        };
        let frame = serde_json::to_string(&frame).map_err(|e| RpcError::Decode(e.to_string()))?;
        Ok((frame, rx))
    }

    pub fn handle_text(&mut self, text: &str, now: Instant) -> Vec<Action> {
        let frame = match ServerFrame::parse(text) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "failed to parse message");
                return Vec::new();
            }
        };

        match frame {
            ServerFrame::Hello(hello) => self.on_hello(hello),
            ServerFrame::Identified(identified) => {
                if self.phase != Phase::AwaitIdentified {
                    return Vec::new();
                }
                info!(rpc_version = identified.negotiated_rpc_version, "identified with obs");
                self.phase = Phase::Ready;
                self.request(GET_INPUT_LIST, None, now, Step::InputList)
            }
            ServerFrame::RequestResponse(response) => {
                self.on_response(response);
                Vec::new()
            }
            ServerFrame::Event(event) => {
                if event.event_type != INPUT_MUTE_STATE_CHANGED {
                    return Vec::new();
                }
                let Ok(data) = serde_json::from_value::<InputMuteStateChanged>(event.event_data) else {
                    return Vec::new();
                };
                if self.current_input.as_deref() != Some(data.input_name.as_str()) {
                    return Vec::new();
                }
                info!(muted = data.input_muted, "mute state changed");
                vec![Action::Emit(ClientEvent::MuteChanged(data.input_muted))]
            }
            ServerFrame::Other(op) => {
                debug!(op, "ignoring frame");
                Vec::new()
            }
        }
    }

    /// Continues discovery once the pending step's outcome is in.
    pub fn advance(&mut self, result: RpcResult, now: Instant) -> Vec<Action> {
        match self.step.take() {
            Some(Step::InputList(_)) => self.on_input_list(result, now),
            Some(Step::InputMute { name, .. }) => match decode::<InputMute>(result) {
                Ok(mute) => {
                    info!(input = %name, muted = mute.input_muted, "watching input");
                    self.current_input = Some(name.clone());
                    vec![
                        Action::Emit(ClientEvent::Connected(Some(name))),
                        Action::Emit(ClientEvent::MuteChanged(mute.input_muted)),
                    ]
                }
                Err(e) => {
                    warn!(input = %name, error = %e, "failed to query mute state");
                    vec![Action::Emit(ClientEvent::Connected(None))]
                }
            },
            None => Vec::new(),
        }
    }

    pub fn expire(&mut self, now: Instant) {
        self.calls.expire(now);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.calls.next_deadline()
    }

    pub fn close(&mut self) {
        self.open = false;
        self.current_input = None;
        self.calls.fail_all();
    }

    fn on_hello(&mut self, hello: Hello) -> Vec<Action> {
        if self.phase != Phase::AwaitHello {
            return Vec::new();
        }
        debug!(version = ?hello.obs_web_socket_version, "hello from obs");
        let authentication = hello
            .authentication
            .map(|auth| auth_response(&self.password, &auth.salt, &auth.challenge));
        let identify = Frame {
            op: obs::op::IDENTIFY,
            d: Identify {
                rpc_version: RPC_VERSION,
                authentication,
                event_subscriptions: EVENT_SUBSCRIPTION_INPUTS,
            },
        };
        match serde_json::to_string(&identify) {
            Ok(frame) => {
                self.phase = Phase::AwaitIdentified;
                vec![Action::Send(frame)]
            }
            Err(e) => {
                warn!(error = %e, "failed to encode identify");
                Vec::new()
            }
        }
    }

    fn on_response(&mut self, response: RequestResponse) {
        let Ok(id) = response.request_id.parse::<u64>() else {
            debug!(request_id = %response.request_id, "ignoring foreign response");
            return;
        };
        let outcome = if response.request_status.result {
            Ok(response.response_data.unwrap_or(Value::Null))
        } else {
            Err(format!(
                "code {}: {}",
                response.request_status.code,
                response.request_status.comment.unwrap_or_default()
            ))
        };
        if !self.calls.resolve(id, outcome) {
            debug!(id, "ignoring response with no pending call");
        }
    }

    fn on_input_list(&mut self, result: RpcResult, now: Instant) -> Vec<Action> {
        let list = match decode::<InputList>(result) {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "failed to query inputs");
                return vec![Action::Emit(ClientEvent::Connected(None))];
            }
        };

        let audio = audio_inputs(&list.inputs);
        let Some(target) = select_input(&audio, self.preferred_input.as_deref()) else {
            warn!("no audio inputs found");
            return vec![Action::Emit(ClientEvent::Connected(None))];
        };

        let name = target.input_name.clone();
        self.request(
            GET_INPUT_MUTE,
            Some(json!({ "inputName": name.as_str() })),
            now,
            |rx| Step::InputMute { name, rx },
        )
    }

    fn request(
        &mut self,
        request_type: &str,
        data: Option<Value>,
        now: Instant,
        step: impl FnOnce(oneshot::Receiver<RpcResult>) -> Step,
    ) -> Vec<Action> {
        match self.call(request_type, data, now) {
            Ok((frame, rx)) => {
                self.step = Some(step(rx));
                vec![Action::Send(frame)]
            }
            Err(e) => {
                warn!(request_type, error = %e, "request not sent");
                Vec::new()
            }
        }
    }
}

fn decode<T: DeserializeOwned>(result: RpcResult) -> Result<T, RpcError> {
    result.and_then(|value| serde_json::from_value(value).map_err(|e| RpcError::Decode(e.to_string())))
}

async fn wait_step(step: &mut Option<Step>) -> RpcResult {
    match step {
        Some(step) => step.receiver().await.unwrap_or(Err(RpcError::Closed)),
        None => std::future::pending().await,
    }
}

struct ObsConnection {
    options: ObsOptions,
}

impl ObsConnection {
    async fn drive(
        &self,
        ws: &mut WsStream,
        session: &mut ObsSession,
        control: &mut mpsc::UnboundedReceiver<Control>,
        sink: &EventSink,
    ) -> SessionEnd {
        loop {
            let deadline = session.next_deadline();
            let actions = tokio::select! {
                biased;
                cmd = control.recv() => return SessionEnd::from_control(cmd),
                result = wait_step(&mut session.step) => session.advance(result, Instant::now()),
                _ = rpc::sleep_until(deadline) => {
                    session.expire(Instant::now());
                    continue;
                }
                incoming = ws.next() => match net::classify(incoming) {
                    Inbound::Text(text) => session.handle_text(&text, Instant::now()),
                    Inbound::Skip => continue,
                    Inbound::Closed => return SessionEnd::Dropped,
                },
            };

            for action in actions {
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

impl Connection for ObsConnection {
    fn run<'a>(
        &'a mut self,
        control: &'a mut mpsc::UnboundedReceiver<Control>,
        sink: &'a EventSink,
    ) -> impl Future<Output = SessionEnd> + Send + 'a {
        async move {
            let url = self.options.url.as_str();
            info!(url, "connecting to obs");
            let mut ws = tokio::select! {
                res = net::connect(url) => match res {
                    Ok(ws) => ws,
                    Err(e) => {
                        warn!(url, error = %e, "obs connection failed");
                        return SessionEnd::Dropped;
                    }
                },
                cmd = control.recv() => return SessionEnd::from_control(cmd),
            };
            info!("obs websocket connected");

            let mut session = ObsSession::new(
                &self.options.password,
                self.options.input_name.as_deref(),
                self.options.timings.rpc_timeout,
            );
            let end = self.drive(&mut ws, &mut session, control, sink).await;
            session.close();
            if end != SessionEnd::Dropped {
                net::close(&mut ws).await;
            } else {
                info!("disconnected from obs");
            }
            end
        }
    }
}
