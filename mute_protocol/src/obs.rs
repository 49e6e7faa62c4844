use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const RPC_VERSION: u32 = 1;

/// `EventSubscription::Inputs`; covers `InputMuteStateChanged`.
pub const EVENT_SUBSCRIPTION_INPUTS: u32 = 1 << 3;

pub const GET_INPUT_LIST: &str = "GetInputList";
pub const GET_INPUT_MUTE: &str = "GetInputMute";
pub const INPUT_MUTE_STATE_CHANGED: &str = "InputMuteStateChanged";

/// Input kinds of audio capture sources, one per platform backend.
pub const AUDIO_INPUT_KINDS: &[&str] = &[
    "wasapi_input_capture",
    "coreaudio_input_capture",
    "pulse_input_capture",
    "alsa_input_capture",
    "jack_input_capture",
    "oss_input_capture",
];

pub mod op {
    pub const HELLO: u8 = 0;
    pub const IDENTIFY: u8 = 1;
    pub const IDENTIFIED: u8 = 2;
    pub const EVENT: u8 = 5;
    pub const REQUEST: u8 = 6;
    pub const REQUEST_RESPONSE: u8 = 7;
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Frame<T> {
    pub op: u8,
    pub d: T,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    Hello(Hello),
    Identified(Identified),
    Event(Event),
    RequestResponse(RequestResponse),
    Other(u8),
}

impl ServerFrame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let raw: Frame<Value> = serde_json::from_str(text)?;
        Ok(match raw.op {
            op::HELLO => ServerFrame::Hello(serde_json::from_value(raw.d)?),
            op::IDENTIFIED => ServerFrame::Identified(serde_json::from_value(raw.d)?),
            op::EVENT => ServerFrame::Event(serde_json::from_value(raw.d)?),
            op::REQUEST_RESPONSE => ServerFrame::RequestResponse(serde_json::from_value(raw.d)?),
            other => ServerFrame::Other(other),
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default)]
    pub obs_web_socket_version: Option<String>,
    pub rpc_version: u32,
    #[serde(default)]
    pub authentication: Option<AuthChallenge>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuthChallenge {
    pub challenge: String,
    pub salt: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Identify {
    pub rpc_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
    pub event_subscriptions: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    pub negotiated_rpc_version: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: String,
    #[serde(default)]
    pub event_intent: u32,
    #[serde(default)]
    pub event_data: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub request_type: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_data: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_type: String,
    pub request_id: String,
    pub request_status: RequestStatus,
    #[serde(default)]
    pub response_data: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RequestStatus {
    pub result: bool,
    pub code: u32,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InputEntry {
    pub input_name: String,
    #[serde(default)]
    pub input_kind: String,
    #[serde(default)]
    pub unversioned_input_kind: String,
    #[serde(default)]
    pub input_uuid: Option<String>,
}

impl InputEntry {
    pub fn kind(&self) -> &str {
        if self.unversioned_input_kind.is_empty() {
            &self.input_kind
        } else {
            &self.unversioned_input_kind
        }
    }

    pub fn is_audio_input(&self) -> bool {
        AUDIO_INPUT_KINDS.contains(&self.kind())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InputList {
    pub inputs: Vec<InputEntry>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InputMute {
    pub input_muted: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InputMuteStateChanged {
    pub input_name: String,
    pub input_muted: bool,
}

/// obs-websocket v5 authentication string:
/// `base64(sha256(base64(sha256(password + salt)) + challenge))`.
pub fn auth_response(password: &str, salt: &str, challenge: &str) -> String {
    let secret = STANDARD.encode(Sha256::digest(format!("{password}{salt}")));
    STANDARD.encode(Sha256::digest(format!("{secret}{challenge}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn auth_response_is_deterministic_and_salted() {
        const SALT: &str = "lM1GncleQOaCu9lT1yeUZhFYnqhsLLP1G5lAGo3ixaI=";
        const CHALLENGE: &str = "+IxH4CnCiqpX1rM9scsNynZzbOe4KhDeYcTNS3PDaeY=";
        let a = auth_response("supersecret", SALT, CHALLENGE);
        let b = auth_response("supersecret", SALT, CHALLENGE);
        let c = auth_response("supersecret", "other-salt", CHALLENGE);
        assert_eq!(a, "sQBlPUYd9mki/3XVFBp4Pt08FCMWdMVIqnFWdEitUME=");
        assert_eq!(a, b);
        assert_ne!(a, c);
        // sha256 digests are 32 bytes, 44 chars in padded base64.
        assert_eq!(a.len(), 44);
    }

    #[test]
    fn parses_frames_by_opcode() {
        let hello = ServerFrame::parse(
            r#"{"op":0,"d":{"obsWebSocketVersion":"5.1.0","rpcVersion":1,"authentication":{"challenge":"c","salt":"s"}}}"#,
        )
        .unwrap();
        match hello {
            ServerFrame::Hello(h) => {
                assert_eq!(h.rpc_version, 1);
                assert_eq!(h.authentication.unwrap().salt, "s");
            }
            other => panic!("expected hello, got: {other:?}"),
        }

        let event = ServerFrame::parse(
            &json!({
                "op": 5,
                "d": {
                    "eventType": INPUT_MUTE_STATE_CHANGED,
                    "eventIntent": 8,
                    "eventData": { "inputName": "Mic/Aux", "inputMuted": true }
                }
            })
            .to_string(),
        )
        .unwrap();
        let ServerFrame::Event(event) = event else {
            panic!("expected event");
        };
        let data: InputMuteStateChanged = serde_json::from_value(event.event_data).unwrap();
        assert!(data.input_muted);

        assert_eq!(
            ServerFrame::parse(r#"{"op":9,"d":{}}"#).unwrap(),
            ServerFrame::Other(9)
        );
        assert!(ServerFrame::parse("not json").is_err());
    }

    #[test]
    fn audio_kind_falls_back_to_versioned_kind() {
        let entry = InputEntry {
            input_name: "Mic".into(),
            input_kind: "pulse_input_capture".into(),
            unversioned_input_kind: String::new(),
            input_uuid: None,
        };
        assert!(entry.is_audio_input());

        let browser = InputEntry {
            input_name: "Overlay".into(),
            input_kind: "browser_source".into(),
            unversioned_input_kind: "browser_source".into(),
            input_uuid: None,
        };
        assert!(!browser.is_audio_input());
    }
}
