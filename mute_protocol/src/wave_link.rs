use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_URL: &str = "ws://127.0.0.1:1824";

pub const GET_INPUT_CONFIGS: &str = "getInputConfigs";

pub const LOCAL_MIXER_ID: &str = "com.elgato.mix.local";
pub const MICROPHONE_MUTE_PROPERTY: &str = "Microphone Mute";

#[derive(Serialize, Debug, Clone)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> RpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// Any frame the server sends: a response when `id` is set, a notification
/// when only `method` is.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RpcMessage {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    MicrophoneConfigChanged(MicrophoneConfigChanged),
    InputMuteChanged(InputMuteChanged),
    InputsChanged,
}

impl Notification {
    /// Decodes a known notification. Unknown methods and payloads that do not
    /// fit the expected shape yield `None`.
    pub fn decode(method: &str, params: Option<&Value>) -> Option<Self> {
        match method {
            "microphoneConfigChanged" => serde_json::from_value(params?.clone())
                .ok()
                .map(Notification::MicrophoneConfigChanged),
            "inputMuteChanged" => serde_json::from_value(params?.clone())
                .ok()
                .map(Notification::InputMuteChanged),
            "inputsChanged" => Some(Notification::InputsChanged),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MicrophoneConfigChanged {
    pub identifier: String,
    pub property: String,
    /// Boolean for "Microphone Mute", numeric for gain and friends.
    pub value: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InputMuteChanged {
    pub identifier: String,
    #[serde(rename = "mixerID")]
    pub mixer_id: String,
    pub value: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubInput {
    pub identifier: String,
    #[serde(default)]
    pub input_type: i64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InputConfig {
    pub identifier: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub input_type: i64,
    #[serde(default)]
    pub is_available: bool,
    #[serde(default)]
    pub is_wave_mic_input: bool,
    #[serde(default)]
    pub inputs: Vec<SubInput>,
    #[serde(default)]
    pub local_mixer: MixerState,
    #[serde(default)]
    pub stream_mixer: MixerState,
}

/// Mixer channel state. On the wire this is a tuple
/// `[muted, volume, fxBypassed, ...]`; only the first slot is mandatory.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MixerState {
    pub muted: bool,
    pub volume: f64,
    pub bypassed: bool,
}

impl<'de> Deserialize<'de> for MixerState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let slots = Vec::<Value>::deserialize(deserializer)?;
        let muted = slots
            .first()
            .and_then(Value::as_bool)
            .ok_or_else(|| D::Error::custom("mixer state must start with a mute flag"))?;
        Ok(Self {
            muted,
            volume: slots.get(1).and_then(Value::as_f64).unwrap_or_default(),
            bypassed: slots.get(2).and_then(Value::as_bool).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mixer_state_ignores_trailing_slots() {
        let m: MixerState = serde_json::from_value(json!([true, 72, false, true, false])).unwrap();
        assert_eq!(
            m,
            MixerState {
                muted: true,
                volume: 72.0,
                bypassed: false
            }
        );
    }

    #[test]
    fn mixer_state_requires_mute_flag() {
        assert!(serde_json::from_value::<MixerState>(json!([50, true])).is_err());
        assert!(serde_json::from_value::<MixerState>(json!([])).is_err());
    }

    #[test]
    fn decodes_input_config() {
        let input: InputConfig = serde_json::from_value(json!({
            "identifier": "PCM_IN_01_C_00_SD1",
            "name": "Wave:3",
            "inputType": 4,
            "isAvailable": true,
            "isWaveMicInput": true,
            "inputs": [{ "identifier": "HW_1", "inputType": 1 }],
            "localMixer": [false, 100, false],
            "streamMixer": [true, 80, false]
        }))
        .unwrap();
        assert!(input.is_wave_mic_input);
        assert_eq!(input.inputs[0].identifier, "HW_1");
        assert!(!input.local_mixer.muted);
        assert!(input.stream_mixer.muted);
    }

    #[test]
    fn decodes_known_notifications_only() {
        let n = Notification::decode(
            "inputMuteChanged",
            Some(&json!({ "identifier": "A", "mixerID": LOCAL_MIXER_ID, "value": true })),
        );
        assert_eq!(
            n,
            Some(Notification::InputMuteChanged(InputMuteChanged {
                identifier: "A".into(),
                mixer_id: LOCAL_MIXER_ID.into(),
                value: true,
            }))
        );

        assert_eq!(
            Notification::decode("inputsChanged", None),
            Some(Notification::InputsChanged)
        );
        assert_eq!(Notification::decode("levelMeterChanged", Some(&json!({}))), None);
        assert_eq!(
            Notification::decode("inputMuteChanged", Some(&json!({ "identifier": 3 }))),
            None
        );
        assert_eq!(Notification::decode("microphoneConfigChanged", None), None);
    }

    #[test]
    fn request_omits_missing_params() {
        let text = serde_json::to_string(&RpcRequest::new(7, GET_INPUT_CONFIGS, None)).unwrap();
        assert_eq!(text, r#"{"jsonrpc":"2.0","id":7,"method":"getInputConfigs"}"#);
    }
}
