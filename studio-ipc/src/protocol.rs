//! IPC protocol definitions and message types
//!
//! Every request is one JSON object on one line: the command parameters,
//! plus `command` and a fresh `request_id`. Every response is one JSON
//! object on one line carrying the same `request_id` and either result
//! fields or an `error` string.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::error::IpcError;

/// Result fields of a successful daemon response
pub type ResponsePayload = Map<String, JsonValue>;

/// A single request to the daemon
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonRequest {
    pub command: String,
    pub params: Map<String, JsonValue>,
    pub request_id: String,
}

impl DaemonRequest {
    /// Create a request with a freshly generated request id
    pub fn new(command: impl Into<String>, params: Map<String, JsonValue>) -> Self {
        Self {
            command: command.into(),
            params,
            request_id: Uuid::new_v4().to_string(),
        }
    }

    /// Flatten into the wire object. `command` and `request_id` win over
    /// same-named parameters.
    pub fn to_json(&self) -> JsonValue {
        let mut object = self.params.clone();
        object.insert("command".to_string(), JsonValue::String(self.command.clone()));
        object.insert(
            "request_id".to_string(),
            JsonValue::String(self.request_id.clone()),
        );
        JsonValue::Object(object)
    }

    /// Encode as one newline-terminated line
    pub fn to_line(&self) -> Result<String, IpcError> {
        let mut line = serde_json::to_string(&self.to_json())
            .map_err(|e| IpcError::Serialization(e.to_string()))?;
        line.push('\n');
        Ok(line)
    }
}

impl Serialize for DaemonRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// A single response line from the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonResponse {
    #[serde(default)]
    pub request_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(flatten)]
    pub payload: ResponsePayload,
}

impl DaemonResponse {
    /// Parse one protocol line
    pub fn parse(line: &str) -> Result<Self, IpcError> {
        Ok(serde_json::from_str(line)?)
    }

    /// Turn the response into the caller-facing result
    pub fn into_result(self) -> Result<ResponsePayload, IpcError> {
        match self.error {
            Some(error) => Err(IpcError::Remote(error)),
            None => Ok(self.payload),
        }
    }
}

/// Commands understood by the generation daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DaemonCommand {
    /// Liveness probe
    Health,

    /// Text-to-image generation
    GenerateImage {
        prompt: String,
        negative_prompt: String,
        steps: u32,
        cfg_scale: f64,
        width: u32,
        height: u32,
        seed: i64,
    },

    /// Image-to-image generation from a base64 PNG
    #[serde(rename = "img2img")]
    ImageToImage {
        prompt: String,
        init_image: String,
        denoising_strength: f64,
        steps: u32,
        cfg_scale: f64,
        seed: i64,
    },

    ListImageModels,

    /// Text-to-speech
    #[serde(rename = "tts")]
    TextToSpeech {
        text: String,
        voice: String,
        speed: f64,
        engine: String,
    },

    ListTtsEngines,

    ListVoices {
        engine: String,
    },

    VoiceClone {
        text: String,
        reference_audio: String,
        speed: f64,
    },

    Transcribe {
        audio_file: String,
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },

    /// Text-to-music generation
    GenerateMusic {
        prompt: String,
        duration: f64,
        model_size: String,
    },

    /// Ask the daemon to abandon in-flight work
    Cancel,
}

impl DaemonCommand {
    /// Wire name of the command
    pub fn name(&self) -> &'static str {
        match self {
            DaemonCommand::Health => "health",
            DaemonCommand::GenerateImage { .. } => "generate_image",
            DaemonCommand::ImageToImage { .. } => "img2img",
            DaemonCommand::ListImageModels => "list_image_models",
            DaemonCommand::TextToSpeech { .. } => "tts",
            DaemonCommand::ListTtsEngines => "list_tts_engines",
            DaemonCommand::ListVoices { .. } => "list_voices",
            DaemonCommand::VoiceClone { .. } => "voice_clone",
            DaemonCommand::Transcribe { .. } => "transcribe",
            DaemonCommand::GenerateMusic { .. } => "generate_music",
            DaemonCommand::Cancel => "cancel",
        }
    }

    /// Split into the command name and its parameter object
    pub fn into_parts(self) -> Result<(&'static str, Map<String, JsonValue>), IpcError> {
        let name = self.name();
        let mut params = match serde_json::to_value(&self)
            .map_err(|e| IpcError::Serialization(e.to_string()))?
        {
            JsonValue::Object(map) => map,
            other => {
                return Err(IpcError::Serialization(format!(
                    "command {} did not encode to an object: {}",
                    name, other
                )))
            }
        };
        params.remove("command");
        Ok((name, params))
    }
}
