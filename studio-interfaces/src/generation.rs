//! Generation capability interface
//!
//! Provides the single operation the queue needs from a backend: turn a
//! request into generated media plus metadata.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use studio_resilience::Retryable;

/// Kind of generation job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationType {
    TextToImage,
    ImageToImage,
    Audio,
    Video,
}

impl fmt::Display for GenerationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationType::TextToImage => write!(f, "txt2img"),
            GenerationType::ImageToImage => write!(f, "img2img"),
            GenerationType::Audio => write!(f, "audio"),
            GenerationType::Video => write!(f, "video"),
        }
    }
}

/// Tunable parameters of a generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParameters {
    pub steps: u32,
    pub cfg_scale: f64,
    pub width: u32,
    pub height: u32,
    /// `-1` asks the backend to pick a random seed
    pub seed: i64,
    pub sampler_name: String,
    /// Image-to-image only
    pub denoising_strength: f64,
    /// Base64-encoded source image, image-to-image only
    pub init_image: Option<String>,
    /// Audio only
    pub duration_seconds: f64,
    pub model: Option<String>,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            steps: 20,
            cfg_scale: 7.0,
            width: 512,
            height: 512,
            seed: -1,
            sampler_name: "Euler a".to_string(),
            denoising_strength: 0.75,
            init_image: None,
            duration_seconds: 10.0,
            model: None,
        }
    }
}

/// Everything a backend needs to run one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub parameters: GenerationParameters,
    pub generation_type: GenerationType,
}

/// Media container of a generated artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
}

impl MediaKind {
    /// File extension used when persisting this kind of media
    pub fn extension(&self) -> &'static str {
        match self {
            MediaKind::Image => "png",
            MediaKind::Audio => "wav",
            MediaKind::Video => "mp4",
        }
    }
}

/// One generated artifact
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedMedia {
    pub kind: MediaKind,
    pub data: Vec<u8>,
}

/// Description of how a result was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: u32,
    pub sampler_name: String,
    pub cfg_scale: f64,
    pub width: u32,
    pub height: u32,
    pub seed: i64,
    pub backend_name: String,
    pub generation_time_seconds: f64,
    pub generation_type: GenerationType,
}

impl GenerationMetadata {
    /// Metadata echoing the request, before the backend fills in seed and timing
    pub fn from_request(request: &GenerationRequest, backend_name: impl Into<String>) -> Self {
        let params = &request.parameters;
        Self {
            prompt: request.prompt.clone(),
            negative_prompt: request.negative_prompt.clone(),
            steps: params.steps,
            sampler_name: params.sampler_name.clone(),
            cfg_scale: params.cfg_scale,
            width: params.width,
            height: params.height,
            seed: params.seed,
            backend_name: backend_name.into(),
            generation_time_seconds: 0.0,
            generation_type: request.generation_type,
        }
    }
}

/// Output of a successful generation
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub media: Vec<GeneratedMedia>,
    pub metadata: GenerationMetadata,
}

/// Backend failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("Connection timed out")]
    ConnectionTimeout,

    #[error("Connection refused")]
    ConnectionRefused,

    #[error("No route to backend host")]
    NoRoute,

    #[error("DNS lookup failed: {0}")]
    DnsFailure(String),

    #[error("Backend not connected")]
    NotConnected,

    #[error("Transient backend error: {0}")]
    Transient(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Daemon error: {0}")]
    Daemon(String),

    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("Invalid generation request: {0}")]
    InvalidRequest(String),

    #[error("{backend} does not support {generation_type} generation")]
    Unsupported {
        backend: String,
        generation_type: GenerationType,
    },

    #[error("Generation cancelled")]
    Cancelled,
}

impl Retryable for BackendError {
    fn is_cancellation(&self) -> bool {
        matches!(self, BackendError::Cancelled)
    }

    fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            BackendError::ConnectionTimeout
                | BackendError::ConnectionRefused
                | BackendError::NoRoute
                | BackendError::DnsFailure(_)
                | BackendError::NotConnected
                | BackendError::Transient(_)
        )
    }
}

/// Generation capability consumed by the queue
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Human-readable backend name, recorded in metadata
    fn name(&self) -> &str;

    /// Run one generation
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, BackendError>;

    /// Ask the backend to abandon in-flight work. Advisory only.
    async fn cancel(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use studio_resilience::RetryPolicy;

    #[test]
    fn test_http_preset_classification() {
        let policy = RetryPolicy::<BackendError>::http_backend();

        assert!(policy.is_retryable(&BackendError::ConnectionTimeout));
        assert!(policy.is_retryable(&BackendError::ConnectionRefused));
        assert!(policy.is_retryable(&BackendError::NoRoute));
        assert!(policy.is_retryable(&BackendError::DnsFailure("localhost".to_string())));
        assert!(policy.is_retryable(&BackendError::NotConnected));
        assert!(policy.is_retryable(&BackendError::Transient("model loading".to_string())));

        assert!(!policy.is_retryable(&BackendError::Http {
            status: 503,
            message: "busy".to_string()
        }));
        assert!(!policy.is_retryable(&BackendError::Http {
            status: 404,
            message: "no such sampler".to_string()
        }));
        assert!(BackendError::Cancelled.is_cancellation());
    }

    #[test]
    fn test_daemon_preset_reads_message_text() {
        let policy = RetryPolicy::<BackendError>::daemon_call();

        assert!(policy.is_retryable(&BackendError::Daemon(
            "Daemon process terminated: signal 9".to_string()
        )));
        assert!(!policy.is_retryable(&BackendError::Daemon("Unknown command: x".to_string())));
    }

    #[test]
    fn test_parameter_defaults_fill_missing_fields() {
        let params: GenerationParameters = serde_json::from_str(r#"{"steps": 30}"#).unwrap();

        assert_eq!(params.steps, 30);
        assert_eq!(params.width, 512);
        assert_eq!(params.seed, -1);
        assert!(params.init_image.is_none());
    }

    #[test]
    fn test_metadata_from_request() {
        let request = GenerationRequest {
            prompt: "a lighthouse".to_string(),
            negative_prompt: "blurry".to_string(),
            parameters: GenerationParameters::default(),
            generation_type: GenerationType::TextToImage,
        };

        let metadata = GenerationMetadata::from_request(&request, "daemon");
        assert_eq!(metadata.prompt, "a lighthouse");
        assert_eq!(metadata.backend_name, "daemon");
        assert_eq!(metadata.steps, 20);
        assert_eq!(MediaKind::Audio.extension(), "wav");
    }
}
