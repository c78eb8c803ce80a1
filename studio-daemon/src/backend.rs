//! Generation backend routed through the supervised daemon

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Instant;
use tracing::{debug, warn};

use studio_interfaces::{
    BackendError, GeneratedMedia, GenerationBackend, GenerationMetadata, GenerationRequest,
    GenerationResult, GenerationType, MediaKind,
};
use studio_ipc::{DaemonCommand, IpcError, ResponsePayload};
use studio_resilience::RetryPolicy;

use crate::supervisor::DaemonSupervisor;

/// A locally installed image model reported by the daemon
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageModel {
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
}

/// [`GenerationBackend`] that runs jobs on the local daemon
pub struct DaemonBackend {
    supervisor: DaemonSupervisor,
    retry: RetryPolicy<IpcError>,
    health_retry: RetryPolicy<IpcError>,
    music_model_size: String,
}

impl DaemonBackend {
    pub const NAME: &'static str = "Local Daemon";

    pub fn new(supervisor: DaemonSupervisor) -> Self {
        Self {
            supervisor,
            retry: RetryPolicy::daemon_call(),
            health_retry: RetryPolicy::health_check(),
            music_model_size: "small".to_string(),
        }
    }

    /// Replace the policy applied to generation and listing calls
    pub fn with_retry_policy(mut self, retry: RetryPolicy<IpcError>) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_health_retry_policy(mut self, retry: RetryPolicy<IpcError>) -> Self {
        self.health_retry = retry;
        self
    }

    pub fn with_music_model_size(mut self, model_size: impl Into<String>) -> Self {
        self.music_model_size = model_size.into();
        self
    }

    pub fn supervisor(&self) -> &DaemonSupervisor {
        &self.supervisor
    }

    /// Probe the daemon, starting it if needed. Returns the reported status.
    pub async fn health_check(&self) -> Result<String, BackendError> {
        let payload = self
            .health_retry
            .execute(|| self.supervisor.send_command(DaemonCommand::Health))
            .await
            .map_err(backend_error)?;

        Ok(payload
            .get("status")
            .and_then(JsonValue::as_str)
            .unwrap_or("ok")
            .to_string())
    }

    pub async fn list_models(&self) -> Result<Vec<ImageModel>, BackendError> {
        let payload = self.call(DaemonCommand::ListImageModels).await?;
        let models = payload.get("models").cloned().unwrap_or(JsonValue::Array(Vec::new()));

        serde_json::from_value(models)
            .map_err(|e| BackendError::InvalidResponse(format!("models: {}", e)))
    }

    async fn call(&self, command: DaemonCommand) -> Result<ResponsePayload, BackendError> {
        self.retry
            .execute(|| self.supervisor.send_command(command.clone()))
            .await
            .map_err(backend_error)
    }

    fn command_for(
        &self,
        request: &GenerationRequest,
    ) -> Result<(DaemonCommand, MediaKind), BackendError> {
        let params = &request.parameters;

        match request.generation_type {
            GenerationType::TextToImage => Ok((
                DaemonCommand::GenerateImage {
                    prompt: request.prompt.clone(),
                    negative_prompt: request.negative_prompt.clone(),
                    steps: params.steps,
                    cfg_scale: params.cfg_scale,
                    width: params.width,
                    height: params.height,
                    seed: params.seed,
                },
                MediaKind::Image,
            )),
            GenerationType::ImageToImage => {
                let init_image = params.init_image.clone().ok_or_else(|| {
                    BackendError::InvalidRequest("img2img requires an init image".to_string())
                })?;
                Ok((
                    DaemonCommand::ImageToImage {
                        prompt: request.prompt.clone(),
                        init_image,
                        denoising_strength: params.denoising_strength,
                        steps: params.steps,
                        cfg_scale: params.cfg_scale,
                        seed: params.seed,
                    },
                    MediaKind::Image,
                ))
            }
            GenerationType::Audio => Ok((
                DaemonCommand::GenerateMusic {
                    prompt: request.prompt.clone(),
                    duration: params.duration_seconds,
                    model_size: params
                        .model
                        .clone()
                        .unwrap_or_else(|| self.music_model_size.clone()),
                },
                MediaKind::Audio,
            )),
            GenerationType::Video => Err(BackendError::Unsupported {
                backend: Self::NAME.to_string(),
                generation_type: GenerationType::Video,
            }),
        }
    }
}

#[async_trait]
impl GenerationBackend for DaemonBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, BackendError> {
        let (command, kind) = self.command_for(request)?;
        debug!("Running {} on the daemon", command.name());

        let started = Instant::now();
        let payload = self.call(command).await?;
        let elapsed = started.elapsed();

        let media = decode_media(&payload, kind)?;
        let mut metadata = GenerationMetadata::from_request(request, Self::NAME);
        if let Some(seed) = payload.get("seed").and_then(JsonValue::as_i64) {
            metadata.seed = seed;
        }
        metadata.generation_time_seconds = elapsed.as_secs_f64();

        Ok(GenerationResult { media, metadata })
    }

    async fn cancel(&self) {
        // Never start a daemon just to cancel
        if !self.supervisor.is_running() {
            return;
        }
        if let Err(e) = self.supervisor.send_command(DaemonCommand::Cancel).await {
            warn!("Daemon cancel request failed: {}", e);
        }
    }
}

fn backend_error(error: IpcError) -> BackendError {
    match error {
        IpcError::Cancelled => BackendError::Cancelled,
        IpcError::NotConnected => BackendError::NotConnected,
        other => BackendError::Daemon(other.to_string()),
    }
}

/// Decode base64 `images[]` or `audio` from a daemon response
fn decode_media(payload: &ResponsePayload, kind: MediaKind) -> Result<Vec<GeneratedMedia>, BackendError> {
    let encoded: Vec<&str> = match kind {
        MediaKind::Image => payload
            .get("images")
            .and_then(JsonValue::as_array)
            .map(|images| images.iter().filter_map(JsonValue::as_str).collect())
            .unwrap_or_default(),
        MediaKind::Audio | MediaKind::Video => payload
            .get("audio")
            .and_then(JsonValue::as_str)
            .into_iter()
            .collect(),
    };

    if encoded.is_empty() {
        return Err(BackendError::InvalidResponse(
            "daemon response contained no media".to_string(),
        ));
    }

    encoded
        .into_iter()
        .map(|data| {
            STANDARD
                .decode(data)
                .map(|data| GeneratedMedia { kind, data })
                .map_err(|e| BackendError::InvalidResponse(format!("invalid base64 media: {}", e)))
        })
        .collect()
}
