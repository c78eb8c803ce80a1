//! Queue scheduler
//!
//! All queue state lives behind one lock. The processing loop only holds it
//! while claiming or finishing an item, never across the backend call, so
//! every public operation stays usable while a generation is running.

use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use studio_config::QueueConfig;
use studio_interfaces::{
    BackendError, GenerationBackend, GenerationParameters, GenerationRequest, GenerationResult,
    GenerationType, MediaLabel, OutputStore,
};

use crate::error::QueueError;
use crate::item::{GenerationStatus, QueuedGeneration};

#[derive(Default)]
struct QueueState {
    items: Vec<QueuedGeneration>,
    processing: bool,
    paused: bool,
    current: Option<Uuid>,
    current_cancel: Option<CancellationToken>,
    /// Bumped by `clear_all` so a superseded loop stops touching state
    epoch: u64,
}

impl QueueState {
    fn item_mut(&mut self, id: Uuid) -> Option<&mut QueuedGeneration> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }
}

struct Inner {
    state: Mutex<QueueState>,
    backend: RwLock<Arc<dyn GenerationBackend>>,
    output: Option<Arc<dyn OutputStore>>,
    max_queue_size: usize,
    auto_save: bool,
    idle: Notify,
}

/// Bounded FIFO of generation jobs with a single worker
///
/// Cloning yields another handle to the same queue. Enqueueing and resuming
/// spawn the processing loop, so they must be called inside a tokio runtime.
#[derive(Clone)]
pub struct GenerationQueue {
    inner: Arc<Inner>,
}

impl GenerationQueue {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: &QueueConfig) -> Self {
        Self::build(backend, None, config)
    }

    /// Queue that persists completed outputs through `output`
    pub fn with_output_store(
        backend: Arc<dyn GenerationBackend>,
        output: Arc<dyn OutputStore>,
        config: &QueueConfig,
    ) -> Self {
        Self::build(backend, Some(output), config)
    }

    fn build(
        backend: Arc<dyn GenerationBackend>,
        output: Option<Arc<dyn OutputStore>>,
        config: &QueueConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                backend: RwLock::new(backend),
                output,
                max_queue_size: config.max_queue_size,
                auto_save: config.auto_save,
                idle: Notify::new(),
            }),
        }
    }

    /// Append a pending job. Returns false, without changing anything, when
    /// the queue is at capacity.
    pub fn enqueue(
        &self,
        prompt: impl Into<String>,
        negative_prompt: impl Into<String>,
        parameters: GenerationParameters,
        generation_type: GenerationType,
    ) -> bool {
        self.try_enqueue(prompt, negative_prompt, parameters, generation_type)
            .is_ok()
    }

    pub fn try_enqueue(
        &self,
        prompt: impl Into<String>,
        negative_prompt: impl Into<String>,
        parameters: GenerationParameters,
        generation_type: GenerationType,
    ) -> Result<Uuid, QueueError> {
        let mut state = self.inner.state.lock();
        if state.items.len() >= self.inner.max_queue_size {
            debug!("Rejecting generation, queue holds {} items", state.items.len());
            return Err(QueueError::QueueFull {
                capacity: self.inner.max_queue_size,
            });
        }

        let item = QueuedGeneration::new(prompt, negative_prompt, parameters, generation_type);
        let id = item.id;
        state.items.push(item);
        debug!("Enqueued generation {}", id);

        Inner::start_processing_locked(&self.inner, &mut state);
        Ok(id)
    }

    /// Remove a job that has not started yet
    pub fn remove(&self, id: Uuid) -> bool {
        let mut state = self.inner.state.lock();
        match state.position(id) {
            Some(index) if state.items[index].is_pending() => {
                state.items.remove(index);
                true
            }
            _ => false,
        }
    }

    /// Mark the running job cancelled and ask the backend to stop it.
    ///
    /// The queue stops waiting for the job at once; whether the backend
    /// actually stops working on it depends on the backend.
    pub fn cancel_current(&self) -> bool {
        let mut state = self.inner.state.lock();
        let Some(id) = state.current else {
            return false;
        };

        let cancelled = state
            .item_mut(id)
            .is_some_and(|item| item.finish(GenerationStatus::Cancelled, None));
        if let Some(token) = state.current_cancel.take() {
            token.cancel();
        }

        if cancelled {
            info!("Cancelled generation {}", id);
        }
        cancelled
    }

    /// Let the running job finish but start no further jobs
    pub fn pause(&self) {
        let mut state = self.inner.state.lock();
        if !state.paused {
            state.paused = true;
            info!("Generation queue paused");
        }
    }

    pub fn resume(&self) {
        let mut state = self.inner.state.lock();
        if state.paused {
            state.paused = false;
            info!("Generation queue resumed");
        }
        Inner::start_processing_locked(&self.inner, &mut state);
    }

    /// Swap a pending job with the pending job before it
    pub fn move_up(&self, id: Uuid) -> bool {
        let mut state = self.inner.state.lock();
        match state.position(id) {
            Some(index) if index > 0 => swap_pending(&mut state.items, index - 1, index),
            _ => false,
        }
    }

    /// Swap a pending job with the pending job after it
    pub fn move_down(&self, id: Uuid) -> bool {
        let mut state = self.inner.state.lock();
        match state.position(id) {
            Some(index) if index + 1 < state.items.len() => {
                swap_pending(&mut state.items, index, index + 1)
            }
            _ => false,
        }
    }

    /// Drop completed, failed and cancelled jobs
    pub fn clear_finished(&self) -> usize {
        let mut state = self.inner.state.lock();
        let before = state.items.len();
        state.items.retain(|item| !item.is_finished());
        before - state.items.len()
    }

    /// Stop processing and empty the queue
    pub fn clear_all(&self) {
        let mut state = self.inner.state.lock();
        if let Some(token) = state.current_cancel.take() {
            token.cancel();
        }
        state.items.clear();
        state.current = None;
        state.processing = false;
        state.epoch += 1;
        drop(state);

        info!("Generation queue cleared");
        self.inner.idle.notify_waiters();
    }

    /// Swap the backend used for jobs started from now on
    pub fn set_backend(&self, backend: Arc<dyn GenerationBackend>) {
        info!("Switching generation backend to {}", backend.name());
        *self.inner.backend.write() = backend;
    }

    pub fn backend_name(&self) -> String {
        self.inner.backend.read().name().to_string()
    }

    pub fn snapshot(&self) -> Vec<QueuedGeneration> {
        self.inner.state.lock().items.clone()
    }

    pub fn get(&self, id: Uuid) -> Option<QueuedGeneration> {
        let state = self.inner.state.lock();
        state.items.iter().find(|item| item.id == id).cloned()
    }

    /// The running job, if any
    pub fn current(&self) -> Option<QueuedGeneration> {
        let state = self.inner.state.lock();
        let id = state.current?;
        state.items.iter().find(|item| item.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().items.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        let state = self.inner.state.lock();
        state.items.iter().filter(|item| item.is_pending()).count()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.state.lock().processing
    }

    pub fn is_paused(&self) -> bool {
        self.inner.state.lock().paused
    }

    pub fn capacity(&self) -> usize {
        self.inner.max_queue_size
    }

    /// Resolves once the processing loop has stopped
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.inner.state.lock().processing {
                return;
            }
            notified.await;
        }
    }
}

fn swap_pending(items: &mut [QueuedGeneration], a: usize, b: usize) -> bool {
    if items[a].is_pending() && items[b].is_pending() {
        items.swap(a, b);
        true
    } else {
        false
    }
}

struct Claimed {
    id: Uuid,
    request: GenerationRequest,
    cancel: CancellationToken,
}

impl Inner {
    fn start_processing_locked(this: &Arc<Self>, state: &mut QueueState) {
        if state.processing || state.paused || !state.items.iter().any(|i| i.is_pending()) {
            return;
        }
        state.processing = true;
        tokio::spawn(process_loop(Arc::clone(this), state.epoch));
    }

    /// Take the oldest pending item, or stop the loop
    fn claim_next(&self, epoch: u64) -> Option<Claimed> {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            return None;
        }

        let next = if state.paused {
            None
        } else {
            state.items.iter().position(|item| item.is_pending())
        };

        let Some(index) = next else {
            state.processing = false;
            drop(state);
            debug!("Generation queue idle");
            self.idle.notify_waiters();
            return None;
        };

        let item = &mut state.items[index];
        item.mark_running();
        let claimed = Claimed {
            id: item.id,
            request: item.request(),
            cancel: CancellationToken::new(),
        };
        state.current = Some(claimed.id);
        state.current_cancel = Some(claimed.cancel.clone());
        Some(claimed)
    }

    fn finish(
        &self,
        epoch: u64,
        id: Uuid,
        outcome: Result<&GenerationResult, &BackendError>,
    ) -> bool {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            return false;
        }
        if state.current == Some(id) {
            state.current = None;
            state.current_cancel = None;
        }

        let Some(item) = state.item_mut(id) else {
            return false;
        };
        let finished = match outcome {
            Ok(result) => {
                let completed = item.finish(GenerationStatus::Completed, None);
                if completed {
                    item.metadata = Some(result.metadata.clone());
                }
                completed
            }
            Err(BackendError::Cancelled) => item.finish(GenerationStatus::Cancelled, None),
            Err(e) => item.finish(GenerationStatus::Failed, Some(e.to_string())),
        };

        if finished {
            match outcome {
                Ok(_) => info!("Generation {} completed", id),
                Err(e) => warn!("Generation {} failed: {}", id, e),
            }
        }
        finished
    }

    fn record_outputs(&self, id: Uuid, paths: Vec<PathBuf>) {
        if let Some(item) = self.state.lock().item_mut(id) {
            item.output_paths.extend(paths);
        }
    }

    fn release_cancelled(&self, epoch: u64, id: Uuid) {
        let mut state = self.state.lock();
        if state.epoch == epoch && state.current == Some(id) {
            state.current = None;
            state.current_cancel = None;
        }
    }
}

async fn process_loop(inner: Arc<Inner>, epoch: u64) {
    while let Some(claimed) = inner.claim_next(epoch) {
        let backend = Arc::clone(&*inner.backend.read());
        debug!("Running generation {} on {}", claimed.id, backend.name());

        let outcome = tokio::select! {
            result = backend.generate(&claimed.request) => Some(result),
            _ = claimed.cancel.cancelled() => None,
        };

        match outcome {
            Some(result) => {
                let completed = inner.finish(epoch, claimed.id, result.as_ref());
                if let (true, Ok(result)) = (completed, &result) {
                    if inner.auto_save {
                        if let Some(output) = &inner.output {
                            let paths = save_outputs(output.as_ref(), claimed.id, result).await;
                            inner.record_outputs(claimed.id, paths);
                        }
                    }
                }
            }
            None => {
                // The generate future is gone; tell the backend too
                backend.cancel().await;
                inner.release_cancelled(epoch, claimed.id);
            }
        }
    }
}

/// Persist every artifact of a result. Failures are logged only.
async fn save_outputs(output: &dyn OutputStore, id: Uuid, result: &GenerationResult) -> Vec<PathBuf> {
    let metadata = &result.metadata;
    let mut paths = Vec::with_capacity(result.media.len());

    for media in &result.media {
        let label = MediaLabel {
            prompt: metadata.prompt.clone(),
            seed: metadata.seed,
            generation_type: metadata.generation_type,
            kind: media.kind,
        };

        let path = match output.save_media(&media.data, &label).await {
            Ok(path) => path,
            Err(e) => {
                warn!("Failed to save output of generation {}: {}", id, e);
                continue;
            }
        };
        if let Err(e) = output.save_metadata(metadata, &path).await {
            warn!("Failed to save metadata for {}: {}", path.display(), e);
        }
        paths.push(path);
    }

    paths
}
