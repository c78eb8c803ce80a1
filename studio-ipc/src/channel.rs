//! Correlated request/response channel over a daemon's stdio pipes
//!
//! Requests are written by a single writer task, so lines never interleave.
//! Responses are matched back to their callers purely by `request_id`; no
//! ordering between requests and responses is assumed.

use log::{debug, warn};
use parking_lot::Mutex;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

use crate::error::IpcError;
use crate::protocol::{DaemonRequest, DaemonResponse, ResponsePayload};

type PendingSender = oneshot::Sender<Result<ResponsePayload, IpcError>>;
type PendingMap = Mutex<HashMap<String, PendingSender>>;

/// Concurrent RPC over one newline-delimited JSON stream
#[derive(Default)]
pub struct IpcChannel {
    pending: PendingMap,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

/// Removes a pending entry when the caller stops waiting
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    request_id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(self.request_id);
    }
}

impl IpcChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the daemon's input stream. Must be called from within a tokio runtime.
    pub fn attach<W>(&self, writer: W)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_lines(writer, rx));
        *self.outbound.lock() = Some(tx);
    }

    /// Detach the input stream; the writer task exits once drained
    pub fn detach(&self) {
        self.outbound.lock().take();
    }

    pub fn is_attached(&self) -> bool {
        self.outbound.lock().is_some()
    }

    /// Number of calls still waiting for a response
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Send a command and wait for its response
    pub async fn send(
        &self,
        command: &str,
        params: Map<String, JsonValue>,
    ) -> Result<ResponsePayload, IpcError> {
        self.send_request(DaemonRequest::new(command, params)).await
    }

    /// Send a prepared request and wait for the response carrying its id
    pub async fn send_request(&self, request: DaemonRequest) -> Result<ResponsePayload, IpcError> {
        let line = request.to_line()?;
        let (tx, rx) = oneshot::channel();

        self.pending.lock().insert(request.request_id.clone(), tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            request_id: &request.request_id,
        };

        if !self.enqueue_line(line) {
            return Err(IpcError::NotConnected);
        }
        debug!("Sent {} request {}", request.command, request.request_id);

        rx.await.unwrap_or(Err(IpcError::Cancelled))
    }

    fn enqueue_line(&self, line: String) -> bool {
        match self.outbound.lock().as_ref() {
            Some(outbound) => outbound.send(line).is_ok(),
            None => false,
        }
    }

    /// Route one output line to its pending call. Malformed lines and
    /// responses for unknown or already-resolved ids are dropped.
    /// Returns whether a caller was resolved.
    pub fn handle_line(&self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return false;
        }

        let response = match DaemonResponse::parse(line) {
            Ok(response) => response,
            Err(e) => {
                debug!("Dropping malformed daemon output: {}", e);
                return false;
            }
        };

        let Some(request_id) = response.request_id.clone() else {
            debug!("Dropping daemon output without request_id: {}", line);
            return false;
        };

        let sender = self.pending.lock().remove(&request_id);
        match sender {
            Some(sender) => {
                // The receiver may already be gone if the caller gave up
                let _ = sender.send(response.into_result());
                true
            }
            None => {
                debug!("Dropping response for unknown request {}", request_id);
                false
            }
        }
    }

    /// Fail every pending call with `error`, returning how many were failed
    pub fn fail_all(&self, error: IpcError) -> usize {
        let drained: Vec<PendingSender> = self.pending.lock().drain().map(|(_, tx)| tx).collect();
        let count = drained.len();

        for sender in drained {
            let _ = sender.send(Err(error.clone()));
        }

        if count > 0 {
            debug!("Failed {} pending daemon calls: {}", count, error);
        }
        count
    }
}

async fn write_lines<W>(mut writer: W, mut lines: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        let written = match writer.write_all(line.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            warn!("Failed to write to daemon input: {}", e);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::LineReader;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::DuplexStream;

    fn attached() -> (Arc<IpcChannel>, LineReader<DuplexStream>) {
        let channel = Arc::new(IpcChannel::new());
        let (client, server) = tokio::io::duplex(64 * 1024);
        channel.attach(client);
        (channel, LineReader::new(server))
    }

    fn params(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().unwrap()
    }

    async fn next_request(requests: &mut LineReader<DuplexStream>) -> JsonValue {
        let line = requests.next_line().await.unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn test_responses_matched_in_reverse_order() {
        let (channel, mut requests) = attached();

        let mut calls = Vec::new();
        for n in 0..3 {
            let channel = channel.clone();
            calls.push(tokio::spawn(async move {
                channel.send("echo", params(json!({ "n": n }))).await
            }));
        }

        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(next_request(&mut requests).await);
        }
        assert_eq!(channel.pending_count(), 3);

        for request in received.iter().rev() {
            let reply = json!({"request_id": request["request_id"], "n": request["n"]});
            assert!(channel.handle_line(&reply.to_string()));
        }

        for (n, call) in calls.into_iter().enumerate() {
            let payload = call.await.unwrap().unwrap();
            assert_eq!(payload["n"], json!(n));
        }
        assert_eq!(channel.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_and_duplicate_ids_are_ignored() {
        let (channel, mut requests) = attached();

        let call = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.send("health", Map::new()).await })
        };
        let request = next_request(&mut requests).await;
        let id = request["request_id"].as_str().unwrap().to_string();

        assert!(!channel.handle_line(r#"{"request_id":"stale","status":"ok"}"#));
        assert!(!channel.handle_line("Loading weights..."));
        assert!(!channel.handle_line(r#"{"error":"Invalid JSON"}"#));
        assert_eq!(channel.pending_count(), 1);

        assert!(channel.handle_line(&json!({"request_id": id, "status": "ok"}).to_string()));
        assert!(!channel.handle_line(&json!({"request_id": id, "status": "late"}).to_string()));

        let payload = call.await.unwrap().unwrap();
        assert_eq!(payload["status"], "ok");
    }

    #[tokio::test]
    async fn test_remote_error_reaches_caller() {
        let (channel, mut requests) = attached();

        let call = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.send("generate_image", Map::new()).await })
        };
        let request = next_request(&mut requests).await;
        channel.handle_line(
            &json!({"request_id": request["request_id"], "error": "Unknown command"}).to_string(),
        );

        assert_eq!(
            call.await.unwrap().unwrap_err(),
            IpcError::Remote("Unknown command".to_string())
        );
    }

    #[tokio::test]
    async fn test_fail_all_resolves_every_pending_call() {
        let (channel, mut requests) = attached();

        let mut calls = Vec::new();
        for _ in 0..4 {
            let channel = channel.clone();
            calls.push(tokio::spawn(async move { channel.send("health", Map::new()).await }));
        }
        for _ in 0..4 {
            next_request(&mut requests).await;
        }

        let error = IpcError::ProcessTerminated("exit status: 9".to_string());
        assert_eq!(channel.fail_all(error.clone()), 4);

        for call in calls {
            assert_eq!(call.await.unwrap().unwrap_err(), error);
        }
        assert_eq!(channel.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_send_without_writer() {
        let channel = IpcChannel::new();
        let result = channel.send("health", Map::new()).await;

        assert_eq!(result.unwrap_err(), IpcError::NotConnected);
        assert_eq!(channel.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_call_is_unregistered() {
        let (channel, _requests) = attached();

        let result =
            tokio::time::timeout(Duration::from_millis(20), channel.send("health", Map::new())).await;

        assert!(result.is_err());
        assert_eq!(channel.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_detach() {
        let (channel, _requests) = attached();
        assert!(channel.is_attached());

        channel.detach();
        assert!(!channel.is_attached());
        assert_eq!(
            channel.send("health", Map::new()).await.unwrap_err(),
            IpcError::NotConnected
        );
    }
}
