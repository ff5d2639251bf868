//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// A request addressed to the remote authority.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudRequest {
    /// Dataset the request concerns.
    pub dataset_id: String,
    /// JSON body, including the `fn` name and client identity.
    pub payload: Value,
}

impl CloudRequest {
    /// Returns the `fn` field of the payload.
    pub fn function(&self) -> Option<&str> {
        self.payload.get("fn").and_then(Value::as_str)
    }
}

/// A cloud handler delivers requests to the remote authority.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, RPC, mock for testing, etc.). A failed call is
/// reported as [`SyncError::Transport`] carrying the authority's message.
pub trait CloudHandler: Send + Sync + 'static {
    /// Sends `request` and returns the authority's JSON answer.
    fn send(&self, request: CloudRequest) -> impl Future<Output = SyncResult<Value>> + Send;
}

impl<C: CloudHandler> CloudHandler for Arc<C> {
    fn send(&self, request: CloudRequest) -> impl Future<Output = SyncResult<Value>> + Send {
        (**self).send(request)
    }
}

/// A mock cloud handler for testing.
///
/// Answers are scripted per `fn` name. One-shot answers queued with
/// [`MockCloudHandler::respond`] or [`MockCloudHandler::fail`] are used
/// first, then the fallback set with [`MockCloudHandler::set_default`].
/// Every request is recorded. [`MockCloudHandler::hold`] parks requests
/// until [`MockCloudHandler::release`], which lets a test act while a sync
/// loop is waiting on the network.
#[derive(Debug)]
pub struct MockCloudHandler {
    scripted: Mutex<HashMap<String, VecDeque<Result<Value, String>>>>,
    defaults: Mutex<HashMap<String, Value>>,
    requests: Mutex<Vec<CloudRequest>>,
    gate: watch::Sender<bool>,
}

impl Default for MockCloudHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCloudHandler {
    /// Creates a mock handler with no scripted answers.
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            scripted: Mutex::new(HashMap::new()),
            defaults: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            gate,
        }
    }

    /// Queues a successful answer for the next `function` call.
    pub fn respond(&self, function: &str, response: Value) {
        self.scripted
            .lock()
            .entry(function.to_string())
            .or_default()
            .push_back(Ok(response));
    }

    /// Queues a transport failure for the next `function` call.
    pub fn fail(&self, function: &str, message: impl Into<String>) {
        self.scripted
            .lock()
            .entry(function.to_string())
            .or_default()
            .push_back(Err(message.into()));
    }

    /// Sets the answer used when nothing is queued for `function`.
    pub fn set_default(&self, function: &str, response: Value) {
        self.defaults.lock().insert(function.to_string(), response);
    }

    /// Parks every request until [`MockCloudHandler::release`].
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    /// Lets parked and future requests through.
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Returns every request received so far.
    pub fn requests(&self) -> Vec<CloudRequest> {
        self.requests.lock().clone()
    }

    /// Returns the requests received for `function`.
    pub fn requests_for(&self, function: &str) -> Vec<CloudRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.function() == Some(function))
            .cloned()
            .collect()
    }

    /// Returns how many requests were received.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn answer(&self, function: &str) -> SyncResult<Value> {
        let scripted = self
            .scripted
            .lock()
            .get_mut(function)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(SyncError::transport_retryable(message)),
            None => self.defaults.lock().get(function).cloned().ok_or_else(|| {
                SyncError::Protocol(format!("No mock {function} response set"))
            }),
        }
    }
}

impl CloudHandler for MockCloudHandler {
    async fn send(&self, request: CloudRequest) -> SyncResult<Value> {
        let function = request.function().unwrap_or_default().to_string();
        self.requests.lock().push(request);

        let mut gate = self.gate.subscribe();
        gate.wait_for(|open| *open)
            .await
            .map_err(|_| SyncError::transport_fatal("mock handler dropped"))?;

        self.answer(&function)
    }
}
