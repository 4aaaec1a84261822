use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use log::{debug, error, warn};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use crate::error::PluginError;
use crate::rpc::message::{self, Response};

pub type RpcResult = Result<JsonValue, PluginError>;

/// Called once with the outcome of an asynchronous request.
pub trait OneShotCallback: Send {
    fn call(self: Box<Self>, result: RpcResult);
}

impl<F: FnOnce(RpcResult) + Send> OneShotCallback for F {
    fn call(self: Box<Self>, result: RpcResult) {
        (*self)(result)
    }
}

/// Called for every chunk of a streaming request. Dropping the last clone ends the stream.
#[derive(Clone)]
pub struct CloneableCallback {
    callback: Arc<dyn Fn(RpcResult) + Send + Sync>,
}

impl CloneableCallback {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(RpcResult) + Send + Sync + 'static,
    {
        CloneableCallback {
            callback: Arc::new(callback),
        }
    }

    pub fn call(&self, result: RpcResult) {
        (self.callback)(result)
    }
}

/// The other side of the rpc channel, used behind an `Arc`.
pub trait Peer: Send + Sync + 'static {
    fn box_clone(&self) -> RpcPeer;

    fn send_rpc_notification(&self, method: &str, params: &JsonValue);

    /// Sends a request and blocks the calling thread until the plugin answers.
    fn send_rpc_request(&self, method: &str, params: &JsonValue) -> Result<JsonValue, PluginError>;

    fn send_rpc_request_timeout(
        &self,
        method: &str,
        params: &JsonValue,
        timeout: Duration,
    ) -> Result<JsonValue, PluginError>;

    fn async_send_rpc_request(&self, method: &str, params: &JsonValue, f: Box<dyn OneShotCallback>);

    fn stream_rpc_request(&self, method: &str, params: &JsonValue, f: CloneableCallback);

    fn request_is_pending(&self) -> bool;

    /// Marks the peer as going away on purpose, so a closed pipe is not reported as a crash.
    fn request_shutdown(&self);

    fn is_shutting_down(&self) -> bool;
}

pub type RpcPeer = Arc<dyn Peer>;

enum ResponseHandler {
    Chan(mpsc::Sender<RpcResult>),
    Callback(Box<dyn OneShotCallback>),
    Stream(CloneableCallback),
}

impl ResponseHandler {
    fn invoke(self, result: RpcResult) {
        match self {
            ResponseHandler::Chan(tx) => {
                let _ = tx.send(result);
            }
            ResponseHandler::Callback(f) => f.call(result),
            ResponseHandler::Stream(f) => f.call(result),
        }
    }
}

struct RpcState<W: Write> {
    writer: Mutex<W>,
    id: AtomicU64,
    pending: Mutex<BTreeMap<u64, ResponseHandler>>,
    shutting_down: AtomicBool,
}

/// The host's end of the pipe to one plugin process.
pub struct RawPeer<W: Write + 'static>(Arc<RpcState<W>>);

impl<W: Write + 'static> Clone for RawPeer<W> {
    fn clone(&self) -> Self {
        RawPeer(self.0.clone())
    }
}

impl<W: Write + Send + 'static> RawPeer<W> {
    pub(crate) fn new(writer: W) -> Self {
        RawPeer(Arc::new(RpcState {
            writer: Mutex::new(writer),
            id: AtomicU64::new(0),
            pending: Mutex::new(BTreeMap::new()),
            shutting_down: AtomicBool::new(false),
        }))
    }

    pub(crate) fn send(&self, value: &JsonValue) -> std::io::Result<()> {
        let mut line = serde_json::to_string(value)?;
        line.push('\n');
        let mut writer = self.0.writer.lock();
        writer.write_all(line.as_bytes())?;
        writer.flush()
    }

    fn send_rpc(&self, method: &str, params: &JsonValue, handler: ResponseHandler) -> u64 {
        let id = self.0.id.fetch_add(1, Ordering::Relaxed);
        self.0.pending.lock().insert(id, handler);
        debug!("[RPC] sending request <{}> with id <{}>", method, id);
        if let Err(e) = self.send(&message::request(id, method, params)) {
            error!("[RPC] failed to send request <{}>: {}", method, e);
            if let Some(handler) = self.0.pending.lock().remove(&id) {
                handler.invoke(Err(PluginError::Io(e)));
            }
        }
        id
    }

    fn take_pending(&self, id: u64) -> Option<ResponseHandler> {
        self.0.pending.lock().remove(&id)
    }

    pub(crate) fn handle_response(&self, id: u64, response: Response) {
        match response {
            Response::StreamData(chunk) => {
                // Stream handlers stay registered until the terminal message.
                let callback = match self.0.pending.lock().get(&id) {
                    Some(ResponseHandler::Stream(f)) => Some(f.clone()),
                    Some(_) => None,
                    None => {
                        warn!("[RPC] stream chunk for unknown request id <{}>", id);
                        return;
                    }
                };
                match callback {
                    Some(f) => f.call(Ok(chunk)),
                    None => {
                        if let Some(handler) = self.take_pending(id) {
                            handler.invoke(Ok(chunk));
                        }
                    }
                }
            }
            Response::StreamEnd(last) => match self.take_pending(id) {
                Some(ResponseHandler::Stream(f)) => {
                    if let Some(last) = last {
                        f.call(Ok(last));
                    }
                }
                Some(handler) => handler.invoke(Ok(last.unwrap_or(JsonValue::Null))),
                None => warn!("[RPC] stream end for unknown request id <{}>", id),
            },
            Response::Result(result) => match self.take_pending(id) {
                Some(handler) => handler.invoke(Ok(result)),
                None => warn!("[RPC] response for unknown request id <{}>", id),
            },
            Response::Error(err) => match self.take_pending(id) {
                Some(handler) => handler.invoke(Err(PluginError::Remote(err))),
                None => warn!("[RPC] error for unknown request id <{}>: {}", id, err),
            },
        }
    }

    /// Fails every outstanding request. Called once the read side is gone.
    pub(crate) fn disconnect(&self) {
        let pending = std::mem::take(&mut *self.0.pending.lock());
        if !pending.is_empty() {
            debug!("[RPC] failing <{}> pending requests", pending.len());
        }
        for (_, handler) in pending {
            handler.invoke(Err(PluginError::PeerDisconnect));
        }
    }

    fn wait_for(
        &self,
        method: &str,
        params: &JsonValue,
        timeout: Option<Duration>,
    ) -> RpcResult {
        let (tx, rx) = mpsc::channel();
        let id = self.send_rpc(method, params, ResponseHandler::Chan(tx));
        match timeout {
            Some(timeout) => match rx.recv_timeout(timeout) {
                Ok(result) => result,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    self.take_pending(id);
                    Err(PluginError::Timeout(format!(
                        "no response to <{}> after {:?}",
                        method, timeout
                    )))
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => Err(PluginError::PeerDisconnect),
            },
            None => rx.recv().unwrap_or(Err(PluginError::PeerDisconnect)),
        }
    }
}

impl<W: Write + Send + 'static> Peer for RawPeer<W> {
    fn box_clone(&self) -> RpcPeer {
        Arc::new(self.clone())
    }

    fn send_rpc_notification(&self, method: &str, params: &JsonValue) {
        if let Err(e) = self.send(&message::notification(method, params)) {
            error!("[RPC] failed to send notification <{}>: {}", method, e);
        }
    }

    fn send_rpc_request(&self, method: &str, params: &JsonValue) -> Result<JsonValue, PluginError> {
        self.wait_for(method, params, None)
    }

    fn send_rpc_request_timeout(
        &self,
        method: &str,
        params: &JsonValue,
        timeout: Duration,
    ) -> Result<JsonValue, PluginError> {
        self.wait_for(method, params, Some(timeout))
    }

    fn async_send_rpc_request(&self, method: &str, params: &JsonValue, f: Box<dyn OneShotCallback>) {
        self.send_rpc(method, params, ResponseHandler::Callback(f));
    }

    fn stream_rpc_request(&self, method: &str, params: &JsonValue, f: CloneableCallback) {
        self.send_rpc(method, params, ResponseHandler::Stream(f));
    }

    fn request_is_pending(&self) -> bool {
        !self.0.pending.lock().is_empty()
    }

    fn request_shutdown(&self) {
        self.0.shutting_down.store(true, Ordering::SeqCst);
    }

    fn is_shutting_down(&self) -> bool {
        self.0.shutting_down.load(Ordering::SeqCst)
    }
}
