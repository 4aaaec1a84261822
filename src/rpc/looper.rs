use std::io::{BufRead, Write};
use std::sync::Arc;

use log::{debug, error, trace, warn};
use serde_json::Value as JsonValue;

use crate::error::{ReadError, RemoteError};
use crate::rpc::message::{self, Call, RpcObject};
use crate::rpc::peer::{Peer, RawPeer, RpcPeer};

pub struct RpcCtx {
    pub peer: RpcPeer,
}

/// Receives the calls a plugin makes to the host.
pub trait Handler {
    fn handle_request(
        &mut self,
        ctx: &RpcCtx,
        method: &str,
        params: JsonValue,
    ) -> Result<JsonValue, RemoteError>;

    fn handle_notification(&mut self, ctx: &RpcCtx, method: &str, params: JsonValue);
}

/// Reads messages from a plugin's stdout and routes them.
pub struct RpcLoop<W: Write + Send + 'static> {
    peer: RawPeer<W>,
}

impl<W: Write + Send + 'static> RpcLoop<W> {
    pub fn new(writer: W) -> Self {
        RpcLoop {
            peer: RawPeer::new(writer),
        }
    }

    pub fn get_raw_peer(&self) -> RawPeer<W> {
        self.peer.clone()
    }

    /// Runs until the plugin closes its stdout. Pending requests are failed before returning.
    ///
    /// Returns `Ok` only when the peer was asked to shut down beforehand.
    pub fn mainloop<R, RF, H>(&mut self, name: &str, rf: RF, handler: &mut H) -> Result<(), ReadError>
    where
        R: BufRead,
        RF: FnOnce() -> R,
        H: Handler,
    {
        let mut reader = rf();
        let ctx = RpcCtx {
            peer: Arc::new(self.peer.clone()),
        };
        let mut line = String::new();
        let result = loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => {
                    break if self.peer.is_shutting_down() {
                        Ok(())
                    } else {
                        Err(ReadError::Disconnect)
                    };
                }
                Ok(_) => {}
                Err(e) => break Err(ReadError::Io(e)),
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            trace!("[RPC] <{}> read: {}", name, trimmed);
            if let Err(e) = self.dispatch(trimmed, &ctx, handler) {
                if e.is_recoverable() {
                    warn!("[RPC] <{}> skipping message: {}", name, e);
                } else {
                    break Err(e);
                }
            }
        };

        if let Err(ref e) = result {
            debug!("[RPC] <{}> read loop ended: {}", name, e);
        }
        self.peer.disconnect();
        result
    }

    fn dispatch<H: Handler>(&self, line: &str, ctx: &RpcCtx, handler: &mut H) -> Result<(), ReadError> {
        let object = RpcObject::parse(line)?;
        if object.is_response() {
            let id = object.get_id().unwrap_or_default();
            match object.into_response() {
                Ok(response) => self.peer.handle_response(id, response),
                Err(e) => return Err(ReadError::NotObject(e)),
            }
            return Ok(());
        }

        match object.into_call()? {
            Call::Request { id, method, params } => {
                let result = handler.handle_request(ctx, &method, params);
                if let Err(e) = self.peer.send(&message::response(id, result)) {
                    error!("[RPC] failed to answer request <{}>: {}", method, e);
                    return Err(ReadError::Io(e));
                }
            }
            Call::Notification { method, params } => {
                handler.handle_notification(ctx, &method, params);
            }
        }
        Ok(())
    }
}
