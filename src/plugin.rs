use std::fmt::{Display, Formatter};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tokio::sync::{mpsc, watch};

use crate::commands::{build_command, stop_child};
use crate::error::PluginError;
use crate::manager::WeakPluginState;
use crate::rpc::{
    CloneableCallback, DefaultResponseParser, ResponseParser, RpcLoop, RpcPeer, RpcResult,
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const EXIT_GRACE: Duration = Duration::from_secs(2);

#[derive(
    Default, Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PluginId(pub(crate) i64);

impl From<i64> for PluginId {
    fn from(id: i64) -> Self {
        PluginId(id)
    }
}

impl Display for PluginId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunningState {
    /// No plugin has been started yet, or the last one was destroyed
    Uninitialized,
    /// The plugin process is being spawned
    Connecting,
    /// The process is up and registered, but not initialized
    Connected { plugin_id: PluginId },
    /// The plugin accepted its `initialize` request
    Running { plugin_id: PluginId },
    /// The plugin was stopped on purpose
    Stopped { plugin_id: PluginId },
    /// The plugin process went away without being asked to
    UnexpectedStop { plugin_id: PluginId },
}

impl RunningState {
    pub fn plugin_id(&self) -> Option<PluginId> {
        match self {
            RunningState::Uninitialized | RunningState::Connecting => None,
            RunningState::Connected { plugin_id }
            | RunningState::Running { plugin_id }
            | RunningState::Stopped { plugin_id }
            | RunningState::UnexpectedStop { plugin_id } => Some(*plugin_id),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, RunningState::Running { .. })
    }

    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            RunningState::Connecting | RunningState::Connected { .. }
        )
    }

    pub fn is_stopped(&self) -> bool {
        matches!(
            self,
            RunningState::Stopped { .. } | RunningState::UnexpectedStop { .. }
        )
    }
}

impl Display for RunningState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RunningState::Uninitialized => write!(f, "uninitialized"),
            RunningState::Connecting => write!(f, "connecting"),
            RunningState::Connected { plugin_id } => write!(f, "connected ({})", plugin_id),
            RunningState::Running { plugin_id } => write!(f, "running ({})", plugin_id),
            RunningState::Stopped { plugin_id } => write!(f, "stopped ({})", plugin_id),
            RunningState::UnexpectedStop { plugin_id } => {
                write!(f, "stopped unexpectedly ({})", plugin_id)
            }
        }
    }
}

pub type RunningStateSender = Arc<watch::Sender<RunningState>>;
pub type RunningStateReceiver = watch::Receiver<RunningState>;

pub fn running_state_channel() -> (RunningStateSender, RunningStateReceiver) {
    let (tx, rx) = watch::channel(RunningState::Uninitialized);
    (Arc::new(tx), rx)
}

/// Publishes the state only while it still describes `plugin_id`, so a plugin that is
/// going away cannot overwrite the state of its replacement.
fn publish_for(running_state: &RunningStateSender, plugin_id: PluginId, state: RunningState) {
    running_state.send_if_modified(|current| {
        if current.plugin_id() == Some(plugin_id) {
            *current = state;
            true
        } else {
            false
        }
    });
}

#[derive(Debug, Clone)]
pub struct PluginInfo {
    pub name: String,
    pub exec_path: PathBuf,
    pub args: Vec<String>,
}

impl PluginInfo {
    pub fn new<T: Into<PathBuf>>(name: &str, exec_path: T) -> Self {
        PluginInfo {
            name: name.to_string(),
            exec_path: exec_path.into(),
            args: vec![],
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

/// A running plugin process and the rpc peer used to talk to it.
pub struct Plugin {
    peer: RpcPeer,
    pub(crate) id: PluginId,
    pub(crate) name: String,
    process: Option<Arc<Mutex<Child>>>,
    pub(crate) running_state: RunningStateSender,
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Display for Plugin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.process {
            Some(process) => write!(
                f,
                "{}, plugin id: {}, process id: {}",
                self.name,
                self.id,
                process.lock().id()
            ),
            None => write!(f, "{}, plugin id: {}", self.name, self.id),
        }
    }
}

impl Plugin {
    pub(crate) fn new(
        peer: RpcPeer,
        id: PluginId,
        name: String,
        process: Option<Arc<Mutex<Child>>>,
        running_state: RunningStateSender,
    ) -> Self {
        Plugin {
            peer,
            id,
            name,
            process,
            running_state,
        }
    }

    pub fn id(&self) -> PluginId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sends `initialize`; the plugin counts as running once it answers and as stopped if it refuses.
    pub async fn initialize(&self, params: JsonValue) -> Result<(), PluginError> {
        if let Err(err) = self
            .async_request::<DefaultResponseParser>("initialize", &params)
            .await
        {
            publish_for(
                &self.running_state,
                self.id,
                RunningState::Stopped { plugin_id: self.id },
            );
            return Err(err);
        }
        publish_for(
            &self.running_state,
            self.id,
            RunningState::Running { plugin_id: self.id },
        );
        Ok(())
    }

    pub fn request(&self, method: &str, params: &JsonValue) -> Result<JsonValue, PluginError> {
        self.peer.send_rpc_request(method, params)
    }

    pub async fn async_request<P: ResponseParser>(
        &self,
        method: &str,
        params: &JsonValue,
    ) -> Result<P::ValueType, PluginError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.peer.async_send_rpc_request(
            method,
            params,
            Box::new(move |result: RpcResult| {
                let _ = tx.send(result);
            }),
        );
        let value = rx.await.map_err(|err| {
            PluginError::Internal(anyhow!("error waiting for async response: {:?}", err))
        })??;
        let value = P::parse_json(value)?;
        Ok(value)
    }

    /// Each chunk the plugin streams back is parsed and forwarded; the receiver ends with the stream.
    ///
    /// The channel is unbounded: chunks are pushed from the read loop, or from the calling
    /// task when the request cannot be written, and neither may block.
    pub fn stream_request<P: ResponseParser>(
        &self,
        method: &str,
        params: &JsonValue,
    ) -> Result<mpsc::UnboundedReceiver<Result<P::ValueType, PluginError>>, PluginError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback = CloneableCallback::new(move |result: RpcResult| {
            let item = result.and_then(|json| P::parse_json(json).map_err(PluginError::from));
            let _ = tx.send(item);
        });
        self.peer.stream_rpc_request(method, params, callback);
        Ok(rx)
    }

    pub fn shutdown(&self) {
        self.peer.request_shutdown();
        match self
            .peer
            .send_rpc_request_timeout("shutdown", &json!({}), SHUTDOWN_TIMEOUT)
        {
            Ok(_) => info!("[RPC] shutting down plugin {}", self),
            Err(PluginError::PeerDisconnect) => debug!("[RPC] plugin {} already gone", self),
            Err(err) => error!("[RPC] error sending shutdown to plugin {}: {}", self, err),
        }
        if let Some(process) = &self.process {
            if let Err(err) = stop_child(&mut process.lock(), EXIT_GRACE) {
                error!("[RPC] failed to stop plugin process {}: {}", self.name, err);
            }
        }
    }

    pub fn subscribe_running_state(&self) -> RunningStateReceiver {
        self.running_state.subscribe()
    }
}

/// Runs the host side of one plugin connection on the current thread.
pub(crate) struct PluginHost {
    pub(crate) id: PluginId,
    pub(crate) name: String,
    pub(crate) state: WeakPluginState,
    pub(crate) running_state: RunningStateSender,
}

impl PluginHost {
    /// Registers the plugin, calls `on_connected`, then reads until the plugin goes away.
    pub(crate) fn serve<W, R, F>(
        self,
        writer: W,
        reader: R,
        process: Option<Arc<Mutex<Child>>>,
        on_connected: F,
    ) where
        W: Write + Send + 'static,
        R: BufRead,
        F: FnOnce(),
    {
        let PluginHost {
            id,
            name,
            state,
            running_state,
        } = self;
        let mut looper = RpcLoop::new(writer);
        let peer: RpcPeer = Arc::new(looper.get_raw_peer());
        peer.send_rpc_notification("ping", &JsonValue::Array(Vec::new()));

        let plugin = Plugin::new(
            peer.clone(),
            id,
            name.clone(),
            process.clone(),
            running_state.clone(),
        );
        state.plugin_connect(plugin);
        running_state.send_replace(RunningState::Connected { plugin_id: id });
        on_connected();

        let mut handler = state.clone();
        let result = looper.mainloop(&name, || reader, &mut handler);

        let final_state = if peer.is_shutting_down() {
            RunningState::Stopped { plugin_id: id }
        } else {
            warn!("[RPC] plugin <{}> stopped unexpectedly", name);
            RunningState::UnexpectedStop { plugin_id: id }
        };
        state.plugin_exit(id, result);
        if let Some(process) = process {
            if let Err(err) = stop_child(&mut process.lock(), EXIT_GRACE) {
                error!("Failed to reap plugin process <{}>: {}", name, err);
            }
        }
        publish_for(&running_state, id, final_state);
    }
}

pub(crate) async fn start_plugin_process(
    plugin_info: PluginInfo,
    id: PluginId,
    state: WeakPluginState,
    running_state: RunningStateSender,
) -> Result<(), PluginError> {
    debug!("Starting plugin process <{}> for <{:?}>", id, plugin_info);
    #[cfg(unix)]
    ensure_executable(&plugin_info.exec_path).await?;

    let (tx, ret) = tokio::sync::oneshot::channel::<std::io::Result<()>>();
    let spawn_result = thread::Builder::new()
        .name(format!("<{}> plugin host thread", &plugin_info.name))
        .spawn(move || {
            info!("Loading {} plugin", &plugin_info.name);
            running_state.send_replace(RunningState::Connecting);
            let child = build_command(&plugin_info.exec_path, &plugin_info.args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .spawn();

            let mut child = match child {
                Ok(child) => child,
                Err(err) => {
                    error!("Failed to start plugin process <{}>: {}", plugin_info.name, err);
                    running_state.send_replace(RunningState::Uninitialized);
                    let _ = tx.send(Err(err));
                    return;
                }
            };

            let (child_stdin, child_stdout) = match (child.stdin.take(), child.stdout.take()) {
                (Some(stdin), Some(stdout)) => (stdin, stdout),
                _ => {
                    let _ = child.kill();
                    let _ = child.wait();
                    running_state.send_replace(RunningState::Uninitialized);
                    let _ = tx.send(Err(std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "plugin stdio was not captured",
                    )));
                    return;
                }
            };

            let host = PluginHost {
                id,
                name: plugin_info.name.clone(),
                state,
                running_state,
            };
            host.serve(
                child_stdin,
                BufReader::new(child_stdout),
                Some(Arc::new(Mutex::new(child))),
                move || {
                    let _ = tx.send(Ok(()));
                },
            );
        });

    if let Err(err) = spawn_result {
        error!("[RPC] thread spawn failed for <{}>: {}", id, err);
        return Err(PluginError::Io(err));
    }

    ret.await
        .map_err(|_| PluginError::Internal(anyhow!("plugin host thread exited early")))??;
    Ok(())
}

#[cfg(unix)]
async fn ensure_executable(exec_path: &Path) -> Result<(), PluginError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = tokio::fs::metadata(exec_path).await?;
    let mut permissions = metadata.permissions();
    if permissions.mode() & 0o111 == 0o111 {
        return Ok(());
    }
    debug!("Making <{}> executable", exec_path.display());
    permissions.set_mode(permissions.mode() | 0o755);
    tokio::fs::set_permissions(exec_path, permissions).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::RawPeer;

    #[test]
    fn running_state_helpers() {
        let id = PluginId::from(3);
        assert!(RunningState::Connecting.is_loading());
        assert!(RunningState::Connected { plugin_id: id }.is_loading());
        assert!(RunningState::Running { plugin_id: id }.is_ready());
        assert!(!RunningState::Uninitialized.is_loading());
        assert!(RunningState::UnexpectedStop { plugin_id: id }.is_stopped());
        assert_eq!(RunningState::Stopped { plugin_id: id }.plugin_id(), Some(id));
        assert_eq!(RunningState::Connecting.plugin_id(), None);
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn stream_write_failure_ends_stream_with_io_error() {
        let (running_state, _rx) = running_state_channel();
        let plugin = Plugin::new(
            Arc::new(RawPeer::new(ClosedPipe)),
            PluginId::from(1),
            "closed".to_string(),
            None,
            running_state,
        );

        let mut stream = plugin
            .stream_request::<DefaultResponseParser>("stream_answer", &json!({}))
            .unwrap();
        assert!(matches!(stream.recv().await, Some(Err(PluginError::Io(_)))));
        assert!(stream.recv().await.is_none());
    }

    #[test]
    fn stale_plugin_cannot_overwrite_state() {
        let (tx, rx) = running_state_channel();
        tx.send_replace(RunningState::Running {
            plugin_id: PluginId::from(2),
        });
        publish_for(
            &tx,
            PluginId::from(1),
            RunningState::Stopped {
                plugin_id: PluginId::from(1),
            },
        );
        assert_eq!(
            *rx.borrow(),
            RunningState::Running {
                plugin_id: PluginId::from(2)
            }
        );
        publish_for(
            &tx,
            PluginId::from(2),
            RunningState::Stopped {
                plugin_id: PluginId::from(2),
            },
        );
        assert!(rx.borrow().is_stopped());
    }
}
