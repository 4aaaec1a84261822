//! An in-process plugin for unit tests, connected to the host over a socket pair.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread;

use serde_json::{json, Value as JsonValue};

use crate::error::RemoteError;
use crate::manager::PluginManager;
use crate::plugin::{running_state_channel, PluginHost, PluginId, RunningStateReceiver};

pub(crate) enum FakeReply {
    Result(JsonValue),
    Error(RemoteError),
    Stream(Vec<JsonValue>),
    /// Close the connection without answering.
    Exit,
}

pub(crate) struct FakePlugin {
    pub manager: Arc<PluginManager>,
    pub plugin_id: PluginId,
    pub running_state: RunningStateReceiver,
}

/// Starts a fake plugin answering every request through `respond`.
///
/// `shutdown` is always acknowledged and ends the connection.
pub(crate) fn spawn_fake_plugin<F>(respond: F) -> FakePlugin
where
    F: Fn(&str, &JsonValue) -> FakeReply + Send + 'static,
{
    let manager = Arc::new(PluginManager::new());
    let (host_end, plugin_end) = UnixStream::pair().unwrap();
    let host_writer = host_end.try_clone().unwrap();
    let (tx, running_state) = running_state_channel();

    thread::spawn(move || {
        let mut writer = plugin_end.try_clone().unwrap();
        let reader = BufReader::new(plugin_end);
        for line in reader.lines() {
            let Ok(line) = line else { break };
            let message: JsonValue = serde_json::from_str(&line).unwrap();
            let Some(id) = message.get("id").cloned() else {
                continue;
            };
            let method = message["method"].as_str().unwrap_or_default().to_string();
            let mut out = Vec::new();
            if method == "shutdown" {
                out.push(json!({"id": id, "result": {}}));
                write_lines(&mut writer, &out);
                break;
            }
            match respond(&method, &message["params"]) {
                FakeReply::Result(result) => out.push(json!({"id": id, "result": result})),
                FakeReply::Error(err) => out.push(json!({"id": id, "error": err})),
                FakeReply::Stream(chunks) => {
                    for chunk in chunks {
                        out.push(json!({"id": id, "result": chunk, "stream": "data"}));
                    }
                    out.push(json!({"id": id, "stream": "end"}));
                }
                FakeReply::Exit => break,
            }
            write_lines(&mut writer, &out);
        }
    });

    let plugin_id = manager.allocate_plugin_id();
    let host = PluginHost {
        id: plugin_id,
        name: "fake_plugin".to_string(),
        state: manager.weak_state(),
        running_state: tx,
    };
    let (connected_tx, connected_rx) = std::sync::mpsc::channel();
    thread::spawn(move || {
        host.serve(host_writer, BufReader::new(host_end), None, move || {
            connected_tx.send(()).unwrap();
        });
    });
    connected_rx.recv().unwrap();

    FakePlugin {
        manager,
        plugin_id,
        running_state,
    }
}

fn write_lines(writer: &mut UnixStream, lines: &[JsonValue]) {
    for line in lines {
        let mut text = serde_json::to_string(line).unwrap();
        text.push('\n');
        if writer.write_all(text.as_bytes()).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::PluginError;
    use crate::plugin::RunningState;
    use crate::rpc::JsonResponseParser;

    fn echo(method: &str, params: &JsonValue) -> FakeReply {
        match method {
            "initialize" => FakeReply::Result(json!({})),
            "echo" => FakeReply::Result(params.clone()),
            "fail" => FakeReply::Error(RemoteError::custom(-1, "boom", None)),
            "exit" => FakeReply::Exit,
            _ => FakeReply::Error(RemoteError::MethodNotFound(method.to_string())),
        }
    }

    async fn wait_for_state(
        rx: &mut RunningStateReceiver,
        pred: impl FnMut(&RunningState) -> bool,
    ) -> RunningState {
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
            .await
            .unwrap()
            .unwrap()
            .clone()
    }

    #[tokio::test]
    async fn initialize_then_request() {
        let fake = spawn_fake_plugin(echo);
        assert_eq!(
            *fake.running_state.borrow(),
            RunningState::Connected {
                plugin_id: fake.plugin_id
            }
        );
        fake.manager
            .init_plugin(fake.plugin_id, json!({}))
            .await
            .unwrap();
        assert!(fake.running_state.borrow().is_ready());

        let value = fake
            .manager
            .async_send_request::<JsonResponseParser>(fake.plugin_id, "echo", json!({"a": 1}))
            .await
            .unwrap();
        assert_eq!(value, json!({"a": 1}));

        let value = fake
            .manager
            .send_request::<JsonResponseParser>(fake.plugin_id, "echo", json!([1, 2]))
            .await
            .unwrap();
        assert_eq!(value, json!([1, 2]));
    }

    #[tokio::test]
    async fn remote_error_is_surfaced() {
        let fake = spawn_fake_plugin(echo);
        let err = fake
            .manager
            .async_send_request::<JsonResponseParser>(fake.plugin_id, "fail", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PluginError::Remote(RemoteError::Custom { code: -1, .. })
        ));
    }

    #[tokio::test]
    async fn crash_fails_pending_and_reports_unexpected_stop() {
        let mut fake = spawn_fake_plugin(echo);
        let err = fake
            .manager
            .async_send_request::<JsonResponseParser>(fake.plugin_id, "exit", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::PeerDisconnect));

        let state = wait_for_state(&mut fake.running_state, |s| s.is_stopped()).await;
        assert_eq!(
            state,
            RunningState::UnexpectedStop {
                plugin_id: fake.plugin_id
            }
        );
        assert!(fake.manager.plugin_ids().is_empty());
    }

    #[tokio::test]
    async fn rejected_initialize_removes_plugin() {
        let mut fake = spawn_fake_plugin(|method, _| match method {
            "initialize" => FakeReply::Error(RemoteError::custom(-1, "bad model", None)),
            _ => FakeReply::Result(json!({})),
        });
        let err = fake
            .manager
            .init_plugin(fake.plugin_id, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PluginError::Remote(RemoteError::Custom { code: -1, .. })
        ));

        assert!(fake.manager.plugin_ids().is_empty());
        let state = wait_for_state(&mut fake.running_state, |s| s.is_stopped()).await;
        assert_eq!(
            state,
            RunningState::Stopped {
                plugin_id: fake.plugin_id
            }
        );
        assert!(!state.is_loading());
    }

    #[tokio::test]
    async fn remove_plugin_reports_stopped() {
        let mut fake = spawn_fake_plugin(echo);
        fake.manager.remove_plugin(fake.plugin_id).await.unwrap();
        let state = wait_for_state(&mut fake.running_state, |s| s.is_stopped()).await;
        assert_eq!(
            state,
            RunningState::Stopped {
                plugin_id: fake.plugin_id
            }
        );
        assert!(matches!(
            fake.manager.get_plugin(fake.plugin_id),
            Err(PluginError::PluginNotConnected)
        ));
    }
}
