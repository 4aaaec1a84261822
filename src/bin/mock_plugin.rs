//! A stand-in for the chat and embedding plugins. Speaks the same protocol with
//! canned answers so the host can be exercised without the real models.
//!
//! Pass `--crash-on <operation>` to make it exit when that operation arrives,
//! `--fail-on <operation>` to answer that operation with an error, or
//! `--fail-init` to make it refuse `initialize`.

use std::collections::{BTreeMap, HashSet};
use std::io::{self, BufRead, Write};

use log::{debug, info, warn};
use serde_json::{json, Map, Value as JsonValue};

use aiplug::rpc::message::{self, Call, RpcObject};
use aiplug::RemoteError;

const CRASH_EXIT_CODE: i32 = 3;

enum Reply {
    Result(Result<JsonValue, RemoteError>),
    Stream(Vec<String>),
}

#[derive(Default)]
struct MockPlugin {
    initialized: bool,
    chats: HashSet<String>,
    documents: Vec<(String, Map<String, JsonValue>)>,
    crash_on: Option<String>,
    fail_on: Option<String>,
    fail_init: bool,
}

fn str_param<'a>(params: &'a JsonValue, key: &str) -> Result<&'a str, RemoteError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RemoteError::InvalidRequest(Some(json!({ "missing": key }))))
}

fn embed(text: &str) -> Vec<f64> {
    let words = text.split_whitespace().count() as f64;
    let bytes = text.len() as f64;
    let vowels = text.chars().filter(|c| "aeiouAEIOU".contains(*c)).count() as f64;
    vec![words, bytes, vowels]
}

impl MockPlugin {
    fn check_crash(&self, operation: &str) {
        if self.crash_on.as_deref() == Some(operation) {
            warn!("[Mock Plugin] crashing on <{}>", operation);
            std::process::exit(CRASH_EXIT_CODE);
        }
    }

    fn handle(&mut self, method: &str, params: JsonValue) -> Reply {
        self.check_crash(method);
        match method {
            "initialize" => {
                if self.fail_init {
                    return Reply::Result(Err(RemoteError::custom(-1, "model failed to load", None)));
                }
                info!("[Mock Plugin] initialized with <{}>", params);
                self.initialized = true;
                Reply::Result(Ok(json!({})))
            }
            "handle" if !self.initialized => Reply::Result(Err(RemoteError::custom(
                -2,
                "plugin is not initialized",
                None,
            ))),
            "handle" => {
                let operation = params
                    .get("method")
                    .and_then(|m| m.as_str())
                    .unwrap_or_default()
                    .to_string();
                self.check_crash(&operation);
                if self.fail_on.as_deref() == Some(operation.as_str()) {
                    return Reply::Result(Err(RemoteError::custom(
                        -4,
                        format!("{} failed", operation),
                        None,
                    )));
                }
                self.operation(&operation, &params)
            }
            _ => Reply::Result(Err(RemoteError::MethodNotFound(method.to_string()))),
        }
    }

    fn operation(&mut self, operation: &str, params: &JsonValue) -> Reply {
        let inner = params.get("params").cloned().unwrap_or(JsonValue::Null);
        let result = match operation {
            "create_chat" => str_param(params, "chat_id").map(|chat_id| {
                self.chats.insert(chat_id.to_string());
                json!({})
            }),
            "close_chat" => str_param(params, "chat_id").map(|chat_id| {
                self.chats.remove(chat_id);
                json!({})
            }),
            "answer" => str_param(&inner, "content")
                .map(|content| json!({ "data": format!("echo: {}", content) })),
            "stream_answer" => {
                return match str_param(&inner, "content") {
                    Ok(content) => Reply::Stream(
                        content
                            .split_inclusive(' ')
                            .map(|word| word.to_string())
                            .collect(),
                    ),
                    Err(e) => Reply::Result(Err(e)),
                }
            }
            "complete_text" => {
                let text = str_param(&inner, "text").map(str::to_string);
                let kind = inner.get("type").and_then(|t| t.as_u64()).unwrap_or(1);
                return match text {
                    Ok(text) => Reply::Stream(vec![format!("[{}] ", kind), text]),
                    Err(e) => Reply::Result(Err(e)),
                };
            }
            "related_question" => str_param(params, "chat_id").map(|chat_id| {
                json!({ "data": [
                    { "content": format!("What else is in {}?", chat_id) },
                    { "content": "Can you say more?" },
                ]})
            }),
            "index_file" => str_param(&inner, "file_path").and_then(|path| {
                if std::path::Path::new(path).is_file() {
                    Ok(json!({}))
                } else {
                    Err(RemoteError::custom(-3, format!("cannot read {}", path), None))
                }
            }),
            "database_summary" => {
                let row: BTreeMap<String, String> =
                    serde_json::from_value(inner).unwrap_or_default();
                let summary = row
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .collect::<Vec<_>>()
                    .join(", ");
                Ok(json!({ "data": summary }))
            }
            "database_translate" => {
                let language = inner["language"].as_str().unwrap_or_default();
                let items: Vec<JsonValue> = inner["cells"]
                    .as_array()
                    .map(|cells| {
                        cells
                            .iter()
                            .map(|cell| {
                                let title = cell["title"].as_str().unwrap_or_default();
                                let content = cell["content"].as_str().unwrap_or_default();
                                json!({ title: format!("[{}] {}", language, content) })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(json!({ "data": { "items": items } }))
            }
            "embed_documents" => {
                str_param(&inner, "input").map(|input| json!({ "data": [embed(input)] }))
            }
            "index_document" => str_param(&inner, "input").map(|input| {
                let metadata = inner
                    .get("metadata")
                    .and_then(|m| m.as_object())
                    .cloned()
                    .unwrap_or_default();
                self.documents.push((input.to_string(), metadata));
                json!({})
            }),
            "similarity_search" => str_param(&inner, "query").map(|query| {
                let filter = inner
                    .get("filter")
                    .and_then(|f| f.as_object())
                    .cloned()
                    .unwrap_or_default();
                let query = query.to_lowercase();
                let found: Vec<&str> = self
                    .documents
                    .iter()
                    .filter(|(_, metadata)| filter.iter().all(|(k, v)| metadata.get(k) == Some(v)))
                    .filter(|(text, _)| {
                        query
                            .split_whitespace()
                            .any(|word| text.to_lowercase().contains(word))
                    })
                    .map(|(text, _)| text.as_str())
                    .collect();
                json!({ "data": found })
            }),
            other => Err(RemoteError::MethodNotFound(other.to_string())),
        };
        Reply::Result(result)
    }
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1).cloned())
}

fn write_line(out: &mut impl Write, value: &JsonValue) -> io::Result<()> {
    writeln!(out, "{}", value)?;
    out.flush()
}

fn main() -> io::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .target(env_logger::Target::Stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut plugin = MockPlugin {
        crash_on: flag_value(&args, "--crash-on"),
        fail_on: flag_value(&args, "--fail-on"),
        fail_init: args.iter().any(|arg| arg == "--fail-init"),
        ..Default::default()
    };
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let call = match RpcObject::parse(&line).and_then(|o| o.into_call()) {
            Ok(call) => call,
            Err(e) => {
                warn!("[Mock Plugin] ignoring <{}>: {}", line, e);
                continue;
            }
        };
        match call {
            Call::Notification { method, .. } => debug!("[Mock Plugin] notification <{}>", method),
            Call::Request { id, method, .. } if method == "shutdown" => {
                info!("[Mock Plugin] shutting down");
                write_line(&mut stdout, &message::response(id, Ok(json!({}))))?;
                return Ok(());
            }
            Call::Request { id, method, params } => match plugin.handle(&method, params) {
                Reply::Result(result) => write_line(&mut stdout, &message::response(id, result))?,
                Reply::Stream(chunks) => {
                    for chunk in chunks {
                        write_line(&mut stdout, &message::stream_data(id, &json!(chunk)))?;
                    }
                    write_line(&mut stdout, &message::stream_end(id))?;
                }
            },
        }
    }
    Ok(())
}
