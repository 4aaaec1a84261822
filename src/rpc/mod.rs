//! Line-delimited JSON-RPC between the host and a plugin process.
//!
//! Every message is one JSON object followed by `\n`. Requests carry an `id`,
//! notifications do not. A streamed answer is a run of `"stream": "data"`
//! responses for the same `id` closed by one `"stream": "end"` response.

pub mod looper;
pub mod message;
pub mod parser;
pub mod peer;

pub use looper::{Handler, RpcCtx, RpcLoop};
pub use message::{Call, Response, RpcObject};
pub use parser::{DefaultResponseParser, JsonResponseParser, ResponseParser};
pub use peer::{CloneableCallback, OneShotCallback, Peer, RawPeer, RpcPeer, RpcResult};
