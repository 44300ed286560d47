//! Wire protocol between the director and worker nodes
//!
//! Every request is one frame: a 4-byte big-endian length followed by that
//! many bytes of UTF-8 JSON shaped like `{"cmd": "name|arg1|arg2", ...}`.
//! Replies come in two shapes:
//! - **Control replies**: a single unframed byte, `1` or `0`
//! - **Framed replies**: a JSON frame, e.g. `{"cmd": "receive_results", ...}`
//!
//! Failures are reported explicitly: control-kind requests get the byte `E`
//! followed by an `{"cmd": "error"}` frame, framed requests get the error
//! frame alone.
//!
//! # Example
//!
//! ```no_run
//! use wire::{codec, Message, Request};
//!
//! # async fn example(stream: &mut tokio::net::TcpStream) -> fleet_core::Result<()> {
//! let request = Request::SplitFasta { path: "/staging/input.fasta".to_string() };
//! codec::write_frame(stream, &request.to_message()?).await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
mod message;
mod reply;

pub use message::{Message, ReplyKind, Request, ARG_SEPARATOR};
pub use reply::{read_control_reply, read_framed_reply, ControlReply, Reply, ReplyFrame};
