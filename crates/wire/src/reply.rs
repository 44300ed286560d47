//! Node replies
//!
//! Control replies are a single unframed byte. Framed replies are JSON frames
//! tagged by `cmd`. An error answering a control-kind request is the byte `E`
//! followed by an error frame, so a client waiting for one byte can tell it
//! apart from `1`/`0`.

use crate::codec;
use crate::message::ReplyKind;
use fleet_core::{Error, ResultBundle, Result, SearchReport};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

const ACK_BYTE: u8 = b'1';
const NOT_READY_BYTE: u8 = b'0';
const ERROR_BYTE: u8 = b'E';

/// Single-byte reply to a control command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlReply {
    /// `1`: done, alive, or ready
    Ack,

    /// `0`: not (yet) ready
    NotReady,
}

/// JSON reply frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum ReplyFrame {
    /// Aggregated results
    #[serde(rename = "receive_results")]
    Results {
        #[serde(rename = "resultsFa")]
        results_fa: String,
        results: String,
    },

    /// Local search state
    #[serde(rename = "search_status")]
    SearchStatus { report: SearchReport },

    /// Command failed on the node
    #[serde(rename = "error")]
    Error { message: String },
}

/// A reply produced by a node's command handler
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ack,
    NotReady,
    Results(ResultBundle),
    SearchStatus(SearchReport),
    Error(String),
}

impl Reply {
    /// Build an error reply from a failure
    pub fn from_error(error: &Error) -> Self {
        Reply::Error(error.to_string())
    }

    /// Write this reply in the shape the request expects
    pub async fn write_to<W>(&self, writer: &mut W, kind: ReplyKind) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        match self {
            Reply::Ack => codec::write_control(writer, ACK_BYTE).await,
            Reply::NotReady => codec::write_control(writer, NOT_READY_BYTE).await,
            Reply::Results(bundle) => {
                let frame = ReplyFrame::Results {
                    results_fa: bundle.results_fa.clone(),
                    results: bundle.results.clone(),
                };
                codec::write_frame(writer, &frame).await
            }
            Reply::SearchStatus(report) => {
                let frame = ReplyFrame::SearchStatus {
                    report: report.clone(),
                };
                codec::write_frame(writer, &frame).await
            }
            Reply::Error(message) => {
                if kind == ReplyKind::Control {
                    codec::write_control(writer, ERROR_BYTE).await?;
                }
                let frame = ReplyFrame::Error {
                    message: message.clone(),
                };
                codec::write_frame(writer, &frame).await
            }
        }
    }
}

/// Read the reply to a control-kind request
pub async fn read_control_reply<R>(reader: &mut R, max_len: usize) -> Result<ControlReply>
where
    R: AsyncRead + Unpin,
{
    match codec::read_control(reader).await? {
        ACK_BYTE => Ok(ControlReply::Ack),
        NOT_READY_BYTE => Ok(ControlReply::NotReady),
        ERROR_BYTE => match codec::read_frame::<_, ReplyFrame>(reader, max_len).await? {
            ReplyFrame::Error { message } => Err(Error::Remote { message }),
            other => Err(Error::Protocol {
                message: format!("expected error frame after error marker, got {:?}", other),
            }),
        },
        other => Err(Error::Protocol {
            message: format!("unexpected control reply byte: 0x{:02x}", other),
        }),
    }
}

/// Read the reply to a framed request; error frames become `Error::Remote`
pub async fn read_framed_reply<R>(reader: &mut R, max_len: usize) -> Result<ReplyFrame>
where
    R: AsyncRead + Unpin,
{
    match codec::read_frame::<_, ReplyFrame>(reader, max_len).await? {
        ReplyFrame::Error { message } => Err(Error::Remote { message }),
        frame => Ok(frame),
    }
}
