//! Request messages
//!
//! [`Message`] is the generic wire shape; [`Request`] is the closed set of
//! commands a node accepts. Converting a message into a request is where
//! unknown commands and malformed arguments are rejected.

use fleet_core::{Error, NodeIndex, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Separator between the command name and its arguments in `cmd`
pub const ARG_SEPARATOR: char = '|';

const DESTINATION_FIELD: &str = "destination_file";
const CONTENTS_FIELD: &str = "contents";
const REPLICATE_FLAG: &str = "True";

/// A command message: name, ordered string args and command-specific fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireMessage", into = "WireMessage")]
pub struct Message {
    /// Command name
    pub command: String,

    /// Ordered arguments carried in the `cmd` string
    pub args: Vec<String>,

    /// Sibling fields of `cmd`, such as an inline file payload
    pub fields: Map<String, Value>,
}

/// JSON object as it travels on the wire
#[derive(Serialize, Deserialize)]
struct WireMessage {
    cmd: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl TryFrom<WireMessage> for Message {
    type Error = String;

    fn try_from(wire: WireMessage) -> std::result::Result<Self, Self::Error> {
        let mut parts = wire.cmd.split(ARG_SEPARATOR).map(str::to_string);
        let command = parts
            .next()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| "empty command".to_string())?;
        Ok(Message {
            command,
            args: parts.collect(),
            fields: wire.fields,
        })
    }
}

impl From<Message> for WireMessage {
    fn from(message: Message) -> Self {
        let mut cmd = message.command;
        for arg in &message.args {
            cmd.push(ARG_SEPARATOR);
            cmd.push_str(arg);
        }
        let mut fields = message.fields;
        fields.remove("cmd");
        WireMessage { cmd, fields }
    }
}

impl Message {
    /// Build a message, rejecting names or args that would not survive the `cmd` encoding
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Result<Self> {
        let command = command.into();
        if command.is_empty() || command.contains(ARG_SEPARATOR) {
            return Err(Error::Protocol {
                message: format!("invalid command name: {:?}", command),
            });
        }
        if let Some(arg) = args.iter().find(|a| a.contains(ARG_SEPARATOR)) {
            return Err(Error::Protocol {
                message: format!("argument contains '{}': {:?}", ARG_SEPARATOR, arg),
            });
        }
        Ok(Self {
            command,
            args,
            fields: Map::new(),
        })
    }

    /// Attach a sibling field
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    fn arg(&self, position: usize, name: &str) -> Result<&str> {
        self.args
            .get(position)
            .map(String::as_str)
            .ok_or_else(|| Error::Protocol {
                message: format!("{} is missing argument '{}'", self.command, name),
            })
    }

    fn node_arg(&self, position: usize) -> Result<NodeIndex> {
        let raw = self.arg(position, "node")?;
        raw.trim().parse().map_err(|_| Error::Protocol {
            message: format!("{}: node index is not a number: {:?}", self.command, raw),
        })
    }

    fn string_field(&self, key: &str) -> Result<String> {
        match self.fields.get(key) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(Error::Protocol {
                message: format!("{}: field '{}' must be a string", self.command, key),
            }),
            None => Err(Error::Protocol {
                message: format!("{} is missing field '{}'", self.command, key),
            }),
        }
    }
}

/// How a node answers a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// A single unframed byte
    Control,

    /// A length-prefixed JSON frame
    Framed,
}

impl ReplyKind {
    /// Reply shape for a command name, known even when its arguments are bad
    pub fn for_command(command: &str) -> Self {
        match command {
            "return_results" | "search_status" => ReplyKind::Framed,
            _ => ReplyKind::Control,
        }
    }
}

/// The closed set of node commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Liveness check
    Ping,

    /// End of conversation
    Bye,

    /// Load a manifest into live node state, optionally replicating it to shared storage
    LoadConfig { path: String, replicate: bool },

    /// Empty the shared work directories
    Clean,

    /// Write an inline payload to a path on the node
    ReceiveFile {
        destination: String,
        contents: String,
    },

    /// Partition a FASTA file into one shard per manifest node
    SplitFasta { path: String },

    /// Launch the search for one shard in the background
    StartInstanceBlast { node: NodeIndex },

    /// Ask whether every node's sentinel exists
    IsInstanceReady,

    /// Collect the aggregated results
    ReturnResults,

    /// Report the local completion state of one search
    SearchStatus { node: NodeIndex },
}

impl Request {
    /// Command name on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Request::Ping => "ping",
            Request::Bye => "bye",
            Request::LoadConfig { .. } => "load_config",
            Request::Clean => "clean",
            Request::ReceiveFile { .. } => "receive_file",
            Request::SplitFasta { .. } => "split_fasta",
            Request::StartInstanceBlast { .. } => "start_instance_blast",
            Request::IsInstanceReady => "is_instance_ready",
            Request::ReturnResults => "return_results",
            Request::SearchStatus { .. } => "search_status",
        }
    }

    /// Shape of the reply this request receives
    pub fn reply_kind(&self) -> ReplyKind {
        ReplyKind::for_command(self.name())
    }

    /// Encode into a wire message
    pub fn to_message(&self) -> Result<Message> {
        let message = match self {
            Request::LoadConfig { path, replicate } => {
                let mut args = vec![path.clone()];
                if *replicate {
                    args.push(REPLICATE_FLAG.to_string());
                }
                Message::new(self.name(), args)?
            }
            Request::ReceiveFile {
                destination,
                contents,
            } => Message::new(self.name(), Vec::new())?
                .with_field(DESTINATION_FIELD, destination.as_str())
                .with_field(CONTENTS_FIELD, contents.as_str()),
            Request::SplitFasta { path } => Message::new(self.name(), vec![path.clone()])?,
            Request::StartInstanceBlast { node } | Request::SearchStatus { node } => {
                Message::new(self.name(), vec![node.to_string()])?
            }
            _ => Message::new(self.name(), Vec::new())?,
        };
        Ok(message)
    }

    /// Decode a wire message; the match below is the command allow-list
    pub fn from_message(message: &Message) -> Result<Self> {
        let request = match message.command.as_str() {
            "ping" => Request::Ping,
            "bye" => Request::Bye,
            "load_config" => Request::LoadConfig {
                path: message.arg(0, "path")?.to_string(),
                replicate: message
                    .args
                    .get(1)
                    .map(|flag| matches!(flag.as_str(), "True" | "true" | "1"))
                    .unwrap_or(false),
            },
            "clean" => Request::Clean,
            "receive_file" => Request::ReceiveFile {
                destination: message.string_field(DESTINATION_FIELD)?,
                contents: message.string_field(CONTENTS_FIELD)?,
            },
            "split_fasta" => Request::SplitFasta {
                path: message.arg(0, "path")?.to_string(),
            },
            "start_instance_blast" => Request::StartInstanceBlast {
                node: message.node_arg(0)?,
            },
            "is_instance_ready" => Request::IsInstanceReady,
            "return_results" => Request::ReturnResults,
            "search_status" => Request::SearchStatus {
                node: message.node_arg(0)?,
            },
            other => {
                return Err(Error::UnknownCommand {
                    command: other.to_string(),
                })
            }
        };
        Ok(request)
    }
}
