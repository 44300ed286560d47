//! Client side of the node protocol
//!
//! One connection carries one outstanding command at a time. Connecting is
//! bounded by the connect timeout and every later exchange by the I/O
//! timeout.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use fleet_core::{ClientConfig, Error, NodeIndex, Result, ResultBundle, SearchReport};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;
use wire::{codec, read_control_reply, read_framed_reply, ControlReply, ReplyFrame, ReplyKind, Request};

/// Connection to one worker node
#[derive(Debug)]
pub struct NodeClient {
    address: String,
    stream: TcpStream,
    config: ClientConfig,
}

impl NodeClient {
    /// Connect to a node at `host:port`
    pub async fn connect(address: &str, config: &ClientConfig) -> Result<Self> {
        let stream = match tokio::time::timeout(config.connect_timeout, TcpStream::connect(address)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(Error::NodeUnavailable {
                    address: address.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(Error::Timeout {
                    operation: format!("connect to {}", address),
                    timeout_ms: millis(config.connect_timeout),
                })
            }
        };

        debug!(address, "Connected to node");
        Ok(Self {
            address: address.to_string(),
            stream,
            config: *config,
        })
    }

    /// Address this client is connected to
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send a control-kind command and read its single-byte reply
    pub async fn send_command(&mut self, request: &Request) -> Result<ControlReply> {
        if request.reply_kind() != ReplyKind::Control {
            return Err(Error::Protocol {
                message: format!("{} expects a framed reply", request.name()),
            });
        }

        let message = request.to_message()?;
        let max_len = self.config.max_message_size;
        let stream = &mut self.stream;
        let reply = bounded(self.config.io_timeout, request.name(), async move {
            codec::write_frame(stream, &message).await?;
            read_control_reply(stream, max_len).await
        })
        .await?;

        debug!(address = %self.address, command = request.name(), ?reply, "Command answered");
        Ok(reply)
    }

    /// Send a command that must be acknowledged with `1`
    pub async fn expect_ack(&mut self, request: &Request) -> Result<()> {
        match self.send_command(request).await? {
            ControlReply::Ack => Ok(()),
            ControlReply::NotReady => Err(Error::Protocol {
                message: format!("{} was answered with 0 by {}", request.name(), self.address),
            }),
        }
    }

    /// Push a local file to `remote` on the node
    pub async fn send_file(&mut self, local: &Path, remote: &str) -> Result<()> {
        let contents = tokio::fs::read(local).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::StoragePathNotFound {
                path: local.display().to_string(),
            },
            _ => Error::Io(e),
        })?;
        let contents = String::from_utf8(contents).map_err(|_| Error::Protocol {
            message: format!("{} is not UTF-8 text", local.display()),
        })?;

        debug!(local = %local.display(), remote, bytes = contents.len(), "Sending file");
        self.expect_ack(&Request::ReceiveFile {
            destination: remote.to_string(),
            contents,
        })
        .await
    }

    /// Fetch the aggregated results
    pub async fn receive_results(&mut self) -> Result<ResultBundle> {
        match self.send_framed(&Request::ReturnResults).await? {
            ReplyFrame::Results {
                results_fa,
                results,
            } => Ok(ResultBundle {
                results,
                results_fa,
            }),
            other => Err(unexpected_frame("return_results", &other)),
        }
    }

    /// Ask the node for the local state of one search
    pub async fn search_status(&mut self, node: NodeIndex) -> Result<SearchReport> {
        match self.send_framed(&Request::SearchStatus { node }).await? {
            ReplyFrame::SearchStatus { report } => Ok(report),
            other => Err(unexpected_frame("search_status", &other)),
        }
    }

    /// End the conversation
    pub async fn bye(&mut self) -> Result<()> {
        self.expect_ack(&Request::Bye).await
    }

    /// Close the connection
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!(address = %self.address, error = %e, "Shutdown after close failed");
        }
    }

    async fn send_framed(&mut self, request: &Request) -> Result<ReplyFrame> {
        let message = request.to_message()?;
        let max_len = self.config.max_message_size;
        let stream = &mut self.stream;
        bounded(self.config.io_timeout, request.name(), async move {
            codec::write_frame(stream, &message).await?;
            read_framed_reply(stream, max_len).await
        })
        .await
    }
}

async fn bounded<T, F>(limit: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or_else(|_| {
            Err(Error::Timeout {
                operation: operation.to_string(),
                timeout_ms: millis(limit),
            })
        })
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn unexpected_frame(command: &str, frame: &ReplyFrame) -> Error {
    Error::Protocol {
        message: format!("unexpected reply to {}: {:?}", command, frame),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::SearchState;
    use tokio::net::TcpListener;
    use wire::{Message, Reply};

    const LIMIT: usize = 1024 * 1024;

    fn quick() -> ClientConfig {
        ClientConfig {
            connect_timeout: Duration::from_secs(1),
            io_timeout: Duration::from_millis(300),
            max_message_size: LIMIT,
        }
    }

    /// Serve one connection, answering each command with the next scripted reply
    async fn scripted_node(replies: Vec<Reply>) -> (String, tokio::task::JoinHandle<Vec<Message>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let task = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            for reply in replies {
                let message: Message = codec::read_frame(&mut stream, LIMIT).await.unwrap();
                let kind = ReplyKind::for_command(&message.command);
                received.push(message);
                reply.write_to(&mut stream, kind).await.unwrap();
            }
            received
        });

        (address, task)
    }

    #[tokio::test]
    async fn test_connect_refused_is_node_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = NodeClient::connect(&address, &quick()).await.unwrap_err();
        assert!(matches!(err, Error::NodeUnavailable { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_control_commands() {
        let (address, node) = scripted_node(vec![Reply::Ack, Reply::NotReady, Reply::Ack]).await;
        let mut client = NodeClient::connect(&address, &quick()).await.unwrap();
        assert_eq!(client.address(), address);

        client.expect_ack(&Request::Ping).await.unwrap();
        assert_eq!(
            client.send_command(&Request::IsInstanceReady).await.unwrap(),
            ControlReply::NotReady
        );
        client.bye().await.unwrap();
        client.close().await;

        let received = node.await.unwrap();
        let names: Vec<&str> = received.iter().map(|m| m.command.as_str()).collect();
        assert_eq!(names, vec!["ping", "is_instance_ready", "bye"]);
    }

    #[tokio::test]
    async fn test_error_reply_surfaces_as_remote() {
        let (address, _node) = scripted_node(vec![Reply::Error("disk full".to_string())]).await;
        let mut client = NodeClient::connect(&address, &quick()).await.unwrap();

        let err = client.expect_ack(&Request::Clean).await.unwrap_err();
        assert!(matches!(err, Error::Remote { message } if message == "disk full"));
    }

    #[tokio::test]
    async fn test_send_file_carries_contents() {
        let temp = tempfile::TempDir::new().unwrap();
        let local = temp.path().join("input.fasta");
        std::fs::write(&local, ">é\nACGT\n").unwrap();

        let (address, node) = scripted_node(vec![Reply::Ack]).await;
        let mut client = NodeClient::connect(&address, &quick()).await.unwrap();
        client.send_file(&local, "/remote/in.fasta").await.unwrap();

        let received = node.await.unwrap();
        assert_eq!(
            Request::from_message(&received[0]).unwrap(),
            Request::ReceiveFile {
                destination: "/remote/in.fasta".to_string(),
                contents: ">é\nACGT\n".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_send_missing_file() {
        let (address, _node) = scripted_node(Vec::new()).await;
        let mut client = NodeClient::connect(&address, &quick()).await.unwrap();

        let err = client
            .send_file(Path::new("/definitely/not/here.fasta"), "/remote/x")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoragePathNotFound { .. }));
    }

    #[tokio::test]
    async fn test_framed_replies() {
        let bundle = ResultBundle {
            results: "hits\n".to_string(),
            results_fa: ">a\nA\n".to_string(),
        };
        let report = SearchReport {
            node: 1,
            state: SearchState::Running,
        };
        let (address, _node) = scripted_node(vec![
            Reply::Results(bundle.clone()),
            Reply::SearchStatus(report.clone()),
        ])
        .await;
        let mut client = NodeClient::connect(&address, &quick()).await.unwrap();

        assert_eq!(client.receive_results().await.unwrap(), bundle);
        assert_eq!(client.search_status(1).await.unwrap(), report);
    }

    #[tokio::test]
    async fn test_framed_request_rejected_by_send_command() {
        let (address, _node) = scripted_node(Vec::new()).await;
        let mut client = NodeClient::connect(&address, &quick()).await.unwrap();

        assert!(matches!(
            client.send_command(&Request::ReturnResults).await,
            Err(Error::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn test_silent_node_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let _hold = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let mut client = NodeClient::connect(&address, &quick()).await.unwrap();
        let err = client.send_command(&Request::Ping).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }
}
