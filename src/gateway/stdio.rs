//! Line-delimited JSON gateway over stdin/stdout.
//!
//! Each stdin line is one inbound [`ChatMessage`] as JSON. Every outbound
//! operation is written to stdout as one JSON event line, for a bridge
//! process to forward to the real network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::stream;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, warn};

use super::{ChatMessage, MessageContent, MessageRecord, MessageStream, MessagingGateway, SendOptions};
use crate::error::GatewayError;

/// Event written to the output for each outbound operation.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum OutboundEvent<'a> {
    Send {
        id: &'a str,
        to: &'a str,
        content: &'a MessageContent,
        #[serde(skip_serializing_if = "Option::is_none")]
        quoted_message_id: Option<&'a str>,
    },
    DeleteMessages {
        chat: &'a str,
        ids: Vec<&'a str>,
    },
    DeleteChat {
        chat: &'a str,
    },
}

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Gateway speaking JSON lines.
pub struct StdioGateway {
    bot_id: String,
    out: tokio::sync::Mutex<Writer>,
    /// Messages seen per chat, inbound and outbound, minus deletions.
    counts: Arc<Mutex<HashMap<String, usize>>>,
}

impl StdioGateway {
    /// Gateway writing events to stdout.
    pub fn new(bot_id: impl Into<String>) -> Self {
        Self::with_writer(bot_id, Box::new(tokio::io::stdout()))
    }

    /// Gateway writing events to `writer`.
    pub fn with_writer(bot_id: impl Into<String>, writer: Writer) -> Self {
        Self {
            bot_id: bot_id.into(),
            out: tokio::sync::Mutex::new(writer),
            counts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start reading inbound messages from stdin.
    pub fn start(&self) -> MessageStream {
        self.read_from(tokio::io::stdin())
    }

    /// Start reading inbound messages from `reader`.
    ///
    /// Malformed lines are logged and skipped. The stream ends at EOF.
    pub fn read_from<R>(&self, reader: R) -> MessageStream
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let counts = Arc::clone(&self.counts);

        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        let msg = match serde_json::from_str::<ChatMessage>(line) {
                            Ok(msg) => msg,
                            Err(e) => {
                                warn!(error = %e, "Skipping malformed inbound line");
                                continue;
                            }
                        };
                        bump(&counts, msg.chat_id(), 1);
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        error!("Error reading inbound messages: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Box::pin(stream)
    }

    async fn emit(&self, event: &OutboundEvent<'_>) -> Result<(), GatewayError> {
        let mut line = serde_json::to_vec(event)
            .map_err(|e| GatewayError::InvalidMessage(e.to_string()))?;
        line.push(b'\n');
        let mut out = self.out.lock().await;
        out.write_all(&line)
            .await
            .map_err(|e| GatewayError::Disconnected(e.to_string()))?;
        out.flush()
            .await
            .map_err(|e| GatewayError::Disconnected(e.to_string()))?;
        Ok(())
    }
}

fn bump(counts: &Mutex<HashMap<String, usize>>, chat: &str, delta: isize) {
    let mut counts = counts.lock().unwrap_or_else(PoisonError::into_inner);
    let count = counts.entry(chat.to_string()).or_insert(0);
    *count = count.saturating_add_signed(delta);
}

fn message_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(20)
        .map(char::from)
        .collect()
}

#[async_trait]
impl MessagingGateway for StdioGateway {
    async fn send_message(
        &self,
        destination: &str,
        content: MessageContent,
        options: SendOptions,
    ) -> Result<ChatMessage, GatewayError> {
        let id = message_id();
        self.emit(&OutboundEvent::Send {
            id: &id,
            to: destination,
            content: &content,
            quoted_message_id: options.quoted_message_id.as_deref(),
        })
        .await
        .map_err(|e| GatewayError::SendFailed {
            destination: destination.to_string(),
            reason: e.to_string(),
        })?;

        bump(&self.counts, destination, 1);
        debug!(to = %destination, id = %id, "Message sent");

        Ok(ChatMessage {
            id,
            kind: match content {
                MessageContent::Text { .. } => super::MessageKind::Chat,
                MessageContent::List(_) => super::MessageKind::Other,
            },
            from: self.bot_id.clone(),
            to: destination.to_string(),
            author: None,
            from_me: true,
            body: content.summary().to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        })
    }

    async fn delete_messages(
        &self,
        chat_id: &str,
        records: &[MessageRecord],
    ) -> Result<(), GatewayError> {
        if records.is_empty() {
            return Ok(());
        }
        self.emit(&OutboundEvent::DeleteMessages {
            chat: chat_id,
            ids: records.iter().map(|r| r.id.as_str()).collect(),
        })
        .await
        .map_err(|e| GatewayError::DeleteFailed {
            chat: chat_id.to_string(),
            reason: e.to_string(),
        })?;
        let delta = isize::try_from(records.len()).unwrap_or(isize::MAX);
        bump(&self.counts, chat_id, -delta);
        Ok(())
    }

    async fn chat_message_count(&self, chat_id: &str) -> Result<usize, GatewayError> {
        let counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        counts
            .get(chat_id)
            .copied()
            .ok_or_else(|| GatewayError::ChatNotFound(chat_id.to_string()))
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<(), GatewayError> {
        self.emit(&OutboundEvent::DeleteChat { chat: chat_id }).await?;
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(chat_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn reads_json_lines_and_skips_garbage() {
        let gateway = StdioGateway::with_writer("bot@c.us", Box::new(tokio::io::sink()));
        let input = concat!(
            r#"{"id":"1","from":"a@c.us","body":"hello"}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"id":"2","from":"a@c.us","kind":"list_response","body":"Other"}"#,
            "\n",
        );
        let mut stream = gateway.read_from(std::io::Cursor::new(input.as_bytes().to_vec()));

        let first = stream.next().await.unwrap();
        assert_eq!(first.body, "hello");
        let second = stream.next().await.unwrap();
        assert_eq!(second.kind, crate::gateway::MessageKind::ListResponse);
        assert!(stream.next().await.is_none());

        assert_eq!(gateway.chat_message_count("a@c.us").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn send_and_delete_emit_events() {
        let (writer, mut reader) = tokio::io::duplex(4096);
        let gateway = StdioGateway::with_writer("bot@c.us", Box::new(writer));

        let sent = gateway.send_text("a@c.us", "hey").await.unwrap();
        assert!(sent.from_me);
        assert_eq!(sent.chat_id(), "a@c.us");
        assert_eq!(gateway.chat_message_count("a@c.us").await.unwrap(), 1);

        gateway
            .delete_messages("a@c.us", &[MessageRecord::from(&sent)])
            .await
            .unwrap();
        assert_eq!(gateway.chat_message_count("a@c.us").await.unwrap(), 0);

        gateway.delete_chat("a@c.us").await.unwrap();
        assert!(gateway.chat_message_count("a@c.us").await.is_err());
        drop(gateway);

        let mut output = String::new();
        reader.read_to_string(&mut output).await.unwrap();
        let events: Vec<serde_json::Value> = output
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0]["event"], "send");
        assert_eq!(events[0]["content"]["text"], "hey");
        assert_eq!(events[1]["event"], "delete_messages");
        assert_eq!(events[1]["ids"][0], sent.id.as_str());
        assert_eq!(events[2]["event"], "delete_chat");
    }
}
