//! A single live connection: its write half, identity and cancellation token.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use support_common::id::{prefix, prefixed_ulid};
use tokio::sync::Mutex;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::models::user::UserId;

/// Normal closure.
const CLOSE_NORMAL: u16 = 1000;

/// Write half of a transport session.
#[async_trait]
pub trait FrameSink: Send {
    async fn send_frame(&mut self, msg: Message) -> Result<(), axum::Error>;
    async fn finish(&mut self) -> Result<(), axum::Error>;
}

#[async_trait]
impl FrameSink for SplitSink<WebSocket, Message> {
    async fn send_frame(&mut self, msg: Message) -> Result<(), axum::Error> {
        SinkExt::send(self, msg).await
    }

    async fn finish(&mut self) -> Result<(), axum::Error> {
        SinkExt::close(self).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("connection closed")]
    Closed,
    #[error("write deadline exceeded")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(#[source] axum::Error),
}

pub struct Connection {
    id: String,
    recipient: UserId,
    sink: Mutex<Box<dyn FrameSink>>,
    cancel: CancellationToken,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("recipient", &self.recipient)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl Connection {
    pub fn new(recipient: UserId, sink: impl FrameSink + 'static) -> Arc<Self> {
        Arc::new(Self {
            id: prefixed_ulid(prefix::CONNECTION),
            recipient,
            sink: Mutex::new(Box::new(sink)),
            cancel: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn recipient(&self) -> UserId {
        self.recipient
    }

    /// Shared between the supervisor and anyone who decides to drop the connection.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Write one frame. Waiting for the write half counts against `deadline`.
    pub async fn send(&self, msg: Message, deadline: Duration) -> Result<(), SendError> {
        if self.cancel.is_cancelled() {
            return Err(SendError::Closed);
        }

        time::timeout(deadline, async {
            let mut sink = self.sink.lock().await;
            // Re-check under the lock: shutdown holds it while deregistering.
            if self.cancel.is_cancelled() {
                return Err(SendError::Closed);
            }
            sink.send_frame(msg).await.map_err(SendError::Transport)
        })
        .await
        .map_err(|_| SendError::Timeout)?
    }

    /// Cancel and deregister without waiting on the transport.
    ///
    /// `deregister` runs only if no write is in flight; otherwise this returns
    /// false and the supervisor deregisters once it observes the cancellation.
    /// The close frame is always left to the supervisor.
    pub fn detach(&self, deregister: impl FnOnce() -> bool) -> bool {
        self.cancel.cancel();
        match self.sink.try_lock() {
            Ok(_sink) => deregister(),
            Err(_) => false,
        }
    }

    /// Cancel, run `deregister` while holding the write half so that no frame
    /// can be written once it returns, then send the close frame. Returns what
    /// `deregister` returned. Called once per connection, by its supervisor.
    pub async fn shut_down(&self, deregister: impl FnOnce() -> bool, deadline: Duration) -> bool {
        self.cancel.cancel();

        let mut sink = self.sink.lock().await;
        let removed = deregister();

        let close = Message::Close(Some(CloseFrame {
            code: CLOSE_NORMAL,
            reason: String::new().into(),
        }));
        let _ = time::timeout(deadline, async {
            if sink.send_frame(close).await.is_ok() {
                let _ = sink.finish().await;
            }
        })
        .await;
        removed
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-process sinks standing in for real sockets.

    use super::*;
    use tokio::sync::mpsc;

    /// Forwards frames to a channel; fails once the receiver is dropped.
    pub struct ChannelSink(pub mpsc::UnboundedSender<Message>);

    #[async_trait]
    impl FrameSink for ChannelSink {
        async fn send_frame(&mut self, msg: Message) -> Result<(), axum::Error> {
            self.0
                .send(msg)
                .map_err(|_| axum::Error::new(std::io::Error::from(std::io::ErrorKind::BrokenPipe)))
        }

        async fn finish(&mut self) -> Result<(), axum::Error> {
            Ok(())
        }
    }

    /// Never completes a write, like a peer that stopped reading.
    pub struct StalledSink;

    #[async_trait]
    impl FrameSink for StalledSink {
        async fn send_frame(&mut self, _msg: Message) -> Result<(), axum::Error> {
            std::future::pending::<Result<(), axum::Error>>().await
        }

        async fn finish(&mut self) -> Result<(), axum::Error> {
            Ok(())
        }
    }

    pub fn channel_connection(recipient: UserId) -> (Arc<Connection>, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new(recipient, ChannelSink(tx)), rx)
    }
}
