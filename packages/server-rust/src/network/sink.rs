//! Response sink backed by an in-memory buffer.
//!
//! [`BufferedSink`] collects the status line and body writes for one
//! response and delivers the finished reply through a oneshot channel when
//! the sink is ended. The HTTP transport holds the receiver end while the
//! dispatch loop drives the sink through
//! [`RequestEvent`](crate::event::RequestEvent).

use anyhow::bail;
use bytes::{Bytes, BytesMut};
use tokio::sync::oneshot;

use crate::event::ResponseSink;

/// A completed response as produced by [`BufferedSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkReply {
    /// Status code written to the sink, or `200` if none was.
    pub status: u16,
    /// Everything written to the body, in order.
    pub body: Bytes,
}

/// [`ResponseSink`] that buffers writes and hands the finished response to
/// a oneshot receiver.
///
/// The reply fires exactly once, on the first [`end`](ResponseSink::end).
/// A dropped receiver is tolerated; the response is discarded.
#[derive(Debug)]
pub struct BufferedSink {
    status: Option<u16>,
    body: BytesMut,
    ended: bool,
    reply: Option<oneshot::Sender<SinkReply>>,
}

impl BufferedSink {
    /// Creates a sink and the receiver its finished response arrives on.
    #[must_use]
    pub fn channel() -> (Self, oneshot::Receiver<SinkReply>) {
        let (tx, rx) = oneshot::channel();
        let sink = Self {
            status: None,
            body: BytesMut::new(),
            ended: false,
            reply: Some(tx),
        };
        (sink, rx)
    }
}

impl ResponseSink for BufferedSink {
    fn write_head(&mut self, status: u16) -> anyhow::Result<()> {
        if self.ended {
            bail!("response already completed");
        }
        if self.status.is_some() {
            bail!("status line already written");
        }
        self.status = Some(status);
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> anyhow::Result<()> {
        if self.ended {
            bail!("response already completed");
        }
        self.body.extend_from_slice(chunk);
        Ok(())
    }

    fn end(&mut self) -> anyhow::Result<()> {
        if self.ended {
            return Ok(());
        }
        self.ended = true;
        let status = *self.status.get_or_insert(200);
        if let Some(tx) = self.reply.take() {
            // The transport may have given up on the request already.
            let _ = tx.send(SinkReply {
                status,
                body: self.body.split().freeze(),
            });
        }
        Ok(())
    }

    fn headers_sent(&self) -> bool {
        self.status.is_some()
    }
}
