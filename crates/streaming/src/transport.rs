use crate::error::ChannelError;
use crate::protocol::Frame;

/// Outbound half of a push-channel connection.
///
/// The gateway never performs I/O itself: it hands finished frames to a
/// transport and is fed inbound frames by whoever owns the socket.
pub trait Transport {
    fn send(&mut self, frame: Frame) -> Result<(), ChannelError>;
}

/// In-memory transport that records every frame it is given.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Vec<Frame>,
    closed: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> &[Frame] {
        &self.sent
    }

    pub fn take(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.sent)
    }

    /// Frames with the given event name, in send order.
    pub fn sent_with_event<'a>(&'a self, event: &'a str) -> impl Iterator<Item = &'a Frame> + 'a {
        self.sent.iter().filter(move |f| f.event == event)
    }

    pub fn last(&self) -> Option<&Frame> {
        self.sent.last()
    }

    /// Makes subsequent sends fail with `ChannelError::Closed`.
    pub fn close(&mut self) {
        self.closed = true;
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, frame: Frame) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        self.sent.push(frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryTransport, Transport};
    use crate::error::ChannelError;
    use crate::protocol::{Frame, Topic};
    use serde_json::json;

    #[test]
    fn records_until_closed() {
        let mut t = MemoryTransport::new();
        t.send(Frame::new(Topic::new("a"), "x", json!({}))).unwrap();
        assert_eq!(t.sent().len(), 1);

        t.close();
        let err = t
            .send(Frame::new(Topic::new("a"), "y", json!({})))
            .unwrap_err();
        assert!(matches!(err, ChannelError::Closed));
        assert_eq!(t.take().len(), 1);
        assert!(t.sent().is_empty());
    }
}
