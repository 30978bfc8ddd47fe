use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::error::ChannelError;
use crate::protocol::{PushReply, Topic};

/// Acknowledgment of a published event.
///
/// Resolves with the server's `PushReply`, or with
/// `ChannelError::PublishAbandoned` when the topic is left, closed or the
/// connection drops before the reply arrives. Can be awaited or polled
/// without an executor via [`PendingAck::try_result`].
#[derive(Debug)]
pub struct PendingAck {
    topic: Topic,
    msg_ref: String,
    rx: oneshot::Receiver<PushReply>,
}

impl PendingAck {
    pub(crate) fn channel(topic: Topic, msg_ref: String) -> (Self, oneshot::Sender<PushReply>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                topic,
                msg_ref,
                rx,
            },
            tx,
        )
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn msg_ref(&self) -> &str {
        &self.msg_ref
    }

    /// `None` while the reply is still outstanding.
    pub fn try_result(&mut self) -> Option<Result<PushReply, ChannelError>> {
        match self.rx.try_recv() {
            Ok(reply) => Some(Ok(reply)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(ChannelError::PublishAbandoned)),
        }
    }
}

impl Future for PendingAck {
    type Output = Result<PushReply, ChannelError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| ChannelError::PublishAbandoned))
    }
}

#[cfg(test)]
mod tests {
    use super::PendingAck;
    use crate::error::ChannelError;
    use crate::protocol::{PushReply, ReplyStatus, Topic};
    use serde_json::json;

    #[test]
    fn pending_until_replied() {
        let (mut ack, tx) = PendingAck::channel(Topic::new("t"), "5".into());
        assert!(ack.try_result().is_none());

        tx.send(PushReply {
            status: ReplyStatus::Ok,
            response: json!({"ok": true}),
        })
        .unwrap();
        let reply = ack.try_result().expect("resolved").expect("ok");
        assert!(reply.is_ok());
        assert_eq!(ack.msg_ref(), "5");
    }

    #[test]
    fn dropped_sender_abandons() {
        let (mut ack, tx) = PendingAck::channel(Topic::new("t"), "6".into());
        drop(tx);
        assert!(matches!(
            ack.try_result(),
            Some(Err(ChannelError::PublishAbandoned))
        ));
    }

    #[tokio::test]
    async fn awaits_reply() {
        let (ack, tx) = PendingAck::channel(Topic::new("t"), "7".into());
        tx.send(PushReply {
            status: ReplyStatus::Error,
            response: json!({"reason": "nope"}),
        })
        .unwrap();
        let reply = ack.await.expect("reply");
        assert_eq!(reply.reason(), "nope");
    }
}
