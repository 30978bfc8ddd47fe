use std::time::Instant;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::protocol::{PushReply, Topic};

/// Lifecycle of one topic subscription.
///
/// ```text
/// Unjoined -> Joining -> { Joined | JoinFailed | JoinTimedOut }
/// Joined -> Leaving -> Unjoined
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    Unjoined,
    Joining,
    Joined,
    JoinFailed,
    JoinTimedOut,
    Leaving,
}

impl SubscriptionState {
    /// Joining or joined: the topic is (about to be) live on the server.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Joining | Self::Joined)
    }

    /// A new join attempt may be started from here.
    pub fn can_join(self) -> bool {
        matches!(self, Self::Unjoined | Self::JoinFailed | Self::JoinTimedOut)
    }
}

/// A push issued while its topic was still joining.
#[derive(Debug)]
pub(crate) struct BufferedPush {
    pub msg_ref: String,
    pub event: String,
    pub payload: Value,
    pub ack: oneshot::Sender<PushReply>,
}

/// Gateway-owned record of one topic.
#[derive(Debug)]
pub struct Subscription {
    topic: Topic,
    state: SubscriptionState,
    join_ref: Option<String>,
    deadline: Option<Instant>,
    buffered: Vec<BufferedPush>,
}

impl Subscription {
    pub(crate) fn new(topic: Topic) -> Self {
        Self {
            topic,
            state: SubscriptionState::Unjoined,
            join_ref: None,
            deadline: None,
            buffered: Vec::new(),
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Ref of the current (or last) join attempt.
    pub fn join_ref(&self) -> Option<&str> {
        self.join_ref.as_deref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    /// True when `join_ref` belongs to the attempt this record tracks.
    pub(crate) fn owns(&self, join_ref: Option<&str>) -> bool {
        match join_ref {
            Some(r) => self.join_ref.as_deref() == Some(r),
            None => true,
        }
    }

    pub(crate) fn start_join(&mut self, join_ref: String, deadline: Instant) {
        self.state = SubscriptionState::Joining;
        self.join_ref = Some(join_ref);
        self.deadline = Some(deadline);
    }

    pub(crate) fn set_state(&mut self, state: SubscriptionState) {
        if state != SubscriptionState::Joining {
            self.deadline = None;
        }
        self.state = state;
    }

    pub(crate) fn timed_out(&self, now: Instant) -> bool {
        self.state == SubscriptionState::Joining && self.deadline.is_some_and(|d| d <= now)
    }

    pub(crate) fn buffer(&mut self, push: BufferedPush) {
        self.buffered.push(push);
    }

    pub(crate) fn take_buffered(&mut self) -> Vec<BufferedPush> {
        std::mem::take(&mut self.buffered)
    }

    /// Drops buffered pushes; their acks resolve as abandoned.
    pub(crate) fn abandon_buffered(&mut self) -> usize {
        let n = self.buffered.len();
        self.buffered.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::{Subscription, SubscriptionState};
    use crate::protocol::Topic;
    use std::time::{Duration, Instant};

    #[test]
    fn starts_unjoined() {
        let s = Subscription::new(Topic::new("channel:streaming"));
        assert_eq!(s.state(), SubscriptionState::Unjoined);
        assert!(s.state().can_join());
        assert!(!s.state().is_active());
        assert!(s.join_ref().is_none());
    }

    #[test]
    fn join_sets_deadline_and_terminal_clears_it() {
        let mut s = Subscription::new(Topic::new("t"));
        let now = Instant::now();
        s.start_join("1".into(), now + Duration::from_secs(10));
        assert_eq!(s.state(), SubscriptionState::Joining);
        assert!(!s.timed_out(now));
        assert!(s.timed_out(now + Duration::from_secs(10)));

        s.set_state(SubscriptionState::Joined);
        assert!(s.deadline().is_none());
        assert!(!s.timed_out(now + Duration::from_secs(60)));
    }

    #[test]
    fn owns_checks_join_ref() {
        let mut s = Subscription::new(Topic::new("t"));
        s.start_join("4".into(), Instant::now());
        assert!(s.owns(Some("4")));
        assert!(!s.owns(Some("3")));
        assert!(s.owns(None));
    }
}
