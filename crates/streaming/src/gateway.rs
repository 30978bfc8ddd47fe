//! Topic-keyed push-channel gateway.
//!
//! The gateway owns every subscription and every outstanding acknowledgment.
//! It is driven entirely from the outside:
//! - commands (`switch_topic`, `leave`, `publish`) write frames to the transport
//! - inbound frames go through `handle_frame`
//! - timers call `poll_timeouts` and `heartbeat`
//! - the socket owner reports `connection_lost` / `rejoin_all`
//!
//! Completions are matched by topic and join ref; anything belonging to a
//! superseded attempt is dropped without touching state.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use runtime::Counters;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::ack::PendingAck;
use crate::error::ChannelError;
use crate::protocol::{events, Frame, PushReply, ReplyStatus, Topic, PHOENIX_TOPIC};
use crate::subscription::{BufferedPush, Subscription, SubscriptionState};
use crate::transport::Transport;

/// Handler for application pushes on one topic: `(event, payload)`.
pub type DataHandler = Box<dyn FnMut(&str, &Value) + Send>;

/// Gateway tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// A join without a reply after this long is reported as timed out.
    pub join_timeout_ms: u64,

    /// A sent push without a reply after this long resolves with a
    /// `timeout` status.
    #[serde(default = "default_push_timeout_ms")]
    pub push_timeout_ms: u64,

    /// Params sent with every `phx_join`.
    #[serde(default = "default_join_params")]
    pub join_params: Value,
}

fn default_join_params() -> Value {
    json!({})
}

fn default_push_timeout_ms() -> u64 {
    10_000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            join_timeout_ms: 10_000,
            push_timeout_ms: default_push_timeout_ms(),
            join_params: default_join_params(),
        }
    }
}

impl GatewayConfig {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }
}

/// Something the caller should react to.
///
/// For a single join attempt exactly one of `Joined`, `JoinFailed` or
/// `JoinTimedOut` is produced.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Joined { topic: Topic, response: Value },
    JoinFailed { topic: Topic, reason: String },
    JoinTimedOut { topic: Topic },
    Left { topic: Topic },
    Closed { topic: Topic },
    Data {
        topic: Topic,
        event: String,
        payload: Value,
    },
}

impl GatewayEvent {
    pub fn topic(&self) -> &Topic {
        match self {
            GatewayEvent::Joined { topic, .. }
            | GatewayEvent::JoinFailed { topic, .. }
            | GatewayEvent::JoinTimedOut { topic }
            | GatewayEvent::Left { topic }
            | GatewayEvent::Closed { topic }
            | GatewayEvent::Data { topic, .. } => topic,
        }
    }

    /// The failure carried by this event, if it is one.
    pub fn error(&self) -> Option<ChannelError> {
        match self {
            GatewayEvent::JoinFailed { reason, .. } => {
                Some(ChannelError::JoinFailed(reason.clone()))
            }
            GatewayEvent::JoinTimedOut { .. } => Some(ChannelError::JoinTimedOut),
            _ => None,
        }
    }
}

/// Result of a heartbeat tick.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HeartbeatStatus {
    Sent,
    /// The previous heartbeat was never answered; the connection should be
    /// treated as dead.
    Missed,
}

#[derive(Debug)]
struct InflightPush {
    topic: Topic,
    deadline: Instant,
    ack: oneshot::Sender<PushReply>,
}

pub struct ChannelGateway<T: Transport> {
    transport: T,
    config: GatewayConfig,
    subscriptions: BTreeMap<Topic, Subscription>,
    // Keyed by the ref of the `phx_leave` frame.
    leaving: BTreeMap<String, Subscription>,
    inflight: BTreeMap<String, InflightPush>,
    handlers: BTreeMap<Topic, Vec<DataHandler>>,
    heartbeat_ref: Option<String>,
    next_ref: u64,
    stats: Counters,
}

impl<T: Transport> ChannelGateway<T> {
    pub fn new(transport: T, config: GatewayConfig) -> Self {
        Self {
            transport,
            config,
            subscriptions: BTreeMap::new(),
            leaving: BTreeMap::new(),
            inflight: BTreeMap::new(),
            handlers: BTreeMap::new(),
            heartbeat_ref: None,
            next_ref: 0,
            stats: Counters::new(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Swaps in a fresh transport after a reconnect.
    pub fn replace_transport(&mut self, transport: T) -> T {
        std::mem::replace(&mut self.transport, transport)
    }

    pub fn stats(&self) -> &Counters {
        &self.stats
    }

    pub fn subscription(&self, topic: &Topic) -> Option<&Subscription> {
        self.subscriptions.get(topic)
    }

    /// State of `topic`, including subscriptions still waiting on a leave reply.
    pub fn state(&self, topic: &Topic) -> SubscriptionState {
        if let Some(sub) = self.subscriptions.get(topic) {
            return sub.state();
        }
        if self.leaving.values().any(|s| s.topic() == topic) {
            return SubscriptionState::Leaving;
        }
        SubscriptionState::Unjoined
    }

    /// The live (joining or joined) topic of `class`, if any.
    pub fn active_topic(&self, class: &str) -> Option<&Topic> {
        self.subscriptions
            .values()
            .find(|s| s.topic().class() == class && s.state().is_active())
            .map(Subscription::topic)
    }

    pub fn active_topics(&self) -> impl Iterator<Item = &Topic> {
        self.subscriptions
            .values()
            .filter(|s| s.state().is_active())
            .map(Subscription::topic)
    }

    pub fn inflight_pushes(&self) -> usize {
        self.inflight.len()
    }

    /// Makes `topic` the live subscription of its class.
    ///
    /// A different topic of the same class is left first (the leave is only
    /// initiated, never awaited). Switching to a topic that is already
    /// joining or joined does nothing.
    pub fn switch_topic(&mut self, topic: Topic) {
        self.switch_topic_at(topic, Instant::now());
    }

    /// `switch_topic` with the join deadline measured from `now`.
    pub fn switch_topic_at(&mut self, topic: Topic, now: Instant) {
        if let Some(sub) = self.subscriptions.get(&topic) {
            if sub.state().is_active() {
                debug!("{topic} already {:?}", sub.state());
                return;
            }
        }

        let superseded: Vec<Topic> = self
            .subscriptions
            .keys()
            .filter(|t| t.class() == topic.class() && **t != topic)
            .cloned()
            .collect();
        for old in superseded {
            self.leave(&old);
        }

        self.join(topic, now);
    }

    /// Registers a handler for application pushes on `topic`.
    ///
    /// Handlers run in delivery order and are dropped when the topic is left.
    pub fn on_data(&mut self, topic: &Topic, handler: impl FnMut(&str, &Value) + Send + 'static) {
        self.handlers
            .entry(topic.clone())
            .or_default()
            .push(Box::new(handler));
    }

    /// Leaves `topic`. Outstanding acks for it resolve as abandoned.
    pub fn leave(&mut self, topic: &Topic) {
        self.handlers.remove(topic);
        self.abandon_inflight(|t| t == topic);

        let Some(mut sub) = self.subscriptions.remove(topic) else {
            return;
        };
        let dropped = sub.abandon_buffered();
        self.stats.add("push_abandoned", dropped as u64);

        if !sub.state().is_active() {
            debug!("{topic} dropped in state {:?}", sub.state());
            return;
        }

        let msg_ref = self.make_ref();
        let frame = Frame::new(topic.clone(), events::LEAVE, json!({}))
            .with_refs(sub.join_ref().map(str::to_string), Some(msg_ref.clone()));
        self.send(frame);
        sub.set_state(SubscriptionState::Leaving);
        info!("leaving {topic}");
        self.leaving.insert(msg_ref, sub);
    }

    /// Publishes `event` on `topic`.
    ///
    /// Sent immediately when joined, buffered while joining, abandoned
    /// straight away when the topic has no live subscription.
    pub fn publish(&mut self, topic: &Topic, event: &str, payload: Value) -> PendingAck {
        self.publish_at(topic, event, payload, Instant::now())
    }

    /// `publish` with the reply deadline measured from `now`.
    pub fn publish_at(
        &mut self,
        topic: &Topic,
        event: &str,
        payload: Value,
        now: Instant,
    ) -> PendingAck {
        let msg_ref = self.make_ref();
        let (ack, tx) = PendingAck::channel(topic.clone(), msg_ref.clone());

        let Some(sub) = self.subscriptions.get_mut(topic) else {
            warn!("publish {event} on {topic}: not subscribed");
            self.stats.inc("push_abandoned");
            return ack;
        };

        match sub.state() {
            SubscriptionState::Joined => {
                let frame = Frame::new(topic.clone(), event, payload)
                    .with_refs(sub.join_ref().map(str::to_string), Some(msg_ref.clone()));
                let deadline = now + self.config.push_timeout();
                self.inflight.insert(
                    msg_ref,
                    InflightPush {
                        topic: topic.clone(),
                        deadline,
                        ack: tx,
                    },
                );
                self.send(frame);
            }
            SubscriptionState::Joining => {
                debug!("buffering {event} until {topic} is joined");
                sub.buffer(BufferedPush {
                    msg_ref,
                    event: event.to_string(),
                    payload,
                    ack: tx,
                });
            }
            state => {
                warn!("publish {event} on {topic}: subscription is {state:?}");
                self.stats.inc("push_abandoned");
            }
        }
        ack
    }

    /// Routes one inbound frame.
    pub fn handle_frame(&mut self, frame: Frame) -> Option<GatewayEvent> {
        if frame.topic.is_phoenix() {
            self.handle_phoenix(&frame);
            return None;
        }
        if frame.is_reply() {
            return self.handle_reply(frame);
        }
        if frame.event == events::ERROR || frame.event == events::CLOSE {
            return self.handle_close(frame);
        }
        if events::is_reserved(&frame.event) {
            debug!("ignoring {} from server on {}", frame.event, frame.topic);
            return None;
        }
        self.handle_push(frame)
    }

    /// Expires joins and sent pushes whose deadline is at or before `now`.
    ///
    /// Expired pushes resolve with a `timeout` reply; only join timeouts are
    /// returned as events.
    pub fn poll_timeouts(&mut self, now: Instant) -> Vec<GatewayEvent> {
        let expired: Vec<String> = self
            .inflight
            .iter()
            .filter(|(_, push)| push.deadline <= now)
            .map(|(msg_ref, _)| msg_ref.clone())
            .collect();
        for msg_ref in expired {
            if let Some(push) = self.inflight.remove(&msg_ref) {
                warn!("push {msg_ref} on {} timed out", push.topic);
                self.stats.inc("push_timeout");
                let _ = push.ack.send(PushReply {
                    status: ReplyStatus::Timeout,
                    response: json!({}),
                });
            }
        }

        let mut out = Vec::new();
        for sub in self.subscriptions.values_mut() {
            if !sub.timed_out(now) {
                continue;
            }
            sub.set_state(SubscriptionState::JoinTimedOut);
            let dropped = sub.abandon_buffered();
            self.stats.add("push_abandoned", dropped as u64);
            self.stats.inc("join_timeout");
            warn!("timeout joining {}", sub.topic());
            out.push(GatewayEvent::JoinTimedOut {
                topic: sub.topic().clone(),
            });
        }
        out
    }

    /// Sends a keepalive unless the previous one is still unanswered.
    pub fn heartbeat(&mut self) -> HeartbeatStatus {
        if let Some(r) = &self.heartbeat_ref {
            warn!("heartbeat {r} was never answered");
            return HeartbeatStatus::Missed;
        }
        let msg_ref = self.make_ref();
        let frame = Frame::new(Topic::new(PHOENIX_TOPIC), events::HEARTBEAT, json!({}))
            .with_refs(None, Some(msg_ref.clone()));
        self.heartbeat_ref = Some(msg_ref);
        self.send(frame);
        HeartbeatStatus::Sent
    }

    /// Forgets everything tied to the dead connection.
    ///
    /// Live subscriptions fall back to `Unjoined` (and are remembered for
    /// `rejoin_all`); every outstanding ack resolves as abandoned.
    pub fn connection_lost(&mut self) -> Vec<GatewayEvent> {
        self.heartbeat_ref = None;
        self.leaving.clear();
        self.abandon_inflight(|_| true);

        let mut out = Vec::new();
        for sub in self.subscriptions.values_mut() {
            let dropped = sub.abandon_buffered();
            self.stats.add("push_abandoned", dropped as u64);
            if sub.state().is_active() {
                sub.set_state(SubscriptionState::Unjoined);
                out.push(GatewayEvent::Closed {
                    topic: sub.topic().clone(),
                });
            }
        }
        out
    }

    /// Re-joins every subscription left `Unjoined` by a lost connection.
    ///
    /// Failed or timed-out topics stay as they are.
    pub fn rejoin_all(&mut self) -> usize {
        self.rejoin_all_at(Instant::now())
    }

    /// `rejoin_all` with join deadlines measured from `now`.
    pub fn rejoin_all_at(&mut self, now: Instant) -> usize {
        let topics: Vec<Topic> = self
            .subscriptions
            .values()
            .filter(|s| s.state() == SubscriptionState::Unjoined)
            .map(|s| s.topic().clone())
            .collect();
        let n = topics.len();
        for topic in topics {
            self.join(topic, now);
        }
        n
    }

    fn join(&mut self, topic: Topic, now: Instant) {
        let join_ref = self.make_ref();
        let deadline = now + self.config.join_timeout();
        let frame = Frame::new(topic.clone(), events::JOIN, self.config.join_params.clone())
            .with_refs(Some(join_ref.clone()), Some(join_ref.clone()));

        let sub = self
            .subscriptions
            .entry(topic.clone())
            .or_insert_with(|| Subscription::new(topic.clone()));
        sub.start_join(join_ref, deadline);
        info!("joining {topic}");
        self.send(frame);
    }

    fn handle_phoenix(&mut self, frame: &Frame) {
        if frame.is_reply() && frame.msg_ref.is_some() && frame.msg_ref == self.heartbeat_ref {
            self.heartbeat_ref = None;
            debug!("heartbeat acknowledged");
        }
    }

    fn handle_reply(&mut self, frame: Frame) -> Option<GatewayEvent> {
        let Some(reply) = frame.reply() else {
            warn!("malformed reply on {}: {}", frame.topic, frame.payload);
            return None;
        };
        let Some(msg_ref) = frame.msg_ref.clone() else {
            warn!("reply without ref on {}", frame.topic);
            return None;
        };

        if let Some(push) = self.inflight.remove(&msg_ref) {
            if push.topic == frame.topic {
                let _ = push.ack.send(reply);
            } else {
                self.stats.inc("stale");
            }
            return None;
        }

        if let Some(sub) = self.leaving.remove(&msg_ref) {
            info!("left {}", sub.topic());
            return Some(GatewayEvent::Left {
                topic: sub.topic().clone(),
            });
        }

        let topic = frame.topic;
        let current = self.subscriptions.get_mut(&topic).filter(|sub| {
            sub.state() == SubscriptionState::Joining && sub.join_ref() == Some(msg_ref.as_str())
        });
        let Some(sub) = current else {
            debug!("stale reply {msg_ref} on {topic}");
            self.stats.inc("stale");
            return None;
        };

        match reply.status {
            ReplyStatus::Ok => {
                sub.set_state(SubscriptionState::Joined);
                let join_ref = sub.join_ref().map(str::to_string);
                let buffered = sub.take_buffered();
                self.stats.inc("join_ok");
                info!("joined {topic}");
                let deadline = Instant::now() + self.config.push_timeout();
                for push in buffered {
                    let frame = Frame::new(topic.clone(), push.event, push.payload)
                        .with_refs(join_ref.clone(), Some(push.msg_ref.clone()));
                    self.inflight.insert(
                        push.msg_ref,
                        InflightPush {
                            topic: topic.clone(),
                            deadline,
                            ack: push.ack,
                        },
                    );
                    self.send(frame);
                }
                Some(GatewayEvent::Joined {
                    topic,
                    response: reply.response,
                })
            }
            ReplyStatus::Error => {
                sub.set_state(SubscriptionState::JoinFailed);
                let dropped = sub.abandon_buffered();
                self.stats.add("push_abandoned", dropped as u64);
                self.stats.inc("join_error");
                let reason = reply.reason();
                warn!("failed to join {topic}: {reason}");
                Some(GatewayEvent::JoinFailed { topic, reason })
            }
            ReplyStatus::Timeout => {
                sub.set_state(SubscriptionState::JoinTimedOut);
                let dropped = sub.abandon_buffered();
                self.stats.add("push_abandoned", dropped as u64);
                self.stats.inc("join_timeout");
                warn!("server timed out joining {topic}");
                Some(GatewayEvent::JoinTimedOut { topic })
            }
        }
    }

    fn handle_close(&mut self, frame: Frame) -> Option<GatewayEvent> {
        let topic = frame.topic;
        let owned = self
            .subscriptions
            .get(&topic)
            .is_some_and(|s| s.state().is_active() && s.owns(frame.join_ref.as_deref()));
        if !owned {
            self.stats.inc("stale");
            return None;
        }

        self.abandon_inflight(|t| *t == topic);
        if let Some(sub) = self.subscriptions.get_mut(&topic) {
            let dropped = sub.abandon_buffered();
            self.stats.add("push_abandoned", dropped as u64);
            sub.set_state(SubscriptionState::Unjoined);
        }
        warn!("{topic} closed by server ({})", frame.event);
        Some(GatewayEvent::Closed { topic })
    }

    fn handle_push(&mut self, frame: Frame) -> Option<GatewayEvent> {
        let live = self.subscriptions.get(&frame.topic).is_some_and(|s| {
            s.state() == SubscriptionState::Joined && s.owns(frame.join_ref.as_deref())
        });
        if !live {
            debug!("dropping {} on inactive {}", frame.event, frame.topic);
            self.stats.inc("stale");
            return None;
        }

        self.stats.inc("data");
        if let Some(handlers) = self.handlers.get_mut(&frame.topic) {
            for handler in handlers.iter_mut() {
                handler(&frame.event, &frame.payload);
            }
        }
        Some(GatewayEvent::Data {
            topic: frame.topic,
            event: frame.event,
            payload: frame.payload,
        })
    }

    fn abandon_inflight(&mut self, mut matches: impl FnMut(&Topic) -> bool) {
        let before = self.inflight.len();
        self.inflight.retain(|_, push| !matches(&push.topic));
        let dropped = before - self.inflight.len();
        self.stats.add("push_abandoned", dropped as u64);
    }

    fn make_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }

    fn send(&mut self, frame: Frame) {
        if let Err(e) = self.transport.send(frame) {
            warn!("send failed: {e}");
            self.stats.inc("send_error");
        }
    }
}
