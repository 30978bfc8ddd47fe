//! Selection controller.
//!
//! Owns the selection state, the channel gateway and the trajectory buffer,
//! and is the only place selection changes. A change:
//! - records old/new values and notifies local observers once
//! - clears the trajectory buffer
//! - moves the per-entity stream subscription to the new entity (or leaves it)
//! - announces the new selection on the control topic
//!
//! Inbound traffic is fed through `handle_frame`; only completions for the
//! topic of the *current* selection touch the buffer.

use std::time::Instant;

use foundation::{EntityId, TrajectoryPoint};
use runtime::EventBus;
use serde::{Deserialize, Serialize};
use serde_json::json;
use streaming::{
    ChannelGateway, Frame, GatewayEvent, HeartbeatStatus, PendingAck, SubscriptionState, Topic,
    Transport,
};
use tracing::{debug, info, warn};

use crate::render::TrajectoryRenderer;
use crate::state::SelectionState;
use crate::trajectory::TrajectoryBuffer;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Topic carrying `select` notifications upstream.
    pub control_topic: String,

    /// Per-entity stream topics are `{trajectory_prefix}:{id}`.
    pub trajectory_prefix: String,

    /// Event name of trajectory pushes on the stream topic.
    pub data_event: String,

    /// Event name published on the control topic.
    pub select_event: String,

    /// Also publish `{"entityId": null}` on deselection.
    #[serde(default)]
    pub announce_deselect: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            control_topic: "channel:streaming".to_string(),
            trajectory_prefix: "channel:trajectory".to_string(),
            data_event: "new-data".to_string(),
            select_event: "select".to_string(),
            announce_deselect: false,
        }
    }
}

/// Local notification, emitted exactly once per `set_selection` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionEvent {
    Changed {
        previous: Option<EntityId>,
        current: Option<EntityId>,
    },
}

pub struct SelectionController<T: Transport> {
    config: SelectionConfig,
    control: Topic,
    state: SelectionState,
    gateway: ChannelGateway<T>,
    trajectory: TrajectoryBuffer,
    bus: EventBus<SelectionEvent>,
    renderer: Option<Box<dyn TrajectoryRenderer + Send>>,
    select_ack: Option<PendingAck>,
    // History that arrived before the current stream joined.
    pending_history: Option<Vec<TrajectoryPoint>>,
}

impl<T: Transport> SelectionController<T> {
    pub fn new(gateway: ChannelGateway<T>, config: SelectionConfig) -> Self {
        Self {
            control: Topic::new(config.control_topic.clone()),
            config,
            state: SelectionState::new(),
            gateway,
            trajectory: TrajectoryBuffer::new(),
            bus: EventBus::new(),
            renderer: None,
            select_ack: None,
            pending_history: None,
        }
    }

    pub fn with_renderer(mut self, renderer: impl TrajectoryRenderer + Send + 'static) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    /// Joins the control topic.
    pub fn start(&mut self) {
        self.gateway.switch_topic(self.control.clone());
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    pub fn selection(&self) -> Option<&EntityId> {
        self.state.current()
    }

    pub fn previous(&self) -> Option<&EntityId> {
        self.state.previous()
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn trajectory(&self) -> &TrajectoryBuffer {
        &self.trajectory
    }

    pub fn gateway(&self) -> &ChannelGateway<T> {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut ChannelGateway<T> {
        &mut self.gateway
    }

    pub fn events(&self) -> &EventBus<SelectionEvent> {
        &self.bus
    }

    pub fn events_mut(&mut self) -> &mut EventBus<SelectionEvent> {
        &mut self.bus
    }

    /// Acknowledgment of the most recent `select` publish, if not yet taken.
    pub fn take_select_ack(&mut self) -> Option<PendingAck> {
        self.select_ack.take()
    }

    pub fn topic_for(&self, id: &EntityId) -> Topic {
        Topic::for_entity(&self.config.trajectory_prefix, id)
    }

    /// Stream topic of the current selection.
    pub fn current_topic(&self) -> Option<Topic> {
        self.state.current().map(|id| self.topic_for(id))
    }

    /// The single mutation point for the selection.
    ///
    /// Re-selecting the current entity publishes again but keeps the existing
    /// subscription.
    pub fn set_selection(&mut self, next: Option<EntityId>) {
        let previous = self.state.replace(next.clone());
        info!(
            "selected {} => {}",
            id_label(previous.as_ref()),
            id_label(next.as_ref())
        );

        self.trajectory.clear();
        self.pending_history = None;
        self.render();
        self.bus.emit(SelectionEvent::Changed {
            previous: previous.clone(),
            current: next.clone(),
        });

        match next {
            Some(id) => {
                if let Some(prev) = previous.filter(|prev| *prev != id) {
                    let old = self.topic_for(&prev);
                    self.gateway.leave(&old);
                }
                let topic = self.topic_for(&id);
                self.gateway.switch_topic(topic);
                let ack = self.gateway.publish(
                    &self.control,
                    &self.config.select_event,
                    json!({ "entityId": id }),
                );
                self.select_ack = Some(ack);
            }
            None => {
                if let Some(prev) = previous {
                    let topic = self.topic_for(&prev);
                    self.gateway.leave(&topic);
                }
                if self.config.announce_deselect {
                    let ack = self.gateway.publish(
                        &self.control,
                        &self.config.select_event,
                        json!({ "entityId": null }),
                    );
                    self.select_ack = Some(ack);
                }
            }
        }
    }

    pub fn handle_frame(&mut self, frame: Frame) -> Option<GatewayEvent> {
        let event = self.gateway.handle_frame(frame)?;
        self.apply(&event);
        Some(event)
    }

    pub fn poll_timeouts(&mut self, now: Instant) -> Vec<GatewayEvent> {
        let events = self.gateway.poll_timeouts(now);
        for event in &events {
            self.apply(event);
        }
        events
    }

    pub fn heartbeat(&mut self) -> HeartbeatStatus {
        self.gateway.heartbeat()
    }

    pub fn connection_lost(&mut self) -> Vec<GatewayEvent> {
        let events = self.gateway.connection_lost();
        for event in &events {
            self.apply(event);
        }
        events
    }

    /// Installs the transport of a new connection and re-joins every topic
    /// that was live on the old one.
    pub fn reconnected(&mut self, transport: T) -> usize {
        self.gateway.replace_transport(transport);
        self.gateway.rejoin_all()
    }

    /// Loads previously recorded positions for `id`.
    ///
    /// Ignored (returns `false`) when the selection has moved on since the
    /// history was requested. History that arrives before the stream is
    /// joined is held back and becomes the buffer once the join succeeds.
    pub fn load_history(&mut self, id: &EntityId, points: Vec<TrajectoryPoint>) -> bool {
        if !self.state.is_selected(id) {
            debug!("dropping stale history for {id}");
            return false;
        }
        let topic = self.topic_for(id);
        if self.gateway.state(&topic) != SubscriptionState::Joined {
            debug!("holding {} history points until {topic} is joined", points.len());
            self.pending_history = Some(points);
            return true;
        }
        self.trajectory.replace(points);
        self.render();
        true
    }

    fn apply(&mut self, event: &GatewayEvent) {
        let Some(current) = self.current_topic() else {
            return;
        };
        if event.topic() != &current {
            return;
        }

        match event {
            GatewayEvent::Joined { response, .. } => {
                debug!("({current}) joined: {response}");
                match self.pending_history.take() {
                    Some(points) => self.trajectory.replace(points),
                    None => self.trajectory.clear(),
                }
                self.render();
            }
            GatewayEvent::Data { event, payload, .. } if *event == self.config.data_event => {
                match self.trajectory.apply_payload(payload) {
                    Ok(n) => {
                        debug!("({current}) {n} points");
                        self.render();
                    }
                    Err(e) => warn!("({current}) unreadable {event} payload: {e}"),
                }
            }
            GatewayEvent::JoinFailed { reason, .. } => {
                warn!("trajectory for {current} unavailable: {reason}");
            }
            GatewayEvent::JoinTimedOut { .. } => {
                warn!("trajectory for {current} unavailable: join timed out");
            }
            _ => {}
        }
    }

    fn render(&mut self) {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.render(self.state.current(), self.trajectory.points());
        }
    }
}

fn id_label(id: Option<&EntityId>) -> &str {
    id.map(EntityId::as_str).unwrap_or("none")
}
