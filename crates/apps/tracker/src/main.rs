use std::collections::VecDeque;
use std::env;
use std::time::{Duration, Instant};

use foundation::{EntityId, TrajectoryPoint};
use futures_util::StreamExt;
use selection::{SelectionConfig, SelectionController, SelectionEvent};
use serde_json::json;
use streaming::{ChannelGateway, Frame, GatewayConfig, HeartbeatStatus};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod history;
mod render;
mod ws;

use commands::Command;
use render::LogRenderer;
use ws::{ChannelTransport, WsStream};

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type Controller = SelectionController<ChannelTransport>;

const MAX_RECONNECT_MS: u64 = 30_000;
const TIMEOUT_POLL: Duration = Duration::from_millis(250);

#[derive(Clone, Debug)]
struct TrackerConfig {
    ws_url: String,
    http_base: Option<String>,
    control_topic: String,
    trajectory_prefix: String,
    join_token: String,
    join_timeout_ms: u64,
    heartbeat_ms: u64,
    reconnect_ms: u64,
    announce_deselect: bool,
}

impl TrackerConfig {
    fn from_env() -> Self {
        let defaults = SelectionConfig::default();
        Self {
            ws_url: env::var("TRACKER_WS_URL").unwrap_or_else(|_| {
                "ws://127.0.0.1:5050/websocket?userToken=joining-token&vsn=2.0.0".to_string()
            }),
            http_base: env::var("TRACKER_HTTP_BASE").ok().filter(|s| !s.is_empty()),
            control_topic: env::var("TRACKER_CONTROL_TOPIC").unwrap_or(defaults.control_topic),
            trajectory_prefix: env::var("TRACKER_TRAJECTORY_PREFIX")
                .unwrap_or(defaults.trajectory_prefix),
            join_token: env::var("TRACKER_JOIN_TOKEN").unwrap_or_else(|_| "okToJoin".to_string()),
            join_timeout_ms: env_var_u64("TRACKER_JOIN_TIMEOUT_MS", 10_000),
            heartbeat_ms: env_var_u64("TRACKER_HEARTBEAT_MS", 30_000).max(1),
            reconnect_ms: env_var_u64("TRACKER_RECONNECT_MS", 1_000).max(1),
            announce_deselect: env_var_bool("TRACKER_ANNOUNCE_DESELECT", false),
        }
    }

    fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            join_timeout_ms: self.join_timeout_ms,
            join_params: json!({ "token": self.join_token }),
            ..GatewayConfig::default()
        }
    }

    fn selection(&self) -> SelectionConfig {
        SelectionConfig {
            control_topic: self.control_topic.clone(),
            trajectory_prefix: self.trajectory_prefix.clone(),
            announce_deselect: self.announce_deselect,
            ..SelectionConfig::default()
        }
    }
}

enum SessionEnd {
    Quit,
    Disconnected,
}

struct Tracker {
    config: TrackerConfig,
    controller: Controller,
    commands: mpsc::UnboundedReceiver<Command>,
    deferred: VecDeque<Command>,
    http: reqwest::Client,
    history_tx: mpsc::UnboundedSender<(EntityId, Vec<TrajectoryPoint>)>,
    history_rx: mpsc::UnboundedReceiver<(EntityId, Vec<TrajectoryPoint>)>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = TrackerConfig::from_env();
    info!("Tracker starting, server {}", config.ws_url);

    if let Err(e) = run(config).await {
        error!("Tracker stopped: {e}");
        std::process::exit(1);
    }
}

async fn run(config: TrackerConfig) -> Result<(), BoxError> {
    let (transport, outbound) = ChannelTransport::new();
    let gateway = ChannelGateway::new(transport, config.gateway());
    let controller =
        SelectionController::new(gateway, config.selection()).with_renderer(LogRenderer);
    let (history_tx, history_rx) = mpsc::unbounded_channel();

    let mut tracker = Tracker {
        config,
        controller,
        commands: spawn_stdin_reader(),
        deferred: VecDeque::new(),
        http: reqwest::Client::new(),
        history_tx,
        history_rx,
    };
    tracker.run(outbound).await
}

impl Tracker {
    async fn run(&mut self, first: mpsc::UnboundedReceiver<Frame>) -> Result<(), BoxError> {
        let mut outbound = Some(first);
        let mut delay = self.config.reconnect_ms;

        loop {
            let socket = match connect_async(self.config.ws_url.as_str()).await {
                Ok((socket, _)) => socket,
                Err(tungstenite::Error::Url(e)) => return Err(e.into()),
                Err(e) => {
                    warn!("Connect to {} failed: {e}; retrying in {delay}ms", self.config.ws_url);
                    if !self.wait(Duration::from_millis(delay)).await {
                        return Ok(());
                    }
                    delay = (delay * 2).min(MAX_RECONNECT_MS);
                    continue;
                }
            };
            info!("Connected to {}", self.config.ws_url);
            delay = self.config.reconnect_ms;

            let rx = match outbound.take() {
                Some(rx) => {
                    self.controller.start();
                    rx
                }
                None => {
                    let (transport, rx) = ChannelTransport::new();
                    let n = self.controller.reconnected(transport);
                    info!("Rejoining {n} topics");
                    rx
                }
            };

            match self.session(socket, rx).await {
                SessionEnd::Quit => {
                    info!("Bye");
                    return Ok(());
                }
                SessionEnd::Disconnected => {
                    let closed = self.controller.connection_lost();
                    warn!("Disconnected, {} topics closed", closed.len());
                }
            }
        }
    }

    async fn session(
        &mut self,
        socket: WsStream,
        outbound: mpsc::UnboundedReceiver<Frame>,
    ) -> SessionEnd {
        let (sink, mut stream) = socket.split();
        let writer = ws::spawn_writer(sink, outbound);

        let period = Duration::from_millis(self.config.heartbeat_ms);
        let mut heartbeat = time::interval_at(time::Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut timeouts = time::interval(TIMEOUT_POLL);
        timeouts.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while let Some(cmd) = self.deferred.pop_front() {
            if !self.apply(cmd) {
                writer.abort();
                return SessionEnd::Quit;
            }
        }

        let end = loop {
            tokio::select! {
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.on_text(&text),
                    Some(Ok(Message::Close(frame))) => {
                        info!("Server closed the connection: {frame:?}");
                        break SessionEnd::Disconnected;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WS receive error: {e}");
                        break SessionEnd::Disconnected;
                    }
                    None => break SessionEnd::Disconnected,
                },
                _ = heartbeat.tick() => {
                    if self.controller.heartbeat() == HeartbeatStatus::Missed {
                        break SessionEnd::Disconnected;
                    }
                }
                _ = timeouts.tick() => {
                    self.controller.poll_timeouts(Instant::now());
                }
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => {
                        if !self.apply(cmd) {
                            break SessionEnd::Quit;
                        }
                    }
                    None => break SessionEnd::Quit,
                },
                Some((id, points)) = self.history_rx.recv() => {
                    let n = points.len();
                    if self.controller.load_history(&id, points) {
                        info!("Loaded {n} recorded points for {id}");
                    }
                }
            }
        };

        writer.abort();
        end
    }

    /// Sleeps for `delay` while still honouring `quit`. Other commands are
    /// kept for the next session.
    async fn wait(&mut self, delay: Duration) -> bool {
        let sleep = time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                cmd = self.commands.recv() => match cmd {
                    None | Some(Command::Quit) => return false,
                    Some(Command::Show) => self.show(),
                    Some(cmd) => self.deferred.push_back(cmd),
                },
            }
        }
    }

    fn on_text(&mut self, text: &str) {
        debug!("<- {text}");
        match Frame::decode(text) {
            Ok(frame) => {
                if let Some(event) = self.controller.handle_frame(frame) {
                    debug!("{event:?}");
                }
            }
            Err(e) => warn!("Dropping inbound message: {e}"),
        }
    }

    /// Returns false on quit.
    fn apply(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Select(id) => {
                self.controller.set_selection(Some(id.clone()));
                self.watch_select_ack();
                self.spawn_history(id);
            }
            Command::Deselect => {
                self.controller.set_selection(None);
                self.watch_select_ack();
            }
            Command::Show => self.show(),
            Command::Quit => return false,
        }
        self.drain_changes();
        true
    }

    fn drain_changes(&mut self) {
        for event in self.controller.events_mut().drain() {
            let SelectionEvent::Changed { previous, current } = event.kind;
            info!(
                "#{} selection {} -> {}",
                event.seq,
                label(previous.as_ref()),
                label(current.as_ref())
            );
        }
    }

    fn watch_select_ack(&mut self) {
        let Some(ack) = self.controller.take_select_ack() else {
            return;
        };
        tokio::spawn(async move {
            let topic = ack.topic().clone();
            match ack.await {
                Ok(reply) if reply.is_ok() => debug!("({topic}) select acknowledged"),
                Ok(reply) => warn!("({topic}) select rejected: {}", reply.reason()),
                Err(e) => warn!("({topic}) select: {e}"),
            }
        });
    }

    fn spawn_history(&self, id: EntityId) {
        let Some(base) = self.config.http_base.clone() else {
            return;
        };
        let http = self.http.clone();
        let tx = self.history_tx.clone();
        tokio::spawn(async move {
            match history::fetch_history(&http, &base, &id).await {
                Ok(points) => {
                    let _ = tx.send((id, points));
                }
                Err(e) => warn!("History for {id} unavailable: {e}"),
            }
        });
    }

    fn show(&self) {
        let c = &self.controller;
        info!(
            "selected={} previous={} points={}",
            label(c.selection()),
            label(c.previous()),
            c.trajectory().len()
        );
        for topic in c.gateway().active_topics() {
            info!("  {topic}: {:?}", c.gateway().state(topic));
        }
        info!("  stats: {:?}", c.gateway().stats().snapshot());
    }
}

fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<Command> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match Command::parse(&line) {
                    Ok(cmd) => {
                        if tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("{e}"),
                },
                Ok(None) => break,
                Err(e) => {
                    warn!("stdin: {e}");
                    break;
                }
            }
        }
    });
    rx
}

fn label(id: Option<&EntityId>) -> String {
    id.map(ToString::to_string)
        .unwrap_or_else(|| "none".to_string())
}

fn env_var_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_var_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_maps_onto_library_configs() {
        let config = TrackerConfig {
            ws_url: "ws://localhost/websocket".to_string(),
            http_base: None,
            control_topic: "channel:control".to_string(),
            trajectory_prefix: "channel:track".to_string(),
            join_token: "secret".to_string(),
            join_timeout_ms: 500,
            heartbeat_ms: 1_000,
            reconnect_ms: 100,
            announce_deselect: true,
        };

        let gw = config.gateway();
        assert_eq!(gw.join_timeout_ms, 500);
        assert_eq!(gw.push_timeout_ms, GatewayConfig::default().push_timeout_ms);
        assert_eq!(gw.join_params, json!({"token": "secret"}));

        let sel = config.selection();
        assert_eq!(sel.control_topic, "channel:control");
        assert_eq!(sel.trajectory_prefix, "channel:track");
        assert_eq!(sel.data_event, "new-data");
        assert!(sel.announce_deselect);
    }

    fn offline_tracker() -> Tracker {
        let config = TrackerConfig {
            ws_url: "ws://localhost/websocket".to_string(),
            http_base: None,
            control_topic: "channel:streaming".to_string(),
            trajectory_prefix: "channel:trajectory".to_string(),
            join_token: "okToJoin".to_string(),
            join_timeout_ms: 10_000,
            heartbeat_ms: 30_000,
            reconnect_ms: 1_000,
            announce_deselect: false,
        };
        let (transport, _outbound) = ChannelTransport::new();
        let gateway = ChannelGateway::new(transport, config.gateway());
        let controller = SelectionController::new(gateway, config.selection());
        let (_commands_tx, commands) = mpsc::unbounded_channel();
        let (history_tx, history_rx) = mpsc::unbounded_channel();
        Tracker {
            config,
            controller,
            commands,
            deferred: VecDeque::new(),
            http: reqwest::Client::new(),
            history_tx,
            history_rx,
        }
    }

    #[tokio::test]
    async fn applied_commands_drain_selection_events() {
        let mut tracker = offline_tracker();
        let id = EntityId::parse("abc123").unwrap();

        assert!(tracker.apply(Command::Select(id.clone())));
        assert!(tracker.apply(Command::Deselect));
        assert!(!tracker.apply(Command::Quit));

        assert_eq!(tracker.controller.selection(), None);
        assert_eq!(tracker.controller.previous(), Some(&id));
        assert_eq!(tracker.controller.events().emitted(), 2);
        assert!(tracker.controller.events().events().is_empty());
    }

    #[test]
    fn env_helpers_fall_back_to_defaults() {
        assert_eq!(env_var_u64("TRACKER_TEST_UNSET_U64", 7), 7);
        assert!(env_var_bool("TRACKER_TEST_UNSET_BOOL", true));
    }
}
