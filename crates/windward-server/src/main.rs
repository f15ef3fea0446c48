//! Windward Multiplayer Server
//!
//! Authoritative game server. One single-writer loop owns the game
//! session; every inbound message is processed to completion (cascades
//! and flush included) before the next one is read.

use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use renet::{ConnectionConfig, RenetServer};
use tracing::{info, warn};

use windward_core::{load_rules, GameSession, PlayerSpec, RulesSource, SessionConfig};
use windward_protocol::{Action, PlayerId};
use windward_server::{
    ai, channel_id, create_channel_configs, dispatcher,
    protocol::{
        deserialize_client_message, reject_reason, ClientMessage, JoinRejectReason,
        ServerMessage, ServerNotification,
    },
    AddPlayerError, PlayerManager, ServerConfig,
};

/// Server state
struct Server {
    renet: RenetServer,
    config: ServerConfig,
    players: PlayerManager,
    /// Game session (None until the lobby starts it)
    session: Option<GameSession>,
    /// When the current player's turn began
    turn_started: Instant,
    /// Timer warnings already sent: (player, turn) -> threshold
    timer_warnings_sent: HashMap<(PlayerId, u32), u32>,
    /// Last turn number we ran round maintenance (autosave, integrity)
    maintained_turn: u32,
    game_end_announced: bool,
}

impl Server {
    fn new(config: ServerConfig) -> Self {
        let connection_config = ConnectionConfig {
            available_bytes_per_tick: 60_000,
            server_channels_config: create_channel_configs(),
            client_channels_config: create_channel_configs(),
        };

        let players = PlayerManager::new(
            config.min_players,
            config.max_players,
            config.disconnect_grace,
        );

        Self {
            renet: RenetServer::new(connection_config),
            config,
            players,
            session: None,
            turn_started: Instant::now(),
            timer_warnings_sent: HashMap::new(),
            maintained_turn: 0,
            game_end_announced: false,
        }
    }

    /// Main server loop tick
    fn update(&mut self, _delta: Duration) {
        while let Some(event) = self.renet.get_event() {
            self.handle_server_event(event);
        }

        for client_id in self.renet.clients_id() {
            while let Some(message) = self.renet.receive_message(client_id, channel_id::COMMANDS) {
                self.handle_client_message(client_id, &message);
            }
        }

        // Disconnect grace expiry: the AI takes the seat over.
        let takeovers = self.players.process_disconnections();
        for player in takeovers {
            dispatcher::broadcast(
                &mut self.renet,
                &ServerMessage::PlayerDisconnected {
                    player,
                    ai_takeover: true,
                },
            );
            dispatcher::broadcast(
                &mut self.renet,
                &ServerMessage::Notification {
                    notification: ServerNotification::AiTookOver { player },
                },
            );
        }

        self.process_turn_timers();
        self.run_ai_turns();
        self.run_round_maintenance();
    }

    fn handle_server_event(&mut self, event: renet::ServerEvent) {
        match event {
            renet::ServerEvent::ClientConnected { client_id } => {
                info!("Client {:?} connected", client_id);
            }
            renet::ServerEvent::ClientDisconnected { client_id, reason } => {
                info!("Client {:?} disconnected: {:?}", client_id, reason);
                if let Some(player) = self.players.disconnect(client_id) {
                    dispatcher::broadcast(
                        &mut self.renet,
                        &ServerMessage::PlayerDisconnected {
                            player,
                            ai_takeover: false,
                        },
                    );
                    if !self.players.has_started() {
                        self.broadcast_lobby_state();
                    }
                }
            }
        }
    }

    fn handle_client_message(&mut self, client_id: u64, data: &[u8]) {
        if !self.players.check_rate_limit(client_id) {
            warn!("Rate limit exceeded for client {:?}", client_id);
            return;
        }

        // A malformed packet is a protocol error: it is logged and
        // dropped without touching game state.
        let message = match deserialize_client_message(data) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Failed to deserialize message from {:?}: {}", client_id, e);
                return;
            }
        };

        self.players.update_activity(client_id);

        match message {
            ClientMessage::Join {
                player_name,
                reconnect_token,
            } => self.handle_join(client_id, player_name, reconnect_token),
            ClientMessage::SetReady { ready } => self.handle_set_ready(client_id, ready),
            ClientMessage::StartGame => self.handle_start_game(client_id),
            ClientMessage::Submit { action } => self.handle_submit(client_id, action),
            ClientMessage::RequestState => self.handle_state_request(client_id),
            ClientMessage::Chat { message } => self.handle_chat(client_id, message),
            ClientMessage::Ping { timestamp } => self.handle_ping(client_id, timestamp),
        }
    }

    fn handle_join(
        &mut self,
        client_id: u64,
        player_name: String,
        reconnect_token: Option<String>,
    ) {
        if let Some(token) = reconnect_token {
            match self.players.reconnect(client_id, &token) {
                Ok(player) => {
                    info!("Player {} reconnected as {:?}", player_name, player);
                    dispatcher::broadcast(
                        &mut self.renet,
                        &ServerMessage::PlayerReconnected { player },
                    );
                    if let Some(session) = &mut self.session {
                        dispatcher::sync_client(&mut self.renet, session, client_id, player);
                    }
                    return;
                }
                Err(e) => {
                    warn!("Reconnection failed for {}: {:?}", player_name, e);
                    dispatcher::send(
                        &mut self.renet,
                        client_id,
                        &ServerMessage::JoinRejected {
                            reason: JoinRejectReason::InvalidReconnectToken,
                        },
                    );
                    return;
                }
            }
        }

        match self.players.add_player(client_id, player_name.clone()) {
            Ok((player, token)) => {
                info!("Player {} joined as {:?}", player_name, player);
                dispatcher::send(
                    &mut self.renet,
                    client_id,
                    &ServerMessage::JoinAccepted {
                        player,
                        reconnect_token: token,
                    },
                );
                dispatcher::broadcast(
                    &mut self.renet,
                    &ServerMessage::PlayerConnected {
                        player,
                        player_name,
                    },
                );
                self.broadcast_lobby_state();
            }
            Err(AddPlayerError::GameFull) => {
                dispatcher::send(
                    &mut self.renet,
                    client_id,
                    &ServerMessage::JoinRejected {
                        reason: JoinRejectReason::GameFull,
                    },
                );
            }
            Err(AddPlayerError::GameInProgress) => {
                dispatcher::send(
                    &mut self.renet,
                    client_id,
                    &ServerMessage::JoinRejected {
                        reason: JoinRejectReason::GameInProgress,
                    },
                );
            }
            Err(AddPlayerError::AlreadyExists) => {
                warn!("Player already exists for client {:?}", client_id);
            }
        }
    }

    fn handle_set_ready(&mut self, client_id: u64, ready: bool) {
        let Some(player) = self.players.get_player_by_client(client_id) else {
            return;
        };
        if self.players.set_ready(player, ready).is_ok() {
            dispatcher::broadcast(&mut self.renet, &ServerMessage::PlayerReady { player, ready });
            self.broadcast_lobby_state();
        }
    }

    fn handle_start_game(&mut self, client_id: u64) {
        let Some(player) = self.players.get_player_by_client(client_id) else {
            return;
        };
        if !self.players.is_host(player) {
            warn!("Non-host {:?} tried to start game", player);
            return;
        }
        let Ok(order) = self.players.start_game() else {
            warn!("Cannot start: not enough players or not all ready");
            return;
        };

        info!("Starting game with {} players", order.len());
        dispatcher::broadcast(&mut self.renet, &ServerMessage::GameStarting);

        let seed = self.config.seed.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64
        });

        const NATIONS: [&str; 8] = [
            "Albion", "Verdania", "Ostmark", "Couronne", "Tirreno", "Norrland", "Iberis", "Vantua",
        ];
        let session_config = SessionConfig {
            width: self.config.map_width,
            height: self.config.map_height,
            seed,
            players: order
                .iter()
                .map(|seat| PlayerSpec {
                    name: self
                        .players
                        .get_player_name(*seat)
                        .unwrap_or_else(|| format!("Player {}", seat.0 + 1)),
                    nation: NATIONS[seat.0 as usize % NATIONS.len()].to_string(),
                    is_ai: false,
                })
                .collect(),
        };

        let rules = match load_rules(RulesSource::Embedded) {
            Ok(rules) => rules,
            Err(e) => {
                warn!("rules load failed: {e}");
                return;
            }
        };
        let mut session = GameSession::bootstrap(&session_config, rules, seed);

        for seat in &order {
            if let Some(client) = self.players.client_of(*seat) {
                dispatcher::sync_client(&mut self.renet, &mut session, client, *seat);
            }
        }

        self.maintained_turn = session.turn_number();
        self.session = Some(session);
        self.announce_turn();
    }

    fn handle_submit(&mut self, client_id: u64, action: Action) {
        let Some(seat) = self.players.get_player_by_client(client_id) else {
            warn!("Submission from unknown client {:?}", client_id);
            return;
        };
        let Some(session) = &mut self.session else {
            dispatcher::send(
                &mut self.renet,
                client_id,
                &ServerMessage::ActionRejected {
                    reason: windward_server::RejectReason::GameNotStarted,
                },
            );
            return;
        };

        let seat_before = session.current_player();
        match session.act(seat, action) {
            Ok(flush) => {
                dispatcher::deliver_flush(&mut self.renet, &self.players, session, &flush);
                let changed = session.current_player() != seat_before || session.is_over();
                self.announce_game_end();
                if changed {
                    self.announce_turn();
                }
            }
            Err(err) => {
                dispatcher::send(
                    &mut self.renet,
                    client_id,
                    &ServerMessage::ActionRejected {
                        reason: reject_reason(&err),
                    },
                );
            }
        }
    }

    fn handle_state_request(&mut self, client_id: u64) {
        let Some(seat) = self.players.get_player_by_client(client_id) else {
            return;
        };
        if let Some(session) = &mut self.session {
            dispatcher::sync_client(&mut self.renet, session, client_id, seat);
        }
    }

    fn handle_chat(&mut self, client_id: u64, message: String) {
        if let Some(from) = self.players.get_player_by_client(client_id) {
            dispatcher::broadcast(&mut self.renet, &ServerMessage::Chat { from, message });
        }
    }

    fn handle_ping(&mut self, client_id: u64, client_timestamp: u64) {
        let server_timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        dispatcher::send(
            &mut self.renet,
            client_id,
            &ServerMessage::Pong {
                client_timestamp,
                server_timestamp,
            },
        );
    }

    /// Countdown for the current seat: warnings, then a forced pass.
    fn process_turn_timers(&mut self) {
        let Some(session) = &self.session else { return };
        if session.is_over() {
            return;
        }
        let seat = session.current_player();
        // AI seats run on the planning budget, not the human timer.
        if session.is_ai(seat) || self.players.is_ai_controlled(seat) {
            return;
        }
        let turn = session.turn_number();
        let allotted = self
            .config
            .turn_timer
            .calculate_turn_time(session.unit_count(seat), session.settlement_count(seat));
        let remaining = allotted.saturating_sub(self.turn_started.elapsed());
        let remaining_secs = remaining.as_secs() as u32;

        for threshold in [30u32, 10] {
            if remaining_secs <= threshold && remaining_secs > 0 {
                let key = (seat, turn);
                let last = self
                    .timer_warnings_sent
                    .get(&key)
                    .copied()
                    .unwrap_or(u32::MAX);
                if last > threshold {
                    self.timer_warnings_sent.insert(key, threshold);
                    if let Some(client) = self.players.client_of(seat) {
                        dispatcher::send(
                            &mut self.renet,
                            client,
                            &ServerMessage::Notification {
                                notification: ServerNotification::TurnTimerWarning {
                                    seconds_remaining: remaining_secs,
                                },
                            },
                        );
                    }
                }
                break;
            }
        }

        if remaining.is_zero() {
            info!("Turn timer expired for {:?}", seat);
            self.force_end_turn(seat);
            self.timer_warnings_sent
                .retain(|(p, t), _| *p != seat || *t != turn);
        }
    }

    fn force_end_turn(&mut self, seat: PlayerId) {
        let Some(session) = &mut self.session else { return };
        if session.current_player() != seat {
            return;
        }
        let seat_before = seat;
        match session.act(seat, Action::EndTurn) {
            Ok(flush) => {
                dispatcher::deliver_flush(&mut self.renet, &self.players, session, &flush);
                let changed = session.current_player() != seat_before || session.is_over();
                self.announce_game_end();
                if changed {
                    self.announce_turn();
                }
            }
            Err(err) => warn!("forced end turn failed: {err}"),
        }
    }

    /// Let AI-controlled seats (built-in AI players and takeovers) play.
    /// Bounded per tick so an all-AI game cannot monopolize the loop.
    fn run_ai_turns(&mut self) {
        for _ in 0..8 {
            let Some(session) = &mut self.session else { return };
            if session.is_over() {
                return;
            }
            let seat = session.current_player();
            if !session.is_ai(seat) && !self.players.is_ai_controlled(seat) {
                return;
            }

            let state = session.sync(seat);
            let deadline = Instant::now() + self.config.ai_budget;
            let actions = ai::plan(&state, deadline);
            for action in actions {
                match session.act(seat, action) {
                    Ok(flush) => {
                        dispatcher::deliver_flush(&mut self.renet, &self.players, session, &flush)
                    }
                    Err(err) => {
                        // The planner worked from a filtered view; a
                        // rejection here is a pass, not a fault.
                        tracing::debug!(?seat, "AI action rejected: {err}");
                    }
                }
            }
            match session.act(seat, Action::EndTurn) {
                Ok(flush) => {
                    dispatcher::deliver_flush(&mut self.renet, &self.players, session, &flush);
                    self.announce_game_end();
                    self.announce_turn();
                }
                Err(err) => {
                    warn!(?seat, "AI end turn failed: {err}");
                    return;
                }
            }
        }
    }

    /// Once per new round: integrity sweep with auto-repair, autosave.
    fn run_round_maintenance(&mut self) {
        let Some(session) = &mut self.session else { return };
        let turn = session.turn_number();
        if turn <= self.maintained_turn {
            return;
        }
        self.maintained_turn = turn;

        let report = session.integrity_sweep(true);
        if !report.repaired.is_empty() || !report.broken.is_empty() {
            warn!(
                repaired = report.repaired.len(),
                broken = report.broken.len(),
                "integrity sweep found damage"
            );
        }

        if let Some(path) = &self.config.autosave_path {
            let save = session.to_save();
            if let Err(e) = windward_core::write_save(path, &save) {
                warn!("autosave failed: {e}");
            }
        }
    }

    fn announce_turn(&mut self) {
        let Some(session) = &self.session else { return };
        if session.is_over() {
            return;
        }
        let seat = session.current_player();
        let turn = session.turn_number();
        let time = self
            .config
            .turn_timer
            .calculate_turn_time(session.unit_count(seat), session.settlement_count(seat));
        self.turn_started = Instant::now();
        dispatcher::broadcast(
            &mut self.renet,
            &ServerMessage::TurnStarted {
                player: seat,
                turn,
                time_remaining_ms: time.as_millis() as u64,
            },
        );
    }

    fn announce_game_end(&mut self) {
        let Some(session) = &self.session else { return };
        if self.game_end_announced {
            return;
        }
        if let Some(result) = session.result() {
            self.game_end_announced = true;
            info!(?result, "game over");
            dispatcher::broadcast(
                &mut self.renet,
                &ServerMessage::GameEnded {
                    result: result.clone(),
                },
            );
        }
    }

    fn broadcast_lobby_state(&mut self) {
        let players = self.players.get_lobby_state();
        let host = self.players.host().unwrap_or(PlayerId(0));
        let (min_players, max_players) = (self.players.min_players(), self.players.max_players());
        dispatcher::broadcast(
            &mut self.renet,
            &ServerMessage::LobbyState {
                players,
                host,
                min_players,
                max_players,
            },
        );
    }

    fn renet_server(&mut self) -> &mut RenetServer {
        &mut self.renet
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("windward_server=info")
        .init();

    let config = ServerConfig::default();
    let mut server = Server::new(config.clone());

    let transport_config = windward_server::TransportConfig {
        public_address: config.bind_address,
        max_clients: config.max_players as usize,
        private_key: None, // Unsecure mode for development
    };

    let mut transport = match windward_server::ServerRunner::new(transport_config) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Failed to create transport: {}", e);
            std::process::exit(1);
        }
    };

    info!("Windward Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}", config.bind_address);
    info!("Protocol ID: {:016x}", windward_server::PROTOCOL_ID);

    let tick_duration = Duration::from_millis(16);
    loop {
        let start = Instant::now();

        transport.update(server.renet_server(), tick_duration);
        server.update(tick_duration);

        let elapsed = start.elapsed();
        if let Some(sleep_time) = tick_duration.checked_sub(elapsed) {
            std::thread::sleep(sleep_time);
        }
    }
}
