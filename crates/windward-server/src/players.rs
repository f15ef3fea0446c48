//! Unified player management combining lobby and connection state.
//!
//! One structure owns the whole player lifecycle so joins, reconnects
//! and AI takeovers cannot race each other.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::distributions::Alphanumeric;
use rand::Rng;

use windward_protocol::PlayerId;

use crate::protocol::LobbyPlayer;

/// Player lifecycle state
#[derive(Clone, Debug)]
pub enum PlayerState {
    /// In lobby, waiting for game to start
    InLobby { ready: bool },
    /// Connected and playing
    Playing { last_activity: Instant },
    /// Disconnected during game, in grace period
    Disconnected { disconnected_at: Instant },
    /// AI has taken over after grace period
    AiControlled { takeover_at: Instant },
}

#[derive(Clone, Debug)]
pub struct Player {
    pub player: PlayerId,
    pub name: String,
    pub client_id: Option<u64>,
    pub reconnect_token: String,
    pub state: PlayerState,
    /// Rate limiting: message count in current window
    message_count: u32,
    rate_window_start: Instant,
}

/// Errors when adding a player
#[derive(Clone, Debug, thiserror::Error)]
pub enum AddPlayerError {
    #[error("Game is full")]
    GameFull,
    #[error("Game already started")]
    GameInProgress,
    #[error("Player already exists")]
    AlreadyExists,
}

/// Errors when reconnecting
#[derive(Clone, Debug, thiserror::Error)]
pub enum ReconnectError {
    #[error("Invalid reconnect token")]
    InvalidToken,
    #[error("Player already connected")]
    AlreadyConnected,
    #[error("Cannot reconnect during lobby")]
    NotInGame,
}

/// Errors for lobby operations
#[derive(Clone, Debug, thiserror::Error)]
pub enum LobbyError {
    #[error("Game already started")]
    GameAlreadyStarted,
    #[error("Player not in lobby")]
    PlayerNotFound,
    #[error("Cannot start: not enough players or not all ready")]
    CannotStart,
}

pub struct PlayerManager {
    players: HashMap<PlayerId, Player>,
    client_to_player: HashMap<u64, PlayerId>,
    tokens: HashMap<String, PlayerId>,
    host: Option<PlayerId>,
    game_started: bool,
    min_players: u8,
    max_players: u8,
    disconnect_grace: Duration,
    rate_limit_messages: u32,
    rate_limit_window: Duration,
}

impl PlayerManager {
    pub fn new(min_players: u8, max_players: u8, disconnect_grace: Duration) -> Self {
        Self {
            players: HashMap::new(),
            client_to_player: HashMap::new(),
            tokens: HashMap::new(),
            host: None,
            game_started: false,
            min_players,
            max_players,
            disconnect_grace,
            rate_limit_messages: 60,
            rate_limit_window: Duration::from_secs(1),
        }
    }

    /// Add a new player, allocating the next free seat.
    pub fn add_player(
        &mut self,
        client_id: u64,
        name: String,
    ) -> Result<(PlayerId, String), AddPlayerError> {
        if self.game_started {
            return Err(AddPlayerError::GameInProgress);
        }
        if self.players.len() >= self.max_players as usize {
            return Err(AddPlayerError::GameFull);
        }
        if self.client_to_player.contains_key(&client_id) {
            return Err(AddPlayerError::AlreadyExists);
        }

        let player_id = self.next_player_id();
        let token = generate_token();
        let now = Instant::now();

        self.players.insert(
            player_id,
            Player {
                player: player_id,
                name,
                client_id: Some(client_id),
                reconnect_token: token.clone(),
                state: PlayerState::InLobby { ready: false },
                message_count: 0,
                rate_window_start: now,
            },
        );
        self.client_to_player.insert(client_id, player_id);
        self.tokens.insert(token.clone(), player_id);

        if self.host.is_none() {
            self.host = Some(player_id);
        }

        Ok((player_id, token))
    }

    fn next_player_id(&self) -> PlayerId {
        let mut id = 0u8;
        while self.players.contains_key(&PlayerId(id)) {
            id += 1;
        }
        PlayerId(id)
    }

    /// Reconnect a player using their token
    pub fn reconnect(&mut self, client_id: u64, token: &str) -> Result<PlayerId, ReconnectError> {
        let player_id = self
            .tokens
            .get(token)
            .copied()
            .ok_or(ReconnectError::InvalidToken)?;

        let player = self
            .players
            .get_mut(&player_id)
            .ok_or(ReconnectError::InvalidToken)?;

        match &player.state {
            PlayerState::InLobby { .. } => Err(ReconnectError::NotInGame),
            PlayerState::Playing { .. } => Err(ReconnectError::AlreadyConnected),
            PlayerState::Disconnected { .. } | PlayerState::AiControlled { .. } => {
                player.state = PlayerState::Playing {
                    last_activity: Instant::now(),
                };
                player.client_id = Some(client_id);
                self.client_to_player.insert(client_id, player_id);
                Ok(player_id)
            }
        }
    }

    /// Handle client disconnect; in the lobby the seat is released, in
    /// game it enters the grace period.
    pub fn disconnect(&mut self, client_id: u64) -> Option<PlayerId> {
        let player_id = self.client_to_player.remove(&client_id)?;
        let player = self.players.get_mut(&player_id)?;

        match &player.state {
            PlayerState::InLobby { .. } => {
                self.tokens.remove(&player.reconnect_token);
                self.players.remove(&player_id);
                if self.host == Some(player_id) {
                    self.host = self.players.keys().min().copied();
                }
            }
            _ => {
                player.client_id = None;
                player.state = PlayerState::Disconnected {
                    disconnected_at: Instant::now(),
                };
            }
        }
        Some(player_id)
    }

    /// Promote expired disconnections to AI control. Returns the seats
    /// that were just taken over.
    pub fn process_disconnections(&mut self) -> Vec<PlayerId> {
        let grace = self.disconnect_grace;
        let mut takeovers = Vec::new();
        for player in self.players.values_mut() {
            if let PlayerState::Disconnected { disconnected_at } = player.state {
                if disconnected_at.elapsed() >= grace {
                    player.state = PlayerState::AiControlled {
                        takeover_at: Instant::now(),
                    };
                    takeovers.push(player.player);
                }
            }
        }
        takeovers.sort();
        takeovers
    }

    /// Sliding-window rate limit per connection.
    pub fn check_rate_limit(&mut self, client_id: u64) -> bool {
        let Some(player_id) = self.client_to_player.get(&client_id).copied() else {
            // Unknown clients get one window's worth of join traffic.
            return true;
        };
        let Some(player) = self.players.get_mut(&player_id) else {
            return true;
        };

        let now = Instant::now();
        if now.duration_since(player.rate_window_start) >= self.rate_limit_window {
            player.rate_window_start = now;
            player.message_count = 0;
        }
        player.message_count += 1;
        player.message_count <= self.rate_limit_messages
    }

    pub fn update_activity(&mut self, client_id: u64) {
        if let Some(player_id) = self.client_to_player.get(&client_id) {
            if let Some(player) = self.players.get_mut(player_id) {
                if let PlayerState::Playing { last_activity } = &mut player.state {
                    *last_activity = Instant::now();
                }
            }
        }
    }

    pub fn set_ready(&mut self, player_id: PlayerId, ready: bool) -> Result<(), LobbyError> {
        if self.game_started {
            return Err(LobbyError::GameAlreadyStarted);
        }
        let player = self
            .players
            .get_mut(&player_id)
            .ok_or(LobbyError::PlayerNotFound)?;
        match &mut player.state {
            PlayerState::InLobby { ready: r } => {
                *r = ready;
                Ok(())
            }
            _ => Err(LobbyError::PlayerNotFound),
        }
    }

    pub fn can_start(&self) -> bool {
        !self.game_started
            && self.players.len() >= self.min_players as usize
            && self
                .players
                .values()
                .all(|p| matches!(p.state, PlayerState::InLobby { ready: true }))
    }

    /// Atomically move everyone from lobby to playing. Returns the fixed
    /// join order the session is built with.
    pub fn start_game(&mut self) -> Result<Vec<PlayerId>, LobbyError> {
        if !self.can_start() {
            return Err(LobbyError::CannotStart);
        }
        self.game_started = true;
        let now = Instant::now();
        for player in self.players.values_mut() {
            player.state = PlayerState::Playing { last_activity: now };
        }
        let mut order: Vec<PlayerId> = self.players.keys().copied().collect();
        order.sort();
        Ok(order)
    }

    pub fn has_started(&self) -> bool {
        self.game_started
    }

    pub fn is_host(&self, player_id: PlayerId) -> bool {
        self.host == Some(player_id)
    }

    pub fn host(&self) -> Option<PlayerId> {
        self.host
    }

    pub fn min_players(&self) -> u8 {
        self.min_players
    }

    pub fn max_players(&self) -> u8 {
        self.max_players
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn get_player(&self, player_id: PlayerId) -> Option<&Player> {
        self.players.get(&player_id)
    }

    pub fn get_player_name(&self, player_id: PlayerId) -> Option<String> {
        self.players.get(&player_id).map(|p| p.name.clone())
    }

    pub fn get_player_by_client(&self, client_id: u64) -> Option<PlayerId> {
        self.client_to_player.get(&client_id).copied()
    }

    pub fn client_of(&self, player_id: PlayerId) -> Option<u64> {
        self.players.get(&player_id).and_then(|p| p.client_id)
    }

    pub fn is_connected(&self, player_id: PlayerId) -> bool {
        self.players
            .get(&player_id)
            .is_some_and(|p| matches!(p.state, PlayerState::Playing { .. }))
    }

    pub fn is_ai_controlled(&self, player_id: PlayerId) -> bool {
        self.players
            .get(&player_id)
            .is_some_and(|p| matches!(p.state, PlayerState::AiControlled { .. }))
    }

    pub fn get_lobby_state(&self) -> Vec<LobbyPlayer> {
        let mut list: Vec<LobbyPlayer> = self
            .players
            .values()
            .map(|p| LobbyPlayer {
                player: p.player,
                name: p.name.clone(),
                ready: matches!(p.state, PlayerState::InLobby { ready: true }),
                is_host: self.host == Some(p.player),
            })
            .collect();
        list.sort_by_key(|p| p.player);
        list
    }
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seats_allocate_in_join_order() {
        let mut players = PlayerManager::new(2, 4, Duration::from_secs(60));
        let (p1, token) = players.add_player(100, "Alice".into()).unwrap();
        let (p2, _) = players.add_player(101, "Bob".into()).unwrap();
        assert_eq!(p1, PlayerId(0));
        assert_eq!(p2, PlayerId(1));
        assert!(!token.is_empty());
        assert!(players.is_host(p1));
    }

    #[test]
    fn start_requires_everyone_ready() {
        let mut players = PlayerManager::new(2, 4, Duration::from_secs(60));
        let (p1, _) = players.add_player(100, "Alice".into()).unwrap();
        let (p2, _) = players.add_player(101, "Bob".into()).unwrap();

        assert!(!players.can_start());
        players.set_ready(p1, true).unwrap();
        assert!(!players.can_start());
        players.set_ready(p2, true).unwrap();
        assert!(players.can_start());

        let order = players.start_game().unwrap();
        assert_eq!(order, vec![PlayerId(0), PlayerId(1)]);
        assert!(players.has_started());
    }

    #[test]
    fn reconnection_with_token() {
        let mut players = PlayerManager::new(2, 4, Duration::from_secs(60));
        let (p1, token) = players.add_player(100, "Alice".into()).unwrap();
        let (p2, _) = players.add_player(101, "Bob".into()).unwrap();
        players.set_ready(p1, true).unwrap();
        players.set_ready(p2, true).unwrap();
        players.start_game().unwrap();

        assert_eq!(players.disconnect(100), Some(p1));
        assert!(!players.is_connected(p1));

        let reconnected = players.reconnect(200, &token).unwrap();
        assert_eq!(reconnected, p1);
        assert!(players.is_connected(p1));
    }

    #[test]
    fn ai_takeover_after_grace() {
        let mut players = PlayerManager::new(2, 4, Duration::from_millis(20));
        let (p1, _) = players.add_player(100, "Alice".into()).unwrap();
        let (p2, _) = players.add_player(101, "Bob".into()).unwrap();
        players.set_ready(p1, true).unwrap();
        players.set_ready(p2, true).unwrap();
        players.start_game().unwrap();

        players.disconnect(100);
        assert!(players.process_disconnections().is_empty());

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(players.process_disconnections(), vec![p1]);
        assert!(players.is_ai_controlled(p1));
    }

    #[test]
    fn host_reassigned_when_lobby_host_leaves() {
        let mut players = PlayerManager::new(2, 4, Duration::from_secs(60));
        let (p1, _) = players.add_player(100, "Alice".into()).unwrap();
        let (p2, _) = players.add_player(101, "Bob".into()).unwrap();
        assert!(players.is_host(p1));

        players.disconnect(100);
        assert!(players.is_host(p2));
    }

    #[test]
    fn rate_limit_enforced() {
        let mut players = PlayerManager::new(2, 4, Duration::from_secs(60));
        players.add_player(100, "Alice".into()).unwrap();

        for i in 0..100 {
            let allowed = players.check_rate_limit(100);
            if i < 60 {
                assert!(allowed, "message {i} should be allowed");
            } else {
                assert!(!allowed, "message {i} should be limited");
            }
        }
    }

    #[test]
    fn cannot_join_started_game() {
        let mut players = PlayerManager::new(2, 4, Duration::from_secs(60));
        let (p1, _) = players.add_player(100, "Alice".into()).unwrap();
        let (p2, _) = players.add_player(101, "Bob".into()).unwrap();
        players.set_ready(p1, true).unwrap();
        players.set_ready(p2, true).unwrap();
        players.start_game().unwrap();

        assert!(matches!(
            players.add_player(102, "Carol".into()),
            Err(AddPlayerError::GameInProgress)
        ));
    }
}
