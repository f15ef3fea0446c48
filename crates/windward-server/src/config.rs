//! Server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the server
    pub bind_address: SocketAddr,
    /// Minimum players to start (2-8)
    pub min_players: u8,
    /// Maximum players allowed (2-8)
    pub max_players: u8,
    /// Grace period before AI takeover on disconnect
    pub disconnect_grace: Duration,
    /// Turn timer settings
    pub turn_timer: TurnTimerConfig,
    /// Map dimensions for the bootstrap generator
    pub map_width: u32,
    pub map_height: u32,
    /// Fixed seed; the wall clock seeds the game when unset
    pub seed: Option<u64>,
    /// Budget for one AI player's planning; overrun means pass
    pub ai_budget: Duration,
    /// Autosave target written at every new round
    pub autosave_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7878".parse().expect("static address"),
            min_players: 2,
            max_players: 8,
            disconnect_grace: Duration::from_secs(60),
            turn_timer: TurnTimerConfig::default(),
            map_width: 40,
            map_height: 28,
            seed: None,
            ai_budget: Duration::from_secs(2),
            autosave_path: None,
        }
    }
}

/// Turn timer configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TurnTimerConfig {
    /// Base time per turn in seconds
    pub base_time_secs: u32,
    /// Bonus seconds per active unit (capped)
    pub unit_bonus_secs: u32,
    pub unit_bonus_cap_secs: u32,
    /// Bonus seconds per settlement (capped)
    pub settlement_bonus_secs: u32,
    pub settlement_bonus_cap_secs: u32,
    /// Maximum total turn time
    pub max_time_secs: u32,
}

impl Default for TurnTimerConfig {
    fn default() -> Self {
        Self {
            base_time_secs: 60,
            unit_bonus_secs: 2,
            unit_bonus_cap_secs: 60,
            settlement_bonus_secs: 5,
            settlement_bonus_cap_secs: 30,
            max_time_secs: 300,
        }
    }
}

impl TurnTimerConfig {
    /// Calculate turn time for a player given their asset counts
    pub fn calculate_turn_time(&self, unit_count: u32, settlement_count: u32) -> Duration {
        let unit_bonus = (unit_count * self.unit_bonus_secs).min(self.unit_bonus_cap_secs);
        let settlement_bonus =
            (settlement_count * self.settlement_bonus_secs).min(self.settlement_bonus_cap_secs);
        let total = (self.base_time_secs + unit_bonus + settlement_bonus).min(self.max_time_secs);
        Duration::from_secs(total as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_timer_calculation() {
        let config = TurnTimerConfig::default();

        // Early game: 3 units, 1 settlement
        let time = config.calculate_turn_time(3, 1);
        assert_eq!(time.as_secs(), 60 + 6 + 5);

        // Late game: bonuses cap out before the total does
        let time = config.calculate_turn_time(40, 10);
        assert_eq!(time.as_secs(), (60 + 60 + 30).min(300) as u64);
    }
}
