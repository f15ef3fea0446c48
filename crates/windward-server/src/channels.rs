//! Renet channel configuration.
//!
//! Channel 0: ReliableOrdered - actions, state sync, change batches
//! Channel 1: ReliableUnordered - chat, notifications
//! Channel 2: Unreliable - ping/heartbeat
//!
//! Change batches ride the ordered channel: batches for successive
//! operations reach a given observer in production order, and one batch
//! arrives as one message.

use std::time::Duration;

use renet::ChannelConfig;

/// Channel IDs for different message types
pub mod channel_id {
    /// Actions and game state - must arrive in order
    pub const COMMANDS: u8 = 0;
    /// Chat and notifications - reliable but order less critical
    pub const CHAT: u8 = 1;
    /// Ping/keepalive - can be lost
    pub const HEARTBEAT: u8 = 2;
}

/// Maximum buffered bytes per channel; a slow client hits this before it
/// can stall the simulation.
const MAX_CHANNEL_MEMORY: usize = 5 * 1024 * 1024;

pub fn create_channel_configs() -> Vec<ChannelConfig> {
    vec![
        ChannelConfig {
            channel_id: channel_id::COMMANDS,
            max_memory_usage_bytes: MAX_CHANNEL_MEMORY,
            send_type: renet::SendType::ReliableOrdered {
                resend_time: Duration::from_millis(300),
            },
        },
        ChannelConfig {
            channel_id: channel_id::CHAT,
            max_memory_usage_bytes: MAX_CHANNEL_MEMORY / 2,
            send_type: renet::SendType::ReliableUnordered {
                resend_time: Duration::from_millis(300),
            },
        },
        ChannelConfig {
            channel_id: channel_id::HEARTBEAT,
            max_memory_usage_bytes: 64 * 1024,
            send_type: renet::SendType::Unreliable,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_configs_are_valid() {
        let configs = create_channel_configs();
        assert_eq!(configs.len(), 3);
        assert_eq!(configs[0].channel_id, channel_id::COMMANDS);
        assert_eq!(configs[1].channel_id, channel_id::CHAT);
        assert_eq!(configs[2].channel_id, channel_id::HEARTBEAT);
    }
}
