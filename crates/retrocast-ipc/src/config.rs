//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::TARGET_TICK_RATE;

/// Configuration for the streaming engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Path to the libretro core module. A missing file selects the stand-in core.
    pub core_path: PathBuf,

    /// Capture ticks per second.
    pub tick_rate: u32,

    /// Consecutive failed ticks before a session is demoted to failed.
    pub max_consecutive_tick_failures: u32,

    /// STUN/TURN urls handed to every peer connection.
    pub ice_servers: Vec<String>,

    /// How long a disconnected peer stays addressable, in seconds.
    pub ice_disconnect_grace_secs: u64,

    /// Sample rate of the peer audio track in Hz.
    pub peer_audio_sample_rate: u32,
}

impl EngineConfig {
    /// Nominal capture period.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.tick_rate.max(1)))
    }

    /// Grace period for disconnected peers.
    pub fn ice_disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.ice_disconnect_grace_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            core_path: PathBuf::from("/usr/lib/x86_64-linux-gnu/libretro/mgba_libretro.so"),
            tick_rate: TARGET_TICK_RATE,
            max_consecutive_tick_failures: 3,
            ice_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
            ],
            ice_disconnect_grace_secs: 30,
            peer_audio_sample_rate: 48_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tick_interval() {
        let config = EngineConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_nanos(16_666_666));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"tickRate":30}"#).unwrap();
        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.max_consecutive_tick_failures, 3);
        assert_eq!(config.ice_disconnect_grace(), Duration::from_secs(30));
    }
}
