//! Command-line configuration.

use std::path::PathBuf;

use clap::Parser;

use retrocast_ipc::EngineConfig;

/// retrocast streaming server.
#[derive(Debug, Clone, Parser)]
#[command(name = "retrocast", version, about)]
pub struct Args {
    /// Address to listen on.
    #[arg(long, env = "RETROCAST_BIND", default_value = "0.0.0.0:8080")]
    pub bind: String,

    /// Libretro core module. A missing file selects the stand-in core.
    #[arg(long, env = "RETROCAST_CORE_PATH")]
    pub core_path: Option<PathBuf>,

    /// STUN/TURN urls for peer connections, comma separated.
    #[arg(long, env = "RETROCAST_STUN", value_delimiter = ',')]
    pub stun: Vec<String>,

    /// Capture ticks per second.
    #[arg(long, default_value_t = retrocast_ipc::TARGET_TICK_RATE)]
    pub tick_rate: u32,

    /// Seconds a disconnected peer is kept before it is closed.
    #[arg(long, default_value_t = 30)]
    pub ice_grace_secs: u64,
}

impl Args {
    /// Build the engine configuration, keeping defaults for anything unset.
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig {
            tick_rate: self.tick_rate.max(1),
            ice_disconnect_grace_secs: self.ice_grace_secs,
            ..Default::default()
        };
        if let Some(path) = &self.core_path {
            config.core_path = path.clone();
        }
        let stun: Vec<String> = self
            .stun
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if !stun.is_empty() {
            config.ice_servers = stun;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["retrocast"]);
        let config = args.engine_config();
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.ice_disconnect_grace_secs, 30);
        assert_eq!(config.ice_servers, EngineConfig::default().ice_servers);
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "retrocast",
            "--core-path",
            "/tmp/core.so",
            "--stun",
            "stun:a.example:3478, stun:b.example:3478",
            "--tick-rate",
            "30",
        ]);
        let config = args.engine_config();
        assert_eq!(config.core_path, PathBuf::from("/tmp/core.so"));
        assert_eq!(
            config.ice_servers,
            vec!["stun:a.example:3478", "stun:b.example:3478"]
        );
        assert_eq!(config.tick_rate, 30);
    }
}
