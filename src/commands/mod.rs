pub mod room_api;

use crate::config::{DEFAULT_API_URL, DEFAULT_SIGNALING_URL};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pairlink", version, about = "Two-party WebRTC calls over a room signaling server")]
pub struct Cli {
    /// Base URL of the room service
    #[arg(long, env = "PAIRLINK_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// WebSocket endpoint of the signaling channel
    #[arg(long, env = "PAIRLINK_SIGNALING_URL", default_value = DEFAULT_SIGNALING_URL)]
    pub signaling_url: String,

    /// JSON file with the ICE server list
    #[arg(long, env = "PAIRLINK_ICE_SERVERS")]
    pub ice_servers: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a room and call whoever joins it
    Create,
    /// Join an existing room and answer its caller
    Join {
        room_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_join() {
        let cli = Cli::try_parse_from(["pairlink", "--api-url", "http://rooms.test", "join", "r1"]).unwrap();
        assert_eq!(cli.api_url, "http://rooms.test");
        assert_eq!(cli.signaling_url, DEFAULT_SIGNALING_URL);
        assert!(matches!(cli.command, Command::Join { room_id } if room_id == "r1"));
    }

    #[test]
    fn join_needs_a_room() {
        assert!(Cli::try_parse_from(["pairlink", "join"]).is_err());
    }
}
