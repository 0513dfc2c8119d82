pub mod commands;
pub mod config;
pub mod error;
pub mod logger;
pub mod peer;
pub mod room;
pub mod session;
pub mod signaling;
pub mod utils;

pub use error::{DecodeError, RegistrationError, SessionError, SignalingError, TransportError};
pub use session::{IdleCallback, RemoteTrackCallback, Session};

use commands::{room_api, Cli, Command};
use config::AppConfig;

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    logger::init();

    let config = AppConfig::load(&cli.api_url, &cli.signaling_url, cli.ice_servers.as_deref())?;

    match cli.command {
        Command::Create => room_api::create_and_call(&config).await,
        Command::Join { room_id } => room_api::join_and_answer(&config, &room_id).await,
    }
}
