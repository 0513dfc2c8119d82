use crate::config::AppConfig;
use crate::peer::{LocalMedia, Role, RtcTransportFactory};
use crate::room::{ConnectRoomClient, RoomClient};
use crate::session::Session;
use crate::signaling::WsChannelConnector;
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

const STREAM_ID: &str = "pairlink";

/// Create a room, join it and call.
pub async fn create_and_call(config: &AppConfig) -> anyhow::Result<()> {
    let rooms = Arc::new(ConnectRoomClient::new(config.api_url.clone()));
    let room_id = rooms.create_room().await.context("failed to create room")?;
    let peer_id = rooms
        .join_room(&room_id)
        .await
        .with_context(|| format!("failed to join room {room_id}"))?;
    println!("Room created: {room_id}");
    run_session(config, rooms, &room_id, &peer_id, Role::Caller).await
}

/// Join somebody else's room and answer.
pub async fn join_and_answer(config: &AppConfig, room_id: &str) -> anyhow::Result<()> {
    let rooms = Arc::new(ConnectRoomClient::new(config.api_url.clone()));
    let peer_id = rooms
        .join_room(room_id)
        .await
        .with_context(|| format!("failed to join room {room_id}"))?;
    run_session(config, rooms, room_id, &peer_id, Role::Callee).await
}

/// Runs one session until Ctrl-C or until the peer is lost.
async fn run_session(
    config: &AppConfig,
    rooms: Arc<ConnectRoomClient>,
    room_id: &str,
    peer_id: &str,
    role: Role,
) -> anyhow::Result<()> {
    let idle = Arc::new(Notify::new());
    let session = Session::new(
        Arc::new(RtcTransportFactory::new(config.ice_servers.clone())),
        rooms,
        Arc::new(WsChannelConnector::new(config.signaling_url.clone())),
        {
            let idle = Arc::clone(&idle);
            Arc::new(move || idle.notify_one())
        },
    );
    session.on_remote_track(Arc::new(|track| {
        info!(kind = ?track.kind, track_id = %track.track_id, "receiving remote media");
    }));

    session
        .start(room_id, peer_id, role, &LocalMedia::audio_video(STREAM_ID))
        .await
        .context("failed to start session")?;
    println!("Joined room {room_id} as {peer_id}, waiting for the other peer (Ctrl-C to leave)");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted, leaving room"),
        _ = idle.notified() => println!("The other peer left."),
    }

    session.stop().await;
    Ok(())
}
