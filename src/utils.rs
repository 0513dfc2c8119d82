use crate::peer::types::ServerConfig;
use rand::Rng;
use url::Url;

/// Short hex id used to tell session lifetimes apart in logs.
pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

/// Prefixes `stun:`/`turn:` when the configured URL has no scheme.
pub fn add_ice_url_scheme(config: &ServerConfig) -> String {
    if config.url.starts_with("turn:") || config.url.starts_with("stun:") {
        config.url.clone()
    } else {
        let scheme = if config.r#type == "turn" {
            "turn:"
        } else {
            "stun:"
        };
        format!("{}{}", scheme, config.url)
    }
}

/// Signaling channel address for one peer of one room.
pub fn channel_url(base: &Url, room_id: &str, peer_id: &str) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut()
        .append_pair("roomId", room_id)
        .append_pair("peerId", peer_id);
    url
}
