pub mod connection;
pub mod ice;
pub mod state;
pub mod transport;
pub mod types;

pub use connection::{RtcTransport, RtcTransportFactory};
pub use ice::RemoteDescriptionGate;
pub use state::{Role, SessionPhase};
pub use transport::{
    ConnectivityState, LocalMedia, LocalTrack, MediaKind, MediaTransport, RemoteTrack,
    TransportEvent, TransportEvents, TransportFactory,
};
pub use types::{
    decode_description_type, IceCandidateRecord, SdpType, ServerConfig, SessionDescriptionRecord,
    SignalingEvent,
};
