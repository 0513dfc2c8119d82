use crate::error::RegistrationError;
use crate::peer::types::{IceCandidateRecord, SessionDescriptionRecord};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

pub type RoomId = String;
pub type PeerId = String;

/// Control plane of the signaling server.
#[async_trait]
pub trait RoomClient: Send + Sync {
    async fn create_room(&self) -> Result<RoomId, RegistrationError>;

    async fn join_room(&self, room_id: &str) -> Result<PeerId, RegistrationError>;

    async fn push_description(
        &self,
        room_id: &str,
        peer_id: &str,
        description: &SessionDescriptionRecord,
    ) -> Result<(), RegistrationError>;

    async fn push_candidate(
        &self,
        room_id: &str,
        peer_id: &str,
        candidate: &IceCandidateRecord,
    ) -> Result<(), RegistrationError>;
}

const SERVICE_PATH: &str = "app.v1.AppService";

/// Room client speaking the Connect protocol (unary calls, JSON bodies).
pub struct ConnectRoomClient {
    http: reqwest::Client,
    base: Url,
}

impl ConnectRoomClient {
    pub fn new(base: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base,
        }
    }

    fn method_url(&self, method: &str) -> Result<Url, RegistrationError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| RegistrationError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?;
            segments.pop_if_empty();
            segments.push(SERVICE_PATH);
            segments.push(method);
        }
        Ok(url)
    }

    async fn call<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp, RegistrationError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = self.method_url(method)?;
        debug!(%url, "room service call");
        let response = self.http.post(url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body: RpcErrorBody = response.json().await.unwrap_or_default();
            return Err(RegistrationError::Rpc {
                status: status.as_u16(),
                code: body.code,
                message: body.message,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl RoomClient for ConnectRoomClient {
    async fn create_room(&self) -> Result<RoomId, RegistrationError> {
        let response: CreateRoomResponse = self.call("CreateRoom", &Empty {}).await?;
        Ok(response.room_id)
    }

    async fn join_room(&self, room_id: &str) -> Result<PeerId, RegistrationError> {
        let response: JoinRoomResponse = self.call("JoinRoom", &JoinRoomRequest { room_id }).await?;
        Ok(response.peer_id)
    }

    async fn push_description(
        &self,
        room_id: &str,
        peer_id: &str,
        description: &SessionDescriptionRecord,
    ) -> Result<(), RegistrationError> {
        let request = UploadSessionDescriptionRequest {
            room_id,
            peer_id,
            session_description: description.into(),
        };
        let _: Empty = self.call("UploadSessionDescription", &request).await?;
        Ok(())
    }

    async fn push_candidate(
        &self,
        room_id: &str,
        peer_id: &str,
        candidate: &IceCandidateRecord,
    ) -> Result<(), RegistrationError> {
        let request = UploadIceCandidateRequest {
            room_id,
            peer_id,
            ice_candidate: candidate.into(),
        };
        let _: Empty = self.call("UploadIceCandidate", &request).await?;
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Default)]
struct Empty {}

#[derive(Deserialize, Default)]
struct RpcErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRoomResponse {
    #[serde(default)]
    room_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JoinRoomRequest<'a> {
    room_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinRoomResponse {
    #[serde(default)]
    peer_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadSessionDescriptionRequest<'a> {
    room_id: &'a str,
    peer_id: &'a str,
    session_description: RpcSessionDescription<'a>,
}

/// Absent fields are left out on this path rather than sent as "".
#[derive(Serialize)]
struct RpcSessionDescription<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    sdp: Option<&'a str>,
    #[serde(rename = "type")]
    kind: i32,
}

impl<'a> From<&'a SessionDescriptionRecord> for RpcSessionDescription<'a> {
    fn from(record: &'a SessionDescriptionRecord) -> Self {
        Self {
            sdp: record.sdp.as_deref(),
            kind: record.kind.code(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadIceCandidateRequest<'a> {
    room_id: &'a str,
    peer_id: &'a str,
    ice_candidate: RpcIceCandidate<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RpcIceCandidate<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    candidate: Option<&'a str>,
    #[serde(rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    sdp_mline_index: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sdp_mid: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username_fragment: Option<&'a str>,
}

impl<'a> From<&'a IceCandidateRecord> for RpcIceCandidate<'a> {
    fn from(record: &'a IceCandidateRecord) -> Self {
        Self {
            candidate: Some(record.candidate.as_str()).filter(|c| !c.is_empty()),
            sdp_mline_index: record.sdp_mline_index,
            sdp_mid: record.sdp_mid.as_deref(),
            username_fragment: record.username_fragment.as_deref(),
        }
    }
}
