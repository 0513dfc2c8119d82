use crate::error::DecodeError;
use serde::{Deserialize, Serialize};

/// SDP type as carried on the wire. The numeric codes are fixed by the
/// signaling server and are not sequential with the declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdpType {
    Unspecified,
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

impl SdpType {
    pub fn code(self) -> i32 {
        match self {
            SdpType::Unspecified => 0,
            SdpType::Answer => 1,
            SdpType::Offer => 2,
            SdpType::Pranswer => 3,
            SdpType::Rollback => 4,
        }
    }
}

/// Maps a wire code to an SDP type. `0` (unspecified) is not accepted from
/// the wire.
pub fn decode_description_type(code: i64) -> Result<SdpType, DecodeError> {
    match code {
        1 => Ok(SdpType::Answer),
        2 => Ok(SdpType::Offer),
        3 => Ok(SdpType::Pranswer),
        4 => Ok(SdpType::Rollback),
        other => Err(DecodeError::UnknownDescriptionType(other)),
    }
}

/// Session description exchanged with the remote peer. An empty SDP string
/// is stored as `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescriptionRecord {
    pub sdp: Option<String>,
    pub kind: SdpType,
}

impl SessionDescriptionRecord {
    pub fn new(kind: SdpType, sdp: impl Into<String>) -> Self {
        Self {
            sdp: present(Some(sdp.into())),
            kind,
        }
    }
}

/// ICE candidate exchanged with the remote peer. Empty optional fields are
/// stored as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IceCandidateRecord {
    pub candidate: String,
    pub sdp_mline_index: Option<u16>,
    pub sdp_mid: Option<String>,
    pub username_fragment: Option<String>,
}

/// One inbound message of the signaling channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingEvent {
    Description(SessionDescriptionRecord),
    Candidate(IceCandidateRecord),
    CandidatesBatch(Vec<IceCandidateRecord>),
    /// A `message` tag this client does not understand; discarded.
    Unknown,
}

impl SignalingEvent {
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        match serde_json::from_str::<WireEvent>(text)? {
            WireEvent::Description { description } => {
                Ok(SignalingEvent::Description(description.try_into()?))
            }
            WireEvent::Candidate { candidate } => {
                Ok(SignalingEvent::Candidate(candidate.try_into()?))
            }
            WireEvent::Candidates { candidates } => candidates
                .into_iter()
                .map(IceCandidateRecord::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(SignalingEvent::CandidatesBatch),
            WireEvent::Unknown => Ok(SignalingEvent::Unknown),
        }
    }

    /// Encodes in the channel format: absent fields become empty strings.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let wire = match self {
            SignalingEvent::Description(description) => WireEvent::Description {
                description: description.into(),
            },
            SignalingEvent::Candidate(candidate) => WireEvent::Candidate {
                candidate: candidate.into(),
            },
            SignalingEvent::CandidatesBatch(candidates) => WireEvent::Candidates {
                candidates: candidates.iter().map(WireCandidate::from).collect(),
            },
            SignalingEvent::Unknown => WireEvent::Unknown,
        };
        serde_json::to_string(&wire)
    }
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "message", rename_all = "lowercase")]
enum WireEvent {
    Description {
        description: WireDescription,
    },
    Candidate {
        candidate: WireCandidate,
    },
    Candidates {
        candidates: Vec<WireCandidate>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug)]
struct WireDescription {
    #[serde(default)]
    sdp: Option<String>,
    #[serde(rename = "type")]
    kind: i64,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    #[serde(default)]
    candidate: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    sdp_mline_index: Option<WireIndex>,
    #[serde(default)]
    sdp_mid: Option<String>,
    #[serde(default)]
    username_fragment: Option<String>,
}

/// The server relays the line index as a string; some peers send a number.
#[derive(Serialize, Deserialize, Debug)]
#[serde(untagged)]
enum WireIndex {
    Number(u64),
    Text(String),
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl TryFrom<WireDescription> for SessionDescriptionRecord {
    type Error = DecodeError;

    fn try_from(wire: WireDescription) -> Result<Self, Self::Error> {
        Ok(Self {
            sdp: present(wire.sdp),
            kind: decode_description_type(wire.kind)?,
        })
    }
}

impl From<&SessionDescriptionRecord> for WireDescription {
    fn from(record: &SessionDescriptionRecord) -> Self {
        Self {
            sdp: Some(record.sdp.clone().unwrap_or_default()),
            kind: i64::from(record.kind.code()),
        }
    }
}

impl TryFrom<WireCandidate> for IceCandidateRecord {
    type Error = DecodeError;

    fn try_from(wire: WireCandidate) -> Result<Self, Self::Error> {
        let sdp_mline_index = match wire.sdp_mline_index {
            None => None,
            Some(WireIndex::Text(text)) if text.is_empty() => None,
            Some(WireIndex::Text(text)) => Some(
                text.parse::<u16>()
                    .map_err(|_| DecodeError::InvalidMLineIndex(text))?,
            ),
            Some(WireIndex::Number(n)) => Some(
                u16::try_from(n).map_err(|_| DecodeError::InvalidMLineIndex(n.to_string()))?,
            ),
        };
        Ok(Self {
            candidate: wire.candidate.unwrap_or_default(),
            sdp_mline_index,
            sdp_mid: present(wire.sdp_mid),
            username_fragment: present(wire.username_fragment),
        })
    }
}

impl From<&IceCandidateRecord> for WireCandidate {
    fn from(record: &IceCandidateRecord) -> Self {
        Self {
            candidate: Some(record.candidate.clone()),
            sdp_mline_index: Some(WireIndex::Text(
                record
                    .sdp_mline_index
                    .map(|index| index.to_string())
                    .unwrap_or_default(),
            )),
            sdp_mid: Some(record.sdp_mid.clone().unwrap_or_default()),
            username_fragment: Some(record.username_fragment.clone().unwrap_or_default()),
        }
    }
}

/// ICE server entry as stored in the user's server list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub id: String,
    pub r#type: String, // 'stun' or 'turn'
    pub url: String,
    pub username: Option<String>,
    pub credential: Option<String>,
}
