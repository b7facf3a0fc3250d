//! OBS WebSocket v5 message types.
//!
//! Every frame is a JSON envelope `{"op": <opcode>, "d": <payload>}`. Only the
//! subset the marker server speaks is modelled here.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ObsError, ObsResult};

pub const RPC_VERSION: u32 = 1;

/// `EventSubscription::Outputs`
pub const EVENT_SUBSCRIPTION_OUTPUTS: u32 = 1 << 6;

pub const GET_RECORD_STATUS: &str = "GetRecordStatus";
pub const RECORD_STATE_CHANGED: &str = "RecordStateChanged";

/// Opcodes.
pub mod op {
    pub const HELLO: u8 = 0;
    pub const IDENTIFY: u8 = 1;
    pub const IDENTIFIED: u8 = 2;
    pub const EVENT: u8 = 5;
    pub const REQUEST: u8 = 6;
    pub const REQUEST_RESPONSE: u8 = 7;
}

// ============================================================================
// Server -> client
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope {
    op: u8,
    #[serde(default)]
    d: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default)]
    pub obs_web_socket_version: Option<String>,
    pub rpc_version: u32,
    #[serde(default)]
    pub authentication: Option<AuthChallenge>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthChallenge {
    pub challenge: String,
    pub salt: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    pub negotiated_rpc_version: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: String,
    #[serde(default)]
    pub event_data: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RequestStatus {
    pub result: bool,
    pub code: i64,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_type: String,
    pub request_id: String,
    pub request_status: RequestStatus,
    #[serde(default)]
    pub response_data: Option<Value>,
}

impl RequestResponse {
    /// Decode `responseData`, failing if OBS rejected the request.
    pub fn into_data<T: DeserializeOwned>(self) -> ObsResult<T> {
        if !self.request_status.result {
            return Err(ObsError::RequestFailed {
                request_type: self.request_type,
                code: self.request_status.code,
                comment: self.request_status.comment.unwrap_or_default(),
            });
        }
        let data = self
            .response_data
            .unwrap_or_else(|| Value::Object(Default::default()));
        Ok(serde_json::from_value(data)?)
    }
}

/// A decoded server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Hello(Hello),
    Identified(Identified),
    Event(Event),
    RequestResponse(RequestResponse),
    /// Opcodes the marker server does not handle
    Other(u8),
}

impl ServerMessage {
    pub fn parse(text: &str) -> ObsResult<Self> {
        let envelope: Envelope = serde_json::from_str(text)?;
        let message = match envelope.op {
            op::HELLO => ServerMessage::Hello(serde_json::from_value(envelope.d)?),
            op::IDENTIFIED => ServerMessage::Identified(serde_json::from_value(envelope.d)?),
            op::EVENT => ServerMessage::Event(serde_json::from_value(envelope.d)?),
            op::REQUEST_RESPONSE => {
                ServerMessage::RequestResponse(serde_json::from_value(envelope.d)?)
            }
            other => ServerMessage::Other(other),
        };
        Ok(message)
    }
}

/// `GetRecordStatus` response data.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordStatus {
    pub output_active: bool,
    #[serde(default)]
    pub output_paused: bool,
    #[serde(default)]
    pub output_timecode: Option<Timecode>,
    /// Milliseconds
    #[serde(default)]
    pub output_duration: Option<f64>,
    #[serde(default)]
    pub output_bytes: Option<u64>,
}

/// `outputTimecode` is a `HH:MM:SS.mmm` string on current servers and a
/// nanosecond count on older ones.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Timecode {
    Nanos(f64),
    Text(String),
}

/// `RecordStateChanged` event data.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordStateChanged {
    pub output_active: bool,
    #[serde(default)]
    pub output_state: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
}

// ============================================================================
// Client -> server
// ============================================================================

#[derive(Serialize)]
struct Outgoing<'a, T: Serialize> {
    op: u8,
    d: &'a T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identify {
    pub rpc_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
    pub event_subscriptions: u32,
}

impl Identify {
    pub fn new(authentication: Option<String>) -> Self {
        Self {
            rpc_version: RPC_VERSION,
            authentication,
            event_subscriptions: EVENT_SUBSCRIPTION_OUTPUTS,
        }
    }

    pub fn encode(&self) -> ObsResult<String> {
        encode(op::IDENTIFY, self)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request<'a> {
    pub request_type: &'a str,
    pub request_id: &'a str,
}

impl Request<'_> {
    pub fn encode(&self) -> ObsResult<String> {
        encode(op::REQUEST, self)
    }
}

fn encode<T: Serialize>(op: u8, d: &T) -> ObsResult<String> {
    Ok(serde_json::to_string(&Outgoing { op, d })?)
}
