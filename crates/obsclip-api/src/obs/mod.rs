//! OBS WebSocket v5 client.

pub mod auth;
pub mod connection;
pub mod protocol;
pub mod resolver;

use async_trait::async_trait;

use crate::error::ObsResult;

pub use auth::authentication_string;
pub use connection::{ObsConnection, ObsSettings};
pub use protocol::{RecordStatus, Timecode};
pub use resolver::{parse_timecode, resolve_elapsed_seconds};

/// The recorder as seen by the HTTP handlers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecorderClient: Send + Sync {
    /// Whether the identified session is up.
    fn is_connected(&self) -> bool;

    /// Last known recording state, from events or the latest status query.
    fn is_recording(&self) -> bool;

    /// Fresh `GetRecordStatus` round-trip.
    async fn record_status(&self) -> ObsResult<RecordStatus>;
}
