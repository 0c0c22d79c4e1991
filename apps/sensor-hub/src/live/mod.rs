//! Live distribution of admitted readings to connected viewers.

mod fanout;
mod registry;

pub use fanout::spawn_fanout;
pub use registry::{
    BroadcastReport, SessionId, SessionRegistry, ViewerSession, DEFAULT_SESSION_QUEUE,
};

use serde::Serialize;

use crate::reading::Reading;

/// Frames sent to live viewers.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum LiveEvent<'a> {
    /// Sent once when a session opens; status display only.
    Connect { session_id: SessionId },
    NewData { data: &'a Reading },
}

impl LiveEvent<'_> {
    pub const NEW_DATA: &'static str = "new-data";
    pub const CONNECT: &'static str = "connect";
}
