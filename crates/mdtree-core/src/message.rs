//! Messages pushed to live subscribers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::node::SourceNode;

/// A message delivered through the broadcast hub.
///
/// Serializes as `{"type":"connected"}` or
/// `{"type":"sources_updated","sources":{...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubMessage {
    /// First message every subscriber receives.
    Connected,
    /// A new snapshot was installed.
    SourcesUpdated {
        /// Root node of the new snapshot.
        sources: Arc<SourceNode>,
    },
}

impl HubMessage {
    /// Serialize to a JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Serialize as one event-stream frame: `data: <json>\n\n`.
    pub fn to_event_frame(&self) -> serde_json::Result<String> {
        Ok(format!("data: {}\n\n", self.to_json()?))
    }
}
