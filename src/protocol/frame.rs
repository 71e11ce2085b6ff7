//! Protocol frame types

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A frame on the viewer wire
///
/// Encoded as a flat JSON object discriminated by the `type` field.
/// Site keys travel as `siteId`. Frames with an unknown `type` or
/// missing fields fail to parse and are discarded by the reader; extra
/// fields are tolerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// Client request to be counted as a viewer of a site
    Join {
        #[serde(rename = "siteId")]
        site_id: String,
    },

    /// Server notification that a site's viewer count changed
    Update {
        #[serde(rename = "siteId")]
        site_id: String,
        count: usize,
        /// Broadcast time in epoch seconds
        timestamp: i64,
    },

    /// Server notice that the process is shutting down
    Shutdown { message: String },
}

impl Frame {
    /// Create a join frame for the given site
    pub fn join(site_id: impl Into<String>) -> Self {
        Self::Join {
            site_id: site_id.into(),
        }
    }

    /// Create an update frame stamped with the current time
    pub fn update(site_id: impl Into<String>, count: usize) -> Self {
        Self::Update {
            site_id: site_id.into(),
            count,
            timestamp: Utc::now().timestamp(),
        }
    }

    /// Create a shutdown notice
    pub fn shutdown(message: impl Into<String>) -> Self {
        Self::Shutdown {
            message: message.into(),
        }
    }
}
