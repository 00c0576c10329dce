//! Helpers for reading and writing connection `metadata.responder` payloads.
//!
//! The poller persists the auto-respond toggle, interval cadence, jitter and
//! activation markers inside `connections.metadata.responder`. This module
//! centralizes parsing and serialization so background workers and API
//! handlers share the same contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::warn;

use crate::config::PollerConfig;

/// Minimum polling interval override allowed (matches the legacy UI timer).
pub const MIN_RESPONDER_INTERVAL_SECONDS: u64 = 30;

/// Longest interval override accepted before falling back to the default.
pub const MAX_RESPONDER_INTERVAL_SECONDS: u64 = 86400;

/// Settings stored under `connections.metadata.responder`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResponderSettings {
    /// Whether the auto-responder polls this connection
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_jitter_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
}

impl ResponderSettings {
    /// Parse settings from the given JSON value, falling back to defaults on
    /// errors.
    pub fn from_connection_metadata(metadata: Option<&JsonValue>) -> Self {
        let Some(metadata) = metadata else {
            return Self::default();
        };

        match metadata {
            JsonValue::Object(obj) => {
                if let Some(responder_value) = obj.get("responder") {
                    serde_json::from_value::<Self>(responder_value.clone()).unwrap_or_else(|_| {
                        warn!(
                            responder_value = ?responder_value,
                            "Failed to parse responder settings; using defaults"
                        );
                        Self::default()
                    })
                } else {
                    Self::default()
                }
            }
            other => {
                warn!(
                    value = ?other,
                    "Unexpected connection metadata format; expected object with responder payload"
                );
                Self::default()
            }
        }
    }

    /// Serialize the settings back into the existing metadata object.
    ///
    /// Unknown metadata keys are preserved.
    pub fn into_connection_metadata(&self, existing: Option<&JsonValue>) -> JsonValue {
        let mut root = match existing {
            Some(JsonValue::Object(map)) => map.clone(),
            Some(value) => {
                warn!(
                    value = ?value,
                    "Unexpected connection metadata structure; replacing with object"
                );
                Map::<String, JsonValue>::new()
            }
            None => Map::<String, JsonValue>::new(),
        };

        if self.is_empty() {
            root.remove("responder");
        } else {
            let responder_value =
                serde_json::to_value(self).unwrap_or(JsonValue::Object(Map::new()));
            root.insert("responder".to_string(), responder_value);
        }

        JsonValue::Object(root)
    }

    /// Ensure the interval override respects poller bounds.
    ///
    /// Returns `true` if the settings were modified.
    pub fn sanitize_interval(&mut self) -> bool {
        if let Some(value) = self.interval_seconds
            && !(MIN_RESPONDER_INTERVAL_SECONDS..=MAX_RESPONDER_INTERVAL_SECONDS).contains(&value)
        {
            warn!(
                interval_seconds = value,
                "Invalid responder interval override; reverting to poller default"
            );
            self.interval_seconds = None;
            return true;
        }
        false
    }

    /// Calculate the effective base interval in seconds based on overrides
    /// and defaults.
    pub fn effective_interval_seconds(&self, poller: &PollerConfig) -> u64 {
        self.interval_seconds
            .filter(|value| {
                (MIN_RESPONDER_INTERVAL_SECONDS..=MAX_RESPONDER_INTERVAL_SECONDS).contains(value)
            })
            .unwrap_or(poller.default_interval_seconds)
    }

    fn is_empty(&self) -> bool {
        !self.enabled
            && self.interval_seconds.is_none()
            && self.next_run_at.is_none()
            && self.last_jitter_seconds.is_none()
            && self.activated_at.is_none()
    }
}
