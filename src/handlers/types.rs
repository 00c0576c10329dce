//! Shared handler types: the internal action envelope and common DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Internal action envelope: one generic entry point for adapter-backed
/// operations. The account comes from the authenticated `X-Account-Id`
/// header; a mismatching `account_id` in the body is rejected.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActionRequest {
    /// Action name: fetch_messages | send_message | refresh_token |
    /// scan_comments
    pub action: String,
    /// Platform slug the action targets, e.g. "instagram"
    pub platform: String,
    /// Optional account id echo; must match the header when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<uuid::Uuid>,
    /// Action-specific parameters
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Response envelope for action requests
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActionResponse {
    /// Whether the action logically succeeded
    pub success: bool,
    /// Action-specific payload, present on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error message, present on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_request_deserializes_envelope_shape() {
        let raw = serde_json::json!({
            "action": "send_message",
            "platform": "instagram",
            "params": { "participant_id": "fan-1", "text": "hey!" }
        });

        let request: ActionRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(request.action, "send_message");
        assert_eq!(request.platform, "instagram");
        assert!(request.account_id.is_none());
        assert_eq!(request.params["participant_id"], "fan-1");
    }

    #[test]
    fn action_response_omits_absent_fields() {
        let response = ActionResponse::ok(serde_json::json!({ "sent": true }));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["success"], true);
        assert!(value.get("error").is_none());
    }
}
