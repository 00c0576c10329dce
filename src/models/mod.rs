//! # Data Models
//!
//! This module contains all the data models used throughout the Engage API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod account;
pub mod connection;
pub mod conversation;
pub mod message;
pub mod oauth_state;
pub mod persona_profile;
pub mod platform;
pub mod response_job;

pub use account::Entity as Account;
pub use connection::Entity as Connection;
pub use conversation::Entity as Conversation;
pub use message::Entity as Message;
pub use oauth_state::Entity as OauthState;
pub use persona_profile::Entity as PersonaProfile;
pub use platform::Entity as Platform;
pub use response_job::Entity as ResponseJob;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "engage".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
