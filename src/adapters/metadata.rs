//! Platform metadata types
//!
//! Defines the metadata structure for platforms and their token conventions.

use serde::{Deserialize, Serialize};

/// How a platform expects the access token on data-path calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStyle {
    /// Token appended as an `access_token` query parameter (Meta Graph
    /// convention)
    QueryParam,
    /// Token sent as an `Authorization: Bearer` header
    BearerHeader,
}

impl AuthStyle {
    /// Database representation of the auth style
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthStyle::QueryParam => "query_param",
            AuthStyle::BearerHeader => "bearer_header",
        }
    }
}

/// Metadata about a platform adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformMetadata {
    /// Platform slug, e.g. "instagram"
    pub slug: String,
    /// Display name, e.g. "Instagram"
    pub display_name: String,
    /// Token convention for data-path calls
    pub auth_style: AuthStyle,
    /// OAuth scopes requested during the connect flow
    pub scopes: Vec<String>,
    /// Whether the platform exposes a comment surface the responder can scan
    pub supports_comments: bool,
}

impl PlatformMetadata {
    /// Create new platform metadata
    pub fn new(
        slug: String,
        display_name: String,
        auth_style: AuthStyle,
        scopes: Vec<String>,
        supports_comments: bool,
    ) -> Self {
        Self {
            slug,
            display_name,
            auth_style,
            scopes,
            supports_comments,
        }
    }
}
