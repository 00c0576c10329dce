//! Platform adapter registry
//!
//! In-memory registry mapping platform slugs to adapter instances and their
//! metadata. One registry instance is built from configuration at startup and
//! shared through application state; platforms seeded in the catalog but
//! lacking a registered adapter fail lookup with `PlatformNotRegistered`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::adapters::{PlatformAdapter, PlatformMetadata};
use crate::config::AppConfig;

/// Error type for registry operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("platform '{slug}' has no registered adapter")]
    PlatformNotRegistered { slug: String },
}

/// Registry that stores platform adapters and their metadata
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn PlatformAdapter>>,
    metadata: HashMap<String, PlatformMetadata>,
}

impl AdapterRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    /// Build a registry from application configuration, registering every
    /// adapter whose platform app credentials are present.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::new();

        if let (Some(client_id), Some(client_secret)) = (
            config.instagram_client_id.clone(),
            config.instagram_client_secret.clone(),
        ) {
            let adapter = Arc::new(crate::adapters::InstagramAdapter::new(
                client_id,
                client_secret,
                config.instagram_oauth_base.clone(),
                config.instagram_api_base.clone(),
            ));
            crate::adapters::register_instagram_adapter(&mut registry, adapter);
        } else {
            warn!("Instagram adapter not registered: missing Instagram client credentials");
        }

        if let (Some(client_key), Some(client_secret)) = (
            config.tiktok_client_key.clone(),
            config.tiktok_client_secret.clone(),
        ) {
            let adapter = Arc::new(crate::adapters::TikTokAdapter::new(
                client_key,
                client_secret,
                config.tiktok_oauth_base.clone(),
                config.tiktok_api_base.clone(),
            ));
            crate::adapters::register_tiktok_adapter(&mut registry, adapter);
        } else {
            warn!("TikTok adapter not registered: missing TikTok client credentials");
        }

        registry
    }

    /// Register a platform with its adapter and metadata
    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>, metadata: PlatformMetadata) {
        let slug = metadata.slug.clone();
        self.adapters.insert(slug.clone(), adapter);
        self.metadata.insert(slug, metadata);
    }

    /// Get an adapter by platform slug
    pub fn get(&self, slug: &str) -> Result<Arc<dyn PlatformAdapter>, RegistryError> {
        self.adapters
            .get(slug)
            .cloned()
            .ok_or_else(|| RegistryError::PlatformNotRegistered {
                slug: slug.to_string(),
            })
    }

    /// Whether an adapter is registered for the given platform
    pub fn is_registered(&self, slug: &str) -> bool {
        self.adapters.contains_key(slug)
    }

    /// Get metadata for all registered platforms, sorted by slug for stable
    /// ordering
    pub fn list_metadata(&self) -> Vec<PlatformMetadata> {
        let mut metadata: Vec<_> = self.metadata.values().cloned().collect();
        metadata.sort_by(|a, b| a.slug.cmp(&b.slug));
        metadata
    }

    /// Get metadata for a specific platform
    pub fn get_metadata(&self, slug: &str) -> Result<&PlatformMetadata, RegistryError> {
        self.metadata
            .get(slug)
            .ok_or_else(|| RegistryError::PlatformNotRegistered {
                slug: slug.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::trait_::{
        AuthorizeParams, CommentBatch, DeliveryReceipt, ExchangeCodeParams, FetchCommentsParams,
        FetchMessagesParams, MessageBatch, NewConnection, RefreshedCredentials, SendMessageParams,
    };
    use crate::adapters::{AdapterError, AuthStyle, PlatformAdapter};
    use async_trait::async_trait;
    use url::Url;

    struct TestAdapter;

    #[async_trait]
    impl PlatformAdapter for TestAdapter {
        async fn authorize(&self, _params: AuthorizeParams) -> Result<Url, AdapterError> {
            Ok(Url::parse("https://example.com/oauth/authorize").unwrap())
        }

        async fn exchange_code(
            &self,
            _params: ExchangeCodeParams,
        ) -> Result<NewConnection, AdapterError> {
            Ok(NewConnection {
                platform_user_id: "user-1".to_string(),
                display_name: None,
                access_token: "token".to_string(),
                refresh_token: None,
                expires_at: None,
                metadata: None,
            })
        }

        async fn refresh_token(
            &self,
            _refresh_token: &str,
        ) -> Result<RefreshedCredentials, AdapterError> {
            Err(AdapterError::MalformedRequest {
                details: "not implemented".to_string(),
            })
        }

        async fn fetch_messages(
            &self,
            _params: FetchMessagesParams,
        ) -> Result<MessageBatch, AdapterError> {
            Ok(MessageBatch {
                messages: vec![],
                next_cursor: None,
                has_more: false,
            })
        }

        async fn fetch_comments(
            &self,
            _params: FetchCommentsParams,
        ) -> Result<CommentBatch, AdapterError> {
            Ok(CommentBatch { comments: vec![] })
        }

        async fn send_message(
            &self,
            _params: SendMessageParams,
        ) -> Result<DeliveryReceipt, AdapterError> {
            Ok(DeliveryReceipt {
                platform_message_id: "m-1".to_string(),
            })
        }
    }

    fn test_metadata(slug: &str) -> PlatformMetadata {
        PlatformMetadata::new(
            slug.to_string(),
            slug.to_string(),
            AuthStyle::BearerHeader,
            vec!["basic".to_string()],
            false,
        )
    }

    #[test]
    fn test_registry_unknown_platform() {
        let registry = AdapterRegistry::new();

        let result = registry.get("youtube");
        assert!(matches!(
            result,
            Err(RegistryError::PlatformNotRegistered { slug }) if slug == "youtube"
        ));

        let result = registry.get_metadata("youtube");
        assert!(result.is_err());
    }

    #[test]
    fn test_registry_known_platform() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(TestAdapter), test_metadata("instagram"));

        assert!(registry.get("instagram").is_ok());
        assert!(registry.is_registered("instagram"));

        let metadata = registry.get_metadata("instagram").unwrap();
        assert_eq!(metadata.slug, "instagram");
        assert_eq!(metadata.auth_style, AuthStyle::BearerHeader);
    }

    #[test]
    fn test_registry_list_ordering() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(TestAdapter), test_metadata("tiktok"));
        registry.register(Arc::new(TestAdapter), test_metadata("instagram"));
        registry.register(Arc::new(TestAdapter), test_metadata("threads"));

        let metadata = registry.list_metadata();
        assert_eq!(metadata.len(), 3);
        assert_eq!(metadata[0].slug, "instagram");
        assert_eq!(metadata[1].slug, "threads");
        assert_eq!(metadata[2].slug, "tiktok");
    }

    #[test]
    fn test_from_config_registers_configured_adapters() {
        let config = AppConfig {
            instagram_client_id: Some("ig-id".to_string()),
            instagram_client_secret: Some("ig-secret".to_string()),
            ..AppConfig::default()
        };

        let registry = AdapterRegistry::from_config(&config);
        assert!(registry.is_registered("instagram"));
        // No TikTok credentials configured
        assert!(!registry.is_registered("tiktok"));
    }
}
