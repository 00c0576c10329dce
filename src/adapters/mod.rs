//! Platform adapters module
//!
//! This module provides the adapter SDK including:
//! - The `PlatformAdapter` trait defining the interface all platform
//!   implementations follow
//! - Platform metadata and registry for discovery and lookup
//! - Individual adapter implementations

pub mod instagram;
pub mod metadata;
pub mod registry;
pub mod tiktok;
pub mod trait_;

pub use metadata::{AuthStyle, PlatformMetadata};
pub use registry::{AdapterRegistry, RegistryError};
pub use trait_::{
    AdapterContext, AdapterError, AuthorizeParams, CommentBatch, DeliveryReceipt,
    ExchangeCodeParams, FetchCommentsParams, FetchMessagesParams, InboundComment, InboundMessage,
    MessageBatch, NewConnection, PipelineError, PipelineErrorKind, PlatformAdapter,
    RefreshedCredentials, SendMessageParams,
};

pub use instagram::{InstagramAdapter, register_instagram_adapter};
pub use tiktok::{TikTokAdapter, register_tiktok_adapter};
