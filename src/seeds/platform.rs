//! Platform catalog seeding
//!
//! Seeds the platforms table with the social networks the service knows
//! about. Seeding is idempotent: existing slugs are left untouched.

use anyhow::Result;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::sync::Arc;

use crate::models::platform;
use crate::repositories::PlatformRepository;

struct PlatformSeed {
    slug: &'static str,
    display_name: &'static str,
    auth_style: &'static str,
    supports_comments: bool,
}

const PLATFORM_SEEDS: &[PlatformSeed] = &[
    PlatformSeed {
        slug: "instagram",
        display_name: "Instagram",
        auth_style: "query_param",
        supports_comments: true,
    },
    PlatformSeed {
        slug: "tiktok",
        display_name: "TikTok",
        auth_style: "bearer_header",
        supports_comments: true,
    },
    PlatformSeed {
        slug: "youtube",
        display_name: "YouTube",
        auth_style: "bearer_header",
        supports_comments: true,
    },
    PlatformSeed {
        slug: "linkedin",
        display_name: "LinkedIn",
        auth_style: "bearer_header",
        supports_comments: true,
    },
    PlatformSeed {
        slug: "facebook",
        display_name: "Facebook",
        auth_style: "query_param",
        supports_comments: true,
    },
    PlatformSeed {
        slug: "pinterest",
        display_name: "Pinterest",
        auth_style: "bearer_header",
        supports_comments: false,
    },
    PlatformSeed {
        slug: "snapchat",
        display_name: "Snapchat",
        auth_style: "bearer_header",
        supports_comments: false,
    },
    PlatformSeed {
        slug: "threads",
        display_name: "Threads",
        auth_style: "query_param",
        supports_comments: true,
    },
    PlatformSeed {
        slug: "whatsapp",
        display_name: "WhatsApp",
        auth_style: "bearer_header",
        supports_comments: false,
    },
];

/// Seeds the platforms table with the known social networks
pub async fn seed_platforms(db: &DatabaseConnection) -> Result<()> {
    let repo = PlatformRepository::new(Arc::new(db.clone()));

    for seed in PLATFORM_SEEDS {
        match repo.find_by_slug(seed.slug).await {
            Ok(Some(_)) => {
                log::debug!("Platform '{}' already exists, skipping", seed.slug);
            }
            Ok(None) => {
                let active = platform::ActiveModel {
                    slug: Set(seed.slug.to_string()),
                    display_name: Set(seed.display_name.to_string()),
                    auth_style: Set(seed.auth_style.to_string()),
                    supports_comments: Set(seed.supports_comments),
                    created_at: Set(Utc::now().into()),
                };
                active.insert(db).await?;
                log::info!("Seeded platform '{}'", seed.slug);
            }
            Err(e) => {
                log::error!("Failed to check platform '{}': {}", seed.slug, e);
                return Err(e);
            }
        }
    }

    Ok(())
}
