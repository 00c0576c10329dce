//! # Repositories
//!
//! Data-access layer over the SeaORM entities. Every query is scoped to an
//! account where the schema allows it.

pub mod account;
pub mod connection;
pub mod conversation;
pub mod message;
pub mod oauth_state;
pub mod persona;
pub mod platform;
pub mod responder_settings;
pub mod response_job;

pub use account::AccountRepository;
pub use connection::ConnectionRepository;
pub use conversation::ConversationRepository;
pub use message::{MessageRepository, NewMessage};
pub use oauth_state::OauthStateRepository;
pub use persona::PersonaRepository;
pub use platform::PlatformRepository;
pub use responder_settings::ResponderSettings;
pub use response_job::ResponseJobRepository;
