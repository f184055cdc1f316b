//! # Auth Module
//!
//! Canonical user identity and session handling:
//! - Credential store for users and their linked provider identities
//! - Account resolver deciding create / link / reject on every login
//! - Session issuer minting and verifying revocable JWT credentials
//! - Email/password registration and login
//! - AuthedUser extractor for protected routes

pub mod extractors;
pub mod handlers;
pub mod models;
pub mod password;
pub mod resolver;
pub mod routes;
pub mod session;
pub mod store;
pub mod validators;


pub use extractors::AuthedUser;
pub use resolver::{AccountResolver, ResolveError, Resolved};
pub use routes::auth_routes;
pub use session::SessionIssuer;
pub use store::CredentialStore;
