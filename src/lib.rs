//! passforge — short-lived login credentials over Discord, with an HTTP
//! validation API.
//!
//! A single in-process [`store::CredentialStore`] backs two surfaces:
//! the Discord slash-command channel ([`channels::DiscordChannel`]) that
//! issues credentials, and the axum gateway ([`gateway`]) that a third
//! party calls to validate them.

pub mod channels;
pub mod config;
pub mod gateway;
pub mod security;
pub mod store;
