//! OAuth2 authorization code flow for installed applications
//!
//! # Module Layout
//!
//! - [`query`]       -- percent-encoded query strings and form bodies
//! - [`callback`]    -- one-shot loopback listener capturing the redirect
//! - [`client`]      -- consent URL and token endpoint calls
//! - [`token_store`] -- refresh token file
//! - [`browser`]     -- launching the system browser
//! - [`manager`]     -- the end-to-end `get_access_token` flow

pub mod browser;
pub mod callback;
pub mod client;
pub mod manager;
pub mod query;
pub mod token_store;
