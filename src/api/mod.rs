//! Weibo API module.
//!
//! This module provides:
//! - The `Transport` request primitive and its reqwest implementation
//! - Session cookie loading
//! - Endpoint helpers and response shape handling
//! - Post link and user target parsing

pub mod auth;
pub mod client;
pub mod endpoints;
pub mod links;
pub mod transport;

pub use auth::{CookieSource, StaticCookies};
pub use client::WeiboClient;
pub use endpoints::{UserLookup, WeiboApi};
pub use links::{
    bid_to_mid, extract_custom_from_target, extract_post_id_from_url, extract_uid_from_target,
};
pub use transport::Transport;
