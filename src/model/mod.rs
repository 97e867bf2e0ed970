//! Record types built from Weibo API payloads.
//!
//! Provides:
//! - Posts, comments and profiles with their dedup keys
//! - CSV rows and JSONL objects in the persisted column layout
//! - Shape-tolerant field accessors and text normalization

pub mod comment;
pub mod json;
pub mod post;
pub mod profile;
pub mod text;

pub use comment::{Comment, CommentKey, CommentLevel, REPLY_PREFIX};
pub use post::{Post, PostKey, UNKNOWN_USER};
pub use profile::Profile;
