//! Filesystem module.
//!
//! Provides:
//! - Path component sanitization
//! - Deterministic media file locations
//! - Atomic streaming writes through `.part` sidecars

pub mod naming;
pub mod paths;
pub mod sidecar;

pub use naming::sanitize_component;
pub use paths::{guess_extension, media_target_path, url_digest};
pub use sidecar::{sidecar_path, stream_to_file};
