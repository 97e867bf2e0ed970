//! Crawl mode, save format and media filter definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Origin of a record: which entry mode discovered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    /// Keyword search results.
    Keyword,
    /// Direct post links.
    PostUrl,
    /// User timelines.
    User,
    /// Profile avatar and cover media.
    Profile,
}

impl SourceMode {
    /// The three schedulable crawl modes, in run order.
    pub const CRAWL_MODES: [SourceMode; 3] =
        [SourceMode::Keyword, SourceMode::PostUrl, SourceMode::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMode::Keyword => "keyword",
            SourceMode::PostUrl => "post_url",
            SourceMode::User => "user",
            SourceMode::Profile => "profile",
        }
    }

    /// Directory group this mode's records are written under.
    pub fn output_group(&self) -> &'static str {
        output_group(self.as_str())
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keyword" => Ok(SourceMode::Keyword),
            "post_url" | "url" | "link" | "comment" => Ok(SourceMode::PostUrl),
            "user" | "personal" => Ok(SourceMode::User),
            "profile" => Ok(SourceMode::Profile),
            _ => Err(format!("Unknown crawl mode: {}", s)),
        }
    }
}

/// Map a persisted mode string to its output directory group.
///
/// Unknown values land in `other` so foreign rows are never mixed into a
/// known group.
pub fn output_group(mode: &str) -> &'static str {
    match mode.trim().to_lowercase().as_str() {
        "keyword" => "keyword",
        "post_url" | "url" | "link" | "comment" => "post_url",
        "user" | "personal" | "profile" => "user",
        _ => "other",
    }
}

/// Resolve the configured mode list into the set of crawl modes to run.
///
/// `profile` and `media` were once standalone modes and are now ignored;
/// an empty selection enables every crawl mode.
pub fn resolve_modes(selected: &[String]) -> Vec<SourceMode> {
    let mut modes: Vec<SourceMode> = Vec::new();
    for raw in selected {
        let value = raw.trim().to_lowercase();
        if value.is_empty() || value == "profile" || value == "media" {
            continue;
        }
        match value.parse::<SourceMode>() {
            Ok(mode) if !modes.contains(&mode) => modes.push(mode),
            Ok(_) => {}
            Err(e) => tracing::warn!("{}", e),
        }
    }

    if modes.is_empty() {
        return SourceMode::CRAWL_MODES.to_vec();
    }
    modes.sort();
    modes
}

/// Which structured formats records are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SaveFormat {
    #[default]
    Csv,
    Json,
    Both,
}

impl SaveFormat {
    pub fn writes_csv(&self) -> bool {
        matches!(self, SaveFormat::Csv | SaveFormat::Both)
    }

    pub fn writes_json(&self) -> bool {
        matches!(self, SaveFormat::Json | SaveFormat::Both)
    }
}

impl From<String> for SaveFormat {
    /// Unrecognized values fall back to writing both formats.
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "csv" => SaveFormat::Csv,
            "json" => SaveFormat::Json,
            _ => SaveFormat::Both,
        }
    }
}

impl From<SaveFormat> for String {
    fn from(value: SaveFormat) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SaveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveFormat::Csv => write!(f, "csv"),
            SaveFormat::Json => write!(f, "json"),
            SaveFormat::Both => write!(f, "both"),
        }
    }
}

/// Media types captured from posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MediaTypeFilter {
    #[default]
    All,
    Image,
    Video,
}

impl From<String> for MediaTypeFilter {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "image" | "img" | "photo" | "pic" | "pics" => MediaTypeFilter::Image,
            "video" | "vid" => MediaTypeFilter::Video,
            _ => MediaTypeFilter::All,
        }
    }
}

impl From<MediaTypeFilter> for String {
    fn from(value: MediaTypeFilter) -> Self {
        value.to_string()
    }
}

impl fmt::Display for MediaTypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaTypeFilter::All => write!(f, "all"),
            MediaTypeFilter::Image => write!(f, "image"),
            MediaTypeFilter::Video => write!(f, "video"),
        }
    }
}
