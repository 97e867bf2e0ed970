//! Command-line argument definitions using clap.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::{Config, SaveFormat};

/// Weibo harvester CLI.
#[derive(Parser, Debug)]
#[command(
    name = "weibo-harvester",
    version,
    about = "Harvest Weibo posts, comments, media and profiles",
    long_about = "A CLI tool to collect Weibo posts, comments, media and user profiles.\n\n\
                  Supports keyword search, direct post links and user timelines. Output is \
                  deduplicated across runs and safe to resume."
)]
pub struct Args {
    /// Path to configuration file.
    #[arg(short, long, default_value = "harvester.toml")]
    pub config: PathBuf,

    /// Crawl modes to run (keyword, post_url, user). Replaces the configured list.
    #[arg(short, long, value_delimiter = ',', num_args = 1..)]
    pub mode: Option<Vec<String>>,

    /// Search keyword(s). Replaces the configured keywords.
    #[arg(short, long, num_args = 1..)]
    pub keyword: Option<Vec<String>>,

    /// Post link(s). Replaces the configured links.
    #[arg(short = 'l', long = "link", num_args = 1..)]
    pub post_url: Option<Vec<String>>,

    /// User target(s): uid, profile URL or @name. Replaces the configured users.
    #[arg(short, long, num_args = 1..)]
    pub user: Option<Vec<String>>,

    /// Base directory for output.
    #[arg(short = 'd', long = "directory")]
    pub output_directory: Option<PathBuf>,

    /// Structured output format.
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Raw cookie header of a logged-in session.
    #[arg(long, env = "WEIBO_COOKIE", hide_env_values = true)]
    pub cookie: Option<String>,

    /// File holding a cookie header or a JSON cookie export.
    #[arg(long)]
    pub cookie_file: Option<PathBuf>,

    /// Don't collect media.
    #[arg(long)]
    pub no_media: bool,

    /// Record media links without downloading files.
    #[arg(long)]
    pub no_download: bool,

    /// Don't collect comments in any mode.
    #[arg(long)]
    pub no_comments: bool,

    /// Hide download progress bars.
    #[arg(long, short)]
    pub quiet: bool,

    /// Enable debug logging.
    #[arg(long)]
    pub debug: bool,
}

/// CLI output format argument.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Csv,
    Json,
    Both,
}

impl From<FormatArg> for SaveFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Csv => SaveFormat::Csv,
            FormatArg::Json => SaveFormat::Json,
            FormatArg::Both => SaveFormat::Both,
        }
    }
}

impl Args {
    /// Merge CLI arguments into an existing config, overriding where specified.
    pub fn merge_into_config(self, config: &mut Config) {
        if let Some(modes) = self.mode {
            config.run.modes = modes;
        }

        // Targets
        if let Some(keywords) = self.keyword {
            config.targets.keywords = keywords;
        }

        if let Some(links) = self.post_url {
            config.targets.post_urls = links;
        }

        if let Some(users) = self.user {
            config.targets.users = users;
        }

        // Output
        if let Some(dir) = self.output_directory {
            config.output.directory = dir;
        }

        if let Some(format) = self.format {
            config.output.save_format = format.into();
        }

        // Session
        if let Some(cookie) = self.cookie {
            config.account.cookie = Some(cookie);
        }

        if let Some(file) = self.cookie_file {
            config.account.cookie_file = Some(file);
        }

        // Boolean flags (only override if set to non-default)
        if self.no_media {
            config.media.enabled = false;
        }

        if self.no_download {
            config.media.download = false;
        }

        if self.no_comments {
            config.comments.keyword = false;
            config.comments.post_url = false;
            config.comments.user = false;
        }

        if self.quiet {
            config.run.show_progress = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from([
            "weibo-harvester",
            "--mode",
            "keyword,user",
            "--keyword",
            "rust",
            "async",
            "--format",
            "both",
            "--no-comments",
            "--quiet",
        ]);
        let mut config = Config::default();
        config.targets.users = vec!["1234".to_string()];

        args.merge_into_config(&mut config);

        assert_eq!(config.run.modes, vec!["keyword", "user"]);
        assert_eq!(config.targets.keywords, vec!["rust", "async"]);
        assert_eq!(config.targets.users, vec!["1234"]);
        assert_eq!(config.output.save_format, SaveFormat::Both);
        assert!(!config.comments.keyword && !config.comments.user);
        assert!(!config.run.show_progress);
    }

    #[test]
    fn test_defaults_leave_config_untouched() {
        let args = Args::parse_from(["weibo-harvester"]);
        assert_eq!(args.config, PathBuf::from("harvester.toml"));

        let mut config = Config::default();
        args.merge_into_config(&mut config);
        assert!(config.media.enabled);
        assert!(config.run.show_progress);
    }
}
