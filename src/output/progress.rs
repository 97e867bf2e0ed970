//! Progress bar utilities.

use indicatif::{ProgressBar, ProgressStyle};

/// Downloads larger than this get a progress bar (20MB).
pub const PROGRESS_THRESHOLD: u64 = 20 * 1024 * 1024;

const DOWNLOAD_TEMPLATE: &str =
    "{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})";

/// Create a progress bar for downloads.
pub fn create_download_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(DOWNLOAD_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    bar.set_style(style);
    bar
}
