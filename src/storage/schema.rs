//! Output layout and CSV schema checks.

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::config::{Config, SaveFormat};
use crate::error::Result;
use crate::media::MediaRecord;
use crate::model::{Comment, Post, Profile};

/// UTF-8 byte order mark written at the start of new CSV files.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Per-mode directory groups, in summary order.
pub const OUTPUT_GROUPS: [&str; 4] = ["keyword", "post_url", "user", "other"];

/// Kinds of persisted records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Posts,
    Comments,
    Media,
    Profiles,
}

impl DataKind {
    pub fn stem(&self) -> &'static str {
        match self {
            DataKind::Posts => "posts",
            DataKind::Comments => "comments",
            DataKind::Media => "media",
            DataKind::Profiles => "profiles",
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            DataKind::Posts => Post::COLUMNS,
            DataKind::Comments => Comment::COLUMNS,
            DataKind::Media => MediaRecord::COLUMNS,
            DataKind::Profiles => Profile::COLUMNS,
        }
    }

    pub fn csv_file(&self) -> String {
        format!("{}.csv", self.stem())
    }

    pub fn jsonl_file(&self) -> String {
        format!("{}.jsonl", self.stem())
    }
}

/// Where the store reads and writes.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    pub output_root: PathBuf,
    pub text_root: PathBuf,
    pub media_root: PathBuf,
    pub format: SaveFormat,
}

impl StoreLayout {
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_root: config.output.directory.clone(),
            text_root: config.text_root(),
            media_root: config.media_root(),
            format: config.output.save_format,
        }
    }

    pub fn group_dir(&self, group: &str) -> PathBuf {
        self.text_root.join(group)
    }

    pub fn csv_path(&self, group: &str, kind: DataKind) -> PathBuf {
        self.group_dir(group).join(kind.csv_file())
    }

    pub fn jsonl_path(&self, group: &str, kind: DataKind) -> PathBuf {
        self.group_dir(group).join(kind.jsonl_file())
    }

    /// Every existing file named `file_name`: the legacy flat location first,
    /// then each group directory in name order.
    pub fn history_files(&self, file_name: &str) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        let legacy = self.text_root.join(file_name);
        if legacy.is_file() {
            paths.push(legacy);
        }

        let mut dirs: Vec<PathBuf> = fs::read_dir(&self.text_root)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.is_dir())
                    .collect()
            })
            .unwrap_or_default();
        dirs.sort();

        for dir in dirs {
            let candidate = dir.join(file_name);
            if candidate.is_file() && !paths.contains(&candidate) {
                paths.push(candidate);
            }
        }

        paths
    }
}

/// Read the header row of an existing CSV, without a leading BOM.
pub fn read_csv_header(path: &Path) -> Vec<String> {
    let Ok(file) = fs::File::open(path) else {
        return Vec::new();
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let mut record = csv::StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => record
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                if i == 0 {
                    cell.trim_start_matches('\u{feff}').to_string()
                } else {
                    cell.to_string()
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Check an existing CSV against `columns` before appending.
///
/// Returns whether a header must be written. A file whose header differs is
/// renamed to `{file}.legacy_{timestamp}` and a fresh file is started.
pub fn prepare_csv_header(path: &Path, columns: &[&str]) -> Result<bool> {
    if !path.exists() {
        return Ok(true);
    }

    let header = read_csv_header(path);
    if header.iter().map(String::as_str).eq(columns.iter().copied()) {
        return Ok(false);
    }

    let backup = backup_path(path);
    fs::rename(path, &backup)?;
    tracing::warn!(
        "CSV columns changed, previous file kept as {}",
        backup.display()
    );
    Ok(true)
}

fn backup_path(path: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let base = format!("{}.legacy_{}", path.display(), stamp);

    let mut candidate = PathBuf::from(&base);
    let mut counter = 1;
    while candidate.exists() {
        candidate = PathBuf::from(format!("{}_{}", base, counter));
        counter += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_needs_header() {
        let dir = tempfile::tempdir().unwrap();
        assert!(prepare_csv_header(&dir.path().join("posts.csv"), Post::COLUMNS).unwrap());
    }

    #[test]
    fn test_matching_header_with_bom_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("media.csv");
        let mut content = UTF8_BOM.to_vec();
        content.extend_from_slice(MediaRecord::COLUMNS.join(",").as_bytes());
        content.extend_from_slice(b"\n");
        fs::write(&path, content).unwrap();

        assert!(!prepare_csv_header(&path, MediaRecord::COLUMNS).unwrap());
        assert!(path.exists());
    }

    #[test]
    fn test_schema_drift_backs_up_old_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("comments.csv");
        fs::write(&path, "帖子ID,评论内容\n1,old\n").unwrap();

        assert!(prepare_csv_header(&path, Comment::COLUMNS).unwrap());
        assert!(!path.exists());

        let backups: Vec<PathBuf> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(backups.len(), 1);
        let name = backups[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("comments.csv.legacy_"));
        assert_eq!(fs::read_to_string(&backups[0]).unwrap(), "帖子ID,评论内容\n1,old\n");
    }

    #[test]
    fn test_history_files_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.output.directory = dir.path().to_path_buf();
        let layout = StoreLayout::from_config(&config);

        for group in ["user", "keyword"] {
            fs::create_dir_all(layout.group_dir(group)).unwrap();
            fs::write(layout.csv_path(group, DataKind::Posts), "").unwrap();
        }
        fs::write(layout.text_root.join("posts.csv"), "").unwrap();

        let files = layout.history_files("posts.csv");
        assert_eq!(
            files,
            vec![
                layout.text_root.join("posts.csv"),
                layout.csv_path("keyword", DataKind::Posts),
                layout.csv_path("user", DataKind::Posts),
            ]
        );
    }
}
