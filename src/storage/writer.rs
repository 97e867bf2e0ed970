//! File sinks and the background batched writer.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

use crate::error::Result;
use crate::storage::schema::{prepare_csv_header, UTF8_BOM};

/// Pending payloads that trigger an immediate flush.
pub const WRITER_BATCH_SIZE: usize = 200;

/// Longest time a payload waits in the queue.
pub const WRITER_FLUSH_INTERVAL: Duration = Duration::from_millis(250);

/// Rows bound for one CSV file.
#[derive(Debug, Clone)]
pub struct CsvBatch {
    pub path: PathBuf,
    pub columns: &'static [&'static str],
    pub rows: Vec<Vec<String>>,
}

/// Objects bound for one JSONL file.
#[derive(Debug, Clone)]
pub struct JsonBatch {
    pub path: PathBuf,
    pub rows: Vec<Value>,
}

/// One save call's output, in each enabled format.
#[derive(Debug, Clone, Default)]
pub struct WritePayload {
    pub csv: Option<CsvBatch>,
    pub json: Option<JsonBatch>,
}

/// Appends rows to CSV and JSONL files.
#[derive(Debug, Default)]
pub struct SinkWriter {
    header_checked: HashSet<PathBuf>,
}

impl SinkWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rows, checking the header once per file per run.
    pub fn append_csv(
        &mut self,
        path: &Path,
        columns: &[&str],
        rows: &[Vec<String>],
    ) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut write_header = false;
        if !self.header_checked.contains(path) || !path.exists() {
            write_header = prepare_csv_header(path, columns)?;
            self.header_checked.insert(path.to_path_buf());
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if write_header && file.metadata()?.len() == 0 {
            file.write_all(UTF8_BOM)?;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if write_header {
            writer.write_record(columns)?;
        }
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Append one compact JSON object per line.
    pub fn append_jsonl(&mut self, path: &Path, rows: &[Value]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut buffer = String::new();
        for row in rows {
            buffer.push_str(&serde_json::to_string(row)?);
            buffer.push('\n');
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(buffer.as_bytes())?;
        Ok(())
    }

    /// Write one payload. True if at least one format was written.
    pub fn write_payload(&mut self, payload: &WritePayload) -> bool {
        let mut written = false;

        if let Some(json) = payload.json.as_ref().filter(|j| !j.rows.is_empty()) {
            match self.append_jsonl(&json.path, &json.rows) {
                Ok(()) => written = true,
                Err(e) => tracing::warn!("Failed to write {}: {}", json.path.display(), e),
            }
        }

        if let Some(csv) = payload.csv.as_ref().filter(|c| !c.rows.is_empty()) {
            match self.append_csv(&csv.path, csv.columns, &csv.rows) {
                Ok(()) => written = true,
                Err(e) => tracing::warn!("Failed to write {}: {}", csv.path.display(), e),
            }
        }

        written
    }

    /// Write many payloads, merging rows that target the same file.
    pub fn flush_batch(&mut self, payloads: Vec<WritePayload>) {
        let mut json_files: BTreeMap<PathBuf, Vec<Value>> = BTreeMap::new();
        let mut csv_files: BTreeMap<PathBuf, (&'static [&'static str], Vec<Vec<String>>)> =
            BTreeMap::new();

        for payload in payloads {
            if let Some(json) = payload.json {
                json_files.entry(json.path).or_default().extend(json.rows);
            }
            if let Some(csv) = payload.csv {
                csv_files
                    .entry(csv.path)
                    .or_insert_with(|| (csv.columns, Vec::new()))
                    .1
                    .extend(csv.rows);
            }
        }

        for (path, rows) in json_files {
            if let Err(e) = self.append_jsonl(&path, &rows) {
                tracing::warn!("Batched write to {} failed: {}", path.display(), e);
            }
        }

        for (path, (columns, rows)) in csv_files {
            if rows.is_empty() {
                continue;
            }
            if let Err(e) = self.append_csv(&path, columns, &rows) {
                tracing::warn!("Batched write to {} failed: {}", path.display(), e);
            }
        }
    }
}

/// Lock a sink, recovering it if a previous holder panicked.
pub fn lock_sink(sink: &Mutex<SinkWriter>) -> std::sync::MutexGuard<'_, SinkWriter> {
    sink.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Queue consumer that flushes payloads in batches.
///
/// While it runs, it is the only code touching the output files.
pub struct BackgroundWriter {
    tx: mpsc::UnboundedSender<WritePayload>,
    handle: JoinHandle<()>,
}

impl BackgroundWriter {
    pub fn spawn(sink: Arc<Mutex<SinkWriter>>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(writer_loop(rx, sink));
        Self { tx, handle }
    }

    pub fn is_active(&self) -> bool {
        !self.tx.is_closed() && !self.handle.is_finished()
    }

    /// Queue a payload, handing it back if the writer is gone.
    pub fn enqueue(&self, payload: WritePayload) -> std::result::Result<(), WritePayload> {
        self.tx.send(payload).map_err(|e| e.0)
    }

    /// Close the queue and wait until everything queued is on disk.
    pub async fn stop(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            tracing::error!("Storage writer task failed: {}", e);
        }
    }
}

async fn writer_loop(mut rx: mpsc::UnboundedReceiver<WritePayload>, sink: Arc<Mutex<SinkWriter>>) {
    let mut pending: Vec<WritePayload> = Vec::new();
    let mut deadline: Option<Instant> = None;

    loop {
        let next = match deadline {
            Some(at) => match timeout_at(at, rx.recv()).await {
                Ok(next) => next,
                Err(_) => {
                    flush(&sink, std::mem::take(&mut pending)).await;
                    deadline = None;
                    continue;
                }
            },
            None => rx.recv().await,
        };

        match next {
            Some(payload) => {
                if pending.is_empty() {
                    deadline = Some(Instant::now() + WRITER_FLUSH_INTERVAL);
                }
                pending.push(payload);
                if pending.len() >= WRITER_BATCH_SIZE {
                    flush(&sink, std::mem::take(&mut pending)).await;
                    deadline = None;
                }
            }
            None => {
                flush(&sink, std::mem::take(&mut pending)).await;
                break;
            }
        }
    }
}

async fn flush(sink: &Arc<Mutex<SinkWriter>>, payloads: Vec<WritePayload>) {
    if payloads.is_empty() {
        return;
    }

    let count = payloads.len();
    let sink = Arc::clone(sink);
    let result = tokio::task::spawn_blocking(move || lock_sink(&sink).flush_batch(payloads)).await;
    match result {
        Ok(()) => tracing::debug!("Flushed {} payloads", count),
        Err(e) => tracing::warn!("Storage flush of {} payloads failed: {}", count, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COLUMNS: &[&str] = &["帖子ID", "评论内容"];

    fn payload(dir: &Path, id: &str) -> WritePayload {
        WritePayload {
            csv: Some(CsvBatch {
                path: dir.join("keyword/comments.csv"),
                columns: COLUMNS,
                rows: vec![vec![id.to_string(), "内容, with comma".to_string()]],
            }),
            json: Some(JsonBatch {
                path: dir.join("keyword/comments.jsonl"),
                rows: vec![json!({"帖子ID": id})],
            }),
        }
    }

    #[test]
    fn test_append_csv_writes_bom_and_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SinkWriter::new();
        assert!(sink.write_payload(&payload(dir.path(), "1")));
        assert!(sink.write_payload(&payload(dir.path(), "2")));

        let bytes = fs::read(dir.path().join("keyword/comments.csv")).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        assert_eq!(
            text,
            "帖子ID,评论内容\n1,\"内容, with comma\"\n2,\"内容, with comma\"\n"
        );

        let jsonl = fs::read_to_string(dir.path().join("keyword/comments.jsonl")).unwrap();
        assert_eq!(jsonl, "{\"帖子ID\":\"1\"}\n{\"帖子ID\":\"2\"}\n");
    }

    #[test]
    fn test_drifted_file_is_kept_and_restarted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyword/comments.csv");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "帖子ID\n1\n").unwrap();

        let mut sink = SinkWriter::new();
        sink.append_csv(&path, COLUMNS, &[vec!["2".to_string(), "new".to_string()]])
            .unwrap();

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        assert_eq!(text, "帖子ID,评论内容\n2,new\n");

        let backups: Vec<PathBuf> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p != &path)
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read_to_string(&backups[0]).unwrap(), "帖子ID\n1\n");
    }

    #[test]
    fn test_existing_file_gets_no_second_header() {
        let dir = tempfile::tempdir().unwrap();
        SinkWriter::new().write_payload(&payload(dir.path(), "1"));
        SinkWriter::new().write_payload(&payload(dir.path(), "2"));

        let text = fs::read_to_string(dir.path().join("keyword/comments.csv")).unwrap();
        assert_eq!(text.matches("帖子ID").count(), 1);
    }

    #[test]
    fn test_flush_batch_merges_by_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SinkWriter::new();
        sink.flush_batch(vec![payload(dir.path(), "1"), payload(dir.path(), "2")]);

        let jsonl = fs::read_to_string(dir.path().join("keyword/comments.jsonl")).unwrap();
        assert_eq!(jsonl.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_background_writer_drains_on_stop() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(Mutex::new(SinkWriter::new()));
        let writer = BackgroundWriter::spawn(Arc::clone(&sink));
        assert!(writer.is_active());

        for i in 0..5 {
            writer.enqueue(payload(dir.path(), &i.to_string())).unwrap();
        }
        writer.stop().await;

        let jsonl = fs::read_to_string(dir.path().join("keyword/comments.jsonl")).unwrap();
        assert_eq!(jsonl.lines().count(), 5);
    }

    #[tokio::test]
    async fn test_background_writer_flushes_after_interval() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(Mutex::new(SinkWriter::new()));
        let writer = BackgroundWriter::spawn(sink);

        writer.enqueue(payload(dir.path(), "1")).unwrap();
        tokio::time::sleep(WRITER_FLUSH_INTERVAL * 4).await;

        assert!(dir.path().join("keyword/comments.jsonl").exists());
        writer.stop().await;
    }
}
