//! Atomic file writes through a `.part` sidecar.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use futures::{Stream, StreamExt};
use indicatif::ProgressBar;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

/// `{dest}.part`, the path a download streams into before it is complete.
pub fn sidecar_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

/// Stream chunks into the sidecar of `dest`, then rename it into place.
///
/// The sidecar is removed when the stream fails or yields no bytes, so `dest`
/// only ever appears complete. Returns the number of bytes written.
pub async fn stream_to_file<S, B, E>(
    mut stream: S,
    dest: &Path,
    progress: Option<&ProgressBar>,
) -> Result<u64>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }

    let part = sidecar_path(dest);
    let written = match write_chunks(&mut stream, &part, progress).await {
        Ok(0) => {
            let _ = fs::remove_file(&part).await;
            return Err(Error::Storage(format!(
                "Empty response body for {}",
                dest.display()
            )));
        }
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(&part).await;
            return Err(e);
        }
    };

    fs::rename(&part, dest).await?;
    Ok(written)
}

async fn write_chunks<S, B, E>(
    stream: &mut S,
    part: &Path,
    progress: Option<&ProgressBar>,
) -> Result<u64>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut file = File::create(part).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::Storage(format!("Stream error: {}", e)))?;
        let bytes = chunk.as_ref();
        file.write_all(bytes).await?;
        written += bytes.len() as u64;

        if let Some(pb) = progress {
            pb.set_position(written);
        }
    }

    file.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_stream_renames_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a/b/image_01.jpg");
        let chunks: Vec<std::result::Result<Vec<u8>, String>> =
            vec![Ok(b"ab".to_vec()), Ok(b"cd".to_vec())];

        let written = stream_to_file(stream::iter(chunks), &dest, None).await.unwrap();

        assert_eq!(written, 4);
        assert_eq!(std::fs::read(&dest).unwrap(), b"abcd");
        assert!(!sidecar_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_interrupted_stream_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("video_01.mp4");
        let chunks: Vec<std::result::Result<Vec<u8>, String>> =
            vec![Ok(b"partial".to_vec()), Err("connection reset".to_string())];

        let result = stream_to_file(stream::iter(chunks), &dest, None).await;

        assert!(result.is_err());
        assert!(!dest.exists());
        assert!(!sidecar_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_empty_stream_fails() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("empty.jpg");
        let chunks: Vec<std::result::Result<Vec<u8>, String>> = Vec::new();

        assert!(stream_to_file(stream::iter(chunks), &dest, None).await.is_err());
        assert!(!dest.exists());
    }

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("/m/image_01_abc.jpg")),
            PathBuf::from("/m/image_01_abc.jpg.part")
        );
    }
}
