//! Filesystem output store implementation

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use studio_config::OutputConfig;
use studio_interfaces::{GenerationMetadata, MediaLabel, OutputError, OutputStore};

use crate::naming::media_file_stem;

/// Upper bound on `_N` suffixes tried before giving up on a file name
const MAX_DEDUP_SUFFIX: u32 = 10_000;

/// Writes media into date-organized directories under a root
#[derive(Debug, Clone)]
pub struct FilesystemOutputStore {
    root: PathBuf,
    write_sidecar: bool,
}

impl FilesystemOutputStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_sidecar: true,
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self {
            root: config.root_dir.clone(),
            write_sidecar: config.write_sidecar,
        }
    }

    pub fn with_sidecar(mut self, enabled: bool) -> Self {
        self.write_sidecar = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Save media as if it had been produced at `at`
    pub async fn save_media_at<Tz: TimeZone>(
        &self,
        data: &[u8],
        label: &MediaLabel,
        at: &DateTime<Tz>,
    ) -> Result<PathBuf, OutputError>
    where
        Tz::Offset: std::fmt::Display,
    {
        let dir = self.root.join(at.format("%Y-%m-%d").to_string());
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| filesystem_error(&dir, e))?;

        let stem = media_file_stem(label, at);
        let extension = label.kind.extension();

        for suffix in 0..MAX_DEDUP_SUFFIX {
            let file_name = if suffix == 0 {
                format!("{}.{}", stem, extension)
            } else {
                format!("{}_{}.{}", stem, suffix, extension)
            };
            let path = dir.join(file_name);

            // create_new makes the name reservation atomic
            let file = match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(filesystem_error(&path, e)),
            };

            write_reserved(file, &path, data).await?;

            tracing::debug!("Saved {} bytes to {}", data.len(), path.display());
            return Ok(path);
        }

        Err(OutputError::Filesystem {
            path: dir.join(stem),
            error: "no free file name".to_string(),
        })
    }
}

#[async_trait]
impl OutputStore for FilesystemOutputStore {
    async fn save_media(&self, data: &[u8], label: &MediaLabel) -> Result<PathBuf, OutputError> {
        self.save_media_at(data, label, &Local::now()).await
    }

    async fn save_metadata(
        &self,
        metadata: &GenerationMetadata,
        media_path: &Path,
    ) -> Result<Option<PathBuf>, OutputError> {
        if !self.write_sidecar {
            return Ok(None);
        }

        let mut sidecar = media_path.as_os_str().to_owned();
        sidecar.push(".json");
        let sidecar = PathBuf::from(sidecar);

        let json = serde_json::to_vec_pretty(metadata)
            .map_err(|e| OutputError::Serialization(e.to_string()))?;
        fs::write(&sidecar, json)
            .await
            .map_err(|e| filesystem_error(&sidecar, e))?;

        Ok(Some(sidecar))
    }
}

/// Write into a file just reserved with `create_new`, removing it again if
/// the write fails so no truncated file keeps the name
async fn write_reserved<W>(mut file: W, path: &Path, data: &[u8]) -> Result<(), OutputError>
where
    W: AsyncWrite + Unpin,
{
    let written = match file.write_all(data).await {
        Ok(()) => file.flush().await,
        Err(e) => Err(e),
    };

    if let Err(e) = written {
        drop(file);
        if let Err(remove_error) = fs::remove_file(path).await {
            tracing::warn!(
                "Failed to remove partial file {}: {}",
                path.display(),
                remove_error
            );
        }
        return Err(filesystem_error(path, e));
    }
    Ok(())
}

fn filesystem_error(path: &Path, error: std::io::Error) -> OutputError {
    OutputError::Filesystem {
        path: path.to_path_buf(),
        error: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use studio_interfaces::{GenerationType, MediaKind};
    use tempfile::TempDir;

    fn label(prompt: &str, seed: i64) -> MediaLabel {
        MediaLabel {
            prompt: prompt.to_string(),
            seed,
            generation_type: GenerationType::TextToImage,
            kind: MediaKind::Image,
        }
    }

    fn metadata() -> GenerationMetadata {
        GenerationMetadata {
            prompt: "harbor at dawn".to_string(),
            negative_prompt: String::new(),
            steps: 20,
            sampler_name: "Euler a".to_string(),
            cfg_scale: 7.0,
            width: 512,
            height: 512,
            seed: 42,
            backend_name: "daemon".to_string(),
            generation_time_seconds: 1.5,
            generation_type: GenerationType::TextToImage,
        }
    }

    #[tokio::test]
    async fn test_media_lands_in_dated_directory() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemOutputStore::new(temp_dir.path());
        let at = Utc.with_ymd_and_hms(2026, 5, 1, 13, 45, 0).unwrap();

        let path = store
            .save_media_at(b"png-bytes", &label("Harbor at dawn", 42), &at)
            .await
            .unwrap();

        assert_eq!(
            path,
            temp_dir
                .path()
                .join("2026-05-01")
                .join("txt2img_134500_42_harbor-at-dawn.png")
        );
        assert_eq!(std::fs::read(&path).unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn test_name_collisions_get_numeric_suffix() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemOutputStore::new(temp_dir.path());
        let at = Utc.with_ymd_and_hms(2026, 5, 1, 13, 45, 0).unwrap();
        let label = label("same", 7);

        let first = store.save_media_at(b"a", &label, &at).await.unwrap();
        let second = store.save_media_at(b"b", &label, &at).await.unwrap();
        let third = store.save_media_at(b"c", &label, &at).await.unwrap();

        assert!(first.ends_with("txt2img_134500_7_same.png"));
        assert!(second.ends_with("txt2img_134500_7_same_1.png"));
        assert!(third.ends_with("txt2img_134500_7_same_2.png"));
        assert_eq!(std::fs::read(&first).unwrap(), b"a");
    }

    #[tokio::test]
    async fn test_sidecar_written_next_to_media() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemOutputStore::new(temp_dir.path());
        let media = store
            .save_media(b"bytes", &label("harbor at dawn", 42))
            .await
            .unwrap();

        let sidecar = store
            .save_metadata(&metadata(), &media)
            .await
            .unwrap()
            .expect("sidecar enabled");

        assert_eq!(sidecar.file_name().unwrap().to_string_lossy(), format!(
            "{}.json",
            media.file_name().unwrap().to_string_lossy()
        ));
        let parsed: GenerationMetadata =
            serde_json::from_slice(&std::fs::read(&sidecar).unwrap()).unwrap();
        assert_eq!(parsed, metadata());
    }

    #[tokio::test]
    async fn test_sidecar_can_be_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemOutputStore::new(temp_dir.path()).with_sidecar(false);
        let media = store.save_media(b"bytes", &label("x", 1)).await.unwrap();

        let sidecar = store.save_metadata(&metadata(), &media).await.unwrap();
        assert!(sidecar.is_none());

        let mut would_be = media.as_os_str().to_owned();
        would_be.push(".json");
        assert!(!PathBuf::from(would_be).exists());
    }

    #[tokio::test]
    async fn test_failed_write_releases_reserved_name() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("txt2img_134500_7_x.png");
        std::fs::write(&path, b"").unwrap();

        let failing = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(ErrorKind::Other, "disk full"))
            .build();
        let result = write_reserved(failing, &path, b"png-bytes").await;

        match result {
            Err(OutputError::Filesystem { path: failed, error }) => {
                assert_eq!(failed, path);
                assert!(error.contains("disk full"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unwritable_root_is_filesystem_error() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let store = FilesystemOutputStore::new(&blocker);
        let result = store.save_media(b"bytes", &label("x", 1)).await;
        assert!(matches!(result, Err(OutputError::Filesystem { .. })));
    }
}
