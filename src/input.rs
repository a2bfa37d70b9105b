//! Input adapter: turns raw files into the batch handed to the orchestrator.

use std::path::Path;

use bytes::Bytes;

use crate::formats::is_supported_extension;
use crate::job::source_extension;
use crate::orchestrator::MAX_JOBS;

/// A file offered for conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Bytes,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, keeping only its file name.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        Ok(Self::new(name, bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the extension is on the input allow-list.
    pub fn is_supported(&self) -> bool {
        source_extension(&self.name)
            .map(|ext| is_supported_extension(&ext))
            .unwrap_or(false)
    }
}

/// Keep supported files, in order, up to the batch limit.
pub fn accept_batch(files: impl IntoIterator<Item = SourceFile>) -> Vec<SourceFile> {
    let mut accepted = Vec::new();
    for file in files {
        if !file.is_supported() {
            log::warn!("Ignoring unsupported file {}", file.name);
            continue;
        }
        if accepted.len() == MAX_JOBS {
            log::warn!("Batch limit of {} reached, dropping {}", MAX_JOBS, file.name);
            continue;
        }
        accepted.push(file);
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_by_extension() {
        let batch = accept_batch(vec![
            SourceFile::new("a.mkv", vec![1u8]),
            SourceFile::new("notes.txt", vec![2u8]),
            SourceFile::new("b.MOV", vec![3u8]),
            SourceFile::new("noext", vec![4u8]),
        ]);
        let names: Vec<_> = batch.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.mkv", "b.MOV"]);
    }

    #[test]
    fn test_caps_batch_size() {
        let files = (0..8).map(|i| SourceFile::new(format!("clip{}.mp4", i), vec![i as u8]));
        let batch = accept_batch(files);
        assert_eq!(batch.len(), MAX_JOBS);
        assert_eq!(batch[4].name, "clip4.mp4");
    }

    #[tokio::test]
    async fn test_from_path_reads_bytes() {
        let dir = std::env::temp_dir().join(format!("remux-input-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("movie.mkv");
        tokio::fs::write(&path, b"matroska").await.unwrap();

        let file = SourceFile::from_path(&path).await.unwrap();
        assert_eq!(file.name, "movie.mkv");
        assert_eq!(file.bytes, Bytes::from_static(b"matroska"));
        assert!(file.is_supported());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
