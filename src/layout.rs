//! Source file path decomposition.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// A source path broken into the pieces conversions need: directory,
/// stem, and extension.
#[derive(Debug, Clone)]
pub struct FileLayout {
    /// Absolute path to the source file.
    pub input: PathBuf,
    /// Directory containing the source.
    pub directory: PathBuf,
    /// File name without extension.
    pub stem: String,
    /// Extension, lowercased, without the dot.
    pub extension: String,
}

impl FileLayout {
    pub fn new(path: &Path) -> Result<Self> {
        let input = std::path::absolute(path)
            .with_context(|| format!("Failed to resolve path: {:?}", path))?;
        let directory = input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .with_context(|| format!("Input has no usable file name: {:?}", path))?
            .to_string();
        let extension = input
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();

        Ok(Self {
            input,
            directory,
            stem,
            extension,
        })
    }

    /// Destination path for the converted file: `<dir>/<stem>.<extension>`,
    /// next to the source when no output directory is configured.
    pub fn output_path(&self, output_dir: Option<&Path>, extension: &str) -> PathBuf {
        let dir = output_dir.unwrap_or(&self.directory);
        dir.join(format!("{}.{}", self.stem, extension))
    }

    /// Sidecar path `<dir>/<stem>.<middle>.<extension>` used for extracted
    /// subtitles.
    pub fn sidecar_path(&self, output_dir: Option<&Path>, middle: &str, extension: &str) -> PathBuf {
        let dir = output_dir.unwrap_or(&self.directory);
        dir.join(format!("{}.{}.{}", self.stem, middle, extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decomposes_path() {
        let layout = FileLayout::new(Path::new("/media/shows/Episode.S01E02.mkv")).unwrap();
        assert_eq!(layout.stem, "Episode.S01E02");
        assert_eq!(layout.extension, "mkv");
        assert_eq!(layout.directory, Path::new("/media/shows"));
    }

    #[test]
    fn output_path_prefers_configured_dir() {
        let layout = FileLayout::new(Path::new("/media/a.MKV")).unwrap();
        assert_eq!(layout.extension, "mkv");
        assert_eq!(
            layout.output_path(None, "mp4"),
            Path::new("/media/a.mp4")
        );
        assert_eq!(
            layout.output_path(Some(Path::new("/out")), "mp4"),
            Path::new("/out/a.mp4")
        );
    }
}
