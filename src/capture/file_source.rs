//! Directory-backed frame source
//!
//! Frames are the image files of a single directory, ordered by ascending
//! file name. The directory is listed once at construction; each file is
//! decoded lazily as the sequence is consumed.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};

use crate::capture::decoder;
use crate::capture::frame::{Frame, FrameMetadata, FrameOrigin, PixelFormat};
use crate::error::{FeedError, Result};

/// Finite, non-restartable sequence of frames loaded from a directory
pub struct FrameSource {
    dir: PathBuf,
    entries: std::vec::IntoIter<PathBuf>,
    total: usize,
    loaded: u64,
    skipped: u64,
}

impl FrameSource {
    /// List `dir`, keep files whose extension is one of `extensions`, sort by
    /// file name and keep the first `max_frame_count` of them.
    #[instrument(skip(extensions))]
    pub fn open(dir: &Path, extensions: &[String], max_frame_count: Option<usize>) -> Result<Self> {
        if !dir.is_dir() {
            return Err(FeedError::MissingDirectory(dir.to_path_buf()));
        }

        let io_err = |source| FeedError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let path = entry.path();
            if path.is_file() && has_extension(&path, extensions) {
                entries.push(path);
            }
        }

        // File-name order is the frame order
        entries.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        if let Some(max) = max_frame_count {
            entries.truncate(max);
        }

        info!("Found {} images in {}", entries.len(), dir.display());

        Ok(Self {
            dir: dir.to_path_buf(),
            total: entries.len(),
            entries: entries.into_iter(),
            loaded: 0,
            skipped: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of entries selected at construction
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Frames decoded so far
    pub fn loaded(&self) -> u64 {
        self.loaded
    }

    /// Entries skipped because they failed to decode
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn load(path: PathBuf, sequence: u64) -> Result<Frame> {
        let image = decoder::decode_file(&path)?;
        let (width, height) = image.dimensions();

        Ok(Frame::new(
            Bytes::from(image.into_raw()),
            FrameMetadata {
                sequence,
                width,
                height,
                stride: width * 3,
                format: PixelFormat::Rgb24,
                origin: FrameOrigin::File { path },
            },
        ))
    }
}

impl Iterator for FrameSource {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        for path in self.entries.by_ref() {
            match Self::load(path.clone(), self.loaded) {
                Ok(frame) => {
                    debug!(sequence = self.loaded, path = %path.display(), "Loaded frame");
                    self.loaded += 1;
                    metrics::counter!("framefeed_frames_loaded_total").increment(1);
                    return Some(frame);
                }
                Err(e) => {
                    warn!("Failed to load image {}: {}", path.display(), e);
                    self.skipped += 1;
                    metrics::counter!("framefeed_frames_skipped_total").increment(1);
                }
            }
        }
        None
    }
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn png_ext() -> Vec<String> {
        vec!["png".to_string()]
    }

    fn write_png(dir: &Path, name: &str, shade: u8) {
        RgbImage::from_pixel(2, 2, Rgb([shade, shade, shade]))
            .save(dir.join(name))
            .unwrap();
    }

    fn names(source: FrameSource) -> Vec<String> {
        source
            .map(|f| {
                f.path()
                    .and_then(|p| p.file_name())
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect()
    }

    #[test]
    fn orders_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        for (i, name) in ["f0003.png", "f0001.png", "f0010.png", "f0002.png"]
            .iter()
            .enumerate()
        {
            write_png(dir.path(), name, i as u8);
        }

        let source = FrameSource::open(dir.path(), &png_ext(), None).unwrap();
        assert_eq!(source.len(), 4);
        assert_eq!(
            names(source),
            vec!["f0001.png", "f0002.png", "f0003.png", "f0010.png"]
        );
    }

    #[test]
    fn ignores_other_extensions_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "a.png", 1);
        write_png(dir.path(), "b.png", 2);
        std::fs::rename(dir.path().join("b.png"), dir.path().join("b.PNG")).unwrap();
        write_png(dir.path(), "c.png", 3);
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();

        let source = FrameSource::open(dir.path(), &png_ext(), Some(2)).unwrap();
        assert_eq!(names(source), vec!["a.png", "b.PNG"]);
    }

    #[test]
    fn skips_undecodable_files() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "f0001.png", 1);
        std::fs::write(dir.path().join("f0002.png"), b"corrupt").unwrap();
        write_png(dir.path(), "f0003.png", 3);

        let mut source = FrameSource::open(dir.path(), &png_ext(), None).unwrap();
        let first = source.next().unwrap();
        let second = source.next().unwrap();
        assert!(source.next().is_none());

        assert_eq!(first.sequence(), 0);
        assert_eq!(second.sequence(), 1);
        assert!(second.path().unwrap().ends_with("f0003.png"));
        assert_eq!(second.data.len(), 2 * 2 * 3);
        assert_eq!(source.loaded(), 2);
        assert_eq!(source.skipped(), 1);
    }

    #[test]
    fn missing_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            FrameSource::open(&missing, &png_ext(), None),
            Err(FeedError::MissingDirectory(_))
        ));
    }
}
