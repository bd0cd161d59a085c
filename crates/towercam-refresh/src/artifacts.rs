//! On-disk frame and composite files.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// Locations of the raw webcam frame and the built composite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    raw_frame: PathBuf,
    composite: PathBuf,
}

impl ArtifactPaths {
    pub fn new(raw_frame: impl Into<PathBuf>, composite: impl Into<PathBuf>) -> Self {
        Self {
            raw_frame: raw_frame.into(),
            composite: composite.into(),
        }
    }

    pub fn raw_frame(&self) -> &Path {
        &self.raw_frame
    }

    pub fn composite(&self) -> &Path {
        &self.composite
    }

    /// Write a frame next to the raw frame path without replacing it yet.
    pub fn stage_frame(&self, bytes: &[u8]) -> io::Result<StagedFrame> {
        let file = staged(&self.raw_frame, bytes)?;
        Ok(StagedFrame {
            file,
            target: self.raw_frame.clone(),
        })
    }

    pub fn write_composite(&self, png: &[u8]) -> io::Result<()> {
        write_atomic(&self.composite, png)
    }

    /// The last built composite, if one is on disk.
    pub fn read_composite(&self) -> io::Result<Option<Vec<u8>>> {
        read_optional(&self.composite)
    }

    pub fn read_raw_frame(&self) -> io::Result<Option<Vec<u8>>> {
        read_optional(&self.raw_frame)
    }
}

/// A frame written to a temp file, waiting for its merge to be committed.
///
/// Dropping it without calling [`StagedFrame::commit`] removes the temp file.
#[derive(Debug)]
pub struct StagedFrame {
    file: NamedTempFile,
    target: PathBuf,
}

impl StagedFrame {
    /// Move the staged frame over the raw frame path.
    pub fn commit(self) -> io::Result<()> {
        self.file.persist(&self.target).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Replace `path` with `bytes` so readers see either the old or the new file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    staged(path, bytes)?.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn staged(path: &Path, bytes: &[u8]) -> io::Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    Ok(file)
}

fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
