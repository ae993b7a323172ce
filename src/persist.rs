use std::{
    fs::File,
    io::{Cursor, Write as _},
    path::{Path, PathBuf},
};

use image::{DynamicImage, RgbaImage};

use crate::{config::OutputFormat, error::PersistError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Persisted {
    pub name: String,
    pub path: PathBuf,
    /// The file contents exactly as written.
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct Persister {
    storage_dir: PathBuf,
    format: OutputFormat,
}

impl Persister {
    pub fn new(storage_dir: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            format,
        }
    }

    pub fn persist(&self, image: &RgbaImage) -> Result<Persisted, PersistError> {
        // create_dir_all already treats a concurrently created dir as success.
        std::fs::create_dir_all(&self.storage_dir).map_err(|source| PersistError::CreateDir {
            path: self.storage_dir.clone(),
            source,
        })?;

        let bytes = encode(image, self.format)?;
        let name = output_name(self.format);
        let path = self.storage_dir.join(&name);

        write_new_file(&path, |f| f.write_all(&bytes)).map_err(|source| PersistError::Write {
            path: path.clone(),
            source,
        })?;

        tracing::info!(path = %path.display(), "image file saved locally");
        Ok(Persisted { name, path, bytes })
    }
}

/// Creates `path` (never overwriting) and fills it via `fill`. A failed fill
/// or sync removes the partial file so no truncated output stays visible.
fn write_new_file(
    path: &Path,
    fill: impl FnOnce(&mut File) -> std::io::Result<()>,
) -> std::io::Result<()> {
    let mut f = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    let res = fill(&mut f).and_then(|()| f.sync_all());
    if res.is_err() {
        drop(f);
        if let Err(rm) = std::fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %rm, "remove partial output");
        }
    }
    res
}

/// `<hex xxh3-128 of a fresh v4 uuid>.<ext>`
pub fn output_name(format: OutputFormat) -> String {
    let id = uuid::Uuid::new_v4();
    let digest = xxhash_rust::xxh3::xxh3_128(id.to_string().as_bytes());
    format!("{digest:032x}.{}", format.extension())
}

pub fn encode(image: &RgbaImage, format: OutputFormat) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    let mut cursor = Cursor::new(&mut buf);
    if format.supports_alpha() {
        image.write_to(&mut cursor, format.image_format())?;
    } else {
        DynamicImage::ImageRgba8(image.clone())
            .to_rgb8()
            .write_to(&mut cursor, format.image_format())?;
    }
    Ok(buf)
}
