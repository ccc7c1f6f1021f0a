use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tokio::fs;
use uuid::Uuid;

use crate::{constants::IMAGE_TYPES, error::StoreResult};

/// Local filesystem home for uploaded files. Paths handed out are relative to
/// `root` and become public URLs when prefixed with `base_url`.
#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
    base_url: String,
}

impl MediaStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };

        Self {
            root: root.into(),
            base_url,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, relative: &str) -> String {
        format!("{}{}", self.base_url, relative)
    }

    /// Writes `bytes` under `dir` with a fresh uuid file name, returns the relative path.
    pub async fn save(&self, dir: &str, extension: &str, bytes: &[u8]) -> StoreResult<String> {
        let relative = format!("{dir}/{}.{extension}", Uuid::new_v4());
        let path = self.root.join(&relative);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;

        Ok(relative)
    }

    /// Deletes a file handed out by `save`. A file that is already gone is not an error.
    pub async fn remove(&self, relative: &str) -> StoreResult<()> {
        match fs::remove_file(self.root.join(relative)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Detects the image format from its leading bytes.
pub fn sniff_image(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

pub fn extension_for(content_type: &str) -> Option<&'static str> {
    IMAGE_TYPES
        .iter()
        .find(|(mime, _)| *mime == content_type)
        .map(|(_, ext)| *ext)
}
