use crate::error::ThemeSyncError;
use md5::{Digest, Md5};
use std::{
    fs,
    hash::{Hash, Hasher},
    path::{Path, PathBuf},
};

const MIME_TYPES: &[(&str, &str)] = &[
    ("liquid", "text/x-liquid"),
    ("json", "application/json"),
    ("css", "text/css"),
    ("scss", "text/x-scss"),
    ("js", "application/javascript"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("xml", "application/xml"),
    ("svg", "image/svg+xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("ico", "image/x-icon"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    ("otf", "font/otf"),
    ("eot", "application/vnd.ms-fontobject"),
    ("mp4", "video/mp4"),
    ("pdf", "application/pdf"),
];

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MimeType(&'static str);

impl MimeType {
    pub fn by_filename<P: AsRef<Path>>(path: P) -> MimeType {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        ext.and_then(|ext| {
            MIME_TYPES
                .iter()
                .find(|(known, _)| *known == ext)
                .map(|(_, name)| MimeType(name))
        })
        .unwrap_or(MimeType(DEFAULT_MIME_TYPE))
    }

    pub fn name(&self) -> &'static str {
        self.0
    }

    pub fn is_json(&self) -> bool {
        self.0 == "application/json"
    }

    pub fn is_text(&self) -> bool {
        self.0.starts_with("text/")
            || self.is_json()
            || matches!(
                self.0,
                "application/javascript" | "application/xml" | "image/svg+xml"
            )
    }
}

/// A file of the theme, identified by its path relative to the theme root.
#[derive(Debug, Clone)]
pub struct ThemeFile {
    path: PathBuf,
    relative_path: PathBuf,
}

impl ThemeFile {
    /// `path` may be absolute or relative to `root`.
    pub fn new<P: AsRef<Path>, R: AsRef<Path>>(path: P, root: R) -> ThemeFile {
        let root = root.as_ref();
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };
        let relative_path = match path.strip_prefix(root) {
            Ok(relative) => relative.to_path_buf(),
            // Watchers may report canonical paths for a root given through a symlink.
            Err(_) => match (fs::canonicalize(&path), fs::canonicalize(root)) {
                (Ok(abs_path), Ok(abs_root)) => abs_path
                    .strip_prefix(&abs_root)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|_| path.clone()),
                _ => path.clone(),
            },
        };
        ThemeFile {
            path,
            relative_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    /// Asset key as used by the Admin API: the relative path with `/` separators.
    pub fn key(&self) -> String {
        relative_key(&self.relative_path)
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn read(&self) -> Result<Vec<u8>, ThemeSyncError> {
        Ok(fs::read(&self.path)?)
    }

    pub fn mime_type(&self) -> MimeType {
        MimeType::by_filename(&self.relative_path)
    }

    pub fn is_text(&self) -> bool {
        self.mime_type().is_text()
    }

    pub fn is_liquid(&self) -> bool {
        self.path.extension().is_some_and(|ext| ext == "liquid")
    }

    pub fn is_json(&self) -> bool {
        self.path.extension().is_some_and(|ext| ext == "json")
    }

    pub fn is_template(&self) -> bool {
        self.key().starts_with("templates/")
    }

    /// MD5 hex digest of the content, JSON normalized to match the backend.
    pub fn checksum(&self) -> Result<String, ThemeSyncError> {
        let content = self.read()?;
        Ok(content_checksum(&content, self.mime_type().is_json()))
    }
}

impl PartialEq for ThemeFile {
    fn eq(&self, other: &Self) -> bool {
        self.relative_path == other.relative_path
    }
}

impl Eq for ThemeFile {}

impl Hash for ThemeFile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.relative_path.hash(state);
    }
}

pub(crate) fn relative_key(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Malformed JSON falls back to hashing the raw bytes.
pub fn content_checksum(content: &[u8], json: bool) -> String {
    let normalized = if json {
        serde_json::from_slice::<serde_json::Value>(content)
            .ok()
            .and_then(|value| serde_json::to_vec(&value).ok())
    } else {
        None
    };
    let mut hasher = Md5::new();
    hasher.update(normalized.as_deref().unwrap_or(content));
    hex::encode(hasher.finalize())
}
