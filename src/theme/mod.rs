//! # Theme - the local asset catalog
//!
//! [`Theme`] enumerates the files of a theme directory, classifies them and computes
//! content checksums. It also owns the [`RemoteChecksums`] cache that the upload queue
//! consults to decide whether a local file needs to be written at all.
//!
//! File listings are [`FileGlob`]s: lazy, restartable sequences that walk the theme root
//! every time they are iterated, so they always reflect the current disk state.
//!
//! ```rust,no_run
//! use themesync::{config::SyncConfig, theme::Theme};
//!
//! let theme = Theme::new(&SyncConfig::with_root("./my-theme"))?;
//! for file in theme.liquid_files().iter() {
//!     println!("{} {}", file.key(), file.checksum()?);
//! }
//! # Ok::<(), themesync::ThemeSyncError>(())
//! ```

pub mod checksums;
pub mod file;
pub mod ignore;

pub use checksums::RemoteChecksums;
pub use file::{content_checksum, MimeType, ThemeFile};
pub use ignore::IgnoreFilter;

use crate::{
    api::{AdminApi, ApiResponse, Method, RestRequest},
    config::SyncConfig,
    error::ThemeSyncError,
};
use chrono::{DateTime, FixedOffset};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde_json::{json, Value};
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};
use walkdir::{DirEntry, WalkDir};

pub const LIQUID_PATTERN: &str = "**/*.liquid";
pub const JSON_PATTERN: &str = "**/*.json";
pub const ASSET_PATTERN: &str = "assets/*";

/// Settings files land after the rest of the JSON files.
pub const SETTINGS_SCHEMA: &str = "config/settings_schema.json";
pub const SETTINGS_DATA: &str = "config/settings_data.json";

/// A restartable listing of theme files matching a fixed set of patterns.
#[derive(Debug, Clone)]
pub struct FileGlob {
    root: PathBuf,
    patterns: GlobSet,
}

impl FileGlob {
    pub fn new<P: AsRef<Path>>(root: P, patterns: &[&str]) -> Result<FileGlob, ThemeSyncError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(GlobBuilder::new(pattern).literal_separator(true).build()?);
        }
        Ok(FileGlob {
            root: root.as_ref().to_path_buf(),
            patterns: builder.build()?,
        })
    }

    /// Walks the root; sorted by path, dot files and dot directories skipped.
    pub fn iter(&self) -> impl Iterator<Item = ThemeFile> + '_ {
        fn is_hidden(entry: &DirEntry) -> bool {
            entry
                .file_name()
                .to_str()
                .map(|s| s.starts_with('.'))
                .unwrap_or(false)
        }
        WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let relative = e.path().strip_prefix(&self.root).ok()?;
                if self.patterns.is_match(relative) {
                    Some(ThemeFile::new(e.path(), &self.root))
                } else {
                    None
                }
            })
    }

    /// Pattern match only; the file need not exist.
    pub fn matches(&self, file: &ThemeFile) -> bool {
        self.patterns.is_match(file.relative_path())
    }

    pub fn contains(&self, file: &ThemeFile) -> bool {
        file.exists() && self.matches(file)
    }

    pub fn keys(&self) -> BTreeSet<String> {
        self.iter().map(|file| file.key()).collect()
    }
}

impl<'a> IntoIterator for &'a FileGlob {
    type Item = ThemeFile;
    type IntoIter = Box<dyn Iterator<Item = ThemeFile> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

#[derive(Debug)]
pub struct Theme {
    root: PathBuf,
    id: Option<String>,
    shop: Option<String>,
    api_version: String,
    name: Option<String>,
    role: Option<String>,
    ignore_filter: IgnoreFilter,
    checksums: RemoteChecksums,
    theme_files: FileGlob,
    liquid_files: FileGlob,
    json_files: FileGlob,
    asset_files: FileGlob,
}

impl Theme {
    pub fn new(config: &SyncConfig) -> Result<Theme, ThemeSyncError> {
        let root = fs::canonicalize(&config.root).unwrap_or_else(|_| config.root.clone());
        let ignore_filter = IgnoreFilter::new(&config.ignore_files, &config.ignores)?;
        Ok(Theme {
            theme_files: FileGlob::new(&root, &[LIQUID_PATTERN, JSON_PATTERN, ASSET_PATTERN])?,
            liquid_files: FileGlob::new(&root, &[LIQUID_PATTERN])?,
            json_files: FileGlob::new(&root, &[JSON_PATTERN])?,
            asset_files: FileGlob::new(&root, &[ASSET_PATTERN])?,
            root,
            id: config.theme_id.clone(),
            shop: config.shop.clone(),
            api_version: config.api_version.clone(),
            name: None,
            role: None,
            ignore_filter,
            checksums: RemoteChecksums::default(),
        })
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.role = Some(role.to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Every theme of the configured shop, most recently updated first.
    pub fn all(config: &SyncConfig, api: &dyn AdminApi) -> Result<Vec<Theme>, ThemeSyncError> {
        let request = RestRequest::new(Method::GET, config.shop()?, "themes.json", &config.api_version);
        let response = api.rest_request(&request)?;
        let mut listed: Vec<(Option<DateTime<FixedOffset>>, Theme)> = Vec::new();
        for attributes in response.body["themes"].as_array().into_iter().flatten() {
            let id = match &attributes["id"] {
                Value::Number(id) => id.to_string(),
                Value::String(id) => id.clone(),
                _ => continue,
            };
            let mut theme_config = config.clone();
            theme_config.theme_id = Some(id);
            let mut theme = Theme::new(&theme_config)?;
            theme.name = attributes["name"].as_str().map(str::to_string);
            theme.role = attributes["role"].as_str().map(str::to_string);
            let updated_at = attributes["updated_at"]
                .as_str()
                .and_then(|at| DateTime::parse_from_rfc3339(at).ok());
            listed.push((updated_at, theme));
        }
        listed.sort_by(|(a, _), (b, _)| b.cmp(a));
        Ok(listed.into_iter().map(|(_, theme)| theme).collect())
    }

    /// Fills name and role from `GET themes/:id.json`.
    pub fn load_info(&mut self, api: &dyn AdminApi) -> Result<(), ThemeSyncError> {
        let request = self.theme_request(Method::GET)?;
        let response = api.rest_request(&request)?;
        let info = &response.body["theme"];
        self.name = info["name"].as_str().map(str::to_string);
        self.role = info["role"].as_str().map(str::to_string);
        tracing::debug!(
            "[Theme] {} is {:?} ({:?})",
            self.id()?,
            self.name,
            self.role
        );
        Ok(())
    }

    /// Makes this the live theme. No request is sent when it already is.
    pub fn publish(&mut self, api: &dyn AdminApi) -> Result<(), ThemeSyncError> {
        if self.is_live() {
            return Ok(());
        }
        let request = self
            .theme_request(Method::PUT)?
            .with_body(json!({ "theme": { "role": "main" } }).to_string());
        api.rest_request(&request)?;
        self.role = Some("live".to_string());
        Ok(())
    }

    pub fn delete(&self, api: &dyn AdminApi) -> Result<ApiResponse, ThemeSyncError> {
        api.rest_request(&self.theme_request(Method::DELETE)?)
    }

    fn theme_request(&self, method: Method) -> Result<RestRequest, ThemeSyncError> {
        Ok(RestRequest::new(
            method,
            self.shop()?,
            &format!("themes/{}.json", self.id()?),
            &self.api_version,
        ))
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The backend calls the live theme `main`; it is reported as `live`.
    pub fn role(&self) -> Option<&str> {
        match self.role.as_deref() {
            Some("main") => Some("live"),
            role => role,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn id(&self) -> Result<&str, ThemeSyncError> {
        self.id
            .as_deref()
            .ok_or_else(|| ThemeSyncError::Config("theme id is not set".to_string()))
    }

    pub fn shop(&self) -> Result<&str, ThemeSyncError> {
        self.shop
            .as_deref()
            .ok_or_else(|| ThemeSyncError::Config("shop is not set".to_string()))
    }

    pub fn theme_files(&self) -> &FileGlob {
        &self.theme_files
    }

    pub fn liquid_files(&self) -> &FileGlob {
        &self.liquid_files
    }

    pub fn json_files(&self) -> &FileGlob {
        &self.json_files
    }

    pub fn asset_files(&self) -> &FileGlob {
        &self.asset_files
    }

    /// Resolves an absolute or root-relative path.
    pub fn file<P: AsRef<Path>>(&self, path: P) -> ThemeFile {
        ThemeFile::new(path, &self.root)
    }

    pub fn is_theme_file(&self, file: &ThemeFile) -> bool {
        self.theme_files.contains(file)
    }

    /// Whether the path would be a theme file, whether or not it exists.
    pub fn is_theme_path(&self, file: &ThemeFile) -> bool {
        !file.relative_path().is_absolute() && self.theme_files.matches(file)
    }

    pub fn asset_paths(&self) -> BTreeSet<String> {
        self.asset_files.keys()
    }

    pub fn ignore(&self, file: &ThemeFile) -> bool {
        self.ignore_filter.is_match(file.relative_path())
    }

    pub fn is_ignored<P: AsRef<Path>>(&self, path: P) -> bool {
        self.ignore(&self.file(path))
    }

    pub fn checksums(&self) -> &RemoteChecksums {
        &self.checksums
    }

    /// True when the file's content differs from the last known remote state. Unreadable
    /// files count as changed so the failure surfaces on the operation itself.
    pub fn file_has_changed(&self, file: &ThemeFile) -> bool {
        match file.checksum() {
            Ok(local) => self.checksums.get(&file.key()).as_deref() != Some(local.as_str()),
            Err(_) => true,
        }
    }

    /// Remote keys with no local theme file.
    pub fn delete_set(&self) -> BTreeSet<String> {
        let local = self.theme_files.keys();
        self.checksums.delete_set(local.iter().map(String::as_str))
    }

    /// `themes/:id/assets.json`
    pub fn assets_api_path(&self) -> Result<String, ThemeSyncError> {
        Ok(format!("themes/{}/assets.json", self.id()?))
    }

    pub fn editor_url(&self) -> Result<String, ThemeSyncError> {
        Ok(format!(
            "https://{}/admin/themes/{}/editor",
            self.shop()?,
            self.id()?
        ))
    }

    pub fn is_live(&self) -> bool {
        self.role() == Some("live")
    }

    pub fn preview_url(&self) -> Result<String, ThemeSyncError> {
        if self.is_live() {
            Ok(format!("https://{}/", self.shop()?))
        } else {
            Ok(format!(
                "https://{}/?preview_theme_id={}",
                self.shop()?,
                self.id()?
            ))
        }
    }
}
