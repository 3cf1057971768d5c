use super::sse::SseStreams;
use crate::{error::ThemeSyncError, theme::Theme, upload::UploadQueue};
use notify_debouncer_full::{
    new_debouncer,
    notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher},
    DebounceEventResult, Debouncer, FileIdMap,
};
use serde_json::json;
use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Component, PathBuf},
    sync::Arc,
    time::Duration,
};

type ThemeDebouncer = Debouncer<RecommendedWatcher, FileIdMap>;

/// Uploads theme files as they change on disk and tells browsers about it.
///
/// Stops watching when dropped.
pub struct ThemeWatcher {
    debouncer: ThemeDebouncer,
    root: PathBuf,
}

impl ThemeWatcher {
    pub fn start(
        theme: Arc<Theme>,
        uploader: Arc<UploadQueue>,
        streams: SseStreams,
        debounce: Duration,
    ) -> Result<ThemeWatcher, ThemeSyncError> {
        let root = theme.root().to_path_buf();
        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let paths: Vec<PathBuf> = events
                        .iter()
                        .filter(|event| {
                            matches!(
                                event.event.kind,
                                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                            )
                        })
                        .flat_map(|event| event.paths.iter().cloned())
                        .collect();
                    if !paths.is_empty() {
                        dispatch_changes(&theme, &uploader, &streams, paths);
                    }
                }
                Err(errors) => {
                    tracing::error!("[Watcher] notify debouncer returned errors: {:?}", errors);
                }
            }
        })?;
        debouncer
            .watcher()
            .watch(&root, RecursiveMode::Recursive)?;
        tracing::info!("[Watcher] watching {}", root.display());
        Ok(ThemeWatcher { debouncer, root })
    }

    pub fn stop(mut self) {
        if let Err(e) = self.debouncer.watcher().unwatch(&self.root) {
            tracing::debug!("[Watcher] unwatch {}: {}", self.root.display(), e);
        }
    }
}

/// Handles one debounced batch of changed paths: existing theme files become updates,
/// vanished ones deletes (directories are skipped), and a single `{"modified": [...]}` message goes out with the
/// sorted relative paths. Returns those paths.
pub fn dispatch_changes<I>(
    theme: &Theme,
    uploader: &UploadQueue,
    streams: &SseStreams,
    paths: I,
) -> Vec<String>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut updated = BTreeMap::new();
    let mut removed = BTreeSet::new();
    for path in paths {
        if path.is_dir() {
            continue;
        }
        let file = theme.file(&path);
        let hidden = file.relative_path().components().any(|component| {
            matches!(component, Component::Normal(name) if name.to_string_lossy().starts_with('.'))
        });
        if hidden || !theme.is_theme_path(&file) {
            continue;
        }
        if file.exists() {
            updated.insert(file.key(), file);
        } else if theme.checksums().contains(&file.key()) {
            // Removed directories look like removed files; only known remote keys count.
            removed.insert(file.key());
        }
    }

    let modified: Vec<String> = updated
        .keys()
        .cloned()
        .chain(removed.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if modified.is_empty() {
        return modified;
    }

    tracing::debug!("[Watcher] {} theme files changed", modified.len());
    uploader.enqueue_updates(updated.into_values());
    uploader.enqueue_deletes(removed);
    streams.broadcast_json(&json!({ "modified": modified }));
    modified
}
