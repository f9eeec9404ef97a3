use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::info;

use super::journal::METADATA_DIR_NAME;

/// A filesystem change under the sync root. Paths are relative to the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Created { path: PathBuf },
    Modified { path: PathBuf },
    Deleted { path: PathBuf },
    Moved { from: PathBuf, to: PathBuf },
}

pub fn start_notify_watcher(
    root: &Path,
) -> notify::Result<(RecommendedWatcher, mpsc::UnboundedReceiver<WatchEvent>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let root = root.to_path_buf();
    let watch_root = root.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        if let Ok(event) = res {
            for mapped in map_event(&watch_root, event) {
                let _ = tx.send(mapped);
            }
        }
    })?;
    watcher.watch(root.as_path(), RecursiveMode::Recursive)?;
    Ok((watcher, rx))
}

/// Single dispatch point for watcher events. Events are reported only; they
/// do not start an incremental sync.
pub fn handle_event(event: &WatchEvent) {
    match event {
        WatchEvent::Created { path } => info!(path = %path.display(), "local file created"),
        WatchEvent::Modified { path } => info!(path = %path.display(), "local file modified"),
        WatchEvent::Deleted { path } => info!(path = %path.display(), "local file deleted"),
        WatchEvent::Moved { from, to } => {
            info!(from = %from.display(), to = %to.display(), "local file moved")
        }
    }
}

fn map_event(root: &Path, event: Event) -> Vec<WatchEvent> {
    match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if event.paths.len() >= 2
                && let (Some(from), Some(to)) = (
                    relative_path(root, &event.paths[0]),
                    relative_path(root, &event.paths[1]),
                )
            {
                return vec![WatchEvent::Moved { from, to }];
            }
            Vec::new()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) | EventKind::Remove(_) => event
            .paths
            .iter()
            .filter_map(|path| relative_path(root, path))
            .map(|path| WatchEvent::Deleted { path })
            .collect(),
        EventKind::Modify(ModifyKind::Name(_)) | EventKind::Create(_) => event
            .paths
            .iter()
            .filter_map(|path| relative_path(root, path))
            .map(|path| WatchEvent::Created { path })
            .collect(),
        EventKind::Modify(_) => event
            .paths
            .iter()
            .filter_map(|path| relative_path(root, path))
            .map(|path| WatchEvent::Modified { path })
            .collect(),
        _ => Vec::new(),
    }
}

/// Maps an absolute path under `root` to a relative one. Changes inside the
/// metadata directory are the sync's own bookkeeping and are dropped.
fn relative_path(root: &Path, path: &Path) -> Option<PathBuf> {
    let relative = path.strip_prefix(root).ok()?;
    if relative.starts_with(METADATA_DIR_NAME) {
        return None;
    }
    Some(relative.to_path_buf())
}
