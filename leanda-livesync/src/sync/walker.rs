use std::io;
use std::path::Path;

use leanda_core::LeandaError;
use tracing::{debug, warn};

use super::entry::{Entry, EntryKind};
use super::journal::format_system_time;
use super::paths::is_reserved_name;
use super::store::RemoteStore;

/// Lists the direct children of a local directory. Reserved-prefix files are
/// left out; anything that is neither a regular file nor a directory is too.
pub async fn list_local(dir: &Path) -> io::Result<Vec<Entry>> {
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    let mut entries = Vec::new();
    while let Some(child) = read_dir.next_entry().await? {
        let name = child.file_name().to_string_lossy().into_owned();
        let meta = match tokio::fs::metadata(child.path()).await {
            Ok(meta) => meta,
            Err(err) => {
                warn!(path = %child.path().display(), %err, "cannot stat local entry, skipping");
                continue;
            }
        };
        let modified = meta
            .modified()
            .ok()
            .and_then(|at| format_system_time(at).ok());
        if meta.is_dir() {
            entries.push(Entry::local(name, EntryKind::Folder, modified));
        } else if meta.is_file() {
            if is_reserved_name(&name) {
                debug!(path = %child.path().display(), "skipping hidden local file");
                continue;
            }
            entries.push(Entry::local(name, EntryKind::File, modified));
        }
    }
    Ok(entries)
}

/// Per-folder listing of the remote tree.
pub struct RemoteWalker<'a, S: ?Sized> {
    store: &'a S,
    page_size: u32,
}

impl<'a, S: RemoteStore + ?Sized> RemoteWalker<'a, S> {
    pub fn new(store: &'a S, page_size: u32) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    /// All children of `folder_id`, following pagination to the end. A server
    /// error on any page ends the listing with what was collected so far, so
    /// one failing folder does not abort the sync.
    pub async fn list_all(&self, folder_id: &str) -> Result<Vec<Entry>, LeandaError> {
        let mut page = match self.store.list_children(folder_id, 1, self.page_size).await {
            Ok(page) => page,
            Err(err) if err.is_server_error() => {
                warn!(folder_id, %err, "remote listing failed, treating folder as empty");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };
        let mut nodes = std::mem::take(&mut page.items);
        while let Some(link) = page.next_page_link.take() {
            page = match self.store.list_page(&link).await {
                Ok(page) => page,
                Err(err) if err.is_server_error() => {
                    warn!(folder_id, %err, "remote listing page failed, keeping earlier pages");
                    break;
                }
                Err(err) => return Err(err),
            };
            nodes.append(&mut page.items);
        }
        Ok(nodes.into_iter().filter_map(Entry::from_node).collect())
    }

    pub async fn folders(&self, folder_id: &str) -> Result<Vec<Entry>, LeandaError> {
        Ok(self
            .list_all(folder_id)
            .await?
            .into_iter()
            .filter(Entry::is_folder)
            .collect())
    }

    pub async fn files(&self, folder_id: &str) -> Result<Vec<Entry>, LeandaError> {
        Ok(self
            .list_all(folder_id)
            .await?
            .into_iter()
            .filter(Entry::is_file)
            .collect())
    }

    pub async fn first_folder_by_name(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<Option<Entry>, LeandaError> {
        Ok(first_by_name(self.folders(parent_id).await?, parent_id, name))
    }

    pub async fn first_file_by_name(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<Option<Entry>, LeandaError> {
        Ok(first_by_name(self.files(parent_id).await?, parent_id, name))
    }
}

fn first_by_name(entries: Vec<Entry>, parent_id: &str, name: &str) -> Option<Entry> {
    let mut matches = entries.into_iter().filter(|entry| entry.name == name);
    let first = matches.next()?;
    let extra = matches.count();
    if extra > 0 {
        warn!(parent_id, name, duplicates = extra + 1, "several remote entries share a name, using the first");
    }
    Some(first)
}
