use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use leanda_core::LeandaError;
use thiserror::Error;
use time::PrimitiveDateTime;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::backoff::Backoff;
use super::entry::EntryKind;
use super::journal::{JournalError, SyncJournal, TIMESTAMP_FORMAT, now_timestamp};
use super::paths::local_child_path;
use super::store::RemoteStore;
use super::transfer::{DownloadOutcome, TransferExecutor, UploadOutcome};
use super::walker::{RemoteWalker, list_local};

const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
    #[error("api error: {0}")]
    Api(#[from] LeandaError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("{0} is not a folder")]
    NotADirectory(PathBuf),
    #[error("remote folder {name:?} did not appear under {parent_id} after {waited:?}")]
    FolderTimeout {
        name: String,
        parent_id: String,
        waited: Duration,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    pub page_size: u32,
    pub folder_poll: Backoff,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            folder_poll: Backoff::default(),
        }
    }
}

/// Everything `sync` needs to know about one synchronized folder pair. It is
/// passed explicitly to every pass instead of living in process-wide state.
#[derive(Debug)]
pub struct SyncRoot {
    local_path: PathBuf,
    remote_root_id: String,
    journal: SyncJournal,
    last_sync_time: PrimitiveDateTime,
}

impl SyncRoot {
    pub async fn load(
        local_path: &Path,
        remote_root_id: impl Into<String>,
    ) -> Result<Self, SyncError> {
        match tokio::fs::metadata(local_path).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(SyncError::NotADirectory(local_path.to_path_buf())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(SyncError::NotADirectory(local_path.to_path_buf()));
            }
            Err(err) => return Err(err.into()),
        }
        let journal = SyncJournal::open(local_path).await?;
        let last_sync_time = journal.load_last_sync_time().await?;
        Ok(Self {
            local_path: local_path.to_path_buf(),
            remote_root_id: remote_root_id.into(),
            journal,
            last_sync_time,
        })
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn remote_root_id(&self) -> &str {
        &self.remote_root_id
    }

    pub fn journal(&self) -> &SyncJournal {
        &self.journal
    }

    pub fn last_sync_time(&self) -> PrimitiveDateTime {
        self.last_sync_time
    }

    fn is_metadata_dir(&self, path: &Path) -> bool {
        path == self.journal.dir()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub uploaded: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub remote_folders_created: usize,
    pub local_folders_created: usize,
}

impl SyncReport {
    pub fn transfers(&self) -> usize {
        self.uploaded + self.downloaded
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFolder {
    pub id: String,
    pub created: bool,
}

pub struct SyncEngine<S> {
    store: S,
    settings: SyncSettings,
}

impl<S: RemoteStore> SyncEngine<S> {
    pub fn new(store: S, settings: SyncSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs one full upload pass followed by one full download pass, then
    /// records the sync time. A folder-creation timeout aborts the run and
    /// leaves the previous sync time in place.
    pub async fn sync(
        &self,
        local_path: &Path,
        remote_root_id: &str,
    ) -> Result<SyncReport, SyncError> {
        let root = SyncRoot::load(local_path, remote_root_id).await?;
        self.sync_root(&root).await
    }

    pub async fn sync_root(&self, root: &SyncRoot) -> Result<SyncReport, SyncError> {
        info!(
            local = %root.local_path().display(),
            remote = root.remote_root_id(),
            last_sync = %root
                .last_sync_time()
                .format(TIMESTAMP_FORMAT)
                .unwrap_or_default(),
            "starting sync"
        );
        let mut report = SyncReport::default();

        info!("uploading local changes");
        self.upload_local_files(root, root.remote_root_id(), root.local_path(), &mut report)
            .await?;
        info!("downloading remote changes");
        self.download_remote_files(root, root.remote_root_id(), root.local_path(), &mut report)
            .await?;

        root.journal().store_last_sync_time(now_timestamp()).await?;
        info!(
            uploaded = report.uploaded,
            downloaded = report.downloaded,
            skipped = report.skipped,
            failed = report.failed,
            "sync finished"
        );
        Ok(report)
    }

    /// Uploads every local file under `dir` that is neither journaled nor
    /// already present by name under `parent_id`, mirroring subfolders.
    pub async fn upload_local_files(
        &self,
        root: &SyncRoot,
        parent_id: &str,
        dir: &Path,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let executor = TransferExecutor::new(&self.store, root.journal(), self.settings.page_size);
        for entry in list_local(dir).await? {
            let path = dir.join(&entry.name);
            if root.is_metadata_dir(&path) {
                continue;
            }
            match entry.kind {
                EntryKind::File => match executor.upload(parent_id, &path).await {
                    Ok(UploadOutcome::Uploaded) => report.uploaded += 1,
                    Ok(UploadOutcome::AlreadySynced) => {
                        info!(path = %path.display(), "file was uploaded by an earlier sync, skipping");
                        report.skipped += 1;
                    }
                    Ok(UploadOutcome::RemoteExists) => {
                        info!(path = %path.display(), "file already exists remotely, skipping");
                        report.skipped += 1;
                    }
                    Err(err) => {
                        error!(path = %path.display(), %err, "upload failed");
                        report.failed += 1;
                    }
                },
                EntryKind::Folder => {
                    let folder = self
                        .get_or_create_remote_folder_by_name(parent_id, &entry.name)
                        .await?;
                    if folder.created {
                        report.remote_folders_created += 1;
                    }
                    Box::pin(self.upload_local_files(root, &folder.id, &path, report)).await?;
                }
            }
        }
        Ok(())
    }

    /// Downloads every remote file under `parent_id` that has no same-named
    /// local counterpart in `dir`, creating local folders as needed.
    pub async fn download_remote_files(
        &self,
        root: &SyncRoot,
        parent_id: &str,
        dir: &Path,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let walker = RemoteWalker::new(&self.store, self.settings.page_size);
        let executor = TransferExecutor::new(&self.store, root.journal(), self.settings.page_size);
        for entry in walker.list_all(parent_id).await? {
            let target = match local_child_path(dir, &entry.name) {
                Ok(target) => target,
                Err(err) => {
                    warn!(parent_id, name = %entry.name, %err, "remote name cannot be mapped locally, skipping");
                    report.failed += 1;
                    continue;
                }
            };
            if root.is_metadata_dir(&target) {
                warn!(parent_id, name = %entry.name, "remote entry collides with the metadata folder, skipping");
                report.skipped += 1;
                continue;
            }

            match entry.kind {
                EntryKind::File => {
                    match tokio::fs::try_exists(&target).await {
                        Ok(false) => {}
                        Ok(true) => {
                            info!(path = %target.display(), "file already exists locally, skipping");
                            report.skipped += 1;
                            continue;
                        }
                        Err(err) => {
                            error!(path = %target.display(), %err, "cannot check local file, skipping");
                            report.failed += 1;
                            continue;
                        }
                    }
                    match executor.download(&entry, &target).await {
                        Ok(DownloadOutcome::Downloaded) => report.downloaded += 1,
                        Ok(DownloadOutcome::AlreadySynced) => {
                            info!(path = %target.display(), "file was downloaded by an earlier sync, skipping");
                            report.skipped += 1;
                        }
                        Err(err) => {
                            error!(path = %target.display(), %err, "download failed");
                            report.failed += 1;
                        }
                    }
                }
                EntryKind::Folder => {
                    let Some(folder_id) = entry.remote_id.as_deref() else {
                        continue;
                    };
                    match tokio::fs::metadata(&target).await {
                        Ok(meta) if meta.is_dir() => {}
                        Ok(_) => {
                            warn!(path = %target.display(), "local file has the name of a remote folder, skipping");
                            report.skipped += 1;
                            continue;
                        }
                        Err(err) if err.kind() == io::ErrorKind::NotFound => {
                            if let Err(err) = tokio::fs::create_dir(&target).await {
                                error!(path = %target.display(), %err, "cannot create local folder, skipping");
                                report.failed += 1;
                                continue;
                            }
                            debug!(path = %target.display(), "created local folder");
                            report.local_folders_created += 1;
                        }
                        Err(err) => {
                            error!(path = %target.display(), %err, "cannot check local folder, skipping");
                            report.failed += 1;
                            continue;
                        }
                    }
                    Box::pin(self.download_remote_files(root, folder_id, &target, report)).await?;
                }
            }
        }
        Ok(())
    }

    /// Returns the first folder named `name` under `parent_id`, creating it if
    /// there is none. Creation is only confirmed by a later listing, so the
    /// listing is polled with a growing delay until the folder shows up or the
    /// configured limit passes.
    pub async fn get_or_create_remote_folder_by_name(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<RemoteFolder, SyncError> {
        let walker = RemoteWalker::new(&self.store, self.settings.page_size);
        if let Some(id) = find_folder_id(&walker, parent_id, name).await? {
            return Ok(RemoteFolder { id, created: false });
        }

        info!(parent_id, name, "creating remote folder");
        self.store.create_folder(name, parent_id).await?;

        let backoff = self.settings.folder_poll;
        let started = Instant::now();
        loop {
            if let Some(id) = find_folder_id(&walker, parent_id, name).await? {
                debug!(name, waited = ?started.elapsed(), "remote folder is visible");
                return Ok(RemoteFolder { id, created: true });
            }
            let waited = started.elapsed();
            if backoff.is_exhausted(waited) {
                return Err(SyncError::FolderTimeout {
                    name: name.to_string(),
                    parent_id: parent_id.to_string(),
                    waited,
                });
            }
            tokio::time::sleep(backoff.delay(waited)).await;
        }
    }
}

async fn find_folder_id<S: RemoteStore + ?Sized>(
    walker: &RemoteWalker<'_, S>,
    parent_id: &str,
    name: &str,
) -> Result<Option<String>, LeandaError> {
    Ok(walker
        .first_folder_by_name(parent_id, name)
        .await?
        .and_then(|folder| folder.remote_id))
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
