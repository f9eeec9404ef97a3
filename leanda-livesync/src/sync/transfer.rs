use std::io;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use leanda_core::LeandaError;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::entry::Entry;
use super::journal::{JournalError, JournalRecord, SyncJournal, format_system_time};
use super::paths::partial_path;
use super::store::RemoteStore;
use super::walker::RemoteWalker;

/// Downloads are written and flushed in pieces of this size.
pub const DOWNLOAD_CHUNK_SIZE: usize = 1024;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("api error: {0}")]
    Api(#[from] LeandaError),
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("timestamp format error: {0}")]
    Format(#[from] time::error::Format),
    #[error("file {0} not found")]
    Missing(PathBuf),
    #[error("remote file {0} has no blob to download")]
    MissingBlob(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded,
    AlreadySynced,
    RemoteExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded,
    AlreadySynced,
}

/// Moves single files between the two sides and journals each completed
/// transfer.
pub struct TransferExecutor<'a, S: ?Sized> {
    store: &'a S,
    journal: &'a SyncJournal,
    page_size: u32,
}

impl<'a, S: RemoteStore + ?Sized> TransferExecutor<'a, S> {
    pub fn new(store: &'a S, journal: &'a SyncJournal, page_size: u32) -> Self {
        Self {
            store,
            journal,
            page_size,
        }
    }

    pub async fn upload(
        &self,
        parent_id: &str,
        local_path: &Path,
    ) -> Result<UploadOutcome, TransferError> {
        let meta = match tokio::fs::metadata(local_path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(TransferError::Missing(local_path.to_path_buf())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(TransferError::Missing(local_path.to_path_buf()));
            }
            Err(err) => return Err(err.into()),
        };
        let local_modified = format_system_time(meta.modified()?)?;
        let record = JournalRecord::LocalSynced {
            local_modified: local_modified.clone(),
            absolute_path: std::path::absolute(local_path)?,
        };
        if self.journal.is_recorded(&record).await? {
            return Ok(UploadOutcome::AlreadySynced);
        }

        let file_name = local_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let walker = RemoteWalker::new(self.store, self.page_size);
        if walker
            .first_file_by_name(parent_id, &file_name)
            .await?
            .is_some()
        {
            return Ok(UploadOutcome::RemoteExists);
        }

        info!(path = %local_path.display(), "uploading file");
        self.store
            .upload_file(parent_id, local_path, &local_modified)
            .await?;
        self.journal.record(&record).await?;
        Ok(UploadOutcome::Uploaded)
    }

    /// Streams a remote file to `target`. The caller has already checked that
    /// `target` does not exist. Bytes go to a hidden partial file that is only
    /// renamed into place once the whole body has arrived.
    pub async fn download(
        &self,
        entry: &Entry,
        target: &Path,
    ) -> Result<DownloadOutcome, TransferError> {
        let blob = entry
            .blob
            .as_ref()
            .ok_or_else(|| TransferError::MissingBlob(entry.name.clone()))?;
        let record = JournalRecord::RemoteSynced {
            blob_modified: blob
                .modified
                .clone()
                .or_else(|| entry.modified.clone())
                .unwrap_or_default(),
            file_id: entry
                .remote_id
                .clone()
                .unwrap_or_else(|| blob.blob_id.clone()),
        };
        if self.journal.is_recorded(&record).await? {
            return Ok(DownloadOutcome::AlreadySynced);
        }

        let stream = self.store.download_blob(blob).await?;
        info!(path = %target.display(), "downloading file");

        let partial = partial_path(target);
        if let Err(err) = write_stream(stream, &partial).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(err);
        }
        tokio::fs::rename(&partial, target).await?;
        self.journal.record(&record).await?;
        Ok(DownloadOutcome::Downloaded)
    }
}

async fn write_stream(
    mut stream: leanda_core::BlobStream,
    partial: &Path,
) -> Result<(), TransferError> {
    let mut file = tokio::fs::File::create(partial).await?;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        for piece in chunk.chunks(DOWNLOAD_CHUNK_SIZE) {
            file.write_all(piece).await?;
            file.flush().await?;
        }
    }
    file.sync_all().await?;
    Ok(())
}
