use std::borrow::Cow;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;
use time::format_description::BorrowedFormatItem;
use time::macros::{datetime, format_description};
use time::{OffsetDateTime, PrimitiveDateTime};
use tokio::io::AsyncWriteExt;

pub const METADATA_DIR_NAME: &str = ".leanda";
const LAST_SYNC_FILE: &str = "last_sync_time";
const REMOTE_LOG_FILE: &str = "remote_files";
const LOCAL_LOG_FILE: &str = "local_files";

pub const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
/// Used when a root has never been synced.
pub const NEVER_SYNCED: PrimitiveDateTime = datetime!(1970-12-23 20:17:55);

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("timestamp format error: {0}")]
    Format(#[from] time::error::Format),
}

/// A completed transfer. Remote files are keyed by file node id, local files by
/// absolute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    RemoteSynced {
        blob_modified: String,
        file_id: String,
    },
    LocalSynced {
        local_modified: String,
        absolute_path: PathBuf,
    },
}

impl JournalRecord {
    fn stamp(&self) -> &str {
        match self {
            JournalRecord::RemoteSynced { blob_modified, .. } => blob_modified,
            JournalRecord::LocalSynced { local_modified, .. } => local_modified,
        }
    }

    fn key(&self) -> Cow<'_, str> {
        match self {
            JournalRecord::RemoteSynced { file_id, .. } => Cow::Borrowed(file_id),
            JournalRecord::LocalSynced { absolute_path, .. } => absolute_path.to_string_lossy(),
        }
    }
}

/// One append-only log of `{timestamp}|{key}` lines. The file is opened per
/// call; nothing is held between lookups.
#[derive(Debug, Clone)]
pub struct JournalLog {
    path: PathBuf,
}

impl JournalLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn contains(&self, key: &str) -> Result<bool, JournalError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err.into()),
        };
        Ok(contents
            .lines()
            .filter_map(|line| line.split_once('|'))
            .any(|(_, logged)| logged.trim_end_matches('\r') == key))
    }

    pub async fn append(&self, stamp: &str, key: &str) -> Result<(), JournalError> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{stamp}|{key}\n").as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Returns `true` when `key` was already logged. Otherwise appends it and
    /// returns `false`, so repeated lookups never duplicate a line.
    pub async fn check_and_record(&self, stamp: &str, key: &str) -> Result<bool, JournalError> {
        if self.contains(key).await? {
            return Ok(true);
        }
        self.append(stamp, key).await?;
        Ok(false)
    }
}

/// The hidden metadata directory of a sync root.
#[derive(Debug, Clone)]
pub struct SyncJournal {
    dir: PathBuf,
    remote_files: JournalLog,
    local_files: JournalLog,
}

impl SyncJournal {
    pub async fn open(root: &Path) -> Result<Self, JournalError> {
        let dir = root.join(METADATA_DIR_NAME);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            remote_files: JournalLog::new(dir.join(REMOTE_LOG_FILE)),
            local_files: JournalLog::new(dir.join(LOCAL_LOG_FILE)),
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn remote_files(&self) -> &JournalLog {
        &self.remote_files
    }

    pub fn local_files(&self) -> &JournalLog {
        &self.local_files
    }

    fn log_for(&self, record: &JournalRecord) -> &JournalLog {
        match record {
            JournalRecord::RemoteSynced { .. } => &self.remote_files,
            JournalRecord::LocalSynced { .. } => &self.local_files,
        }
    }

    pub async fn is_recorded(&self, record: &JournalRecord) -> Result<bool, JournalError> {
        self.log_for(record).contains(&record.key()).await
    }

    pub async fn record(&self, record: &JournalRecord) -> Result<(), JournalError> {
        self.log_for(record)
            .append(record.stamp(), &record.key())
            .await
    }

    pub async fn check_and_record(&self, record: &JournalRecord) -> Result<bool, JournalError> {
        self.log_for(record)
            .check_and_record(record.stamp(), &record.key())
            .await
    }

    pub async fn load_last_sync_time(&self) -> Result<PrimitiveDateTime, JournalError> {
        let path = self.dir.join(LAST_SYNC_FILE);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(NEVER_SYNCED),
            Err(err) => return Err(err.into()),
        };
        match PrimitiveDateTime::parse(raw.trim(), TIMESTAMP_FORMAT) {
            Ok(at) => Ok(at),
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "unreadable last sync time, treating root as never synced");
                Ok(NEVER_SYNCED)
            }
        }
    }

    pub async fn store_last_sync_time(&self, at: PrimitiveDateTime) -> Result<(), JournalError> {
        let formatted = at.format(TIMESTAMP_FORMAT)?;
        tokio::fs::write(self.dir.join(LAST_SYNC_FILE), formatted).await?;
        Ok(())
    }
}

pub fn format_timestamp(at: OffsetDateTime) -> Result<String, time::error::Format> {
    at.format(TIMESTAMP_FORMAT)
}

pub fn format_system_time(at: SystemTime) -> Result<String, time::error::Format> {
    format_timestamp(OffsetDateTime::from(at))
}

pub fn now_timestamp() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}
