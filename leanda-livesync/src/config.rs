use std::time::Duration;

use anyhow::Context;

use crate::sync::backoff::Backoff;
use crate::sync::engine::SyncSettings;
use crate::sync::resolve::RemoteSession;

pub const DEFAULT_API_URL: &str = "https://api.leanda.io/api";
const DEFAULT_PAGE_SIZE: u64 = 100;
const DEFAULT_FOLDER_POLL_UNIT_MS: u64 = 1000;
const DEFAULT_FOLDER_POLL_TIMEOUT_UNITS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivesyncConfig {
    pub api_url: String,
    pub token: String,
    pub owner_id: String,
    pub cwd_id: String,
    pub page_size: u32,
    pub folder_poll_unit: Duration,
    pub folder_poll_timeout_units: u32,
}

impl LivesyncConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .with_context(|| format!("{name} is not set"))
        };
        let token = required("LEANDA_TOKEN")?;
        let owner_id = required("LEANDA_OWNER")?;
        let api_url = lookup("LEANDA_API_URL")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let cwd_id = lookup("LEANDA_CWD")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| owner_id.clone());
        let read_u64 = |name: &str, default: u64| read_u64_value(lookup(name), default);

        Ok(Self {
            api_url,
            token,
            owner_id,
            cwd_id,
            page_size: clamp_u32(read_u64("LEANDA_PAGE_SIZE", DEFAULT_PAGE_SIZE)),
            folder_poll_unit: Duration::from_millis(read_u64(
                "LEANDA_FOLDER_POLL_UNIT_MS",
                DEFAULT_FOLDER_POLL_UNIT_MS,
            )),
            folder_poll_timeout_units: clamp_u32(read_u64(
                "LEANDA_FOLDER_POLL_TIMEOUT_UNITS",
                DEFAULT_FOLDER_POLL_TIMEOUT_UNITS,
            )),
        })
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            page_size: self.page_size,
            folder_poll: Backoff::folder_poll(
                self.folder_poll_unit,
                self.folder_poll_timeout_units,
            ),
        }
    }

    pub fn session(&self) -> RemoteSession {
        RemoteSession {
            owner_id: self.owner_id.clone(),
            cwd_id: self.cwd_id.clone(),
        }
    }
}

fn read_u64_value(value: Option<String>, default: u64) -> u64 {
    value
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn clamp_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
