pub mod backoff;
pub mod engine;
pub mod entry;
pub mod journal;
pub mod local_watcher;
pub mod paths;
pub mod resolve;
pub mod store;
pub mod transfer;
pub mod walker;

#[cfg(test)]
mod test_support;
