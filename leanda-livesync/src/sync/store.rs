use std::path::Path;

use async_trait::async_trait;
use leanda_core::{BlobStream, Breadcrumb, LeandaClient, LeandaError, Node, NodePage};

use super::entry::BlobRef;

/// Remote operations the sync engine needs. `LeandaClient` is the production
/// implementation; tests substitute an in-memory store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get_node(&self, id: &str) -> Result<Node, LeandaError>;

    async fn get_breadcrumbs(&self, id: &str) -> Result<Vec<Breadcrumb>, LeandaError>;

    async fn list_children(
        &self,
        folder_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<NodePage, LeandaError>;

    /// Fetches the page behind a `next_page_link` from an earlier page.
    async fn list_page(&self, link: &str) -> Result<NodePage, LeandaError>;

    /// Fire-and-forget: the folder only counts as created once a listing
    /// shows it.
    async fn create_folder(&self, name: &str, parent_id: &str)
    -> Result<Option<String>, LeandaError>;

    async fn upload_file(
        &self,
        parent_id: &str,
        source: &Path,
        modified: &str,
    ) -> Result<(), LeandaError>;

    async fn download_blob(&self, blob: &BlobRef) -> Result<BlobStream, LeandaError>;
}

#[async_trait]
impl RemoteStore for LeandaClient {
    async fn get_node(&self, id: &str) -> Result<Node, LeandaError> {
        LeandaClient::get_node(self, id).await
    }

    async fn get_breadcrumbs(&self, id: &str) -> Result<Vec<Breadcrumb>, LeandaError> {
        self.get_node_breadcrumbs(id).await
    }

    async fn list_children(
        &self,
        folder_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<NodePage, LeandaError> {
        self.list_nodes(folder_id, page, page_size).await
    }

    async fn list_page(&self, link: &str) -> Result<NodePage, LeandaError> {
        self.list_nodes_page(link).await
    }

    async fn create_folder(
        &self,
        name: &str,
        parent_id: &str,
    ) -> Result<Option<String>, LeandaError> {
        LeandaClient::create_folder(self, name, parent_id).await
    }

    async fn upload_file(
        &self,
        parent_id: &str,
        source: &Path,
        modified: &str,
    ) -> Result<(), LeandaError> {
        LeandaClient::upload_file(self, parent_id, source, modified).await
    }

    async fn download_blob(&self, blob: &BlobRef) -> Result<BlobStream, LeandaError> {
        // Fall back to the owner's bucket when the listing leaves it empty.
        let bucket = if blob.bucket.is_empty() {
            self.owner()
        } else {
            blob.bucket.as_str()
        };
        LeandaClient::download_blob(self, bucket, &blob.blob_id).await
    }
}
