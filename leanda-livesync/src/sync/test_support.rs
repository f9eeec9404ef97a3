//! In-memory `RemoteStore` for engine tests. Listings are paginated and
//! created folders can be made to appear late, like the real service.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use leanda_core::{
    Blob, BlobStream, Breadcrumb, LeandaError, Node, NodePage, NodeType, StatusCode,
};
use tokio::time::Instant;

use super::entry::BlobRef;
use super::store::RemoteStore;

pub const ROOT_ID: &str = "root";

#[derive(Debug, Clone)]
struct MemNode {
    id: String,
    parent: Option<String>,
    name: String,
    node_type: NodeType,
    content: Option<Vec<u8>>,
    blob_id: Option<String>,
    visible_at: Option<Instant>,
}

#[derive(Default)]
struct State {
    nodes: Vec<MemNode>,
    next_id: u64,
    failing_listings: HashSet<String>,
    failing_pages: HashSet<(String, u32)>,
    rejected_downloads: HashSet<String>,
    broken_downloads: HashSet<String>,
    fail_uploads: bool,
    uploads: usize,
    downloads: usize,
    creates: usize,
    list_calls: Vec<Instant>,
}

pub struct MemoryStore {
    state: Mutex<State>,
    page_size_cap: Option<u32>,
    // None hides created folders from listings forever.
    folder_visibility_delay: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut state = State::default();
        state.nodes.push(MemNode {
            id: ROOT_ID.into(),
            parent: None,
            name: String::new(),
            node_type: NodeType::User,
            content: None,
            blob_id: None,
            visible_at: Some(Instant::now()),
        });
        Self {
            state: Mutex::new(state),
            page_size_cap: None,
            folder_visibility_delay: Some(Duration::ZERO),
        }
    }

    pub fn with_page_size_cap(mut self, cap: u32) -> Self {
        self.page_size_cap = Some(cap.max(1));
        self
    }

    pub fn with_folder_visibility_delay(mut self, delay: Duration) -> Self {
        self.folder_visibility_delay = Some(delay);
        self
    }

    pub fn hiding_created_folders(mut self) -> Self {
        self.folder_visibility_delay = None;
        self
    }

    pub fn add_file(&self, parent: &str, name: &str, content: &[u8]) -> String {
        let mut state = self.state.lock().unwrap();
        let id = next_id(&mut state, "file");
        let blob_id = next_id(&mut state, "blob");
        state.nodes.push(MemNode {
            id: id.clone(),
            parent: Some(parent.into()),
            name: name.into(),
            node_type: NodeType::File,
            content: Some(content.to_vec()),
            blob_id: Some(blob_id),
            visible_at: Some(Instant::now()),
        });
        id
    }

    pub fn add_folder(&self, parent: &str, name: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = next_id(&mut state, "folder");
        state.nodes.push(MemNode {
            id: id.clone(),
            parent: Some(parent.into()),
            name: name.into(),
            node_type: NodeType::Folder,
            content: None,
            blob_id: None,
            visible_at: Some(Instant::now()),
        });
        id
    }

    pub fn fail_listing(&self, folder_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_listings
            .insert(folder_id.into());
    }

    pub fn fail_listing_page(&self, folder_id: &str, page: u32) {
        self.state
            .lock()
            .unwrap()
            .failing_pages
            .insert((folder_id.into(), page));
    }

    pub fn fail_uploads(&self) {
        self.state.lock().unwrap().fail_uploads = true;
    }

    pub fn reject_download(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .rejected_downloads
            .insert(name.into());
    }

    pub fn break_download_stream(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .broken_downloads
            .insert(name.into());
    }

    pub fn folder_id(&self, parent: &str, name: &str) -> Option<String> {
        self.find(parent, name, NodeType::Folder).map(|node| node.id)
    }

    pub fn file_content(&self, parent: &str, name: &str) -> Option<Vec<u8>> {
        self.find(parent, name, NodeType::File)
            .and_then(|node| node.content)
    }

    /// Names of every child, including folders not yet visible in listings.
    pub fn child_names(&self, parent: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .nodes
            .iter()
            .filter(|node| node.parent.as_deref() == Some(parent))
            .map(|node| node.name.clone())
            .collect()
    }

    pub fn upload_count(&self) -> usize {
        self.state.lock().unwrap().uploads
    }

    pub fn download_count(&self) -> usize {
        self.state.lock().unwrap().downloads
    }

    pub fn create_count(&self) -> usize {
        self.state.lock().unwrap().creates
    }

    pub fn list_call_instants(&self) -> Vec<Instant> {
        self.state.lock().unwrap().list_calls.clone()
    }

    fn find(&self, parent: &str, name: &str, node_type: NodeType) -> Option<MemNode> {
        let state = self.state.lock().unwrap();
        state
            .nodes
            .iter()
            .find(|node| {
                node.parent.as_deref() == Some(parent)
                    && node.name == name
                    && node.node_type == node_type
            })
            .cloned()
    }

    fn page(&self, folder_id: &str, page: u32, page_size: u32) -> Result<NodePage, LeandaError> {
        let mut state = self.state.lock().unwrap();
        state.list_calls.push(Instant::now());
        if state.failing_listings.contains(folder_id)
            || state
                .failing_pages
                .contains(&(folder_id.to_string(), page.max(1)))
        {
            return Err(server_error());
        }
        let now = Instant::now();
        let visible: Vec<Node> = state
            .nodes
            .iter()
            .filter(|node| node.parent.as_deref() == Some(folder_id))
            .filter(|node| node.visible_at.is_some_and(|at| at <= now))
            .map(to_node)
            .collect();
        let size = self
            .page_size_cap
            .map_or(page_size, |cap| cap.min(page_size))
            .max(1) as usize;
        let start = (page.max(1) as usize - 1) * size;
        let items: Vec<Node> = visible.iter().skip(start).take(size).cloned().collect();
        let next_page_link = (start + size < visible.len())
            .then(|| format!("{folder_id}|{}|{size}", page.max(1) + 1));
        Ok(NodePage {
            items,
            next_page_link,
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn next_id(state: &mut State, prefix: &str) -> String {
    state.next_id += 1;
    format!("{prefix}-{}", state.next_id)
}

fn to_node(node: &MemNode) -> Node {
    Node {
        id: node.id.clone(),
        name: node.name.clone(),
        node_type: node.node_type.clone(),
        parent_id: node.parent.clone(),
        version: Some(1),
        blob: node.blob_id.as_ref().map(|blob_id| Blob {
            id: blob_id.clone(),
            bucket: ROOT_ID.into(),
            length: node.content.as_ref().map_or(0, |c| c.len() as u64),
            modified: Some("2024-01-01 00:00:00".into()),
        }),
        modified: None,
    }
}

fn server_error() -> LeandaError {
    LeandaError::Api {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: "listing failed".into(),
    }
}

fn not_found() -> LeandaError {
    LeandaError::Api {
        status: StatusCode::NOT_FOUND,
        body: "not found".into(),
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get_node(&self, id: &str) -> Result<Node, LeandaError> {
        let state = self.state.lock().unwrap();
        state
            .nodes
            .iter()
            .find(|node| node.id == id)
            .map(to_node)
            .ok_or_else(not_found)
    }

    async fn get_breadcrumbs(&self, id: &str) -> Result<Vec<Breadcrumb>, LeandaError> {
        let state = self.state.lock().unwrap();
        let lookup = |id: &str| state.nodes.iter().find(|node| node.id == id);
        let mut crumbs = Vec::new();
        let mut current = lookup(id).ok_or_else(not_found)?;
        while let Some(parent) = current.parent.as_deref().and_then(lookup) {
            crumbs.push(Breadcrumb {
                id: parent.id.clone(),
                name: (!parent.name.is_empty()).then(|| parent.name.clone()),
            });
            current = parent;
        }
        Ok(crumbs)
    }

    async fn list_children(
        &self,
        folder_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<NodePage, LeandaError> {
        self.page(folder_id, page, page_size)
    }

    async fn list_page(&self, link: &str) -> Result<NodePage, LeandaError> {
        let mut parts = link.split('|');
        let (Some(folder_id), Some(page), Some(size)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(not_found());
        };
        let page = page.parse().map_err(|_| not_found())?;
        let size = size.parse().map_err(|_| not_found())?;
        self.page(folder_id, page, size)
    }

    async fn create_folder(
        &self,
        name: &str,
        parent_id: &str,
    ) -> Result<Option<String>, LeandaError> {
        let mut state = self.state.lock().unwrap();
        state.creates += 1;
        let id = next_id(&mut state, "folder");
        let visible_at = self
            .folder_visibility_delay
            .map(|delay| Instant::now() + delay);
        state.nodes.push(MemNode {
            id,
            parent: Some(parent_id.into()),
            name: name.into(),
            node_type: NodeType::Folder,
            content: None,
            blob_id: None,
            visible_at,
        });
        Ok(None)
    }

    async fn upload_file(
        &self,
        parent_id: &str,
        source: &Path,
        _modified: &str,
    ) -> Result<(), LeandaError> {
        if self.state.lock().unwrap().fail_uploads {
            return Err(server_error());
        }
        let content = std::fs::read(source)?;
        let name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.add_file(parent_id, &name, &content);
        self.state.lock().unwrap().uploads += 1;
        Ok(())
    }

    async fn download_blob(&self, blob: &BlobRef) -> Result<BlobStream, LeandaError> {
        let mut state = self.state.lock().unwrap();
        let node = state
            .nodes
            .iter()
            .find(|node| node.blob_id.as_deref() == Some(blob.blob_id.as_str()))
            .cloned()
            .ok_or_else(not_found)?;
        if state.rejected_downloads.contains(&node.name) {
            return Err(not_found());
        }
        state.downloads += 1;
        let content = node.content.unwrap_or_default();
        // Uneven chunk sizes exercise the re-chunking writer.
        let mut chunks: Vec<Result<Bytes, LeandaError>> = content
            .chunks(700)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        if state.broken_downloads.contains(&node.name) {
            chunks.truncate(1);
            chunks.push(Err(server_error()));
        }
        Ok(Box::pin(futures_util::stream::iter(chunks)))
    }
}
