use std::path::Path;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::io::ReaderStream;
use url::Url;

// The service advertises continuation links on its public host; they are
// rebased onto whatever base URL the client was built with.
const PUBLIC_LINK_PREFIX: &str = "http://api.leanda.io/api";
const PAGINATION_HEADER: &str = "X-Pagination";
const BREADCRUMBS_HEADER: &str = "X-Breadcrumbs";

/// Body of a blob download, yielded chunk by chunk as it arrives.
pub type BlobStream = Pin<Box<dyn Stream<Item = Result<Bytes, LeandaError>> + Send>>;

#[derive(Debug, Error)]
pub enum LeandaError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("api response missing {0} header")]
    MissingHeader(&'static str),
    #[error("invalid {header} header: {source}")]
    InvalidHeader {
        header: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone)]
pub struct LeandaClient {
    http: Client,
    base_url: Url,
    token: String,
    owner: String,
}

impl LeandaClient {
    pub fn with_base_url(
        base_url: &str,
        token: impl Into<String>,
        owner: impl Into<String>,
    ) -> Result<Self, LeandaError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
            owner: owner.into(),
        })
    }

    /// Id of the user's root node; uploads are addressed to this bucket.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub async fn get_node(&self, id: &str) -> Result<Node, LeandaError> {
        let url = self.endpoint(&format!("/nodes/{id}"))?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Ancestors of a node, nearest parent first.
    pub async fn get_node_breadcrumbs(&self, id: &str) -> Result<Vec<Breadcrumb>, LeandaError> {
        let url = self.endpoint(&format!("/nodes/{id}"))?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        parse_json_header(response.headers(), BREADCRUMBS_HEADER)?
            .ok_or(LeandaError::MissingHeader(BREADCRUMBS_HEADER))
    }

    pub async fn list_nodes(
        &self,
        folder_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<NodePage, LeandaError> {
        let mut url = self.endpoint(&format!("/nodes/{folder_id}/nodes"))?;
        url.query_pairs_mut()
            .append_pair("pageSize", &page_size.max(1).to_string())
            .append_pair("pageNumber", &page.max(1).to_string());
        self.fetch_page(url).await
    }

    /// Follows a `nextPageLink` taken from a previous page.
    pub async fn list_nodes_page(&self, link: &str) -> Result<NodePage, LeandaError> {
        let url = self.resolve_link(link)?;
        self.fetch_page(url).await
    }

    /// Requests creation of a folder. The service indexes new folders
    /// asynchronously, so the folder may not be listed yet when this returns.
    pub async fn create_folder(
        &self,
        name: &str,
        parent_id: &str,
    ) -> Result<Option<String>, LeandaError> {
        let url = self.endpoint("/entities/folders")?;
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .form(&[("Name", name), ("ParentId", parent_id)])
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        Ok(response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|location| location.trim_end_matches('/').rsplit('/').next())
            .filter(|id| !id.is_empty())
            .map(str::to_string))
    }

    pub async fn upload_file(
        &self,
        parent_id: &str,
        source: &Path,
        modified: &str,
    ) -> Result<(), LeandaError> {
        let file_name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file = tokio::fs::File::open(source).await?;
        let length = file.metadata().await?.len();
        let body = Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, length)
            .file_name(file_name)
            .mime_str("application/octet-stream")?;
        let form = Form::new()
            .text("parentId", parent_id.to_string())
            .text("modified", modified.to_string())
            .part("file", part);

        let url = self.endpoint(&format!("/blobs/{}", self.owner))?;
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .multipart(form)
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    /// Opens a streamed download of a blob. A non-success status is reported
    /// before any body bytes are handed out.
    pub async fn download_blob(
        &self,
        bucket: &str,
        blob_id: &str,
    ) -> Result<BlobStream, LeandaError> {
        let url = self.endpoint(&format!("/blobs/{bucket}/{blob_id}"))?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        Ok(Box::pin(response.bytes_stream().map_err(LeandaError::from)))
    }

    async fn fetch_page(&self, url: Url) -> Result<NodePage, LeandaError> {
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let pagination: Option<Pagination> =
            parse_json_header(response.headers(), PAGINATION_HEADER)?;
        let items: Vec<Node> = response.json().await?;
        Ok(NodePage {
            items,
            next_page_link: pagination
                .and_then(|p| p.next_page_link)
                .filter(|link| !link.is_empty()),
        })
    }

    fn auth_header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn endpoint(&self, path: &str) -> Result<Url, LeandaError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}{path}"))?)
    }

    fn resolve_link(&self, link: &str) -> Result<Url, LeandaError> {
        if let Some(rest) = link.strip_prefix(PUBLIC_LINK_PREFIX) {
            return self.endpoint(rest);
        }
        if link.starts_with('/') {
            return self.endpoint(link);
        }
        Ok(Url::parse(link)?)
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, LeandaError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(LeandaError::Api { status, body })
        }
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, LeandaError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

impl LeandaError {
    pub fn is_server_error(&self) -> bool {
        matches!(self, LeandaError::Api { status, .. } if status.is_server_error())
    }
}

fn parse_json_header<T: serde::de::DeserializeOwned>(
    headers: &HeaderMap,
    name: &'static str,
) -> Result<Option<T>, LeandaError> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    let raw = value.to_str().map_err(|_| LeandaError::MissingHeader(name))?;
    serde_json::from_str(raw)
        .map(Some)
        .map_err(|source| LeandaError::InvalidHeader {
            header: name,
            source,
        })
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(default)]
    pub blob: Option<Blob>,
    #[serde(default, alias = "updatedDateTime")]
    pub modified: Option<String>,
}

impl Node {
    pub fn is_folder_like(&self) -> bool {
        matches!(self.node_type, NodeType::Folder | NodeType::User)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub enum NodeType {
    File,
    Folder,
    User,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Blob {
    pub id: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub length: u64,
    #[serde(default)]
    pub modified: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    #[serde(default)]
    next_page_link: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Breadcrumb {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePage {
    pub items: Vec<Node>,
    pub next_page_link: Option<String>,
}
