use leanda_core::LeandaError;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use super::entry::Entry;
use super::store::RemoteStore;
use super::walker::RemoteWalker;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("api error: {0}")]
    Api(#[from] LeandaError),
    #[error("remote folder {0:?} not found")]
    NotFound(String),
    #[error("remote folder {query:?} is ambiguous ({matches} matches)")]
    Ambiguous { query: String, matches: usize },
    #[error("remote node {0:?} is not a folder")]
    NotAFolder(String),
}

/// The remote side of a user's session: their root node and the folder that
/// relative remote paths start from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSession {
    pub owner_id: String,
    pub cwd_id: String,
}

/// Resolves the `--remote-folder` argument to a folder id.
///
/// Accepted forms: `.` (the session's working folder), a node id, an absolute
/// path from the owner's root (`/Docs/Inner`), or a path relative to the
/// working folder where `..` steps up to the parent. A single relative segment
/// that matches no name exactly falls back to the one child whose name starts
/// with it or whose id ends with it.
pub async fn resolve_remote_root<S: RemoteStore + ?Sized>(
    store: &S,
    session: &RemoteSession,
    page_size: u32,
    query: &str,
) -> Result<String, ResolveError> {
    let query = query.trim();
    if query.is_empty() || query == "." {
        return Ok(session.cwd_id.clone());
    }
    if Uuid::parse_str(query).is_ok() {
        let node = store.get_node(query).await?;
        if !node.is_folder_like() {
            return Err(ResolveError::NotAFolder(node.name));
        }
        return Ok(node.id);
    }

    let (mut current, rest) = match query.strip_prefix('/') {
        Some(rest) => (session.owner_id.clone(), rest),
        None => (session.cwd_id.clone(), query),
    };
    let segments: Vec<&str> = rest
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    let allow_fuzzy = !query.starts_with('/') && segments.len() == 1;
    let walker = RemoteWalker::new(store, page_size);

    for segment in segments {
        if segment == ".." {
            current = parent_of(store, session, &current).await?;
            continue;
        }
        let children = walker.list_all(&current).await?;
        let entry = pick_child(&children, segment, allow_fuzzy)?;
        if !entry.is_folder() {
            return Err(ResolveError::NotAFolder(entry.name.clone()));
        }
        current = entry
            .remote_id
            .clone()
            .ok_or_else(|| ResolveError::NotFound(segment.to_string()))?;
    }
    Ok(current)
}

async fn parent_of<S: RemoteStore + ?Sized>(
    store: &S,
    session: &RemoteSession,
    id: &str,
) -> Result<String, ResolveError> {
    if id == session.owner_id {
        return Ok(id.to_string());
    }
    let crumbs = store.get_breadcrumbs(id).await?;
    Ok(crumbs
        .into_iter()
        .next()
        .map(|crumb| crumb.id)
        .unwrap_or_else(|| session.owner_id.clone()))
}

fn pick_child<'a>(
    children: &'a [Entry],
    segment: &str,
    allow_fuzzy: bool,
) -> Result<&'a Entry, ResolveError> {
    let exact: Vec<&Entry> = children
        .iter()
        .filter(|entry| entry.name == segment)
        .collect();
    if let Some(first) = exact.first() {
        if exact.len() > 1 {
            warn!(name = segment, matches = exact.len(), "several remote nodes share this name, using the first");
        }
        return Ok(*first);
    }
    if !allow_fuzzy {
        return Err(ResolveError::NotFound(segment.to_string()));
    }

    let fuzzy: Vec<&Entry> = children
        .iter()
        .filter(|entry| {
            entry.name.starts_with(segment)
                || entry
                    .remote_id
                    .as_deref()
                    .is_some_and(|id| id.ends_with(segment))
        })
        .collect();
    match fuzzy.as_slice() {
        [] => Err(ResolveError::NotFound(segment.to_string())),
        [only] => Ok(*only),
        many => Err(ResolveError::Ambiguous {
            query: segment.to_string(),
            matches: many.len(),
        }),
    }
}
