use leanda_core::{Node, NodeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Folder,
}

/// Reference to the binary payload of a remote file. The blob has its own id,
/// independent of the file node that points at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    pub blob_id: String,
    pub bucket: String,
    pub length: u64,
    pub modified: Option<String>,
}

/// A named item on either side of the sync. Names are unique only within
/// their parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub kind: EntryKind,
    pub remote_id: Option<String>,
    pub blob: Option<BlobRef>,
    pub modified: Option<String>,
}

impl Entry {
    pub fn local(name: impl Into<String>, kind: EntryKind, modified: Option<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            remote_id: None,
            blob: None,
            modified,
        }
    }

    /// Converts a listed node. Nodes that are neither files nor folders are
    /// not part of the synced tree.
    pub fn from_node(node: Node) -> Option<Self> {
        let kind = match node.node_type {
            NodeType::File => EntryKind::File,
            NodeType::Folder => EntryKind::Folder,
            NodeType::User | NodeType::Other => return None,
        };
        let blob = node.blob.map(|blob| BlobRef {
            blob_id: blob.id,
            bucket: blob.bucket,
            length: blob.length,
            modified: blob.modified,
        });
        Some(Self {
            name: node.name,
            kind,
            remote_id: Some(node.id),
            blob,
            modified: node.modified,
        })
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }
}
