mod client;

pub use client::{
    Blob, BlobStream, Breadcrumb, LeandaClient, LeandaError, Node, NodePage, NodeType,
};
pub use reqwest::StatusCode;
