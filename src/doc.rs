//! Typed views over the per-line JSON documents.
//!
//! Extraction wants only the identifier attributes and drops everything
//! else; translation needs the whole document back, field order intact, so
//! it parses into an order-preserving map instead.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// A vertex identifier of the form `collection/key`. Only the key survives
/// extraction; the collection prefix is re-attached during translation.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct VertexId(pub String);

impl VertexId {
    /// The key suffix after the leftmost `/`. An identifier without a
    /// collection prefix is its own key.
    pub fn key(&self) -> &str {
        match self.0.split_once('/') {
            Some((_, key)) => key,
            None => &self.0,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VertexDocument {
    #[serde(rename = "_id")]
    pub id: VertexId,
}

#[derive(Debug, Deserialize)]
pub struct EdgeDocument {
    #[serde(rename = "_from")]
    pub from: VertexId,
    #[serde(rename = "_to")]
    pub to: VertexId,
}

/// Full document for translation; re-emitting preserves field order.
pub type RawDocument = Map<String, Value>;

pub fn parse_vertex(line: &[u8]) -> Result<VertexDocument> {
    serde_json::from_slice(line).map_err(|e| Error::parse(line, e))
}

pub fn parse_edge(line: &[u8]) -> Result<EdgeDocument> {
    serde_json::from_slice(line).map_err(|e| Error::parse(line, e))
}

pub fn parse_raw(line: &[u8]) -> Result<RawDocument> {
    serde_json::from_slice(line).map_err(|e| Error::parse(line, e))
}
