//! Recursive document model
//!
//! A `Document` owns its `chunks` outright: the chunk tree is dropped with
//! its root and cannot contain cycles. `matches` are plain id references to
//! documents that may live in other trees (or not exist yet); they are only
//! resolved through a caller-supplied [`MatchIndex`].
//!
//! Invariants enforced on construction:
//! - at most one of buffer / blob / text / graph is set as content
//! - `chunk.granularity == parent.granularity + 1`

pub mod arena;
pub mod index;
pub mod score;
pub mod traversal;

pub use arena::{DocIndex, DocumentArena};
pub use index::{dangling_matches, DocumentIndex, MatchIndex};
pub use score::{NamedScore, ScoreMap};
pub use traversal::{batch, traverse, traverse_flat, traverse_flat_per_path, TraversalPath, Walk};

use crate::array::{NdArray, SparseArray};
use crate::error::{Result, TypesError};
use crate::structured::Struct;
use serde::{Deserialize, Serialize};

/// Graph-shaped content: sparse adjacency plus free-form edge features
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Graph {
    pub adjacency: Option<SparseArray>,
    pub edge_features: Struct,
}

/// Document content, at most one kind per document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Content {
    Buffer(Vec<u8>),
    Blob(NdArray),
    Text(String),
    Graph(Graph),
}

impl Content {
    pub fn kind(&self) -> &'static str {
        match self {
            Content::Buffer(_) => "buffer",
            Content::Blob(_) => "blob",
            Content::Text(_) => "text",
            Content::Graph(_) => "graph",
        }
    }
}

/// Non-owning reference from a document to a matched document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchRef {
    /// Id of the matched document, resolved against a `MatchIndex`
    pub id: String,
    /// Scores of this match relative to the owning document
    pub scores: ScoreMap,
}

impl MatchRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            scores: ScoreMap::new(),
        }
    }
}

/// One node of the document tree
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub parent_id: Option<String>,
    /// Chunk depth relative to the root
    pub granularity: u32,
    /// Match depth
    pub adjacency: u32,
    content: Option<Content>,
    chunks: Vec<Document>,
    pub matches: Vec<MatchRef>,
    pub scores: ScoreMap,
    pub evaluations: ScoreMap,
    pub embedding: Option<NdArray>,
    pub tags: Struct,
    pub mime_type: String,
    pub uri: String,
    pub weight: f32,
    pub modality: String,
}

impl Document {
    /// Empty root document
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn builder(id: impl Into<String>) -> DocumentBuilder {
        DocumentBuilder::new(id)
    }

    pub fn content(&self) -> Option<&Content> {
        self.content.as_ref()
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Some(Content::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn blob(&self) -> Option<&NdArray> {
        match &self.content {
            Some(Content::Blob(blob)) => Some(blob),
            _ => None,
        }
    }

    /// Set content, failing if a different content is already present
    pub fn set_content(&mut self, content: Content) -> Result<()> {
        if let Some(existing) = &self.content {
            return Err(TypesError::configuration(
                format!(
                    "document '{}' already has {} content, cannot also set {}",
                    self.id,
                    existing.kind(),
                    content.kind()
                ),
                Some("content"),
            ));
        }
        self.content = Some(content);
        Ok(())
    }

    /// Replace content unconditionally, returning the previous value
    pub fn replace_content(&mut self, content: Option<Content>) -> Option<Content> {
        std::mem::replace(&mut self.content, content)
    }

    pub fn chunks(&self) -> &[Document] {
        &self.chunks
    }

    pub fn chunks_mut(&mut self) -> &mut [Document] {
        &mut self.chunks
    }

    /// Attach a chunk; its granularity must be exactly one deeper
    pub fn add_chunk(&mut self, mut chunk: Document) -> Result<&mut Document> {
        let expected = self.granularity + 1;
        if chunk.granularity != expected {
            return Err(TypesError::configuration(
                format!(
                    "chunk '{}' has granularity {} but parent '{}' requires {}",
                    chunk.id, chunk.granularity, self.id, expected
                ),
                Some("granularity"),
            ));
        }
        chunk.parent_id = Some(self.id.clone());
        self.chunks.push(chunk);
        let last = self.chunks.len() - 1;
        Ok(&mut self.chunks[last])
    }

    /// Build a chunk one level deeper and attach it
    pub fn push_chunk(&mut self, id: impl Into<String>) -> &mut Document {
        let mut chunk = Document::new(id);
        chunk.granularity = self.granularity + 1;
        chunk.parent_id = Some(self.id.clone());
        self.chunks.push(chunk);
        let last = self.chunks.len() - 1;
        &mut self.chunks[last]
    }

    /// Remove and return the chunk with the given id (and its subtree)
    pub fn remove_chunk(&mut self, id: &str) -> Option<Document> {
        let position = self.chunks.iter().position(|c| c.id == id)?;
        Some(self.chunks.remove(position))
    }

    /// Add a non-owning match reference
    pub fn add_match(&mut self, target_id: impl Into<String>) -> &mut MatchRef {
        self.matches.push(MatchRef::new(target_id));
        let last = self.matches.len() - 1;
        &mut self.matches[last]
    }

    /// A document with no chunks and no matches
    pub fn is_leaf(&self) -> bool {
        self.chunks.is_empty() && self.matches.is_empty()
    }

    /// Re-check tree invariants, e.g. after receiving a document off the wire
    pub fn validate(&self) -> Result<()> {
        for chunk in &self.chunks {
            if chunk.granularity != self.granularity + 1 {
                return Err(TypesError::configuration(
                    format!(
                        "chunk '{}' has granularity {} under parent '{}' at {}",
                        chunk.id, chunk.granularity, self.id, self.granularity
                    ),
                    Some("granularity"),
                ));
            }
            chunk.validate()?;
        }
        Ok(())
    }

    /// Lazy depth-first preorder over this document and its chunk subtree
    pub fn walk<P>(&self, predicate: P) -> Walk<'_, P>
    where
        P: FnMut(&Document) -> bool,
    {
        Walk::new(self, predicate)
    }

    /// All nodes of this tree whose granularity equals `level`
    pub fn flatten_by_granularity(&self, level: u32) -> Vec<&Document> {
        if level < self.granularity {
            return Vec::new();
        }
        self.walk(|doc| doc.granularity == level).collect()
    }

    /// Total node count of the chunk tree including this document
    pub fn tree_size(&self) -> usize {
        1 + self.chunks.iter().map(Document::tree_size).sum::<usize>()
    }
}

/// Builder enforcing the single-content rule
#[derive(Debug, Default)]
pub struct DocumentBuilder {
    doc: Document,
}

impl DocumentBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            doc: Document::new(id),
        }
    }

    pub fn granularity(mut self, granularity: u32) -> Self {
        self.doc.granularity = granularity;
        self
    }

    pub fn adjacency(mut self, adjacency: u32) -> Self {
        self.doc.adjacency = adjacency;
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Result<Self> {
        self.doc.set_content(Content::Text(text.into()))?;
        Ok(self)
    }

    pub fn buffer(mut self, buffer: Vec<u8>) -> Result<Self> {
        self.doc.set_content(Content::Buffer(buffer))?;
        Ok(self)
    }

    pub fn blob(mut self, blob: impl Into<NdArray>) -> Result<Self> {
        self.doc.set_content(Content::Blob(blob.into()))?;
        Ok(self)
    }

    pub fn graph(mut self, graph: Graph) -> Result<Self> {
        self.doc.set_content(Content::Graph(graph))?;
        Ok(self)
    }

    pub fn embedding(mut self, embedding: impl Into<NdArray>) -> Self {
        self.doc.embedding = Some(embedding.into());
        self
    }

    pub fn tags(mut self, tags: Struct) -> Self {
        self.doc.tags = tags;
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.doc.mime_type = mime_type.into();
        self
    }

    pub fn chunk(mut self, chunk: Document) -> Result<Self> {
        self.doc.add_chunk(chunk)?;
        Ok(self)
    }

    pub fn build(self) -> Document {
        self.doc
    }
}
