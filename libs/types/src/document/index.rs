//! Match resolution
//!
//! Matches are never embedded by value. A `MatchIndex` is whatever the
//! caller uses to look documents up by id: an in-memory corpus, a cache in
//! front of storage, or a lazily populated result set. Match targets that
//! have been removed simply fail to resolve; `dangling_matches` reports them
//! for callers that want to prune.

use super::Document;
use std::collections::HashMap;

/// Resolves document ids to documents
pub trait MatchIndex {
    fn resolve(&self, id: &str) -> Option<&Document>;
}

impl MatchIndex for HashMap<String, Document> {
    fn resolve(&self, id: &str) -> Option<&Document> {
        self.get(id)
    }
}

/// In-memory corpus keyed by document id
#[derive(Debug, Clone, Default)]
pub struct DocumentIndex {
    docs: HashMap<String, Document>,
}

impl DocumentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document, returning the previous one
    pub fn insert(&mut self, doc: Document) -> Option<Document> {
        self.docs.insert(doc.id.clone(), doc)
    }

    /// Insert a document and every chunk of its subtree by id
    pub fn insert_tree(&mut self, doc: &Document) {
        for node in doc.walk(|_| true) {
            self.docs.insert(node.id.clone(), node.clone());
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Document> {
        self.docs.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.docs.get(id)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

impl MatchIndex for DocumentIndex {
    fn resolve(&self, id: &str) -> Option<&Document> {
        self.docs.get(id)
    }
}

/// `(document id, match id)` pairs in `root`'s tree whose match target is unknown to `index`
pub fn dangling_matches<I>(root: &Document, index: &I) -> Vec<(String, String)>
where
    I: MatchIndex + ?Sized,
{
    root.walk(|_| true)
        .flat_map(|doc| {
            doc.matches
                .iter()
                .filter(|m| index.resolve(&m.id).is_none())
                .map(move |m| (doc.id.clone(), m.id.clone()))
        })
        .collect()
}
