//! Arena storage for a corpus of document trees
//!
//! Nodes are stored flat and addressed by [`DocIndex`]. Each slot keeps the
//! indices of its chunks and of its parent, so subtrees can be edited and
//! removed without walking owned trees. Ids are unique across the arena.
//!
//! Freed slots are reused; every reuse bumps the slot's generation, so a
//! handle to a removed node resolves to nothing rather than to its successor.

use super::index::MatchIndex;
use super::{Document, MatchRef};
use crate::error::{Result, TypesError};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Generation-checked handle of a node inside a [`DocumentArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocIndex {
    slot: usize,
    generation: u32,
}

#[derive(Debug, Clone)]
struct Slot {
    /// Stored with an empty chunk list; structure lives in `chunks`
    doc: Document,
    parent: Option<DocIndex>,
    chunks: Vec<DocIndex>,
}

#[derive(Debug, Clone, Default)]
struct Entry {
    generation: u32,
    slot: Option<Slot>,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentArena {
    slots: Vec<Entry>,
    by_id: HashMap<String, DocIndex>,
    free: Vec<usize>,
}

impl DocumentArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Insert a whole tree as a new root
    ///
    /// Fails without modifying the arena if any id in the tree is already
    /// present or repeats within the tree.
    pub fn insert_root(&mut self, doc: Document) -> Result<DocIndex> {
        self.check_new_ids(&doc)?;
        doc.validate()?;
        Ok(self.insert_subtree(doc, None))
    }

    /// Attach `doc` (and its subtree) as the last chunk of `parent`
    pub fn add_chunk(&mut self, parent: DocIndex, mut doc: Document) -> Result<DocIndex> {
        let parent_doc = self.slot(parent)?;
        let expected = parent_doc.doc.granularity + 1;
        if doc.granularity != expected {
            return Err(TypesError::configuration(
                format!(
                    "chunk '{}' has granularity {} but parent '{}' requires {}",
                    doc.id, doc.granularity, parent_doc.doc.id, expected
                ),
                Some("granularity"),
            ));
        }
        let parent_id = parent_doc.doc.id.clone();
        self.check_new_ids(&doc)?;
        doc.validate()?;
        doc.parent_id = Some(parent_id);

        let index = self.insert_subtree(doc, Some(parent));
        self.slot_mut(parent)?.chunks.push(index);
        Ok(index)
    }

    /// Record a non-owning match from `doc` to `target_id`
    pub fn add_match(&mut self, doc: DocIndex, target_id: impl Into<String>) -> Result<&mut MatchRef> {
        let slot = self.slot_mut(doc)?;
        slot.doc.matches.push(MatchRef::new(target_id));
        let last = slot.doc.matches.len() - 1;
        Ok(&mut slot.doc.matches[last])
    }

    /// Remove a node with its chunk subtree, returning it as an owned tree
    pub fn remove(&mut self, index: DocIndex) -> Option<Document> {
        let parent = self.slot(index).ok()?.parent;
        if let Some(parent) = parent {
            if let Ok(slot) = self.slot_mut(parent) {
                slot.chunks.retain(|c| *c != index);
            }
        }
        let doc = self.take_subtree(index);
        debug!(id = %doc.id, nodes = doc.tree_size(), "Removed document subtree");
        Some(doc)
    }

    pub fn get(&self, index: DocIndex) -> Option<&Document> {
        self.slot(index).ok().map(|s| &s.doc)
    }

    pub fn get_mut(&mut self, index: DocIndex) -> Option<&mut Document> {
        self.slot_mut(index).ok().map(|s| &mut s.doc)
    }

    pub fn index_of(&self, id: &str) -> Option<DocIndex> {
        self.by_id.get(id).copied()
    }

    pub fn parent(&self, index: DocIndex) -> Option<DocIndex> {
        self.slot(index).ok()?.parent
    }

    pub fn chunks(&self, index: DocIndex) -> &[DocIndex] {
        match self.slot(index) {
            Ok(slot) => &slot.chunks,
            Err(_) => &[],
        }
    }

    /// Preorder handles of `root` and its subtree
    pub fn descendants(&self, root: DocIndex) -> Vec<DocIndex> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            if self.get(index).is_none() {
                continue;
            }
            out.push(index);
            stack.extend(self.chunks(index).iter().rev());
        }
        out
    }

    /// Reassemble an owned tree rooted at `index`
    pub fn to_tree(&self, index: DocIndex) -> Option<Document> {
        let slot = self.slot(index).ok()?;
        let mut doc = slot.doc.clone();
        doc.chunks = slot
            .chunks
            .iter()
            .filter_map(|c| self.to_tree(*c))
            .collect();
        Some(doc)
    }

    /// `(document id, match id)` pairs whose target is unknown to `index`
    pub fn dangling_matches<I>(&self, index: &I) -> Vec<(String, String)>
    where
        I: MatchIndex + ?Sized,
    {
        let mut out: Vec<_> = self
            .slots
            .iter()
            .filter_map(|entry| entry.slot.as_ref())
            .flat_map(|slot| {
                slot.doc
                    .matches
                    .iter()
                    .filter(|m| index.resolve(&m.id).is_none())
                    .map(move |m| (slot.doc.id.clone(), m.id.clone()))
            })
            .collect();
        out.sort();
        out
    }

    /// Ids in `doc` must be new to the arena and unique within the tree
    fn check_new_ids(&self, doc: &Document) -> Result<()> {
        let mut seen = HashSet::new();
        for node in doc.walk(|_| true) {
            if self.by_id.contains_key(&node.id) || !seen.insert(node.id.as_str()) {
                return Err(duplicate_id(&node.id));
            }
        }
        Ok(())
    }

    fn slot(&self, index: DocIndex) -> Result<&Slot> {
        self.slots
            .get(index.slot)
            .filter(|entry| entry.generation == index.generation)
            .and_then(|entry| entry.slot.as_ref())
            .ok_or_else(|| unknown_index(index))
    }

    fn slot_mut(&mut self, index: DocIndex) -> Result<&mut Slot> {
        self.slots
            .get_mut(index.slot)
            .filter(|entry| entry.generation == index.generation)
            .and_then(|entry| entry.slot.as_mut())
            .ok_or_else(|| unknown_index(index))
    }

    fn allocate(&mut self, slot: Slot) -> DocIndex {
        let id = slot.doc.id.clone();
        let index = match self.free.pop() {
            Some(free) => {
                let entry = &mut self.slots[free];
                entry.slot = Some(slot);
                DocIndex {
                    slot: free,
                    generation: entry.generation,
                }
            }
            None => {
                self.slots.push(Entry {
                    generation: 0,
                    slot: Some(slot),
                });
                DocIndex {
                    slot: self.slots.len() - 1,
                    generation: 0,
                }
            }
        };
        self.by_id.insert(id, index);
        index
    }

    fn insert_subtree(&mut self, mut doc: Document, parent: Option<DocIndex>) -> DocIndex {
        let chunks = std::mem::take(&mut doc.chunks);
        let index = self.allocate(Slot {
            doc,
            parent,
            chunks: Vec::with_capacity(chunks.len()),
        });
        for chunk in chunks {
            let child = self.insert_subtree(chunk, Some(index));
            if let Ok(slot) = self.slot_mut(index) {
                slot.chunks.push(child);
            }
        }
        index
    }

    fn take_subtree(&mut self, index: DocIndex) -> Document {
        let Some(entry) = self
            .slots
            .get_mut(index.slot)
            .filter(|entry| entry.generation == index.generation)
        else {
            return Document::default();
        };
        let Some(slot) = entry.slot.take() else {
            return Document::default();
        };
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(index.slot);
        self.by_id.remove(&slot.doc.id);
        let mut doc = slot.doc;
        doc.chunks = slot
            .chunks
            .into_iter()
            .map(|c| self.take_subtree(c))
            .collect();
        doc
    }
}

impl MatchIndex for DocumentArena {
    fn resolve(&self, id: &str) -> Option<&Document> {
        self.index_of(id).and_then(|i| self.get(i))
    }
}

fn duplicate_id(id: &str) -> TypesError {
    TypesError::configuration(format!("document id '{}' already exists", id), Some("id"))
}

fn unknown_index(index: DocIndex) -> TypesError {
    TypesError::configuration(
        format!(
            "no document at index {} (generation {})",
            index.slot, index.generation
        ),
        Some("index"),
    )
}
