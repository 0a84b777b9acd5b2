//! Document tree traversal
//!
//! Two styles are supported:
//! - [`Walk`]: lazy depth-first preorder over one tree, chunks only
//! - traversal paths: strings over `r` (roots), `c` (chunks) and `m`
//!   (matches), e.g. `"cc"` for all chunks at granularity 2 or `"cm"` for the
//!   matches of every first-level chunk. Matches are resolved through a
//!   [`MatchIndex`]; ids the index does not know are skipped.

use super::index::MatchIndex;
use super::Document;
use crate::error::{Result, TypesError};
use std::str::FromStr;

/// Lazy depth-first iterator over a chunk tree
pub struct Walk<'a, P> {
    stack: Vec<&'a Document>,
    predicate: P,
}

impl<'a, P> Walk<'a, P>
where
    P: FnMut(&Document) -> bool,
{
    pub(crate) fn new(root: &'a Document, predicate: P) -> Self {
        Self {
            stack: vec![root],
            predicate,
        }
    }
}

impl<'a, P> Iterator for Walk<'a, P>
where
    P: FnMut(&Document) -> bool,
{
    type Item = &'a Document;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(doc) = self.stack.pop() {
            // reversed so the first chunk is visited first
            self.stack.extend(doc.chunks().iter().rev());
            if (self.predicate)(doc) {
                return Some(doc);
            }
        }
        None
    }
}

/// One step of a traversal path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Root,
    Chunks,
    Matches,
}

/// Parsed traversal path such as `"r"`, `"cc"` or `"cm"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalPath {
    steps: Vec<Step>,
}

impl TraversalPath {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

impl FromStr for TraversalPath {
    type Err = TypesError;

    fn from_str(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(TypesError::configuration(
                "traversal path must not be empty",
                Some("traversal_paths"),
            ));
        }
        let steps = path
            .chars()
            .map(|c| match c {
                'r' => Ok(Step::Root),
                'c' => Ok(Step::Chunks),
                'm' => Ok(Step::Matches),
                other => Err(TypesError::configuration(
                    format!("path step '{}' is invalid, must be one of `c`, `r`, `m`", other),
                    Some("traversal_paths"),
                )),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { steps })
    }
}

/// Leaf sequences reached by each path, in path order
///
/// Every chunk list or match list reached is its own sequence, matching
/// how results are grouped per parent document.
pub fn traverse<'a, I>(
    roots: &'a [Document],
    paths: &[&str],
    index: &'a I,
    filter: Option<&dyn Fn(&Document) -> bool>,
) -> Result<Vec<Vec<&'a Document>>>
where
    I: MatchIndex + ?Sized,
{
    let mut leaves = Vec::new();
    let start: Vec<&'a Document> = roots.iter().collect();
    for path in parse_paths(paths)? {
        collect(start.clone(), path.steps(), index, filter, &mut leaves);
    }
    Ok(leaves)
}

/// One flattened sequence per path, in path order
pub fn traverse_flat_per_path<'a, I>(
    roots: &'a [Document],
    paths: &[&str],
    index: &'a I,
    filter: Option<&dyn Fn(&Document) -> bool>,
) -> Result<Vec<Vec<&'a Document>>>
where
    I: MatchIndex + ?Sized,
{
    let start: Vec<&'a Document> = roots.iter().collect();
    Ok(parse_paths(paths)?
        .iter()
        .map(|path| {
            let mut leaves = Vec::new();
            collect(start.clone(), path.steps(), index, filter, &mut leaves);
            leaves.into_iter().flatten().collect()
        })
        .collect())
}

/// All documents reached by the paths, flattened into one sequence
pub fn traverse_flat<'a, I>(
    roots: &'a [Document],
    paths: &[&str],
    index: &'a I,
    filter: Option<&dyn Fn(&Document) -> bool>,
) -> Result<Vec<&'a Document>>
where
    I: MatchIndex + ?Sized,
{
    Ok(traverse(roots, paths, index, filter)?
        .into_iter()
        .flatten()
        .collect())
}

fn parse_paths(paths: &[&str]) -> Result<Vec<TraversalPath>> {
    if paths.is_empty() {
        return Err(TypesError::configuration(
            "at least one traversal path is required",
            Some("traversal_paths"),
        ));
    }
    paths.iter().map(|p| p.parse::<TraversalPath>()).collect()
}

fn collect<'a, I>(
    docs: Vec<&'a Document>,
    steps: &[Step],
    index: &'a I,
    filter: Option<&dyn Fn(&Document) -> bool>,
    out: &mut Vec<Vec<&'a Document>>,
) where
    I: MatchIndex + ?Sized,
{
    let Some((step, rest)) = steps.split_first() else {
        match filter {
            Some(f) => out.push(docs.into_iter().filter(|d| f(d)).collect()),
            None => out.push(docs),
        }
        return;
    };

    match step {
        Step::Root => collect(docs, rest, index, filter, out),
        Step::Chunks => {
            for doc in docs {
                collect(doc.chunks().iter().collect(), rest, index, filter, out);
            }
        }
        Step::Matches => {
            for doc in docs {
                let resolved = doc
                    .matches
                    .iter()
                    .filter_map(|m| index.resolve(&m.id))
                    .collect();
                collect(resolved, rest, index, filter, out);
            }
        }
    }
}

/// Fixed-size batches; the last batch may be shorter
pub fn batch<T>(items: &[T], batch_size: usize) -> Result<std::slice::Chunks<'_, T>> {
    if batch_size == 0 {
        return Err(TypesError::configuration(
            "batch size should be a positive integer",
            Some("batch_size"),
        ));
    }
    Ok(items.chunks(batch_size))
}
