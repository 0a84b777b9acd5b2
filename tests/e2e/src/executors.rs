//! Executors used by the test topologies

use async_trait::async_trait;
use codec::{encode_ndarray, Layout, RawArray};
use ndarray::{ArrayD, IxDyn};
use network::{Executor, ExecutorError};
use types::{Document, QuantizationMode, Request, StructValue};

/// Appends a document named after the pod and tags incoming ones
#[derive(Debug, Clone)]
pub struct Tagger {
    pub pod: String,
}

impl Tagger {
    pub fn new(pod: impl Into<String>) -> Self {
        Self { pod: pod.into() }
    }
}

#[async_trait]
impl Executor for Tagger {
    async fn execute(&self, request: &mut Request) -> Result<(), ExecutorError> {
        let docs = request
            .docs_mut()
            .ok_or_else(|| ExecutorError::new("NotData", "tagger needs a data request"))?;
        for doc in docs.iter_mut() {
            doc.tags
                .insert(format!("seen_by_{}", self.pod), StructValue::Bool(true));
        }
        docs.push(Document::new(format!("{}-doc", self.pod)));
        Ok(())
    }
}

/// Always fails with the given exception name
#[derive(Debug, Clone)]
pub struct Failing {
    pub name: String,
    pub message: String,
}

impl Failing {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Executor for Failing {
    async fn execute(&self, _request: &mut Request) -> Result<(), ExecutorError> {
        Err(ExecutorError::new(self.name.clone(), self.message.clone()))
    }
}

/// Attaches a deterministic embedding to every text document
#[derive(Debug, Clone)]
pub struct Embedder {
    pub dim: usize,
    pub layout: Layout,
}

impl Embedder {
    pub fn new(dim: usize, mode: QuantizationMode) -> Self {
        Self {
            dim,
            layout: Layout::Dense(mode),
        }
    }

    pub fn sparse(dim: usize) -> Self {
        Self {
            dim,
            layout: Layout::Sparse,
        }
    }

    /// The embedding `text` maps to, before quantization
    pub fn embed(&self, text: &str) -> ArrayD<f32> {
        let bytes = text.as_bytes();
        let values = (0..self.dim)
            .map(|i| match bytes.get(i) {
                Some(b) if i % 2 == 0 => *b as f32 / 255.0,
                _ => 0.0,
            })
            .collect();
        ArrayD::from_shape_vec(IxDyn(&[self.dim]), values)
            .unwrap_or_else(|_| ArrayD::zeros(IxDyn(&[self.dim])))
    }
}

#[async_trait]
impl Executor for Embedder {
    async fn execute(&self, request: &mut Request) -> Result<(), ExecutorError> {
        let docs = request
            .docs_mut()
            .ok_or_else(|| ExecutorError::new("NotData", "embedder needs a data request"))?;
        for doc in docs.iter_mut() {
            let Some(text) = doc.text() else { continue };
            let raw = RawArray::from(self.embed(text));
            let encoded = encode_ndarray(&raw, self.layout)
                .map_err(|err| ExecutorError::new("EncodeError", err.to_string()))?;
            doc.embedding = Some(encoded);
        }
        Ok(())
    }
}
