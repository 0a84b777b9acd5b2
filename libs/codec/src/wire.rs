//! Message set wire serialization
//!
//! Messages and requests are serialized with `bincode`. Decoding re-checks
//! the document tree invariants that serde alone cannot enforce, and the
//! structure of every blob and embedding in the tree.

use crate::error::{CodecError, Result};
use tracing::debug;
use types::{Document, Message, Request};

pub fn encode_message(message: &Message) -> Result<Vec<u8>> {
    bincode::serialize(message).map_err(|err| {
        CodecError::serialization(err, format!("encode message {}", message.request_id()))
    })
}

pub fn decode_message(bytes: &[u8]) -> Result<Message> {
    let message: Message = bincode::deserialize(bytes)
        .map_err(|err| CodecError::serialization(err, format!("decode {} byte message", bytes.len())))?;
    validate_request(&message.request)?;
    debug!(
        request_id = %message.request_id(),
        bytes = bytes.len(),
        "Decoded message"
    );
    Ok(message)
}

pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
    bincode::serialize(request).map_err(|err| {
        CodecError::serialization(err, format!("encode request {}", request.request_id))
    })
}

pub fn decode_request(bytes: &[u8]) -> Result<Request> {
    let request: Request = bincode::deserialize(bytes)
        .map_err(|err| CodecError::serialization(err, format!("decode {} byte request", bytes.len())))?;
    validate_request(&request)?;
    Ok(request)
}

fn validate_request(request: &Request) -> Result<()> {
    if let types::RequestBody::Data { docs, groundtruths } = &request.body {
        for doc in docs.iter().chain(groundtruths) {
            doc.validate()?;
            doc.walk(|_| true).try_for_each(validate_arrays)?;
        }
    }
    Ok(())
}

fn validate_arrays(doc: &Document) -> Result<()> {
    for array in doc.blob().into_iter().chain(doc.embedding.as_ref()) {
        array.validate()?;
    }
    Ok(())
}
