//! Requests, control commands and the enveloped message

use super::envelope::{Envelope, Header};
use super::routing::Route;
use super::status::Status;
use crate::document::Document;
use crate::error::{Result, TypesError};
use crate::structured::Struct;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Control vocabulary; numeric values are the wire contract
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlCommand {
    Terminate = 0,
    Status = 1,
    Idle = 2,
    Cancel = 3,
    Scale = 4,
    Activate = 5,
    Deactivate = 6,
}

impl ControlCommand {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ControlCommand::Terminate),
            1 => Ok(ControlCommand::Status),
            2 => Ok(ControlCommand::Idle),
            3 => Ok(ControlCommand::Cancel),
            4 => Ok(ControlCommand::Scale),
            5 => Ok(ControlCommand::Activate),
            6 => Ok(ControlCommand::Deactivate),
            other => Err(TypesError::configuration(
                format!("Unknown control command {}", other),
                Some("command"),
            )),
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlCommand::Terminate => "TERMINATE",
            ControlCommand::Status => "STATUS",
            ControlCommand::Idle => "IDLE",
            ControlCommand::Cancel => "CANCEL",
            ControlCommand::Scale => "SCALE",
            ControlCommand::Activate => "ACTIVATE",
            ControlCommand::Deactivate => "DEACTIVATE",
        };
        f.write_str(name)
    }
}

/// Request payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestBody {
    Control {
        command: ControlCommand,
    },
    Data {
        docs: Vec<Document>,
        groundtruths: Vec<Document>,
    },
}

impl RequestBody {
    pub fn kind(&self) -> &'static str {
        match self {
            RequestBody::Control { .. } => "control",
            RequestBody::Data { .. } => "data",
        }
    }
}

/// Caller-facing request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub request_id: String,
    pub body: RequestBody,
    pub header: Header,
    pub parameters: Struct,
    pub routes: Vec<Route>,
    pub status: Status,
}

impl Request {
    pub fn data(request_id: impl Into<String>, docs: Vec<Document>) -> Self {
        Self::with_body(
            request_id,
            RequestBody::Data {
                docs,
                groundtruths: Vec::new(),
            },
        )
    }

    pub fn control(request_id: impl Into<String>, command: ControlCommand) -> Self {
        Self::with_body(request_id, RequestBody::Control { command })
    }

    fn with_body(request_id: impl Into<String>, body: RequestBody) -> Self {
        Self {
            request_id: request_id.into(),
            body,
            header: Header::default(),
            parameters: Struct::new(),
            routes: Vec::new(),
            status: Status::success(),
        }
    }

    pub fn with_header(mut self, header: Header) -> Self {
        self.header = header;
        self
    }

    pub fn command(&self) -> Option<ControlCommand> {
        match &self.body {
            RequestBody::Control { command } => Some(*command),
            RequestBody::Data { .. } => None,
        }
    }

    pub fn docs(&self) -> &[Document] {
        match &self.body {
            RequestBody::Data { docs, .. } => docs,
            RequestBody::Control { .. } => &[],
        }
    }

    pub fn docs_mut(&mut self) -> Option<&mut Vec<Document>> {
        match &mut self.body {
            RequestBody::Data { docs, .. } => Some(docs),
            RequestBody::Control { .. } => None,
        }
    }
}

/// Envelope plus request, the unit that moves between pods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub envelope: Envelope,
    pub request: Request,
}

impl Message {
    /// Wrap a request; the envelope takes over request id and header
    pub fn new(mut envelope: Envelope, request: Request) -> Self {
        envelope.request_id = request.request_id.clone();
        envelope.header = request.header.clone();
        Self { envelope, request }
    }

    pub fn request_id(&self) -> &str {
        &self.envelope.request_id
    }

    /// Strip the envelope, handing routes and status over to the request
    pub fn into_request(self) -> Request {
        let Message {
            envelope,
            mut request,
        } = self;
        request.routes = envelope.routes;
        request.status = envelope.status;
        request
    }
}
