//! Request-level status and exception records

use crate::error::{Result, TypesError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status code; numeric values are the wire contract
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StatusCode {
    #[default]
    Success = 0,
    Pending = 1,
    Ready = 2,
    Error = 3,
    ErrorDuplicate = 4,
    ErrorNotAllowed = 5,
    ErrorChained = 6,
}

impl StatusCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(StatusCode::Success),
            1 => Ok(StatusCode::Pending),
            2 => Ok(StatusCode::Ready),
            3 => Ok(StatusCode::Error),
            4 => Ok(StatusCode::ErrorDuplicate),
            5 => Ok(StatusCode::ErrorNotAllowed),
            6 => Ok(StatusCode::ErrorChained),
            other => Err(TypesError::configuration(
                format!("Unknown status code {}", other),
                Some("status.code"),
            )),
        }
    }

    /// PENDING and READY only describe an outstanding gather
    pub fn is_advisory(self) -> bool {
        matches!(self, StatusCode::Pending | StatusCode::Ready)
    }

    pub fn is_error(self) -> bool {
        matches!(
            self,
            StatusCode::Error
                | StatusCode::ErrorDuplicate
                | StatusCode::ErrorNotAllowed
                | StatusCode::ErrorChained
        )
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::Success => "SUCCESS",
            StatusCode::Pending => "PENDING",
            StatusCode::Ready => "READY",
            StatusCode::Error => "ERROR",
            StatusCode::ErrorDuplicate => "ERROR_DUPLICATE",
            StatusCode::ErrorNotAllowed => "ERROR_NOTALLOWED",
            StatusCode::ErrorChained => "ERROR_CHAINED",
        };
        f.write_str(name)
    }
}

/// Exception raised by an executor at some hop
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExceptionInfo {
    pub name: String,
    pub args: Vec<String>,
    pub stacks: Vec<String>,
    /// Executor that raised the exception
    pub executor: String,
}

impl ExceptionInfo {
    pub fn new(name: impl Into<String>, executor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executor: executor.into(),
            ..Default::default()
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_stacks(mut self, stacks: Vec<String>) -> Self {
        self.stacks = stacks;
        self
    }
}

/// Status of a request, a hop or an envelope
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Status {
    pub code: StatusCode,
    pub description: String,
    pub exception: Option<ExceptionInfo>,
}

impl Status {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn with_code(code: StatusCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
            exception: None,
        }
    }

    /// ERROR status carrying the exception raised by `executor`
    pub fn error_from(
        executor: impl Into<String>,
        name: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        let exception = ExceptionInfo::new(name, executor).with_args(args);
        Self {
            code: StatusCode::Error,
            description: format!("{} raised by {}", exception.name, exception.executor),
            exception: Some(exception),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == StatusCode::Success
    }

    /// True for statuses that may be reported to the original caller
    pub fn is_terminal(&self) -> bool {
        !self.code.is_advisory()
    }

    /// Executor named by the carried exception, if any
    pub fn failing_executor(&self) -> Option<&str> {
        self.exception.as_ref().map(|e| e.executor.as_str())
    }
}
