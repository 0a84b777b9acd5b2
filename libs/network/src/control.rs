//! Control commands and the router-dealer state machine
//!
//! IDLE, ACTIVATE and DEACTIVATE only move [`DealerState`]; they never touch
//! envelopes or documents. TERMINATE is final.
//!
//! ```text
//!            ACTIVATE              (work)
//! Inactive ───────────▶ Ready ◀──────────▶ Busy
//!     ▲                  │       IDLE        │
//!     └──── DEACTIVATE ──┴───────────────────┘
//!
//! any ── TERMINATE ──▶ Terminated
//! ```

use crate::{Result, TransportError};
use async_trait::async_trait;
use std::fmt;
use types::{ControlCommand, Request};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DealerState {
    #[default]
    Inactive,
    Ready,
    Busy,
    Terminated,
}

impl DealerState {
    /// Next state after `command`; illegal transitions are errors
    pub fn on_command(self, command: ControlCommand) -> Result<Self> {
        use ControlCommand::*;
        use DealerState::*;

        match (self, command) {
            (_, Terminate) => Ok(Terminated),
            (Terminated, Status) => Ok(Terminated),
            (Terminated, other) => Err(not_allowed(self, other)),
            (Inactive | Ready, Activate) => Ok(Ready),
            (Busy, Activate) => Ok(Busy),
            (_, Deactivate) => Ok(Inactive),
            (Ready | Busy, Idle) => Ok(Ready),
            (Inactive, Idle) => Err(not_allowed(self, command)),
            (state, Status | Cancel | Scale) => Ok(state),
        }
    }

    /// Ready dealer picks up work
    pub fn begin_work(self) -> Result<Self> {
        match self {
            DealerState::Ready | DealerState::Busy => Ok(DealerState::Busy),
            other => Err(TransportError::channel(
                "dealer",
                format!("cannot accept work while {}", other),
            )),
        }
    }

    pub fn is_terminated(self) -> bool {
        self == DealerState::Terminated
    }
}

impl fmt::Display for DealerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DealerState::Inactive => "inactive",
            DealerState::Ready => "ready",
            DealerState::Busy => "busy",
            DealerState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

fn not_allowed(state: DealerState, command: ControlCommand) -> TransportError {
    TransportError::protocol(format!("{} is not allowed while {}", command, state))
}

/// User hooks run after the runtime has done its own bookkeeping
#[async_trait]
pub trait ControlHooks: Send + Sync {
    async fn on_terminate(&self, _request: &Request) -> Result<()> {
        Ok(())
    }

    async fn on_status(&self, _request: &Request) -> Result<()> {
        Ok(())
    }

    async fn on_idle(&self, _request: &Request) -> Result<()> {
        Ok(())
    }

    async fn on_cancel(&self, _request: &Request) -> Result<()> {
        Ok(())
    }

    async fn on_scale(&self, _request: &Request) -> Result<()> {
        Ok(())
    }

    async fn on_activate(&self, _request: &Request) -> Result<()> {
        Ok(())
    }

    async fn on_deactivate(&self, _request: &Request) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl ControlHooks for NoopHooks {}

/// Route a command to its hook
pub async fn dispatch(
    hooks: &dyn ControlHooks,
    command: ControlCommand,
    request: &Request,
) -> Result<()> {
    match command {
        ControlCommand::Terminate => hooks.on_terminate(request).await,
        ControlCommand::Status => hooks.on_status(request).await,
        ControlCommand::Idle => hooks.on_idle(request).await,
        ControlCommand::Cancel => hooks.on_cancel(request).await,
        ControlCommand::Scale => hooks.on_scale(request).await,
        ControlCommand::Activate => hooks.on_activate(request).await,
        ControlCommand::Deactivate => hooks.on_deactivate(request).await,
    }
}
