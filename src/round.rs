use std::fmt;

use crate::error::ConvertError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    Idle,
    AwaitingResponse,
    Streaming,
    Unpacking,
    Done,
    Failed,
}

impl RoundState {
    pub fn in_flight(&self) -> bool {
        matches!(
            self,
            RoundState::AwaitingResponse | RoundState::Streaming | RoundState::Unpacking
        )
    }
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RoundState::Idle => "idle",
            RoundState::AwaitingResponse => "awaiting response",
            RoundState::Streaming => "streaming",
            RoundState::Unpacking => "unpacking",
            RoundState::Done => "done",
            RoundState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Lifecycle of a conversion round.
///
/// Idle/Done/Failed -> AwaitingResponse -> Streaming -> Unpacking -> Done,
/// and any in-flight state may go to Failed. A new round can only begin once
/// the previous one has settled.
#[derive(Debug)]
pub struct RoundMachine {
    state: RoundState,
}

impl RoundMachine {
    pub fn new() -> Self {
        Self {
            state: RoundState::Idle,
        }
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn submit_enabled(&self) -> bool {
        !self.state.in_flight()
    }

    pub fn begin(&mut self) -> Result<(), ConvertError> {
        if self.state.in_flight() {
            return Err(ConvertError::Busy);
        }
        self.move_to(RoundState::AwaitingResponse);
        Ok(())
    }

    pub fn streaming(&mut self) {
        self.advance(RoundState::AwaitingResponse, RoundState::Streaming);
    }

    pub fn unpacking(&mut self) {
        self.advance(RoundState::Streaming, RoundState::Unpacking);
    }

    pub fn finish(&mut self) {
        self.advance(RoundState::Unpacking, RoundState::Done);
    }

    pub fn fail(&mut self) {
        if self.state.in_flight() {
            self.move_to(RoundState::Failed);
        }
    }

    fn advance(&mut self, from: RoundState, to: RoundState) {
        if self.state == from {
            self.move_to(to);
        } else {
            tracing::warn!("Ignoring round transition {} -> {} from {}", from, to, self.state);
        }
    }

    fn move_to(&mut self, next: RoundState) {
        tracing::debug!("round: {} -> {}", self.state, next);
        self.state = next;
    }
}

impl Default for RoundMachine {
    fn default() -> Self {
        Self::new()
    }
}
