//! Filter error types

use thiserror::Error;

use crate::types::Status;

/// Errors that can occur on the data path or the control channel
///
/// None of these are fatal to the filter. Data-path errors are absorbed and the
/// transfer keeps moving; control errors are reported to the control caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// Neither the flat buffer nor the memory descriptor yielded a span
    #[error("Transfer buffer could not be resolved")]
    UnresolvedBuffer,

    #[error("Unsupported control command 0x{0:08X}")]
    UnsupportedControlCommand(u32),

    /// The lower layer refused the request; the status is passed up verbatim
    #[error("Lower layer rejected request: status {0}")]
    ForwardFailure(Status),

    #[error("Control endpoint is not available")]
    EndpointClosed,
}

impl FilterError {
    /// Status reported to the caller that issued the failing operation
    pub fn status(&self) -> Status {
        match self {
            Self::UnresolvedBuffer => Status::SUCCESS,
            Self::UnsupportedControlCommand(_) => Status::NOT_IMPLEMENTED,
            Self::ForwardFailure(status) => *status,
            Self::EndpointClosed => Status::DEVICE_NOT_CONNECTED,
        }
    }
}

/// Failure to emit a data dump; always swallowed by the pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TraceError {
    #[error("Trace channel unavailable")]
    Unavailable,
}
