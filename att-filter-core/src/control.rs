//! Sideband control channel
//!
//! Control commands are device-control codes with no payload. They arrive over
//! a bounded channel and are handled one at a time by a single worker task,
//! which is the only writer of `ConfigFlags`. The data path never waits on it.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ConfigFlags, FilterSettings};
use crate::error::FilterError;
use crate::types::Status;

/// Outstanding control requests before senders wait
const CONTROL_QUEUE_SIZE: usize = 8;

pub const FILE_DEVICE_UNKNOWN: u32 = 0x0000_0022;
pub const METHOD_BUFFERED: u32 = 0;
pub const FILE_READ_DATA: u32 = 0x0001;

/// Build a device-control code from its four fields
pub const fn ctl_code(device_type: u32, function: u32, method: u32, access: u32) -> u32 {
    (device_type << 16) | (access << 14) | (function << 2) | method
}

const fn filter_code(function: u32) -> u32 {
    ctl_code(FILE_DEVICE_UNKNOWN, function, METHOD_BUFFERED, FILE_READ_DATA)
}

/// Control codes understood by the endpoint
pub mod code {
    use super::filter_code;

    pub const FIX_HEADERS_OFF: u32 = filter_code(0x10);
    pub const FIX_HEADERS_ON: u32 = filter_code(0x11);
    pub const TRACE_INBOUND_OFF: u32 = filter_code(0x20);
    pub const TRACE_INBOUND_ON: u32 = filter_code(0x21);
    pub const TRACE_OUTBOUND_OFF: u32 = filter_code(0x30);
    pub const TRACE_OUTBOUND_ON: u32 = filter_code(0x31);
}

/// A decoded control command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    FixHeaders(bool),
    TraceInbound(bool),
    TraceOutbound(bool),
}

impl ControlCommand {
    /// Every command, in code order
    pub const ALL: [ControlCommand; 6] = [
        Self::FixHeaders(false),
        Self::FixHeaders(true),
        Self::TraceInbound(false),
        Self::TraceInbound(true),
        Self::TraceOutbound(false),
        Self::TraceOutbound(true),
    ];

    pub fn from_code(ctl: u32) -> Result<Self, FilterError> {
        match ctl {
            code::FIX_HEADERS_OFF => Ok(Self::FixHeaders(false)),
            code::FIX_HEADERS_ON => Ok(Self::FixHeaders(true)),
            code::TRACE_INBOUND_OFF => Ok(Self::TraceInbound(false)),
            code::TRACE_INBOUND_ON => Ok(Self::TraceInbound(true)),
            code::TRACE_OUTBOUND_OFF => Ok(Self::TraceOutbound(false)),
            code::TRACE_OUTBOUND_ON => Ok(Self::TraceOutbound(true)),
            other => Err(FilterError::UnsupportedControlCommand(other)),
        }
    }

    pub fn code(&self) -> u32 {
        match *self {
            Self::FixHeaders(false) => code::FIX_HEADERS_OFF,
            Self::FixHeaders(true) => code::FIX_HEADERS_ON,
            Self::TraceInbound(false) => code::TRACE_INBOUND_OFF,
            Self::TraceInbound(true) => code::TRACE_INBOUND_ON,
            Self::TraceOutbound(false) => code::TRACE_OUTBOUND_OFF,
            Self::TraceOutbound(true) => code::TRACE_OUTBOUND_ON,
        }
    }

    pub fn name(&self) -> &'static str {
        match *self {
            Self::FixHeaders(false) => "FIX_HEADERS_OFF",
            Self::FixHeaders(true) => "FIX_HEADERS_ON",
            Self::TraceInbound(false) => "TRACE_INBOUND_OFF",
            Self::TraceInbound(true) => "TRACE_INBOUND_ON",
            Self::TraceOutbound(false) => "TRACE_OUTBOUND_OFF",
            Self::TraceOutbound(true) => "TRACE_OUTBOUND_ON",
        }
    }

    fn apply(&self, flags: &ConfigFlags) {
        match *self {
            Self::FixHeaders(on) => flags.set_fix_headers(on),
            Self::TraceInbound(on) => flags.set_trace_inbound(on),
            Self::TraceOutbound(on) => flags.set_trace_outbound(on),
        }
    }

    /// The three commands that establish `settings`
    pub fn for_settings(settings: &FilterSettings) -> [ControlCommand; 3] {
        [
            Self::FixHeaders(settings.fix_headers),
            Self::TraceInbound(settings.trace_inbound),
            Self::TraceOutbound(settings.trace_outbound),
        ]
    }
}

/// Reply to one control request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlResponse {
    pub status: Status,
    /// Always zero; commands carry no payload
    pub bytes_transferred: usize,
}

/// Applies control codes to the shared flags
pub struct ControlEndpoint {
    flags: Arc<ConfigFlags>,
}

impl ControlEndpoint {
    pub fn new(flags: Arc<ConfigFlags>) -> Self {
        Self { flags }
    }

    /// Handle one control code
    ///
    /// Callers must not run this concurrently with itself; `spawn` guarantees
    /// that by funnelling every request through one task.
    pub fn handle(&self, ctl: u32) -> ControlResponse {
        let status = match ControlCommand::from_code(ctl) {
            Ok(cmd) => {
                cmd.apply(&self.flags);
                info!("Control {} applied", cmd.name());
                Status::SUCCESS
            }
            Err(e) => {
                warn!("{e}");
                e.status()
            }
        };
        ControlResponse {
            status,
            bytes_transferred: 0,
        }
    }

    /// Start the serialized worker and return a client for it
    pub fn spawn(self) -> (ControlClient, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(CONTROL_QUEUE_SIZE);
        let worker = tokio::spawn(control_worker(self, rx));
        (ControlClient { tx }, worker)
    }
}

struct ControlRequest {
    code: u32,
    reply: oneshot::Sender<ControlResponse>,
}

async fn control_worker(endpoint: ControlEndpoint, mut rx: mpsc::Receiver<ControlRequest>) {
    debug!("Control endpoint worker started");
    while let Some(req) = rx.recv().await {
        let response = endpoint.handle(req.code);
        let _ = req.reply.send(response);
    }
    debug!("Control endpoint worker stopped");
}

/// Sending half of the control channel
#[derive(Clone)]
pub struct ControlClient {
    tx: mpsc::Sender<ControlRequest>,
}

impl ControlClient {
    /// Send a raw control code and wait for the endpoint's reply
    pub async fn send_code(&self, code: u32) -> Result<ControlResponse, FilterError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(ControlRequest { code, reply })
            .await
            .map_err(|_| FilterError::EndpointClosed)?;
        response.await.map_err(|_| FilterError::EndpointClosed)
    }

    /// Send a command, failing if the endpoint did not accept it
    pub async fn send(&self, cmd: ControlCommand) -> Result<(), FilterError> {
        let response = self.send_code(cmd.code()).await?;
        if response.status.is_success() {
            Ok(())
        } else {
            Err(FilterError::UnsupportedControlCommand(cmd.code()))
        }
    }

    /// Issue the three commands that establish `settings`, in order
    pub async fn apply(&self, settings: &FilterSettings) -> Result<(), FilterError> {
        for cmd in ControlCommand::for_settings(settings) {
            self.send(cmd).await?;
            debug!("Control {} sent", cmd.name());
        }
        Ok(())
    }
}
