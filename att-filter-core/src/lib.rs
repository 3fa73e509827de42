//! Inline filter for BLE attribute traffic carried over USB bulk/interrupt transfers
//!
//! The filter sits between a host Bluetooth stack and a USB Bluetooth
//! controller. It inspects every bulk/interrupt transfer as raw HCI ACL bytes
//! and rewrites a small fixed set of ATT operations:
//!
//! - Outbound writes to battery-service handles are redirected to HID handles
//! - Inbound HID notifications are relabelled as battery notifications
//! - Oversized inbound notifications can have their headers and length clamped
//!
//! Everything else passes through untouched. A sideband control channel
//! toggles header fixing and per-direction hex dumps at runtime.

pub mod buffer;
pub mod config;
pub mod control;
pub mod error;
pub mod forward;
pub mod pipeline;
pub mod protocol;
pub mod registry;
pub mod rewrite;
pub mod template;
pub mod trace;
pub mod types;

pub use buffer::{resolve, MemoryDescriptor, ResolvedSpan, TransferBuffer};
pub use config::{ConfigFlags, FilterSettings, FlagSnapshot, ForwardMode};
pub use control::{ControlClient, ControlCommand, ControlEndpoint, ControlResponse};
pub use error::{FilterError, TraceError};
pub use forward::{BoxedTarget, Dispatched, FilterDevice, ForwardRejected, LowerTarget};
pub use pipeline::{PassOutcome, Pipeline};
pub use registry::{FilterInstance, FilterRegistry};
pub use template::{find_match, LengthRule, Mutation, RewriteTemplate, CATALOGUE};
pub use trace::{DumpMode, HexBytes, TraceSink, TracingSink};
pub use types::{
    BulkTransfer, CompletedRequest, Direction, IoRequest, RequestKind, Status, Urb, UrbFunction,
};
