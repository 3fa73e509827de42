//! Common types for the interception path

use std::fmt;

use crate::buffer::TransferBuffer;

/// Direction of a USB transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Host to device (OUT)
    Out,
    /// Device to host (IN)
    In,
}

impl Direction {
    /// Decode the direction bit of URB transfer flags
    pub fn from_transfer_flags(flags: u32) -> Self {
        if flags & transfer_flags::DIRECTION_IN != 0 {
            Self::In
        } else {
            Self::Out
        }
    }

    /// Short label used in data dumps
    pub fn label(&self) -> &'static str {
        match self {
            Self::Out => "OUT",
            Self::In => "IN",
        }
    }
}

/// URB transfer flag bits
pub mod transfer_flags {
    pub const DIRECTION_IN: u32 = 0x0000_0001;
    pub const SHORT_TRANSFER_OK: u32 = 0x0000_0002;
}

/// URB function codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrbFunction {
    /// URB_FUNCTION_SELECT_CONFIGURATION
    SelectConfiguration,
    /// URB_FUNCTION_SELECT_INTERFACE
    SelectInterface,
    /// URB_FUNCTION_CONTROL_TRANSFER
    ControlTransfer,
    /// URB_FUNCTION_BULK_OR_INTERRUPT_TRANSFER
    BulkOrInterruptTransfer,
    /// URB_FUNCTION_CLASS_DEVICE
    ClassDevice,
    /// Other/unknown function
    Unknown(u16),
}

impl From<u16> for UrbFunction {
    fn from(v: u16) -> Self {
        match v {
            0x0000 => Self::SelectConfiguration,
            0x0001 => Self::SelectInterface,
            0x0008 => Self::ControlTransfer,
            0x0009 => Self::BulkOrInterruptTransfer,
            0x001A => Self::ClassDevice,
            other => Self::Unknown(other),
        }
    }
}

/// 32-bit completion status word reported by the lower layer
///
/// Negative values (high bit set) are failures. The filter never rewrites one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub u32);

impl Status {
    pub const SUCCESS: Self = Self(0x0000_0000);
    pub const NOT_IMPLEMENTED: Self = Self(0xC000_0002);
    pub const DEVICE_NOT_CONNECTED: Self = Self(0xC000_009D);
    pub const CANCELLED: Self = Self(0xC000_0120);

    pub fn is_success(&self) -> bool {
        (self.0 as i32) >= 0
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// A bulk or interrupt transfer
///
/// `declared_length` is what the consuming layer will read; the buffer may be
/// physically larger.
#[derive(Debug)]
pub struct BulkTransfer {
    pub transfer_flags: u32,
    pub declared_length: usize,
    pub buffer: TransferBuffer,
}

impl BulkTransfer {
    pub fn new(direction: Direction, buffer: TransferBuffer, declared_length: usize) -> Self {
        let transfer_flags = match direction {
            Direction::In => transfer_flags::DIRECTION_IN | transfer_flags::SHORT_TRANSFER_OK,
            Direction::Out => 0,
        };
        Self {
            transfer_flags,
            declared_length,
            buffer,
        }
    }

    pub fn direction(&self) -> Direction {
        Direction::from_transfer_flags(self.transfer_flags)
    }
}

/// USB request block carried by a submit-URB request
#[derive(Debug)]
pub enum Urb {
    BulkOrInterrupt(BulkTransfer),
    /// Any other URB function; never inspected
    Other { function: UrbFunction },
}

impl Urb {
    pub fn function(&self) -> UrbFunction {
        match self {
            Self::BulkOrInterrupt(_) => UrbFunction::BulkOrInterruptTransfer,
            Self::Other { function } => *function,
        }
    }
}

/// What kind of request travels down the stack
#[derive(Debug)]
pub enum RequestKind {
    /// Internal USB submit-URB request
    SubmitUrb(Urb),
    /// Any other internal device control request
    DeviceControl { code: u32 },
}

/// One in-flight request, owned by the surrounding I/O stack
#[derive(Debug)]
pub struct IoRequest {
    /// Identifier for correlating log lines (IRP id in captures)
    pub id: u64,
    pub kind: RequestKind,
}

impl IoRequest {
    pub fn bulk(id: u64, transfer: BulkTransfer) -> Self {
        Self {
            id,
            kind: RequestKind::SubmitUrb(Urb::BulkOrInterrupt(transfer)),
        }
    }

    /// The bulk/interrupt transfer inside this request, if that is what it carries
    pub fn bulk_transfer(&self) -> Option<&BulkTransfer> {
        match &self.kind {
            RequestKind::SubmitUrb(Urb::BulkOrInterrupt(t)) => Some(t),
            _ => None,
        }
    }

    pub fn bulk_transfer_mut(&mut self) -> Option<&mut BulkTransfer> {
        match &mut self.kind {
            RequestKind::SubmitUrb(Urb::BulkOrInterrupt(t)) => Some(t),
            _ => None,
        }
    }
}

/// A request handed back by the lower layer along with its final status
#[derive(Debug)]
pub struct CompletedRequest {
    pub request: IoRequest,
    pub status: Status,
}
