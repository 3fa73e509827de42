//! Capture reading errors

use thiserror::Error;

/// LINKTYPE_USBPCAP
pub const LINKTYPE_USBPCAP: i32 = 249;

/// Why a capture file could not be read
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Not a pcap/pcapng capture: {0}")]
    UnrecognizedFormat(String),

    /// The replay only understands USBPcap packet headers
    #[error("Capture link type {0} is not USBPcap (249)")]
    UnsupportedLinkType(i32),

    #[error("PCAP parse error: {0}")]
    Parse(String),
}
