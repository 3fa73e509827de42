//! USBPcap packet header parsing
//!
//! ```text
//! Offset  Size  Field
//! 0       2     headerLen
//! 2       8     irpId
//! 10      4     status (USBD_STATUS)
//! 14      2     function
//! 16      1     info (bit 0: 0 = submit, 1 = completion)
//! 17      2     bus
//! 19      2     device
//! 21      1     endpoint (bit 7 = IN)
//! 22      1     transferType (0=iso, 1=int, 2=ctrl, 3=bulk)
//! 23      4     dataLength
//! ```
//!
//! Control transfers carry one extra stage byte after the base header, which
//! `headerLen` already accounts for.

use att_filter_core::{Direction, Status, UrbFunction};

/// Size of the fixed USBPcap header
pub const BASE_HEADER_LEN: usize = 27;

/// Endpoint address bit that marks an IN endpoint
pub const ENDPOINT_DIR_IN: u8 = 0x80;

/// Info bit set on packets captured on the completion path
const INFO_COMPLETION: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    Isochronous,
    Interrupt,
    Control,
    Bulk,
}

impl TransferType {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Isochronous),
            1 => Some(Self::Interrupt),
            2 => Some(Self::Control),
            3 => Some(Self::Bulk),
            _ => None,
        }
    }

    pub fn is_bulk_or_interrupt(&self) -> bool {
        matches!(self, Self::Bulk | Self::Interrupt)
    }
}

/// Which side of the request a packet was captured on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// On its way down to the controller
    Submit,
    /// Handed back by the controller
    Completion,
}

/// Parsed USBPcap header
#[derive(Debug, Clone)]
pub struct UrbHeader {
    pub header_len: u16,
    pub irp_id: u64,
    /// USBD status; same high-bit failure convention as `Status`
    pub status: u32,
    pub function: UrbFunction,
    pub stage: Stage,
    pub bus: u16,
    pub device: u16,
    pub endpoint: u8,
    pub transfer_type: TransferType,
    pub data_len: u32,
}

impl UrbHeader {
    /// Direction of the transfer, from the endpoint address
    pub fn direction(&self) -> Direction {
        if self.endpoint & ENDPOINT_DIR_IN != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    pub fn completion_status(&self) -> Status {
        Status(self.status)
    }
}

/// One captured packet: header plus whatever payload followed it
#[derive(Debug, Clone)]
pub struct UsbPacket {
    pub urb: UrbHeader,
    pub data: Vec<u8>,
}

/// Parse the USBPcap header from raw bytes
pub fn parse_urb_header(raw: &[u8]) -> Option<UrbHeader> {
    if raw.len() < BASE_HEADER_LEN {
        return None;
    }

    let header_len = u16::from_le_bytes([raw[0], raw[1]]);
    if (header_len as usize) < BASE_HEADER_LEN || raw.len() < header_len as usize {
        return None;
    }

    let irp_id = u64::from_le_bytes([
        raw[2], raw[3], raw[4], raw[5], raw[6], raw[7], raw[8], raw[9],
    ]);
    let status = u32::from_le_bytes([raw[10], raw[11], raw[12], raw[13]]);
    let function = u16::from_le_bytes([raw[14], raw[15]]);
    let info = raw[16];
    let bus = u16::from_le_bytes([raw[17], raw[18]]);
    let device = u16::from_le_bytes([raw[19], raw[20]]);
    let endpoint = raw[21];
    let transfer_type = TransferType::from_byte(raw[22])?;
    let data_len = u32::from_le_bytes([raw[23], raw[24], raw[25], raw[26]]);

    let stage = if info & INFO_COMPLETION != 0 {
        Stage::Completion
    } else {
        Stage::Submit
    };

    Some(UrbHeader {
        header_len,
        irp_id,
        status,
        function: function.into(),
        stage,
        bus,
        device,
        endpoint,
        transfer_type,
        data_len,
    })
}

/// Parse a complete packet; a payload shorter than `dataLength` is dropped
pub fn parse_usb_packet(raw: &[u8]) -> Option<UsbPacket> {
    let urb = parse_urb_header(raw)?;
    let start = urb.header_len as usize;
    let len = urb.data_len as usize;

    let data = match raw.get(start..start + len) {
        Some(bytes) if len > 0 => bytes.to_vec(),
        _ => Vec::new(),
    };
    Some(UsbPacket { urb, data })
}

/// Build a raw bulk packet (for tests and synthetic captures)
pub fn build_bulk_packet(
    irp_id: u64,
    status: u32,
    stage: Stage,
    endpoint: u8,
    data: &[u8],
) -> Vec<u8> {
    let mut raw = Vec::with_capacity(BASE_HEADER_LEN + data.len());
    raw.extend_from_slice(&(BASE_HEADER_LEN as u16).to_le_bytes());
    raw.extend_from_slice(&irp_id.to_le_bytes());
    raw.extend_from_slice(&status.to_le_bytes());
    raw.extend_from_slice(&0x0009u16.to_le_bytes());
    raw.push(match stage {
        Stage::Submit => 0,
        Stage::Completion => INFO_COMPLETION,
    });
    raw.extend_from_slice(&1u16.to_le_bytes());
    raw.extend_from_slice(&2u16.to_le_bytes());
    raw.push(endpoint);
    raw.push(3);
    raw.extend_from_slice(&(data.len() as u32).to_le_bytes());
    raw.extend_from_slice(data);
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_urb() {
        let mut raw = vec![0u8; 27];
        raw[0] = 27;
        raw[22] = 1;

        let urb = parse_urb_header(&raw).unwrap();
        assert_eq!(urb.header_len, 27);
        assert_eq!(urb.transfer_type, TransferType::Interrupt);
        assert_eq!(urb.stage, Stage::Submit);
        assert_eq!(urb.direction(), Direction::Out);
    }

    #[test]
    fn test_short_or_bad_header_rejected() {
        assert!(parse_urb_header(&[0u8; 10]).is_none());
        let mut raw = vec![0u8; 27];
        raw[0] = 12;
        assert!(parse_urb_header(&raw).is_none());
        raw[0] = 27;
        raw[22] = 9;
        assert!(parse_urb_header(&raw).is_none());
    }

    #[test]
    fn test_bulk_packet_fields() {
        let raw = build_bulk_packet(0xABCD, 0, Stage::Completion, 0x82, &[1, 2, 3]);
        let packet = parse_usb_packet(&raw).unwrap();
        assert_eq!(packet.urb.irp_id, 0xABCD);
        assert_eq!(packet.urb.function, UrbFunction::BulkOrInterruptTransfer);
        assert_eq!(packet.urb.stage, Stage::Completion);
        assert_eq!(packet.urb.direction(), Direction::In);
        assert!(packet.urb.completion_status().is_success());
        assert_eq!(packet.data, vec![1, 2, 3]);
    }

    #[test]
    fn test_truncated_payload_dropped() {
        let mut raw = build_bulk_packet(1, 0, Stage::Submit, 0x02, &[1, 2, 3, 4]);
        raw.truncate(raw.len() - 1);
        let packet = parse_usb_packet(&raw).unwrap();
        assert!(packet.data.is_empty());
    }
}
