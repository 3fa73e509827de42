//! Protocol constants for the framed BLE traffic seen on the USB pipe
//!
//! Every bulk/interrupt payload the filter cares about is three nested
//! headers followed by the attribute PDU:
//!
//! ```text
//! Offset  Size  Field
//! 0       2     HCI ACL connection handle + packet boundary flags
//! 2       2     HCI ACL data length
//! 4       2     L2CAP payload length
//! 6       2     L2CAP channel id (0x0004 = ATT)
//! 8       1     ATT opcode
//! 9       2     ATT attribute handle (little endian)
//! 11      ..    ATT value
//! ```

/// HCI ACL header fields
pub mod hci {
    /// Offset of the ACL data length (low byte)
    pub const ACL_LENGTH_OFFSET: usize = 2;
    /// Low byte of the connection handle used by the remote
    pub const CONNECTION_HANDLE_LO: u8 = 0x80;
    /// Handle high nibble + boundary flags for host-originated fragments
    pub const FLAGS_HOST: u8 = 0x00;
    /// Handle high nibble + boundary flags for controller-originated fragments
    pub const FLAGS_CONTROLLER: u8 = 0x20;
    /// Largest ACL payload the controller forwards intact (L2CAP header + 22 ATT bytes)
    pub const MAX_ACL_PAYLOAD: u8 = 0x1A;
}

/// L2CAP basic header fields
pub mod l2cap {
    /// Offset of the L2CAP payload length (low byte)
    pub const LENGTH_OFFSET: usize = 4;
    /// Attribute protocol fixed channel
    pub const CID_ATT: u8 = 0x04;
    /// Largest ATT PDU the controller forwards intact
    pub const MAX_ATT_PAYLOAD: u8 = 0x16;
}

/// Attribute protocol fields
pub mod att {
    /// Offset of the ATT opcode
    pub const OPCODE_OFFSET: usize = 8;
    /// Offset of the attribute handle (low byte)
    pub const HANDLE_OFFSET: usize = 9;

    /// ATT opcodes used by the remote's HID and battery services
    pub mod opcode {
        pub const WRITE_REQUEST: u8 = 0x12;
        pub const HANDLE_VALUE_NOTIFICATION: u8 = 0x1B;
        pub const WRITE_COMMAND: u8 = 0x52;
    }

    /// Attribute handles (low bytes; the high byte is always zero here)
    pub mod handle {
        /// HID service: vendor report characteristic value
        pub const HID_REPORT: u8 = 0x1D;
        /// HID service: client characteristic configuration for notifications
        pub const HID_NOTIFY_CCCD: u8 = 0x24;
        /// HID service: notifying characteristic value
        pub const HID_NOTIFY: u8 = 0x23;
        /// Battery service: writable characteristic the host is allowed to use
        pub const BATTERY_WRITE: u8 = 0x28;
        /// Battery service: client characteristic configuration
        pub const BATTERY_CCCD: u8 = 0x29;
        /// Battery service: power state characteristic value
        pub const BATTERY_POWER_STATE: u8 = 0x2B;
    }
}

/// Full frame length once the HCI/L2CAP headers have been clamped
pub const CLAMPED_FRAME_LEN: usize = 30;
