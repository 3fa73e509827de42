//! Byte templates and the matcher that selects one for a transfer
//!
//! A template is a transfer length rule plus a sparse set of expected bytes at
//! fixed offsets. The catalogue below is the complete contract with the remote:
//!
//! ```text
//! Dir  Length  Match                                  Rewrite
//! OUT  12      80 00 08 00 04 00 04 00 52 28 00 AF    [8]=12 [9]=1D
//! OUT  13      80 00 09 00 05 00 04 00 12 29 00 01 00 [9]=24
//! IN   <=24    80 20 __ 00 __ 00 04 00 1B 23 00       [9]=2B
//! IN   >30     80 20 __ 00 __ 00 04 00 1B 23 00       [9]=2B, fix: [2]=1A [4]=16 len=30
//! ```

use crate::protocol::{att, hci, l2cap, CLAMPED_FRAME_LEN};
use crate::types::Direction;

/// Which declared transfer lengths a template accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthRule {
    Exact(usize),
    AtMost(usize),
    MoreThan(usize),
}

impl LengthRule {
    pub fn accepts(&self, len: usize) -> bool {
        match *self {
            Self::Exact(n) => len == n,
            Self::AtMost(n) => len <= n,
            Self::MoreThan(n) => len > n,
        }
    }
}

/// Single byte overwrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mutation {
    pub offset: usize,
    pub value: u8,
    /// Only applied while the header fix flag is on
    pub needs_fix_headers: bool,
}

impl Mutation {
    const fn always(offset: usize, value: u8) -> Self {
        Self {
            offset,
            value,
            needs_fix_headers: false,
        }
    }

    const fn header_fix(offset: usize, value: u8) -> Self {
        Self {
            offset,
            value,
            needs_fix_headers: true,
        }
    }
}

/// One entry of the catalogue
#[derive(Debug, PartialEq, Eq)]
pub struct RewriteTemplate {
    pub name: &'static str,
    pub direction: Direction,
    pub length: LengthRule,
    /// Expected byte per offset from the start of the span; `None` is "don't care"
    pub pattern: &'static [Option<u8>],
    /// Applied in order
    pub mutations: &'static [Mutation],
    /// New declared length once the payload is rewritten
    pub truncate_length_to: Option<usize>,
    /// The truncation only happens while the header fix flag is on
    pub gated_by_fix_headers: bool,
}

impl RewriteTemplate {
    /// Every constraint must hold; one differing byte disqualifies the template
    pub fn matches(&self, span: &[u8], direction: Direction, declared_length: usize) -> bool {
        if self.direction != direction || !self.length.accepts(declared_length) {
            return false;
        }
        // The span may be shorter than declared if the buffer is short
        if span.len() < self.pattern.len() {
            return false;
        }
        self.pattern
            .iter()
            .zip(span)
            .all(|(expected, actual)| expected.map_or(true, |b| b == *actual))
    }
}

const ACL_HOST: [Option<u8>; 2] = [Some(hci::CONNECTION_HANDLE_LO), Some(hci::FLAGS_HOST)];

/// ATT Write Command on the battery service's writable handle
const BATTERY_WRITE_COMMAND: [Option<u8>; 12] = [
    ACL_HOST[0],
    ACL_HOST[1],
    Some(0x08), // ACL length
    Some(0x00),
    Some(0x04), // L2CAP length
    Some(0x00),
    Some(l2cap::CID_ATT),
    Some(0x00),
    Some(att::opcode::WRITE_COMMAND),
    Some(att::handle::BATTERY_WRITE),
    Some(0x00),
    Some(0xAF), // magic value the remote expects on its HID report
];

/// ATT Write Request enabling notifications on the battery service
const BATTERY_CCCD_ENABLE: [Option<u8>; 13] = [
    ACL_HOST[0],
    ACL_HOST[1],
    Some(0x09),
    Some(0x00),
    Some(0x05),
    Some(0x00),
    Some(l2cap::CID_ATT),
    Some(0x00),
    Some(att::opcode::WRITE_REQUEST),
    Some(att::handle::BATTERY_CCCD),
    Some(0x00),
    Some(0x01),
    Some(0x00),
];

/// Handle Value Notification from the HID service (lengths vary)
const HID_NOTIFICATION: [Option<u8>; 11] = [
    Some(hci::CONNECTION_HANDLE_LO),
    Some(hci::FLAGS_CONTROLLER),
    None,
    Some(0x00),
    None,
    Some(0x00),
    Some(l2cap::CID_ATT),
    Some(0x00),
    Some(att::opcode::HANDLE_VALUE_NOTIFICATION),
    Some(att::handle::HID_NOTIFY),
    Some(0x00),
];

const REDIRECT_NOTIFY: Mutation =
    Mutation::always(att::HANDLE_OFFSET, att::handle::BATTERY_POWER_STATE);

/// The fixed catalogue, evaluated in order
pub static CATALOGUE: [RewriteTemplate; 4] = [
    RewriteTemplate {
        name: "battery-write-to-hid-report",
        direction: Direction::Out,
        length: LengthRule::Exact(12),
        pattern: &BATTERY_WRITE_COMMAND,
        mutations: &[
            Mutation::always(att::OPCODE_OFFSET, att::opcode::WRITE_REQUEST),
            Mutation::always(att::HANDLE_OFFSET, att::handle::HID_REPORT),
        ],
        truncate_length_to: None,
        gated_by_fix_headers: false,
    },
    RewriteTemplate {
        name: "battery-cccd-to-hid-cccd",
        direction: Direction::Out,
        length: LengthRule::Exact(13),
        pattern: &BATTERY_CCCD_ENABLE,
        mutations: &[Mutation::always(
            att::HANDLE_OFFSET,
            att::handle::HID_NOTIFY_CCCD,
        )],
        truncate_length_to: None,
        gated_by_fix_headers: false,
    },
    RewriteTemplate {
        name: "hid-notify-to-battery",
        direction: Direction::In,
        length: LengthRule::AtMost(24),
        pattern: &HID_NOTIFICATION,
        mutations: &[REDIRECT_NOTIFY],
        truncate_length_to: None,
        gated_by_fix_headers: false,
    },
    RewriteTemplate {
        name: "long-hid-notify-to-battery",
        direction: Direction::In,
        length: LengthRule::MoreThan(CLAMPED_FRAME_LEN),
        pattern: &HID_NOTIFICATION,
        mutations: &[
            Mutation::header_fix(hci::ACL_LENGTH_OFFSET, hci::MAX_ACL_PAYLOAD),
            Mutation::header_fix(l2cap::LENGTH_OFFSET, l2cap::MAX_ATT_PAYLOAD),
            REDIRECT_NOTIFY,
        ],
        truncate_length_to: Some(CLAMPED_FRAME_LEN),
        gated_by_fix_headers: true,
    },
];

/// First template in `catalogue` that fully matches the span
pub fn find_match<'c>(
    catalogue: &'c [RewriteTemplate],
    span: &[u8],
    direction: Direction,
    declared_length: usize,
) -> Option<&'c RewriteTemplate> {
    catalogue
        .iter()
        .find(|t| t.matches(span, direction, declared_length))
}
