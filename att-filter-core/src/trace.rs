//! Hex dumps of transfer payloads to a diagnostic channel
//!
//! Dumps are rendered through `Display` adapters, so nothing is formatted
//! unless the sink actually writes the line. Sink failures are dropped here and
//! never reach the data path.

use std::fmt;

use tracing::info;

use crate::config::FlagSnapshot;
use crate::error::TraceError;
use crate::types::Direction;

/// Bytes per line in a full dump
pub const BYTES_PER_LINE: usize = 16;

/// Most bytes rendered by a single-line dump before the ellipsis
pub const SINGLE_LINE_MAX: usize = 140;

/// How a payload is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpMode {
    /// One line per 16 bytes
    Full,
    /// One line, capped at 140 bytes
    SingleLine,
}

impl DumpMode {
    /// Rendering used for a transfer of this direction and declared length
    ///
    /// Notification-sized inbound frames (short HID reports and the long
    /// voice frames) go on one line so a log viewer shows one frame per row.
    pub fn for_transfer(direction: Direction, declared_length: usize) -> Self {
        match direction {
            Direction::Out => Self::Full,
            Direction::In if declared_length <= 24 || declared_length > 30 => Self::SingleLine,
            Direction::In => Self::Full,
        }
    }
}

/// Space-prefixed lowercase hex: ` 80 20 09`
pub struct HexBytes<'a>(pub &'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, " {:02x}", b)?;
        }
        Ok(())
    }
}

/// Like `HexBytes`, but stops after `SINGLE_LINE_MAX` bytes and appends ` ...`
pub struct CappedHexBytes<'a>(pub &'a [u8]);

impl fmt::Display for CappedHexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() <= SINGLE_LINE_MAX {
            return HexBytes(self.0).fmt(f);
        }
        HexBytes(&self.0[..SINGLE_LINE_MAX]).fmt(f)?;
        f.write_str(" ...")
    }
}

/// Destination for data dumps
pub trait TraceSink: Send + Sync {
    /// Emit one rendered line of hex for a transfer in `direction`
    fn emit(&self, direction: Direction, line: &dyn fmt::Display) -> Result<(), TraceError>;
}

/// Default sink: `tracing` events on target `att_filter::data`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn emit(&self, direction: Direction, line: &dyn fmt::Display) -> Result<(), TraceError> {
        info!(target: "att_filter::data", "DATA {}:{}", direction.label(), line);
        Ok(())
    }
}

/// Render `bytes` to `sink` in the given mode
pub fn dump(sink: &dyn TraceSink, direction: Direction, bytes: &[u8], mode: DumpMode) {
    match mode {
        DumpMode::Full => {
            for chunk in bytes.chunks(BYTES_PER_LINE) {
                if sink.emit(direction, &HexBytes(chunk)).is_err() {
                    return;
                }
            }
        }
        DumpMode::SingleLine => {
            let _ = sink.emit(direction, &CappedHexBytes(bytes));
        }
    }
}

/// Dump `bytes` if the flag for `direction` is set in `flags`
pub fn trace_transfer(
    sink: &dyn TraceSink,
    flags: FlagSnapshot,
    direction: Direction,
    bytes: &[u8],
    mode: DumpMode,
) {
    if flags.traces(direction) {
        dump(sink, direction, bytes, mode);
    }
}
