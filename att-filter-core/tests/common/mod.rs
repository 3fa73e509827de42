//! Shared fixtures: a recording trace sink and an in-memory lower layer

#![allow(dead_code)]

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use att_filter_core::{
    BulkTransfer, CompletedRequest, Direction, ForwardRejected, IoRequest, LowerTarget, Status,
    TraceError, TraceSink, TransferBuffer,
};

pub const OUT_WRITE: [u8; 12] = [
    0x80, 0x00, 0x08, 0x00, 0x04, 0x00, 0x04, 0x00, 0x52, 0x28, 0x00, 0xAF,
];
pub const OUT_WRITE_REWRITTEN: [u8; 12] = [
    0x80, 0x00, 0x08, 0x00, 0x04, 0x00, 0x04, 0x00, 0x12, 0x1D, 0x00, 0xAF,
];
pub const OUT_CCCD: [u8; 13] = [
    0x80, 0x00, 0x09, 0x00, 0x05, 0x00, 0x04, 0x00, 0x12, 0x29, 0x00, 0x01, 0x00,
];
pub const OUT_CCCD_REWRITTEN: [u8; 13] = [
    0x80, 0x00, 0x09, 0x00, 0x05, 0x00, 0x04, 0x00, 0x12, 0x24, 0x00, 0x01, 0x00,
];
pub const IN_NOTIFY: [u8; 13] = [
    0x80, 0x20, 0x09, 0x00, 0x05, 0x00, 0x04, 0x00, 0x1B, 0x23, 0x00, 0x00, 0x02,
];

/// Inbound notification of `len` bytes with the HID notification prefix
pub fn long_notify(len: usize) -> Vec<u8> {
    let mut bytes: Vec<u8> = (0..len).map(|i| i as u8).collect();
    bytes[..11].copy_from_slice(&IN_NOTIFY[..11]);
    bytes[2] = (len - 4) as u8;
    bytes[4] = (len - 8) as u8;
    bytes
}

pub fn bulk(id: u64, direction: Direction, bytes: &[u8]) -> IoRequest {
    IoRequest::bulk(
        id,
        BulkTransfer::new(direction, TransferBuffer::flat(bytes.to_vec()), bytes.len()),
    )
}

/// Payload bytes (up to the declared length) and declared length of a request
pub fn delivered(request: &IoRequest) -> (Vec<u8>, usize) {
    let t = request.bulk_transfer().expect("bulk transfer");
    let mut bytes = t.buffer.to_vec();
    bytes.truncate(t.declared_length);
    (bytes, t.declared_length)
}

/// Collects every emitted dump line
#[derive(Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn count(&self, direction: Direction) -> usize {
        let prefix = format!("DATA {}:", direction.label());
        self.lines
            .lock()
            .iter()
            .filter(|l| l.starts_with(&prefix))
            .count()
    }
}

impl TraceSink for RecordingSink {
    fn emit(&self, direction: Direction, line: &dyn fmt::Display) -> Result<(), TraceError> {
        self.lines
            .lock()
            .push(format!("DATA {}:{}", direction.label(), line));
        Ok(())
    }
}

/// Sink that always fails
pub struct UnavailableSink;

impl TraceSink for UnavailableSink {
    fn emit(&self, _: Direction, _: &dyn fmt::Display) -> Result<(), TraceError> {
        Err(TraceError::Unavailable)
    }
}

/// In-memory lower layer standing in for the Bluetooth controller
///
/// OUT transfers are recorded as seen on the wire. IN transfers are filled with
/// the next queued response, or completed with `status` if none is queued.
pub struct FakeController {
    responses: Mutex<Vec<Vec<u8>>>,
    wire: Mutex<Vec<Vec<u8>>>,
    status: Status,
    latency: Duration,
    gate: Option<Arc<Notify>>,
}

impl FakeController {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            wire: Mutex::new(Vec::new()),
            status: Status::SUCCESS,
            latency: Duration::ZERO,
            gate: None,
        }
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Hold every completion until the gate is notified
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn queue_response(&self, bytes: &[u8]) {
        self.responses.lock().insert(0, bytes.to_vec());
    }

    /// OUT payloads exactly as they reached the controller
    pub fn wire(&self) -> Vec<Vec<u8>> {
        self.wire.lock().clone()
    }
}

#[async_trait]
impl LowerTarget for FakeController {
    async fn send(&self, mut request: IoRequest) -> Result<CompletedRequest, ForwardRejected> {
        if let Some(t) = request.bulk_transfer_mut() {
            match t.direction() {
                Direction::Out => {
                    let mut bytes = t.buffer.to_vec();
                    bytes.truncate(t.declared_length);
                    self.wire.lock().push(bytes);
                }
                Direction::In => {
                    if let Some(frame) = self.responses.lock().pop() {
                        t.declared_length = frame.len();
                        t.buffer = TransferBuffer::flat(frame);
                    }
                }
            }
        }

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(CompletedRequest {
            request,
            status: self.status,
        })
    }
}

/// Lower layer that refuses everything
pub struct DisconnectedController;

#[async_trait]
impl LowerTarget for DisconnectedController {
    async fn send(&self, request: IoRequest) -> Result<CompletedRequest, ForwardRejected> {
        Err(ForwardRejected {
            request,
            status: Status::DEVICE_NOT_CONNECTED,
        })
    }
}
