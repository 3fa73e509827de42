//! Capture replay through the filter pipeline
//!
//! Reads a USBPcap capture (pcap or pcapng) and feeds every bulk/interrupt
//! payload through a filter instance: OUT submits take the outbound pass, IN
//! completions take the inbound pass with the captured status. Transfers the
//! filter rewrote are printed with their bytes before and after.
//!
//! # Example
//!
//! ```ignore
//! use att_filter::replay::{run_replay, OutputFormat};
//!
//! let summary = run_replay(path, &settings, OutputFormat::Text).await?;
//! ```

mod error;
mod report;
mod usb_urb;

pub use error::{CaptureError, LINKTYPE_USBPCAP};
pub use report::{OutputFormat, Printer, ReplaySummary, RewriteRecord};
pub use usb_urb::{
    build_bulk_packet, parse_urb_header, parse_usb_packet, Stage, TransferType, UrbHeader,
    UsbPacket,
};

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use parking_lot::Mutex;
use pcap_parser::pcapng::Block;
use pcap_parser::{create_reader, PcapBlockOwned, PcapError};
use tracing::{debug, info, warn};

use att_filter_core::{
    BulkTransfer, CompletedRequest, Direction, FilterInstance, FilterRegistry, FilterSettings,
    ForwardRejected, IoRequest, LowerTarget, PassOutcome, Status, TracingSink, TransferBuffer,
    UrbFunction,
};

/// Reader buffer size; grows on demand for larger blocks
const READ_BUFFER_SIZE: usize = 65536;

/// One packet from the capture file
#[derive(Debug, Clone)]
pub struct CapturedPacket {
    /// Seconds since the first packet
    pub timestamp: f64,
    pub raw: Vec<u8>,
}

/// What one capture block contributes
enum CaptureItem {
    Packet { micros: u64, raw: Vec<u8> },
    LinkType(i32),
    Other,
}

/// Read every packet block from a pcap or pcapng file
///
/// Fails if any interface in the capture is not USBPcap.
pub fn read_capture(path: &Path) -> anyhow::Result<Vec<CapturedPacket>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open capture {}", path.display()))?;
    let mut reader = create_reader(READ_BUFFER_SIZE, file)
        .map_err(|e| CaptureError::UnrecognizedFormat(format!("{:?}", e)))
        .with_context(|| format!("Cannot replay {}", path.display()))?;

    let mut packets = Vec::new();
    let mut base_micros: Option<u64> = None;
    let mut last_incomplete_index = None;

    loop {
        match reader.next() {
            Ok((offset, block)) => {
                // Copy out what we need before consume() invalidates the block
                let item = match &block {
                    PcapBlockOwned::LegacyHeader(header) => CaptureItem::LinkType(header.network.0),
                    PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                        CaptureItem::LinkType(idb.linktype.0)
                    }
                    PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => CaptureItem::Packet {
                        micros: ((epb.ts_high as u64) << 32) | epb.ts_low as u64,
                        raw: epb.data.to_vec(),
                    },
                    PcapBlockOwned::Legacy(lp) => CaptureItem::Packet {
                        micros: lp.ts_sec as u64 * 1_000_000 + lp.ts_usec as u64,
                        raw: lp.data.to_vec(),
                    },
                    _ => CaptureItem::Other,
                };
                reader.consume(offset);

                match item {
                    CaptureItem::LinkType(linktype) if linktype != LINKTYPE_USBPCAP => {
                        return Err(CaptureError::UnsupportedLinkType(linktype))
                            .with_context(|| format!("Cannot replay {}", path.display()));
                    }
                    CaptureItem::Packet { micros, raw } => {
                        let base = *base_micros.get_or_insert(micros);
                        packets.push(CapturedPacket {
                            timestamp: micros.saturating_sub(base) as f64 / 1_000_000.0,
                            raw,
                        });
                    }
                    CaptureItem::LinkType(_) | CaptureItem::Other => {}
                }
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                if last_incomplete_index == Some(packets.len()) {
                    warn!("Could not read complete data block (file may be truncated)");
                    break;
                }
                last_incomplete_index = Some(packets.len());
                reader
                    .refill()
                    .map_err(|e| CaptureError::Parse(format!("refill: {:?}", e)))?;
            }
            Err(e) => return Err(CaptureError::Parse(format!("{:?}", e)).into()),
        }
    }

    debug!("Read {} packets from {}", packets.len(), path.display());
    Ok(packets)
}

struct StagedCompletion {
    payload: Vec<u8>,
    status: Status,
}

/// Lower layer that answers each request with what the capture recorded
#[derive(Default)]
struct CaptureController {
    staged: Mutex<Option<StagedCompletion>>,
}

impl CaptureController {
    fn stage(&self, payload: Vec<u8>, status: Status) {
        *self.staged.lock() = Some(StagedCompletion { payload, status });
    }
}

#[async_trait]
impl LowerTarget for CaptureController {
    async fn send(&self, mut request: IoRequest) -> Result<CompletedRequest, ForwardRejected> {
        let staged = self.staged.lock().take();
        let Some(StagedCompletion { payload, status }) = staged else {
            return Ok(CompletedRequest {
                request,
                status: Status::SUCCESS,
            });
        };
        if let Some(transfer) = request.bulk_transfer_mut() {
            transfer.declared_length = payload.len();
            transfer.buffer = TransferBuffer::flat(payload);
        }
        Ok(CompletedRequest { request, status })
    }
}

/// Drives captured packets through one attached filter instance
pub struct Replayer {
    // Keeps the registry, and with it the control endpoint, alive
    _registry: Arc<FilterRegistry>,
    instance: FilterInstance,
    controller: Arc<CaptureController>,
    printer: Printer,
    summary: ReplaySummary,
}

impl Replayer {
    /// Attach a filter instance and establish `settings` over the control channel
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn new(settings: &FilterSettings, format: OutputFormat) -> anyhow::Result<Self> {
        let startup = FilterSettings {
            forward_mode: settings.forward_mode,
            ..FilterSettings::default()
        };
        let registry = FilterRegistry::new(&startup, Arc::new(TracingSink));
        let controller = Arc::new(CaptureController::default());
        let instance = registry.attach(controller.clone());

        let control = registry
            .control()
            .ok_or_else(|| anyhow!("Control endpoint did not start"))?;
        control
            .apply(settings)
            .await
            .context("Failed to apply filter settings")?;
        info!(
            "Filter settings: fix_headers={} trace_inbound={} trace_outbound={} forward_mode={:?}",
            settings.fix_headers,
            settings.trace_inbound,
            settings.trace_outbound,
            settings.forward_mode
        );

        Ok(Self {
            _registry: registry,
            instance,
            controller,
            printer: Printer::new(format),
            summary: ReplaySummary::default(),
        })
    }

    pub fn summary(&self) -> &ReplaySummary {
        &self.summary
    }

    /// Run one captured packet through the filter
    ///
    /// Returns the rewrite record if the filter changed the transfer.
    pub async fn process_packet(&mut self, packet: &CapturedPacket) -> Option<RewriteRecord> {
        let index = self.summary.packets;
        self.summary.packets += 1;

        let Some(usb) = parse_usb_packet(&packet.raw) else {
            self.summary.parse_failed += 1;
            return None;
        };
        let urb = &usb.urb;
        if !urb.transfer_type.is_bulk_or_interrupt()
            || urb.function != UrbFunction::BulkOrInterruptTransfer
            || usb.data.is_empty()
        {
            self.summary.skipped += 1;
            return None;
        }

        let direction = urb.direction();
        let (request, outcome_direction) = match (direction, urb.stage) {
            (Direction::Out, Stage::Submit) => {
                let len = usb.data.len();
                let transfer =
                    BulkTransfer::new(Direction::Out, TransferBuffer::flat(usb.data.clone()), len);
                self.summary.outbound += 1;
                (IoRequest::bulk(urb.irp_id, transfer), Direction::Out)
            }
            (Direction::In, Stage::Completion) => {
                self.controller
                    .stage(usb.data.clone(), urb.completion_status());
                let transfer = BulkTransfer::new(Direction::In, TransferBuffer::empty(), 0);
                self.summary.inbound += 1;
                (IoRequest::bulk(urb.irp_id, transfer), Direction::In)
            }
            _ => {
                self.summary.skipped += 1;
                return None;
            }
        };

        let dispatched = self.instance.device().dispatch_traced(request).await;
        let outcome = match outcome_direction {
            Direction::Out => dispatched.outbound,
            Direction::In => dispatched.inbound.unwrap_or(PassOutcome::Bypassed),
        };
        self.summary.record(&outcome);

        let PassOutcome::Rewritten { template, .. } = outcome else {
            return None;
        };
        let after = dispatched
            .completed
            .request
            .bulk_transfer()
            .map(|t| {
                let mut bytes = t.buffer.to_vec();
                bytes.truncate(t.declared_length);
                bytes
            })
            .unwrap_or_default();

        let record = RewriteRecord::new(
            index,
            packet.timestamp,
            urb.irp_id,
            urb.endpoint,
            direction,
            template,
            &usb.data,
            &after,
        );
        self.printer.print_rewrite(&record);
        Some(record)
    }

    /// Finish the replay and print the summary
    pub fn finish(self) -> ReplaySummary {
        self.printer.print_summary(&self.summary);
        self.summary
    }
}

/// CLI entry point for capture replay
pub async fn run_replay(
    path: &Path,
    settings: &FilterSettings,
    format: OutputFormat,
) -> anyhow::Result<ReplaySummary> {
    let packets = read_capture(path)?;
    let mut replayer = Replayer::new(settings, format).await?;
    for packet in &packets {
        replayer.process_packet(packet).await;
    }
    Ok(replayer.finish())
}
