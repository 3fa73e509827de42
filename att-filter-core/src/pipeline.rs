//! Per-transfer interception pipeline
//!
//! ```text
//! request ──► outbound pass ──► lower layer ──► inbound pass ──► completion
//!             resolve                           resolve
//!             trace (OUT flag)                  match
//!             match                             mutate bytes
//!             rewrite                           trace (IN flag)
//!                                               clamp declared length
//! ```
//!
//! Each pass takes one flag snapshot up front. Passes hold no state between
//! calls, so any number of them can run at once for different transfers.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::buffer::resolve;
use crate::config::ConfigFlags;
use crate::rewrite::{apply_mutations, rewrite, truncated_length};
use crate::template::{find_match, RewriteTemplate, CATALOGUE};
use crate::trace::{trace_transfer, DumpMode, TraceSink};
use crate::types::{BulkTransfer, Direction, IoRequest, RequestKind, Status, Urb};

/// What a single pass did to a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Not a bulk/interrupt transfer in this pass's direction (or a failed completion)
    Bypassed,
    /// No addressable span; nothing traced or changed
    Unresolved,
    /// Traced if enabled, otherwise untouched
    NoMatch,
    Rewritten {
        template: &'static str,
        /// New declared length, if it was clamped
        truncated_to: Option<usize>,
    },
}

impl PassOutcome {
    pub fn is_rewritten(&self) -> bool {
        matches!(self, Self::Rewritten { .. })
    }
}

/// Runs the outbound and inbound passes
pub struct Pipeline {
    flags: Arc<ConfigFlags>,
    sink: Arc<dyn TraceSink>,
    catalogue: &'static [RewriteTemplate],
}

impl Pipeline {
    pub fn new(flags: Arc<ConfigFlags>, sink: Arc<dyn TraceSink>) -> Self {
        Self {
            flags,
            sink,
            catalogue: &CATALOGUE,
        }
    }

    pub fn flags(&self) -> &Arc<ConfigFlags> {
        &self.flags
    }

    /// Inspect a request on its way down, before it is forwarded
    pub fn outbound(&self, request: &mut IoRequest) -> PassOutcome {
        let id = request.id;
        let Some(transfer) = classify(request, Direction::Out) else {
            return PassOutcome::Bypassed;
        };
        let flags = self.flags.snapshot();
        let declared = transfer.declared_length;

        let mut span = match resolve(&mut transfer.buffer, declared) {
            Ok(span) => span,
            Err(e) => {
                debug!("Request {id}: {e}, forwarding unchanged");
                return PassOutcome::Unresolved;
            }
        };

        trace_transfer(
            self.sink.as_ref(),
            flags,
            Direction::Out,
            &span,
            DumpMode::for_transfer(Direction::Out, declared),
        );

        let Some(template) = find_match(self.catalogue, &span, Direction::Out, declared) else {
            return PassOutcome::NoMatch;
        };

        debug!("Request {id}: outbound {} matched", template.name);
        // Outbound templates never touch the length, but go through the same path
        rewrite(&mut span, &mut transfer.declared_length, template, flags);
        PassOutcome::Rewritten {
            template: template.name,
            truncated_to: None,
        }
    }

    /// Inspect a completed request on its way back up
    ///
    /// `status` is the lower layer's completion status; failed completions are
    /// left alone. The status itself is never changed.
    pub fn inbound(&self, request: &mut IoRequest, status: Status) -> PassOutcome {
        if !status.is_success() {
            trace!("Request {}: completed with {status}, not inspecting", request.id);
            return PassOutcome::Bypassed;
        }
        let id = request.id;
        let Some(transfer) = classify(request, Direction::In) else {
            return PassOutcome::Bypassed;
        };
        let flags = self.flags.snapshot();
        let declared = transfer.declared_length;

        let mut span = match resolve(&mut transfer.buffer, declared) {
            Ok(span) => span,
            Err(e) => {
                debug!("Request {id}: {e}, completing unchanged");
                return PassOutcome::Unresolved;
            }
        };

        let template = find_match(self.catalogue, &span, Direction::In, declared);
        if let Some(template) = template {
            debug!("Request {id}: inbound {} matched", template.name);
            apply_mutations(&mut span, template, flags);
        }

        // Dump before clamping so the full notification is still visible
        trace_transfer(
            self.sink.as_ref(),
            flags,
            Direction::In,
            &span,
            DumpMode::for_transfer(Direction::In, declared),
        );
        drop(span);

        let Some(template) = template else {
            return PassOutcome::NoMatch;
        };
        let truncated_to = truncated_length(template, flags);
        if let Some(len) = truncated_to {
            debug!("Request {id}: clamping declared length {declared} -> {len}");
            transfer.declared_length = len;
        }
        PassOutcome::Rewritten {
            template: template.name,
            truncated_to,
        }
    }
}

/// The bulk/interrupt transfer a pass in `direction` should examine
fn classify(request: &mut IoRequest, direction: Direction) -> Option<&mut BulkTransfer> {
    let id = request.id;
    match &mut request.kind {
        RequestKind::SubmitUrb(Urb::BulkOrInterrupt(transfer)) => {
            trace!(
                "Request {id}: bulk/interrupt, flags 0x{:x}, length {}",
                transfer.transfer_flags,
                transfer.declared_length
            );
            (transfer.direction() == direction).then_some(transfer)
        }
        RequestKind::SubmitUrb(urb) => {
            trace!("Request {id}: URB function {:?}, passing through", urb.function());
            None
        }
        RequestKind::DeviceControl { code } => {
            trace!("Request {id}: device control 0x{code:08X}, passing through");
            None
        }
    }
}
