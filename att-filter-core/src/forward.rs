//! Forwarding requests to the lower layer
//!
//! ```text
//!      [upper layer]
//!            |  dispatch()
//!      [FilterDevice]       ← outbound pass, then inbound pass on completion
//!            |  LowerTarget::send()
//!      [lower layer]
//! ```
//!
//! With `ForwardMode::WithCompletion` the filter regains the request once the
//! lower layer completes it, runs the inbound pass, then hands it upward. The
//! completion status is never altered, and a rejected send is reported upward
//! with the lower layer's status and never retried.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::ForwardMode;
use crate::error::FilterError;
use crate::pipeline::{PassOutcome, Pipeline};
use crate::types::{CompletedRequest, IoRequest, Status};

/// The lower layer refused to accept a request
#[derive(Debug)]
pub struct ForwardRejected {
    pub request: IoRequest,
    pub status: Status,
}

/// The next layer down the stack
#[async_trait]
pub trait LowerTarget: Send + Sync {
    /// Hand a request down
    ///
    /// Resolves once with the same request when the lower layer completes it,
    /// or fails immediately if the request could not be accepted at all.
    async fn send(&self, request: IoRequest) -> Result<CompletedRequest, ForwardRejected>;
}

/// Type alias for a shared lower target
pub type BoxedTarget = Arc<dyn LowerTarget>;

/// Result of dispatching one request through the filter
#[derive(Debug)]
pub struct Dispatched {
    pub completed: CompletedRequest,
    pub outbound: PassOutcome,
    /// `None` if no inbound pass ran (send-and-forget, or the send was rejected)
    pub inbound: Option<PassOutcome>,
}

/// One attached filter instance sitting on top of a lower target
pub struct FilterDevice {
    pipeline: Arc<Pipeline>,
    target: BoxedTarget,
    mode: ForwardMode,
}

impl FilterDevice {
    pub fn new(pipeline: Arc<Pipeline>, target: BoxedTarget, mode: ForwardMode) -> Self {
        Self {
            pipeline,
            target,
            mode,
        }
    }

    /// Run a request through the filter and return it as completed upward
    pub async fn dispatch(&self, request: IoRequest) -> CompletedRequest {
        self.dispatch_traced(request).await.completed
    }

    /// Like `dispatch`, but also reports what each pass did
    pub async fn dispatch_traced(&self, mut request: IoRequest) -> Dispatched {
        let outbound = self.pipeline.outbound(&mut request);

        let completed = match self.forward(request).await {
            Ok(completed) => completed,
            Err(completed) => {
                return Dispatched {
                    completed,
                    outbound,
                    inbound: None,
                }
            }
        };

        match self.mode {
            ForwardMode::SendAndForget => Dispatched {
                completed,
                outbound,
                inbound: None,
            },
            ForwardMode::WithCompletion => {
                let CompletedRequest {
                    mut request,
                    status,
                } = completed;
                let inbound = self.pipeline.inbound(&mut request, status);
                Dispatched {
                    completed: CompletedRequest { request, status },
                    outbound,
                    inbound: Some(inbound),
                }
            }
        }
    }

    /// Send down; a rejection comes back as a completion with the lower status
    async fn forward(&self, request: IoRequest) -> Result<CompletedRequest, CompletedRequest> {
        let id = request.id;
        match self.target.send(request).await {
            Ok(completed) => {
                debug!("Request {id}: lower layer completed with {}", completed.status);
                Ok(completed)
            }
            Err(ForwardRejected { request, status }) => {
                warn!("Request {id}: {}", FilterError::ForwardFailure(status));
                Err(CompletedRequest { request, status })
            }
        }
    }
}
