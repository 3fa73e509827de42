//! Registry of attached filter instances
//!
//! Every attached instance shares one `ConfigFlags` and one pipeline. The
//! control endpoint lives exactly as long as at least one instance does: the
//! first attach starts its worker and the last detach stops it.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{ConfigFlags, FilterSettings, ForwardMode};
use crate::control::{ControlClient, ControlEndpoint};
use crate::forward::{BoxedTarget, FilterDevice};
use crate::pipeline::Pipeline;
use crate::trace::TraceSink;
use crate::types::{CompletedRequest, IoRequest};

struct ControlWorker {
    client: ControlClient,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct RegistryState {
    live: usize,
    next_id: u64,
    control: Option<ControlWorker>,
}

/// Tracks live filter instances and owns the control endpoint's lifetime
pub struct FilterRegistry {
    flags: Arc<ConfigFlags>,
    pipeline: Arc<Pipeline>,
    mode: ForwardMode,
    state: Mutex<RegistryState>,
}

impl FilterRegistry {
    pub fn new(settings: &FilterSettings, sink: Arc<dyn TraceSink>) -> Arc<Self> {
        let flags = Arc::new(ConfigFlags::from_settings(settings));
        let pipeline = Arc::new(Pipeline::new(Arc::clone(&flags), sink));
        Arc::new(Self {
            flags,
            pipeline,
            mode: settings.forward_mode,
            state: Mutex::new(RegistryState::default()),
        })
    }

    /// Attach a filter instance on top of `target`
    ///
    /// Must be called from within a Tokio runtime; the first attach spawns the
    /// control endpoint worker.
    pub fn attach(self: &Arc<Self>, target: BoxedTarget) -> FilterInstance {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.live += 1;

        if state.control.is_none() {
            let (client, handle) = ControlEndpoint::new(Arc::clone(&self.flags)).spawn();
            state.control = Some(ControlWorker { client, handle });
            info!("Control endpoint started");
        }
        info!("Filter instance {id} attached ({} live)", state.live);

        FilterInstance {
            id,
            device: FilterDevice::new(Arc::clone(&self.pipeline), target, self.mode),
            registry: Arc::clone(self),
        }
    }

    /// Client for the control endpoint, if any instance is attached
    pub fn control(&self) -> Option<ControlClient> {
        self.state
            .lock()
            .control
            .as_ref()
            .map(|w| w.client.clone())
    }

    pub fn live_instances(&self) -> usize {
        self.state.lock().live
    }

    pub fn flags(&self) -> &Arc<ConfigFlags> {
        &self.flags
    }

    fn detach(&self, id: u64) {
        let mut state = self.state.lock();
        state.live = state.live.saturating_sub(1);
        info!("Filter instance {id} detached ({} live)", state.live);

        if state.live == 0 {
            if let Some(worker) = state.control.take() {
                // Outstanding client clones keep the channel open, so stop the
                // worker itself; its receiver drops and later sends fail
                worker.handle.abort();
                info!("Control endpoint stopped");
            }
        }
    }
}

/// Handle to one attached filter instance; dropping it detaches
pub struct FilterInstance {
    id: u64,
    device: FilterDevice,
    registry: Arc<FilterRegistry>,
}

impl FilterInstance {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn device(&self) -> &FilterDevice {
        &self.device
    }

    pub async fn dispatch(&self, request: IoRequest) -> CompletedRequest {
        self.device.dispatch(request).await
    }
}

impl Drop for FilterInstance {
    fn drop(&mut self) {
        debug!("Dropping filter instance {}", self.id);
        self.registry.detach(self.id);
    }
}
