//! Startup orchestration.
//!
//! # Design Decisions
//! - Fail fast: an unreachable shared store at startup is fatal
//! - Subsystems initialize in order: store, activity worker, gate state
//! - Listeners start last (traffic only when ready), in `main`

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::Shutdown;
use crate::activity::{ActivityLogger, ActivitySink};
use crate::auth::PrincipalStore;
use crate::config::GateConfig;
use crate::http::GateState;
use crate::store::{self, StoreError};

/// A started gate and the background tasks that must be joined on shutdown.
pub struct Gate {
    pub state: GateState,
    pub activity_worker: JoinHandle<u64>,
    pub janitor: Option<JoinHandle<()>>,
}

/// Connect the store, start the activity worker and assemble the gate state.
pub async fn start(
    config: &GateConfig,
    principals: Arc<dyn PrincipalStore>,
    sink: Arc<dyn ActivitySink>,
    shutdown: &Shutdown,
) -> Result<Gate, StoreError> {
    let connected = store::connect(&config.store, shutdown.subscribe()).await?;
    let (activity, activity_worker) =
        ActivityLogger::spawn(sink, config.activity.channel_capacity, shutdown.subscribe());

    let state = GateState::new(config, connected.store, principals, activity);
    tracing::info!(
        store = state.store.backend(),
        rate_limit_enabled = config.rate_limit.enabled,
        api_keys = config.auth.api_keys.len(),
        "Gate initialized"
    );

    Ok(Gate {
        state,
        activity_worker,
        janitor: connected.janitor,
    })
}

impl Gate {
    /// Wait for the background tasks after shutdown has been triggered.
    pub async fn join(self) {
        if let Some(janitor) = self.janitor {
            let _ = janitor.await;
        }
        // Drop our logger handle so the worker can finish even without a signal.
        drop(self.state);
        match self.activity_worker.await {
            Ok(written) => tracing::info!(written, "Activity log drained"),
            Err(e) => tracing::warn!(error = %e, "Activity worker failed"),
        }
    }
}
