//! Host NC version reconciler.
//!
//! Polls the host agent for the versions it has programmed and advances
//! the host version of every lagging NC. IPs gated on a version become
//! Available in the same transaction. Once every NC is at parity the CNI
//! conflist is written, once per process.

use cns_nmagent::NmAgentError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::conflist::ConflistGenerator;
use crate::registry::RegistryError;
use crate::service::RestService;
use crate::state::parse_version;
use crate::store::StoreError;

const RECONCILER_NAME: &str = "host_version";

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Failed to list host NC versions: {0}")]
    NmAgent(#[from] NmAgentError),

    #[error("Network containers not yet programmed on host: {0:?}")]
    Outdated(Vec<String>),

    #[error("Failed to persist host versions: {0}")]
    Store(#[from] StoreError),
}

impl RestService {
    /// One reconciliation pass. Returns how many NCs advanced.
    pub async fn reconcile_host_versions(&self) -> Result<usize, ReconcileError> {
        let outdated = self.state.read().await.outdated_ncs();
        if outdated.is_empty() {
            return Ok(0);
        }

        // No lock held while the host agent answers.
        let list = self.nmagent.nc_version_list().await?;

        let mut state = self.state.write().await;
        let mut advanced = 0;
        for (nc_id, version, host_version) in &outdated {
            let reported = match list.version_of(nc_id) {
                Some(v) if !v.trim().is_empty() => v,
                _ => {
                    debug!(nc_id = %nc_id, version, "Host does not report network container yet");
                    continue;
                }
            };
            let reported = match parse_version(reported) {
                Ok(v) => v,
                Err(e) => {
                    warn!(nc_id = %nc_id, reported, error = %e, "Host reported an invalid version");
                    continue;
                }
            };

            match state.advance_host_version(nc_id, reported) {
                Ok(true) => advanced += 1,
                Ok(false) => {}
                Err(RegistryError::HostVersionRegression { .. }) => {}
                Err(e) => debug!(nc_id = %nc_id, host_version, error = %e, "Skipping network container"),
            }
        }

        if advanced > 0 {
            self.persist(&state)?;
        }

        let remaining: Vec<String> = state.outdated_ncs().into_iter().map(|(id, _, _)| id).collect();
        if remaining.is_empty() {
            Ok(advanced)
        } else {
            Err(ReconcileError::Outdated(remaining))
        }
    }

    pub(crate) async fn has_network_containers(&self) -> bool {
        !self.state.read().await.containers.is_empty()
    }
}

/// Periodic driver of [`RestService::reconcile_host_versions`].
pub struct HostVersionReconciler {
    service: Arc<RestService>,
    interval: Duration,
    conflist: Option<Arc<dyn ConflistGenerator>>,
    conflist_written: Arc<AtomicBool>,
}

impl HostVersionReconciler {
    pub fn new(service: Arc<RestService>, interval: Duration) -> Self {
        Self {
            service,
            interval,
            conflist: None,
            conflist_written: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Write the conflist through `generator` on first parity.
    pub fn with_conflist(mut self, generator: Arc<dyn ConflistGenerator>) -> Self {
        self.conflist = Some(generator);
        self
    }

    /// Run one pass and record its outcome.
    pub async fn run_once(&self) -> Result<usize, ReconcileError> {
        let start = Instant::now();
        let result = self.service.reconcile_host_versions().await;
        self.service
            .metrics
            .observe_reconciler(RECONCILER_NAME, result.is_ok(), start.elapsed());

        match &result {
            Ok(advanced) => {
                if *advanced > 0 {
                    info!(advanced, "Host versions reconciled");
                }
                if self.service.has_network_containers().await {
                    self.generate_conflist_once();
                }
            }
            Err(ReconcileError::Outdated(ids)) => debug!(outdated = ?ids, "Host is still behind"),
            Err(e) => warn!(error = %e, "Host version reconciliation failed"),
        }
        result
    }

    /// Spawn the conflist write unless it already ran. A failed or
    /// panicking write is retried on the next pass at parity.
    fn generate_conflist_once(&self) {
        let Some(generator) = self.conflist.clone() else {
            return;
        };
        if self.conflist_written.swap(true, Ordering::SeqCst) {
            return;
        }

        let written = self.conflist_written.clone();
        tokio::spawn(async move {
            match tokio::task::spawn_blocking(move || generator.generate()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "Failed to write CNI conflist");
                    written.store(false, Ordering::SeqCst);
                }
                Err(e) => {
                    error!(error = %e, "CNI conflist writer panicked");
                    written.store(false, Ordering::SeqCst);
                }
            }
        });
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "Starting host version reconciler");
        let mut timer = interval(self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Host version reconciler stopped");
                    return;
                }
                _ = timer.tick() => {
                    let _ = self.run_once().await;
                }
            }
        }
    }
}
