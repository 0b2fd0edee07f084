//! Agent bring-up and lifecycle.

use anyhow::Result;
use cns_nmagent::{HttpNmAgentClient, NmAgentClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::conflist::FileConflistGenerator;
use crate::dnc::HttpDncClient;
use crate::http_server;
use crate::netplugin::CniNetPlugin;
use crate::reconciler::{HostVersionReconciler, SnapshotEmitter};
use crate::service::{RestService, ServiceDeps, ServiceOptions};
use crate::snat::IptablesSnat;
use crate::store::JsonFileStore;

/// Run the agent until a shutdown signal arrives.
pub async fn run(config: Config) -> Result<()> {
    let nmagent: Arc<dyn NmAgentClient> =
        Arc::new(HttpNmAgentClient::new(config.nmagent.client_config())?);
    let deps = ServiceDeps {
        store: Arc::new(JsonFileStore::new(config.store.state_path.clone())?),
        endpoint_store: Arc::new(JsonFileStore::new(config.store.endpoint_state_path.clone())?),
        nmagent,
        dnc: Arc::new(HttpDncClient::new(config.connect_timeout(), config.response_timeout())?),
        net_plugin: Arc::new(CniNetPlugin::new(
            config.net_plugin_path.clone(),
            config.net_plugin_config_file.clone(),
        )),
        snat: Arc::new(IptablesSnat::new()),
    };

    let options = ServiceOptions::from_config(&config);
    info!(
        node_id = %options.node_id,
        channel_mode = %options.channel_mode,
        manage_endpoint_state = options.manage_endpoint_state,
        program_snat_iptables = options.program_snat_iptables,
        "Creating CNS service"
    );
    let service = Arc::new(RestService::new(options, deps)?);

    let addr: SocketAddr = config
        .server
        .listen_address
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    tasks.push(tokio::spawn(service.home_az_monitor().run(cancel.clone())));

    let mut reconciler =
        HostVersionReconciler::new(service.clone(), config.reconcilers.host_version_interval());
    if config.conflist.enabled {
        info!(path = %config.conflist.path.display(), "CNI conflist generation enabled");
        reconciler = reconciler.with_conflist(Arc::new(FileConflistGenerator::new(&config.conflist)));
    }
    tasks.push(tokio::spawn(reconciler.run(cancel.clone())));

    tasks.push(tokio::spawn(
        SnapshotEmitter::new(service.clone(), config.reconcilers.snapshot_interval()).run(cancel.clone()),
    ));

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        shutdown.cancel();
    });

    let result = http_server::run_http_server(addr, service, cancel.clone()).await;

    cancel.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
