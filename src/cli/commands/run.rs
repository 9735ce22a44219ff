//! `ci-agent run`: wire the adapters and process jobs until interrupted.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::domain::models::Config;
use crate::domain::ports::{ClusterApi, ControlPlane};
use crate::infrastructure::cluster::{self, KubeCluster};
use crate::infrastructure::http::HttpControlPlane;
use crate::services::event_broadcaster::EventBroadcaster;
use crate::services::job_puller::JobPuller;
use crate::services::kube_events::KubeEventPublisher;
use crate::services::observers::default_observers;
use crate::services::reconciler::ResourceReconciler;
use crate::services::registration::register_agent_best_effort;

/// Capacity of the queue between label watchers and the publisher.
const WATCH_QUEUE_CAPACITY: usize = 256;

/// Wire the agent together and poll for jobs until SIGINT or SIGTERM.
pub async fn execute(config: Config) -> Result<()> {
    let client = cluster::connect(&config.cluster).await?;
    let cluster_api: Arc<dyn ClusterApi> = Arc::new(KubeCluster::new(client.clone()));
    let control_plane: Arc<dyn ControlPlane> = Arc::new(
        HttpControlPlane::new(&config.control_plane, &config.agent)
            .context("Failed to create control plane client")?,
    );

    let events = Arc::new(EventBroadcaster::new(default_observers(
        &control_plane,
        &config.agent.name,
    )));
    let reconciler = Arc::new(ResourceReconciler::new(
        cluster_api,
        Arc::clone(&events),
        config.reconcile.clone(),
    ));
    let puller = JobPuller::new(
        Arc::clone(&control_plane),
        reconciler,
        events,
        &config.puller,
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    {
        let control_plane = Arc::clone(&control_plane);
        let agent = config.agent.clone();
        tokio::spawn(async move {
            register_agent_best_effort(control_plane.as_ref(), &agent).await;
        });
    }

    let mut background = Vec::new();
    if config.kube_events.enabled {
        let (tx, rx) = mpsc::channel(WATCH_QUEUE_CAPACITY);
        background.extend(cluster::spawn_label_watchers(&client, &tx, &shutdown_tx));
        drop(tx);
        let publisher = KubeEventPublisher::new(Arc::clone(&control_plane), &config.agent.name);
        background.push(tokio::spawn(publisher.run(rx)));
        info!("kube event publishing enabled");
    }

    info!(
        agent = %config.agent.name,
        control_plane = %config.control_plane.base_url,
        pull_size = config.puller.pull_size,
        "agent started"
    );

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = signal_tx.send(());
    });

    puller.run(shutdown_tx.subscribe()).await;

    for handle in background {
        if let Err(e) = handle.await {
            warn!(error = %e, "background task ended abnormally");
        }
    }
    info!(in_flight = puller.in_flight(), "agent stopped");
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown signal received");
}
