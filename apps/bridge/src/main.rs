//! Mesos to Consul service registration bridge.

#![forbid(unsafe_code)]

mod bridge_config;

use std::sync::Arc;

use mesosync_application::{
    ClusterDetector, ClusterView, ReconciliationService, STARTUP_LEADER_TIMEOUT, StatePoller,
};
use mesosync_core::{AppError, AppResult};
use mesosync_infrastructure::{
    ConsulServiceRegistry, HttpMasterStateClient, ZookeeperCoordinationClient,
};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::bridge_config::{BridgeConfig, init_tracing};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let result = match BridgeConfig::load() {
        Ok(config) => run(config).await,
        Err(error) => Err(error),
    };
    if let Err(error) = result.as_ref() {
        error!(error = %error, "mesosync-bridge stopped");
    }

    result
}

async fn run(config: BridgeConfig) -> AppResult<()> {
    let coordination = Arc::new(ZookeeperCoordinationClient::new(config.zookeeper.clone()));
    let detector = ClusterDetector::new(coordination, config.zookeeper.path());
    let (view, detector_task) = detector.start(STARTUP_LEADER_TIMEOUT).await?;

    let http_client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;
    let poller = StatePoller::new(
        view.clone(),
        Arc::new(HttpMasterStateClient::new(http_client)),
    );
    let registry = Arc::new(ConsulServiceRegistry::new(
        config.registry.clone(),
        config.http_timeout,
    )?);
    let reconciliation = ReconciliationService::new(registry, config.policy.clone())
        .with_miss_threshold(config.miss_threshold);

    preload_cache(&view, &reconciliation).await;

    info!(
        zookeeper = %config.zookeeper.connect_string(),
        path = %config.zookeeper.path(),
        refresh_interval_seconds = config.refresh_interval.as_secs(),
        miss_threshold = config.miss_threshold,
        service_id_prefix = %config.policy.service_id_prefix(),
        "mesosync-bridge started"
    );

    let mut ticker = tokio::time::interval(config.refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if detector_task.is_finished() {
            return Err(AppError::Internal(
                "cluster detector stopped unexpectedly".to_owned(),
            ));
        }

        run_cycle(&view, &poller, &reconciliation).await;
    }
}

async fn preload_cache(view: &ClusterView, reconciliation: &ReconciliationService) {
    let Some(leader) = view.current_leader() else {
        warn!("no leader to pre-load the service cache from");
        return;
    };

    if let Err(error) = reconciliation.load_cache(leader.host()).await {
        warn!(
            leader = %leader,
            error = %error,
            "failed to pre-load service cache, starting empty"
        );
    }
}

async fn run_cycle(view: &ClusterView, poller: &StatePoller, reconciliation: &ReconciliationService) {
    let snapshot = match poller.poll().await {
        Ok(snapshot) => snapshot,
        Err(error) => {
            report_abandoned_cycle(&error);
            return;
        }
    };

    match reconciliation
        .reconcile(&snapshot, &view.current_members())
        .await
    {
        Ok(report) => info!(
            leader = %snapshot.leader(),
            registered = report.registered,
            reregistered = report.reregistered,
            unchanged = report.unchanged,
            skipped = report.skipped,
            deregistered = report.deregistered,
            deregister_failures = report.deregister_failures,
            "refresh cycle completed"
        ),
        Err(error) => report_abandoned_cycle(&error),
    }
}

fn report_abandoned_cycle(error: &AppError) {
    if error.is_cycle_scoped() {
        warn!(error = %error, "refresh cycle abandoned, retrying on next tick");
    } else {
        error!(error = %error, "refresh cycle failed unexpectedly, retrying on next tick");
    }
}
