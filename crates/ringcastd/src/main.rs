//! ringcastd — ringcast flooding node.

use std::sync::Arc;

use anyhow::{Context, Result};

use ringcast_core::config::RingcastConfig;
use ringcast_core::NodeId;
use ringcast_services::{AuditLog, FileAuditLog, NoopAuditLog, PeerResolver, StaticResolver};

use ringcastd::Node;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = RingcastConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = RingcastConfig::load().context("invalid configuration")?;

    // Optional node id on the command line wins over config and env.
    if let Some(arg) = std::env::args().nth(1) {
        config.node.id = arg
            .parse::<NodeId>()
            .with_context(|| format!("bad node id argument {arg:?}"))?;
    }
    tracing::info!(id = %config.node.id, port = config.node.port, "ringcastd starting");

    // Peers
    let resolver = StaticResolver::from_config(&config);
    if resolver.is_empty() {
        tracing::warn!("no resolvable peers configured, running receive-only");
    }
    let resolver: Arc<dyn PeerResolver> = Arc::new(resolver);

    // Audit log
    let audit: Arc<dyn AuditLog> = if config.audit.enabled {
        match FileAuditLog::spawn(&config.audit.dir) {
            Ok(log) => {
                tracing::info!(dir = %config.audit.dir.display(), "audit log enabled");
                Arc::new(log)
            }
            Err(e) => {
                tracing::warn!(error = %e, dir = %config.audit.dir.display(), "audit log unavailable");
                Arc::new(NoopAuditLog)
            }
        }
    } else {
        Arc::new(NoopAuditLog)
    };

    let node = Node::bind(&config, resolver, audit).await?;
    let mut handle = node.spawn();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        exited = handle.wait_any() => {
            match exited {
                Some(Ok(Ok(()))) => tracing::warn!("node task exited"),
                Some(Ok(Err(e))) => tracing::error!(error = %e, "node task failed"),
                Some(Err(e)) => tracing::error!(error = %e, "node task panicked"),
                None => {}
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
