//! Agent supervisor
//!
//! Starts the node, overlay and service launchers, feeds the configured
//! node identity in and shuts everything down again.
//!
//! # Shutdown
//!
//! 1. Launchers are asked to stop, dependents first
//! 2. Each actor gets the grace period to finish
//! 3. Actors still running afterwards are aborted
//!
//! # Examples
//!
//! ```no_run
//! use beacon_engine::agent::{Agent, Backends};
//! use beacon_engine::config::Config;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! let agent = Agent::start(&config, Backends::dry_run())?;
//!
//! let service = agent.wait_ready(config.observe.timeout()).await?;
//! println!("service {} running: {}", service.name, service.running);
//!
//! agent.shutdown(config.launcher.shutdown_grace()).await?;
//! # Ok(())
//! # }
//! ```

use chrono::Utc;
use sdk::errors::EngineError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::actor::ActorHandle;
use crate::config::{Config, NodeConfig};
use crate::launcher::{
    DryRunOverlay, DryRunService, GridInfo, LauncherHandle, NodeInfo, NodeInfoHandle,
    NodeInfoWorker, OverlayLauncher, OverlayNetwork, OverlayStatus, ServiceBackend,
    ServiceLauncher, ServiceState,
};
use crate::observable::{ObservableRef, ObservableStatus};
use crate::observer::observe;

/// Result type for agent operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Backends the launchers delegate to
#[derive(Clone)]
pub struct Backends {
    pub overlay: Arc<dyn OverlayNetwork>,
    pub service: Arc<dyn ServiceBackend>,
}

impl Backends {
    pub fn dry_run() -> Self {
        Self {
            overlay: Arc::new(DryRunOverlay),
            service: Arc::new(DryRunService),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        if config.launcher.dry_run {
            Ok(Self::dry_run())
        } else {
            Err(EngineError::Launcher(
                "no overlay or service backend is built in; set launcher.dry_run = true"
                    .to_string(),
            ))
        }
    }
}

/// Running agent
pub struct Agent {
    node: NodeInfoHandle,
    overlay: LauncherHandle<OverlayStatus>,
    service: LauncherHandle<ServiceState>,
    actors: Vec<ActorHandle<()>>,
}

impl Agent {
    /// Spawn the launchers and publish the configured node identity
    pub fn start(config: &Config, backends: Backends) -> Result<Self> {
        info!(
            "starting agent for {} with {} overlay and {} service backends",
            config.node.name,
            backends.overlay.name(),
            backends.service.name()
        );

        let (node, node_actor) = NodeInfoWorker::spawn();
        let (overlay, overlay_actor) = OverlayLauncher::spawn(backends.overlay, node.observable_ref());
        let (service, service_actor) = ServiceLauncher::spawn(
            backends.service,
            node.observable_ref(),
            overlay.observable_ref(),
        );

        node.update_node(node_info(&config.node))?;

        Ok(Self {
            node,
            overlay,
            service,
            actors: vec![service_actor, overlay_actor, node_actor],
        })
    }

    pub fn node(&self) -> &NodeInfoHandle {
        &self.node
    }

    pub fn node_ref(&self) -> ObservableRef<NodeInfo> {
        self.node.observable_ref()
    }

    pub fn overlay_ref(&self) -> ObservableRef<OverlayStatus> {
        self.overlay.observable_ref()
    }

    pub fn service_ref(&self) -> ObservableRef<ServiceState> {
        self.service.observable_ref()
    }

    /// Wait until the cluster service has been brought up
    pub async fn wait_ready(&self, timeout: Duration) -> Result<Arc<ServiceState>> {
        observe(self.service_ref(), timeout, Ok).await
    }

    /// Status of every observable the agent owns
    pub async fn status(&self) -> Result<Vec<ObservableStatus>> {
        Ok(vec![
            self.node_ref().inspect().await?,
            self.overlay_ref().inspect().await?,
            self.service_ref().inspect().await?,
        ])
    }

    /// Stop every launcher, aborting those that exceed `grace`
    ///
    /// All actors are stopped even if one of them fails; the first failure
    /// is returned.
    pub async fn shutdown(self, grace: Duration) -> Result<()> {
        info!("Starting agent shutdown");

        self.service.stop();
        self.overlay.stop();
        self.node.stop();

        let mut first_error = None;
        for actor in self.actors {
            let name = actor.actor().to_string();
            match actor.join_or_abort(grace).await {
                Ok(()) => info!("{} stopped", name),
                Err(e) => {
                    warn!("{} did not stop cleanly: {}", name, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        info!("Agent shutdown completed");
        first_error.map_or(Ok(()), Err)
    }
}

/// Node identity described by the configuration
pub fn node_info(config: &NodeConfig) -> NodeInfo {
    NodeInfo {
        id: format!("{}/{}", config.grid_name, config.number),
        name: config.name.clone(),
        node_number: config.number,
        overlay_ip: config.overlay_ip,
        grid: GridInfo {
            name: config.grid_name.clone(),
            subnet: config.grid_subnet,
            initial_size: config.initial_size,
        },
        updated_at: Utc::now(),
    }
}
