//! Core daemon orchestration.

use peercache_discovery::{Engine, Registration, ResolvedService, ServiceAdvert};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::DaemonError;

/// Events processed by the daemon's main loop.
#[derive(Debug)]
pub enum DaemonEvent {
    /// Browse a service type and reply with what resolved.
    Browse {
        service_type: String,
        reply: oneshot::Sender<Result<Vec<ResolvedService>, DaemonError>>,
    },
    /// Stop answering, drop our records and return from [`Daemon::run`].
    Shutdown,
}

/// Where the daemon is in its lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DaemonStatus {
    #[default]
    Idle,
    /// Probing the host and instance names.
    Registering,
    Advertising(Registration),
    /// Registration failed; carries the error text.
    Failed(String),
    Stopped,
}

/// The peercache node daemon.
pub struct Daemon {
    node_id: Uuid,
    advert: ServiceAdvert,
    engine: Engine,
    event_tx: mpsc::Sender<DaemonEvent>,
    event_rx: mpsc::Receiver<DaemonEvent>,
    status_tx: watch::Sender<DaemonStatus>,
}

impl Daemon {
    /// A daemon that opens the real multicast socket when run.
    pub fn new(config: &Config, node_id: Uuid) -> Self {
        Self::with_engine(config, node_id, Engine::new(config.discovery.clone()))
    }

    /// Use a prepared engine. If it is already started, `run` keeps its
    /// socket instead of opening one.
    pub fn with_engine(config: &Config, node_id: Uuid, engine: Engine) -> Self {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (status_tx, _) = watch::channel(DaemonStatus::Idle);
        Self {
            node_id,
            advert: config.node.advert(node_id),
            engine,
            event_tx,
            event_rx,
            status_tx,
        }
    }

    pub fn advert(&self) -> &ServiceAdvert {
        &self.advert
    }

    pub fn node_id(&self) -> Uuid {
        self.node_id
    }

    /// Get a clone of the event sender for feeding events into the daemon.
    pub fn event_sender(&self) -> mpsc::Sender<DaemonEvent> {
        self.event_tx.clone()
    }

    pub fn status_receiver(&self) -> watch::Receiver<DaemonStatus> {
        self.status_tx.subscribe()
    }

    fn set_status(&self, status: DaemonStatus) {
        self.status_tx.send_replace(status);
    }

    /// Register, then serve events until [`DaemonEvent::Shutdown`].
    pub async fn run(&mut self) -> Result<(), DaemonError> {
        if !self.engine.is_running() {
            self.engine.start()?;
        }

        self.set_status(DaemonStatus::Registering);
        info!(
            node_id = %self.node_id,
            instance = %self.advert.instance,
            host = %self.advert.host,
            "registering"
        );
        let registration = match self.engine.register(&self.advert).await {
            Ok(registration) => registration,
            Err(e) => {
                warn!(error = %e, "registration failed");
                self.set_status(DaemonStatus::Failed(e.to_string()));
                self.engine.stop();
                return Err(e.into());
            }
        };
        info!(
            service = %registration.service_name,
            service_type = %registration.service_type,
            port = registration.port,
            "daemon advertising"
        );
        self.set_status(DaemonStatus::Advertising(registration));

        while let Some(event) = self.event_rx.recv().await {
            match event {
                DaemonEvent::Browse {
                    service_type,
                    reply,
                } => {
                    let result = self
                        .engine
                        .browse_service_instances(&service_type)
                        .await
                        .map_err(DaemonError::from);
                    if reply.send(result).is_err() {
                        warn!(%service_type, "browse requester went away");
                    }
                }
                DaemonEvent::Shutdown => {
                    info!("shutting down");
                    break;
                }
            }
        }

        self.engine.stop();
        self.set_status(DaemonStatus::Stopped);
        Ok(())
    }
}
