//! Relay service - wires the components together and owns their lifecycle.
//!
//! Owns the primary listener, the relay set, the requeue loop and the
//! pending sweeper. Configuration can be re-applied while running.

use crate::domain::config::RelayConfig;
use crate::domain::error::{ErrorClassifier, GatewayError};
use crate::domain::ids::IdAllocator;
use crate::domain::pending::{sweep_task, PendingRequestTable};
use crate::primary::PrimaryConnection;
use crate::relay::{RelaySet, RequeueLoop};
use crate::rpc::RemoteApi;
use crate::status::RelayStatus;
use crate::transport::connector::{RelayConnector, WsConnector};
use crate::transport::listener::{ListenerOptions, PrimaryListener};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A background task with its own stop signal.
struct Background {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Background {
    fn spawn<F, Fut>(task: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop, stop_rx) = watch::channel(false);
        Self {
            stop,
            handle: tokio::spawn(task(stop_rx)),
        }
    }

    async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.handle.await;
    }
}

/// Relay service state
pub struct RelayService {
    config: RelayConfig,
    primary: Arc<PrimaryConnection>,
    relays: Arc<RelaySet>,
    api: RemoteApi,
    listener: Option<PrimaryListener>,
    requeue: Option<Background>,
    sweeper: Option<Background>,
    started_at: DateTime<Utc>,
    stopped: bool,
}

impl RelayService {
    /// Create a service that reaches relays through `connector`.
    pub fn new(config: RelayConfig, connector: Arc<dyn RelayConnector>) -> Result<Self, GatewayError> {
        config.validate()?;

        let ids = Arc::new(IdAllocator::new());
        let pending = Arc::new(PendingRequestTable::new());
        let primary = Arc::new(PrimaryConnection::new(ids, pending, config.timeout()));
        primary.set_classifier(classifier(&config));

        let relays = Arc::new(RelaySet::new(connector, Arc::clone(&primary)));
        let api = RemoteApi::new(Arc::clone(&primary));

        Ok(Self {
            config,
            primary,
            relays,
            api,
            listener: None,
            requeue: None,
            sweeper: None,
            started_at: Utc::now(),
            stopped: false,
        })
    }

    /// Create a service that reaches relays over WebSocket.
    pub fn with_default_connector(config: RelayConfig) -> Result<Self, GatewayError> {
        let connector = Arc::new(WsConnector::new(config.link_buffer));
        Self::new(config, connector)
    }

    /// Bind the listener, start background tasks and connect configured relays.
    ///
    /// Returns the address the listener is bound to.
    pub async fn start(&mut self) -> Result<SocketAddr, GatewayError> {
        if self.stopped {
            return Err(GatewayError::ShuttingDown);
        }
        if self.listener.is_some() {
            return Err(GatewayError::AlreadyStarted);
        }

        info!("Starting relay service...");
        self.started_at = Utc::now();

        let listener = self.bind(self.config.listen_addr()).await?;
        let addr = listener.local_addr();
        self.listener = Some(listener);

        self.sweeper = Some(self.spawn_sweeper());
        self.requeue = Some(self.spawn_requeue());

        let relays = self.config.normalized_relays();
        self.relays.sync_relay_connections(&relays).await;

        info!(
            addr = %addr,
            relays = relays.len(),
            "Relay service started"
        );
        Ok(addr)
    }

    /// Apply a new configuration to a running (or not yet started) service.
    ///
    /// A changed listen address rebinds the listener; the new one is bound
    /// before the old one closes, so a bind failure leaves the service as it
    /// was. The current primary socket and all relay state are kept.
    pub async fn apply_config(&mut self, config: RelayConfig) -> Result<(), GatewayError> {
        if self.stopped {
            return Err(GatewayError::ShuttingDown);
        }
        config.validate()?;

        let running = self.listener.is_some();

        if running && config.listen_addr() != self.config.listen_addr() {
            let replacement = self.bind(config.listen_addr()).await?;
            if let Some(old) = self.listener.replace(replacement) {
                info!(from = %old.local_addr(), to = %config.listen_addr(), "Rebinding primary listener");
                old.shutdown().await;
            }
        }

        if config.timeout_ms != self.config.timeout_ms {
            debug!(timeout_ms = config.timeout_ms, "Updating request timeout");
            self.primary.set_timeout(config.timeout());
        }
        if config.error_phrases != self.config.error_phrases {
            self.primary.set_classifier(classifier(&config));
        }

        let requeue_changed = config.requeue_interval_ms != self.config.requeue_interval_ms;
        let sweep_changed = config.sweep_interval_ms != self.config.sweep_interval_ms;
        self.config = config;

        if running {
            if requeue_changed {
                if let Some(task) = self.requeue.take() {
                    task.stop().await;
                }
                self.requeue = Some(self.spawn_requeue());
            }
            if sweep_changed {
                if let Some(task) = self.sweeper.take() {
                    task.stop().await;
                }
                self.sweeper = Some(self.spawn_sweeper());
            }
            self.relays
                .sync_relay_connections(&self.config.normalized_relays())
                .await;
        }

        info!("Configuration applied");
        Ok(())
    }

    /// Stop everything: listener, primary socket, relay sockets, background
    /// tasks. In-flight requests are rejected.
    pub async fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        info!("Shutting down relay service...");

        if let Some(task) = self.requeue.take() {
            task.stop().await;
        }
        if let Some(task) = self.sweeper.take() {
            task.stop().await;
        }
        if let Some(listener) = self.listener.take() {
            listener.shutdown().await;
        }
        self.primary.close();
        self.relays.close_all();

        info!("Relay service stopped");
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Address of the running listener
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(PrimaryListener::local_addr)
    }

    pub fn api(&self) -> &RemoteApi {
        &self.api
    }

    pub fn primary(&self) -> &Arc<PrimaryConnection> {
        &self.primary
    }

    pub fn relays(&self) -> &Arc<RelaySet> {
        &self.relays
    }

    pub fn status(&self) -> RelayStatus {
        RelayStatus::collect(&self.relays, self.local_addr(), self.started_at)
    }

    async fn bind(&self, addr: SocketAddr) -> Result<PrimaryListener, GatewayError> {
        PrimaryListener::bind(
            addr,
            Arc::clone(&self.relays),
            ListenerOptions::from_config(&self.config),
            self.started_at,
        )
        .await
    }

    fn spawn_requeue(&self) -> Background {
        let requeue = Arc::new(RequeueLoop::new(Arc::clone(&self.relays)));
        let period = self.config.requeue_interval();
        debug!(period_ms = period.as_millis() as u64, "Starting requeue loop");
        let (stop, stop_rx) = watch::channel(false);
        Background {
            stop,
            handle: requeue.spawn(period, stop_rx),
        }
    }

    fn spawn_sweeper(&self) -> Background {
        let pending = Arc::clone(self.primary.pending());
        let period = self.config.sweep_interval();
        Background::spawn(move |stop| sweep_task(pending, period, stop))
    }
}

/// Built-in phrases plus the configured ones.
fn classifier(config: &RelayConfig) -> ErrorClassifier {
    let mut classifier = ErrorClassifier::default();
    classifier.extend(
        config
            .error_phrases
            .iter()
            .map(|(phrase, kind)| (phrase.clone(), *kind)),
    );
    classifier
}
