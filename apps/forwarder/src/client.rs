//! Public handle for running a tunnel
//!
//! [`TunnelClient`] validates the configuration, performs the first connect
//! synchronously (failing fast on any error) and then hands the live
//! connection to a background driver that serves requests and reconnects.

use hooktunnel_common::{Result, TunnelError, TunnelSession, generate_client_instance_id};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::activity::ActivityLog;
use crate::config::Config;
use crate::connection::{ConnectionManager, ConnectionState, TunnelExit, shutdown_requested};
use crate::forwarder::LocalForwarder;

/// Tunnel agent: one logical tunnel, one physical connection at a time
pub struct TunnelClient {
    manager: Arc<ConnectionManager>,
    activity: ActivityLog,
    shutdown: watch::Sender<bool>,
    exit: Arc<watch::Sender<Option<TunnelExit>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl TunnelClient {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let activity = ActivityLog::new();
        let forwarder =
            LocalForwarder::new(config.local_base_url(), config.request_timeout, activity.clone())?;
        let client_instance_id = generate_client_instance_id();
        debug!("Client instance: {}", client_instance_id);

        let manager = ConnectionManager::new(config, client_instance_id, forwarder);
        let (shutdown, _) = watch::channel(false);
        let (exit, _) = watch::channel(None);

        Ok(Self {
            manager: Arc::new(manager),
            activity,
            shutdown,
            exit: Arc::new(exit),
            driver: Mutex::new(None),
        })
    }

    /// Connect to the gateway and complete the handshake.
    ///
    /// Only valid from [`ConnectionState::Disconnected`]. Any failure of this
    /// first attempt is returned directly without entering the reconnect loop.
    pub async fn connect(&self) -> Result<TunnelSession> {
        let mut driver = self.driver.lock().await;
        self.manager.begin_connect()?;

        self.shutdown.send_replace(false);
        self.exit.send_replace(None);
        let mut shutdown_rx = self.shutdown.subscribe();

        info!("Connecting to {}", self.manager.config().tunnel_url);
        let result = tokio::select! {
            result = self.manager.establish_connection() => result,
            _ = shutdown_requested(&mut shutdown_rx) => Err(TunnelError::ConnectionError(
                "connect cancelled by disconnect".to_string(),
            )),
        };

        let (ws_stream, session) = match result {
            Ok(established) => established,
            Err(e) => {
                self.manager.on_connect_failed();
                return Err(e);
            }
        };

        info!("Tunnel established (session {}...)", session.short_id());
        self.manager.on_established(session.clone());

        let manager = Arc::clone(&self.manager);
        let exit = Arc::clone(&self.exit);
        *driver = Some(tokio::spawn(async move {
            let reason = manager.run(ws_stream, shutdown_rx).await;
            debug!("Connection driver finished: {:?}", reason);
            exit.send_replace(Some(reason));
        }));

        Ok(session)
    }

    /// Close the tunnel with a normal close and stop reconnecting.
    ///
    /// Cancels a pending reconnect timer or an in-flight connect. Calling it
    /// while already disconnected is a no-op.
    pub async fn disconnect(&self) {
        // Signal first so an in-flight connect holding the lock gives up
        self.shutdown.send_replace(true);

        let handle = {
            let mut driver = self.driver.lock().await;
            self.shutdown.send_replace(true);
            driver.take()
        };

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                debug!("Connection driver ended abnormally: {}", e);
            }
        }

        self.manager.on_connect_failed();
    }

    /// Wait until the tunnel stops for good and report why
    pub async fn wait_for_exit(&self) -> TunnelExit {
        let mut exit_rx = self.exit.subscribe();
        match exit_rx.wait_for(Option::is_some).await {
            Ok(exit) => exit.clone().unwrap_or(TunnelExit::Disconnected),
            Err(_) => TunnelExit::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Observe every state transition
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.manager.subscribe()
    }

    /// Current session, present only while connected
    pub fn session(&self) -> Option<TunnelSession> {
        self.manager.session()
    }

    pub fn session_id(&self) -> Option<String> {
        self.session().map(|session| session.session_id)
    }

    /// Identity presented in every hello, stable across reconnects
    pub fn client_instance_id(&self) -> &str {
        self.manager.client_instance_id()
    }

    pub fn activity_log(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn config(&self) -> &Config {
        self.manager.config()
    }
}
