//! Wires the inventory client, discovery engine, adapter and HTTP server
//! together.

use std::net::SocketAddr;

use metrics::Registry;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tripwire::{Trigger, Tripwire};

use crate::adapter::{Adapter, WriteError};
use crate::config::{Config, ConfigError};
use crate::discovery::Discoverer;
use crate::http::{HttpClient, Telemetry};
use crate::metrics::{DiscoveryMetrics, register_build_info};
use crate::target::Mapper;
use crate::workspaces;

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("initial write failed, {0}")]
    Write(#[from] WriteError),
    #[error("bind {addr} failed, {err}")]
    Bind { addr: SocketAddr, err: std::io::Error },
}

impl StartError {
    pub fn exit_code(&self) -> exitcode::ExitCode {
        match self {
            StartError::Config(_) => exitcode::CONFIG,
            StartError::Write(_) => exitcode::CANTCREAT,
            StartError::Bind { .. } => exitcode::UNAVAILABLE,
        }
    }
}

/// Handle of the running background tasks.
pub struct Running {
    trigger: Trigger,
    local_addr: SocketAddr,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Running {
    /// Address the HTTP server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Cancel every task and wait for them to finish.
    pub async fn stop(self) {
        self.trigger.cancel();

        for (name, task) in self.tasks {
            if let Err(err) = task.await {
                error!(message = "task failed", task = name, %err);
            }
        }

        info!(message = "stopped");
    }
}

/// Run the initial poll, then spawn the engine, the adapter and the HTTP
/// server. `config` must be validated.
pub async fn start(config: &Config) -> Result<Running, StartError> {
    let endpoint = config.endpoint()?;

    info!(
        message = "start workspaces-sd",
        version = crate::get_version(),
        %endpoint,
        region = %config.region,
        profile = config.profile.as_deref().unwrap_or("default"),
        output = ?config.output,
        refresh_interval = config.refresh_interval,
        pages = config.pages,
    );

    let registry = Registry::new();
    register_build_info(&registry);
    let metrics = DiscoveryMetrics::register(&registry);

    let client = workspaces::Client::new(
        HttpClient::new(),
        endpoint,
        config.page_size,
        config.request_timeout(),
    );
    let mut discoverer = Discoverer::new(
        client,
        Mapper::new(config.exporter_port),
        config.refresh_interval(),
        config.pages,
        metrics.clone(),
    );
    let initial = match discoverer.poll().await {
        Ok(groups) => Some(groups),
        Err(err) => {
            metrics.request_failures.inc();
            error!(message = "error fetching targets", %err);

            None
        }
    };
    let adapter = Adapter::new(&config.output).initialize(initial).await?;

    let (trigger, tripwire) = Tripwire::new();
    let (tx, rx) = mpsc::channel(1);
    let mut tasks = vec![
        ("discovery", tokio::spawn(discoverer.run(tripwire.clone(), tx))),
        ("adapter", tokio::spawn(adapter.run(rx))),
    ];

    let listener = TcpListener::bind(config.listen)
        .await
        .map_err(|err| StartError::Bind {
            addr: config.listen,
            err,
        })?;
    let local_addr = listener.local_addr().map_err(|err| StartError::Bind {
        addr: config.listen,
        err,
    })?;
    let telemetry = Telemetry::new(registry, config.telemetry_path.as_str());
    tasks.push((
        "http",
        tokio::spawn(crate::http::serve(listener, telemetry, tripwire)),
    ));

    info!(message = "serving telemetry", %local_addr, path = %config.telemetry_path);

    Ok(Running {
        trigger,
        local_addr,
        tasks,
    })
}
