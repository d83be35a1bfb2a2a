use std::io::IsTerminal;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use argh::FromArgs;
use exitcode::ExitCode;

use crate::app;
use crate::config::{Config, Overrides};
use crate::signal::{SignalTo, Signals};
use crate::trace;

fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[derive(FromArgs)]
#[argh(
    description = "Discover Amazon WorkSpaces and write them as Prometheus file based service discovery targets",
    help_triggers("-h", "--help")
)]
pub struct RootCommand {
    #[argh(switch, short = 'v', description = "show version")]
    version: bool,

    #[argh(
        option,
        short = 'l',
        default = "\"info\".to_string()",
        description = "log level, overridden by the WORKSPACES_SD_LOG environment variable"
    )]
    log_level: String,

    #[argh(
        option,
        short = 'c',
        description = "read configuration from a YAML file, flags take precedence"
    )]
    config: Option<PathBuf>,

    #[argh(option, description = "path of the file target groups are written to")]
    output_file: Option<PathBuf>,

    #[argh(option, description = "seconds between two refreshes")]
    refresh: Option<u64>,

    #[argh(option, description = "maximum pages of workspaces fetched per refresh")]
    pages: Option<usize>,

    #[argh(option, description = "workspaces requested per page, between 1 and 25")]
    page_size: Option<u32>,

    #[argh(option, description = "port of the exporter running on every workspace")]
    exporter_port: Option<u16>,

    #[argh(option, description = "credential profile")]
    profile: Option<String>,

    #[argh(option, description = "region of the workspaces")]
    region: Option<String>,

    #[argh(option, description = "workspaces API endpoint, defaults to the regional one")]
    endpoint: Option<String>,

    #[argh(option, description = "seconds a single API request may take")]
    request_timeout: Option<u64>,

    #[argh(option, description = "address the telemetry server listens on")]
    listen_address: Option<SocketAddr>,

    #[argh(option, description = "path under which metrics are exposed")]
    telemetry_path: Option<String>,

    #[argh(
        option,
        short = 't',
        default = "default_worker_threads()",
        description = "specify how many threads the Tokio runtime will use"
    )]
    threads: usize,
}

impl RootCommand {
    #![allow(clippy::print_stdout, clippy::print_stderr)]

    fn show_version(&self) {
        println!("workspaces-sd {}", crate::get_version());
    }

    fn overrides(&self) -> Overrides {
        Overrides {
            output: self.output_file.clone(),
            refresh_interval: self.refresh,
            pages: self.pages,
            page_size: self.page_size,
            exporter_port: self.exporter_port,
            profile: self.profile.clone(),
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            request_timeout: self.request_timeout,
            listen: self.listen_address,
            telemetry_path: self.telemetry_path.clone(),
        }
    }

    fn load_config(&self) -> Result<Config, ExitCode> {
        let base = match &self.config {
            Some(path) => Config::load(path).map_err(|err| {
                error!(message = "configuration error", %err);
                exitcode::CONFIG
            })?,
            None => Config::default(),
        };

        let config = base.merge(self.overrides());
        if let Err(err) = config.validate() {
            error!(message = "configuration error", %err);
            return Err(exitcode::CONFIG);
        }

        Ok(config)
    }

    pub fn run(&self) -> Result<(), ExitCode> {
        if self.version {
            self.show_version();
            return Ok(());
        }

        let levels = std::env::var(trace::LOG_ENV)
            .unwrap_or_else(|_| trace::directives(&self.log_level));
        let color = std::io::stdout().is_terminal();
        if let Err(err) = trace::init(color, &levels) {
            eprintln!("invalid log level {levels:?}, {err}");
            return Err(exitcode::CONFIG);
        }

        let config = self.load_config()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("workspaces-sd-worker")
            .worker_threads(self.threads.max(1))
            .enable_io()
            .enable_time()
            .build()
            .map_err(|err| {
                error!(message = "build runtime failed", %err);
                exitcode::OSERR
            })?;

        runtime.block_on(async move {
            let mut signals = Signals::new().map_err(|err| {
                error!(message = "install signal handlers failed", %err);
                exitcode::OSERR
            })?;

            let running = app::start(&config).await.map_err(|err| {
                error!(message = "start failed", %err);
                err.exit_code()
            })?;

            match signals.recv().await {
                SignalTo::Shutdown => {
                    info!(message = "Shutdown signal received");

                    tokio::select! {
                        _ = running.stop() => {},
                        _ = signals.recv() => {
                            // a second signal skips waiting for in-flight work
                        }
                    }
                }
                SignalTo::Quit => {
                    info!(message = "Quit signal received");

                    drop(running);
                }
            }

            Ok::<(), ExitCode>(())
        })?;

        runtime.shutdown_timeout(Duration::from_secs(5));

        Ok(())
    }
}
