// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use chainboot_server::config::{Config, CONFIG_ENV};
use chainboot_server::server;
use clap::Parser;
use dropshot::{ConfigDropshot, HandlerTaskMode, ServerBuilder};
use slog::{info, o, Logger};
use tokio::signal::unix::{signal, SignalKind};

/// Threads to spawn for the tokio runtime handling the API (dropshot, etc)
const API_RT_THREADS: usize = 4;

fn parse_log_level(s: &str) -> anyhow::Result<slog::Level> {
    s.parse().map_err(|_| anyhow::anyhow!("Invalid log level"))
}

#[derive(Debug, Parser)]
#[clap(about, version)]
/// An HTTP server orchestrating iPXE boots
enum Args {
    /// Runs the chainboot server.
    Run {
        /// Path to the server configuration file; defaults to the path
        /// named by CHAINBOOT_CONFIG.
        #[clap(long)]
        config: Option<PathBuf>,

        /// Logging level for the server
        #[clap(long, default_value_t = slog::Level::Info, value_parser = parse_log_level)]
        log_level: slog::Level,
    },
}

fn build_logger(level: slog::Level) -> slog::Logger {
    use slog::Drain;

    let main_drain = if atty::is(atty::Stream::Stdout) {
        let decorator = slog_term::TermDecorator::new().build();
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        slog_async::Async::new(drain)
            .overflow_strategy(slog_async::OverflowStrategy::Block)
            .build_no_guard()
    } else {
        let drain =
            slog_bunyan::with_name("chainboot-server", std::io::stdout())
                .build()
                .fuse();
        slog_async::Async::new(drain)
            .overflow_strategy(slog_async::OverflowStrategy::Block)
            .build_no_guard()
    };

    let filtered_main = slog::LevelFilter::new(main_drain, level);

    slog::Logger::root(filtered_main.fuse(), slog::o!())
}

fn run_server(config: Config, log: Logger) -> anyhow::Result<()> {
    // Spawn the runtime for handling API processing
    let api_runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(API_RT_THREADS)
        .thread_name("tokio-rt-api")
        .enable_all()
        .build()?;

    api_runtime.block_on(serve(config, log))
}

async fn serve(config: Config, log: Logger) -> anyhow::Result<()> {
    let context = server::ApiContext::new(&config, &log);

    let api_server = ServerBuilder::new(
        server::api(),
        context,
        log.new(o!("server" => "api")),
    )
    .config(ConfigDropshot {
        bind_address: config.api_server.bind_address,
        default_handler_task_mode: HandlerTaskMode::CancelOnDisconnect,
        ..Default::default()
    })
    .start()
    .map_err(|e| anyhow!("failed to start API server: {}", e))?;

    let probes_server = ServerBuilder::new(
        server::probes_api(),
        (),
        log.new(o!("server" => "probes")),
    )
    .config(ConfigDropshot {
        bind_address: config.probes_server.bind_address,
        default_handler_task_mode: HandlerTaskMode::CancelOnDisconnect,
        ..Default::default()
    })
    .start()
    .map_err(|e| anyhow!("failed to start probes server: {}", e))?;

    info!(log, "listening";
          "api" => %api_server.local_addr(),
          "probes" => %probes_server.local_addr());

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigterm.recv() => {
            info!(log, "SIGTERM received; draining requests");
        }
        _ = tokio::signal::ctrl_c() => {
            info!(log, "interrupt received; draining requests");
        }
    }

    probes_server
        .close()
        .await
        .map_err(|e| anyhow!("stopping probes server: {}", e))?;
    api_server
        .close()
        .await
        .map_err(|e| anyhow!("stopping API server: {}", e))?;

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args {
        Args::Run { config, log_level } => {
            let config_path = match config {
                Some(path) => path,
                None => std::env::var(CONFIG_ENV)
                    .map(PathBuf::from)
                    .with_context(|| {
                        format!(
                            "either --config or the {CONFIG_ENV} \
                             environment variable must name a config file"
                        )
                    })?,
            };
            let config = Config::from_file(&config_path)?;
            let log = build_logger(log_level);

            run_server(config, log)
        }
    }
}
