mod completion;
mod config;
mod dispatch;
mod fs_ops;
mod log_file;
mod outbox;

use hello_vim_protocol::{Reply, STARTED};
use std::process::ExitCode;
use tokio::io::AsyncBufRead;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::completion::{Completer, CompletionClient};
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::log_file::LogFile;
use crate::outbox::Outbox;

fn main() -> ExitCode {
    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("{err:#}");
            return ExitCode::FAILURE;
        }
    };

    let log_file = match LogFile::open(cfg.log_file.as_deref()) {
        Ok(log_file) => log_file,
        Err(err) => {
            eprintln!("failed to initialize: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&log_file);

    let client = match CompletionClient::new(&cfg) {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "failed to initialize completion client");
            return ExitCode::FAILURE;
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            tracing::error!(error = %err, "failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(model = %client.model(), "starting hello-vim-plugin");
    rt.block_on(async {
        let input = tokio::io::BufReader::new(tokio::io::stdin());
        run(client, input, Outbox::new(tokio::io::stdout())).await
    });
    // A blocked stdin read cannot be interrupted; do not wait for it.
    rt.shutdown_background();
    log_file.close();
    ExitCode::SUCCESS
}

fn init_tracing(log_file: &LogFile) {
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    let file = log_file.is_enabled().then(|| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(log_file.clone())
            .with_filter(EnvFilter::new("info,hello_vim_plugin=debug"))
    });

    tracing_subscriber::registry().with(stderr).with(file).init();
}

/// Announce readiness, then dispatch `input` until it ends or a shutdown
/// signal arrives.
async fn run<C, R>(completer: C, input: R, outbox: Outbox)
where
    C: Completer + 'static,
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let cancel = CancellationToken::new();
    outbox.send_or_log(&Reply::Status(STARTED.into())).await;

    let dispatcher = Dispatcher::new(completer, outbox, cancel.clone());
    let worker = tokio::spawn(async move { dispatcher.run(input).await });

    tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("received shutdown signal");
            cancel.cancel();
        }
        res = worker => {
            match res {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::warn!(error = %format!("{err:#}"), "error reading input"),
                Err(err) => tracing::error!(error = %err, "dispatch task failed"),
            }
            tracing::info!("input stream closed");
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "cannot listen for SIGTERM");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
