use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use convert_relay::metadata::MetadataClient;
use convert_relay::orchestrator::download;
use convert_relay::relay::{self, AppState};
use convert_relay::upstream::{ConversionBackend, RelayClient, UpstreamClient};
use convert_relay::{output, utils};
use convert_relay::{Cli, Commands, Config, ConversionRequest, Orchestrator, PollPolicy, VideoMetadata};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "convert_relay=debug,tower_http=debug"
    } else {
        "convert_relay=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::load().await?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await?;
        }
        Commands::Convert {
            url,
            format,
            quality,
            relay,
            output: output_path,
            report,
        } => {
            let backend: Arc<dyn ConversionBackend> = match relay {
                Some(base_url) => Arc::new(RelayClient::new(
                    &base_url,
                    Duration::from_secs(config.upstream.request_timeout_secs),
                )?),
                None => Arc::new(UpstreamClient::new(&config.upstream)?),
            };

            let request = ConversionRequest::new(url.trim(), format).with_quality(quality);
            request.validate()?;

            let (spinner, observer) = output::state_spinner(cli.quiet)?;
            spinner.set_message("Fetching video info...");
            let video = match MetadataClient::new(&config.upstream)?
                .fetch(&request.source_url)
                .await
            {
                Ok(video) => video,
                Err(e) => {
                    spinner.finish_and_clear();
                    return Err(e.into());
                }
            };

            let orchestrator =
                Orchestrator::new(backend, PollPolicy::from(&config.polling)).with_observer(observer);

            let cancel = CancellationToken::new();
            let on_ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_ctrl_c.cancel();
                }
            });

            let result = orchestrator.run(&request, &cancel).await;
            spinner.finish_and_clear();
            let conversion = result?;

            output::print_to_console(&conversion, &video, &report)?;

            if let Some(path) = output_path {
                let target = resolve_output_path(path, &video, &conversion.download_url, &conversion.job_id, format);
                let client = reqwest::Client::builder()
                    .user_agent(config.upstream.user_agent.as_str())
                    .build()?;
                let bytes =
                    download::download_file(&client, &conversion.download_url, &target, !cli.quiet).await?;
                output::print_download_summary(&target, bytes);
            }
        }
        Commands::Config { show, init } => {
            if init {
                let path = config.save().await?;
                println!("Configuration written to: {}", path.display());
            }
            if show || !init {
                config.display();
            }
        }
    }

    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    let backend = Arc::new(UpstreamClient::new(&config.upstream)?);
    let http = reqwest::Client::builder()
        .user_agent(config.upstream.user_agent.as_str())
        .build()?;

    let app = relay::build_router(AppState::new(backend, http), &config.server);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid relay bind address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Relay listening on http://{}", addr);
    tracing::info!("Forwarding to {}", config.upstream.base_url);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down relay");
        })
        .await
        .context("Relay server failed")?;

    Ok(())
}

/// A directory target gets a file name from the video title, else from the download URL
fn resolve_output_path(
    path: PathBuf,
    video: &VideoMetadata,
    download_url: &str,
    job_id: &str,
    format: convert_relay::OutputFormat,
) -> PathBuf {
    if !path.is_dir() {
        return path;
    }

    let name = video
        .file_name(format)
        .unwrap_or_else(|| utils::download_file_name(download_url, job_id, format));
    path.join(name)
}
