//! `ontgate serve`: run the HTTP gateway until Ctrl-C.

use std::path::PathBuf;

use anyhow::{bail, Context};
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

use ontgate::{api, config::ServiceConfig, context::AppContext};

#[derive(Default)]
struct ServeOptions {
    config_path: Option<PathBuf>,
    port: Option<u16>,
}

fn parse_args(args: &[String]) -> anyhow::Result<ServeOptions> {
    let mut options = ServeOptions::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let Some(path) = iter.next() else {
                    bail!("--config needs a path");
                };
                options.config_path = Some(PathBuf::from(path));
            }
            "--port" | "-p" => {
                let Some(port) = iter.next() else {
                    bail!("--port needs a value");
                };
                options.port = Some(port.parse().with_context(|| format!("invalid port {port}"))?);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => bail!("unknown argument {other}"),
        }
    }
    Ok(options)
}

fn print_help() {
    println!("ontgate serve");
    println!();
    println!("USAGE:");
    println!("    ontgate serve [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <PATH>   TOML configuration file (defaults when absent)");
    println!("    -p, --port <PORT>     Listen port (default: 3000)");
    println!("    -h, --help            Print help");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C");
    }
    info!("shutdown requested");
}

#[tokio::main]
pub async fn run(args: Vec<String>) -> anyhow::Result<()> {
    let options = parse_args(&args)?;

    // Initialize logging with EnvFilter to support RUST_LOG
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(env_filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = ServiceConfig::load_or_default(options.config_path.as_deref())
        .context("loading configuration")?;
    if let Some(port) = options.port {
        config.server.port = port;
    }
    let addr = config.bind_addr();
    info!(node = %config.ontology.uri, db = %config.database.path.display(), "starting ontgate v{}", ontgate::VERSION);

    let ctx = AppContext::open(config).context("opening service context")?;
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "gateway listening");

    let served = axum::serve(listener, api::router(ctx.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    ctx.shutdown().await;
    served.context("http server")?;
    Ok(())
}
