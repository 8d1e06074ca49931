//! fakenet demo
//!
//! Runs small exchanges over an in-memory network so the emulator can be
//! exercised and observed without any test harness.
//!
//! ```text
//!   dial side                         accept side
//!   ─────────                         ───────────
//!   Network::dial ──── handoff ────▶ Listener::accept
//!        │                                  │
//!        ▼                                  ▼
//!   Connection  ◀════ duplex pipe ════▶ Connection
//! ```

use std::convert::Infallible;
use std::future::poll_fn;
use std::path::PathBuf;
use std::pin::Pin;

use clap::{Parser, Subcommand};
use hyper::body::{Body, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;

use fakenet::config::{load_config, NetConfig};
use fakenet::observability::logging;
use fakenet::{Network, Scope};

type DemoResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "fakenet-demo")]
#[command(about = "Exchange data over an in-memory network", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept side writes "hello world" and closes; dial side reads it back
    Hello {
        /// Read buffer size on the dial side
        #[arg(short, long, default_value_t = 5)]
        buffer: usize,
    },
    /// One HTTP/1.1 request/response through hyper
    Http,
    /// Print the effective configuration
    PrintConfig,
}

#[tokio::main]
async fn main() -> DemoResult<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => NetConfig::default(),
    };
    let level = match cli.verbose {
        0 => config.observability.log_level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    logging::init(level)?;

    tracing::info!(
        network_name = %config.address.network_name,
        port = config.address.port,
        "Configuration loaded"
    );

    match cli.command {
        Commands::Hello { buffer } => {
            let received = hello(Network::with_config(config), buffer.max(1)).await?;
            println!("{}", String::from_utf8_lossy(&received));
        }
        Commands::Http => {
            let body = http_round_trip(Network::with_config(config)).await?;
            println!("{body}");
        }
        Commands::PrintConfig => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

async fn hello(network: Network, buffer: usize) -> DemoResult<Vec<u8>> {
    let scope = Scope::new();
    let listener = network.listen(&scope);
    let addr = listener.addr().to_string();
    tracing::info!(address = %addr, "Listening");

    let server = tokio::spawn(async move {
        let conn = listener.accept().await?;
        conn.write(b"hello world").await?;
        conn.close();
        Ok::<_, fakenet::NetError>(listener)
    });

    let conn = network.dial(&scope, &addr).await?;
    let mut received = Vec::new();
    let mut buf = vec![0u8; buffer];
    loop {
        let outcome = conn.read(&mut buf).await?;
        received.extend_from_slice(&buf[..outcome.n]);
        if outcome.eof {
            break;
        }
    }
    conn.close();

    server.await??.close();
    Ok(received)
}

async fn http_round_trip(network: Network) -> DemoResult<String> {
    let scope = Scope::new();
    let listener = network.listen(&scope);
    let addr = listener.addr().to_string();

    let server = tokio::spawn(async move {
        let conn = listener.accept().await?;
        let service = service_fn(|req: Request<Incoming>| async move {
            tracing::info!(method = %req.method(), path = %req.uri().path(), "Serving request");
            let response = Response::builder()
                .header(hyper::header::CONNECTION, "close")
                .body(format!("hello from {}", req.uri().path()))
                .unwrap_or_else(|_| Response::new(String::new()));
            Ok::<_, Infallible>(response)
        });
        hyper::server::conn::http1::Builder::new()
            .serve_connection(TokioIo::new(conn), service)
            .await?;
        Ok::<_, Box<dyn std::error::Error + Send + Sync>>(listener)
    });

    let conn = network.dial(&scope, &addr).await?;
    let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(conn)).await?;
    let driver = tokio::spawn(connection);

    let request = Request::builder()
        .uri("/greeting")
        .header(hyper::header::HOST, addr.as_str())
        .header(hyper::header::CONNECTION, "close")
        .body(String::new())?;
    let response = sender.send_request(request).await?;
    tracing::info!(status = %response.status(), "Response received");

    let mut body = response.into_body();
    let mut collected = Vec::new();
    while let Some(frame) = poll_fn(|cx| Pin::new(&mut body).poll_frame(cx)).await {
        if let Ok(data) = frame?.into_data() {
            collected.extend_from_slice(&data);
        }
    }

    driver.await??;
    server.await??;
    Ok(String::from_utf8(collected)?)
}
