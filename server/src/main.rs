use std::net::SocketAddr;

use clap::{Parser, ValueEnum};
use tokio::io::{self, Error, ErrorKind};
use tokio::net::lookup_host;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use server::{TcpServer, UdpServer};

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Transport {
    Tcp,
    Udp,
}

#[derive(Parser, Debug)]
#[command(name = "duochat-server")]
#[command(about = "Chat relay server over TCP or UDP", long_about = None)]
struct Args {
    /// Transport to serve the chatroom over
    #[arg(short, long, value_enum, default_value = "tcp")]
    transport: Transport,

    /// Host name or address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind to
    #[arg(short, long, default_value_t = 5000)]
    port: u16,
}

#[tokio::main]
async fn main() -> io::Result<()> {
    fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL)))
        .init();

    let args = Args::parse();
    let addr = resolve(&args.host, args.port).await?;

    info!("Server starting.. {:?} over {:?}", &addr, args.transport);

    let result = match args.transport {
        Transport::Tcp => TcpServer::bind(addr).await?.run_until_ctrl_c().await,
        Transport::Udp => UdpServer::bind(addr).await?.run_until_ctrl_c().await,
    };

    if let Err(e) = &result {
        error!(error = %e, "server exited with error");
    }
    result
}

async fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("no address found for {}", host)))
}
