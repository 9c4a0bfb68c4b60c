use std::net::SocketAddr;
use std::process;

use clap::{Parser, ValueEnum};
use tokio::io::{self, Error, ErrorKind};
use tokio::net::lookup_host;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use client::link::{LinkReader, LinkWriter};
use client::{tcp_link, udp_link, Client, ClientError, SessionEnd};

const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Transport {
    Tcp,
    Udp,
}

impl Transport {
    fn label(self) -> &'static str {
        match self {
            Transport::Tcp => "TCP",
            Transport::Udp => "UDP",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "duochat-client")]
#[command(about = "Join a duochat chatroom over TCP or UDP", long_about = None)]
struct Args {
    /// Transport the server is running
    #[arg(short, long, value_enum, default_value = "tcp")]
    transport: Transport,

    /// Display name, must be unique in the chatroom
    #[arg(short, long)]
    name: String,

    /// Server host name or address
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = 5000)]
    port: u16,
}

#[tokio::main]
async fn main() {
    fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL)))
        .init();

    let args = Args::parse();

    let code = match start(&args).await {
        Ok(end) => {
            info!(?end, "session over");
            0
        }
        Err(ClientError::Rejected(reply)) => {
            println!("{}", reply);
            1
        }
        Err(e) => {
            error!(error = %e, "client exited with error");
            eprintln!("{}", e);
            1
        }
    };

    // stdin is read on a blocking thread that cannot be cancelled, exit
    // directly instead of waiting on the runtime to wind down
    process::exit(code);
}

async fn start(args: &Args) -> Result<SessionEnd, ClientError> {
    let addr = resolve(&args.host, args.port).await?;
    info!("Client starting, connecting to server {:?}", &addr);

    match args.transport {
        Transport::Tcp => {
            let (r, w) = tcp_link::connect(addr).await?;
            chat(&args.name, args.transport, r, w).await
        }
        Transport::Udp => {
            let (r, w) = udp_link::connect(addr).await?;
            chat(&args.name, args.transport, r, w).await
        }
    }
}

async fn chat<R, W>(name: &str, transport: Transport, reader: R, writer: W) -> Result<SessionEnd, ClientError>
where
    R: LinkReader + 'static,
    W: LinkWriter,
{
    let client = Client::join(name, reader, writer).await?;

    println!("Connected to the {} chatroom.", transport.label());
    println!("Type 'exit' to leave.");

    client.run(io::stdin(), io::stdout(), interrupted()).await
}

// Resolves on ctrl-c, never if the handler cannot be installed
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("unable to listen for ctrl-c {}", e);
        std::future::pending::<()>().await;
    }
}

async fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("no address found for {}", host)))
}
