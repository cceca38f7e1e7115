use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::Parser;
use relay_server::{EchoHandler, Server, ShutdownFlag};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Framed TCP command server.
///
/// Listens for length-prefixed binary frames and answers echo requests.
/// `SIGINT`/`SIGTERM` trigger a graceful shutdown; exit code is 0 after one
/// and non-zero when startup fails.
#[derive(Parser, Debug)]
#[command(name = "relayd", version)]
struct Args {
    /// Port to listen on.
    #[arg(default_value_t = 8080)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RELAY_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let addr = SocketAddr::from((args.bind, args.port));

    let shutdown = match ShutdownFlag::install() {
        Ok(flag) => flag,
        Err(err) => {
            error!(%err, "couldn't install signal handlers");
            std::process::exit(1);
        }
    };

    let mut server = match Server::bind(addr, EchoHandler, shutdown) {
        Ok(server) => server,
        Err(err) => {
            error!(%err, "startup failed");
            std::process::exit(1);
        }
    };

    if let Err(err) = server.run() {
        error!(%err, "event loop failed");
        std::process::exit(1);
    }

    info!("shutdown complete");
}
