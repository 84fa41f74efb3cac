use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use clap::Parser;
use tracing::{info, Level};

use httpfs::handlers::FileHandlers;
use httpfs::stream_server::StreamServer;
use rudp::config::EndPointConfig;
use rudp::end_point::EndPoint;

/// HTTP/1.0 file server with a reliable-datagram and a stream transport.
#[derive(Parser)]
struct Args {
    /// verbose logging
    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    /// directory to serve; must exist (defaults to the working directory)
    #[clap(short, long)]
    dir: Option<PathBuf>,

    /// listening port
    #[clap(short, long, default_value = "8080")]
    port: String,

    /// serve over TCP instead of the reliable datagram transport
    #[clap(long, default_value_t = false)]
    tcp: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).try_init().ok();

    let root = match args.dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    if !root.is_dir() {
        bail!("directory {:?} not found", root);
    }

    info!("serving {:?} on port {}", root, args.port);
    let handlers = Arc::new(FileHandlers::new(root));

    if args.tcp {
        let server = StreamServer::bind(&format!("127.0.0.1:{}", args.port)).await?;
        server.run(handlers).await;
    } else {
        let end_point = EndPoint::new(Arc::new(EndPointConfig::new(args.port)), handlers).await?;
        end_point.recv_loop().await;
    }
    Ok(())
}
