use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use rudp::request_handler::RequestHandler;

use crate::handlers::FileHandlers;

const READ_BUF_LEN: usize = 1024;

/// The conventional stream-transport variant: one TCP connection per
///  request/response cycle, dispatched to the same file handlers as the
///  datagram transport.
pub struct StreamServer {
    listener: TcpListener,
}

impl StreamServer {
    pub async fn bind(bind_addr: &str) -> anyhow::Result<StreamServer> {
        let listener = TcpListener::bind(bind_addr).await?;
        info!("stream server listening on {:?}", listener.local_addr()?);
        Ok(StreamServer { listener })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop; runs forever. Connection errors are logged, never fatal.
    pub async fn run(&self, handlers: Arc<FileHandlers>) {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(x) => x,
                Err(e) => {
                    error!("accept error: {}", e);
                    continue;
                }
            };
            debug!("handling client {}", peer);

            let handlers = handlers.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, handlers).await {
                    warn!("error serving {}: {}", peer, e);
                }
            });
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    handlers: Arc<FileHandlers>,
) -> anyhow::Result<()> {
    let request_data = read_request(&mut stream).await?;
    let response = handlers.handle(&String::from_utf8_lossy(&request_data)).await;
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

/// Reads until a short read - the framing convention for unpipelined HTTP/1.0
///  requests.
async fn read_request(stream: &mut TcpStream) -> anyhow::Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut buf = [0u8; READ_BUF_LEN];

    loop {
        let num_read = stream.read(&mut buf).await?;
        data.extend_from_slice(&buf[..num_read]);
        if num_read < READ_BUF_LEN {
            break;
        }
    }
    Ok(data)
}
