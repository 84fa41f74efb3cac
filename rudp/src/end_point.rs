use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::config::EndPointConfig;
use crate::packet::{Packet, MAX_DATAGRAM_LEN};
use crate::receive::ReceiveSession;
use crate::request_handler::RequestHandler;
use crate::send_pipeline::SendPipeline;
use crate::session::SessionRegistry;

/// EndPoint is the place where the parts of the transport come together: it
///  owns the UDP socket, decodes incoming datagrams and dispatches them to
///  per-peer sessions through the registry. The receive loop is the sole
///  producer for every session inbox.
pub struct EndPoint {
    socket: Arc<UdpSocket>,
    send: Arc<SendPipeline>,
    registry: SessionRegistry,
    handler: Arc<dyn RequestHandler>,
    config: Arc<EndPointConfig>,
}

impl EndPoint {
    pub async fn new(
        config: Arc<EndPointConfig>,
        handler: Arc<dyn RequestHandler>,
    ) -> anyhow::Result<EndPoint> {
        config.validate()?;

        let socket = Arc::new(UdpSocket::bind(config.bind_addr()).await?);
        info!("bound datagram endpoint to {:?}", socket.local_addr()?);

        Ok(EndPoint {
            send: Arc::new(SendPipeline::new(Arc::new(socket.clone()), config.write_deadline)),
            registry: SessionRegistry::new(config.inbox_capacity),
            socket,
            handler,
            config,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Runs forever. No error on the datagram path is fatal: malformed
    ///  packets are dropped, read deadline expiry just polls again.
    pub async fn recv_loop(&self) {
        info!("starting receive loop");

        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        loop {
            let (num_read, from) =
                match timeout(self.config.read_deadline, self.socket.recv_from(&mut buf)).await {
                    Err(_) => continue, // read deadline expired: poll again
                    Ok(Err(e)) => {
                        debug!("socket error: {}", e);
                        continue;
                    }
                    Ok(Ok(x)) => x,
                };

            let parse_buf = &mut &buf[..num_read];
            let packet = match Packet::deser(parse_buf) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!("dropping malformed datagram from {:?}: {}", from, e);
                    continue;
                }
            };
            trace!("received {:?} #{} from {:?}", packet.kind(), packet.seq_no, from);

            let key = packet.peer_endpoint();
            let (handle, created_inbox) = self.registry.get_or_create(key);

            if let Some(inbox) = created_inbox {
                debug!("new session for {}", key);
                let session = ReceiveSession::new(
                    key,
                    from,
                    self.send.clone(),
                    self.handler.clone(),
                    handle.done_flag(),
                );
                tokio::spawn(session.run(inbox));
            }

            if handle.is_done() {
                // stale-retransmission teardown; the next datagram from this
                // endpoint recreates the session
                self.registry.remove(&key);
                continue;
            }

            handle.try_enqueue(packet);
        }
    }
}
