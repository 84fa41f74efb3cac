use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{trace, warn};

/// Abstraction for sending a datagram, introduced to facilitate mocking the
///  I/O part away for testing.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SendSocket: Send + Sync + 'static {
    /// Returns true if the datagram was handed to the socket.
    async fn do_send_packet(&self, to: SocketAddr, packet_buf: &[u8]) -> bool;
}

#[async_trait]
impl SendSocket for Arc<UdpSocket> {
    async fn do_send_packet(&self, to: SocketAddr, packet_buf: &[u8]) -> bool {
        trace!("UDP socket: sending packet to {:?}", to);

        match self.send_to(packet_buf, to).await {
            Ok(_) => true,
            Err(e) => {
                warn!("error sending UDP packet to {:?}: {}", to, e);
                false
            }
        }
    }
}

/// All outbound sends of a session go through this pipeline, which applies the
///  per-attempt write deadline. Deadline expiry is logged and reported to the
///  caller, never fatal.
pub struct SendPipeline {
    socket: Arc<dyn SendSocket>,
    write_deadline: Duration,
}

impl SendPipeline {
    pub fn new(socket: Arc<dyn SendSocket>, write_deadline: Duration) -> SendPipeline {
        SendPipeline {
            socket,
            write_deadline,
        }
    }

    pub async fn send_raw(&self, to: SocketAddr, packet_buf: &[u8]) -> bool {
        match timeout(self.write_deadline, self.socket.do_send_packet(to, packet_buf)).await {
            Ok(sent) => sent,
            Err(_) => {
                warn!(
                    "write deadline of {:?} expired sending to {:?}",
                    self.write_deadline, to
                );
                false
            }
        }
    }
}
