//! A small reliable-delivery transport on top of UDP, built for serving one
//!  HTTP request/response cycle per peer. It is explicitly *not* a TCP
//!  replacement: there is no congestion control, no sliding-window pacing and
//!  no cryptographic integrity - the protocol trades those for a shape that is
//!  easy to reason about and to test.
//!
//! ## Wire format
//!
//! Every datagram is at most 1024 bytes: a fixed 11-byte header followed by up
//!  to 1013 bytes of payload. All numbers are in network byte order (BE):
//!
//! ```ascii
//! 0:  packet type (u8): 0 DATA, 1 ACK, 2 SYN, 3 SYN-ACK, 4 NAK
//! 1:  sequence number (u32)
//! 5:  peer IPv4 address (4 octets)
//! 9:  peer port (u16)
//! 11: payload (up to 1013 bytes)
//! ```
//!
//! The address and port embedded in the header are always the *peer's* - both
//!  directions of a conversation carry the same endpoint, which is also the
//!  key under which the server tracks the session.
//!
//! DATA packets that carry a chunk of a *response* append one extra trailing
//!  byte holding the total number of response packets, so the receiving side
//!  can size its reassembly without a separate control message.
//!
//! ## Handshake and sequence numbers
//!
//! A conversation starts with an explicit three-way handshake:
//!  * the peer sends SYN whose payload is the decimal ASCII count of DATA
//!    packets it intends to send,
//!  * the server answers SYN-ACK with `seq = SYN.seq + 1`,
//!  * the peer confirms with ACK `seq = 3`, which the server treats as
//!    handshake-only and otherwise ignores.
//!
//! Request DATA packets then use sequence numbers starting at 4. Response DATA
//!  packets are numbered independently, starting at 1.
//!
//! ## Reliability
//!
//! The receiver acknowledges every DATA packet it sees, including
//!  retransmitted copies (acknowledgment is idempotent). A packet arriving
//!  ahead of the expected sequence number opens a gap: every missing number in
//!  the gap is NAK'ed once, asking the peer for a selective retransmit.
//!  Symmetrically, peer NAKs against the emitted response are answered by
//!  re-sending the exact retained bytes of the requested packet.
//!
//! Sessions are single-use: once the response has gone out, a retransmitted
//!  (already acknowledged) request packet marks the session as done, and the
//!  server loop tears it down. Later datagrams from the same endpoint simply
//!  create a fresh session.

pub mod config;
pub mod end_point;
pub mod packet;
pub mod receive;
pub mod request_handler;
pub mod response;
pub mod send_pipeline;
pub mod session;

#[cfg(test)]
mod tests {
    use tracing::Level;

    #[ctor::ctor]
    fn init_test_logging() {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(Level::TRACE)
            .try_init()
            .ok();
    }
}
