use std::collections::BTreeMap;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;

use bytes::Bytes;
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::packet::{Packet, PacketType, FIRST_DATA_SEQ_NO, HANDSHAKE_ACK_SEQ_NO};
use crate::request_handler::RequestHandler;
use crate::response::{assemble_request, chunk_response};
use crate::send_pipeline::SendPipeline;
use crate::session::DoneFlag;

/// Per-peer receive state machine, sole consumer of the session inbox. It
///  drives the handshake, acknowledges and reassembles request DATA packets,
///  and once the request is complete emits the chunked response and answers
///  peer NAKs against it.
///
/// A session handles exactly one request/response cycle. Once the response has
///  gone out, a retransmitted request packet marks the session as done so the
///  server loop can tear it down.
pub struct ReceiveSession {
    /// the endpoint embedded in the packet headers - the session key
    peer_endpoint: SocketAddrV4,
    /// the wire address replies are sent to, as observed by the server loop
    reply_to_addr: SocketAddr,
    send: Arc<SendPipeline>,
    handler: Arc<dyn RequestHandler>,
    done: DoneFlag,

    /// the next request sequence number expected in order
    expected_seq_no: u32,
    /// sequence numbers for which an ACK has been emitted
    acked: FxHashSet<u32>,
    /// sequence numbers for which a NAK has been emitted, awaiting retransmission
    naked: FxHashSet<u32>,
    /// sparse reassembly buffer for request chunks, keyed by sequence number
    reassembly: BTreeMap<u32, Bytes>,
    /// learned from the SYN payload; zero marks a corrupt handshake
    total_request_packets: Option<u32>,
    /// encoded response datagrams, retained for retransmission (index = seq - 1)
    response_packets: Vec<Bytes>,
    response_emitted: bool,
    /// response sequence numbers the peer has NAK'd and not yet acknowledged
    pending_nak_retransmit: Vec<u32>,
}

impl ReceiveSession {
    pub fn new(
        peer_endpoint: SocketAddrV4,
        reply_to_addr: SocketAddr,
        send: Arc<SendPipeline>,
        handler: Arc<dyn RequestHandler>,
        done: DoneFlag,
    ) -> ReceiveSession {
        ReceiveSession {
            peer_endpoint,
            reply_to_addr,
            send,
            handler,
            done,
            expected_seq_no: FIRST_DATA_SEQ_NO,
            acked: FxHashSet::default(),
            naked: FxHashSet::default(),
            reassembly: BTreeMap::default(),
            total_request_packets: None,
            response_packets: Vec::new(),
            response_emitted: false,
            pending_nak_retransmit: Vec::new(),
        }
    }

    /// Runs until the inbox closes.
    pub async fn run(mut self, mut inbox: mpsc::Receiver<Packet>) {
        while let Some(packet) = inbox.recv().await {
            self.on_packet(packet).await;
        }
        debug!("inbox closed - session for {} terminating", self.peer_endpoint);
    }

    async fn on_packet(&mut self, packet: Packet) {
        match packet.kind() {
            Some(PacketType::Syn) => self.on_syn(&packet).await,
            Some(PacketType::Ack) => self.on_ack(&packet).await,
            Some(PacketType::Nak) => self.on_nak(&packet).await,
            Some(PacketType::Data) => self.on_data(packet).await,
            Some(PacketType::SynAck) => {
                debug!("ignoring SYN-ACK from peer {}", self.peer_endpoint);
            }
            None => {
                debug!(
                    "ignoring packet with unknown type {} from {}",
                    packet.packet_type, self.peer_endpoint
                );
            }
        }
    }

    async fn on_syn(&mut self, packet: &Packet) {
        let total_request_packets = match std::str::from_utf8(&packet.payload)
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
        {
            Some(n) => n,
            None => {
                warn!(
                    "corrupt SYN payload from {} - the request can never complete",
                    self.peer_endpoint
                );
                0
            }
        };
        self.total_request_packets = Some(total_request_packets);
        debug!(
            "handshake: peer {} announces {} request packets",
            self.peer_endpoint, total_request_packets
        );

        let syn_ack = self.packet_to_peer(PacketType::SynAck, packet.seq_no + 1);
        let buf = syn_ack.to_bytes();
        while !self.send.send_raw(self.reply_to_addr, &buf).await {
            warn!("retrying SYN-ACK to {}", self.peer_endpoint);
        }
    }

    async fn on_ack(&mut self, packet: &Packet) {
        if packet.seq_no == HANDSHAKE_ACK_SEQ_NO {
            trace!("handshake ACK from {}", self.peer_endpoint);
            return;
        }

        // the peer acknowledges a response packet: it needs no more retransmits
        self.pending_nak_retransmit.retain(|&seq_no| seq_no != packet.seq_no);
        self.retransmit_pending().await;
    }

    async fn on_nak(&mut self, packet: &Packet) {
        debug!("peer {} NAK'd response packet #{}", self.peer_endpoint, packet.seq_no);
        self.pending_nak_retransmit.push(packet.seq_no);
        self.retransmit_pending().await;
    }

    async fn on_data(&mut self, packet: Packet) {
        let received_seq_no = packet.seq_no;

        if self.acked.contains(&received_seq_no) {
            // retransmitted copy: acknowledge idempotently, change no state
            trace!(
                "retransmitted DATA #{} from {}",
                received_seq_no, self.peer_endpoint
            );
            self.send_ack(received_seq_no).await;

            if self.response_emitted {
                debug!(
                    "stale retransmission after the response went out - marking session {} done",
                    self.peer_endpoint
                );
                self.done.mark_done();
            }
            return;
        }

        self.send_ack(received_seq_no).await;
        self.acked.insert(received_seq_no);
        self.naked.remove(&received_seq_no);
        self.reassembly.insert(received_seq_no, packet.payload);

        if received_seq_no == self.expected_seq_no {
            self.expected_seq_no += 1;
        } else if received_seq_no > self.expected_seq_no {
            // a gap opened: selectively NAK every missing number in it
            for missing in self.expected_seq_no..received_seq_no {
                self.naked.insert(missing);
                self.send_nak(missing).await;
            }
            self.expected_seq_no = received_seq_no + 1;
        }
        // below expected: a formerly NAK'd packet filling its gap, no marker updates

        if !self.response_emitted && self.is_request_complete() {
            self.emit_response().await;
        }
    }

    fn is_request_complete(&self) -> bool {
        let Some(total_request_packets) = self.total_request_packets else {
            return false;
        };
        if total_request_packets == 0 {
            // corrupt handshake payload: the request can never complete
            return false;
        }

        (FIRST_DATA_SEQ_NO..FIRST_DATA_SEQ_NO.saturating_add(total_request_packets))
            .all(|seq_no| self.reassembly.get(&seq_no).is_some_and(|chunk| !chunk.is_empty()))
    }

    async fn emit_response(&mut self) {
        let total_request_packets = self.total_request_packets.unwrap_or(0);
        let request_text = assemble_request(&self.reassembly, total_request_packets);

        let response_text = self.handler.handle(&request_text).await;

        self.response_packets = chunk_response(&response_text, self.peer_endpoint);
        self.response_emitted = true;
        debug!(
            "sending {}-packet response to {}",
            self.response_packets.len(),
            self.peer_endpoint
        );

        let packets = self.response_packets.clone();
        for (i, buf) in packets.iter().enumerate() {
            if !self.send_raw_with_retry(buf).await {
                warn!(
                    "failed to send response packet #{} to {} - awaiting a peer NAK",
                    i + 1,
                    self.peer_endpoint
                );
            }
        }
    }

    async fn retransmit_pending(&self) {
        for &seq_no in &self.pending_nak_retransmit {
            let retained = seq_no
                .checked_sub(1)
                .and_then(|idx| self.response_packets.get(idx as usize));

            match retained {
                Some(buf) => {
                    trace!(
                        "retransmitting response packet #{} to {}",
                        seq_no, self.peer_endpoint
                    );
                    self.send_raw_with_retry(buf).await;
                }
                None => {
                    warn!(
                        "peer {} NAK'd response packet #{} which was never sent",
                        self.peer_endpoint, seq_no
                    );
                }
            }
        }
    }

    async fn send_ack(&self, seq_no: u32) {
        trace!("ACK'ing packet #{} from {}", seq_no, self.peer_endpoint);
        self.send_packet_with_retry(&self.packet_to_peer(PacketType::Ack, seq_no)).await;
    }

    async fn send_nak(&self, seq_no: u32) {
        debug!("NAK'ing missing packet #{} from {}", seq_no, self.peer_endpoint);
        self.send_packet_with_retry(&self.packet_to_peer(PacketType::Nak, seq_no)).await;
    }

    async fn send_packet_with_retry(&self, packet: &Packet) {
        if !self.send_raw_with_retry(&packet.to_bytes()).await {
            debug!(
                "giving up on {:?} #{} to {}",
                packet.kind(),
                packet.seq_no,
                self.peer_endpoint
            );
        }
    }

    /// One retry per invocation; a second failure is the caller's to log.
    async fn send_raw_with_retry(&self, buf: &[u8]) -> bool {
        self.send.send_raw(self.reply_to_addr, buf).await
            || self.send.send_raw(self.reply_to_addr, buf).await
    }

    fn packet_to_peer(&self, packet_type: PacketType, seq_no: u32) -> Packet {
        Packet::new(packet_type, seq_no, self.peer_endpoint, Bytes::new())
    }
}
