use std::net::{Ipv4Addr, SocketAddrV4};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

pub const HEADER_LEN: usize = 11;
pub const MAX_DATAGRAM_LEN: usize = 1024;
pub const MAX_PAYLOAD_LEN: usize = MAX_DATAGRAM_LEN - HEADER_LEN;
/// Response chunks leave one payload byte for the trailing total-count marker.
pub const RESPONSE_CHUNK_LEN: usize = MAX_PAYLOAD_LEN - 1;

/// The sequence number of the handshake-closing ACK. An ACK with this number
///  never refers to a response packet.
pub const HANDSHAKE_ACK_SEQ_NO: u32 = 3;
/// Sequence numbers 1-3 are reserved for the handshake; request DATA starts here.
pub const FIRST_DATA_SEQ_NO: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum PacketType {
    Data = 0,
    Ack = 1,
    Syn = 2,
    SynAck = 3,
    Nak = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PacketDecodeError {
    #[error("datagram of {0} bytes is shorter than the 11-byte header")]
    TooShort(usize),
}

/// A decoded datagram. The type is kept as its raw byte value - the codec does
///  not reject unknown types, the state machine ignores them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: u8,
    pub seq_no: u32,
    pub peer_addr: Ipv4Addr,
    pub peer_port: u16,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(
        packet_type: PacketType,
        seq_no: u32,
        peer: SocketAddrV4,
        payload: impl Into<Bytes>,
    ) -> Packet {
        Packet {
            packet_type: packet_type.into(),
            seq_no,
            peer_addr: *peer.ip(),
            peer_port: peer.port(),
            payload: payload.into(),
        }
    }

    pub fn kind(&self) -> Option<PacketType> {
        PacketType::try_from(self.packet_type).ok()
    }

    /// The endpoint embedded in the header - the session key.
    pub fn peer_endpoint(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.peer_addr, self.peer_port)
    }

    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u8(self.packet_type);
        buf.put_u32(self.seq_no);
        buf.put_slice(&self.peer_addr.octets());
        buf.put_u16(self.peer_port);
        buf.put_slice(&self.payload);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        self.ser(&mut buf);
        buf.freeze()
    }

    pub fn deser(buf: &mut impl Buf) -> Result<Packet, PacketDecodeError> {
        if buf.remaining() < HEADER_LEN {
            return Err(PacketDecodeError::TooShort(buf.remaining()));
        }

        let packet_type = buf.get_u8();
        let seq_no = buf.get_u32();
        let mut octets = [0u8; 4];
        buf.copy_to_slice(&mut octets);
        let peer_port = buf.get_u16();
        let payload = buf.copy_to_bytes(buf.remaining());

        Ok(Packet {
            packet_type,
            seq_no,
            peer_addr: Ipv4Addr::from(octets),
            peer_port,
            payload,
        })
    }
}
