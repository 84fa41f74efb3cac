use std::collections::BTreeMap;
use std::net::SocketAddrV4;

use bytes::{BufMut, Bytes, BytesMut};

use crate::packet::{Packet, PacketType, FIRST_DATA_SEQ_NO, HEADER_LEN, RESPONSE_CHUNK_LEN};

/// Concatenates the reassembled request chunks into the full HTTP request
///  text. The caller has already verified completeness, so gaps cannot occur.
pub fn assemble_request(reassembly: &BTreeMap<u32, Bytes>, total_request_packets: u32) -> String {
    let mut raw = Vec::new();
    for seq_no in FIRST_DATA_SEQ_NO..FIRST_DATA_SEQ_NO.saturating_add(total_request_packets) {
        if let Some(chunk) = reassembly.get(&seq_no) {
            raw.extend_from_slice(chunk);
        }
    }
    String::from_utf8_lossy(&raw).into_owned()
}

/// Chunks a response text into encoded DATA packets with strictly monotonic
///  sequence numbers 1..=N. Each packet carries a trailing byte holding the
///  total packet count (the value wraps at 256 for very large responses).
///
/// The returned buffers are the exact bytes put on the wire, retained so that
///  peer NAKs can be answered with a byte-identical retransmit.
pub fn chunk_response(response: &str, peer: SocketAddrV4) -> Vec<Bytes> {
    let payload = response.as_bytes();
    let num_packets = payload.len().div_ceil(RESPONSE_CHUNK_LEN);

    let mut packets = Vec::with_capacity(num_packets);
    for (i, chunk) in payload.chunks(RESPONSE_CHUNK_LEN).enumerate() {
        let packet = Packet::new(PacketType::Data, (i + 1) as u32, peer, chunk.to_vec());

        let mut buf = BytesMut::with_capacity(HEADER_LEN + chunk.len() + 1);
        packet.ser(&mut buf);
        buf.put_u8(num_packets as u8);
        packets.push(buf.freeze());
    }
    packets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::MAX_DATAGRAM_LEN;
    use rstest::rstest;
    use std::net::Ipv4Addr;

    fn peer() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 41000)
    }

    #[test]
    fn test_assemble_request_in_seq_order() {
        let mut reassembly = BTreeMap::new();
        reassembly.insert(6, Bytes::from_static(b"!"));
        reassembly.insert(4, Bytes::from_static(b"hello "));
        reassembly.insert(5, Bytes::from_static(b"world"));

        assert_eq!(assemble_request(&reassembly, 3), "hello world!");
    }

    #[rstest]
    #[case::single_short(7, 1)]
    #[case::exactly_one_chunk(RESPONSE_CHUNK_LEN, 1)]
    #[case::one_past_chunk(RESPONSE_CHUNK_LEN + 1, 2)]
    #[case::exact_multiple(3 * RESPONSE_CHUNK_LEN, 3)]
    #[case::with_residue(3 * RESPONSE_CHUNK_LEN + 17, 4)]
    fn test_chunk_count(#[case] response_len: usize, #[case] expected_packets: usize) {
        let response = "x".repeat(response_len);
        let packets = chunk_response(&response, peer());

        assert_eq!(packets.len(), expected_packets);
        for buf in &packets {
            assert!(buf.len() <= MAX_DATAGRAM_LEN);
        }
    }

    /// Sequence numbers are strictly monotonic 1..=N - in particular the final
    ///  residue packet continues the numbering instead of reusing its
    ///  predecessor's.
    #[test]
    fn test_monotonic_seq_nos_with_residue() {
        let response = "y".repeat(2 * RESPONSE_CHUNK_LEN + 5);
        let packets = chunk_response(&response, peer());

        let seq_nos = packets
            .iter()
            .map(|buf| {
                let mut b: &[u8] = buf;
                Packet::deser(&mut b).unwrap().seq_no
            })
            .collect::<Vec<_>>();
        assert_eq!(seq_nos, vec![1, 2, 3]);
    }

    #[test]
    fn test_trailing_total_count_byte() {
        let response = "z".repeat(RESPONSE_CHUNK_LEN + 1);
        let packets = chunk_response(&response, peer());

        assert_eq!(packets.len(), 2);
        for buf in &packets {
            assert_eq!(*buf.last().unwrap(), 2);
        }
    }

    #[test]
    fn test_chunk_contents_reconstruct_response() {
        let response = (0..2500).map(|i| ((i % 26) as u8 + b'a') as char).collect::<String>();
        let packets = chunk_response(&response, peer());

        let mut reconstructed = Vec::new();
        for buf in &packets {
            let mut b: &[u8] = buf;
            let packet = Packet::deser(&mut b).unwrap();
            // strip the trailing total-count byte
            reconstructed.extend_from_slice(&packet.payload[..packet.payload.len() - 1]);
        }
        assert_eq!(reconstructed, response.as_bytes());
    }

    #[test]
    fn test_single_packet_response() {
        let packets = chunk_response("HTTP/1.0 200 OK \r\n\r\n\r\nok", peer());

        assert_eq!(packets.len(), 1);
        let mut b: &[u8] = &packets[0];
        let packet = Packet::deser(&mut b).unwrap();
        assert_eq!(packet.seq_no, 1);
        assert_eq!(packet.kind(), Some(PacketType::Data));
        assert_eq!(*packet.payload.last().unwrap(), 1);
    }

    #[test]
    fn test_residue_packet_carries_residue_only() {
        let response = "w".repeat(RESPONSE_CHUNK_LEN + 3);
        let packets = chunk_response(&response, peer());

        let mut b: &[u8] = &packets[1];
        let last = Packet::deser(&mut b).unwrap();
        // residue chunk plus the trailing count byte
        assert_eq!(last.payload.len(), 3 + 1);
    }
}
