use anyhow::Result;
use bytes::BytesMut;

use skymesh_codec::{Endpoint, Error, MAX_PAYLOAD, PACKET_SIZE, Packet, PacketKind, VERSION};

fn sample(kind: PacketKind, payload: &[u8]) -> Packet {
    let mut packet = Packet::new(
        Endpoint::new("192.168.1.10".parse().unwrap(), 4000),
        Endpoint::new("10.20.30.40".parse().unwrap(), 4001),
        kind,
        payload,
    )
    .unwrap();

    packet.seal();
    packet
}

#[test]
fn round_trip_preserves_every_field() -> Result<()> {
    let payloads: [&[u8]; 4] = [b"", b"hello", &[0xAA; 1024], &[0x5A; MAX_PAYLOAD]];

    for payload in payloads {
        let mut packet = sample(PacketKind::File, payload);
        packet.fragment_number = 3;
        packet.fragment_count = 7;
        packet.seal();

        let mut bytes = BytesMut::with_capacity(PACKET_SIZE);
        packet.encode(&mut bytes);
        assert_eq!(bytes.len(), PACKET_SIZE);

        let decoded = Packet::decode(&bytes)?;
        assert_eq!(decoded, packet);
        assert!(decoded.verify());
    }

    Ok(())
}

#[test]
fn layout_is_fixed_and_big_endian() {
    let mut packet = sample(PacketKind::File, b"payload");
    packet.fragment_number = 0x0102;
    packet.fragment_count = 0x0304;
    packet.seal();

    let mut bytes = BytesMut::new();
    packet.encode(&mut bytes);

    #[rustfmt::skip]
    let header: [u8; 18] = [
        VERSION,
        192, 168, 1, 10,      // source address
        0x0F, 0xA0,           // source port 4000
        10, 20, 30, 40,       // target address
        0x0F, 0xA1,           // target port 4001
        1,                    // kind FILE
        0x01, 0x02,           // fragment number
        0x03, 0x04,           // fragment count
    ];

    let checksum = packet.checksum.to_be_bytes();

    assert_eq!(&bytes[..18], header.as_slice());
    assert_eq!(&bytes[18..22], checksum.as_slice());
    assert_eq!(&bytes[22..29], b"payload".as_slice());
    assert!(bytes[29..].iter().all(|byte| *byte == 0));
}

#[test]
fn checksum_parameters_match_the_standard_crc32() {
    // Reflected 0xEDB88320, init 0xFFFFFFFF, xorout 0xFFFFFFFF: the check
    // value for "123456789" pins all three at once.
    assert_eq!(crc32fast::hash(b"123456789"), 0xCBF4_3926);
}

#[test]
fn sealing_is_independent_of_the_previous_checksum() {
    let mut first = sample(PacketKind::Text, b"same frame");
    let mut second = sample(PacketKind::Text, b"same frame");

    second.checksum = 0xDEAD_BEEF;
    second.seal();
    first.seal();

    assert_eq!(first.checksum, second.checksum);
}

#[test]
fn single_bit_flips_break_verification() -> Result<()> {
    let packet = sample(PacketKind::File, b"integrity fixture");

    let mut bytes = BytesMut::new();
    packet.encode(&mut bytes);

    let mut flipped_bits = Vec::with_capacity(512);
    // Every header bit outside the checksum field, then a stride across the
    // payload region.
    for offset in (0..18).chain((22..PACKET_SIZE).step_by(997)) {
        for bit in 0..8 {
            flipped_bits.push((offset, bit));
        }
    }

    for (offset, bit) in flipped_bits {
        let mut corrupted = bytes.to_vec();
        corrupted[offset] ^= 1 << bit;

        match Packet::decode(&corrupted) {
            // Flips in the version or kind byte are rejected before the
            // checksum is ever consulted.
            Err(Error::VersionMismatch) | Err(Error::UnknownKind) => {}
            Err(e) => return Err(e.into()),
            Ok(decoded) => assert!(
                !decoded.verify(),
                "flip at byte {offset} bit {bit} went undetected"
            ),
        }
    }

    Ok(())
}

#[test]
fn decode_rejects_bad_frames() {
    let packet = sample(PacketKind::Text, b"boundary checks");
    let mut bytes = BytesMut::new();
    packet.encode(&mut bytes);

    assert_eq!(Packet::decode(&[]), Err(Error::MalformedPacket));
    assert_eq!(
        Packet::decode(&bytes[..PACKET_SIZE - 1]),
        Err(Error::MalformedPacket)
    );

    let mut oversized = bytes.to_vec();
    oversized.push(0);
    assert_eq!(Packet::decode(&oversized), Err(Error::MalformedPacket));

    let mut wrong_version = bytes.to_vec();
    wrong_version[0] = VERSION + 1;
    assert_eq!(Packet::decode(&wrong_version), Err(Error::VersionMismatch));

    let mut unknown_kind = bytes.to_vec();
    unknown_kind[13] = 7;
    assert_eq!(Packet::decode(&unknown_kind), Err(Error::UnknownKind));
}

#[test]
fn oversized_payloads_are_refused_at_construction() {
    let source = Endpoint::new("127.0.0.1".parse().unwrap(), 1);
    let target = Endpoint::new("127.0.0.1".parse().unwrap(), 2);

    assert_eq!(
        Packet::new(source, target, PacketKind::File, &vec![0u8; MAX_PAYLOAD + 1]),
        Err(Error::MalformedPacket)
    );
}
