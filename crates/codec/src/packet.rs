use bytes::{BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::{Endpoint, Error, HEADER_SIZE, MAX_PAYLOAD, PACKET_SIZE, VERSION};

use std::net::Ipv4Addr;

/// Payload discriminator byte.
///
/// TEXT messages always fit a single frame; FILE payloads may span many
/// numbered fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum PacketKind {
    Text = 0,
    File = 1,
}

/// One fixed-width frame.
///
/// The payload region always holds exactly [`MAX_PAYLOAD`] bytes; the
/// constructor pads shorter messages with NULs so that a decoded frame
/// compares equal to the frame that was encoded.
///
/// Layout, big-endian throughout:
///
/// | offset | size  | field           |
/// |--------|-------|-----------------|
/// | 0      | 1     | version         |
/// | 1      | 4     | source address  |
/// | 5      | 2     | source port     |
/// | 7      | 4     | target address  |
/// | 11     | 2     | target port     |
/// | 13     | 1     | kind            |
/// | 14     | 2     | fragment number |
/// | 16     | 2     | fragment count  |
/// | 18     | 4     | CRC-32          |
/// | 22     | 50000 | payload         |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub version: u8,
    pub source: Endpoint,
    pub target: Endpoint,
    pub kind: PacketKind,
    /// 1-based position of this fragment within the message.
    pub fragment_number: u16,
    /// Total number of fragments in the message.
    pub fragment_count: u16,
    pub checksum: u32,
    payload: Vec<u8>,
}

impl Packet {
    /// Builds a frame around `payload`, padded to the fixed payload width.
    /// Fragment fields start at 1/1 (a complete single-frame message) and
    /// the checksum at zero; call [`Packet::seal`] before sending.
    ///
    /// # Test
    ///
    /// ```
    /// use skymesh_codec::{Endpoint, MAX_PAYLOAD, Packet, PacketKind};
    ///
    /// let source = Endpoint::new("10.0.0.1".parse().unwrap(), 4000);
    /// let target = Endpoint::new("10.0.0.2".parse().unwrap(), 4001);
    ///
    /// let packet = Packet::new(source, target, PacketKind::Text, b"hello").unwrap();
    ///
    /// assert_eq!(packet.payload().len(), MAX_PAYLOAD);
    /// assert_eq!(&packet.payload()[..5], b"hello");
    ///
    /// assert!(Packet::new(source, target, PacketKind::File, &[0; MAX_PAYLOAD + 1]).is_err());
    /// ```
    pub fn new(
        source: Endpoint,
        target: Endpoint,
        kind: PacketKind,
        payload: &[u8],
    ) -> Result<Self, Error> {
        if payload.len() > MAX_PAYLOAD {
            return Err(Error::MalformedPacket);
        }

        let mut padded = vec![0u8; MAX_PAYLOAD];
        padded[..payload.len()].copy_from_slice(payload);

        Ok(Self {
            version: VERSION,
            fragment_number: 1,
            fragment_count: 1,
            checksum: 0,
            payload: padded,
            source,
            target,
            kind,
        })
    }

    /// The padded payload region, always [`MAX_PAYLOAD`] bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// # Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use skymesh_codec::{Endpoint, PACKET_SIZE, Packet, PacketKind};
    ///
    /// let source = Endpoint::new("10.0.0.1".parse().unwrap(), 4000);
    /// let target = Endpoint::new("10.0.0.2".parse().unwrap(), 4001);
    ///
    /// let mut packet = Packet::new(source, target, PacketKind::Text, b"hello").unwrap();
    /// packet.seal();
    ///
    /// let mut bytes = BytesMut::with_capacity(PACKET_SIZE);
    /// packet.encode(&mut bytes);
    ///
    /// assert_eq!(bytes.len(), PACKET_SIZE);
    /// assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    /// ```
    pub fn encode(&self, bytes: &mut BytesMut) {
        bytes.clear();
        bytes.reserve(PACKET_SIZE);

        bytes.put_u8(self.version);
        bytes.put_u32(self.source.address.into());
        bytes.put_u16(self.source.port);
        bytes.put_u32(self.target.address.into());
        bytes.put_u16(self.target.port);
        bytes.put_u8(self.kind.into());
        bytes.put_u16(self.fragment_number);
        bytes.put_u16(self.fragment_count);
        bytes.put_u32(self.checksum);
        bytes.extend_from_slice(&self.payload);
    }

    /// Decodes one frame. The buffer length must be exactly
    /// [`PACKET_SIZE`]; anything else is a malformed frame, not a prefix.
    ///
    /// # Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use skymesh_codec::{Endpoint, Error, Packet, PacketKind};
    ///
    /// let source = Endpoint::new("10.0.0.1".parse().unwrap(), 4000);
    /// let target = Endpoint::new("10.0.0.2".parse().unwrap(), 4001);
    ///
    /// let mut packet = Packet::new(source, target, PacketKind::File, &[7; 64]).unwrap();
    /// packet.fragment_number = 2;
    /// packet.fragment_count = 3;
    /// packet.seal();
    ///
    /// let mut bytes = BytesMut::new();
    /// packet.encode(&mut bytes);
    ///
    /// assert_eq!(Packet::decode(&bytes[..21]), Err(Error::MalformedPacket));
    ///
    /// let decoded = Packet::decode(&bytes).unwrap();
    /// assert_eq!(decoded.fragment_number, 2);
    /// assert_eq!(decoded.fragment_count, 3);
    /// assert!(decoded.verify());
    /// ```
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != PACKET_SIZE {
            return Err(Error::MalformedPacket);
        }

        let version = bytes[0];
        if version != VERSION {
            return Err(Error::VersionMismatch);
        }

        let kind = PacketKind::try_from(bytes[13]).map_err(|_| Error::UnknownKind)?;

        Ok(Self {
            source: Endpoint::new(
                Ipv4Addr::from(u32::from_be_bytes(bytes[1..5].try_into()?)),
                u16::from_be_bytes(bytes[5..7].try_into()?),
            ),
            target: Endpoint::new(
                Ipv4Addr::from(u32::from_be_bytes(bytes[7..11].try_into()?)),
                u16::from_be_bytes(bytes[11..13].try_into()?),
            ),
            fragment_number: u16::from_be_bytes(bytes[14..16].try_into()?),
            fragment_count: u16::from_be_bytes(bytes[16..18].try_into()?),
            checksum: u32::from_be_bytes(bytes[18..22].try_into()?),
            payload: bytes[HEADER_SIZE..].to_vec(),
            version,
            kind,
        })
    }

    /// Computes the checksum and writes it into the frame.
    ///
    /// The CRC-32 (reflected 0xEDB88320, init and xorout 0xFFFFFFFF) covers
    /// the serialized frame with the checksum field zeroed, so sealing is
    /// deterministic no matter what the field held before.
    pub fn seal(&mut self) {
        self.checksum = self.compute_checksum();
    }

    /// Whether the stored checksum matches the frame contents.
    ///
    /// # Test
    ///
    /// ```
    /// use skymesh_codec::{Endpoint, Packet, PacketKind};
    ///
    /// let source = Endpoint::new("10.0.0.1".parse().unwrap(), 4000);
    /// let target = Endpoint::new("10.0.0.2".parse().unwrap(), 4001);
    ///
    /// let mut packet = Packet::new(source, target, PacketKind::Text, b"hi").unwrap();
    /// assert!(!packet.verify());
    ///
    /// packet.seal();
    /// assert!(packet.verify());
    ///
    /// packet.fragment_count = 9;
    /// assert!(!packet.verify());
    /// ```
    pub fn verify(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    fn compute_checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();

        hasher.update(&[self.version]);
        hasher.update(&self.source.address.octets());
        hasher.update(&self.source.port.to_be_bytes());
        hasher.update(&self.target.address.octets());
        hasher.update(&self.target.port.to_be_bytes());
        hasher.update(&[self.kind.into()]);
        hasher.update(&self.fragment_number.to_be_bytes());
        hasher.update(&self.fragment_count.to_be_bytes());
        hasher.update(&[0u8; 4]);
        hasher.update(&self.payload);

        hasher.finalize()
    }
}
