use nom::number::complete::be_u16;

use crate::error::Error;
use crate::headers::{header_common, transport_segment_checksum, Checksum, Header, Peered};
use crate::protocol::Protocol;
use crate::state::PacketState;

/// UDP header view. The checksum capability covers header plus payload per
/// the datagram's own length field.
#[derive(Clone, Debug, Default)]
pub struct Udp {
    peered: Peered,
    pub src_port: u16,
    pub dst_port: u16,
    /// Datagram length (header + payload) from the length field.
    pub length: u16,
    pub checksum: u16,
}

impl Udp {
    fn segment(&self, raw: &[u8]) -> std::ops::Range<usize> {
        let start = self.range().start;
        let end = (start + self.length as usize).min(raw.len());
        start..end
    }
}

impl Header for Udp {
    header_common!(Protocol::UDP);

    fn decode(&mut self, data: &[u8]) -> Result<(), Error> {
        self.peered.valid = false;
        let (data, src_port) = be_u16(data)?;
        let (data, dst_port) = be_u16(data)?;
        let (data, length) = be_u16(data)?;
        let (_, checksum) = be_u16(data)?;
        if length < 8 {
            return Err(Error::CorruptHeader("UDP length below header size"));
        }
        self.src_port = src_port;
        self.dst_port = dst_port;
        self.length = length;
        self.checksum = checksum;
        self.peered.valid = true;
        Ok(())
    }

    fn checksum(&self) -> Option<&dyn Checksum> {
        Some(self)
    }
}

impl Checksum for Udp {
    fn recalculate_checksum(&self, raw: &mut [u8], state: &PacketState) -> Result<(), Error> {
        let seg = self.segment(raw);
        let start = seg.start;
        if raw.len() < start + 8 {
            return Err(Error::Peering {
                offset: start,
                length: 8,
                available: raw.len(),
            });
        }
        raw[start + 6..start + 8].copy_from_slice(&[0, 0]);
        let sum = transport_segment_checksum(raw, state, self.index(), seg, 17)?;
        // An all-zero UDP checksum means "not computed"; transmit 0xffff.
        let sum = if sum == 0 { 0xffff } else { sum };
        raw[start + 6..start + 8].copy_from_slice(&sum.to_be_bytes());
        Ok(())
    }

    fn verify_checksum(&self, raw: &[u8], state: &PacketState) -> bool {
        matches!(
            transport_segment_checksum(raw, state, self.index(), self.segment(raw), 17),
            Ok(0)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::HeaderRecord;

    #[test]
    fn decode_fields() {
        let buf = [0x13, 0x89, 0x00, 0x35, 0x00, 0x0c, 0x5b, 0xa7];
        let mut udp = Udp::default();
        udp.peer(
            &HeaderRecord {
                protocol: Protocol::UDP,
                offset: 34,
                length: 8,
            },
            2,
        );
        udp.decode(&buf).unwrap();
        assert_eq!(udp.src_port, 5001);
        assert_eq!(udp.dst_port, 53);
        assert_eq!(udp.length, 12);
        assert_eq!(udp.checksum, 0x5ba7);
    }

    #[test]
    fn undersized_length_field() {
        let buf = [0x13, 0x89, 0x00, 0x35, 0x00, 0x04, 0x00, 0x00];
        let mut udp = Udp::default();
        udp.peer(
            &HeaderRecord {
                protocol: Protocol::UDP,
                offset: 0,
                length: 8,
            },
            0,
        );
        assert!(udp.decode(&buf).is_err());
        assert!(!udp.is_valid());
    }
}
