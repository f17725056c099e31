use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u32, u8 as any_u8};

use crate::error::Error;
use crate::headers::{header_common, Header, Peered};
use crate::protocol::Protocol;

/// IPv6 fixed header view. Extension headers are left to the payload.
#[derive(Clone, Debug, Default)]
pub struct Ipv6 {
    peered: Peered,
    pub traffic_class: u8,
    pub flow_label: u32,
    pub payload_len: u16,
    pub next_header: u8,
    pub hop_limit: u8,
    pub src: [u8; 16],
    pub dst: [u8; 16],
}

impl Header for Ipv6 {
    header_common!(Protocol::IPV6);

    fn decode(&mut self, data: &[u8]) -> Result<(), Error> {
        self.peered.valid = false;
        let (data, vtf) = be_u32(data)?;
        if vtf >> 28 != 6 {
            return Err(Error::CorruptHeader("IP version is not 6"));
        }
        let (data, payload_len) = be_u16(data)?;
        let (data, next_header) = any_u8(data)?;
        let (data, hop_limit) = any_u8(data)?;
        let (data, src) = take(16usize)(data)?;
        let (_, dst) = take(16usize)(data)?;
        self.traffic_class = ((vtf >> 20) & 0xff) as u8;
        self.flow_label = vtf & 0x000f_ffff;
        self.payload_len = payload_len;
        self.next_header = next_header;
        self.hop_limit = hop_limit;
        self.src.copy_from_slice(src);
        self.dst.copy_from_slice(dst);
        self.peered.valid = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::HeaderRecord;

    #[test]
    fn decode_fields() {
        let buf = [
            0x60, 0x0c, 0x6b, 0x7b, 0x00, 0xb8, 0x11, 0xff, 0xfe, 0x80, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x10, 0x08, 0xfa, 0x70, 0x46, 0xe8, 0x42, 0x04, 0xff, 0x02, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xfb,
        ];
        let mut ip = Ipv6::default();
        ip.peer(
            &HeaderRecord {
                protocol: Protocol::IPV6,
                offset: 14,
                length: 40,
            },
            1,
        );
        ip.decode(&buf).unwrap();
        assert!(ip.is_valid());
        assert_eq!(ip.payload_len, 0xb8);
        assert_eq!(ip.next_header, 0x11);
        assert_eq!(ip.hop_limit, 255);
        assert_eq!(ip.src[0..2], [0xfe, 0x80]);
        assert_eq!(ip.dst[15], 0xfb);
    }
}
