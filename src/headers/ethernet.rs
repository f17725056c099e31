use nom::bytes::complete::take;
use nom::number::complete::be_u16;

use crate::error::Error;
use crate::headers::{header_common, Header, Peered};
use crate::protocol::Protocol;

/// Ethernet II header view.
#[derive(Clone, Debug, Default)]
pub struct Ethernet {
    peered: Peered,
    pub dst: [u8; 6],
    pub src: [u8; 6],
    pub etype: u16,
}

impl Header for Ethernet {
    header_common!(Protocol::ETHERNET);

    fn decode(&mut self, data: &[u8]) -> Result<(), Error> {
        self.peered.valid = false;
        let (data, dst) = take(6usize)(data)?;
        let (data, src) = take(6usize)(data)?;
        let (_, etype) = be_u16(data)?;
        self.dst.copy_from_slice(dst);
        self.src.copy_from_slice(src);
        self.etype = etype;
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
            0x01, 0x80, 0xc2, 0x00, 0x00, 0x00, 0xcc, 0x04, 0x0d, 0x5c, 0xf0, 0x00, 0x08, 0x00,
        ];
        let mut eth = Ethernet::default();
        eth.peer(
            &HeaderRecord {
                protocol: Protocol::ETHERNET,
                offset: 0,
                length: 14,
            },
            0,
        );
        eth.decode(&buf).unwrap();
        assert!(eth.is_valid());
        assert_eq!(eth.dst, [0x01, 0x80, 0xc2, 0x00, 0x00, 0x00]);
        assert_eq!(eth.src, [0xcc, 0x04, 0x0d, 0x5c, 0xf0, 0x00]);
        assert_eq!(eth.etype, 0x0800);
    }

    #[test]
    fn short_buffer_leaves_view_invalid() {
        let mut eth = Ethernet::default();
        eth.peer(
            &HeaderRecord {
                protocol: Protocol::ETHERNET,
                offset: 0,
                length: 14,
            },
            0,
        );
        assert!(eth.decode(&[0u8; 12]).is_err());
        assert!(!eth.is_valid());
        // Still peered to its range.
        assert_eq!(eth.range(), 0..14);
    }
}
