use nom::bytes::complete::take;
use nom::number::complete::{be_u16, u8 as any_u8};

use crate::checksum::internet_checksum;
use crate::error::Error;
use crate::headers::{header_common, Checksum, Header, Peered};
use crate::protocol::Protocol;
use crate::state::PacketState;

/// IPv4 header view.
#[derive(Clone, Debug, Default)]
pub struct Ipv4 {
    peered: Peered,
    /// Header length in bytes.
    pub header_len: u8,
    pub tos: u8,
    pub total_len: u16,
    pub ident: u16,
    pub ttl: u8,
    /// IP protocol number of the next header.
    pub ip_proto: u8,
    pub checksum: u16,
    pub src: [u8; 4],
    pub dst: [u8; 4],
}

impl Header for Ipv4 {
    header_common!(Protocol::IPV4);

    fn decode(&mut self, data: &[u8]) -> Result<(), Error> {
        self.peered.valid = false;
        let (data, vhl) = any_u8(data)?;
        if vhl >> 4 != 4 {
            return Err(Error::CorruptHeader("IP version is not 4"));
        }
        let header_len = (vhl & 0x0f) * 4;
        if header_len < 20 {
            return Err(Error::CorruptHeader("IPv4 header length below 20"));
        }
        let (data, tos) = any_u8(data)?;
        let (data, total_len) = be_u16(data)?;
        let (data, ident) = be_u16(data)?;
        let (data, _flags_frag) = be_u16(data)?;
        let (data, ttl) = any_u8(data)?;
        let (data, ip_proto) = any_u8(data)?;
        let (data, checksum) = be_u16(data)?;
        let (data, src) = take(4usize)(data)?;
        let (_, dst) = take(4usize)(data)?;
        self.header_len = header_len;
        self.tos = tos;
        self.total_len = total_len;
        self.ident = ident;
        self.ttl = ttl;
        self.ip_proto = ip_proto;
        self.checksum = checksum;
        self.src.copy_from_slice(src);
        self.dst.copy_from_slice(dst);
        self.peered.valid = true;
        Ok(())
    }

    fn checksum(&self) -> Option<&dyn Checksum> {
        Some(self)
    }
}

impl Checksum for Ipv4 {
    fn recalculate_checksum(&self, raw: &mut [u8], _state: &PacketState) -> Result<(), Error> {
        let range = self.range();
        if raw.len() < range.end {
            return Err(Error::Peering {
                offset: range.start,
                length: range.end - range.start,
                available: raw.len(),
            });
        }
        let off = range.start;
        raw[off + 10..off + 12].copy_from_slice(&[0, 0]);
        let sum = internet_checksum(&raw[range]);
        raw[off + 10..off + 12].copy_from_slice(&sum.to_be_bytes());
        Ok(())
    }

    fn verify_checksum(&self, raw: &[u8], _state: &PacketState) -> bool {
        let range = self.range();
        raw.len() >= range.end && internet_checksum(&raw[range]) == 0
    }
}
