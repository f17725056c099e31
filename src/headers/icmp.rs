use nom::number::complete::{be_u16, u8 as any_u8};

use crate::checksum::internet_checksum;
use crate::error::Error;
use crate::headers::{enclosing_network, header_common, ip_payload_end, Checksum, Header, Peered};
use crate::protocol::Protocol;
use crate::state::PacketState;

/// ICMP header view. The checksum capability covers the whole ICMP
/// message, header plus the payload record that follows it.
#[derive(Clone, Debug, Default)]
pub struct Icmp {
    peered: Peered,
    pub kind: u8,
    pub code: u8,
    pub checksum: u16,
}

impl Icmp {
    /// Byte range of the full ICMP message within `raw`.
    fn message_range(&self, raw: &[u8], state: &PacketState) -> Result<(usize, usize), Error> {
        let start = self.range().start;
        let end = match enclosing_network(state, self.index()) {
            Some(ip) => ip_payload_end(raw, &ip),
            None => raw.len(),
        };
        if end < self.range().end || raw.len() < end {
            return Err(Error::Peering {
                offset: start,
                length: self.range().end - start,
                available: raw.len(),
            });
        }
        Ok((start, end))
    }
}

impl Header for Icmp {
    header_common!(Protocol::ICMP);

    fn decode(&mut self, data: &[u8]) -> Result<(), Error> {
        self.peered.valid = false;
        let (data, kind) = any_u8(data)?;
        let (data, code) = any_u8(data)?;
        let (_, checksum) = be_u16(data)?;
        self.kind = kind;
        self.code = code;
        self.checksum = checksum;
        self.peered.valid = true;
        Ok(())
    }

    fn checksum(&self) -> Option<&dyn Checksum> {
        Some(self)
    }
}

impl Checksum for Icmp {
    fn recalculate_checksum(&self, raw: &mut [u8], state: &PacketState) -> Result<(), Error> {
        let (start, end) = self.message_range(raw, state)?;
        raw[start + 2..start + 4].copy_from_slice(&[0, 0]);
        let sum = internet_checksum(&raw[start..end]);
        raw[start + 2..start + 4].copy_from_slice(&sum.to_be_bytes());
        Ok(())
    }

    fn verify_checksum(&self, raw: &[u8], state: &PacketState) -> bool {
        match self.message_range(raw, state) {
            Ok((start, end)) => internet_checksum(&raw[start..end]) == 0,
            Err(_) => false,
        }
    }
}
