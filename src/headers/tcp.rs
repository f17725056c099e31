use nom::number::complete::{be_u16, be_u32, u8 as any_u8};

use crate::error::Error;
use crate::headers::{
    enclosing_network, header_common, ip_payload_end, transport_segment_checksum, Checksum, Header,
    Peered,
};
use crate::protocol::Protocol;
use crate::state::PacketState;

bitflags! {
    pub struct TcpFlags: u8 {
        const FIN = 0b0000_0001;
        const SYN = 0b0000_0010;
        const RST = 0b0000_0100;
        const PSH = 0b0000_1000;
        const ACK = 0b0001_0000;
        const URG = 0b0010_0000;
    }
}

impl Default for TcpFlags {
    fn default() -> Self {
        TcpFlags::empty()
    }
}

/// TCP header view. The checksum capability covers the segment from the
/// header start to the end of the enclosing IP packet.
#[derive(Clone, Debug, Default)]
pub struct Tcp {
    peered: Peered,
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    /// Header length in bytes, from the data offset field.
    pub header_len: u8,
    pub flags: TcpFlags,
    pub window: u16,
    pub checksum: u16,
    pub urgent: u16,
}

impl Tcp {
    fn segment_end(&self, raw: &[u8], state: &PacketState) -> usize {
        match enclosing_network(state, self.index()) {
            Some(ip) => ip_payload_end(raw, &ip),
            None => raw.len(),
        }
    }
}

impl Header for Tcp {
    header_common!(Protocol::TCP);

    fn decode(&mut self, data: &[u8]) -> Result<(), Error> {
        self.peered.valid = false;
        let (data, src_port) = be_u16(data)?;
        let (data, dst_port) = be_u16(data)?;
        let (data, seq) = be_u32(data)?;
        let (data, ack) = be_u32(data)?;
        let (data, doff) = any_u8(data)?;
        let header_len = (doff >> 4) * 4;
        if header_len < 20 {
            return Err(Error::CorruptHeader("TCP data offset below 5 words"));
        }
        let (data, flag_bits) = any_u8(data)?;
        let (data, window) = be_u16(data)?;
        let (data, checksum) = be_u16(data)?;
        let (_, urgent) = be_u16(data)?;
        self.src_port = src_port;
        self.dst_port = dst_port;
        self.seq = seq;
        self.ack = ack;
        self.header_len = header_len;
        self.flags = TcpFlags::from_bits_truncate(flag_bits);
        self.window = window;
        self.checksum = checksum;
        self.urgent = urgent;
        self.peered.valid = true;
        Ok(())
    }

    fn checksum(&self) -> Option<&dyn Checksum> {
        Some(self)
    }
}

impl Checksum for Tcp {
    fn recalculate_checksum(&self, raw: &mut [u8], state: &PacketState) -> Result<(), Error> {
        let start = self.range().start;
        let end = self.segment_end(raw, state);
        if raw.len() < start + 18 || end < start {
            return Err(Error::Peering {
                offset: start,
                length: 18,
                available: raw.len(),
            });
        }
        raw[start + 16..start + 18].copy_from_slice(&[0, 0]);
        let sum = transport_segment_checksum(raw, state, self.index(), start..end, 6)?;
        raw[start + 16..start + 18].copy_from_slice(&sum.to_be_bytes());
        Ok(())
    }

    fn verify_checksum(&self, raw: &[u8], state: &PacketState) -> bool {
        let start = self.range().start;
        let end = self.segment_end(raw, state);
        if end < start {
            return false;
        }
        matches!(
            transport_segment_checksum(raw, state, self.index(), start..end, 6),
            Ok(0)
        )
    }
}
