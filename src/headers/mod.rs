//! Protocol header views.
//!
//! A view is a reusable object peered to one header occurrence: it holds
//! the record's byte range and index, never the bytes themselves. Peering
//! is a cheap re-assignment; the decode hook then parses the referenced
//! bytes into the view's fields. A view is invalidated by the next peer of
//! the same pool entry and by any release or rescan of the underlying
//! buffer.

use std::ops::Range;

use crate::error::Error;
use crate::protocol::{Protocol, MAX_PROTOCOLS};
use crate::state::{HeaderRecord, PacketState};

pub mod ethernet;
pub mod icmp;
pub mod ipv4;
pub mod ipv6;
pub mod payload;
pub mod tcp;
pub mod udp;
pub mod vlan;

pub use ethernet::Ethernet;
pub use icmp::Icmp;
pub use ipv4::Ipv4;
pub use ipv6::Ipv6;
pub use payload::Payload;
pub use tcp::Tcp;
pub use udp::Udp;
pub use vlan::Vlan;

/// Where a view currently points: record range, record index, and whether
/// the decode hook accepted the bytes.
#[derive(Clone, Debug, Default)]
pub struct Peered {
    pub(crate) range: Range<usize>,
    pub(crate) index: usize,
    pub(crate) valid: bool,
}

/// A decoded header view over a sub-range of a packet buffer.
pub trait Header {
    fn protocol(&self) -> Protocol;

    /// Byte range this view is peered to within the frame buffer.
    fn range(&self) -> Range<usize>;

    /// Record index within the packet state.
    fn index(&self) -> usize;

    /// False until decode succeeds, and after a failed decode.
    fn is_valid(&self) -> bool;

    /// Re-target the view to a record. No bytes are touched.
    fn peer(&mut self, record: &HeaderRecord, index: usize);

    /// Parse the peered bytes (`data` is exactly the peered range) into the
    /// view's fields. On failure the view stays peered and reports
    /// `is_valid() == false`.
    fn decode(&mut self, data: &[u8]) -> Result<(), Error>;

    /// The checksum capability, for views that carry one.
    fn checksum(&self) -> Option<&dyn Checksum> {
        None
    }
}

/// Capability of headers that carry an Internet checksum.
pub trait Checksum {
    /// Recompute the checksum over the current buffer bytes and write it
    /// back in place. The view must be peered and decoded first.
    fn recalculate_checksum(&self, raw: &mut [u8], state: &PacketState) -> Result<(), Error>;

    /// True iff the checksum stored in the buffer matches the bytes.
    fn verify_checksum(&self, raw: &[u8], state: &PacketState) -> bool;
}

macro_rules! header_common {
    ($protocol:expr) => {
        fn protocol(&self) -> crate::protocol::Protocol {
            $protocol
        }

        fn range(&self) -> std::ops::Range<usize> {
            self.peered.range.clone()
        }

        fn index(&self) -> usize {
            self.peered.index
        }

        fn is_valid(&self) -> bool {
            self.peered.valid
        }

        fn peer(&mut self, record: &crate::state::HeaderRecord, index: usize) {
            self.peered = crate::headers::Peered {
                range: record.range(),
                index,
                valid: false,
            };
        }
    };
}
pub(crate) use header_common;

/// Fallback view for protocols without a dedicated decoder. Peers like any
/// other view; decode accepts any bytes.
#[derive(Clone, Debug)]
pub struct Undecoded {
    protocol: Protocol,
    peered: Peered,
}

impl Undecoded {
    pub fn new(protocol: Protocol) -> Self {
        Undecoded {
            protocol,
            peered: Peered::default(),
        }
    }
}

impl Header for Undecoded {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn range(&self) -> Range<usize> {
        self.peered.range.clone()
    }

    fn index(&self) -> usize {
        self.peered.index
    }

    fn is_valid(&self) -> bool {
        self.peered.valid
    }

    fn peer(&mut self, record: &HeaderRecord, index: usize) {
        self.peered = Peered {
            range: record.range(),
            index,
            valid: false,
        };
    }

    fn decode(&mut self, _data: &[u8]) -> Result<(), Error> {
        self.peered.valid = true;
        Ok(())
    }
}

/// Reusable, lazily filled cache of one view per protocol id.
///
/// Returned views are overwritten by the next request for the same id, so
/// they must not be retained beyond the current operation. The pool holds
/// plain trait objects and is confined to one execution context; give each
/// decode thread its own pool.
pub struct HeaderPool {
    cache: Vec<Option<Box<dyn Header>>>,
}

impl Default for HeaderPool {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderPool {
    pub fn new() -> Self {
        let mut cache = Vec::with_capacity(MAX_PROTOCOLS);
        cache.resize_with(MAX_PROTOCOLS, || None);
        HeaderPool { cache }
    }

    /// The cached view for `protocol`, created on first request.
    pub fn get(&mut self, protocol: Protocol) -> &mut dyn Header {
        self.cache[protocol.id() as usize]
            .get_or_insert_with(|| new_view(protocol))
            .as_mut()
    }
}

fn new_view(protocol: Protocol) -> Box<dyn Header> {
    match protocol {
        Protocol::ETHERNET => Box::new(Ethernet::default()),
        Protocol::VLAN => Box::new(Vlan::default()),
        Protocol::IPV4 => Box::new(Ipv4::default()),
        Protocol::IPV6 => Box::new(Ipv6::default()),
        Protocol::ICMP => Box::new(Icmp::default()),
        Protocol::TCP => Box::new(Tcp::default()),
        Protocol::UDP => Box::new(Udp::default()),
        Protocol::PAYLOAD => Box::new(Payload::default()),
        other => Box::new(Undecoded::new(other)),
    }
}

/// The nearest network-layer record enclosing the record at `index`.
pub(crate) fn enclosing_network(state: &PacketState, index: usize) -> Option<HeaderRecord> {
    state.records()[..index]
        .iter()
        .rev()
        .find(|r| matches!(r.protocol, Protocol::IPV4 | Protocol::IPV6))
        .copied()
}

/// End offset of the IP packet enclosing `ip`, per its own length field,
/// clamped to the captured bytes.
pub(crate) fn ip_payload_end(raw: &[u8], ip: &HeaderRecord) -> usize {
    let off = ip.offset as usize;
    let end = match ip.protocol {
        Protocol::IPV4 if raw.len() >= off + 4 => {
            off + u16::from_be_bytes([raw[off + 2], raw[off + 3]]) as usize
        }
        Protocol::IPV6 if raw.len() >= off + 6 => {
            off + 40 + u16::from_be_bytes([raw[off + 4], raw[off + 5]]) as usize
        }
        _ => raw.len(),
    };
    end.min(raw.len())
}

/// Source and destination addresses of an IPv4 header at `off`.
pub(crate) fn ipv4_addrs(raw: &[u8], off: usize) -> Result<([u8; 4], [u8; 4]), Error> {
    if raw.len() < off + 20 {
        return Err(Error::CorruptHeader("IPv4 header exceeds buffer"));
    }
    let mut src = [0u8; 4];
    let mut dst = [0u8; 4];
    src.copy_from_slice(&raw[off + 12..off + 16]);
    dst.copy_from_slice(&raw[off + 16..off + 20]);
    Ok((src, dst))
}

/// Source and destination addresses of an IPv6 header at `off`.
pub(crate) fn ipv6_addrs(raw: &[u8], off: usize) -> Result<([u8; 16], [u8; 16]), Error> {
    if raw.len() < off + 40 {
        return Err(Error::CorruptHeader("IPv6 header exceeds buffer"));
    }
    let mut src = [0u8; 16];
    let mut dst = [0u8; 16];
    src.copy_from_slice(&raw[off + 8..off + 24]);
    dst.copy_from_slice(&raw[off + 24..off + 40]);
    Ok((src, dst))
}

/// Pseudo-header checksum of the transport segment at `seg`, using the
/// network header that encloses record `index` for the addresses.
pub(crate) fn transport_segment_checksum(
    raw: &[u8],
    state: &PacketState,
    index: usize,
    seg: Range<usize>,
    ip_proto: u8,
) -> Result<u16, Error> {
    let ip = enclosing_network(state, index)
        .ok_or(Error::CorruptHeader("transport header outside any IP packet"))?;
    let segment = raw
        .get(seg.clone())
        .ok_or(Error::Peering {
            offset: seg.start,
            length: seg.end.saturating_sub(seg.start),
            available: raw.len(),
        })?;
    match ip.protocol {
        Protocol::IPV6 => {
            let (src, dst) = ipv6_addrs(raw, ip.offset as usize)?;
            Ok(crate::checksum::transport_checksum_v6(src, dst, ip_proto, segment))
        }
        _ => {
            let (src, dst) = ipv4_addrs(raw, ip.offset as usize)?;
            Ok(crate::checksum::transport_checksum(src, dst, ip_proto, segment))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_reuses_instances() {
        let mut pool = HeaderPool::new();
        let record = HeaderRecord {
            protocol: Protocol::TCP,
            offset: 34,
            length: 20,
        };
        pool.get(Protocol::TCP).peer(&record, 2);
        // The same instance comes back, still peered from the last use.
        let view = pool.get(Protocol::TCP);
        assert_eq!(view.range(), 34..54);
        assert_eq!(view.index(), 2);
        assert_eq!(view.protocol(), Protocol::TCP);
    }

    #[test]
    fn undecoded_fallback() {
        let mut pool = HeaderPool::new();
        let view = pool.get(Protocol::ESP);
        assert_eq!(view.protocol(), Protocol::ESP);
        assert!(view.decode(&[0u8; 8]).is_ok());
        assert!(view.is_valid());
    }

    #[test]
    fn enclosing_network_picks_nearest() {
        let mut state = PacketState::new();
        state.append_record(Protocol::ETHERNET, 0, 14).unwrap();
        state.append_record(Protocol::IPV4, 14, 20).unwrap();
        state.append_record(Protocol::IPV4, 34, 20).unwrap();
        state.append_record(Protocol::UDP, 54, 8).unwrap();
        let ip = enclosing_network(&state, 3).unwrap();
        assert_eq!(ip.offset, 34);
        assert!(enclosing_network(&state, 1).is_none());
    }
}
