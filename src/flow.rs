//! Flow classification keys.
//!
//! A key is a fixed-size byte string identifying the conversation a frame
//! belongs to, fit for use as a hash-map key. Direction-insensitive keys
//! order the two endpoints canonically, so both directions of an exchange
//! produce identical keys; directional keys keep source before
//! destination.

use std::ops::Range;

use serde::{Serialize, Serializer};

use crate::protocol::Protocol;
use crate::state::{HeaderRecord, PacketState};

/// Largest key: kind + protocol + two IPv6 endpoints with ports.
pub const MAX_FLOW_KEY_LEN: usize = 2 + 2 * (16 + 2);

const KIND_NONE: u8 = 0;
const KIND_LINK: u8 = 2;
const KIND_IPV4: u8 = 4;
const KIND_IPV6: u8 = 6;

/// Derived flow key. Compare and hash as a value; equal keys mean the same
/// flow bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FlowKey {
    bytes: [u8; MAX_FLOW_KEY_LEN],
    len: u8,
    directional: bool,
}

impl FlowKey {
    /// Derive the key for a decoded frame.
    ///
    /// Uses the innermost network header (the end-to-end conversation for
    /// tunneled frames) and the transport ports that follow it. Without a
    /// recognized network header the key falls back to the link-layer
    /// address pair; without that, to an empty key. Never fails.
    pub fn derive(state: &PacketState, raw: &[u8], directional: bool) -> FlowKey {
        if state.has_header(Protocol::IPV4) {
            if let Some(key) = ipv4_key(state, raw, directional) {
                return key;
            }
        }
        if state.has_header(Protocol::IPV6) {
            if let Some(key) = ipv6_key(state, raw, directional) {
                return key;
            }
        }
        if state.has_header(Protocol::ETHERNET) {
            if let Some(key) = link_key(state, raw, directional) {
                return key;
            }
        }
        FlowKey::empty(directional)
    }

    fn empty(directional: bool) -> FlowKey {
        let mut key = FlowKey {
            bytes: [0; MAX_FLOW_KEY_LEN],
            len: 2,
            directional,
        };
        key.bytes[0] = KIND_NONE;
        key
    }

    /// The significant bytes of the key.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    #[inline]
    pub fn directional(&self) -> bool {
        self.directional
    }
}

impl Serialize for FlowKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(self.as_bytes())
    }
}

/// Last (innermost) occurrence of a network protocol.
fn innermost(state: &PacketState, protocol: Protocol) -> Option<HeaderRecord> {
    let instance = state.instance_count(protocol).checked_sub(1)?;
    let index = state.find_header_index(protocol, instance)?;
    state.record_by_index(index).ok()
}

/// Ports of the innermost transport header past `after`. TCP, UDP and SCTP
/// all lead with the source and destination port pair.
fn transport_ports(state: &PacketState, raw: &[u8], after: u32) -> ([u8; 2], [u8; 2]) {
    let record = state
        .records()
        .iter()
        .rev()
        .find(|r| {
            r.offset >= after
                && matches!(r.protocol, Protocol::TCP | Protocol::UDP | Protocol::SCTP)
        })
        .copied();
    match record {
        Some(r) if raw.len() >= r.offset as usize + 4 => {
            let off = r.offset as usize;
            ([raw[off], raw[off + 1]], [raw[off + 2], raw[off + 3]])
        }
        _ => ([0; 2], [0; 2]),
    }
}

fn slice(raw: &[u8], range: Range<usize>) -> Option<&[u8]> {
    raw.get(range)
}

/// Assemble `[kind, proto, endpoint, endpoint]`, canonically ordered when
/// the key is direction-insensitive.
fn assemble(kind: u8, proto: u8, src: &[u8], dst: &[u8], directional: bool) -> FlowKey {
    let (first, second) = if !directional && src > dst {
        (dst, src)
    } else {
        (src, dst)
    };
    let mut key = FlowKey {
        bytes: [0; MAX_FLOW_KEY_LEN],
        len: (2 + first.len() + second.len()) as u8,
        directional,
    };
    key.bytes[0] = kind;
    key.bytes[1] = proto;
    key.bytes[2..2 + first.len()].copy_from_slice(first);
    key.bytes[2 + first.len()..2 + first.len() + second.len()].copy_from_slice(second);
    key
}

fn ipv4_key(state: &PacketState, raw: &[u8], directional: bool) -> Option<FlowKey> {
    let ip = innermost(state, Protocol::IPV4)?;
    let off = ip.offset as usize;
    let header = slice(raw, off..off + 20)?;
    let proto = header[9];
    let (src_port, dst_port) = transport_ports(state, raw, ip.offset);

    let mut src = [0u8; 6];
    src[..4].copy_from_slice(&header[12..16]);
    src[4..].copy_from_slice(&src_port);
    let mut dst = [0u8; 6];
    dst[..4].copy_from_slice(&header[16..20]);
    dst[4..].copy_from_slice(&dst_port);

    Some(assemble(KIND_IPV4, proto, &src, &dst, directional))
}

fn ipv6_key(state: &PacketState, raw: &[u8], directional: bool) -> Option<FlowKey> {
    let ip = innermost(state, Protocol::IPV6)?;
    let off = ip.offset as usize;
    let header = slice(raw, off..off + 40)?;
    let proto = header[6];
    let (src_port, dst_port) = transport_ports(state, raw, ip.offset);

    let mut src = [0u8; 18];
    src[..16].copy_from_slice(&header[8..24]);
    src[16..].copy_from_slice(&src_port);
    let mut dst = [0u8; 18];
    dst[..16].copy_from_slice(&header[24..40]);
    dst[16..].copy_from_slice(&dst_port);

    Some(assemble(KIND_IPV6, proto, &src, &dst, directional))
}

fn link_key(state: &PacketState, raw: &[u8], directional: bool) -> Option<FlowKey> {
    let index = state.find_header_index(Protocol::ETHERNET, 0)?;
    let eth = state.record_by_index(index).ok()?;
    let off = eth.offset as usize;
    let header = slice(raw, off..off + 14)?;
    // Destination first on the wire; the key keeps src/dst order.
    Some(assemble(
        KIND_LINK,
        0,
        &header[6..12],
        &header[..6],
        directional,
    ))
}
