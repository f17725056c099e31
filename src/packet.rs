//! The packet composite: one raw buffer, one decoded state, and the query
//! and iteration surface over both.
//!
//! Nothing here copies frame bytes. Header lookups peer a reusable view to
//! a sub-range of the buffer; iteration resolves views through a caller
//! supplied `HeaderPool`. A packet and its pool belong to one execution
//! context; a fully decoded state may be shared read-only.

use crate::capture::CaptureInfo;
use crate::error::Error;
use crate::flow::FlowKey;
use crate::headers::{Header, HeaderPool};
use crate::protocol::{Protocol, ProtocolMask};
use crate::state::PacketState;

pub trait Packet: Send {
    /// Raw frame bytes.
    fn raw(&self) -> &[u8];

    fn raw_mut(&mut self) -> &mut [u8];

    /// The decoded header index for this frame.
    fn state(&self) -> &PacketState;

    fn state_mut(&mut self) -> &mut PacketState;

    /// Capture metadata from the transport collaborator.
    fn capture(&self) -> &CaptureInfo;

    /// Mutable bytes plus read access to the state, for in-place rewrites.
    fn raw_and_state(&mut self) -> (&mut [u8], &PacketState);

    #[inline]
    fn caplen(&self) -> u32 {
        self.capture().caplen
    }

    #[inline]
    fn header_count(&self) -> usize {
        self.state().header_count()
    }

    /// O(1) presence test; never touches the record sequence.
    #[inline]
    fn has_header(&self, protocol: Protocol) -> bool {
        self.state().has_header(protocol)
    }

    #[inline]
    fn has_all_headers(&self, mask: &ProtocolMask) -> bool {
        self.state().has_all_headers(mask)
    }

    #[inline]
    fn has_any_header(&self, mask: &ProtocolMask) -> bool {
        self.state().has_any_header(mask)
    }

    /// Existence check and peer in one step: on a hit the view is peered
    /// to the `instance`-th occurrence of its protocol and decoded.
    ///
    /// `Ok(false)` means the header or instance is absent. A decode
    /// failure still returns `Ok(true)` with the view peered and
    /// `is_valid() == false`. `Err` is reserved for a buffer that no
    /// longer covers the recorded range.
    fn get_header(&self, view: &mut dyn Header, instance: usize) -> Result<bool, Error> {
        let protocol = view.protocol();
        if !self.state().has_header(protocol) {
            return Ok(false);
        }
        let index = match self.state().find_header_index(protocol, instance) {
            Some(index) => index,
            None => return Ok(false),
        };
        self.header_by_index(index, view)?;
        Ok(true)
    }

    /// Peer `view` to the record at `index`. The view's protocol must
    /// match the record's.
    fn header_by_index(&self, index: usize, view: &mut dyn Header) -> Result<(), Error> {
        let record = self.state().record_by_index(index)?;
        if record.protocol != view.protocol() {
            return Err(Error::CorruptHeader("view protocol does not match record"));
        }
        let raw = self.raw();
        if raw.len() < record.end() as usize {
            return Err(Error::Peering {
                offset: record.offset as usize,
                length: record.length as usize,
                available: raw.len(),
            });
        }
        view.peer(&record, index);
        // A failed decode leaves the view peered and flagged invalid.
        let _ = view.decode(&raw[record.range()]);
        Ok(())
    }

    /// The undecoded remainder covered by the trailing PAYLOAD record.
    fn payload(&self) -> &[u8] {
        match self.state().records().last() {
            Some(r) if r.protocol == Protocol::PAYLOAD && self.raw().len() >= r.end() as usize => {
                &self.raw()[r.range()]
            }
            _ => &[],
        }
    }

    /// Flow classification key for this frame; see [`FlowKey::derive`].
    fn flow_key(&self, directional: bool) -> FlowKey {
        FlowKey::derive(self.state(), self.raw(), directional)
    }

    /// Iterate decoded header views in record (offset) order.
    fn headers<'a>(&'a self, pool: &'a mut HeaderPool) -> HeaderIter<'a>
    where
        Self: Sized,
    {
        HeaderIter::new(self, pool)
    }

    /// Recompute and rewrite, in decode order, every checksum the frame's
    /// headers carry. Mutates the buffer in place.
    fn recalculate_all_checksums(&mut self, pool: &mut HeaderPool) -> Result<(), Error> {
        let (raw, state) = self.raw_and_state();
        for index in 0..state.header_count() {
            let record = state.record_by_index(index)?;
            let view = pool.get(record.protocol);
            if view.checksum().is_none() {
                continue;
            }
            if raw.len() < record.end() as usize {
                return Err(Error::Peering {
                    offset: record.offset as usize,
                    length: record.length as usize,
                    available: raw.len(),
                });
            }
            view.peer(&record, index);
            if view.decode(&raw[record.range()]).is_err() {
                continue;
            }
            if let Some(checksum) = view.checksum() {
                checksum.recalculate_checksum(raw, state)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for dyn Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ts = self.capture().ts;
        let stime = std::time::UNIX_EPOCH
            + std::time::Duration::from_nanos(
                ts.tv_sec as u64 * 1_000_000_000 + ts.tv_usec as u64 * 1000,
            );
        let datetime = chrono::DateTime::<chrono::Utc>::from(stime);
        let timestamp_str = datetime.format("%Y-%m-%d %H:%M:%S.%f").to_string();
        f.debug_struct("Packet")
            .field("ts", &timestamp_str)
            .field("caplen", &self.caplen())
            .field("wirelen", &self.state().wirelen())
            .field("frame_number", &self.state().frame_number())
            .field("headers", &self.state().records())
            .finish()
    }
}

/// Forward-only walk over a packet's decoded headers.
///
/// Views are resolved through the pool, so each yielded reference is
/// overwritten by the next step; don't retain it. Restart by constructing
/// a fresh iterator. The optional filter runs on the resolved view before
/// it is peered, so skipped records cost no decode work.
pub struct HeaderIter<'a> {
    packet: &'a dyn Packet,
    pool: &'a mut HeaderPool,
    index: usize,
    filter: Option<fn(&dyn Header) -> bool>,
}

impl<'a> HeaderIter<'a> {
    pub fn new(packet: &'a dyn Packet, pool: &'a mut HeaderPool) -> Self {
        HeaderIter {
            packet,
            pool,
            index: 0,
            filter: None,
        }
    }

    /// Keep only headers whose pooled view satisfies `filter`.
    pub fn filter(mut self, filter: fn(&dyn Header) -> bool) -> Self {
        self.filter = Some(filter);
        self
    }

    /// The next decoded view, or `None` when the records are exhausted.
    pub fn next_header(&mut self) -> Option<&dyn Header> {
        let (record, index) = loop {
            if self.index >= self.packet.header_count() {
                return None;
            }
            let index = self.index;
            self.index += 1;
            let record = self.packet.state().record_by_index(index).ok()?;
            if self.packet.raw().len() < record.end() as usize {
                continue;
            }
            if let Some(filter) = self.filter {
                if !filter(self.pool.get(record.protocol)) {
                    continue;
                }
            }
            break (record, index);
        };
        let view = self.pool.get(record.protocol);
        view.peer(&record, index);
        let _ = view.decode(&self.packet.raw()[record.range()]);
        Some(&*view)
    }
}

fn check_ranges(available: usize, state: &PacketState) -> Result<(), Error> {
    for record in state.records() {
        if record.end() as usize > available {
            return Err(Error::Peering {
                offset: record.offset as usize,
                length: record.length as usize,
                available,
            });
        }
    }
    Ok(())
}

/// A packet that owns its frame bytes.
#[derive(Clone, Debug, Default)]
pub struct OwnedPacket {
    capture: CaptureInfo,
    data: Vec<u8>,
    state: PacketState,
}

impl OwnedPacket {
    pub fn new(data: Vec<u8>, capture: CaptureInfo) -> Self {
        OwnedPacket {
            capture,
            data,
            state: PacketState::new(),
        }
    }
}

impl Packet for OwnedPacket {
    fn raw(&self) -> &[u8] {
        &self.data
    }

    fn raw_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn state(&self) -> &PacketState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PacketState {
        &mut self.state
    }

    fn capture(&self) -> &CaptureInfo {
        &self.capture
    }

    fn raw_and_state(&mut self) -> (&mut [u8], &PacketState) {
        (&mut self.data, &self.state)
    }
}

/// A packet peered over a caller-owned buffer.
///
/// Peering never copies: the packet holds a reference into the buffer, and
/// re-peering is a reference re-assignment. The buffer must outlive the
/// peering; the packet claims it exclusively until the next re-peer.
pub struct PeeredPacket<'a> {
    capture: CaptureInfo,
    data: &'a mut [u8],
    state: PacketState,
}

impl<'a> PeeredPacket<'a> {
    /// Peer over `data` with an already decoded `state`. Fails if any
    /// recorded range falls outside the buffer.
    pub fn peer(
        data: &'a mut [u8],
        state: PacketState,
        capture: CaptureInfo,
    ) -> Result<Self, Error> {
        check_ranges(data.len(), &state)?;
        Ok(PeeredPacket {
            capture,
            data,
            state,
        })
    }

    /// Re-target to a different buffer and state without reallocating.
    /// On failure the packet keeps its previous peering.
    pub fn repeer(
        &mut self,
        data: &'a mut [u8],
        state: PacketState,
        capture: CaptureInfo,
    ) -> Result<(), Error> {
        check_ranges(data.len(), &state)?;
        self.data = data;
        self.state = state;
        self.capture = capture;
        Ok(())
    }
}

impl<'a> Packet for PeeredPacket<'a> {
    fn raw(&self) -> &[u8] {
        self.data
    }

    fn raw_mut(&mut self) -> &mut [u8] {
        self.data
    }

    fn state(&self) -> &PacketState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PacketState {
        &mut self.state
    }

    fn capture(&self) -> &CaptureInfo {
        &self.capture
    }

    fn raw_and_state(&mut self) -> (&mut [u8], &PacketState) {
        (self.data, &self.state)
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use crate::scanner::Scanner;

    /// Ethernet + IPv4 + UDP + 4 payload bytes, checksums valid.
    pub fn udp_frame() -> Vec<u8> {
        vec![
            // ethernet
            0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x08, 0x00,
            // ipv4
            0x45, 0x00, 0x00, 0x20, 0x12, 0x34, 0x40, 0x00, 0x40, 0x11, 0x5c, 0xef, 0xc0, 0xa8,
            0x01, 0x01, 0x0a, 0x00, 0x00, 0x01,
            // udp
            0x13, 0x89, 0x00, 0x35, 0x00, 0x0c, 0x5b, 0xa7,
            // payload
            0x61, 0x62, 0x63, 0x64,
        ]
    }

    /// The mirror of [`udp_frame`]: endpoints swapped, same conversation.
    pub fn udp_frame_mirror() -> Vec<u8> {
        vec![
            0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x08, 0x00,
            0x45, 0x00, 0x00, 0x20, 0x12, 0x34, 0x40, 0x00, 0x40, 0x11, 0x5c, 0xef, 0x0a, 0x00,
            0x00, 0x01, 0xc0, 0xa8, 0x01, 0x01, //
            0x00, 0x35, 0x13, 0x89, 0x00, 0x0c, 0x5b, 0xa7, //
            0x61, 0x62, 0x63, 0x64,
        ]
    }

    /// Ethernet + IPv4 + TCP + 4 payload bytes, checksums valid.
    pub fn tcp_frame() -> Vec<u8> {
        vec![
            0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x08, 0x00,
            0x45, 0x00, 0x00, 0x2c, 0x12, 0x34, 0x40, 0x00, 0x40, 0x06, 0x5c, 0xee, 0xc0, 0xa8,
            0x01, 0x01, 0x0a, 0x00, 0x00, 0x01, //
            0x13, 0x89, 0x00, 0x50, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x50, 0x18,
            0x10, 0x00, 0xfb, 0x7d, 0x00, 0x00, //
            0x61, 0x62, 0x63, 0x64,
        ]
    }

    /// Ethernet + IPv4 + ICMP echo request + 18 payload bytes; matches the
    /// 60-byte layout used throughout the tests.
    pub fn icmp_frame() -> Vec<u8> {
        vec![
            0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x08, 0x00,
            0x45, 0x00, 0x00, 0x2e, 0x12, 0x34, 0x40, 0x00, 0x40, 0x01, 0x5c, 0xf1, 0xc0, 0xa8,
            0x01, 0x01, 0x0a, 0x00, 0x00, 0x01, //
            0x08, 0x00, 0x43, 0x40, 0x00, 0x01, 0x00, 0x01, //
            0x61, 0x62, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0x6a, 0x6b, 0x6c, 0x6d, 0x6e,
            0x6f, 0x70, 0x71, 0x72,
        ]
    }

    /// Ethernet + outer IPv4 (proto 4) + the IPv4/UDP packet of
    /// [`udp_frame`] tunneled inside.
    pub fn ipip_frame() -> Vec<u8> {
        let mut frame = vec![
            0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x08, 0x00,
            0x45, 0x00, 0x00, 0x34, 0x12, 0x34, 0x40, 0x00, 0x40, 0x04, 0x5c, 0xe6, 0xc0, 0xa8,
            0x01, 0x02, 0x0a, 0x00, 0x00, 0x02,
        ];
        frame.extend_from_slice(&udp_frame()[14..]);
        frame
    }

    pub fn capture_for(data: &[u8]) -> CaptureInfo {
        CaptureInfo::new(
            libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
            data.len() as u32,
            data.len() as u32,
        )
    }

    /// An owned packet scanned by a fresh Ethernet scanner.
    pub fn scanned(frame: Vec<u8>) -> OwnedPacket {
        let capture = capture_for(&frame);
        let mut packet = OwnedPacket::new(frame, capture);
        Scanner::default().scan_packet(&mut packet).unwrap();
        packet
    }

    mod tests {
        use super::*;
        use crate::headers::{Ipv4, Tcp, Udp};
        use crate::protocol::ProtocolMask;

        #[test]
        fn get_header_peers_and_decodes() {
            let packet = scanned(udp_frame());
            let mut ip = Ipv4::default();
            assert!(packet.get_header(&mut ip, 0).unwrap());
            assert!(ip.is_valid());
            assert_eq!(ip.range(), 14..34);
            assert_eq!(ip.index(), 1);
            assert_eq!(ip.src, [192, 168, 1, 1]);
            assert_eq!(ip.ip_proto, 17);

            let mut udp = Udp::default();
            assert!(packet.get_header(&mut udp, 0).unwrap());
            assert_eq!(udp.src_port, 5001);
            assert_eq!(udp.dst_port, 53);
        }

        #[test]
        fn absent_header_is_not_an_error() {
            let packet = scanned(udp_frame());
            let mut tcp = Tcp::default();
            assert!(!packet.get_header(&mut tcp, 0).unwrap());
            assert!(!packet.get_header(&mut Udp::default(), 1).unwrap());
        }

        #[test]
        fn tunneled_instance_lookup() {
            let packet = scanned(ipip_frame());
            let mut ip = Ipv4::default();
            assert!(packet.get_header(&mut ip, 1).unwrap());
            assert_eq!(ip.range(), 34..54);
            assert_eq!(ip.src, [192, 168, 1, 1]);
            assert!(packet.get_header(&mut ip, 0).unwrap());
            assert_eq!(ip.range(), 14..34);
            assert_eq!(ip.src, [192, 168, 1, 2]);
            assert!(!packet.get_header(&mut ip, 2).unwrap());
        }

        #[test]
        fn decode_failure_leaves_view_peered() {
            let mut packet = scanned(udp_frame());
            // Break the UDP length field after the scan.
            packet.raw_mut()[38] = 0;
            packet.raw_mut()[39] = 4;
            let mut udp = Udp::default();
            assert!(packet.get_header(&mut udp, 0).unwrap());
            assert!(!udp.is_valid());
            assert_eq!(udp.range(), 34..42);
        }

        #[test]
        fn iteration_yields_record_order() {
            let packet = scanned(icmp_frame());
            let mut pool = HeaderPool::new();
            let mut iter = packet.headers(&mut pool);
            let mut seen = Vec::new();
            while let Some(header) = iter.next_header() {
                seen.push((header.protocol(), header.range()));
                assert!(header.is_valid());
            }
            assert_eq!(
                seen,
                vec![
                    (Protocol::ETHERNET, 0..14),
                    (Protocol::IPV4, 14..34),
                    (Protocol::ICMP, 34..42),
                    (Protocol::PAYLOAD, 42..60),
                ]
            );

            // Round-trip: the yielded ranges are exactly the records.
            for (i, (_, range)) in seen.iter().enumerate() {
                assert_eq!(packet.state().record_by_index(i).unwrap().range(), *range);
            }
        }

        #[test]
        fn iteration_is_restartable() {
            let packet = scanned(udp_frame());
            let mut pool = HeaderPool::new();
            let mut first = 0;
            let mut iter = packet.headers(&mut pool);
            while iter.next_header().is_some() {
                first += 1;
            }
            let mut second = 0;
            let mut iter = packet.headers(&mut pool);
            while iter.next_header().is_some() {
                second += 1;
            }
            assert_eq!(first, 4);
            assert_eq!(second, 4);
        }

        #[test]
        fn filtered_iteration_skips_before_peering() {
            let packet = scanned(tcp_frame());
            let mut pool = HeaderPool::new();
            let mut iter = packet
                .headers(&mut pool)
                .filter(|h| h.checksum().is_some());
            let mut seen = Vec::new();
            while let Some(header) = iter.next_header() {
                seen.push(header.protocol());
            }
            assert_eq!(seen, vec![Protocol::IPV4, Protocol::TCP]);
        }

        #[test]
        fn recalculate_all_checksums_restores_bytes() {
            let original = tcp_frame();
            let mut packet = scanned(original.clone());
            {
                let raw = packet.raw_mut();
                raw[24] = 0; // ip checksum
                raw[25] = 0;
                raw[50] = 0; // tcp checksum
                raw[51] = 0;
            }
            let mut pool = HeaderPool::new();
            packet.recalculate_all_checksums(&mut pool).unwrap();
            assert_eq!(packet.raw(), original.as_slice());
        }

        #[test]
        fn recalculate_udp_frame() {
            let original = udp_frame();
            let mut packet = scanned(original.clone());
            {
                let raw = packet.raw_mut();
                raw[40] = 0xde; // udp checksum
                raw[41] = 0xad;
            }
            let mut pool = HeaderPool::new();
            packet.recalculate_all_checksums(&mut pool).unwrap();
            assert_eq!(packet.raw(), original.as_slice());
        }

        #[test]
        fn peered_packet_round_trip() {
            let scanned_pkt = scanned(udp_frame());
            let state = scanned_pkt.state().clone();
            let mut buffer = udp_frame();
            let capture = capture_for(&buffer);

            let packet = PeeredPacket::peer(&mut buffer, state, capture).unwrap();
            for i in 0..packet.header_count() {
                let record = packet.state().record_by_index(i).unwrap();
                assert_eq!(
                    record,
                    scanned_pkt.state().record_by_index(i).unwrap()
                );
            }
            assert_eq!(packet.payload(), b"abcd");
        }

        #[test]
        fn peering_checks_buffer_bounds() {
            let state = scanned(udp_frame()).state().clone();
            let mut short = vec![0u8; 20];
            let capture = capture_for(&short);
            assert!(matches!(
                PeeredPacket::peer(&mut short, state, capture),
                Err(Error::Peering { available: 20, .. })
            ));
        }

        #[test]
        fn repeer_swaps_targets_without_copy() {
            let udp_state = scanned(udp_frame()).state().clone();
            let icmp_state = scanned(icmp_frame()).state().clone();
            let mut udp_buf = udp_frame();
            let mut icmp_buf = icmp_frame();

            let capture = capture_for(&udp_buf);
            let mut packet = PeeredPacket::peer(&mut udp_buf, udp_state, capture).unwrap();
            assert!(packet.has_header(Protocol::UDP));

            let capture = capture_for(&icmp_buf);
            packet.repeer(&mut icmp_buf, icmp_state, capture).unwrap();
            assert!(packet.has_header(Protocol::ICMP));
            assert!(!packet.has_header(Protocol::UDP));
            assert_eq!(packet.payload().len(), 18);
        }

        #[test]
        fn batch_membership_masks() {
            let packet = scanned(tcp_frame());
            let ip_and_tcp = ProtocolMask::of(&[Protocol::IPV4, Protocol::TCP]);
            let ip_and_udp = ProtocolMask::of(&[Protocol::IPV4, Protocol::UDP]);
            assert!(packet.has_all_headers(&ip_and_tcp));
            assert!(!packet.has_all_headers(&ip_and_udp));
            assert!(packet.has_any_header(&ip_and_udp));
        }

        #[test]
        fn debug_renders_summary() {
            let packet = scanned(udp_frame());
            let rendered = format!("{:?}", &packet as &dyn Packet);
            assert!(rendered.contains("caplen"));
            assert!(rendered.contains("IPV4"));
        }
    }
}
