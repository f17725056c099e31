//! The scan pass: walks one frame's headers and fills a `PacketState`.

use crate::capture::CaptureInfo;
use crate::dissect::{self, Dissect};
use crate::error::Error;
use crate::headers::HeaderPool;
use crate::packet::Packet;
use crate::protocol::{Protocol, MAX_PROTOCOLS};
use crate::state::{PacketState, StateFlags};

/// Per-context scanner. Decode order: the callback for the current
/// protocol consumes one header and names the next, until a layer has no
/// successor; whatever is left becomes the PAYLOAD record.
///
/// Frame numbers are stamped at scan time and are unique within one
/// scanner only. Give each capture thread its own scanner.
pub struct Scanner {
    first: Protocol,
    callbacks: Vec<Option<Dissect>>,
    frames: u64,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(Protocol::ETHERNET)
    }
}

impl Scanner {
    /// A scanner whose frames start with `first` (the capture transport
    /// knows the link type; this layer only needs the first protocol id).
    pub fn new(first: Protocol) -> Self {
        let mut callbacks: Vec<Option<Dissect>> = vec![None; MAX_PROTOCOLS];

        // link layer
        callbacks[Protocol::ETHERNET.id() as usize] = Some(dissect::link::ethernet);
        callbacks[Protocol::ARP.id() as usize] = Some(dissect::link::arp);

        // network layer
        callbacks[Protocol::VLAN.id() as usize] = Some(dissect::network::vlan);
        callbacks[Protocol::IPV4.id() as usize] = Some(dissect::network::ipv4);
        callbacks[Protocol::IPV6.id() as usize] = Some(dissect::network::ipv6);
        callbacks[Protocol::ICMP.id() as usize] = Some(dissect::network::icmp);

        // transport layer
        callbacks[Protocol::TCP.id() as usize] = Some(dissect::transport::tcp);
        callbacks[Protocol::UDP.id() as usize] = Some(dissect::transport::udp);
        callbacks[Protocol::SCTP.id() as usize] = Some(dissect::transport::sctp);

        Scanner {
            first,
            callbacks,
            frames: 0,
        }
    }

    /// Scan one frame into `state`, replacing any previous contents.
    ///
    /// A header that fails to dissect ends the walk at its offset; the
    /// remainder becomes the PAYLOAD record and the scan still succeeds.
    /// Only a `Capacity` failure aborts, leaving the caller to drop the
    /// frame.
    pub fn scan(
        &mut self,
        data: &[u8],
        capture: &CaptureInfo,
        state: &mut PacketState,
    ) -> Result<(), Error> {
        state.reset(0)?;
        state.set_wirelen(capture.wirelen);
        if capture.truncated() {
            state.set_flags(StateFlags::TRUNCATED);
        }
        state.set_frame_number(self.frames);
        self.frames += 1;

        let mut offset = 0usize;
        let mut rest = data;
        let mut proto = Some(self.first);
        while let Some(p) = proto {
            let callback = match self.callbacks[p.id() as usize] {
                Some(callback) => callback,
                None => break,
            };
            match callback(rest) {
                Ok((remain, (length, next))) => {
                    state.append_record(p, offset as u32, length as u32)?;
                    offset += length;
                    rest = remain;
                    proto = next;
                }
                Err(_) => break,
            }
        }
        if offset < data.len() {
            state.append_record(Protocol::PAYLOAD, offset as u32, (data.len() - offset) as u32)?;
        }
        Ok(())
    }

    /// Scan a packet in place, replacing its state.
    pub fn scan_packet(&mut self, packet: &mut dyn Packet) -> Result<(), Error> {
        let capture = *packet.capture();
        let mut state = std::mem::take(packet.state_mut());
        let result = self.scan(packet.raw(), &capture, &mut state);
        *packet.state_mut() = state;
        result
    }
}

/// One execution context's decode machinery: its own scanner and header
/// pool, passed explicitly by the caller. Not shared across threads.
pub struct DecodeContext {
    pub scanner: Scanner,
    pub pool: HeaderPool,
}

impl Default for DecodeContext {
    fn default() -> Self {
        Self::new(Protocol::ETHERNET)
    }
}

impl DecodeContext {
    pub fn new(first: Protocol) -> Self {
        DecodeContext {
            scanner: Scanner::new(first),
            pool: HeaderPool::new(),
        }
    }
}
