//! Decoded packet state: the index the scan pass builds and everything else
//! reads.
//!
//! The state keeps presence and location separate. Presence is a grouped
//! bitmap (one bit per protocol id) so the hot-path `has_header` test never
//! touches the record sequence; location is an ordered run of fixed-layout
//! records, one per header occurrence. Both are written together in
//! `append_record`, never derived from one another lazily.

use std::ops::Range;

use serde::ser::{Serialize, SerializeStruct, Serializer};
use tinyvec::TinyVec;

use crate::error::Error;
use crate::protocol::{Protocol, ProtocolMask, GROUP_COUNT, MAX_PROTOCOLS};

/// Record capacity a state starts with before spilling to the heap.
pub const DEFAULT_HEADER_CAPACITY: usize = 20;

/// One decoded header occurrence: protocol id plus the byte range it covers
/// inside the frame buffer. Written once by the scan pass, immutable after.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct HeaderRecord {
    pub protocol: Protocol,
    pub offset: u32,
    pub length: u32,
}

impl HeaderRecord {
    #[inline]
    pub fn end(&self) -> u32 {
        self.offset + self.length
    }

    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.offset as usize..self.end() as usize
    }
}

bitflags! {
    /// Global per-frame flags.
    pub struct StateFlags: u32 {
        /// The captured data is shorter than the packet seen on the wire.
        const TRUNCATED = 0b0000_0001;
    }
}

impl Default for StateFlags {
    fn default() -> Self {
        StateFlags::empty()
    }
}

/// Index of all header occurrences inside one captured frame.
///
/// Built once per frame by the scan pass, read many times. Mutated only by
/// the scan pass; a rescan fully replaces the contents. A fully decoded
/// state is safe to share read-only across threads.
#[derive(Clone, Debug)]
pub struct PacketState {
    header_map: [u64; GROUP_COUNT],
    instance_counts: [u8; MAX_PROTOCOLS],
    records: TinyVec<[HeaderRecord; DEFAULT_HEADER_CAPACITY]>,
    max_headers: usize,
    wirelen: u32,
    flags: StateFlags,
    frame_number: u64,
}

impl Default for PacketState {
    fn default() -> Self {
        Self::with_max_headers(DEFAULT_HEADER_CAPACITY)
    }
}

impl PacketState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A state that refuses to index more than `limit` headers per frame.
    pub fn with_max_headers(limit: usize) -> Self {
        PacketState {
            header_map: [0; GROUP_COUNT],
            instance_counts: [0; MAX_PROTOCOLS],
            records: TinyVec::default(),
            max_headers: limit,
            wirelen: 0,
            flags: StateFlags::empty(),
            frame_number: 0,
        }
    }

    /// Clear bitmap, counts and records for the next frame.
    ///
    /// `capacity_hint` is the number of records the caller expects to
    /// append; fails if the hint exceeds this state's record limit. Heap
    /// capacity from an earlier spill is kept.
    pub fn reset(&mut self, capacity_hint: usize) -> Result<(), Error> {
        if capacity_hint > self.max_headers {
            return Err(Error::Capacity {
                requested: capacity_hint,
                limit: self.max_headers,
            });
        }
        self.header_map = [0; GROUP_COUNT];
        self.instance_counts = [0; MAX_PROTOCOLS];
        self.records.clear();
        if capacity_hint > self.records.capacity() {
            self.records.reserve(capacity_hint);
        }
        self.wirelen = 0;
        self.flags = StateFlags::empty();
        Ok(())
    }

    /// Append one header occurrence.
    ///
    /// Must be called in increasing-offset order (decode order). The order
    /// is a documented precondition, not a runtime check; violating it
    /// leaves index-based lookups undefined.
    pub fn append_record(
        &mut self,
        protocol: Protocol,
        offset: u32,
        length: u32,
    ) -> Result<(), Error> {
        if self.records.len() == self.max_headers {
            return Err(Error::Capacity {
                requested: self.records.len() + 1,
                limit: self.max_headers,
            });
        }
        self.records.push(HeaderRecord {
            protocol,
            offset,
            length,
        });
        self.header_map[protocol.group()] |= protocol.bit();
        let count = &mut self.instance_counts[protocol.id() as usize];
        *count = count.saturating_add(1);
        Ok(())
    }

    #[inline]
    pub fn header_count(&self) -> usize {
        self.records.len()
    }

    /// O(1) presence test against the grouped bitmap.
    #[inline]
    pub fn has_header(&self, protocol: Protocol) -> bool {
        self.header_map[protocol.group()] & protocol.bit() != 0
    }

    /// True iff every protocol in the mask is present.
    #[inline]
    pub fn has_all_headers(&self, mask: &ProtocolMask) -> bool {
        self.header_map
            .iter()
            .zip(mask.groups().iter())
            .all(|(map, m)| map & m == *m)
    }

    /// True iff at least one protocol in the mask is present.
    #[inline]
    pub fn has_any_header(&self, mask: &ProtocolMask) -> bool {
        self.header_map
            .iter()
            .zip(mask.groups().iter())
            .any(|(map, m)| map & m != 0)
    }

    /// How many occurrences of `protocol` the frame holds.
    #[inline]
    pub fn instance_count(&self, protocol: Protocol) -> usize {
        self.instance_counts[protocol.id() as usize] as usize
    }

    /// Sequence position of the `instance`-th (0-based) occurrence of
    /// `protocol`, or `None` if that instance does not exist.
    pub fn find_header_index(&self, protocol: Protocol, instance: usize) -> Option<usize> {
        if !self.has_header(protocol) || instance >= self.instance_count(protocol) {
            return None;
        }
        let mut seen = 0;
        for (index, record) in self.records.iter().enumerate() {
            if record.protocol == protocol {
                if seen == instance {
                    return Some(index);
                }
                seen += 1;
            }
        }
        None
    }

    pub fn record_by_index(&self, index: usize) -> Result<HeaderRecord, Error> {
        self.records.get(index).copied().ok_or(Error::IndexOutOfRange {
            index,
            count: self.records.len(),
        })
    }

    #[inline]
    pub fn records(&self) -> &[HeaderRecord] {
        &self.records
    }

    /// Smallest buffer length that covers every recorded range.
    pub fn bytes_required(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.end() as usize)
            .max()
            .unwrap_or(0)
    }

    #[inline]
    pub fn wirelen(&self) -> u32 {
        self.wirelen
    }

    pub fn set_wirelen(&mut self, wirelen: u32) {
        self.wirelen = wirelen;
    }

    #[inline]
    pub fn flags(&self) -> StateFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: StateFlags) {
        self.flags = flags;
    }

    /// Frame number stamped by the scanner; unique within one scanner only.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn set_frame_number(&mut self, frame_number: u64) {
        self.frame_number = frame_number;
    }
}

impl Serialize for PacketState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("PacketState", 5)?;
        state.serialize_field("frame_number", &self.frame_number)?;
        state.serialize_field("wirelen", &self.wirelen)?;
        state.serialize_field("flags", &self.flags.bits())?;
        state.serialize_field("header_count", &self.records.len())?;
        state.serialize_field("records", &self.records[..])?;
        state.end()
    }
}
