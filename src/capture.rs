//! Metadata handed over by the capture transport alongside each frame.

use std::ops::{Deref, DerefMut};

use libc::timeval;
use serde::{Serialize, Serializer};

/// Wrapper type for libc::timeval.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct TimeVal(pub timeval);

impl TimeVal {
    pub fn new(tv: timeval) -> Self {
        TimeVal(tv)
    }

    /// Milliseconds since the epoch.
    #[inline]
    pub fn millis(&self) -> u64 {
        self.0.tv_sec as u64 * 1000 + self.0.tv_usec as u64 / 1000
    }
}

impl Default for TimeVal {
    fn default() -> Self {
        TimeVal(timeval {
            tv_sec: 0,
            tv_usec: 0,
        })
    }
}

impl Serialize for TimeVal {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.millis())
    }
}

impl Deref for TimeVal {
    type Target = timeval;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for TimeVal {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl std::fmt::Debug for TimeVal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.millis())
    }
}

/// Per-frame capture metadata from the transport collaborator.
///
/// `wirelen` is the length seen on the wire and may exceed `caplen` when
/// the capture was truncated at the snap length.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct CaptureInfo {
    pub ts: TimeVal,
    pub caplen: u32,
    pub wirelen: u32,
}

impl CaptureInfo {
    pub fn new(ts: timeval, caplen: u32, wirelen: u32) -> Self {
        CaptureInfo {
            ts: TimeVal::new(ts),
            caplen,
            wirelen,
        }
    }

    #[inline]
    pub fn truncated(&self) -> bool {
        self.caplen < self.wirelen
    }
}
