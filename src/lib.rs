//! Zero-copy decode-state layer for captured network frames.
//!
//! A scan pass walks one raw frame and records every header occurrence —
//! protocol id, offset, length — into a compact [`state::PacketState`]
//! index. Packets expose presence tests, per-instance lookups and view
//! iteration over that index without copying frame bytes; [`flow`] derives
//! direction-normalizable flow keys from it. Reading frames off a wire or
//! file, rendering dumps and protocol work beyond header boundaries all
//! live outside this crate.

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate enum_primitive_derive;
extern crate num_traits;
extern crate serde;

pub static API_VERSION: &str = env!("CARGO_PKG_VERSION");
pub static RUSTC_VERSION: &str = env!("RUSTC_VERSION");

pub mod capture;
pub mod checksum;
pub mod dissect;
pub mod error;
pub mod flow;
pub mod headers;
pub mod packet;
pub mod protocol;
pub mod scanner;
pub mod state;
