use nom::number::complete::be_u16;

use crate::error::Error;
use crate::headers::{header_common, Header, Peered};
use crate::protocol::Protocol;

/// 802.1Q tag view. A QinQ frame produces one instance per tag.
#[derive(Clone, Debug, Default)]
pub struct Vlan {
    peered: Peered,
    pub priority: u8,
    pub dei: bool,
    pub vid: u16,
    pub etype: u16,
}

impl Header for Vlan {
    header_common!(Protocol::VLAN);

    fn decode(&mut self, data: &[u8]) -> Result<(), Error> {
        self.peered.valid = false;
        let (data, tci) = be_u16(data)?;
        let (_, etype) = be_u16(data)?;
        self.priority = (tci >> 13) as u8;
        self.dei = tci & 0x1000 != 0;
        self.vid = tci & 0x0fff;
        self.etype = etype;
        self.peered.valid = true;
        Ok(())
    }
}
