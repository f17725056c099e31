use crate::error::Error;
use crate::headers::{header_common, Header, Peered};
use crate::protocol::Protocol;

/// The sentinel view over a frame's undecoded remainder.
#[derive(Clone, Debug, Default)]
pub struct Payload {
    peered: Peered,
}

impl Header for Payload {
    header_common!(Protocol::PAYLOAD);

    fn decode(&mut self, _data: &[u8]) -> Result<(), Error> {
        self.peered.valid = true;
        Ok(())
    }
}
