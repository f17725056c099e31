use nom::bytes::complete::take;
use nom::IResult;

use crate::error::Error;
use crate::protocol::Protocol;

pub fn tcp(data: &[u8]) -> IResult<&[u8], (usize, Option<Protocol>), Error> {
    if data.len() < 20 {
        return Err(nom::Err::Error(Error::CorruptHeader(
            "TCP packet shorter than minimum header",
        )));
    }
    let header_len = ((data[12] >> 4) as usize) * 4;
    if header_len < 20 {
        return Err(nom::Err::Error(Error::CorruptHeader(
            "TCP data offset below 5 words",
        )));
    }
    let (remain, _header) = take(header_len)(data)?;
    Ok((remain, (header_len, None)))
}

pub fn udp(data: &[u8]) -> IResult<&[u8], (usize, Option<Protocol>), Error> {
    let (remain, _header) = take(8usize)(data)?;
    Ok((remain, (8, None)))
}

pub fn sctp(data: &[u8]) -> IResult<&[u8], (usize, Option<Protocol>), Error> {
    let (remain, _header) = take(12usize)(data)?;
    Ok((remain, (12, None)))
}
