use nom::bytes::complete::take;
use nom::number::complete::be_u16;
use nom::IResult;

use crate::dissect::{from_etype, from_ip_proto};
use crate::error::Error;
use crate::protocol::Protocol;

pub fn vlan(data: &[u8]) -> IResult<&[u8], (usize, Option<Protocol>), Error> {
    let (remain, header) = take(4usize)(data)?;
    let (_, etype) = be_u16(&header[2..])?;
    Ok((remain, (4, from_etype(etype))))
}

pub fn ipv4(data: &[u8]) -> IResult<&[u8], (usize, Option<Protocol>), Error> {
    if data.len() < 20 {
        return Err(nom::Err::Error(Error::CorruptHeader(
            "IPv4 packet shorter than minimum header",
        )));
    }
    let vhl = data[0];
    if vhl >> 4 != 4 {
        return Err(nom::Err::Error(Error::CorruptHeader("IP version is not 4")));
    }
    let header_len = ((vhl & 0x0f) as usize) * 4;
    if header_len < 20 {
        return Err(nom::Err::Error(Error::CorruptHeader(
            "IPv4 header length below 20",
        )));
    }
    let total_len = u16::from_be_bytes([data[2], data[3]]) as usize;
    if total_len < header_len {
        return Err(nom::Err::Error(Error::CorruptHeader(
            "IPv4 total length below header length",
        )));
    }
    let (remain, header) = take(header_len)(data)?;
    Ok((remain, (header_len, from_ip_proto(header[9]))))
}

pub fn ipv6(data: &[u8]) -> IResult<&[u8], (usize, Option<Protocol>), Error> {
    let (remain, header) = take(40usize)(data)?;
    if header[0] >> 4 != 6 {
        return Err(nom::Err::Error(Error::CorruptHeader("IP version is not 6")));
    }
    Ok((remain, (40, from_ip_proto(header[6]))))
}

pub fn icmp(data: &[u8]) -> IResult<&[u8], (usize, Option<Protocol>), Error> {
    let (remain, _header) = take(8usize)(data)?;
    Ok((remain, (8, None)))
}
