use nom::bytes::complete::take;
use nom::number::complete::be_u16;
use nom::IResult;

use crate::dissect::from_etype;
use crate::error::Error;
use crate::protocol::Protocol;

pub fn ethernet(data: &[u8]) -> IResult<&[u8], (usize, Option<Protocol>), Error> {
    let (remain, header) = take(14usize)(data)?;
    let (_, etype) = be_u16(&header[12..])?;
    Ok((remain, (14, from_etype(etype))))
}

pub fn arp(data: &[u8]) -> IResult<&[u8], (usize, Option<Protocol>), Error> {
    let (remain, _header) = take(28usize)(data)?;
    Ok((remain, (28, None)))
}
