//! Big-endian accessors at fixed byte offsets.
//!
//! Every accessor checks bounds and reports `InsufficientData` instead of
//! panicking or truncating.

use super::super::error::{Error, Result};

#[inline]
fn window(buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let end = offset.checked_add(len).ok_or(Error::InsufficientData {
        needed: usize::MAX,
        available: buf.len(),
    })?;
    buf.get(offset..end).ok_or(Error::InsufficientData {
        needed: end,
        available: buf.len(),
    })
}

#[inline]
fn window_mut(buf: &mut [u8], offset: usize, len: usize) -> Result<&mut [u8]> {
    let available = buf.len();
    let end = offset.checked_add(len).ok_or(Error::InsufficientData {
        needed: usize::MAX,
        available,
    })?;
    buf.get_mut(offset..end).ok_or(Error::InsufficientData {
        needed: end,
        available,
    })
}

#[inline]
pub fn get_u8(buf: &[u8], offset: usize) -> Result<u8> {
    Ok(window(buf, offset, 1)?[0])
}

#[inline]
pub fn get_u16(buf: &[u8], offset: usize) -> Result<u16> {
    let w = window(buf, offset, 2)?;
    Ok(u16::from_be_bytes([w[0], w[1]]))
}

#[inline]
pub fn get_i16(buf: &[u8], offset: usize) -> Result<i16> {
    get_u16(buf, offset).map(|v| v as i16)
}

#[inline]
pub fn get_u32(buf: &[u8], offset: usize) -> Result<u32> {
    let w = window(buf, offset, 4)?;
    Ok(u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
}

#[inline]
pub fn get_i32(buf: &[u8], offset: usize) -> Result<i32> {
    get_u32(buf, offset).map(|v| v as i32)
}

#[inline]
pub fn get_f32(buf: &[u8], offset: usize) -> Result<f32> {
    get_u32(buf, offset).map(f32::from_bits)
}

/// Read bit `bit` (0..=7) of the byte at `offset`.
#[inline]
pub fn get_bit(buf: &[u8], offset: usize, bit: u8) -> Result<bool> {
    if bit > 7 {
        return Err(Error::ProtocolViolation {
            context: "bit index above 7",
        });
    }
    Ok(get_u8(buf, offset)? & (1 << bit) != 0)
}

#[inline]
pub fn put_u8(buf: &mut [u8], offset: usize, v: u8) -> Result<()> {
    window_mut(buf, offset, 1)?[0] = v;
    Ok(())
}

#[inline]
pub fn put_u16(buf: &mut [u8], offset: usize, v: u16) -> Result<()> {
    window_mut(buf, offset, 2)?.copy_from_slice(&v.to_be_bytes());
    Ok(())
}

#[inline]
pub fn put_u32(buf: &mut [u8], offset: usize, v: u32) -> Result<()> {
    window_mut(buf, offset, 4)?.copy_from_slice(&v.to_be_bytes());
    Ok(())
}

#[inline]
pub fn put_f32(buf: &mut [u8], offset: usize, v: f32) -> Result<()> {
    put_u32(buf, offset, v.to_bits())
}

/// Copy `src` into `buf` starting at `offset`; fails rather than truncating.
#[inline]
pub fn put_slice(buf: &mut [u8], offset: usize, src: &[u8]) -> Result<()> {
    window_mut(buf, offset, src.len())?.copy_from_slice(src);
    Ok(())
}

/// Encode a 24-bit S7 address (`byte*8 + bit`) as three big-endian bytes.
#[inline]
pub fn encode_u24(v: u32) -> [u8; 3] {
    [(v >> 16) as u8, (v >> 8) as u8, v as u8]
}
