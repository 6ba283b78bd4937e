//! Little-endian stream primitives shared by the binary formats.
//!
//! Vectors are written as a `u64` element count followed by the elements' in-memory bytes, so the
//! format matches the layout of little-endian hosts.

use crate::error::{HdvError, HdvResult};
use bytemuck::Pod;
use std::io::{self, Read, Write};
use std::mem;

pub(crate) fn write_u32<W: Write>(w: &mut W, value: u32) -> HdvResult<()> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub(crate) fn write_u64<W: Write>(w: &mut W, value: u64) -> HdvResult<()> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub(crate) fn read_u32<R: Read>(r: &mut R) -> HdvResult<u32> {
    let mut bytes = [0u8; 4];
    r.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

pub(crate) fn read_u64<R: Read>(r: &mut R) -> HdvResult<u64> {
    let mut bytes = [0u8; 8];
    r.read_exact(&mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}

pub(crate) fn write_vec<W: Write, T: Pod>(w: &mut W, values: &[T]) -> HdvResult<()> {
    write_u64(w, values.len() as u64)?;
    w.write_all(bytemuck::cast_slice(values))?;
    Ok(())
}

/// Reads a length-prefixed vector. The body is read incrementally, so a corrupt length fails
/// with `UnexpectedEof` instead of a huge allocation.
pub(crate) fn read_vec<R: Read, T: Pod>(r: &mut R) -> HdvResult<Vec<T>> {
    let len = read_u64(r)?;
    let width = mem::size_of::<T>() as u64;
    let bytes = len
        .checked_mul(width)
        .ok_or_else(|| HdvError::Format(format!("vector length {} overflows", len)))?;
    let mut raw = Vec::new();
    let read = r.by_ref().take(bytes).read_to_end(&mut raw)?;
    if (read as u64) < bytes {
        return Err(HdvError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {} bytes of vector data, found {}", bytes, read),
        )));
    }
    Ok(raw
        .chunks_exact(width as usize)
        .map(bytemuck::pod_read_unaligned)
        .collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_scalars_are_little_endian() {
        let mut out = Vec::new();
        write_u32(&mut out, 0xffff_ab01).unwrap();
        write_u64(&mut out, 2).unwrap();
        assert_eq!(&out[..4], &[0x01, 0xab, 0xff, 0xff]);
        assert_eq!(&out[4..], &[2, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_vec_layout() {
        let mut out = Vec::new();
        write_vec(&mut out, &[1.5f32, -2.0]).unwrap();
        assert_eq!(out.len(), 8 + 2 * 4);
        let back: Vec<f32> = read_vec(&mut Cursor::new(out)).unwrap();
        assert_eq!(back, vec![1.5, -2.0]);
    }

    #[test]
    fn test_truncated_vec_is_an_io_error() {
        let mut out = Vec::new();
        write_vec(&mut out, &[1u64, 2, 3]).unwrap();
        out.truncate(out.len() - 3);
        let result: HdvResult<Vec<u64>> = read_vec(&mut Cursor::new(out));
        match result {
            Err(HdvError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_absurd_length_does_not_allocate() {
        let mut out = Vec::new();
        write_u64(&mut out, u64::MAX / 16).unwrap();
        let result: HdvResult<Vec<u64>> = read_vec(&mut Cursor::new(out));
        assert!(matches!(result, Err(HdvError::Io(_))));
    }
}
