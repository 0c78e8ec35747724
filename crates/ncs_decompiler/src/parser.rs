use std::fs::File;
use std::io::Read;
use std::mem::size_of;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};

use crate::error::DecodeError;

pub const SIGNATURE: &[u8; 8] = b"NCS V1.0";
pub const PROGRAM_MARKER: u8 = 0x42;
/// Offset of the first instruction (signature + marker + size field).
pub const CODE_START: usize = 13;

/// A loaded NCS container. All multi-byte fields are big-endian.
#[derive(Debug, Clone)]
pub struct NcsFile {
    buffer: Vec<u8>,
    /// Declared total size; also the end of the code area.
    declared_size: u32,
}

impl NcsFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DecodeError> {
        let mut rdr = File::open(path)?;
        let mut buffer = Vec::new();
        rdr.read_to_end(&mut buffer)?;
        Self::parse(buffer)
    }

    pub fn parse(buffer: Vec<u8>) -> Result<Self, DecodeError> {
        let mut file = NcsFile {
            buffer,
            declared_size: 0,
        };
        file.parse_header()?;
        Ok(file)
    }

    fn parse_header(&mut self) -> Result<(), DecodeError> {
        if self.buffer.len() < CODE_START || &self.buffer[..SIGNATURE.len()] != SIGNATURE {
            return Err(DecodeError::BadSignature);
        }

        let mut off = SIGNATURE.len();
        let marker = self.read_u8(off)?;
        if marker != PROGRAM_MARKER {
            return Err(DecodeError::BadMarker { found: marker });
        }
        off += size_of::<u8>();

        self.declared_size = self.read_u32(off)?;
        if self.declared_size as usize > self.buffer.len() {
            return Err(DecodeError::SizeMismatch {
                declared: self.declared_size,
                len: self.buffer.len(),
            });
        }
        if (self.declared_size as usize) < self.buffer.len() {
            log::warn!(
                "declared size 0x{:X} is smaller than the file (0x{:X}); trailing bytes ignored",
                self.declared_size,
                self.buffer.len()
            );
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// End of the code area (exclusive).
    pub fn code_end(&self) -> usize {
        (self.declared_size as usize).max(CODE_START)
    }

    fn bytes(&self, offset: usize, n: usize) -> Result<&[u8], DecodeError> {
        let end = offset.checked_add(n).filter(|&e| e <= self.code_end());
        match end {
            Some(end) => Ok(&self.buffer[offset..end]),
            None => Err(DecodeError::OutOfBounds {
                offset,
                len: self.code_end(),
            }),
        }
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8, DecodeError> {
        self.buffer
            .get(offset)
            .copied()
            .ok_or(DecodeError::OutOfBounds {
                offset,
                len: self.buffer.len(),
            })
    }

    pub fn read_u16(&self, offset: usize) -> Result<u16, DecodeError> {
        Ok(BigEndian::read_u16(self.bytes(offset, size_of::<u16>())?))
    }

    pub fn read_i16(&self, offset: usize) -> Result<i16, DecodeError> {
        Ok(BigEndian::read_i16(self.bytes(offset, size_of::<i16>())?))
    }

    pub fn read_u32(&self, offset: usize) -> Result<u32, DecodeError> {
        let raw = self.buffer.get(offset..offset + size_of::<u32>()).ok_or(
            DecodeError::OutOfBounds {
                offset,
                len: self.buffer.len(),
            },
        )?;
        Ok(BigEndian::read_u32(raw))
    }

    pub fn read_i32(&self, offset: usize) -> Result<i32, DecodeError> {
        Ok(BigEndian::read_i32(self.bytes(offset, size_of::<i32>())?))
    }

    pub fn read_f32(&self, offset: usize) -> Result<f32, DecodeError> {
        Ok(BigEndian::read_f32(self.bytes(offset, size_of::<f32>())?))
    }

    /// Read `len` raw bytes and decode them as Windows-1252.
    pub fn read_string(&self, offset: usize, len: usize) -> Result<String, DecodeError> {
        let raw = self.bytes(offset, len)?;
        let (s, _, had_err) = encoding_rs::WINDOWS_1252.decode(raw);
        if had_err {
            log::warn!("string decode error at 0x{:X}", offset);
        }
        Ok(s.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_header(code: &[u8]) -> Vec<u8> {
        let mut out = SIGNATURE.to_vec();
        out.push(PROGRAM_MARKER);
        out.extend_from_slice(&((CODE_START + code.len()) as u32).to_be_bytes());
        out.extend_from_slice(code);
        out
    }

    #[test]
    fn reads_big_endian_fields() {
        let file = NcsFile::parse(with_header(&[0x00, 0x2A, 0xFF, 0xFF, 0xFF, 0xFE])).unwrap();
        assert_eq!(file.code_end(), CODE_START + 6);
        assert_eq!(file.read_u16(CODE_START).unwrap(), 42);
        assert_eq!(file.read_i32(CODE_START + 2).unwrap(), -2);
    }

    #[test]
    fn rejects_bad_signature_and_marker() {
        assert!(matches!(
            NcsFile::parse(b"NCS V2.0B\0\0\0\x0D".to_vec()),
            Err(DecodeError::BadSignature)
        ));

        let mut bytes = with_header(&[]);
        bytes[8] = 0x41;
        assert!(matches!(
            NcsFile::parse(bytes),
            Err(DecodeError::BadMarker { found: 0x41 })
        ));
    }

    #[test]
    fn rejects_oversized_declaration() {
        let mut bytes = with_header(&[0x2D, 0x00]);
        bytes[12] = 0xFF;
        assert!(matches!(
            NcsFile::parse(bytes),
            Err(DecodeError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn reads_stop_at_code_end() {
        let mut bytes = with_header(&[0x01]);
        bytes.extend_from_slice(&[0xAA, 0xBB]);
        let file = NcsFile::parse(bytes).unwrap();
        assert!(matches!(
            file.read_u16(CODE_START),
            Err(DecodeError::OutOfBounds { .. })
        ));
    }
}
