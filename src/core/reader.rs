// Positioned little-endian reader over any `io::Read`, used to decode packed fields.
use std::io::{self, Read};

use crate::core::error::{Error, ErrorKind};

/// A forward-only cursor over a binary stream.
///
/// Every successful call advances `position()` by exactly the number of bytes
/// consumed. After an error the position is unspecified and the reader should
/// be discarded.
pub trait BinaryRead {
    fn position(&self) -> u64;
    fn read_u8(&mut self) -> Result<u8, Error>;
    fn read_i16(&mut self) -> Result<i16, Error>;
    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, Error>;
}

#[derive(Debug)]
pub struct FieldReader<R> {
    inner: R,
    position: u64,
}

impl<R: Read> FieldReader<R> {
    pub fn new(inner: R) -> Self {
        Self::at(inner, 0)
    }

    /// Wraps a stream whose first byte lives at `position` within the larger region.
    pub fn at(inner: R, position: u64) -> Self {
        Self { inner, position }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        self.inner
            .read_exact(buf)
            .map_err(|err| read_error(err, buf.len(), self.position))?;
        self.position += buf.len() as u64;
        Ok(())
    }
}

impl<R: Read> BinaryRead for FieldReader<R> {
    fn position(&self) -> u64 {
        self.position
    }

    fn read_u8(&mut self) -> Result<u8, Error> {
        let mut buf = [0u8; 1];
        self.fill(&mut buf)?;
        Ok(buf[0])
    }

    fn read_i16(&mut self) -> Result<i16, Error> {
        let mut buf = [0u8; 2];
        self.fill(&mut buf)?;
        Ok(i16::from_le_bytes(buf))
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0u8; len];
        self.fill(&mut buf)?;
        Ok(buf)
    }
}

fn read_error(err: io::Error, wanted: usize, position: u64) -> Error {
    let kind = match err.kind() {
        io::ErrorKind::UnexpectedEof => ErrorKind::Truncated,
        _ => ErrorKind::Io,
    };
    Error::new(kind)
        .with_message(format!("failed to read {wanted} bytes at stream position {position}"))
        .with_source(err)
}
