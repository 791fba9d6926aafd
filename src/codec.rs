use std::io::{self, Read, Write};
use std::{error, fmt};

#[derive(Debug)]
pub enum Error {
    UnexpectedEof,
    OverlongVarint,
    InvalidUtf8,
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => f.write_str("unexpected end of stream"),
            Self::OverlongVarint => f.write_str("overlong varint"),
            Self::InvalidUtf8 => f.write_str("invalid utf-8"),
            Self::Io(err) => err.fmt(f),
        }
    }
}

impl error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::UnexpectedEof
        } else {
            Self::Io(err)
        }
    }
}

/// A ULEB128 value occupies at most this many bytes.
const MAX_VARINT_LEN: usize = 10;

/// Forward-only reader of BLT primitives.
///
/// All fixed-width values are little-endian. Varints are unsigned LEB128:
/// 7 bits per byte, low group first, top bit set while more groups follow.
#[derive(Debug)]
pub struct ByteReader<R> {
    inner: R,
}

impl<R: Read> ByteReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        let mut buf = [0u8; 1];
        self.inner.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        self.inner.read_exact(buf)?;
        Ok(())
    }

    pub fn read_uleb128(&mut self) -> Result<u64, Error> {
        let mut res = 0u64;
        let mut shift = 0u32;
        for _ in 0..MAX_VARINT_LEN {
            let byte = self.read_u8()?;
            let group = u64::from(byte & 0x7f);
            // The tenth byte may only contribute the last value bit.
            if shift == 63 && group > 1 {
                return Err(Error::OverlongVarint);
            }
            res |= group << shift;
            if byte & 0x80 == 0 {
                return Ok(res);
            }
            shift += 7;
        }
        Err(Error::OverlongVarint)
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        let mut buf = [0u8; 2];
        self.inner.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_u64(&mut self) -> Result<u64, Error> {
        let mut buf = [0u8; 8];
        self.inner.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_i8(&mut self) -> Result<i8, Error> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_i16(&mut self) -> Result<i16, Error> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_i64(&mut self) -> Result<i64, Error> {
        Ok(self.read_u64()? as i64)
    }

    pub fn read_f32(&mut self) -> Result<f32, Error> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, Error> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Length-prefixed byte array: `ULEB128(len)` then `len` raw bytes.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, Error> {
        let len = self.read_uleb128()? as usize;
        let mut buf = Vec::new();
        let n = (&mut self.inner).take(len as u64).read_to_end(&mut buf)?;
        if n < len {
            return Err(Error::UnexpectedEof);
        }
        Ok(buf)
    }

    /// Length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, Error> {
        String::from_utf8(self.read_bytes()?).map_err(|_| Error::InvalidUtf8)
    }
}

/// Forward-only writer of BLT primitives, mirroring [`ByteReader`].
#[derive(Debug)]
pub struct ByteWriter<W> {
    inner: W,
}

impl<W: Write> ByteWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), Error> {
        self.inner.write_all(&[value])?;
        Ok(())
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.inner.write_all(bytes)?;
        Ok(())
    }

    pub fn write_uleb128(&mut self, mut value: u64) -> Result<(), Error> {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                return self.write_u8(byte);
            }
            self.write_u8(byte | 0x80)?;
        }
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), Error> {
        self.write_all(&value.to_le_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), Error> {
        self.write_all(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), Error> {
        self.write_all(&value.to_le_bytes())
    }

    pub fn write_i8(&mut self, value: i8) -> Result<(), Error> {
        self.write_u8(value as u8)
    }

    pub fn write_i16(&mut self, value: i16) -> Result<(), Error> {
        self.write_u16(value as u16)
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), Error> {
        self.write_u32(value as u32)
    }

    pub fn write_i64(&mut self, value: i64) -> Result<(), Error> {
        self.write_u64(value as u64)
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), Error> {
        self.write_u32(value.to_bits())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<(), Error> {
        self.write_u64(value.to_bits())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.write_uleb128(bytes.len() as u64)?;
        self.write_all(bytes)
    }

    pub fn write_str(&mut self, s: &str) -> Result<(), Error> {
        self.write_bytes(s.as_bytes())
    }
}

#[test]
fn test_uleb128_boundaries() {
    for value in [0u64, 127, 128, 16383, 16384, (1 << 32) - 1, u64::MAX] {
        let mut out = Vec::new();
        ByteWriter::new(&mut out).write_uleb128(value).unwrap();
        let decoded = ByteReader::new(&out[..]).read_uleb128().unwrap();
        assert_eq!(value, decoded, "bytes: {out:02x?}");
    }
    let mut out = Vec::new();
    ByteWriter::new(&mut out).write_uleb128(127).unwrap();
    assert_eq!(out, [0x7f]);
    let mut out = Vec::new();
    ByteWriter::new(&mut out).write_uleb128(128).unwrap();
    assert_eq!(out, [0x80, 0x01]);
    let mut out = Vec::new();
    ByteWriter::new(&mut out).write_uleb128(16384).unwrap();
    assert_eq!(out, [0x80, 0x80, 0x01]);
}

#[test]
fn test_uleb128_malformed() {
    // Continuation bit set on every byte, no terminator.
    let endless = [0x80u8; 11];
    assert!(matches!(
        ByteReader::new(&endless[..]).read_uleb128(),
        Err(Error::OverlongVarint)
    ));
    // Tenth byte would overflow 64 bits.
    let mut wide = [0xffu8; 10];
    wide[9] = 0x02;
    assert!(matches!(
        ByteReader::new(&wide[..]).read_uleb128(),
        Err(Error::OverlongVarint)
    ));
    // Truncated mid-varint.
    let cut = [0x80u8, 0x80];
    assert!(matches!(
        ByteReader::new(&cut[..]).read_uleb128(),
        Err(Error::UnexpectedEof)
    ));
}

#[test]
fn test_fixed_width_roundtrip() {
    let mut out = Vec::new();
    let mut w = ByteWriter::new(&mut out);
    w.write_i8(-5).unwrap();
    w.write_i16(-300).unwrap();
    w.write_i32(i32::MIN).unwrap();
    w.write_i64(i64::MAX).unwrap();
    w.write_f32(f32::NAN).unwrap();
    w.write_f64(-0.0).unwrap();
    w.write_u16(0xfeed).unwrap();
    w.write_str("héllo").unwrap();
    w.write_bytes(&[]).unwrap();

    let mut r = ByteReader::new(&out[..]);
    assert_eq!(r.read_i8().unwrap(), -5);
    assert_eq!(r.read_i16().unwrap(), -300);
    assert_eq!(r.read_i32().unwrap(), i32::MIN);
    assert_eq!(r.read_i64().unwrap(), i64::MAX);
    assert_eq!(r.read_f32().unwrap().to_bits(), f32::NAN.to_bits());
    assert_eq!(r.read_f64().unwrap().to_bits(), (-0.0f64).to_bits());
    assert_eq!(r.read_u16().unwrap(), 0xfeed);
    assert_eq!(r.read_string().unwrap(), "héllo");
    assert_eq!(r.read_bytes().unwrap(), Vec::<u8>::new());
    assert!(matches!(r.read_u8(), Err(Error::UnexpectedEof)));
}

#[test]
fn test_truncated_bytes() {
    // Declares 4 bytes, supplies 2.
    let data = [0x04u8, 0xaa, 0xbb];
    assert!(matches!(
        ByteReader::new(&data[..]).read_bytes(),
        Err(Error::UnexpectedEof)
    ));
}
