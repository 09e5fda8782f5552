//! Leaf chunk payloads: `[version: 3][crc32: 4][body]`, body little endian.

use super::{riff::ChunkID, LoadError, Version};
use crate::id::StableID;
use crate::raster::{CanvasSize, Mask, Point, Rect};
use az::CheckedAs;
use std::io::{Error as IOError, ErrorKind as IOErrorKind};

const CRC32: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);
const HEADER_LEN: usize = std::mem::size_of::<Version>() + std::mem::size_of::<u32>();

#[derive(Default)]
pub(super) struct Encoder(Vec<u8>);
impl Encoder {
    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.0.push(v);
        self
    }
    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    pub fn f64(&mut self, v: f64) -> &mut Self {
        self.u64(v.to_bits())
    }
    /// Length prefix for a following run of items.
    pub fn len(&mut self, len: usize) -> std::io::Result<&mut Self> {
        let len: u32 = len
            .checked_as()
            .ok_or_else(|| IOError::other(anyhow::anyhow!("too many entries")))?;
        Ok(self.u32(len))
    }
    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.0.extend_from_slice(v);
        self
    }
    pub fn id<T: std::any::Any>(&mut self, id: StableID<T>) -> &mut Self {
        self.bytes(&id.to_bytes())
    }
    pub fn points(&mut self, points: &[Point]) -> std::io::Result<&mut Self> {
        self.len(points.len())?;
        for [x, y] in points {
            self.bytes(&x.to_le_bytes()).bytes(&y.to_le_bytes());
        }
        Ok(self)
    }
    pub fn mask(&mut self, mask: &Mask) -> std::io::Result<&mut Self> {
        let canvas = mask.canvas();
        self.u32(canvas.width).u32(canvas.height);
        match mask.bounds() {
            None => self.u8(0),
            Some(bounds) => {
                let (min_x, min_y, max_x, max_y) = bounds.as_tuple();
                self.u8(1).u32(min_x).u32(min_y).u32(max_x).u32(max_y)
            }
        };
        let packed = mask.to_packed_bytes();
        self.len(packed.len())?;
        Ok(self.bytes(&packed))
    }
    /// Wrap the body with the version and checksum header.
    pub fn finish(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.0.len());
        out.extend_from_slice(bytemuck::bytes_of(&Version::CURRENT));
        out.extend_from_slice(&CRC32.checksum(&self.0).to_le_bytes());
        out.extend_from_slice(&self.0);
        out
    }
}

pub(super) struct Decoder<'a> {
    chunk: ChunkID,
    data: &'a [u8],
}
impl<'a> Decoder<'a> {
    /// Check the header of a leaf chunk payload, returning a decoder over its body.
    pub fn open(chunk: ChunkID, data: &'a [u8]) -> Result<Self, LoadError> {
        if data.len() < HEADER_LEN {
            return Err(LoadError::Truncated(chunk));
        }
        let (header, body) = data.split_at(HEADER_LEN);
        let version: Version = bytemuck::pod_read_unaligned(&header[..3]);
        if !version.is_supported() {
            return Err(LoadError::UnsupportedVersion { chunk, version });
        }
        let stored = u32::from_le_bytes([header[3], header[4], header[5], header[6]]);
        let computed = CRC32.checksum(body);
        if stored != computed {
            return Err(LoadError::ChecksumMismatch {
                chunk,
                stored,
                computed,
            });
        }
        Ok(Self { chunk, data: body })
    }
    fn malformed(&self, what: &'static str) -> LoadError {
        LoadError::Malformed {
            chunk: self.chunk,
            what,
        }
    }
    fn take(&mut self, n: usize) -> Result<&'a [u8], LoadError> {
        if self.data.len() < n {
            return Err(LoadError::Truncated(self.chunk));
        }
        let (head, rest) = self.data.split_at(n);
        self.data = rest;
        Ok(head)
    }
    fn array<const N: usize>(&mut self) -> Result<[u8; N], LoadError> {
        let mut out = [0; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
    pub fn u8(&mut self) -> Result<u8, LoadError> {
        Ok(self.array::<1>()?[0])
    }
    pub fn u32(&mut self) -> Result<u32, LoadError> {
        self.array().map(u32::from_le_bytes)
    }
    pub fn u64(&mut self) -> Result<u64, LoadError> {
        self.array().map(u64::from_le_bytes)
    }
    pub fn f32(&mut self) -> Result<f32, LoadError> {
        self.array().map(f32::from_le_bytes)
    }
    pub fn f64(&mut self) -> Result<f64, LoadError> {
        self.u64().map(f64::from_bits)
    }
    pub fn bool(&mut self) -> Result<bool, LoadError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(self.malformed("bad flag")),
        }
    }
    /// Length prefix, sanity checked against the bytes left assuming each item takes at least
    /// `min_item_len`.
    pub fn len(&mut self, min_item_len: usize) -> Result<usize, LoadError> {
        let len = self.u32()? as usize;
        if len.saturating_mul(min_item_len) > self.data.len() {
            return Err(LoadError::Truncated(self.chunk));
        }
        Ok(len)
    }
    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], LoadError> {
        self.take(n)
    }
    pub fn string(&mut self) -> Result<String, LoadError> {
        let len = self.len(1)?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| self.malformed("invalid utf-8"))
    }
    pub fn id<T: std::any::Any>(&mut self) -> Result<StableID<T>, LoadError> {
        self.array().map(StableID::from_bytes)
    }
    pub fn points(&mut self) -> Result<Vec<Point>, LoadError> {
        let len = self.len(8)?;
        (0..len).map(|_| Ok([self.f32()?, self.f32()?])).collect()
    }
    pub fn mask(&mut self) -> Result<Mask, LoadError> {
        let canvas = CanvasSize::new(self.u32()?, self.u32()?);
        let bounds = if self.bool()? {
            let rect = Rect::new(self.u32()?, self.u32()?, self.u32()?, self.u32()?);
            Some(rect.ok_or_else(|| self.malformed("inverted mask bounds"))?)
        } else {
            None
        };
        let len = self.len(1)?;
        let packed = self.take(len)?;
        Mask::from_packed(canvas, bounds, packed).ok_or_else(|| self.malformed("mask raster"))
    }
    /// Every byte must have been consumed.
    pub fn finish(self) -> Result<(), LoadError> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(self.malformed("trailing bytes"))
        }
    }
}

/// Read a chunk's whole payload, turning a short read into [`LoadError::Truncated`].
pub(super) fn read_data<R: std::io::Read>(
    chunk: super::riff::BinaryChunkReader<R>,
) -> Result<(ChunkID, Vec<u8>), LoadError> {
    let id = chunk.id();
    match chunk.read_data() {
        Ok(data) => Ok((id, data)),
        Err(err) if err.kind() == IOErrorKind::UnexpectedEof => Err(LoadError::Truncated(id)),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn header_checked() {
        let mut encoder = Encoder::default();
        encoder.u32(7).u8(1);
        let mut data = encoder.finish();
        {
            let mut decoder = Decoder::open(ChunkID::POLY, &data).unwrap();
            assert_eq!(decoder.u32().unwrap(), 7);
            assert!(decoder.bool().unwrap());
            decoder.finish().unwrap();
        }
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        assert!(matches!(
            Decoder::open(ChunkID::POLY, &data),
            Err(LoadError::ChecksumMismatch { .. })
        ));
        data[0] = 9;
        assert!(matches!(
            Decoder::open(ChunkID::POLY, &data),
            Err(LoadError::UnsupportedVersion { .. })
        ));
        assert!(matches!(
            Decoder::open(ChunkID::POLY, &data[..4]),
            Err(LoadError::Truncated(_))
        ));
    }
    #[test]
    fn absurd_lengths_rejected() {
        let mut encoder = Encoder::default();
        encoder.u32(u32::MAX);
        let data = encoder.finish();
        let mut decoder = Decoder::open(ChunkID::POLY, &data).unwrap();
        assert!(matches!(decoder.points(), Err(LoadError::Truncated(_))));
    }
}
