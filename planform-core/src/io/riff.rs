//! Minimal RIFF container: 4-byte id, little-endian `u32` length, payload. `RIFF` and `LIST`
//! chunks start their payload with a 4-byte subtype followed by nested chunks.

use az::CheckedAs;
use std::io::{Error as IOError, ErrorKind as IOErrorKind, Read, Result as IOResult, Write};

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
#[repr(transparent)]
pub struct ChunkID(pub [u8; 4]);
impl ChunkID {
    pub const RIFF: Self = ChunkID(*b"RIFF");
    pub const LIST: Self = ChunkID(*b"LIST");
    /// Store root subtype.
    pub const PLNW: Self = ChunkID(*b"plnw");
    pub const REGS: Self = ChunkID(*b"regs");
    pub const CATS: Self = ChunkID(*b"cats");
    pub const OBJS: Self = ChunkID(*b"objs");
    pub const PLNF: Self = ChunkID(*b"plnf");
    pub const PLID: Self = ChunkID(*b"plid");
    pub const POLY: Self = ChunkID(*b"poly");
    pub const MASK: Self = ChunkID(*b"mask");
    pub const MEMB: Self = ChunkID(*b"memb");
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}
impl std::fmt::Display for ChunkID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.as_str() {
            Some(name) => f.write_str(name),
            None => write!(f, "{:02x?}", self.0),
        }
    }
}
impl std::ops::Deref for ChunkID {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Emit `id`, the payload length, then `prefix` (a subtype, or nothing) and `data`.
fn write_header_and(
    mut writer: impl Write,
    id: ChunkID,
    prefix: &[u8],
    data: &[u8],
) -> IOResult<()> {
    let len = prefix
        .len()
        .checked_add(data.len())
        .and_then(|len| len.checked_as::<u32>())
        .ok_or_else(|| IOError::other(anyhow::anyhow!("chunk {id} is over 4GiB")))?;
    let mut header = [0; 8];
    header[..4].copy_from_slice(&id.0);
    header[4..].copy_from_slice(&len.to_le_bytes());
    writer.write_all(&header)?;
    writer.write_all(prefix)?;
    writer.write_all(data)
}

/// Write `data` as one leaf chunk.
pub fn write_chunk(writer: impl Write, id: ChunkID, data: &[u8]) -> IOResult<()> {
    write_header_and(writer, id, &[], data)
}
/// Write a `RIFF` or `LIST` chunk around already-encoded subchunks.
pub fn write_list(writer: impl Write, id: ChunkID, subtype: ChunkID, data: &[u8]) -> IOResult<()> {
    write_header_and(writer, id, &subtype.0, data)
}

/// Reads one chunk's payload, and nothing past it.
pub struct BinaryChunkReader<R: Read> {
    id: ChunkID,
    /// Payload bytes consumed so far. Never exceeds `len`.
    cursor: u32,
    len: u32,
    reader: R,
}
impl<R: Read> Read for BinaryChunkReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> IOResult<usize> {
        let remaining = (self.len - self.cursor) as usize;
        let want = buf.len().min(remaining);
        if want == 0 {
            return Ok(0);
        }
        let got = self.reader.read(&mut buf[..want])?;
        // `got <= want <= remaining`, which fits in u32.
        let got_u32 = got
            .checked_as::<u32>()
            .filter(|&got| got <= self.len - self.cursor)
            .ok_or_else(|| IOError::other(anyhow::anyhow!("reader overran chunk {}", self.id)))?;
        self.cursor += got_u32;
        Ok(got)
    }
}
impl<R: Read> BinaryChunkReader<R> {
    /// Consume the 8-byte header of the chunk at the current position.
    pub fn new(mut read: R) -> IOResult<Self> {
        let mut header = [0; 8];
        read.read_exact(&mut header).map_err(|err| match err.kind() {
            IOErrorKind::UnexpectedEof => IOError::new(
                IOErrorKind::UnexpectedEof,
                anyhow::anyhow!("stream ended inside a chunk header"),
            ),
            _ => err,
        })?;
        let [a, b, c, d, len @ ..] = header;
        Ok(Self {
            id: ChunkID([a, b, c, d]),
            cursor: 0,
            len: u32::from_le_bytes(len),
            reader: read,
        })
    }
    #[must_use]
    pub fn id(&self) -> ChunkID {
        self.id
    }
    /// Payload length, as declared by the header.
    #[must_use]
    pub fn data_len(&self) -> usize {
        self.len as usize
    }
    /// Header plus payload.
    #[must_use]
    pub fn self_len(&self) -> usize {
        self.data_len() + 8
    }
    /// Read the remaining payload. Fails with `UnexpectedEof` if the stream ends before the
    /// chunk does.
    pub fn read_data(mut self) -> IOResult<Vec<u8>> {
        // Header length is untrusted, don't preallocate from it.
        let mut data = Vec::new();
        self.read_to_end(&mut data)?;
        if self.cursor != self.len {
            return Err(IOError::new(
                IOErrorKind::UnexpectedEof,
                anyhow::anyhow!("chunk {} ended {} bytes early", self.id, self.len - self.cursor),
            ));
        }
        Ok(data)
    }
    /// Discard the rest of this chunk, leaving the inner reader at the next one.
    pub fn skip(mut self) -> IOResult<()> {
        let remaining = u64::from(self.len - self.cursor);
        let skipped = std::io::copy(&mut (&mut self).take(remaining), &mut std::io::sink())?;
        if skipped != remaining {
            return Err(IOErrorKind::UnexpectedEof.into());
        }
        Ok(())
    }
    /// Read the subtype of a `RIFF`/`LIST` chunk and iterate its children.
    pub fn subchunks(mut self) -> IOResult<SubchunkReader<R>> {
        let mut subtype = ChunkID([0; 4]);
        self.read_exact(&mut subtype.0).map_err(|_| {
            IOError::new(
                IOErrorKind::UnexpectedEof,
                anyhow::anyhow!("chunk {} too short for a subtype", self.id),
            )
        })?;
        Ok(SubchunkReader {
            subtype,
            parent: self,
        })
    }
}

pub struct SubchunkReader<R: Read> {
    subtype: ChunkID,
    parent: BinaryChunkReader<R>,
}
impl<R: Read> SubchunkReader<R> {
    #[must_use]
    pub fn id(&self) -> ChunkID {
        self.parent.id()
    }
    #[must_use]
    pub fn subtype_id(&self) -> ChunkID {
        self.subtype
    }
    #[must_use]
    pub fn data_len(&self) -> usize {
        self.parent.data_len()
    }
    /// Read a subchunk at the current position, or `None` once the parent is exhausted.
    /// Each subchunk must be fully read or skipped before asking for the next.
    pub fn next_subchunk(
        &mut self,
    ) -> IOResult<Option<BinaryChunkReader<&mut BinaryChunkReader<R>>>> {
        if self.parent.cursor == self.parent.len {
            return Ok(None);
        }
        BinaryChunkReader::new(&mut self.parent).map(Some)
    }
}
