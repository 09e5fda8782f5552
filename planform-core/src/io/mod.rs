//! # Workspace store
//!
//! Little-endian RIFF. A store is a `RIFF plnw` holding one `LIST regs` (the registry) and
//! one `LIST plnf` per planform:
//!
//! ```text
//! RIFF plnw
//! ├ LIST regs
//! │ ├ cats   categories
//! │ └ objs   objects, their elements and element masks
//! ├ LIST plnf
//! │ ├ plid   planform id
//! │ ├ poly   polyline
//! │ ├ mask   canonical mask
//! │ └ memb   last committed snapshot (optional)
//! └ LIST plnf ...
//! ```
//!
//! Every leaf chunk starts with a [`Version`] and a CRC-32 of the rest of its payload.
//! Planforms are independent: one failing to load doesn't affect the others.

mod codec;
mod planform;
mod registry;
pub mod riff;

pub use planform::{load, save, LoadedPlanform, SerializedPlanform};
pub use registry::{read_workspace, write_workspace, LoadedWorkspace};

use riff::ChunkID;

#[derive(Copy, Clone, PartialEq, Eq, Debug, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Version(pub u8, pub u8, pub u8);
impl Version {
    pub const CURRENT: Self = Version(0, 1, 0);
    /// Readable by this build. Minor and patch bumps are backwards compatible.
    #[must_use]
    pub fn is_supported(self) -> bool {
        self.0 == Self::CURRENT.0
    }
}
impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.0, self.1, self.2)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("expected {expected}, found {found}")]
    BadMagic { expected: ChunkID, found: ChunkID },
    #[error("chunk {chunk} has unsupported version {version}")]
    UnsupportedVersion { chunk: ChunkID, version: Version },
    #[error("chunk {0} is truncated")]
    Truncated(ChunkID),
    #[error("chunk {chunk} checksum mismatch: stored {stored:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        chunk: ChunkID,
        stored: u32,
        computed: u32,
    },
    #[error("missing chunk {0}")]
    MissingChunk(ChunkID),
    #[error("chunk {chunk} is malformed: {what}")]
    Malformed { chunk: ChunkID, what: &'static str },
}
