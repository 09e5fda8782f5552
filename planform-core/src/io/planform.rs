use super::codec::{self, Decoder, Encoder};
use super::riff::{self, BinaryChunkReader, ChunkID};
use super::LoadError;
use crate::membership::{Completeness, MembershipSnapshot, ObjectSet};
use crate::planform::{Planform, PlanformID};
use crate::world::WorldVersion;
use std::sync::Arc;

/// One planform encoded as a complete `LIST plnf` chunk, ready to be placed in a store.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SerializedPlanform(Vec<u8>);
impl SerializedPlanform {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
    /// Wrap bytes previously produced by [`save`]. Nothing is checked until [`load`].
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// A planform read back from disk.
#[derive(Debug)]
pub struct LoadedPlanform {
    pub planform: Planform,
    /// The saved snapshot, tagged [`WorldVersion::RESTORED`]. `None` if none was saved or it
    /// failed to load.
    pub snapshot: Option<MembershipSnapshot>,
    /// Version tag the snapshot carried when saved, for diagnostics only. Versions don't
    /// survive a reload.
    pub saved_version: Option<WorldVersion>,
}

/// Encode a planform, its canonical mask, and optionally its last committed snapshot.
pub fn save(
    planform: &Planform,
    snapshot: Option<&MembershipSnapshot>,
) -> std::io::Result<SerializedPlanform> {
    let mut body = Vec::new();

    let mut plid = Encoder::default();
    plid.id(planform.id());
    riff::write_chunk(&mut body, ChunkID::PLID, &plid.finish())?;

    let mut poly = Encoder::default();
    poly.points(planform.points())?.f64(planform.tolerance());
    riff::write_chunk(&mut body, ChunkID::POLY, &poly.finish())?;

    let mut mask = Encoder::default();
    mask.mask(planform.mask())?;
    riff::write_chunk(&mut body, ChunkID::MASK, &mask.finish())?;

    if let Some(snapshot) = snapshot {
        let mut ids: Vec<_> = snapshot.objects.iter().copied().collect();
        ids.sort_unstable();
        let mut memb = Encoder::default();
        memb.u64(snapshot.version.get())
            .u8(snapshot.completeness as u8)
            .len(ids.len())?;
        for id in ids {
            memb.id(id);
        }
        riff::write_chunk(&mut body, ChunkID::MEMB, &memb.finish())?;
    }

    let mut list = Vec::with_capacity(body.len() + 12);
    riff::write_list(&mut list, ChunkID::LIST, ChunkID::PLNF, &body)?;
    Ok(SerializedPlanform(list))
}

/// Decode a planform. The mask is taken verbatim, never regenerated from the points.
///
/// A damaged snapshot is dropped with a warning, leaving the planform uncomputed; any other
/// damage fails the whole planform.
pub fn load(serialized: &SerializedPlanform) -> Result<LoadedPlanform, LoadError> {
    let root = BinaryChunkReader::new(serialized.as_bytes())?;
    if root.id() != ChunkID::LIST {
        return Err(LoadError::BadMagic {
            expected: ChunkID::LIST,
            found: root.id(),
        });
    }
    let (_, data) = codec::read_data(root)?;
    load_list(&data)
}

/// Decode the payload of a `LIST plnf`, subtype included.
pub(super) fn load_list(mut data: &[u8]) -> Result<LoadedPlanform, LoadError> {
    let truncated = |_| LoadError::Truncated(ChunkID::PLNF);
    let mut subtype = ChunkID([0; 4]);
    std::io::Read::read_exact(&mut data, &mut subtype.0).map_err(truncated)?;
    if subtype != ChunkID::PLNF {
        return Err(LoadError::BadMagic {
            expected: ChunkID::PLNF,
            found: subtype,
        });
    }

    let (mut id, mut poly, mut mask, mut memb) = (None, None, None, None);
    while !data.is_empty() {
        let chunk = BinaryChunkReader::new(&mut data).map_err(truncated)?;
        let (chunk_id, payload) = codec::read_data(chunk)?;
        match chunk_id {
            ChunkID::PLID => {
                let mut decoder = Decoder::open(chunk_id, &payload)?;
                id = Some(decoder.id::<crate::planform::Planform>()?);
                decoder.finish()?;
            }
            ChunkID::POLY => {
                let mut decoder = Decoder::open(chunk_id, &payload)?;
                let points = decoder.points()?;
                let tolerance = decoder.f64()?;
                if !(tolerance.is_finite() && tolerance >= 0.0) {
                    return Err(LoadError::Malformed {
                        chunk: chunk_id,
                        what: "boundary tolerance",
                    });
                }
                decoder.finish()?;
                poly = Some((points, tolerance));
            }
            ChunkID::MASK => {
                let mut decoder = Decoder::open(chunk_id, &payload)?;
                mask = Some(decoder.mask()?);
                decoder.finish()?;
            }
            // Decoded last, once the id is known.
            ChunkID::MEMB => memb = Some(payload),
            other => log::warn!("skipping unknown planform chunk {other}"),
        }
    }
    let id: PlanformID = id.ok_or(LoadError::MissingChunk(ChunkID::PLID))?;
    let (points, tolerance) = poly.ok_or(LoadError::MissingChunk(ChunkID::POLY))?;
    let mask = mask.ok_or(LoadError::MissingChunk(ChunkID::MASK))?;
    let planform = Planform::from_parts(id, points.into(), Arc::new(mask), tolerance);

    let (snapshot, saved_version) = match memb.map(|memb| load_snapshot(id, &memb)) {
        None => (None, None),
        Some(Ok((snapshot, saved))) => (Some(snapshot), Some(saved)),
        Some(Err(err)) => {
            log::warn!("dropping snapshot of {id}: {err}");
            (None, None)
        }
    };
    Ok(LoadedPlanform {
        planform,
        snapshot,
        saved_version,
    })
}

fn load_snapshot(
    planform: PlanformID,
    payload: &[u8],
) -> Result<(MembershipSnapshot, WorldVersion), LoadError> {
    let mut decoder = Decoder::open(ChunkID::MEMB, payload)?;
    let saved = WorldVersion::from_raw(decoder.u64()?);
    let completeness = Completeness::from_repr(decoder.u8()?).ok_or(LoadError::Malformed {
        chunk: ChunkID::MEMB,
        what: "unknown completeness",
    })?;
    let count = decoder.len(16)?;
    let objects = (0..count)
        .map(|_| decoder.id())
        .collect::<Result<ObjectSet, _>>()?;
    decoder.finish()?;
    Ok((
        MembershipSnapshot {
            planform,
            objects: Arc::new(objects),
            version: WorldVersion::RESTORED,
            completeness,
        },
        saved,
    ))
}
