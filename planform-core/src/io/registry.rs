use super::codec::{self, Decoder, Encoder};
use super::planform::{load_list, LoadedPlanform, SerializedPlanform};
use super::riff::{self, BinaryChunkReader, ChunkID};
use super::LoadError;
use crate::registry::{Category, CategoryKind, Element, ElementMode, Object, Registry};
use std::sync::Arc;

/// A whole store read back from disk.
#[derive(Debug)]
pub struct LoadedWorkspace {
    pub registry: Registry,
    /// One entry per `LIST plnf`, in file order. A damaged planform is an `Err` here without
    /// affecting its neighbours.
    pub planforms: Vec<Result<LoadedPlanform, LoadError>>,
}

fn encode_categories(registry: &Registry) -> std::io::Result<Vec<u8>> {
    let mut categories: Vec<&Category> = registry.categories().collect();
    categories.sort_unstable_by_key(|c| c.id);
    let mut encoder = Encoder::default();
    encoder.len(categories.len())?;
    for category in categories {
        encoder
            .id(category.id)
            .u8(category.kind as u8)
            .u8(category.visible.into())
            .len(category.name.len())?
            .bytes(category.name.as_bytes());
    }
    Ok(encoder.finish())
}

fn encode_objects(registry: &Registry) -> std::io::Result<Vec<u8>> {
    let mut objects: Vec<&Arc<Object>> = registry.objects().collect();
    objects.sort_unstable_by_key(|o| o.id);
    let mut encoder = Encoder::default();
    encoder.len(objects.len())?;
    for object in objects {
        encoder
            .id(object.id)
            .id(object.category)
            .len(object.elements.len())?;
        for element in &object.elements {
            encoder
                .id(element.id)
                .id(element.category)
                .u8(element.mode as u8)
                .points(&element.points)?
                .mask(&element.mask)?;
        }
    }
    Ok(encoder.finish())
}

/// Write a complete store: the registry, followed by each planform as given.
pub fn write_workspace(
    writer: impl std::io::Write,
    registry: &Registry,
    planforms: &[SerializedPlanform],
) -> std::io::Result<()> {
    let mut regs = Vec::new();
    riff::write_chunk(&mut regs, ChunkID::CATS, &encode_categories(registry)?)?;
    riff::write_chunk(&mut regs, ChunkID::OBJS, &encode_objects(registry)?)?;

    let mut body = Vec::new();
    riff::write_list(&mut body, ChunkID::LIST, ChunkID::REGS, &regs)?;
    for planform in planforms {
        body.extend_from_slice(planform.as_bytes());
    }
    riff::write_list(writer, ChunkID::RIFF, ChunkID::PLNW, &body)
}

fn decode_categories(registry: &mut Registry, payload: &[u8]) -> Result<(), LoadError> {
    let mut decoder = Decoder::open(ChunkID::CATS, payload)?;
    // id + kind + visible + name length
    let count = decoder.len(16 + 1 + 1 + 4)?;
    for _ in 0..count {
        let id = decoder.id()?;
        let kind = CategoryKind::from_repr(decoder.u8()?).ok_or(LoadError::Malformed {
            chunk: ChunkID::CATS,
            what: "unknown category kind",
        })?;
        let visible = decoder.bool()?;
        let name = decoder.string()?;
        registry.categories.insert(
            id,
            Category {
                id,
                name,
                visible,
                kind,
            },
        );
    }
    decoder.finish()
}

fn decode_objects(registry: &mut Registry, payload: &[u8]) -> Result<(), LoadError> {
    let mut decoder = Decoder::open(ChunkID::OBJS, payload)?;
    let malformed = |what| LoadError::Malformed {
        chunk: ChunkID::OBJS,
        what,
    };
    // ids + element count
    let count = decoder.len(16 + 16 + 4)?;
    for _ in 0..count {
        let id = decoder.id()?;
        let category = decoder.id()?;
        let element_count = decoder.len(16 + 16 + 1)?;
        let mut elements = smallvec::SmallVec::with_capacity(element_count);
        for _ in 0..element_count {
            let element_id = decoder.id()?;
            let element_category = decoder.id()?;
            let mode = ElementMode::from_repr(decoder.u8()?)
                .ok_or_else(|| malformed("unknown element mode"))?;
            let points = decoder.points()?;
            let mask = decoder.mask()?;
            elements.push(Element {
                id: element_id,
                category: element_category,
                mode,
                points: points.into(),
                mask: Arc::new(mask),
            });
        }
        if registry
            .objects
            .insert(
                id,
                Arc::new(Object {
                    id,
                    category,
                    elements,
                }),
            )
            .is_some()
        {
            return Err(malformed("duplicate object"));
        }
    }
    decoder.finish()
}

fn decode_registry(data: &[u8]) -> Result<Registry, LoadError> {
    let mut data = data;
    let mut registry = Registry::default();
    let (mut cats, mut objs) = (false, false);
    while !data.is_empty() {
        let chunk = BinaryChunkReader::new(&mut data)
            .map_err(|_| LoadError::Truncated(ChunkID::REGS))?;
        let (id, payload) = codec::read_data(chunk)?;
        match id {
            ChunkID::CATS => {
                decode_categories(&mut registry, &payload)?;
                cats = true;
            }
            ChunkID::OBJS => {
                decode_objects(&mut registry, &payload)?;
                objs = true;
            }
            other => log::warn!("skipping unknown registry chunk {other}"),
        }
    }
    if !cats {
        return Err(LoadError::MissingChunk(ChunkID::CATS));
    }
    if !objs {
        return Err(LoadError::MissingChunk(ChunkID::OBJS));
    }
    Ok(registry)
}

/// Read a complete store. Fails only if the container or the registry is unreadable;
/// individual planforms report their own errors.
pub fn read_workspace(reader: impl std::io::Read) -> Result<LoadedWorkspace, LoadError> {
    let root = BinaryChunkReader::new(reader)?;
    if root.id() != ChunkID::RIFF {
        return Err(LoadError::BadMagic {
            expected: ChunkID::RIFF,
            found: root.id(),
        });
    }
    let mut subchunks = root.subchunks()?;
    if subchunks.subtype_id() != ChunkID::PLNW {
        return Err(LoadError::BadMagic {
            expected: ChunkID::PLNW,
            found: subchunks.subtype_id(),
        });
    }

    let mut registry = None;
    let mut planforms = Vec::new();
    loop {
        let chunk = match subchunks.next_subchunk() {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(err) => {
                log::warn!("store ends mid-chunk: {err}");
                planforms.push(Err(LoadError::Truncated(ChunkID::RIFF)));
                break;
            }
        };
        if chunk.id() != ChunkID::LIST {
            log::warn!("skipping unknown chunk {}", chunk.id());
            chunk.skip()?;
            continue;
        }
        let data = match codec::read_data(chunk) {
            Ok((_, data)) => data,
            Err(err) => {
                // Can't find the next chunk after a short read.
                planforms.push(Err(err));
                break;
            }
        };
        match data.get(..4) {
            Some(subtype) if subtype == &*ChunkID::REGS => {
                registry = Some(decode_registry(&data[4..])?);
            }
            Some(subtype) if subtype == &*ChunkID::PLNF => {
                let loaded = load_list(&data);
                if let Err(err) = &loaded {
                    log::warn!("failed to load planform: {err}");
                }
                planforms.push(loaded);
            }
            _ => log::warn!("skipping unknown list"),
        }
    }
    Ok(LoadedWorkspace {
        registry: registry.ok_or(LoadError::MissingChunk(ChunkID::REGS))?,
        planforms,
    })
}
