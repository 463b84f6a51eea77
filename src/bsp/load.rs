// Copyright © 2018 Cormac O'Brien
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of this software
// and associated documentation files (the "Software"), to deal in the Software without
// restriction, including without limitation the rights to use, copy, modify, merge, publish,
// distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all copies or
// substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING
// BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
// DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

use std::{
    io::{self, Cursor, Read, Seek, SeekFrom},
    sync::Arc,
};

use crate::{
    alloc::{Allocator, Block},
    bsp::{
        lump::{
            ClipNode, Edge, Face, Header, Leaf, Lump, LumpId, Model, Node, Plane, Record, TexInfo,
            Vertex, HEADER_SIZE, LUMP_COUNT, VERSION,
        },
        miptex::MiptexLump,
        BspData, BspError, BspErrorKind,
    },
    parse::{self, entity::Entity},
};

use byteorder::{LittleEndian, ReadBytesExt};
use failure::{Fail, ResultExt};
use strum::IntoEnumIterator;

fn read_header<R>(reader: &mut R) -> Result<Header, BspError>
where
    R: Read + Seek,
{
    debug!("Reading header");
    reader.seek(SeekFrom::Start(0)).context(BspErrorKind::Io)?;

    let mut bytes = [0u8; HEADER_SIZE];
    if let Err(e) = reader.read_exact(&mut bytes) {
        error!("Failed to read header: {}", e);
        let kind = match e.kind() {
            io::ErrorKind::UnexpectedEof => BspErrorKind::Format,
            _ => BspErrorKind::Io,
        };
        return Err(e.context(kind).into());
    }

    let mut cursor = Cursor::new(&bytes[..]);
    let version = cursor.read_i32::<LittleEndian>().context(BspErrorKind::Format)?;
    if version != VERSION {
        error!("Unsupported BSP version: {} (expected {})", version, VERSION);
        return Err(BspError::with_msg(
            BspErrorKind::Format,
            format!("Bad version number (found {}, should be {})", version, VERSION),
        ));
    }

    let mut lumps = [Lump::default(); LUMP_COUNT];
    for (id, lump) in LumpId::iter().zip(lumps.iter_mut()) {
        lump.offset = cursor.read_i32::<LittleEndian>().context(BspErrorKind::Format)?;
        lump.length = cursor.read_i32::<LittleEndian>().context(BspErrorKind::Format)?;

        debug!(
            "{: <10} Offset = 0x{:>08x} | Size = 0x{:>08x}",
            format!("{}:", id.name()),
            lump.offset,
            lump.length
        );
    }

    Ok(Header { version, lumps })
}

fn seek_lump<R>(reader: &mut R, id: LumpId, lump: &Lump) -> Result<(), BspError>
where
    R: Seek,
{
    if lump.offset < 0 {
        error!("Negative offset for {} lump ({})", id.name(), lump.offset);
        return Err(BspError::with_msg(
            BspErrorKind::Io,
            format!("Lump offset must not be negative (was {})", lump.offset),
        ));
    }

    if let Err(e) = reader.seek(SeekFrom::Start(lump.offset as u64)) {
        error!("Failed to seek to {} lump: {}", id.name(), e);
        return Err(e.context(BspErrorKind::Io).into());
    }

    Ok(())
}

/// Read exactly `size` bytes into a new block.
///
/// The block holds one extra zero byte for each of `pad`.
fn read_exact<R>(
    reader: &mut R,
    alloc: &Arc<dyn Allocator>,
    id: LumpId,
    size: usize,
    pad: usize,
) -> Result<Block<u8>, BspError>
where
    R: Read,
{
    let total = match size.checked_add(pad) {
        Some(t) => t,
        None => {
            return Err(BspError::with_msg(
                BspErrorKind::Allocation,
                "Lump size overflows",
            ))
        }
    };

    let mut data: Block<u8> = Block::zeroed(alloc.clone(), total)?;
    if let Err(e) = reader.read_exact(&mut data[..size]) {
        error!("Failed to read {} data: {}", id.name(), e);
        return Err(e.context(BspErrorKind::Io).into());
    }

    Ok(data)
}

/// Decode a lump holding an array of `T`.
///
/// Trailing bytes that do not make up a whole record are ignored.
fn read_records<R, T>(
    reader: &mut R,
    alloc: &Arc<dyn Allocator>,
    header: &Header,
    id: LumpId,
) -> Result<Block<T>, BspError>
where
    R: Read + Seek,
    T: Record,
{
    let lump = header.lump(id);
    debug!(
        "Reading {} lump (offset={}, length={})",
        id.name(),
        lump.offset,
        lump.length
    );

    if lump.length <= 0 {
        debug!("{} lump empty", id.name());
        return Ok(Block::new(alloc.clone()));
    }

    seek_lump(reader, id, lump)?;

    let count = lump.length as usize / T::SIZE;
    if count * T::SIZE != lump.length as usize {
        debug!(
            "Ignoring {} trailing bytes in {} lump",
            lump.length as usize - count * T::SIZE,
            id.name()
        );
    }

    let mut records: Block<T> = Block::zeroed(alloc.clone(), count)?;

    let mut lump_reader = reader.by_ref().take((count * T::SIZE) as u64);
    for record in records.iter_mut() {
        *record = match T::read(&mut lump_reader) {
            Ok(r) => r,
            Err(e) => {
                error!("Failed to read {} data: {}", id.name(), e);
                return Err(e.context(BspErrorKind::Io).into());
            }
        };
    }

    debug!("Loaded {} {}", count, id.name());
    Ok(records)
}

/// Decode a lump whose contents are opaque to the loader.
fn read_blob<R>(
    reader: &mut R,
    alloc: &Arc<dyn Allocator>,
    header: &Header,
    id: LumpId,
) -> Result<Block<u8>, BspError>
where
    R: Read + Seek,
{
    let lump = header.lump(id);
    debug!(
        "Reading {} lump (offset={}, length={})",
        id.name(),
        lump.offset,
        lump.length
    );

    if lump.length <= 0 {
        debug!("{} lump empty", id.name());
        return Ok(Block::new(alloc.clone()));
    }

    seek_lump(reader, id, lump)?;
    read_exact(reader, alloc, id, lump.length as usize, 0)
}

fn read_entities<R>(
    reader: &mut R,
    alloc: &Arc<dyn Allocator>,
    header: &Header,
) -> Result<Block<Entity>, BspError>
where
    R: Read + Seek,
{
    let id = LumpId::Entities;
    let lump = header.lump(id);
    debug!(
        "Reading {} lump (offset={}, length={})",
        id.name(),
        lump.offset,
        lump.length
    );

    if lump.length <= 0 {
        debug!("{} lump empty", id.name());
        return Ok(Block::new(alloc.clone()));
    }

    seek_lump(reader, id, lump)?;

    // the text is terminated by a zero byte even if the lump is not
    let text = read_exact(reader, alloc, id, lump.length as usize, 1)?;

    let entities = parse::entities(&text, alloc).map_err(|e| {
        error!("Failed to parse entities: {}", e);
        e
    })?;

    debug!("Loaded {} entities", entities.len());
    Ok(entities)
}

fn read_miptex<R>(
    reader: &mut R,
    alloc: &Arc<dyn Allocator>,
    header: &Header,
) -> Result<MiptexLump, BspError>
where
    R: Read + Seek,
{
    let raw = read_blob(reader, alloc, header, LumpId::Miptex)?;
    if raw.is_empty() {
        return Ok(MiptexLump::empty(alloc.clone()));
    }

    let miptex = MiptexLump::resolve(alloc.clone(), raw).map_err(|e| {
        error!("Failed to resolve miptex directory: {}", e);
        e
    })?;

    debug!("Loaded {} miptex slots", miptex.count());
    Ok(miptex)
}

/// Decode every lump of a BSP file.
///
/// Lumps are decoded in index order. Everything is acquired into the returned value, so an
/// error at any point releases all lumps decoded before it.
pub(crate) fn load_data<R>(reader: &mut R, alloc: &Arc<dyn Allocator>) -> Result<BspData, BspError>
where
    R: Read + Seek,
{
    let header = read_header(reader)?;
    debug!("Header OK: version={}", header.version);

    let entities = read_entities(reader, alloc, &header)?;
    let planes = read_records::<_, Plane>(reader, alloc, &header, LumpId::Planes)?;
    let miptex = read_miptex(reader, alloc, &header)?;
    let vertices = read_records::<_, Vertex>(reader, alloc, &header, LumpId::Vertices)?;
    let visdata = read_blob(reader, alloc, &header, LumpId::Visdata)?;
    let nodes = read_records::<_, Node>(reader, alloc, &header, LumpId::Nodes)?;
    let texinfo = read_records::<_, TexInfo>(reader, alloc, &header, LumpId::TexInfo)?;
    let faces = read_records::<_, Face>(reader, alloc, &header, LumpId::Faces)?;
    let lighting = read_blob(reader, alloc, &header, LumpId::Lighting)?;
    let clipnodes = read_records::<_, ClipNode>(reader, alloc, &header, LumpId::ClipNodes)?;
    let leaves = read_records::<_, Leaf>(reader, alloc, &header, LumpId::Leaves)?;
    let facelist = read_records::<_, i16>(reader, alloc, &header, LumpId::FaceList)?;
    let edges = read_records::<_, Edge>(reader, alloc, &header, LumpId::Edges)?;
    let surfedges = read_records::<_, i32>(reader, alloc, &header, LumpId::SurfEdges)?;
    let models = read_records::<_, Model>(reader, alloc, &header, LumpId::Models)?;

    let data = BspData {
        header,
        entities,
        planes,
        miptex,
        vertices,
        visdata,
        nodes,
        texinfo,
        faces,
        lighting,
        clipnodes,
        leaves,
        facelist,
        edges,
        surfedges,
        models,
    };

    info!("BSP loaded:");
    info!("  Entities:  {}", data.entities.len());
    info!("  Planes:    {}", data.planes.len());
    info!("  Miptex:    {}", data.miptex.count());
    info!("  Vertices:  {}", data.vertices.len());
    info!("  Visdata:   {} bytes", data.visdata.len());
    info!("  Nodes:     {}", data.nodes.len());
    info!("  Texinfo:   {}", data.texinfo.len());
    info!("  Faces:     {}", data.faces.len());
    info!("  Lighting:  {} bytes", data.lighting.len());
    info!("  Clipnodes: {}", data.clipnodes.len());
    info!("  Leaves:    {}", data.leaves.len());
    info!("  Facelist:  {}", data.facelist.len());
    info!("  Edges:     {}", data.edges.len());
    info!("  Surfedges: {}", data.surfedges.len());
    info!("  Models:    {}", data.models.len());

    Ok(data)
}
