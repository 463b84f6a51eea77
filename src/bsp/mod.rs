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

//! Quake BSP file loading.
//!
//! # File Format
//!
//! The BSP file header consists of the file format version number, stored as an `i32`, which
//! must be 29.
//!
//! This is followed by a series of "lumps" which act as a directory into the BSP file data.
//! There are 15 of these lumps, each consisting of a 32-bit offset (into the file data) and a
//! 32-bit size (in bytes). All values are little-endian.
//!
//! ## Entities
//!
//! Lump 0 points to the level entity data, stored as blocks of quoted key/value pairs. See
//! [`parse::entity`](crate::parse::entity) for the exact grammar.
//!
//! ## Textures
//!
//! Lump 2 holds the texture directory. See [`miptex`] for its layout.
//!
//! ## Fixed-size records
//!
//! Planes, vertices, render nodes, texinfo, faces, collision nodes, leaves, edges and models
//! are each stored as a packed array of fixed-size records. The facelist lump is an array of
//! `i16` face indices and the surfedge lump an array of `i32` signed edge indices. If a lump's
//! size is not a multiple of its record size, the trailing bytes are ignored.
//!
//! ## Visibility and lighting
//!
//! The visibility lists and the lightmaps are kept as raw bytes. Leaves and faces index into
//! them.
//!
//! # Loading
//!
//! All memory acquired during a load is obtained from the [`Allocator`] the [`Bsp`] was
//! created with. A load either succeeds completely or leaves nothing behind: on any error,
//! every lump decoded so far is released before the error is returned.

mod error;
mod load;
pub mod lump;
pub mod miptex;

#[cfg(test)]
pub(crate) mod test_util;

use std::{
    fmt,
    io::{Read, Seek},
    sync::Arc,
};

use crate::{
    alloc::{Allocator, Block, Heap},
    parse::entity::{Entity, Property},
};

pub use self::{
    error::{BspError, BspErrorKind},
    lump::{
        ClipNode, Edge, Face, Header, Leaf, Lump, LumpId, Model, Node, Plane, TexInfo, Vertex,
    },
    miptex::{Miptex, MiptexLump},
};

/// Everything decoded from one file.
pub(crate) struct BspData {
    header: Header,
    entities: Block<Entity>,
    planes: Block<Plane>,
    miptex: MiptexLump,
    vertices: Block<Vertex>,
    visdata: Block<u8>,
    nodes: Block<Node>,
    texinfo: Block<TexInfo>,
    faces: Block<Face>,
    lighting: Block<u8>,
    clipnodes: Block<ClipNode>,
    leaves: Block<Leaf>,
    facelist: Block<i16>,
    edges: Block<Edge>,
    surfedges: Block<i32>,
    models: Block<Model>,
}

/// A BSP file and the allocator its data is accounted to.
///
/// A new `Bsp` is empty. Every accessor on an empty `Bsp` returns `None`, zero or an empty
/// slice.
pub struct Bsp {
    alloc: Arc<dyn Allocator>,
    data: Option<BspData>,
}

impl Bsp {
    pub fn new(alloc: Arc<dyn Allocator>) -> Bsp {
        Bsp { alloc, data: None }
    }

    /// Load a BSP file from `reader`, replacing anything previously loaded.
    ///
    /// The previous contents are released whether or not the load succeeds. On error the
    /// `Bsp` is left empty.
    pub fn load<R>(&mut self, reader: &mut R) -> Result<(), BspError>
    where
        R: Read + Seek,
    {
        self.unload();
        self.data = Some(load::load_data(reader, &self.alloc)?);
        Ok(())
    }

    /// Release everything loaded. Does nothing if the `Bsp` is empty.
    pub fn unload(&mut self) {
        if self.data.take().is_some() {
            debug!("Released BSP data");
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    pub fn header(&self) -> Option<&Header> {
        self.data.as_ref().map(|d| &d.header)
    }

    pub fn entities(&self) -> &[Entity] {
        match self.data {
            Some(ref d) => &d.entities,
            None => &[],
        }
    }

    pub fn entity(&self, entity_index: usize) -> Option<&Entity> {
        self.entities().get(entity_index)
    }

    pub fn num_entities(&self) -> usize {
        self.entities().len()
    }

    pub fn entity_num_properties(&self, entity_index: usize) -> usize {
        self.entity(entity_index).map_or(0, |e| e.len())
    }

    fn entity_property(&self, entity_index: usize, prop_index: usize) -> Option<&Property> {
        self.entity(entity_index)?.property(prop_index)
    }

    pub fn entity_property_key(&self, entity_index: usize, prop_index: usize) -> Option<&[u8]> {
        self.entity_property(entity_index, prop_index)
            .map(|p| p.key())
    }

    pub fn entity_property_value(&self, entity_index: usize, prop_index: usize) -> Option<&[u8]> {
        self.entity_property(entity_index, prop_index)
            .map(|p| p.value())
    }

    /// Return the value of the first property of the entity whose key is exactly `key`.
    pub fn entity_get_property<K>(&self, entity_index: usize, key: K) -> Option<&[u8]>
    where
        K: AsRef<[u8]>,
    {
        self.entity(entity_index)?.get(key)
    }

    pub fn planes(&self) -> &[Plane] {
        match self.data {
            Some(ref d) => &d.planes,
            None => &[],
        }
    }

    pub fn vertices(&self) -> &[Vertex] {
        match self.data {
            Some(ref d) => &d.vertices,
            None => &[],
        }
    }

    pub fn nodes(&self) -> &[Node] {
        match self.data {
            Some(ref d) => &d.nodes,
            None => &[],
        }
    }

    pub fn texinfo(&self) -> &[TexInfo] {
        match self.data {
            Some(ref d) => &d.texinfo,
            None => &[],
        }
    }

    pub fn faces(&self) -> &[Face] {
        match self.data {
            Some(ref d) => &d.faces,
            None => &[],
        }
    }

    pub fn clipnodes(&self) -> &[ClipNode] {
        match self.data {
            Some(ref d) => &d.clipnodes,
            None => &[],
        }
    }

    pub fn leaves(&self) -> &[Leaf] {
        match self.data {
            Some(ref d) => &d.leaves,
            None => &[],
        }
    }

    pub fn facelist(&self) -> &[i16] {
        match self.data {
            Some(ref d) => &d.facelist,
            None => &[],
        }
    }

    pub fn edges(&self) -> &[Edge] {
        match self.data {
            Some(ref d) => &d.edges,
            None => &[],
        }
    }

    pub fn surfedges(&self) -> &[i32] {
        match self.data {
            Some(ref d) => &d.surfedges,
            None => &[],
        }
    }

    pub fn models(&self) -> &[Model] {
        match self.data {
            Some(ref d) => &d.models,
            None => &[],
        }
    }

    pub fn visdata(&self) -> &[u8] {
        match self.data {
            Some(ref d) => &d.visdata,
            None => &[],
        }
    }

    pub fn lighting(&self) -> &[u8] {
        match self.data {
            Some(ref d) => &d.lighting,
            None => &[],
        }
    }

    pub fn num_planes(&self) -> usize {
        self.planes().len()
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices().len()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes().len()
    }

    pub fn num_texinfo(&self) -> usize {
        self.texinfo().len()
    }

    pub fn num_faces(&self) -> usize {
        self.faces().len()
    }

    pub fn num_clipnodes(&self) -> usize {
        self.clipnodes().len()
    }

    pub fn num_leaves(&self) -> usize {
        self.leaves().len()
    }

    pub fn num_facelist(&self) -> usize {
        self.facelist().len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges().len()
    }

    pub fn num_surfedges(&self) -> usize {
        self.surfedges().len()
    }

    pub fn num_models(&self) -> usize {
        self.models().len()
    }

    pub fn visdata_size(&self) -> usize {
        self.visdata().len()
    }

    pub fn lighting_size(&self) -> usize {
        self.lighting().len()
    }

    /// Return the texture directory, if a file is loaded.
    pub fn miptex_lump(&self) -> Option<&MiptexLump> {
        self.data.as_ref().map(|d| &d.miptex)
    }

    /// Return the number of slots in the texture directory, including empty ones.
    pub fn miptex_count(&self) -> usize {
        self.miptex_lump().map_or(0, |m| m.count())
    }

    pub fn miptex(&self, index: usize) -> Option<Miptex> {
        self.miptex_lump()?.get(index)
    }

    /// Return the palette indices of mipmap `level` of texture `index`.
    pub fn miptex_mip(&self, index: usize, level: usize) -> Option<&[u8]> {
        self.miptex(index)?.mipmap(level)
    }
}

impl Default for Bsp {
    fn default() -> Bsp {
        Bsp::new(Arc::new(Heap))
    }
}

impl fmt::Debug for Bsp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Bsp")
            .field("loaded", &self.is_loaded())
            .field("entities", &self.num_entities())
            .field("planes", &self.num_planes())
            .field("miptex", &self.miptex_count())
            .field("faces", &self.num_faces())
            .field("models", &self.num_models())
            .finish()
    }
}

/// Load a BSP file into a new heap-backed `Bsp`.
pub fn load<R>(reader: &mut R) -> Result<Bsp, BspError>
where
    R: Read + Seek,
{
    let mut bsp = Bsp::default();
    bsp.load(reader)?;
    Ok(bsp)
}
