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

//! On-disk record types.
//!
//! Each record is decoded field by field from its little-endian, packed file representation.
//! No record is validated against any other lump; index fields are kept exactly as stored.

use std::io;

use byteorder::{LittleEndian, ReadBytesExt};
use cgmath::Vector3;
use num_traits::FromPrimitive;

pub const VERSION: i32 = 29;
pub const LUMP_COUNT: usize = 15;

/// Size of the file header: the version followed by 15 `(offset, length)` pairs.
pub const HEADER_SIZE: usize = 4 + LUMP_COUNT * 8;

pub const MAX_LIGHTSTYLES: usize = 4;
pub const NUM_AMBIENTS: usize = 4;
pub const MAX_HULLS: usize = 4;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, EnumIter)]
pub enum LumpId {
    Entities = 0,
    Planes = 1,
    Miptex = 2,
    Vertices = 3,
    Visdata = 4,
    Nodes = 5,
    TexInfo = 6,
    Faces = 7,
    Lighting = 8,
    ClipNodes = 9,
    Leaves = 10,
    FaceList = 11,
    Edges = 12,
    SurfEdges = 13,
    Models = 14,
}

impl LumpId {
    pub fn name(&self) -> &'static str {
        match *self {
            LumpId::Entities => "entities",
            LumpId::Planes => "planes",
            LumpId::Miptex => "miptex",
            LumpId::Vertices => "vertices",
            LumpId::Visdata => "visdata",
            LumpId::Nodes => "nodes",
            LumpId::TexInfo => "texinfo",
            LumpId::Faces => "faces",
            LumpId::Lighting => "lighting",
            LumpId::ClipNodes => "clipnodes",
            LumpId::Leaves => "leaves",
            LumpId::FaceList => "facelist",
            LumpId::Edges => "edges",
            LumpId::SurfEdges => "surfedges",
            LumpId::Models => "models",
        }
    }
}

/// A `(byte offset, byte length)` region of the file.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Lump {
    pub offset: i32,
    pub length: i32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    pub version: i32,
    pub lumps: [Lump; LUMP_COUNT],
}

impl Header {
    pub fn lump(&self, id: LumpId) -> &Lump {
        &self.lumps[id as usize]
    }
}

/// A fixed-size record stored in a lump.
pub trait Record: Clone + Default {
    /// Size of the record in the file, in bytes.
    const SIZE: usize;

    fn read<R>(reader: &mut R) -> io::Result<Self>
    where
        R: ReadBytesExt;
}

fn read_f32s<R>(reader: &mut R, out: &mut [f32]) -> io::Result<()>
where
    R: ReadBytesExt,
{
    for x in out.iter_mut() {
        *x = reader.read_f32::<LittleEndian>()?;
    }

    Ok(())
}

fn read_i16s<R>(reader: &mut R, out: &mut [i16]) -> io::Result<()>
where
    R: ReadBytesExt,
{
    for x in out.iter_mut() {
        *x = reader.read_i16::<LittleEndian>()?;
    }

    Ok(())
}

/// The axis a plane is aligned with, as recorded by the map compiler.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum PlaneKind {
    X = 0,
    Y = 1,
    Z = 2,
    AnyX = 3,
    AnyY = 4,
    AnyZ = 5,
}

/// One of the hyperplanes partitioning the map.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Plane {
    pub normal: [f32; 3],
    pub dist: f32,
    pub kind: i32,
}

impl Plane {
    pub fn normal(&self) -> Vector3<f32> {
        self.normal.into()
    }

    /// Returns `None` if the stored type is not a known axis.
    pub fn kind(&self) -> Option<PlaneKind> {
        PlaneKind::from_i32(self.kind)
    }
}

impl Record for Plane {
    const SIZE: usize = 20;

    fn read<R>(reader: &mut R) -> io::Result<Plane>
    where
        R: ReadBytesExt,
    {
        let mut normal = [0.0; 3];
        read_f32s(reader, &mut normal)?;

        Ok(Plane {
            normal,
            dist: reader.read_f32::<LittleEndian>()?,
            kind: reader.read_i32::<LittleEndian>()?,
        })
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Vertex {
    pub position: [f32; 3],
}

impl Vertex {
    pub fn position(&self) -> Vector3<f32> {
        self.position.into()
    }
}

impl Record for Vertex {
    const SIZE: usize = 12;

    fn read<R>(reader: &mut R) -> io::Result<Vertex>
    where
        R: ReadBytesExt,
    {
        let mut position = [0.0; 3];
        read_f32s(reader, &mut position)?;
        Ok(Vertex { position })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeChild {
    Node(usize),
    Leaf(usize),
}

/// A node of the rendering tree.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Node {
    pub plane: i32,
    pub children: [i16; 2],
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub first_face: u16,
    pub num_faces: u16,
}

impl Node {
    /// Decode the front (0) or back (1) child.
    ///
    /// If the child ID is positive, it points to another internal node. If it is negative, its
    /// bitwise negation points to a leaf.
    pub fn child(&self, side: usize) -> Option<NodeChild> {
        self.children.get(side).map(|&c| match c {
            c if c < 0 => NodeChild::Leaf((!c) as usize),
            c => NodeChild::Node(c as usize),
        })
    }
}

impl Record for Node {
    const SIZE: usize = 24;

    fn read<R>(reader: &mut R) -> io::Result<Node>
    where
        R: ReadBytesExt,
    {
        let plane = reader.read_i32::<LittleEndian>()?;
        let mut children = [0; 2];
        read_i16s(reader, &mut children)?;
        let mut mins = [0; 3];
        read_i16s(reader, &mut mins)?;
        let mut maxs = [0; 3];
        read_i16s(reader, &mut maxs)?;

        Ok(Node {
            plane,
            children,
            mins,
            maxs,
            first_face: reader.read_u16::<LittleEndian>()?,
            num_faces: reader.read_u16::<LittleEndian>()?,
        })
    }
}

bitflags! {
    pub struct TexInfoFlags: u32 {
        /// The surface is not lightmapped (sky and liquids).
        const SPECIAL = 0x1;
    }
}

/// Texture projection of a face.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct TexInfo {
    pub vecs: [[f32; 4]; 2],
    pub miptex: i32,
    pub flags: i32,
}

impl TexInfo {
    pub fn s_vector(&self) -> Vector3<f32> {
        Vector3::new(self.vecs[0][0], self.vecs[0][1], self.vecs[0][2])
    }

    pub fn s_offset(&self) -> f32 {
        self.vecs[0][3]
    }

    pub fn t_vector(&self) -> Vector3<f32> {
        Vector3::new(self.vecs[1][0], self.vecs[1][1], self.vecs[1][2])
    }

    pub fn t_offset(&self) -> f32 {
        self.vecs[1][3]
    }

    pub fn flags(&self) -> TexInfoFlags {
        TexInfoFlags::from_bits_truncate(self.flags as u32)
    }
}

impl Record for TexInfo {
    const SIZE: usize = 40;

    fn read<R>(reader: &mut R) -> io::Result<TexInfo>
    where
        R: ReadBytesExt,
    {
        let mut vecs = [[0.0; 4]; 2];
        for v in vecs.iter_mut() {
            read_f32s(reader, v)?;
        }

        Ok(TexInfo {
            vecs,
            miptex: reader.read_i32::<LittleEndian>()?,
            flags: reader.read_i32::<LittleEndian>()?,
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FaceSide {
    Front,
    Back,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Face {
    pub plane: i16,
    pub side: i16,
    /// Index of the first entry in the surfedge lump.
    pub first_edge: i32,
    pub num_edges: i16,
    pub texinfo: i16,
    pub styles: [u8; MAX_LIGHTSTYLES],
    /// Byte offset into the lighting lump, or -1.
    pub lightofs: i32,
}

impl Face {
    pub fn side(&self) -> Option<FaceSide> {
        match self.side {
            0 => Some(FaceSide::Front),
            1 => Some(FaceSide::Back),
            _ => None,
        }
    }

    pub fn lightmap_offset(&self) -> Option<usize> {
        match self.lightofs {
            o if o < 0 => None,
            o => Some(o as usize),
        }
    }
}

impl Record for Face {
    const SIZE: usize = 20;

    fn read<R>(reader: &mut R) -> io::Result<Face>
    where
        R: ReadBytesExt,
    {
        let plane = reader.read_i16::<LittleEndian>()?;
        let side = reader.read_i16::<LittleEndian>()?;
        let first_edge = reader.read_i32::<LittleEndian>()?;
        let num_edges = reader.read_i16::<LittleEndian>()?;
        let texinfo = reader.read_i16::<LittleEndian>()?;
        let mut styles = [0; MAX_LIGHTSTYLES];
        reader.read_exact(&mut styles)?;

        Ok(Face {
            plane,
            side,
            first_edge,
            num_edges,
            texinfo,
            styles,
            lightofs: reader.read_i32::<LittleEndian>()?,
        })
    }
}

/// The contents of a leaf or of a collision node's child.
///
/// The file stores these negated to distinguish them from node IDs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum LeafContents {
    Empty = 1,
    Solid = 2,
    Water = 3,
    Slime = 4,
    Lava = 5,
    Sky = 6,
    Origin = 7,
    Clip = 8,
    Current0 = 9,
    Current90 = 10,
    Current180 = 11,
    Current270 = 12,
    CurrentUp = 13,
    CurrentDown = 14,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClipNodeChild {
    Node(usize),
    Contents(LeafContents),
}

/// A node of one of the collision hulls.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ClipNode {
    pub plane: i32,
    pub children: [i16; 2],
}

impl ClipNode {
    /// Returns `None` for a side other than 0 or 1, or for unknown contents.
    pub fn child(&self, side: usize) -> Option<ClipNodeChild> {
        match *self.children.get(side)? {
            c if c < 0 => LeafContents::from_i32(-(c as i32)).map(ClipNodeChild::Contents),
            c => Some(ClipNodeChild::Node(c as usize)),
        }
    }
}

impl Record for ClipNode {
    const SIZE: usize = 8;

    fn read<R>(reader: &mut R) -> io::Result<ClipNode>
    where
        R: ReadBytesExt,
    {
        let plane = reader.read_i32::<LittleEndian>()?;
        let mut children = [0; 2];
        read_i16s(reader, &mut children)?;
        Ok(ClipNode { plane, children })
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Leaf {
    pub contents: i32,
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    /// Index of the first entry in the facelist lump.
    pub first_face: u16,
    pub num_faces: u16,
    pub ambient_level: [i8; NUM_AMBIENTS],
}

impl Leaf {
    pub fn contents(&self) -> Option<LeafContents> {
        // note the negation here
        LeafContents::from_i64(-(self.contents as i64))
    }
}

impl Record for Leaf {
    const SIZE: usize = 24;

    fn read<R>(reader: &mut R) -> io::Result<Leaf>
    where
        R: ReadBytesExt,
    {
        let contents = reader.read_i32::<LittleEndian>()?;
        let mut mins = [0; 3];
        read_i16s(reader, &mut mins)?;
        let mut maxs = [0; 3];
        read_i16s(reader, &mut maxs)?;
        let first_face = reader.read_u16::<LittleEndian>()?;
        let num_faces = reader.read_u16::<LittleEndian>()?;
        let mut ambient_level = [0; NUM_AMBIENTS];
        for a in ambient_level.iter_mut() {
            *a = reader.read_i8()?;
        }

        Ok(Leaf {
            contents,
            mins,
            maxs,
            first_face,
            num_faces,
            ambient_level,
        })
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Edge {
    pub vertices: [u16; 2],
}

impl Record for Edge {
    const SIZE: usize = 4;

    fn read<R>(reader: &mut R) -> io::Result<Edge>
    where
        R: ReadBytesExt,
    {
        Ok(Edge {
            vertices: [
                reader.read_u16::<LittleEndian>()?,
                reader.read_u16::<LittleEndian>()?,
            ],
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EdgeDirection {
    Forward = 0,
    Backward = 1,
}

/// Split a surfedge into an index into the edge lump and the direction the edge is walked.
pub fn surfedge(index: i32) -> (usize, EdgeDirection) {
    if index >= 0 {
        (index as usize, EdgeDirection::Forward)
    } else {
        ((index as i64).abs() as usize, EdgeDirection::Backward)
    }
}

impl Record for i16 {
    const SIZE: usize = 2;

    fn read<R>(reader: &mut R) -> io::Result<i16>
    where
        R: ReadBytesExt,
    {
        reader.read_i16::<LittleEndian>()
    }
}

impl Record for i32 {
    const SIZE: usize = 4;

    fn read<R>(reader: &mut R) -> io::Result<i32>
    where
        R: ReadBytesExt,
    {
        reader.read_i32::<LittleEndian>()
    }
}

/// A brush model. Model 0 is the world.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Model {
    pub mins: [f32; 3],
    pub maxs: [f32; 3],
    pub origin: [f32; 3],
    pub headnode: [i32; MAX_HULLS],
    pub first_face: i32,
    pub num_faces: i32,
}

impl Model {
    pub fn mins(&self) -> Vector3<f32> {
        self.mins.into()
    }

    pub fn maxs(&self) -> Vector3<f32> {
        self.maxs.into()
    }

    pub fn origin(&self) -> Vector3<f32> {
        self.origin.into()
    }
}

impl Record for Model {
    const SIZE: usize = 60;

    fn read<R>(reader: &mut R) -> io::Result<Model>
    where
        R: ReadBytesExt,
    {
        let mut model = Model::default();
        read_f32s(reader, &mut model.mins)?;
        read_f32s(reader, &mut model.maxs)?;
        read_f32s(reader, &mut model.origin)?;
        for h in model.headnode.iter_mut() {
            *h = reader.read_i32::<LittleEndian>()?;
        }
        model.first_face = reader.read_i32::<LittleEndian>()?;
        model.num_faces = reader.read_i32::<LittleEndian>()?;
        Ok(model)
    }
}
