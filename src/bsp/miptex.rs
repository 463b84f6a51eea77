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

//! The texture directory.
//!
//! The miptex lump starts with a 32-bit count and a list of 32-bit offsets, given in bytes from
//! the beginning of the lump. Each offset points at a texture header consisting of a 16-byte
//! name field, a 32-bit width, a 32-bit height and 4 32-bit mipmap offsets. The mipmap offsets
//! are given in bytes from the beginning of the texture. Each mipmap has its dimensions halved
//! from the previous one, and each byte is one pixel indexing into `gfx/palette.lmp`.
//!
//! The headers are not copied out of the lump. A resolved slot only records where its header
//! lives, and the header fields are read from the raw lump on access.

use std::{mem::size_of, sync::Arc};

use crate::{
    alloc::{Allocator, Block},
    bsp::{BspError, BspErrorKind},
    util,
};

use byteorder::{ByteOrder, LittleEndian};

pub const MIPLEVELS: usize = 4;
pub const TEX_NAME_MAX: usize = 16;

/// Size of a texture header: name, width, height and the mipmap offsets.
pub const MIPTEX_HEADER_SIZE: usize = TEX_NAME_MAX + 8 + 4 * MIPLEVELS;

/// The decoded miptex lump: the raw bytes and the slots resolved into them.
pub struct MiptexLump {
    raw: Block<u8>,
    offsets: Block<i32>,
    slots: Block<Option<usize>>,
}

impl MiptexLump {
    pub fn empty(alloc: Arc<dyn Allocator>) -> MiptexLump {
        MiptexLump {
            raw: Block::new(alloc.clone()),
            offsets: Block::new(alloc.clone()),
            slots: Block::new(alloc),
        }
    }

    /// Resolve the texture directory at the start of `raw`.
    ///
    /// The lump is rejected if it is too short to hold the directory it declares. Slots whose
    /// offset does not leave room for a whole texture header inside the lump are left empty.
    pub fn resolve(alloc: Arc<dyn Allocator>, raw: Block<u8>) -> Result<MiptexLump, BspError> {
        if raw.len() < size_of::<i32>() {
            return Err(BspError::with_msg(
                BspErrorKind::Format,
                format!("Miptex lump too short for a directory ({} bytes)", raw.len()),
            ));
        }

        let count = LittleEndian::read_i32(&raw[..4]);
        debug!("Miptex directory has {} entries", count);

        if count < 0 {
            return Err(BspError::with_msg(
                BspErrorKind::Format,
                format!("Negative miptex count ({})", count),
            ));
        }

        let count = count as usize;
        let dir_size = match count
            .checked_mul(size_of::<i32>())
            .and_then(|s| s.checked_add(size_of::<i32>()))
        {
            Some(s) => s,
            None => {
                return Err(BspError::with_msg(
                    BspErrorKind::Format,
                    format!("Miptex directory size overflows (count={})", count),
                ))
            }
        };

        if raw.len() < dir_size {
            return Err(BspError::with_msg(
                BspErrorKind::Format,
                format!(
                    "Miptex directory truncated (need {} bytes, have {})",
                    dir_size,
                    raw.len()
                ),
            ));
        }

        let mut offsets: Block<i32> = Block::zeroed(alloc.clone(), count)?;
        LittleEndian::read_i32_into(&raw[4..dir_size], &mut offsets);

        let mut slots: Block<Option<usize>> = Block::zeroed(alloc, count)?;
        for (i, (slot, &ofs)) in slots.iter_mut().zip(offsets.iter()).enumerate() {
            *slot = match ofs {
                o if o <= 0 => {
                    debug!("Miptex {}: not present (offset={})", i, o);
                    None
                }

                o if o as usize >= raw.len() => {
                    warn!(
                        "Miptex {}: offset out of range: {} (lump size={})",
                        i,
                        o,
                        raw.len()
                    );
                    None
                }

                o if o as usize + MIPTEX_HEADER_SIZE > raw.len() => {
                    warn!("Miptex {}: header truncated at offset {}", i, o);
                    None
                }

                o => Some(o as usize),
            };
        }

        Ok(MiptexLump {
            raw,
            offsets,
            slots,
        })
    }

    /// Return the number of entries in the directory, including empty slots.
    pub fn count(&self) -> usize {
        self.slots.len()
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Return the directory offsets as stored.
    pub fn offsets(&self) -> &[i32] {
        &self.offsets
    }

    /// Return the texture in slot `index`, or `None` if the slot is empty or out of range.
    pub fn get(&self, index: usize) -> Option<Miptex> {
        let offset = (*self.slots.get(index)?)?;
        let header = self.raw.get(offset..offset + MIPTEX_HEADER_SIZE)?;

        Some(Miptex {
            lump: &self.raw,
            offset,
            header,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<Miptex<'_>>> + '_ {
        (0..self.count()).map(move |i| self.get(i))
    }
}

/// A texture header viewed inside the raw miptex lump.
#[derive(Clone, Copy, Debug)]
pub struct Miptex<'a> {
    lump: &'a [u8],
    offset: usize,
    header: &'a [u8],
}

impl<'a> Miptex<'a> {
    /// Return the byte offset of the header within the lump.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Return the texture name with its zero padding removed.
    pub fn name(&self) -> &'a [u8] {
        util::trim_nul(&self.header[..TEX_NAME_MAX])
    }

    pub fn width(&self) -> u32 {
        LittleEndian::read_u32(&self.header[TEX_NAME_MAX..TEX_NAME_MAX + 4])
    }

    pub fn height(&self) -> u32 {
        LittleEndian::read_u32(&self.header[TEX_NAME_MAX + 4..TEX_NAME_MAX + 8])
    }

    /// Return the offsets of the mipmaps, in bytes from the start of this header.
    pub fn mip_offsets(&self) -> [u32; MIPLEVELS] {
        let mut offsets = [0; MIPLEVELS];
        LittleEndian::read_u32_into(&self.header[TEX_NAME_MAX + 8..], &mut offsets);
        offsets
    }

    /// Return the palette indices of mipmap `level`.
    ///
    /// Returns `None` if `level` is out of range or the mipmap does not fit inside the lump.
    pub fn mipmap(&self, level: usize) -> Option<&'a [u8]> {
        if level >= MIPLEVELS {
            return None;
        }

        let factor = 1usize << level;
        let size = (self.width() as usize / factor).checked_mul(self.height() as usize / factor)?;
        let start = self.offset.checked_add(self.mip_offsets()[level] as usize)?;
        let end = start.checked_add(size)?;
        self.lump.get(start..end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::alloc::CountingAllocator;

    use byteorder::WriteBytesExt;

    fn texture(name: &[u8], width: u32, height: u32) -> Vec<u8> {
        let mut data = vec![0u8; TEX_NAME_MAX];
        data[..name.len()].copy_from_slice(name);
        data.write_u32::<LittleEndian>(width).unwrap();
        data.write_u32::<LittleEndian>(height).unwrap();

        let mut ofs = MIPTEX_HEADER_SIZE as u32;
        for level in 0..MIPLEVELS {
            data.write_u32::<LittleEndian>(ofs).unwrap();
            ofs += (width >> level) * (height >> level);
        }

        for level in 0..MIPLEVELS {
            let size = ((width >> level) * (height >> level)) as usize;
            data.extend(std::iter::repeat(level as u8).take(size));
        }

        data
    }

    fn lump(offsets: &[i32], tail: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        data.write_i32::<LittleEndian>(offsets.len() as i32).unwrap();
        for o in offsets {
            data.write_i32::<LittleEndian>(*o).unwrap();
        }
        data.extend_from_slice(tail);
        data
    }

    fn resolve(data: &[u8]) -> Result<MiptexLump, BspError> {
        let alloc: Arc<dyn Allocator> = Arc::new(CountingAllocator::new());
        let raw = Block::from_slice(alloc.clone(), data).unwrap();
        MiptexLump::resolve(alloc, raw)
    }

    #[test]
    fn test_resolve() {
        let tex = texture(b"wall", 16, 8);
        let data = lump(&[8], &tex);

        let miptex = resolve(&data).unwrap();
        assert_eq!(miptex.count(), 1);
        assert_eq!(miptex.offsets(), &[8]);

        let tex = miptex.get(0).unwrap();
        assert_eq!(tex.offset(), 8);
        assert_eq!(tex.name(), b"wall");
        assert_eq!(tex.width(), 16);
        assert_eq!(tex.height(), 8);
        assert_eq!(tex.mipmap(0).unwrap().len(), 128);
        assert_eq!(tex.mipmap(3).unwrap(), &[3, 3]);
        assert!(tex.mipmap(4).is_none());
    }

    #[test]
    fn test_invalid_slots_are_empty() {
        let tex = texture(b"sky1", 8, 8);
        // 4 byte count + 4 offsets
        let first = 20;
        let mut data = lump(&[first, 0, -1, 0], &tex);
        let len = data.len() as i32;
        LittleEndian::write_i32(&mut data[8..12], len);
        LittleEndian::write_i32(&mut data[16..20], len - 8);

        let miptex = resolve(&data).unwrap();
        assert_eq!(miptex.count(), 4);
        assert_eq!(miptex.get(0).unwrap().name(), b"sky1");
        // offset equal to the lump size
        assert!(miptex.get(1).is_none());
        // negative offset
        assert!(miptex.get(2).is_none());
        // header would run past the end of the lump
        assert!(miptex.get(3).is_none());
        assert!(miptex.get(4).is_none());
        assert_eq!(miptex.iter().filter(|t| t.is_some()).count(), 1);
    }

    #[test]
    fn test_truncated_directory() {
        let data = lump(&[8, 8, 8], &[]);
        let err = resolve(&data[..12]).err().unwrap();
        assert_eq!(err.kind(), BspErrorKind::Format);
    }

    #[test]
    fn test_too_short() {
        let err = resolve(&[1, 0]).err().unwrap();
        assert_eq!(err.kind(), BspErrorKind::Format);
    }

    #[test]
    fn test_negative_count() {
        let mut data = lump(&[], &[]);
        LittleEndian::write_i32(&mut data[..4], -3);
        let err = resolve(&data).err().unwrap();
        assert_eq!(err.kind(), BspErrorKind::Format);
    }

    #[test]
    fn test_huge_count() {
        let counter = Arc::new(CountingAllocator::new());
        let alloc: Arc<dyn Allocator> = counter.clone();

        let mut data = lump(&[8], &[]);
        LittleEndian::write_i32(&mut data[..4], i32::max_value());
        let raw = Block::from_slice(alloc.clone(), &data).unwrap();

        let err = MiptexLump::resolve(alloc, raw).err().unwrap();
        assert_eq!(err.kind(), BspErrorKind::Format);
        // nothing was acquired for the directory
        assert_eq!(counter.total(), 1);
        assert_eq!(counter.live(), 0);
    }

    #[test]
    fn test_mipmap_out_of_bounds() {
        let mut tex = texture(b"big", 64, 64);
        tex.truncate(MIPTEX_HEADER_SIZE + 10);
        let data = lump(&[8], &tex);

        let miptex = resolve(&data).unwrap();
        let tex = miptex.get(0).unwrap();
        assert_eq!(tex.width(), 64);
        assert!(tex.mipmap(0).is_none());
    }
}
