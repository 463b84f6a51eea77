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

//! In-memory BSP images for tests.

use std::{
    alloc::{alloc, dealloc, Layout},
    io::{self, Read, Seek, SeekFrom},
    ptr::NonNull,
    sync::Mutex,
};

use crate::{
    alloc::Allocator,
    bsp::lump::{LumpId, HEADER_SIZE, LUMP_COUNT, VERSION},
};

use byteorder::{LittleEndian, WriteBytesExt};

pub struct BspBuilder {
    version: i32,
    lumps: Vec<Vec<u8>>,
    overrides: Vec<(LumpId, i32, i32)>,
}

impl BspBuilder {
    pub fn new() -> BspBuilder {
        BspBuilder {
            version: VERSION,
            lumps: vec![Vec::new(); LUMP_COUNT],
            overrides: Vec::new(),
        }
    }

    pub fn version(mut self, version: i32) -> BspBuilder {
        self.version = version;
        self
    }

    pub fn lump(mut self, id: LumpId, data: Vec<u8>) -> BspBuilder {
        self.lumps[id as usize] = data;
        self
    }

    /// Write the given descriptor for `id` instead of one pointing at its data.
    pub fn raw_lump(mut self, id: LumpId, offset: i32, length: i32) -> BspBuilder {
        self.overrides.push((id, offset, length));
        self
    }

    /// Return the file offset the data of `id` will be written at.
    pub fn offset_of(&self, id: LumpId) -> usize {
        HEADER_SIZE
            + self.lumps[..id as usize]
                .iter()
                .map(|l| l.len())
                .sum::<usize>()
    }

    pub fn build(self) -> Vec<u8> {
        let mut data = Vec::new();
        data.write_i32::<LittleEndian>(self.version).unwrap();

        let mut offset = HEADER_SIZE;
        for (i, lump) in self.lumps.iter().enumerate() {
            let (ofs, len) = match self.overrides.iter().find(|o| o.0 as usize == i) {
                Some(&(_, o, l)) => (o, l),
                None if lump.is_empty() => (0, 0),
                None => (offset as i32, lump.len() as i32),
            };

            data.write_i32::<LittleEndian>(ofs).unwrap();
            data.write_i32::<LittleEndian>(len).unwrap();
            offset += lump.len();
        }

        for lump in self.lumps.iter() {
            data.extend_from_slice(lump);
        }

        data
    }
}

/// A reader that fails every read touching bytes at or past `fail_at`.
pub struct FailingReader<R> {
    inner: R,
    pos: u64,
    fail_at: u64,
}

impl<R> FailingReader<R> {
    pub fn new(inner: R, fail_at: u64) -> FailingReader<R> {
        FailingReader {
            inner,
            pos: 0,
            fail_at,
        }
    }
}

impl<R> Read for FailingReader<R>
where
    R: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !buf.is_empty() && self.pos + buf.len() as u64 > self.fail_at {
            return Err(io::Error::new(io::ErrorKind::Other, "simulated read failure"));
        }

        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R> Seek for FailingReader<R>
where
    R: Seek,
{
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = self.inner.seek(pos)?;
        Ok(self.pos)
    }
}

/// A bump allocator over one fixed region. Nothing is reclaimed until the arena is dropped.
pub struct Arena {
    base: NonNull<u8>,
    layout: Layout,
    next: Mutex<usize>,
}

// the region is only handed out under the lock
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    pub fn new(size: usize) -> Arena {
        let layout = Layout::from_size_align(size, 16).unwrap();
        let base = NonNull::new(unsafe { alloc(layout) }).unwrap();

        Arena {
            base,
            layout,
            next: Mutex::new(0),
        }
    }

    pub fn contains(&self, ptr: *const u8) -> bool {
        let start = self.base.as_ptr() as usize;
        let p = ptr as usize;
        p >= start && p < start + self.layout.size()
    }

    pub fn used(&self) -> usize {
        *self.next.lock().unwrap()
    }
}

unsafe impl Allocator for Arena {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let mut next = self.next.lock().unwrap();

        let start = (*next + layout.align() - 1) & !(layout.align() - 1);
        let end = start.checked_add(layout.size())?;
        if end > self.layout.size() {
            return None;
        }

        *next = end;
        NonNull::new(unsafe { self.base.as_ptr().add(start) })
    }

    unsafe fn release(&self, _ptr: NonNull<u8>, _layout: Layout) {}
}

impl Drop for Arena {
    fn drop(&mut self) {
        unsafe { dealloc(self.base.as_ptr(), self.layout) };
    }
}
