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

//! Caller-supplied memory for loaded BSP data.
//!
//! Every buffer the loader keeps is carved out of memory handed over by an [`Allocator`]
//! supplied by the caller, and handed back to it when no longer needed. Buffers are held in a
//! [`Block`], which releases its storage when dropped, so an error anywhere in a load returns
//! everything acquired up to that point.

use std::{
    alloc::{alloc, dealloc, Layout},
    fmt,
    marker::PhantomData,
    mem,
    ops::{Deref, DerefMut},
    ptr::{self, NonNull},
    slice,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use crate::bsp::{BspError, BspErrorKind};

/// The allocate/release contract consumed by the loader.
///
/// # Safety
///
/// A pointer returned by `allocate` must be valid for reads and writes of `layout.size()`
/// bytes, aligned to `layout.align()`, and must stay valid until it is passed to `release`.
pub unsafe trait Allocator: Send + Sync {
    /// Request a block of memory fitting `layout`. Returns `None` if the request is refused.
    ///
    /// `layout` never has a size of zero.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Return a block previously granted by `allocate`.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on this allocator with the same `layout`,
    /// and must not be used afterwards.
    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout);
}

/// An allocator backed by the global heap.
#[derive(Clone, Copy, Debug, Default)]
pub struct Heap;

unsafe impl Allocator for Heap {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        // layout has a nonzero size
        NonNull::new(unsafe { alloc(layout) })
    }

    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        dealloc(ptr.as_ptr(), layout);
    }
}

/// A heap allocator that keeps count of live allocations and can be told to refuse requests.
///
/// With a limit of `n`, the first `n` requests are granted and every request after that is
/// refused.
#[derive(Debug, Default)]
pub struct CountingAllocator {
    live: AtomicUsize,
    live_bytes: AtomicUsize,
    total: AtomicUsize,
    limit: Option<usize>,
}

impl CountingAllocator {
    pub fn new() -> CountingAllocator {
        CountingAllocator::default()
    }

    pub fn with_limit(limit: usize) -> CountingAllocator {
        CountingAllocator {
            limit: Some(limit),
            ..CountingAllocator::default()
        }
    }

    /// Return the number of allocations not yet released.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Return the number of bytes not yet released.
    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::SeqCst)
    }

    /// Return the number of allocations granted so far.
    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

unsafe impl Allocator for CountingAllocator {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if let Some(limit) = self.limit {
            if self.total() >= limit {
                return None;
            }
        }

        let ptr = Heap.allocate(layout)?;
        self.total.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        self.live_bytes.fetch_add(layout.size(), Ordering::SeqCst);
        Some(ptr)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        Heap.release(ptr, layout);
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.live_bytes.fetch_sub(layout.size(), Ordering::SeqCst);
    }
}

// Layout of storage for `count` elements, or `None` if no memory is needed.
fn storage_layout<T>(count: usize) -> Result<Option<Layout>, BspError> {
    if count == 0 || mem::size_of::<T>() == 0 {
        return Ok(None);
    }

    match Layout::array::<T>(count) {
        Ok(layout) => Ok(Some(layout)),
        Err(_) => Err(BspError::with_msg(
            BspErrorKind::Allocation,
            format!("Allocation of {} elements overflows", count),
        )),
    }
}

fn acquire<T>(alloc: &Arc<dyn Allocator>, count: usize) -> Result<NonNull<T>, BspError> {
    let layout = match storage_layout::<T>(count)? {
        Some(l) => l,
        None => return Ok(NonNull::dangling()),
    };

    match alloc.allocate(layout) {
        Some(ptr) => Ok(ptr.cast()),
        None => Err(BspError::with_msg(
            BspErrorKind::Allocation,
            format!("Allocator refused {} bytes", layout.size()),
        )),
    }
}

/// A sequence of `T` stored in memory obtained from an [`Allocator`].
///
/// The block has room for `capacity()` elements. Pushing onto a full block doubles its
/// capacity. The storage is returned to the allocator when the block is dropped.
pub struct Block<T> {
    ptr: NonNull<T>,
    len: usize,
    capacity: usize,
    alloc: Arc<dyn Allocator>,
    _marker: PhantomData<T>,
}

// a Block owns its elements like a Vec does
unsafe impl<T> Send for Block<T> where T: Send {}
unsafe impl<T> Sync for Block<T> where T: Sync {}

impl<T> Block<T> {
    /// Construct a new, empty `Block`. This does not allocate.
    pub fn new(alloc: Arc<dyn Allocator>) -> Block<T> {
        Block {
            ptr: NonNull::dangling(),
            len: 0,
            capacity: 0,
            alloc,
            _marker: PhantomData,
        }
    }

    /// Construct an empty `Block` with room for exactly `capacity` elements.
    ///
    /// If `capacity` is 0, the block will not allocate.
    pub fn with_capacity(alloc: Arc<dyn Allocator>, capacity: usize) -> Result<Block<T>, BspError> {
        let ptr = acquire::<T>(&alloc, capacity)?;

        Ok(Block {
            ptr,
            len: 0,
            capacity,
            alloc,
            _marker: PhantomData,
        })
    }

    /// Return the number of elements the block can hold without growing.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_slice(&self) -> &[T] {
        self
    }

    /// Move the contents into new storage for `new_capacity` elements.
    ///
    /// The first `min(len, new_capacity)` elements are kept. The old storage is released
    /// whether or not the new storage could be acquired; if it could not, the block is left
    /// empty with no capacity.
    pub fn grow(&mut self, new_capacity: usize) -> Result<(), BspError> {
        let new_ptr = match acquire::<T>(&self.alloc, new_capacity) {
            Ok(p) => p,
            Err(e) => {
                self.clear();
                self.release();
                return Err(e);
            }
        };

        self.truncate(new_capacity);
        unsafe {
            ptr::copy_nonoverlapping(self.ptr.as_ptr(), new_ptr.as_ptr(), self.len);
        }

        // the elements now live in the new storage
        self.release();
        self.ptr = new_ptr;
        self.capacity = new_capacity;
        Ok(())
    }

    /// Append an element, doubling the capacity first if the block is full.
    pub fn push(&mut self, item: T) -> Result<(), BspError> {
        if self.len == self.capacity {
            let new_capacity = match self.capacity {
                0 => 1,
                c => match c.checked_mul(2) {
                    Some(n) => n,
                    None => {
                        return Err(BspError::with_msg(
                            BspErrorKind::Allocation,
                            "Block capacity overflows",
                        ))
                    }
                },
            };
            self.grow(new_capacity)?;
        }

        unsafe {
            ptr::write(self.ptr.as_ptr().add(self.len), item);
        }
        self.len += 1;
        Ok(())
    }

    /// Drop every element past the first `len`.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len {
            return;
        }

        let tail = self.len - len;
        self.len = len;
        unsafe {
            ptr::drop_in_place(slice::from_raw_parts_mut(self.ptr.as_ptr().add(len), tail));
        }
    }

    pub fn clear(&mut self) {
        self.truncate(0);
    }

    // Return the storage to the allocator without dropping any elements.
    fn release(&mut self) {
        if let Ok(Some(layout)) = storage_layout::<T>(self.capacity) {
            unsafe {
                self.alloc.release(self.ptr.cast(), layout);
            }
        }

        self.ptr = NonNull::dangling();
        self.capacity = 0;
    }
}

impl<T> Block<T>
where
    T: Default,
{
    /// Construct a `Block` of `count` default-valued (zeroed) elements.
    pub fn zeroed(alloc: Arc<dyn Allocator>, count: usize) -> Result<Block<T>, BspError> {
        let mut block: Block<T> = Block::with_capacity(alloc, count)?;
        for i in 0..count {
            unsafe {
                ptr::write(block.ptr.as_ptr().add(i), T::default());
            }
            block.len = i + 1;
        }

        Ok(block)
    }
}

impl<T> Block<T>
where
    T: Clone,
{
    /// Construct a `Block` holding a copy of `src`.
    pub fn from_slice(alloc: Arc<dyn Allocator>, src: &[T]) -> Result<Block<T>, BspError> {
        let mut block: Block<T> = Block::with_capacity(alloc, src.len())?;
        for (i, item) in src.iter().enumerate() {
            unsafe {
                ptr::write(block.ptr.as_ptr().add(i), item.clone());
            }
            block.len = i + 1;
        }

        Ok(block)
    }
}

impl<T> Drop for Block<T> {
    fn drop(&mut self) {
        self.clear();
        self.release();
    }
}

impl<T> Deref for Block<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> DerefMut for Block<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> fmt::Debug for Block<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Block")
            .field("capacity", &self.capacity)
            .field("items", &&**self)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::rc::Rc;

    use crate::bsp::test_util::Arena;

    fn counting(limit: Option<usize>) -> (Arc<CountingAllocator>, Arc<dyn Allocator>) {
        let counter = Arc::new(match limit {
            Some(l) => CountingAllocator::with_limit(l),
            None => CountingAllocator::new(),
        });
        let alloc: Arc<dyn Allocator> = counter.clone();
        (counter, alloc)
    }

    #[test]
    fn test_zeroed() {
        let (counter, alloc) = counting(None);

        let block = Block::<u32>::zeroed(alloc, 8).unwrap();
        assert_eq!(block.len(), 8);
        assert!(block.iter().all(|x| *x == 0));
        assert_eq!(counter.live(), 1);
        assert_eq!(counter.live_bytes(), 32);

        drop(block);
        assert_eq!(counter.live(), 0);
        assert_eq!(counter.live_bytes(), 0);
    }

    #[test]
    fn test_zeroed_empty_does_not_allocate() {
        let (counter, alloc) = counting(None);

        let block = Block::<u8>::zeroed(alloc, 0).unwrap();
        assert!(block.is_empty());
        assert_eq!(counter.total(), 0);
    }

    #[test]
    fn test_zeroed_overflow() {
        let (counter, alloc) = counting(None);

        let err = Block::<u64>::with_capacity(alloc, usize::max_value()).unwrap_err();
        assert_eq!(err.kind(), BspErrorKind::Allocation);
        assert_eq!(counter.total(), 0);
    }

    #[test]
    fn test_refused() {
        let (counter, alloc) = counting(Some(0));

        let err = Block::<u8>::zeroed(alloc, 4).unwrap_err();
        assert_eq!(err.kind(), BspErrorKind::Allocation);
        assert_eq!(counter.live(), 0);
    }

    #[test]
    fn test_storage_comes_from_allocator() {
        let arena = Arc::new(Arena::new(1024));
        let alloc: Arc<dyn Allocator> = arena.clone();

        let mut block = Block::from_slice(alloc, &[1u32, 2, 3]).unwrap();
        assert!(arena.contains(block.as_ptr() as *const u8));

        for i in 4..20 {
            block.push(i).unwrap();
        }
        assert!(arena.contains(block.as_ptr() as *const u8));
        assert_eq!(&block[..4], &[1, 2, 3, 4]);
        assert_eq!(block[18], 19);
    }

    #[test]
    fn test_arena_exhausted() {
        let alloc: Arc<dyn Allocator> = Arc::new(Arena::new(64));

        let _first = Block::<u8>::zeroed(alloc.clone(), 48).unwrap();
        let err = Block::<u8>::zeroed(alloc, 32).unwrap_err();
        assert_eq!(err.kind(), BspErrorKind::Allocation);
    }

    #[test]
    fn test_push_doubles_capacity() {
        let (counter, alloc) = counting(None);

        let mut block = Block::with_capacity(alloc, 2).unwrap();
        for i in 0..5u32 {
            block.push(i).unwrap();
        }

        assert_eq!(block.as_slice(), &[0, 1, 2, 3, 4]);
        assert_eq!(block.capacity(), 8);
        // 2 -> 4 -> 8, with the old storage released each time
        assert_eq!(counter.total(), 3);
        assert_eq!(counter.live(), 1);
        assert_eq!(counter.live_bytes(), 32);
    }

    #[test]
    fn test_grow_shrink_keeps_prefix() {
        let (counter, alloc) = counting(None);

        let mut block = Block::from_slice(alloc, &[1u16, 2, 3, 4]).unwrap();
        block.grow(2).unwrap();
        assert_eq!(block.as_slice(), &[1, 2]);
        assert_eq!(block.capacity(), 2);
        assert_eq!(counter.live(), 1);
        assert_eq!(counter.live_bytes(), 4);
    }

    #[test]
    fn test_grow_failure_releases_old() {
        let (counter, alloc) = counting(Some(1));

        let mut block = Block::from_slice(alloc, &[1u8, 2, 3]).unwrap();
        assert_eq!(counter.live(), 1);

        let err = block.grow(6).unwrap_err();
        assert_eq!(err.kind(), BspErrorKind::Allocation);
        assert_eq!(counter.live(), 0);
        assert!(block.is_empty());
        assert_eq!(block.capacity(), 0);

        // dropping the emptied block must not release twice
        drop(block);
        assert_eq!(counter.live_bytes(), 0);
    }

    #[test]
    fn test_elements_dropped_once() {
        let (counter, alloc) = counting(None);
        let item = Rc::new(());

        let mut block = Block::new(alloc);
        for _ in 0..5 {
            block.push(item.clone()).unwrap();
        }
        assert_eq!(Rc::strong_count(&item), 6);

        block.truncate(3);
        assert_eq!(Rc::strong_count(&item), 4);

        block.grow(16).unwrap();
        assert_eq!(Rc::strong_count(&item), 4);

        drop(block);
        assert_eq!(Rc::strong_count(&item), 1);
        assert_eq!(counter.live(), 0);
    }
}
