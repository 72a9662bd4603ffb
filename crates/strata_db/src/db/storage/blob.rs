// blob.rs - Raw, aligned chunk allocation
//
// One zeroed allocation per chunk. All access goes through bounds-checked
// byte ranges; typed views are produced by bytemuck on top of these.

use super::layout::BLOB_ALIGN;
use crate::error::StorageError;
use std::alloc::{self, Layout};
use std::ops::Range;
use std::ptr::NonNull;

pub(crate) struct Blob {
    ptr: NonNull<u8>,
    layout: Layout,
}

// Safety: Blob uniquely owns its allocation, like a Box<[u8]>.
unsafe impl Send for Blob {}
unsafe impl Sync for Blob {}

impl Blob {
    /// Allocate `size` zeroed bytes aligned to `BLOB_ALIGN`.
    pub fn zeroed(size: usize) -> Result<Self, StorageError> {
        let layout = Layout::from_size_align(size.max(1), BLOB_ALIGN)
            .map_err(|_| StorageError::AllocationFailed { bytes: size })?;
        // Safety: layout has non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(StorageError::AllocationFailed { bytes: size })?;
        Ok(Self { ptr, layout })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    #[inline]
    fn as_slice(&self) -> &[u8] {
        // Safety: ptr is valid for layout.size() initialized (zeroed) bytes.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }

    #[inline]
    fn as_mut_slice(&mut self) -> &mut [u8] {
        // Safety: as above, and &mut self guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }

    fn check(&self, range: &Range<usize>) -> Result<(), StorageError> {
        if range.start > range.end || range.end > self.len() {
            return Err(StorageError::OutOfBounds {
                start: range.start,
                end: range.end,
                len: self.len(),
            });
        }
        Ok(())
    }

    pub fn bytes(&self, range: Range<usize>) -> Result<&[u8], StorageError> {
        self.check(&range)?;
        Ok(&self.as_slice()[range])
    }

    pub fn bytes_mut(&mut self, range: Range<usize>) -> Result<&mut [u8], StorageError> {
        self.check(&range)?;
        Ok(&mut self.as_mut_slice()[range])
    }

    /// Copy `src` to the range of equal length starting at `dst`.
    pub fn copy_within(&mut self, src: Range<usize>, dst: usize) -> Result<(), StorageError> {
        self.check(&src)?;
        self.check(&(dst..dst + src.len()))?;
        self.as_mut_slice().copy_within(src, dst);
        Ok(())
    }
}

impl Drop for Blob {
    fn drop(&mut self) {
        // Safety: ptr was allocated with this exact layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}
