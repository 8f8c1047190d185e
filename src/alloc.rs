// Copyright 2018 0-0-1 and Contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::alloc::{self as std_alloc, Layout};
use std::ptr::NonNull;

use log::debug;

use crate::error::AllocError;

/// A source of raw storage for control blocks.
///
/// An allocator is never asked for a particular element type; it is handed
/// the exact [`Layout`] of the concrete block being built, and later the same
/// layout when that block is returned. One allocator value therefore serves
/// every block shape it is used for.
///
/// The allocator value itself is moved into the control block it allocated
/// and lives there until it frees that same block.
///
/// # Safety
///
/// `allocate` must return storage that fits `layout` and stays valid until it
/// is passed back to `deallocate` on this allocator (or a value moved from
/// it). Layouts passed in always have a nonzero size.
///
/// [`Layout`]: https://doc.rust-lang.org/std/alloc/struct.Layout.html
pub unsafe trait RawAllocator {
    /// Allocates storage for `layout`.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Returns storage obtained from `allocate` with the same `layout`.
    ///
    /// # Safety
    ///
    /// `ptr` must have come from `allocate(layout)` on this allocator and must
    /// not have been deallocated already.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The global heap, as used by `Box`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Global;

unsafe impl RawAllocator for Global {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        debug_assert_ne!(layout.size(), 0, "control blocks are never zero-sized");

        match NonNull::new(unsafe { std_alloc::alloc(layout) }) {
            Some(ptr) => Ok(ptr),
            None => {
                debug!(
                    "global allocator refused {} bytes (align {})",
                    layout.size(),
                    layout.align()
                );
                Err(AllocError::new(layout))
            },
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        std_alloc::dealloc(ptr.as_ptr(), layout)
    }
}
