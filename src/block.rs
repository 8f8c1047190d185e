// Copyright 2018 0-0-1 and Contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Control blocks: the shared bookkeeping behind every `Shared` and `Weak`.
//!
//! Every block starts with a [`BlockHeader`] holding the two counters and a
//! pointer to a static table of the block's lifecycle hooks. Handles only ever
//! see the header; the concrete block type, and with it the payload type, the
//! deleter and the allocator, is known only to the hooks.

use std::alloc::Layout;
use std::cell::Cell;
use std::mem::{self, ManuallyDrop};
use std::process;
use std::ptr::{self, NonNull};

use log::trace;

use crate::alloc::RawAllocator;
use crate::deleter::Deleter;
use crate::error::{AllocError, CreateError};

/// The dispatch table for one concrete block type.
pub(crate) struct BlockVTable {
    release: unsafe fn(NonNull<BlockHeader>),
    deallocate: unsafe fn(NonNull<BlockHeader>),
}

/// The type-erased part of a control block, shared by every variant.
///
/// The payload is alive iff `shared > 0`. The block's memory exists iff
/// `shared > 0 || weak > 0`.
#[repr(C)]
pub(crate) struct BlockHeader {
    shared: Cell<usize>,
    weak: Cell<usize>,
    vtable: &'static BlockVTable,
}

impl BlockHeader {
    /// A header for a block that is about to be handed to its first owner.
    fn new(vtable: &'static BlockVTable) -> BlockHeader {
        BlockHeader {
            shared: Cell::new(1),
            weak: Cell::new(0),
            vtable,
        }
    }

    pub(crate) fn shared_count(&self) -> usize {
        self.shared.get()
    }

    pub(crate) fn weak_count(&self) -> usize {
        self.weak.get()
    }

    pub(crate) fn increment_shared(&self) {
        self.shared.set(increment(self.shared.get()));
    }

    /// Adds an owner only if the payload is still alive.
    ///
    /// Counters are plain `Cell`s and handles are neither `Send` nor `Sync`,
    /// so the check and the increment cannot be observed apart.
    pub(crate) fn try_increment_shared(&self) -> bool {
        let shared = self.shared.get();
        if shared == 0 {
            false
        } else {
            self.shared.set(increment(shared));
            true
        }
    }

    pub(crate) fn increment_weak(&self) {
        self.weak.set(increment(self.weak.get()));
    }

    /// Drops one owner. The last owner releases the payload, and also frees
    /// the block when no observer remains.
    ///
    /// # Safety
    ///
    /// `this` must point to a live block on which the caller holds one of the
    /// counted owners, and the caller must not use that owner again.
    pub(crate) unsafe fn decrement_shared(this: NonNull<BlockHeader>) {
        let header = this.as_ref();
        let shared = header.shared.get();
        debug_assert_ne!(shared, 0, "shared count underflow");

        header.shared.set(shared - 1);
        if shared != 1 {
            return;
        }

        // The payload may own observers of its own block. Hold a weak count
        // for the duration of the release so that dropping them cannot free
        // the block underneath us, and give it back even if release unwinds.
        header.increment_weak();
        let _pin = WeakPin(this);

        trace!("releasing payload of control block {:p}", this.as_ptr());
        (header.vtable.release)(this);
    }

    /// Drops one observer. The last observer frees the block if the payload
    /// is already gone.
    ///
    /// # Safety
    ///
    /// `this` must point to a live block on which the caller holds one of the
    /// counted observers, and the caller must not use that observer again.
    pub(crate) unsafe fn decrement_weak(this: NonNull<BlockHeader>) {
        let header = this.as_ref();
        let weak = header.weak.get();
        debug_assert_ne!(weak, 0, "weak count underflow");

        header.weak.set(weak - 1);
        if weak == 1 && header.shared.get() == 0 {
            trace!("deallocating control block {:p}", this.as_ptr());
            (header.vtable.deallocate)(this);
        }
    }
}

/// Counter overflow can only come from leaking handles; like `Rc`, give up.
fn increment(count: usize) -> usize {
    count.checked_add(1).unwrap_or_else(|| process::abort())
}

struct WeakPin(NonNull<BlockHeader>);

impl Drop for WeakPin {
    fn drop(&mut self) {
        unsafe { BlockHeader::decrement_weak(self.0) }
    }
}

/// A concrete control block layout.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` with a [`BlockHeader`] as their first
/// field, so that a pointer to the header is a pointer to the block.
pub(crate) unsafe trait ControlBlock: Sized {
    const VTABLE: &'static BlockVTable = &BlockVTable {
        release: release_erased::<Self>,
        deallocate: deallocate_erased::<Self>,
    };

    /// Destroys the payload. Runs exactly once, when the shared count drops
    /// to zero, and never touches the block's own storage.
    unsafe fn release(this: NonNull<Self>);

    /// Returns the block's storage to the allocator it came from. Runs
    /// exactly once, after `release`, when both counts are zero.
    unsafe fn deallocate(this: NonNull<Self>);
}

unsafe fn release_erased<B>(header: NonNull<BlockHeader>)
where
    B: ControlBlock,
{
    B::release(header.cast())
}

unsafe fn deallocate_erased<B>(header: NonNull<BlockHeader>)
where
    B: ControlBlock,
{
    B::deallocate(header.cast())
}

/// A block that adopted a value living elsewhere, along with the deleter that
/// will destroy it.
#[repr(C)]
pub(crate) struct AdoptingBlock<T, D, A>
where
    T: ?Sized,
{
    header: BlockHeader,
    ptr: NonNull<T>,
    deleter: ManuallyDrop<D>,
    alloc: ManuallyDrop<A>,
}

impl<T, D, A> AdoptingBlock<T, D, A>
where
    T: ?Sized,
    D: Deleter<T>,
    A: RawAllocator,
{
    /// Allocates a block owning `ptr` with a shared count of one.
    ///
    /// On failure nothing has been adopted, and the deleter is handed back
    /// with the error.
    pub(crate) fn allocate(
        ptr: NonNull<T>,
        deleter: D,
        alloc: A,
    ) -> Result<NonNull<BlockHeader>, (AllocError, D)> {
        let raw = match alloc.allocate(Layout::new::<Self>()) {
            Ok(raw) => raw.cast::<Self>(),
            Err(error) => return Err((error, deleter)),
        };

        unsafe {
            ptr::write(
                raw.as_ptr(),
                AdoptingBlock {
                    header: BlockHeader::new(<Self as ControlBlock>::VTABLE),
                    ptr,
                    deleter: ManuallyDrop::new(deleter),
                    alloc: ManuallyDrop::new(alloc),
                },
            );
        }

        trace!(
            "adopted {:p} into control block {:p}",
            ptr.as_ptr() as *const u8,
            raw.as_ptr()
        );
        Ok(raw.cast())
    }
}

unsafe impl<T, D, A> ControlBlock for AdoptingBlock<T, D, A>
where
    T: ?Sized,
    D: Deleter<T>,
    A: RawAllocator,
{
    unsafe fn release(this: NonNull<Self>) {
        let block = this.as_ptr();
        let deleter = ManuallyDrop::take(&mut (*block).deleter);
        deleter.delete((*block).ptr);
    }

    unsafe fn deallocate(this: NonNull<Self>) {
        let alloc = ManuallyDrop::take(&mut (*this.as_ptr()).alloc);
        alloc.deallocate(this.cast(), Layout::new::<Self>());
    }
}

/// A block that holds its payload inline, so block and value share one
/// allocation.
#[repr(C)]
pub(crate) struct EmbeddedBlock<T, A> {
    header: BlockHeader,
    alloc: ManuallyDrop<A>,
    value: ManuallyDrop<T>,
}

impl<T, A> EmbeddedBlock<T, A>
where
    A: RawAllocator,
{
    /// Allocates the block, then runs `constructor` to produce the payload.
    ///
    /// If the constructor fails or unwinds, the storage goes back to `alloc`
    /// and no payload destructor runs, because no payload exists.
    pub(crate) fn allocate_with<E, F>(
        constructor: F,
        alloc: A,
    ) -> Result<(NonNull<BlockHeader>, NonNull<T>), CreateError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let layout = Layout::new::<Self>();
        let raw = alloc.allocate(layout)?.cast::<Self>();

        let storage = Storage {
            alloc: &alloc,
            ptr: raw.cast(),
            layout,
        };
        let value = constructor().map_err(CreateError::Construct)?;
        mem::forget(storage);

        unsafe {
            ptr::write(
                raw.as_ptr(),
                EmbeddedBlock {
                    header: BlockHeader::new(<Self as ControlBlock>::VTABLE),
                    alloc: ManuallyDrop::new(alloc),
                    value: ManuallyDrop::new(value),
                },
            );

            let value = ptr::addr_of_mut!((*raw.as_ptr()).value) as *mut T;
            trace!("constructed payload in control block {:p}", raw.as_ptr());
            Ok((raw.cast(), NonNull::new_unchecked(value)))
        }
    }
}

unsafe impl<T, A> ControlBlock for EmbeddedBlock<T, A>
where
    A: RawAllocator,
{
    unsafe fn release(this: NonNull<Self>) {
        ManuallyDrop::drop(&mut (*this.as_ptr()).value);
    }

    unsafe fn deallocate(this: NonNull<Self>) {
        let alloc = ManuallyDrop::take(&mut (*this.as_ptr()).alloc);
        alloc.deallocate(this.cast(), Layout::new::<Self>());
    }
}

/// Raw block storage that has not been initialized yet.
struct Storage<'a, A>
where
    A: RawAllocator,
{
    alloc: &'a A,
    ptr: NonNull<u8>,
    layout: Layout,
}

impl<'a, A> Drop for Storage<'a, A>
where
    A: RawAllocator,
{
    fn drop(&mut self) {
        trace!("returning unused control block storage {:p}", self.ptr.as_ptr());
        unsafe { self.alloc.deallocate(self.ptr, self.layout) }
    }
}

/// The `{pointer, block}` pair carried by both handle types.
pub(crate) struct RawHandle<T>
where
    T: ?Sized,
{
    pub(crate) ptr: NonNull<T>,
    pub(crate) block: NonNull<BlockHeader>,
}

impl<T> RawHandle<T>
where
    T: ?Sized,
{
    /// Every handle holding this pair keeps the block allocated.
    pub(crate) fn header(&self) -> &BlockHeader {
        unsafe { self.block.as_ref() }
    }
}

impl<T> Clone for RawHandle<T>
where
    T: ?Sized,
{
    fn clone(&self) -> RawHandle<T> {
        *self
    }
}

impl<T> Copy for RawHandle<T> where T: ?Sized {}
