// Copyright 2018 0-0-1 and Contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! This small library provides the [`Shared`] and [`Weak`] types. A `Shared`
//! is an owning, reference-counted handle to a value; a `Weak` observes the
//! same value without keeping it alive. Both are built on a type-erased
//! control block, so the handle's type says nothing about how the value is
//! stored, how it will be destroyed, or where its memory came from.
//!
//! # Technical Details
//!
//! Every managed value has one control block holding a shared count, a weak
//! count and a small table of teardown functions. The value is destroyed when
//! the shared count reaches zero, and the block itself is freed once both
//! counts have reached zero. A block comes in one of two shapes:
//!
//! * **Embedded** blocks hold the value inline, so [`Shared::new`] and
//!   [`Shared::try_new_with`] need a single allocation. The value is built
//!   only after the storage exists, and a failing or panicking constructor
//!   gives the storage back.
//! * **Adopting** blocks take over a value that already lives somewhere else
//!   ([`Shared::from_box`], [`Shared::adopt`]), together with a [`Deleter`]
//!   that destroys it exactly once. If the block cannot be allocated, the
//!   pointer and deleter are handed back untouched in an [`AdoptError`].
//!
//! Either shape can take its storage from a [`RawAllocator`] other than the
//! [`Global`] heap; the allocator is kept inside the block and frees it.
//!
//! A `Shared` may also be *projected* with [`Shared::map`] to a part of the
//! value, or to a trait object, while still destroying the original value
//! with its original type.
//!
//! Values that need to produce owners of themselves implement
//! [`SelfReferential`] and embed a [`SelfSlot`], which the `_self`
//! constructors wire up.
//!
//! Counts are plain cells, so neither handle can be sent to another thread.
//! Reference cycles between `Shared` pointers are never collected; break them
//! with `Weak`.
//!
//! [`Shared`]: ./struct.Shared.html
//! [`Weak`]: ./struct.Weak.html
//! [`Deleter`]: ./trait.Deleter.html
//! [`AdoptError`]: ./struct.AdoptError.html
//! [`RawAllocator`]: ./trait.RawAllocator.html
//! [`Global`]: ./struct.Global.html
//! [`SelfReferential`]: ./trait.SelfReferential.html
//! [`SelfSlot`]: ./struct.SelfSlot.html
//!
//! [`Shared::new`]: ./struct.Shared.html#method.new
//! [`Shared::try_new_with`]: ./struct.Shared.html#method.try_new_with
//! [`Shared::from_box`]: ./struct.Shared.html#method.from_box
//! [`Shared::adopt`]: ./struct.Shared.html#method.adopt
//! [`Shared::map`]: ./struct.Shared.html#method.map

mod alloc;
mod block;
mod deleter;
mod error;
mod shared;
mod this;
mod weak;

pub use alloc::{Global, RawAllocator};
pub use deleter::{DefaultDelete, Deleter};
pub use error::{AdoptError, AllocError, CreateError};
pub use shared::Shared;
pub use this::{SelfReferential, SelfSlot};
pub use weak::Weak;
