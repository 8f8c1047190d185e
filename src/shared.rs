// Copyright 2018 0-0-1 and Contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::alloc::handle_alloc_error;
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt::{Debug, Display, Formatter, Pointer, Result as FmtResult};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::mem;
use std::ops::Deref;
use std::panic::{RefUnwindSafe, UnwindSafe};
use std::ptr::{self, NonNull};

use log::warn;

use crate::alloc::{Global, RawAllocator};
use crate::block::{AdoptingBlock, BlockHeader, EmbeddedBlock, RawHandle};
use crate::deleter::{DefaultDelete, Deleter};
use crate::error::{AdoptError, AllocError, CreateError};
use crate::this::SelfReferential;
use crate::weak::Weak;

/// A single-threaded, shared-ownership pointer backed by a type-erased
/// control block.
///
/// See the [crate-level documentation][crate] for more details.
///
/// A `Shared` may be empty, in which case it owns nothing; [`Default`] and
/// [`Shared::empty`] produce empty handles, as does [`Weak::lock`] on an
/// expired observer.
///
/// The inherent methods of `Shared` are all associated functions, which means
/// you have to call them as e.g. [`Shared::use_count(&value)`][`use_count`]
/// instead of `value.use_count()`. This avoids conflict with methods of the
/// inner type `T`.
///
/// [crate]: ./index.html
///
/// [`Shared::empty`]: ./struct.Shared.html#method.empty
/// [`use_count`]: ./struct.Shared.html#method.use_count
/// [`Weak::lock`]: ./struct.Weak.html#method.lock
///
/// [`Default`]: https://doc.rust-lang.org/std/default/trait.Default.html
pub struct Shared<T>
where
    T: ?Sized,
{
    pub(crate) raw: Option<RawHandle<T>>,
    pub(crate) phantom: PhantomData<T>,
}

impl<T> Shared<T> {
    /// Constructs a new `Shared`, placing `value` in the same allocation as
    /// its control block.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharedptr::Shared;
    ///
    /// let five = Shared::new(5);
    ///
    /// assert_eq!(*five, 5);
    /// assert_eq!(Shared::use_count(&five), 1);
    /// ```
    pub fn new(value: T) -> Shared<T> {
        Shared::new_in(value, Global)
    }

    /// Constructs a new `Shared` like [`new`], but takes the block's storage
    /// from `alloc`. The allocator lives inside the block until the block is
    /// freed.
    ///
    /// [`new`]: ./struct.Shared.html#method.new
    pub fn new_in<A>(value: T, alloc: A) -> Shared<T>
    where
        A: RawAllocator + 'static,
    {
        match Shared::try_new_in(value, alloc) {
            Ok(shared) => shared,
            Err(error) => handle_alloc_error(error.layout()),
        }
    }

    /// Constructs a new `Shared` in storage from `alloc`, returning an error
    /// instead of aborting if the storage cannot be allocated.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharedptr::{Global, Shared};
    ///
    /// let five = Shared::try_new_in(5, Global).unwrap();
    ///
    /// assert_eq!(*five, 5);
    /// ```
    pub fn try_new_in<A>(value: T, alloc: A) -> Result<Shared<T>, AllocError>
    where
        A: RawAllocator + 'static,
    {
        match Shared::try_new_with_in(|| Ok::<T, Infallible>(value), alloc) {
            Ok(shared) => Ok(shared),
            Err(CreateError::Alloc(error)) => Err(error),
            Err(CreateError::Construct(never)) => match never {},
        }
    }

    /// Allocates a control block and only then runs `constructor` to produce
    /// the value that will live inside it.
    ///
    /// If `constructor` returns an error, or panics, the storage is given back
    /// without any value being dropped, and no `Shared` is produced.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharedptr::{CreateError, Shared};
    ///
    /// let parsed = Shared::try_new_with(|| "42".parse::<u32>());
    /// assert_eq!(*parsed.unwrap(), 42);
    ///
    /// let failed = Shared::try_new_with(|| "forty-two".parse::<u32>());
    /// assert!(matches!(failed, Err(CreateError::Construct(_))));
    /// ```
    pub fn try_new_with<E, F>(constructor: F) -> Result<Shared<T>, CreateError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        Shared::try_new_with_in(constructor, Global)
    }

    /// The allocator-aware form of [`try_new_with`]: one allocation from
    /// `alloc` holds both the control block and the value.
    ///
    /// [`try_new_with`]: ./struct.Shared.html#method.try_new_with
    pub fn try_new_with_in<E, F, A>(constructor: F, alloc: A) -> Result<Shared<T>, CreateError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        A: RawAllocator + 'static,
    {
        let (block, ptr) = EmbeddedBlock::allocate_with(constructor, alloc)?;
        Ok(unsafe { Shared::from_block(block, ptr) })
    }
}

impl<T> Shared<T>
where
    T: ?Sized,
{
    /// Constructs an empty `Shared` that owns nothing.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharedptr::Shared;
    ///
    /// let empty: Shared<str> = Shared::empty();
    ///
    /// assert!(Shared::is_empty(&empty));
    /// assert_eq!(Shared::use_count(&empty), 0);
    /// ```
    pub fn empty() -> Shared<T> {
        Shared {
            raw: None,
            phantom: PhantomData,
        }
    }

    /// Adopts a boxed value. The value stays where the `Box` put it; a
    /// separate control block is allocated to track it, and the value is
    /// dropped as a `Box` once the last owner goes away.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::fmt::Display;
    ///
    /// use sharedptr::Shared;
    ///
    /// let shown: Shared<dyn Display> = Shared::from_box(Box::new(5));
    ///
    /// assert_eq!(shown.to_string(), "5");
    /// ```
    pub fn from_box(boxed: Box<T>) -> Shared<T> {
        unsafe { Shared::adopt(NonNull::from(Box::leak(boxed)), DefaultDelete) }
    }

    /// Adopts `ptr`, to be destroyed by `deleter` once the last owner goes
    /// away. The control block comes from the global heap.
    ///
    /// The deleter is bound to `T` as given here, so it still destroys the
    /// right type after the handle is [`map`]ped to a different view. The
    /// deleter and allocator types are erased inside the control block, so
    /// they may not borrow anything.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads until `deleter` runs, must not be freed
    /// by anyone but `deleter`, and must not be adopted by any other control
    /// block.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::cell::Cell;
    /// use std::ptr::NonNull;
    /// use std::rc::Rc;
    ///
    /// use sharedptr::Shared;
    ///
    /// let deleted = Rc::new(Cell::new(0));
    /// let raw = NonNull::from(Box::leak(Box::new(5)));
    ///
    /// let five = unsafe {
    ///     let deleted = Rc::clone(&deleted);
    ///     Shared::adopt(raw, move |ptr: NonNull<i32>| {
    ///         deleted.set(deleted.get() + 1);
    ///         drop(Box::from_raw(ptr.as_ptr()));
    ///     })
    /// };
    ///
    /// drop(five);
    /// assert_eq!(deleted.get(), 1);
    /// ```
    ///
    /// [`map`]: ./struct.Shared.html#method.map
    pub unsafe fn adopt<D>(ptr: NonNull<T>, deleter: D) -> Shared<T>
    where
        D: Deleter<T> + 'static,
    {
        Shared::adopt_in(ptr, deleter, Global)
    }

    /// Adopts `ptr` like [`adopt`], taking the control block's storage from
    /// `alloc`.
    ///
    /// # Safety
    ///
    /// See [`adopt`].
    ///
    /// [`adopt`]: ./struct.Shared.html#method.adopt
    pub unsafe fn adopt_in<D, A>(ptr: NonNull<T>, deleter: D, alloc: A) -> Shared<T>
    where
        D: Deleter<T> + 'static,
        A: RawAllocator + 'static,
    {
        match Shared::try_adopt_in(ptr, deleter, alloc) {
            Ok(shared) => shared,
            Err(error) => handle_alloc_error(error.error().layout()),
        }
    }

    /// Adopts `ptr` like [`adopt_in`], but reports allocation failure instead
    /// of aborting.
    ///
    /// On failure nothing has been adopted: the pointer and the deleter come
    /// back inside the [`AdoptError`] and remain the caller's responsibility.
    ///
    /// # Safety
    ///
    /// See [`adopt`].
    ///
    /// [`adopt`]: ./struct.Shared.html#method.adopt
    /// [`adopt_in`]: ./struct.Shared.html#method.adopt_in
    /// [`AdoptError`]: ./struct.AdoptError.html
    pub unsafe fn try_adopt_in<D, A>(
        ptr: NonNull<T>,
        deleter: D,
        alloc: A,
    ) -> Result<Shared<T>, AdoptError<T, D>>
    where
        D: Deleter<T> + 'static,
        A: RawAllocator + 'static,
    {
        match AdoptingBlock::allocate(ptr, deleter, alloc) {
            Ok(block) => Ok(Shared::from_block(block, ptr)),
            Err((error, deleter)) => Err(AdoptError::new(error, ptr, deleter)),
        }
    }

    /// Takes over a freshly built block whose shared count is already one.
    pub(crate) unsafe fn from_block(block: NonNull<BlockHeader>, ptr: NonNull<T>) -> Shared<T> {
        Shared {
            raw: Some(RawHandle { ptr, block }),
            phantom: PhantomData,
        }
    }

    /// Creates a new [`Weak`] pointer to this value. Downgrading an empty
    /// `Shared` gives an empty `Weak`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharedptr::Shared;
    ///
    /// let five = Shared::new(5);
    ///
    /// let weak_five = Shared::downgrade(&five);
    ///
    /// assert_eq!(Shared::weak_count(&five), 1);
    /// assert!(!weak_five.expired());
    /// ```
    ///
    /// [`Weak`]: ./struct.Weak.html
    pub fn downgrade(this: &Shared<T>) -> Weak<T> {
        match this.raw {
            Some(raw) => {
                raw.header().increment_weak();
                Weak { raw: Some(raw) }
            },
            None => Weak::new(),
        }
    }

    /// Gets the number of `Shared` pointers to this value, or zero for an
    /// empty `Shared`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharedptr::Shared;
    ///
    /// let five = Shared::new(5);
    /// let _also_five = Shared::clone(&five);
    ///
    /// assert_eq!(2, Shared::use_count(&five));
    /// ```
    pub fn use_count(this: &Shared<T>) -> usize {
        this.raw.map_or(0, |raw| raw.header().shared_count())
    }

    /// Gets the number of [`Weak`] pointers to this value, or zero for an
    /// empty `Shared`.
    ///
    /// [`Weak`]: ./struct.Weak.html
    pub fn weak_count(this: &Shared<T>) -> usize {
        this.raw.map_or(0, |raw| raw.header().weak_count())
    }

    /// Returns true if this `Shared` owns nothing.
    pub fn is_empty(this: &Shared<T>) -> bool {
        this.raw.is_none()
    }

    /// Returns the managed value, or [`None`][`Option`] for an empty `Shared`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharedptr::Shared;
    ///
    /// let five = Shared::new(5);
    /// assert_eq!(Shared::get(&five), Some(&5));
    ///
    /// let empty: Shared<i32> = Shared::empty();
    /// assert_eq!(Shared::get(&empty), None);
    /// ```
    ///
    /// [`Option`]: https://doc.rust-lang.org/std/option/enum.Option.html
    pub fn get(this: &Shared<T>) -> Option<&T> {
        this.raw.as_ref().map(|raw| unsafe { raw.ptr.as_ref() })
    }

    /// Returns the cached pointer to the managed value, or
    /// [`None`][`Option`] for an empty `Shared`.
    ///
    /// [`Option`]: https://doc.rust-lang.org/std/option/enum.Option.html
    pub fn as_ptr(this: &Shared<T>) -> Option<NonNull<T>> {
        this.raw.map(|raw| raw.ptr)
    }

    /// Gives up this handle's ownership, leaving it empty.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharedptr::Shared;
    ///
    /// let mut five = Shared::new(5);
    /// let also_five = Shared::clone(&five);
    ///
    /// Shared::reset(&mut five);
    ///
    /// assert!(Shared::is_empty(&five));
    /// assert_eq!(Shared::use_count(&also_five), 1);
    /// ```
    pub fn reset(this: &mut Shared<T>) {
        drop(mem::replace(this, Shared::empty()));
    }

    /// Adopts `boxed` in place of whatever this handle owned before.
    ///
    /// The new control block is allocated before the old ownership is given
    /// up, so the handle is untouched if that allocation fails.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharedptr::Shared;
    ///
    /// let mut value = Shared::new(5);
    ///
    /// Shared::reset_with(&mut value, Box::new(6));
    ///
    /// assert_eq!(*value, 6);
    /// ```
    pub fn reset_with(this: &mut Shared<T>, boxed: Box<T>) {
        let mut replacement = Shared::from_box(boxed);
        Shared::swap(this, &mut replacement);
    }

    /// Exchanges what two handles own. Never allocates and never touches the
    /// reference counts.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharedptr::Shared;
    ///
    /// let mut a = Shared::new(1);
    /// let mut b = Shared::new(2);
    ///
    /// Shared::swap(&mut a, &mut b);
    ///
    /// assert_eq!((*a, *b), (2, 1));
    /// ```
    pub fn swap(this: &mut Shared<T>, other: &mut Shared<T>) {
        mem::swap(&mut this.raw, &mut other.raw);
    }

    /// Converts this handle into a handle to something reachable from the
    /// value, such as a field or a trait object view of the value itself.
    ///
    /// The result shares this handle's control block, so it keeps the whole
    /// original value alive, and the reference counts do not change. When the
    /// last owner goes away the original value is destroyed as its original
    /// type. Because the result no longer names that type, the value must be
    /// `'static`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::fmt::Debug;
    ///
    /// use sharedptr::Shared;
    ///
    /// let pair = Shared::new((1, String::from("two")));
    /// let keep = Shared::clone(&pair);
    ///
    /// let second: Shared<String> = Shared::map(pair, |pair| &pair.1);
    /// assert_eq!(*second, "two");
    /// assert_eq!(Shared::use_count(&second), 2);
    ///
    /// let viewed: Shared<dyn Debug> = Shared::map(keep, |pair| pair as &(dyn Debug + 'static));
    /// assert_eq!(format!("{:?}", viewed), "(1, \"two\")");
    /// assert!(Shared::linked(&second, &viewed));
    /// ```
    pub fn map<U, F>(mut this: Shared<T>, f: F) -> Shared<U>
    where
        T: 'static,
        U: ?Sized,
        F: FnOnce(&T) -> &U,
    {
        let raw = match this.raw {
            Some(raw) => raw,
            None => return Shared::empty(),
        };

        let ptr = NonNull::from(f(unsafe { raw.ptr.as_ref() }));

        // Our ownership moves to the result.
        this.raw = None;
        Shared {
            raw: Some(RawHandle {
                ptr,
                block: raw.block,
            }),
            phantom: PhantomData,
        }
    }

    /// Returns true if two `Shared`s point to the same value (not just values
    /// that compare as equal). Two empty handles point to the same nothing.
    ///
    /// Contrast with [`linked`], which checks whether two handles share a
    /// control block even if they view different parts of it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharedptr::Shared;
    ///
    /// let five = Shared::new(5);
    /// let same_five = Shared::clone(&five);
    /// let other_five = Shared::new(5);
    ///
    /// assert!(Shared::ptr_eq(&five, &same_five));
    /// assert!(!Shared::ptr_eq(&five, &other_five));
    /// ```
    ///
    /// [`linked`]: ./struct.Shared.html#method.linked
    pub fn ptr_eq(this: &Shared<T>, other: &Shared<T>) -> bool {
        let this = Shared::as_ptr(this).map(NonNull::cast::<u8>);
        let other = Shared::as_ptr(other).map(NonNull::cast::<u8>);

        this == other
    }

    /// Returns true if two handles share one control block, i.e. they own the
    /// same resource, whatever type each of them views it as. Empty handles
    /// are linked to nothing.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharedptr::Shared;
    ///
    /// let pair = Shared::new((1, 2));
    /// let first = Shared::map(Shared::clone(&pair), |pair| &pair.0);
    /// let other = Shared::new((1, 2));
    ///
    /// assert!(Shared::linked(&pair, &first));
    /// assert!(!Shared::linked(&pair, &other));
    /// ```
    pub fn linked<U>(this: &Shared<T>, other: &Shared<U>) -> bool
    where
        U: ?Sized,
    {
        match (this.raw, other.raw) {
            (Some(this), Some(other)) => this.block == other.block,
            _ => false,
        }
    }
}

impl<T> Shared<T>
where
    T: SelfReferential + ?Sized,
{
    /// Adopts a boxed value like [`from_box`] and points the value's
    /// [`SelfSlot`] at the new handle.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharedptr::{SelfReferential, SelfSlot, Shared};
    ///
    /// struct Node {
    ///     slot: SelfSlot<Node>,
    /// }
    ///
    /// impl SelfReferential for Node {
    ///     fn self_slot(&self) -> &SelfSlot<Node> {
    ///         &self.slot
    ///     }
    /// }
    ///
    /// let node = Shared::from_box_self(Box::new(Node { slot: SelfSlot::new() }));
    /// let again = node.self_reference();
    ///
    /// assert!(Shared::ptr_eq(&node, &again));
    /// assert_eq!(Shared::use_count(&node), 2);
    /// ```
    ///
    /// [`from_box`]: ./struct.Shared.html#method.from_box
    /// [`SelfSlot`]: ./struct.SelfSlot.html
    pub fn from_box_self(boxed: Box<T>) -> Shared<T> {
        let this = Shared::from_box(boxed);
        Shared::wire_self(&this);
        this
    }

    /// Adopts `ptr` like [`adopt_in`] and points the value's [`SelfSlot`] at
    /// the new handle.
    ///
    /// # Safety
    ///
    /// See [`adopt`].
    ///
    /// [`adopt`]: ./struct.Shared.html#method.adopt
    /// [`adopt_in`]: ./struct.Shared.html#method.adopt_in
    /// [`SelfSlot`]: ./struct.SelfSlot.html
    pub unsafe fn adopt_self_in<D, A>(ptr: NonNull<T>, deleter: D, alloc: A) -> Shared<T>
    where
        D: Deleter<T> + 'static,
        A: RawAllocator + 'static,
    {
        let this = Shared::adopt_in(ptr, deleter, alloc);
        Shared::wire_self(&this);
        this
    }

    /// Adopts `ptr` like [`try_adopt_in`] and, on success, points the value's
    /// [`SelfSlot`] at the new handle.
    ///
    /// # Safety
    ///
    /// See [`adopt`].
    ///
    /// [`adopt`]: ./struct.Shared.html#method.adopt
    /// [`try_adopt_in`]: ./struct.Shared.html#method.try_adopt_in
    /// [`SelfSlot`]: ./struct.SelfSlot.html
    pub unsafe fn try_adopt_self_in<D, A>(
        ptr: NonNull<T>,
        deleter: D,
        alloc: A,
    ) -> Result<Shared<T>, AdoptError<T, D>>
    where
        D: Deleter<T> + 'static,
        A: RawAllocator + 'static,
    {
        let this = Shared::try_adopt_in(ptr, deleter, alloc)?;
        Shared::wire_self(&this);
        Ok(this)
    }

    fn wire_self(this: &Shared<T>) {
        if let Some(value) = Shared::get(this) {
            if !value.self_slot().wire(Shared::downgrade(this)) {
                warn!(
                    "self slot at {:p} was already wired; keeping its first owner",
                    value.self_slot()
                );
            }
        }
    }
}

impl<T> Shared<T>
where
    T: SelfReferential,
{
    /// Constructs a new `Shared` like [`new`] and points the value's
    /// [`SelfSlot`] at it.
    ///
    /// [`new`]: ./struct.Shared.html#method.new
    /// [`SelfSlot`]: ./struct.SelfSlot.html
    pub fn new_self(value: T) -> Shared<T> {
        Shared::new_self_in(value, Global)
    }

    /// Constructs a new `Shared` like [`new_in`] and points the value's
    /// [`SelfSlot`] at it.
    ///
    /// [`new_in`]: ./struct.Shared.html#method.new_in
    /// [`SelfSlot`]: ./struct.SelfSlot.html
    pub fn new_self_in<A>(value: T, alloc: A) -> Shared<T>
    where
        A: RawAllocator + 'static,
    {
        let this = Shared::new_in(value, alloc);
        Shared::wire_self(&this);
        this
    }
}

impl<T> Clone for Shared<T>
where
    T: ?Sized,
{
    /// Makes a clone of the `Shared` pointer.
    ///
    /// This creates another pointer to the same value and control block,
    /// increasing the shared count. Cloning an empty `Shared` gives another
    /// empty `Shared`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharedptr::Shared;
    ///
    /// let five = Shared::new(5);
    ///
    /// let same_five = Shared::clone(&five);
    ///
    /// assert!(Shared::linked(&five, &same_five));
    /// assert_eq!(2, Shared::use_count(&five));
    /// ```
    fn clone(&self) -> Shared<T> {
        if let Some(raw) = self.raw {
            raw.header().increment_shared();
        }

        Shared {
            raw: self.raw,
            phantom: PhantomData,
        }
    }
}

impl<T> Drop for Shared<T>
where
    T: ?Sized,
{
    /// Drops the `Shared`.
    ///
    /// This will decrement the shared count. If this was the last owner, the
    /// value is destroyed; the control block itself stays until the last
    /// [`Weak`] pointer is gone as well.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharedptr::Shared;
    ///
    /// struct Foo;
    ///
    /// impl Drop for Foo {
    ///     fn drop(&mut self) {
    ///         println!("dropped!");
    ///     }
    /// }
    ///
    /// let foo = Shared::new(Foo);
    /// let foo2 = Shared::clone(&foo);
    ///
    /// drop(foo); // Doesn't print anything
    /// drop(foo2); // Prints "dropped!"
    /// ```
    ///
    /// [`Weak`]: ./struct.Weak.html
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            unsafe { BlockHeader::decrement_shared(raw.block) }
        }
    }
}

impl<T> Deref for Shared<T>
where
    T: ?Sized,
{
    type Target = T;

    /// # Panics
    ///
    /// Dereferencing an empty `Shared` is a bug in the caller and panics.
    fn deref(&self) -> &T {
        match Shared::get(self) {
            Some(value) => value,
            None => panic!("dereferenced an empty Shared pointer"),
        }
    }
}

impl<T> AsRef<T> for Shared<T>
where
    T: ?Sized,
{
    fn as_ref(&self) -> &T {
        &**self
    }
}

impl<T> Borrow<T> for Shared<T>
where
    T: ?Sized,
{
    fn borrow(&self) -> &T {
        &**self
    }
}

impl<T> Default for Shared<T>
where
    T: ?Sized,
{
    /// Creates an empty `Shared`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharedptr::Shared;
    ///
    /// let x: Shared<i32> = Default::default();
    /// assert!(Shared::is_empty(&x));
    /// ```
    fn default() -> Shared<T> {
        Shared::empty()
    }
}

impl<T> From<Box<T>> for Shared<T>
where
    T: ?Sized,
{
    fn from(boxed: Box<T>) -> Shared<T> {
        Shared::from_box(boxed)
    }
}

impl<T> From<T> for Shared<T> {
    fn from(value: T) -> Shared<T> {
        Shared::new(value)
    }
}

impl<T> Eq for Shared<T> where T: Eq + ?Sized {}

impl<T> PartialEq<Shared<T>> for Shared<T>
where
    T: PartialEq<T> + ?Sized,
{
    /// Equality for two `Shared`s.
    ///
    /// Two `Shared`s are equal if their values are equal, or if both are
    /// empty.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharedptr::Shared;
    ///
    /// assert!(Shared::new(5) == Shared::new(5));
    /// assert!(Shared::<i32>::empty() == Shared::empty());
    /// assert!(Shared::new(5) != Shared::empty());
    /// ```
    fn eq(&self, other: &Shared<T>) -> bool {
        Shared::get(self) == Shared::get(other)
    }
}

impl<T> PartialOrd<Shared<T>> for Shared<T>
where
    T: PartialOrd<T> + ?Sized,
{
    /// Partial comparison for two `Shared`s.
    ///
    /// The values are compared, and an empty `Shared` is less than any
    /// non-empty one.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::cmp::Ordering;
    ///
    /// use sharedptr::Shared;
    ///
    /// let five = Shared::new(5);
    ///
    /// assert_eq!(Some(Ordering::Less), five.partial_cmp(&Shared::new(6)));
    /// assert!(Shared::empty() < five);
    /// ```
    fn partial_cmp(&self, other: &Shared<T>) -> Option<Ordering> {
        Shared::get(self).partial_cmp(&Shared::get(other))
    }
}

impl<T> Ord for Shared<T>
where
    T: Ord + ?Sized,
{
    fn cmp(&self, other: &Shared<T>) -> Ordering {
        Shared::get(self).cmp(&Shared::get(other))
    }
}

impl<T> Hash for Shared<T>
where
    T: Hash + ?Sized,
{
    fn hash<H>(&self, state: &mut H)
    where
        H: Hasher,
    {
        Shared::get(self).hash(state);
    }
}

impl<T> Debug for Shared<T>
where
    T: Debug + ?Sized,
{
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match Shared::get(self) {
            Some(value) => write!(f, "{:?}", value),
            None => write!(f, "(empty)"),
        }
    }
}

impl<T> Display for Shared<T>
where
    T: Display + ?Sized,
{
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match Shared::get(self) {
            Some(value) => write!(f, "{}", value),
            None => write!(f, "(empty)"),
        }
    }
}

impl<T> Pointer for Shared<T>
where
    T: ?Sized,
{
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match Shared::as_ptr(self) {
            Some(ptr) => write!(f, "{:p}", ptr),
            None => write!(f, "{:p}", ptr::null::<u8>()),
        }
    }
}

impl<T> UnwindSafe for Shared<T> where T: RefUnwindSafe + ?Sized {}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::hash_map::DefaultHasher;
    use std::panic::{self, AssertUnwindSafe};
    use std::rc::Rc;

    use super::*;
    use crate::alloc::testing::{init_logger, CountingAlloc, DropCounter};

    trait Animal {
        fn name(&self) -> &'static str;
    }

    struct Dog(DropCounter);

    impl Animal for Dog {
        fn name(&self) -> &'static str {
            "dog"
        }
    }

    #[test]
    fn new() {
        init_logger();

        let shared = Shared::new(17usize);
        let raw = shared.raw.expect("new Shared was empty.");

        assert_eq!(
            raw.header().shared_count(),
            1,
            "new Shared did not have shared count of 1."
        );
        assert_eq!(raw.header().weak_count(), 0, "new Shared had observers.");
        assert_eq!(*shared, 17usize, "new Shared stored value incorrectly.");
    }

    #[test]
    fn embedded_single_allocation() {
        let drops = Rc::new(Cell::new(0));
        let alloc = CountingAlloc::new();

        let shared = Shared::new_in(DropCounter(Rc::clone(&drops)), alloc.clone());
        assert_eq!(alloc.allocations(), 1, "Embedded Shared took more than one allocation.");

        drop(shared);
        assert_eq!(drops.get(), 1, "Payload was not dropped exactly once.");
        assert_eq!(alloc.outstanding(), 0, "Control block leaked.");
    }

    #[test]
    fn use_count_follows_clones_and_drops() {
        let h1 = Shared::new(42);
        assert_eq!(Shared::use_count(&h1), 1);

        let h2 = Shared::clone(&h1);
        assert_eq!(Shared::use_count(&h1), 2);
        assert_eq!(Shared::use_count(&h2), 2);

        let clones: Vec<Shared<i32>> = (0..5).map(|_| Shared::clone(&h2)).collect();
        assert_eq!(Shared::use_count(&h1), 7);

        drop(clones);
        drop(h2);
        assert_eq!(Shared::use_count(&h1), 1, "Dropped clones were still counted.");

        let w = Shared::downgrade(&h1);
        drop(h1);
        assert!(w.expired(), "Observer outlived the last owner without expiring.");
        assert!(Shared::is_empty(&w.lock()), "Expired observer produced an owner.");
    }

    #[test]
    fn move_keeps_counts() {
        let h1 = Shared::new(String::from("moved"));
        let h2 = Shared::clone(&h1);

        let moved = h1;
        assert_eq!(Shared::use_count(&moved), 2, "Moving a Shared changed the count.");

        let mut source = moved;
        let taken = mem::take(&mut source);
        assert!(Shared::is_empty(&source), "Taken-from Shared was not left empty.");
        assert_eq!(Shared::get(&source), None);
        assert_eq!(Shared::use_count(&source), 0);
        assert_eq!(Shared::use_count(&taken), 2);
        assert!(Shared::linked(&taken, &h2));
    }

    #[test]
    fn released_once_by_any_alias() {
        let drops = Rc::new(Cell::new(0));
        let alloc = CountingAlloc::new();

        let original = Shared::new_in(DropCounter(Rc::clone(&drops)), alloc.clone());
        let a = Shared::clone(&original);
        let b = Shared::clone(&a);
        let weak = Shared::downgrade(&b);

        drop(original);
        drop(b);
        assert_eq!(drops.get(), 0, "Payload released while an alias remained.");

        drop(a);
        assert_eq!(drops.get(), 1, "Payload was not released by the last alias.");
        assert_eq!(alloc.outstanding(), 1, "Block was freed while an observer remained.");

        drop(weak);
        assert_eq!(drops.get(), 1, "Payload was released twice.");
        assert_eq!(alloc.deallocations(), 1, "Block was not freed exactly once.");
    }

    #[test]
    fn adopt_uses_custom_deleter_only() {
        let drops = Rc::new(Cell::new(0));
        let deletions = Rc::new(Cell::new(0));
        let raw = NonNull::from(Box::leak(Box::new(DropCounter(Rc::clone(&drops)))));

        let shared = unsafe {
            let deletions = Rc::clone(&deletions);
            Shared::adopt(raw, move |ptr: NonNull<DropCounter>| {
                deletions.set(deletions.get() + 1);
                // Recover the allocation without running the payload's destructor.
                let boxed = Box::from_raw(ptr.as_ptr() as *mut mem::ManuallyDrop<DropCounter>);
                drop(boxed);
            })
        };
        let clone = Shared::clone(&shared);

        drop(shared);
        assert_eq!(deletions.get(), 0);

        drop(clone);
        assert_eq!(deletions.get(), 1, "Custom deleter did not run exactly once.");
        assert_eq!(drops.get(), 0, "The default destruction path ran as well.");
    }

    #[test]
    fn adopt_with_allocator() {
        let drops = Rc::new(Cell::new(0));
        let alloc = CountingAlloc::new();
        let raw = NonNull::from(Box::leak(Box::new(DropCounter(Rc::clone(&drops)))));

        let shared = unsafe { Shared::adopt_in(raw, DefaultDelete, alloc.clone()) };
        assert_eq!(alloc.allocations(), 1);
        assert_eq!(
            Shared::as_ptr(&shared),
            Some(raw),
            "Adopted Shared did not cache the adopted pointer."
        );

        drop(shared);
        assert_eq!(drops.get(), 1);
        assert_eq!(alloc.outstanding(), 0);
    }

    #[test]
    fn try_adopt_failure_gives_pointer_back() {
        let drops = Rc::new(Cell::new(0));
        let raw = NonNull::from(Box::leak(Box::new(DropCounter(Rc::clone(&drops)))));

        let adopted =
            unsafe { Shared::try_adopt_in(raw, DefaultDelete, CountingAlloc::failing()) };
        let error = match adopted {
            Ok(_) => panic!("failing allocator adopted a pointer"),
            Err(error) => error,
        };
        assert_eq!(drops.get(), 0, "Failed adoption destroyed the value.");

        let (returned, deleter) = error.into_parts();
        assert_eq!(returned, raw);
        unsafe { deleter.delete(returned) };
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn failing_constructor_leaves_nothing() {
        let alloc = CountingAlloc::new();

        let result = Shared::<DropCounter>::try_new_with_in(|| Err("bad args"), alloc.clone());

        assert_eq!(result.err(), Some(CreateError::Construct("bad args")));
        assert_eq!(alloc.allocations(), 1);
        assert_eq!(alloc.outstanding(), 0, "Failed construction leaked its block.");
    }

    #[test]
    fn panicking_constructor_leaves_nothing() {
        let alloc = CountingAlloc::new();

        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            Shared::<u32>::try_new_with_in(
                || -> Result<u32, ()> { panic!("bad args") },
                alloc.clone(),
            )
        }));

        assert!(caught.is_err(), "Constructor panic was swallowed.");
        assert_eq!(alloc.outstanding(), 0, "Panicking construction leaked its block.");
    }

    #[test]
    fn allocation_failure() {
        let result = Shared::try_new_in(5u64, CountingAlloc::failing());

        match result {
            Err(error) => assert_eq!(
                error.layout(),
                std::alloc::Layout::new::<EmbeddedBlock<u64, CountingAlloc>>()
            ),
            Ok(_) => panic!("failing allocator produced a Shared"),
        }
    }

    #[test]
    fn reset() {
        let drops = Rc::new(Cell::new(0));

        let mut shared = Shared::new(DropCounter(Rc::clone(&drops)));
        Shared::reset(&mut shared);

        assert!(Shared::is_empty(&shared));
        assert_eq!(drops.get(), 1, "reset did not release the only owner's value.");

        Shared::reset(&mut shared);
        assert!(Shared::is_empty(&shared), "Resetting an empty Shared changed it.");
    }

    #[test]
    fn reset_with() {
        let drops = Rc::new(Cell::new(0));

        let mut shared = Shared::new(DropCounter(Rc::clone(&drops)));
        let replacement = Box::new(DropCounter(Rc::clone(&drops)));
        let replacement_ptr = &*replacement as *const DropCounter;

        Shared::reset_with(&mut shared, replacement);

        assert_eq!(drops.get(), 1, "reset_with did not release the old value.");
        assert_eq!(
            Shared::as_ptr(&shared).map(|ptr| ptr.as_ptr() as *const DropCounter),
            Some(replacement_ptr),
            "reset_with did not adopt the new value in place."
        );
        assert_eq!(Shared::use_count(&shared), 1);

        drop(shared);
        assert_eq!(drops.get(), 2);
    }

    #[test]
    fn swap() {
        let mut a = Shared::new(1);
        let a_clone = Shared::clone(&a);
        let mut b = Shared::empty();

        Shared::swap(&mut a, &mut b);

        assert!(Shared::is_empty(&a));
        assert!(Shared::linked(&b, &a_clone));
        assert_eq!(Shared::use_count(&b), 2, "swap changed the shared count.");
    }

    #[test]
    fn map_to_trait_object_destroys_original_type() {
        let drops = Rc::new(Cell::new(0));
        let alloc = CountingAlloc::new();

        let dog = Shared::new_in(Dog(DropCounter(Rc::clone(&drops))), alloc.clone());
        let animal: Shared<dyn Animal> = Shared::map(Shared::clone(&dog), |dog| {
            dog as &(dyn Animal + 'static)
        });

        assert_eq!(animal.name(), "dog");
        assert!(Shared::linked(&dog, &animal), "Mapped Shared got its own control block.");
        assert_eq!(Shared::use_count(&animal), 2);

        drop(dog);
        assert_eq!(drops.get(), 0);

        drop(animal);
        assert_eq!(drops.get(), 1, "Mapped Shared did not destroy the original value.");
        assert_eq!(alloc.outstanding(), 0);
    }

    #[test]
    fn map_adopted_box() {
        let drops = Rc::new(Cell::new(0));

        let dog = Shared::from_box(Box::new(Dog(DropCounter(Rc::clone(&drops)))));
        let inner: Shared<DropCounter> = Shared::map(dog, |dog| &dog.0);

        assert_eq!(Shared::use_count(&inner), 1);
        drop(inner);
        assert_eq!(drops.get(), 1, "Projected Shared did not destroy the whole value.");
    }

    #[test]
    fn map_panic_keeps_ownership() {
        let drops = Rc::new(Cell::new(0));

        let shared = Shared::new(DropCounter(Rc::clone(&drops)));
        let weak = Shared::downgrade(&shared);

        let caught = panic::catch_unwind(AssertUnwindSafe(move || {
            Shared::map::<DropCounter, _>(shared, |_| panic!("projection failed"))
        }));

        assert!(caught.is_err());
        assert!(weak.expired(), "A panicking map leaked its owner.");
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn map_empty() {
        let empty: Shared<(i32, i32)> = Shared::empty();
        let mapped = Shared::map(empty, |pair| &pair.0);

        assert!(Shared::is_empty(&mapped));
    }

    #[test]
    fn unsized_from_box() {
        let slice: Shared<[u32]> = Shared::from(vec![1, 2, 3].into_boxed_slice());

        assert_eq!(&*slice, &[1, 2, 3]);
        assert_eq!(slice.len(), 3);
    }

    #[test]
    #[should_panic(expected = "dereferenced an empty Shared pointer")]
    fn deref_empty_panics() {
        let empty: Shared<u8> = Shared::empty();
        let _ = *empty;
    }

    #[test]
    fn downgrade() {
        let shared = Shared::new(17usize);
        let weak = Shared::downgrade(&shared);
        let _weak_2 = Weak::clone(&weak);

        assert_eq!(Shared::weak_count(&shared), 2);
        assert_eq!(Shared::use_count(&shared), 1, "Downgrading changed the shared count.");

        let empty: Shared<usize> = Shared::empty();
        assert!(Shared::downgrade(&empty).expired());
    }

    #[test]
    fn comparisons() {
        let five = Shared::new(5);
        let empty: Shared<i32> = Shared::empty();

        assert_eq!(five, Shared::new(5));
        assert_ne!(five, empty);
        assert_eq!(empty, Shared::empty());
        assert_eq!(five.cmp(&Shared::new(6)), Ordering::Less);
        assert_eq!(empty.cmp(&five), Ordering::Less);

        let hash = |shared: &Shared<i32>| {
            let mut hasher = DefaultHasher::new();
            shared.hash(&mut hasher);
            hasher.finish()
        };
        assert_eq!(hash(&five), hash(&Shared::new(5)));
    }

    #[test]
    fn formatting() {
        let five = Shared::new(5);
        let empty: Shared<i32> = Shared::empty();

        assert_eq!(format!("{:?}", five), "5");
        assert_eq!(format!("{}", five), "5");
        assert_eq!(format!("{:?}", empty), "(empty)");
        assert_eq!(format!("{}", empty), "(empty)");
        assert_eq!(
            format!("{:p}", five),
            format!("{:p}", Shared::as_ptr(&five).unwrap()),
            "Pointer formatting did not print the cached pointer."
        );
    }

    #[test]
    fn drop_order_with_borrowed_payload() {
        struct Foo<'a>(&'a Cell<bool>);

        impl<'a> Drop for Foo<'a> {
            fn drop(&mut self) {
                self.0.set(true);
            }
        }

        let cell = Cell::new(false);

        let foo = Shared::new(Foo(&cell));
        let foo2 = Shared::clone(&foo);

        drop(foo);
        assert_eq!(cell.get(), false);

        drop(foo2);
        assert_eq!(cell.get(), true);
    }
}
