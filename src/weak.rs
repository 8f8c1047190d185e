// Copyright 2018 0-0-1 and Contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::marker::PhantomData;

use crate::block::{BlockHeader, RawHandle};
use crate::shared::Shared;

/// Weak is a version of [`Shared`] that holds a non-owning reference to the
/// managed value. The value is accessed by calling [`lock`] (or [`upgrade`])
/// on the `Weak` pointer.
///
/// Since a `Weak` reference does not count towards ownership, it will not
/// prevent the value from being destroyed, and the `Weak` itself makes no
/// guarantees about the value still being present. It does keep the control
/// block allocated, so it can always tell whether the value is gone.
///
/// A `Weak` pointer is useful for keeping a temporary reference to the value
/// within `Shared` without extending its lifetime. It is also the only way to
/// break reference cycles: two values holding `Shared` pointers to each other
/// keep each other alive forever, and nothing in this crate will ever find or
/// free them.
///
/// The typical way to obtain a `Weak` pointer is to call [`Shared::downgrade`].
///
/// [`Shared`]: ./struct.Shared.html
///
/// [`Shared::downgrade`]: ./struct.Shared.html#method.downgrade
/// [`lock`]: ./struct.Weak.html#method.lock
/// [`upgrade`]: ./struct.Weak.html#method.upgrade
pub struct Weak<T>
where
    T: ?Sized,
{
    pub(crate) raw: Option<RawHandle<T>>,
}

impl<T> Weak<T>
where
    T: ?Sized,
{
    /// Constructs a new `Weak<T>` that observes nothing. Calling [`lock`] on
    /// the return value always gives an empty [`Shared`]. No memory is
    /// allocated.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharedptr::Weak;
    ///
    /// let empty: Weak<i64> = Weak::new();
    /// assert!(empty.expired());
    /// assert!(empty.upgrade().is_none());
    /// ```
    ///
    /// [`lock`]: ./struct.Weak.html#method.lock
    /// [`Shared`]: ./struct.Shared.html
    pub fn new() -> Weak<T> {
        Weak { raw: None }
    }

    /// Returns true if there is no value to observe any more, or there never
    /// was one.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharedptr::Shared;
    ///
    /// let five = Shared::new(5);
    /// let weak_five = Shared::downgrade(&five);
    ///
    /// assert!(!weak_five.expired());
    ///
    /// drop(five);
    /// assert!(weak_five.expired());
    /// ```
    pub fn expired(&self) -> bool {
        self.use_count() == 0
    }

    /// Attempts to gain ownership of the value, returning an empty
    /// [`Shared`] if it has already been destroyed.
    ///
    /// Checking for a live owner and adding the new one happen as a single
    /// step, so a value that is being torn down can never be resurrected.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharedptr::Shared;
    ///
    /// let five = Shared::new(5);
    /// let weak_five = Shared::downgrade(&five);
    ///
    /// let strong_five = weak_five.lock();
    /// assert_eq!(*strong_five, 5);
    /// assert_eq!(Shared::use_count(&five), 2);
    ///
    /// drop(strong_five);
    /// drop(five);
    ///
    /// assert!(Shared::is_empty(&weak_five.lock()));
    /// ```
    ///
    /// [`Shared`]: ./struct.Shared.html
    pub fn lock(&self) -> Shared<T> {
        match self.raw {
            Some(raw) if raw.header().try_increment_shared() => Shared {
                raw: Some(raw),
                phantom: PhantomData,
            },
            _ => Shared::empty(),
        }
    }

    /// Attempts to upgrade the `Weak` pointer to a [`Shared`], extending the
    /// lifetime of the value if successful.
    ///
    /// Returns [`None`][`Option`] if the value has since been dropped.
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
    /// let strong_five: Option<Shared<_>> = weak_five.upgrade();
    /// assert!(strong_five.is_some());
    ///
    /// drop(strong_five);
    /// drop(five);
    ///
    /// assert!(weak_five.upgrade().is_none());
    /// ```
    ///
    /// [`Shared`]: ./struct.Shared.html
    ///
    /// [`Option`]: https://doc.rust-lang.org/std/option/enum.Option.html
    pub fn upgrade(&self) -> Option<Shared<T>> {
        let shared = self.lock();
        if Shared::is_empty(&shared) {
            None
        } else {
            Some(shared)
        }
    }

    /// Gets the number of [`Shared`] pointers to the observed value, or zero
    /// if it is gone.
    ///
    /// [`Shared`]: ./struct.Shared.html
    pub fn use_count(&self) -> usize {
        self.raw.map_or(0, |raw| raw.header().shared_count())
    }

    /// Gets the number of `Weak` pointers observing the same value, this one
    /// included, or zero for a `Weak` that observes nothing.
    pub fn weak_count(&self) -> usize {
        self.raw.map_or(0, |raw| raw.header().weak_count())
    }

    /// Returns true if both `Weak`s observe the same control block. `Weak`s
    /// that observe nothing are linked to nothing.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharedptr::{Shared, Weak};
    ///
    /// let five = Shared::new(5);
    /// let weak_five = Shared::downgrade(&five);
    ///
    /// assert!(weak_five.linked(&Weak::clone(&weak_five)));
    /// assert!(!weak_five.linked(&Shared::downgrade(&Shared::new(5))));
    /// ```
    pub fn linked<U>(&self, other: &Weak<U>) -> bool
    where
        U: ?Sized,
    {
        match (self.raw, other.raw) {
            (Some(this), Some(other)) => this.block == other.block,
            _ => false,
        }
    }

    /// Converts this observer into one of something reachable from the
    /// value, the way [`Shared::map`] converts an owner.
    ///
    /// `f` can only run on a live value, so mapping an expired `Weak` gives a
    /// `Weak` that observes nothing.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::fmt::Debug;
    ///
    /// use sharedptr::{Shared, Weak};
    ///
    /// let five = Shared::new(5);
    /// let weak_five = Shared::downgrade(&five);
    ///
    /// let viewed: Weak<dyn Debug> = weak_five.map(|five| five as &(dyn Debug + 'static));
    /// assert!(viewed.linked(&weak_five));
    /// assert_eq!(format!("{:?}", viewed.lock()), "5");
    /// ```
    ///
    /// [`Shared::map`]: ./struct.Shared.html#method.map
    pub fn map<U, F>(&self, f: F) -> Weak<U>
    where
        T: 'static,
        U: ?Sized,
        F: FnOnce(&T) -> &U,
    {
        Shared::downgrade(&Shared::map(self.lock(), f))
    }
}

impl<T> Clone for Weak<T>
where
    T: ?Sized,
{
    /// Makes a clone of the `Weak` pointer that points to the same value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharedptr::{Shared, Weak};
    ///
    /// let five = Shared::new(5);
    /// let weak_five = Shared::downgrade(&five);
    ///
    /// let _same_weak_five = Weak::clone(&weak_five);
    /// assert_eq!(Shared::weak_count(&five), 2);
    /// ```
    fn clone(&self) -> Weak<T> {
        if let Some(raw) = self.raw {
            raw.header().increment_weak();
        }

        Weak { raw: self.raw }
    }
}

impl<T> Drop for Weak<T>
where
    T: ?Sized,
{
    /// Drops the `Weak` pointer.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharedptr::{Shared, Weak};
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
    /// let weak_foo = Shared::downgrade(&foo);
    /// let other_weak_foo = Weak::clone(&weak_foo);
    ///
    /// drop(weak_foo); // Doesn't print anything
    /// drop(foo); // Prints "dropped!"
    ///
    /// assert!(other_weak_foo.upgrade().is_none());
    /// ```
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            unsafe { BlockHeader::decrement_weak(raw.block) }
        }
    }
}

impl<T> Default for Weak<T>
where
    T: ?Sized,
{
    /// Constructs a new `Weak<T>` that observes nothing.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sharedptr::Weak;
    ///
    /// let empty: Weak<i64> = Default::default();
    /// assert!(empty.upgrade().is_none());
    /// ```
    fn default() -> Weak<T> {
        Weak::new()
    }
}

impl<T> Debug for Weak<T>
where
    T: ?Sized,
{
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "(Weak)")
    }
}
