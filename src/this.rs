// Copyright 2018 0-0-1 and Contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::cell::OnceCell;
use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::shared::Shared;
use crate::weak::Weak;

/// Implemented by values that can hand out new owners of themselves.
///
/// A value opts in by embedding a [`SelfSlot`] and returning it from
/// [`self_slot`]. The slot is filled when the value is first placed under a
/// [`Shared`] through one of the `_self` constructors ([`Shared::new_self`],
/// [`Shared::from_box_self`] and the adopting variants). From then on,
/// [`self_reference`] gives a new owner of the very same control block.
///
/// # Examples
///
/// ```rust
/// use sharedptr::{SelfReferential, SelfSlot, Shared};
///
/// struct Task {
///     name: &'static str,
///     slot: SelfSlot<Task>,
/// }
///
/// impl SelfReferential for Task {
///     fn self_slot(&self) -> &SelfSlot<Task> {
///         &self.slot
///     }
/// }
///
/// let task = Shared::new_self(Task {
///     name: "flush",
///     slot: SelfSlot::new(),
/// });
///
/// let again = task.self_reference();
/// assert_eq!(again.name, "flush");
/// assert!(Shared::ptr_eq(&task, &again));
/// assert_eq!(Shared::use_count(&task), 2);
/// ```
///
/// [`SelfSlot`]: ./struct.SelfSlot.html
/// [`Shared`]: ./struct.Shared.html
/// [`Shared::new_self`]: ./struct.Shared.html#method.new_self
/// [`Shared::from_box_self`]: ./struct.Shared.html#method.from_box_self
/// [`self_slot`]: ./trait.SelfReferential.html#tymethod.self_slot
/// [`self_reference`]: ./trait.SelfReferential.html#method.self_reference
pub trait SelfReferential {
    /// The slot that remembers which control block owns this value.
    fn self_slot(&self) -> &SelfSlot<Self>;

    /// Returns a new owner of this value, or an empty [`Shared`] if the value
    /// was never wired to an owner or is being destroyed.
    ///
    /// [`Shared`]: ./struct.Shared.html
    fn self_reference(&self) -> Shared<Self> {
        self.self_slot().lock()
    }

    /// Returns a new observer of this value. It observes nothing if the value
    /// was never wired to an owner.
    fn weak_self(&self) -> Weak<Self> {
        self.self_slot().downgrade()
    }
}

/// Storage for the back-reference of a [`SelfReferential`] value.
///
/// A slot is written at most once. It holds a [`Weak`], so a value never
/// keeps itself alive through its own slot.
///
/// [`SelfReferential`]: ./trait.SelfReferential.html
/// [`Weak`]: ./struct.Weak.html
pub struct SelfSlot<T>
where
    T: ?Sized,
{
    weak: OnceCell<Weak<T>>,
}

impl<T> SelfSlot<T>
where
    T: ?Sized,
{
    /// Constructs an unwired slot.
    pub const fn new() -> SelfSlot<T> {
        SelfSlot {
            weak: OnceCell::new(),
        }
    }

    /// Returns true once the slot has been pointed at an owner.
    pub fn is_wired(&self) -> bool {
        self.weak.get().is_some()
    }

    /// Returns a new owner of the slot's value, or an empty [`Shared`].
    ///
    /// [`Shared`]: ./struct.Shared.html
    pub fn lock(&self) -> Shared<T> {
        match self.weak.get() {
            Some(weak) => weak.lock(),
            None => Shared::empty(),
        }
    }

    /// Returns a new observer of the slot's value.
    pub fn downgrade(&self) -> Weak<T> {
        self.weak.get().map_or_else(Weak::new, Weak::clone)
    }

    /// Points the slot at `weak`. Returns false, dropping `weak`, if the slot
    /// was already wired.
    pub(crate) fn wire(&self, weak: Weak<T>) -> bool {
        self.weak.set(weak).is_ok()
    }
}

impl<T> Default for SelfSlot<T>
where
    T: ?Sized,
{
    fn default() -> SelfSlot<T> {
        SelfSlot::new()
    }
}

impl<T> Debug for SelfSlot<T>
where
    T: ?Sized,
{
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.debug_struct("SelfSlot")
            .field("wired", &self.is_wired())
            .finish()
    }
}
