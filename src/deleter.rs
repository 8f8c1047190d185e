// Copyright 2018 0-0-1 and Contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::ptr::NonNull;

/// Destroys a value that was adopted by a [`Shared`] pointer.
///
/// A deleter is consumed by the single call that destroys the value, so it
/// can never run twice. Any `FnOnce(NonNull<T>)` closure is a deleter.
///
/// # Examples
///
/// ```rust
/// use std::ptr::NonNull;
///
/// use sharedptr::Shared;
///
/// let raw = NonNull::from(Box::leak(Box::new(5)));
///
/// let five = unsafe {
///     Shared::adopt(raw, |ptr: NonNull<i32>| drop(Box::from_raw(ptr.as_ptr())))
/// };
///
/// assert_eq!(*five, 5);
/// ```
///
/// [`Shared`]: ./struct.Shared.html
pub trait Deleter<T>
where
    T: ?Sized,
{
    /// Destroys the value behind `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be the pointer this deleter was adopted with, and the value
    /// behind it must not be used again afterwards.
    unsafe fn delete(self, ptr: NonNull<T>);
}

/// The deleter used when none is given: the pointer is turned back into the
/// `Box` it was leaked from and dropped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DefaultDelete;

impl<T> Deleter<T> for DefaultDelete
where
    T: ?Sized,
{
    unsafe fn delete(self, ptr: NonNull<T>) {
        drop(Box::from_raw(ptr.as_ptr()));
    }
}

impl<T, F> Deleter<T> for F
where
    T: ?Sized,
    F: FnOnce(NonNull<T>),
{
    unsafe fn delete(self, ptr: NonNull<T>) {
        self(ptr)
    }
}
