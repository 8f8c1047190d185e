// Copyright 2018 0-0-1 and Contributors
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::alloc::Layout;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::ptr::NonNull;

use thiserror::Error;

/// The error returned when a [`RawAllocator`] cannot provide storage for a
/// control block.
///
/// [`RawAllocator`]: ./trait.RawAllocator.html
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error(
    "failed to allocate {} bytes (align {}) for a control block",
    .layout.size(),
    .layout.align()
)]
pub struct AllocError {
    layout: Layout,
}

impl AllocError {
    /// Creates an error describing a failed request for `layout`.
    pub fn new(layout: Layout) -> AllocError {
        AllocError { layout }
    }

    /// The layout that could not be allocated.
    pub fn layout(&self) -> Layout {
        self.layout
    }
}

/// The error returned by the fallible embedded factories such as
/// [`Shared::try_new_with_in`].
///
/// Either the block could not be allocated, or the payload constructor
/// reported its own error. In both cases no handle exists and every byte that
/// was allocated along the way has already been returned.
///
/// [`Shared::try_new_with_in`]: ./struct.Shared.html#method.try_new_with_in
#[derive(Debug, PartialEq, Eq, Error)]
pub enum CreateError<E> {
    /// Storage for the block could not be allocated. The payload constructor
    /// never ran.
    #[error("{0}")]
    Alloc(#[from] AllocError),
    /// The payload constructor failed after the storage was allocated.
    #[error("payload construction failed: {0}")]
    Construct(#[source] E),
}

/// The error returned by [`Shared::try_adopt_in`] when the adopting block
/// cannot be allocated.
///
/// Adoption either fully succeeds or leaves the caller exactly where it was,
/// so the pointer and deleter that were handed in come back untouched and are
/// once again the caller's responsibility.
///
/// [`Shared::try_adopt_in`]: ./struct.Shared.html#method.try_adopt_in
#[derive(Error)]
#[error("pointer was not adopted: {error}")]
pub struct AdoptError<T, D>
where
    T: ?Sized,
{
    error: AllocError,
    ptr: NonNull<T>,
    deleter: D,
}

impl<T, D> AdoptError<T, D>
where
    T: ?Sized,
{
    pub(crate) fn new(error: AllocError, ptr: NonNull<T>, deleter: D) -> AdoptError<T, D> {
        AdoptError {
            error,
            ptr,
            deleter,
        }
    }

    /// The allocation failure that stopped the adoption.
    pub fn error(&self) -> AllocError {
        self.error
    }

    /// Gives back the pointer and deleter that were never adopted.
    pub fn into_parts(self) -> (NonNull<T>, D) {
        (self.ptr, self.deleter)
    }
}

impl<T, D> Debug for AdoptError<T, D>
where
    T: ?Sized,
{
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.debug_struct("AdoptError")
            .field("error", &self.error)
            .field("ptr", &self.ptr)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;
    use std::fmt::{self, Display};

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Refused;

    impl Display for Refused {
        fn fmt(&self, f: &mut Formatter) -> fmt::Result {
            write!(f, "refused")
        }
    }

    impl std::error::Error for Refused {}

    #[test]
    fn alloc_error_display() {
        let error = AllocError::new(Layout::new::<u64>());

        assert_eq!(
            error.to_string(),
            "failed to allocate 8 bytes (align 8) for a control block",
            "AllocError did not describe the failed layout."
        );
        assert_eq!(error.layout(), Layout::new::<u64>());
    }

    #[test]
    fn create_error_source() {
        let construct: CreateError<Refused> = CreateError::Construct(Refused);
        assert_eq!(construct.to_string(), "payload construction failed: refused");
        assert!(
            construct.source().is_some(),
            "CreateError::Construct did not expose the constructor error as its source."
        );

        let alloc: CreateError<Refused> = AllocError::new(Layout::new::<u8>()).into();
        assert_eq!(
            alloc,
            CreateError::Alloc(AllocError::new(Layout::new::<u8>())),
            "From<AllocError> did not produce CreateError::Alloc."
        );
    }

    #[test]
    fn adopt_error_into_parts() {
        let mut value = 5u32;
        let ptr = NonNull::from(&mut value);
        let error = AdoptError::new(AllocError::new(Layout::new::<u32>()), ptr, "deleter");

        assert_eq!(
            error.to_string(),
            "pointer was not adopted: failed to allocate 4 bytes (align 4) for a control block"
        );

        let (returned, deleter) = error.into_parts();
        assert_eq!(returned, ptr, "AdoptError handed back a different pointer.");
        assert_eq!(deleter, "deleter", "AdoptError handed back a different deleter.");
    }
}
