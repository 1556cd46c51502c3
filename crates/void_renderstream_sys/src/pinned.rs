//! Memory that must stay put while the plugin holds a pointer to it
//!
//! [`PinnedSlot`] keeps one value at a fixed address for the length of a
//! native call. [`NativeArena`] owns every block built for an encoded
//! structure and frees them together when dropped.

use crate::api::to_cstring;
use crate::error::Result;
use std::any::Any;
use std::ffi::{c_char, CString};
use std::pin::Pin;

/// A reusable slot holding at most one pinned value
pub struct PinnedSlot<T> {
    value: Option<Pin<Box<T>>>,
}

impl<T> PinnedSlot<T> {
    pub fn new() -> Self {
        Self { value: None }
    }

    /// Pin `value` until the returned guard drops.
    ///
    /// A value still held from an earlier call is released first.
    pub fn pin(&mut self, value: T) -> PinnedGuard<'_, T> {
        if self.value.take().is_some() {
            log::debug!("Released stale pinned buffer");
        }
        let boxed = Box::pin(value);
        let ptr: *const T = &*boxed;
        self.value = Some(boxed);
        PinnedGuard { slot: self, ptr }
    }

    /// Whether a value is currently pinned
    pub fn is_occupied(&self) -> bool {
        self.value.is_some()
    }
}

impl<T> Default for PinnedSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the pinned value on drop, including on early returns
pub struct PinnedGuard<'a, T> {
    slot: &'a mut PinnedSlot<T>,
    ptr: *const T,
}

impl<T> PinnedGuard<'_, T> {
    /// Stable address of the pinned value
    pub fn as_ptr(&self) -> *const T {
        self.ptr
    }

    pub fn get(&self) -> &T {
        // Safety: `ptr` points into the box owned by `slot`, which cannot be
        // touched while this guard borrows it
        unsafe { &*self.ptr }
    }
}

impl<T> Drop for PinnedGuard<'_, T> {
    fn drop(&mut self) {
        self.slot.value = None;
    }
}

/// Owner of every allocation referenced by an encoded native structure
#[derive(Default)]
pub struct NativeArena {
    strings: Vec<CString>,
    blocks: Vec<Box<dyn Any>>,
}

// Safety: the arena owns all memory its raw pointers refer to and never
// shares it; moving it between threads moves that ownership with it.
unsafe impl Send for NativeArena {}

impl NativeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy a string into a NUL-terminated block
    pub fn string(&mut self, value: &str) -> Result<*const c_char> {
        let value = to_cstring(value)?;
        let ptr = value.as_ptr();
        self.strings.push(value);
        Ok(ptr)
    }

    /// Build an array of string pointers; empty input gives a null pointer
    pub fn string_array(&mut self, values: &[String]) -> Result<*const *const c_char> {
        let pointers = values
            .iter()
            .map(|value| self.string(value))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.block(pointers) as *const *const c_char)
    }

    /// Keep `items` at a fixed address; empty input gives a null pointer
    pub fn block<T: 'static>(&mut self, items: Vec<T>) -> *mut T {
        if items.is_empty() {
            return std::ptr::null_mut();
        }
        let mut boxed = items.into_boxed_slice();
        let ptr = boxed.as_mut_ptr();
        self.blocks.push(Box::new(boxed));
        ptr
    }

    /// Number of live allocations
    pub fn allocations(&self) -> usize {
        self.strings.len() + self.blocks.len()
    }

    /// Free everything at once
    pub fn release(&mut self) {
        self.strings.clear();
        self.blocks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn test_pinned_slot_released_on_drop() {
        let mut slot = PinnedSlot::new();
        {
            let guard = slot.pin([1.0f32, 2.0, 3.0]);
            assert_eq!(guard.get()[1], 2.0);
            assert!(!guard.as_ptr().is_null());
        }
        assert!(!slot.is_occupied());
    }

    #[test]
    fn test_pinned_slot_released_on_error_path() {
        fn fails(slot: &mut PinnedSlot<u64>) -> std::result::Result<(), &'static str> {
            let _guard = slot.pin(7);
            Err("native call failed")
        }

        let mut slot = PinnedSlot::new();
        assert!(fails(&mut slot).is_err());
        assert!(!slot.is_occupied());
    }

    #[test]
    fn test_arena_strings_and_arrays() {
        let mut arena = NativeArena::new();
        let names = vec!["cam_a".to_string(), "cam_b".to_string()];
        let array = arena.string_array(&names).unwrap();
        // Two strings plus the pointer block
        assert_eq!(arena.allocations(), 3);

        let second = unsafe { CStr::from_ptr(*array.add(1)) };
        assert_eq!(second.to_str().unwrap(), "cam_b");

        assert!(arena.string_array(&[]).unwrap().is_null());
        arena.release();
        assert_eq!(arena.allocations(), 0);
    }

    #[test]
    fn test_arena_rejects_interior_nul() {
        let mut arena = NativeArena::new();
        assert!(arena.string("a\0b").is_err());
        assert_eq!(arena.allocations(), 0);
    }
}
