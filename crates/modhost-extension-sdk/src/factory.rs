//! Helpers for constructor/destructor pairs.

use core::ffi::c_void;

/// Move `value` to the module's heap and hand out an opaque pointer to it.
pub fn into_raw<T>(value: T) -> *mut c_void {
    Box::into_raw(Box::new(value)).cast()
}

/// Release a pointer produced by [`into_raw`] with the same `T`. Null is ignored.
///
/// # Safety
/// `ptr` must be null or come from `into_raw::<T>` in this module, and must not
/// be used afterwards.
pub unsafe fn drop_raw<T>(ptr: *mut c_void) {
    if !ptr.is_null() {
        drop(unsafe { Box::from_raw(ptr.cast::<T>()) });
    }
}
