//! Instance handles.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::descriptor::ExtensionDescriptor;
use crate::error::{ExtensionError, Result};
use crate::module::ModuleHandle;

/// An extension object together with a hold on the module that made it.
///
/// Dropping the handle calls the module's destructor for the object and then
/// releases the module. The module stays loaded for as long as any handle
/// created from it exists.
pub struct InstanceHandle {
    instance: NonNull<c_void>,
    descriptor: ExtensionDescriptor,
}

impl InstanceHandle {
    pub(crate) fn create(descriptor: ExtensionDescriptor) -> Result<Self> {
        let module = descriptor.module().clone();

        // Counted before the factory runs; a concurrent unload must see it.
        module.acquire_instance();

        // SAFETY: `descriptor` holds the module open for the duration of the call.
        let raw = unsafe { descriptor.call_create() };
        let Some(instance) = NonNull::new(raw) else {
            module.release_instance();
            return Err(ExtensionError::CreationFailed {
                name: descriptor.name().to_string(),
                reason: "factory returned null".into(),
            });
        };

        tracing::debug!(
            name = descriptor.name(),
            interface = descriptor.interface(),
            path = %module.path().display(),
            "Created extension instance"
        );

        Ok(Self {
            instance,
            descriptor,
        })
    }

    /// The opaque object pointer produced by the factory.
    pub fn as_ptr(&self) -> *mut c_void {
        self.instance.as_ptr()
    }

    /// View the object as `T`.
    ///
    /// # Safety
    /// `T` must be the exact `#[repr(C)]` (or otherwise layout-compatible)
    /// type the extension's interface defines.
    pub unsafe fn as_ref<T>(&self) -> &T {
        self.instance.cast::<T>().as_ref()
    }

    /// Mutable view of the object as `T`.
    ///
    /// # Safety
    /// Same requirements as [`Self::as_ref`].
    pub unsafe fn as_mut<T>(&mut self) -> &mut T {
        self.instance.cast::<T>().as_mut()
    }

    pub fn descriptor(&self) -> &ExtensionDescriptor {
        &self.descriptor
    }

    pub fn module(&self) -> &Arc<ModuleHandle> {
        self.descriptor.module()
    }
}

impl Drop for InstanceHandle {
    fn drop(&mut self) {
        // SAFETY: the pointer came from this descriptor's factory and is
        // handed back exactly once, while the module is still held.
        unsafe { self.descriptor.call_destroy(self.instance.as_ptr()) };
        self.descriptor.module().release_instance();
        tracing::debug!(name = self.descriptor.name(), "Destroyed extension instance");
    }
}

impl fmt::Debug for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceHandle")
            .field("instance", &self.instance)
            .field("name", &self.descriptor.name())
            .field("module", &self.descriptor.module_path())
            .finish()
    }
}
