//! `dlopen` adapter.

use std::ffi::c_void;
use std::path::Path;

use libloading::os::unix::{Library, RTLD_LOCAL, RTLD_NOW};

use super::{BackendResult, NativeLibrary};

struct UnixLibrary(Library);

/// Resolve every symbol eagerly so unresolved dependencies fail here, and keep
/// the module's symbols out of the global namespace.
pub(super) fn open(path: &Path) -> BackendResult<Box<dyn NativeLibrary>> {
    // SAFETY: running a module's initializers is inherent to loading it; the
    // caller opted into executing code from this path.
    let library =
        unsafe { Library::open(Some(path), RTLD_NOW | RTLD_LOCAL) }.map_err(|e| e.to_string())?;
    Ok(Box::new(UnixLibrary(library)))
}

impl NativeLibrary for UnixLibrary {
    fn symbol(&self, name: &str) -> BackendResult<*const c_void> {
        // SAFETY: the symbol is only read as an address, never called here.
        let symbol = unsafe { self.0.get::<*const c_void>(name.as_bytes()) }
            .map_err(|e| e.to_string())?;
        Ok(*symbol)
    }

    fn close(self: Box<Self>) -> BackendResult<()> {
        self.0.close().map_err(|e| e.to_string())
    }
}
