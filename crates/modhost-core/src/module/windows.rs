//! `LoadLibraryExW` adapter.

use std::ffi::c_void;
use std::path::Path;

use libloading::os::windows::{
    Library, LOAD_LIBRARY_SEARCH_DEFAULT_DIRS, LOAD_LIBRARY_SEARCH_DLL_LOAD_DIR,
};

use super::{BackendResult, NativeLibrary};

struct WindowsLibrary(Library);

/// Dependencies are resolved from the module's own directory first, then the
/// default safe search path. `LOAD_LIBRARY_SEARCH_DLL_LOAD_DIR` requires an
/// absolute path.
pub(super) fn open(path: &Path) -> BackendResult<Box<dyn NativeLibrary>> {
    let absolute = std::path::absolute(path).map_err(|e| e.to_string())?;
    // SAFETY: running DllMain is inherent to loading the module.
    let library = unsafe {
        Library::load_with_flags(
            &absolute,
            LOAD_LIBRARY_SEARCH_DLL_LOAD_DIR | LOAD_LIBRARY_SEARCH_DEFAULT_DIRS,
        )
    }
    .map_err(|e| e.to_string())?;
    Ok(Box::new(WindowsLibrary(library)))
}

impl NativeLibrary for WindowsLibrary {
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
