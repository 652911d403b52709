//! Declarative macros for embedding extension metadata in a module.

/// Build a [`RawModuleTable`](crate::abi::RawModuleTable) as a constant expression.
///
/// Each entry names the interface it implements, a display name, a numeric
/// version, a description, optional tags, and the constructor/destructor pair.
///
/// ```rust
/// use modhost_extension_sdk::prelude::*;
///
/// struct English;
///
/// extension_factory!(english_create, english_destroy, English, English);
///
/// static TABLE: RawModuleTable = module_table! {
///     {
///         interface: "demo.Greeter",
///         name: "English",
///         version: 100,
///         description: "Says hello",
///         tags: ["author" => "Alice Bobbens", "vendor" => "42 inc."],
///         create: english_create,
///         destroy: english_destroy,
///     },
/// };
///
/// assert_eq!(TABLE.count, 1);
/// ```
#[macro_export]
macro_rules! module_table {
    (
        $(
            {
                interface: $interface:expr,
                name: $name:expr,
                version: $version:expr,
                description: $description:expr,
                $( tags: [ $( $key:expr => $value:expr ),* $(,)? ], )?
                create: $create:path,
                destroy: $destroy:path $(,)?
            }
        ),* $(,)?
    ) => {{
        const RECORDS: &[$crate::abi::RawExtensionRecord] = &[
            $(
                $crate::abi::RawExtensionRecord::new(
                    $interface,
                    $name,
                    $version,
                    $description,
                    {
                        const TAGS: &[$crate::abi::RawTag] = &[
                            $( $( $crate::abi::RawTag::new($key, $value) ),* )?
                        ];
                        TAGS
                    },
                    $create,
                    $destroy,
                )
            ),*
        ];
        $crate::abi::RawModuleTable::new(RECORDS)
    }};
}

/// Export the module's extension table under the well-known symbol.
///
/// Takes the same entries as [`module_table!`]. Use it exactly once per
/// `cdylib`.
#[macro_export]
macro_rules! export_extensions {
    ($($body:tt)*) => {
        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static modhost_extension_table: $crate::abi::RawModuleTable =
            $crate::module_table!($($body)*);
    };
}

/// Generate a `create`/`destroy` pair that boxes `$ctor` as `$ty`.
///
/// Panics raised by the constructor are caught and reported to the host as a
/// null instance; the destructor never unwinds across the boundary.
#[macro_export]
macro_rules! extension_factory {
    ($create:ident, $destroy:ident, $ty:ty, $ctor:expr) => {
        extern "C" fn $create() -> *mut ::core::ffi::c_void {
            match ::std::panic::catch_unwind(|| -> $ty { $ctor }) {
                Ok(value) => $crate::into_raw::<$ty>(value),
                Err(_) => ::core::ptr::null_mut(),
            }
        }

        extern "C" fn $destroy(instance: *mut ::core::ffi::c_void) {
            let instance = ::std::panic::AssertUnwindSafe(instance);
            let _ = ::std::panic::catch_unwind(move || {
                let instance = instance;
                // SAFETY: the host only hands back pointers produced by the paired constructor.
                unsafe { $crate::drop_raw::<$ty>(instance.0) }
            });
        }
    };
}
