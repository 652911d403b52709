//! # modhost extension SDK
//!
//! Everything an extension module needs to be discovered by a modhost host:
//!
//! - the `#[repr(C)]` metadata layout in [`abi`],
//! - [`export_extensions!`] to publish it under the well-known symbol,
//! - [`extension_factory!`] to generate a constructor/destructor pair.
//!
//! ```rust,ignore
//! use modhost_extension_sdk::prelude::*;
//!
//! pub struct English;
//!
//! extension_factory!(english_create, english_destroy, English, English);
//!
//! export_extensions! {
//!     {
//!         interface: "demo.Greeter",
//!         name: "English",
//!         version: 100,
//!         description: "Says hello",
//!         tags: ["vendor" => "42 inc."],
//!         create: english_create,
//!         destroy: english_destroy,
//!     },
//! }
//! ```
//!
//! Instances are released by the destructor exported next to the constructor,
//! so memory always returns to the allocator that produced it.

pub mod abi;
mod factory;
mod macros;

pub use factory::{drop_raw, into_raw};

/// Re-exports for module authors.
pub mod prelude {
    pub use crate::abi::{
        CreateFn, DestroyFn, RawExtensionRecord, RawModuleTable, RawStr, RawTag,
        EXTENSION_ABI_VERSION, METADATA_SYMBOL,
    };
    pub use crate::{drop_raw, export_extensions, extension_factory, into_raw, module_table};
}
