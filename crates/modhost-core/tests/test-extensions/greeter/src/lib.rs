//! Test extension module exporting two `demo.Greeter` implementations.
//!
//! Build with `cargo build -p modhost-greeter` before running the ignored
//! native tests in `modhost-core`.

use modhost_extension_sdk::prelude::*;

/// Object layout of the `demo.Greeter` interface.
#[repr(C)]
pub struct Greeter {
    pub greeting: RawStr,
}

extension_factory!(
    english_create,
    english_destroy,
    Greeter,
    Greeter {
        greeting: RawStr::new("Hello"),
    }
);

extension_factory!(
    german_create,
    german_destroy,
    Greeter,
    Greeter {
        greeting: RawStr::new("Hallo"),
    }
);

export_extensions! {
    {
        interface: "demo.Greeter",
        name: "English",
        version: 100,
        description: "Says hello",
        tags: ["author" => "Alice Bobbens", "vendor" => "42 inc."],
        create: english_create,
        destroy: english_destroy,
    },
    {
        interface: "demo.Greeter",
        name: "German",
        version: 100,
        description: "Sagt hallo",
        tags: ["vendor" => "other"],
        create: german_create,
        destroy: german_destroy,
    },
}
