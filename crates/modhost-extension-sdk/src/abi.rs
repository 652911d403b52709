//! Wire layout of the extension metadata table.
//!
//! A module advertises its extensions by exporting a single static named
//! [`METADATA_SYMBOL`] of type [`RawModuleTable`]. The host and the module may
//! be built by different compilers, so everything here is `#[repr(C)]`, fixed
//! size, and free of Rust container types.
//!
//! ```text
//! modhost_extension_table ──► RawModuleTable { magic, record_size, count, records }
//!                                                   │
//!                     ┌─────────────────────────────┘
//!                     ▼
//!        [record 0][record 1]...[record count-1]   (stride = record_size)
//!         │
//!         └─ abi_version: u32 is always the first field
//! ```
//!
//! The table header is frozen. Records carry their own `abi_version` so a
//! host can reject an individual entry built against another layout while
//! still accepting its neighbours.

use core::ffi::c_void;
use core::mem::size_of;

/// Version of [`RawExtensionRecord`]. Bump on any layout change.
pub const EXTENSION_ABI_VERSION: u32 = 1;

/// First field of every [`RawModuleTable`] ("MODX").
pub const TABLE_MAGIC: u32 = 0x4D4F_4458;

/// Name of the exported static every extension module must provide.
pub const METADATA_SYMBOL: &str = "modhost_extension_table";

/// Upper bound on `RawModuleTable::count`.
pub const MAX_RECORDS: u32 = 1024;

/// Upper bound on `RawModuleTable::record_size`.
pub const MAX_RECORD_SIZE: u32 = 4096;

/// Upper bound on `RawExtensionRecord::tag_count`.
pub const MAX_TAGS: usize = 256;

/// Upper bound on the byte length of any string in a record.
pub const MAX_STRING_LEN: usize = 64 * 1024;

/// Constructor exported by a module. Returns null on failure.
pub type CreateFn = unsafe extern "C" fn() -> *mut c_void;

/// Destructor paired with a [`CreateFn`]; releases the instance inside the module.
pub type DestroyFn = unsafe extern "C" fn(instance: *mut c_void);

/// UTF-8 string slice living in the module's read-only data.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawStr {
    pub ptr: *const u8,
    pub len: usize,
}

impl RawStr {
    /// The empty string. `ptr` may be null when `len == 0`.
    pub const EMPTY: RawStr = RawStr {
        ptr: core::ptr::null(),
        len: 0,
    };

    pub const fn new(s: &'static str) -> Self {
        Self {
            ptr: s.as_ptr(),
            len: s.len(),
        }
    }
}

/// One free-form key/value pair attached to an extension.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawTag {
    pub key: RawStr,
    pub value: RawStr,
}

impl RawTag {
    pub const fn new(key: &'static str, value: &'static str) -> Self {
        Self {
            key: RawStr::new(key),
            value: RawStr::new(value),
        }
    }
}

/// Metadata describing one extension inside a module.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawExtensionRecord {
    /// Must equal [`EXTENSION_ABI_VERSION`]; always the first field.
    pub abi_version: u32,
    /// Numeric extension version, e.g. `100` for 1.0.0.
    pub version: u32,
    pub name: RawStr,
    /// Identifier of the host interface this extension implements.
    pub interface: RawStr,
    pub description: RawStr,
    pub tags: *const RawTag,
    pub tag_count: usize,
    pub create: Option<CreateFn>,
    pub destroy: Option<DestroyFn>,
}

impl RawExtensionRecord {
    #[allow(clippy::too_many_arguments)]
    pub const fn new(
        interface: &'static str,
        name: &'static str,
        version: u32,
        description: &'static str,
        tags: &'static [RawTag],
        create: CreateFn,
        destroy: DestroyFn,
    ) -> Self {
        Self {
            abi_version: EXTENSION_ABI_VERSION,
            version,
            name: RawStr::new(name),
            interface: RawStr::new(interface),
            description: RawStr::new(description),
            tags: tags.as_ptr(),
            tag_count: tags.len(),
            create: Some(create),
            destroy: Some(destroy),
        }
    }
}

/// Header pointed to by [`METADATA_SYMBOL`].
#[repr(C)]
#[derive(Debug)]
pub struct RawModuleTable {
    /// Must equal [`TABLE_MAGIC`].
    pub magic: u32,
    /// Stride in bytes between consecutive records.
    pub record_size: u32,
    pub count: u32,
    pub reserved: u32,
    /// First record; `count` records follow at `record_size` intervals.
    pub records: *const c_void,
}

impl RawModuleTable {
    pub const fn new(records: &'static [RawExtensionRecord]) -> Self {
        Self {
            magic: TABLE_MAGIC,
            record_size: size_of::<RawExtensionRecord>() as u32,
            count: records.len() as u32,
            reserved: 0,
            records: records.as_ptr() as *const c_void,
        }
    }
}

// SAFETY: every pointer in these types refers to immutable `'static` data
// embedded in the module image; none of them is ever written through.
unsafe impl Sync for RawStr {}
unsafe impl Sync for RawTag {}
unsafe impl Sync for RawExtensionRecord {}
unsafe impl Sync for RawModuleTable {}
