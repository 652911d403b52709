//! Module loader.
//!
//! Opens one candidate, finds the metadata table, validates it entry by entry
//! and turns every accepted entry into an [`ExtensionDescriptor`]. A module
//! without the table, or without a single usable entry, is closed again.
//!
//! Nothing read from the module is trusted. The header is checked before the
//! records are touched, each record's version tag is read before the rest of
//! the record, and every pointer and length is bounded before it is followed.

use std::collections::BTreeMap;
use std::ffi::c_void;
use std::mem::{align_of, size_of};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use modhost_extension_sdk::abi::{
    CreateFn, DestroyFn, RawExtensionRecord, RawModuleTable, RawStr, RawTag,
    EXTENSION_ABI_VERSION, MAX_RECORDS, MAX_RECORD_SIZE, MAX_STRING_LEN, MAX_TAGS,
    METADATA_SYMBOL, TABLE_MAGIC,
};
use serde::Serialize;

use crate::descriptor::{ExtensionDescriptor, ExtensionMetadata};
use crate::error::{ExtensionError, Result};
use crate::events::{emit, EventCallback, LoaderEvent};
use crate::module::{ModuleBackend, ModuleHandle, NativeBackend};

/// An entry that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedEntry {
    /// Position in the module's table.
    pub index: usize,
    pub reason: String,
}

/// Outcome of [`Loader::inspect`].
#[derive(Debug, Clone, Serialize)]
pub struct ModuleReport {
    pub path: PathBuf,
    pub accepted: Vec<ExtensionMetadata>,
    pub rejected: Vec<RejectedEntry>,
}

impl ModuleReport {
    pub fn is_loadable(&self) -> bool {
        !self.accepted.is_empty()
    }
}

/// Loads extension modules through a [`ModuleBackend`].
#[derive(Clone)]
pub struct Loader {
    backend: Arc<dyn ModuleBackend>,
    events: Option<EventCallback>,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader {
    /// Loader using the platform's native dynamic loader.
    pub fn new() -> Self {
        Self::with_backend(Arc::new(NativeBackend))
    }

    pub fn with_backend(backend: Arc<dyn ModuleBackend>) -> Self {
        Self {
            backend,
            events: None,
        }
    }

    /// Install a diagnostics callback.
    pub fn with_event_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&LoaderEvent) + Send + Sync + 'static,
    {
        self.events = Some(Arc::new(callback));
        self
    }

    pub(crate) fn set_event_callback(&mut self, callback: Option<EventCallback>) {
        self.events = callback;
    }

    pub(crate) fn events(&self) -> Option<&EventCallback> {
        self.events.as_ref()
    }

    pub fn backend(&self) -> &Arc<dyn ModuleBackend> {
        &self.backend
    }

    /// Load `path`, or `None` if it contributes no extensions.
    ///
    /// Success is reported as [`LoaderEvent::Loaded`], failures are logged and
    /// reported as [`LoaderEvent::Skipped`].
    pub fn load(&self, path: &Path) -> Option<Vec<ExtensionDescriptor>> {
        match self.try_load(path) {
            Ok(descriptors) => {
                if let Some(first) = descriptors.first() {
                    self.report_loaded(path, first.module().id(), descriptors.len());
                }
                Some(descriptors)
            }
            Err(e) => {
                self.report_skip(path, &e);
                None
            }
        }
    }

    /// Load `path`, returning the reason it was skipped on failure.
    ///
    /// Emits only [`LoaderEvent::EntryRejected`]; reporting the outcome is
    /// left to the caller.
    pub fn try_load(&self, path: &Path) -> Result<Vec<ExtensionDescriptor>> {
        let module = ModuleHandle::open(self.backend.as_ref(), path)?;
        let table = module.lookup(METADATA_SYMBOL)?;
        let parsed = read_table_guarded(table)?;

        for rejected in &parsed.rejected {
            tracing::warn!(
                path = %path.display(),
                index = rejected.index,
                "Rejected extension entry: {}",
                rejected.reason
            );
            emit(
                self.events(),
                LoaderEvent::EntryRejected {
                    path: path.to_path_buf(),
                    index: rejected.index,
                    reason: rejected.reason.clone(),
                },
            );
        }

        if parsed.accepted.is_empty() {
            return Err(ExtensionError::NoValidEntries(path.to_path_buf()));
        }

        let descriptors: Vec<_> = parsed
            .accepted
            .into_iter()
            .map(|entry| {
                ExtensionDescriptor::new(entry.metadata, module.clone(), entry.create, entry.destroy)
            })
            .collect();

        Ok(descriptors)
    }

    /// Validate `path` without registering anything.
    ///
    /// The module is closed before returning.
    pub fn inspect(&self, path: &Path) -> Result<ModuleReport> {
        let module = ModuleHandle::open(self.backend.as_ref(), path)?;
        let table = module.lookup(METADATA_SYMBOL)?;
        let parsed = read_table_guarded(table)?;

        Ok(ModuleReport {
            path: path.to_path_buf(),
            accepted: parsed.accepted.into_iter().map(|e| e.metadata).collect(),
            rejected: parsed.rejected,
        })
    }

    pub(crate) fn report_loaded(&self, path: &Path, module_id: u64, extensions: usize) {
        tracing::info!(
            path = %path.display(),
            module_id,
            extensions,
            "Loaded extension module"
        );
        emit(
            self.events(),
            LoaderEvent::Loaded {
                path: path.to_path_buf(),
                module_id,
                extensions,
            },
        );
    }

    pub(crate) fn report_skip(&self, path: &Path, error: &ExtensionError) {
        let expected = error.is_expected_skip();
        if expected {
            tracing::debug!(path = %path.display(), "Not an extension module: {}", error);
        } else {
            tracing::warn!(path = %path.display(), "Skipping module: {}", error);
        }
        emit(
            self.events(),
            LoaderEvent::Skipped {
                path: path.to_path_buf(),
                reason: error.to_string(),
                expected,
            },
        );
    }
}

struct AcceptedEntry {
    metadata: ExtensionMetadata,
    create: CreateFn,
    destroy: DestroyFn,
}

struct ParsedTable {
    accepted: Vec<AcceptedEntry>,
    rejected: Vec<RejectedEntry>,
}

fn read_table_guarded(address: *const c_void) -> Result<ParsedTable> {
    // SAFETY: `address` is the non-null address of the exported symbol; every
    // read below is bounds- and alignment-checked first.
    panic::catch_unwind(AssertUnwindSafe(|| unsafe { read_table(address) })).unwrap_or_else(
        |_| {
            Err(ExtensionError::MalformedRecord(
                "panic while reading metadata table".into(),
            ))
        },
    )
}

unsafe fn read_table(address: *const c_void) -> Result<ParsedTable> {
    if address.is_null() || !is_aligned(address as usize, align_of::<RawModuleTable>()) {
        return Err(malformed("table pointer is null or misaligned"));
    }
    let table = &*(address as *const RawModuleTable);

    if table.magic != TABLE_MAGIC {
        return Err(malformed(format!("bad table magic {:#010x}", table.magic)));
    }
    if table.count > MAX_RECORDS {
        return Err(malformed(format!(
            "table declares {} records (limit {})",
            table.count, MAX_RECORDS
        )));
    }
    if (table.record_size as usize) < size_of::<u32>() || table.record_size > MAX_RECORD_SIZE {
        return Err(malformed(format!("invalid record size {}", table.record_size)));
    }
    if table.count > 0 && table.records.is_null() {
        return Err(malformed("records pointer is null"));
    }

    let mut parsed = ParsedTable {
        accepted: Vec::new(),
        rejected: Vec::new(),
    };

    let base = table.records as *const u8;
    let stride = table.record_size as usize;
    for index in 0..table.count as usize {
        let record = base.add(index * stride);
        match read_record(record, stride) {
            Ok(entry) => parsed.accepted.push(entry),
            Err(e) => parsed.rejected.push(RejectedEntry {
                index,
                reason: e.to_string(),
            }),
        }
    }

    Ok(parsed)
}

unsafe fn read_record(record: *const u8, stride: usize) -> Result<AcceptedEntry> {
    if !is_aligned(record as usize, align_of::<u32>()) {
        return Err(malformed("record is misaligned"));
    }

    let abi_version = (record as *const u32).read();
    if abi_version != EXTENSION_ABI_VERSION {
        return Err(ExtensionError::AbiVersionMismatch {
            expected: EXTENSION_ABI_VERSION,
            found: abi_version,
        });
    }

    if stride < size_of::<RawExtensionRecord>() {
        return Err(malformed(format!(
            "record size {} is smaller than version {} layout ({})",
            stride,
            EXTENSION_ABI_VERSION,
            size_of::<RawExtensionRecord>()
        )));
    }
    if !is_aligned(record as usize, align_of::<RawExtensionRecord>()) {
        return Err(malformed("record is misaligned"));
    }
    let raw = &*(record as *const RawExtensionRecord);

    let name = read_str(&raw.name, "name")?;
    let interface = read_str(&raw.interface, "interface")?;
    if name.is_empty() {
        return Err(malformed("empty extension name"));
    }
    if interface.is_empty() {
        return Err(malformed(format!("extension '{}' has an empty interface", name)));
    }
    let description = read_str(&raw.description, "description")?;
    let tags = read_tags(raw.tags, raw.tag_count)?;

    let (Some(create), Some(destroy)) = (raw.create, raw.destroy) else {
        return Err(malformed(format!(
            "extension '{}' is missing its create/destroy pair",
            name
        )));
    };

    Ok(AcceptedEntry {
        metadata: ExtensionMetadata {
            name,
            interface,
            version: raw.version,
            description,
            tags,
        },
        create,
        destroy,
    })
}

unsafe fn read_tags(tags: *const RawTag, count: usize) -> Result<BTreeMap<String, String>> {
    if count > MAX_TAGS {
        return Err(malformed(format!("{} tags (limit {})", count, MAX_TAGS)));
    }

    let mut map = BTreeMap::new();
    if count == 0 {
        return Ok(map);
    }
    if tags.is_null() || !is_aligned(tags as usize, align_of::<RawTag>()) {
        return Err(malformed("tag array is null or misaligned"));
    }

    for tag in std::slice::from_raw_parts(tags, count) {
        let key = read_str(&tag.key, "tag key")?;
        let value = read_str(&tag.value, "tag value")?;
        map.insert(key, value);
    }
    Ok(map)
}

unsafe fn read_str(raw: &RawStr, field: &str) -> Result<String> {
    if raw.len == 0 {
        return Ok(String::new());
    }
    if raw.len > MAX_STRING_LEN {
        return Err(malformed(format!("{} is {} bytes long", field, raw.len)));
    }
    if raw.ptr.is_null() {
        return Err(malformed(format!("{} pointer is null", field)));
    }

    let bytes = std::slice::from_raw_parts(raw.ptr, raw.len);
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| malformed(format!("{} is not UTF-8: {}", field, e)))
}

fn is_aligned(address: usize, align: usize) -> bool {
    address % align == 0
}

fn malformed(reason: impl Into<String>) -> ExtensionError {
    ExtensionError::MalformedRecord(reason.into())
}
