//! End-to-end scans over real directories.
//!
//! Files are created on disk so the scanner walks a real tree. Paths that are
//! registered with the in-memory backend resolve to linked-in tables; every
//! other file goes through the platform loader.

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use common::{OverlayBackend, GREETER};
use modhost_core::{
    platform_module_suffix, ExtensionError, Loader, LoaderConfig, LoaderEvent, MemoryBackend,
    Registry, RegistryOptions, Scanner,
};

fn module_name(stem: &str) -> String {
    format!("{}.{}", stem, platform_module_suffix())
}

fn touch(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

struct Fixture {
    dir: tempfile::TempDir,
    registry: Registry,
    events: Arc<Mutex<Vec<LoaderEvent>>>,
}

impl Fixture {
    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// `valid` and `unrelated` are served from memory; `corrupted` is garbage on disk.
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let valid = dir.path().join(module_name("valid"));
    let unrelated = dir.path().join(module_name("unrelated"));
    let corrupted = dir.path().join(module_name("corrupted"));

    touch(&valid, b"");
    touch(&unrelated, b"");
    touch(&corrupted, b"\x7fELF but not really a shared object");
    touch(&dir.path().join("README.txt"), b"not a module");

    let memory = MemoryBackend::new()
        .with_table(&valid, &common::MODULE_A)
        .with_library(&unrelated);

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let loader = Loader::with_backend(Arc::new(OverlayBackend { memory }));
    let registry = Registry::with_loader(loader)
        .with_event_callback(move |e| sink.lock().unwrap().push(e.clone()));

    Fixture {
        dir,
        registry,
        events,
    }
}

#[test]
fn test_mixed_directory_yields_only_valid_module() {
    let fixture = fixture();

    let report = fixture.registry.scan_and_load([fixture.dir.path()]);

    assert_eq!(report.loaded, vec![fixture.path(&module_name("valid"))]);
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(report.extensions, 3);

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].path, fixture.path(&module_name("corrupted")));
    assert!(matches!(
        failures[0].error,
        ExtensionError::OpenFailed { .. }
    ));

    let valid = fs::canonicalize(fixture.path(&module_name("valid"))).unwrap();
    let greeters = fixture.registry.extensions(GREETER);
    assert_eq!(greeters.len(), 2);
    assert!(greeters.iter().all(|d| d.module_path() == valid));
}

#[test]
fn test_scan_reports_events() {
    let fixture = fixture();
    fixture.registry.scan_and_load([fixture.dir.path()]);

    let events = fixture.events.lock().unwrap();
    let skipped: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            LoaderEvent::Skipped { path, expected, .. } => Some((path.clone(), *expected)),
            _ => None,
        })
        .collect();

    // Directory entries are visited in name order.
    assert_eq!(
        skipped,
        vec![
            (fixture.path(&module_name("corrupted")), false),
            (fixture.path(&module_name("unrelated")), true),
        ]
    );
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, LoaderEvent::Loaded { .. }))
            .count(),
        1
    );
}

#[test]
fn test_missing_roots_are_skipped() {
    let fixture = fixture();
    let missing = fixture.path("does-not-exist");

    let report = fixture
        .registry
        .scan_and_load([missing.as_path(), fixture.dir.path()]);

    assert_eq!(report.loaded.len(), 1);
    assert_eq!(fixture.registry.len(), 3);
}

#[test]
fn test_recursive_scan_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let top = dir.path().join(module_name("a"));
    let nested = dir.path().join("vendor").join(module_name("b"));
    touch(&top, b"");
    touch(&nested, b"");

    let memory = MemoryBackend::new()
        .with_table(&top, &common::MODULE_A)
        .with_table(&nested, &common::MODULE_B);
    let registry = Registry::with_loader(Loader::with_backend(Arc::new(memory)));

    let flat = LoaderConfig::default().with_search_path(dir.path());
    let report = registry.scan(&Scanner::from_config(&flat));
    assert_eq!(report.loaded, vec![top.clone()]);

    let deep = flat.with_recursive(true);
    let report = registry.scan(&Scanner::from_config(&deep));
    // Subdirectory "vendor" sorts after "a.<suffix>".
    assert_eq!(report.loaded, vec![top, nested]);
    assert_eq!(registry.extensions(GREETER).len(), 2 + 2 + 2);
}

#[test]
fn test_abandoned_scan_keeps_loaded_modules() {
    let dir = tempfile::tempdir().unwrap();
    let memory = MemoryBackend::new();
    for stem in ["m1", "m2", "m3"] {
        let path = dir.path().join(module_name(stem));
        touch(&path, b"");
        memory.insert_table(&path, &common::MODULE_B);
    }
    let registry = Registry::with_loader(Loader::with_backend(Arc::new(memory)));

    let scanner = Scanner::new([dir.path()]);
    let report = registry.load_paths(scanner.candidates().take(2));

    assert_eq!(report.loaded.len(), 2);
    assert_eq!(registry.module_count(), 2);
    let canonical = |stem: &str| fs::canonicalize(dir.path().join(module_name(stem))).unwrap();
    assert_eq!(registry.module_paths(), vec![canonical("m1"), canonical("m2")]);

    let instance = registry.create_by_name(GREETER, "German").unwrap();
    assert_eq!(instance.descriptor().module_path(), canonical("m1"));
}

#[test]
fn test_aliased_paths_name_one_module() {
    let dir = tempfile::tempdir().unwrap();
    let real = dir.path().join(module_name("a"));
    touch(&real, b"");
    fs::create_dir(dir.path().join("sub")).unwrap();
    let dotted = dir.path().join("sub").join("..").join(module_name("a"));

    let memory = MemoryBackend::new()
        .with_table(real.clone(), &common::MODULE_A)
        .with_table(dotted.clone(), &common::MODULE_A);
    #[cfg(unix)]
    let link = {
        let link = dir.path().join(module_name("link"));
        std::os::unix::fs::symlink(&real, &link).unwrap();
        memory.insert_table(link.clone(), &common::MODULE_A);
        link
    };
    let backend = Arc::new(memory);
    let registry = Registry::with_loader(Loader::with_backend(backend.clone())).with_options(
        RegistryOptions {
            dedup_by_path: true,
        },
    );

    registry.add_module(&real).unwrap();
    assert!(matches!(
        registry.add_module(&dotted),
        Err(ExtensionError::AlreadyLoaded(_))
    ));
    #[cfg(unix)]
    {
        assert!(matches!(
            registry.add_module(&link),
            Err(ExtensionError::AlreadyLoaded(_))
        ));
        assert!(registry.is_loaded(&link));
    }
    assert_eq!(registry.module_count(), 1);
    assert_eq!(backend.open_count(), 1);
    assert!(registry.is_loaded(&dotted));

    registry.remove_module(&dotted).unwrap();
    assert!(!registry.is_loaded(&real));
    assert_eq!(backend.open_modules(), 0);
}

#[test]
fn test_remove_module_reaches_every_alias() {
    let dir = tempfile::tempdir().unwrap();
    let real = dir.path().join(module_name("a"));
    touch(&real, b"");
    fs::create_dir(dir.path().join("sub")).unwrap();
    let dotted = dir.path().join("sub").join("..").join(module_name("a"));

    let backend = Arc::new(
        MemoryBackend::new()
            .with_table(real.clone(), &common::MODULE_A)
            .with_table(dotted.clone(), &common::MODULE_A),
    );
    let registry = Registry::with_loader(Loader::with_backend(backend.clone()));

    registry.add_module(&real).unwrap();
    registry.add_module(&dotted).unwrap();
    assert_eq!(registry.module_count(), 2);

    registry.remove_module(&real).unwrap();
    assert!(!registry.is_loaded(&dotted));
    assert_eq!(registry.module_count(), 0);
    assert!(registry.is_empty());
    assert_eq!(backend.open_modules(), 0);
}
