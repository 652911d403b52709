//! Command-line interface for inspecting modhost extension modules.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use modhost_core::{
    ExtensionDescriptor, ExtensionInfo, Loader, LoaderConfig, Registry, Scanner,
};

/// modhost - discover and inspect native extension modules.
#[derive(Parser, Debug)]
#[command(name = "modhost")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Loader configuration file (TOML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Scan directories and list the extensions found.
    List {
        /// Directory to scan; repeat for several. Replaces configured paths.
        #[arg(short, long)]
        dir: Vec<PathBuf>,
        /// Descend into subdirectories.
        #[arg(short, long)]
        recursive: bool,
        /// Only show extensions implementing this interface.
        #[arg(short, long)]
        interface: Option<String>,
        /// Only show extensions carrying this tag (key=value); repeatable.
        #[arg(short, long, value_parser = parse_tag)]
        tag: Vec<(String, String)>,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Show the extensions of a single module.
    Info {
        /// Path to the module file.
        #[arg(required = true)]
        path: PathBuf,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Check a module's metadata and report every entry.
    Validate {
        /// Path to the module file.
        #[arg(required = true)]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::List {
            dir,
            recursive,
            interface,
            tag,
            json,
        } => {
            let config = load_config(args.config.as_deref(), dir, recursive)?;
            list_extensions(&config, interface.as_deref(), &tag, json)
        }
        Command::Info { path, json } => show_module_info(&path, json),
        Command::Validate { path } => {
            if !validate_module(&path) {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    // MODHOST_LOG_JSON=true switches to JSON lines.
    let json_logging = std::env::var("MODHOST_LOG_JSON")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let default_directive = if verbose { "modhost=debug" } else { "modhost=warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    // Diagnostics go to stderr so stdout stays machine-readable.
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .init();
    }
}

fn parse_tag(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

fn load_config(file: Option<&Path>, dirs: Vec<PathBuf>, recursive: bool) -> Result<LoaderConfig> {
    let mut config = match file {
        Some(path) => LoaderConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => LoaderConfig::from_env(),
    };

    if !dirs.is_empty() {
        config.search_paths = dirs;
    }
    if recursive {
        config.recursive = true;
    }
    Ok(config)
}

/// Scan the configured paths and print matching extensions.
fn list_extensions(
    config: &LoaderConfig,
    interface: Option<&str>,
    tags: &[(String, String)],
    json: bool,
) -> Result<()> {
    let registry = Registry::from_config(config);
    let report = registry.scan(&Scanner::from_config(config));

    let tag_refs: Vec<(&str, &str)> = tags
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    let descriptors: Vec<ExtensionDescriptor> = match interface {
        Some(interface) => registry.extensions_matching(interface, &tag_refs),
        None => registry
            .all_extensions()
            .into_iter()
            .filter(|d| tag_refs.iter().all(|(k, v)| d.has_tag(k, v)))
            .collect(),
    };
    let infos: Vec<ExtensionInfo> = descriptors.iter().map(ExtensionDescriptor::info).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    if config.search_paths.is_empty() {
        println!("No search paths configured.");
    }
    print_extensions(&infos);
    println!();
    println!(
        "{} extension(s) in {} module(s); {} candidate(s) skipped",
        infos.len(),
        report.loaded.len(),
        report.skipped.len()
    );
    for failure in report.failures() {
        println!("  ! {}: {}", failure.path.display(), failure.error);
    }
    Ok(())
}

/// Load a single module and print its extensions.
fn show_module_info(path: &Path, json: bool) -> Result<()> {
    let descriptors = Loader::new()
        .try_load(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    let infos: Vec<ExtensionInfo> = descriptors.iter().map(ExtensionDescriptor::info).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
    } else {
        println!("Module: {}", path.display());
        println!();
        print_extensions(&infos);
    }
    Ok(())
}

/// Print a validation report; returns whether the module is loadable.
fn validate_module(path: &Path) -> bool {
    match Loader::new().inspect(path) {
        Ok(report) => {
            let passed = report.is_loadable();
            println!(
                "Extension Validation: {}",
                if passed { "PASSED" } else { "FAILED" }
            );
            println!();
            println!("Module:          {}", path.display());
            println!("Accepted:        {}", report.accepted.len());
            println!("Rejected:        {}", report.rejected.len());

            for metadata in &report.accepted {
                println!(
                    "  + {} v{} ({})",
                    metadata.name, metadata.version, metadata.interface
                );
            }
            for rejected in &report.rejected {
                println!("  - entry #{}: {}", rejected.index, rejected.reason);
            }
            passed
        }
        Err(e) => {
            println!("Extension Validation: FAILED");
            println!();
            println!("Error: {}", e);
            println!();
            println!("Make sure:");
            println!("  1. The module file exists and was built for this platform");
            println!(
                "  2. It exports `{}` (use `export_extensions!`)",
                modhost_core::METADATA_SYMBOL
            );
            println!(
                "  3. It was built against extension ABI version {}",
                modhost_core::EXTENSION_ABI_VERSION
            );
            false
        }
    }
}

fn print_extensions(infos: &[ExtensionInfo]) {
    let mut current: Option<&str> = None;
    for info in infos {
        if current != Some(info.interface.as_str()) {
            println!("{}", info.interface);
            current = Some(info.interface.as_str());
        }

        let tags = info
            .tags
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "  {:<20} v{:<6} {}",
            info.name,
            info.version,
            info.module_path.display()
        );
        if !info.description.is_empty() {
            println!("      {}", info.description);
        }
        if !tags.is_empty() {
            println!("      [{}]", tags);
        }
    }
}
