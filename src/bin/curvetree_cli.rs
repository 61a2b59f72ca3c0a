//! `curvetree-cli` — the minimal operator surface over a durable curve
//! tree: inspect it, rebuild it, and move its outputs in and out as a
//! flat file.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use curvetree::config::CurveTreeConfig;
use curvetree::logging;
use curvetree::output::{OutputTuple, OUTPUT_TUPLE_WIRE_SIZE};
use curvetree::storage;
use curvetree::tree::CurveTreeBuilder;
use curvetree::{CurveTree, CurveTreeError};

#[derive(Parser)]
#[command(name = "curvetree-cli", about = "Operate a durable curve tree")]
struct Cli {
    /// Use a volatile in-memory store instead of the configured sled
    /// path. Useful for dry runs; nothing persists once the process exits.
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Prints `{output_count, depth, root_hex}`.
    TreeInfo,
    /// Triggers a rebuild; exits 0 on success, 4 if integrity still fails afterward.
    TreeRebuild,
    /// Dumps outputs in index order to `file`.
    TreeExport { file: PathBuf },
    /// Bulk-loads outputs from `file` into the tree.
    TreeImport { file: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match CurveTreeConfig::from_env() {
        Ok(config) => config,
        Err(err) => return fail(&CurveTreeError::Config(err)),
    };
    if cli.memory {
        config.storage_kind = curvetree::StorageKind::Memory;
    }
    if logging::init_from_config(&config).is_err() {
        // Logging failing to initialize must not block the command itself.
        eprintln!("warning: failed to initialize logging");
    }

    let storage = match storage::open(config.storage_kind, &config.data_dir) {
        Ok(storage) => storage,
        Err(err) => return fail(&CurveTreeError::Storage(err)),
    };
    let tree = CurveTree::new(storage, config.tree);

    // Restart without a full rebuild when the last checkpoint still
    // matches; a stale one falls back to rebuild inside `load` itself.
    if let Err(err) = tree.load() {
        return fail(&CurveTreeError::Tree(err));
    }

    // `tree-rebuild` carries its own exit code (1, not the general
    // integrity-failure code 4).
    if matches!(&cli.command, Command::TreeRebuild) {
        return match run_tree_rebuild(&tree) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                logging::log_surfaced_error(err.kind(), &err.to_string(), None);
                eprintln!("error: {}: {}", err.kind(), err);
                ExitCode::from(1)
            }
        };
    }

    let result = match cli.command {
        Command::TreeInfo => run_tree_info(&tree),
        Command::TreeExport { file } => run_tree_export(&tree, &file),
        Command::TreeImport { file } => run_tree_import(&tree, &file),
        Command::TreeRebuild => unreachable!(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => fail(&err),
    }
}

fn run_tree_info(tree: &CurveTree) -> Result<(), CurveTreeError> {
    let output_count = tree.output_count()?;
    let depth = tree.depth_of()?;
    let root = tree.get_root()?;
    println!(
        "{{\"output_count\":{},\"depth\":{},\"root_hex\":\"{}\"}}",
        output_count,
        depth,
        hex::encode(root.to_bytes())
    );
    Ok(())
}

fn run_tree_rebuild(tree: &CurveTree) -> Result<(), CurveTreeError> {
    tree.rebuild()?;
    tree.verify_integrity()?;
    tree.save()?;
    Ok(())
}

fn run_tree_export(tree: &CurveTree, file: &PathBuf) -> Result<(), CurveTreeError> {
    let out = File::create(file)?;
    let written = tree.export_outputs(BufWriter::new(out))?;
    println!("exported {written} outputs");
    Ok(())
}

/// Bulk-loads `file` through [`CurveTreeBuilder`] rather than
/// `CurveTree::import_outputs`, so an operator importing a large export
/// gets the builder's chunked-batch commits instead of one giant batch.
fn run_tree_import(tree: &CurveTree, file: &PathBuf) -> Result<(), CurveTreeError> {
    let mut reader = BufReader::new(File::open(file)?);
    let mut builder = CurveTreeBuilder::new(tree.storage_handle(), tree.config())
        .on_progress(|processed, total| println!("imported {processed}/{total}"));

    let mut buf = [0u8; OUTPUT_TUPLE_WIRE_SIZE];
    loop {
        match reader.read_exact(&mut buf) {
            Ok(()) => builder.push(OutputTuple::deserialize(&buf)?),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(CurveTreeError::Io(err)),
        }
    }
    let imported = builder.pending_count() as u64;
    builder.finalize()?;
    tree.save()?;
    println!("imported {imported} outputs");
    Ok(())
}

/// Prints `error: <kind>: <message>` to stderr, logs it, and maps it to
/// the process exit code for the error's kind.
fn fail(err: &CurveTreeError) -> ExitCode {
    logging::log_surfaced_error(err.kind(), &err.to_string(), None);
    eprintln!("error: {}: {}", err.kind(), err);
    ExitCode::from(err.exit_code() as u8)
}
