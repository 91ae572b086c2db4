//! CLI utility to inspect, export, import, or clear the stored training dataset.

use std::path::PathBuf;
use std::sync::Arc;

use livelabel::dataset::{DatasetStore, SqliteKeyValueStore};
use livelabel::{logging, settings};
use livelabel::status::StatusReporter;

fn main() {
    if let Err(err) = logging::init() {
        eprintln!("File logging disabled: {err}");
    }
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };
    let settings = settings::load_or_default().map_err(|err| err.to_string())?;
    let db_path = match &options.db_path {
        Some(path) => path.clone(),
        None => settings
            .storage
            .database_path()
            .map_err(|err| err.to_string())?,
    };
    let store = SqliteKeyValueStore::open(&db_path)
        .map_err(|err| format!("Open {} failed: {err}", db_path.display()))?;
    let mut dataset = DatasetStore::with_persistence(
        Arc::new(store),
        &settings.storage.dataset_key,
        StatusReporter::silent(),
    );
    restore_for(&options.command, &mut dataset)?;

    match options.command {
        Command::Counts => {
            if dataset.is_empty() {
                println!("Dataset is empty.");
            }
            for (label, count) in dataset.label_counts() {
                println!("{label}\t{count}");
            }
        }
        Command::Export(dir) => {
            let export = dataset.export().map_err(|err| err.to_string())?;
            std::fs::create_dir_all(&dir)
                .map_err(|err| format!("Create {} failed: {err}", dir.display()))?;
            let path = dir.join(&export.file_name);
            std::fs::write(&path, &export.bytes)
                .map_err(|err| format!("Write {} failed: {err}", path.display()))?;
            println!("Exported {} example(s) to {}.", dataset.len(), path.display());
        }
        Command::Import(file) => {
            let bytes = std::fs::read(&file)
                .map_err(|err| format!("Read {} failed: {err}", file.display()))?;
            let count = dataset.import(&bytes).map_err(|err| err.to_string())?;
            println!("Imported {count} example(s).");
        }
        Command::Clear => {
            let count = dataset.len();
            dataset.clear();
            println!("Cleared {count} example(s).");
        }
    }
    dataset.flush();
    Ok(())
}

/// Load the saved dataset. `clear` proceeds past unreadable data so it can wipe it.
fn restore_for(command: &Command, dataset: &mut DatasetStore) -> Result<(), String> {
    match dataset.restore() {
        Ok(_) => Ok(()),
        Err(err) if matches!(command, Command::Clear) => {
            eprintln!("Ignoring unreadable stored dataset: {err}");
            Ok(())
        }
        Err(err) => Err(err.to_string()),
    }
}

enum Command {
    Counts,
    Export(PathBuf),
    Import(PathBuf),
    Clear,
}

struct Options {
    db_path: Option<PathBuf>,
    command: Command,
}

fn parse_args(args: Vec<String>) -> Result<Option<Options>, String> {
    let mut db_path = None;
    let mut command = None;
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--db" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--db requires a value".to_string())?;
                db_path = Some(PathBuf::from(value));
            }
            "counts" => command = Some(Command::Counts),
            "clear" => command = Some(Command::Clear),
            "export" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "export requires a directory".to_string())?;
                command = Some(Command::Export(PathBuf::from(value)));
            }
            "import" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "import requires a file".to_string())?;
                command = Some(Command::Import(PathBuf::from(value)));
            }
            unknown => {
                return Err(format!("Unknown argument: {unknown}\n\n{}", help_text()));
            }
        }
        idx += 1;
    }
    let command = command.ok_or_else(|| format!("A command is required\n\n{}", help_text()))?;
    Ok(Some(Options { db_path, command }))
}

fn help_text() -> String {
    [
        "livelabel-dataset",
        "",
        "Inspects or edits the stored nearest-neighbour training dataset.",
        "",
        "Usage:",
        "  livelabel-dataset counts",
        "  livelabel-dataset export <dir>",
        "  livelabel-dataset import <file.json>",
        "  livelabel-dataset clear",
        "",
        "Options:",
        "  --db <path>   Path to the dataset database (defaults to the configured file).",
    ]
    .join("\n")
}
