/// State Inspector: lists save slots and queries saved state.
///
/// Usage: state_inspector <saves_dir> [--save <name>] [--query <path>] [--log <filter>]

use narrative_state::core::persistence::{JsonFileBackend, SaveManager};
use narrative_state::core::store::PathStore;
use narrative_state::schema::save::SYSTEM_SAVE_NAME;
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

const USAGE: &str =
    "Usage: state_inspector <saves_dir> [--save <name>] [--query <path>] [--log <filter>]";

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("{}", USAGE);
        process::exit(0);
    }

    let saves_dir = &args[1];
    let mut save_name = None;
    let mut query = None;
    let mut log_filter = "info".to_string();

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--save" if i + 1 < args.len() => {
                i += 1;
                save_name = Some(args[i].clone());
            }
            "--query" if i + 1 < args.len() => {
                i += 1;
                query = Some(args[i].clone());
            }
            "--log" if i + 1 < args.len() => {
                i += 1;
                log_filter = args[i].clone();
            }
            other => {
                eprintln!("ERROR: Unexpected argument '{}'\n{}", other, USAGE);
                process::exit(2);
            }
        }
        i += 1;
    }

    init_tracing(&log_filter);

    let dir = Path::new(saves_dir);
    if !dir.is_dir() {
        eprintln!("ERROR: Path '{}' is not a directory", saves_dir);
        process::exit(1);
    }

    let backend = match JsonFileBackend::open(dir) {
        Ok(backend) => backend,
        Err(e) => {
            eprintln!("ERROR: Failed to open saves: {}", e);
            process::exit(1);
        }
    };
    let manager = SaveManager::new(backend, env!("CARGO_PKG_VERSION"));

    match save_name {
        Some(name) => inspect_save(&manager, &name, query.as_deref()),
        None => list_saves(&manager),
    }
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn list_saves(manager: &SaveManager<JsonFileBackend>) {
    let saves = match manager.list_saves() {
        Ok(saves) => saves,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    };

    println!("=== Saves in {} ===\n", manager.backend().path().display());
    if saves.is_empty() {
        println!("(no saves)");
    }
    for save in &saves {
        println!(
            "{:<24} v{:<10} {:>15}  {}",
            save.name,
            save.version,
            save.timestamp,
            save.description.as_deref().unwrap_or("")
        );
    }

    let initial = manager.has_initial_state().unwrap_or(false);
    println!(
        "\n{} saves, initial state {}",
        saves.len(),
        if initial { "recorded" } else { "missing" }
    );
}

fn inspect_save(manager: &SaveManager<JsonFileBackend>, name: &str, query: Option<&str>) {
    let mut store = PathStore::new();
    let loaded = if name == SYSTEM_SAVE_NAME {
        manager.restore_initial_state(&mut store)
    } else {
        manager.load_game(&mut store, name).map(|_| ())
    };
    if let Err(e) = loaded {
        eprintln!("ERROR: {}", e);
        process::exit(1);
    }

    let path = query.unwrap_or("$");
    let matches = match store.get_value(path) {
        Ok(matches) => matches,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    };

    if matches.is_empty() {
        println!("{}: no match", path);
        return;
    }
    for value in matches {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("ERROR: {}", e),
        }
    }
}
