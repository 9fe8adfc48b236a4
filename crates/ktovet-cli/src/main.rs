// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;

use anyhow::{Context, Result, bail};
use config::Config;
use env_logger::{Env, Target};
use ktovet_app::{AddressDirectory, AddressSearch};
use ktovet_db::{ImportOutcome, SharedStore, Store};
use ktovet_testkit::AddressFaker;
use runtime::DirectoryRuntime;
use std::env;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

const DEMO_SEED: u64 = 42;
const DEMO_CITIES: usize = 120;
const DEMO_MAX_STREETS: usize = 40;
const LOG_FILE_NAME: &str = "ktovet.log";

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `ktovet --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;

    let db_path = if options.demo {
        PathBuf::from(":memory:")
    } else if let Some(path) = options.db_path.take() {
        ktovet_db::validate_db_path(&path.to_string_lossy())?;
        path
    } else {
        config.db_path()?
    };
    if options.print_db_path {
        println!("{}", db_path.display());
        return Ok(());
    }

    options.validate()?;
    if options.serve || options.import_cities.is_some() {
        init_stderr_logging();
    } else {
        init_file_logging(&log_file_path(&db_path))?;
    }

    if options.remote {
        let client = ktovet_client::Client::new(config.client_base_url(), config.client_timeout()?)
            .with_context(|| {
                format!(
                    "invalid [client] config in {}; fix base_url/timeout values",
                    options.config_path.display()
                )
            })?;
        client
            .ping()
            .with_context(|| format!("health check against {}", client.base_url()))?;
        if options.check_only {
            return Ok(());
        }
        return run_tui(Arc::new(client), &config);
    }

    let mut store = Store::open(&db_path).with_context(|| {
        format!(
            "open database {} -- if this path is wrong, set [storage].db_path or KTOVET_DB_PATH",
            db_path.display()
        )
    })?;
    store.bootstrap()?;

    if options.demo {
        let mut faker = AddressFaker::new(DEMO_SEED);
        let dataset = faker.dataset(DEMO_CITIES, DEMO_MAX_STREETS);
        store.import_dataset(&dataset, true)?;
        log::info!(
            "seeded demo data: {} cities, {} streets (seed {})",
            dataset.cities.len(),
            dataset.streets.len(),
            faker.seed()
        );
    }

    if let Some(cities_path) = &options.import_cities {
        let dataset = ktovet_db::load_dataset(cities_path, options.import_streets.as_deref())?;
        let force = options.force_reseed || env_flag("FORCE_RESEED");
        match store.import_dataset(&dataset, force)? {
            ImportOutcome::Skipped { existing_cities } => println!(
                "database already holds {existing_cities} cities; pass --force-reseed to replace them"
            ),
            ImportOutcome::Imported { cities, streets } => println!(
                "imported {cities} cities and {streets} streets into {}",
                db_path.display()
            ),
        }
        if !options.serve {
            return Ok(());
        }
    }

    store.ping()?;
    if options.check_only {
        return Ok(());
    }

    let directory = Arc::new(SharedStore::new(store));
    if options.serve {
        let handle = ktovet_server::start(config.listen(), directory, config.workers())?;
        println!("serving addresses on {}", handle.base_url());
        return handle.join();
    }
    run_tui(directory, &config)
}

fn run_tui(directory: Arc<dyn AddressDirectory + Send + Sync>, config: &Config) -> Result<()> {
    let mut search = AddressSearch::with_debounce(Instant::now(), config.debounce()?);
    let mut runtime = DirectoryRuntime::new(directory);
    ktovet_tui::run_app(&mut search, &mut runtime)
}

fn init_stderr_logging() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stderr)
        .try_init();
}

/// The terminal belongs to the UI, so the interactive mode logs to a file.
fn init_file_logging(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))?;
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
        .target(Target::Pipe(Box::new(file)))
        .try_init();
    Ok(())
}

fn log_file_path(db_path: &Path) -> PathBuf {
    if db_path == Path::new(":memory:") {
        return env::temp_dir().join(LOG_FILE_NAME);
    }
    match db_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(LOG_FILE_NAME),
        _ => PathBuf::from(LOG_FILE_NAME),
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name).is_ok_and(|value| parse_flag(&value))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    db_path: Option<PathBuf>,
    print_config_path: bool,
    print_db_path: bool,
    demo: bool,
    print_example: bool,
    check_only: bool,
    serve: bool,
    remote: bool,
    import_cities: Option<PathBuf>,
    import_streets: Option<PathBuf>,
    force_reseed: bool,
    show_help: bool,
}

impl CliOptions {
    /// Rejects flag combinations that cannot run together.
    fn validate(&self) -> Result<()> {
        if self.serve && self.remote {
            bail!("--serve and --remote cannot be combined; --remote talks to a running server");
        }
        if self.remote && (self.demo || self.import_cities.is_some()) {
            bail!("--remote reads from a server; drop --demo and --import-* or run them locally");
        }
        if self.import_streets.is_some() && self.import_cities.is_none() {
            bail!("--import-streets requires --import-cities; streets must belong to imported cities");
        }
        if self.force_reseed && self.import_cities.is_none() {
            bail!("--force-reseed only applies together with --import-cities");
        }
        Ok(())
    }
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        db_path: None,
        print_config_path: false,
        print_db_path: false,
        demo: false,
        print_example: false,
        check_only: false,
        serve: false,
        remote: false,
        import_cities: None,
        import_streets: None,
        force_reseed: false,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--import-cities" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--import-cities requires a JSON file path"))?;
                options.import_cities = Some(PathBuf::from(value.as_ref()));
            }
            "--import-streets" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--import-streets requires a JSON file path"))?;
                options.import_streets = Some(PathBuf::from(value.as_ref()));
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-path" => {
                options.print_db_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--serve" => {
                options.serve = true;
            }
            "--remote" => {
                options.remote = true;
            }
            "--force-reseed" => {
                options.force_reseed = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown if unknown.starts_with('-') => {
                return Err(anyhow::anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
            path => {
                if options.db_path.is_some() {
                    bail!("unexpected extra argument {path:?}; only one database path is accepted");
                }
                options.db_path = Some(PathBuf::from(path));
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("ktovet: city and street lookup");
    println!("usage: ktovet [options] [db-path]");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-path             Print resolved database path");
    println!("  --print-example-config   Print a config template");
    println!("  --demo                   Launch with generated demo data (in-memory)");
    println!("  --check                  Validate config + DB (or server with --remote) and exit");
    println!("  --serve                  Serve /cities and /streets over HTTP");
    println!("  --remote                 Look up addresses through a running server");
    println!("  --import-cities <path>   Load cities from a JSON register export");
    println!("  --import-streets <path>  Load streets alongside --import-cities");
    println!("  --force-reseed           Replace existing rows on import (or FORCE_RESEED=true)");
    println!("  --help                   Show this help");
}
