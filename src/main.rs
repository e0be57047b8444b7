use anyhow::{Context, Result};
use clap::Parser;
use javadoc_store::archive::LinkStyle;
use javadoc_store::cache::CachedStore;
use javadoc_store::cli::{Cli, Commands};
use javadoc_store::config::store_config;
use javadoc_store::model::ClassInfo;
use javadoc_store::registry::Resolution;
use javadoc_store::store::{DocStore, UncachedStore};
use serde::Serialize;
use std::io::{BufRead, Write};
use std::time::Duration;

fn main() -> Result<()> {
    init_tracing();
    let cli = parse_cli()?;
    let config = store_config(&cli)?;

    match cli.command.clone() {
        Commands::Show { class_name, framed } => {
            let store = UncachedStore::open(&config.dir, &config.filter())?;
            let result = show(&store, &class_name, link_style(framed));
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Resolve { class_name } => {
            let store = UncachedStore::open(&config.dir, &config.filter())?;
            let resolution = store.resolve(&normalize_class_name(&class_name));
            println!("{}", serde_json::to_string_pretty(&resolution)?);
        }
        Commands::Search { query, limit } => {
            let store = UncachedStore::open(&config.dir, &config.filter())?;
            let mut matches = store.search(query.trim());
            if let Some(limit) = limit {
                matches.truncate(limit);
            }
            println!("{}", serde_json::to_string_pretty(&matches)?);
        }
        Commands::Archives => {
            let store = UncachedStore::open(&config.dir, &config.filter())?;
            let listing = ArchiveListing {
                dir: config.dir.display().to_string(),
                archives: store.archives(),
                rejected: store.rejected(),
            };
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        Commands::Serve {
            watch,
            fallback,
            debounce_ms,
            poll_ms,
            framed,
        } => {
            let config = config
                .with_watch(watch)
                .with_fallback(fallback)
                .with_debounce(Duration::from_millis(debounce_ms))
                .with_poll_interval(Duration::from_millis(poll_ms));
            let store = CachedStore::open(config)?;
            serve(&store, link_style(framed))?;
            store.close();
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();
}

fn parse_cli() -> Result<Cli> {
    let args: Vec<String> = std::env::args().collect();
    Ok(Cli::parse_from(rewrite_args_for_implicit_show(args)))
}

/// `javadoc-store java.util.List` means `javadoc-store show java.util.List`.
fn rewrite_args_for_implicit_show(mut args: Vec<String>) -> Vec<String> {
    if args.len() <= 1 {
        return args;
    }

    let subcommands = ["show", "resolve", "search", "archives", "serve", "help"];

    let mut idx = 1usize;
    while idx < args.len() {
        let a = args[idx].as_str();
        if a == "--" {
            idx += 1;
            break;
        }

        if a == "--dir" || a == "--extensions" {
            idx += 2;
            continue;
        }

        if a.starts_with('-') {
            idx += 1;
            continue;
        }

        break;
    }

    if idx < args.len() {
        let token = args[idx].as_str();
        if !subcommands.contains(&token) {
            args.insert(idx, "show".to_string());
        }
    }

    args
}

/// Accepts a pasted `import a.b.C;` line as well as a bare name.
fn normalize_class_name(raw: &str) -> String {
    let mut s = raw.trim();
    if let Some(rest) = s
        .strip_prefix("import")
        .filter(|rest| rest.starts_with(char::is_whitespace))
    {
        s = rest.trim();
    }
    if s.ends_with(';') {
        s = s.trim_end_matches(';').trim();
    }
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

fn link_style(framed: bool) -> LinkStyle {
    if framed {
        LinkStyle::Framed
    } else {
        LinkStyle::Direct
    }
}

#[derive(Debug, Serialize)]
struct ArchiveListing {
    dir: String,
    archives: Vec<javadoc_store::catalog::ArchiveSummary>,
    rejected: Vec<javadoc_store::catalog::RejectedArchive>,
}

#[derive(Debug, Serialize)]
struct ShowResult {
    query: String,
    resolution: Resolution,
    url: Option<String>,
    class: Option<ClassInfo>,
}

fn show(store: &dyn DocStore, raw: &str, style: LinkStyle) -> ShowResult {
    let query = normalize_class_name(raw);
    let resolution = store.resolve(&query);
    let (url, class) = match resolution.found() {
        Some(name) => (
            store.class_url(name, style),
            store
                .class_info(&name.fully_qualified)
                .map(|info| ClassInfo::clone(&info)),
        ),
        None => (None, None),
    };
    ShowResult {
        query,
        resolution,
        url,
        class,
    }
}

fn serve(store: &CachedStore, style: LinkStyle) -> Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let line = line.context("Failed to read from stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let result = show(store, &line, style);
        serde_json::to_writer(&mut out, &result)?;
        writeln!(out)?;
        out.flush()?;
    }

    tracing::debug!(stats = ?store.stats(), "serve finished");
    Ok(())
}
