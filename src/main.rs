use anyhow::Context;
use lorestore::cli::{Cli, Commands, ConfigAction};
use lorestore::config::{Config, ConfigValidator};
use lorestore::error::LoreError;
use lorestore::retrieval::{build_context, RetrievalStore, SearchOptions};
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Ingest {
            paths,
            names,
            no_save,
            force,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_ingest(&config, &paths, &names, no_save, force)?;
        }
        Commands::Search {
            query,
            top_k,
            source,
            json,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_search(&config, &query, top_k, source, json)?;
        }
        Commands::Context { query, top_k } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_context(&config, &query, top_k)?;
        }
        Commands::Status => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_status(&config)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "lorestore=debug" } else { "lorestore=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Open the store and restore the last snapshot, if any
fn open_store(config: &Config) -> anyhow::Result<RetrievalStore> {
    let mut store =
        RetrievalStore::from_config(config).context("Failed to initialize retrieval store")?;
    if !store.load_index(None) {
        tracing::debug!("Starting with an empty store");
    }
    Ok(store)
}

fn cmd_ingest(
    config: &Config,
    paths: &[PathBuf],
    names: &[String],
    no_save: bool,
    force: bool,
) -> anyhow::Result<()> {
    let mut store = open_store(config)?;

    // Saving would replace a snapshot we could not read
    if !no_save && !force {
        if let Some(dir) = store.rejected_snapshot() {
            anyhow::bail!(
                "Existing snapshot in {} could not be loaded (model or dimension change?). \
                 Rerun with --force to replace it, or --no-save to leave it alone.",
                dir.display()
            );
        }
    }

    let report = store
        .ingest_paths(paths, names)
        .context("Ingestion failed")?;

    println!(
        "✓ Ingested {} document(s) into {} chunk(s) in {}ms",
        report.documents, report.chunks, report.duration_ms
    );
    for skipped in &report.skipped {
        println!("  Skipped (no text): {}", skipped);
    }

    if no_save {
        println!("  Snapshot not written (--no-save)");
    } else {
        store.save_index(None).context("Failed to save index")?;
        println!("  Index: {}", store.index_dir().display());
    }

    Ok(())
}

fn cmd_search(
    config: &Config,
    query: &str,
    top_k: Option<usize>,
    source: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let store = open_store(config)?;

    let mut options = SearchOptions::new(top_k.unwrap_or(config.retrieval.top_k));
    if let Some(source) = source {
        options = options.with_source(source);
    }

    let results = store.search_with(query, &options).context("Search failed")?;

    if json {
        let out = serde_json::to_string_pretty(&results).map_err(|e| LoreError::Json {
            source: e,
            context: "Failed to serialize results".to_string(),
        })?;
        println!("{}", out);
        return Ok(());
    }

    if store.is_empty() {
        println!("No documents indexed yet. Run 'lorestore ingest <PATH>' first.");
        return Ok(());
    }

    if results.is_empty() {
        println!("No results");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        let meta = &result.metadata;
        println!(
            "{}. [{:.3}] {} #{}{}",
            rank + 1,
            result.similarity,
            meta.source_name,
            meta.chunk_index,
            if meta.heading.is_empty() {
                String::new()
            } else {
                format!(" ({})", meta.heading)
            }
        );
        println!("   {}", result.preview(160).replace('\n', " "));
    }

    Ok(())
}

fn cmd_context(config: &Config, query: &str, top_k: Option<usize>) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let results = store
        .search(query, top_k.unwrap_or(config.retrieval.top_k))
        .context("Search failed")?;

    println!("{}", build_context(&results));
    Ok(())
}

fn cmd_status(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let stats = store.stats();

    println!("Lorestore status");
    println!("  Chunks:    {}", stats.chunks);
    println!("  Documents: {}", stats.documents);
    match stats.dimension {
        Some(dimension) => println!("  Dimension: {}", dimension),
        None => println!("  Dimension: (not yet known)"),
    }
    println!(
        "  Provider:  {} ({})",
        config.embedding.provider, config.embedding.model
    );
    println!(
        "  Index:     {}{}",
        stats.index_dir.display(),
        if stats.snapshot_on_disk { "" } else { " (no snapshot)" }
    );

    for doc in store.documents() {
        println!("    - {} ({} chunks)", doc.source_name, doc.chunk_count);
    }

    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, profile)?;
            let toml = toml::to_string_pretty(&config).map_err(LoreError::from)?;
            println!("{}", toml);
        }
        ConfigAction::Validate => {
            let path = resolve_config_path(config_path)?;
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = resolve_config_path(config_path)?;

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            // Create parent directory
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| LoreError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            // Save default config
            let config = Config::default();
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn resolve_config_path(config_path: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match config_path {
        Some(path) => Ok(path),
        None => Ok(Config::default_path()?),
    }
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> anyhow::Result<Config> {
    let path = resolve_config_path(config_path)?;

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'lorestore config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    let config = match profile {
        Some(profile) => Config::load_with_profile(&path, &profile),
        None => Config::load(&path),
    }
    .with_context(|| format!("Failed to load config from {}", path.display()))?;

    Ok(config)
}
