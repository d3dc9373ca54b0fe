//! # Catalog Search CLI (`catsearch`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `catsearch init` | Create the SQLite database and run schema migrations |
//! | `catsearch sync item <type> <id>` | Sync one source object from the catalog |
//! | `catsearch sync scope <data-source>` | Sync every object of a data source |
//! | `catsearch search "<query>"` | Search the index |
//! | `catsearch get <id>` | Show one index item |
//! | `catsearch embed` | Backfill missing or stale embeddings |
//! | `catsearch profile set|list` | Manage search profiles |
//! | `catsearch stats` | Index statistics |
//! | `catsearch serve` | Start the JSON HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! catsearch init --config ./config/catsearch.toml
//! catsearch sync scope warehouse
//! catsearch search "inactive users" --method sparse --data-source warehouse
//! catsearch profile set warehouse-default --data-source warehouse --default --top-k 5
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use catalog_search_core::models::{ItemType, ScopeFilter, SearchProfile};
use catalog_search_core::search::{SearchMethod, SearchRequest};
use catalog_search::{
    config, embed_cmd, get, ingest, logging, migrate, profiles, search, server, stats,
};

/// Catalog Search: hybrid BM25 + embedding retrieval over a data catalog.
#[derive(Parser)]
#[command(name = "catsearch", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/catsearch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Reconcile the index with the source catalog.
    Sync {
        #[command(subcommand)]
        target: SyncTarget,
    },

    /// Search indexed items.
    Search {
        query: String,

        /// dense, sparse, or hybrid. Defaults to the profile or `[retrieval] method`.
        #[arg(long)]
        method: Option<SearchMethod>,

        #[arg(long)]
        top_k: Option<usize>,

        /// Restrict to one data source (global items are included unless --strict).
        #[arg(long)]
        data_source: Option<String>,

        /// Comma-separated item types, e.g. `table,sample_query`.
        #[arg(long, value_delimiter = ',')]
        types: Vec<ItemType>,

        /// Exclude global items when --data-source is set.
        #[arg(long)]
        strict: bool,

        /// Named search profile.
        #[arg(long)]
        profile: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Show one index item by ID.
    Get { id: String },

    /// Embed items whose vectors are missing or stale.
    Embed {
        #[arg(long)]
        data_source: Option<String>,

        /// Re-embed every active item in scope.
        #[arg(long)]
        force: bool,

        #[arg(long)]
        limit: Option<usize>,

        /// Only count the items that would be embedded.
        #[arg(long)]
        dry_run: bool,
    },

    /// Manage search profiles.
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Show index statistics.
    Stats {
        #[arg(long)]
        data_source: Option<String>,
    },

    /// Start the JSON HTTP API on `[server] bind`.
    Serve,
}

#[derive(Subcommand)]
enum SyncTarget {
    /// Sync one source object.
    Item { item_type: ItemType, source_id: String },
    /// Sync every object of a data source and remove orphans.
    Scope { data_source_id: String },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Create or replace a profile.
    Set {
        name: String,

        #[arg(long)]
        data_source: Option<String>,

        /// Make this the default profile of its data source.
        #[arg(long = "default")]
        is_default: bool,

        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long)]
        method: Option<SearchMethod>,

        #[arg(long)]
        dense_weight: Option<f64>,

        #[arg(long)]
        sparse_weight: Option<f64>,

        #[arg(long)]
        rrf_k: Option<f64>,

        #[arg(long)]
        dims: Option<usize>,

        #[arg(long)]
        model: Option<String>,
    },
    /// List all profiles.
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync { target } => match target {
            SyncTarget::Item {
                item_type,
                source_id,
            } => {
                ingest::run_sync_item(&cfg, item_type, &source_id).await?;
            }
            SyncTarget::Scope { data_source_id } => {
                ingest::run_sync_scope(&cfg, &data_source_id).await?;
            }
        },
        Commands::Search {
            query,
            method,
            top_k,
            data_source,
            types,
            strict,
            profile,
            json,
        } => {
            let mut scope = match data_source {
                Some(ds) => ScopeFilter::for_data_source(ds),
                None => ScopeFilter::all(),
            };
            if strict {
                scope = scope.strict();
            }
            let req = SearchRequest {
                method,
                top_k,
                profile,
                ..SearchRequest::new(query).with_scope(scope.with_types(types))
            };
            search::run_search(&cfg, req, json).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Embed {
            data_source,
            force,
            limit,
            dry_run,
        } => {
            let scope = match data_source {
                Some(ds) => ScopeFilter::for_data_source(ds).strict(),
                None => ScopeFilter::all(),
            };
            embed_cmd::run_embed(&cfg, scope, force, limit, dry_run).await?;
        }
        Commands::Profile { action } => match action {
            ProfileAction::Set {
                name,
                data_source,
                is_default,
                top_k,
                method,
                dense_weight,
                sparse_weight,
                rrf_k,
                dims,
                model,
            } => {
                let profile = SearchProfile {
                    name,
                    data_source_id: data_source,
                    is_default,
                    top_k,
                    search_method: method,
                    dense_weight,
                    sparse_weight,
                    rrf_k,
                    dimensions: dims,
                    model,
                };
                profiles::run_profile_set(&cfg, profile).await?;
            }
            ProfileAction::List => {
                profiles::run_profile_list(&cfg).await?;
            }
        },
        Commands::Stats { data_source } => {
            stats::run_stats(&cfg, data_source).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
