//! Search profile administration (`catsearch profile set|list`).
//!
//! A profile holds optional retrieval overrides. A profile bound to a data
//! source with `is_default = true` applies to every search in that scope
//! unless the request names another profile or overrides a field itself.

use anyhow::Result;

use catalog_search_core::models::SearchProfile;
use catalog_search_core::store::Store;
use catalog_search_core::EngineError;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Validate and persist a profile.
pub async fn save_profile(store: &dyn Store, profile: &SearchProfile) -> Result<()> {
    validate_profile(profile)?;
    store.upsert_profile(profile).await
}

pub fn validate_profile(profile: &SearchProfile) -> Result<()> {
    let invalid = |msg: String| -> Result<()> { Err(EngineError::InvalidInput(msg).into()) };

    if profile.name.trim().is_empty() {
        return invalid("profile name must not be empty".into());
    }
    if profile.is_default && profile.data_source_id.is_none() {
        return invalid("a default profile must name a data source".into());
    }
    if profile.top_k == Some(0) {
        return invalid("top_k must be >= 1".into());
    }
    for (field, value) in [
        ("dense_weight", profile.dense_weight),
        ("sparse_weight", profile.sparse_weight),
        ("rrf_k", profile.rrf_k),
    ] {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                return invalid(format!("{} must be a finite value >= 0", field));
            }
        }
    }
    Ok(())
}

pub async fn run_profile_set(config: &Config, profile: SearchProfile) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    save_profile(&store, &profile).await?;
    println!("profile {} saved", profile.name);
    if profile.is_default {
        if let Some(ds) = &profile.data_source_id {
            println!("  default for data source {}", ds);
        }
    }
    store.pool().close().await;
    Ok(())
}

pub async fn run_profile_list(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let profiles = store.list_profiles().await?;
    store.pool().close().await;

    if profiles.is_empty() {
        println!("No profiles.");
        return Ok(());
    }

    println!(
        "{:<20} {:<16} {:>5} {:<8} {:>6} {:>6} {:>6}",
        "NAME", "DATA SOURCE", "TOP_K", "METHOD", "DENSE", "SPARSE", "RRF_K"
    );
    println!("{}", "-".repeat(75));
    let dash = || "-".to_string();
    for p in &profiles {
        let name = if p.is_default {
            format!("{} *", p.name)
        } else {
            p.name.clone()
        };
        println!(
            "{:<20} {:<16} {:>5} {:<8} {:>6} {:>6} {:>6}",
            name,
            p.data_source_id.as_deref().unwrap_or("(global)"),
            p.top_k.map(|v| v.to_string()).unwrap_or_else(dash),
            p.search_method.map(|m| m.to_string()).unwrap_or_else(dash),
            p.dense_weight.map(|v| format!("{:.2}", v)).unwrap_or_else(dash),
            p.sparse_weight.map(|v| format!("{:.2}", v)).unwrap_or_else(dash),
            p.rrf_k.map(|v| format!("{}", v)).unwrap_or_else(dash),
        );
    }
    println!();
    println!("* default profile for its data source");
    Ok(())
}
