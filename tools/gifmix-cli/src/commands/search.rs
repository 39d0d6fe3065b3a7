//! Search the overlay catalog.

use gifmix_common::config::AppConfig;
use gifmix_render_engine::catalog::{CatalogKind, GiphyCatalog};

pub async fn run(
    query: String,
    page: u32,
    stickers: bool,
    json: bool,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let catalog = GiphyCatalog::from_config(&config.catalog)?;
    let kind = if stickers {
        CatalogKind::Stickers
    } else {
        CatalogKind::Gifs
    };

    let entries = catalog.search(&query, kind, page).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No results for '{query}' (page {page})");
        return Ok(());
    }

    println!("Results for '{query}' (page {page}):");
    for entry in &entries {
        let title = if entry.title.is_empty() {
            "(untitled)"
        } else {
            entry.title.as_str()
        };
        println!("  {:<16} {}", entry.id, title);
        println!("  {:<16} {}", "", entry.url);
    }

    Ok(())
}
