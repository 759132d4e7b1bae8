//! `search` and `series` commands.

use std::collections::BTreeMap;

use jellydl::api::Item;

use super::{CliError, Context, print_json};

/// Searches the catalog and prints the matches.
pub async fn search(
    ctx: &Context,
    term: &str,
    movies: bool,
    series: bool,
    limit: i64,
) -> Result<(), CliError> {
    let client = ctx.api_client()?;
    let types: &[&str] = match (movies, series) {
        (true, false) => &["Movie"],
        (false, true) => &["Series"],
        _ => &["Movie", "Series"],
    };

    let items = client.search_items(term, types, limit).await?;
    if ctx.json {
        print_json(&items)?;
        return Ok(());
    }

    if items.is_empty() {
        println!("No matches for {term:?}");
        return Ok(());
    }
    println!("{:<34} {:<8} {:<6} NAME", "ID", "TYPE", "YEAR");
    for item in &items {
        let year = item
            .production_year
            .map_or_else(|| "-".to_string(), |y| y.to_string());
        println!("{:<34} {:<8} {:<6} {}", item.id, item.item_type, year, item.name);
    }
    Ok(())
}

/// Lists a series' episodes grouped by season.
pub async fn series_episodes(ctx: &Context, series_id: &str) -> Result<(), CliError> {
    let client = ctx.api_client()?;
    let episodes = client.series_episodes(series_id).await?;

    if ctx.json {
        print_json(&episodes)?;
        return Ok(());
    }
    if episodes.is_empty() {
        println!("No episodes found for series {series_id}");
        return Ok(());
    }

    let mut by_season: BTreeMap<i64, Vec<&Item>> = BTreeMap::new();
    for episode in &episodes {
        by_season
            .entry(episode.parent_index_number.unwrap_or(0))
            .or_default()
            .push(episode);
    }

    for (season, mut episodes) in by_season {
        episodes.sort_by_key(|e| e.index_number.unwrap_or(i64::MAX));
        println!("Season {season}");
        for episode in episodes {
            println!(
                "  E{:02}  {:<34} {}",
                episode.index_number.unwrap_or(0),
                episode.id,
                episode.name
            );
        }
    }
    Ok(())
}
