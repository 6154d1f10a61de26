//! Output of the `resolve` and `cache` subcommands

use std::io::{self, BufRead, Write};

use crate::cache::{CacheDocument, CacheError, CacheStore};
use crate::prepare::{CityContext, Source};

const RULE: &str = "------------------------------------------------------------";

/// Prints a resolved city
pub fn print_context(ctx: &CityContext, out: &mut impl Write) -> io::Result<()> {
    let origin = match ctx.source {
        Source::Cache => "cache",
        Source::Network => "network",
    };
    writeln!(out, "{}", RULE)?;
    writeln!(out, "City:        {}", ctx.city)?;
    writeln!(out, "Resolved:    {} ({})", ctx.display_name, origin)?;
    writeln!(
        out,
        "Coordinates: {:.4}, {:.4}",
        ctx.coordinates.lat(),
        ctx.coordinates.lon()
    )?;
    writeln!(out, "Timezone:    {}", ctx.timezone_id)?;
    writeln!(out, "Local time:  {}", ctx.local_now.format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(out, "{}", RULE)
}

/// Prints every cached city
pub fn list_entries(doc: &CacheDocument, out: &mut impl Write) -> io::Result<()> {
    if doc.is_empty() {
        return writeln!(out, "No cities cached.");
    }

    writeln!(out, "Cached cities:")?;
    writeln!(out, "{}", RULE)?;
    for entry in doc.entries() {
        writeln!(out, "City: {}", entry.city)?;
        writeln!(out, "  Display name: {}", entry.display_name)?;
        writeln!(out, "  Coordinates:  {:.4}, {:.4}", entry.lat(), entry.lon())?;
        writeln!(out, "  Timezone:     {}", entry.timezone_id)?;
        if !entry.aliases.is_empty() {
            let aliases: Vec<&str> = entry.aliases.iter().map(String::as_str).collect();
            writeln!(out, "  Aliases:      {}", aliases.join(", "))?;
        }
        writeln!(out, "  Updated at:   {}", entry.updated_at)?;
        writeln!(out, "{}", RULE)?;
    }
    Ok(())
}

/// Errors from `cache clear`
#[derive(Debug, thiserror::Error)]
pub enum ClearError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("failed to read confirmation: {0}")]
    Prompt(#[from] io::Error),
}

/// Deletes the cache file, asking on `input` first unless `yes`
pub fn clear_cache(
    store: &CacheStore,
    yes: bool,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<(), ClearError> {
    if !yes {
        write!(
            out,
            "Delete cache file {}? This cannot be undone. (y/N): ",
            store.path().display()
        )?;
        out.flush()?;

        let mut line = String::new();
        input.read_line(&mut line)?;
        let answer = line.trim().to_lowercase();
        if answer != "y" && answer != "yes" {
            writeln!(out, "Cancelled.")?;
            return Ok(());
        }
    }

    if store.clear()? {
        writeln!(out, "Cache cleared.")?;
    } else {
        writeln!(out, "No cache file to clear.")?;
    }
    Ok(())
}
