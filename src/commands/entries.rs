//! Captured request inspection
//!
//! Reads the request log database directly, so it works whether or not the
//! server is running.

use anyhow::{Context, Result};
use colored::{ColoredString, Colorize};
use reqtrail::capture::{RequestLogEntry, RequestLogSummary};
use reqtrail::config;
use reqtrail::server::open_database;
use reqtrail::storage::{run_migrations, RequestLogStore, TracedPool};
use reqtrail::tracer::SlowQueryLogger;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

async fn open_store(config_path: &Path) -> Result<RequestLogStore> {
    let cfg = config::load_config(config_path)?;
    let pool = open_database(&cfg).await?;
    run_migrations(&pool).await?;

    let logger = SlowQueryLogger::new(Duration::from_millis(cfg.storage.slow_query_threshold_ms));
    Ok(RequestLogStore::new(TracedPool::new(pool, Arc::new(logger))))
}

/// Execute the entries list command
pub async fn list(config_path: &Path, page: u32, limit: u32, format: &str) -> Result<()> {
    if page == 0 || !(1..=100).contains(&limit) {
        anyhow::bail!("page must be >= 1 and limit between 1 and 100");
    }

    let store = open_store(config_path).await?;
    let result = store.list(page, limit).await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => {
            if result.entries.is_empty() {
                println!("{}", "No captured requests found".yellow());
                return Ok(());
            }

            println!(
                "{}",
                format!(
                    "Page {} ({} of {} entries)",
                    page,
                    result.entries.len(),
                    result.total
                )
                .bold()
            );
            println!();
            for summary in &result.entries {
                println!("{}", summary_line(summary));
            }
        }
    }

    Ok(())
}

/// Execute the entries show command
pub async fn show(config_path: &Path, id: &str, format: &str) -> Result<()> {
    let id = Uuid::parse_str(id).with_context(|| format!("Invalid entry id: {}", id))?;

    let store = open_store(config_path).await?;
    let Some(entry) = store.get_by_id(id).await? else {
        println!("{}", format!("Entry {} not found", id).yellow());
        return Ok(());
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&entry)?),
        _ => display_entry(&entry),
    }

    Ok(())
}

/// Execute the entries clear command
pub async fn clear(config_path: &Path) -> Result<()> {
    let store = open_store(config_path).await?;
    let deleted = store.clear_all().await?;

    println!("{}", format!("✓ Deleted {} captured requests", deleted).green());
    Ok(())
}

fn summary_line(summary: &RequestLogSummary) -> String {
    format!(
        "{} {} {:<7} {} {} {}",
        summary
            .created_at
            .format("%Y-%m-%d %H:%M:%S%.3f")
            .to_string()
            .dimmed(),
        summary.id.to_string().dimmed(),
        summary.method.cyan(),
        colorize_status(summary.status_code),
        summary.url,
        format_duration(summary.duration_us).dimmed(),
    )
}

fn display_entry(entry: &RequestLogEntry) {
    println!(
        "{} {} {}",
        entry.method.cyan().bold(),
        entry.url.bold(),
        colorize_status(entry.status_code)
    );
    println!("  id:         {}", entry.id);
    println!("  time:       {}", entry.created_at.to_rfc3339());
    println!("  duration:   {}", format_duration(entry.duration_us));
    println!("  client:     {} {}", entry.ip, entry.user_agent.dimmed());

    println!();
    println!("{}", "Request headers:".bold());
    for (name, value) in &entry.headers {
        println!("  {}: {}", name.dimmed(), value);
    }
    if let Some(body) = &entry.body {
        println!("{}", "Request body:".bold());
        println!("  {}", body);
    }

    println!();
    println!("{}", "Response headers:".bold());
    for (name, value) in &entry.response_headers {
        println!("  {}: {}", name.dimmed(), value);
    }
    if let Some(body) = &entry.response_body {
        println!("{}", "Response body:".bold());
        println!("  {}", body);
    }

    println!();
    match &entry.sql_queries {
        Some(trace) => {
            println!("{}", format!("SQL queries ({}):", trace.len()).bold());
            for (i, query) in trace.queries.iter().enumerate() {
                let rows = format!("rows={}", query.rows_affected);
                println!(
                    "  {}. {} {} {}",
                    i + 1,
                    format_duration(query.elapsed_us).dimmed(),
                    rows.dimmed(),
                    query.statement
                );
                if let Some(error) = &query.error {
                    println!("     {}", error.red());
                }
            }
        }
        None => println!("{}", "No SQL queries".dimmed()),
    }
}

fn colorize_status(status: u16) -> ColoredString {
    let text = status.to_string();
    match status {
        200..=299 => text.green(),
        300..=399 => text.cyan(),
        400..=499 => text.yellow(),
        _ => text.red().bold(),
    }
}

fn format_duration(micros: u64) -> String {
    if micros >= 1_000_000 {
        format!("{:.2}s", micros as f64 / 1_000_000.0)
    } else if micros >= 1_000 {
        format!("{:.2}ms", micros as f64 / 1_000.0)
    } else {
        format!("{}µs", micros)
    }
}
