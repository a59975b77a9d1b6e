use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use ibge_tables::parser::lines::LineParser;
use ibge_tables::parser::numbers::{normalize, Numeric};
use ibge_tables::passes::PassDriver;
use ibge_tables::settings::Settings;
use ibge_tables::validate::Verdict;
use ibge_tables::{output, source};

#[derive(Parser)]
#[command(name = "ibge_tables", about = "Extract the IBGE POF nutrition tables into one dataset")]
struct Cli {
    /// Table/pass configuration (replaces the built-in one)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured pass and write the merged records as JSON
    Run {
        /// Page source: directory of page files, form-feed text dump, or SQLite page cache
        /// (default: $IBGE_PAGES_DB)
        #[arg(short, long)]
        pages: Option<PathBuf>,
        /// Output file (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Hide progress bars
        #[arg(short, long)]
        quiet: bool,
    },
    /// Show how one page parses under one table's column mapping
    ParsePage {
        #[arg(short, long)]
        pages: Option<PathBuf>,
        /// 1-based page number
        #[arg(long)]
        page: u32,
        /// Table id, e.g. "minerals"
        #[arg(short, long)]
        table: String,
    },
    /// Validate the configuration and print the pass plan
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("invalid configuration")?;

    let result = match cli.command {
        Commands::Run { pages, out, quiet } => {
            let path = source::resolve_path(pages.as_deref())
                .context("no page source: pass --pages or set IBGE_PAGES_DB")?;
            let src = source::open_source(&path)?;
            let description = src.describe();

            let driver = PassDriver::new(settings, src).with_progress(!quiet);
            let abort = driver.abort_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, stopping after the current page");
                    abort.store(true, Ordering::Relaxed);
                }
            });

            let extraction = tokio::task::spawn_blocking(move || driver.run()).await?;
            eprintln!("{}", extraction.report().render_markdown());

            let doc = output::document(&extraction, &description);
            output::write_json(&doc, out.as_deref())?;
            if let Some(p) = &out {
                info!(path = ?p, records = doc.total_records, "wrote dataset");
            }
            Ok(())
        }
        Commands::ParsePage { pages, page, table } => {
            let table = settings
                .table(&table)
                .with_context(|| format!("unknown table `{table}`"))?;
            let path = source::resolve_path(pages.as_deref())
                .context("no page source: pass --pages or set IBGE_PAGES_DB")?;
            let mut src = source::open_source(&path)?;
            let Some(text) = src.page_text(page)? else {
                println!("Page {} is not available in {}", page, src.describe());
                return Ok(());
            };

            let out = LineParser::new(settings.min_line_len).parse_page(&text);
            println!(
                "Page {}: {} rows, {} unmatched, {} short lines\n",
                page,
                out.rows.len(),
                out.unmatched,
                out.short
            );
            for row in &out.rows {
                println!(
                    "{} / {:>2}  {} ({})",
                    row.code, row.preparation_code, row.name, row.preparation
                );
                for (column, token) in table.columns.iter().zip(&row.tokens) {
                    let Some(field) = column else {
                        println!("    {:<20} {:>10}  (unmapped)", "_", token);
                        continue;
                    };
                    let verdict = match normalize(token) {
                        Numeric::Absent(cause) => format!("absent: {:?}", cause),
                        Numeric::Value(v) => match settings.plausibility.check(*field, v) {
                            Verdict::Accept(v) => format!("{}", v),
                            Verdict::CodeLike => "rejected: code-like".to_string(),
                            Verdict::Implausible => "rejected: out of range".to_string(),
                        },
                    };
                    println!("    {:<20} {:>10}  {}", field, token, verdict);
                }
                if row.tokens.len() < table.columns.len() {
                    println!("    ({} columns missing)", table.columns.len() - row.tokens.len());
                }
            }
            Ok(())
        }
        Commands::CheckConfig => {
            println!("Tables:");
            for t in settings.tables.values() {
                let names: Vec<String> = t
                    .columns
                    .iter()
                    .map(|c| c.map(|f| f.to_string()).unwrap_or_else(|| "_".into()))
                    .collect();
                println!("  {:<16} {}", t.id, names.join(", "));
            }
            println!("\nPasses:");
            for (i, p) in settings.passes.iter().enumerate() {
                println!(
                    "  {}. {:<16} {:<16} pages {}-{} ({})",
                    i + 1,
                    p.name,
                    p.table,
                    p.first_page,
                    p.last_page,
                    p.page_count()
                );
            }
            println!(
                "\n{} fields owned, default group \"{}\", {} pages per parse chunk",
                settings.owned_fields().len(),
                settings.classifier.default_group(),
                settings.chunk_pages
            );
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
