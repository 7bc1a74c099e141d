use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use noterag_core::config::{Config, SearchMode};
use noterag_service::{IndexProgress, IndexReport, ProgressCallback, RagService, ServiceOptions};

#[derive(Parser)]
#[command(name = "noterag", version, about = "Hybrid search over a folder of markdown notes")]
struct Cli {
    /// Directory holding config.toml; relative paths in it resolve from here.
    #[arg(long, default_value = ".", global = true)]
    config_dir: PathBuf,

    /// Overrides `notes_dir` from the configuration.
    #[arg(long, env = "NOTERAG_NOTES_DIR", global = true)]
    notes_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bring the index up to date (incremental unless --full).
    Index {
        #[arg(long)]
        full: bool,
    },
    /// Search the notes.
    Search {
        query: String,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        #[arg(long, value_enum)]
        mode: Option<Mode>,
        #[arg(long)]
        no_rerank: bool,
        #[arg(long)]
        json: bool,
    },
    /// Re-index one note (relative to the notes directory, or absolute); drops it if the file is gone.
    IndexNote { path: PathBuf },
    /// Remove a note from the index.
    RemoveNote { path: PathBuf },
    /// Print document and note counts.
    Stats,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Hybrid,
    Semantic,
    Keyword,
}

impl From<Mode> for SearchMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Hybrid => SearchMode::Hybrid,
            Mode::Semantic => SearchMode::Semantic,
            Mode::Keyword => SearchMode::Keyword,
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn progress_bar() -> anyhow::Result<(ProgressBar, ProgressCallback)> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} notes ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );
    let bar = pb.clone();
    let callback: ProgressCallback = Arc::new(move |p: &IndexProgress| {
        bar.set_length(p.total as u64);
        bar.set_position(p.processed as u64);
        if let Some(path) = &p.note_path {
            bar.set_message(path.clone());
        }
    });
    Ok((pb, callback))
}

fn print_report(report: &IndexReport) {
    println!(
        "{} added, {} updated, {} removed, {} unchanged ({} chunks written, {} deleted)",
        report.notes_added,
        report.notes_updated,
        report.notes_removed,
        report.notes_unchanged,
        report.documents_written,
        report.documents_deleted
    );
    for err in &report.errors {
        eprintln!("  skipped {}: {}", err.note_path, err.message);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = Config::load_from(&cli.config_dir)?;
    let mut settings = config.settings().context("invalid configuration")?;
    if let Some(dir) = cli.notes_dir {
        settings.notes_dir = dir;
    }
    info!(notes_dir = %settings.notes_dir.display(), "starting");

    // `index` hands its pass to initialize so the corpus is embedded once
    let index_run = match cli.command {
        Command::Index { full } => Some((full, progress_bar()?)),
        _ => None,
    };
    let mut options = ServiceOptions::from_config(settings.clone());
    if let Some((full, (_, callback))) = &index_run {
        options = options.with_full_rebuild(*full).with_progress(callback.clone());
    }

    let service = RagService::global();
    let startup = service
        .initialize(options)
        .await
        .with_context(|| format!("failed to open index for {}", settings.notes_dir.display()))?;

    match cli.command {
        Command::Index { .. } => {
            if let Some((_, (pb, callback))) = index_run {
                let report = match startup {
                    Some(report) => report,
                    None => service.refresh(Some(callback)).await?,
                };
                pb.finish_and_clear();
                print_report(&report);
            }
        }
        Command::Search { query, top_k, mode, no_rerank, json } => {
            let mut options = settings.retrieval.clone();
            if let Some(k) = top_k {
                options.top_k = k;
            }
            if let Some(mode) = mode {
                options.mode = mode.into();
            }
            if no_rerank {
                options.graph_rerank = false;
            }
            let results = service.search(&query, Some(options)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.is_empty() {
                println!("No results for {query:?}");
            } else {
                for (rank, r) in results.iter().enumerate() {
                    println!("{}. {} ({})  score {:.3} (base {:.3})", rank + 1, r.title, r.note_path, r.final_score, r.base_score);
                    for line in &r.highlights {
                        println!("     > {line}");
                    }
                }
            }
        }
        Command::IndexNote { path } => print_report(&service.index_note(&path).await?),
        Command::RemoveNote { path } => print_report(&service.remove_note(&path).await?),
        Command::Stats => {
            let stats = service.get_stats().await?;
            println!("notes:     {}", stats.note_count);
            println!("documents: {}", stats.document_count);
            println!("model:     {}", service.get_embedding_model_id()?);
        }
    }
    Ok(())
}
