use anyhow::Result;
use branch_locator::config::DEFAULT_CONFIG_PATH;
use branch_locator::{init_logging, AppConfig, DisplaySurface, MapView, Pipeline, TextSurface};
use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "branch-locator", version, about = "Supporters' branch & pub locator")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, env = "BRANCH_LOCATOR_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the grouped listing (default)
    List {
        /// Only show one state, e.g. TX
        #[arg(short, long)]
        state: Option<String>,

        /// Emit the map view as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Print every state with its location count
    States,
    /// Report rows dropped while loading and reconciling
    Check {
        /// Exit non-zero when any row was dropped
        #[arg(long)]
        strict: bool,
    },
    /// Interactive terminal browser
    Tui {
        #[arg(short, long)]
        state: Option<String>,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)?;
    let mut pipeline = Pipeline::from_config(&config)?;

    match cli.command.unwrap_or(Command::List { state: None, json: false }) {
        Command::List { state, json } => run_list(&mut pipeline, state.as_deref(), json),
        Command::States => run_states(&mut pipeline),
        Command::Check { strict } => run_check(&mut pipeline, strict),
        Command::Tui { state } => run_ui_mode(&mut pipeline, state.as_deref()),
    }
}

fn run_list(pipeline: &mut Pipeline, state: Option<&str>, json: bool) -> Result<()> {
    let report = pipeline.run()?;
    let view = MapView::build(&report.locations, state);

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    let mut surface = TextSurface::new(io::stdout().lock());
    surface.render(&view)?;
    Ok(())
}

fn run_states(pipeline: &mut Pipeline) -> Result<()> {
    let report = pipeline.run()?;
    let view = MapView::build(&report.locations, None);

    println!("📍 {} states", view.groups.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for group in &view.groups {
        println!("  {:<8} {:>4}", group.label(), group.entries.len());
    }

    Ok(())
}

fn run_check(pipeline: &mut Pipeline, strict: bool) -> Result<()> {
    println!("🔍 Checking sources...");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let report = pipeline.run()?;
    let stats = &report.stats;
    println!("✓ {} branch rows, {} coordinate rows", stats.branch_rows, stats.coordinate_rows);
    println!("✓ {} locations ({} superseded submissions)", report.locations.len(), stats.superseded_rows);
    if stats.unmatched_branch_keys > 0 || stats.unmatched_coordinate_keys > 0 {
        println!(
            "⚠️  {} branches without coordinates, {} coordinates without a branch",
            stats.unmatched_branch_keys, stats.unmatched_coordinate_keys
        );
    }

    let quality = report.quality();
    if quality.is_clean() {
        println!("\n✅ {}", quality.summary());
        return Ok(());
    }

    println!("\n⚠️  {}", quality.summary());
    for issue in &report.issues {
        println!("   {}", issue);
    }

    if strict {
        std::process::exit(2);
    }
    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(pipeline: &mut Pipeline, state: Option<&str>) -> Result<()> {
    println!("🖥️  Loading branch locator...\n");

    let report = pipeline.run()?;
    println!("✓ Loaded {} locations", report.locations.len());
    println!("Starting UI... (Press 'q' to quit)\n");

    let mut app = branch_locator::ui::App::new(report.locations, state);
    branch_locator::ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_pipeline: &mut Pipeline, _state: Option<&str>) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the map page: cargo run --bin branch-server --features server");
    std::process::exit(1);
}
