mod render;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::Parser;
use log::{LevelFilter, debug};
use render::{ColorMode, RenderOptions, Renderer};
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use taskline_core::{DateRole, DateValue, Engine, EngineConfig, ParseResult};

/// taskline: pull dates, times and tags out of Markdown task lines
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Prints the config file locations, in lookup order
    #[arg(long, short, exclusive = true)]
    path: bool,
    /// Reference date for relative phrases (e.g. `--on 2025-01-04`, `--on yesterday`). Defaults to today.
    #[arg(long)]
    on: Option<String>,
    /// Reads this config file instead of the default locations.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Reads metadata but leaves the line text untouched.
    #[arg(long)]
    keep_text: bool,
    /// Prints each result as JSON.
    #[arg(long, conflicts_with = "stamp")]
    json: bool,
    /// Adds a date marker for this role, dated the reference date (e.g. `--stamp completed`).
    #[arg(long, value_parser = parse_role)]
    stamp: Option<DateRole>,
    /// Only shows the cleaned line and its fields on one row.
    #[arg(long, short)]
    short: bool,
    /// Control ANSI colors in output.
    /// By default, colors are disabled when output is redirected (e.g with `>` or `|`).
    #[arg(long, value_enum, default_value_t = ColorMode::Auto)]
    color: ColorMode,
    /// Logs discarded spans and config warnings to stderr.
    #[arg(long, short)]
    verbose: bool,
    /// One task line. Lines are read from stdin when omitted.
    text: Vec<String>,
}

fn parse_role(s: &str) -> Result<DateRole, String> {
    s.parse().map_err(|_| format!("unknown date role '{s}'"))
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("taskline: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    TermLogger::init(
        level,
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )?;

    let renderer = Renderer::new(Some(RenderOptions {
        use_color: cli.color.enabled(),
        short_mode: cli.short,
    }));

    if cli.path {
        for path in EngineConfig::config_file_paths() {
            renderer.print_info(&format!("{}", path.display()));
        }
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load_from(path)?,
        None => EngineConfig::load()?,
    };
    if cli.keep_text {
        config.remove_original_text = false;
    }
    let engine = Engine::new(config).context("compiling patterns from config")?;
    let reference_date = reference_date(&engine, cli.on.as_deref())?;
    debug!("reference date {reference_date}");

    let lines = if cli.text.is_empty() {
        io::stdin()
            .lock()
            .lines()
            .collect::<io::Result<Vec<_>>>()
            .context("reading stdin")?
    } else {
        vec![cli.text.join(" ")]
    };

    if let Some(role) = cli.stamp {
        let value = DateValue::on(reference_date);
        for line in &lines {
            renderer.print_line(&engine.insert_date_marker(line, role, value));
        }
        return Ok(());
    }

    let mut results: Vec<ParseResult> = Vec::with_capacity(lines.len());
    let mut failed = 0;
    for line in &lines {
        match engine.parse(line, reference_date) {
            Ok(result) if cli.json => results.push(result),
            Ok(result) => renderer.print_result(&result),
            Err(err) => {
                failed += 1;
                renderer.print_notice(&err);
                if !cli.json {
                    renderer.print_line(line);
                }
            }
        }
    }
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }

    if failed > 0 {
        bail!("{failed} line(s) have a time range that ends before it starts");
    }
    Ok(())
}

/// `--on` accepts an ISO date or any phrase the engine understands.
fn reference_date(engine: &Engine, on: Option<&str>) -> Result<NaiveDate> {
    let today = chrono::Local::now().date_naive();
    let Some(input) = on.map(str::trim) else {
        return Ok(today);
    };
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(date);
    }
    match engine.resolve_date_phrase(input, today) {
        Some(date) => Ok(date),
        None => bail!("could not read '{input}' as a date"),
    }
}
