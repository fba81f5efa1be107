use std::env;
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

use sqlgrid::config::{self, Config};
use sqlgrid::driver::AnyDriver;
use sqlgrid::grid::ResultGrid;
use sqlgrid::runner::{QueryRunner, RunOutcome};
use sqlgrid::sql::{resolve_to_nearest_statement, split_sql_query, SqlDocument};
use sqlgrid::util::{display_width, fit_to_width, single_line};

fn print_version() {
    println!("sqlgrid {}", env!("CARGO_PKG_VERSION"));
}

fn print_usage() {
    eprintln!("sqlgrid - Split, run and inspect SQL scripts");
    eprintln!();
    eprintln!("Usage: sqlgrid [OPTIONS] [DATABASE_URL]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  [DATABASE_URL]    postgres://..., sqlite:path, a file path or :memory:");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -f, --file <PATH> Read SQL from a file instead of stdin");
    eprintln!("      --at <OFFSET> Run only the statement nearest to this byte offset");
    eprintln!("      --csv         Print the last result as CSV");
    eprintln!("      --json        Print the last result as JSON");
    eprintln!("  -h, --help        Print this help message");
    eprintln!("  -V, --version     Print version information");
    eprintln!();
    eprintln!("Environment Variables:");
    eprintln!("  DATABASE_URL      Default connection URL if not provided as argument");
    eprintln!("  RUST_LOG          Log filter (default: warn)");
    eprintln!();
    eprintln!("Configuration:");
    if let Some(path) = config::config_path() {
        eprintln!("  Config file: {}", path.display());
    }
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  echo 'SELECT 1; SELECT 2' | sqlgrid :memory:");
    eprintln!("  sqlgrid --file schema.sql --at 120 postgres://localhost/mydb");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum OutputFormat {
    #[default]
    Table,
    Csv,
    Json,
}

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    url: Option<String>,
    file: Option<PathBuf>,
    at: Option<usize>,
    format: OutputFormat,
}

fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut cli = CliArgs::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-f" | "--file" => {
                let path = iter.next().context("--file needs a path")?;
                cli.file = Some(PathBuf::from(path));
            }
            "--at" => {
                let raw = iter.next().context("--at needs a byte offset")?;
                let offset = raw
                    .parse::<usize>()
                    .with_context(|| format!("invalid offset for --at: {}", raw))?;
                cli.at = Some(offset);
            }
            "--csv" => cli.format = OutputFormat::Csv,
            "--json" => cli.format = OutputFormat::Json,
            other if other.starts_with('-') => {
                bail!("unknown option: {}", other)
            }
            other => {
                if cli.url.is_some() {
                    bail!("unexpected argument: {}", other);
                }
                cli.url = Some(other.to_string());
            }
        }
    }

    Ok(cli)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_usage();
        return Ok(());
    }
    if args.iter().any(|a| a == "-V" || a == "--version") {
        print_version();
        return Ok(());
    }

    init_tracing();
    let cli = parse_args(&args)?;

    let cfg = config::load_config().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config: {:#}", e);
        Config::default()
    });

    let url = config::resolve_database_url(cli.url.clone(), &cfg)
        .context("no database URL; pass one as an argument or set DATABASE_URL")?;

    let sql = match &cli.file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read SQL file: {}", path.display()))?,
        None => {
            if io::stdin().is_terminal() {
                eprintln!("Reading SQL from stdin, end with Ctrl+D");
            }
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read SQL from stdin")?;
            buf
        }
    };

    let rt = Runtime::new().context("failed to initialize tokio runtime")?;
    rt.block_on(run(&url, &sql, &cli, &cfg))
}

async fn run(url: &str, sql: &str, cli: &CliArgs, cfg: &Config) -> Result<()> {
    let statements: Vec<String> = match cli.at {
        Some(offset) => {
            let doc = SqlDocument::with_cursor(sql, offset);
            resolve_to_nearest_statement(&doc, None)?
                .map(|span| vec![span.text])
                .unwrap_or_default()
        }
        None => split_sql_query(&SqlDocument::new(sql))?
            .into_iter()
            .map(|span| span.text)
            .collect(),
    };

    if statements.is_empty() {
        eprintln!("No statements to run");
        return Ok(());
    }

    let driver = AnyDriver::connect(url)
        .await
        .with_context(|| format!("failed to connect to {}", url))?;

    let outcome = QueryRunner::new(&driver)
        .run(&statements, |p| {
            let Some(entry) = p.logs.last() else {
                return;
            };
            if p.error {
                eprintln!("[{}/{}] failed", entry.order, p.total);
            } else if !entry.is_finished() {
                eprintln!(
                    "[{}/{}] {}",
                    entry.order,
                    p.total,
                    fit_to_width(&single_line(&entry.sql), 60).trim_end()
                );
            }
        })
        .await;

    print_outcome(&outcome, cli.format, cfg);

    match outcome.error {
        Some(err) => Err(err).context("batch stopped"),
        None => Ok(()),
    }
}

fn print_outcome(outcome: &RunOutcome, format: OutputFormat, cfg: &Config) {
    let Some(result) = outcome.last() else {
        if let Some(stats) = outcome.logs.last().and_then(|l| l.stats.as_ref()) {
            eprintln!("OK, {} rows affected", stats.rows_affected);
        }
        return;
    };

    let grid = ResultGrid::from_result(result, None, &cfg.grid);
    let all: Vec<usize> = (0..grid.row_count()).collect();
    match format {
        OutputFormat::Table => {
            let max_chars = (cfg.grid.max_text_width / cfg.grid.char_width.max(1)) as usize;
            print!("{}", render_table(&grid, max_chars));
        }
        OutputFormat::Csv => println!("{}", grid.rows_as_csv(&all, true)),
        OutputFormat::Json => println!("{}", grid.rows_as_json(&all)),
    }
    eprintln!("({} rows)", grid.row_count());
}

/// Aligned plain-text table, each column capped at `max_chars`.
fn render_table(grid: &ResultGrid, max_chars: usize) -> String {
    let cells: Vec<Vec<String>> = (0..grid.row_count())
        .map(|y| {
            (0..grid.column_count())
                .map(|x| match grid.get_value(y, x) {
                    Some(v) if !v.is_null() => single_line(&v.to_string()),
                    _ => "NULL".to_string(),
                })
                .collect()
        })
        .collect();

    let widths: Vec<usize> = grid
        .headers()
        .iter()
        .enumerate()
        .map(|(x, h)| {
            cells
                .iter()
                .map(|row| display_width(&row[x]))
                .chain(std::iter::once(display_width(&h.display_name)))
                .max()
                .unwrap_or(0)
                .min(max_chars.max(1))
        })
        .collect();

    let line = |values: Vec<&str>| -> String {
        let padded: Vec<String> = values
            .iter()
            .zip(&widths)
            .map(|(v, &w)| fit_to_width(v, w))
            .collect();
        format!("{}\n", padded.join(" | ").trim_end())
    };

    let mut out = line(grid.headers().iter().map(|h| h.display_name.as_str()).collect());
    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    out.push_str(&rule.join("-+-"));
    out.push('\n');
    for row in &cells {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
    }
    out
}
