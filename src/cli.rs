//! CLI definition and dispatch.

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvCandleAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_graph_adapter::JsonGraphStore;
use crate::domain::compiler::{Compilation, CompileOptions, compile_with_report};
use crate::domain::config_validation::{DataSettings, Settings, load_settings};
use crate::domain::document::GraphDocument;
use crate::domain::engine_result::{EngineResult, StreamMessage, StreamState};
use crate::domain::error::StratflowError;
use crate::domain::market_data::{
    DuplicatePolicy, SkipReason, SkippedSymbol, load_market_data, parse_symbols,
};
use crate::domain::payload::{BacktestRequest, build_request};
use crate::domain::rule::extract_indicators;
use crate::domain::rule_parser;
use crate::domain::validator::{Readiness, validate};
use crate::ports::candle_port::CandlePort;
use crate::ports::graph_port::GraphStore;

#[derive(Parser, Debug)]
#[command(name = "stratflow", about = "Strategy graph to rule text compiler")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile a strategy graph into rule text
    Compile {
        #[arg(short, long)]
        graph: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Report the readiness of every execution node
    Validate {
        #[arg(short, long)]
        graph: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Check that a rule text file parses
    Lint {
        #[arg(short, long)]
        logic: PathBuf,
    },
    /// Build the backtest request body for the engine
    Request {
        #[arg(short, long)]
        graph: PathBuf,
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbols: Option<String>,
        /// Extra <SYMBOL>.csv file to add after the configured symbols
        #[arg(long = "extra-csv")]
        extra_csv: Vec<PathBuf>,
        /// What to do when an extra file's symbol is already loaded
        #[arg(long, value_enum, default_value_t = OnDuplicate::Reject)]
        on_duplicate: OnDuplicate,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Summarize an engine result or a recorded result stream
    InspectResult {
        #[arg(short, long)]
        result: PathBuf,
        #[arg(long)]
        stream: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnDuplicate {
    Reject,
    Replace,
    Rename,
}

impl From<OnDuplicate> for DuplicatePolicy {
    fn from(value: OnDuplicate) -> Self {
        match value {
            OnDuplicate::Reject => DuplicatePolicy::Reject,
            OnDuplicate::Replace => DuplicatePolicy::Replace,
            OnDuplicate::Rename => DuplicatePolicy::Rename,
        }
    }
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Compile {
            graph,
            config,
            output,
        } => run_compile(&graph, config.as_deref(), output.as_deref()),
        Command::Validate { graph, config } => run_validate(&graph, config.as_deref()),
        Command::Lint { logic } => run_lint(&logic),
        Command::Request {
            graph,
            config,
            symbols,
            extra_csv,
            on_duplicate,
            output,
        } => {
            let extra = ExtraSeries {
                files: extra_csv,
                on_duplicate: on_duplicate.into(),
            };
            run_request(&graph, &config, symbols.as_deref(), &extra, output.as_deref())
        }
        Command::InspectResult { result, stream } => run_inspect_result(&result, stream),
    }
}

fn fail(err: StratflowError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(fail)
}

/// Settings from an optional config file; defaults when none is given.
pub fn load_optional_settings(path: Option<&Path>) -> Result<Settings, ExitCode> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    eprintln!("Loading config from {}", path.display());
    let adapter = load_config(path)?;
    load_settings(&adapter).map_err(fail)
}

pub fn load_graph(path: &Path) -> Result<GraphDocument, StratflowError> {
    let (store, name) = JsonGraphStore::for_file(path);
    store.load(&name)
}

/// Compiles a stored document. Dangling edges fail the whole compilation.
pub fn compile_document(
    document: &GraphDocument,
    options: &CompileOptions,
) -> Result<Compilation, StratflowError> {
    let snapshot = document.to_snapshot()?;
    compile_with_report(&snapshot, options)
}

fn write_output(text: &str, output: Option<&Path>) -> Result<(), StratflowError> {
    match output {
        Some(path) => {
            fs::write(path, text)?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

fn run_compile(graph_path: &Path, config_path: Option<&Path>, output: Option<&Path>) -> ExitCode {
    let settings = match load_optional_settings(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };

    eprintln!("Loading graph from {}", graph_path.display());
    let document = match load_graph(graph_path) {
        Ok(d) => d,
        Err(e) => return fail(e),
    };

    let compilation = match compile_document(&document, &settings.compile) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    for (id, reason) in compilation.report.incomplete() {
        eprintln!("  skipped {}: {}", id, reason);
    }

    if compilation.strategy.is_empty() {
        return fail(StratflowError::NothingCompiled {
            reason: "no execution node is ready".to_string(),
        });
    }

    let mut indicators: Vec<String> = compilation
        .strategy
        .rules
        .iter()
        .flat_map(|r| extract_indicators(&r.rule.condition))
        .map(|op| op.to_string())
        .collect();
    indicators.sort();
    indicators.dedup();
    eprintln!(
        "Compiled {} rule(s) using {}",
        compilation.strategy.len(),
        if indicators.is_empty() {
            "no indicators".to_string()
        } else {
            indicators.join(", ")
        }
    );

    match write_output(&compilation.strategy.logic_text(), output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(e),
    }
}

fn run_validate(graph_path: &Path, config_path: Option<&Path>) -> ExitCode {
    let settings = match load_optional_settings(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };

    eprintln!("Validating graph: {}", graph_path.display());
    let document = match load_graph(graph_path) {
        Ok(d) => d,
        Err(e) => return fail(e),
    };
    let snapshot = match document.to_snapshot() {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    let report = validate(&snapshot, &settings.compile);

    if report.entries.is_empty() {
        println!("no execution nodes");
    }
    for status in &report.entries {
        match status.readiness {
            Readiness::Ready => println!("{}: ready", status.execution),
            Readiness::Incomplete(reason) => {
                println!("{}: incomplete ({})", status.execution, reason)
            }
        }
    }
    for edge in &report.dangling_edges {
        println!("{}: dangling edge", edge);
    }

    if !report.dangling_edges.is_empty() {
        return fail(StratflowError::MalformedGraph {
            reason: format!("{} dangling edge(s)", report.dangling_edges.len()),
        });
    }
    if !report.is_runnable() {
        return fail(StratflowError::NothingCompiled {
            reason: "no execution node is ready".to_string(),
        });
    }

    eprintln!(
        "\n{} of {} execution node(s) ready.",
        report.ready_count(),
        report.entries.len()
    );
    ExitCode::SUCCESS
}

fn run_lint(logic_path: &Path) -> ExitCode {
    eprintln!("Linting rule text: {}", logic_path.display());
    let text = match fs::read_to_string(logic_path) {
        Ok(t) => t,
        Err(e) => return fail(e.into()),
    };

    match rule_parser::parse(&text) {
        Ok(lines) => {
            for line in &lines {
                println!("{}", line);
            }
            eprintln!("\n{} rule line(s) parsed.", lines.len());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e.display_with_context(&text));
            (&StratflowError::from(e)).into()
        }
    }
}

/// Symbols to load: the command-line list, else the config list, else every
/// symbol the port knows about.
pub fn resolve_symbols(
    symbols_override: Option<&str>,
    data: &DataSettings,
    port: &dyn CandlePort,
) -> Result<Vec<String>, StratflowError> {
    if let Some(list) = symbols_override {
        return parse_symbols(list).map_err(|e| StratflowError::Data {
            reason: format!("--symbols: {}", e),
        });
    }
    if let Some(symbols) = &data.symbols {
        return Ok(symbols.clone());
    }
    port.list_symbols()
}

/// CSV files loaded on top of the port's symbols.
#[derive(Debug, Clone, Default)]
pub struct ExtraSeries {
    pub files: Vec<PathBuf>,
    pub on_duplicate: DuplicatePolicy,
}

/// Compiles the document and pairs it with candles from `port`, then adds
/// each extra file under its uppercased file stem.
pub fn assemble_request(
    document: &GraphDocument,
    settings: &Settings,
    port: &dyn CandlePort,
    symbols: &[String],
    extra: &ExtraSeries,
) -> Result<(BacktestRequest, Vec<SkippedSymbol>), StratflowError> {
    let compilation = compile_document(document, &settings.compile)?;
    for (id, reason) in compilation.report.incomplete() {
        eprintln!("  skipped {}: {}", id, reason);
    }

    let mut loaded = load_market_data(port, symbols, &settings.data.range)?;
    for file in &extra.files {
        let (adapter, stem) = CsvCandleAdapter::for_file(file)?;
        let symbol = stem.to_uppercase();
        let candles = adapter.fetch_candles(&stem, &settings.data.range)?;
        if candles.is_empty() {
            loaded.skipped.push(SkippedSymbol {
                symbol,
                reason: SkipReason::NoData,
            });
            continue;
        }
        let name = loaded
            .data
            .insert_with(&symbol, candles, extra.on_duplicate)?;
        eprintln!("  added {} from {}", name, file.display());
    }

    let graph = settings.include_graph.then_some(document);
    let request = build_request(&compilation.strategy, loaded.data, &settings.costs, graph)?;
    Ok((request, loaded.skipped))
}

fn run_request(
    graph_path: &Path,
    config_path: &Path,
    symbols_override: Option<&str>,
    extra: &ExtraSeries,
    output: Option<&Path>,
) -> ExitCode {
    let settings = match load_optional_settings(Some(config_path)) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let data_dir = match settings.data.require_dir() {
        Ok(d) => d.to_path_buf(),
        Err(e) => return fail(e),
    };

    eprintln!("Loading graph from {}", graph_path.display());
    let document = match load_graph(graph_path) {
        Ok(d) => d,
        Err(e) => return fail(e),
    };

    let port = CsvCandleAdapter::new(data_dir);
    let symbols = match resolve_symbols(symbols_override, &settings.data, &port) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    eprintln!("Loading candles for {} symbol(s)...", symbols.len());

    let (request, skipped) = match assemble_request(&document, &settings, &port, &symbols, extra) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    if !skipped.is_empty() {
        eprintln!("Skipped {} symbol(s):", skipped.len());
        for s in &skipped {
            match &s.reason {
                SkipReason::NoData => eprintln!("  {}: no data in range", s.symbol),
                SkipReason::Unreadable(reason) => eprintln!("  {}: {}", s.symbol, reason),
            }
        }
    }
    eprintln!(
        "Request ready: {} symbol(s), {} candle(s)",
        request.data.len(),
        request.data.total_candles()
    );

    let body = match request.to_json_pretty() {
        Ok(b) => b,
        Err(e) => return fail(e),
    };
    match write_output(&body, output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(e),
    }
}

/// Reads a result document, or folds a newline-delimited message stream into
/// its final result.
pub fn read_result(text: &str, stream: bool) -> Result<EngineResult, StratflowError> {
    if !stream {
        return EngineResult::from_json(text);
    }

    let mut state = StreamState::default();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let message: StreamMessage = serde_json::from_str(line)?;
        if state.apply(message)? {
            break;
        }
    }
    if let Some(progress) = state.progress {
        eprintln!("Last progress: {}", progress);
    }
    state.result.ok_or_else(|| StratflowError::Data {
        reason: "stream ended without a completed result".to_string(),
    })
}

fn run_inspect_result(result_path: &Path, stream: bool) -> ExitCode {
    let text = match fs::read_to_string(result_path) {
        Ok(t) => t,
        Err(e) => return fail(e.into()),
    };
    let result = match read_result(&text, stream) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    let shape = match &result {
        EngineResult::Portfolio { .. } => "portfolio",
        EngineResult::Flat(_) => "flat",
    };
    println!("shape: {}", shape);
    println!("trades: {}", result.trades().len());
    println!("equity_curve: {}", result.equity_curve().len());
    println!("drawdown_curve: {}", result.drawdown_curve().len());
    for (symbol, run) in result.per_symbol() {
        println!("  {}: {} trade(s)", symbol, run.trades.len());
    }
    ExitCode::SUCCESS
}
