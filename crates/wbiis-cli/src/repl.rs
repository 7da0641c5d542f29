//! Interactive REPL for wavelet image search.
//!
//! Launch with `wbiis repl` to enter interactive mode.
//! Type `/help` for available commands, Tab for completion.

use std::path::{Path, PathBuf};

use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};

use wbiis::{is_supported_format, CancelToken, QueryMode, WbiisConfig};

use crate::session::SearchSession;
use crate::types::{LoadMode, QueryReport};

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/load", "Load a database: /load <dir> <size> [seed]"),
    ("/lazyload", "Stream a database: /lazyload <dir> <size> [seed]"),
    ("/query", "Fast query: /query <image> [k]"),
    ("/slow", "Std-gated query: /slow <image> [k] [percent]"),
    ("/save", "Copy the last results: /save <dir>"),
    ("/originals", "Set the originals directory: /originals <dir>"),
    ("/stats", "Show database statistics"),
    ("/config", "Show the active configuration"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Quit the REPL"),
];

/// What a command's first argument completes to.
#[derive(Clone, Copy, PartialEq)]
enum PathKind {
    Directory,
    Image,
}

fn argument_kind(cmd: &str) -> Option<PathKind> {
    match cmd {
        "/load" | "/lazyload" | "/save" | "/originals" => Some(PathKind::Directory),
        "/query" | "/slow" => Some(PathKind::Image),
        _ => None,
    }
}

/// Entries under the directory part of `partial` that extend it.
fn complete_path(partial: &str, kind: PathKind) -> Vec<String> {
    let (dir, prefix) = match partial.rfind('/') {
        Some(i) => (&partial[..=i], &partial[i + 1..]),
        None => ("", partial),
    };
    let read_from = if dir.is_empty() { Path::new(".") } else { Path::new(dir) };

    let mut entries = Vec::new();
    if let Ok(listing) = std::fs::read_dir(read_from) {
        for entry in listing.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            if !name.starts_with(prefix) || (name.starts_with('.') && !prefix.starts_with('.')) {
                continue;
            }
            if path.is_dir() {
                entries.push(format!("{dir}{name}/"));
            } else if kind == PathKind::Image && is_supported_format(&path) {
                entries.push(format!("{dir}{name}"));
            }
        }
    }
    entries.sort();
    entries
}

/// REPL helper for tab completion.
#[derive(Default)]
struct SearchHelper;

impl Completer for SearchHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];

        if !input.contains(' ') {
            let matches: Vec<Pair> = COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(input))
                .map(|(cmd, desc)| Pair {
                    display: format!("{cmd:<12} {desc}"),
                    replacement: format!("{cmd} "),
                })
                .collect();
            return Ok((0, matches));
        }

        let (cmd, args) = input.split_once(' ').unwrap_or((input, ""));
        // Only the first argument is a path.
        if let Some(kind) = argument_kind(cmd).filter(|_| !args.contains(' ')) {
            let start = input.len() - args.len();
            let matches = complete_path(args, kind)
                .into_iter()
                .map(|p| Pair {
                    display: p.clone(),
                    replacement: p,
                })
                .collect();
            return Ok((start, matches));
        }

        Ok((pos, Vec::new()))
    }
}

impl Hinter for SearchHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || line.is_empty() {
            return None;
        }
        if line.starts_with('/') && !line.contains(' ') {
            for (cmd, _) in COMMANDS {
                if cmd.starts_with(line) && *cmd != line {
                    return Some(cmd[line.len()..].to_string());
                }
            }
        }
        None
    }
}

impl Highlighter for SearchHelper {}
impl Validator for SearchHelper {}
impl Helper for SearchHelper {}

struct TabCompleteOrAcceptHint;

impl ConditionalEventHandler for TabCompleteOrAcceptHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        if ctx.has_hint() {
            Some(Cmd::CompleteHint)
        } else {
            Some(Cmd::Complete)
        }
    }
}

/// Run the interactive REPL.
pub fn run(config: WbiisConfig) -> anyhow::Result<()> {
    let mut session = SearchSession::new(config)?;

    eprintln!();
    eprintln!(
        "  \x1b[32m\u{25c9}\x1b[0m \x1b[1mwbiis v{}\x1b[0m \x1b[90mwavelet image search\x1b[0m",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!();
    eprintln!(
        "    Press \x1b[36m/\x1b[0m to browse commands, \x1b[90mTab\x1b[0m to complete, \x1b[90m/exit\x1b[0m to quit."
    );
    eprintln!();

    let rl_config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(40)
        .build();

    let mut rl: Editor<SearchHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(rl_config)?;
    rl.set_helper(Some(SearchHelper));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    let hist_path = PathBuf::from(&home).join(".wbiis_history");
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let prompt = " \x1b[36mwbiis>\x1b[0m ";

    loop {
        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let input = line.strip_prefix('/').unwrap_or(line);
                if input.is_empty() {
                    cmd_help();
                    continue;
                }

                let (cmd, args) = input.split_once(' ').unwrap_or((input, ""));
                let args: Vec<&str> = args.split_whitespace().collect();

                match cmd {
                    "exit" | "quit" => {
                        eprintln!("  Goodbye!");
                        break;
                    }
                    "help" | "h" | "?" => cmd_help(),
                    "clear" | "cls" => eprint!("\x1b[2J\x1b[H"),
                    "load" => cmd_load(&args, LoadMode::Eager, &mut session),
                    "lazyload" => cmd_load(&args, LoadMode::Lazy, &mut session),
                    "query" => cmd_query(&args, QueryMode::Fast, &mut session),
                    "slow" => cmd_query(&args, QueryMode::Slow, &mut session),
                    "save" => cmd_save(&args, &session),
                    "originals" => cmd_originals(&args, &mut session),
                    "stats" => cmd_stats(&session),
                    "config" => cmd_config(&session),
                    _ => {
                        eprintln!("  Unknown command '/{cmd}'. Type /help for commands.");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    let _ = rl.save_history(&hist_path);

    Ok(())
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<12} {desc}");
    }
    eprintln!();
    eprintln!("  Tip: Tab completes directories and image files.");
    eprintln!();
}

fn cmd_load(args: &[&str], mode: LoadMode, session: &mut SearchSession) {
    let (dir, size) = match args {
        [dir, size, ..] => match size.parse::<usize>() {
            Ok(size) => (*dir, size),
            Err(_) => {
                eprintln!("  Invalid size '{size}'");
                return;
            }
        },
        _ => {
            let cmd = if mode == LoadMode::Lazy { "lazyload" } else { "load" };
            eprintln!("  Usage: /{cmd} <dir> <size> [seed]");
            return;
        }
    };
    let seed = match args.get(2).map(|s| s.parse::<u64>()) {
        Some(Ok(seed)) => Some(seed),
        Some(Err(_)) => {
            eprintln!("  Invalid seed '{}'", args[2]);
            return;
        }
        None => None,
    };

    match session.load_database(Path::new(dir), size, mode, seed) {
        Ok(summary) => eprintln!(
            "  Loaded {} of {} images from {} ({} coefficients each, {} ms)",
            summary.images, summary.available, summary.directory, summary.coefficients,
            summary.elapsed_ms
        ),
        Err(e) => eprintln!("  Failed to load: {e}"),
    }
}

fn cmd_query(args: &[&str], mode: QueryMode, session: &mut SearchSession) {
    let Some(image) = args.first() else {
        match mode {
            QueryMode::Fast => eprintln!("  Usage: /query <image> [k]"),
            QueryMode::Slow => eprintln!("  Usage: /slow <image> [k] [percent]"),
        }
        return;
    };

    let mut options = session.default_options(mode);
    if let Some(k) = args.get(1) {
        match k.parse() {
            Ok(k) => options.top_k = k,
            Err(_) => {
                eprintln!("  Invalid k '{k}'");
                return;
            }
        }
    }
    if let Some(p) = args.get(2).filter(|_| mode == QueryMode::Slow) {
        match p.parse() {
            Ok(p) => options.std_tolerance = p,
            Err(_) => {
                eprintln!("  Invalid percent '{p}'");
                return;
            }
        }
    }

    match session.query(Path::new(image), &options, &CancelToken::new()) {
        Ok(report) => print_report(&report),
        Err(e) => eprintln!("  Query failed: {e}"),
    }
}

fn print_report(report: &QueryReport) {
    eprintln!();
    eprintln!(
        "  {} query, {} results in {} ms",
        report.mode,
        report.results.len(),
        report.elapsed_ms
    );
    eprintln!();
    for result in &report.results {
        eprintln!(
            "    {:>3}. {:<40} {:>12.4}",
            result.rank, result.id, result.distance
        );
    }
    eprintln!();
}

fn cmd_save(args: &[&str], session: &SearchSession) {
    let Some(dest) = args.first() else {
        eprintln!("  Usage: /save <dir>");
        return;
    };
    match session.save_results(Path::new(dest)) {
        Ok(count) => eprintln!("  Saved {count} images to {dest}"),
        Err(e) => eprintln!("  Failed to save: {e}"),
    }
}

fn cmd_originals(args: &[&str], session: &mut SearchSession) {
    let dir = args.first().map(PathBuf::from);
    match session.set_originals_dir(dir) {
        Ok(()) => match args.first() {
            Some(dir) => eprintln!("  Originals directory: {dir}"),
            None => eprintln!("  Originals directory cleared"),
        },
        Err(e) => eprintln!("  {e}"),
    }
}

fn cmd_stats(session: &SearchSession) {
    let stats = session.stats();
    eprintln!();
    eprintln!(
        "  Database:     {}",
        stats.directory.as_deref().unwrap_or("(none)")
    );
    eprintln!(
        "  Originals:    {}",
        stats.originals.as_deref().unwrap_or("(none)")
    );
    eprintln!("  Images:       {}", stats.images);
    eprintln!("  Coefficients: {}", stats.coefficients);
    eprintln!("  Indexed:      {}", stats.indexed);
    eprintln!("  Last results: {}", stats.last_results);
    eprintln!();
}

fn cmd_config(session: &SearchSession) {
    match serde_json::to_string_pretty(session.config()) {
        Ok(json) => {
            eprintln!();
            for line in json.lines() {
                eprintln!("  {line}");
            }
            eprintln!();
        }
        Err(e) => eprintln!("  {e}"),
    }
}
