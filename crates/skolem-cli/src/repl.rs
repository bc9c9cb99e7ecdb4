//! Interactive shell and script runner over one [`Engine`] session.
//!
//! By default we use `rustyline` for line editing and history.
//! A minimal stdin-based fallback exists behind `--no-default-features`.

use anyhow::{anyhow, Result};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use skolem_dsl::ParseError;
use skolem_engine::{Engine, EngineError, TermSet};
use std::fs;
use std::io::{self, Read};
#[cfg(not(feature = "repl-rustyline"))]
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub struct RunOptions {
    pub script: Option<PathBuf>,
    pub commands: Vec<String>,
    pub continue_on_error: bool,
    pub format: OutputFormat,
    pub quiet: bool,
}

#[derive(Default)]
pub struct ReplState {
    engine: Engine,
}

/// What one command produced.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Values(Vec<String>),
    Defined { name: String, values: Vec<String> },
    Declared(Vec<String>),
    Check(bool),
    Facts(usize),
    Help,
    SyntaxError,
    Exit,
}

pub fn cmd_repl() -> Result<()> {
    #[cfg(feature = "repl-rustyline")]
    {
        cmd_repl_rustyline()
    }
    #[cfg(not(feature = "repl-rustyline"))]
    {
        cmd_repl_simple()
    }
}

pub fn cmd_run(opts: &RunOptions) -> Result<()> {
    let mut state = ReplState::default();

    let mut lines: Vec<String> = Vec::new();
    if let Some(script_path) = &opts.script {
        let text = if script_path.as_os_str() == "-" {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        } else {
            fs::read_to_string(script_path)
                .map_err(|e| anyhow!("failed to read {}: {e}", script_path.display()))?
        };
        lines.extend(text.lines().map(str::to_string));
    }
    lines.extend(opts.commands.iter().cloned());

    for (idx, raw_line) in lines.iter().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }

        if !opts.quiet && opts.format == OutputFormat::Text {
            println!("skolem> {line}");
        }

        match dispatch(&mut state, line) {
            Ok(Outcome::Exit) => break,
            Ok(outcome) => emit(opts.format, line, &outcome)?,
            Err(e) => {
                if opts.format == OutputFormat::Json {
                    println!("{}", serde_json::to_string(&Record::error(line, &e))?);
                }
                if opts.continue_on_error {
                    eprintln!("{} {e}", "error:".red().bold());
                } else {
                    return Err(anyhow!("script failed at line {}: {e}", idx + 1));
                }
            }
        }
    }

    Ok(())
}

#[cfg(not(feature = "repl-rustyline"))]
fn cmd_repl_simple() -> Result<()> {
    let mut state = ReplState::default();

    println!("{}", "Skolem REPL".green().bold());
    println!("Type `:help` for commands. Type `:q` to quit.\n");

    let stdin = io::stdin();
    loop {
        print!("{}", "skolem> ".cyan().bold());
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match dispatch(&mut state, line) {
            Ok(Outcome::Exit) => break,
            Ok(outcome) => emit(OutputFormat::Text, line, &outcome)?,
            Err(e) => eprintln!("{} {e}", "error:".red().bold()),
        }
    }

    Ok(())
}

#[cfg(feature = "repl-rustyline")]
fn cmd_repl_rustyline() -> Result<()> {
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;

    let mut state = ReplState::default();

    println!("{}", "Skolem REPL".green().bold());
    println!("Type `:help` for commands. Type `:q` to quit.\n");

    let mut rl = DefaultEditor::new().map_err(|e| anyhow!("failed to init rustyline: {e}"))?;

    loop {
        let line = match rl.readline("skolem> ") {
            Ok(l) => l,
            Err(ReadlineError::Eof) => break,
            Err(ReadlineError::Interrupted) => continue,
            Err(e) => return Err(anyhow!("readline error: {e}")),
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        rl.add_history_entry(line)
            .map_err(|e| anyhow!("failed to record history: {e}"))?;

        match dispatch(&mut state, line) {
            Ok(Outcome::Exit) => break,
            Ok(outcome) => emit(OutputFormat::Text, line, &outcome)?,
            Err(e) => eprintln!("{} {e}", "error:".red().bold()),
        }
    }

    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

/// Runs one REPL line. Malformed expressions are an ordinary
/// [`Outcome::SyntaxError`]; `Err` is reserved for misuse of a command.
pub fn dispatch(state: &mut ReplState, line: &str) -> Result<Outcome> {
    let line = line.trim();
    let Some(command) = line.strip_prefix(':') else {
        return Ok(match state.engine.evaluate(line) {
            Ok(values) => Outcome::Values(render(&values)),
            Err(e) => syntax_error(e)?,
        });
    };

    let (name, rest) = split_word(command);
    match name {
        "q" | "quit" => Ok(Outcome::Exit),
        "help" => Ok(Outcome::Help),
        "facts" => Ok(Outcome::Facts(state.engine.world().fact_count())),
        "def" => {
            let (def_name, expr) = split_word(rest);
            if def_name.is_empty() || expr.is_empty() {
                return Err(anyhow!("usage: :def <name> <expr>"));
            }
            Ok(match state.engine.define(def_name, expr) {
                Ok(values) => Outcome::Defined {
                    name: def_name.to_string(),
                    values: render(&values),
                },
                Err(e) => syntax_error(e)?,
            })
        }
        "decl" => Ok(match state.engine.declare(rest) {
            Ok(facts) => Outcome::Declared(render(&facts)),
            Err(e) => syntax_error(e)?,
        }),
        "check" => Ok(match state.engine.check(rest) {
            Ok(holds) => Outcome::Check(holds),
            Err(e) => syntax_error(e)?,
        }),
        other => Err(anyhow!("unknown command `:{other}` (try :help)")),
    }
}

fn syntax_error(err: EngineError) -> Result<Outcome> {
    match err {
        EngineError::Parse(e) => {
            log_parse_error(&e);
            Ok(Outcome::SyntaxError)
        }
        other => Err(other.into()),
    }
}

fn log_parse_error(err: &ParseError) {
    debug!(error = %err, "rejected input");
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim()),
        None => (s, ""),
    }
}

fn render(values: &TermSet) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

// ============================================================================
// Output
// ============================================================================

/// Plain text lines for `outcome`, as the REPL prints them.
pub fn render_text(outcome: &Outcome) -> Vec<String> {
    match outcome {
        Outcome::Values(values) if values.is_empty() => vec!["# No result".to_string()],
        Outcome::Values(values) => values.clone(),
        Outcome::Check(true) => vec!["# Holds".to_string()],
        Outcome::Check(false) => vec!["# Does not hold".to_string()],
        Outcome::Facts(n) => vec![format!("# {n} facts")],
        Outcome::SyntaxError => vec!["Syntax error".to_string()],
        Outcome::Help => HELP.lines().map(str::to_string).collect(),
        Outcome::Defined { .. } | Outcome::Declared(_) | Outcome::Exit => Vec::new(),
    }
}

fn emit(format: OutputFormat, input: &str, outcome: &Outcome) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(&Record::new(input, outcome))?);
        }
        OutputFormat::Text => {
            for line in render_text(outcome) {
                match outcome {
                    Outcome::Check(true) => println!("{}", line.green()),
                    Outcome::Check(false) => println!("{}", line.yellow()),
                    Outcome::SyntaxError => println!("{}", line.red()),
                    Outcome::Values(v) if v.is_empty() => println!("{}", line.dimmed()),
                    _ => println!("{line}"),
                }
            }
        }
    }
    Ok(())
}

/// One JSON line per command.
#[derive(Debug, Serialize)]
struct Record<'a> {
    input: &'a str,
    kind: &'static str,
    results: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    holds: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    facts: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a> Record<'a> {
    fn new(input: &'a str, outcome: &Outcome) -> Self {
        let mut record = Record {
            input,
            kind: "eval",
            results: Vec::new(),
            name: None,
            holds: None,
            facts: None,
            error: None,
        };
        match outcome {
            Outcome::Values(values) => record.results = values.clone(),
            Outcome::Defined { name, values } => {
                record.kind = "def";
                record.name = Some(name.clone());
                record.results = values.clone();
            }
            Outcome::Declared(facts) => {
                record.kind = "decl";
                record.results = facts.clone();
            }
            Outcome::Check(holds) => {
                record.kind = "check";
                record.holds = Some(*holds);
            }
            Outcome::Facts(n) => {
                record.kind = "facts";
                record.facts = Some(*n);
            }
            Outcome::Help => {
                record.kind = "help";
                record.results = render_text(outcome);
            }
            Outcome::SyntaxError => {
                record.kind = "error";
                record.error = Some("Syntax error".to_string());
            }
            Outcome::Exit => record.kind = "quit",
        }
        record
    }

    fn error(input: &'a str, err: &anyhow::Error) -> Self {
        Record {
            input,
            kind: "error",
            results: Vec::new(),
            name: None,
            holds: None,
            facts: None,
            error: Some(err.to_string()),
        }
    }
}

const HELP: &str = "\
Commands:
  <expr>              evaluate and print every result
  :def <name> <expr>  bind <name> to the results of <expr>
  :decl <expr>        assert every result of <expr> as a fact
  :check <expr>       does any result of <expr> match a fact?
  :facts              number of asserted facts
  :help               this text
  :q, :quit           leave
Syntax:
  f x y               application (left-associative)
  <x> body            lambda
  [constraint] body   body once per solution of constraint
  {facts} body        body with extra local facts
  *  ?                wildcard, fresh arbitrary constant";

#[cfg(test)]
mod tests {
    use super::*;

    fn run(state: &mut ReplState, line: &str) -> Vec<String> {
        render_text(&dispatch(state, line).expect("dispatch"))
    }

    #[test]
    fn check_reports_holds() {
        let mut state = ReplState::default();
        assert!(run(&mut state, ":decl a").is_empty());
        assert_eq!(run(&mut state, ":check a"), vec!["# Holds"]);
        assert_eq!(run(&mut state, ":check b"), vec!["# Does not hold"]);
    }

    #[test]
    fn definitions_apply() {
        let mut state = ReplState::default();
        assert!(run(&mut state, ":def id <x> x").is_empty());
        assert_eq!(run(&mut state, "(id a)"), vec!["a"]);
    }

    #[test]
    fn queries_and_declare_scope() {
        let mut state = ReplState::default();
        assert_eq!(run(&mut state, "{(P a)} [P x] x"), vec!["a"]);
        assert_eq!(run(&mut state, "[P x] x"), vec!["# No result"]);
        run(&mut state, ":decl (P a)");
        assert_eq!(run(&mut state, "[P x] x"), vec!["a"]);
        assert_eq!(run(&mut state, ":facts"), vec!["# 1 facts"]);
    }

    #[test]
    fn malformed_input_is_a_syntax_error() {
        let mut state = ReplState::default();
        assert_eq!(run(&mut state, "(a b"), vec!["Syntax error"]);
        assert_eq!(run(&mut state, ":check [a"), vec!["Syntax error"]);
        assert_eq!(run(&mut state, ":def x (a"), vec!["Syntax error"]);
    }

    #[test]
    fn command_misuse_is_an_error() {
        let mut state = ReplState::default();
        assert!(dispatch(&mut state, ":def x").is_err());
        assert!(dispatch(&mut state, ":frobnicate").is_err());
        assert!(dispatch(&mut state, ":def (a) b").is_err());
        assert_eq!(dispatch(&mut state, ":q").expect("quit"), Outcome::Exit);
    }

    #[test]
    fn json_records() {
        let record = Record::new("[P x] x", &Outcome::Values(vec!["a".into()]));
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["kind"], "eval");
        assert_eq!(json["results"][0], "a");
        assert!(json.get("holds").is_none());

        let record = Record::new(":check a", &Outcome::Check(false));
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["kind"], "check");
        assert_eq!(json["holds"], false);
    }

    #[test]
    fn split_word_trims() {
        assert_eq!(split_word("def  id <x> x"), ("def", "id <x> x"));
        assert_eq!(split_word("q"), ("q", ""));
    }
}
