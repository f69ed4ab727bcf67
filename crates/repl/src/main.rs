use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use common::Config;
use common::pretty::{render_record_batch, TableStyleKind};
use database::Engine;

const DEFAULT_DATA_DIR: &str = "./db_data";

#[derive(Parser, Debug)]
#[command(name = "sql-repl", about = "Interactive console for the file-backed SQL engine")]
struct Args {
    /// Directory under which each database gets its own subdirectory
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,
    /// Read statements from this file instead of stdin, then exit
    script: Option<PathBuf>,
}

/// Strip `#`-prefixed line comments, respecting `'...'` string literals so a
/// `#` inside a quoted value is never mistaken for a comment marker.
fn strip_comments(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_string = false;
    for c in line.chars() {
        if c == '\'' {
            in_string = !in_string;
        }
        if c == '#' && !in_string {
            break;
        }
        out.push(c);
    }
    out
}

fn run_statement(engine: &mut Engine, sql: &str) {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return;
    }
    match engine.execute(trimmed) {
        Ok(batch) => println!("{}", render_record_batch(&batch, TableStyleKind::Modern)),
        Err(err) => eprintln!("error: {err}"),
    }
}

/// Feed a whole script/pasted buffer through at once: `;` may span several
/// lines, so comments are stripped line-by-line before the buffer is handed
/// to the parser's own statement splitter.
fn run_script(engine: &mut Engine, text: &str) {
    let cleaned: String = text
        .lines()
        .map(strip_comments)
        .collect::<Vec<_>>()
        .join("\n");
    for statement in split_on_semicolons(&cleaned) {
        run_statement(engine, &statement);
    }
}

/// Split on top-level `;`, skipping ones inside a `'...'` string literal —
/// the same rule `parser::parse_sql` applies internally, duplicated here so
/// each statement can be run (and its result printed) as soon as it parses,
/// rather than only after the whole buffer succeeds.
fn split_on_semicolons(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    for c in text.chars() {
        if c == '\'' {
            in_string = !in_string;
        }
        if c == ';' && !in_string {
            out.push(current.clone());
            current.clear();
            continue;
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        out.push(current);
    }
    out
}

fn run_repl(engine: &mut Engine) -> Result<()> {
    let stdin = io::stdin();
    let interactive = stdin.is_terminal();
    let mut buffer = String::new();
    loop {
        if interactive {
            let prompt = match engine.current_database() {
                Some(name) => format!("{name}> "),
                None => "> ".to_string(),
            };
            eprint!("{prompt}");
            io::stderr().flush().ok();
        }

        let mut line = String::new();
        let bytes_read = stdin.lock().read_line(&mut line)?;
        if bytes_read == 0 {
            if !buffer.trim().is_empty() {
                run_script(engine, &buffer);
            }
            break;
        }

        buffer.push_str(&line);
        if line.trim_end().ends_with(';') {
            run_script(engine, &buffer);
            buffer.clear();
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::builder().data_dir(args.data_dir).build();
    let mut engine = Engine::new(&config);

    match args.script {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read script file {}", path.display()))?;
            run_script(&mut engine, &text);
        }
        None => run_repl(&mut engine)?,
    }
    Ok(())
}
