//! Line-oriented front-end: read cells, run them, print results.

mod input;

pub use input::continue_line;

use std::sync::Arc;

use goblet_runtime::{register_printer, CellPrinter, ExecContext};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::error::{format_error, print_errors};
use crate::runner::Runner;

/// Printer that forwards cell output to the terminal.
struct StdoutPrinter;

impl CellPrinter for StdoutPrinter {
    fn println(&self, text: &str) {
        println!("{}", text);
    }
}

enum ReplCommand {
    Help,
    Clear,
    Quit,
}

fn parse_repl_command(input: &str) -> Option<ReplCommand> {
    match input.trim() {
        ":help" => Some(ReplCommand::Help),
        ":clear" => Some(ReplCommand::Clear),
        ":quit" | ":exit" => Some(ReplCommand::Quit),
        _ => None,
    }
}

pub fn run(runner: &mut Runner) {
    register_printer(Arc::new(StdoutPrinter));

    let mut rl = DefaultEditor::new().expect("failed to initialize line editor");
    let mut lines: Vec<String> = Vec::new();
    let mut indent = 0usize;

    loop {
        let prompt = if lines.is_empty() {
            ">>> ".to_string()
        } else {
            format!("... {}", "    ".repeat(indent))
        };
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                lines.clear();
                indent = 0;
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(_) => break,
        };
        lines.push(line);

        let (more, next_indent) = continue_line(&lines);
        if more {
            indent = next_indent;
            continue;
        }

        let cell = lines.join("\n").trim().to_string();
        lines.clear();
        indent = 0;
        if cell.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(&cell);

        if let Some(cmd) = parse_repl_command(&cell) {
            match cmd {
                ReplCommand::Help => {
                    eprintln!(":help   show this message");
                    eprintln!(":clear  zero-clear all session variables");
                    eprintln!(":quit   leave the session");
                }
                ReplCommand::Clear => {
                    goblet_runtime::zero_clear_all_vars();
                    eprintln!("; cleared");
                }
                ReplCommand::Quit => break,
            }
            continue;
        }

        let ctx = ExecContext::background();
        if let Err(err) = runner.run(&ctx, &cell) {
            match &err {
                crate::error::GobletError::Parse { .. }
                | crate::error::GobletError::Type { .. } => {
                    eprintln!("{}", format_error(&cell, &err));
                }
                _ => {
                    let errs = vec![err];
                    print_errors(&mut std::io::stderr(), &errs);
                }
            }
        }
    }
}
