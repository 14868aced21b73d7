//! Interactive session driver.
//!
//! Each line read is one submission executed against a single long-lived
//! session, so declarations accumulate across lines. Line history persists
//! to disk between runs.

use std::path::PathBuf;

use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result as RustylineResult};

use crate::engine::{Engine, ExecutionResult};
use crate::session::Session;

const HISTORY_FILE: &str = ".skiff_history";

/// REPL driver: line editor plus the session the lines run against.
pub struct Repl {
    editor: DefaultEditor,
    engine: Engine,
    session: Session,
}

impl Repl {
    pub fn new() -> RustylineResult<Self> {
        let mut editor = DefaultEditor::new()?;
        let _ = editor.load_history(&Self::history_file_path());

        Ok(Self {
            editor,
            engine: Engine::new(),
            session: Session::with_name("repl"),
        })
    }

    fn history_file_path() -> PathBuf {
        match home_dir() {
            Some(home) => home.join(HISTORY_FILE),
            None => PathBuf::from(HISTORY_FILE),
        }
    }

    /// Read and execute submissions until end of input or `exit`.
    pub fn run(&mut self) {
        println!("skiff v{}", env!("CARGO_PKG_VERSION"));
        println!("Type exit to quit");
        println!();

        loop {
            let line = match self.editor.readline("> ") {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("read error: {}", err);
                    break;
                }
            };

            let input = line.trim();
            if input.is_empty() {
                continue;
            }
            if input == "exit" {
                break;
            }

            let _ = self.editor.add_history_entry(input);
            let result = self.engine.execute_submission(&mut self.session, input);
            report(result);
        }

        let _ = self.editor.save_history(&Self::history_file_path());
        println!("Goodbye!");
    }
}

/// Print one submission's outcome; returns whether it succeeded.
pub fn report(result: ExecutionResult) -> bool {
    match result {
        ExecutionResult::Success { value } => {
            if let Some(value) = value {
                println!("{:?}", value);
            }
            true
        }
        ExecutionResult::CompileFailure(failure) => {
            let diagnostics = failure.diagnostics();
            if diagnostics.is_empty() {
                eprintln!("error: {}", failure);
            }
            for diagnostic in diagnostics {
                eprintln!("error: {}", diagnostic);
            }
            false
        }
        ExecutionResult::ExecuteFailure(failure) => {
            eprintln!("fault: {}", failure.fault().render_trace());
            false
        }
    }
}

/// Home directory path (cross-platform)
fn home_dir() -> Option<PathBuf> {
    #[cfg(unix)]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
    #[cfg(windows)]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(not(any(unix, windows)))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_history_file_path() {
        let path = Repl::history_file_path();
        assert!(path.to_string_lossy().contains("skiff_history"));
    }

    #[test]
    fn test_report_success_and_failures() {
        assert!(report(ExecutionResult::Success {
            value: Some(Value::Int(1))
        }));
        assert!(report(ExecutionResult::Success { value: None }));

        let engine = Engine::new();
        let mut session = Session::new();
        assert!(!report(engine.execute_submission(&mut session, "let x = ;")));
        assert!(!report(engine.execute_submission(&mut session, "throw \"x\";")));
    }
}
