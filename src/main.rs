use tracing_subscriber::EnvFilter;

use skiff::repl::{report, Repl};
use skiff::{Engine, Session};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => run_repl(),
        [path] => run_file(path),
        _ => {
            eprintln!("usage: skiff [script]");
            std::process::exit(2);
        }
    }
}

/// Run a script file as a single submission.
fn run_file(path: &str) {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("failed to read {}: {}", path, err);
            std::process::exit(1);
        }
    };

    let engine = Engine::new();
    let mut session = Session::with_name(path);
    if !report(engine.execute_submission(&mut session, &source)) {
        std::process::exit(1);
    }
}

fn run_repl() {
    match Repl::new() {
        Ok(mut repl) => repl.run(),
        Err(err) => {
            eprintln!("failed to start repl: {}", err);
            std::process::exit(1);
        }
    }
}
