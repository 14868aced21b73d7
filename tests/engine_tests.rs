//! End-to-end tests for the submission pipeline: outcome classification,
//! short-circuiting, session accumulation, and loader failure handling.

use std::cell::Cell;
use std::rc::Rc;

use skiff::compiler::unit::ENTRY_NAME;
use skiff::loader::{InProcessLoader, LoadError, UnitHandle, UnitLoader};
use skiff::value::Function;
use skiff::{Engine, FaultKind, FaultOrigin, Session, Value};

fn run(source: &str) -> skiff::ExecutionResult {
    let engine = Engine::new();
    let mut session = Session::new();
    engine.execute_submission(&mut session, source)
}

// ── Outcome classification ──────────────────────────────────────────

#[test]
fn empty_source_succeeds_with_no_value() {
    let result = run("");
    assert!(result.is_success());
    assert!(result.return_value().is_none());
    assert!(result.compile_failure().is_none());
    assert!(result.execute_failure().is_none());
}

#[test]
fn comment_only_source_succeeds() {
    let result = run("// nothing to do\n");
    assert!(result.is_success());
    assert!(result.return_value().is_none());
}

#[test]
fn literal_arithmetic_returns_its_value() {
    let result = run("1 + 1");
    assert_eq!(result.return_value(), Some(&Value::Int(2)));
}

#[test]
fn malformed_statement_is_a_compile_failure() {
    let result = run("let x = ;");
    let failure = result.compile_failure().expect("compile failure");
    assert!(failure.message().contains("expected expression"));
    assert!(result.execute_failure().is_none());
    assert!(result.return_value().is_none());
}

#[test]
fn thrown_value_is_an_execute_failure_with_message_preserved() {
    let result = run("throw \"boom\";");
    let failure = result.execute_failure().expect("execute failure");
    assert_eq!(failure.fault().message, "boom");
    assert_eq!(failure.fault().kind, FaultKind::Thrown);
    assert_eq!(failure.fault().origin, FaultOrigin::Submission);
    assert!(result.compile_failure().is_none());
}

#[test]
fn fault_trace_begins_at_the_generated_entry() {
    let result = run("throw \"boom\";");
    let fault = result.execute_failure().unwrap().fault();
    // Frames are innermost-first; top-level faults have only the entry.
    assert_eq!(fault.frames.last().unwrap().function, ENTRY_NAME);
}

#[test]
fn fault_inside_a_function_keeps_the_full_trace() {
    let engine = Engine::new();
    let mut session = Session::new();
    let result = engine.execute_submission(
        &mut session,
        "fn inner() { throw \"deep\"; }\nfn outer() { return inner(); }\nouter()",
    );
    let fault = result.execute_failure().unwrap().fault();
    let names: Vec<&str> = fault.frames.iter().map(|f| f.function.as_str()).collect();
    assert_eq!(names, vec!["inner", "outer", ENTRY_NAME]);
    assert_eq!(fault.message, "deep");
}

#[test]
fn division_by_zero_is_an_execute_failure() {
    let result = run("1 / 0");
    let fault = result.execute_failure().unwrap().fault();
    assert_eq!(fault.kind, FaultKind::Arithmetic);
    assert!(fault.message.contains("division by zero"));
}

#[test]
fn builtin_errors_are_submission_faults() {
    let result = run("len(1)");
    let fault = result.execute_failure().unwrap().fault();
    assert_eq!(fault.kind, FaultKind::Builtin);
    assert_eq!(fault.origin, FaultOrigin::Submission);
}

#[test]
fn never_both_failures_across_a_corpus() {
    let corpus = [
        "",
        "1 + 1",
        "nil",
        "let x = ;",
        "y",
        "throw \"x\";",
        "1 / 0",
        "fn f() { return 1; } f()",
        "\"a\" + 1",
        "if (true { 1; }",
        "while (false) { 1; }",
        "!true || 2 > 1",
        "let a = 1; a = a + 1; a",
        "undefined_fn()",
        "1 +",
    ];
    for source in corpus {
        let result = run(source);
        let both = result.compile_failure().is_some() && result.execute_failure().is_some();
        assert!(!both, "both failures set for {:?}", source);
        if result.is_success() {
            assert!(result.compile_failure().is_none());
            assert!(result.execute_failure().is_none());
        } else {
            assert!(result.return_value().is_none(), "value on failure for {:?}", source);
        }
    }
}

#[test]
fn identical_submissions_on_fresh_sessions_agree() {
    let sources = ["1 + 1", "\"a\" + \"b\"", "3 * 7 - 1", "2 < 3"];
    for source in sources {
        let first = run(source);
        let second = run(source);
        assert_eq!(
            first.return_value(),
            second.return_value(),
            "results diverged for {:?}",
            source
        );
    }
}

// ── Language behavior ───────────────────────────────────────────────

#[test]
fn string_concatenation() {
    assert_eq!(run("\"foo\" + \"bar\"").return_value(), Some(&Value::str("foobar")));
}

#[test]
fn mixed_numeric_arithmetic_produces_floats() {
    assert_eq!(run("1 + 0.5").return_value(), Some(&Value::Float(1.5)));
}

#[test]
fn logic_and_comparison() {
    assert_eq!(run("1 < 2 && 2 < 1").return_value(), Some(&Value::Bool(false)));
    assert_eq!(run("false || 42").return_value(), Some(&Value::Int(42)));
}

#[test]
fn while_loop_with_top_level_counter() {
    let result = run("let i = 0; while (i < 5) { i = i + 1; } i");
    assert_eq!(result.return_value(), Some(&Value::Int(5)));
}

#[test]
fn conditional_statements() {
    let result = run("let x = 10; let kind = \"\"; if (x > 5) { kind = \"big\"; } else { kind = \"small\"; } kind");
    assert_eq!(result.return_value(), Some(&Value::str("big")));
}

#[test]
fn recursive_function() {
    let result = run("fn fib(n) { if (n < 2) { return n; } return fib(n - 1) + fib(n - 2); } fib(10)");
    assert_eq!(result.return_value(), Some(&Value::Int(55)));
}

#[test]
fn runaway_recursion_faults_instead_of_crashing() {
    let result = run("fn loop_forever() { return loop_forever(); } loop_forever()");
    let fault = result.execute_failure().unwrap().fault();
    assert_eq!(fault.kind, FaultKind::StackOverflow);
}

#[test]
fn builtin_functions_are_callable() {
    assert_eq!(run("str(1 + 1)").return_value(), Some(&Value::str("2")));
    assert_eq!(run("len(\"hello\")").return_value(), Some(&Value::Int(5)));
    assert_eq!(run("abs(0 - 9)").return_value(), Some(&Value::Int(9)));
}

// ── Session accumulation ────────────────────────────────────────────

#[test]
fn declarations_accumulate_across_submissions() {
    let engine = Engine::new();
    let mut session = Session::new();

    assert!(engine.execute_submission(&mut session, "let x = 21;").is_success());
    let result = engine.execute_submission(&mut session, "x + x");
    assert_eq!(result.return_value(), Some(&Value::Int(42)));
}

#[test]
fn functions_accumulate_across_submissions() {
    let engine = Engine::new();
    let mut session = Session::new();

    engine.execute_submission(&mut session, "fn double(n) { return n * 2; }");
    let result = engine.execute_submission(&mut session, "double(8)");
    assert_eq!(result.return_value(), Some(&Value::Int(16)));
}

#[test]
fn later_submissions_can_rebind_names() {
    let engine = Engine::new();
    let mut session = Session::new();

    engine.execute_submission(&mut session, "let x = 1;");
    engine.execute_submission(&mut session, "let x = 2;");
    let result = engine.execute_submission(&mut session, "x");
    assert_eq!(result.return_value(), Some(&Value::Int(2)));
}

#[test]
fn compile_failure_leaves_session_usable() {
    let engine = Engine::new();
    let mut session = Session::new();

    engine.execute_submission(&mut session, "let x = 3;");
    assert!(engine
        .execute_submission(&mut session, "let y = ;")
        .compile_failure()
        .is_some());
    let result = engine.execute_submission(&mut session, "x * 2");
    assert_eq!(result.return_value(), Some(&Value::Int(6)));
}

#[test]
fn declared_but_never_stored_global_faults_at_runtime() {
    let engine = Engine::new();
    let mut session = Session::new();

    // The declaration registers; the store never happens.
    let first = engine.execute_submission(&mut session, "let x = 1 / 0;");
    assert!(first.execute_failure().is_some());

    let second = engine.execute_submission(&mut session, "x");
    let fault = second.execute_failure().unwrap().fault();
    assert_eq!(fault.kind, FaultKind::Undefined);
    assert!(fault.message.contains("undefined variable 'x'"));
}

#[test]
fn host_object_is_visible_to_scripts() {
    let engine = Engine::new();
    let mut session = Session::new().with_host("host", Value::str("abc"));
    let result = engine.execute_submission(&mut session, "len(host)");
    assert_eq!(result.return_value(), Some(&Value::Int(3)));
}

// ── Loader interaction ──────────────────────────────────────────────

/// Counts loads while delegating to the in-process loader.
struct CountingLoader {
    loads: Rc<Cell<usize>>,
}

impl UnitLoader for CountingLoader {
    fn load_unit(&self, primary: &[u8], debug: &[u8]) -> Result<UnitHandle, LoadError> {
        self.loads.set(self.loads.get() + 1);
        InProcessLoader.load_unit(primary, debug)
    }
}

#[test]
fn compile_failure_never_reaches_the_loader() {
    let loads = Rc::new(Cell::new(0));
    let engine = Engine::with_loader(CountingLoader {
        loads: loads.clone(),
    });
    let mut session = Session::new();

    engine.execute_submission(&mut session, "let x = ;");
    assert_eq!(loads.get(), 0);

    engine.execute_submission(&mut session, "1 + 1");
    assert_eq!(loads.get(), 1);
}

/// Always fails to load.
struct FailingLoader;

impl UnitLoader for FailingLoader {
    fn load_unit(&self, _primary: &[u8], _debug: &[u8]) -> Result<UnitHandle, LoadError> {
        Err(LoadError::ForwardFunctionReference {
            function: "broken".to_string(),
            index: 0,
        })
    }
}

#[test]
fn load_failure_is_an_execute_failure_defect() {
    let engine = Engine::with_loader(FailingLoader);
    let mut session = Session::new();

    let result = engine.execute_submission(&mut session, "1 + 1");
    let fault = result.execute_failure().unwrap().fault();
    assert_eq!(fault.kind, FaultKind::Defect);
    assert!(fault.message.contains("failed to load unit"));
}

/// Produces a handle with no entry function at all.
struct EmptyUnitLoader;

impl UnitLoader for EmptyUnitLoader {
    fn load_unit(&self, _primary: &[u8], _debug: &[u8]) -> Result<UnitHandle, LoadError> {
        Ok(UnitHandle::from_functions("hollow", false, Vec::new()))
    }
}

#[test]
fn missing_entry_is_an_execute_failure_defect() {
    let engine = Engine::with_loader(EmptyUnitLoader);
    let mut session = Session::new();

    let result = engine.execute_submission(&mut session, "1 + 1");
    let fault = result.execute_failure().unwrap().fault();
    assert_eq!(fault.kind, FaultKind::Defect);
    assert!(fault.message.contains("missing"));
}

/// Produces an entry whose arity disagrees with the invocation contract,
/// making the invocation itself fault inside engine machinery.
struct SkewedEntryLoader;

impl UnitLoader for SkewedEntryLoader {
    fn load_unit(&self, _primary: &[u8], _debug: &[u8]) -> Result<UnitHandle, LoadError> {
        let entry = Rc::new(Function {
            name: Rc::from(ENTRY_NAME),
            arity: 1,
            num_locals: 1,
            chunk: Default::default(),
        });
        Ok(UnitHandle::from_functions("skewed", true, vec![entry]))
    }
}

#[test]
fn engine_origin_invoke_fault_is_swallowed_as_valueless_success() {
    let engine = Engine::with_loader(SkewedEntryLoader);
    let mut session = Session::new();

    let result = engine.execute_submission(&mut session, "1 + 1");
    // Not the script author's concern: reported as success with no value.
    assert!(result.is_success());
    assert!(result.return_value().is_none());
    assert!(result.execute_failure().is_none());
}
