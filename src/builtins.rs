//! Builtin native functions installed into every session.
//!
//! Builtin errors surface as submission-origin faults: the script chose to
//! make the call.

use crate::session::Session;
use crate::value::Value;

/// Install the builtin functions into a session's globals.
pub fn register_builtins(session: &mut Session) {
    session.define("print", Value::Native(native_print));
    session.define("str", Value::Native(native_str));
    session.define("len", Value::Native(native_len));
    session.define("abs", Value::Native(native_abs));
}

fn native_print(args: &[Value]) -> Result<Value, String> {
    let line = args
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    println!("{}", line);
    Ok(Value::Nil)
}

fn native_str(args: &[Value]) -> Result<Value, String> {
    match args {
        [value] => Ok(Value::str(value.to_string())),
        _ => Err(format!("str expects 1 argument, got {}", args.len())),
    }
}

fn native_len(args: &[Value]) -> Result<Value, String> {
    match args {
        [Value::Str(s)] => Ok(Value::Int(s.chars().count() as i64)),
        [other] => Err(format!("len expects a string, got {}", other.type_name())),
        _ => Err(format!("len expects 1 argument, got {}", args.len())),
    }
}

fn native_abs(args: &[Value]) -> Result<Value, String> {
    match args {
        [Value::Int(n)] => n
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| "integer overflow".to_string()),
        [Value::Float(f)] => Ok(Value::Float(f.abs())),
        [other] => Err(format!("abs expects a number, got {}", other.type_name())),
        _ => Err(format!("abs expects 1 argument, got {}", args.len())),
    }
}
