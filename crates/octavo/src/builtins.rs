//! Core builtin functions.
//!
//! Hosts extend this set through [`TreeEvaluator::register_builtin`]; the
//! defaults here are the minimum the object model and error handling need.

use crate::error::{ErrorId, ExecError, ExecResult};
use crate::eval::TreeEvaluator;
use crate::value::Value;

pub(crate) fn register_defaults(ev: &mut TreeEvaluator) {
    ev.register_builtin("error", |_, args, _| builtin_error(args));
    ev.register_builtin("disp", |ev, args, _| builtin_disp(ev, args));
    ev.register_builtin("class", |_, args, _| one_arg(args, "class", |v| Ok(Value::Str(v.type_name()))));
    ev.register_builtin("numel", |_, args, _| {
        one_arg(args, "numel", |v| Ok(Value::Int(v.numel() as i64)))
    });
    ev.register_builtin("isa", |_, args, _| builtin_isa(args));
    ev.register_builtin("isobject", |_, args, _| {
        one_arg(args, "isobject", |v| Ok(Value::Bool(matches!(v, Value::Object(_)))))
    });
    ev.register_builtin("isvalid", |_, args, _| builtin_isvalid(args));
    ev.register_builtin("delete", |ev, args, _| builtin_delete(ev, args));
    ev.register_builtin("copy", |_, args, _| builtin_copy(args));
    ev.register_builtin("metaclass", |_, args, _| builtin_metaclass(args));
}

fn one_arg(
    args: &[Value],
    name: &str,
    f: impl FnOnce(&Value) -> ExecResult<Value>,
) -> ExecResult<Vec<Value>> {
    let [value] = args else {
        return Err(ExecError::new(
            ErrorId::UsageError,
            format!("{name}: expected exactly one argument"),
        ));
    };
    Ok(vec![f(value)?])
}

/// `error(msg)` / `error(id, msg)` / `error(err)` — raise a user error.
fn builtin_error(args: &[Value]) -> ExecResult<Vec<Value>> {
    match args {
        [Value::Str(message)] => Err(ExecError::user("", message.clone())),
        [Value::Str(identifier), Value::Str(message)] => {
            Err(ExecError::user(identifier.clone(), message.clone()))
        }
        // rethrow a caught exception
        [Value::Exception(err)] => Err((**err).clone()),
        _ => Err(ExecError::new(
            ErrorId::UsageError,
            "error: expected a message, an identifier and message, or an exception",
        )),
    }
}

fn builtin_disp(ev: &mut TreeEvaluator, args: &[Value]) -> ExecResult<Vec<Value>> {
    let [value] = args else {
        return Err(ExecError::new(
            ErrorId::UsageError,
            "disp: expected exactly one argument",
        ));
    };
    let text = value.to_string();
    ev.write_output_line(&text);
    Ok(Vec::new())
}

fn builtin_isa(args: &[Value]) -> ExecResult<Vec<Value>> {
    let [value, Value::Str(name)] = args else {
        return Err(ExecError::new(
            ErrorId::UsageError,
            "isa: expected a value and a class name",
        ));
    };
    let matches = match value {
        Value::Object(obj) => obj.class().is_some_and(|class| class.is_a(name)),
        other => {
            other.type_name() == *name
                || (name == "numeric"
                    && matches!(other, Value::Num(_) | Value::Int(_) | Value::Matrix(_)))
        }
    };
    Ok(vec![Value::Bool(matches)])
}

fn builtin_isvalid(args: &[Value]) -> ExecResult<Vec<Value>> {
    let [Value::Object(obj)] = args else {
        return Err(ExecError::new(
            ErrorId::WrongType,
            "isvalid: expected a handle object",
        ));
    };
    Ok(vec![Value::Bool(obj.is_valid())])
}

/// `delete(h)` — run the cooperative destruction chain, then invalidate
/// every alias of the handle. Deleting an already-invalid handle is a no-op.
fn builtin_delete(ev: &mut TreeEvaluator, args: &[Value]) -> ExecResult<Vec<Value>> {
    let [Value::Object(obj)] = args else {
        return Err(ExecError::new(
            ErrorId::WrongType,
            "delete: expected a handle object",
        ));
    };
    if !obj.is_valid() {
        return Ok(Vec::new());
    }
    if !obj.is_handle() {
        return Err(ExecError::new(
            ErrorId::WrongType,
            "delete: expected a handle object",
        ));
    }
    if let Some(class) = obj.class() {
        class.delete_object(ev, obj)?;
    }
    obj.invalidate()?;
    Ok(Vec::new())
}

/// `copy(obj)` — a true duplication, even for handle objects.
fn builtin_copy(args: &[Value]) -> ExecResult<Vec<Value>> {
    let [Value::Object(obj)] = args else {
        return Err(ExecError::new(
            ErrorId::WrongType,
            "copy: expected an object",
        ));
    };
    Ok(vec![Value::Object(obj.copy_object())])
}

fn builtin_metaclass(args: &[Value]) -> ExecResult<Vec<Value>> {
    let [Value::Object(obj)] = args else {
        return Err(ExecError::new(
            ErrorId::WrongType,
            "metaclass: expected an object",
        ));
    };
    let class = obj.class().ok_or_else(|| {
        ExecError::new(ErrorId::WrongType, "metaclass: expected an ordinary object")
    })?;
    Ok(vec![Value::Object(class.meta_object())])
}
