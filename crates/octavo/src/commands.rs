//! Front-end commands: thin entry points over the event manager.
//!
//! `openvar`, `commandhistory`, `commandwindow`, `filebrowser` and
//! `workspace` exist so interpreted code can steer an attached front-end.
//! With no front-end connected they are silent no-ops; argument validation
//! is the only hard behavior they own.

use crate::error::{ErrorId, ExecError, ExecResult};
use crate::eval::TreeEvaluator;
use crate::event::FocusTarget;
use crate::value::Value;

pub(crate) fn register_defaults(ev: &mut TreeEvaluator) {
    ev.register_builtin("openvar", |ev, args, _| openvar(ev, args));
    ev.register_builtin("commandwindow", |ev, args, _| {
        focus(ev, args, "commandwindow", FocusTarget::CommandWindow)
    });
    ev.register_builtin("commandhistory", |ev, args, _| {
        focus(ev, args, "commandhistory", FocusTarget::CommandHistory)
    });
    ev.register_builtin("filebrowser", |ev, args, _| {
        focus(ev, args, "filebrowser", FocusTarget::FileBrowser)
    });
    ev.register_builtin("workspace", |ev, args, _| {
        focus(ev, args, "workspace", FocusTarget::Workspace)
    });
}

/// `openvar name` — ask the front-end to open a variable editor.
fn openvar(ev: &mut TreeEvaluator, args: &[Value]) -> ExecResult<Vec<Value>> {
    let [Value::Str(name)] = args else {
        return Err(ExecError::new(
            ErrorId::UsageError,
            "openvar: expected a variable name",
        ));
    };
    let value = ev.lookup_variable(name).ok_or_else(|| {
        ExecError::new(
            ErrorId::UndefinedVariable,
            format!("openvar: '{name}' undefined"),
        )
    })?;
    let display = value.to_string();
    ev.events()
        .with_link((), |link| link.edit_variable(name, &display));
    Ok(Vec::new())
}

fn focus(
    ev: &mut TreeEvaluator,
    args: &[Value],
    name: &str,
    target: FocusTarget,
) -> ExecResult<Vec<Value>> {
    if !args.is_empty() {
        return Err(ExecError::new(
            ErrorId::UsageError,
            format!("{name}: expected no arguments"),
        ));
    }
    ev.events().with_link((), |link| link.focus_window(target));
    Ok(Vec::new())
}
