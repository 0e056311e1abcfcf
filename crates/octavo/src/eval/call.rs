//! Call machinery: user functions, scripts, function handles, class methods
//! and constructors.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::ast::{FunctionDef, Stmt};
use crate::cdef::{CdefClass, CdefMethod, CdefObject, ResolvedIndex};
use crate::error::{ErrorId, ExecError, ExecResult};
use crate::eval::TreeEvaluator;
use crate::stack::FrameContext;
use crate::value::{FnHandleValue, Value};

/// The class whose code is currently executing; carries the constructor
/// output variable when that code is a constructor body.
pub struct ClassContext {
    pub(crate) class: CdefClass,
    pub(crate) ctor_output: Option<String>,
}

impl TreeEvaluator {
    /// Calls a named callable: user function, builtin, or class constructor,
    /// in that resolution order.
    pub(crate) fn call_function(
        &mut self,
        name: &str,
        args: Vec<Value>,
        nargout: usize,
    ) -> ExecResult<Vec<Value>> {
        if let Some(function) = self.function(name) {
            return self.execute_user_function(&function, args, nargout, None);
        }
        if let Some(builtin) = self.builtin(name) {
            return builtin(self, &args, nargout);
        }
        if let Some(class) = self.classes().find_class(name) {
            let (values, _) = class.meta_subsref(self, &[ResolvedIndex::Paren(args)], nargout)?;
            return Ok(values);
        }
        Err(ExecError::new(
            ErrorId::UndefinedFunction,
            format!("'{name}' undefined"),
        ))
    }

    /// Calls a function-handle value.
    pub(crate) fn call_fn_handle(
        &mut self,
        handle: &FnHandleValue,
        args: Vec<Value>,
        nargout: usize,
    ) -> ExecResult<Vec<Value>> {
        match handle {
            FnHandleValue::Named(name) => self.call_function(name, args, nargout),
            FnHandleValue::Anon(closure) => {
                if args.len() > closure.params.len() {
                    return Err(ExecError::new(
                        ErrorId::UsageError,
                        "anonymous function called with too many inputs",
                    ));
                }
                self.check_recursion("@<anonymous>")?;
                self.stack.push("@<anonymous>", FrameContext::Function);
                for (name, value) in &closure.captures {
                    self.stack.set_var(name, value.clone());
                }
                for (param, value) in closure.params.iter().zip(args) {
                    self.stack.set_var(param, value.clone_for_assign());
                }
                let result = self.eval_expr(&closure.body);
                let result = result.map_err(|mut err| {
                    err.push_frame("@<anonymous>", self.stack.current().loc);
                    err
                });
                self.stack.pop();
                Ok(vec![result?])
            }
        }
    }

    /// Runs a user function in a fresh frame: positional parameter binding
    /// with `varargin` overflow, the body, then output collection with
    /// `varargout` expansion. The frame pops on every path; loop/return
    /// signals never cross a function boundary.
    pub(crate) fn execute_user_function(
        &mut self,
        function: &Rc<FunctionDef>,
        args: Vec<Value>,
        nargout: usize,
        class_ctx: Option<ClassContext>,
    ) -> ExecResult<Vec<Value>> {
        self.check_recursion(&function.name)?;
        self.stack.push(function.name.clone(), FrameContext::Function);
        let ctx_pushed = class_ctx.is_some();
        if let Some(ctx) = class_ctx {
            self.class_contexts.push(ctx);
        }

        let result = self.bind_and_run(function, args, nargout);

        self.clear_signals();
        if ctx_pushed {
            self.class_contexts.pop();
        }
        let result = result.map_err(|mut err| {
            err.push_frame(&function.name, self.stack.current().loc);
            err
        });
        self.stack.pop();
        result
    }

    fn bind_and_run(
        &mut self,
        function: &FunctionDef,
        args: Vec<Value>,
        nargout: usize,
    ) -> ExecResult<Vec<Value>> {
        self.bind_params(function, args, nargout)?;
        self.exec_statements(&function.body)?;
        self.collect_outputs(function, nargout)
    }

    /// Runs a script in its own named frame.
    pub fn eval_script(&mut self, name: &str, stmts: &[Stmt]) -> ExecResult<()> {
        self.stack.push(name, FrameContext::Script);
        let result = self.exec_statements(stmts);
        self.clear_signals();
        let result = result.map_err(|mut err| {
            err.push_frame(name, self.stack.current().loc);
            err
        });
        self.stack.pop();
        result
    }

    /// Runs a class constructor: the object under construction is pre-bound
    /// to the declared output variable (the "implicit first argument"), and
    /// whatever object that variable holds afterwards is the result.
    pub(crate) fn execute_constructor(
        &mut self,
        class: &CdefClass,
        ctor: &CdefMethod,
        obj: CdefObject,
        args: &[Value],
    ) -> ExecResult<CdefObject> {
        let function = Rc::clone(&ctor.function);
        let output = function.outputs.first().cloned().ok_or_else(|| {
            ExecError::new(
                ErrorId::BadConstructor,
                format!("constructor of class '{}' declares no output", class.name()),
            )
        })?;
        self.check_recursion(&function.name)?;
        self.stack.push(function.name.clone(), FrameContext::Function);
        self.class_contexts.push(ClassContext {
            class: class.clone(),
            ctor_output: Some(output.clone()),
        });

        let result = self.run_constructor_body(&function, &output, obj, args);

        self.clear_signals();
        self.class_contexts.pop();
        let result = result.map_err(|mut err| {
            err.push_frame(&function.name, self.stack.current().loc);
            err
        });
        self.stack.pop();
        result
    }

    fn run_constructor_body(
        &mut self,
        function: &FunctionDef,
        output: &str,
        obj: CdefObject,
        args: &[Value],
    ) -> ExecResult<CdefObject> {
        self.stack.set_var(output, Value::Object(obj));
        self.bind_params(function, args.to_vec(), 1)?;
        self.exec_statements(&function.body)?;
        match self.stack.get_var(output) {
            Some(Value::Object(result)) => Ok(result.clone()),
            _ => Err(ExecError::new(
                ErrorId::BadConstructor,
                format!("constructor '{}' did not produce an object", function.name),
            )),
        }
    }

    /// Calls a class method with an explicit argument list (static members,
    /// superclass method calls, operator overloads).
    pub(crate) fn call_cdef_method(
        &mut self,
        method: &CdefMethod,
        args: Vec<Value>,
        nargout: usize,
    ) -> ExecResult<Vec<Value>> {
        if method.is_abstract {
            return Err(ExecError::new(
                ErrorId::BadOperation,
                format!("cannot call abstract method '{}'", method.name),
            ));
        }
        let ctx = self
            .classes()
            .find_class(&method.owner)
            .map(|class| ClassContext {
                class,
                ctor_output: None,
            });
        self.execute_user_function(&method.function, args, nargout, ctx)
    }

    /// Calls a method on an object: the object becomes the first argument
    /// unless the method is static.
    pub(crate) fn call_cdef_method_on(
        &mut self,
        method: &CdefMethod,
        obj: &CdefObject,
        extra: &[Value],
        nargout: usize,
    ) -> ExecResult<Vec<Value>> {
        if method.is_abstract {
            return Err(ExecError::new(
                ErrorId::BadOperation,
                format!("cannot call abstract method '{}'", method.name),
            ));
        }
        let mut args: SmallVec<[Value; 4]> = SmallVec::new();
        if !method.is_static {
            args.push(Value::Object(obj.clone()));
        }
        args.extend(extra.iter().cloned());

        // the executing class is the one that declared the method, resolved
        // through the object's own ancestry when possible
        let ctx = obj
            .class()
            .and_then(|class| {
                class
                    .ancestry()
                    .into_iter()
                    .find(|ancestor| ancestor.name() == method.owner)
            })
            .or_else(|| self.classes().find_class(&method.owner))
            .map(|class| ClassContext {
                class,
                ctor_output: None,
            });
        self.execute_user_function(&method.function, args.into_vec(), nargout, ctx)
    }

    fn check_recursion(&self, name: &str) -> ExecResult<()> {
        if self.stack.depth() >= self.max_recursion_depth() {
            return Err(ExecError::new(
                ErrorId::MaxRecursionDepth,
                format!("max_recursion_depth exceeded calling '{name}'"),
            ));
        }
        Ok(())
    }

    fn bind_params(&mut self, function: &FunctionDef, args: Vec<Value>, nargout: usize) -> ExecResult<()> {
        let nargin = args.len();
        let has_varargin = function.params.last().is_some_and(|p| p == "varargin");
        let fixed = if has_varargin {
            function.params.len() - 1
        } else {
            function.params.len()
        };
        if nargin > fixed && !has_varargin {
            return Err(ExecError::new(
                ErrorId::UsageError,
                format!("'{}' called with too many inputs", function.name),
            ));
        }
        let mut args = args.into_iter();
        for param in &function.params[..fixed] {
            let Some(value) = args.next() else { break };
            self.stack.set_var(param, value.clone_for_assign());
        }
        if has_varargin {
            let rest: Vec<Value> = args.map(|v| v.clone_for_assign()).collect();
            self.stack.set_var("varargin", Value::Cell(Rc::new(rest)));
        }
        self.stack.set_var("nargin", Value::Int(nargin as i64));
        self.stack.set_var("nargout", Value::Int(nargout as i64));
        Ok(())
    }

    /// Converts the declared output list into the requested output values.
    /// With `nargout == 0` the first output is returned if assigned (it
    /// becomes `ans` at the call site) and nothing is required.
    fn collect_outputs(&mut self, function: &FunctionDef, nargout: usize) -> ExecResult<Vec<Value>> {
        if nargout == 0 {
            if let Some(first) = function.outputs.first() {
                let name = if first == "varargout" { None } else { Some(first) };
                if let Some(name) = name {
                    if let Some(value) = self.stack.get_var(name) {
                        return Ok(vec![value.clone()]);
                    }
                }
            }
            return Ok(Vec::new());
        }

        let has_varargout = function.outputs.last().is_some_and(|o| o == "varargout");
        let fixed = if has_varargout {
            function.outputs.len() - 1
        } else {
            function.outputs.len()
        };
        let mut outputs = Vec::with_capacity(nargout);
        for name in &function.outputs[..fixed] {
            if outputs.len() >= nargout {
                break;
            }
            let Some(value) = self.stack.get_var(name) else {
                return Err(ExecError::new(
                    ErrorId::UsageError,
                    format!("output argument '{name}' of '{}' not assigned", function.name),
                ));
            };
            outputs.push(value.clone());
        }
        if has_varargout && outputs.len() < nargout {
            match self.stack.get_var("varargout") {
                Some(Value::Cell(cell)) => {
                    for value in cell.iter() {
                        if outputs.len() >= nargout {
                            break;
                        }
                        outputs.push(value.clone());
                    }
                }
                Some(_) => {
                    return Err(ExecError::new(
                        ErrorId::WrongType,
                        format!("'varargout' of '{}' must be a cell", function.name),
                    ));
                }
                None => {}
            }
        }
        if outputs.len() < nargout {
            return Err(ExecError::new(
                ErrorId::UsageError,
                format!("'{}' produces fewer than {nargout} outputs", function.name),
            ));
        }
        Ok(outputs)
    }
}
