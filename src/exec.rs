//! Template execution against JSON data
//!
//! Variables live on a single stack; control structures remember the stack
//! height on entry and truncate back to it on exit, and every template
//! invocation starts a fresh stack holding only `$`.
//!
//! Action output is HTML-escaped unless the pipeline ends in one of the
//! escaping builtins or `safe`.

use crate::ast::*;
use crate::error::{CompilerError, Result};
use crate::funcs::{self, FuncMap};
use crate::types::MAX_TEMPLATE_DEPTH;
use serde_json::Value;
use std::collections::BTreeMap;

pub struct Executor<'a> {
    trees: &'a BTreeMap<String, Tree>,
    functions: &'a FuncMap,
    vars: Vec<(String, Value)>,
    depth: usize,
    current: String,
}

impl<'a> Executor<'a> {
    pub fn new(trees: &'a BTreeMap<String, Tree>, functions: &'a FuncMap) -> Self {
        Self {
            trees,
            functions,
            vars: Vec::new(),
            depth: 0,
            current: String::new(),
        }
    }

    /// Render the template `name` with `data` as both `.` and `$`.
    pub fn execute(&mut self, name: &str, data: &Value) -> Result<String> {
        let mut out = String::new();
        self.call_template(name, data, &mut out)?;
        Ok(out)
    }

    fn call_template(&mut self, name: &str, data: &Value, out: &mut String) -> Result<()> {
        let trees = self.trees;
        let tree = trees
            .get(name)
            .ok_or_else(|| self.error(format!("no such template {:?}", name)))?;
        if self.depth >= MAX_TEMPLATE_DEPTH {
            return Err(self.error(format!(
                "exceeded maximum template depth ({})",
                MAX_TEMPLATE_DEPTH
            )));
        }

        let outer_vars = std::mem::replace(&mut self.vars, vec![(String::new(), data.clone())]);
        let outer_name = std::mem::replace(&mut self.current, name.to_string());
        self.depth += 1;

        let result = self.walk_list(&tree.root, data, out);

        self.depth -= 1;
        self.current = outer_name;
        self.vars = outer_vars;
        result
    }

    fn walk_list(&mut self, nodes: &[Node], dot: &Value, out: &mut String) -> Result<()> {
        for node in nodes {
            self.walk(node, dot, out)?;
        }
        Ok(())
    }

    fn walk(&mut self, node: &Node, dot: &Value, out: &mut String) -> Result<()> {
        match node {
            Node::Text(text) => {
                out.push_str(text);
                Ok(())
            }
            Node::Action { pipe, .. } => self.walk_action(pipe, dot, out),
            Node::If(branch) => self.walk_branch(branch, dot, false, out),
            Node::With(branch) => self.walk_branch(branch, dot, true, out),
            Node::Range(branch) => self.walk_range(branch, dot, out),
            Node::Template { name, pipe, .. } => self.walk_template(name, pipe.as_ref(), dot, out),
        }
    }

    fn walk_action(&mut self, pipe: &Pipeline, dot: &Value, out: &mut String) -> Result<()> {
        let value = self.eval_pipeline(pipe, dot)?;
        if pipe.decl.is_empty() {
            if self.is_trusted(pipe) {
                out.push_str(&funcs::format_value(&value));
            } else {
                out.push_str(&funcs::escape_value(&value));
            }
        }
        Ok(())
    }

    /// `if` and `with`; `with` also rebinds dot to the pipeline value.
    fn walk_branch(&mut self, branch: &Branch, dot: &Value, rebind: bool, out: &mut String) -> Result<()> {
        let mark = self.vars.len();
        let value = self.eval_pipeline(&branch.pipe, dot)?;
        if funcs::is_true(&value) {
            let inner = if rebind { &value } else { dot };
            self.walk_list(&branch.list, inner, out)?;
        } else if let Some(else_list) = &branch.else_list {
            self.walk_list(else_list, dot, out)?;
        }
        self.vars.truncate(mark);
        Ok(())
    }

    fn walk_template(&mut self, name: &str, pipe: Option<&Pipeline>, dot: &Value, out: &mut String) -> Result<()> {
        let data = match pipe {
            Some(pipe) => self.eval_pipeline(pipe, dot)?,
            None => Value::Null,
        };
        self.call_template(name, &data, out)
    }

    fn walk_range(&mut self, branch: &Branch, dot: &Value, out: &mut String) -> Result<()> {
        let value = self.eval_commands(&branch.pipe, dot)?;
        let items: Vec<(Value, Value)> = match value {
            Value::Null => Vec::new(),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Value::from(i), item))
                .collect(),
            Value::Object(map) => map.into_iter().map(|(k, v)| (Value::String(k), v)).collect(),
            Value::Number(ref n) if n.as_u64().is_some() => {
                let count = n.as_u64().unwrap_or(0);
                (0..count).map(|i| (Value::from(i), Value::from(i))).collect()
            }
            other => {
                return Err(self.error(format!(
                    "range can't iterate over {}",
                    funcs::format_value(&other)
                )));
            }
        };

        if items.is_empty() {
            if let Some(else_list) = &branch.else_list {
                let mark = self.vars.len();
                self.walk_list(else_list, dot, out)?;
                self.vars.truncate(mark);
            }
            return Ok(());
        }

        for (key, item) in items {
            let mark = self.vars.len();
            match branch.pipe.decl.as_slice() {
                [] => {}
                [elem] => self.vars.push((elem.clone(), item.clone())),
                [index, elem, ..] => {
                    self.vars.push((index.clone(), key));
                    self.vars.push((elem.clone(), item.clone()));
                }
            }
            self.walk_list(&branch.list, &item, out)?;
            self.vars.truncate(mark);
        }
        Ok(())
    }

    /// Evaluate a pipeline and bind its declared variables.
    fn eval_pipeline(&mut self, pipe: &Pipeline, dot: &Value) -> Result<Value> {
        let value = self.eval_commands(pipe, dot)?;
        for name in &pipe.decl {
            if pipe.is_assign {
                self.assign(name, value.clone())?;
            } else {
                self.vars.push((name.clone(), value.clone()));
            }
        }
        Ok(value)
    }

    /// Evaluate the commands of a pipeline, feeding each result into the next.
    fn eval_commands(&mut self, pipe: &Pipeline, dot: &Value) -> Result<Value> {
        let mut value: Option<Value> = None;
        for cmd in &pipe.cmds {
            value = Some(self.eval_command(cmd, dot, value)?);
        }
        Ok(value.unwrap_or(Value::Null))
    }

    fn eval_command(&mut self, cmd: &Command, dot: &Value, last: Option<Value>) -> Result<Value> {
        let (first, rest) = match cmd.args.split_first() {
            Some(split) => split,
            None => return Err(self.error("empty command")),
        };

        if let Arg::Function(name) = first {
            let mut args = Vec::with_capacity(rest.len() + 1);
            for arg in rest {
                args.push(self.eval_arg(arg, dot)?);
            }
            args.extend(last);
            return self.call_function(name, &args);
        }

        if !rest.is_empty() || last.is_some() {
            return Err(self.error(format!("can't give argument to non-function {}", first)));
        }
        self.eval_arg(first, dot)
    }

    fn eval_arg(&mut self, arg: &Arg, dot: &Value) -> Result<Value> {
        match arg {
            Arg::Dot => Ok(dot.clone()),
            Arg::Constant(value) => Ok(value.clone()),
            Arg::Field(path) => self.field_chain(dot, path),
            Arg::Variable { name, fields } => {
                let value = self.lookup(name)?;
                self.field_chain(&value, fields)
            }
            Arg::Function(name) => self.call_function(name, &[]),
            Arg::Pipeline(pipe) => self.eval_commands(pipe, dot),
        }
    }

    fn field_chain(&self, value: &Value, path: &[String]) -> Result<Value> {
        let mut current = value.clone();
        for field in path {
            current = match current {
                Value::Object(mut map) => map.remove(field).unwrap_or(Value::Null),
                Value::Null => Value::Null,
                other => {
                    return Err(self.error(format!(
                        "can't evaluate field {} in type {}",
                        field,
                        funcs::type_name(&other)
                    )));
                }
            };
        }
        Ok(current)
    }

    /// True when the last command is a builtin whose result needs no escaping.
    fn is_trusted(&self, pipe: &Pipeline) -> bool {
        match pipe.cmds.last().and_then(|cmd| cmd.args.first()) {
            Some(Arg::Function(name)) => {
                funcs::TRUSTED_OUTPUT.contains(&name.as_str()) && self.functions.get(name).is_none()
            }
            _ => false,
        }
    }

    fn call_function(&self, name: &str, args: &[Value]) -> Result<Value> {
        if let Some(function) = self.functions.get(name) {
            return function(args).map_err(|e| self.error(format!("error calling {}: {}", name, e)));
        }
        match funcs::call_builtin(name, args) {
            Some(result) => result.map_err(|e| self.error(format!("error calling {}: {}", name, e))),
            None => Err(self.error(format!("function {:?} not defined", name))),
        }
    }

    fn lookup(&self, name: &str) -> Result<Value> {
        self.vars
            .iter()
            .rev()
            .find(|(var, _)| var == name)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| self.error(format!("undefined variable: ${}", name)))
    }

    fn assign(&mut self, name: &str, value: Value) -> Result<()> {
        match self.vars.iter_mut().rev().find(|(var, _)| var == name) {
            Some(slot) => {
                slot.1 = value;
                Ok(())
            }
            None => Err(self.error(format!("undefined variable: ${}", name))),
        }
    }

    fn error(&self, message: impl Into<String>) -> CompilerError {
        CompilerError::render(self.current.clone(), message)
    }
}
