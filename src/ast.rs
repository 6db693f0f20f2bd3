//! Parse tree types for template text

use serde_json::Value;
use std::fmt;

/// A parsed template: a named list of nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    pub name: String,
    pub root: Vec<Node>,
}

/// Template nodes. Invocations only ever appear at list level, never inside
/// a pipeline, so walking lists finds every one of them.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal output text
    Text(String),

    /// `{{ pipeline }}`
    Action { line: usize, pipe: Pipeline },

    /// `{{ if pipeline }} ... {{ else }} ... {{ end }}`
    If(Branch),

    /// `{{ range pipeline }} ... {{ else }} ... {{ end }}`
    Range(Branch),

    /// `{{ with pipeline }} ... {{ else }} ... {{ end }}`
    With(Branch),

    /// `{{ template "name" pipeline }}`
    Template {
        line: usize,
        name: String,
        pipe: Option<Pipeline>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub line: usize,
    pub pipe: Pipeline,
    pub list: Vec<Node>,
    pub else_list: Option<Vec<Node>>,
}

/// Commands chained with `|`, optionally declaring or assigning variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub line: usize,
    pub decl: Vec<String>,
    pub is_assign: bool,
    pub cmds: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// `.`
    Dot,
    /// `nil`, booleans, numbers and strings
    Constant(Value),
    /// `.a.b`
    Field(Vec<String>),
    /// `$x.a.b`; the bare `$` has an empty name
    Variable { name: String, fields: Vec<String> },
    /// A function name
    Function(String),
    /// `( pipeline )`
    Pipeline(Box<Pipeline>),
}

impl Tree {
    pub fn new(name: impl Into<String>, root: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            root,
        }
    }

    /// Targets of every template invocation in the tree, in source order.
    pub fn invocations(&self) -> Vec<&str> {
        let mut names = Vec::new();
        collect_invocations(&self.root, &mut names);
        names
    }

    /// Build a new tree whose invocation targets are replaced by `rename`.
    pub fn rename_invocations(&self, rename: &mut impl FnMut(&str) -> String) -> Tree {
        Tree {
            name: self.name.clone(),
            root: rename_list(&self.root, rename),
        }
    }

    /// Copy of the tree registered under another name.
    pub fn renamed(&self, name: impl Into<String>) -> Tree {
        Tree {
            name: name.into(),
            root: self.root.clone(),
        }
    }
}

fn collect_invocations<'a>(nodes: &'a [Node], names: &mut Vec<&'a str>) {
    for node in nodes {
        match node {
            Node::Template { name, .. } => names.push(name),
            Node::If(branch) | Node::Range(branch) | Node::With(branch) => {
                collect_invocations(&branch.list, names);
                if let Some(else_list) = &branch.else_list {
                    collect_invocations(else_list, names);
                }
            }
            Node::Text(_) | Node::Action { .. } => {}
        }
    }
}

fn rename_list(nodes: &[Node], rename: &mut impl FnMut(&str) -> String) -> Vec<Node> {
    nodes.iter().map(|node| rename_node(node, rename)).collect()
}

fn rename_node(node: &Node, rename: &mut impl FnMut(&str) -> String) -> Node {
    match node {
        Node::Template { line, name, pipe } => Node::Template {
            line: *line,
            name: rename(name),
            pipe: pipe.clone(),
        },
        Node::If(branch) => Node::If(rename_branch(branch, rename)),
        Node::Range(branch) => Node::Range(rename_branch(branch, rename)),
        Node::With(branch) => Node::With(rename_branch(branch, rename)),
        other => other.clone(),
    }
}

fn rename_branch(branch: &Branch, rename: &mut impl FnMut(&str) -> String) -> Branch {
    Branch {
        line: branch.line,
        pipe: branch.pipe.clone(),
        list: rename_list(&branch.list, rename),
        else_list: branch.else_list.as_ref().map(|list| rename_list(list, rename)),
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Dot => write!(f, "."),
            Arg::Constant(Value::Null) => write!(f, "nil"),
            Arg::Constant(Value::String(s)) => write!(f, "{:?}", s),
            Arg::Constant(value) => write!(f, "{}", value),
            Arg::Field(path) => write!(f, ".{}", path.join(".")),
            Arg::Variable { name, fields } => {
                write!(f, "${}", name)?;
                for field in fields {
                    write!(f, ".{}", field)?;
                }
                Ok(())
            }
            Arg::Function(name) => write!(f, "{}", name),
            Arg::Pipeline(pipe) => write!(f, "({})", pipe),
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.decl.is_empty() {
            let vars: Vec<String> = self.decl.iter().map(|v| format!("${}", v)).collect();
            write!(f, "{} {} ", vars.join(", "), if self.is_assign { "=" } else { ":=" })?;
        }
        let cmds: Vec<String> = self
            .cmds
            .iter()
            .map(|cmd| cmd.args.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(" "))
            .collect();
        write!(f, "{}", cmds.join(" | "))
    }
}
