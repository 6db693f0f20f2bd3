//! Registry assembly and rendering

use crate::ast::Tree;
use crate::error::{CompilerError, Result};
use crate::exec::Executor;
use crate::funcs::FuncMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;

/// Collects fragments and roots while a directory is compiled.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    trees: BTreeMap<String, Tree>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `tree` under `name`. Names are never replaced.
    pub fn attach(&mut self, name: impl Into<String>, tree: Tree) -> Result<()> {
        let name = name.into();
        if self.trees.contains_key(&name) {
            return Err(CompilerError::DuplicateName { name });
        }
        let tree = if tree.name == name { tree } else { tree.renamed(name.clone()) };
        self.trees.insert(name, tree);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.trees.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    pub fn build(self, functions: FuncMap) -> Registry {
        Registry {
            trees: self.trees,
            functions,
        }
    }
}

/// Every compiled fragment and page root, addressable by name.
#[derive(Debug, Clone)]
pub struct Registry {
    trees: BTreeMap<String, Tree>,
    functions: FuncMap,
}

impl Registry {
    /// Execute the template `name` against `data`.
    pub fn render(&self, name: &str, data: &Value) -> Result<String> {
        if !self.trees.contains_key(name) {
            return Err(CompilerError::render(name, format!("no such template {:?}", name)));
        }
        Executor::new(&self.trees, &self.functions).execute(name, data)
    }

    /// Like [`Registry::render`], writing the output to `writer`.
    pub fn render_to<W: Write>(&self, name: &str, data: &Value, writer: &mut W) -> Result<()> {
        let output = self.render(name, data)?;
        writer
            .write_all(output.as_bytes())
            .map_err(|e| CompilerError::io(name, e))
    }

    pub fn get(&self, name: &str) -> Option<&Tree> {
        self.trees.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.trees.contains_key(name)
    }

    /// All template names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.trees.keys().map(String::as_str)
    }

    pub fn functions(&self) -> &FuncMap {
        &self.functions
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}
