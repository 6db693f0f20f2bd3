//! Reference resolution
//!
//! Parses one section of a document and rewrites every template invocation
//! to a registry-wide name. Names with a leading dot are paths to other
//! documents; everything else names a sub-template of the same document.

use crate::ast::Tree;
use crate::error::{CompilerError, Result};
use crate::funcs::FuncMap;
use crate::parser::parse_with_functions;
use crate::types::{section_fragment, SectionKind, SourceDocument, CANONICAL_PREFIX};
use std::collections::BTreeSet;

/// Fragments produced from one section, plus the documents its template
/// section depends on.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSection {
    pub fragments: Vec<(String, Tree)>,
    pub dependencies: BTreeSet<String>,
}

pub fn is_cross_file(reference: &str) -> bool {
    reference.starts_with('.')
}

/// Canonical name of `reference` seen from a document in `directory`.
/// `..` never climbs above the compilation root.
pub fn resolve_reference(directory: &str, reference: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in directory.split('/').chain(reference.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("{}{}", CANONICAL_PREFIX, segments.join("/"))
}

pub struct ReferenceResolver<'a> {
    document: &'a SourceDocument,
    functions: &'a FuncMap,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(document: &'a SourceDocument, functions: &'a FuncMap) -> Self {
        Self { document, functions }
    }

    pub fn resolve_section(&self, kind: SectionKind, text: &str) -> Result<ResolvedSection> {
        let fragment = self.document.fragment_name(kind);
        let parsed = parse_with_functions(&fragment, text, self.functions).map_err(|e| {
            CompilerError::syntax(self.document.relative_path.clone(), kind.tag_name(), e)
        })?;

        let document = self.document;
        let mut dependencies = BTreeSet::new();
        let mut rename = |target: &str| -> String {
            if is_cross_file(target) {
                let canonical = resolve_reference(document.directory(), target);
                log::trace!("{}: {} -> {}", fragment, target, canonical);
                if kind == SectionKind::Template {
                    dependencies.insert(canonical.clone());
                }
                section_fragment(&canonical, kind)
            } else {
                document.local_name(target)
            }
        };

        let mut fragments = Vec::with_capacity(parsed.definitions.len() + 1);
        fragments.push((fragment.clone(), parsed.tree.rename_invocations(&mut rename)));
        for definition in &parsed.definitions {
            let local = document.local_name(&definition.name);
            fragments.push((local.clone(), definition.rename_invocations(&mut rename).renamed(local)));
        }

        Ok(ResolvedSection {
            fragments,
            dependencies,
        })
    }
}
