//! Core types and constants for the component compiler

use std::fmt;
use std::path::Path;

/// File extension identifying component documents.
pub const DEFAULT_EXTENSION: &str = "tmpl";

/// Prefix every canonical document name carries.
pub const CANONICAL_PREFIX: &str = "./";

/// Separator between a document name and its section kind.
pub const SECTION_SEPARATOR: char = '#';

/// Separator between a document name and a locally defined sub-template.
pub const LOCAL_SEPARATOR: char = '~';

/// Maximum nesting of template invocations during a single render. Kept low
/// enough that the recursive walk stays inside a default 2 MiB thread stack.
pub const MAX_TEMPLATE_DEPTH: usize = 100;

/// The three sections a component document may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SectionKind {
    Style,
    Script,
    Template,
}

impl SectionKind {
    pub const ALL: [SectionKind; 3] = [SectionKind::Style, SectionKind::Script, SectionKind::Template];

    /// Tag name of the section, which doubles as its fragment suffix.
    pub fn tag_name(self) -> &'static str {
        match self {
            SectionKind::Style => "style",
            SectionKind::Script => "script",
            SectionKind::Template => "template",
        }
    }

    pub fn from_tag_name(name: &str) -> Option<Self> {
        match name {
            "style" => Some(SectionKind::Style),
            "script" => Some(SectionKind::Script),
            "template" => Some(SectionKind::Template),
            _ => None,
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag_name())
    }
}

/// Extracted section contents of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sections {
    pub style: String,
    pub script: String,
    pub template: String,
    /// Set when a `<style>` start tag carries the `scoped` attribute.
    /// Recorded only; no later stage scopes styles.
    pub scoped_style: bool,
}

impl Sections {
    pub fn get(&self, kind: SectionKind) -> &str {
        match kind {
            SectionKind::Style => &self.style,
            SectionKind::Script => &self.script,
            SectionKind::Template => &self.template,
        }
    }

    pub fn get_mut(&mut self, kind: SectionKind) -> &mut String {
        match kind {
            SectionKind::Style => &mut self.style,
            SectionKind::Script => &mut self.script,
            SectionKind::Template => &mut self.template,
        }
    }

    pub fn is_empty(&self) -> bool {
        SectionKind::ALL.iter().all(|kind| self.get(*kind).is_empty())
    }
}

/// One component file found under the compilation root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceDocument {
    /// Slash-separated path relative to the root, extension included.
    pub relative_path: String,
    /// Public template name: `./` + relative path without extension.
    pub canonical_name: String,
}

impl SourceDocument {
    /// Build a document from a path relative to the compilation root.
    pub fn from_relative_path(relative: &Path) -> Self {
        let join = |path: &Path| {
            path.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        };
        let relative_path = join(relative);
        let stem = match relative.file_stem() {
            Some(stem) => join(&relative.with_file_name(stem)),
            None => relative_path.clone(),
        };
        let canonical_name = format!("{}{}", CANONICAL_PREFIX, stem);
        Self {
            relative_path,
            canonical_name,
        }
    }

    /// Directory of the document relative to the root, `""` at the top level.
    pub fn directory(&self) -> &str {
        match self.relative_path.rfind('/') {
            Some(slash) => &self.relative_path[..slash],
            None => "",
        }
    }

    pub fn fragment_name(&self, kind: SectionKind) -> String {
        section_fragment(&self.canonical_name, kind)
    }

    pub fn local_name(&self, local: &str) -> String {
        format!("{}{}{}", self.canonical_name, LOCAL_SEPARATOR, local)
    }
}

/// Name of the fragment holding `kind` of the document `canonical`.
pub fn section_fragment(canonical: &str, kind: SectionKind) -> String {
    format!("{}{}{}", canonical, SECTION_SEPARATOR, kind.tag_name())
}
