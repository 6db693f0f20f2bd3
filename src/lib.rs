//! Single-File Component Compiler
//!
//! Compiles a directory of component documents, each holding up to three
//! sections (`<style>`, `<script>`, `<template>`), into one [`Registry`] of
//! templates. Every document gets a synthesized page root that pulls in the
//! style and script of each component it uses exactly once, however many
//! times and by however many paths the component is included.
//!
//! # Basic Usage
//!
//! ```no_run
//! use sfc::{compile_dir, FuncMap, Result};
//! use serde_json::json;
//!
//! fn main() -> Result<()> {
//!     let registry = compile_dir("components", FuncMap::new())?;
//!     let page = registry.render("./home", &json!({"title": "Home"}))?;
//!     println!("{}", page);
//!     Ok(())
//! }
//! ```
//!
//! # Naming
//!
//! A document at `root/a/b/c.tmpl` is the page `./a/b/c`. Its sections are
//! registered as `./a/b/c#style`, `./a/b/c#script` and `./a/b/c#template`,
//! and sub-templates it defines as `./a/b/c~name`. Inside a document,
//! `{{template "../x" .}}` names another document relative to this one,
//! while `{{template "x" .}}` names a local sub-template.
//!
//! # Compilation Pipeline
//!
//! 1. **Phase 1**: Splitter - Extract and dedent the three sections
//! 2. **Phase 2**: Resolver - Parse sections and canonicalise invocations
//! 3. **Phase 3**: Graph - Record template section dependencies
//! 4. **Phase 4**: Compiler - Order each closure and synthesize page roots
//! 5. **Phase 5**: Registry - Assemble fragments and roots for rendering

pub mod types;
pub mod error;
pub mod markup;
pub mod splitter;

pub mod lexer;
pub mod ast;
pub mod parser;
pub mod funcs;
pub mod exec;

pub mod resolver;
pub mod graph;
pub mod compiler;
pub mod registry;
pub mod cli;

use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Instant;
use walkdir::WalkDir;

// Re-export commonly used types and functions
pub use error::{CompilerError, Result};
pub use types::*;
pub use ast::{Node, Tree};
pub use parser::{parse, parse_with_functions, ParsedTemplate};
pub use funcs::{FuncMap, Function};
pub use splitter::split_sections;
pub use resolver::{resolve_reference, ReferenceResolver, ResolvedSection};
pub use graph::DependencyGraph;
pub use compiler::{sorted_closure, synthesize_root};
pub use registry::{Registry, RegistryBuilder};
pub use cli::EnhancedCli;

/// Compiler version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Compilation options and settings
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// File extension of component documents, without the dot
    pub extension: String,

    /// Enable per-phase debug logging
    pub debug_mode: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
            debug_mode: false,
        }
    }
}

/// Compilation statistics and metrics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompilationStats {
    /// Number of component documents found
    pub document_count: usize,

    /// Number of section and sub-template fragments registered
    pub fragment_count: usize,

    /// Number of synthesized page roots
    pub root_count: usize,

    /// Number of distinct dependency edges
    pub edge_count: usize,

    /// Compilation time in milliseconds
    pub compile_time_ms: u64,
}

/// Everything a compilation produced.
#[derive(Debug)]
pub struct Compilation {
    pub registry: Registry,
    pub graph: DependencyGraph,
    pub documents: Vec<SourceDocument>,
    pub stats: CompilationStats,
}

/// State threaded through the directory walk.
#[derive(Default)]
struct BuildState {
    graph: DependencyGraph,
    fragments: RegistryBuilder,
    /// Section fragments whose source had content.
    populated: BTreeSet<String>,
    documents: Vec<SourceDocument>,
}

/// Compile every component under `root` with default options.
pub fn compile_dir(root: impl AsRef<Path>, functions: FuncMap) -> Result<Registry> {
    let compilation = compile_dir_with_options(root, functions, &CompilerOptions::default())?;
    Ok(compilation.registry)
}

/// Compile with custom options
pub fn compile_dir_with_options(
    root: impl AsRef<Path>,
    functions: FuncMap,
    options: &CompilerOptions,
) -> Result<Compilation> {
    let root = root.as_ref();
    let start_time = Instant::now();

    if options.debug_mode {
        log::info!("{} v{}", NAME, VERSION);
        log::debug!("Compiler options: {:?}", options);
    }

    let metadata = fs::metadata(root).map_err(|e| CompilerError::io(root, e))?;
    if !metadata.is_dir() {
        return Err(CompilerError::io(
            root,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
        ));
    }

    // Phases 1-3: split, resolve and record edges per document
    let mut state = BuildState::default();
    let extension = options.extension.trim_start_matches('.');
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            CompilerError::io(path, e.into())
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(path);
        let document = SourceDocument::from_relative_path(relative);
        let source = fs::read_to_string(path).map_err(|e| CompilerError::io(path, e))?;
        compile_document(&mut state, document, &source, &functions, options)?;
    }

    for (from, to) in state.graph.dangling_edges() {
        log::warn!("{} references {}, which does not exist", from, to);
    }

    let mut stats = CompilationStats {
        document_count: state.documents.len(),
        fragment_count: state.fragments.len(),
        edge_count: state.graph.edge_count(),
        ..Default::default()
    };

    if options.debug_mode {
        log::debug!(
            "Phases 1-3 complete. Documents: {}, Fragments: {}, Edges: {}",
            stats.document_count,
            stats.fragment_count,
            stats.edge_count
        );
        log::debug!("Phase 4: Synthesizing page roots...");
    }

    // Phase 4: one root per document, only after the graph is complete
    let BuildState {
        graph,
        fragments: mut builder,
        populated,
        mut documents,
    } = state;
    documents.sort();

    let mut roots = Vec::with_capacity(documents.len());
    for document in &documents {
        let name = &document.canonical_name;
        let order = compiler::sorted_closure(&graph, name)?;
        if options.debug_mode {
            log::debug!("{} includes {}", name, order.join(", "));
        }
        let root = compiler::compile_root(name, &order, |f| populated.contains(f), &functions)?;
        roots.push((name.clone(), root));
    }

    // Phase 5: roots join the fragments
    for (name, root) in roots {
        builder.attach(name, root)?;
        stats.root_count += 1;
    }

    let registry = builder.build(functions);
    stats.compile_time_ms = start_time.elapsed().as_millis() as u64;

    log::info!(
        "Compiled {} documents into {} templates in {}ms",
        stats.document_count,
        registry.len(),
        stats.compile_time_ms
    );

    Ok(Compilation {
        registry,
        graph,
        documents,
        stats,
    })
}

/// Split and resolve one document, registering its fragments and edges.
fn compile_document(
    state: &mut BuildState,
    document: SourceDocument,
    source: &str,
    functions: &FuncMap,
    options: &CompilerOptions,
) -> Result<()> {
    if options.debug_mode {
        log::debug!("Compiling {} as {}", document.relative_path, document.canonical_name);
    }

    let sections = splitter::split_sections(source, &document.relative_path)?;
    let resolver = ReferenceResolver::new(&document, functions);

    let mut dependencies = Vec::new();
    for kind in SectionKind::ALL {
        let text = sections.get(kind);
        let fragment = document.fragment_name(kind);
        // Empty sections still answer invocations, with no output.
        if text.trim().is_empty() {
            state.fragments.attach(fragment.clone(), Tree::new(fragment, Vec::new()))?;
            continue;
        }
        state.populated.insert(fragment);
        let resolved = resolver.resolve_section(kind, text)?;
        for (name, tree) in resolved.fragments {
            state.fragments.attach(name, tree)?;
        }
        dependencies.extend(resolved.dependencies);
    }

    state.graph.add_document(&document.canonical_name, dependencies);
    state.documents.push(document);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn fixture(files: &[(&str, &str)]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(full, content).unwrap();
        }
        dir
    }

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    fn home_and_nav() -> TempDir {
        fixture(&[
            (
                "home.tmpl",
                "<template>\n  <main>\n    {{template \"./nav\" .}}\n    {{template \"./nav\" .}}\n  </main>\n</template>\n",
            ),
            (
                "nav.tmpl",
                "<style>\n  .nav{}\n</style>\n<script>\n  init()\n</script>\n<template>\n  <nav/>\n</template>\n",
            ),
        ])
    }

    #[test]
    fn test_home_and_nav() {
        let dir = home_and_nav();
        let registry = compile_dir(dir.path(), FuncMap::new()).unwrap();

        let names: Vec<&str> = registry.names().collect();
        assert_eq!(
            names,
            vec![
                "./home",
                "./home#script",
                "./home#style",
                "./home#template",
                "./nav",
                "./nav#script",
                "./nav#style",
                "./nav#template"
            ]
        );

        let root = registry.get("./home").unwrap();
        assert_eq!(
            root.invocations(),
            vec!["./nav#style", "./nav#script", "./home#template"]
        );
        let home = registry.get("./home#template").unwrap();
        assert_eq!(home.invocations(), vec!["./nav#template", "./nav#template"]);

        let page = registry.render("./home", &json!({})).unwrap();
        assert_eq!(
            page,
            "<!DOCTYPE html>\n<html>\n<style>\n.nav{}\n</style>\n<script>\ninit()\n</script>\n\
             <main>\n  <nav/>\n  <nav/>\n</main>\n</html>\n"
        );
        assert_eq!(count(&page, ".nav{}"), 1);
        assert_eq!(count(&page, "init()"), 1);
    }

    #[test]
    fn test_diamond_includes_shared_style_once() {
        let dir = fixture(&[
            ("page.tmpl", "<template>{{template \"./left\" .}}{{template \"./right\" .}}</template>"),
            ("left.tmpl", "<style>.left{}</style><template>L{{template \"./shared/base\" .}}</template>"),
            ("right.tmpl", "<style>.right{}</style><template>R{{template \"./shared/base\" .}}</template>"),
            ("shared/base.tmpl", "<style>.base{}</style><script>base()</script><template>B</template>"),
        ]);
        let registry = compile_dir(dir.path(), FuncMap::new()).unwrap();
        let page = registry.render("./page", &Value::Null).unwrap();

        assert_eq!(count(&page, ".base{}"), 1);
        assert_eq!(count(&page, "base()"), 1);
        assert!(page.contains(".base{}\n.left{}\n.right{}"));
        assert!(page.contains("LBRB"));
    }

    #[test]
    fn test_cycle_fails_without_registry() {
        let dir = fixture(&[
            ("a.tmpl", "<template>{{template \"./b\" .}}</template>"),
            ("b.tmpl", "<template>{{template \"./a\" .}}</template>"),
        ]);
        match compile_dir(dir.path(), FuncMap::new()) {
            Err(CompilerError::CyclicDependency { members, .. }) => {
                assert_eq!(members, vec!["./a", "./b"]);
            }
            other => panic!("Expected cyclic dependency, got {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let dir = fixture(&[
            ("tree.tmpl", "<template>{{if .C}}{{template \"./tree\" .C}}{{end}}</template>"),
            ("page.tmpl", "<template>{{template \"./tree\" .}}</template>"),
        ]);
        match compile_dir(dir.path(), FuncMap::new()) {
            Err(CompilerError::CyclicDependency { members, .. }) => {
                assert!(members.contains(&"./tree".to_string()));
            }
            other => panic!("Expected cyclic dependency, got {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn test_local_recursion_renders() {
        let dir = fixture(&[(
            "tree.tmpl",
            "<template>{{define \"node\"}}{{.Name}}{{range .Children}}[{{template \"node\" .}}]{{end}}{{end}}{{template \"node\" .}}</template>",
        )]);
        let registry = compile_dir(dir.path(), FuncMap::new()).unwrap();
        let out = registry
            .render("./tree#template", &json!({"Name": "a", "Children": [{"Name": "b"}]}))
            .unwrap();
        assert_eq!(out, "a[b]");
    }

    #[test]
    fn test_unbounded_recursion_fails_on_a_spawned_thread() {
        let dir = fixture(&[(
            "loop.tmpl",
            "<template>{{define \"loop\"}}x{{template \"loop\" .}}{{end}}{{template \"loop\" .}}</template>",
        )]);
        let registry = std::sync::Arc::new(compile_dir(dir.path(), FuncMap::new()).unwrap());
        let shared = std::sync::Arc::clone(&registry);
        let handle = std::thread::spawn(move || shared.render("./loop", &Value::Null));
        match handle.join().unwrap() {
            Err(CompilerError::Render { message, .. }) => {
                assert!(message.contains("exceeded maximum template depth"));
            }
            other => panic!("Expected render error, got {:?}", other),
        }
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let dir = fixture(&[
            ("z.tmpl", "<style>z{}</style><template>{{template \"./m\" .}}{{template \"./a\" .}}</template>"),
            ("m.tmpl", "<style>m{}</style><template>{{template \"./a\" .}}</template>"),
            ("a.tmpl", "<style>a{}</style><template>A</template>"),
        ]);
        let first = compile_dir(dir.path(), FuncMap::new()).unwrap();
        let second = compile_dir(dir.path(), FuncMap::new()).unwrap();

        assert_eq!(first.names().collect::<Vec<_>>(), second.names().collect::<Vec<_>>());
        for name in first.names() {
            assert_eq!(first.get(name), second.get(name));
        }
        let page = first.render("./z", &Value::Null).unwrap();
        assert!(page.contains("a{}\nm{}\nz{}"));
    }

    #[test]
    fn test_local_and_cross_file_references() {
        let dir = fixture(&[
            (
                "pages/home.tmpl",
                "<template>{{define \"nav\"}}local{{end}}{{template \"nav\" .}}|{{template \"../nav\" .}}</template>",
            ),
            ("nav.tmpl", "<template>shared</template>"),
            ("pages/nav.tmpl", "<template>sibling</template>"),
        ]);
        let compilation = compile_dir_with_options(dir.path(), FuncMap::new(), &CompilerOptions::default()).unwrap();
        let deps: Vec<&str> = compilation.graph.dependencies("./pages/home").collect();
        assert_eq!(deps, vec!["./nav"]);

        let out = compilation.registry.render("./pages/home#template", &Value::Null).unwrap();
        assert_eq!(out, "local|shared");
        assert!(compilation.registry.contains("./pages/home~nav"));
    }

    #[test]
    fn test_document_without_sections() {
        let dir = fixture(&[
            ("page.tmpl", "<template>{{template \"./empty\" .}}ok</template>"),
            ("empty.tmpl", "just prose, no sections\n"),
        ]);
        let registry = compile_dir(dir.path(), FuncMap::new()).unwrap();
        assert!(registry.contains("./empty"));
        assert!(registry.contains("./empty#template"));
        assert_eq!(
            registry.render("./empty", &Value::Null).unwrap(),
            "<!DOCTYPE html>\n<html>\n<style>\n\n</style>\n<script>\n\n</script>\n</html>\n"
        );
        assert_eq!(
            registry.render("./page", &Value::Null).unwrap(),
            "<!DOCTYPE html>\n<html>\n<style>\n\n</style>\n<script>\n\n</script>\nok\n</html>\n"
        );
    }

    #[test]
    fn test_reference_to_empty_section_contributes_nothing() {
        let dir = fixture(&[
            ("page.tmpl", "<style>p{}{{template \"./nav\" .}}</style><template>P{{template \"./nav\" .}}</template>"),
            ("nav.tmpl", "<template>N</template>"),
        ]);
        let registry = compile_dir(dir.path(), FuncMap::new()).unwrap();
        assert_eq!(registry.render("./page#style", &Value::Null).unwrap(), "p{}");
        assert!(registry.get("./nav#style").map_or(false, |t| t.root.is_empty()));

        let root = registry.get("./page").unwrap();
        assert_eq!(root.invocations(), vec!["./page#style", "./page#template"]);
        assert_eq!(
            registry.render("./page", &Value::Null).unwrap(),
            "<!DOCTYPE html>\n<html>\n<style>\np{}\n</style>\n<script>\n\n</script>\nPN\n</html>\n"
        );
    }

    #[test]
    fn test_data_is_escaped_in_pages() {
        let dir = fixture(&[("page.tmpl", "<template><p>{{.Name}}</p>{{.Raw | safe}}</template>")]);
        let registry = compile_dir(dir.path(), FuncMap::new()).unwrap();
        let out = registry
            .render("./page#template", &json!({"Name": "<script>", "Raw": "<br>"}))
            .unwrap();
        assert_eq!(out, "<p>&lt;script&gt;</p><br>");
    }

    #[test]
    fn test_missing_target_fails_at_render_time() {
        let dir = fixture(&[("page.tmpl", "<template>{{template \"./ghost\" .}}</template>")]);
        let compilation = compile_dir_with_options(dir.path(), FuncMap::new(), &CompilerOptions::default()).unwrap();
        assert_eq!(compilation.graph.dangling_edges(), vec![("./page", "./ghost")]);
        let err = compilation.registry.render("./page", &Value::Null).unwrap_err();
        assert!(err.to_string().contains("no such template"));
    }

    #[test]
    fn test_errors_carry_file_context() {
        let dir = fixture(&[("bad.tmpl", "<template>{{ if }}</template>")]);
        match compile_dir(dir.path(), FuncMap::new()) {
            Err(CompilerError::TemplateSyntax { file, section, .. }) => {
                assert_eq!(file, "bad.tmpl");
                assert_eq!(section, "template");
            }
            other => panic!("Expected syntax error, got {:?}", other.map(|r| r.len())),
        }

        let dir = fixture(&[("broken.tmpl", "<template><div></template")]);
        assert!(matches!(
            compile_dir(dir.path(), FuncMap::new()),
            Err(CompilerError::MalformedMarkup { .. })
        ));
    }

    #[test]
    fn test_missing_root_is_io_error() {
        let missing = PathBuf::from("/definitely/not/a/real/sfc/root");
        match compile_dir(&missing, FuncMap::new()) {
            Err(CompilerError::Io { path, .. }) => assert_eq!(path, missing),
            other => panic!("Expected IO error, got {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn test_options_and_stats() {
        let dir = fixture(&[
            ("home.html", "<template>{{template \"./nav\" .}}</template>"),
            ("nav.html", "<style>n{}</style><template>N</template>"),
            ("ignored.tmpl", "<template>X</template>"),
        ]);
        let options = CompilerOptions {
            extension: ".html".to_string(),
            debug_mode: true,
        };
        let compilation = compile_dir_with_options(dir.path(), FuncMap::new(), &options).unwrap();
        assert_eq!(compilation.stats.document_count, 2);
        assert_eq!(compilation.stats.fragment_count, 6);
        assert_eq!(compilation.stats.root_count, 2);
        assert_eq!(compilation.stats.edge_count, 1);
        assert!(!compilation.registry.contains("./ignored"));
    }

    #[test]
    fn test_user_functions_reach_templates() {
        let dir = fixture(&[("page.tmpl", "<template>{{ upper .Name }}</template>")]);
        let funcs = FuncMap::new().with("upper", |args: &[Value]| {
            Ok(Value::String(funcs::sprint(args).to_uppercase()))
        });
        let registry = compile_dir(dir.path(), funcs).unwrap();
        let out = registry.render("./page#template", &json!({"Name": "ada"})).unwrap();
        assert_eq!(out, "ADA");
    }
}
