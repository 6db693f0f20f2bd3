//! Topological ordering and page root synthesis

use crate::ast::Tree;
use crate::error::{CompilerError, Result};
use crate::funcs::FuncMap;
use crate::graph::DependencyGraph;
use crate::parser::parse_with_functions;
use crate::types::{section_fragment, SectionKind};
use std::collections::{BTreeMap, BTreeSet};

/// Order the closure of `document` so every document comes after the
/// documents it depends on. Ties are broken by name, which makes the order
/// reproducible; `document` itself is always last.
pub fn sorted_closure(graph: &DependencyGraph, document: &str) -> Result<Vec<String>> {
    let members = graph.closure(document);

    let mut pending: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for member in &members {
        let mut count = 0;
        for dep in graph.dependencies(member) {
            if members.contains(dep) {
                count += 1;
                dependents.entry(dep).or_default().push(member);
            }
        }
        pending.insert(member, count);
    }

    let mut ready: BTreeSet<&str> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut order = Vec::with_capacity(members.len());

    while let Some(next) = ready.pop_first() {
        order.push(next.to_string());
        for dependent in dependents.get(next).into_iter().flatten() {
            if let Some(count) = pending.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if order.len() < members.len() {
        let emitted: BTreeSet<&str> = order.iter().map(String::as_str).collect();
        let remaining = members
            .iter()
            .filter(|m| !emitted.contains(m.as_str()))
            .cloned()
            .collect();
        return Err(CompilerError::CyclicDependency {
            document: document.to_string(),
            members: remaining,
        });
    }

    Ok(order)
}

/// Quote a template name for use inside an action.
pub fn quote_name(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('"');
    for ch in name.chars() {
        if ch == '"' || ch == '\\' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Source of the page root for `document`. Each member of `order` whose
/// style or script fragment has content is included once, in order; the
/// document's own template fragment follows when it has content.
pub fn synthesize_root<F>(document: &str, order: &[String], has_content: F) -> String
where
    F: Fn(&str) -> bool,
{
    let invoke = |name: &str| format!("{{{{template {} .}}}}", quote_name(name));
    let includes = |kind: SectionKind| -> Vec<String> {
        order
            .iter()
            .map(|member| section_fragment(member, kind))
            .filter(|fragment| has_content(fragment))
            .map(|fragment| invoke(&fragment))
            .collect()
    };

    let mut body = String::from("<!DOCTYPE html>\n<html>\n");
    body.push_str("<style>\n");
    body.push_str(&includes(SectionKind::Style).join("\n"));
    body.push_str("\n</style>\n");
    body.push_str("<script>\n");
    body.push_str(&includes(SectionKind::Script).join("\n"));
    body.push_str("\n</script>\n");

    let own = section_fragment(document, SectionKind::Template);
    if has_content(&own) {
        body.push_str(&invoke(&own));
        body.push('\n');
    }
    body.push_str("</html>\n");
    body
}

/// Synthesize and parse the page root for `document`.
pub fn compile_root<F>(
    document: &str,
    order: &[String],
    has_content: F,
    functions: &FuncMap,
) -> Result<Tree>
where
    F: Fn(&str) -> bool,
{
    let body = synthesize_root(document, order, has_content);
    let parsed = parse_with_functions(document, &body, functions)
        .map_err(|e| CompilerError::syntax(document, "root", e))?;
    Ok(parsed.tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Node;

    fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for (from, deps) in edges {
            graph.add_document(from, deps.iter().map(|d| d.to_string()));
        }
        graph
    }

    #[test]
    fn test_dependencies_come_first() {
        let g = graph(&[
            ("./home", &["./nav", "./footer"]),
            ("./nav", &["./icon"]),
            ("./footer", &["./icon"]),
            ("./icon", &[]),
        ]);
        let order = sorted_closure(&g, "./home").unwrap();
        assert_eq!(order, vec!["./icon", "./footer", "./nav", "./home"]);
    }

    #[test]
    fn test_order_is_deterministic() {
        let g = graph(&[("./z", &["./b", "./a", "./c"]), ("./a", &[]), ("./b", &[]), ("./c", &[])]);
        let first = sorted_closure(&g, "./z").unwrap();
        let second = sorted_closure(&g, "./z").unwrap();
        assert_eq!(first, vec!["./a", "./b", "./c", "./z"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_cycle_is_reported() {
        let g = graph(&[("./a", &["./b"]), ("./b", &["./a"]), ("./c", &[])]);
        match sorted_closure(&g, "./a") {
            Err(CompilerError::CyclicDependency { document, members }) => {
                assert_eq!(document, "./a");
                assert_eq!(members, vec!["./a", "./b"]);
            }
            other => panic!("Expected cyclic dependency, got {:?}", other),
        }
        assert_eq!(sorted_closure(&g, "./c").unwrap(), vec!["./c"]);
    }

    #[test]
    fn test_self_edge_is_a_cycle() {
        let g = graph(&[("./tree", &["./tree"]), ("./page", &["./tree"])]);
        match sorted_closure(&g, "./tree") {
            Err(CompilerError::CyclicDependency { document, members }) => {
                assert_eq!(document, "./tree");
                assert_eq!(members, vec!["./tree"]);
            }
            other => panic!("Expected cyclic dependency, got {:?}", other),
        }
        assert!(sorted_closure(&g, "./page").is_err());
    }

    #[test]
    fn test_cycle_below_the_document() {
        let g = graph(&[("./page", &["./a"]), ("./a", &["./b"]), ("./b", &["./a"])]);
        match sorted_closure(&g, "./page") {
            Err(CompilerError::CyclicDependency { members, .. }) => {
                assert_eq!(members, vec!["./a", "./b", "./page"]);
            }
            other => panic!("Expected cyclic dependency, got {:?}", other),
        }
    }

    #[test]
    fn test_root_body_shape() {
        let order = vec!["./nav".to_string(), "./home".to_string()];
        let available = ["./nav#style", "./nav#script", "./nav#template", "./home#template"];
        let body = synthesize_root("./home", &order, |name| available.contains(&name));
        assert_eq!(
            body,
            "<!DOCTYPE html>\n<html>\n<style>\n{{template \"./nav#style\" .}}\n</style>\n\
             <script>\n{{template \"./nav#script\" .}}\n</script>\n\
             {{template \"./home#template\" .}}\n</html>\n"
        );
    }

    #[test]
    fn test_root_without_sections() {
        let order = vec!["./empty".to_string()];
        let body = synthesize_root("./empty", &order, |_| false);
        assert_eq!(body, "<!DOCTYPE html>\n<html>\n<style>\n\n</style>\n<script>\n\n</script>\n</html>\n");
    }

    #[test]
    fn test_names_are_quoted() {
        assert_eq!(quote_name("./a#style"), "\"./a#style\"");
        assert_eq!(quote_name("./we\"ird\\name"), "\"./we\\\"ird\\\\name\"");
    }

    #[test]
    fn test_compile_root_parses_invocations() {
        let order = vec!["./a\"b".to_string()];
        let tree = compile_root("./a\"b", &order, |_| true, &FuncMap::new()).unwrap();
        assert_eq!(tree.name, "./a\"b");
        assert_eq!(
            tree.invocations(),
            vec!["./a\"b#style", "./a\"b#script", "./a\"b#template"]
        );
        assert!(matches!(tree.root[0], Node::Text(_)));
    }
}
