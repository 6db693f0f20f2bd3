//! Splits a component document into its style, script and template sections

use crate::error::{CompilerError, Result};
use crate::markup::{TokenKind, Tokenizer};
use crate::types::{SectionKind, Sections};

/// Extract the three sections of a component document.
///
/// Recognised tags nested inside an open section are kept verbatim, so a
/// literal `<style>` inside a `<template>` body stays part of the template.
/// Anything outside the recognised tags is ignored.
pub fn split_sections(source: &str, file: &str) -> Result<Sections> {
    let mut tokenizer = Tokenizer::new(source);
    let mut sections = Sections::default();
    let mut current: Option<SectionKind> = None;
    let mut depth = 0usize;

    while let Some(token) = tokenizer.next_token().map_err(|e| CompilerError::markup(file, e))? {
        if let Some(kind) = SectionKind::from_tag_name(&token.name) {
            match token.kind {
                TokenKind::StartTag => {
                    if kind == SectionKind::Style && token.has_attr("scoped") {
                        sections.scoped_style = true;
                    }
                    depth += 1;
                    if depth == 1 {
                        current = Some(kind);
                        continue;
                    }
                }
                TokenKind::EndTag => {
                    if depth == 0 {
                        return Err(CompilerError::MalformedMarkup {
                            file: file.to_string(),
                            message: format!("line {}: unexpected </{}>", token.line, token.name),
                        });
                    }
                    depth -= 1;
                    if depth == 0 {
                        current = None;
                        continue;
                    }
                }
                _ => {}
            }
        }

        if let Some(kind) = current {
            sections.get_mut(kind).push_str(token.raw);
        }
    }

    if let Some(kind) = current {
        return Err(CompilerError::MalformedMarkup {
            file: file.to_string(),
            message: format!("unclosed <{}> section", kind),
        });
    }

    for kind in SectionKind::ALL {
        let content = sections.get_mut(kind);
        *content = dedent(content);
    }

    log::trace!(
        "Split {}: style={}B script={}B template={}B scoped={}",
        file,
        sections.style.len(),
        sections.script.len(),
        sections.template.len(),
        sections.scoped_style
    );

    Ok(sections)
}

/// Drop blank leading and trailing lines, then remove the whitespace prefix
/// shared by every non-blank line.
pub fn dedent(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let is_blank = |line: &&str| line.trim().is_empty();
    let first = match lines.iter().position(|l| !is_blank(l)) {
        Some(first) => first,
        None => return String::new(),
    };
    let last = lines.iter().rposition(|l| !is_blank(l)).unwrap_or(first);
    let body = &lines[first..=last];

    let mut prefix: Option<&str> = None;
    for line in body.iter().filter(|l| !is_blank(l)) {
        let indent = &line[..line.len() - line.trim_start_matches([' ', '\t']).len()];
        prefix = Some(match prefix {
            None => indent,
            Some(current) => common_prefix(current, indent),
        });
    }
    let prefix = prefix.unwrap_or("");

    body.iter()
        .map(|line| {
            if is_blank(line) {
                ""
            } else {
                &line[prefix.len()..]
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn common_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    let len = a
        .bytes()
        .zip(b.bytes())
        .take_while(|(x, y)| x == y)
        .count();
    &a[..len]
}
