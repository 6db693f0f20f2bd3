//! HTML-like tokenizer for component documents
//!
//! Only as much of HTML as section splitting needs: start, end and
//! self-closing tags with attributes, comments, doctypes and text. The
//! contents of `<script>` and `<style>` are raw text, so markup-like
//! characters in CSS or JavaScript never produce tags.

use crate::error::MarkupError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Text,
    StartTag,
    EndTag,
    SelfClosingTag,
    Comment,
    Doctype,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub key: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// Lowercased tag name; empty for text, comments and doctypes.
    pub name: String,
    pub attrs: Vec<Attribute>,
    /// The exact source text of the token.
    pub raw: &'a str,
    pub line: usize,
}

impl<'a> Token<'a> {
    pub fn has_attr(&self, key: &str) -> bool {
        self.attrs.iter().any(|attr| attr.key == key)
    }
}

/// Elements whose content is not tokenized.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

pub struct Tokenizer<'a> {
    input: &'a str,
    position: usize,
    line: usize,
    raw_text_end: Option<String>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            position: 0,
            line: 1,
            raw_text_end: None,
        }
    }

    /// Collect every token up to the end of input.
    pub fn tokenize(&mut self) -> Result<Vec<Token<'a>>, MarkupError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    /// Next token, `Ok(None)` on a clean end of input.
    pub fn next_token(&mut self) -> Result<Option<Token<'a>>, MarkupError> {
        if self.is_at_end() {
            if let Some(tag) = self.raw_text_end.take() {
                return Err(MarkupError::new(self.line, format!("unterminated <{}> element", tag)));
            }
            return Ok(None);
        }

        if let Some(tag) = self.raw_text_end.take() {
            return self.read_raw_text(&tag).map(Some);
        }

        let rest = self.rest();
        let token = if rest.starts_with("<!--") {
            self.read_comment()?
        } else if rest.starts_with("<!") {
            self.read_doctype()?
        } else if rest.starts_with("</") && rest[2..].starts_with(|c: char| c.is_ascii_alphabetic()) {
            self.read_tag(true)?
        } else if rest.starts_with('<') && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
            self.read_tag(false)?
        } else {
            self.read_text()
        };

        if token.kind == TokenKind::StartTag && RAW_TEXT_ELEMENTS.contains(&token.name.as_str()) {
            self.raw_text_end = Some(token.name.clone());
        }
        Ok(Some(token))
    }

    fn read_text(&mut self) -> Token<'a> {
        let start = self.position;
        let line = self.line;
        // A leading '<' that opened nothing is plain text.
        let skip = if self.rest().starts_with('<') { 1 } else { 0 };
        let len = self.rest()[skip..].find('<').map_or(self.rest().len(), |i| i + skip);
        self.advance_by(len);
        self.token(TokenKind::Text, String::new(), Vec::new(), start, line)
    }

    fn read_raw_text(&mut self, tag: &str) -> Result<Token<'a>, MarkupError> {
        let start = self.position;
        let line = self.line;
        let end = find_closing_tag(self.rest(), tag)
            .ok_or_else(|| MarkupError::new(line, format!("unterminated <{}> element", tag)))?;
        if end == 0 {
            // Empty element; go straight to its end tag.
            return self.read_tag(true);
        }
        self.advance_by(end);
        Ok(self.token(TokenKind::Text, String::new(), Vec::new(), start, line))
    }

    fn read_comment(&mut self) -> Result<Token<'a>, MarkupError> {
        let start = self.position;
        let line = self.line;
        let end = self.rest()[4..]
            .find("-->")
            .ok_or_else(|| MarkupError::new(line, "unterminated comment"))?;
        self.advance_by(4 + end + 3);
        Ok(self.token(TokenKind::Comment, String::new(), Vec::new(), start, line))
    }

    fn read_doctype(&mut self) -> Result<Token<'a>, MarkupError> {
        let start = self.position;
        let line = self.line;
        let end = self
            .rest()
            .find('>')
            .ok_or_else(|| MarkupError::new(line, "unterminated declaration"))?;
        self.advance_by(end + 1);
        Ok(self.token(TokenKind::Doctype, String::new(), Vec::new(), start, line))
    }

    fn read_tag(&mut self, closing: bool) -> Result<Token<'a>, MarkupError> {
        let start = self.position;
        let line = self.line;
        self.advance_by(if closing { 2 } else { 1 });

        let name = self.read_while(|c| !c.is_whitespace() && c != '/' && c != '>').to_ascii_lowercase();
        let mut attrs = Vec::new();
        let mut self_closing = false;

        loop {
            self.skip_whitespace();
            match self.peek() {
                None => {
                    return Err(MarkupError::new(line, format!("unterminated tag <{}", name)));
                }
                Some('>') => {
                    self.advance_by(1);
                    break;
                }
                Some('/') => {
                    self.advance_by(1);
                    if self.peek() == Some('>') {
                        self.advance_by(1);
                        self_closing = true;
                        break;
                    }
                }
                Some(_) => {
                    let attr = self.read_attribute(line)?;
                    if !closing {
                        attrs.push(attr);
                    }
                }
            }
        }

        let kind = match (closing, self_closing) {
            (true, _) => TokenKind::EndTag,
            (false, true) => TokenKind::SelfClosingTag,
            (false, false) => TokenKind::StartTag,
        };
        Ok(self.token(kind, name, attrs, start, line))
    }

    fn read_attribute(&mut self, line: usize) -> Result<Attribute, MarkupError> {
        let key = self
            .read_while(|c| !c.is_whitespace() && c != '/' && c != '>' && c != '=')
            .to_ascii_lowercase();
        self.skip_whitespace();
        if self.peek() != Some('=') {
            return Ok(Attribute { key, value: None });
        }
        self.advance_by(1);
        self.skip_whitespace();

        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.advance_by(1);
                let end = self.rest().find(quote).ok_or_else(|| {
                    MarkupError::new(line, format!("unterminated value for attribute '{}'", key))
                })?;
                let value = self.rest()[..end].to_string();
                self.advance_by(end + 1);
                value
            }
            _ => self.read_while(|c| !c.is_whitespace() && c != '>').to_string(),
        };
        Ok(Attribute { key, value: Some(value) })
    }

    fn token(&self, kind: TokenKind, name: String, attrs: Vec<Attribute>, start: usize, line: usize) -> Token<'a> {
        Token {
            kind,
            name,
            attrs,
            raw: &self.input[start..self.position],
            line,
        }
    }

    fn read_while(&mut self, accept: impl Fn(char) -> bool) -> &'a str {
        let input = self.input;
        let start = self.position;
        let len = self.rest().find(|c: char| !accept(c)).unwrap_or(self.rest().len());
        self.advance_by(len);
        &input[start..start + len]
    }

    fn skip_whitespace(&mut self) {
        self.read_while(char::is_whitespace);
    }

    fn advance_by(&mut self, len: usize) {
        let end = self.position + len;
        self.line += self.input[self.position..end].matches('\n').count();
        self.position = end;
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn rest(&self) -> &'a str {
        &self.input[self.position..]
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }
}

/// Byte offset of the `</tag` that closes a raw-text element.
fn find_closing_tag(text: &str, tag: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut offset = 0;
    while let Some(found) = text[offset..].find("</") {
        let at = offset + found;
        let name_start = at + 2;
        let name_end = name_start + tag.len();
        if name_end <= bytes.len()
            && bytes[name_start..name_end].eq_ignore_ascii_case(tag.as_bytes())
            && bytes
                .get(name_end)
                .map_or(true, |b| b.is_ascii_whitespace() || *b == b'>' || *b == b'/')
        {
            return Some(at);
        }
        offset = name_start;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<(TokenKind, String)> {
        Tokenizer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.name))
            .collect()
    }

    #[test]
    fn test_tags_and_text() {
        let tokens = kinds("<div class=\"a\">hi<br/></div>");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::StartTag, "div".to_string()),
                (TokenKind::Text, String::new()),
                (TokenKind::SelfClosingTag, "br".to_string()),
                (TokenKind::EndTag, "div".to_string()),
            ]
        );
    }

    #[test]
    fn test_raw_is_exact_source() {
        let input = "<P ID='x'>a < b</P>";
        let tokens = Tokenizer::new(input).tokenize().unwrap();
        let joined: String = tokens.iter().map(|t| t.raw).collect();
        assert_eq!(joined, input);
        assert_eq!(tokens[0].name, "p");
        assert_eq!(tokens[0].attrs[0], Attribute { key: "id".to_string(), value: Some("x".to_string()) });
    }

    #[test]
    fn test_script_content_is_raw_text() {
        let input = "<script>if (a <b && c > d) { x('</div>') }</script>";
        let tokens = Tokenizer::new(input).tokenize().unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].kind, TokenKind::Text);
        assert_eq!(tokens[1].raw, "if (a <b && c > d) { x('</div>') }");
        assert_eq!(tokens[2].kind, TokenKind::EndTag);
        assert_eq!(tokens[2].name, "script");
    }

    #[test]
    fn test_empty_raw_text_element() {
        let tokens = kinds("<style></style>");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::StartTag, "style".to_string()),
                (TokenKind::EndTag, "style".to_string()),
            ]
        );
    }

    #[test]
    fn test_valueless_attribute() {
        let tokens = Tokenizer::new("<style scoped>.a{}</style>").tokenize().unwrap();
        assert!(tokens[0].has_attr("scoped"));
        assert_eq!(tokens[0].attrs[0].value, None);
    }

    #[test]
    fn test_comments_and_doctype() {
        let tokens = kinds("<!DOCTYPE html><!-- <template> -->x");
        assert_eq!(tokens[0].0, TokenKind::Doctype);
        assert_eq!(tokens[1].0, TokenKind::Comment);
        assert_eq!(tokens[2].0, TokenKind::Text);
    }

    #[test]
    fn test_unterminated_constructs_fail() {
        assert!(Tokenizer::new("<div class=\"a\"").tokenize().is_err());
        assert!(Tokenizer::new("<!-- open").tokenize().is_err());
        let err = Tokenizer::new("\n<script>let a = 1;").tokenize().unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("unterminated <script>"));
    }

    #[test]
    fn test_lone_angle_bracket_is_text() {
        let tokens = Tokenizer::new("1 < 2 <= 3").tokenize().unwrap();
        assert!(tokens.iter().all(|t| t.kind == TokenKind::Text));
        let joined: String = tokens.iter().map(|t| t.raw).collect();
        assert_eq!(joined, "1 < 2 <= 3");
    }
}
