//! Lexical analysis for template text
//!
//! Template text is plain output interleaved with `{{ ... }}` actions. Text
//! between actions becomes a single [`TokenType::Text`] token; the inside of
//! an action is split into operands, keywords and punctuation. Trim markers
//! (`{{- ` and ` -}}`) are applied here, comments (`{{/* ... */}}`) never
//! produce tokens.

use crate::error::SyntaxError;
use regex::Regex;
use std::fmt;

const LEFT_DELIM: &str = "{{";
const RIGHT_DELIM: &str = "}}";
const LEFT_COMMENT: &str = "/*";
const RIGHT_COMMENT: &str = "*/";

type Result<T> = std::result::Result<T, SyntaxError>;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    Text(String),
    LeftDelim,
    RightDelim,

    // Keywords
    If,
    Else,
    End,
    Range,
    With,
    Define,
    Template,
    Block,

    // Operands
    Dot,
    Field(Vec<String>),
    Variable { name: String, fields: Vec<String> },
    Identifier(String),
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Nil,

    // Punctuation
    Pipe,        // |
    LeftParen,   // (
    RightParen,  // )
    Comma,       // ,
    Declare,     // :=
    Assign,      // =

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub line: usize,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Text(_) => write!(f, "text"),
            TokenType::LeftDelim => write!(f, "{{{{"),
            TokenType::RightDelim => write!(f, "}}}}"),
            TokenType::If => write!(f, "<if>"),
            TokenType::Else => write!(f, "<else>"),
            TokenType::End => write!(f, "<end>"),
            TokenType::Range => write!(f, "<range>"),
            TokenType::With => write!(f, "<with>"),
            TokenType::Define => write!(f, "<define>"),
            TokenType::Template => write!(f, "<template>"),
            TokenType::Block => write!(f, "<block>"),
            TokenType::Dot => write!(f, "."),
            TokenType::Field(path) => write!(f, ".{}", path.join(".")),
            TokenType::Variable { name, fields } => {
                write!(f, "${}", name)?;
                for field in fields {
                    write!(f, ".{}", field)?;
                }
                Ok(())
            }
            TokenType::Identifier(id) => write!(f, "{}", id),
            TokenType::String(s) => write!(f, "{:?}", s),
            TokenType::Integer(i) => write!(f, "{}", i),
            TokenType::Float(n) => write!(f, "{}", n),
            TokenType::Boolean(b) => write!(f, "{}", b),
            TokenType::Nil => write!(f, "nil"),
            TokenType::Pipe => write!(f, "|"),
            TokenType::LeftParen => write!(f, "("),
            TokenType::RightParen => write!(f, ")"),
            TokenType::Comma => write!(f, ","),
            TokenType::Declare => write!(f, ":="),
            TokenType::Assign => write!(f, "="),
            TokenType::Eof => write!(f, "EOF"),
        }
    }
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    trim_next_text: bool,

    number_regex: Regex,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            trim_next_text: false,
            number_regex: Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").unwrap(),
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            let text_line = self.line;
            let mut text = self.read_text();
            if self.trim_next_text {
                text = text.trim_start().to_string();
                self.trim_next_text = false;
            }

            let at_action = self.starts_with(LEFT_DELIM);
            let trim_left = at_action && self.has_left_trim_marker();
            if trim_left {
                text = text.trim_end().to_string();
            }
            if !text.is_empty() {
                tokens.push(Token {
                    token_type: TokenType::Text(text),
                    line: text_line,
                });
            }
            if !at_action {
                break;
            }

            self.advance_by(LEFT_DELIM.len() + if trim_left { 1 } else { 0 });
            self.lex_action(&mut tokens)?;
        }

        tokens.push(Token {
            token_type: TokenType::Eof,
            line: self.line,
        });

        Ok(tokens)
    }

    fn read_text(&mut self) -> String {
        let mut text = String::new();
        while !self.is_at_end() && !self.starts_with(LEFT_DELIM) {
            text.push(self.advance());
        }
        text
    }

    fn has_left_trim_marker(&self) -> bool {
        self.char_at(self.position + 2) == Some('-')
            && self.char_at(self.position + 3).map_or(false, is_space)
    }

    fn lex_action(&mut self, tokens: &mut Vec<Token>) -> Result<()> {
        let start_line = self.line;
        self.skip_whitespace();

        if self.starts_with(LEFT_COMMENT) {
            return self.lex_comment(start_line);
        }

        tokens.push(Token {
            token_type: TokenType::LeftDelim,
            line: start_line,
        });

        loop {
            let skipped = self.skip_whitespace();
            let line = self.line;

            if skipped && self.starts_with("-}}") {
                self.advance_by(3);
                self.trim_next_text = true;
                tokens.push(Token { token_type: TokenType::RightDelim, line });
                return Ok(());
            }
            if self.starts_with(RIGHT_DELIM) {
                self.advance_by(2);
                tokens.push(Token { token_type: TokenType::RightDelim, line });
                return Ok(());
            }
            if self.is_at_end() {
                return Err(SyntaxError::new(start_line, "unclosed action"));
            }

            let token_type = self.next_token()?;
            tokens.push(Token { token_type, line });
        }
    }

    fn lex_comment(&mut self, start_line: usize) -> Result<()> {
        self.advance_by(LEFT_COMMENT.len());
        while !self.starts_with(RIGHT_COMMENT) {
            if self.is_at_end() {
                return Err(SyntaxError::new(start_line, "unclosed comment"));
            }
            self.advance();
        }
        self.advance_by(RIGHT_COMMENT.len());

        let skipped = self.skip_whitespace();
        if skipped && self.starts_with("-}}") {
            self.advance_by(3);
            self.trim_next_text = true;
            Ok(())
        } else if self.starts_with(RIGHT_DELIM) {
            self.advance_by(2);
            Ok(())
        } else {
            Err(SyntaxError::new(start_line, "comment ends before closing delimiter"))
        }
    }

    fn next_token(&mut self) -> Result<TokenType> {
        let ch = self.peek().unwrap_or('\0');
        let next = self.peek_next();

        let token_type = match ch {
            '|' => {
                self.advance();
                TokenType::Pipe
            }
            '(' => {
                self.advance();
                TokenType::LeftParen
            }
            ')' => {
                self.advance();
                TokenType::RightParen
            }
            ',' => {
                self.advance();
                TokenType::Comma
            }
            '=' => {
                self.advance();
                TokenType::Assign
            }
            ':' if next == Some('=') => {
                self.advance_by(2);
                TokenType::Declare
            }
            '"' => {
                self.advance();
                TokenType::String(self.read_string()?)
            }
            '`' => {
                self.advance();
                TokenType::String(self.read_raw_string()?)
            }
            '$' => {
                self.advance();
                let name = self.read_identifier();
                let fields = self.read_field_chain();
                TokenType::Variable { name, fields }
            }
            '.' if next.map_or(false, |c| c.is_ascii_digit()) => self.read_number()?,
            '.' => {
                let fields = self.read_field_chain();
                if fields.is_empty() {
                    self.advance();
                    TokenType::Dot
                } else {
                    TokenType::Field(fields)
                }
            }
            c if c.is_ascii_digit() => self.read_number()?,
            '+' | '-' if next.map_or(false, |c| c.is_ascii_digit() || c == '.') => self.read_number()?,
            c if is_identifier_char(c) => {
                let identifier = self.read_identifier();
                self.identify_keyword_or_identifier(identifier)
            }
            _ => {
                return Err(SyntaxError::new(
                    self.line,
                    format!("unexpected character '{}' in action", ch),
                ));
            }
        };

        Ok(token_type)
    }

    fn identify_keyword_or_identifier(&self, identifier: String) -> TokenType {
        match identifier.as_str() {
            "if" => TokenType::If,
            "else" => TokenType::Else,
            "end" => TokenType::End,
            "range" => TokenType::Range,
            "with" => TokenType::With,
            "define" => TokenType::Define,
            "template" => TokenType::Template,
            "block" => TokenType::Block,
            "true" => TokenType::Boolean(true),
            "false" => TokenType::Boolean(false),
            "nil" => TokenType::Nil,
            _ => TokenType::Identifier(identifier),
        }
    }

    /// Zero or more `.name` segments.
    fn read_field_chain(&mut self) -> Vec<String> {
        let mut fields = Vec::new();
        while self.peek() == Some('.') && self.peek_next().map_or(false, is_identifier_char) {
            self.advance();
            fields.push(self.read_identifier());
        }
        fields
    }

    fn read_identifier(&mut self) -> String {
        let mut identifier = String::new();
        while let Some(ch) = self.peek() {
            if is_identifier_char(ch) {
                identifier.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        identifier
    }

    fn read_number(&mut self) -> Result<TokenType> {
        let mut number = String::new();
        if let Some(sign @ ('+' | '-')) = self.peek() {
            number.push(sign);
            self.advance();
        }
        while let Some(ch) = self.peek() {
            let exponent_sign = (ch == '+' || ch == '-') && number.ends_with(['e', 'E']);
            if ch.is_ascii_alphanumeric() || ch == '.' || ch == '_' || exponent_sign {
                number.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        let cleaned = number.replace('_', "");
        if !self.number_regex.is_match(&cleaned) {
            return Err(SyntaxError::new(self.line, format!("bad number syntax: {}", number)));
        }
        if cleaned.contains(['.', 'e', 'E']) {
            cleaned
                .parse()
                .map(TokenType::Float)
                .map_err(|_| SyntaxError::new(self.line, format!("bad number syntax: {}", number)))
        } else {
            cleaned
                .parse()
                .map(TokenType::Integer)
                .map_err(|_| SyntaxError::new(self.line, format!("integer out of range: {}", number)))
        }
    }

    fn read_string(&mut self) -> Result<String> {
        let mut value = String::new();
        let mut escaped = false;

        while let Some(ch) = self.peek() {
            if escaped {
                match ch {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '\\' => value.push('\\'),
                    '"' => value.push('"'),
                    '\'' => value.push('\''),
                    _ => {
                        return Err(SyntaxError::new(
                            self.line,
                            format!("unknown escape sequence: \\{}", ch),
                        ));
                    }
                }
                escaped = false;
                self.advance();
            } else if ch == '\\' {
                escaped = true;
                self.advance();
            } else if ch == '"' {
                self.advance(); // consume closing quote
                return Ok(value);
            } else if ch == '\n' {
                break;
            } else {
                value.push(ch);
                self.advance();
            }
        }

        Err(SyntaxError::new(self.line, "unterminated quoted string"))
    }

    fn read_raw_string(&mut self) -> Result<String> {
        let start_line = self.line;
        let mut value = String::new();
        while let Some(ch) = self.peek() {
            self.advance();
            if ch == '`' {
                return Ok(value);
            }
            value.push(ch);
        }
        Err(SyntaxError::new(start_line, "unterminated raw quoted string"))
    }

    /// Skip spaces and newlines inside an action; true if anything was skipped.
    fn skip_whitespace(&mut self) -> bool {
        let start = self.position;
        while self.peek().map_or(false, is_space) {
            self.advance();
        }
        self.position > start
    }

    fn advance(&mut self) -> char {
        if self.position < self.input.len() {
            let ch = self.input[self.position];
            self.position += 1;
            if ch == '\n' {
                self.line += 1;
            }
            ch
        } else {
            '\0'
        }
    }

    fn advance_by(&mut self, count: usize) {
        for _ in 0..count {
            self.advance();
        }
    }

    fn starts_with(&self, pattern: &str) -> bool {
        pattern
            .chars()
            .enumerate()
            .all(|(i, c)| self.char_at(self.position + i) == Some(c))
    }

    fn char_at(&self, index: usize) -> Option<char> {
        self.input.get(index).copied()
    }

    fn peek(&self) -> Option<char> {
        self.char_at(self.position)
    }

    fn peek_next(&self) -> Option<char> {
        self.char_at(self.position + 1)
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }
}

fn is_space(ch: char) -> bool {
    ch == ' ' || ch == '\t' || ch == '\n' || ch == '\r'
}

fn is_identifier_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<TokenType> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.token_type)
            .collect()
    }

    #[test]
    fn test_text_and_action() {
        assert_eq!(
            lex("Hello {{ .User.Name }}!"),
            vec![
                TokenType::Text("Hello ".to_string()),
                TokenType::LeftDelim,
                TokenType::Field(vec!["User".to_string(), "Name".to_string()]),
                TokenType::RightDelim,
                TokenType::Text("!".to_string()),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_template_invocation() {
        assert_eq!(
            lex(r#"{{template "./nav" .}}"#),
            vec![
                TokenType::LeftDelim,
                TokenType::Template,
                TokenType::String("./nav".to_string()),
                TokenType::Dot,
                TokenType::RightDelim,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_trim_markers() {
        assert_eq!(
            lex("a  \n {{- 1 -}} \n b"),
            vec![
                TokenType::Text("a".to_string()),
                TokenType::LeftDelim,
                TokenType::Integer(1),
                TokenType::RightDelim,
                TokenType::Text("b".to_string()),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_negative_number_is_not_a_trim_marker() {
        assert_eq!(
            lex("{{-3}}"),
            vec![TokenType::LeftDelim, TokenType::Integer(-3), TokenType::RightDelim, TokenType::Eof]
        );
    }

    #[test]
    fn test_comments_produce_no_tokens() {
        assert_eq!(
            lex("a {{/* note */}} b {{- /* trimmed */ -}} c"),
            vec![
                TokenType::Text("a ".to_string()),
                TokenType::Text(" b".to_string()),
                TokenType::Text("c".to_string()),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_variables_and_declarations() {
        assert_eq!(
            lex("{{ range $i, $e := .Items }}{{ $e.Name }}{{ $ }}"),
            vec![
                TokenType::LeftDelim,
                TokenType::Range,
                TokenType::Variable { name: "i".to_string(), fields: vec![] },
                TokenType::Comma,
                TokenType::Variable { name: "e".to_string(), fields: vec![] },
                TokenType::Declare,
                TokenType::Field(vec!["Items".to_string()]),
                TokenType::RightDelim,
                TokenType::LeftDelim,
                TokenType::Variable { name: "e".to_string(), fields: vec!["Name".to_string()] },
                TokenType::RightDelim,
                TokenType::LeftDelim,
                TokenType::Variable { name: String::new(), fields: vec![] },
                TokenType::RightDelim,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            lex(r#"{{ print 1.5 "a\"b" `raw\n` true nil }}"#)[1..7].to_vec(),
            vec![
                TokenType::Identifier("print".to_string()),
                TokenType::Float(1.5),
                TokenType::String("a\"b".to_string()),
                TokenType::String("raw\\n".to_string()),
                TokenType::Boolean(true),
                TokenType::Nil,
            ]
        );
    }

    #[test]
    fn test_lexer_errors() {
        assert!(Lexer::new("{{ .a ").tokenize().is_err());
        assert!(Lexer::new("{{ \"open }}").tokenize().is_err());
        assert!(Lexer::new("{{/* open").tokenize().is_err());
        assert!(Lexer::new("{{ 1x }}").tokenize().is_err());
        let err = Lexer::new("line one\n{{ # }}").tokenize().unwrap_err();
        assert_eq!(err.line, 2);
    }
}
