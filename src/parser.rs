//! Recursive descent parser for template text

use crate::ast::*;
use crate::error::SyntaxError;
use crate::funcs::FuncMap;
use crate::lexer::{Lexer, Token, TokenType};
use serde_json::{Number, Value};

type Result<T> = std::result::Result<T, SyntaxError>;

/// Result of parsing one template text: its own tree plus every named
/// sub-template it defines with `define` or `block`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTemplate {
    pub tree: Tree,
    pub definitions: Vec<Tree>,
}

/// Parse `text` into a tree called `name`. Function names are not checked.
pub fn parse(name: &str, text: &str) -> Result<ParsedTemplate> {
    let tokens = Lexer::new(text).tokenize()?;
    Parser::new(tokens).parse(name)
}

/// Parse `text`, rejecting calls to functions that are neither builtins nor
/// in `functions`.
pub fn parse_with_functions(name: &str, text: &str, functions: &FuncMap) -> Result<ParsedTemplate> {
    let tokens = Lexer::new(text).tokenize()?;
    Parser::new(tokens).with_functions(functions).parse(name)
}

/// How a list of nodes was terminated.
enum ListEnd {
    Eof,
    End,
    Else,
    ElseIf,
}

#[derive(Clone, Copy, PartialEq)]
enum BranchKind {
    If,
    Range,
    With,
}

pub struct Parser<'f> {
    tokens: Vec<Token>,
    current: usize,
    definitions: Vec<Tree>,
    vars: Vec<String>,
    nesting: usize,
    functions: Option<&'f FuncMap>,
}

impl<'f> Parser<'f> {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            definitions: Vec::new(),
            vars: vec![String::new()],
            nesting: 0,
            functions: None,
        }
    }

    pub fn with_functions(mut self, functions: &'f FuncMap) -> Self {
        self.functions = Some(functions);
        self
    }

    pub fn parse(mut self, name: &str) -> Result<ParsedTemplate> {
        let (root, end) = self.parse_list()?;
        match end {
            ListEnd::Eof => {}
            ListEnd::End => return Err(self.error("unexpected {{end}}")),
            ListEnd::Else | ListEnd::ElseIf => return Err(self.error("unexpected {{else}}")),
        }

        Ok(ParsedTemplate {
            tree: Tree::new(name, root),
            definitions: self.definitions,
        })
    }

    fn parse_list(&mut self) -> Result<(Vec<Node>, ListEnd)> {
        let mut nodes = Vec::new();

        loop {
            let token = self.peek().clone();
            match token.token_type {
                TokenType::Eof => return Ok((nodes, ListEnd::Eof)),
                TokenType::Text(text) => {
                    self.advance();
                    nodes.push(Node::Text(text));
                }
                TokenType::LeftDelim => {
                    self.advance();
                    let line = token.line;
                    match self.peek().token_type.clone() {
                        TokenType::End => {
                            self.advance();
                            self.consume(TokenType::RightDelim, "Expected }} after end")?;
                            return Ok((nodes, ListEnd::End));
                        }
                        TokenType::Else => {
                            self.advance();
                            if self.match_token(&TokenType::If) {
                                return Ok((nodes, ListEnd::ElseIf));
                            }
                            self.consume(TokenType::RightDelim, "Expected }} after else")?;
                            return Ok((nodes, ListEnd::Else));
                        }
                        TokenType::If => {
                            self.advance();
                            nodes.push(self.parse_branch(BranchKind::If, line)?);
                        }
                        TokenType::Range => {
                            self.advance();
                            nodes.push(self.parse_branch(BranchKind::Range, line)?);
                        }
                        TokenType::With => {
                            self.advance();
                            nodes.push(self.parse_branch(BranchKind::With, line)?);
                        }
                        TokenType::Define => {
                            self.advance();
                            self.parse_define(line)?;
                        }
                        TokenType::Template => {
                            self.advance();
                            nodes.push(self.parse_template(line)?);
                        }
                        TokenType::Block => {
                            self.advance();
                            nodes.push(self.parse_block(line)?);
                        }
                        _ => {
                            let pipe = self.parse_pipeline(true, 1)?;
                            self.consume(TokenType::RightDelim, "Expected }} to close action")?;
                            nodes.push(Node::Action { line, pipe });
                        }
                    }
                }
                other => {
                    return Err(SyntaxError::new(token.line, format!("unexpected {} in input", other)));
                }
            }
        }
    }

    fn parse_branch(&mut self, kind: BranchKind, line: usize) -> Result<Node> {
        let mark = self.vars.len();
        let max_vars = if kind == BranchKind::Range { 2 } else { 1 };
        let pipe = self.parse_pipeline(true, max_vars)?;
        self.consume(TokenType::RightDelim, "Expected }} after control pipeline")?;

        self.nesting += 1;
        let (list, end) = self.parse_list()?;
        let else_list = match end {
            ListEnd::End => None,
            ListEnd::Else => {
                let (else_list, else_end) = self.parse_list()?;
                if !matches!(else_end, ListEnd::End) {
                    return Err(SyntaxError::new(line, "expected {{end}} after {{else}} branch"));
                }
                Some(else_list)
            }
            ListEnd::ElseIf if kind == BranchKind::If => {
                let else_line = self.previous().line;
                Some(vec![self.parse_branch(BranchKind::If, else_line)?])
            }
            ListEnd::ElseIf => {
                return Err(SyntaxError::new(line, "{{else if}} is only allowed inside {{if}}"));
            }
            ListEnd::Eof => return Err(SyntaxError::new(line, "unexpected EOF: missing {{end}}")),
        };
        self.nesting -= 1;
        self.vars.truncate(mark);

        let branch = Branch { line, pipe, list, else_list };
        Ok(match kind {
            BranchKind::If => Node::If(branch),
            BranchKind::Range => Node::Range(branch),
            BranchKind::With => Node::With(branch),
        })
    }

    fn parse_define(&mut self, line: usize) -> Result<()> {
        if self.nesting > 0 {
            return Err(SyntaxError::new(line, "{{define}} is only allowed at the top level"));
        }
        let name = self.parse_template_name("define")?;
        self.consume(TokenType::RightDelim, "Expected }} after define")?;
        let root = self.parse_body(line, "define")?;
        self.add_definition(Tree::new(name, root), line)
    }

    fn parse_block(&mut self, line: usize) -> Result<Node> {
        let name = self.parse_template_name("block")?;
        let pipe = self.parse_pipeline(false, 0)?;
        self.consume(TokenType::RightDelim, "Expected }} after block")?;
        let root = self.parse_body(line, "block")?;
        self.add_definition(Tree::new(name.clone(), root), line)?;
        Ok(Node::Template {
            line,
            name,
            pipe: Some(pipe),
        })
    }

    /// Body of a named template: its own variable scope, terminated by `{{end}}`.
    fn parse_body(&mut self, line: usize, context: &str) -> Result<Vec<Node>> {
        let outer_vars = std::mem::replace(&mut self.vars, vec![String::new()]);
        self.nesting += 1;
        let (root, end) = self.parse_list()?;
        self.nesting -= 1;
        self.vars = outer_vars;
        match end {
            ListEnd::End => Ok(root),
            ListEnd::Eof => Err(SyntaxError::new(line, format!("unexpected EOF in {{{{{}}}}}", context))),
            ListEnd::Else | ListEnd::ElseIf => {
                Err(SyntaxError::new(line, format!("unexpected {{{{else}}}} in {{{{{}}}}}", context)))
            }
        }
    }

    fn add_definition(&mut self, tree: Tree, line: usize) -> Result<()> {
        if self.definitions.iter().any(|t| t.name == tree.name) {
            return Err(SyntaxError::new(
                line,
                format!("template: multiple definition of template {:?}", tree.name),
            ));
        }
        self.definitions.push(tree);
        Ok(())
    }

    fn parse_template(&mut self, line: usize) -> Result<Node> {
        let name = self.parse_template_name("template")?;
        let pipe = if self.check(&TokenType::RightDelim) {
            None
        } else {
            Some(self.parse_pipeline(false, 0)?)
        };
        self.consume(TokenType::RightDelim, "Expected }} after template invocation")?;
        Ok(Node::Template { line, name, pipe })
    }

    fn parse_template_name(&mut self, context: &str) -> Result<String> {
        let token = self.advance().clone();
        match token.token_type {
            TokenType::String(name) => Ok(name),
            other => Err(SyntaxError::new(
                token.line,
                format!("unexpected {} in {}: expected a quoted template name", other, context),
            )),
        }
    }

    fn parse_pipeline(&mut self, allow_decl: bool, max_vars: usize) -> Result<Pipeline> {
        let line = self.peek().line;
        let mut decl = Vec::new();
        let mut is_assign = false;

        if allow_decl && self.is_declaration_start(max_vars) {
            decl.push(self.parse_plain_variable()?);
            if self.match_token(&TokenType::Comma) {
                decl.push(self.parse_plain_variable()?);
            }
            if self.match_token(&TokenType::Assign) {
                is_assign = true;
                for var in &decl {
                    if !self.vars.contains(var) {
                        return Err(SyntaxError::new(line, format!("undefined variable \"${}\"", var)));
                    }
                }
            } else {
                self.consume(TokenType::Declare, "Expected := in variable declaration")?;
            }
        }

        let mut cmds = Vec::new();
        loop {
            cmds.push(self.parse_command()?);
            if !self.match_token(&TokenType::Pipe) {
                break;
            }
        }

        if !is_assign {
            self.vars.extend(decl.iter().cloned());
        }

        Ok(Pipeline { line, decl, is_assign, cmds })
    }

    fn is_declaration_start(&self, max_vars: usize) -> bool {
        let is_plain_var = |t: Option<&Token>| {
            matches!(t.map(|t| &t.token_type), Some(TokenType::Variable { fields, .. }) if fields.is_empty())
        };
        if !is_plain_var(self.tokens.get(self.current)) {
            return false;
        }
        match self.tokens.get(self.current + 1).map(|t| &t.token_type) {
            Some(TokenType::Declare) | Some(TokenType::Assign) => true,
            Some(TokenType::Comma) => max_vars >= 2 && is_plain_var(self.tokens.get(self.current + 2)),
            _ => false,
        }
    }

    fn parse_plain_variable(&mut self) -> Result<String> {
        let token = self.advance().clone();
        match token.token_type {
            TokenType::Variable { name, fields } if fields.is_empty() => Ok(name),
            other => Err(SyntaxError::new(token.line, format!("expected variable, found {}", other))),
        }
    }

    fn parse_command(&mut self) -> Result<Command> {
        let mut args = Vec::new();
        while !matches!(
            self.peek().token_type,
            TokenType::Pipe | TokenType::RightDelim | TokenType::RightParen | TokenType::Eof
        ) {
            args.push(self.parse_operand()?);
        }
        if args.is_empty() {
            return Err(self.error("missing value for command"));
        }
        Ok(Command { args })
    }

    fn parse_operand(&mut self) -> Result<Arg> {
        let token = self.advance().clone();
        let arg = match token.token_type {
            TokenType::Dot => Arg::Dot,
            TokenType::Field(path) => Arg::Field(path),
            TokenType::Variable { name, fields } => {
                if !self.vars.contains(&name) {
                    return Err(SyntaxError::new(token.line, format!("undefined variable \"${}\"", name)));
                }
                Arg::Variable { name, fields }
            }
            TokenType::String(s) => Arg::Constant(Value::String(s)),
            TokenType::Integer(i) => Arg::Constant(Value::from(i)),
            TokenType::Float(f) => {
                let number = Number::from_f64(f)
                    .ok_or_else(|| SyntaxError::new(token.line, format!("invalid number {}", f)))?;
                Arg::Constant(Value::Number(number))
            }
            TokenType::Boolean(b) => Arg::Constant(Value::Bool(b)),
            TokenType::Nil => Arg::Constant(Value::Null),
            TokenType::Identifier(name) => {
                if let Some(functions) = self.functions {
                    if !functions.is_defined(&name) {
                        return Err(SyntaxError::new(token.line, format!("function \"{}\" not defined", name)));
                    }
                }
                Arg::Function(name)
            }
            TokenType::LeftParen => {
                let pipe = self.parse_pipeline(false, 0)?;
                self.consume(TokenType::RightParen, "Expected ) to close parenthesized pipeline")?;
                Arg::Pipeline(Box::new(pipe))
            }
            other => {
                return Err(SyntaxError::new(token.line, format!("unexpected {} in operand", other)));
            }
        };
        Ok(arg)
    }

    fn match_token(&mut self, token_type: &TokenType) -> bool {
        if self.check(token_type) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, token_type: &TokenType) -> bool {
        if self.is_at_end() {
            false
        } else {
            std::mem::discriminant(&self.peek().token_type) == std::mem::discriminant(token_type)
        }
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().token_type, TokenType::Eof)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn consume(&mut self, token_type: TokenType, message: &str) -> Result<&Token> {
        if self.check(&token_type) {
            Ok(self.advance())
        } else {
            Err(SyntaxError::new(
                self.peek().line,
                format!("{}, found {}", message, self.peek().token_type),
            ))
        }
    }

    fn error(&self, message: &str) -> SyntaxError {
        SyntaxError::new(self.peek().line, message)
    }
}
