// src/stages/css.rs

//! A compiler for the stylesheet subset used by the project: variables,
//! nested rules with `&` parent references, `@media`/`@supports` nesting,
//! comments in both styles and vendor prefixing of a fixed property table.
//!
//! `@import` resolution happens before compilation (see the styles stage);
//! anything this module does not understand is reported as a [`CssError`]
//! with the offending line.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Properties that get vendor-prefixed copies.
const PREFIXED_PROPERTIES: &[(&str, &[&str])] = &[
    ("animation", &["-webkit-"]),
    ("appearance", &["-webkit-", "-moz-"]),
    ("backface-visibility", &["-webkit-"]),
    ("hyphens", &["-webkit-", "-moz-"]),
    ("transform", &["-webkit-"]),
    ("transition", &["-webkit-"]),
    ("user-select", &["-webkit-", "-moz-"]),
];

/// At-rules whose children inherit the enclosing selector.
const CONDITIONAL_AT_RULES: &[&str] = &["media", "supports"];

/// Statement at-rules passed through untouched at the top level.
const PASSTHROUGH_STATEMENTS: &[&str] = &["charset", "import", "namespace"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStyle {
    Expanded,
    Compressed,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("line {}: {message}", line + 1)]
pub struct CssError {
    /// 0-based line in the compiled input.
    pub line: u32,
    pub message: String,
}

impl CssError {
    fn new(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Compiled stylesheet plus, per output line, the input line it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledCss {
    pub css: String,
    pub line_origins: Vec<Option<u32>>,
}

#[derive(Debug, Clone)]
enum Node {
    Block {
        prelude: String,
        line: u32,
        children: Vec<Node>,
    },
    Declaration {
        property: String,
        value: String,
        line: u32,
    },
    Variable {
        name: String,
        value: String,
        line: u32,
    },
    Statement {
        text: String,
        line: u32,
    },
}

#[derive(Debug, Clone)]
struct Declaration {
    property: String,
    value: String,
    line: u32,
}

#[derive(Debug, Clone)]
enum Block {
    Rule {
        selectors: Vec<String>,
        declarations: Vec<Declaration>,
        line: u32,
    },
    At {
        header: String,
        declarations: Vec<Declaration>,
        children: Vec<Block>,
        line: u32,
    },
    Statement {
        text: String,
        line: u32,
    },
}

pub fn compile(source: &str, style: OutputStyle) -> Result<CompiledCss, CssError> {
    let cleaned = strip_comments(source);
    let chars: Vec<char> = cleaned.chars().collect();
    let mut parser = Parser {
        chars: &chars,
        pos: 0,
        line: 0,
    };
    let nodes = parser.parse_block(0)?;

    let mut blocks = Vec::new();
    let mut vars = HashMap::new();
    flatten(&nodes, &[], &mut vars, &mut blocks)?;

    let mut emitter = Emitter::new(style);
    emitter.blocks(&blocks, 0);
    Ok(emitter.finish())
}

/// Replace comments with spaces, keeping newlines so line numbers survive.
fn strip_comments(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;
    let mut quote: Option<char> = None;
    let mut paren_depth = 0usize;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(n) = next {
                    out.push(n);
                    i += 1;
                }
            } else if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match (c, next) {
            ('"' | '\'', _) => {
                quote = Some(c);
                out.push(c);
                i += 1;
            }
            ('/', Some('*')) => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    out.push(if chars[i] == '\n' { '\n' } else { ' ' });
                    i += 1;
                }
                i += 2;
                out.push(' ');
            }
            ('/', Some('/')) if paren_depth == 0 => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            _ => {
                if c == '(' {
                    paren_depth += 1;
                } else if c == ')' {
                    paren_depth = paren_depth.saturating_sub(1);
                }
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

struct Parser<'a> {
    chars: &'a [char],
    pos: usize,
    line: u32,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn parse_block(&mut self, depth: usize) -> Result<Vec<Node>, CssError> {
        let mut nodes = Vec::new();

        loop {
            self.skip_whitespace();
            let start_line = self.line;

            match self.peek() {
                None if depth > 0 => {
                    return Err(CssError::new(self.line, "unclosed block: expected '}'"));
                }
                None => return Ok(nodes),
                Some('}') if depth == 0 => {
                    return Err(CssError::new(self.line, "unexpected '}'"));
                }
                Some('}') => {
                    self.bump();
                    return Ok(nodes);
                }
                Some(';') => {
                    self.bump();
                    continue;
                }
                Some(_) => {}
            }

            let (prelude, terminator) = self.read_prelude()?;
            let prelude = collapse_whitespace(&prelude);

            match terminator {
                Some('{') => {
                    self.bump();
                    if prelude.is_empty() {
                        return Err(CssError::new(start_line, "block without selector"));
                    }
                    let children = self.parse_block(depth + 1)?;
                    nodes.push(Node::Block {
                        prelude,
                        line: start_line,
                        children,
                    });
                }
                terminator => {
                    if terminator == Some(';') {
                        self.bump();
                    }
                    nodes.push(classify_statement(prelude, start_line)?);
                }
            }
        }
    }

    /// Read up to a top-level `{`, `;` or `}` (not consumed).
    fn read_prelude(&mut self) -> Result<(String, Option<char>), CssError> {
        let mut text = String::new();
        let mut quote: Option<char> = None;
        let mut depth = 0usize;

        while let Some(c) = self.peek() {
            if let Some(q) = quote {
                text.push(c);
                self.bump();
                if c == '\\' {
                    if let Some(n) = self.bump() {
                        text.push(n);
                    }
                } else if c == q {
                    quote = None;
                }
                continue;
            }

            match c {
                '"' | '\'' => quote = Some(c),
                '(' | '[' => depth += 1,
                ')' | ']' => depth = depth.saturating_sub(1),
                '{' | ';' | '}' if depth == 0 => return Ok((text, Some(c))),
                // Interpolation is not supported; reject before `#{` opens a block.
                '#' if self.chars.get(self.pos + 1) == Some(&'{') => {
                    return Err(CssError::new(self.line, "interpolation '#{...}' is not supported"));
                }
                _ => {}
            }
            text.push(c);
            self.bump();
        }

        if quote.is_some() {
            return Err(CssError::new(self.line, "unterminated string"));
        }
        Ok((text, None))
    }
}

fn classify_statement(text: String, line: u32) -> Result<Node, CssError> {
    if text.starts_with('@') {
        return Ok(Node::Statement { text, line });
    }

    let Some((property, value)) = text.split_once(':') else {
        return Err(CssError::new(line, format!("expected declaration, found '{text}'")));
    };
    let property = property.trim().to_string();
    let value = value.trim().to_string();

    if property.is_empty() || value.is_empty() {
        return Err(CssError::new(line, format!("incomplete declaration '{text}'")));
    }

    if let Some(name) = property.strip_prefix('$') {
        let value = value.trim_end_matches("!default").trim().to_string();
        return Ok(Node::Variable {
            name: name.to_string(),
            value,
            line,
        });
    }

    Ok(Node::Declaration {
        property,
        value,
        line,
    })
}

fn at_rule_name(prelude: &str) -> &str {
    prelude
        .trim_start_matches('@')
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
}

fn flatten(
    nodes: &[Node],
    parents: &[String],
    vars: &mut HashMap<String, String>,
    out: &mut Vec<Block>,
) -> Result<(), CssError> {
    let start = out.len();
    let mut loose: Vec<Declaration> = Vec::new();
    let mut first_line = None;

    for node in nodes {
        match node {
            Node::Variable { name, value, line } => {
                let value = substitute(value, vars, *line)?;
                vars.insert(name.clone(), value);
            }
            Node::Declaration {
                property,
                value,
                line,
            } => {
                if parents.is_empty() {
                    return Err(CssError::new(*line, format!("declaration '{property}' outside of a rule")));
                }
                first_line.get_or_insert(*line);
                let value = substitute(value, vars, *line)?;
                push_prefixed(&mut loose, property, &value, *line);
            }
            Node::Statement { text, line } => {
                let name = at_rule_name(text);
                if !parents.is_empty() || !PASSTHROUGH_STATEMENTS.contains(&name) {
                    return Err(CssError::new(*line, format!("unsupported at-rule '@{name}'")));
                }
                out.push(Block::Statement {
                    text: text.clone(),
                    line: *line,
                });
            }
            Node::Block {
                prelude,
                line,
                children,
            } => {
                let prelude = substitute(prelude, vars, *line)?;

                if prelude.starts_with('@') {
                    let name = at_rule_name(&prelude);
                    let mut inner = Vec::new();

                    if CONDITIONAL_AT_RULES.contains(&name) {
                        flatten(children, parents, vars, &mut inner)?;
                        out.push(Block::At {
                            header: prelude.clone(),
                            declarations: Vec::new(),
                            children: inner,
                            line: *line,
                        });
                    } else {
                        let mut declarations = Vec::new();
                        let mut nested = Vec::new();
                        for child in children {
                            match child {
                                Node::Declaration {
                                    property,
                                    value,
                                    line,
                                } => {
                                    let value = substitute(value, vars, *line)?;
                                    push_prefixed(&mut declarations, property, &value, *line);
                                }
                                other => nested.push(other.clone()),
                            }
                        }
                        flatten(&nested, &[], vars, &mut inner)?;
                        out.push(Block::At {
                            header: prelude.clone(),
                            declarations,
                            children: inner,
                            line: *line,
                        });
                    }
                } else {
                    let selectors = combine_selectors(parents, &split_selectors(&prelude));
                    flatten(children, &selectors, vars, out)?;
                }
            }
        }
    }

    if !loose.is_empty() {
        out.insert(
            start,
            Block::Rule {
                selectors: parents.to_vec(),
                declarations: loose,
                line: first_line.unwrap_or_default(),
            },
        );
    }
    Ok(())
}

fn push_prefixed(out: &mut Vec<Declaration>, property: &str, value: &str, line: u32) {
    if let Some((_, prefixes)) = PREFIXED_PROPERTIES.iter().find(|(p, _)| *p == property) {
        for prefix in prefixes.iter() {
            out.push(Declaration {
                property: format!("{prefix}{property}"),
                value: value.to_string(),
                line,
            });
        }
    }
    out.push(Declaration {
        property: property.to_string(),
        value: value.to_string(),
        line,
    });
}

/// Replace `$name` references with their values.
fn substitute(text: &str, vars: &HashMap<String, String>, line: u32) -> Result<String, CssError> {
    if !text.contains('$') {
        return Ok(text.to_string());
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find('$') {
        out.push_str(&rest[..idx]);
        let after = &rest[idx + 1..];
        let len = after
            .find(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(after.len());
        let name = &after[..len];
        if name.is_empty() {
            out.push('$');
        } else {
            let value = vars
                .get(name)
                .ok_or_else(|| CssError::new(line, format!("undefined variable '${name}'")))?;
            out.push_str(value);
        }
        rest = &after[len..];
    }
    out.push_str(rest);
    Ok(out)
}

fn split_selectors(prelude: &str) -> Vec<String> {
    let mut selectors = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for c in prelude.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                selectors.push(collapse_whitespace(&current));
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    selectors.push(collapse_whitespace(&current));
    selectors.retain(|s| !s.is_empty());
    selectors
}

fn combine_selectors(parents: &[String], children: &[String]) -> Vec<String> {
    if parents.is_empty() {
        return children.to_vec();
    }
    let mut combined = Vec::with_capacity(parents.len() * children.len());
    for parent in parents {
        for child in children {
            if child.contains('&') {
                combined.push(child.replace('&', parent));
            } else {
                combined.push(format!("{parent} {child}"));
            }
        }
    }
    combined
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop optional whitespace outside of strings for compressed output.
fn compress(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let chars: Vec<char> = text.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if let Some(q) = quote {
            out.push(c);
            if c == q && chars.get(i.wrapping_sub(1)) != Some(&'\\') {
                quote = None;
            }
            continue;
        }
        if c == '"' || c == '\'' {
            quote = Some(c);
            out.push(c);
            continue;
        }
        if c == ' ' {
            let prev = out.chars().last();
            let next = chars.get(i + 1).copied();
            let tight = |ch: Option<char>| matches!(ch, Some(',' | '>' | '~' | '{' | '}' | ';'));
            if tight(prev) || tight(next) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

struct Emitter {
    style: OutputStyle,
    out: String,
    origins: Vec<Option<u32>>,
}

impl Emitter {
    fn new(style: OutputStyle) -> Self {
        Self {
            style,
            out: String::new(),
            origins: Vec::new(),
        }
    }

    fn line(&mut self, depth: usize, text: &str, origin: Option<u32>) {
        for _ in 0..depth {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
        self.origins.push(origin);
    }

    fn blocks(&mut self, blocks: &[Block], depth: usize) {
        for (i, block) in blocks.iter().enumerate() {
            if self.style == OutputStyle::Expanded && depth == 0 && i > 0 {
                self.line(0, "", None);
            }
            self.block(block, depth);
        }
    }

    fn block(&mut self, block: &Block, depth: usize) {
        match (self.style, block) {
            (OutputStyle::Compressed, Block::Statement { text, .. }) => {
                self.out.push_str(&compress(text));
                self.out.push(';');
            }
            (OutputStyle::Compressed, Block::Rule { selectors, declarations, .. }) => {
                self.out.push_str(&compress(&selectors.join(",")));
                self.out.push('{');
                self.out.push_str(&compressed_declarations(declarations));
                self.out.push('}');
            }
            (OutputStyle::Compressed, Block::At { header, declarations, children, .. }) => {
                self.out.push_str(&compress(header));
                self.out.push('{');
                self.out.push_str(&compressed_declarations(declarations));
                if !declarations.is_empty() && !children.is_empty() {
                    self.out.push(';');
                }
                for child in children {
                    self.block(child, depth + 1);
                }
                self.out.push('}');
            }
            (OutputStyle::Expanded, Block::Statement { text, line }) => {
                self.line(depth, &format!("{text};"), Some(*line));
            }
            (OutputStyle::Expanded, Block::Rule { selectors, declarations, line }) => {
                let last = selectors.len().saturating_sub(1);
                for (i, selector) in selectors.iter().enumerate() {
                    let text = if i == last {
                        format!("{selector} {{")
                    } else {
                        format!("{selector},")
                    };
                    self.line(depth, &text, Some(*line));
                }
                self.declarations(declarations, depth + 1);
                self.line(depth, "}", Some(*line));
            }
            (OutputStyle::Expanded, Block::At { header, declarations, children, line }) => {
                self.line(depth, &format!("{header} {{"), Some(*line));
                self.declarations(declarations, depth + 1);
                for child in children {
                    self.block(child, depth + 1);
                }
                self.line(depth, "}", Some(*line));
            }
        }
    }

    fn declarations(&mut self, declarations: &[Declaration], depth: usize) {
        for decl in declarations {
            self.line(depth, &format!("{}: {};", decl.property, decl.value), Some(decl.line));
        }
    }

    fn finish(self) -> CompiledCss {
        let line_origins = match self.style {
            OutputStyle::Compressed => Vec::new(),
            OutputStyle::Expanded => self.origins,
        };
        CompiledCss {
            css: self.out,
            line_origins,
        }
    }
}

fn compressed_declarations(declarations: &[Declaration]) -> String {
    declarations
        .iter()
        .map(|d| format!("{}:{}", d.property, compress(&d.value)))
        .collect::<Vec<_>>()
        .join(";")
}

impl fmt::Display for OutputStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputStyle::Expanded => "expanded",
            OutputStyle::Compressed => "compressed",
        })
    }
}
