//! The preprocessor: include handling, macro definitions, and conditional
//! compilation, layered over the tokenizer.
//!
//! The preprocessor maintains a stack of open files (pushed by `#include`),
//! a name → replacement-token-list macro table, and a conditional-
//! compilation stack. Tokens are handed out one logical line at a time;
//! a disabled `#if` branch is scanned only far enough to match its nested
//! blocks and is never macro-expanded.
//!
//! Include failures are configurable: strict mode fails the translation
//! unit with [`PreprocessorError::FileNotFound`]; permissive mode logs a
//! warning and treats the directive as a no-op, which keeps big dependency
//! graphs parseable when far headers are missing.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use scry_core::SearchPath;

use crate::ast::expr::{self, ExprValue};
use crate::parser::errors::ParseWarning;
use crate::token::{Punct, SourceLoc, Token, TokenKind};
use crate::tokenizer::{Lexer, TokenError};

/// Hard cap on `#include` nesting. Cycle prevention is the headers'
/// business (include guards); this only turns a runaway recursion into an
/// error.
const MAX_INCLUDE_DEPTH: usize = 64;

/// Hard cap on recursive macro expansion.
const MAX_EXPANSION_DEPTH: usize = 32;

/// Caller-set preprocessor behavior.
#[derive(Debug, Default, Clone)]
pub struct PreprocessorConfig {
    /// Directories searched for include files.
    pub search_path: SearchPath,
    /// Treat an unresolvable `#include` as a warning and a no-op instead
    /// of a fatal error.
    pub permissive_includes: bool,
}

/// One `#define`: a name, optional parameter list, and replacement tokens.
#[derive(Debug, Clone)]
pub struct MacroDef {
    pub name: String,
    /// `Some` for function-like macros, even with zero parameters.
    pub params: Option<Vec<String>>,
    pub body: Vec<Token>,
    pub loc: SourceLoc,
}

impl MacroDef {
    /// The replacement text, reassembled for manifest records.
    pub fn definition_text(&self) -> String {
        let parts: Vec<&str> = self.body.iter().map(|t| t.text.as_str()).collect();
        parts.join(" ")
    }
}

#[derive(Debug, Error)]
pub enum PreprocessorError {
    #[error("cannot locate include file \"{filename}\" (included at {loc})")]
    FileNotFound { filename: String, loc: SourceLoc },

    /// A conditional block was still open when its file ended.
    #[error("unexpected end of file: unterminated conditional block opened at {opened}")]
    UnexpectedEof { opened: SourceLoc },

    #[error("#else/#elif/#endif without matching #if at {0}")]
    MismatchedConditional(SourceLoc),

    #[error("malformed directive at {loc}: {message}")]
    BadDirective { loc: SourceLoc, message: String },

    #[error("{message} (#error at {loc})")]
    UserError { message: String, loc: SourceLoc },

    #[error("include depth limit exceeded at {0}")]
    IncludeDepth(SourceLoc),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("i/o error reading {file}: {source}")]
    Io {
        file: String,
        source: std::io::Error,
    },
}

/// One file on the include stack, already comment-stripped and split into
/// logical (continuation-joined) lines.
#[derive(Debug)]
struct FileState {
    label: Arc<str>,
    directory: PathBuf,
    lines: Vec<(u32, String)>,
    pos: usize,
    /// Conditional-stack depth when this file was entered; every frame
    /// above it must be closed before the file ends.
    cond_base: usize,
}

#[derive(Debug)]
struct CondFrame {
    /// Tokens flow only while this and every enclosing frame are active.
    active: bool,
    /// Some branch of this if-chain has already been taken.
    taken: bool,
    seen_else: bool,
    opened: SourceLoc,
}

/// The preprocessor itself. Pull tokens with
/// [`next_token`](Self::next_token); it returns an EOF token forever once
/// every pushed file is exhausted.
#[derive(Debug)]
pub struct Preprocessor {
    config: PreprocessorConfig,
    files: Vec<FileState>,
    conds: Vec<CondFrame>,
    macros: HashMap<String, MacroDef>,
    pending: VecDeque<Token>,
    warnings: Vec<ParseWarning>,
    files_read: usize,
    last_loc: SourceLoc,
}

impl Preprocessor {
    pub fn new(config: PreprocessorConfig) -> Self {
        Preprocessor {
            config,
            files: Vec::new(),
            conds: Vec::new(),
            macros: HashMap::new(),
            pending: VecDeque::new(),
            warnings: Vec::new(),
            files_read: 0,
            last_loc: SourceLoc::internal(),
        }
    }

    /// The macro table, for manifest extraction after parsing.
    pub fn macros(&self) -> &HashMap<String, MacroDef> {
        &self.macros
    }

    /// Warnings collected so far; drained by the parser.
    pub fn take_warnings(&mut self) -> Vec<ParseWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// Number of files read, including headers pulled in by `#include`.
    pub fn files_read(&self) -> usize {
        self.files_read
    }

    /// Drop all open files, conditional state, and buffered tokens after a
    /// fatal error, so the next translation unit starts clean. Macro
    /// definitions survive across units.
    pub fn abandon_unit(&mut self) {
        self.files.clear();
        self.conds.clear();
        self.pending.clear();
    }

    /// Define a macro programmatically, as if by `#define`.
    pub fn predefine(&mut self, name: &str, value: &str) -> Result<(), PreprocessorError> {
        let loc = SourceLoc::internal();
        let body = Lexer::tokenize(value, loc.file.clone(), 1)?;
        self.macros.insert(
            name.to_string(),
            MacroDef {
                name: name.to_string(),
                params: None,
                body,
                loc,
            },
        );
        Ok(())
    }

    /// Open the root translation unit.
    pub fn push_file(&mut self, path: &Path) -> Result<(), PreprocessorError> {
        let text = std::fs::read_to_string(path).map_err(|source| PreprocessorError::Io {
            file: path.display().to_string(),
            source,
        })?;
        let directory = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        self.push_source(&path.display().to_string(), &text, directory)
    }

    /// Open a unit from in-memory text.
    pub fn push_source(
        &mut self,
        label: &str,
        text: &str,
        directory: PathBuf,
    ) -> Result<(), PreprocessorError> {
        if self.files.len() >= MAX_INCLUDE_DEPTH {
            return Err(PreprocessorError::IncludeDepth(self.last_loc.clone()));
        }
        let label: Arc<str> = Arc::from(label);
        let stripped = strip_comments(text, &label)?;
        let lines = logical_lines(&stripped);
        self.files.push(FileState {
            label,
            directory,
            lines,
            pos: 0,
            cond_base: self.conds.len(),
        });
        self.files_read += 1;
        Ok(())
    }

    /// The next preprocessed token. Returns an EOF token once all input is
    /// exhausted (and keeps returning it).
    pub fn next_token(&mut self) -> Result<Token, PreprocessorError> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                self.last_loc = token.loc.clone();
                return Ok(token);
            }
            if self.files.is_empty() {
                return Ok(Token::eof(self.last_loc.clone()));
            }
            self.advance_line()?;
        }
    }

    /// True when every conditional frame is currently active.
    fn active(&self) -> bool {
        self.conds.iter().all(|frame| frame.active)
    }

    /// Process the next logical line of the innermost file.
    fn advance_line(&mut self) -> Result<(), PreprocessorError> {
        let Some(file) = self.files.last_mut() else {
            return Ok(());
        };
        if file.pos >= file.lines.len() {
            if self.conds.len() > file.cond_base {
                let opened = self.conds.last().map(|f| f.opened.clone());
                self.conds.truncate(file.cond_base);
                self.files.pop();
                return Err(PreprocessorError::UnexpectedEof {
                    opened: opened.unwrap_or_else(SourceLoc::internal),
                });
            }
            self.files.pop();
            return Ok(());
        }

        let (line_no, text) = file.lines[file.pos].clone();
        file.pos += 1;
        let label = file.label.clone();
        let directory = file.directory.clone();

        let trimmed = text.trim_start();
        if let Some(directive) = trimmed.strip_prefix('#') {
            let col = (text.len() - trimmed.len()) as u32 + 1;
            let loc = SourceLoc::new(label.clone(), line_no, col);
            return self.handle_directive(directive, loc, &directory);
        }

        if !self.active() {
            return Ok(());
        }
        let tokens = Lexer::tokenize(&text, label, line_no)?;
        let expanded = self.expand_tokens(tokens, &mut Vec::new());
        self.pending.extend(expanded);
        Ok(())
    }

    // ========================================================================
    // Directives
    // ========================================================================

    fn handle_directive(
        &mut self,
        directive: &str,
        loc: SourceLoc,
        directory: &Path,
    ) -> Result<(), PreprocessorError> {
        let directive = directive.trim_start();
        let (name, rest) = split_directive(directive);

        // While a conditional branch is disabled, only block structure is
        // tracked; nothing else is even looked at.
        if !self.active() {
            match name {
                "if" | "ifdef" | "ifndef" => {
                    self.conds.push(CondFrame {
                        active: false,
                        taken: true,
                        seen_else: false,
                        opened: loc,
                    });
                }
                "elif" => self.handle_elif(rest, loc)?,
                "else" => self.handle_else(loc)?,
                "endif" => self.handle_endif(loc)?,
                _ => {}
            }
            return Ok(());
        }

        match name {
            "define" => self.handle_define(rest, loc),
            "undef" => {
                let name = rest.trim();
                self.macros.remove(name);
                Ok(())
            }
            "include" => self.handle_include(rest, loc, directory),
            "if" => {
                let cond = self.evaluate_condition(rest, &loc)?;
                self.conds.push(CondFrame {
                    active: cond,
                    taken: cond,
                    seen_else: false,
                    opened: loc,
                });
                Ok(())
            }
            "ifdef" | "ifndef" => {
                let target = rest.trim();
                if target.is_empty() {
                    return Err(PreprocessorError::BadDirective {
                        loc,
                        message: format!("#{} requires a name", name),
                    });
                }
                let defined = self.macros.contains_key(target);
                let cond = if name == "ifdef" { defined } else { !defined };
                self.conds.push(CondFrame {
                    active: cond,
                    taken: cond,
                    seen_else: false,
                    opened: loc,
                });
                Ok(())
            }
            "elif" => self.handle_elif(rest, loc),
            "else" => self.handle_else(loc),
            "endif" => self.handle_endif(loc),
            "pragma" => Ok(()),
            "error" => Err(PreprocessorError::UserError {
                message: rest.trim().to_string(),
                loc,
            }),
            "warning" => {
                self.warnings
                    .push(ParseWarning::new(rest.trim().to_string(), loc));
                Ok(())
            }
            other => {
                self.warnings.push(ParseWarning::new(
                    format!("ignoring unknown directive #{}", other),
                    loc,
                ));
                Ok(())
            }
        }
    }

    fn handle_elif(&mut self, rest: &str, loc: SourceLoc) -> Result<(), PreprocessorError> {
        // The frame itself must exist even while skipping.
        let Some(frame) = self.conds.last() else {
            return Err(PreprocessorError::MismatchedConditional(loc));
        };
        if frame.seen_else {
            return Err(PreprocessorError::MismatchedConditional(loc));
        }
        let taken = frame.taken;
        // Evaluate only when this branch could possibly fire; a disabled
        // enclosing block's condition may reference macros that were never
        // defined.
        let enclosing_active = self.conds.iter().rev().skip(1).all(|frame| frame.active);
        let active = if !taken && enclosing_active {
            self.evaluate_condition(rest, &loc)?
        } else {
            false
        };
        if let Some(frame) = self.conds.last_mut() {
            frame.active = active;
            frame.taken |= active;
        }
        Ok(())
    }

    fn handle_else(&mut self, loc: SourceLoc) -> Result<(), PreprocessorError> {
        let enclosing_active = self.conds.iter().rev().skip(1).all(|frame| frame.active);
        let Some(frame) = self.conds.last_mut() else {
            return Err(PreprocessorError::MismatchedConditional(loc));
        };
        if frame.seen_else {
            return Err(PreprocessorError::MismatchedConditional(loc));
        }
        frame.seen_else = true;
        frame.active = enclosing_active && !frame.taken;
        frame.taken = true;
        Ok(())
    }

    fn handle_endif(&mut self, loc: SourceLoc) -> Result<(), PreprocessorError> {
        let base = self.files.last().map(|f| f.cond_base).unwrap_or(0);
        if self.conds.len() <= base {
            return Err(PreprocessorError::MismatchedConditional(loc));
        }
        self.conds.pop();
        Ok(())
    }

    fn handle_define(&mut self, rest: &str, loc: SourceLoc) -> Result<(), PreprocessorError> {
        let rest = rest.trim_start();
        let name_end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        let name = &rest[..name_end];
        if name.is_empty() {
            return Err(PreprocessorError::BadDirective {
                loc,
                message: "#define requires a name".to_string(),
            });
        }
        let after = &rest[name_end..];

        // A parameter list only counts when the paren hugs the name.
        let (params, body_text) = if let Some(after_paren) = after.strip_prefix('(') {
            let close = after_paren.find(')').ok_or_else(|| PreprocessorError::BadDirective {
                loc: loc.clone(),
                message: "unterminated macro parameter list".to_string(),
            })?;
            let params: Vec<String> = after_paren[..close]
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            (Some(params), &after_paren[close + 1..])
        } else {
            (None, after)
        };

        let body = Lexer::tokenize(body_text.trim(), loc.file.clone(), loc.line)?;
        self.macros.insert(
            name.to_string(),
            MacroDef {
                name: name.to_string(),
                params,
                body,
                loc,
            },
        );
        Ok(())
    }

    fn handle_include(
        &mut self,
        rest: &str,
        loc: SourceLoc,
        directory: &Path,
    ) -> Result<(), PreprocessorError> {
        let rest = rest.trim();
        let (filename, quoted) = if let Some(inner) = rest.strip_prefix('"') {
            match inner.find('"') {
                Some(end) => (&inner[..end], true),
                None => {
                    return Err(PreprocessorError::BadDirective {
                        loc,
                        message: "malformed #include".to_string(),
                    })
                }
            }
        } else if let Some(inner) = rest.strip_prefix('<') {
            match inner.find('>') {
                Some(end) => (&inner[..end], false),
                None => {
                    return Err(PreprocessorError::BadDirective {
                        loc,
                        message: "malformed #include".to_string(),
                    })
                }
            }
        } else {
            return Err(PreprocessorError::BadDirective {
                loc,
                message: "malformed #include".to_string(),
            });
        };

        // Quoted includes try the including file's own directory first.
        let mut resolved = None;
        if quoted {
            let candidate = directory.join(filename);
            if candidate.exists() {
                resolved = Some(candidate);
            }
        }
        let resolved = resolved.or_else(|| self.config.search_path.find_file(filename));

        let Some(path) = resolved else {
            if self.config.permissive_includes {
                warn!("cannot locate include file \"{}\" at {}", filename, loc);
                self.warnings.push(ParseWarning::new(
                    format!("cannot locate include file \"{}\"", filename),
                    loc,
                ));
                return Ok(());
            }
            return Err(PreprocessorError::FileNotFound {
                filename: filename.to_string(),
                loc,
            });
        };

        self.last_loc = loc;
        self.push_file(&path)
    }

    // ========================================================================
    // Conditions and macro expansion
    // ========================================================================

    /// Evaluate a `#if`/`#elif` condition string.
    fn evaluate_condition(&mut self, text: &str, loc: &SourceLoc) -> Result<bool, PreprocessorError> {
        let raw = Lexer::tokenize(text, loc.file.clone(), loc.line)?;
        let with_defined = self.rewrite_defined(raw, loc)?;
        let expanded = self.expand_tokens(with_defined, &mut Vec::new());

        let Ok(expression) = expr::parse_expression(&expanded) else {
            // An unparseable condition is treated as false, with a
            // diagnostic, rather than killing the unit.
            self.warnings.push(ParseWarning::new(
                "unparseable preprocessor condition".to_string(),
                loc.clone(),
            ));
            return Ok(false);
        };
        // Per C semantics, identifiers surviving expansion evaluate as 0.
        let value = expression
            .evaluate(&|_| Some(ExprValue::Int(0)))
            .unwrap_or(ExprValue::Int(0));
        Ok(value.is_truthy())
    }

    /// Replace `defined X` and `defined(X)` with integer tokens before
    /// macro expansion.
    fn rewrite_defined(
        &self,
        tokens: Vec<Token>,
        loc: &SourceLoc,
    ) -> Result<Vec<Token>, PreprocessorError> {
        let mut out = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            if tokens[i].identifier() == Some("defined") {
                let mut j = i + 1;
                let parenthesized = tokens.get(j).is_some_and(|t| t.is_punct(Punct::LParen));
                if parenthesized {
                    j += 1;
                }
                let Some(name) = tokens.get(j).and_then(Token::identifier) else {
                    return Err(PreprocessorError::BadDirective {
                        loc: loc.clone(),
                        message: "defined requires a name".to_string(),
                    });
                };
                let value = self.macros.contains_key(name) as i64;
                j += 1;
                if parenthesized {
                    if !tokens.get(j).is_some_and(|t| t.is_punct(Punct::RParen)) {
                        return Err(PreprocessorError::BadDirective {
                            loc: loc.clone(),
                            message: "unterminated defined()".to_string(),
                        });
                    }
                    j += 1;
                }
                out.push(Token {
                    kind: TokenKind::Integer(value),
                    text: value.to_string(),
                    loc: tokens[i].loc.clone(),
                });
                i = j;
            } else {
                out.push(tokens[i].clone());
                i += 1;
            }
        }
        Ok(out)
    }

    /// Expand macros in a token sequence. `expanding` carries the names
    /// currently being expanded, so a self-referential macro stops instead
    /// of recursing forever.
    fn expand_tokens(&self, tokens: Vec<Token>, expanding: &mut Vec<String>) -> Vec<Token> {
        if expanding.len() >= MAX_EXPANSION_DEPTH {
            return tokens;
        }
        let mut out = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];
            let Some(name) = token.identifier() else {
                out.push(token.clone());
                i += 1;
                continue;
            };
            let Some(def) = self.macros.get(name) else {
                out.push(token.clone());
                i += 1;
                continue;
            };
            if expanding.iter().any(|n| n == name) {
                out.push(token.clone());
                i += 1;
                continue;
            }

            match &def.params {
                None => {
                    expanding.push(name.to_string());
                    let expanded = self.expand_tokens(def.body.clone(), expanding);
                    expanding.pop();
                    out.extend(expanded);
                    i += 1;
                }
                Some(params) => {
                    // Function-like: only expands when applied.
                    if !tokens.get(i + 1).is_some_and(|t| t.is_punct(Punct::LParen)) {
                        out.push(token.clone());
                        i += 1;
                        continue;
                    }
                    let (args, consumed) = collect_macro_args(&tokens[i + 2..]);
                    let substituted = substitute_params(&def.body, params, &args);
                    expanding.push(name.to_string());
                    let expanded = self.expand_tokens(substituted, expanding);
                    expanding.pop();
                    out.extend(expanded);
                    // name + lparen + args + rparen
                    i += 2 + consumed;
                }
            }
        }
        out
    }
}

/// Split the argument tokens of a function-like macro call. Returns the
/// arguments and the number of tokens consumed including the closing paren.
fn collect_macro_args(tokens: &[Token]) -> (Vec<Vec<Token>>, usize) {
    let mut args: Vec<Vec<Token>> = vec![Vec::new()];
    let mut depth = 0usize;
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        if token.is_punct(Punct::LParen) {
            depth += 1;
        } else if token.is_punct(Punct::RParen) {
            if depth == 0 {
                i += 1;
                break;
            }
            depth -= 1;
        } else if token.is_punct(Punct::Comma) && depth == 0 {
            args.push(Vec::new());
            i += 1;
            continue;
        }
        args.last_mut().expect("args is never empty").push(token.clone());
        i += 1;
    }
    if args.len() == 1 && args[0].is_empty() {
        args.clear();
    }
    (args, i)
}

/// Replace parameter names in a macro body with the caller's argument
/// tokens.
fn substitute_params(body: &[Token], params: &[String], args: &[Vec<Token>]) -> Vec<Token> {
    let mut out = Vec::with_capacity(body.len());
    for token in body {
        let replacement = token
            .identifier()
            .and_then(|name| params.iter().position(|p| p == name))
            .and_then(|position| args.get(position));
        match replacement {
            Some(arg) => out.extend(arg.iter().cloned()),
            None => out.push(token.clone()),
        }
    }
    out
}

/// Split a directive line into its name and the remainder.
fn split_directive(directive: &str) -> (&str, &str) {
    let end = directive
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(directive.len());
    (&directive[..end], &directive[end..])
}

/// Replace comments with whitespace, preserving newlines so line numbers
/// survive. String and character literals are respected.
fn strip_comments(text: &str, file: &Arc<str>) -> Result<String, TokenError> {
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    let mut line = 1u32;
    let mut col = 1u32;

    let bump = |ch: char, line: &mut u32, col: &mut u32| {
        if ch == '\n' {
            *line += 1;
            *col = 1;
        } else {
            *col += 1;
        }
    };

    while i < chars.len() {
        let ch = chars[i];
        match ch {
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    bump(chars[i], &mut line, &mut col);
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let start = SourceLoc::new(file.clone(), line, col);
                bump(chars[i], &mut line, &mut col);
                bump(chars[i + 1], &mut line, &mut col);
                i += 2;
                out.push(' ');
                loop {
                    if i >= chars.len() {
                        return Err(TokenError::UnterminatedComment(start));
                    }
                    if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                        bump(chars[i], &mut line, &mut col);
                        bump(chars[i + 1], &mut line, &mut col);
                        i += 2;
                        break;
                    }
                    if chars[i] == '\n' {
                        out.push('\n');
                    }
                    bump(chars[i], &mut line, &mut col);
                    i += 1;
                }
            }
            '"' | '\'' => {
                let quote = ch;
                out.push(ch);
                bump(ch, &mut line, &mut col);
                i += 1;
                while i < chars.len() {
                    let ch = chars[i];
                    out.push(ch);
                    bump(ch, &mut line, &mut col);
                    i += 1;
                    if ch == '\\' && i < chars.len() {
                        out.push(chars[i]);
                        bump(chars[i], &mut line, &mut col);
                        i += 1;
                        continue;
                    }
                    if ch == quote || ch == '\n' {
                        break;
                    }
                }
            }
            ch => {
                out.push(ch);
                bump(ch, &mut line, &mut col);
                i += 1;
            }
        }
    }
    Ok(out)
}

/// Split comment-stripped text into logical lines, joining backslash
/// continuations. Each entry carries the physical line number it starts
/// on.
fn logical_lines(text: &str) -> Vec<(u32, String)> {
    let mut out: Vec<(u32, String)> = Vec::new();
    let mut continuing = false;
    for (index, raw) in text.lines().enumerate() {
        let line_no = index as u32 + 1;
        let (content, continues) = match raw.trim_end().strip_suffix('\\') {
            Some(stripped) => (stripped, true),
            None => (raw, false),
        };
        if continuing {
            if let Some(last) = out.last_mut() {
                last.1.push(' ');
                last.1.push_str(content);
            }
        } else if !content.trim().is_empty() {
            out.push((line_no, content.to_string()));
        } else if continues {
            out.push((line_no, String::new()));
        }
        continuing = continues;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preprocess_all(text: &str) -> Result<Vec<Token>, PreprocessorError> {
        preprocess_with(text, PreprocessorConfig::default())
    }

    fn preprocess_with(
        text: &str,
        config: PreprocessorConfig,
    ) -> Result<Vec<Token>, PreprocessorError> {
        let mut pp = Preprocessor::new(config);
        pp.push_source("<test>", text, PathBuf::from("."))?;
        let mut tokens = Vec::new();
        loop {
            let token = pp.next_token()?;
            if token.is_eof() {
                return Ok(tokens);
            }
            tokens.push(token);
        }
    }

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn object_macros_expand() {
        let tokens = preprocess_all("#define COUNT 3\nint x[COUNT];").unwrap();
        assert_eq!(texts(&tokens), vec!["int", "x", "[", "3", "]", ";"]);
    }

    #[test]
    fn function_macros_expand_with_arguments() {
        let tokens =
            preprocess_all("#define PAIR(a, b) a , b\nint v[2] = { PAIR(1, 2) };").unwrap();
        assert_eq!(
            texts(&tokens),
            vec!["int", "v", "[", "2", "]", "=", "{", "1", ",", "2", "}", ";"]
        );
    }

    #[test]
    fn self_referential_macro_terminates() {
        let tokens = preprocess_all("#define X X + 1\nint y = X;").unwrap();
        assert_eq!(texts(&tokens), vec!["int", "y", "=", "X", "+", "1", ";"]);
    }

    #[test]
    fn conditionals_select_the_right_branch() {
        let source = "\
#define FEATURE 1
#if FEATURE
int enabled;
#else
int disabled;
#endif
";
        let tokens = preprocess_all(source).unwrap();
        assert_eq!(texts(&tokens), vec!["int", "enabled", ";"]);
    }

    #[test]
    fn nested_disabled_blocks_track_structure_only() {
        let source = "\
#if 0
#if 1
int never;
#endif
#undef GONE
int also_never;
#endif
int kept;
";
        let tokens = preprocess_all(source).unwrap();
        assert_eq!(texts(&tokens), vec!["int", "kept", ";"]);
    }

    #[test]
    fn elif_chains() {
        let source = "\
#define MODE 2
#if MODE == 1
int one;
#elif MODE == 2
int two;
#elif MODE == 3
int three;
#else
int other;
#endif
";
        let tokens = preprocess_all(source).unwrap();
        assert_eq!(texts(&tokens), vec!["int", "two", ";"]);
    }

    #[test]
    fn ifdef_and_defined() {
        let source = "\
#define PRESENT 1
#ifdef PRESENT
int a;
#endif
#ifndef PRESENT
int b;
#endif
#if defined(PRESENT) && !defined(ABSENT)
int c;
#endif
";
        let tokens = preprocess_all(source).unwrap();
        assert_eq!(texts(&tokens), vec!["int", "a", ";", "int", "c", ";"]);
    }

    #[test]
    fn unterminated_conditional_is_fatal() {
        let err = preprocess_all("#if 1\nint x;\n").unwrap_err();
        assert!(matches!(err, PreprocessorError::UnexpectedEof { .. }));
    }

    #[test]
    fn missing_include_is_fatal_in_strict_mode() {
        let err = preprocess_all("#include \"no_such_file.h\"\n").unwrap_err();
        match err {
            PreprocessorError::FileNotFound { filename, loc } => {
                assert_eq!(filename, "no_such_file.h");
                assert_eq!(loc.line, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_include_is_a_warning_in_permissive_mode() {
        let config = PreprocessorConfig {
            permissive_includes: true,
            ..PreprocessorConfig::default()
        };
        let mut pp = Preprocessor::new(config);
        pp.push_source(
            "<test>",
            "#include <far/away.h>\nint x;\n",
            PathBuf::from("."),
        )
        .unwrap();
        let mut tokens = Vec::new();
        loop {
            let token = pp.next_token().unwrap();
            if token.is_eof() {
                break;
            }
            tokens.push(token);
        }
        assert_eq!(texts(&tokens), vec!["int", "x", ";"]);
        let warnings = pp.take_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("far/away.h"));
    }

    #[test]
    fn includes_resolve_through_the_search_path() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("dep.h"), "int from_dep;\n").unwrap();

        let mut search_path = SearchPath::new();
        search_path.append_directory(dir.path());
        let config = PreprocessorConfig {
            search_path,
            ..PreprocessorConfig::default()
        };
        let tokens =
            preprocess_with("#include <dep.h>\nint after;\n", config).unwrap();
        assert_eq!(
            texts(&tokens),
            vec!["int", "from_dep", ";", "int", "after", ";"]
        );
    }

    #[test]
    fn include_guard_pattern_works() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("guarded.h"),
            "#ifndef GUARDED_H\n#define GUARDED_H\nint once;\n#endif\n",
        )
        .unwrap();

        let mut search_path = SearchPath::new();
        search_path.append_directory(dir.path());
        let config = PreprocessorConfig {
            search_path,
            ..PreprocessorConfig::default()
        };
        let tokens = preprocess_with(
            "#include <guarded.h>\n#include <guarded.h>\n",
            config,
        )
        .unwrap();
        assert_eq!(texts(&tokens), vec!["int", "once", ";"]);
    }

    #[test]
    fn line_continuations_join_defines() {
        let tokens = preprocess_all("#define SUM 1 + \\\n  2\nint x = SUM;").unwrap();
        assert_eq!(
            texts(&tokens),
            vec!["int", "x", "=", "1", "+", "2", ";"]
        );
    }

    #[test]
    fn block_comments_preserve_line_numbers() {
        let tokens = preprocess_all("/* one\n   two */\nint x;\n").unwrap();
        assert_eq!(tokens[0].loc.line, 3);
    }

    #[test]
    fn hash_error_is_fatal_when_active() {
        let err = preprocess_all("#error bad configuration\n").unwrap_err();
        assert!(matches!(err, PreprocessorError::UserError { .. }));
        // ...but invisible in a disabled branch.
        let tokens = preprocess_all("#if 0\n#error never\n#endif\nint x;\n").unwrap();
        assert_eq!(texts(&tokens), vec!["int", "x", ";"]);
    }
}
