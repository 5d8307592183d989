//! The declaration parser: recursive descent over the preprocessor's token
//! stream, building declarations into the scope arena.
//!
//! The parser is deliberately forgiving. A construct it cannot classify is
//! skipped to the next declaration boundary and recorded as a
//! [`ParseWarning`]; everything parsed before and after the bad construct
//! survives. Only tokenizer/preprocessor failures (truncated input,
//! unresolvable strict-mode includes) abort a translation unit, and even
//! then the declarations already built remain valid.
//!
//! The classic `<` ambiguity is resolved against the scope model: an
//! identifier that already denotes a template in scope opens a template
//! argument list, anything else is a less-than.

pub mod errors;

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::ast::decl::{
    Declaration, EnumValueDecl, FunctionDecl, InstanceDecl, TemplateDecl, TypeDecl, TypedefDecl,
};
use crate::ast::expr::{self, ExprValue, Expression};
use crate::ast::ty::{
    self, Access, BaseClass, CppType, EnumType, EnumValue, FunctionSignature, Parameter,
    QualifiedName, SimpleKind, SimpleType, StructKind, StructType, TbdType,
};
use crate::preprocessor::{Preprocessor, PreprocessorConfig};
use crate::scope::{function_group, ScopeArena, ScopeError, ScopeId, ScopeKind};
use crate::token::{Keyword, Punct, SourceLoc, Token, TokenKind};
use crate::tokenizer::Lexer;

pub use errors::{ParseError, ParseWarning};

/// Identifier-spelled specifiers we accept and ignore.
const IGNORED_SPECIFIERS: &[&str] = &["explicit", "constexpr", "final", "override"];

/// The C++ declaration parser.
///
/// One parser owns the scope arena it populates; parse any number of files
/// into it, then walk the global scope or hand the whole thing to the
/// database builder.
pub struct Parser {
    pub arena: ScopeArena,
    preprocessor: Preprocessor,
    lookahead: VecDeque<Token>,
    /// Token source for string entry points (`parse_type`, `parse_expr`),
    /// temporarily replacing the preprocessor.
    string_tokens: Option<VecDeque<Token>>,
    warnings: Vec<ParseWarning>,
    current_scope: ScopeId,
    current_access: Access,
    files_attempted: usize,
}

impl Parser {
    pub fn new(config: PreprocessorConfig) -> Self {
        Parser {
            arena: ScopeArena::new(),
            preprocessor: Preprocessor::new(config),
            lookahead: VecDeque::new(),
            string_tokens: None,
            warnings: Vec::new(),
            current_scope: ScopeId(0),
            current_access: Access::Public,
            files_attempted: 0,
        }
    }

    /// The global scope every file parses into.
    pub fn global_scope(&self) -> ScopeId {
        self.arena.global()
    }

    /// The preprocessor, exposed so the database builder can read the
    /// macro table for manifest records.
    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    /// All warnings collected so far, parser and preprocessor both.
    pub fn take_warnings(&mut self) -> Vec<ParseWarning> {
        let mut warnings = std::mem::take(&mut self.warnings);
        warnings.extend(self.preprocessor.take_warnings());
        warnings.sort_by_key(|w| (w.loc.file.to_string(), w.loc.line, w.loc.col));
        warnings
    }

    pub fn files_attempted(&self) -> usize {
        self.files_attempted
    }

    /// Parse one translation unit from disk into the global scope.
    pub fn parse_file(&mut self, path: &Path) -> Result<(), ParseError> {
        debug!(file = %path.display(), "parsing translation unit");
        self.files_attempted += 1;
        self.lookahead.clear();
        self.preprocessor.push_file(path)?;
        self.run_unit()
    }

    /// Parse a translation unit from in-memory text.
    pub fn parse_source(&mut self, label: &str, text: &str) -> Result<(), ParseError> {
        self.files_attempted += 1;
        self.lookahead.clear();
        self.preprocessor
            .push_source(label, text, std::path::PathBuf::from("."))?;
        self.run_unit()
    }

    /// Drive one unit; a fatal error leaves already-built declarations in
    /// place but resets the token pipeline for the next unit.
    fn run_unit(&mut self) -> Result<(), ParseError> {
        let result = self.parse_unit();
        if result.is_err() {
            self.preprocessor.abandon_unit();
            self.lookahead.clear();
            self.current_scope = self.arena.global();
            self.current_access = Access::Public;
        }
        result
    }

    /// Parse a standalone type string, e.g. `"const char *"`.
    pub fn parse_type(&mut self, text: &str) -> Result<Arc<CppType>, ParseError> {
        let tokens = Lexer::tokenize(text, Arc::from("<type>"), 1)?;
        self.string_tokens = Some(tokens.into());
        let result: Result<Arc<CppType>, ParseError> = (|| {
            let base = self.parse_type_specifier()?;
            let ty = self.parse_abstract_declarator(base)?;
            Ok(ty)
        })();
        self.string_tokens = None;
        self.lookahead.clear();
        result
    }

    /// Parse a standalone constant expression string.
    pub fn parse_expr(&mut self, text: &str) -> Result<Expression, ParseError> {
        let tokens = Lexer::tokenize(text, Arc::from("<expr>"), 1)?;
        match expr::parse_expression(&tokens) {
            Ok(expression) => Ok(expression),
            Err(err) => Err(ParseError::Syntax {
                loc: SourceLoc::internal(),
                message: err.to_string(),
            }),
        }
    }

    // ========================================================================
    // Token plumbing
    // ========================================================================

    fn fill_lookahead(&mut self, n: usize) -> Result<(), ParseError> {
        while self.lookahead.len() <= n {
            let token = match &mut self.string_tokens {
                Some(tokens) => tokens
                    .pop_front()
                    .unwrap_or_else(|| Token::eof(SourceLoc::internal())),
                None => self.preprocessor.next_token()?,
            };
            self.lookahead.push_back(token);
        }
        Ok(())
    }

    fn peek(&mut self, n: usize) -> Result<&Token, ParseError> {
        self.fill_lookahead(n)?;
        Ok(&self.lookahead[n])
    }

    fn next(&mut self) -> Result<Token, ParseError> {
        self.fill_lookahead(0)?;
        Ok(self.lookahead.pop_front().expect("lookahead filled"))
    }

    fn eat_punct(&mut self, punct: Punct) -> Result<bool, ParseError> {
        if self.peek(0)?.is_punct(punct) {
            self.next()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> Result<bool, ParseError> {
        if self.peek(0)?.is_keyword(keyword) {
            self.next()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect_punct(&mut self, punct: Punct, context: &'static str) -> Result<Token, ParseError> {
        let token = self.next()?;
        if token.is_punct(punct) {
            Ok(token)
        } else if token.is_eof() {
            Err(ParseError::UnexpectedEof {
                loc: token.loc,
                context,
            })
        } else {
            Err(ParseError::Syntax {
                loc: token.loc.clone(),
                message: format!("expected '{:?}' in {}, found '{}'", punct, context, token),
            })
        }
    }

    /// Consume a `>`; a `>>` closing two template argument lists is split
    /// into two `>` tokens.
    fn expect_template_close(&mut self) -> Result<(), ParseError> {
        let token = self.peek(0)?;
        if token.is_punct(Punct::Shr) {
            let loc = token.loc.clone();
            self.next()?;
            self.lookahead.push_front(Token {
                kind: TokenKind::Punct(Punct::Gt),
                text: ">".to_string(),
                loc,
            });
            Ok(())
        } else {
            self.expect_punct(Punct::Gt, "template argument list")?;
            Ok(())
        }
    }

    fn warn(&mut self, message: impl Into<String>, loc: SourceLoc) {
        self.warnings.push(ParseWarning::new(message, loc));
    }

    /// Skip to the next declaration boundary: past the matching `;`, or
    /// past a balanced `{ ... }` block (plus a trailing `;` if present).
    fn skip_to_boundary(&mut self) -> Result<(), ParseError> {
        loop {
            let token = self.next()?;
            match token.kind {
                TokenKind::Eof => return Ok(()),
                TokenKind::Punct(Punct::Semicolon) => return Ok(()),
                TokenKind::Punct(Punct::LBrace) => {
                    self.skip_balanced_braces()?;
                    self.eat_punct(Punct::Semicolon)?;
                    return Ok(());
                }
                TokenKind::Punct(Punct::RBrace) => {
                    // Put the closing brace back for the enclosing body.
                    self.lookahead.push_front(token);
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    /// Consume tokens until the brace depth returns to zero. The opening
    /// `{` has already been consumed.
    fn skip_balanced_braces(&mut self) -> Result<(), ParseError> {
        let mut depth = 1usize;
        while depth > 0 {
            let token = self.next()?;
            match token.kind {
                TokenKind::Eof => {
                    return Err(ParseError::UnexpectedEof {
                        loc: token.loc,
                        context: "brace-delimited block",
                    })
                }
                TokenKind::Punct(Punct::LBrace) => depth += 1,
                TokenKind::Punct(Punct::RBrace) => depth -= 1,
                _ => {}
            }
        }
        Ok(())
    }

    /// Collect raw tokens up to (not including) any of the stop
    /// punctuation at paren/bracket depth zero.
    fn collect_until(&mut self, stops: &[Punct]) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        let mut depth = 0usize;
        loop {
            let token = self.peek(0)?;
            match token.kind {
                TokenKind::Eof => return Ok(tokens),
                TokenKind::Punct(p) => {
                    if depth == 0 && stops.contains(&p) {
                        return Ok(tokens);
                    }
                    match p {
                        Punct::LParen | Punct::LBracket | Punct::LBrace => depth += 1,
                        Punct::RParen | Punct::RBracket | Punct::RBrace => {
                            if depth == 0 {
                                return Ok(tokens);
                            }
                            depth -= 1;
                        }
                        _ => {}
                    }
                    tokens.push(self.next()?);
                }
                _ => tokens.push(self.next()?),
            }
        }
    }

    // ========================================================================
    // Top level
    // ========================================================================

    /// Drive the whole unit, recovering from recoverable errors.
    fn parse_unit(&mut self) -> Result<(), ParseError> {
        loop {
            if self.peek(0)?.is_eof() {
                return Ok(());
            }
            match self.parse_declaration() {
                Ok(()) => {}
                Err(ParseError::Syntax { loc, message }) => {
                    // Recoverable: skip to the next declaration and keep
                    // going.
                    self.warn(message, loc);
                    self.skip_to_boundary()?;
                }
                Err(fatal) => return Err(fatal),
            }
        }
    }

    fn parse_declaration(&mut self) -> Result<(), ParseError> {
        let token = self.peek(0)?.clone();
        match &token.kind {
            TokenKind::Punct(Punct::Semicolon) => {
                self.next()?;
                Ok(())
            }
            TokenKind::Keyword(Keyword::Namespace) => self.parse_namespace(),
            TokenKind::Keyword(Keyword::Template) => self.parse_template(),
            TokenKind::Keyword(Keyword::Typedef) => self.parse_typedef(),
            TokenKind::Keyword(Keyword::Using) => self.parse_using(),
            TokenKind::Keyword(Keyword::Friend) => {
                // Friendship carries no interface information.
                self.skip_to_boundary()
            }
            TokenKind::Keyword(Keyword::Extern) => {
                if matches!(self.peek(1)?.kind, TokenKind::StringLit(_)) {
                    self.next()?;
                    self.next()?;
                    if self.eat_punct(Punct::LBrace)? {
                        while !self.peek(0)?.is_punct(Punct::RBrace) {
                            if self.peek(0)?.is_eof() {
                                return Err(ParseError::UnexpectedEof {
                                    loc: token.loc,
                                    context: "extern block",
                                });
                            }
                            self.parse_declaration_recovering()?;
                        }
                        self.next()?;
                        Ok(())
                    } else {
                        self.parse_declaration()
                    }
                } else {
                    // `extern int x;`
                    self.next()?;
                    self.parse_simple_declaration()
                }
            }
            TokenKind::Keyword(
                Keyword::Public | Keyword::Protected | Keyword::Private,
            ) => {
                if !self.peek(1)?.is_punct(Punct::Colon) {
                    return Err(ParseError::Syntax {
                        loc: token.loc,
                        message: "access specifier outside a label".to_string(),
                    });
                }
                let access = match token.kind {
                    TokenKind::Keyword(Keyword::Public) => Access::Public,
                    TokenKind::Keyword(Keyword::Protected) => Access::Protected,
                    _ => Access::Private,
                };
                self.next()?;
                self.next()?;
                self.current_access = access;
                Ok(())
            }
            _ => self.parse_simple_declaration(),
        }
    }

    /// As [`parse_declaration`], but downgrade recoverable errors in place
    /// (used inside bodies where the caller owns the closing brace).
    fn parse_declaration_recovering(&mut self) -> Result<(), ParseError> {
        match self.parse_declaration() {
            Ok(()) => Ok(()),
            Err(ParseError::Syntax { loc, message }) => {
                self.warn(message, loc);
                self.skip_to_boundary()
            }
            Err(fatal) => Err(fatal),
        }
    }

    // ========================================================================
    // Namespaces, usings, typedefs, templates
    // ========================================================================

    fn parse_namespace(&mut self) -> Result<(), ParseError> {
        let kw = self.next()?; // namespace
        let name = match self.peek(0)?.identifier() {
            Some(name) => {
                let name = name.to_string();
                self.next()?;
                Some(name)
            }
            None => None,
        };
        self.expect_punct(Punct::LBrace, "namespace body")?;

        let scope = match &name {
            Some(name) => {
                // Re-opening an existing namespace extends it.
                let existing = self
                    .arena
                    .local_lookup(self.current_scope, name)
                    .and_then(|decl| match decl {
                        Declaration::Namespace { scope, .. } => Some(*scope),
                        _ => None,
                    });
                match existing {
                    Some(scope) => scope,
                    None => {
                        let scope = self.arena.create_scope(
                            name.clone(),
                            ScopeKind::Namespace,
                            self.current_scope,
                        );
                        self.declare_with_diagnostics(
                            self.current_scope,
                            Declaration::Namespace {
                                name: name.clone(),
                                scope,
                            },
                            &kw.loc,
                        );
                        scope
                    }
                }
            }
            // Anonymous namespace contents belong to the enclosing scope.
            None => self.current_scope,
        };

        let saved_scope = self.current_scope;
        let saved_access = self.current_access;
        self.current_scope = scope;
        self.current_access = Access::Public;
        while !self.peek(0)?.is_punct(Punct::RBrace) {
            if self.peek(0)?.is_eof() {
                self.current_scope = saved_scope;
                return Err(ParseError::UnexpectedEof {
                    loc: kw.loc,
                    context: "namespace body",
                });
            }
            self.parse_declaration_recovering()?;
        }
        self.next()?;
        self.current_scope = saved_scope;
        self.current_access = saved_access;
        Ok(())
    }

    fn parse_using(&mut self) -> Result<(), ParseError> {
        let kw = self.next()?; // using
        if self.eat_keyword(Keyword::Namespace)? {
            let name = self.parse_qualified_name()?;
            match self.arena.lookup_qualified(self.current_scope, &name) {
                Ok(Some(Declaration::Namespace { scope, .. })) => {
                    let target = *scope;
                    self.arena.add_using(self.current_scope, target);
                }
                Ok(_) => self.warn(format!("unknown namespace '{}'", name), kw.loc.clone()),
                Err(err) => self.warn(err.to_string(), kw.loc.clone()),
            }
            self.expect_punct(Punct::Semicolon, "using directive")?;
            return Ok(());
        }

        // A using-declaration: alias one name into this scope.
        let name = self.parse_qualified_name()?;
        let target = match self.arena.lookup_qualified(self.current_scope, &name) {
            Ok(Some(decl)) => Some(decl.clone()),
            Ok(None) => None,
            Err(err) => {
                self.warn(err.to_string(), kw.loc.clone());
                None
            }
        };
        match target {
            Some(decl) => {
                let alias = Declaration::UsingAlias {
                    name: name.last().to_string(),
                    target: Box::new(decl),
                };
                self.declare_with_diagnostics(self.current_scope, alias, &kw.loc);
            }
            None => self.warn(format!("unknown name '{}' in using", name), kw.loc),
        }
        self.expect_punct(Punct::Semicolon, "using declaration")?;
        Ok(())
    }

    fn parse_typedef(&mut self) -> Result<(), ParseError> {
        let kw = self.next()?; // typedef
        let base = self.parse_type_specifier()?;
        let declarator = self.parse_declarator(base)?;
        self.expect_punct(Punct::Semicolon, "typedef")?;

        let Some(name) = declarator.name else {
            return Err(ParseError::Syntax {
                loc: kw.loc,
                message: "typedef without a name".to_string(),
            });
        };
        let ty = match declarator.signature {
            Some(sig) => Arc::new(CppType::Function(sig)),
            None => declarator.ty,
        };
        let decl = Declaration::Typedef(TypedefDecl {
            name: name.last().to_string(),
            ty,
            access: self.current_access,
            comment: None,
            loc: kw.loc.clone(),
        });
        self.declare_with_diagnostics(self.current_scope, decl, &kw.loc);
        Ok(())
    }

    fn parse_template(&mut self) -> Result<(), ParseError> {
        let kw = self.next()?; // template
        self.expect_punct(Punct::Lt, "template parameter list")?;

        let mut params = Vec::new();
        loop {
            let token = self.peek(0)?.clone();
            match &token.kind {
                TokenKind::Keyword(Keyword::Class | Keyword::Typename) => {
                    self.next()?;
                    if let Some(name) = self.peek(0)?.identifier().map(str::to_string) {
                        self.next()?;
                        params.push(name);
                    }
                }
                // A non-type parameter: `int N`.
                _ => {
                    let _ty = self.parse_type_specifier()?;
                    if let Some(name) = self.peek(0)?.identifier().map(str::to_string) {
                        self.next()?;
                        params.push(name);
                    }
                }
            }
            if self.eat_punct(Punct::Comma)? {
                continue;
            }
            self.expect_template_close()?;
            break;
        }

        // The template scope binds each parameter name to a TBD type, so
        // every use of the parameter inside parses as a placeholder.
        let template_scope =
            self.arena
                .create_scope("<template>", ScopeKind::Template, self.current_scope);
        for param in &params {
            let tbd = Arc::new(CppType::Tbd(TbdType {
                name: QualifiedName::simple(param.clone()),
            }));
            let decl = Declaration::Typedef(TypedefDecl {
                name: param.clone(),
                ty: tbd,
                access: Access::Public,
                comment: None,
                loc: kw.loc.clone(),
            });
            let _ = self.arena.declare(template_scope, decl);
        }

        let saved = self.current_scope;
        self.current_scope = template_scope;
        let result = self.parse_declaration();
        self.current_scope = saved;
        result?;

        // Whatever the inner parse declared last in the template scope is
        // the templated entity.
        let inner = {
            let non_params: Vec<&Declaration> = self
                .arena
                .scope(template_scope)
                .declarations()
                .filter(
                    |decl| !matches!(decl, Declaration::Typedef(t) if params.contains(&t.name)),
                )
                .collect();
            non_params.last().map(|decl| (*decl).clone())
        };
        let Some(inner) = inner else {
            self.warn("empty template declaration", kw.loc);
            return Ok(());
        };

        let member_scope = self.arena.scope_of(&inner);
        let template = Declaration::Template(TemplateDecl {
            name: inner.name().to_string(),
            params,
            scope: member_scope,
            decl: Box::new(inner),
        });
        self.declare_with_diagnostics(self.current_scope, template, &kw.loc);
        Ok(())
    }

    // ========================================================================
    // Struct / enum definitions
    // ========================================================================

    fn parse_struct_or_enum(&mut self) -> Result<Arc<CppType>, ParseError> {
        let token = self.peek(0)?.clone();
        match token.kind {
            TokenKind::Keyword(Keyword::Enum) => self.parse_enum(),
            _ => self.parse_struct(),
        }
    }

    fn parse_struct(&mut self) -> Result<Arc<CppType>, ParseError> {
        let kw = self.next()?;
        let kind = match kw.kind {
            TokenKind::Keyword(Keyword::Class) => StructKind::Class,
            TokenKind::Keyword(Keyword::Union) => StructKind::Union,
            _ => StructKind::Struct,
        };
        let name = match self.peek(0)?.identifier() {
            Some(name) => {
                let name = name.to_string();
                self.next()?;
                name
            }
            None => String::new(),
        };

        // A bare elaborated reference or forward declaration:
        // `class X;` / `class X *ptr;`
        if !self.peek(0)?.is_punct(Punct::LBrace) && !self.peek(0)?.is_punct(Punct::Colon) {
            if let Some(existing) = self
                .arena
                .lookup(self.current_scope, &name)
                .ok()
                .flatten()
                .and_then(Declaration::as_type)
            {
                return Ok(existing);
            }
            let ty = Arc::new(CppType::Struct(StructType {
                kind,
                name: name.clone(),
                declared_in: Some(self.current_scope),
                scope: None,
                bases: Vec::new(),
            }));
            if !name.is_empty() {
                let decl = Declaration::Type(TypeDecl {
                    name,
                    ty: ty.clone(),
                    access: self.current_access,
                    comment: None,
                    loc: kw.loc.clone(),
                });
                self.declare_with_diagnostics(self.current_scope, decl, &kw.loc);
            }
            return Ok(ty);
        }

        // Base clause.
        let mut bases = Vec::new();
        if self.eat_punct(Punct::Colon)? {
            loop {
                let mut access = match kind {
                    StructKind::Class => Access::Private,
                    _ => Access::Public,
                };
                loop {
                    let token = self.peek(0)?.clone();
                    match token.kind {
                        TokenKind::Keyword(Keyword::Public) => {
                            access = Access::Public;
                            self.next()?;
                        }
                        TokenKind::Keyword(Keyword::Protected) => {
                            access = Access::Protected;
                            self.next()?;
                        }
                        TokenKind::Keyword(Keyword::Private) => {
                            access = Access::Private;
                            self.next()?;
                        }
                        TokenKind::Keyword(Keyword::Virtual) => {
                            self.next()?;
                        }
                        _ => break,
                    }
                }
                let base = self.parse_named_type()?;
                bases.push(BaseClass { base, access });
                if !self.eat_punct(Punct::Comma)? {
                    break;
                }
            }
        }

        self.expect_punct(Punct::LBrace, "class body")?;
        let member_scope =
            self.arena
                .create_scope(name.clone(), ScopeKind::Class, self.current_scope);

        let saved_scope = self.current_scope;
        let saved_access = self.current_access;
        self.current_scope = member_scope;
        self.current_access = match kind {
            StructKind::Class => Access::Private,
            _ => Access::Public,
        };
        let body = self.parse_class_body(&name, &kw.loc);
        self.current_scope = saved_scope;
        self.current_access = saved_access;
        body?;

        let ty = Arc::new(CppType::Struct(StructType {
            kind,
            name: name.clone(),
            declared_in: Some(self.current_scope),
            scope: Some(member_scope),
            bases,
        }));
        if !name.is_empty() {
            let decl = Declaration::Type(TypeDecl {
                name,
                ty: ty.clone(),
                access: self.current_access,
                comment: None,
                loc: kw.loc.clone(),
            });
            self.declare_with_diagnostics(self.current_scope, decl, &kw.loc);
        }
        Ok(ty)
    }

    fn parse_class_body(&mut self, class_name: &str, loc: &SourceLoc) -> Result<(), ParseError> {
        loop {
            let token = self.peek(0)?.clone();
            if token.is_punct(Punct::RBrace) {
                self.next()?;
                return Ok(());
            }
            if token.is_eof() {
                return Err(ParseError::UnexpectedEof {
                    loc: loc.clone(),
                    context: "class body",
                });
            }

            // Constructors and destructors have no leading type.
            let is_ctor = token.identifier() == Some(class_name)
                && self.peek(1)?.is_punct(Punct::LParen);
            let is_dtor = token.is_punct(Punct::Tilde)
                || (matches!(token.kind, TokenKind::Keyword(Keyword::Virtual))
                    && self.peek(1)?.is_punct(Punct::Tilde));
            if is_ctor || is_dtor {
                match self.parse_ctor_or_dtor(class_name) {
                    Ok(()) => continue,
                    Err(ParseError::Syntax { loc, message }) => {
                        self.warn(message, loc);
                        self.skip_to_boundary()?;
                        continue;
                    }
                    Err(fatal) => return Err(fatal),
                }
            }
            self.parse_declaration_recovering()?;
        }
    }

    fn parse_ctor_or_dtor(&mut self, class_name: &str) -> Result<(), ParseError> {
        let mut flags = 0u32;
        if self.eat_keyword(Keyword::Virtual)? {
            flags |= FunctionDecl::F_VIRTUAL;
        }
        let destructor = self.eat_punct(Punct::Tilde)?;
        let token = self.next()?;
        let loc = token.loc.clone();
        if token.identifier() != Some(class_name) {
            return Err(ParseError::Syntax {
                loc,
                message: "expected constructor or destructor name".to_string(),
            });
        }
        let name = if destructor {
            flags |= FunctionDecl::F_DESTRUCTOR;
            format!("~{}", class_name)
        } else {
            flags |= FunctionDecl::F_CONSTRUCTOR;
            class_name.to_string()
        };

        self.expect_punct(Punct::LParen, "constructor parameter list")?;
        let (params, variadic) = self.parse_parameter_list()?;
        let mut sig_flags = 0;
        if variadic {
            sig_flags |= FunctionSignature::F_VARIADIC;
        }
        self.finish_function_suffix(&mut flags)?;

        let signature = FunctionSignature {
            return_type: CppType::simple(SimpleKind::Void),
            params,
            flags: sig_flags,
        };
        let decl = function_group(FunctionDecl {
            name,
            signature,
            flags,
            access: self.current_access,
            comment: None,
            loc: loc.clone(),
        });
        self.declare_with_diagnostics(self.current_scope, decl, &loc);
        Ok(())
    }

    fn parse_enum(&mut self) -> Result<Arc<CppType>, ParseError> {
        let kw = self.next()?; // enum
        // C++11 scoped-enum syntax is accepted; scoping is not modeled.
        let _scoped = self.eat_keyword(Keyword::Class)? || self.eat_keyword(Keyword::Struct)?;
        let name = match self.peek(0)?.identifier() {
            Some(name) => {
                let name = name.to_string();
                self.next()?;
                name
            }
            None => String::new(),
        };

        if !self.peek(0)?.is_punct(Punct::LBrace) {
            // Forward reference to an enum.
            let ty = Arc::new(CppType::Enum(EnumType {
                name: name.clone(),
                declared_in: Some(self.current_scope),
                values: Vec::new(),
            }));
            if !name.is_empty() {
                let decl = Declaration::Type(TypeDecl {
                    name,
                    ty: ty.clone(),
                    access: self.current_access,
                    comment: None,
                    loc: kw.loc.clone(),
                });
                self.declare_with_diagnostics(self.current_scope, decl, &kw.loc);
            }
            return Ok(ty);
        }
        self.next()?; // {

        let mut values: Vec<EnumValue> = Vec::new();
        let mut next_value = 0i64;
        loop {
            if self.peek(0)?.is_punct(Punct::RBrace) {
                self.next()?;
                break;
            }
            let token = self.next()?;
            let Some(value_name) = token.identifier().map(str::to_string) else {
                return Err(ParseError::Syntax {
                    loc: token.loc,
                    message: "expected enum value name".to_string(),
                });
            };
            let value = if self.eat_punct(Punct::Assign)? {
                let tokens = self.collect_until(&[Punct::Comma, Punct::RBrace])?;
                let known = values.clone();
                let computed = expr::parse_expression(&tokens).ok().and_then(|e| {
                    e.evaluate(&|ident| {
                        known
                            .iter()
                            .find(|v| v.name == ident)
                            .map(|v| ExprValue::Int(v.value))
                    })
                    .ok()
                });
                match computed.and_then(|v| v.as_int()) {
                    Some(value) => value,
                    None => {
                        self.warn(
                            format!("cannot evaluate enum value '{}'", value_name),
                            token.loc.clone(),
                        );
                        next_value
                    }
                }
            } else {
                next_value
            };
            next_value = value + 1;
            values.push(EnumValue {
                name: value_name,
                value,
            });
            if !self.eat_punct(Punct::Comma)? {
                self.expect_punct(Punct::RBrace, "enum body")?;
                break;
            }
        }

        let ty = Arc::new(CppType::Enum(EnumType {
            name: name.clone(),
            declared_in: Some(self.current_scope),
            values: values.clone(),
        }));

        // Enumerators are hoisted into the enclosing scope, as C++ does.
        for value in &values {
            let decl = Declaration::EnumValue(EnumValueDecl {
                name: value.name.clone(),
                value: value.value,
                enum_type: ty.clone(),
            });
            self.declare_with_diagnostics(self.current_scope, decl, &kw.loc);
        }
        if !name.is_empty() {
            let decl = Declaration::Type(TypeDecl {
                name,
                ty: ty.clone(),
                access: self.current_access,
                comment: None,
                loc: kw.loc.clone(),
            });
            self.declare_with_diagnostics(self.current_scope, decl, &kw.loc);
        }
        Ok(ty)
    }

    // ========================================================================
    // Types
    // ========================================================================

    fn parse_qualified_name(&mut self) -> Result<QualifiedName, ParseError> {
        let mut is_global = false;
        if self.peek(0)?.is_punct(Punct::Scope) {
            is_global = true;
            self.next()?;
        }
        let mut components = Vec::new();
        loop {
            let token = self.peek(0)?;
            let Some(name) = token.identifier().map(str::to_string) else {
                if components.is_empty() {
                    let token = self.next()?;
                    return Err(ParseError::Syntax {
                        loc: token.loc.clone(),
                        message: format!("expected a name, found '{}'", token),
                    });
                }
                break;
            };
            self.next()?;
            components.push(name);
            if self.peek(0)?.is_punct(Punct::Scope)
                && self.peek(1)?.is_identifier()
            {
                self.next()?;
            } else {
                break;
            }
        }
        Ok(QualifiedName {
            is_global,
            components,
        })
    }

    /// Parse a type named by an identifier (possibly qualified, possibly a
    /// template instantiation), consulting the scope model to classify it.
    fn parse_named_type(&mut self) -> Result<Arc<CppType>, ParseError> {
        let loc = self.peek(0)?.loc.clone();
        let name = self.parse_qualified_name()?;

        // This is where `<` stops being ambiguous: only a name already
        // known to denote a template opens an argument list.
        let denotes_template = matches!(
            self.arena.lookup_qualified(self.current_scope, &name),
            Ok(Some(Declaration::Template(_)))
        );
        if denotes_template && self.peek(0)?.is_punct(Punct::Lt) {
            return self.instantiate_template(&name, loc);
        }

        match self.arena.lookup_qualified(self.current_scope, &name) {
            Ok(Some(decl)) => {
                if let Some(ty) = decl.as_type() {
                    return Ok(ty);
                }
                if let Declaration::EnumValue(v) = decl {
                    // An enumerator in type position is a syntax problem
                    // upstream; report it at the use site.
                    let message = format!("'{}' names an enum value, not a type", v.name);
                    return Err(ParseError::Syntax { loc, message });
                }
                // Known name that isn't a type (function, variable).
                Err(ParseError::Syntax {
                    loc,
                    message: format!("'{}' does not name a type", name),
                })
            }
            Ok(None) => {
                // Unknown: a to-be-determined placeholder, resolved when
                // (if) the definition shows up.
                Ok(Arc::new(CppType::Tbd(TbdType { name })))
            }
            Err(ScopeError::AmbiguousName { name }) => Err(ParseError::Syntax {
                loc,
                message: format!(
                    "ambiguous name '{}': visible through multiple using directives",
                    name
                ),
            }),
            Err(err) => Err(ParseError::Syntax {
                loc,
                message: err.to_string(),
            }),
        }
    }

    fn instantiate_template(
        &mut self,
        name: &QualifiedName,
        loc: SourceLoc,
    ) -> Result<Arc<CppType>, ParseError> {
        self.expect_punct(Punct::Lt, "template argument list")?;

        let mut args: Vec<Arc<CppType>> = Vec::new();
        let mut arg_names: Vec<String> = Vec::new();
        loop {
            // Prefer a type argument; fall back to a constant expression,
            // which participates in the instantiated name only.
            let token = self.peek(0)?.clone();
            let looks_like_type = matches!(
                token.kind,
                TokenKind::Keyword(
                    Keyword::Const
                        | Keyword::Unsigned
                        | Keyword::Signed
                        | Keyword::Long
                        | Keyword::Short
                        | Keyword::Int
                        | Keyword::Char
                        | Keyword::Float
                        | Keyword::Double
                        | Keyword::Bool
                        | Keyword::Void
                        | Keyword::Wchar
                        | Keyword::Class
                        | Keyword::Struct
                        | Keyword::Union
                        | Keyword::Enum
                        | Keyword::Typename
                )
            ) || token.is_identifier();

            if looks_like_type {
                let base = self.parse_type_specifier()?;
                let ty = self.parse_abstract_declarator(base)?;
                arg_names.push(ty.scoped_name(&self.arena));
                args.push(ty);
            } else {
                let tokens = self.collect_until(&[Punct::Comma, Punct::Gt, Punct::Shr])?;
                let text: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
                arg_names.push(text.join(" "));
            }

            if self.eat_punct(Punct::Comma)? {
                continue;
            }
            self.expect_template_close()?;
            break;
        }

        let Ok(Some(Declaration::Template(template))) =
            self.arena.lookup_qualified(self.current_scope, name)
        else {
            return Err(ParseError::Syntax {
                loc,
                message: format!("'{}' is not a template", name),
            });
        };
        let template = template.clone();

        let instance_name = format!("{}< {} >", template.name, arg_names.join(", "));
        let mut subst: HashMap<String, Arc<CppType>> = HashMap::new();
        for (param, arg) in template.params.iter().zip(args.iter()) {
            subst.insert(param.clone(), arg.clone());
        }

        let instantiated_scope = template
            .scope
            .map(|scope| self.arena.substitute_scope(scope, &subst, &instance_name));

        let ty = match &*template.decl {
            Declaration::Type(type_decl) => match &*type_decl.ty {
                CppType::Struct(s) => Arc::new(CppType::Struct(StructType {
                    kind: s.kind,
                    name: instance_name.clone(),
                    declared_in: s.declared_in,
                    scope: instantiated_scope,
                    bases: s
                        .bases
                        .iter()
                        .map(|b| BaseClass {
                            base: ty::substitute_type(&b.base, &subst),
                            access: b.access,
                        })
                        .collect(),
                })),
                other_ty => {
                    let arc = Arc::new(other_ty.clone());
                    ty::substitute_type(&arc, &subst)
                }
            },
            _ => {
                return Err(ParseError::Syntax {
                    loc,
                    message: format!("'{}' does not name a templated type", name),
                })
            }
        };
        Ok(ty)
    }

    /// Parse the type-specifier part of a declaration: cv-qualifiers,
    /// builtin combinations, elaborated type definitions, or named types.
    fn parse_type_specifier(&mut self) -> Result<Arc<CppType>, ParseError> {
        let mut is_const = false;

        loop {
            let token = self.peek(0)?.clone();
            match token.kind {
                TokenKind::Keyword(Keyword::Const) => {
                    is_const = true;
                    self.next()?;
                }
                TokenKind::Keyword(Keyword::Volatile | Keyword::Mutable | Keyword::Register) => {
                    self.next()?;
                }
                _ => break,
            }
        }

        let token = self.peek(0)?.clone();
        let base = match token.kind {
            TokenKind::Keyword(
                Keyword::Void
                | Keyword::Bool
                | Keyword::Char
                | Keyword::Wchar
                | Keyword::Int
                | Keyword::Float
                | Keyword::Double
                | Keyword::Signed
                | Keyword::Unsigned
                | Keyword::Long
                | Keyword::Short,
            ) => self.parse_simple_type()?,
            TokenKind::Keyword(
                Keyword::Class | Keyword::Struct | Keyword::Union | Keyword::Enum,
            ) => self.parse_struct_or_enum()?,
            TokenKind::Keyword(Keyword::Typename) => {
                self.next()?;
                let name = self.parse_qualified_name()?;
                Arc::new(CppType::Tbd(TbdType { name }))
            }
            TokenKind::Identifier(ref ident) if IGNORED_SPECIFIERS.contains(&ident.as_str()) => {
                self.next()?;
                return self.parse_type_specifier();
            }
            TokenKind::Identifier(_) | TokenKind::Punct(Punct::Scope) => {
                self.parse_named_type()?
            }
            _ => {
                return Err(ParseError::Syntax {
                    loc: token.loc.clone(),
                    message: format!("cannot parse '{}' as a type", token),
                })
            }
        };

        // Trailing const: `int const`.
        let mut ty = base;
        loop {
            let token = self.peek(0)?.clone();
            match token.kind {
                TokenKind::Keyword(Keyword::Const) => {
                    is_const = true;
                    self.next()?;
                }
                TokenKind::Keyword(Keyword::Volatile) => {
                    self.next()?;
                }
                _ => break,
            }
        }
        if is_const {
            ty = CppType::const_of(ty);
        }
        Ok(ty)
    }

    fn parse_simple_type(&mut self) -> Result<Arc<CppType>, ParseError> {
        let mut kind: Option<SimpleKind> = None;
        let mut flags = 0u32;
        loop {
            let token = self.peek(0)?.clone();
            match token.kind {
                TokenKind::Keyword(Keyword::Void) => {
                    kind = Some(SimpleKind::Void);
                    self.next()?;
                }
                TokenKind::Keyword(Keyword::Bool) => {
                    kind = Some(SimpleKind::Bool);
                    self.next()?;
                }
                TokenKind::Keyword(Keyword::Char) => {
                    kind = Some(SimpleKind::Char);
                    self.next()?;
                }
                TokenKind::Keyword(Keyword::Wchar) => {
                    kind = Some(SimpleKind::WChar);
                    self.next()?;
                }
                TokenKind::Keyword(Keyword::Int) => {
                    kind = Some(SimpleKind::Int);
                    self.next()?;
                }
                TokenKind::Keyword(Keyword::Float) => {
                    kind = Some(SimpleKind::Float);
                    self.next()?;
                }
                TokenKind::Keyword(Keyword::Double) => {
                    kind = Some(SimpleKind::Double);
                    self.next()?;
                }
                TokenKind::Keyword(Keyword::Signed) => {
                    flags |= SimpleType::F_SIGNED;
                    self.next()?;
                }
                TokenKind::Keyword(Keyword::Unsigned) => {
                    flags |= SimpleType::F_UNSIGNED;
                    self.next()?;
                }
                TokenKind::Keyword(Keyword::Short) => {
                    flags |= SimpleType::F_SHORT;
                    self.next()?;
                }
                TokenKind::Keyword(Keyword::Long) => {
                    if (flags & SimpleType::F_LONG) != 0 {
                        flags = (flags & !SimpleType::F_LONG) | SimpleType::F_LONGLONG;
                    } else {
                        flags |= SimpleType::F_LONG;
                    }
                    self.next()?;
                }
                _ => break,
            }
        }
        // `unsigned` / `long` alone mean int.
        let kind = kind.unwrap_or(SimpleKind::Int);
        Ok(Arc::new(CppType::Simple(SimpleType { kind, flags })))
    }

    /// Pointer/reference/array marks with no declarator name, as used in
    /// parameter types and template arguments.
    fn parse_abstract_declarator(
        &mut self,
        base: Arc<CppType>,
    ) -> Result<Arc<CppType>, ParseError> {
        let mut ty = base;
        loop {
            let token = self.peek(0)?.clone();
            match token.kind {
                TokenKind::Punct(Punct::Star) => {
                    self.next()?;
                    ty = CppType::pointer_to(ty);
                }
                TokenKind::Punct(Punct::Amp) => {
                    self.next()?;
                    ty = CppType::reference_to(ty);
                }
                TokenKind::Keyword(Keyword::Const) => {
                    self.next()?;
                    ty = CppType::const_of(ty);
                }
                TokenKind::Punct(Punct::LBracket) => {
                    self.next()?;
                    let bound_tokens = self.collect_until(&[Punct::RBracket])?;
                    self.expect_punct(Punct::RBracket, "array bound")?;
                    let bound = if bound_tokens.is_empty() {
                        None
                    } else {
                        Some(parse_expr_or_opaque(&bound_tokens))
                    };
                    ty = Arc::new(CppType::Array { element: ty, bound });
                }
                _ => return Ok(ty),
            }
        }
    }

    // ========================================================================
    // Declarators and simple declarations
    // ========================================================================

    fn parse_declarator(&mut self, base: Arc<CppType>) -> Result<Declarator, ParseError> {
        let mut ty = base;

        // Pointer and reference marks, with interleaved const.
        loop {
            let token = self.peek(0)?.clone();
            match token.kind {
                TokenKind::Punct(Punct::Star) => {
                    self.next()?;
                    ty = CppType::pointer_to(ty);
                }
                TokenKind::Punct(Punct::Amp) => {
                    self.next()?;
                    ty = CppType::reference_to(ty);
                }
                TokenKind::Keyword(Keyword::Const) => {
                    self.next()?;
                    ty = CppType::const_of(ty);
                }
                _ => break,
            }
        }

        // Function-pointer declarator: `(*name)(params)`.
        if self.peek(0)?.is_punct(Punct::LParen) && self.peek(1)?.is_punct(Punct::Star) {
            self.next()?;
            self.next()?;
            let name = match self.peek(0)?.identifier() {
                Some(name) => {
                    let name = QualifiedName::simple(name.to_string());
                    self.next()?;
                    Some(name)
                }
                None => None,
            };
            self.expect_punct(Punct::RParen, "function pointer declarator")?;
            self.expect_punct(Punct::LParen, "function pointer parameters")?;
            let (params, variadic) = self.parse_parameter_list()?;
            let mut flags = 0;
            if variadic {
                flags |= FunctionSignature::F_VARIADIC;
            }
            let signature = FunctionSignature {
                return_type: ty,
                params,
                flags,
            };
            return Ok(Declarator {
                name,
                ty: CppType::pointer_to(Arc::new(CppType::Function(signature))),
                signature: None,
                fn_flags: 0,
                initializer: None,
            });
        }

        // The declared name, when present.
        let name = {
            let token = self.peek(0)?.clone();
            match &token.kind {
                TokenKind::Identifier(_) | TokenKind::Punct(Punct::Scope) => {
                    Some(self.parse_qualified_name()?)
                }
                TokenKind::Keyword(Keyword::Operator) => {
                    self.next()?;
                    let mut spelled = String::from("operator");
                    while !self.peek(0)?.is_punct(Punct::LParen) && !self.peek(0)?.is_eof() {
                        let token = self.next()?;
                        spelled.push_str(&token.text);
                    }
                    Some(QualifiedName::simple(spelled))
                }
                _ => None,
            }
        };

        // Suffixes: function parameters or array bounds.
        if self.eat_punct(Punct::LParen)? {
            let (params, variadic) = self.parse_parameter_list()?;
            let mut sig_flags = 0u32;
            if variadic {
                sig_flags |= FunctionSignature::F_VARIADIC;
            }
            let mut fn_flags = 0u32;
            if self.eat_keyword(Keyword::Const)? {
                sig_flags |= FunctionSignature::F_CONST_METHOD;
            }
            self.finish_function_suffix(&mut fn_flags)?;
            let signature = FunctionSignature {
                return_type: ty.clone(),
                params,
                flags: sig_flags,
            };
            return Ok(Declarator {
                name,
                ty,
                signature: Some(signature),
                fn_flags,
                initializer: None,
            });
        }

        loop {
            if !self.peek(0)?.is_punct(Punct::LBracket) {
                break;
            }
            self.next()?;
            let bound_tokens = self.collect_until(&[Punct::RBracket])?;
            self.expect_punct(Punct::RBracket, "array bound")?;
            let bound = if bound_tokens.is_empty() {
                None
            } else {
                Some(parse_expr_or_opaque(&bound_tokens))
            };
            ty = Arc::new(CppType::Array { element: ty, bound });
        }

        // Initializer.
        let initializer = if self.eat_punct(Punct::Assign)? {
            let tokens = self.collect_until(&[Punct::Comma, Punct::Semicolon])?;
            Some(parse_expr_or_opaque(&tokens))
        } else {
            None
        };

        Ok(Declarator {
            name,
            ty,
            signature: None,
            fn_flags: 0,
            initializer,
        })
    }

    /// After a function's parameter list and cv-qualifier: pure-virtual
    /// marker, ignored exception specs, and an inline body (skipped).
    fn finish_function_suffix(&mut self, flags: &mut u32) -> Result<(), ParseError> {
        // `throw(...)` / identifier-spelled suffixes like `noexcept`.
        loop {
            let token = self.peek(0)?.clone();
            match &token.kind {
                TokenKind::Identifier(ident) if IGNORED_SPECIFIERS.contains(&ident.as_str()) => {
                    self.next()?;
                }
                TokenKind::Identifier(ident) if ident == "throw" || ident == "noexcept" => {
                    self.next()?;
                    if self.eat_punct(Punct::LParen)? {
                        self.collect_until(&[Punct::RParen])?;
                        self.expect_punct(Punct::RParen, "exception specification")?;
                    }
                }
                _ => break,
            }
        }

        if self.eat_punct(Punct::Assign)? {
            let token = self.next()?;
            if matches!(token.kind, TokenKind::Integer(0)) {
                *flags |= FunctionDecl::F_PURE_VIRTUAL;
            }
            // `= default` / `= delete` fall through untagged.
        }

        // Constructor initializer list, then an inline body; both are
        // interface-irrelevant.
        if self.peek(0)?.is_punct(Punct::Colon) {
            self.collect_until(&[Punct::LBrace, Punct::Semicolon])?;
        }
        if self.eat_punct(Punct::LBrace)? {
            self.skip_balanced_braces()?;
        }
        Ok(())
    }

    fn parse_parameter_list(&mut self) -> Result<(Vec<Parameter>, bool), ParseError> {
        let mut params = Vec::new();
        let mut variadic = false;

        if self.eat_punct(Punct::RParen)? {
            return Ok((params, variadic));
        }
        // `(void)` means no parameters.
        if self.peek(0)?.is_keyword(Keyword::Void) && self.peek(1)?.is_punct(Punct::RParen) {
            self.next()?;
            self.next()?;
            return Ok((params, variadic));
        }

        loop {
            if self.eat_punct(Punct::Ellipsis)? {
                variadic = true;
                self.expect_punct(Punct::RParen, "parameter list")?;
                break;
            }
            let base = self.parse_type_specifier()?;
            let declarator = self.parse_declarator(base)?;
            let ty = match declarator.signature {
                Some(sig) => CppType::pointer_to(Arc::new(CppType::Function(sig))),
                None => declarator.ty,
            };
            // A parameter default was collected by the declarator as its
            // initializer.
            params.push(Parameter {
                name: declarator.name.map(|n| n.last().to_string()),
                ty,
                default: declarator.initializer,
            });
            if self.eat_punct(Punct::Comma)? {
                continue;
            }
            self.expect_punct(Punct::RParen, "parameter list")?;
            break;
        }
        Ok((params, variadic))
    }

    /// A declaration that is not a namespace/template/typedef/using: some
    /// specifiers, a type, and a comma-separated declarator list.
    fn parse_simple_declaration(&mut self) -> Result<(), ParseError> {
        let start_loc = self.peek(0)?.loc.clone();
        let mut flags = 0u32;
        let mut is_static = false;

        loop {
            let token = self.peek(0)?.clone();
            match &token.kind {
                TokenKind::Keyword(Keyword::Static) => {
                    is_static = true;
                    flags |= FunctionDecl::F_STATIC;
                    self.next()?;
                }
                TokenKind::Keyword(Keyword::Virtual) => {
                    flags |= FunctionDecl::F_VIRTUAL;
                    self.next()?;
                }
                TokenKind::Keyword(Keyword::Inline) => {
                    flags |= FunctionDecl::F_INLINE;
                    self.next()?;
                }
                TokenKind::Identifier(ident) if IGNORED_SPECIFIERS.contains(&ident.as_str()) => {
                    self.next()?;
                }
                _ => break,
            }
        }

        let base = self.parse_type_specifier()?;

        // A bare `struct X { ... };` or `enum E { ... };` with no
        // declarators.
        if self.eat_punct(Punct::Semicolon)? {
            return Ok(());
        }

        loop {
            let declarator = self.parse_declarator(base.clone())?;
            self.install_declarator(declarator, flags, is_static, &start_loc)?;

            if self.eat_punct(Punct::Comma)? {
                continue;
            }
            // An inline function body ends the declaration without a
            // semicolon.
            if self.eat_punct(Punct::Semicolon)? {
                break;
            }
            let token = self.peek(0)?.clone();
            if token.is_eof() || token.is_punct(Punct::RBrace) {
                break;
            }
            return Err(ParseError::Syntax {
                loc: token.loc.clone(),
                message: format!("expected ';' after declaration, found '{}'", token),
            });
        }
        Ok(())
    }

    fn install_declarator(
        &mut self,
        declarator: Declarator,
        flags: u32,
        is_static: bool,
        loc: &SourceLoc,
    ) -> Result<(), ParseError> {
        let Some(name) = declarator.name.clone() else {
            // An unnamed declarator at declaration level carries nothing.
            return Ok(());
        };

        // Out-of-line definitions (`int Foo::bar(...) { ... }`) re-state a
        // declaration that already lives in the class; they add nothing to
        // the interface.
        if name.components.len() > 1 {
            return Ok(());
        }
        let simple_name = name.last().to_string();

        match declarator.signature {
            Some(signature) => {
                let mut fn_flags = flags | declarator.fn_flags;
                if is_static {
                    fn_flags |= FunctionDecl::F_STATIC;
                }
                if simple_name.starts_with("operator") {
                    fn_flags |= FunctionDecl::F_OPERATOR;
                }
                let decl = function_group(FunctionDecl {
                    name: simple_name,
                    signature,
                    flags: fn_flags,
                    access: self.current_access,
                    comment: None,
                    loc: loc.clone(),
                });
                self.declare_with_diagnostics(self.current_scope, decl, loc);
            }
            None => {
                let decl = Declaration::Variable(InstanceDecl {
                    name: simple_name,
                    ty: declarator.ty,
                    initializer: declarator.initializer,
                    is_static,
                    access: self.current_access,
                    comment: None,
                    loc: loc.clone(),
                });
                self.declare_with_diagnostics(self.current_scope, decl, loc);
            }
        }
        Ok(())
    }

    /// Declare into a scope, downgrading scope diagnostics to warnings
    /// (the later declaration wins).
    fn declare_with_diagnostics(&mut self, scope: ScopeId, decl: Declaration, loc: &SourceLoc) {
        if let Err(err) = self.arena.declare(scope, decl) {
            self.warn(err.to_string(), loc.clone());
        }
    }

    // ========================================================================
    // Post-parse resolution
    // ========================================================================

    /// Resolve every remaining TBD type in every scope against the final
    /// state of the arena. Cyclic template dependencies surface as
    /// warnings and leave the placeholder in place.
    pub fn resolve_types(&mut self) {
        let global = self.arena.global();
        let scope_count = self.arena.scope_count();
        for index in 0..scope_count {
            let scope_id = ScopeId(index as u32);
            // Template scopes (and anything inside one) keep their TBD
            // placeholders until instantiation binds the parameters; only
            // instantiated copies and ordinary scopes resolve.
            if self.in_template_scope(scope_id) {
                continue;
            }
            let names: Vec<String> = self
                .arena
                .scope(scope_id)
                .declarations()
                .map(|d| d.name().to_string())
                .collect();
            for name in names {
                let Some(decl) = self.arena.scope(scope_id).get(&name).cloned() else {
                    continue;
                };
                if let Some(resolved) = self.resolve_declaration(decl, scope_id, global) {
                    self.arena.replace(scope_id, resolved);
                }
            }
        }
    }

    /// True when a scope, or any lexical ancestor, is a template scope.
    fn in_template_scope(&self, id: ScopeId) -> bool {
        let mut current = Some(id);
        while let Some(scope_id) = current {
            let scope = self.arena.scope(scope_id);
            if scope.kind == ScopeKind::Template {
                return true;
            }
            current = scope.parent;
        }
        false
    }

    fn resolve_declaration(
        &mut self,
        decl: Declaration,
        scope: ScopeId,
        global: ScopeId,
    ) -> Option<Declaration> {
        match decl {
            Declaration::Typedef(mut d) => {
                if d.ty.is_fully_specified() {
                    return None;
                }
                match ty::resolve_type(&d.ty, &self.arena, scope, global) {
                    Ok(ty) => {
                        d.ty = ty;
                        Some(Declaration::Typedef(d))
                    }
                    Err(err) => {
                        self.warn(err.to_string(), d.loc.clone());
                        None
                    }
                }
            }
            Declaration::Variable(mut d) => {
                if d.ty.is_fully_specified() {
                    return None;
                }
                match ty::resolve_type(&d.ty, &self.arena, scope, global) {
                    Ok(ty) => {
                        d.ty = ty;
                        Some(Declaration::Variable(d))
                    }
                    Err(err) => {
                        self.warn(err.to_string(), d.loc.clone());
                        None
                    }
                }
            }
            Declaration::Functions(mut group) => {
                let mut changed = false;
                for overload in &mut group.overloads {
                    let sig = Arc::new(CppType::Function(overload.signature.clone()));
                    if sig.is_fully_specified() {
                        continue;
                    }
                    match ty::resolve_type(&sig, &self.arena, scope, global) {
                        Ok(resolved) => {
                            if let CppType::Function(sig) = &*resolved {
                                overload.signature = sig.clone();
                                changed = true;
                            }
                        }
                        Err(err) => {
                            self.warn(err.to_string(), overload.loc.clone());
                        }
                    }
                }
                changed.then_some(Declaration::Functions(group))
            }
            _ => None,
        }
    }
}

/// What a declarator parse produced.
struct Declarator {
    name: Option<QualifiedName>,
    ty: Arc<CppType>,
    /// Present when the declarator had a parameter list.
    signature: Option<FunctionSignature>,
    fn_flags: u32,
    initializer: Option<Expression>,
}

/// Parse tokens as an expression, or keep them as opaque text.
fn parse_expr_or_opaque(tokens: &[Token]) -> Expression {
    match expr::parse_expression(tokens) {
        Ok(expression) => expression,
        Err(_) => {
            let text: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
            Expression::Unparsed(text.join(" "))
        }
    }
}
