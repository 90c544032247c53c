//! Syntax-directed semantic analysis.
//!
//! This is a recursive descent parser with one token of lookahead and no
//! backtracking. Semantic actions run as each production is reduced:
//! names are resolved against the active scopes, types are checked and
//! converted, and constant subexpressions are folded. The result is a
//! fully typed [`Program`], there is no separate type checking pass.
//!
//! The grammar is split by concern:
//! - [`decl`]: blocks, declarations, types, typed constants and functions.
//! - [`expr`]: expressions, designators and calls.
//! - [`stmt`]: statements.
//!
//! # Errors
//! Parsing stops at the first error, which is either a [`SyntaxError`]
//! (the current token fits no production) or a
//! [`crate::semantic::SemanticError`].

use std::{
    fmt::{self, Display},
    rc::Rc,
};

use thiserror::Error;

use crate::{
    ast::{Ast, Function, Node, NodeId, NodeKind, Program},
    error::CompileError,
    lex::{Identifier, Keyword, Token, TokenStream},
    semantic::SemanticError,
    source::{Located, Location},
    symbols::{Scopes, SymbolTable},
    types::{FunctionId, Signature, Type},
};

mod decl;
mod expr;
mod stmt;

pub type Parse<T> = Result<T, CompileError>;

/// Something the grammar was willing to accept.
#[derive(Debug, Clone, PartialEq)]
pub enum Expected {
    Token(Token),
    Identifier,
    Expression,
    Type,
    Statement,
}

impl Display for Expected {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Token(token) => write!(fmt, "{}", token),
            Expected::Identifier => fmt.write_str("identifier"),
            Expected::Expression => fmt.write_str("expression"),
            Expected::Type => fmt.write_str("type"),
            Expected::Statement => fmt.write_str("statement"),
        }
    }
}

/// Alternatives at a grammar decision point.
#[derive(Debug)]
pub struct OneOf(pub Vec<Expected>);

impl Display for OneOf {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, expected) in self.0.iter().enumerate() {
            if i > 0 {
                fmt.write_str(" or ")?;
            }

            write!(fmt, "{}", expected)?;
        }

        Ok(())
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SyntaxError {
    #[error("Required {expected} but found {found}")]
    Unexpected { expected: OneOf, found: Token },
}

/// Parses a whole program out of a token stream.
pub fn parse<T: TokenStream>(tokens: T) -> Parse<Program> {
    let parser = Parser {
        tokens,
        scopes: Scopes::new(SymbolTable::locals(0)),
        ast: Ast::default(),
        functions: Vec::new(),
        next_function: FunctionId::MAIN.0 + 1,
        loops: 0,
        level: 0,
    };

    parser.program()
}

struct Parser<T: TokenStream> {
    tokens: T,
    scopes: Scopes,
    ast: Ast,
    functions: Vec<Function>,
    next_function: u32,

    /// Loop nesting depth within the current function.
    loops: u32,

    /// Lexical level of the block being parsed.
    level: u32,
}

impl<T: TokenStream> Parser<T> {
    fn program(mut self) -> Parse<Program> {
        let start = self.location();
        let name = if self.eat(&Token::Keyword(Keyword::Program))? {
            let name = self.id()?;
            self.expect(Token::Semicolon)?;
            name
        } else {
            Located::at(Identifier::new("Main"), start)
        };

        log::debug!("Parsing program `{}`", name.as_ref());

        let body = self.block()?;
        self.expect(Token::Period)?;

        if !self.at(&Token::Eof) {
            return Err(self.unexpected(vec![Expected::Token(Token::Eof)]));
        }

        let signature = Rc::new(Signature {
            id: FunctionId::MAIN,
            name,
            parameters: SymbolTable::parameters(0),
            result: Type::Nil,
            level: 0,
        });

        let main = Function {
            signature,
            locals: self.scopes.into_outermost(),
            body,
        };

        Ok(Program {
            ast: self.ast,
            functions: self.functions,
            main,
        })
    }

    fn token(&self) -> &Token {
        self.tokens.current().val()
    }

    fn location(&self) -> Location {
        self.tokens.current().location().clone()
    }

    fn at(&self, token: &Token) -> bool {
        self.token() == token
    }

    /// Consumes the current token.
    fn bump(&mut self) -> Parse<Located<Token>> {
        let token = self.tokens.current().clone();
        self.tokens.advance()?;

        Ok(token)
    }

    /// Consumes the current token only if it matches.
    fn eat(&mut self, token: &Token) -> Parse<bool> {
        if self.at(token) {
            self.bump()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect(&mut self, token: Token) -> Parse<Location> {
        if self.at(&token) {
            Ok(self.bump()?.location().clone())
        } else {
            Err(self.unexpected(vec![Expected::Token(token)]))
        }
    }

    fn keyword(&mut self, keyword: Keyword) -> Parse<Location> {
        self.expect(Token::Keyword(keyword))
    }

    fn id(&mut self) -> Parse<Located<Identifier>> {
        match self.token() {
            Token::Id(_) => {
                let (location, token) = self.bump()?.split();
                match token {
                    Token::Id(id) => Ok(Located::at(id, location)),
                    _ => unreachable!(),
                }
            }

            _ => Err(self.unexpected(vec![Expected::Identifier])),
        }
    }

    /// Comma-separated list of identifiers.
    fn ids(&mut self) -> Parse<Vec<Located<Identifier>>> {
        let mut ids = vec![self.id()?];
        while self.eat(&Token::Comma)? {
            ids.push(self.id()?);
        }

        Ok(ids)
    }

    fn unexpected(&self, expected: Vec<Expected>) -> CompileError {
        let error = SyntaxError::Unexpected {
            expected: OneOf(expected),
            found: self.token().clone(),
        };

        Located::at(error, self.location()).into()
    }

    fn node(&mut self, location: Location, ty: Type, kind: NodeKind) -> NodeId {
        self.ast.push(Node { location, ty, kind })
    }
}

/// Attaches a location to a semantic check.
fn located<T>(result: Result<T, SemanticError>, location: &Location) -> Parse<T> {
    result.map_err(|error| Located::at(error, location.clone()).into())
}

/// Fails with a semantic error.
fn fail<T>(error: SemanticError, location: &Location) -> Parse<T> {
    located(Err(error), location)
}
