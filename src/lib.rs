//! Compiler for a Pascal subset.
//!
//! # Front end
//! A program comes from a single source file. The file is first split
//! into tokens by [`lex`], which the parser in [`parse`] pulls one at a
//! time. Parsing and semantic analysis happen in the same pass: names are
//! resolved against [`symbols`], operands are checked and converted
//! according to [`types`], and constant expressions are folded with
//! [`ops`]. The result is a fully typed tree, described in [`ast`].
//!
//! # Back end
//! [`codegen`] walks the typed tree of every function once and lowers it
//! to a stack machine over 32-bit x86. The resulting listing, modelled in
//! [`arch`], is MASM32 source that links against the MASM32 runtime.
//!
//! Every phase stops at its first error, see [`error`].

use std::{
    fmt::{self, Display},
    io::BufRead,
};

#[macro_use]
mod macros;

pub mod arch;
pub mod ast;
pub mod codegen;
pub mod error;
pub mod lex;
pub mod ops;
pub mod parse;
pub mod semantic;
pub mod source;
pub mod symbols;
pub mod types;

use crate::{
    arch::AsmCode,
    ast::Program,
    error::CompileError,
    lex::{Lexer, Token, Tokens},
    source::Located,
};

/// Splits a source file into tokens, end of file included.
pub fn tokenize<R: BufRead>(reader: R, name: &str) -> Result<Vec<Located<Token>>, CompileError> {
    let (start, chars) = source::consume(reader, name);
    let tokens = Lexer::new(start, chars).try_exhaustive()?;

    Ok(tokens)
}

/// Parses and checks a source file.
pub fn parse_source<R: BufRead>(reader: R, name: &str) -> Result<Program, CompileError> {
    let (start, chars) = source::consume(reader, name);
    let tokens = Tokens::new(Lexer::new(start, chars))?;

    parse::parse(tokens)
}

/// Runs every phase, returning the typed tree along with its listing.
pub fn compile<R: BufRead>(reader: R, name: &str) -> Result<(Program, AsmCode), CompileError> {
    let program = parse_source(reader, name)?;
    let code = codegen::generate(&program)?;

    Ok((program, code))
}

/// Token listing, one row per token.
pub struct TokenTable<'a>(pub &'a [Located<Token>]);

impl Display for TokenTable<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(fmt, "row | col | kind | text | value")?;

        for token in self.0 {
            let start = token.location().start();
            let value = match token.val() {
                Token::Char(c) => (*c as u32).to_string(),
                Token::String(string) => string.to_string(),
                token => token.lexeme(),
            };

            writeln!(
                fmt,
                "{} | {} | {} | {} | {}",
                start.line(),
                start.column(),
                token.val().class(),
                token.val().lexeme(),
                value
            )?;
        }

        Ok(())
    }
}
