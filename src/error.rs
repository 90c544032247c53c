//! Error reporting.
//!
//! Every phase fails with its own located error type. [`CompileError`]
//! unifies them for the driver, which either prints a single line per
//! error or renders [`Diagnostics`] with a source excerpt.

use crate::{
    codegen::GenerateError,
    lex::LexerError,
    parse::SyntaxError,
    semantic::SemanticError,
    source::{Located, Location},
};

use std::{
    error::Error,
    fmt::{self, Display},
};

mod sealed {
    pub trait Sealed {}
}

pub trait LocatedError: sealed::Sealed {
    fn source(&self) -> &dyn Error;
    fn location(&self) -> &Location;
}

/// Error classes as reported to users.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Scanning or semantic analysis.
    Lexical,

    /// Token mismatch at a grammar decision point.
    Syntax,

    /// Construct with no lowering to machine code.
    Generate,
}

impl ErrorKind {
    /// Process exit status for this class of error.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Lexical => 2,
            ErrorKind::Syntax => 3,
            ErrorKind::Generate => 4,
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Lexical => "Lexical",
            ErrorKind::Syntax => "Syntax",
            ErrorKind::Generate => "Generation",
        };

        fmt.write_str(name)
    }
}

/// First error found in a compilation unit.
#[derive(Debug)]
pub enum CompileError {
    Lexical(Located<LexerError>),
    Semantic(Located<SemanticError>),
    Syntax(Located<SyntaxError>),
    Generate(Located<GenerateError>),
}

impl CompileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompileError::Lexical(_) | CompileError::Semantic(_) => ErrorKind::Lexical,
            CompileError::Syntax(_) => ErrorKind::Syntax,
            CompileError::Generate(_) => ErrorKind::Generate,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }

    fn error(&self) -> &dyn Error {
        match self {
            CompileError::Lexical(error) => error.as_ref(),
            CompileError::Semantic(error) => error.as_ref(),
            CompileError::Syntax(error) => error.as_ref(),
            CompileError::Generate(error) => error.as_ref(),
        }
    }

    pub fn location(&self) -> &Location {
        match self {
            CompileError::Lexical(error) => error.location(),
            CompileError::Semantic(error) => error.location(),
            CompileError::Syntax(error) => error.location(),
            CompileError::Generate(error) => error.location(),
        }
    }
}

impl Display for CompileError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = self.location().start();
        write!(
            fmt,
            "{} error at {}:{}: {}",
            self.kind(),
            start.line(),
            start.column(),
            self.error()
        )
    }
}

impl Error for CompileError {}

impl From<Located<LexerError>> for CompileError {
    fn from(error: Located<LexerError>) -> Self {
        CompileError::Lexical(error)
    }
}

impl From<Located<SemanticError>> for CompileError {
    fn from(error: Located<SemanticError>) -> Self {
        CompileError::Semantic(error)
    }
}

impl From<Located<SyntaxError>> for CompileError {
    fn from(error: Located<SyntaxError>) -> Self {
        CompileError::Syntax(error)
    }
}

impl From<Located<GenerateError>> for CompileError {
    fn from(error: Located<GenerateError>) -> Self {
        CompileError::Generate(error)
    }
}

impl sealed::Sealed for CompileError {}

impl LocatedError for CompileError {
    fn source(&self) -> &dyn Error {
        self.error()
    }

    fn location(&self) -> &Location {
        CompileError::location(self)
    }
}

/// Renders errors along with the source lines they point to.
pub struct Diagnostics {
    kind: &'static str,
    errors: Vec<Box<dyn 'static + LocatedError>>,
}

impl Diagnostics {
    pub fn kind(self, kind: &'static str) -> Self {
        Diagnostics { kind, ..self }
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Diagnostics {
            kind: "error",
            errors: Default::default(),
        }
    }
}

impl<E: 'static + LocatedError> From<E> for Diagnostics {
    fn from(error: E) -> Self {
        Diagnostics {
            errors: vec![Box::new(error)],
            ..Default::default()
        }
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Diagnostics { kind, errors } = self;

        if errors.is_empty() {
            return writeln!(fmt, "No errors were reported");
        }

        for error in errors {
            writeln!(fmt, "{}: {}", kind, error.source())?;

            let location = error.location();
            writeln!(fmt, " --> {}", location)?;

            let digits = location.end().line().to_string().chars().count();
            writeln!(fmt, "{:digits$} |", "", digits = digits)?;

            for line_number in location.start().line()..=location.end().line() {
                let line = location.source().with_line(line_number, |line| {
                    writeln!(fmt, "{:>digits$} | {}", line_number, line, digits = digits)
                });

                if let Some(result) = line {
                    result?;
                }
            }

            // Multi-line spans only underline their first column
            let from = location.start().column();
            let to = if location.end().line() == location.start().line() {
                location.end().column().max(from + 1) - 1
            } else {
                from
            };

            let skip = (from - 1) as usize;
            let highlight = (to - from + 1) as usize;

            writeln!(
                fmt,
                "{:digits$} | {:skip$}{:^<highlight$}",
                "",
                "",
                "",
                digits = digits,
                skip = skip,
                highlight = highlight
            )?;

            writeln!(fmt)?;
        }

        let error_or_errors = if errors.len() == 1 { "error" } else { "errors" };
        writeln!(
            fmt,
            "Build failed with {} {}",
            errors.len(),
            error_or_errors
        )
    }
}

impl<E: Error> sealed::Sealed for Located<E> {}

impl<E: Error> LocatedError for Located<E> {
    fn source(&self) -> &dyn Error {
        self.as_ref()
    }

    fn location(&self) -> &Location {
        Located::location(self)
    }
}
