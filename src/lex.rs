//! Lexical analysis.
//!
//! # Tokenization
//! This is the first phase of the compiler. It breaks a character stream
//! (see [`crate::source::consume()`]) into lexical units named tokens.
//! Whitespace and comments are dropped along the way. Every token is
//! paired with its location in the original source, which allows errors
//! in later phases to be traced back to it.
//!
//! # Token contents
//! Operators, punctuation and keywords carry no lexeme, since what they
//! are is all there is to know about them. Identifiers keep their original
//! spelling. Literal constants are resolved to their values instead of
//! keeping their lexemes.
//!
//! # Language rules
//! - Keywords and identifiers are case-insensitive: `begin`, `BEGIN` and
//!   `BeGiN` all result in [`Keyword::Begin`].
//! - Quoted literals of exactly one character are character literals,
//!   anything else between quotes is a string literal. `''` inside quotes
//!   stands for a single apostrophe.
//! - `#65` is a character literal by code and `$FF` a hexadecimal integer.
//! - Comments come as `{ ... }`, `(* ... *)` or `// ...` up to end of line.
//!
//! # Errors
//! The first error stops the lexer: later calls return nothing.

use crate::source::{Located, Location};
use std::{
    fmt::{self, Display},
    io,
    iter::Peekable,
    rc::Rc,
    str::FromStr,
};

use thiserror::Error;

// Case-insensitive
pub use unicase::Ascii as NoCase;

/// Scanning error.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// I/O error from the character stream.
    #[error("I/O error")]
    Input(#[from] io::Error),

    /// Unknown or unexpected character in the input stream.
    #[error("Bad character {0:?} in input stream")]
    BadChar(char),

    /// A string literal reached the end of its line.
    #[error("Missing terminating ' character")]
    UnterminatedString,

    /// A comment reached the end of the file.
    #[error("Unclosed comment")]
    UnclosedComment,

    /// A numeric literal is not well formed.
    #[error("Malformed number `{0}`")]
    MalformedNumber(String),

    /// An integer constant is out of range.
    #[error("Number is too big, valid range is [0, {}]", i32::MAX)]
    IntOverflow,

    /// A character code is out of range.
    #[error("Illegal char constant #{0}")]
    BadCharCode(u32),

    /// `$` or `#` without any digits after it.
    #[error("Digits expected after `{0}`")]
    ExpectedDigits(char),
}

/// An identifier.
///
/// Identifiers compare and hash without regard to ASCII case, but keep
/// their original spelling for display.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(Rc<NoCase<String>>);

impl Identifier {
    /// Builds an identifier out of its spelling.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Identifier(Rc::new(NoCase::new(name.into())))
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.as_ref())
    }
}

/// Result of lexical analysis.
///
/// A token carries enough information to fully describe a lexical entity
/// of the source program.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identifier.
    Id(Identifier),

    /// Keyword.
    Keyword(Keyword),

    /// Integer literal.
    Integer(i32),

    /// Floating point literal.
    Double(f64),

    /// Character literal.
    Char(u8),

    /// String literal.
    String(Rc<str>),

    /// `+`
    Plus,

    /// `-`
    Minus,

    /// `*`
    Times,

    /// `/`
    Slash,

    /// `=`
    Equal,

    /// `<>`
    NotEqual,

    /// `<`
    Less,

    /// `<=`
    LessOrEqual,

    /// `>`
    Greater,

    /// `>=`
    GreaterOrEqual,

    /// `:=`
    Assign,

    /// `:`
    Colon,

    /// `;`
    Semicolon,

    /// `,`
    Comma,

    /// `.`
    Period,

    /// `..`
    DoubleDot,

    /// `(`
    OpenParen,

    /// `)`
    CloseParen,

    /// `[`
    OpenSquare,

    /// `]`
    CloseSquare,

    /// End of input.
    Eof,
}

impl Token {
    /// Lexical class of the token, as shown in token tables.
    pub fn class(&self) -> &'static str {
        use Token::*;

        match self {
            Id(_) => "identifier",
            Keyword(_) => "keyword",
            Integer(_) => "integer",
            Double(_) => "double",
            Char(_) => "char",
            String(_) => "string",
            Semicolon | Comma | Period | DoubleDot | OpenParen | CloseParen | OpenSquare
            | CloseSquare => "separator",
            Eof => "end of file",
            _ => "operator",
        }
    }

    /// Source form of the token.
    pub fn lexeme(&self) -> std::string::String {
        use Token::*;

        let text = match self {
            Id(id) => return id.to_string(),
            Keyword(keyword) => return keyword.to_string(),
            Integer(integer) => return integer.to_string(),
            Double(double) => return format!("{:?}", double),
            Char(c) => return format!("'{}'", *c as char),
            String(string) => return format!("'{}'", string.replace('\'', "''")),
            Plus => "+",
            Minus => "-",
            Times => "*",
            Slash => "/",
            Equal => "=",
            NotEqual => "<>",
            Less => "<",
            LessOrEqual => "<=",
            Greater => ">",
            GreaterOrEqual => ">=",
            Assign => ":=",
            Colon => ":",
            Semicolon => ";",
            Comma => ",",
            Period => ".",
            DoubleDot => "..",
            OpenParen => "(",
            CloseParen => ")",
            OpenSquare => "[",
            CloseSquare => "]",
            Eof => "",
        };

        text.to_owned()
    }
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Id(id) => write!(fmt, "identifier `{}`", id),
            Token::Keyword(keyword) => write!(fmt, "keyword `{}`", keyword),
            Token::Integer(_) | Token::Double(_) | Token::Char(_) | Token::String(_) => {
                write!(fmt, "literal `{}`", self.lexeme())
            }
            Token::Eof => fmt.write_str("end of file"),
            _ => write!(fmt, "`{}`", self.lexeme()),
        }
    }
}

macro_rules! keywords {
    ($($keyword:ident => $text:literal),* $(,)?) => {
        /// A keyword.
        #[derive(Copy, Clone, Debug, PartialEq, Eq)]
        pub enum Keyword {
            $($keyword),*
        }

        impl Display for Keyword {
            fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
                let string = match self {
                    $(Keyword::$keyword => $text),*
                };

                fmt.write_str(string)
            }
        }

        impl FromStr for Keyword {
            type Err = ();

            fn from_str(string: &str) -> Result<Self, Self::Err> {
                const KEYWORDS: &[(NoCase<&str>, Keyword)] = &[
                    $((NoCase::new($text), Keyword::$keyword)),*
                ];

                KEYWORDS
                    .iter()
                    .find(|&&(name, _)| name == NoCase::new(string))
                    .map(|&(_, keyword)| keyword)
                    .ok_or(())
            }
        }
    };
}

keywords! {
    And       => "and",
    Array     => "array",
    Begin     => "begin",
    Break     => "break",
    Char      => "char",
    Const     => "const",
    Continue  => "continue",
    Div       => "div",
    Do        => "do",
    Double    => "double",
    Downto    => "downto",
    Else      => "else",
    End       => "end",
    For       => "for",
    Function  => "function",
    If        => "if",
    Integer   => "integer",
    Mod       => "mod",
    Not       => "not",
    Of        => "of",
    Or        => "or",
    Procedure => "procedure",
    Program   => "program",
    Read      => "read",
    Readln    => "readln",
    Record    => "record",
    Shl       => "shl",
    Shr       => "shr",
    String    => "string",
    Then      => "then",
    To        => "to",
    Type      => "type",
    Var       => "var",
    While     => "while",
    Write     => "write",
    Writeln   => "writeln",
    Xor       => "xor",
}

/// Pull-based access to a token sequence.
///
/// The parser only ever looks at one token at a time: [`TokenStream::current()`]
/// is the token under the cursor and [`TokenStream::advance()`] moves past it.
pub trait TokenStream {
    /// Moves to the next token. Returns `false` once end of file is current.
    fn advance(&mut self) -> Result<bool, Located<LexerError>>;

    /// The token under the cursor.
    fn current(&self) -> &Located<Token>;
}

/// State machine for lexical analysis.
///
/// A lexer is in one of several states. Both the output of the lexer and
/// its next state are defined by its current state and the next character
/// in the input stream.
pub struct Lexer<S: Iterator> {
    source: Peekable<S>,
    state: State,
    start: Location,
    last: Location,
    pending: Option<Located<Token>>,
    done: bool,
}

/// Possible lexer states.
enum State {
    /// Before the start of a token.
    Start,

    /// Always emits the included token, consuming the current input and
    /// going back to [`State::Start`].
    Complete(Token),

    /// Identifier or keyword.
    Word(String),

    /// Decimal digits.
    Integer(String),

    /// Decimal digits followed by `.`, which might still be the start of `..`.
    IntegerDot(String, Location),

    /// Digits after the decimal point.
    Fraction(String),

    /// Found `e` in a number, a sign or digit must follow.
    ExponentSign(String),

    /// Found the exponent sign, a digit must follow.
    ExponentStart(String),

    /// Exponent digits.
    Exponent(String),

    /// Hexadecimal digits after `$`.
    Hex(String),

    /// Character code digits after `#`.
    CharCode(String),

    /// Inside quotes.
    Quoted(String),

    /// Found a quote inside quotes, might be an escaped apostrophe.
    QuoteEnd(String),

    /// Found `(`, which might open a comment.
    Paren,

    /// `(* ... *)` comment.
    ParenComment,

    /// Found `*` inside a `(* ... *)` comment.
    ParenCommentStar,

    /// `{ ... }` comment.
    BraceComment,

    /// `// ...` comment.
    LineComment,

    /// Found `:`.
    Colon,

    /// Found `<`.
    Less,

    /// Found `>`.
    Greater,

    /// Found `.`.
    Dot,

    /// Found `/`.
    Slash,
}

impl<S> Lexer<S>
where
    S: Iterator<Item = Result<(char, Location), io::Error>>,
{
    /// Creates a lexer in its initial state out of a stream.
    pub fn new(start: Location, source: S) -> Self {
        Lexer {
            source: source.peekable(),
            state: State::Start,
            last: start.clone(),
            start,
            pending: None,
            done: false,
        }
    }

    /// Scans the whole input, stopping at the first error.
    pub fn try_exhaustive(self) -> Result<Vec<Located<Token>>, Located<LexerError>> {
        self.collect()
    }

    /// Tries to build the next token.
    fn lex(&mut self) -> Result<Option<Located<Token>>, Located<LexerError>> {
        use {State::*, Token::*};

        if let Some(token) = self.pending.take() {
            return Ok(Some(token));
        }

        let token = loop {
            let next_char = match self.source.peek() {
                None => None,
                Some(Ok((c, location))) => {
                    // Token boundaries follow the input while nothing is pending
                    if let Start = self.state {
                        self.start = location.clone();
                    }

                    Some(*c)
                }

                Some(Err(_)) => {
                    let error = match self.source.next() {
                        Some(Err(error)) => error,
                        _ => io::Error::new(io::ErrorKind::Other, "lost I/O error"),
                    };

                    return Err(self.fail(error.into()));
                }
            };

            // Main switch table: state changes and output come out of
            // combinations of the current state and the next character
            match (&mut self.state, next_char) {
                (Start, None) => return Ok(None),
                (Start, Some(c)) if c.is_whitespace() => (),

                (Start, Some('+')) => self.state = Complete(Plus),
                (Start, Some('-')) => self.state = Complete(Minus),
                (Start, Some('*')) => self.state = Complete(Times),
                (Start, Some('=')) => self.state = Complete(Equal),
                (Start, Some(';')) => self.state = Complete(Semicolon),
                (Start, Some(',')) => self.state = Complete(Comma),
                (Start, Some('[')) => self.state = Complete(OpenSquare),
                (Start, Some(']')) => self.state = Complete(CloseSquare),
                (Start, Some(')')) => self.state = Complete(CloseParen),
                (Start, Some('(')) => self.state = Paren,
                (Start, Some(':')) => self.state = State::Colon,
                (Start, Some('<')) => self.state = State::Less,
                (Start, Some('>')) => self.state = State::Greater,
                (Start, Some('.')) => self.state = Dot,
                (Start, Some('/')) => self.state = State::Slash,
                (Start, Some('{')) => self.state = BraceComment,
                (Start, Some('$')) => self.state = Hex(std::string::String::new()),
                (Start, Some('#')) => self.state = CharCode(std::string::String::new()),
                (Start, Some('\'')) => self.state = Quoted(std::string::String::new()),
                (Start, Some(c)) if c.is_ascii_alphabetic() || c == '_' => {
                    self.state = Word(c.to_string())
                }

                // The first digit is not consumed here, the integer state
                // takes care of it
                (Start, Some(c)) if c.is_ascii_digit() => {
                    self.state = State::Integer(std::string::String::new());
                    continue;
                }

                (Start, Some(c)) => return Err(self.fail(LexerError::BadChar(c))),

                // Delayed emission of any token
                (Complete(token), _) => break std::mem::replace(token, Eof),

                (Word(word), Some(c)) if c.is_ascii_alphanumeric() || c == '_' => word.push(c),
                (Word(word), _) => {
                    let word = std::mem::take(word);
                    match self::Keyword::from_str(&word) {
                        Ok(keyword) => break Token::Keyword(keyword),
                        Err(()) => break Id(Identifier::new(word)),
                    }
                }

                (State::Integer(digits), Some(c)) if c.is_ascii_digit() => digits.push(c),
                (State::Integer(digits), Some('.')) => {
                    let digits = std::mem::take(digits);
                    let dot = self.peeked_location();
                    self.state = IntegerDot(digits, dot);
                }

                (State::Integer(digits), Some('e' | 'E')) => {
                    let digits = std::mem::take(digits);
                    self.state = ExponentSign(digits + "e");
                }

                (State::Integer(digits), _) => {
                    let digits = std::mem::take(digits);
                    break self.integer(&digits, 10)?;
                }

                // `1..` is an integer followed by `..`
                (IntegerDot(digits, dot), Some('.')) => {
                    let digits = std::mem::take(digits);
                    let dot = dot.clone();

                    let integer = self.integer(&digits, 10)?;
                    let first = self.start.clone();

                    self.bump();
                    self.pending = Some(Located::at(DoubleDot, Location::span(dot, &self.last)));

                    self.state = Start;
                    return Ok(Some(Located::at(integer, first)));
                }

                (IntegerDot(digits, _), Some(c)) if c.is_ascii_digit() => {
                    let digits = std::mem::take(digits);
                    self.state = Fraction(digits + ".");
                    continue;
                }

                (IntegerDot(digits, _), _) => {
                    let digits = std::mem::take(digits);
                    return Err(self.fail(LexerError::MalformedNumber(digits + ".")));
                }

                (Fraction(digits), Some(c)) if c.is_ascii_digit() => digits.push(c),
                (Fraction(digits), Some('e' | 'E')) => {
                    let digits = std::mem::take(digits);
                    self.state = ExponentSign(digits + "e");
                }

                (Fraction(digits), _) => {
                    let digits = std::mem::take(digits);
                    break self.double(&digits)?;
                }

                (ExponentSign(digits), Some(c @ ('+' | '-'))) => {
                    let mut digits = std::mem::take(digits);
                    digits.push(c);
                    self.state = ExponentStart(digits);
                }

                (ExponentSign(digits) | ExponentStart(digits), Some(c)) if c.is_ascii_digit() => {
                    let digits = std::mem::take(digits);
                    self.state = Exponent(digits);
                    continue;
                }

                (ExponentSign(digits) | ExponentStart(digits), _) => {
                    let digits = std::mem::take(digits);
                    return Err(self.fail(LexerError::MalformedNumber(digits)));
                }

                (Exponent(digits), Some(c)) if c.is_ascii_digit() => digits.push(c),
                (Exponent(digits), _) => {
                    let digits = std::mem::take(digits);
                    break self.double(&digits)?;
                }

                (Hex(digits), Some(c)) if c.is_ascii_hexdigit() => digits.push(c),
                (Hex(digits), _) if digits.is_empty() => {
                    return Err(self.fail(LexerError::ExpectedDigits('$')))
                }

                (Hex(digits), _) => {
                    let digits = std::mem::take(digits);
                    break self.integer(&digits, 16)?;
                }

                (CharCode(digits), Some(c)) if c.is_ascii_digit() => digits.push(c),
                (CharCode(digits), _) if digits.is_empty() => {
                    return Err(self.fail(LexerError::ExpectedDigits('#')))
                }

                (CharCode(digits), _) => {
                    let code = digits.parse::<u32>().unwrap_or(u32::MAX);
                    match u8::try_from(code) {
                        Ok(code) => break Token::Char(code),
                        Err(_) => return Err(self.fail(LexerError::BadCharCode(code))),
                    }
                }

                (Quoted(_), None | Some('\n')) => {
                    return Err(self.fail(LexerError::UnterminatedString))
                }

                (Quoted(string), Some('\'')) => {
                    let string = std::mem::take(string);
                    self.state = QuoteEnd(string);
                }

                (Quoted(string), Some(c)) => string.push(c),

                // `''` inside quotes is an escaped apostrophe
                (QuoteEnd(string), Some('\'')) => {
                    let mut string = std::mem::take(string);
                    string.push('\'');
                    self.state = Quoted(string);
                }

                (QuoteEnd(string), _) => {
                    let string = std::mem::take(string);
                    break quoted(string);
                }

                (Paren, Some('*')) => self.state = ParenComment,
                (Paren, _) => break OpenParen,

                (ParenComment | ParenCommentStar | BraceComment, None) => {
                    return Err(self.fail(LexerError::UnclosedComment))
                }

                (ParenComment, Some('*')) => self.state = ParenCommentStar,
                (ParenComment, Some(_)) => (),
                (ParenCommentStar, Some(')')) => self.state = Start,
                (ParenCommentStar, Some('*')) => (),
                (ParenCommentStar, Some(_)) => self.state = ParenComment,

                (BraceComment, Some('}')) => self.state = Start,
                (BraceComment, Some(_)) => (),

                (LineComment, Some('\n') | None) => self.state = Start,
                (LineComment, Some(_)) => (),

                (State::Colon, Some('=')) => self.state = Complete(Assign),
                (State::Colon, _) => break Token::Colon,

                (State::Less, Some('=')) => self.state = Complete(LessOrEqual),
                (State::Less, Some('>')) => self.state = Complete(NotEqual),
                (State::Less, _) => break Token::Less,

                (State::Greater, Some('=')) => self.state = Complete(GreaterOrEqual),
                (State::Greater, _) => break Token::Greater,

                (Dot, Some('.')) => self.state = Complete(DoubleDot),
                (Dot, _) => break Period,

                (State::Slash, Some('/')) => self.state = LineComment,
                (State::Slash, _) => break Token::Slash,
            }

            // Without a `continue`, the character that was looked ahead
            // above is consumed here
            self.bump();
        };

        self.state = Start;
        let location = Location::span(self.start.clone(), &self.last);
        Ok(Some(Located::at(token, location)))
    }

    /// Consumes the character under lookahead.
    fn bump(&mut self) {
        if let Some(Ok((_, location))) = self.source.next() {
            self.last = location;
        }
    }

    fn peeked_location(&mut self) -> Location {
        match self.source.peek() {
            Some(Ok((_, location))) => location.clone(),
            _ => self.last.clone(),
        }
    }

    fn integer(&self, digits: &str, radix: u32) -> Result<Token, Located<LexerError>> {
        i32::from_str_radix(digits, radix)
            .map(Token::Integer)
            .map_err(|_| Located::at(LexerError::IntOverflow, self.start.clone()))
    }

    /// Out of range values are malformed too, there is no infinity literal.
    fn double(&self, digits: &str) -> Result<Token, Located<LexerError>> {
        match digits.parse::<f64>() {
            Ok(double) if double.is_finite() => Ok(Token::Double(double)),
            _ => Err(Located::at(
                LexerError::MalformedNumber(digits.to_owned()),
                self.start.clone(),
            )),
        }
    }

    fn fail(&mut self, error: LexerError) -> Located<LexerError> {
        self.done = true;
        Located::at(error, self.start.clone())
    }
}

impl<S> Iterator for Lexer<S>
where
    S: Iterator<Item = Result<(char, Location), io::Error>>,
{
    type Item = Result<Located<Token>, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.lex() {
            Ok(Some(token)) => Some(Ok(token)),

            // End of file is emitted exactly once
            Ok(None) => {
                self.done = true;
                Some(Ok(Located::at(Token::Eof, self.last.clone())))
            }

            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}

/// [`TokenStream`] over a [`Lexer`].
pub struct Tokens<S: Iterator> {
    lexer: Lexer<S>,
    current: Located<Token>,
}

impl<S> Tokens<S>
where
    S: Iterator<Item = Result<(char, Location), io::Error>>,
{
    /// Primes the stream with the first token.
    pub fn new(mut lexer: Lexer<S>) -> Result<Self, Located<LexerError>> {
        let current = match lexer.next() {
            Some(token) => token?,
            None => Located::at(Token::Eof, lexer.last.clone()),
        };

        Ok(Tokens { lexer, current })
    }
}

impl<S> TokenStream for Tokens<S>
where
    S: Iterator<Item = Result<(char, Location), io::Error>>,
{
    fn advance(&mut self) -> Result<bool, Located<LexerError>> {
        if let Token::Eof = self.current.val() {
            return Ok(false);
        }

        if let Some(token) = self.lexer.next() {
            self.current = token?;
        }

        Ok(!matches!(self.current.val(), Token::Eof))
    }

    fn current(&self) -> &Located<Token> {
        &self.current
    }
}

/// Builds a literal out of the contents between quotes.
fn quoted(string: String) -> Token {
    let mut chars = string.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if (c as u32) < 256 => Token::Char(c as u8),
        _ => Token::String(Rc::from(string)),
    }
}
