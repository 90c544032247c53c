//! Source positions.
//!
//! Tokens, tree nodes and errors all carry a [`Location`], so that a
//! diagnostic raised in any phase reports the row and column of the
//! Pascal text it came from. Rows and columns start at 1.

use std::{
    cell::RefCell,
    fmt::{self, Debug, Display, Formatter},
    io::{self, BufRead},
    iter,
    ops::Range,
    rc::Rc,
};

/// A tab advances to the next multiple of this, plus one.
const TAB_STOP: u32 = 4;

/// A value and where it was written.
#[derive(Debug, Clone)]
pub struct Located<T> {
    location: Location,
    value: T,
}

impl<T> Located<T> {
    pub fn val(&self) -> &T {
        &self.value
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    pub fn split(self) -> (Location, T) {
        (self.location, self.value)
    }

    pub fn at(value: T, location: Location) -> Self {
        Located { value, location }
    }

    /// Replaces the value, keeping where it came from.
    pub fn map<U, F>(self, map: F) -> Located<U>
    where
        F: FnOnce(T) -> U,
    {
        Located {
            value: map(self.value),
            location: self.location,
        }
    }
}

impl<T> AsRef<T> for Located<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

/// Half-open range of positions within one source.
#[derive(Clone)]
pub struct Location {
    from: Rc<Source>,
    position: Range<Position>,
}

impl Location {
    /// From the start of `from` to the end of `to`, which must come from
    /// the same source.
    pub fn span(from: Location, to: &Location) -> Self {
        Location {
            from: from.from,
            position: from.position.start..to.position.end,
        }
    }

    pub fn start(&self) -> Position {
        self.position.start
    }

    /// Exclusive.
    pub fn end(&self) -> Position {
        self.position.end
    }

    pub fn source(&self) -> &Source {
        &self.from
    }
}

impl Display for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:", self.from.name)?;

        let Range { start, end } = self.position;
        if end.line != start.line || end == start.advance() {
            write!(formatter, "{}", start)
        } else {
            write!(formatter, "[{}-{}]", start, end.back())
        }
    }
}

impl Debug for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, formatter)
    }
}

/// Row and column of a character.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Position {
    line: u32,
    column: u32,
}

impl Position {
    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn column(&self) -> u32 {
        self.column
    }

    pub fn advance(self) -> Position {
        Position {
            line: self.line,
            column: self.column + 1,
        }
    }

    /// Never goes left of column 1.
    pub fn back(self) -> Position {
        Position {
            line: self.line,
            column: self.column.max(2) - 1,
        }
    }

    pub fn newline(self) -> Position {
        Position {
            line: self.line + 1,
            column: 1,
        }
    }

    pub fn tab(self) -> Position {
        let column = 1 + ((self.column - 1) / TAB_STOP + 1) * TAB_STOP;
        Position {
            line: self.line,
            column,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl Display for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.line, self.column)
    }
}

/// Origin name and interior history of already read lines.
pub struct Source {
    name: String,
    lines: RefCell<Vec<String>>,
}

impl Source {
    /// Name of the origin, usually a file path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs `callback` over a line that was already read, if any.
    pub fn with_line<F, R>(&self, line: u32, callback: F) -> Option<R>
    where
        F: FnOnce(&str) -> R,
    {
        let lines = self.lines.borrow();
        let index = line.checked_sub(1)? as usize;
        lines.get(index).map(|line| callback(line))
    }
}

/// Transforms a buffered reader into a stream of characters.
///
/// The returned location is where the first character will be, and is
/// also where end-of-file lands for an empty input.
pub fn consume<R, S>(reader: R, name: S) -> (Location, Chars<R>)
where
    R: BufRead,
    S: Into<String>,
{
    let source = Rc::new(Source {
        name: name.into(),
        lines: Default::default(),
    });

    let start = Location {
        from: Rc::clone(&source),
        position: Position::default()..Position::default().advance(),
    };

    let chars = Chars {
        reader,
        source,
        line: Vec::new(),
        next: 0,
        here: Position::default(),
        done: false,
    };

    (start, chars)
}

/// Characters of a source, each paired with its own location.
///
/// Lines are remembered as they are read so that diagnostics can quote
/// them later. Every line ends in a single `\n`, whatever its terminator.
pub struct Chars<R> {
    reader: R,
    source: Rc<Source>,
    line: Vec<char>,
    next: usize,
    here: Position,
    done: bool,
}

impl<R: BufRead> Chars<R> {
    /// Reads the next line. Returns `false` at end of input.
    fn fill(&mut self) -> io::Result<bool> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(false);
        }

        let text = line.trim_end_matches(&['\n', '\r'][..]);
        self.line = text.chars().chain(iter::once('\n')).collect();
        self.next = 0;
        self.source.lines.borrow_mut().push(text.to_owned());

        Ok(true)
    }
}

impl<R: BufRead> Iterator for Chars<R> {
    type Item = Result<(char, Location), io::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.next == self.line.len() {
            match self.fill() {
                Ok(true) => (),
                Ok(false) => {
                    self.done = true;
                    return None;
                }

                Err(error) => {
                    self.done = true;
                    return Some(Err(error));
                }
            }
        }

        let c = self.line[self.next];
        self.next += 1;

        let location = Location {
            from: Rc::clone(&self.source),
            position: self.here..self.here.advance(),
        };

        self.here = match c {
            '\n' => self.here.newline(),
            '\t' => self.here.tab(),
            _ => self.here.advance(),
        };

        Some(Ok((c, location)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn characters_carry_their_own_position() {
        let (start, chars) = consume("ab\n\tc".as_bytes(), "test");
        assert_eq!(start.start(), Position::default());

        let positions: Vec<_> = chars
            .map(Result::unwrap)
            .map(|(c, location)| (c, location.start().line(), location.start().column()))
            .collect();

        assert_eq!(
            positions,
            vec![
                ('a', 1, 1),
                ('b', 1, 2),
                ('\n', 1, 3),
                ('\t', 2, 1),
                ('c', 2, 5),
                ('\n', 2, 6),
            ]
        );
    }

    #[test]
    fn carriage_returns_are_dropped() {
        let (_, chars) = consume("a\r\nb".as_bytes(), "test");
        let text: String = chars.map(|c| c.unwrap().0).collect();

        assert_eq!(text, "a\nb\n");
    }

    #[test]
    fn lines_are_remembered() {
        let (start, chars) = consume("first\nsecond".as_bytes(), "test");
        chars.for_each(drop);

        let second = start.source().with_line(2, str::to_owned);
        assert_eq!(second.as_deref(), Some("second"));
        assert!(start.source().with_line(3, str::to_owned).is_none());
    }
}
