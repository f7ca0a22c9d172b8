//! errors raised while loading and resolving bake files
//!
//! Every failure is fatal for the whole resolution pass. An [Error] carries the [ErrorKind] and,
//! when known, the [Location] of the expression that caused it so callers can render a
//! source-anchored diagnostic.
use std::fmt;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ErrorKind {
    /// Malformed syntax or a block that does not have the expected shape
    #[error("{0}")]
    Parse(String),
    /// Unknown variable, function, target or attribute
    #[error("{0}")]
    UndefinedReference(String),
    /// Variable, inheritance, group or attribute reference cycle
    #[error("{0}")]
    Cycle(String),
    /// Environment override that does not fit the variable type
    #[error("failed to parse {name} as {expected}")]
    TypeCoercion { name: String, expected: &'static str },
    /// Wrong argument count or a function block missing `params`/`result`
    #[error("{0}")]
    Arity(String),
    /// Declarations that cannot be combined
    #[error("{0}")]
    Merge(String),
    /// Operand or attribute value of the wrong type
    #[error("{0}")]
    TypeMismatch(String),
    #[error("maximum function call depth of {0} exceeded")]
    CallDepth(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    kind: ErrorKind,
    location: Option<Location>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            location: None,
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    /// Attach a location unless a more specific one is already known
    pub(crate) fn at(mut self, location: Option<&Location>) -> Self {
        if self.location.is_none() {
            self.location = location.cloned();
        }
        self
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{location}: {}", self.kind),
            None => fmt::Display::fmt(&self.kind, f),
        }
    }
}

/// File name plus an optional line/column range inside it
#[derive(derive_new::new, Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub range: Option<Range>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.range {
            Some(range) => write!(f, "{}:{}:{}", self.file, range.start.line, range.start.column),
            None => f.write_str(&self.file),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

/// 1-based line and column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Range {
    /// Translate a byte span into a line/column range of `source`
    pub fn from_span(source: &str, span: std::ops::Range<usize>) -> Self {
        Range {
            start: Position::from_offset(source, span.start),
            end: Position::from_offset(source, span.end),
        }
    }
}

impl Position {
    pub fn from_offset(source: &str, offset: usize) -> Self {
        let mut line = 1;
        let mut column = 1;
        for (index, char) in source.char_indices() {
            if index >= offset {
                break;
            }
            if char == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        Position { line, column }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn range_from_span() {
        let source = "a = 1\ntarget \"x\" {\n  context = y\n}\n";
        let start = source.find('y').unwrap();
        let range = Range::from_span(source, start..start + 1);

        assert_eq!(range.start, Position { line: 3, column: 13 });
        assert_eq!(range.end, Position { line: 3, column: 14 });
    }

    #[test]
    fn display_with_location() {
        let location = Location::new(
            "docker-bake.hcl".into(),
            Some(Range {
                start: Position { line: 2, column: 5 },
                end: Position { line: 2, column: 8 },
            }),
        );
        let error = Error::new(ErrorKind::UndefinedReference("unknown variable FOO".into()))
            .at(Some(&location));

        assert_eq!(error.to_string(), "docker-bake.hcl:2:5: unknown variable FOO");
    }

    #[test]
    fn inner_location_wins() {
        let inner = Location::new("inner.hcl".into(), None);
        let outer = Location::new("outer.hcl".into(), None);
        let error = Error::new(ErrorKind::Merge("conflict".into()))
            .at(Some(&inner))
            .at(Some(&outer));

        assert_eq!(error.location(), Some(&inner));
    }
}
