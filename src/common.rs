use std::fmt;

use crate::type_check::Type;

/// Line/column position of a token or node within one program's source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DiagnosticKind {
    // lexer
    #[error("unexpected character {0:?}")]
    UnexpectedCharacter(char),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated comment")]
    UnterminatedComment,
    #[error("character {0:?} not allowed in string literal")]
    InvalidStringCharacter(char),
    #[error("missing $ at end of program")]
    MissingEndOfProgram,

    // parser
    #[error("expected {expected} but found {found}")]
    UnexpectedToken { expected: String, found: String },
    #[error("expected {expected} but found end of program")]
    UnexpectedEndOfProgram { expected: String },

    // semantic analysis
    #[error("id [ {0} ] is already declared in this scope")]
    AlreadyDeclared(String),
    #[error("id [ {0} ] is not declared")]
    Undeclared(String),
    #[error("type mismatch: cannot assign {assigned} to {declared} id [ {name} ]")]
    TypeMismatch {
        name: String,
        declared: Type,
        assigned: Type,
    },
    #[error("type mismatch: cannot compare {left} to {right}")]
    ComparisonMismatch { left: Type, right: Type },
    #[error("cannot add {left} to {right}")]
    InvalidOperandType { left: Type, right: Type },
    #[error("condition must be boolean, found {0}")]
    InvalidConditionType(Type),
    #[error("cannot print a value of unknown type")]
    InvalidPrintType,
    #[error("id [ {0} ] used before it is initialized")]
    UsedBeforeInitialized(String),
    #[error("id [ {0} ] declared and initialized but never used")]
    UnusedSymbol(String),
    #[error("id [ {0} ] declared but never initialized or used")]
    UnusedUninitialized(String),

    // code generation
    #[error("out of memory: code and variables collided with the string heap")]
    OutOfMemory,
    #[error("nested boolean expressions are not supported")]
    NestedBoolean,
    #[error("internal code generation error: {0}")]
    Internal(&'static str),
}

impl DiagnosticKind {
    pub fn severity(&self) -> Severity {
        match self {
            DiagnosticKind::MissingEndOfProgram
            | DiagnosticKind::UsedBeforeInitialized(_)
            | DiagnosticKind::UnusedSymbol(_)
            | DiagnosticKind::UnusedUninitialized(_) => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// One reported problem, with a source position where one exists.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub loc: Option<Location>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, loc: Location) -> Self {
        Self {
            kind,
            loc: Some(loc),
        }
    }

    pub fn bare(kind: DiagnosticKind) -> Self {
        Self { kind, loc: None }
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let tag = match self.severity() {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match self.loc {
            Some(loc) => write!(f, "{} at {}: {}", tag, loc, self.kind),
            None => write!(f, "{}: {}", tag, self.kind),
        }
    }
}

/// Ordered accumulator for one program's diagnostics. Semantic analysis
/// pushes into this and keeps walking; nothing here aborts a pass.
#[derive(Debug, Default)]
pub struct Diagnostics {
    list: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self { list: Vec::new() }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.list.push(diagnostic);
    }

    pub fn report(&mut self, kind: DiagnosticKind, loc: Location) {
        self.list.push(Diagnostic::new(kind, loc));
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.list.extend(other.list);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.list.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.list
            .iter()
            .filter(|d| d.severity() == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.list
            .iter()
            .filter(|d| d.severity() == Severity::Warning)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}

#[derive(Debug)]
pub enum CompileError {
    File,
    Source,
}

pub type CompileResult = Result<(), CompileError>;
