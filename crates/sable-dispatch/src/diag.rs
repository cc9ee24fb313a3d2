//! Diagnostics as data.
//!
//! A `Diagnostic` collects a machine code, a primary location, a header,
//! explanatory sections, free-form notes, and autocorrect suggestions.
//! Dispatch never sends diagnostics anywhere itself: they accumulate on
//! the dispatch result, and the embedder decides whether to sink them
//! into an `ErrorQueue` or discard them (union/intersection dispatch
//! discards the losing branch's).

use std::fmt;

use sable_types::Loc;

/// The diagnostic taxonomy of the dispatch core.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticCode {
    UnknownMethod,
    MethodArgumentMismatch,
    MethodArgumentCountMismatch,
    BareTypeUsage,
    InvalidCast,
    GenericMethodConstraintUnsolved,
    TakesNoBlock,
    BlockNotPassed,
    ProcArityUnknown,
    GenericPassedAsBlock,
    UntypedSplat,
    KeywordArgHashWithoutSplat,
    GenericArgumentCountMismatch,
    GenericArgumentKeywordArgs,
    GenericTypeParamBoundMismatch,
    RevealType,
    UntypedConstantSuggestion,
    ExpectedLiteralType,
    MetaTypeDispatchCall,
}

impl DiagnosticCode {
    /// Stable machine code, one per variant.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::UnknownMethod => "E7003",
            DiagnosticCode::MethodArgumentMismatch => "E7002",
            DiagnosticCode::MethodArgumentCountMismatch => "E7004",
            DiagnosticCode::BareTypeUsage => "E7009",
            DiagnosticCode::InvalidCast => "E7015",
            DiagnosticCode::GenericMethodConstraintUnsolved => "E7013",
            DiagnosticCode::TakesNoBlock => "E7057",
            DiagnosticCode::BlockNotPassed => "E7058",
            DiagnosticCode::ProcArityUnknown => "E7059",
            DiagnosticCode::GenericPassedAsBlock => "E7061",
            DiagnosticCode::UntypedSplat => "E7019",
            DiagnosticCode::KeywordArgHashWithoutSplat => "E7025",
            DiagnosticCode::GenericArgumentCountMismatch => "E7018",
            DiagnosticCode::GenericArgumentKeywordArgs => "E7021",
            DiagnosticCode::GenericTypeParamBoundMismatch => "E7036",
            DiagnosticCode::RevealType => "E7014",
            DiagnosticCode::UntypedConstantSuggestion => "E7045",
            DiagnosticCode::ExpectedLiteralType => "E7027",
            DiagnosticCode::MetaTypeDispatchCall => "E7029",
        }
    }

    /// Informational diagnostics render as advice, not errors.
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            DiagnosticCode::RevealType | DiagnosticCode::UntypedConstantSuggestion
        )
    }
}

/// One located line inside a section.
#[derive(Clone, Debug)]
pub struct ErrorLine {
    pub loc: Option<Loc>,
    pub message: String,
}

impl ErrorLine {
    pub fn new(loc: Loc, message: impl Into<String>) -> ErrorLine {
        ErrorLine {
            loc: Some(loc),
            message: message.into(),
        }
    }
}

/// A multi-line explanation block under a diagnostic.
#[derive(Clone, Debug)]
pub struct ErrorSection {
    pub header: String,
    pub lines: Vec<ErrorLine>,
}

/// A mechanical fix: replace the text under `loc` with `replacement`.
#[derive(Clone, Debug)]
pub struct Autocorrect {
    pub title: String,
    pub loc: Loc,
    pub replacement: String,
}

/// One diagnostic, fully materialized.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub loc: Loc,
    pub header: String,
    pub sections: Vec<ErrorSection>,
    pub notes: Vec<String>,
    pub autocorrects: Vec<Autocorrect>,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, loc: Loc, header: impl Into<String>) -> Diagnostic {
        Diagnostic {
            code,
            loc,
            header: header.into(),
            sections: Vec::new(),
            notes: Vec::new(),
            autocorrects: Vec::new(),
        }
    }

    pub fn add_section(&mut self, section: ErrorSection) {
        self.sections.push(section);
    }

    /// Append a single located line as its own section.
    pub fn add_line(&mut self, loc: Loc, message: impl Into<String>) {
        self.sections.push(ErrorSection {
            header: String::new(),
            lines: vec![ErrorLine::new(loc, message)],
        });
    }

    pub fn add_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn add_autocorrect(&mut self, autocorrect: Autocorrect) {
        self.autocorrects.push(autocorrect);
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header)
    }
}

/// The embedder-facing diagnostic sink. Append-only; drained once at the
/// end of a check.
#[derive(Debug, Default)]
pub struct ErrorQueue {
    diags: Vec<Diagnostic>,
}

impl ErrorQueue {
    pub fn new() -> ErrorQueue {
        ErrorQueue::default()
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.diags.push(diag);
    }

    pub fn extend(&mut self, diags: impl IntoIterator<Item = Diagnostic>) {
        self.diags.extend(diags);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diags.iter()
    }

    pub fn len(&self) -> usize {
        self.diags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diags.is_empty()
    }

    pub fn drain(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diags)
    }
}
