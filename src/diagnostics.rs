//! Diagnostic line stream (§6 Outputs). The teacher has no `log`/`tracing`
//! dependency and routes progress through a writer abstraction
//! (`progress.rs::ProgressReporter`); this module follows the same shape for
//! the spec's mandated per-game/per-archive/per-member diagnostic verbs,
//! leaving the teacher's `vprintln!`-style `eprintln!` gating to internal
//! debug chatter elsewhere in the crate.

use std::io::{self, Write};

/// One of the fixed verbs §6 enumerates for the diagnostic line stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    Correct,
    Missing,
    WrongName(String),
    Short(u64),
    TooLongUnfixable(u64),
    WrongCrc(String),
    TooLongValidSubsection { byte: u64, length: u64 },
    BestBadDump,
    ShouldBeInIsIn { expected: String, actual: String },
    Unknown,
    NotUsed,
    UsedInClone(String),
    Delete,
    RenameTo { from: String, to: String },
    MoveUnknown(String),
    AddFrom { name: String, source: String },
    ShrinkTo { name: String, as_name: String, to: u64, of: u64 },
    MergeWithoutParent,
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verb::Correct => write!(f, "correct"),
            Verb::Missing => write!(f, "missing"),
            Verb::WrongName(x) => write!(f, "wrong name ({x})"),
            Verb::Short(n) => write!(f, "short ({n})"),
            Verb::TooLongUnfixable(n) => write!(f, "too long, unfixable ({n})"),
            Verb::WrongCrc(x) => write!(f, "wrong crc ({x})"),
            Verb::TooLongValidSubsection { byte, length } => {
                write!(f, "too long, valid subsection at byte {byte} ({length})")
            }
            Verb::BestBadDump => write!(f, "best bad dump"),
            Verb::ShouldBeInIsIn { expected, actual } => {
                write!(f, "should be in {expected}, is in {actual}")
            }
            Verb::Unknown => write!(f, "unknown"),
            Verb::NotUsed => write!(f, "not used"),
            Verb::UsedInClone(x) => write!(f, "used in clone {x}"),
            Verb::Delete => write!(f, "delete"),
            Verb::RenameTo { from, to } => write!(f, "rename {from} to {to}"),
            Verb::MoveUnknown(to) => write!(f, "move unknown {to}"),
            Verb::AddFrom { name, source } => write!(f, "add {name} from {source}"),
            Verb::ShrinkTo { name, as_name, to, of } => {
                write!(f, "shrink {name} as {as_name} to {to}/{of}")
            }
            Verb::MergeWithoutParent => write!(f, "merge name has no matching parent file"),
        }
    }
}

/// The subject a diagnostic line names: game, archive, or archive member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    Game(String),
    Archive(String),
    Member { archive: String, member: String },
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subject::Game(name) => write!(f, "{name}"),
            Subject::Archive(path) => write!(f, "{path}"),
            Subject::Member { archive, member } => write!(f, "{archive}/{member}"),
        }
    }
}

/// Implemented by whatever a caller wants diagnostics routed to; a library
/// consumer (a future CLI) picks the concrete sink.
pub trait DiagnosticSink {
    fn emit(&mut self, subject: &Subject, verb: &Verb);
}

/// Writes `"<subject>: <verb>"` lines to any `io::Write`, matching §6's line
/// format exactly.
pub struct WriterSink<W: Write> {
    writer: W,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        WriterSink { writer }
    }
}

impl<W: Write> DiagnosticSink for WriterSink<W> {
    fn emit(&mut self, subject: &Subject, verb: &Verb) {
        let _ = writeln!(self.writer, "{subject}: {verb}");
    }
}

pub fn stderr_sink() -> WriterSink<io::Stderr> {
    WriterSink::new(io::stderr())
}

/// Collects formatted lines in memory; used by tests and by callers that want
/// to inspect a run's diagnostics programmatically before rendering them.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    pub lines: Vec<String>,
}

impl DiagnosticSink for RecordingSink {
    fn emit(&mut self, subject: &Subject, verb: &Verb) {
        self.lines.push(format!("{subject}: {verb}"));
    }
}
