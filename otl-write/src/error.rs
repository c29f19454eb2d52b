//! Errors that occur during writing

use crate::{
    validate::ValidationReport,
    write::{Label, OffsetLen},
};
use types::GlyphId16;

/// An error occured while writing a table.
///
/// All of these indicate that the table being built is malformed; none are
/// recoverable, and no partial output is produced.
#[derive(Debug)]
pub enum Error {
    /// A resolved offset was negative or did not fit in its field.
    OffsetOverflow {
        label: Label,
        /// position of the offset field
        pos: usize,
        base: usize,
        /// position the label was bound to
        target: usize,
        len: OffsetLen,
    },
    /// An offset pointed at a label that was never defined.
    UnboundLabel(Label),
    /// A label was used that this writer did not create.
    UnknownLabel(Label),
    /// A label was defined more than once.
    LabelRedefined {
        label: Label,
        first: usize,
        second: usize,
    },
    /// An array length or other count does not fit in its 16-bit field.
    CountOverflow { field: &'static str, count: usize },
    /// A glyph was assigned a class outside of `0..class_count`.
    ClassOutOfRange {
        glyph: GlyphId16,
        class: u16,
        class_count: u16,
    },
    /// The class count was zero, or could not be represented.
    InvalidClassCount(u32),
    /// A device table could not be encoded.
    InvalidDevice(String),
    ValidationFailed(ValidationReport),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::OffsetOverflow {
                label,
                pos,
                base,
                target,
                len,
            } => write!(
                f,
                "{len} at {pos} to {label} does not fit: target {target} - base {base} = {}",
                *target as i64 - *base as i64
            ),
            Error::UnboundLabel(label) => write!(f, "offset to {label}, which was never defined"),
            Error::UnknownLabel(label) => write!(f, "{label} was not created by this writer"),
            Error::LabelRedefined {
                label,
                first,
                second,
            } => write!(f, "{label} defined at {second}, but already defined at {first}"),
            Error::CountOverflow { field, count } => {
                write!(f, "{field} of {count} exceeds u16::MAX")
            }
            Error::ClassOutOfRange {
                glyph,
                class,
                class_count,
            } => write!(
                f,
                "glyph {glyph} has class {class}, but class count is {class_count}"
            ),
            Error::InvalidClassCount(count) => write!(f, "invalid class count {count}"),
            Error::InvalidDevice(msg) => write!(f, "invalid device table: {msg}"),
            Error::ValidationFailed(report) => write!(f, "{report}"),
        }
    }
}

impl std::error::Error for Error {}
