use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::Error;
use crate::validate::Validate;
use types::GlyphId16;

static WRITER_COUNTER: AtomicU32 = AtomicU32::new(0);

/// A type that that can be written out as part of a font table.
///
/// Implementations append big-endian bytes to the writer; anything that
/// refers to another subtable does so through a [`Label`].
pub trait FontWrite {
    /// Write our data, and any offset placeholders, into this [TableWriter].
    fn write_into(&self, writer: &mut TableWriter) -> Result<(), Error>;
}

/// A placeholder for a position in the output that is not yet known.
///
/// Labels are created by a [`TableWriter`], and are only meaningful for the
/// writer that created them; any other writer rejects them.
#[derive(Debug, Clone, Copy, PartialOrd, Ord, Hash, PartialEq, Eq)]
pub struct Label {
    writer: u32,
    index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OffsetLen {
    Offset16 = 2,
    Offset32 = 4,
}

/// A pending offset, patched when the writer is finished.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fixup {
    /// position of the offset field in the buffer
    pos: usize,
    label: Label,
    /// the position the offset is measured from, captured when the field was written
    base: usize,
    len: OffsetLen,
}

/// A byte buffer with support for forward-referencing offsets.
///
/// Fields are appended in order. An offset field is written against a
/// [`Label`] and a base position; the label may be defined before or after
/// the field is written. When the writer is finished with
/// [`into_bytes`][Self::into_bytes], every offset field is overwritten with
/// `label position - base`.
#[derive(Debug)]
pub struct TableWriter {
    /// tags the labels created by this writer
    id: u32,
    data: Vec<u8>,
    /// the bound position of each label, indexed by label id
    labels: Vec<Option<usize>>,
    fixups: Vec<Fixup>,
}

/// Validate and serialize a standalone table.
///
/// The table is validated first; if it is well-formed, it is written into a
/// fresh [`TableWriter`] and all offsets are resolved.
pub fn dump_table<T: FontWrite + Validate>(table: &T) -> Result<Vec<u8>, Error> {
    table.validate().map_err(Error::ValidationFailed)?;
    let mut writer = TableWriter::default();
    table.write_into(&mut writer)?;
    writer.into_bytes()
}

impl Default for TableWriter {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl TableWriter {
    /// Create a new, empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new writer with space preallocated for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        TableWriter {
            id: WRITER_COUNTER.fetch_add(1, Ordering::Relaxed),
            data: Vec::with_capacity(capacity),
            labels: Vec::new(),
            fixups: Vec::new(),
        }
    }

    /// The current write position, in bytes from the start of the output.
    ///
    /// This is the value to pass as `base` for offsets that are relative to
    /// the start of a substructure that is about to be written.
    #[inline]
    pub fn position(&self) -> usize {
        self.data.len()
    }

    /// Allocate a new, unbound label.
    pub fn create_label(&mut self) -> Label {
        let label = Label {
            writer: self.id,
            index: self.labels.len() as u32,
        };
        self.labels.push(None);
        label
    }

    /// Bind `label` to the current position.
    ///
    /// A label can only be defined once.
    pub fn define_label_here(&mut self, label: Label) -> Result<(), Error> {
        let pos = self.position();
        let index = self.index_of(label)?;
        let slot = &mut self.labels[index];
        if let Some(first) = *slot {
            return Err(Error::LabelRedefined {
                label,
                first,
                second: pos,
            });
        }
        *slot = Some(pos);
        Ok(())
    }

    /// The position a label was bound to, if it has been defined.
    pub fn label_position(&self, label: Label) -> Option<usize> {
        let index = self.index_of(label).ok()?;
        self.labels[index]
    }

    fn index_of(&self, label: Label) -> Result<usize, Error> {
        let index = label.index as usize;
        if label.writer != self.id || index >= self.labels.len() {
            return Err(Error::UnknownLabel(label));
        }
        Ok(index)
    }

    /// Write any [`FontWrite`] object.
    #[inline]
    pub fn write<T: FontWrite + ?Sized>(&mut self, obj: &T) -> Result<(), Error> {
        obj.write_into(self)
    }

    /// Write raw bytes into this table.
    ///
    /// The caller is responsible for ensuring bytes are in big-endian order.
    #[inline]
    pub fn write_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes)
    }

    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        self.write_slice(&value.to_be_bytes())
    }

    #[inline]
    pub fn write_i16(&mut self, value: i16) {
        self.write_slice(&value.to_be_bytes())
    }

    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.write_slice(&value.to_be_bytes())
    }

    /// Write the length of an array as a u16 count field.
    ///
    /// `field` names the count in the error if `len` does not fit.
    pub fn write_count16(&mut self, len: usize, field: &'static str) -> Result<(), Error> {
        let count = u16::try_from(len).map_err(|_| Error::CountOverflow { field, count: len })?;
        self.write_u16(count);
        Ok(())
    }

    /// Write a null (zero) Offset16.
    #[inline]
    pub fn write_null_offset16(&mut self) {
        self.write_u16(0)
    }

    /// Reserve an Offset16 that will point at `label`, measured from `base`.
    pub fn write_offset16(&mut self, label: Label, base: usize) -> Result<(), Error> {
        self.write_offset(label, base, OffsetLen::Offset16)
    }

    /// Reserve an Offset32 that will point at `label`, measured from `base`.
    pub fn write_offset32(&mut self, label: Label, base: usize) -> Result<(), Error> {
        self.write_offset(label, base, OffsetLen::Offset32)
    }

    fn write_offset(&mut self, label: Label, base: usize, len: OffsetLen) -> Result<(), Error> {
        self.index_of(label)?;
        self.fixups.push(Fixup {
            pos: self.position(),
            label,
            base,
            len,
        });
        let null_bytes = [0u8; 4];
        self.write_slice(&null_bytes[..len as usize]);
        Ok(())
    }

    /// Pad with a single zero byte if the current position is odd.
    pub fn align2(&mut self) {
        if self.data.len() % 2 != 0 {
            self.data.push(0);
        }
    }

    /// Resolve all offsets and return the finished bytes.
    ///
    /// Fails if any offset points at a label that was never defined, or if a
    /// resolved offset is negative or too large for its field.
    pub fn into_bytes(mut self) -> Result<Vec<u8>, Error> {
        log::trace!(
            "resolving {} offsets to {} labels in {} bytes",
            self.fixups.len(),
            self.labels.len(),
            self.data.len()
        );
        for fixup in &self.fixups {
            let target = self.labels[fixup.label.index as usize]
                .ok_or(Error::UnboundLabel(fixup.label))?;
            let overflow = || Error::OffsetOverflow {
                label: fixup.label,
                pos: fixup.pos,
                base: fixup.base,
                target,
                len: fixup.len,
            };
            let resolved = target
                .checked_sub(fixup.base)
                .and_then(|delta| u32::try_from(delta).ok())
                .filter(|delta| *delta <= fixup.len.max_value())
                .ok_or_else(overflow)?;
            let write_over = &mut self.data[fixup.pos..fixup.pos + fixup.len as usize];
            match fixup.len {
                OffsetLen::Offset16 => write_over.copy_from_slice(&(resolved as u16).to_be_bytes()),
                OffsetLen::Offset32 => write_over.copy_from_slice(&resolved.to_be_bytes()),
            }
        }
        Ok(self.data)
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "L{}", self.index)
    }
}

impl OffsetLen {
    /// The maximum value for an offset of this length.
    pub const fn max_value(self) -> u32 {
        match self {
            Self::Offset16 => u16::MAX as u32,
            Self::Offset32 => u32::MAX,
        }
    }
}

impl std::fmt::Display for OffsetLen {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Offset16 => write!(f, "Offset16"),
            Self::Offset32 => write!(f, "Offset32"),
        }
    }
}

macro_rules! write_be_bytes {
    ($ty:ty) => {
        impl FontWrite for $ty {
            #[inline]
            fn write_into(&self, writer: &mut TableWriter) -> Result<(), Error> {
                writer.write_slice(&self.to_be_bytes());
                Ok(())
            }
        }
    };
}

//NOTE: not implemented for offsets! those always go through a Label.
write_be_bytes!(u8);
write_be_bytes!(i8);
write_be_bytes!(u16);
write_be_bytes!(i16);
write_be_bytes!(u32);
write_be_bytes!(i32);

impl FontWrite for GlyphId16 {
    #[inline]
    fn write_into(&self, writer: &mut TableWriter) -> Result<(), Error> {
        writer.write_u16(self.to_u16());
        Ok(())
    }
}

impl<T: FontWrite> FontWrite for [T] {
    fn write_into(&self, writer: &mut TableWriter) -> Result<(), Error> {
        self.iter().try_for_each(|item| item.write_into(writer))
    }
}

impl<T: FontWrite> FontWrite for Vec<T> {
    fn write_into(&self, writer: &mut TableWriter) -> Result<(), Error> {
        self.as_slice().write_into(writer)
    }
}
