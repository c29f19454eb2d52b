//! Serializing OpenType layout subtables.
//!
//! This crate writes the binary encoding of the shared building blocks of
//! the `GPOS` and `GSUB` tables: [Coverage] and [ClassDef] tables, device and
//! anchor tables, and complete mark attachment subtables.
//!
//! Output is produced by a [`TableWriter`], which appends big-endian fields
//! to a buffer. Fields that point to other subtables are written against a
//! [`Label`], and are resolved to byte offsets once the whole subtable has
//! been written; a label can be referenced before or after it is placed.
//!
//! Device and anchor tables are often referenced from many places in one
//! subtable. These are passed around as [`Shared`] handles, and each distinct
//! handle is written exactly once, after everything that refers to it.
//!
//! # Example
//!
//! ```
//! use otl_write::{tables::gpos::{AnchorTable, MarkToBaseBuilder}, types::GlyphId16};
//!
//! let mut builder = MarkToBaseBuilder::new();
//! builder.add_mark(GlyphId16::new(200), 0, AnchorTable::format_1(10, 20));
//! builder.add_base(GlyphId16::new(300), 0, AnchorTable::format_1(0, 0));
//! let bytes = builder.build().unwrap();
//! assert_eq!(&bytes[..4], &[0, 1, 0, 12]);
//! ```
//!
//! [Coverage]: https://learn.microsoft.com/en-us/typography/opentype/spec/chapter2#coverage-table
//! [ClassDef]: https://learn.microsoft.com/en-us/typography/opentype/spec/chapter2#class-definition-table

mod error;
pub mod pool;
pub mod tables;
pub mod validate;
mod write;

#[cfg(test)]
mod hex_diff;
#[cfg(test)]
pub(crate) mod test_reader;

pub use error::Error;
pub use pool::{ObjectId, Shared, SubtablePool};
pub use write::{dump_table, FontWrite, Label, OffsetLen, TableWriter};

/// Public re-export of the font-types crate.
pub extern crate font_types as types;
