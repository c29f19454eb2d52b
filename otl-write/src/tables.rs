//! Layout subtables and their builders.

pub mod gpos;
pub mod layout;
