//! Deduplication of subtables that are shared by reference.
//!
//! A device or anchor table may be referenced from many records in the same
//! subtable. Each distinct object is written once, after everything that
//! points at it, and every offset to it resolves to that one copy.
//!
//! Objects are distinguished by *identity*, not by value: two [`Shared`]
//! handles created separately are written separately even if their contents
//! are equal. Cloning a handle preserves its identity.

use std::{
    hash::{Hash, Hasher},
    ops::Deref,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use indexmap::IndexMap;

use crate::{
    error::Error,
    write::{Label, TableWriter},
};

static OBJECT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A process-unique identifier for a shared object.
#[derive(Debug, Clone, Copy, PartialOrd, Ord, Hash, PartialEq, Eq)]
pub struct ObjectId(u64);

impl ObjectId {
    pub fn next() -> Self {
        ObjectId(OBJECT_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A handle to an object that may be referenced from several places.
///
/// Each call to [`Shared::new`] creates a new identity; clones share it.
/// Equality and hashing use the identity only.
#[derive(Debug)]
pub struct Shared<T> {
    id: ObjectId,
    obj: Arc<T>,
}

impl<T> Shared<T> {
    pub fn new(obj: T) -> Self {
        Shared {
            id: ObjectId::next(),
            obj: Arc::new(obj),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Shared {
            id: self.id,
            obj: self.obj.clone(),
        }
    }
}

impl<T> Deref for Shared<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.obj
    }
}

impl<T> PartialEq for Shared<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Shared<T> {}

impl<T> Hash for Shared<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl<T> From<T> for Shared<T> {
    fn from(obj: T) -> Self {
        Shared::new(obj)
    }
}

// serializes the contents; a deserialized handle gets a fresh identity.
#[cfg(feature = "serde")]
impl<T: serde::Serialize> serde::Serialize for Shared<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.obj.serialize(serializer)
    }
}

#[cfg(feature = "serde")]
impl<'de, T: serde::Deserialize<'de>> serde::Deserialize<'de> for Shared<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Shared::new)
    }
}

/// A set of shared subtables, each assigned a label on first reference.
///
/// Entries are kept in the order they were first referenced, which is the
/// order they are written in.
#[derive(Debug)]
pub struct SubtablePool<T> {
    entries: IndexMap<ObjectId, (Shared<T>, Label)>,
}

impl<T> Default for SubtablePool<T> {
    fn default() -> Self {
        SubtablePool {
            entries: IndexMap::new(),
        }
    }
}

impl<T> SubtablePool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of distinct objects referenced so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The label for this object, creating one if it is new to the pool.
    ///
    /// A pool's labels belong to the first writer it is used with; a pool
    /// should not be shared between writers.
    pub fn label_for(&mut self, writer: &mut TableWriter, obj: &Shared<T>) -> Label {
        self.entries
            .entry(obj.id())
            .or_insert_with(|| (obj.clone(), writer.create_label()))
            .1
    }

    /// Write an Offset16 to `obj`, measured from `base`.
    pub fn write_offset16(
        &mut self,
        writer: &mut TableWriter,
        obj: &Shared<T>,
        base: usize,
    ) -> Result<(), Error> {
        let label = self.label_for(writer, obj);
        writer.write_offset16(label, base)
    }

    /// Write every pooled object, in order of first reference.
    ///
    /// Each object starts on a 2-byte boundary, where its label is defined.
    pub fn emit_with(
        &self,
        writer: &mut TableWriter,
        mut write_one: impl FnMut(&T, &mut TableWriter) -> Result<(), Error>,
    ) -> Result<(), Error> {
        for (obj, label) in self.entries.values() {
            writer.align2();
            writer.define_label_here(*label)?;
            log::trace!("writing pooled {label} at {}", writer.position());
            write_one(obj, writer)?;
        }
        Ok(())
    }
}
