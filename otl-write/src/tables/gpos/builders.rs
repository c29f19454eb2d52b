//! Builders for mark attachment subtables

use std::collections::BTreeMap;

use types::GlyphId16;

use super::{check_class, AnchorPool, AnchorTable};
use crate::{
    error::Error,
    pool::Shared,
    tables::layout::{CoverageBuilder, DevicePool},
    write::TableWriter,
};

/// The data shared by the mark-to-base and mark-to-mark builders.
///
/// A "base" here is whatever the marks attach to: a base glyph for lookup
/// type 4, or another mark for lookup type 6.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct MarkAttachment {
    marks: BTreeMap<GlyphId16, (u16, Shared<AnchorTable>)>,
    bases: BTreeMap<(GlyphId16, u16), Shared<AnchorTable>>,
    class_count_override: Option<u16>,
}

impl MarkAttachment {
    fn insert_mark(&mut self, glyph: GlyphId16, class: u16, anchor: Shared<AnchorTable>) {
        self.marks.insert(glyph, (class, anchor));
    }

    fn remove_mark(&mut self, glyph: GlyphId16) -> bool {
        self.marks.remove(&glyph).is_some()
    }

    fn insert_base(&mut self, glyph: GlyphId16, class: u16, anchor: Shared<AnchorTable>) {
        self.bases.insert((glyph, class), anchor);
    }

    fn remove_base(&mut self, glyph: GlyphId16, class: u16) -> bool {
        self.bases.remove(&(glyph, class)).is_some()
    }

    fn set_class_count(&mut self, class_count: u16) -> Result<(), Error> {
        if class_count == 0 {
            return Err(Error::InvalidClassCount(0));
        }
        self.class_count_override = Some(class_count);
        Ok(())
    }

    fn class_count(&self) -> Result<u16, Error> {
        if let Some(count) = self.class_count_override {
            return Ok(count);
        }
        let max_class = self
            .marks
            .values()
            .map(|(class, _)| *class)
            .chain(self.bases.keys().map(|(_, class)| *class))
            .max()
            .unwrap_or(0);
        max_class
            .checked_add(1)
            .ok_or(Error::InvalidClassCount(max_class as u32 + 1))
    }

    fn base_glyphs(&self) -> Vec<GlyphId16> {
        let mut glyphs = self.bases.keys().map(|(glyph, _)| *glyph).collect::<Vec<_>>();
        // keys are sorted by glyph first
        glyphs.dedup();
        glyphs
    }

    /// Assemble the subtable.
    ///
    /// The layout is: header, mark coverage, base coverage, mark array,
    /// base array, then each distinct anchor, then each distinct device.
    fn build(&self, kind: &str) -> Result<Vec<u8>, Error> {
        let class_count = self.class_count()?;
        for (glyph, (class, _)) in &self.marks {
            check_class(*glyph, *class, class_count)?;
        }
        for (glyph, class) in self.bases.keys() {
            check_class(*glyph, *class, class_count)?;
        }
        let base_glyphs = self.base_glyphs();
        let mark_coverage = self.marks.keys().copied().collect::<CoverageBuilder>();
        let base_coverage = CoverageBuilder::from_glyphs(base_glyphs.clone());

        // header, coverage, and arrays; anchors and devices grow the buffer
        let capacity = 24
            + self.marks.len() * 6
            + base_glyphs.len() * (2 + 2 * class_count as usize);
        let mut writer = TableWriter::with_capacity(capacity);
        let mut anchors = AnchorPool::new();
        let mut devices = DevicePool::new();
        let mark_coverage_label = writer.create_label();
        let base_coverage_label = writer.create_label();
        let mark_array_label = writer.create_label();
        let base_array_label = writer.create_label();

        writer.write_u16(1);
        writer.write_offset16(mark_coverage_label, 0)?;
        writer.write_offset16(base_coverage_label, 0)?;
        writer.write_u16(class_count);
        writer.write_offset16(mark_array_label, 0)?;
        writer.write_offset16(base_array_label, 0)?;

        writer.align2();
        writer.define_label_here(mark_coverage_label)?;
        writer.write(&mark_coverage.build()?)?;

        writer.align2();
        writer.define_label_here(base_coverage_label)?;
        writer.write(&base_coverage.build()?)?;

        writer.align2();
        writer.define_label_here(mark_array_label)?;
        let mark_array_start = writer.position();
        writer.write_count16(self.marks.len(), "markCount")?;
        for (class, anchor) in self.marks.values() {
            writer.write_u16(*class);
            anchors.write_offset16(&mut writer, anchor, mark_array_start)?;
        }

        writer.align2();
        writer.define_label_here(base_array_label)?;
        let base_array_start = writer.position();
        writer.write_count16(base_glyphs.len(), "baseCount")?;
        for glyph in &base_glyphs {
            for class in 0..class_count {
                match self.bases.get(&(*glyph, class)) {
                    Some(anchor) => anchors.write_offset16(&mut writer, anchor, base_array_start)?,
                    None => writer.write_null_offset16(),
                }
            }
        }

        anchors.emit_all_aligned(&mut writer, &mut devices)?;
        devices.emit_all_aligned(&mut writer)?;
        log::debug!(
            "{kind}: {} marks, {} bases, {class_count} classes, {} anchors, {} devices, {} bytes",
            self.marks.len(),
            base_glyphs.len(),
            anchors.len(),
            devices.len(),
            writer.position(),
        );
        writer.into_bytes()
    }
}

/// A builder for [Mark-to-Base] attachment subtables (GPOS lookup type 4).
///
/// Anchors are passed as [`Shared`] handles; an anchor that is used by
/// several marks or bases is written once. Passing an [`AnchorTable`] by
/// value creates a new, unshared handle.
///
/// [Mark-to-Base]: https://learn.microsoft.com/en-us/typography/opentype/spec/gpos#lookup-type-4-mark-to-base-attachment-positioning-subtable
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarkToBaseBuilder(MarkAttachment);

impl MarkToBaseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mark glyph with its class and anchor, replacing any previous entry.
    pub fn add_mark(
        &mut self,
        glyph: GlyphId16,
        class: u16,
        anchor: impl Into<Shared<AnchorTable>>,
    ) {
        self.0.insert_mark(glyph, class, anchor.into())
    }

    /// Returns `true` if the mark was present.
    pub fn remove_mark(&mut self, glyph: GlyphId16) -> bool {
        self.0.remove_mark(glyph)
    }

    /// Set the anchor on a base glyph for one mark class, replacing any previous one.
    pub fn add_base(
        &mut self,
        glyph: GlyphId16,
        class: u16,
        anchor: impl Into<Shared<AnchorTable>>,
    ) {
        self.0.insert_base(glyph, class, anchor.into())
    }

    /// Returns `true` if the base anchor was present.
    pub fn remove_base(&mut self, glyph: GlyphId16, class: u16) -> bool {
        self.0.remove_base(glyph, class)
    }

    pub fn mark_count(&self) -> usize {
        self.0.marks.len()
    }

    /// The number of (base glyph, class) anchors.
    pub fn base_anchor_count(&self) -> usize {
        self.0.bases.len()
    }

    /// Use a fixed class count instead of deriving it from the classes in use.
    pub fn set_class_count(&mut self, class_count: u16) -> Result<(), Error> {
        self.0.set_class_count(class_count)
    }

    pub fn clear_class_count(&mut self) {
        self.0.class_count_override = None;
    }

    /// The override if set, otherwise one more than the largest class used.
    pub fn class_count(&self) -> Result<u16, Error> {
        self.0.class_count()
    }

    /// Remove all marks, bases, and any class count override.
    pub fn clear(&mut self) {
        self.0 = Default::default();
    }

    /// Serialize the subtable.
    pub fn build(&self) -> Result<Vec<u8>, Error> {
        self.0.build("MarkBasePos")
    }
}

/// A builder for [Mark-to-Mark] attachment subtables (GPOS lookup type 6).
///
/// `mark1` glyphs are the attaching marks; `mark2` glyphs are the marks they
/// attach to. The encoding is identical to [`MarkToBaseBuilder`].
///
/// [Mark-to-Mark]: https://learn.microsoft.com/en-us/typography/opentype/spec/gpos#lookup-type-6-mark-to-mark-attachment-positioning-subtable
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarkToMarkBuilder(MarkAttachment);

impl MarkToMarkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attaching mark with its class and anchor, replacing any previous entry.
    pub fn add_mark1(
        &mut self,
        glyph: GlyphId16,
        class: u16,
        anchor: impl Into<Shared<AnchorTable>>,
    ) {
        self.0.insert_mark(glyph, class, anchor.into())
    }

    pub fn remove_mark1(&mut self, glyph: GlyphId16) -> bool {
        self.0.remove_mark(glyph)
    }

    /// Set the anchor on a base mark for one mark class, replacing any previous one.
    pub fn add_mark2(
        &mut self,
        glyph: GlyphId16,
        class: u16,
        anchor: impl Into<Shared<AnchorTable>>,
    ) {
        self.0.insert_base(glyph, class, anchor.into())
    }

    pub fn remove_mark2(&mut self, glyph: GlyphId16, class: u16) -> bool {
        self.0.remove_base(glyph, class)
    }

    pub fn mark1_count(&self) -> usize {
        self.0.marks.len()
    }

    pub fn mark2_anchor_count(&self) -> usize {
        self.0.bases.len()
    }

    pub fn set_class_count(&mut self, class_count: u16) -> Result<(), Error> {
        self.0.set_class_count(class_count)
    }

    pub fn clear_class_count(&mut self) {
        self.0.class_count_override = None;
    }

    pub fn class_count(&self) -> Result<u16, Error> {
        self.0.class_count()
    }

    pub fn clear(&mut self) {
        self.0 = Default::default();
    }

    pub fn build(&self) -> Result<Vec<u8>, Error> {
        self.0.build("MarkMarkPos")
    }
}
