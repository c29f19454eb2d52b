//! Common OpenType layout tables: Coverage, ClassDef, and Device.

use std::ops::RangeInclusive;

use types::GlyphId16;

use crate::{
    error::Error,
    pool::SubtablePool,
    validate::{Validate, ValidationCtx},
    write::{FontWrite, TableWriter},
};

pub mod builders;

pub use builders::{ClassDefBuilder, CoverageBuilder};

/// A [Coverage] table.
///
/// [Coverage]: https://learn.microsoft.com/en-us/typography/opentype/spec/chapter2#coverage-table
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoverageTable {
    Format1(CoverageFormat1),
    Format2(CoverageFormat2),
}

/// A coverage table listing individual glyphs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoverageFormat1 {
    /// Sorted glyph ids; a glyph's coverage index is its position here.
    pub glyph_array: Vec<GlyphId16>,
}

/// A coverage table listing ranges of glyphs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoverageFormat2 {
    pub range_records: Vec<RangeRecord>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeRecord {
    pub start_glyph_id: GlyphId16,
    pub end_glyph_id: GlyphId16,
    /// The coverage index of `start_glyph_id`.
    pub start_coverage_index: u16,
}

/// A [ClassDef] table.
///
/// This is always written as format 2 (class ranges). Glyphs not covered by
/// any range are class 0.
///
/// [ClassDef]: https://learn.microsoft.com/en-us/typography/opentype/spec/chapter2#class-definition-table
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassDef {
    pub class_range_records: Vec<ClassRangeRecord>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClassRangeRecord {
    pub start_glyph_id: GlyphId16,
    pub end_glyph_id: GlyphId16,
    pub class: u16,
}

/// The packing of the deltas in a [`Device`] table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum DeltaFormat {
    /// Signed 2-bit values, 8 per word
    #[default]
    Local2BitDeltas = 0x0001,
    /// Signed 4-bit values, 4 per word
    Local4BitDeltas = 0x0002,
    /// Signed 8-bit values, 2 per word
    Local8BitDeltas = 0x0003,
}

/// A [Device] table, holding per-ppem hinting adjustments.
///
/// [Device]: https://learn.microsoft.com/en-us/typography/opentype/spec/chapter2#device-and-variationindex-tables
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Device {
    start_size: u16,
    end_size: u16,
    delta_format: DeltaFormat,
    deltas: Vec<i8>,
}

/// A reference into an item variation store, in place of a [`Device`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VariationIndex {
    pub delta_set_outer_index: u16,
    pub delta_set_inner_index: u16,
}

/// Either kind of table that can be the target of a device offset.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceOrVariationIndex {
    Device(Device),
    VariationIndex(VariationIndex),
}

/// The shared device tables of a single subtable.
pub type DevicePool = SubtablePool<DeviceOrVariationIndex>;

/// `true` if `b` immediately follows `a`.
pub(crate) fn are_sequential(a: GlyphId16, b: GlyphId16) -> bool {
    a.to_u16().checked_add(1) == Some(b.to_u16())
}

impl CoverageTable {
    /// Iterate over the covered glyphs, in coverage index order.
    pub fn iter(&self) -> impl Iterator<Item = GlyphId16> + '_ {
        let (one, two) = match self {
            Self::Format1(table) => (Some(table.glyph_array.iter().copied()), None),
            Self::Format2(table) => (
                None,
                Some(table.range_records.iter().flat_map(RangeRecord::iter)),
            ),
        };
        one.into_iter().flatten().chain(two.into_iter().flatten())
    }

    /// The coverage index of this glyph, if it is covered.
    pub fn get(&self, glyph: GlyphId16) -> Option<u16> {
        match self {
            Self::Format1(table) => table
                .glyph_array
                .binary_search(&glyph)
                .ok()
                .and_then(|idx| idx.try_into().ok()),
            Self::Format2(table) => table
                .range_records
                .iter()
                .find(|rec| (rec.start_glyph_id..=rec.end_glyph_id).contains(&glyph))
                .and_then(|rec| {
                    rec.start_coverage_index
                        .checked_add(glyph.to_u16() - rec.start_glyph_id.to_u16())
                }),
        }
    }

    pub fn format(&self) -> u16 {
        match self {
            Self::Format1(_) => 1,
            Self::Format2(_) => 2,
        }
    }

    /// Serialize this table on its own.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        crate::write::dump_table(self)
    }
}

impl RangeRecord {
    fn iter(&self) -> impl Iterator<Item = GlyphId16> {
        (self.start_glyph_id.to_u16()..=self.end_glyph_id.to_u16()).map(GlyphId16::new)
    }

    fn len(&self) -> usize {
        (self.end_glyph_id.to_u16() as usize + 1)
            .saturating_sub(self.start_glyph_id.to_u16() as usize)
    }
}

impl ClassDef {
    /// The class of this glyph; 0 if it is not in any range.
    pub fn get(&self, glyph: GlyphId16) -> u16 {
        self.class_range_records
            .iter()
            .find(|rec| (rec.start_glyph_id..=rec.end_glyph_id).contains(&glyph))
            .map(|rec| rec.class)
            .unwrap_or(0)
    }

    /// Iterate over all explicitly classed glyphs.
    pub fn iter(&self) -> impl Iterator<Item = (GlyphId16, u16)> + '_ {
        self.class_range_records.iter().flat_map(|rec| {
            (rec.start_glyph_id.to_u16()..=rec.end_glyph_id.to_u16())
                .map(move |gid| (GlyphId16::new(gid), rec.class))
        })
    }

    /// Serialize this table on its own.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        crate::write::dump_table(self)
    }
}

impl FontWrite for CoverageTable {
    fn write_into(&self, writer: &mut TableWriter) -> Result<(), Error> {
        match self {
            Self::Format1(table) => {
                writer.write_u16(1);
                writer.write_count16(table.glyph_array.len(), "glyphCount")?;
                table.glyph_array.write_into(writer)
            }
            Self::Format2(table) => {
                writer.write_u16(2);
                writer.write_count16(table.range_records.len(), "rangeCount")?;
                table.range_records.write_into(writer)
            }
        }
    }
}

impl FontWrite for RangeRecord {
    fn write_into(&self, writer: &mut TableWriter) -> Result<(), Error> {
        self.start_glyph_id.write_into(writer)?;
        self.end_glyph_id.write_into(writer)?;
        writer.write_u16(self.start_coverage_index);
        Ok(())
    }
}

impl FontWrite for ClassDef {
    fn write_into(&self, writer: &mut TableWriter) -> Result<(), Error> {
        writer.write_u16(2);
        writer.write_count16(self.class_range_records.len(), "classRangeCount")?;
        self.class_range_records.write_into(writer)
    }
}

impl FontWrite for ClassRangeRecord {
    fn write_into(&self, writer: &mut TableWriter) -> Result<(), Error> {
        self.start_glyph_id.write_into(writer)?;
        self.end_glyph_id.write_into(writer)?;
        writer.write_u16(self.class);
        Ok(())
    }
}

impl Validate for CoverageTable {
    fn validate_impl(&self, ctx: &mut ValidationCtx) {
        ctx.in_table("CoverageTable", |ctx| match self {
            Self::Format1(table) => ctx.in_field("glyph_array", |ctx| {
                ctx.check_array_len(table.glyph_array.len());
                if table.glyph_array.windows(2).any(|pair| pair[0] >= pair[1]) {
                    ctx.report("glyphs must be sorted and unique");
                }
            }),
            Self::Format2(table) => ctx.in_field("range_records", |ctx| {
                ctx.check_array_len(table.range_records.len());
                table.range_records.validate_impl(ctx);
                if table
                    .range_records
                    .windows(2)
                    .any(|pair| pair[0].end_glyph_id >= pair[1].start_glyph_id)
                {
                    ctx.report("ranges must be sorted and non-overlapping");
                }
                let mut expected_index = 0usize;
                for rec in &table.range_records {
                    if rec.start_coverage_index as usize != expected_index {
                        ctx.report(format!(
                            "range starting at {} has start_coverage_index {}, expected {expected_index}",
                            rec.start_glyph_id, rec.start_coverage_index
                        ));
                        return;
                    }
                    expected_index += rec.len();
                }
                if expected_index > u16::MAX as usize + 1 {
                    ctx.report(format!("{expected_index} glyphs exceeds max coverage index"));
                }
            }),
        })
    }
}

impl Validate for RangeRecord {
    fn validate_impl(&self, ctx: &mut ValidationCtx) {
        validate_glyph_range(self.start_glyph_id, self.end_glyph_id, ctx)
    }
}

impl Validate for ClassDef {
    fn validate_impl(&self, ctx: &mut ValidationCtx) {
        ctx.in_table("ClassDef", |ctx| {
            ctx.in_field("class_range_records", |ctx| {
                ctx.check_array_len(self.class_range_records.len());
                self.class_range_records.validate_impl(ctx);
                if self
                    .class_range_records
                    .windows(2)
                    .any(|pair| pair[0].end_glyph_id >= pair[1].start_glyph_id)
                {
                    ctx.report("ranges must be sorted and non-overlapping");
                }
            })
        })
    }
}

impl Validate for ClassRangeRecord {
    fn validate_impl(&self, ctx: &mut ValidationCtx) {
        validate_glyph_range(self.start_glyph_id, self.end_glyph_id, ctx)
    }
}

fn validate_glyph_range(start: GlyphId16, end: GlyphId16, ctx: &mut ValidationCtx) {
    if start > end {
        ctx.report(format!(
            "start_glyph_id {start} larger than end_glyph_id {end}"
        ));
    }
}

impl DeltaFormat {
    fn bits(self) -> u32 {
        match self {
            Self::Local2BitDeltas => 2,
            Self::Local4BitDeltas => 4,
            Self::Local8BitDeltas => 8,
        }
    }

    /// The range of delta values this format can represent.
    pub fn value_range(self) -> RangeInclusive<i8> {
        match self {
            Self::Local2BitDeltas => -2..=1,
            Self::Local4BitDeltas => -8..=7,
            Self::Local8BitDeltas => i8::MIN..=i8::MAX,
        }
    }

    /// The most compact format that can represent all of these deltas.
    pub fn smallest_for(deltas: &[i8]) -> Self {
        let min = deltas.iter().copied().min().unwrap_or_default();
        let max = deltas.iter().copied().max().unwrap_or_default();
        [Self::Local2BitDeltas, Self::Local4BitDeltas]
            .into_iter()
            .find(|format| {
                let range = format.value_range();
                range.contains(&min) && range.contains(&max)
            })
            .unwrap_or(Self::Local8BitDeltas)
    }
}

impl Device {
    /// Create a device table for consecutive ppem sizes starting at `start_size`.
    ///
    /// The most compact [`DeltaFormat`] is chosen automatically.
    pub fn new(start_size: u16, deltas: &[i8]) -> Result<Self, Error> {
        Self::with_format(start_size, deltas, DeltaFormat::smallest_for(deltas))
    }

    /// Create a device table with an explicit delta format.
    ///
    /// Fails if any delta cannot be represented in `delta_format`.
    pub fn with_format(
        start_size: u16,
        deltas: &[i8],
        delta_format: DeltaFormat,
    ) -> Result<Self, Error> {
        let end_size = deltas
            .len()
            .checked_sub(1)
            .ok_or_else(|| Error::InvalidDevice("no deltas".into()))
            .and_then(|extra| {
                u16::try_from(extra)
                    .ok()
                    .and_then(|extra| start_size.checked_add(extra))
                    .ok_or_else(|| {
                        Error::InvalidDevice(format!(
                            "{} deltas starting at ppem {start_size} exceed u16::MAX",
                            deltas.len()
                        ))
                    })
            })?;
        let device = Device {
            start_size,
            end_size,
            delta_format,
            deltas: deltas.to_vec(),
        };
        device.check_deltas()?;
        Ok(device)
    }

    pub fn start_size(&self) -> u16 {
        self.start_size
    }

    pub fn end_size(&self) -> u16 {
        self.end_size
    }

    pub fn delta_format(&self) -> DeltaFormat {
        self.delta_format
    }

    pub fn deltas(&self) -> &[i8] {
        &self.deltas
    }

    fn check_deltas(&self) -> Result<(), Error> {
        let expected = (self.end_size as usize + 1).saturating_sub(self.start_size as usize);
        if self.deltas.len() != expected || expected == 0 {
            return Err(Error::InvalidDevice(format!(
                "sizes {}..={} need {expected} deltas, found {}",
                self.start_size,
                self.end_size,
                self.deltas.len()
            )));
        }
        let range = self.delta_format.value_range();
        match self.deltas.iter().find(|delta| !range.contains(delta)) {
            Some(delta) => Err(Error::InvalidDevice(format!(
                "delta {delta} does not fit {:?}",
                self.delta_format
            ))),
            None => Ok(()),
        }
    }

    /// Pack the deltas into words, most significant value first.
    fn packed_deltas(&self) -> Vec<u16> {
        let bits = self.delta_format.bits();
        let per_word = (16 / bits) as usize;
        let mask = (1u16 << bits) - 1;
        self.deltas
            .chunks(per_word)
            .map(|chunk| {
                chunk.iter().enumerate().fold(0u16, |word, (i, delta)| {
                    let shift = (per_word - 1 - i) as u32 * bits;
                    word | ((*delta as u8 as u16 & mask) << shift)
                })
            })
            .collect()
    }
}

impl FontWrite for Device {
    fn write_into(&self, writer: &mut TableWriter) -> Result<(), Error> {
        self.check_deltas()?;
        writer.write_u16(self.start_size);
        writer.write_u16(self.end_size);
        writer.write_u16(self.delta_format as u16);
        self.packed_deltas().write_into(writer)
    }
}

impl FontWrite for VariationIndex {
    fn write_into(&self, writer: &mut TableWriter) -> Result<(), Error> {
        writer.write_u16(self.delta_set_outer_index);
        writer.write_u16(self.delta_set_inner_index);
        writer.write_u16(0x8000);
        Ok(())
    }
}

impl FontWrite for DeviceOrVariationIndex {
    fn write_into(&self, writer: &mut TableWriter) -> Result<(), Error> {
        match self {
            Self::Device(table) => table.write_into(writer),
            Self::VariationIndex(table) => table.write_into(writer),
        }
    }
}

impl Validate for DeviceOrVariationIndex {
    fn validate_impl(&self, ctx: &mut ValidationCtx) {
        if let Self::Device(device) = self {
            ctx.in_table("Device", |ctx| {
                if let Err(e) = device.check_deltas() {
                    ctx.report(e);
                }
            })
        }
    }
}

impl From<Device> for DeviceOrVariationIndex {
    fn from(src: Device) -> Self {
        Self::Device(src)
    }
}

impl From<VariationIndex> for DeviceOrVariationIndex {
    fn from(src: VariationIndex) -> Self {
        Self::VariationIndex(src)
    }
}

impl VariationIndex {
    pub fn new(delta_set_outer_index: u16, delta_set_inner_index: u16) -> Self {
        VariationIndex {
            delta_set_outer_index,
            delta_set_inner_index,
        }
    }
}

impl DevicePool {
    /// Write all pooled device tables, each 2-byte aligned.
    pub fn emit_all_aligned(&self, writer: &mut TableWriter) -> Result<(), Error> {
        self.emit_with(writer, |device, writer| device.write_into(writer))
    }
}
