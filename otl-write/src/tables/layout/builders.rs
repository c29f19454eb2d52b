//! Builders for Coverage and ClassDef tables

use std::collections::BTreeMap;

use types::GlyphId16;

use super::{
    are_sequential, ClassDef, ClassRangeRecord, CoverageFormat1, CoverageFormat2, CoverageTable,
    RangeRecord,
};
use crate::error::Error;

/// A builder for [CoverageTable] tables.
///
/// Glyphs can be added in any order; duplicates are ignored. This will
/// choose whichever format is smaller for the included glyphs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoverageBuilder {
    // invariant: is always sorted and unique
    glyphs: Vec<GlyphId16>,
}

impl CoverageBuilder {
    /// Create a new builder from a vec of `GlyphId16`.
    pub fn from_glyphs(mut glyphs: Vec<GlyphId16>) -> Self {
        glyphs.sort_unstable();
        glyphs.dedup();
        CoverageBuilder { glyphs }
    }

    /// Add a glyph to this coverage table.
    ///
    /// Returns the current coverage index of the glyph, whether or not it
    /// was already present. Indices of later glyphs shift as glyphs are added.
    pub fn add(&mut self, glyph: GlyphId16) -> u16 {
        let ix = match self.glyphs.binary_search(&glyph) {
            Ok(ix) => ix,
            Err(ix) => {
                self.glyphs.insert(ix, glyph);
                ix
            }
        };
        // there are at most 65536 distinct glyphs, so an index always fits
        ix as u16
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    pub fn contains(&self, glyph: GlyphId16) -> bool {
        self.glyphs.binary_search(&glyph).is_ok()
    }

    /// The glyphs in this builder, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = GlyphId16> + '_ {
        self.glyphs.iter().copied()
    }

    /// Convert this builder into the smaller [CoverageTable] variant.
    ///
    /// Format 1 is a flat list of glyphs; format 2 is a list of ranges.
    /// Format 1 is used when the two are the same size, including when
    /// there are no glyphs at all.
    pub fn build(self) -> Result<CoverageTable, Error> {
        if self.glyphs.len() > u16::MAX as usize {
            return Err(Error::CountOverflow {
                field: "glyphCount",
                count: self.glyphs.len(),
            });
        }
        let runs = iter_glyph_runs(&self.glyphs).collect::<Vec<_>>();
        let format1_len = 4 + self.glyphs.len() * 2;
        let format2_len = 4 + runs.len() * 6;
        log::debug!(
            "coverage of {} glyphs in {} ranges: format1 {format1_len}B, format2 {format2_len}B",
            self.glyphs.len(),
            runs.len()
        );

        if format2_len < format1_len {
            let range_records = runs
                .into_iter()
                .map(|(start_ix, start_glyph_id, end_glyph_id)| {
                    Ok(RangeRecord {
                        start_glyph_id,
                        end_glyph_id,
                        start_coverage_index: u16::try_from(start_ix).map_err(|_| {
                            Error::CountOverflow {
                                field: "startCoverageIndex",
                                count: start_ix,
                            }
                        })?,
                    })
                })
                .collect::<Result<_, Error>>()?;
            Ok(CoverageTable::Format2(CoverageFormat2 { range_records }))
        } else {
            Ok(CoverageTable::Format1(CoverageFormat1 {
                glyph_array: self.glyphs,
            }))
        }
    }

    /// Build and serialize the coverage table.
    pub fn to_bytes(self) -> Result<Vec<u8>, Error> {
        self.build()?.to_bytes()
    }
}

impl FromIterator<GlyphId16> for CoverageBuilder {
    fn from_iter<T: IntoIterator<Item = GlyphId16>>(iter: T) -> Self {
        let glyphs = iter.into_iter().collect::<Vec<_>>();
        CoverageBuilder::from_glyphs(glyphs)
    }
}

impl Extend<GlyphId16> for CoverageBuilder {
    fn extend<T: IntoIterator<Item = GlyphId16>>(&mut self, iter: T) {
        self.glyphs.extend(iter);
        self.glyphs.sort_unstable();
        self.glyphs.dedup();
    }
}

/// A builder for [ClassDef] tables.
///
/// Glyphs not in the builder are implicitly class 0, so class 0 is never
/// stored: assigning it removes the glyph.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClassDefBuilder {
    items: BTreeMap<GlyphId16, u16>,
}

impl ClassDefBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a class to a glyph, replacing any previous assignment.
    pub fn set(&mut self, glyph: GlyphId16, class: u16) {
        if class == 0 {
            self.items.remove(&glyph);
        } else {
            self.items.insert(glyph, class);
        }
    }

    /// The class of this glyph.
    pub fn get(&self, glyph: GlyphId16) -> u16 {
        self.items.get(&glyph).copied().unwrap_or(0)
    }

    /// The number of glyphs with a non-zero class.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// One more than the largest class, counting the implicit class 0.
    pub fn class_count(&self) -> Result<u16, Error> {
        let max = self.items.values().copied().max().unwrap_or(0);
        max.checked_add(1)
            .ok_or(Error::InvalidClassCount(max as u32 + 1))
    }

    /// Convert this builder into a [ClassDef] table.
    ///
    /// Consecutive glyphs with the same class are merged into a single range.
    pub fn build(&self) -> Result<ClassDef, Error> {
        let class_range_records = iter_class_ranges(&self.items).collect::<Vec<_>>();
        if class_range_records.len() > u16::MAX as usize {
            return Err(Error::CountOverflow {
                field: "classRangeCount",
                count: class_range_records.len(),
            });
        }
        log::debug!(
            "classdef of {} glyphs in {} ranges",
            self.items.len(),
            class_range_records.len()
        );
        Ok(ClassDef {
            class_range_records,
        })
    }

    /// Build and serialize the class definition table.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        self.build()?.to_bytes()
    }
}

impl FromIterator<(GlyphId16, u16)> for ClassDefBuilder {
    fn from_iter<T: IntoIterator<Item = (GlyphId16, u16)>>(iter: T) -> Self {
        let mut builder = Self::default();
        for (glyph, class) in iter {
            builder.set(glyph, class);
        }
        builder
    }
}

/// Maximal runs of consecutive glyphs, as `(index of first, first, last)`.
fn iter_glyph_runs(
    glyphs: &[GlyphId16],
) -> impl Iterator<Item = (usize, GlyphId16, GlyphId16)> + '_ {
    let mut start_ix = 0;
    std::iter::from_fn(move || {
        let start = *glyphs.get(start_ix)?;
        let mut end_ix = start_ix;
        while glyphs
            .get(end_ix + 1)
            .is_some_and(|next| are_sequential(glyphs[end_ix], *next))
        {
            end_ix += 1;
        }
        let run = (start_ix, start, glyphs[end_ix]);
        start_ix = end_ix + 1;
        Some(run)
    })
}

fn iter_class_ranges(
    values: &BTreeMap<GlyphId16, u16>,
) -> impl Iterator<Item = ClassRangeRecord> + '_ {
    let mut iter = values.iter();
    let mut prev = None;

    #[allow(clippy::while_let_on_iterator)]
    std::iter::from_fn(move || {
        while let Some((gid, class)) = iter.next() {
            match prev.take() {
                None => prev = Some((*gid, *gid, *class)),
                Some((start, end, pclass)) if are_sequential(end, *gid) && pclass == *class => {
                    prev = Some((start, *gid, pclass))
                }
                Some((start_glyph_id, end_glyph_id, pclass)) => {
                    prev = Some((*gid, *gid, *class));
                    return Some(ClassRangeRecord {
                        start_glyph_id,
                        end_glyph_id,
                        class: pclass,
                    });
                }
            }
        }
        prev.take()
            .map(|(start_glyph_id, end_glyph_id, class)| ClassRangeRecord {
                start_glyph_id,
                end_glyph_id,
                class,
            })
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
    use read_fonts::{tables::layout as read_layout, FontRead};
    use rstest::rstest;

    use super::*;
    use crate::assert_hex_eq;

    /// The covered glyphs, in coverage index order.
    fn read_coverage(bytes: &[u8]) -> Vec<u16> {
        let table = read_layout::CoverageTable::read(bytes.into()).unwrap();
        if let read_layout::CoverageTable::Format2(ranges) = &table {
            let mut next_index = 0u32;
            for record in ranges.range_records() {
                assert_eq!(u32::from(record.start_coverage_index()), next_index);
                let start = record.start_glyph_id().to_u16();
                let end = record.end_glyph_id().to_u16();
                next_index += u32::from(end - start) + 1;
            }
        }
        table.iter().map(|gid| gid.to_u32() as u16).collect()
    }

    /// Every glyph with a non-zero class.
    fn read_class_def(bytes: &[u8]) -> BTreeMap<u16, u16> {
        let read_layout::ClassDef::Format2(table) =
            read_layout::ClassDef::read(bytes.into()).unwrap()
        else {
            panic!("expected ClassDef format 2");
        };
        table
            .class_range_records()
            .iter()
            .filter(|record| record.class() != 0)
            .flat_map(|record| {
                let start = record.start_glyph_id().to_u16();
                let end = record.end_glyph_id().to_u16();
                (start..=end).map(move |gid| (gid, record.class()))
            })
            .collect()
    }

    fn make_glyph_vec<const N: usize>(gids: [u16; N]) -> Vec<GlyphId16> {
        gids.into_iter().map(GlyphId16::new).collect()
    }

    fn make_class<const N: usize>(gid_class_pairs: [(u16, u16); N]) -> ClassDef {
        gid_class_pairs
            .iter()
            .map(|(gid, cls)| (GlyphId16::new(*gid), *cls))
            .collect::<ClassDefBuilder>()
            .build()
            .unwrap()
    }

    #[test]
    fn coverage_builder() {
        let coverage = make_glyph_vec([1u16, 2, 9, 3, 6, 9])
            .into_iter()
            .collect::<CoverageBuilder>();
        assert_eq!(coverage.glyphs, make_glyph_vec([1, 2, 3, 6, 9]));
    }

    #[test]
    fn coverage_add_returns_index() {
        let mut coverage = CoverageBuilder::default();
        assert_eq!(coverage.add(GlyphId16::new(20)), 0);
        assert_eq!(coverage.add(GlyphId16::new(10)), 0);
        assert_eq!(coverage.add(GlyphId16::new(20)), 1);
        assert_eq!(coverage.add(GlyphId16::new(15)), 1);
        assert_eq!(coverage.len(), 3);
        assert!(coverage.contains(GlyphId16::new(15)));
        assert!(!coverage.contains(GlyphId16::new(16)));
    }

    #[rstest]
    #[case::one_run(&[10, 11, 12, 13, 14], 2)]
    #[case::no_runs(&[1, 3, 5, 7, 9], 1)]
    #[case::tie_prefers_list(&[1, 2, 3], 1)]
    #[case::empty(&[], 1)]
    #[case::single(&[7], 1)]
    #[case::two_long_runs(&[1, 2, 3, 4, 20, 21, 22, 23], 2)]
    fn coverage_format(#[case] glyphs: &[u16], #[case] format: u16) {
        let table = glyphs
            .iter()
            .copied()
            .map(GlyphId16::new)
            .collect::<CoverageBuilder>()
            .build()
            .unwrap();
        assert_eq!(table.format(), format);
    }

    #[test]
    fn coverage_bytes() {
        let range = make_glyph_vec([14, 12, 10, 11, 13])
            .into_iter()
            .collect::<CoverageBuilder>()
            .to_bytes()
            .unwrap();
        assert_hex_eq!(&range, &[0, 2, 0, 1, 0, 10, 0, 14, 0, 0]);
        assert_eq!(read_coverage(&range), [10, 11, 12, 13, 14]);

        let list = make_glyph_vec([9, 7, 5, 3, 1, 3])
            .into_iter()
            .collect::<CoverageBuilder>()
            .to_bytes()
            .unwrap();
        assert_hex_eq!(&list, &[0, 1, 0, 5, 0, 1, 0, 3, 0, 5, 0, 7, 0, 9]);
        assert_eq!(read_coverage(&list), [1, 3, 5, 7, 9]);

        let empty = CoverageBuilder::default().to_bytes().unwrap();
        assert_hex_eq!(&empty, &[0, 1, 0, 0]);
    }

    #[test]
    fn coverage_range_indices() {
        let glyphs = make_glyph_vec([1, 2, 3, 4, 10, 11, 12, 13, 40, 41, 42, 43]);
        let bytes = CoverageBuilder::from_glyphs(glyphs).to_bytes().unwrap();
        assert_hex_eq!(
            &bytes,
            &[
                0, 2, 0, 3, //
                0, 1, 0, 4, 0, 0, //
                0, 10, 0, 13, 0, 4, //
                0, 40, 0, 43, 0, 8,
            ]
        );
        assert_eq!(read_coverage(&bytes), [1, 2, 3, 4, 10, 11, 12, 13, 40, 41, 42, 43]);
    }

    #[test]
    fn coverage_includes_max_glyph() {
        let table = make_glyph_vec([u16::MAX - 1, u16::MAX, 0])
            .into_iter()
            .collect::<CoverageBuilder>()
            .build()
            .unwrap();
        let glyphs = table.iter().map(|g| g.to_u16()).collect::<Vec<_>>();
        assert_eq!(glyphs, [0, u16::MAX - 1, u16::MAX]);
    }

    #[test]
    fn coverage_too_many_glyphs() {
        let coverage = (0..=u16::MAX).map(GlyphId16::new).collect::<CoverageBuilder>();
        assert_eq!(coverage.len(), 65536);
        assert!(matches!(
            coverage.build(),
            Err(Error::CountOverflow {
                field: "glyphCount",
                count: 65536
            })
        ));

        let coverage = (1..=u16::MAX).map(GlyphId16::new).collect::<CoverageBuilder>();
        let table = coverage.build().unwrap();
        assert_eq!(table.format(), 2);
        assert_eq!(table.get(GlyphId16::new(u16::MAX)), Some(u16::MAX - 1));
    }

    #[test]
    fn coverage_random_round_trip() {
        let mut rng = StdRng::seed_from_u64(0xc0ffee);
        for _ in 0..200 {
            let len = rng.gen_range(0..300);
            let max = rng.gen_range(1..2000u16);
            let glyphs = (0..len)
                .map(|_| GlyphId16::new(rng.gen_range(0..max)))
                .collect::<Vec<_>>();
            let mut expected = glyphs.iter().map(|g| g.to_u16()).collect::<Vec<_>>();
            expected.sort_unstable();
            expected.dedup();

            let bytes = glyphs.into_iter().collect::<CoverageBuilder>().to_bytes().unwrap();
            assert_eq!(read_coverage(&bytes), expected);
        }
    }

    #[test]
    fn class_def_builder_zero() {
        // even if class 0 is provided, we don't need to assign explicit entries for it
        let class = make_class([(4, 0), (5, 1)]);
        assert_eq!(class.get(GlyphId16::new(4)), 0);
        assert_eq!(class.get(GlyphId16::new(5)), 1);
        assert_eq!(class.get(GlyphId16::new(100)), 0);
        assert_eq!(class.class_range_records.len(), 1);
    }

    #[test]
    fn class_def_builder_empty() {
        let builder = ClassDefBuilder::from_iter([]);
        let built = builder.build().unwrap();
        assert_eq!(
            built,
            ClassDef {
                class_range_records: vec![]
            }
        );
        assert_hex_eq!(&built.to_bytes().unwrap(), &[0, 2, 0, 0]);
        assert_eq!(builder.class_count().unwrap(), 1);
    }

    #[test]
    fn class_def_small() {
        let class = make_class([(1, 1), (2, 1), (3, 1)]);

        assert_eq!(
            class,
            ClassDef {
                class_range_records: vec![ClassRangeRecord {
                    start_glyph_id: GlyphId16::new(1),
                    end_glyph_id: GlyphId16::new(3),
                    class: 1
                }]
            }
        )
    }

    #[test]
    fn class_def_round_trip() {
        let mut builder = ClassDefBuilder::new();
        builder.set(GlyphId16::new(5), 2);
        builder.set(GlyphId16::new(6), 2);
        builder.set(GlyphId16::new(100), 9);
        let bytes = builder.to_bytes().unwrap();
        assert_hex_eq!(
            &bytes,
            &[0, 2, 0, 2, 0, 5, 0, 6, 0, 2, 0, 100, 0, 100, 0, 9]
        );
        assert_eq!(
            read_class_def(&bytes),
            BTreeMap::from([(5, 2), (6, 2), (100, 9)])
        );
        assert_eq!(builder.class_count().unwrap(), 10);

        builder.set(GlyphId16::new(5), 0);
        assert_eq!(builder.get(GlyphId16::new(5)), 0);
        let bytes = builder.to_bytes().unwrap();
        assert_eq!(read_class_def(&bytes), BTreeMap::from([(6, 2), (100, 9)]));
    }

    #[test]
    fn class_def_last_write_wins() {
        let class = make_class([(3, 1), (4, 2), (3, 2), (5, 2), (4, 0), (4, 7)]);
        assert_eq!(
            class.iter().map(|(g, c)| (g.to_u16(), c)).collect::<Vec<_>>(),
            [(3, 2), (4, 7), (5, 2)]
        );
        assert_eq!(class.class_range_records.len(), 3);
    }

    #[test]
    fn class_def_split_on_gap_and_class() {
        let class = make_class([(1, 1), (2, 1), (4, 1), (5, 2), (6, 2)]);
        let ranges = class
            .class_range_records
            .iter()
            .map(|r| (r.start_glyph_id.to_u16(), r.end_glyph_id.to_u16(), r.class))
            .collect::<Vec<_>>();
        assert_eq!(ranges, [(1, 2, 1), (4, 4, 1), (5, 6, 2)]);
    }

    #[test]
    fn class_def_too_many_ranges() {
        let builder = (0..=u16::MAX)
            .map(|gid| (GlyphId16::new(gid), 1 + gid % 2))
            .collect::<ClassDefBuilder>();
        assert!(matches!(
            builder.build(),
            Err(Error::CountOverflow {
                field: "classRangeCount",
                ..
            })
        ));
    }

    #[test]
    fn class_count_overflow() {
        let mut builder = ClassDefBuilder::new();
        builder.set(GlyphId16::new(1), u16::MAX);
        assert!(matches!(
            builder.class_count(),
            Err(Error::InvalidClassCount(65536))
        ));
    }

    #[test]
    fn class_def_random_round_trip() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut rng = StdRng::seed_from_u64(0xc1a55);
        for _ in 0..100 {
            let mut expected = BTreeMap::new();
            let mut assignments = Vec::new();
            for _ in 0..rng.gen_range(0..200) {
                let glyph = rng.gen_range(0..500u16);
                let class = rng.gen_range(0..4u16);
                assignments.push((glyph, class));
                if class == 0 {
                    expected.remove(&glyph);
                } else {
                    expected.insert(glyph, class);
                }
            }
            let builder = assignments
                .iter()
                .map(|(g, c)| (GlyphId16::new(*g), *c))
                .collect::<ClassDefBuilder>();
            assert_eq!(read_class_def(&builder.to_bytes().unwrap()), expected);

            // order of distinct glyphs does not matter
            let mut shuffled = expected.iter().map(|(g, c)| (*g, *c)).collect::<Vec<_>>();
            shuffled.shuffle(&mut rng);
            let reordered = shuffled
                .into_iter()
                .map(|(g, c)| (GlyphId16::new(g), c))
                .collect::<ClassDefBuilder>();
            assert_eq!(reordered.build().unwrap(), builder.build().unwrap());
        }
    }
}
