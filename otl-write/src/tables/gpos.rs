//! Positioning subtables from the [GPOS] table
//!
//! [GPOS]: https://docs.microsoft.com/en-us/typography/opentype/spec/gpos

use types::GlyphId16;

use super::layout::{DeviceOrVariationIndex, DevicePool};
use crate::{
    error::Error,
    pool::{Shared, SubtablePool},
    validate::{Validate, ValidationCtx},
    write::{FontWrite, TableWriter},
};

pub mod builders;

pub use builders::{MarkToBaseBuilder, MarkToMarkBuilder};

/// A handle to a device table that may be shared by several anchors.
pub type SharedDevice = Shared<DeviceOrVariationIndex>;

/// An [Anchor Table](https://docs.microsoft.com/en-us/typography/opentype/spec/gpos#anchor-tables)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AnchorTable {
    Format1(AnchorFormat1),
    Format2(AnchorFormat2),
    Format3(AnchorFormat3),
}

/// Design units only
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnchorFormat1 {
    pub x_coordinate: i16,
    pub y_coordinate: i16,
}

/// Design units plus contour point
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnchorFormat2 {
    pub x_coordinate: i16,
    pub y_coordinate: i16,
    /// Index to glyph contour point
    pub anchor_point: u16,
}

/// Design units plus Device or VariationIndex tables
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnchorFormat3 {
    pub x_coordinate: i16,
    pub y_coordinate: i16,
    pub x_device: Option<SharedDevice>,
    pub y_device: Option<SharedDevice>,
}

/// The shared anchor tables of a single subtable.
pub type AnchorPool = SubtablePool<AnchorTable>;

impl AnchorTable {
    pub fn format_1(x_coordinate: i16, y_coordinate: i16) -> Self {
        Self::Format1(AnchorFormat1 {
            x_coordinate,
            y_coordinate,
        })
    }

    pub fn format_2(x_coordinate: i16, y_coordinate: i16, anchor_point: u16) -> Self {
        Self::Format2(AnchorFormat2 {
            x_coordinate,
            y_coordinate,
            anchor_point,
        })
    }

    pub fn format_3(
        x_coordinate: i16,
        y_coordinate: i16,
        x_device: Option<SharedDevice>,
        y_device: Option<SharedDevice>,
    ) -> Self {
        Self::Format3(AnchorFormat3 {
            x_coordinate,
            y_coordinate,
            x_device,
            y_device,
        })
    }

    pub fn format(&self) -> u16 {
        match self {
            Self::Format1(_) => 1,
            Self::Format2(_) => 2,
            Self::Format3(_) => 3,
        }
    }

    pub fn x_coordinate(&self) -> i16 {
        match self {
            Self::Format1(table) => table.x_coordinate,
            Self::Format2(table) => table.x_coordinate,
            Self::Format3(table) => table.x_coordinate,
        }
    }

    pub fn y_coordinate(&self) -> i16 {
        match self {
            Self::Format1(table) => table.y_coordinate,
            Self::Format2(table) => table.y_coordinate,
            Self::Format3(table) => table.y_coordinate,
        }
    }

    /// Builder-style method to attach to a contour point.
    ///
    /// This converts the anchor to format 2, dropping any device tables.
    pub fn with_contour_point(self, anchor_point: u16) -> Self {
        Self::format_2(self.x_coordinate(), self.y_coordinate(), anchor_point)
    }

    /// Builder-style method to set the device table for the x coordinate.
    ///
    /// This converts the anchor to format 3, dropping any contour point.
    pub fn with_x_device(self, device: SharedDevice) -> Self {
        let mut table = self.into_format_3();
        table.x_device = Some(device);
        Self::Format3(table)
    }

    /// Builder-style method to set the device table for the y coordinate.
    ///
    /// This converts the anchor to format 3, dropping any contour point.
    pub fn with_y_device(self, device: SharedDevice) -> Self {
        let mut table = self.into_format_3();
        table.y_device = Some(device);
        Self::Format3(table)
    }

    fn into_format_3(self) -> AnchorFormat3 {
        match self {
            Self::Format3(table) => table,
            other => AnchorFormat3 {
                x_coordinate: other.x_coordinate(),
                y_coordinate: other.y_coordinate(),
                ..Default::default()
            },
        }
    }

    /// Write this anchor, with any device offsets going through `devices`.
    ///
    /// Device offsets are relative to the start of this anchor; the device
    /// tables themselves are written when the pool is emitted.
    pub fn write_with_devices(
        &self,
        writer: &mut TableWriter,
        devices: &mut DevicePool,
    ) -> Result<(), Error> {
        let start = writer.position();
        writer.write_u16(self.format());
        writer.write_i16(self.x_coordinate());
        writer.write_i16(self.y_coordinate());
        match self {
            Self::Format1(_) => (),
            Self::Format2(table) => writer.write_u16(table.anchor_point),
            Self::Format3(table) => {
                for device in [&table.x_device, &table.y_device] {
                    match device {
                        Some(device) => devices.write_offset16(writer, device, start)?,
                        None => writer.write_null_offset16(),
                    }
                }
            }
        }
        Ok(())
    }
}

// a standalone anchor is followed by its own device tables
impl FontWrite for AnchorTable {
    fn write_into(&self, writer: &mut TableWriter) -> Result<(), Error> {
        let mut devices = DevicePool::new();
        self.write_with_devices(writer, &mut devices)?;
        devices.emit_all_aligned(writer)
    }
}

impl Validate for AnchorTable {
    fn validate_impl(&self, ctx: &mut ValidationCtx) {
        if let Self::Format3(table) = self {
            ctx.in_table("AnchorFormat3", |ctx| {
                if let Some(device) = &table.x_device {
                    ctx.in_field("x_device", |ctx| device.validate_impl(ctx));
                }
                if let Some(device) = &table.y_device {
                    ctx.in_field("y_device", |ctx| device.validate_impl(ctx));
                }
            })
        }
    }
}

impl AnchorPool {
    /// Write all pooled anchors, each 2-byte aligned.
    ///
    /// Device tables referenced by the anchors are added to `devices`, which
    /// must be emitted afterwards.
    pub fn emit_all_aligned(
        &self,
        writer: &mut TableWriter,
        devices: &mut DevicePool,
    ) -> Result<(), Error> {
        self.emit_with(writer, |anchor, writer| {
            anchor.write_with_devices(writer, devices)
        })
    }
}

/// Check that an assigned class is below the class count.
pub(crate) fn check_class(glyph: GlyphId16, class: u16, class_count: u16) -> Result<(), Error> {
    if class >= class_count {
        return Err(Error::ClassOutOfRange {
            glyph,
            class,
            class_count,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assert_hex_eq,
        tables::layout::{Device, VariationIndex},
        write::dump_table,
    };

    fn device(start: u16, deltas: &[i8]) -> SharedDevice {
        Shared::new(Device::new(start, deltas).unwrap().into())
    }

    #[test]
    fn anchor_format_1() {
        let bytes = dump_table(&AnchorTable::format_1(10, -20)).unwrap();
        assert_hex_eq!(&bytes, &[0, 1, 0, 10, 0xff, 0xec]);
    }

    #[test]
    fn anchor_format_2() {
        let anchor = AnchorTable::format_1(-1, 1).with_contour_point(7);
        let bytes = dump_table(&anchor).unwrap();
        assert_hex_eq!(&bytes, &[0, 2, 0xff, 0xff, 0, 1, 0, 7]);
    }

    #[test]
    fn anchor_format_3_devices_follow() {
        let anchor = AnchorTable::format_1(5, 6)
            .with_x_device(device(12, &[1]))
            .with_y_device(Shared::new(VariationIndex::new(1, 2).into()));
        let bytes = dump_table(&anchor).unwrap();
        assert_hex_eq!(
            &bytes,
            &[
                0, 3, 0, 5, 0, 6, 0, 10, 0, 18, //
                0, 12, 0, 12, 0, 1, 0x40, 0, //
                0, 1, 0, 2, 0x80, 0,
            ]
        );
    }

    #[test]
    fn anchor_format_3_null_device() {
        let anchor = AnchorTable::format_3(1, 2, None, Some(device(9, &[-1])));
        let bytes = dump_table(&anchor).unwrap();
        assert_hex_eq!(
            &bytes,
            &[0, 3, 0, 1, 0, 2, 0, 0, 0, 10, 0, 9, 0, 9, 0, 1, 0xc0, 0]
        );
    }

    #[test]
    fn same_device_for_both_axes() {
        let shared = device(10, &[1, -1]);
        let anchor = AnchorTable::format_3(0, 0, Some(shared.clone()), Some(shared));
        let bytes = dump_table(&anchor).unwrap();
        assert_hex_eq!(
            &bytes,
            &[0, 3, 0, 0, 0, 0, 0, 10, 0, 10, 0, 10, 0, 11, 0, 1, 0x70, 0]
        );
    }

    #[test]
    fn last_setter_wins() {
        let dev = device(10, &[1]);
        let anchor = AnchorTable::format_2(3, 4, 9).with_x_device(dev.clone());
        assert_eq!(
            anchor,
            AnchorTable::format_3(3, 4, Some(dev.clone()), None)
        );

        let anchor = anchor.with_y_device(dev.clone());
        assert_eq!(
            anchor,
            AnchorTable::format_3(3, 4, Some(dev.clone()), Some(dev))
        );

        let anchor = anchor.with_contour_point(2);
        assert_eq!(anchor, AnchorTable::format_2(3, 4, 2));
    }

    #[test]
    fn anchor_pool_then_device_pool() {
        let dev = device(20, &[2, 3]);
        let one = Shared::new(AnchorTable::format_3(1, 1, Some(dev.clone()), None));
        let two = Shared::new(AnchorTable::format_3(2, 2, None, Some(dev)));

        let mut writer = TableWriter::new();
        let mut anchors = AnchorPool::new();
        let mut devices = DevicePool::new();
        anchors.write_offset16(&mut writer, &two, 0).unwrap();
        anchors.write_offset16(&mut writer, &one, 0).unwrap();
        anchors.write_offset16(&mut writer, &two, 0).unwrap();
        anchors.emit_all_aligned(&mut writer, &mut devices).unwrap();
        devices.emit_all_aligned(&mut writer).unwrap();
        assert_eq!(anchors.len(), 2);
        assert_eq!(devices.len(), 1);

        let bytes = writer.into_bytes().unwrap();
        assert_hex_eq!(
            &bytes,
            &[
                0, 6, 0, 16, 0, 6, //
                // 'two' at 6, device offset from 6
                0, 3, 0, 2, 0, 2, 0, 0, 0, 20, //
                // 'one' at 16, device offset from 16
                0, 3, 0, 1, 0, 1, 0, 10, 0, 0, //
                // device at 26
                0, 20, 0, 21, 0, 2, 0x23, 0,
            ]
        );
    }

    #[test]
    fn class_bounds() {
        assert!(check_class(GlyphId16::new(4), 1, 2).is_ok());
        assert!(matches!(
            check_class(GlyphId16::new(4), 2, 2),
            Err(Error::ClassOutOfRange {
                class: 2,
                class_count: 2,
                ..
            })
        ));
    }
}
