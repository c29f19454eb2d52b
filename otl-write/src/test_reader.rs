//! Reading raw fields back out of serialized bytes in tests.

use read_fonts::FontData;

pub(crate) fn read_u16(data: &[u8], pos: usize) -> u16 {
    FontData::new(data).read_at(pos).unwrap()
}
