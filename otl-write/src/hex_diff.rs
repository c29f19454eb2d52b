//! pretty hex diffs, for comparing binary output.
//!
//! This is adapted from the pretty_assertions crate.
//!
//! source: https://github.com/colin-kiegel/rust-pretty-assertions/blob/main/pretty_assertions/src/lib.rs (MIT/Apache)

use std::fmt;

use nu_ansi_term::{Color, Style};

#[macro_export]
macro_rules! assert_hex_eq {
    ($left:expr, $right:expr$(,)?) => ({
        $crate::assert_hex_eq!(@ $left, $right, "", "");
    });
    ($left:expr, $right:expr, $($arg:tt)*) => ({
        $crate::assert_hex_eq!(@ $left, $right, ": ", $($arg)+);
    });
    (@ $left:expr, $right:expr, $maybe_semicolon:expr, $($arg:tt)*) => ({
        let to_diff = $crate::hex_diff::ToDiff { left: $left, right: $right };
        if (to_diff.left != to_diff.right) {
            ::std::panic!("assertion failed: `(left == right)`{}{}\
               \n\
               \n{}\
               \n",
               $maybe_semicolon,
               format_args!($($arg)*),
               to_diff,
            )
        }
    });
}

pub(crate) struct ToDiff<'a> {
    pub(crate) left: &'a [u8],
    pub(crate) right: &'a [u8],
}

impl std::fmt::Display for ToDiff<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write_diff(f, self.make_diff(), 8)
    }
}

enum DiffItem {
    Same(u8),
    Different(u8),
    Blank,
}

struct DiffResult {
    left: Vec<DiffItem>,
    right: Vec<DiffItem>,
}

impl ToDiff<'_> {
    fn make_diff(&self) -> DiffResult {
        let mut left = Vec::new();
        let mut right = Vec::new();

        for item in diff::slice(self.left, self.right) {
            match item {
                diff::Result::Both(byte, _) => {
                    pad_to_same_len(&mut left, &mut right);
                    left.push(DiffItem::Same(*byte));
                    right.push(DiffItem::Same(*byte));
                }
                diff::Result::Left(byte) => left.push(DiffItem::Different(*byte)),
                diff::Result::Right(byte) => right.push(DiffItem::Different(*byte)),
            }
        }
        pad_to_same_len(&mut left, &mut right);
        DiffResult { left, right }
    }
}

fn pad_to_same_len(left: &mut Vec<DiffItem>, right: &mut Vec<DiffItem>) {
    while left.len() < right.len() {
        left.push(DiffItem::Blank);
    }
    while right.len() < left.len() {
        right.push(DiffItem::Blank);
    }
}

fn write_diff(f: &mut impl fmt::Write, diff: DiffResult, width: usize) -> fmt::Result {
    let DiffResult { left, right } = diff;
    for (line, (left, right)) in left.chunks(width).zip(right.chunks(width)).enumerate() {
        write!(f, "{:>5} ", line * width)?;
        let mut writer = InlineWriter::new(f);
        for item in left {
            writer.write_item(item)?;
        }
        for _ in 0..width - left.len() {
            writer.write_padding()?;
        }

        writer.write_with_style('|', Color::White.dimmed())?;
        writer.write_with_style(' ', Color::White.dimmed())?;

        for item in right {
            writer.write_item(item)?;
        }
        writer.finish()?;
    }
    Ok(())
}

/// Group character styling for an inline diff, to prevent wrapping each single
/// character in terminal styling codes.
struct InlineWriter<'a, W> {
    f: &'a mut W,
    style: Style,
}

impl<'a, W: fmt::Write> InlineWriter<'a, W> {
    fn new(f: &'a mut W) -> Self {
        InlineWriter {
            f,
            style: Style::new(),
        }
    }

    fn write_with_style(&mut self, c: char, style: Style) -> fmt::Result {
        if style == self.style {
            write!(self.f, "{c}")
        } else {
            write!(self.f, "{}", self.style.suffix())?;
            write!(self.f, "{}{c}", style.prefix())?;
            self.style = style;
            Ok(())
        }
    }

    fn write_padding(&mut self) -> fmt::Result {
        write!(self.f, "   ")
    }

    fn write_item(&mut self, item: &DiffItem) -> fmt::Result {
        let style = match item {
            DiffItem::Same(_) | DiffItem::Blank => Style::default(),
            DiffItem::Different(_) => Color::Red.into(),
        };

        let [hi, lo] = match item {
            DiffItem::Same(val) | DiffItem::Different(val) => to_hex_digits(*val),
            DiffItem::Blank => ['_', '_'],
        };

        self.write_with_style(hi, style)?;
        self.write_with_style(lo, style)?;
        self.write_with_style(' ', style)
    }

    fn finish(&mut self) -> fmt::Result {
        writeln!(self.f, "{}", self.style.suffix())?;
        self.style = Default::default();
        Ok(())
    }
}

fn to_hex_digits(byte: u8) -> [char; 2] {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    [
        DIGITS[(byte >> 4) as usize] as char,
        DIGITS[(byte & 0x0f) as usize] as char,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_marks_changed_bytes() {
        let diff = ToDiff {
            left: &[0, 1, 0xab],
            right: &[0, 2, 0xab, 4],
        }
        .to_string();
        assert!(diff.contains("00"));
        assert!(diff.contains("ab"));
        assert!(diff.contains("__"));
    }

    #[test]
    #[should_panic(expected = "left == right")]
    fn macro_panics_on_mismatch() {
        crate::assert_hex_eq!(&[1u8, 2], &[1u8, 3]);
    }
}
