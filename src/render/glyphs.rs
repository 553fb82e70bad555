use font8x8::{UnicodeFonts, BASIC_FONTS};

/// Glyph cell edge in font pixels.
pub const GLYPH_SIZE: usize = 8;

/// Bitmap for `c`; unknown characters render as `?`.
pub fn glyph(c: char) -> [u8; GLYPH_SIZE] {
    BASIC_FONTS
        .get(c)
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; GLYPH_SIZE])
}

/// Integer magnification giving text roughly `size` pixels tall.
pub fn scale_for(size: f64) -> usize {
    ((size / GLYPH_SIZE as f64).round() as usize).max(1)
}

/// Visit every lit font pixel of `text` as `(column, row)`, unscaled.
/// Columns advance along the text, rows go from the top of the line down.
pub fn for_each_pixel<F: FnMut(usize, usize)>(text: &str, mut visit: F) {
    for (index, c) in text.chars().enumerate() {
        let bitmap = glyph(c);
        for (row, bits) in bitmap.iter().enumerate() {
            for bit in 0..GLYPH_SIZE {
                // Bit 0 is the leftmost pixel
                if bits & (1 << bit) != 0 {
                    visit(index * GLYPH_SIZE + bit, row);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_is_blank_and_letters_are_not() {
        let mut lit = 0;
        for_each_pixel(" ", |_, _| lit += 1);
        assert_eq!(lit, 0);

        let mut columns = Vec::new();
        for_each_pixel("H1", |col, _| columns.push(col));
        assert!(columns.iter().any(|&c| c < GLYPH_SIZE));
        assert!(columns.iter().any(|&c| c >= GLYPH_SIZE));
        assert!(columns.iter().all(|&c| c < 2 * GLYPH_SIZE));
    }

    #[test]
    fn test_unknown_glyph_falls_back() {
        assert_eq!(glyph('\u{2603}'), glyph('?'));
    }

    #[test]
    fn test_scale() {
        assert_eq!(scale_for(3.0), 1);
        assert_eq!(scale_for(64.0), 8);
    }
}
