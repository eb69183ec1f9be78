//! Named colors (Material palette) and hex color parsing.

const SHADES: [u32; 10] = [50, 100, 200, 300, 400, 500, 600, 700, 800, 900];

/// Palette name → ARGB values for shades 50, 100, 200 … 900.
const PALETTE: &[(&str, [u32; 10])] = &[
    (
        "red",
        [
            0xFFFFEBEE, 0xFFFFCDD2, 0xFFEF9A9A, 0xFFE57373, 0xFFEF5350, 0xFFF44336, 0xFFE53935, 0xFFD32F2F,
            0xFFC62828, 0xFFB71C1C,
        ],
    ),
    (
        "pink",
        [
            0xFFFCE4EC, 0xFFF8BBD0, 0xFFF48FB1, 0xFFF06292, 0xFFEC407A, 0xFFE91E63, 0xFFD81B60, 0xFFC2185B,
            0xFFAD1457, 0xFF880E4F,
        ],
    ),
    (
        "purple",
        [
            0xFFF3E5F5, 0xFFE1BEE7, 0xFFCE93D8, 0xFFBA68C8, 0xFFAB47BC, 0xFF9C27B0, 0xFF8E24AA, 0xFF7B1FA2,
            0xFF6A1B9A, 0xFF4A148C,
        ],
    ),
    (
        "blue",
        [
            0xFFE3F2FD, 0xFFBBDEFB, 0xFF90CAF9, 0xFF64B5F6, 0xFF42A5F5, 0xFF2196F3, 0xFF1E88E5, 0xFF1976D2,
            0xFF1565C0, 0xFF0D47A1,
        ],
    ),
    (
        "green",
        [
            0xFFE8F5E9, 0xFFC8E6C9, 0xFFA5D6A7, 0xFF81C784, 0xFF66BB6A, 0xFF4CAF50, 0xFF43A047, 0xFF388E3C,
            0xFF2E7D32, 0xFF1B5E20,
        ],
    ),
    (
        "yellow",
        [
            0xFFFFFDE7, 0xFFFFF9C4, 0xFFFFF59D, 0xFFFFF176, 0xFFFFEE58, 0xFFFFEB3B, 0xFFFDD835, 0xFFFBC02D,
            0xFFF9A825, 0xFFF57F17,
        ],
    ),
    (
        "orange",
        [
            0xFFFFF3E0, 0xFFFFE0B2, 0xFFFFCC80, 0xFFFFB74D, 0xFFFFA726, 0xFFFF9800, 0xFFFB8C00, 0xFFF57C00,
            0xFFEF6C00, 0xFFE65100,
        ],
    ),
    (
        "gray",
        [
            0xFFFAFAFA, 0xFFF5F5F5, 0xFFEEEEEE, 0xFFE0E0E0, 0xFFBDBDBD, 0xFF9E9E9E, 0xFF757575, 0xFF616161,
            0xFF424242, 0xFF212121,
        ],
    ),
];

/// Black and white only have the default shade.
const MONO: &[(&str, u32)] = &[("white", 0xFFFFFFFF), ("black", 0xFF000000)];

const DEFAULT_SHADE: u32 = 500;

pub fn is_palette_name(name: &str) -> bool {
    named(name).is_some()
}

/// The default (500) shade of a palette color.
pub fn named(name: &str) -> Option<u32> {
    shade(name, DEFAULT_SHADE)
}

/// `red[700]`
pub fn shade(name: &str, shade: u32) -> Option<u32> {
    let name = if name == "grey" { "gray" } else { name };
    if let Some((_, argb)) = MONO.iter().find(|(n, _)| *n == name) {
        return (shade == DEFAULT_SHADE).then_some(*argb);
    }
    let (_, shades) = PALETTE.iter().find(|(n, _)| *n == name)?;
    let slot = SHADES.iter().position(|s| *s == shade)?;
    Some(shades[slot])
}

/// `#RRGGBB` (opaque) or `#AARRGGBB`.
pub fn parse_hex(text: &str) -> Option<u32> {
    let digits = text.strip_prefix('#')?;
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match digits.len() {
        6 => u32::from_str_radix(digits, 16).ok().map(|rgb| 0xFF00_0000 | rgb),
        8 => u32::from_str_radix(digits, 16).ok(),
        _ => None,
    }
}

/// A palette name or hex literal.
pub fn parse_color(text: &str) -> Option<u32> {
    named(text).or_else(|| parse_hex(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_shades() {
        assert_eq!(named("red"), Some(0xFFF44336));
        assert_eq!(named("black"), Some(0xFF000000));
        assert_eq!(named("teal"), None);
    }

    #[test]
    fn explicit_shades() {
        assert_eq!(shade("blue", 900), Some(0xFF0D47A1));
        assert_eq!(shade("grey", 50), Some(0xFFFAFAFA));
        assert_eq!(shade("blue", 550), None);
        assert_eq!(shade("white", 100), None);
    }

    #[test]
    fn hex_colors() {
        assert_eq!(parse_hex("#336699"), Some(0xFF336699));
        assert_eq!(parse_hex("#80336699"), Some(0x80336699));
        assert_eq!(parse_hex("336699"), None);
        assert_eq!(parse_hex("#33669"), None);
    }
}
