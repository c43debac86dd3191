/// Parse a `#rrggbb` or `#rgb` hex color. Returns (r, g, b).
pub fn parse_hex(color: &str) -> Option<(u8, u8, u8)> {
    let hex = color.strip_prefix('#')?;
    match hex.len() {
        6 => {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            Some((r, g, b))
        }
        3 => {
            let mut channels = hex.chars().map(|c| c.to_digit(16).map(|d| (d * 17) as u8));
            let r = channels.next()??;
            let g = channels.next()??;
            let b = channels.next()??;
            Some((r, g, b))
        }
        _ => None,
    }
}

/// Format RGBA as a CSS color string.
pub fn rgba_css(r: u8, g: u8, b: u8, a: f64) -> String {
    format!("rgba({r},{g},{b},{a})")
}

/// Hex color with an alpha channel applied, as CSS `rgba()`.
/// Unparseable input is returned unchanged.
pub fn with_alpha(color: &str, alpha: f64) -> String {
    match parse_hex(color) {
        Some((r, g, b)) => rgba_css(r, g, b, alpha.clamp(0.0, 1.0)),
        None => color.to_string(),
    }
}

/// Perceived luminance (0..1) used to pick a readable text color on a fill.
pub fn luminance(r: u8, g: u8, b: u8) -> f64 {
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64) / 255.0
}

/// `#111827` on light fills, white on dark ones.
pub fn text_color_on(fill: &str) -> &'static str {
    match parse_hex(fill) {
        Some((r, g, b)) if luminance(r, g, b) > 0.6 => "#111827",
        _ => "#ffffff",
    }
}
