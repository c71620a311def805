use cathode_common::types::{color_channels, ColorRef, TextAttributes};

/// Resolve an xterm-256 index to its RGB value: 16 base entries, the
/// 6x6x6 cube, then the grayscale ramp.
pub fn xterm_256_rgb(index: u8) -> (u8, u8, u8) {
    match index {
        0..=15 => {
            // Callers handle the base palette directly; this fallback maps
            // through the standard VGA-ish values for completeness.
            let scale = |on: bool, bright: bool| -> u8 {
                match (on, bright) {
                    (false, _) => 0,
                    (true, false) => 128,
                    (true, true) => 255,
                }
            };
            let bright = index >= 8;
            let bits = index & 0x7;
            (
                scale(bits & 1 != 0, bright),
                scale(bits & 2 != 0, bright),
                scale(bits & 4 != 0, bright),
            )
        }
        16..=231 => {
            let value = index - 16;
            let component = |k: u8| if k == 0 { 0 } else { 55 + 40 * k };
            (
                component(value / 36),
                component((value / 6) % 6),
                component(value % 6),
            )
        }
        232..=255 => {
            let gray = 8 + 10 * (index - 232);
            (gray, gray, gray)
        }
    }
}

/// Snap an RGB color to the nearest entry of the 16-color palette by
/// squared distance.
pub fn nearest_palette_index(palette: &[ColorRef; 16], r: u8, g: u8, b: u8) -> u8 {
    let mut best = 0u8;
    let mut best_distance = u32::MAX;
    for (index, &entry) in palette.iter().enumerate() {
        let (er, eg, eb) = color_channels(entry);
        let dr = i32::from(er) - i32::from(r);
        let dg = i32::from(eg) - i32::from(g);
        let db = i32::from(eb) - i32::from(b);
        let distance = (dr * dr + dg * dg + db * db) as u32;
        if distance < best_distance {
            best_distance = distance;
            best = index as u8;
        }
    }
    best
}

/// Fold SGR parameters left-to-right into the attribute word.
pub fn apply_sgr(
    params: &[u32],
    mut attrs: TextAttributes,
    default_attrs: TextAttributes,
    palette: &[ColorRef; 16],
) -> TextAttributes {
    // An empty parameter list is a reset.
    if params.is_empty() {
        return default_attrs;
    }

    let mut index = 0;
    while index < params.len() {
        let param = params[index];
        match param {
            0 => attrs = default_attrs,
            1 => attrs |= TextAttributes::FG_INTENSITY,
            22 => attrs -= TextAttributes::FG_INTENSITY,
            4 => attrs |= TextAttributes::UNDERSCORE,
            24 => attrs -= TextAttributes::UNDERSCORE,
            7 => attrs |= TextAttributes::REVERSE_VIDEO,
            27 => attrs -= TextAttributes::REVERSE_VIDEO,
            39 => attrs = attrs.with_fg_index(default_attrs.fg_index()),
            49 => attrs = attrs.with_bg_index(default_attrs.bg_index()),
            30..=37 => attrs = attrs.with_fg_index(ansi_to_index(param - 30)),
            90..=97 => attrs = attrs.with_fg_index(ansi_to_index(param - 90) | 0x8),
            40..=47 => attrs = attrs.with_bg_index(ansi_to_index(param - 40)),
            100..=107 => attrs = attrs.with_bg_index(ansi_to_index(param - 100) | 0x8),
            38 | 48 => {
                let foreground = param == 38;
                match params.get(index + 1) {
                    Some(5) => {
                        if let Some(&value) = params.get(index + 2) {
                            let resolved = extended_index(value as u8, palette);
                            attrs = if foreground {
                                attrs.with_fg_index(resolved)
                            } else {
                                attrs.with_bg_index(resolved)
                            };
                        }
                        index += 2;
                    }
                    Some(2) => {
                        if let (Some(&r), Some(&g), Some(&b)) = (
                            params.get(index + 2),
                            params.get(index + 3),
                            params.get(index + 4),
                        ) {
                            let resolved = nearest_palette_index(
                                palette,
                                r.min(255) as u8,
                                g.min(255) as u8,
                                b.min(255) as u8,
                            );
                            attrs = if foreground {
                                attrs.with_fg_index(resolved)
                            } else {
                                attrs.with_bg_index(resolved)
                            };
                        }
                        index += 4;
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        index += 1;
    }
    attrs
}

/// ANSI SGR color order is BGR-bit-reversed relative to the console's
/// attribute nibble (red and blue swap).
fn ansi_to_index(ansi: u32) -> u8 {
    let ansi = ansi as u8 & 0x7;
    (ansi & 0x2) | ((ansi & 0x1) << 2) | ((ansi & 0x4) >> 2)
}

fn extended_index(value: u8, palette: &[ColorRef; 16]) -> u8 {
    if value < 16 {
        // Base palette: low 3 bits are the ANSI color, bit 3 is intensity.
        ansi_to_index(u32::from(value & 0x7)) | (value & 0x8)
    } else {
        let (r, g, b) = xterm_256_rgb(value);
        nearest_palette_index(palette, r, g, b)
    }
}
