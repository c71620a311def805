use tracing::trace;

use crate::codepage::{self, LegacyDecode, CP_UTF8};
use crate::token::{control_key_state, virtual_key, InputToken, KeyEventRecord, TextUnits};

const ESC: u8 = 0x1B;

/// The longest VT input sequence the decoder will buffer before giving up
/// on it. A win32-input-mode record with six full-width parameters fits
/// comfortably.
const MAX_VT_SEQUENCE: usize = 64;

/// Decode exactly one token from the head of `bytes`.
///
/// VT sequences are matched first; everything else goes through the code
/// page. A valid-but-truncated prefix is never an error, it reports
/// [`InputToken::NeedMoreData`] so the caller can park the bytes and retry.
pub fn decode_token(code_page: u32, bytes: &[u8]) -> InputToken {
    if bytes.is_empty() {
        return InputToken::NeedMoreData;
    }
    if let Some(token) = try_decode_vt(bytes) {
        return token;
    }
    if codepage::resolve(code_page) == CP_UTF8 {
        decode_utf8(bytes)
    } else {
        match codepage::decode_legacy(code_page, bytes) {
            Some(LegacyDecode::Unit { unit, consumed }) => InputToken::Text {
                units: TextUnits::single(unit),
                consumed,
            },
            Some(LegacyDecode::Incomplete) | None => InputToken::NeedMoreData,
        }
    }
}

fn try_decode_vt(bytes: &[u8]) -> Option<InputToken> {
    if bytes[0] != ESC {
        return None;
    }
    match bytes.get(1) {
        None => Some(InputToken::NeedMoreData),
        Some(b'[') => decode_csi(bytes),
        Some(b'O') => decode_ss3(bytes),
        // ESC followed by anything else is not console input we recognize;
        // let the code-page path deliver the ESC itself.
        Some(_) => None,
    }
}

fn decode_ss3(bytes: &[u8]) -> Option<InputToken> {
    let Some(&final_byte) = bytes.get(2) else {
        return Some(InputToken::NeedMoreData);
    };
    let vk = match final_byte {
        b'A' => virtual_key::VK_UP,
        b'B' => virtual_key::VK_DOWN,
        b'C' => virtual_key::VK_RIGHT,
        b'D' => virtual_key::VK_LEFT,
        b'H' => virtual_key::VK_HOME,
        b'F' => virtual_key::VK_END,
        b'P'..=b'S' => virtual_key::VK_F1 + u16::from(final_byte - b'P'),
        _ => return None,
    };
    Some(InputToken::Key {
        record: navigation_key(vk, 0),
        consumed: 3,
    })
}

fn decode_csi(bytes: &[u8]) -> Option<InputToken> {
    let mut idx = 2;
    let mut private = None::<u8>;
    let mut params: Vec<u32> = Vec::new();
    let mut current: Option<u32> = None;

    loop {
        if idx >= MAX_VT_SEQUENCE {
            trace!(len = idx, "overlong CSI input sequence dropped");
            return Some(InputToken::Ignored { consumed: idx });
        }
        let Some(&byte) = bytes.get(idx) else {
            return Some(InputToken::NeedMoreData);
        };
        match byte {
            b'<' | b'=' | b'>' | b'?' if idx == 2 => private = Some(byte),
            b'0'..=b'9' => {
                let digit = u32::from(byte - b'0');
                current = Some(current.unwrap_or(0).saturating_mul(10).saturating_add(digit));
            }
            b';' => {
                params.push(current.take().unwrap_or(0));
            }
            0x40..=0x7E => {
                if let Some(value) = current.take() {
                    params.push(value);
                }
                return Some(dispatch_csi(private, &params, byte, idx + 1));
            }
            // A stray control byte aborts the sequence; drop what we
            // scanned and leave the offender for the next token.
            _ => return Some(InputToken::Ignored { consumed: idx }),
        }
        idx += 1;
    }
}

fn dispatch_csi(private: Option<u8>, params: &[u32], final_byte: u8, consumed: usize) -> InputToken {
    let param = |index: usize| params.get(index).copied().unwrap_or(0);

    match final_byte {
        b'_' => {
            // win32-input-mode: Vk;Sc;Uc;Kd;Cs;Rc.
            let record = KeyEventRecord {
                key_down: param(3) != 0,
                repeat_count: (param(5) as u16).max(1),
                virtual_key_code: param(0) as u16,
                virtual_scan_code: param(1) as u16,
                unicode_char: param(2) as u16,
                control_key_state: param(4),
            };
            InputToken::Key { record, consumed }
        }
        b'A' | b'B' | b'C' | b'D' | b'H' | b'F' => {
            let vk = match final_byte {
                b'A' => virtual_key::VK_UP,
                b'B' => virtual_key::VK_DOWN,
                b'C' => virtual_key::VK_RIGHT,
                b'D' => virtual_key::VK_LEFT,
                b'H' => virtual_key::VK_HOME,
                _ => virtual_key::VK_END,
            };
            InputToken::Key {
                record: navigation_key(vk, modifier_state(param(1))),
                consumed,
            }
        }
        b'~' => {
            let vk = match param(0) {
                1 | 7 => Some(virtual_key::VK_HOME),
                2 => Some(virtual_key::VK_INSERT),
                3 => Some(virtual_key::VK_DELETE),
                4 | 8 => Some(virtual_key::VK_END),
                5 => Some(virtual_key::VK_PRIOR),
                6 => Some(virtual_key::VK_NEXT),
                _ => None,
            };
            match vk {
                Some(vk) => InputToken::Key {
                    record: navigation_key(vk, modifier_state(param(1))),
                    consumed,
                },
                None => InputToken::Ignored { consumed },
            }
        }
        // Reports flowing back through the input stream: device attributes,
        // cursor position, focus tracking, SGR mouse. All swallowed.
        b'c' | b'R' | b'I' | b'O' | b'M' | b'm' | b'n' | b't' | b'u' | b'y' => {
            let _ = private;
            InputToken::Ignored { consumed }
        }
        _ => InputToken::Ignored { consumed },
    }
}

/// xterm encodes modifiers as `1 + bitset` (shift 1, alt 2, ctrl 4).
fn modifier_state(param: u32) -> u32 {
    if param < 2 {
        return 0;
    }
    let bits = param - 1;
    let mut state = 0;
    if bits & 1 != 0 {
        state |= control_key_state::SHIFT_PRESSED;
    }
    if bits & 2 != 0 {
        state |= control_key_state::LEFT_ALT_PRESSED;
    }
    if bits & 4 != 0 {
        state |= control_key_state::LEFT_CTRL_PRESSED;
    }
    state
}

fn navigation_key(vk: u16, modifiers: u32) -> KeyEventRecord {
    KeyEventRecord {
        key_down: true,
        repeat_count: 1,
        virtual_key_code: vk,
        virtual_scan_code: 0,
        unicode_char: 0,
        control_key_state: modifiers | control_key_state::ENHANCED_KEY,
    }
}

fn decode_utf8(bytes: &[u8]) -> InputToken {
    let first = bytes[0];
    if first < 0x80 {
        return InputToken::Text {
            units: TextUnits::single(u16::from(first)),
            consumed: 1,
        };
    }

    let (len, min_code) = match first {
        0xC2..=0xDF => (2, 0x80),
        0xE0..=0xEF => (3, 0x800),
        0xF0..=0xF4 => (4, 0x10000),
        _ => return replacement(),
    };

    let available = bytes.len().min(len);
    for &byte in &bytes[1..available] {
        if byte & 0xC0 != 0x80 {
            return replacement();
        }
    }
    if bytes.len() < len {
        return InputToken::NeedMoreData;
    }

    let mut code = u32::from(first & (0x7F >> len));
    for &byte in &bytes[1..len] {
        code = (code << 6) | u32::from(byte & 0x3F);
    }
    if code < min_code || code > 0x10FFFF || (0xD800..=0xDFFF).contains(&code) {
        return replacement();
    }

    if code >= 0x10000 {
        let offset = code - 0x10000;
        InputToken::Text {
            units: TextUnits::pair(
                0xD800 + (offset >> 10) as u16,
                0xDC00 + (offset & 0x3FF) as u16,
            ),
            consumed: len,
        }
    } else {
        InputToken::Text {
            units: TextUnits::single(code as u16),
            consumed: len,
        }
    }
}

fn replacement() -> InputToken {
    InputToken::Text {
        units: TextUnits::single(0xFFFD),
        consumed: 1,
    }
}
