//! Token-walking helpers behind the byte, character, and record read paths.
//!
//! All of these are pure functions over a byte slice: the dispatch layer
//! gathers bytes from the handle's pending buffer plus the host stream,
//! walks tokens here, then parks whatever was not consumed.

use cathode_parser::codepage;
use cathode_parser::token::{InputToken, KeyEventRecord};
use cathode_parser::decode_token;

const CTRL_C: u8 = 0x03;
const CTRL_Z: u8 = 0x1A;

/// Result of a byte-oriented read.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ByteRead {
    pub data: Vec<u8>,
    pub saw_ctrl_c: bool,
    pub eof: bool,
}

/// Walk tokens producing client-visible bytes. Text tokens pass their
/// source bytes through; key events contribute their character encoded in
/// the input code page; reports vanish. Returns the bytes consumed from
/// `bytes`.
pub fn read_bytes(
    code_page: u32,
    processed: bool,
    eof_on_ctrl_z: bool,
    bytes: &[u8],
    capacity: usize,
) -> (ByteRead, usize) {
    let mut result = ByteRead::default();
    let mut position = 0;
    while position < bytes.len() {
        if eof_on_ctrl_z && result.data.is_empty() && bytes[position] == CTRL_Z {
            result.eof = true;
            position += 1;
            break;
        }
        let token = decode_token(code_page, &bytes[position..]);
        match token {
            InputToken::Text { units, consumed } => {
                if processed && units.as_slice() == [u16::from(CTRL_C)] {
                    result.saw_ctrl_c = true;
                    position += consumed;
                    continue;
                }
                if result.data.len() + consumed > capacity {
                    break;
                }
                result
                    .data
                    .extend_from_slice(&bytes[position..position + consumed]);
                position += consumed;
            }
            InputToken::Key { record, consumed } => {
                if record.key_down && record.unicode_char != 0 {
                    let mut encoded = Vec::new();
                    codepage::encode_units(code_page, &[record.unicode_char], &mut encoded);
                    if result.data.len() + encoded.len() > capacity {
                        break;
                    }
                    result.data.extend_from_slice(&encoded);
                }
                position += consumed;
            }
            InputToken::Ignored { consumed } => position += consumed,
            InputToken::NeedMoreData => break,
        }
    }
    (result, position)
}

/// Result of a character (UTF-16 unit) read.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct UnitRead {
    pub units: Vec<u16>,
    /// Low surrogate held back because only one output slot remained.
    pub stash: Option<u16>,
    pub saw_ctrl_c: bool,
    pub eof: bool,
}

pub fn read_units(
    code_page: u32,
    processed: bool,
    eof_on_ctrl_z: bool,
    bytes: &[u8],
    max_units: usize,
) -> (UnitRead, usize) {
    let mut result = UnitRead::default();
    let mut position = 0;
    while position < bytes.len() && result.units.len() < max_units {
        if eof_on_ctrl_z && result.units.is_empty() && bytes[position] == CTRL_Z {
            result.eof = true;
            position += 1;
            break;
        }
        let token = decode_token(code_page, &bytes[position..]);
        match token {
            InputToken::Text { units, consumed } => {
                let units = units.as_slice();
                if processed && units == [u16::from(CTRL_C)] {
                    result.saw_ctrl_c = true;
                    position += consumed;
                    continue;
                }
                let remaining = max_units - result.units.len();
                if units.len() > remaining {
                    // A surrogate pair with one slot left: deliver the high
                    // unit, hold the low one back for the next read.
                    result.units.push(units[0]);
                    result.stash = Some(units[1]);
                    position += consumed;
                    break;
                }
                result.units.extend_from_slice(units);
                position += consumed;
            }
            InputToken::Key { record, consumed } => {
                if record.key_down && record.unicode_char != 0 {
                    result.units.push(record.unicode_char);
                }
                position += consumed;
            }
            InputToken::Ignored { consumed } => position += consumed,
            InputToken::NeedMoreData => break,
        }
    }
    (result, position)
}

/// Result of an INPUT_RECORD read.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RecordRead {
    pub records: Vec<KeyEventRecord>,
    pub stash: Option<u16>,
    pub saw_ctrl_c: bool,
}

pub(crate) fn unit_record(unit: u16) -> KeyEventRecord {
    KeyEventRecord {
        key_down: true,
        repeat_count: 1,
        virtual_key_code: 0,
        virtual_scan_code: 0,
        unicode_char: unit,
        control_key_state: 0,
    }
}

pub fn read_records(
    code_page: u32,
    processed: bool,
    bytes: &[u8],
    max_records: usize,
) -> (RecordRead, usize) {
    let mut result = RecordRead::default();
    let mut position = 0;
    while position < bytes.len() && result.records.len() < max_records {
        let token = decode_token(code_page, &bytes[position..]);
        match token {
            InputToken::Text { units, consumed } => {
                let units = units.as_slice();
                if processed && units == [u16::from(CTRL_C)] {
                    result.saw_ctrl_c = true;
                    position += consumed;
                    continue;
                }
                let remaining = max_records - result.records.len();
                if units.len() > remaining {
                    result.records.push(unit_record(units[0]));
                    result.stash = Some(units[1]);
                    position += consumed;
                    break;
                }
                for &unit in units {
                    result.records.push(unit_record(unit));
                }
                position += consumed;
            }
            InputToken::Key { record, consumed } => {
                result.records.push(record);
                position += consumed;
            }
            InputToken::Ignored { consumed } => position += consumed,
            InputToken::NeedMoreData => break,
        }
    }
    (result, position)
}

/// Count the character/record events observable in a bounded prefix,
/// saturating at `u32::MAX`.
pub fn count_events(code_page: u32, processed: bool, bytes: &[u8]) -> u32 {
    let mut count: u32 = 0;
    let mut position = 0;
    while position < bytes.len() {
        let token = decode_token(code_page, &bytes[position..]);
        match token {
            InputToken::Text { units, consumed } => {
                if !(processed && units.as_slice() == [u16::from(CTRL_C)]) {
                    count = count.saturating_add(units.len() as u32);
                }
                position += consumed;
            }
            InputToken::Key { consumed, .. } => {
                count = count.saturating_add(1);
                position += consumed;
            }
            InputToken::Ignored { consumed } => position += consumed,
            InputToken::NeedMoreData => break,
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use cathode_parser::codepage::CP_UTF8;

    #[test]
    fn test_read_bytes_passthrough() {
        let (result, consumed) = read_bytes(CP_UTF8, true, true, b"hi", 16);
        assert_eq!(result.data, b"hi");
        assert_eq!(consumed, 2);
        assert!(!result.saw_ctrl_c);
    }

    #[test]
    fn test_read_bytes_filters_ctrl_c() {
        let (result, consumed) = read_bytes(CP_UTF8, true, true, b"a\x03b", 16);
        assert_eq!(result.data, b"ab");
        assert_eq!(consumed, 3);
        assert!(result.saw_ctrl_c);
    }

    #[test]
    fn test_read_bytes_ctrl_c_kept_when_unprocessed() {
        let (result, _) = read_bytes(CP_UTF8, false, false, b"a\x03b", 16);
        assert_eq!(result.data, b"a\x03b");
        assert!(!result.saw_ctrl_c);
    }

    #[test]
    fn test_read_bytes_leading_ctrl_z_is_eof() {
        let (result, consumed) = read_bytes(CP_UTF8, true, true, b"\x1aabc", 16);
        assert!(result.eof);
        assert!(result.data.is_empty());
        assert_eq!(consumed, 1);
    }

    #[test]
    fn test_read_bytes_key_event_encodes_char() {
        // win32-input-mode 'a' key-down.
        let (result, _) = read_bytes(CP_UTF8, true, true, b"\x1b[65;30;97;1;0;1_", 16);
        assert_eq!(result.data, b"a");
    }

    #[test]
    fn test_read_bytes_swallows_reports_and_bare_keys() {
        let (result, consumed) = read_bytes(CP_UTF8, true, true, b"\x1b[?1;0c\x1b[Dx", 16);
        assert_eq!(result.data, b"x");
        assert_eq!(consumed, 11);
    }

    #[test]
    fn test_read_bytes_stops_at_partial_sequence() {
        let (result, consumed) = read_bytes(CP_UTF8, true, true, &[b'a', 0xC3], 16);
        assert_eq!(result.data, b"a");
        assert_eq!(consumed, 1);
    }

    #[test]
    fn test_read_units_surrogate_stash() {
        let bytes = "𝕊".as_bytes();
        let (result, consumed) = read_units(CP_UTF8, false, false, bytes, 1);
        assert_eq!(result.units, vec![0xD835]);
        assert_eq!(result.stash, Some(0xDD4A));
        assert_eq!(consumed, 4);
    }

    #[test]
    fn test_read_records_pair_needs_two_slots() {
        let bytes = "𝕊".as_bytes();
        let (result, _) = read_records(CP_UTF8, false, bytes, 2);
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[0].unicode_char, 0xD835);
        assert_eq!(result.records[1].unicode_char, 0xDD4A);
        assert_eq!(result.stash, None);
    }

    #[test]
    fn test_count_events() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"ab");
        bytes.extend_from_slice("𝕊".as_bytes());
        bytes.extend_from_slice(b"\x1b[D");
        bytes.extend_from_slice(b"\x03");
        bytes.extend_from_slice(&[0xC3]);
        // a, b, two surrogate units, one key; Ctrl+C filtered; partial
        // UTF-8 not counted.
        assert_eq!(count_events(CP_UTF8, true, &bytes), 5);
    }
}
