/// A key event in the classic console record layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyEventRecord {
    pub key_down: bool,
    pub repeat_count: u16,
    pub virtual_key_code: u16,
    pub virtual_scan_code: u16,
    pub unicode_char: u16,
    pub control_key_state: u32,
}

pub mod control_key_state {
    pub const SHIFT_PRESSED: u32 = 0x0010;
    pub const LEFT_CTRL_PRESSED: u32 = 0x0008;
    pub const RIGHT_CTRL_PRESSED: u32 = 0x0004;
    pub const LEFT_ALT_PRESSED: u32 = 0x0002;
    pub const ENHANCED_KEY: u32 = 0x0100;
}

pub mod virtual_key {
    pub const VK_CANCEL: u16 = 0x03;
    pub const VK_BACK: u16 = 0x08;
    pub const VK_TAB: u16 = 0x09;
    pub const VK_RETURN: u16 = 0x0D;
    pub const VK_ESCAPE: u16 = 0x1B;
    pub const VK_PRIOR: u16 = 0x21;
    pub const VK_NEXT: u16 = 0x22;
    pub const VK_END: u16 = 0x23;
    pub const VK_HOME: u16 = 0x24;
    pub const VK_LEFT: u16 = 0x25;
    pub const VK_UP: u16 = 0x26;
    pub const VK_RIGHT: u16 = 0x27;
    pub const VK_DOWN: u16 = 0x28;
    pub const VK_INSERT: u16 = 0x2D;
    pub const VK_DELETE: u16 = 0x2E;
    pub const VK_F1: u16 = 0x70;
}

/// Up to one character: a single UTF-16 unit or a surrogate pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextUnits {
    units: [u16; 2],
    len: u8,
}

impl TextUnits {
    pub fn single(unit: u16) -> Self {
        Self {
            units: [unit, 0],
            len: 1,
        }
    }

    pub fn pair(high: u16, low: u16) -> Self {
        Self {
            units: [high, low],
            len: 2,
        }
    }

    pub fn from_char(ch: char) -> Self {
        let mut buf = [0u16; 2];
        let encoded = ch.encode_utf16(&mut buf);
        if encoded.len() == 2 {
            Self::pair(buf[0], buf[1])
        } else {
            Self::single(buf[0])
        }
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.units[..usize::from(self.len)]
    }

    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The outcome of decoding one token from the head of a byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputToken {
    /// A decoded character (or surrogate pair).
    Text { units: TextUnits, consumed: usize },
    /// A key event synthesized from a VT input sequence.
    Key {
        record: KeyEventRecord,
        consumed: usize,
    },
    /// A VT report that is recognized but carries no input (DA1 response,
    /// focus change, cursor report).
    Ignored { consumed: usize },
    /// The prefix is a valid start of a multi-byte sequence; decoding can
    /// only continue once more bytes arrive.
    NeedMoreData,
}

impl InputToken {
    pub fn consumed(&self) -> usize {
        match self {
            InputToken::Text { consumed, .. }
            | InputToken::Key { consumed, .. }
            | InputToken::Ignored { consumed } => *consumed,
            InputToken::NeedMoreData => 0,
        }
    }
}
