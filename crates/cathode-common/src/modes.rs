use bitflags::bitflags;

bitflags! {
    /// Input-side console mode bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InputMode: u32 {
        const PROCESSED_INPUT = 0x0001;
        const LINE_INPUT = 0x0002;
        const ECHO_INPUT = 0x0004;
        const WINDOW_INPUT = 0x0008;
        const MOUSE_INPUT = 0x0010;
        const INSERT_MODE = 0x0020;
        const QUICK_EDIT_MODE = 0x0040;
        const EXTENDED_FLAGS = 0x0080;
        const AUTO_POSITION = 0x0100;
        const VIRTUAL_TERMINAL_INPUT = 0x0200;
    }
}

impl Default for InputMode {
    fn default() -> Self {
        InputMode::PROCESSED_INPUT
            | InputMode::LINE_INPUT
            | InputMode::ECHO_INPUT
            | InputMode::MOUSE_INPUT
            | InputMode::EXTENDED_FLAGS
    }
}

bitflags! {
    /// Output-side console mode bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OutputMode: u32 {
        const PROCESSED_OUTPUT = 0x0001;
        const WRAP_AT_EOL_OUTPUT = 0x0002;
        const VIRTUAL_TERMINAL_PROCESSING = 0x0004;
        const DISABLE_NEWLINE_AUTO_RETURN = 0x0008;
        const LVB_GRID_WORLDWIDE = 0x0010;
    }
}

impl Default for OutputMode {
    fn default() -> Self {
        OutputMode::PROCESSED_OUTPUT | OutputMode::WRAP_AT_EOL_OUTPUT
    }
}

bitflags! {
    /// History configuration flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HistoryFlags: u32 {
        const NO_DUP = 0x0001;
    }
}
