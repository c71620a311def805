//! The request packet model and the user-defined API descriptor layouts.
//!
//! Descriptor structs mirror the classic console wire contract field for
//! field; variable-length regions (strings, record arrays) travel in the
//! packet's input/output buffer space and are moved through the transport's
//! offset-based read/write operations.

use cathode_common::types::{Coord, Rect};
use cathode_parser::token::KeyEventRecord;

/// Fixed header preceding every user-defined descriptor in the input
/// buffer space.
pub const MSG_HEADER_SIZE: u32 = 8;

pub const CTRL_C_EVENT: u32 = 0;
pub const CTRL_BREAK_EVENT: u32 = 1;

pub const GENERIC_READ: u32 = 0x8000_0000;
pub const GENERIC_WRITE: u32 = 0x4000_0000;

pub mod object_type {
    pub const CURRENT_INPUT: u32 = 1;
    pub const CURRENT_OUTPUT: u32 = 2;
    pub const NEW_OUTPUT: u32 = 3;
    pub const GENERIC: u32 = 4;
}

pub mod element_type {
    pub const ATTRIBUTE: u16 = 1;
    pub const ASCII: u16 = 2;
    pub const REAL_UNICODE: u16 = 4;
    pub const FALSE_UNICODE: u16 = 8;
}

pub mod input_flags {
    /// Peek: leave the records in the stream.
    pub const NO_REMOVE: u16 = 0x0001;
    /// Return immediately even when nothing is available.
    pub const NO_WAIT: u16 = 0x0002;
}

pub const CHAR_TYPE_SBCS: u32 = 0;
pub const LF_FACESIZE: usize = 32;

/// The request kinds the driver can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoFunction {
    Connect,
    Disconnect,
    CreateObject,
    CloseObject,
    RawRead,
    RawWrite,
    RawFlush,
    UserDefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoDescriptor {
    pub identifier: u64,
    pub function: IoFunction,
    pub process: u64,
    pub object: u64,
    pub input_size: u32,
    pub output_size: u32,
}

impl IoDescriptor {
    pub fn new(identifier: u64, function: IoFunction) -> Self {
        Self {
            identifier,
            function,
            process: 0,
            object: 0,
            input_size: 0,
            output_size: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CreateObjectBody {
    pub object_type: u32,
    pub desired_access: u32,
    pub share_mode: u32,
}

/// The connect completion body: the three handles a client starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionInformation {
    pub process: u64,
    pub input: u64,
    pub output: u64,
}

pub const CONNECTION_INFORMATION_SIZE: usize = 24;

impl ConnectionInformation {
    pub fn to_bytes(self) -> [u8; CONNECTION_INFORMATION_SIZE] {
        let mut out = [0u8; CONNECTION_INFORMATION_SIZE];
        out[0..8].copy_from_slice(&self.process.to_le_bytes());
        out[8..16].copy_from_slice(&self.input.to_le_bytes());
        out[16..24].copy_from_slice(&self.output.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < CONNECTION_INFORMATION_SIZE {
            return None;
        }
        let read = |range: std::ops::Range<usize>| {
            u64::from_le_bytes(bytes[range].try_into().expect("8-byte slice"))
        };
        Some(Self {
            process: read(0..8),
            input: read(8..16),
            output: read(16..24),
        })
    }
}

/// User-defined API numbers: layer in the top byte, index below, matching
/// the classic three-layer split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ApiNumber {
    GetCp = 0x0100_0000,
    GetMode = 0x0100_0001,
    SetMode = 0x0100_0002,
    GetNumberOfInputEvents = 0x0100_0003,
    GetConsoleInput = 0x0100_0004,
    ReadConsole = 0x0100_0005,
    WriteConsole = 0x0100_0006,
    GetLangId = 0x0100_0007,
    NotifyLastClose = 0x0100_0008,
    MapBitmap = 0x0100_0009,

    FillConsoleOutput = 0x0200_0000,
    GenerateCtrlEvent = 0x0200_0001,
    SetActiveScreenBuffer = 0x0200_0002,
    FlushInputBuffer = 0x0200_0003,
    SetCp = 0x0200_0004,
    GetCursorInfo = 0x0200_0005,
    SetCursorInfo = 0x0200_0006,
    GetScreenBufferInfo = 0x0200_0007,
    SetScreenBufferInfo = 0x0200_0008,
    SetScreenBufferSize = 0x0200_0009,
    SetCursorPosition = 0x0200_000A,
    GetLargestWindowSize = 0x0200_000B,
    ScrollScreenBuffer = 0x0200_000C,
    SetTextAttribute = 0x0200_000D,
    SetWindowInfo = 0x0200_000E,
    ReadConsoleOutputString = 0x0200_000F,
    WriteConsoleInput = 0x0200_0010,
    WriteConsoleOutput = 0x0200_0011,
    WriteConsoleOutputString = 0x0200_0012,
    ReadConsoleOutput = 0x0200_0013,
    GetTitle = 0x0200_0014,
    SetTitle = 0x0200_0015,

    GetNumberOfFonts = 0x0300_0000,
    GetMouseInfo = 0x0300_0001,
    GetFontInfo = 0x0300_0002,
    GetFontSize = 0x0300_0003,
    GetCurrentFont = 0x0300_0004,
    SetFont = 0x0300_0005,
    SetIcon = 0x0300_0006,
    InvalidateBitmapRect = 0x0300_0007,
    VdmOperation = 0x0300_0008,
    SetKeyShortcuts = 0x0300_0009,
    SetMenuClose = 0x0300_000A,
    GetKeyboardLayoutName = 0x0300_000B,
    GetConsoleWindow = 0x0300_000C,
    CharType = 0x0300_000D,
    SetLocalEudc = 0x0300_000E,
    SetCursorMode = 0x0300_000F,
    GetCursorMode = 0x0300_0010,
    RegisterOs2 = 0x0300_0011,
    SetOs2OemFormat = 0x0300_0012,
    GetNlsMode = 0x0300_0013,
    SetNlsMode = 0x0300_0014,
    GetDisplayMode = 0x0300_0015,
    SetDisplayMode = 0x0300_0016,
    AddAlias = 0x0300_0017,
    GetAlias = 0x0300_0018,
    GetAliasesLength = 0x0300_0019,
    GetAliasExesLength = 0x0300_001A,
    GetAliases = 0x0300_001B,
    GetAliasExes = 0x0300_001C,
    ExpungeCommandHistory = 0x0300_001D,
    SetNumberOfCommands = 0x0300_001E,
    GetCommandHistoryLength = 0x0300_001F,
    GetCommandHistory = 0x0300_0020,
    GetHistory = 0x0300_0021,
    SetHistory = 0x0300_0022,
    SetCurrentFont = 0x0300_0023,
    SetCursor = 0x0300_0024,
    ShowCursor = 0x0300_0025,
    MenuControl = 0x0300_0026,
    SetPalette = 0x0300_0027,
    RegisterVdm = 0x0300_0028,
    GetHardwareState = 0x0300_0029,
    SetHardwareState = 0x0300_002A,
    GetSelectionInfo = 0x0300_002B,
    GetConsoleProcessList = 0x0300_002C,
}

impl ApiNumber {
    pub fn from_u32(value: u32) -> Option<Self> {
        use ApiNumber::*;
        let known = [
            GetCp,
            GetMode,
            SetMode,
            GetNumberOfInputEvents,
            GetConsoleInput,
            ReadConsole,
            WriteConsole,
            GetLangId,
            NotifyLastClose,
            MapBitmap,
            FillConsoleOutput,
            GenerateCtrlEvent,
            SetActiveScreenBuffer,
            FlushInputBuffer,
            SetCp,
            GetCursorInfo,
            SetCursorInfo,
            GetScreenBufferInfo,
            SetScreenBufferInfo,
            SetScreenBufferSize,
            SetCursorPosition,
            GetLargestWindowSize,
            ScrollScreenBuffer,
            SetTextAttribute,
            SetWindowInfo,
            ReadConsoleOutputString,
            WriteConsoleInput,
            WriteConsoleOutput,
            WriteConsoleOutputString,
            ReadConsoleOutput,
            GetTitle,
            SetTitle,
            GetNumberOfFonts,
            GetMouseInfo,
            GetFontInfo,
            GetFontSize,
            GetCurrentFont,
            SetFont,
            SetIcon,
            InvalidateBitmapRect,
            VdmOperation,
            SetKeyShortcuts,
            SetMenuClose,
            GetKeyboardLayoutName,
            GetConsoleWindow,
            CharType,
            SetLocalEudc,
            SetCursorMode,
            GetCursorMode,
            RegisterOs2,
            SetOs2OemFormat,
            GetNlsMode,
            SetNlsMode,
            GetDisplayMode,
            SetDisplayMode,
            AddAlias,
            GetAlias,
            GetAliasesLength,
            GetAliasExesLength,
            GetAliases,
            GetAliasExes,
            ExpungeCommandHistory,
            SetNumberOfCommands,
            GetCommandHistoryLength,
            GetCommandHistory,
            GetHistory,
            SetHistory,
            SetCurrentFont,
            SetCursor,
            ShowCursor,
            MenuControl,
            SetPalette,
            RegisterVdm,
            GetHardwareState,
            SetHardwareState,
            GetSelectionInfo,
            GetConsoleProcessList,
        ];
        known.into_iter().find(|&api| api as u32 == value)
    }

    /// Operations the host intentionally refuses.
    pub fn is_unsupported(self) -> bool {
        use ApiNumber::*;
        matches!(
            self,
            MapBitmap
                | SetIcon
                | InvalidateBitmapRect
                | VdmOperation
                | SetCursor
                | ShowCursor
                | MenuControl
                | SetPalette
                | RegisterVdm
                | GetHardwareState
                | SetHardwareState
        )
    }
}

// Descriptor bodies, one struct per wire layout.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GetCpMsg {
    pub code_page: u32,
    pub output: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeMsg {
    pub mode: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GetNumberOfInputEventsMsg {
    pub ready_events: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GetInputMsg {
    pub flags: u16,
    pub unicode: bool,
    pub num_records: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadConsoleMsg {
    pub unicode: bool,
    pub process_control_z: bool,
    pub exe_name_length: u16,
    pub initial_num_bytes: u32,
    pub ctrl_wakeup_mask: u32,
    pub control_key_state: u32,
    pub num_bytes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteConsoleMsg {
    pub num_bytes: u32,
    pub unicode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GetLangIdMsg {
    pub lang_id: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FillConsoleOutputMsg {
    pub write_coord: Coord,
    pub element_type: u16,
    pub element: u16,
    pub length: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CtrlEventMsg {
    pub ctrl_event: u32,
    pub process_group_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetCpMsg {
    pub code_page: u32,
    pub output: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorInfoMsg {
    pub cursor_size: u32,
    pub visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenBufferInfoMsg {
    pub size: Coord,
    pub cursor_position: Coord,
    pub scroll_position: Coord,
    pub attributes: u16,
    pub current_window_size: Coord,
    pub maximum_window_size: Coord,
    pub popup_attributes: u16,
    pub fullscreen_supported: bool,
    pub color_table: [u32; 16],
}

impl Default for ScreenBufferInfoMsg {
    fn default() -> Self {
        Self {
            size: Coord::default(),
            cursor_position: Coord::default(),
            scroll_position: Coord::default(),
            attributes: 0,
            current_window_size: Coord::default(),
            maximum_window_size: Coord::default(),
            popup_attributes: 0,
            fullscreen_supported: false,
            color_table: [0; 16],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetScreenBufferSizeMsg {
    pub size: Coord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetCursorPositionMsg {
    pub cursor_position: Coord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GetLargestWindowSizeMsg {
    pub size: Coord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrollScreenBufferMsg {
    pub scroll_rectangle: Rect,
    pub clip_rectangle: Rect,
    pub clip: bool,
    pub unicode: bool,
    pub destination_origin: Coord,
    pub fill_char: u16,
    pub fill_attrs: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetTextAttributeMsg {
    pub attributes: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetWindowInfoMsg {
    pub absolute: bool,
    pub window: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputStringMsg {
    pub coord: Coord,
    pub string_type: u16,
    pub num_records: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputRectMsg {
    pub char_region: Rect,
    pub unicode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteConsoleInputMsg {
    pub num_records: u32,
    pub unicode: bool,
    pub append: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TitleMsg {
    pub title_length: u32,
    pub unicode: bool,
    /// Read the startup title instead of the current one.
    pub original: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GetMouseInfoMsg {
    pub num_buttons: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GetFontInfoMsg {
    pub maximum_window: bool,
    pub num_fonts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GetFontSizeMsg {
    pub font_index: u32,
    pub font_size: Coord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentFontMsg {
    pub maximum_window: bool,
    pub font_index: u32,
    pub font_size: Coord,
    pub font_family: u32,
    pub font_weight: u32,
    pub face_name: [u16; LF_FACESIZE],
}

impl Default for CurrentFontMsg {
    fn default() -> Self {
        Self {
            maximum_window: false,
            font_index: 0,
            font_size: Coord::default(),
            font_family: 0,
            font_weight: 0,
            face_name: [0; LF_FACESIZE],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GetNumberOfFontsMsg {
    pub number_of_fonts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GetDisplayModeMsg {
    pub mode_flags: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetDisplayModeMsg {
    pub flags: u32,
    pub screen_buffer_dimensions: Coord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddAliasMsg {
    pub source_length: u16,
    pub target_length: u16,
    pub exe_length: u16,
    pub unicode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GetAliasMsg {
    pub source_length: u16,
    pub target_length: u16,
    pub exe_length: u16,
    pub unicode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AliasLengthMsg {
    pub length: u32,
    pub unicode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GetAliasesMsg {
    pub length: u32,
    pub unicode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistoryInfoMsg {
    pub flags: u32,
    pub number_of_history_buffers: u32,
    pub history_buffer_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExpungeCommandHistoryMsg {
    pub unicode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetNumberOfCommandsMsg {
    pub num_commands: u32,
    pub unicode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandHistoryLengthMsg {
    pub length: u32,
    pub unicode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GetCommandHistoryMsg {
    pub length: u32,
    pub unicode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardLayoutNameMsg {
    pub ansi: bool,
    pub layout_wide: [u16; 9],
    pub layout_ansi: [u8; 9],
}

impl Default for KeyboardLayoutNameMsg {
    fn default() -> Self {
        Self {
            ansi: false,
            layout_wide: [0; 9],
            layout_ansi: [0; 9],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GetConsoleWindowMsg {
    pub hwnd: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectionInfo {
    pub flags: u32,
    pub selection_anchor: Coord,
    pub selection: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GetSelectionInfoMsg {
    pub selection_info: SelectionInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GetProcessListMsg {
    pub process_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharTypeMsg {
    pub coord_check: Coord,
    pub char_type: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetLocalEudcMsg {
    pub code_point: u16,
    pub font_size: Coord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorModeMsg {
    pub blink: bool,
    pub db_enable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NlsModeMsg {
    pub ready: bool,
    pub nls_mode: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegisterOs2Msg {
    pub os2_register: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetOs2OemFormatMsg {
    pub os2_oem_format: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetKeyShortcutsMsg {
    pub set: bool,
    pub reserve_keys: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetMenuCloseMsg {
    pub enable: bool,
}

/// A user-defined descriptor, keyed by [`ApiNumber`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiDescriptor {
    GetCp(GetCpMsg),
    Mode(ModeMsg),
    GetNumberOfInputEvents(GetNumberOfInputEventsMsg),
    GetInput(GetInputMsg),
    ReadConsole(ReadConsoleMsg),
    WriteConsole(WriteConsoleMsg),
    GetLangId(GetLangIdMsg),
    FillConsoleOutput(FillConsoleOutputMsg),
    CtrlEvent(CtrlEventMsg),
    SetCp(SetCpMsg),
    CursorInfo(CursorInfoMsg),
    ScreenBufferInfo(ScreenBufferInfoMsg),
    SetScreenBufferSize(SetScreenBufferSizeMsg),
    SetCursorPosition(SetCursorPositionMsg),
    GetLargestWindowSize(GetLargestWindowSizeMsg),
    ScrollScreenBuffer(ScrollScreenBufferMsg),
    SetTextAttribute(SetTextAttributeMsg),
    SetWindowInfo(SetWindowInfoMsg),
    OutputString(OutputStringMsg),
    OutputRect(OutputRectMsg),
    WriteConsoleInput(WriteConsoleInputMsg),
    Title(TitleMsg),
    GetMouseInfo(GetMouseInfoMsg),
    GetFontInfo(GetFontInfoMsg),
    GetFontSize(GetFontSizeMsg),
    CurrentFont(CurrentFontMsg),
    GetNumberOfFonts(GetNumberOfFontsMsg),
    GetDisplayMode(GetDisplayModeMsg),
    SetDisplayMode(SetDisplayModeMsg),
    AddAlias(AddAliasMsg),
    GetAlias(GetAliasMsg),
    AliasLength(AliasLengthMsg),
    GetAliases(GetAliasesMsg),
    HistoryInfo(HistoryInfoMsg),
    ExpungeCommandHistory(ExpungeCommandHistoryMsg),
    SetNumberOfCommands(SetNumberOfCommandsMsg),
    CommandHistoryLength(CommandHistoryLengthMsg),
    GetCommandHistory(GetCommandHistoryMsg),
    KeyboardLayoutName(KeyboardLayoutNameMsg),
    GetConsoleWindow(GetConsoleWindowMsg),
    GetSelectionInfo(GetSelectionInfoMsg),
    GetProcessList(GetProcessListMsg),
    CharType(CharTypeMsg),
    SetLocalEudc(SetLocalEudcMsg),
    CursorMode(CursorModeMsg),
    NlsMode(NlsModeMsg),
    RegisterOs2(RegisterOs2Msg),
    SetOs2OemFormat(SetOs2OemFormatMsg),
    SetKeyShortcuts(SetKeyShortcutsMsg),
    SetMenuClose(SetMenuCloseMsg),
    /// No descriptor body (SetActiveScreenBuffer, FlushInputBuffer, ...).
    Empty,
    /// An unrecognized layout, kept as raw bytes so a not-implemented
    /// reply can zero them deterministically.
    Unknown(Vec<u8>),
}

impl ApiDescriptor {
    /// Blank the descriptor so unimplemented replies are deterministic.
    pub fn zero(&mut self) {
        if let ApiDescriptor::Unknown(bytes) = self {
            bytes.fill(0);
        } else {
            *self = ApiDescriptor::Empty;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MsgHeader {
    pub api_number: u32,
    pub api_descriptor_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDefinedPacket {
    pub header: MsgHeader,
    pub descriptor: ApiDescriptor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    None,
    CreateObject(CreateObjectBody),
    UserDefined(UserDefinedPacket),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoPacket {
    pub descriptor: IoDescriptor,
    pub payload: Payload,
}

impl IoPacket {
    pub fn new(identifier: u64, function: IoFunction) -> Self {
        Self {
            descriptor: IoDescriptor::new(identifier, function),
            payload: Payload::None,
        }
    }

    pub fn user_defined(&self) -> Option<&UserDefinedPacket> {
        match &self.payload {
            Payload::UserDefined(packet) => Some(packet),
            _ => None,
        }
    }

    pub fn user_defined_mut(&mut self) -> Option<&mut UserDefinedPacket> {
        match &mut self.payload {
            Payload::UserDefined(packet) => Some(packet),
            _ => None,
        }
    }
}

// Wire records carried in buffer space.

pub const INPUT_RECORD_SIZE: usize = 20;
pub const KEY_EVENT: u16 = 0x0001;

pub fn encode_input_record(record: &KeyEventRecord, out: &mut Vec<u8>) {
    out.extend_from_slice(&KEY_EVENT.to_le_bytes());
    out.extend_from_slice(&[0u8; 2]);
    out.extend_from_slice(&u32::from(record.key_down).to_le_bytes());
    out.extend_from_slice(&record.repeat_count.to_le_bytes());
    out.extend_from_slice(&record.virtual_key_code.to_le_bytes());
    out.extend_from_slice(&record.virtual_scan_code.to_le_bytes());
    out.extend_from_slice(&record.unicode_char.to_le_bytes());
    out.extend_from_slice(&record.control_key_state.to_le_bytes());
}

/// Decode one INPUT_RECORD; non-key events come back as `None` inside
/// `Some` (recognized, but nothing to do with them).
pub fn decode_input_record(bytes: &[u8]) -> Option<Option<KeyEventRecord>> {
    if bytes.len() < INPUT_RECORD_SIZE {
        return None;
    }
    let event_type = u16::from_le_bytes([bytes[0], bytes[1]]);
    if event_type != KEY_EVENT {
        return Some(None);
    }
    let u16_at = |offset: usize| u16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
    let u32_at = |offset: usize| {
        u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    };
    Some(Some(KeyEventRecord {
        key_down: u32_at(4) != 0,
        repeat_count: u16_at(8),
        virtual_key_code: u16_at(10),
        virtual_scan_code: u16_at(12),
        unicode_char: u16_at(14),
        control_key_state: u32_at(16),
    }))
}

pub const CHAR_INFO_SIZE: usize = 4;

pub fn encode_char_info(ch: u16, attrs: u16, out: &mut Vec<u8>) {
    out.extend_from_slice(&ch.to_le_bytes());
    out.extend_from_slice(&attrs.to_le_bytes());
}

pub fn decode_char_info(bytes: &[u8]) -> Option<(u16, u16)> {
    if bytes.len() < CHAR_INFO_SIZE {
        return None;
    }
    Some((
        u16::from_le_bytes([bytes[0], bytes[1]]),
        u16::from_le_bytes([bytes[2], bytes[3]]),
    ))
}

pub const FONT_INFO_SIZE: usize = 8;

pub fn encode_font_info(font_index: u32, size: Coord, out: &mut Vec<u8>) {
    out.extend_from_slice(&font_index.to_le_bytes());
    out.extend_from_slice(&size.x.to_le_bytes());
    out.extend_from_slice(&size.y.to_le_bytes());
}
