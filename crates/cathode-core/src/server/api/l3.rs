//! Layer 3: aliases, command history, fonts, and the long tail of legacy
//! inspection APIs answered with fixed deterministic state.

use cathode_common::traits::{DeviceComm, HostIo};
use cathode_common::{Result, Status};
use cathode_parser::codepage;

use super::super::message::ApiMessage;
use super::super::protocol::{self, ApiNumber, CHAR_TYPE_SBCS, LF_FACESIZE};
use super::super::state::ServerState;
use super::{invalid, store_body, take_body};

pub(super) fn dispatch<C: DeviceComm, H: HostIo>(
    api: ApiNumber,
    state: &mut ServerState,
    message: &mut ApiMessage<'_, C>,
    _host: &mut H,
) -> Result<()> {
    match api {
        ApiNumber::GetNumberOfFonts => get_number_of_fonts(message),
        ApiNumber::GetMouseInfo => get_mouse_info(message),
        ApiNumber::GetFontInfo => get_font_info(state, message),
        ApiNumber::GetFontSize => get_font_size(state, message),
        ApiNumber::GetCurrentFont => get_current_font(state, message),
        ApiNumber::SetCurrentFont | ApiNumber::SetFont => set_current_font(state, message),
        ApiNumber::GetDisplayMode => get_display_mode(message),
        ApiNumber::SetDisplayMode => set_display_mode(state, message),
        ApiNumber::GetKeyboardLayoutName => get_keyboard_layout_name(message),
        ApiNumber::GetConsoleWindow => get_console_window(message),
        ApiNumber::GetSelectionInfo => get_selection_info(message),
        ApiNumber::GetConsoleProcessList => get_process_list(state, message),
        ApiNumber::CharType => char_type(state, message),
        ApiNumber::SetCursorMode => set_cursor_mode(state, message),
        ApiNumber::GetCursorMode => get_cursor_mode(state, message),
        ApiNumber::SetNlsMode => set_nls_mode(state, message),
        ApiNumber::GetNlsMode => get_nls_mode(state, message),
        ApiNumber::AddAlias => add_alias(state, message),
        ApiNumber::GetAlias => get_alias(state, message),
        ApiNumber::GetAliasesLength => get_aliases_length(state, message),
        ApiNumber::GetAliasExesLength => get_alias_exes_length(state, message),
        ApiNumber::GetAliases => get_aliases(state, message),
        ApiNumber::GetAliasExes => get_alias_exes(state, message),
        ApiNumber::GetHistory => get_history(state, message),
        ApiNumber::SetHistory => set_history(state, message),
        ApiNumber::ExpungeCommandHistory => expunge_command_history(state, message),
        ApiNumber::SetNumberOfCommands => set_number_of_commands(state, message),
        ApiNumber::GetCommandHistoryLength => get_command_history_length(state, message),
        ApiNumber::GetCommandHistory => get_command_history(state, message),
        ApiNumber::SetLocalEudc => {
            let matched = take_body!(message, SetLocalEudc).is_some();
            stub_ok(message, matched)
        }
        ApiNumber::RegisterOs2 => {
            let matched = take_body!(message, RegisterOs2).is_some();
            stub_ok(message, matched)
        }
        ApiNumber::SetOs2OemFormat => {
            let matched = take_body!(message, SetOs2OemFormat).is_some();
            stub_ok(message, matched)
        }
        ApiNumber::SetKeyShortcuts => {
            let matched = take_body!(message, SetKeyShortcuts).is_some();
            stub_ok(message, matched)
        }
        ApiNumber::SetMenuClose => {
            let matched = take_body!(message, SetMenuClose).is_some();
            stub_ok(message, matched)
        }
        _ => {
            message.set_reply(Status::NotImplemented, 0);
            Ok(())
        }
    }
}

/// Accepted-but-inert setters: the descriptor only has to match.
fn stub_ok<C: DeviceComm>(message: &mut ApiMessage<'_, C>, matched: bool) -> Result<()> {
    if matched {
        message.set_reply(Status::Success, 0);
        Ok(())
    } else {
        invalid(message)
    }
}

fn get_number_of_fonts<C: DeviceComm>(message: &mut ApiMessage<'_, C>) -> Result<()> {
    let Some(mut body) = take_body!(message, GetNumberOfFonts) else {
        return invalid(message);
    };
    body.number_of_fonts = 1;
    store_body!(message, GetNumberOfFonts, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn get_mouse_info<C: DeviceComm>(message: &mut ApiMessage<'_, C>) -> Result<()> {
    let Some(mut body) = take_body!(message, GetMouseInfo) else {
        return invalid(message);
    };
    body.num_buttons = 3;
    store_body!(message, GetMouseInfo, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn get_font_info<C: DeviceComm>(state: &ServerState, message: &mut ApiMessage<'_, C>) -> Result<()> {
    let Some(mut body) = take_body!(message, GetFontInfo) else {
        return invalid(message);
    };
    body.num_fonts = 1;
    let mut written = 0u64;
    if message.output_capacity() >= protocol::FONT_INFO_SIZE {
        let mut bytes = Vec::with_capacity(protocol::FONT_INFO_SIZE);
        protocol::encode_font_info(state.font.index, state.font.size, &mut bytes);
        message.output_buffer()[..bytes.len()].copy_from_slice(&bytes);
        written = bytes.len() as u64;
    }
    store_body!(message, GetFontInfo, body);
    message.set_reply(Status::Success, written);
    Ok(())
}

fn get_font_size<C: DeviceComm>(state: &ServerState, message: &mut ApiMessage<'_, C>) -> Result<()> {
    let Some(mut body) = take_body!(message, GetFontSize) else {
        return invalid(message);
    };
    if body.font_index != 0 {
        message.set_reply(Status::InvalidParameter, 0);
        return Ok(());
    }
    body.font_size = state.font.size;
    store_body!(message, GetFontSize, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn get_current_font<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(mut body) = take_body!(message, CurrentFont) else {
        return invalid(message);
    };
    body.font_index = state.font.index;
    body.font_size = state.font.size;
    body.font_family = state.font.family;
    body.font_weight = state.font.weight;
    body.face_name = [0; LF_FACESIZE];
    for (slot, unit) in body
        .face_name
        .iter_mut()
        .zip(state.font.face.iter().take(LF_FACESIZE - 1))
    {
        *slot = *unit;
    }
    store_body!(message, CurrentFont, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn set_current_font<C: DeviceComm>(
    state: &mut ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(body) = take_body!(message, CurrentFont) else {
        return invalid(message);
    };
    state.font.index = body.font_index;
    if body.font_size.x > 0 && body.font_size.y > 0 {
        state.font.size = body.font_size;
    }
    state.font.family = body.font_family;
    state.font.weight = body.font_weight;
    let face: Vec<u16> = body
        .face_name
        .iter()
        .copied()
        .take_while(|&unit| unit != 0)
        .collect();
    if !face.is_empty() {
        state.font.face = face;
    }
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn get_display_mode<C: DeviceComm>(message: &mut ApiMessage<'_, C>) -> Result<()> {
    let Some(mut body) = take_body!(message, GetDisplayMode) else {
        return invalid(message);
    };
    body.mode_flags = 0;
    store_body!(message, GetDisplayMode, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn set_display_mode<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(mut body) = take_body!(message, SetDisplayMode) else {
        return invalid(message);
    };
    let Some(active) = state.active_screen_buffer() else {
        message.set_reply(Status::NoMemory, 0);
        return Ok(());
    };
    body.screen_buffer_dimensions = active.borrow().size();
    store_body!(message, SetDisplayMode, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn get_keyboard_layout_name<C: DeviceComm>(message: &mut ApiMessage<'_, C>) -> Result<()> {
    let Some(mut body) = take_body!(message, KeyboardLayoutName) else {
        return invalid(message);
    };
    const LAYOUT: &[u8; 8] = b"00000409";
    if body.ansi {
        body.layout_ansi = [0; 9];
        body.layout_ansi[..8].copy_from_slice(LAYOUT);
    } else {
        body.layout_wide = [0; 9];
        for (slot, byte) in body.layout_wide.iter_mut().zip(LAYOUT.iter()) {
            *slot = u16::from(*byte);
        }
    }
    store_body!(message, KeyboardLayoutName, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn get_console_window<C: DeviceComm>(message: &mut ApiMessage<'_, C>) -> Result<()> {
    let Some(mut body) = take_body!(message, GetConsoleWindow) else {
        return invalid(message);
    };
    body.hwnd = 0;
    store_body!(message, GetConsoleWindow, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn get_selection_info<C: DeviceComm>(message: &mut ApiMessage<'_, C>) -> Result<()> {
    let Some(mut body) = take_body!(message, GetSelectionInfo) else {
        return invalid(message);
    };
    body.selection_info = protocol::SelectionInfo::default();
    store_body!(message, GetSelectionInfo, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn get_process_list<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(mut body) = take_body!(message, GetProcessList) else {
        return invalid(message);
    };
    let pids = state.pids_newest_first();
    body.process_count = pids.len() as u32;
    let required = pids.len() * 4;
    if message.output_capacity() < required {
        store_body!(message, GetProcessList, body);
        message.set_reply(Status::Success, 0);
        return Ok(());
    }
    let mut bytes = Vec::with_capacity(required);
    for pid in &pids {
        bytes.extend_from_slice(&pid.to_le_bytes());
    }
    message.output_buffer()[..required].copy_from_slice(&bytes);
    store_body!(message, GetProcessList, body);
    message.set_reply(Status::Success, required as u64);
    Ok(())
}

fn char_type<C: DeviceComm>(state: &ServerState, message: &mut ApiMessage<'_, C>) -> Result<()> {
    let Some(mut body) = take_body!(message, CharType) else {
        return invalid(message);
    };
    let object = message.packet().descriptor.object;
    let Some(buffer) = state.screen_buffer_of(object) else {
        message.set_reply(Status::InvalidHandle, 0);
        return Ok(());
    };
    if !buffer.borrow().bounds().contains(body.coord_check) {
        message.set_reply(Status::InvalidParameter, 0);
        return Ok(());
    }
    body.char_type = CHAR_TYPE_SBCS;
    store_body!(message, CharType, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn set_cursor_mode<C: DeviceComm>(
    state: &mut ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(body) = take_body!(message, CursorMode) else {
        return invalid(message);
    };
    state.cursor_mode_blink = body.blink;
    state.cursor_mode_db_enable = body.db_enable;
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn get_cursor_mode<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(mut body) = take_body!(message, CursorMode) else {
        return invalid(message);
    };
    body.blink = state.cursor_mode_blink;
    body.db_enable = state.cursor_mode_db_enable;
    store_body!(message, CursorMode, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn set_nls_mode<C: DeviceComm>(
    state: &mut ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(body) = take_body!(message, NlsMode) else {
        return invalid(message);
    };
    state.nls_mode = body.nls_mode;
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn get_nls_mode<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(mut body) = take_body!(message, NlsMode) else {
        return invalid(message);
    };
    body.ready = true;
    body.nls_mode = state.nls_mode;
    store_body!(message, NlsMode, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

// Aliases. The input tail carries the strings back to back in the order
// the lengths appear in the descriptor.

fn decode_name(bytes: &[u8], unicode: bool) -> Vec<u16> {
    if unicode {
        bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    } else {
        codepage::decode_bytes(0, bytes)
    }
}

fn encode_name(units: &[u16], unicode: bool, out: &mut Vec<u8>) {
    if unicode {
        for unit in units {
            out.extend_from_slice(&unit.to_le_bytes());
        }
    } else {
        codepage::encode_units(0, units, out);
    }
}

fn name_unit_size(unicode: bool) -> usize {
    if unicode {
        2
    } else {
        1
    }
}

fn add_alias<C: DeviceComm>(state: &mut ServerState, message: &mut ApiMessage<'_, C>) -> Result<()> {
    let Some(body) = take_body!(message, AddAlias) else {
        return invalid(message);
    };
    let tail = message.read_input_tail()?;
    let source_len = usize::from(body.source_length);
    let target_len = usize::from(body.target_length);
    let exe_len = usize::from(body.exe_length);
    if source_len == 0 || source_len + target_len + exe_len > tail.len() {
        message.set_reply(Status::InvalidParameter, 0);
        return Ok(());
    }
    let source = decode_name(&tail[..source_len], body.unicode);
    let target = decode_name(&tail[source_len..source_len + target_len], body.unicode);
    let exe = decode_name(
        &tail[source_len + target_len..source_len + target_len + exe_len],
        body.unicode,
    );
    if exe.is_empty() {
        message.set_reply(Status::InvalidParameter, 0);
        return Ok(());
    }
    state.add_alias(&exe, &source, &target);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn get_alias<C: DeviceComm>(state: &ServerState, message: &mut ApiMessage<'_, C>) -> Result<()> {
    let Some(mut body) = take_body!(message, GetAlias) else {
        return invalid(message);
    };
    let tail = message.read_input_tail()?;
    let source_len = usize::from(body.source_length);
    let exe_len = usize::from(body.exe_length);
    if source_len == 0 || source_len + exe_len > tail.len() {
        message.set_reply(Status::InvalidParameter, 0);
        return Ok(());
    }
    let source = decode_name(&tail[..source_len], body.unicode);
    let exe = decode_name(&tail[source_len..source_len + exe_len], body.unicode);

    let Some(target) = state.alias_target(&exe, &source) else {
        body.target_length = 0;
        store_body!(message, GetAlias, body);
        message.set_reply(Status::Unsuccessful, 0);
        return Ok(());
    };
    let mut bytes = Vec::new();
    encode_name(target, body.unicode, &mut bytes);
    encode_name(&[0], body.unicode, &mut bytes);
    if bytes.len() > message.output_capacity() {
        body.target_length = bytes.len() as u16;
        store_body!(message, GetAlias, body);
        message.set_reply(Status::BufferTooSmall, 0);
        return Ok(());
    }
    let len = bytes.len();
    message.output_buffer()[..len].copy_from_slice(&bytes);
    body.target_length = len as u16;
    store_body!(message, GetAlias, body);
    message.set_reply(Status::Success, len as u64);
    Ok(())
}

fn get_aliases_length<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(mut body) = take_body!(message, AliasLength) else {
        return invalid(message);
    };
    let tail = message.read_input_tail()?;
    let exe = decode_name(&tail, body.unicode);
    let unit = name_unit_size(body.unicode);
    let mut total = 0usize;
    if let Some(table) = state.alias_table(&exe) {
        for entry in table.entries.values() {
            // "source=target" plus the NUL separator.
            total += (entry.source.len() + 1 + entry.target.len() + 1) * unit;
        }
    }
    body.length = total as u32;
    store_body!(message, AliasLength, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn get_aliases<C: DeviceComm>(state: &ServerState, message: &mut ApiMessage<'_, C>) -> Result<()> {
    let Some(mut body) = take_body!(message, GetAliases) else {
        return invalid(message);
    };
    let tail = message.read_input_tail()?;
    let exe = decode_name(&tail, body.unicode);
    let mut bytes = Vec::new();
    if let Some(table) = state.alias_table(&exe) {
        for entry in table.entries.values() {
            encode_name(&entry.source, body.unicode, &mut bytes);
            encode_name(&[b'=' as u16], body.unicode, &mut bytes);
            encode_name(&entry.target, body.unicode, &mut bytes);
            encode_name(&[0], body.unicode, &mut bytes);
        }
    }
    if bytes.len() > message.output_capacity() {
        body.length = bytes.len() as u32;
        store_body!(message, GetAliases, body);
        message.set_reply(Status::BufferTooSmall, 0);
        return Ok(());
    }
    let len = bytes.len();
    message.output_buffer()[..len].copy_from_slice(&bytes);
    body.length = len as u32;
    store_body!(message, GetAliases, body);
    message.set_reply(Status::Success, len as u64);
    Ok(())
}

fn get_alias_exes_length<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(mut body) = take_body!(message, AliasLength) else {
        return invalid(message);
    };
    let unit = name_unit_size(body.unicode);
    let total: usize = state
        .alias_exes()
        .map(|table| (table.exe.len() + 1) * unit)
        .sum();
    body.length = total as u32;
    store_body!(message, AliasLength, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn get_alias_exes<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(mut body) = take_body!(message, GetAliases) else {
        return invalid(message);
    };
    let mut bytes = Vec::new();
    for table in state.alias_exes() {
        encode_name(&table.exe, body.unicode, &mut bytes);
        encode_name(&[0], body.unicode, &mut bytes);
    }
    if bytes.len() > message.output_capacity() {
        body.length = bytes.len() as u32;
        store_body!(message, GetAliases, body);
        message.set_reply(Status::BufferTooSmall, 0);
        return Ok(());
    }
    let len = bytes.len();
    message.output_buffer()[..len].copy_from_slice(&bytes);
    body.length = len as u32;
    store_body!(message, GetAliases, body);
    message.set_reply(Status::Success, len as u64);
    Ok(())
}

// Command history.

fn get_history<C: DeviceComm>(state: &ServerState, message: &mut ApiMessage<'_, C>) -> Result<()> {
    let Some(mut body) = take_body!(message, HistoryInfo) else {
        return invalid(message);
    };
    body.history_buffer_size = state.history_buffer_size;
    body.number_of_history_buffers = state.number_of_history_buffers;
    body.flags = state.history_flags;
    store_body!(message, HistoryInfo, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn set_history<C: DeviceComm>(
    state: &mut ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(body) = take_body!(message, HistoryInfo) else {
        return invalid(message);
    };
    state.set_history_buffer_size(body.history_buffer_size);
    state.number_of_history_buffers = body.number_of_history_buffers;
    state.history_flags = body.flags;
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn expunge_command_history<C: DeviceComm>(
    state: &mut ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(body) = take_body!(message, ExpungeCommandHistory) else {
        return invalid(message);
    };
    let tail = message.read_input_tail()?;
    let exe = decode_name(&tail, body.unicode);
    state.history_entry(&exe).clear();
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn set_number_of_commands<C: DeviceComm>(
    state: &mut ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(body) = take_body!(message, SetNumberOfCommands) else {
        return invalid(message);
    };
    let tail = message.read_input_tail()?;
    let exe = decode_name(&tail, body.unicode);
    state
        .history_entry(&exe)
        .set_capacity(body.num_commands as usize);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn get_command_history_length<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(mut body) = take_body!(message, CommandHistoryLength) else {
        return invalid(message);
    };
    let tail = message.read_input_tail()?;
    let exe = decode_name(&tail, body.unicode);
    let unit = name_unit_size(body.unicode);
    let total: usize = state
        .history(&exe)
        .map(|history| {
            history
                .commands()
                .map(|command| (command.len() + 1) * unit)
                .sum()
        })
        .unwrap_or(0);
    body.length = total as u32;
    store_body!(message, CommandHistoryLength, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn get_command_history<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(mut body) = take_body!(message, GetCommandHistory) else {
        return invalid(message);
    };
    let tail = message.read_input_tail()?;
    let exe = decode_name(&tail, body.unicode);
    let mut bytes = Vec::new();
    if let Some(history) = state.history(&exe) {
        for command in history.commands() {
            encode_name(command, body.unicode, &mut bytes);
            encode_name(&[0], body.unicode, &mut bytes);
        }
    }
    if bytes.len() > message.output_capacity() {
        body.length = bytes.len() as u32;
        store_body!(message, GetCommandHistory, body);
        message.set_reply(Status::BufferTooSmall, 0);
        return Ok(());
    }
    let len = bytes.len();
    message.output_buffer()[..len].copy_from_slice(&bytes);
    body.length = len as u32;
    store_body!(message, GetCommandHistory, body);
    message.set_reply(Status::Success, len as u64);
    Ok(())
}
