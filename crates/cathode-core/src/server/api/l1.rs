//! Layer 1: modes, code pages, and the byte/character/record read-write
//! paths, including everything that can reply-pend.

use cathode_common::modes::{InputMode, OutputMode};
use cathode_common::traits::{DeviceComm, HostIo};
use cathode_common::{Result, Status};
use cathode_parser::codepage;
use cathode_parser::decode_token;
use cathode_parser::token::InputToken;
use tracing::debug;

use super::super::dispatch::{
    dispatch_ctrl_event, gather_consume, gather_peek, DispatchOutcome, GATHER_LIMIT, PEEK_LIMIT,
};
use super::super::message::ApiMessage;
use super::super::protocol::{
    self, input_flags, ApiNumber, CTRL_BREAK_EVENT, CTRL_C_EVENT, INPUT_RECORD_SIZE,
};
use super::super::state::{HandleKind, ObjectHandle, ServerState};
use super::{invalid, store_body, take_body};
use crate::input::cooked::{CookedEvent, CookedLineState, CookedSession};
use crate::input::read;
use crate::output::{apply_text, OutputSinks};

pub(super) fn dispatch<C: DeviceComm, H: HostIo>(
    api: ApiNumber,
    state: &mut ServerState,
    message: &mut ApiMessage<'_, C>,
    host: &mut H,
    outcome: &mut DispatchOutcome,
) -> Result<()> {
    match api {
        ApiNumber::GetCp => get_cp(state, message),
        ApiNumber::GetMode => get_mode(state, message),
        ApiNumber::SetMode => set_mode(state, message),
        ApiNumber::GetNumberOfInputEvents => get_number_of_input_events(state, message, host),
        ApiNumber::GetConsoleInput => get_console_input(state, message, host, outcome),
        ApiNumber::ReadConsole => read_console(state, message, host, outcome),
        ApiNumber::WriteConsole => write_console(state, message, host),
        ApiNumber::GetLangId => get_lang_id(message),
        ApiNumber::NotifyLastClose => {
            message.set_reply(Status::Success, 0);
            Ok(())
        }
        _ => {
            message.set_reply(Status::NotImplemented, 0);
            Ok(())
        }
    }
}

fn get_cp<C: DeviceComm>(state: &ServerState, message: &mut ApiMessage<'_, C>) -> Result<()> {
    let Some(mut body) = take_body!(message, GetCp) else {
        return invalid(message);
    };
    let raw = if body.output {
        state.output_code_page()
    } else {
        state.input_code_page()
    };
    body.code_page = codepage::resolve(raw);
    store_body!(message, GetCp, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn get_mode<C: DeviceComm>(state: &ServerState, message: &mut ApiMessage<'_, C>) -> Result<()> {
    let Some(mut body) = take_body!(message, Mode) else {
        return invalid(message);
    };
    let object = message.packet().descriptor.object;
    let Some(handle) = state.handle(object) else {
        message.set_reply(Status::InvalidHandle, 0);
        return Ok(());
    };
    body.mode = match handle.kind {
        HandleKind::Input => state.input_mode_raw,
        HandleKind::Output => state.output_mode_raw,
    };
    store_body!(message, Mode, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn set_mode<C: DeviceComm>(state: &mut ServerState, message: &mut ApiMessage<'_, C>) -> Result<()> {
    let Some(body) = take_body!(message, Mode) else {
        return invalid(message);
    };
    let object = message.packet().descriptor.object;
    let Some(handle) = state.handle(object) else {
        message.set_reply(Status::InvalidHandle, 0);
        return Ok(());
    };
    match handle.kind {
        HandleKind::Input => {
            // Byte-compat with the inbox host: the value is stored even
            // when unknown bits make the reply an error.
            state.input_mode_raw = body.mode;
            let status = if body.mode & !InputMode::all().bits() != 0 {
                Status::InvalidParameter
            } else {
                Status::Success
            };
            message.set_reply(status, 0);
        }
        HandleKind::Output => {
            if body.mode & !OutputMode::all().bits() != 0 {
                message.set_reply(Status::InvalidParameter, 0);
            } else {
                state.output_mode_raw = body.mode;
                message.set_reply(Status::Success, 0);
            }
        }
    }
    Ok(())
}

fn get_lang_id<C: DeviceComm>(message: &mut ApiMessage<'_, C>) -> Result<()> {
    let Some(mut body) = take_body!(message, GetLangId) else {
        return invalid(message);
    };
    body.lang_id = 0x0409;
    store_body!(message, GetLangId, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn get_number_of_input_events<C: DeviceComm, H: HostIo>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
    host: &mut H,
) -> Result<()> {
    let Some(mut body) = take_body!(message, GetNumberOfInputEvents) else {
        return invalid(message);
    };
    let object = message.packet().descriptor.object;
    let Some(handle) = state.handle(object) else {
        message.set_reply(Status::InvalidHandle, 0);
        return Ok(());
    };
    if handle.kind != HandleKind::Input {
        message.set_reply(Status::InvalidHandle, 0);
        return Ok(());
    }
    let bytes = gather_peek(&handle.pending_input_bytes, host, PEEK_LIMIT)?;
    let processed = state.input_mode().contains(InputMode::PROCESSED_INPUT);
    let mut count = read::count_events(state.input_code_page(), processed, &bytes);
    if handle.decoded_input_pending.is_some() {
        count = count.saturating_add(1);
    }
    body.ready_events = count;
    store_body!(message, GetNumberOfInputEvents, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn get_console_input<C: DeviceComm, H: HostIo>(
    state: &mut ServerState,
    message: &mut ApiMessage<'_, C>,
    host: &mut H,
    outcome: &mut DispatchOutcome,
) -> Result<()> {
    let Some(mut body) = take_body!(message, GetInput) else {
        return invalid(message);
    };
    let object = message.packet().descriptor.object;
    let peek = body.flags & input_flags::NO_REMOVE != 0;
    let no_wait = body.flags & input_flags::NO_WAIT != 0;
    let capacity = (message.output_capacity() / INPUT_RECORD_SIZE).min(body.num_records as usize);
    let processed = state.input_mode().contains(InputMode::PROCESSED_INPUT);
    let code_page = state.input_code_page();

    let Some(handle) = state.handle_mut(object) else {
        message.set_reply(Status::InvalidHandle, 0);
        return Ok(());
    };
    if handle.kind != HandleKind::Input {
        message.set_reply(Status::InvalidHandle, 0);
        return Ok(());
    }

    let mut records = Vec::new();
    if let Some(unit) = handle.decoded_input_pending {
        if capacity > 0 {
            records.push(read::unit_record(unit));
            if !peek {
                handle.decoded_input_pending = None;
            }
        }
    }

    let bytes = if peek {
        gather_peek(&handle.pending_input_bytes, host, GATHER_LIMIT)?
    } else {
        gather_consume(&mut handle.pending_input_bytes, host, GATHER_LIMIT)?
    };
    let (result, consumed) = read::read_records(
        code_page,
        processed,
        &bytes,
        capacity.saturating_sub(records.len()),
    );
    if !peek {
        handle.pending_input_bytes.replace_with(&bytes[consumed..]);
        if let Some(low) = result.stash {
            handle.decoded_input_pending = Some(low);
        }
    }
    records.extend(result.records);

    if result.saw_ctrl_c && !peek {
        dispatch_ctrl_event(state, host, CTRL_C_EVENT, 0)?;
    }

    if records.is_empty() {
        if no_wait || host.input_disconnected() {
            body.num_records = 0;
            store_body!(message, GetInput, body);
            message.set_reply(Status::Success, 0);
        } else {
            outcome.reply_pending = true;
        }
        return Ok(());
    }

    let mut encoded = Vec::with_capacity(records.len() * INPUT_RECORD_SIZE);
    for record in &records {
        protocol::encode_input_record(record, &mut encoded);
    }
    let len = encoded.len();
    message.output_buffer()[..len].copy_from_slice(&encoded);
    body.num_records = records.len() as u32;
    store_body!(message, GetInput, body);
    message.set_reply(Status::Success, len as u64);
    Ok(())
}

fn write_console<C: DeviceComm, H: HostIo>(
    state: &mut ServerState,
    message: &mut ApiMessage<'_, C>,
    host: &mut H,
) -> Result<()> {
    let Some(mut body) = take_body!(message, WriteConsole) else {
        return invalid(message);
    };
    let object = message.packet().descriptor.object;
    let Some(buffer) = state.screen_buffer_of(object) else {
        message.set_reply(Status::InvalidHandle, 0);
        return Ok(());
    };

    let data = message.read_input_tail()?;
    if body.unicode && data.len() % 2 != 0 {
        message.set_reply(Status::InvalidParameter, 0);
        return Ok(());
    }
    let units: Vec<u16> = if body.unicode {
        data.chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    } else {
        codepage::decode_bytes(state.output_code_page(), &data)
    };

    let mode = state.output_mode();
    {
        let mut buf = buffer.borrow_mut();
        let mut sinks = OutputSinks {
            host: Some(host),
            title: Some(&mut state.title),
        };
        apply_text(&mut buf, &units, mode, &mut sinks);
    }

    body.num_bytes = data.len() as u32;
    store_body!(message, WriteConsole, body);
    message.set_reply(Status::Success, data.len() as u64);
    Ok(())
}

fn consume_following_lf<H: HostIo>(handle: &mut ObjectHandle, host: &mut H) -> Result<()> {
    if handle.pending_input_bytes.bytes().first() == Some(&0x0A) {
        handle.pending_input_bytes.consume_prefix(1);
        return Ok(());
    }
    if handle.pending_input_bytes.is_empty() {
        let mut peeked = [0u8; 1];
        if host.peek_input_bytes(&mut peeked)? == 1 && peeked[0] == 0x0A {
            let mut consumed = [0u8; 1];
            host.read_input_bytes(&mut consumed)?;
        }
    }
    Ok(())
}

/// The exe name rides at the front of the ReadConsole input tail.
fn parse_exe_name(tail: &[u8], byte_length: usize, unicode: bool) -> Vec<u16> {
    let byte_length = byte_length.min(tail.len());
    let name = &tail[..byte_length];
    if unicode {
        name.chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    } else {
        codepage::decode_bytes(0, name)
    }
}

/// Copy as much of a completed line as fits the caller's buffer. ANSI
/// transcoding is all-or-nothing per character; when not even one encoded
/// character fits, nothing is consumed.
fn deliver_ready(
    cooked: &mut CookedLineState,
    unicode: bool,
    code_page: u32,
    capacity: usize,
) -> std::result::Result<Vec<u8>, Status> {
    if unicode {
        let take = (capacity / 2).min(cooked.ready.len());
        if take == 0 {
            return Err(Status::BufferTooSmall);
        }
        let mut bytes = Vec::with_capacity(take * 2);
        for unit in cooked.ready.drain(..take) {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        Ok(bytes)
    } else {
        let mut bytes = Vec::new();
        let mut index = 0;
        while index < cooked.ready.len() {
            let next = cathode_common::types::next_char_index(&cooked.ready, index);
            let mut encoded = Vec::new();
            codepage::encode_units(code_page, &cooked.ready[index..next], &mut encoded);
            if bytes.len() + encoded.len() > capacity {
                break;
            }
            bytes.extend_from_slice(&encoded);
            index = next;
        }
        if bytes.is_empty() {
            return Err(Status::BufferTooSmall);
        }
        cooked.ready.drain(..index);
        Ok(bytes)
    }
}

fn reply_with_ready<C: DeviceComm>(
    message: &mut ApiMessage<'_, C>,
    mut body: protocol::ReadConsoleMsg,
    cooked: &mut CookedLineState,
    code_page: u32,
) -> Result<()> {
    let capacity = message.output_capacity();
    match deliver_ready(cooked, body.unicode, code_page, capacity) {
        Ok(bytes) => {
            let len = bytes.len();
            message.output_buffer()[..len].copy_from_slice(&bytes);
            body.num_bytes = len as u32;
            store_body!(message, ReadConsole, body);
            message.set_reply(Status::Success, len as u64);
        }
        Err(status) => {
            store_body!(message, ReadConsole, body);
            message.set_reply(status, 0);
        }
    }
    Ok(())
}

fn read_console<C: DeviceComm, H: HostIo>(
    state: &mut ServerState,
    message: &mut ApiMessage<'_, C>,
    host: &mut H,
    outcome: &mut DispatchOutcome,
) -> Result<()> {
    let Some(body) = take_body!(message, ReadConsole) else {
        return invalid(message);
    };
    let object = message.packet().descriptor.object;
    let tail = message.read_input_tail()?;
    let mut exe = parse_exe_name(&tail, body.exe_name_length as usize, body.unicode);

    let Some(mut handle) = state.take_handle(object) else {
        message.set_reply(Status::InvalidHandle, 0);
        return Ok(());
    };
    if handle.kind != HandleKind::Input {
        state.put_handle(object, handle);
        message.set_reply(Status::InvalidHandle, 0);
        return Ok(());
    }
    if exe.is_empty() {
        if let Some(process) = state.process(handle.owning_process) {
            exe = process.exe_name.encode_utf16().collect();
        }
    }

    // Leftovers of an earlier completed line go out before new decoding.
    if !handle.cooked.ready.is_empty() {
        let result = reply_with_ready(message, body, &mut handle.cooked, state.input_code_page());
        state.put_handle(object, handle);
        return result;
    }

    let result = if state.input_mode().contains(InputMode::LINE_INPUT) {
        cooked_read(state, message, host, outcome, &mut handle, body, &exe)
    } else {
        raw_character_read(state, message, host, outcome, &mut handle, body)
    };
    state.put_handle(object, handle);
    result
}

fn cooked_read<C: DeviceComm, H: HostIo>(
    state: &mut ServerState,
    message: &mut ApiMessage<'_, C>,
    host: &mut H,
    outcome: &mut DispatchOutcome,
    handle: &mut ObjectHandle,
    body: protocol::ReadConsoleMsg,
    exe: &[u16],
) -> Result<()> {
    let code_page = state.input_code_page();
    let active = state.active_screen_buffer();

    // Bytes are pulled one pending-buffer-sized chunk at a time so any
    // undecoded tail always fits back into the handle.
    let mut event = None;
    loop {
        let bytes = gather_consume(&mut handle.pending_input_bytes, host, GATHER_LIMIT)?;
        if bytes.is_empty() {
            break;
        }
        let mut position = 0;
        {
            let mut session = CookedSession {
                state: &mut handle.cooked,
                input_mode: state.input_mode(),
                output_mode: state.output_mode(),
                output_code_page: state.output_code_page(),
                process_control_z: body.process_control_z,
                screen: active.as_deref(),
                host: &mut *host,
            };
            while position < bytes.len() {
                let fired = match decode_token(code_page, &bytes[position..]) {
                    InputToken::Text { units, consumed } => {
                        position += consumed;
                        session.handle_text(units.as_slice())
                    }
                    InputToken::Key { record, consumed } => {
                        position += consumed;
                        session.handle_key(record)
                    }
                    InputToken::Ignored { consumed } => {
                        position += consumed;
                        None
                    }
                    InputToken::NeedMoreData => break,
                };
                if fired.is_some() {
                    event = fired;
                    break;
                }
            }
        }
        handle.pending_input_bytes.replace_with(&bytes[position..]);
        if event.is_some() || position == 0 || host.input_bytes_available() == 0 {
            break;
        }
    }

    // A CR terminator swallows an immediately following LF.
    if matches!(
        &event,
        Some(CookedEvent::LineComplete {
            terminated_by_cr: true,
            ..
        })
    ) {
        consume_following_lf(handle, host)?;
    }

    match event {
        Some(CookedEvent::LineComplete { history_line, .. }) => {
            debug!(len = history_line.len(), "cooked line completed");
            state.append_history(exe, history_line);
            reply_with_ready(message, body, &mut handle.cooked, state.input_code_page())
        }
        Some(CookedEvent::CtrlC) => {
            handle.cooked.line.clear();
            handle.cooked.cursor = 0;
            dispatch_ctrl_event(state, host, CTRL_C_EVENT, 0)?;
            message.set_reply(Status::Alerted, 0);
            Ok(())
        }
        Some(CookedEvent::CtrlBreak) => {
            host.flush_input_buffer()?;
            handle.reset_input_state();
            state.reset_all_input_state();
            dispatch_ctrl_event(state, host, CTRL_BREAK_EVENT, 0)?;
            message.set_reply(Status::Alerted, 0);
            Ok(())
        }
        Some(CookedEvent::EndOfFile) => {
            message.set_reply(Status::Success, 0);
            Ok(())
        }
        None => {
            if host.input_disconnected() {
                message.set_reply(Status::Success, 0);
            } else {
                outcome.reply_pending = true;
            }
            Ok(())
        }
    }
}

fn raw_character_read<C: DeviceComm, H: HostIo>(
    state: &mut ServerState,
    message: &mut ApiMessage<'_, C>,
    host: &mut H,
    outcome: &mut DispatchOutcome,
    handle: &mut ObjectHandle,
    mut body: protocol::ReadConsoleMsg,
) -> Result<()> {
    let capacity = message.output_capacity();
    let processed = state.input_mode().contains(InputMode::PROCESSED_INPUT);
    let code_page = state.input_code_page();

    // A held-back low surrogate goes out before anything else.
    if let Some(unit) = handle.decoded_input_pending.take() {
        let mut bytes = Vec::new();
        if body.unicode {
            bytes.extend_from_slice(&unit.to_le_bytes());
        } else {
            codepage::encode_units(code_page, &[unit], &mut bytes);
        }
        if bytes.len() > capacity {
            handle.decoded_input_pending = Some(unit);
            store_body!(message, ReadConsole, body);
            message.set_reply(Status::BufferTooSmall, 0);
            return Ok(());
        }
        let len = bytes.len();
        message.output_buffer()[..len].copy_from_slice(&bytes);
        body.num_bytes = len as u32;
        store_body!(message, ReadConsole, body);
        message.set_reply(Status::Success, len as u64);
        return Ok(());
    }

    let bytes = gather_consume(&mut handle.pending_input_bytes, host, GATHER_LIMIT)?;
    let (data, saw_ctrl_c, eof, consumed, stash) = if body.unicode {
        let (result, consumed) = read::read_units(
            code_page,
            processed,
            body.process_control_z,
            &bytes,
            capacity / 2,
        );
        let mut out = Vec::with_capacity(result.units.len() * 2);
        for unit in &result.units {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        (out, result.saw_ctrl_c, result.eof, consumed, result.stash)
    } else {
        let (result, consumed) = read::read_bytes(
            code_page,
            processed,
            body.process_control_z,
            &bytes,
            capacity,
        );
        (result.data, result.saw_ctrl_c, result.eof, consumed, None)
    };
    handle.pending_input_bytes.replace_with(&bytes[consumed..]);
    handle.decoded_input_pending = stash;

    if saw_ctrl_c {
        dispatch_ctrl_event(state, host, CTRL_C_EVENT, 0)?;
        if data.is_empty() {
            message.set_reply(Status::Alerted, 0);
            return Ok(());
        }
    }
    if eof {
        body.num_bytes = 0;
        store_body!(message, ReadConsole, body);
        message.set_reply(Status::Success, 0);
        return Ok(());
    }
    if data.is_empty() {
        if host.input_disconnected() {
            message.set_reply(Status::Success, 0);
        } else {
            outcome.reply_pending = true;
        }
        return Ok(());
    }

    let len = data.len();
    message.output_buffer()[..len].copy_from_slice(&data);
    body.num_bytes = len as u32;
    store_body!(message, ReadConsole, body);
    message.set_reply(Status::Success, len as u64);
    Ok(())
}
