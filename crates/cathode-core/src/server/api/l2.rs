//! Layer 2: screen-buffer inspection and mutation, scrolling, titles, and
//! record-level output I/O.

use cathode_common::traits::{DeviceComm, HostIo};
use cathode_common::types::{Cell, Coord, Rect, TextAttributes};
use cathode_common::{Result, Status};
use cathode_parser::codepage;

use super::super::dispatch::dispatch_ctrl_event;
use super::super::message::ApiMessage;
use super::super::protocol::{
    self, element_type, ApiNumber, ScreenBufferInfoMsg, CHAR_INFO_SIZE, INPUT_RECORD_SIZE,
};
use super::super::state::{ServerState, SharedScreenBuffer};
use super::{invalid, store_body, take_body};
use crate::buffer::screen::ScreenBuffer;

pub(super) fn dispatch<C: DeviceComm, H: HostIo>(
    api: ApiNumber,
    state: &mut ServerState,
    message: &mut ApiMessage<'_, C>,
    host: &mut H,
) -> Result<()> {
    match api {
        ApiNumber::FillConsoleOutput => fill_console_output(state, message),
        ApiNumber::GenerateCtrlEvent => generate_ctrl_event(state, message, host),
        ApiNumber::SetActiveScreenBuffer => set_active_screen_buffer(state, message),
        ApiNumber::FlushInputBuffer => flush_input_buffer(state, message, host),
        ApiNumber::SetCp => set_cp(state, message),
        ApiNumber::GetCursorInfo => get_cursor_info(state, message),
        ApiNumber::SetCursorInfo => set_cursor_info(state, message),
        ApiNumber::GetScreenBufferInfo => get_screen_buffer_info(state, message),
        ApiNumber::SetScreenBufferInfo => set_screen_buffer_info(state, message),
        ApiNumber::SetScreenBufferSize => set_screen_buffer_size(state, message),
        ApiNumber::SetCursorPosition => set_cursor_position(state, message),
        ApiNumber::GetLargestWindowSize => get_largest_window_size(state, message),
        ApiNumber::ScrollScreenBuffer => scroll_screen_buffer(state, message),
        ApiNumber::SetTextAttribute => set_text_attribute(state, message),
        ApiNumber::SetWindowInfo => set_window_info(state, message),
        ApiNumber::ReadConsoleOutputString => read_console_output_string(state, message),
        ApiNumber::WriteConsoleOutputString => write_console_output_string(state, message),
        ApiNumber::ReadConsoleOutput => read_console_output(state, message),
        ApiNumber::WriteConsoleOutput => write_console_output(state, message),
        ApiNumber::WriteConsoleInput => write_console_input(state, message, host),
        ApiNumber::GetTitle => get_title(state, message),
        ApiNumber::SetTitle => set_title(state, message),
        _ => {
            message.set_reply(Status::NotImplemented, 0);
            Ok(())
        }
    }
}

/// The screen buffer addressed by the packet's object handle, or an
/// `invalid_handle` reply.
fn target_buffer<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Option<SharedScreenBuffer> {
    let object = message.packet().descriptor.object;
    match state.screen_buffer_of(object) {
        Some(buffer) => Some(buffer),
        None => {
            message.set_reply(Status::InvalidHandle, 0);
            None
        }
    }
}

fn fill_console_output<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(mut body) = take_body!(message, FillConsoleOutput) else {
        return invalid(message);
    };
    let Some(buffer) = target_buffer(state, message) else {
        return Ok(());
    };
    let mut buf = buffer.borrow_mut();
    let length = body.length as usize;
    let written = match body.element_type {
        element_type::ATTRIBUTE => buf.fill_attrs(
            body.write_coord,
            TextAttributes::from_bits_retain(body.element),
            length,
        ),
        element_type::ASCII => {
            let decoded = codepage::decode_bytes(state.output_code_page(), &[body.element as u8]);
            let unit = decoded.first().copied().unwrap_or(b'?' as u16);
            buf.fill_chars(body.write_coord, unit, length)
        }
        element_type::REAL_UNICODE | element_type::FALSE_UNICODE => {
            buf.fill_chars(body.write_coord, body.element, length)
        }
        _ => {
            drop(buf);
            message.set_reply(Status::InvalidParameter, 0);
            return Ok(());
        }
    };
    drop(buf);
    body.length = written as u32;
    store_body!(message, FillConsoleOutput, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn generate_ctrl_event<C: DeviceComm, H: HostIo>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
    host: &mut H,
) -> Result<()> {
    let Some(body) = take_body!(message, CtrlEvent) else {
        return invalid(message);
    };
    dispatch_ctrl_event(state, host, body.ctrl_event, body.process_group_id)?;
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn set_active_screen_buffer<C: DeviceComm>(
    state: &mut ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(buffer) = target_buffer(state, message) else {
        return Ok(());
    };
    state.set_active_screen_buffer(buffer);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn flush_input_buffer<C: DeviceComm, H: HostIo>(
    state: &mut ServerState,
    message: &mut ApiMessage<'_, C>,
    host: &mut H,
) -> Result<()> {
    let object = message.packet().descriptor.object;
    let Some(handle) = state.handle_mut(object) else {
        message.set_reply(Status::InvalidHandle, 0);
        return Ok(());
    };
    handle.reset_input_state();
    host.flush_input_buffer()?;
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn set_cp<C: DeviceComm>(state: &mut ServerState, message: &mut ApiMessage<'_, C>) -> Result<()> {
    let Some(body) = take_body!(message, SetCp) else {
        return invalid(message);
    };
    state.set_code_page(body.output, body.code_page);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn get_cursor_info<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(mut body) = take_body!(message, CursorInfo) else {
        return invalid(message);
    };
    let Some(buffer) = target_buffer(state, message) else {
        return Ok(());
    };
    let buf = buffer.borrow();
    body.cursor_size = buf.cursor_size();
    body.visible = buf.cursor_visible();
    drop(buf);
    store_body!(message, CursorInfo, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn set_cursor_info<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(body) = take_body!(message, CursorInfo) else {
        return invalid(message);
    };
    let Some(buffer) = target_buffer(state, message) else {
        return Ok(());
    };
    let ok = buffer.borrow_mut().set_cursor_info(body.cursor_size, body.visible);
    let status = if ok {
        Status::Success
    } else {
        Status::InvalidParameter
    };
    message.set_reply(status, 0);
    Ok(())
}

fn info_from_buffer(buf: &ScreenBuffer) -> ScreenBufferInfoMsg {
    let viewport = buf.viewport();
    ScreenBufferInfoMsg {
        size: buf.size(),
        cursor_position: buf.cursor(),
        scroll_position: Coord::new(viewport.left, viewport.top),
        attributes: buf.text_attrs().bits(),
        current_window_size: Coord::new(viewport.width() - 1, viewport.height() - 1),
        maximum_window_size: buf.max_window(),
        popup_attributes: buf.popup_attrs(),
        fullscreen_supported: false,
        color_table: *buf.palette(),
    }
}

fn get_screen_buffer_info<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(_) = take_body!(message, ScreenBufferInfo) else {
        return invalid(message);
    };
    let Some(buffer) = target_buffer(state, message) else {
        return Ok(());
    };
    let body = info_from_buffer(&buffer.borrow());
    store_body!(message, ScreenBufferInfo, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn set_screen_buffer_info<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(body) = take_body!(message, ScreenBufferInfo) else {
        return invalid(message);
    };
    let Some(buffer) = target_buffer(state, message) else {
        return Ok(());
    };
    let mut buf = buffer.borrow_mut();
    if !buf.set_size(body.size) {
        drop(buf);
        message.set_reply(Status::NoMemory, 0);
        return Ok(());
    }
    let viewport = Rect::new(
        body.scroll_position.x,
        body.scroll_position.y,
        body.scroll_position.x + body.current_window_size.x,
        body.scroll_position.y + body.current_window_size.y,
    );
    if !buf.set_viewport(viewport) {
        drop(buf);
        message.set_reply(Status::InvalidParameter, 0);
        return Ok(());
    }
    buf.set_text_attrs(TextAttributes::from_bits_retain(body.attributes));
    buf.set_popup_attrs(body.popup_attributes);
    buf.set_palette(body.color_table);
    if !buf.set_cursor_position(body.cursor_position) {
        drop(buf);
        message.set_reply(Status::InvalidParameter, 0);
        return Ok(());
    }
    drop(buf);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn set_screen_buffer_size<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(body) = take_body!(message, SetScreenBufferSize) else {
        return invalid(message);
    };
    let Some(buffer) = target_buffer(state, message) else {
        return Ok(());
    };
    if body.size.x <= 0 || body.size.y <= 0 {
        message.set_reply(Status::InvalidParameter, 0);
        return Ok(());
    }
    let ok = buffer.borrow_mut().set_size(body.size);
    let status = if ok { Status::Success } else { Status::NoMemory };
    message.set_reply(status, 0);
    Ok(())
}

fn set_cursor_position<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(body) = take_body!(message, SetCursorPosition) else {
        return invalid(message);
    };
    let Some(buffer) = target_buffer(state, message) else {
        return Ok(());
    };
    let mut buf = buffer.borrow_mut();
    if !buf.set_cursor_position(body.cursor_position) {
        drop(buf);
        message.set_reply(Status::InvalidParameter, 0);
        return Ok(());
    }
    buf.snap_window_to_cursor();
    drop(buf);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn get_largest_window_size<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(mut body) = take_body!(message, GetLargestWindowSize) else {
        return invalid(message);
    };
    let Some(buffer) = target_buffer(state, message) else {
        return Ok(());
    };
    body.size = buffer.borrow().max_window();
    store_body!(message, GetLargestWindowSize, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn scroll_screen_buffer<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(body) = take_body!(message, ScrollScreenBuffer) else {
        return invalid(message);
    };
    let Some(buffer) = target_buffer(state, message) else {
        return Ok(());
    };
    let fill_char = if body.unicode {
        body.fill_char
    } else {
        codepage::decode_bytes(state.output_code_page(), &[body.fill_char as u8])
            .first()
            .copied()
            .unwrap_or(b'?' as u16)
    };
    let fill = Cell::new(fill_char, TextAttributes::from_bits_retain(body.fill_attrs));
    let clip = body.clip.then_some(body.clip_rectangle);
    let ok = buffer.borrow_mut().scroll(
        body.scroll_rectangle,
        clip,
        body.destination_origin,
        fill,
    );
    let status = if ok { Status::Success } else { Status::NoMemory };
    message.set_reply(status, 0);
    Ok(())
}

fn set_text_attribute<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(body) = take_body!(message, SetTextAttribute) else {
        return invalid(message);
    };
    let Some(buffer) = target_buffer(state, message) else {
        return Ok(());
    };
    buffer
        .borrow_mut()
        .set_text_attrs(TextAttributes::from_bits_retain(body.attributes));
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn set_window_info<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(body) = take_body!(message, SetWindowInfo) else {
        return invalid(message);
    };
    let Some(buffer) = target_buffer(state, message) else {
        return Ok(());
    };
    let mut buf = buffer.borrow_mut();
    let target = if body.absolute {
        body.window
    } else {
        let current = buf.viewport();
        Rect::new(
            current.left + body.window.left,
            current.top + body.window.top,
            current.right + body.window.right,
            current.bottom + body.window.bottom,
        )
    };
    let ok = buf.set_viewport(target);
    drop(buf);
    let status = if ok {
        Status::Success
    } else {
        Status::InvalidParameter
    };
    message.set_reply(status, 0);
    Ok(())
}

fn read_console_output_string<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(mut body) = take_body!(message, OutputString) else {
        return invalid(message);
    };
    let Some(buffer) = target_buffer(state, message) else {
        return Ok(());
    };
    let capacity = message.output_capacity();
    let buf = buffer.borrow();

    let (bytes, count) = match body.string_type {
        element_type::ATTRIBUTE => {
            let mut words = vec![0u16; capacity / 2];
            let count = buf.read_attrs(body.coord, &mut words);
            (words_to_bytes(&words[..count]), count)
        }
        element_type::REAL_UNICODE | element_type::FALSE_UNICODE => {
            let mut words = vec![0u16; capacity / 2];
            let count = buf.read_chars(body.coord, &mut words);
            (words_to_bytes(&words[..count]), count)
        }
        element_type::ASCII => {
            let mut words = vec![0u16; capacity];
            let count = buf.read_chars(body.coord, &mut words);
            let mut out = Vec::with_capacity(count);
            for &word in &words[..count] {
                let mut encoded = Vec::new();
                codepage::encode_units(state.output_code_page(), &[word], &mut encoded);
                out.push(encoded.first().copied().unwrap_or(b'?'));
            }
            (out, count)
        }
        _ => {
            drop(buf);
            message.set_reply(Status::InvalidParameter, 0);
            return Ok(());
        }
    };
    drop(buf);

    let len = bytes.len();
    message.output_buffer()[..len].copy_from_slice(&bytes);
    body.num_records = count as u32;
    store_body!(message, OutputString, body);
    message.set_reply(Status::Success, len as u64);
    Ok(())
}

fn write_console_output_string<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(mut body) = take_body!(message, OutputString) else {
        return invalid(message);
    };
    let Some(buffer) = target_buffer(state, message) else {
        return Ok(());
    };
    let data = message.read_input_tail()?;
    let mut buf = buffer.borrow_mut();

    let count = match body.string_type {
        element_type::ATTRIBUTE => {
            if data.len() % 2 != 0 {
                drop(buf);
                message.set_reply(Status::InvalidParameter, 0);
                return Ok(());
            }
            buf.write_attrs(body.coord, &bytes_to_words(&data))
        }
        element_type::REAL_UNICODE | element_type::FALSE_UNICODE => {
            if data.len() % 2 != 0 {
                drop(buf);
                message.set_reply(Status::InvalidParameter, 0);
                return Ok(());
            }
            buf.write_chars(body.coord, &bytes_to_words(&data))
        }
        element_type::ASCII => {
            let units = codepage::decode_bytes(state.output_code_page(), &data);
            buf.write_chars(body.coord, &units)
        }
        _ => {
            drop(buf);
            message.set_reply(Status::InvalidParameter, 0);
            return Ok(());
        }
    };
    drop(buf);

    body.num_records = count as u32;
    store_body!(message, OutputString, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn read_console_output<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(mut body) = take_body!(message, OutputRect) else {
        return invalid(message);
    };
    let Some(buffer) = target_buffer(state, message) else {
        return Ok(());
    };
    let (region, cells) = buffer.borrow().read_rect(body.char_region);
    if region.is_empty() {
        message.set_reply(Status::InvalidParameter, 0);
        return Ok(());
    }
    let required = cells.len() * CHAR_INFO_SIZE;
    if message.output_capacity() < required {
        message.set_reply(Status::BufferTooSmall, 0);
        return Ok(());
    }
    let mut bytes = Vec::with_capacity(required);
    for cell in &cells {
        protocol::encode_char_info(cell.ch, cell.attrs.bits(), &mut bytes);
    }
    message.output_buffer()[..required].copy_from_slice(&bytes);
    body.char_region = region;
    store_body!(message, OutputRect, body);
    message.set_reply(Status::Success, required as u64);
    Ok(())
}

fn write_console_output<C: DeviceComm>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
) -> Result<()> {
    let Some(mut body) = take_body!(message, OutputRect) else {
        return invalid(message);
    };
    let Some(buffer) = target_buffer(state, message) else {
        return Ok(());
    };
    let data = message.read_input_tail()?;
    if data.len() % CHAR_INFO_SIZE != 0 {
        message.set_reply(Status::InvalidParameter, 0);
        return Ok(());
    }
    let region = body.char_region;
    if region.is_empty() {
        message.set_reply(Status::InvalidParameter, 0);
        return Ok(());
    }
    let expected = region.width() as usize * region.height() as usize;
    if data.len() / CHAR_INFO_SIZE < expected {
        message.set_reply(Status::InvalidParameter, 0);
        return Ok(());
    }
    let mut cells = Vec::with_capacity(expected);
    for chunk in data.chunks_exact(CHAR_INFO_SIZE).take(expected) {
        if let Some((ch, attrs)) = protocol::decode_char_info(chunk) {
            cells.push(Cell::new(ch, TextAttributes::from_bits_retain(attrs)));
        }
    }
    let written = buffer.borrow_mut().write_rect(region, &cells);
    body.char_region = region.intersect(&buffer.borrow().bounds());
    store_body!(message, OutputRect, body);
    message.set_reply(Status::Success, (written * CHAR_INFO_SIZE) as u64);
    Ok(())
}

fn write_console_input<C: DeviceComm, H: HostIo>(
    state: &ServerState,
    message: &mut ApiMessage<'_, C>,
    host: &mut H,
) -> Result<()> {
    let Some(mut body) = take_body!(message, WriteConsoleInput) else {
        return invalid(message);
    };
    let object = message.packet().descriptor.object;
    if state.handle(object).is_none() {
        message.set_reply(Status::InvalidHandle, 0);
        return Ok(());
    }
    let data = message.read_input_tail()?;
    if data.len() % INPUT_RECORD_SIZE != 0 {
        message.set_reply(Status::InvalidParameter, 0);
        return Ok(());
    }
    let mut written = 0u32;
    let mut bytes = Vec::new();
    for chunk in data.chunks_exact(INPUT_RECORD_SIZE) {
        let Some(record) = protocol::decode_input_record(chunk) else {
            break;
        };
        written += 1;
        let Some(record) = record else {
            continue;
        };
        if record.key_down && record.unicode_char != 0 {
            for _ in 0..record.repeat_count.max(1) {
                codepage::encode_units(
                    state.input_code_page(),
                    &[record.unicode_char],
                    &mut bytes,
                );
            }
        }
    }
    if !bytes.is_empty() && !host.inject_input_bytes(&bytes) {
        message.set_reply(Status::NoMemory, 0);
        return Ok(());
    }
    body.num_records = written;
    store_body!(message, WriteConsoleInput, body);
    message.set_reply(Status::Success, u64::from(written) * INPUT_RECORD_SIZE as u64);
    Ok(())
}

fn get_title<C: DeviceComm>(state: &ServerState, message: &mut ApiMessage<'_, C>) -> Result<()> {
    let Some(mut body) = take_body!(message, Title) else {
        return invalid(message);
    };
    let title = if body.original {
        &state.original_title
    } else {
        &state.title
    };
    let capacity = message.output_capacity();

    if body.unicode {
        if capacity < 2 {
            body.title_length = 0;
            store_body!(message, Title, body);
            message.set_reply(Status::BufferTooSmall, 0);
            return Ok(());
        }
        let max_units = (capacity / 2).saturating_sub(1);
        let take = title.len().min(max_units);
        let mut bytes = Vec::with_capacity((take + 1) * 2);
        for unit in &title[..take] {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        bytes.extend_from_slice(&0u16.to_le_bytes());
        let len = bytes.len();
        message.output_buffer()[..len].copy_from_slice(&bytes);
        body.title_length = take as u32;
        store_body!(message, Title, body);
        message.set_reply(Status::Success, len as u64);
    } else {
        // ANSI reads are all or nothing: a too-small buffer gets a single
        // NUL, with information 1 when there was a title to report.
        let mut encoded = Vec::new();
        codepage::encode_units(state.output_code_page(), title, &mut encoded);
        if capacity < encoded.len() + 1 {
            if capacity >= 1 {
                message.output_buffer()[0] = 0;
            }
            body.title_length = 0;
            store_body!(message, Title, body);
            let information = u64::from(!title.is_empty());
            message.set_reply(Status::Success, information);
        } else {
            encoded.push(0);
            let len = encoded.len();
            message.output_buffer()[..len].copy_from_slice(&encoded);
            body.title_length = (len - 1) as u32;
            store_body!(message, Title, body);
            message.set_reply(Status::Success, len as u64);
        }
    }
    Ok(())
}

fn set_title<C: DeviceComm>(state: &mut ServerState, message: &mut ApiMessage<'_, C>) -> Result<()> {
    let Some(mut body) = take_body!(message, Title) else {
        return invalid(message);
    };
    let data = message.read_input_tail()?;
    if data.len() > usize::from(u16::MAX) {
        message.set_reply(Status::InvalidParameter, 0);
        return Ok(());
    }
    let units: Vec<u16> = if body.unicode {
        if data.len() % 2 != 0 {
            message.set_reply(Status::InvalidParameter, 0);
            return Ok(());
        }
        bytes_to_words(&data)
    } else {
        codepage::decode_bytes(state.output_code_page(), &data)
    };
    body.title_length = units.len() as u32;
    state.title = units;
    store_body!(message, Title, body);
    message.set_reply(Status::Success, 0);
    Ok(())
}

fn words_to_bytes(words: &[u16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(words.len() * 2);
    for word in words {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes
}

fn bytes_to_words(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
