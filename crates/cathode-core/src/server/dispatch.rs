use cathode_common::traits::{DeviceComm, HostIo};
use cathode_common::{Result, Status};
use cathode_parser::codepage;
use tracing::{debug, warn};

use super::api;
use super::message::ApiMessage;
use super::protocol::{ConnectionInformation, IoFunction, Payload, CTRL_C_EVENT};
use super::state::{HandleKind, ServerState};
use crate::input::pending::PendingBytes;
use crate::input::read;
use crate::output::{apply_text, OutputSinks};

/// Most bytes one gather pulls from the host stream: never more than the
/// pending buffer can re-park, so an undecoded tail is never dropped.
pub(crate) const GATHER_LIMIT: usize = crate::input::pending::PENDING_CAPACITY;
/// Bounded prefix inspected by event counting.
pub(crate) const PEEK_LIMIT: usize = 64 * 1024;

/// What the caller must do with the packet after a dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// The last client disconnected; the server can shut down.
    pub request_exit: bool,
    /// The request could not make progress; retain the packet and retry it
    /// when the input state changes.
    pub reply_pending: bool,
}

/// Decode one request, mutate server state, and push the completion back
/// through the transport. Client-visible failures become statuses; only
/// transport errors surface as `Err`.
pub fn dispatch_message<C: DeviceComm, H: HostIo>(
    state: &mut ServerState,
    message: &mut ApiMessage<'_, C>,
    host: &mut H,
) -> Result<DispatchOutcome> {
    let mut outcome = DispatchOutcome::default();
    log_function(
        message.packet().descriptor.function,
        message.packet().descriptor.identifier,
    );
    match message.packet().descriptor.function {
        IoFunction::Connect => connect(state, message)?,
        IoFunction::Disconnect => disconnect(state, message, &mut outcome),
        IoFunction::CreateObject => create_object(state, message),
        IoFunction::CloseObject => close_object(state, message),
        IoFunction::RawFlush => raw_flush(state, message, host)?,
        IoFunction::RawWrite => raw_write(state, message, host)?,
        IoFunction::RawRead => raw_read(state, message, host, &mut outcome)?,
        IoFunction::UserDefined => api::dispatch(state, message, host, &mut outcome)?,
    }
    message.complete(outcome.reply_pending)?;
    Ok(outcome)
}

fn connect<C: DeviceComm>(state: &mut ServerState, message: &mut ApiMessage<'_, C>) -> Result<()> {
    let pid = message.packet().descriptor.process as u32;
    let tid = message.packet().descriptor.object as u32;

    let exe_name = if message.input_tail_len() > 0 {
        let bytes = message.read_input_tail()?;
        parse_connect_application_name(&bytes)
    } else {
        None
    };

    match state.connect(pid, tid, exe_name) {
        Some((process, input, output)) => {
            let info = ConnectionInformation {
                process,
                input,
                output,
            };
            message.set_write(info.to_bytes().to_vec());
            message.set_reply(
                Status::Success,
                super::protocol::CONNECTION_INFORMATION_SIZE as u64,
            );
        }
        None => message.set_reply(Status::NoMemory, 0),
    }
    Ok(())
}

/// The connect payload may carry a NUL-terminated application name used to
/// seed command history. Anything malformed is simply ignored.
fn parse_connect_application_name(bytes: &[u8]) -> Option<String> {
    const MAX_NAME_UNITS: usize = 128;
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take(MAX_NAME_UNITS)
        .take_while(|&unit| unit != 0)
        .collect();
    if units.is_empty() {
        return None;
    }
    Some(String::from_utf16_lossy(&units))
}

fn disconnect<C: DeviceComm>(
    state: &mut ServerState,
    message: &mut ApiMessage<'_, C>,
    outcome: &mut DispatchOutcome,
) {
    let process = message.packet().descriptor.process;
    if state.disconnect(process) {
        outcome.request_exit = state.process_count() == 0;
        message.set_reply(Status::Success, 0);
    } else {
        message.set_reply(Status::InvalidHandle, 0);
    }
}

fn create_object<C: DeviceComm>(state: &mut ServerState, message: &mut ApiMessage<'_, C>) {
    let process = message.packet().descriptor.process;
    let Payload::CreateObject(body) = message.packet().payload else {
        message.set_reply(Status::InvalidParameter, 0);
        return;
    };
    match state.create_object(process, body) {
        Ok(id) => message.set_reply(Status::Success, id),
        Err(status) => message.set_reply(status, 0),
    }
}

fn close_object<C: DeviceComm>(state: &mut ServerState, message: &mut ApiMessage<'_, C>) {
    let object = message.packet().descriptor.object;
    if state.close_object(object) {
        message.set_reply(Status::Success, 0);
    } else {
        message.set_reply(Status::InvalidHandle, 0);
    }
}

fn raw_flush<C: DeviceComm, H: HostIo>(
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

fn raw_write<C: DeviceComm, H: HostIo>(
    state: &mut ServerState,
    message: &mut ApiMessage<'_, C>,
    host: &mut H,
) -> Result<()> {
    let object = message.packet().descriptor.object;
    let Some(buffer) = state.screen_buffer_of(object) else {
        message.set_reply(Status::InvalidHandle, 0);
        return Ok(());
    };

    let data = message.read_input_tail()?;
    host.write_output_bytes(&data)?;

    let units = codepage::decode_bytes(state.output_code_page(), &data);
    let mode = state.output_mode();
    {
        let mut buf = buffer.borrow_mut();
        let mut sinks = OutputSinks {
            host: Some(host),
            title: Some(&mut state.title),
        };
        apply_text(&mut buf, &units, mode, &mut sinks);
    }
    message.set_reply(Status::Success, data.len() as u64);
    Ok(())
}

fn raw_read<C: DeviceComm, H: HostIo>(
    state: &mut ServerState,
    message: &mut ApiMessage<'_, C>,
    host: &mut H,
    outcome: &mut DispatchOutcome,
) -> Result<()> {
    let object = message.packet().descriptor.object;
    let capacity = message.output_capacity();
    let processed = state
        .input_mode()
        .contains(cathode_common::modes::InputMode::PROCESSED_INPUT);
    let code_page = state.input_code_page();

    let Some(handle) = state.handle_mut(object) else {
        message.set_reply(Status::InvalidHandle, 0);
        return Ok(());
    };
    if handle.kind != HandleKind::Input {
        message.set_reply(Status::InvalidHandle, 0);
        return Ok(());
    }

    let bytes = gather_consume(&mut handle.pending_input_bytes, host, GATHER_LIMIT)?;
    let (result, consumed) = read::read_bytes(code_page, processed, processed, &bytes, capacity);
    handle.pending_input_bytes.replace_with(&bytes[consumed..]);

    if result.saw_ctrl_c {
        dispatch_ctrl_event(state, host, CTRL_C_EVENT, 0)?;
        if result.data.is_empty() {
            message.set_reply(Status::Alerted, 0);
            return Ok(());
        }
    }
    if result.eof {
        message.set_reply(Status::Success, 0);
        return Ok(());
    }
    if result.data.is_empty() {
        if host.input_disconnected() {
            message.set_reply(Status::Success, 0);
        } else {
            outcome.reply_pending = true;
        }
        return Ok(());
    }

    let len = result.data.len();
    message.output_buffer()[..len].copy_from_slice(&result.data);
    message.set_reply(Status::Success, len as u64);
    Ok(())
}

// Shared input-path plumbing.

pub(crate) fn gather_consume<H: HostIo>(
    pending: &mut PendingBytes,
    host: &mut H,
    limit: usize,
) -> Result<Vec<u8>> {
    let mut bytes = pending.bytes().to_vec();
    pending.clear();
    let room = limit.saturating_sub(bytes.len());
    let available = host.input_bytes_available().min(room);
    if available > 0 {
        let mut chunk = vec![0u8; available];
        let count = host.read_input_bytes(&mut chunk)?;
        chunk.truncate(count);
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

pub(crate) fn gather_peek<H: HostIo>(
    pending: &PendingBytes,
    host: &mut H,
    limit: usize,
) -> Result<Vec<u8>> {
    let mut bytes = pending.bytes().to_vec();
    let room = limit.saturating_sub(bytes.len());
    let available = host.input_bytes_available().min(room);
    if available > 0 {
        let mut chunk = vec![0u8; available];
        let count = host.peek_input_bytes(&mut chunk)?;
        chunk.truncate(count);
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

/// Deliver a control event to the process group: group 0 fans out to every
/// connected process.
pub(crate) fn dispatch_ctrl_event<H: HostIo>(
    state: &ServerState,
    host: &mut H,
    event: u32,
    group: u32,
) -> Result<()> {
    for pid in state.pids_newest_first() {
        if group == 0 || pid == group {
            host.send_end_task(pid, event, 0)?;
        }
    }
    Ok(())
}

pub(crate) fn log_unhandled(api_number: u32) {
    warn!(api_number = format_args!("{api_number:#010x}"), "API not implemented");
}

pub(crate) fn log_function(function: IoFunction, identifier: u64) {
    debug!(?function, identifier, "dispatching packet");
}
