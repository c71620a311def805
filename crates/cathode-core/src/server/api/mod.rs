use cathode_common::traits::{DeviceComm, HostIo};
use cathode_common::{Result, Status};

use super::dispatch::{log_unhandled, DispatchOutcome};
use super::message::ApiMessage;
use super::protocol::ApiNumber;
use super::state::ServerState;

mod l1;
mod l2;
mod l3;

/// Pull a typed descriptor body out of the message by value (all bodies
/// are `Copy`); pair with `store_body!` to write the mutated copy back.
macro_rules! take_body {
    ($message:expr, $variant:ident) => {
        match $message.packet_mut().user_defined_mut() {
            Some(user) => match &user.descriptor {
                crate::server::protocol::ApiDescriptor::$variant(body) => Some(*body),
                _ => None,
            },
            None => None,
        }
    };
}

macro_rules! store_body {
    ($message:expr, $variant:ident, $body:expr) => {
        if let Some(user) = $message.packet_mut().user_defined_mut() {
            user.descriptor = crate::server::protocol::ApiDescriptor::$variant($body);
        }
    };
}

pub(crate) use {store_body, take_body};

/// Route a user-defined packet by API number. Unknown or refused numbers
/// get a deterministic reply: zeroed descriptor, `not_implemented`.
pub fn dispatch<C: DeviceComm, H: HostIo>(
    state: &mut ServerState,
    message: &mut ApiMessage<'_, C>,
    host: &mut H,
    outcome: &mut DispatchOutcome,
) -> Result<()> {
    let Some(user) = message.packet().user_defined() else {
        message.set_reply(Status::InvalidParameter, 0);
        return Ok(());
    };
    let api_number = user.header.api_number;
    match ApiNumber::from_u32(api_number) {
        None => refuse(message, api_number),
        Some(api) if api.is_unsupported() => refuse(message, api_number),
        Some(api) => match api as u32 >> 24 {
            1 => l1::dispatch(api, state, message, host, outcome)?,
            2 => l2::dispatch(api, state, message, host)?,
            _ => l3::dispatch(api, state, message, host)?,
        },
    }
    Ok(())
}

fn refuse<C: DeviceComm>(message: &mut ApiMessage<'_, C>, api_number: u32) {
    log_unhandled(api_number);
    if let Some(user) = message.packet_mut().user_defined_mut() {
        user.descriptor.zero();
    }
    message.set_reply(Status::NotImplemented, 0);
}

/// The fallback for a descriptor that does not match its API number.
pub(crate) fn invalid<C: DeviceComm>(message: &mut ApiMessage<'_, C>) -> Result<()> {
    message.set_reply(Status::InvalidParameter, 0);
    Ok(())
}
