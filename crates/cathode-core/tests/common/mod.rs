//! In-memory transport and packet builders shared by the integration
//! tests.

use cathode_common::traits::{DeviceComm, HostIo, IoComplete};
use cathode_common::{DeviceError, Result, Status};
use cathode_core::server::dispatch::{dispatch_message, DispatchOutcome};
use cathode_core::server::message::ApiMessage;
use cathode_core::server::protocol::{
    ApiDescriptor, ApiNumber, ConnectionInformation, CreateObjectBody, IoFunction, IoPacket,
    MsgHeader, Payload, UserDefinedPacket, MSG_HEADER_SIZE,
};
use cathode_core::server::state::ServerState;

/// A descriptor size for tests; only the buffer-space offsets depend on it.
pub const API_SIZE: u32 = 16;

#[derive(Debug, Default)]
pub struct DummyComm {
    pub input: Vec<u8>,
    pub output: Vec<u8>,
    pub completions: Vec<IoComplete>,
}

impl DeviceComm for DummyComm {
    fn read_input(&mut self, offset: u64, dest: &mut [u8]) -> Result<()> {
        let offset = offset as usize;
        if offset + dest.len() > self.input.len() {
            return Err(DeviceError::transport("DummyComm read_input out of range", 13));
        }
        dest.copy_from_slice(&self.input[offset..offset + dest.len()]);
        Ok(())
    }

    fn write_output(&mut self, offset: u64, src: &[u8]) -> Result<()> {
        let offset = offset as usize;
        if self.output.len() < offset + src.len() {
            self.output.resize(offset + src.len(), 0);
        }
        self.output[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn complete_io(&mut self, completion: &IoComplete) -> Result<()> {
        self.completions.push(completion.clone());
        Ok(())
    }
}

pub struct RunResult {
    pub packet: IoPacket,
    pub status: Status,
    pub information: u64,
    pub write: Vec<u8>,
    pub output: Vec<u8>,
    pub outcome: DispatchOutcome,
}

impl RunResult {
    pub fn descriptor(&self) -> &ApiDescriptor {
        &self
            .packet
            .user_defined()
            .expect("user-defined packet")
            .descriptor
    }
}

pub fn run_with<H: HostIo>(
    state: &mut ServerState,
    comm: &mut DummyComm,
    host: &mut H,
    packet: IoPacket,
) -> RunResult {
    let mut message = ApiMessage::new(comm, packet);
    let outcome = dispatch_message(state, &mut message, host).expect("dispatch succeeds");
    let status = message.completion().status;
    let information = message.completion().information;
    let write = message.completion().write.clone();
    let output = message.output_data().map(<[u8]>::to_vec).unwrap_or_default();
    RunResult {
        packet: message.into_packet(),
        status,
        information,
        write,
        output,
        outcome,
    }
}

pub fn run<H: HostIo>(state: &mut ServerState, host: &mut H, packet: IoPacket) -> RunResult {
    let mut comm = DummyComm::default();
    run_with(state, &mut comm, host, packet)
}

pub fn connect_packet(identifier: u64, pid: u32, tid: u32) -> IoPacket {
    let mut packet = IoPacket::new(identifier, IoFunction::Connect);
    packet.descriptor.process = u64::from(pid);
    packet.descriptor.object = u64::from(tid);
    packet
}

pub fn disconnect_packet(identifier: u64, process: u64) -> IoPacket {
    let mut packet = IoPacket::new(identifier, IoFunction::Disconnect);
    packet.descriptor.process = process;
    packet
}

pub fn create_object_packet(
    identifier: u64,
    process: u64,
    object_type: u32,
    desired_access: u32,
    share_mode: u32,
) -> IoPacket {
    let mut packet = IoPacket::new(identifier, IoFunction::CreateObject);
    packet.descriptor.process = process;
    packet.payload = Payload::CreateObject(CreateObjectBody {
        object_type,
        desired_access,
        share_mode,
    });
    packet
}

pub fn close_object_packet(identifier: u64, object: u64) -> IoPacket {
    let mut packet = IoPacket::new(identifier, IoFunction::CloseObject);
    packet.descriptor.object = object;
    packet
}

pub fn user_packet(
    identifier: u64,
    process: u64,
    object: u64,
    api: ApiNumber,
    descriptor: ApiDescriptor,
) -> IoPacket {
    let mut packet = IoPacket::new(identifier, IoFunction::UserDefined);
    packet.descriptor.process = process;
    packet.descriptor.object = object;
    packet.payload = Payload::UserDefined(UserDefinedPacket {
        header: MsgHeader {
            api_number: api as u32,
            api_descriptor_size: API_SIZE,
        },
        descriptor,
    });
    packet
}

/// Reserve `capacity` bytes of reply buffer space on a user-defined packet.
pub fn with_output_capacity(mut packet: IoPacket, capacity: u32) -> IoPacket {
    packet.descriptor.output_size = API_SIZE + capacity;
    packet
}

/// Stage `tail` as the packet's variable-size input region.
pub fn with_input_tail(mut packet: IoPacket, comm: &mut DummyComm, tail: &[u8]) -> IoPacket {
    let offset = (MSG_HEADER_SIZE + API_SIZE) as usize;
    packet.descriptor.input_size = (offset + tail.len()) as u32;
    comm.input.resize(offset, 0);
    comm.input.extend_from_slice(tail);
    packet
}

pub fn connect_client<H: HostIo>(
    state: &mut ServerState,
    host: &mut H,
    pid: u32,
    tid: u32,
) -> ConnectionInformation {
    let result = run(state, host, connect_packet(1, pid, tid));
    assert_eq!(result.status, Status::Success);
    ConnectionInformation::from_bytes(&result.write).expect("connect reply")
}

pub fn wide(text: &str) -> Vec<u16> {
    text.encode_utf16().collect()
}

pub fn wide_bytes(text: &str) -> Vec<u8> {
    let mut bytes = Vec::new();
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}
