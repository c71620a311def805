use cathode_common::traits::{DeviceComm, IoComplete};
use cathode_common::{Result, Status};

use super::protocol::{IoFunction, IoPacket, Payload, MSG_HEADER_SIZE};

/// One in-flight request: the decoded packet, its transport, and the
/// completion being assembled.
pub struct ApiMessage<'a, C: DeviceComm> {
    comm: &'a mut C,
    packet: IoPacket,
    completion: IoComplete,
    output: Option<Vec<u8>>,
}

impl<'a, C: DeviceComm> ApiMessage<'a, C> {
    pub fn new(comm: &'a mut C, packet: IoPacket) -> Self {
        let completion = IoComplete::new(packet.descriptor.identifier);
        Self {
            comm,
            packet,
            completion,
            output: None,
        }
    }

    pub fn packet(&self) -> &IoPacket {
        &self.packet
    }

    pub fn packet_mut(&mut self) -> &mut IoPacket {
        &mut self.packet
    }

    pub fn completion(&self) -> &IoComplete {
        &self.completion
    }

    /// Reclaim the packet, e.g. to retain it across a reply-pending wait.
    pub fn into_packet(self) -> IoPacket {
        self.packet
    }

    pub fn set_reply(&mut self, status: Status, information: u64) {
        self.completion.status = status;
        self.completion.information = information;
    }

    /// Attach the completion's write body (the connect reply).
    pub fn set_write(&mut self, bytes: Vec<u8>) {
        self.completion.write = bytes;
    }

    fn api_descriptor_size(&self) -> u32 {
        match &self.packet.payload {
            Payload::UserDefined(user) => user.header.api_descriptor_size,
            _ => 0,
        }
    }

    /// Offset of the variable-size input region within the input buffer.
    fn input_tail_offset(&self) -> u32 {
        match self.packet.descriptor.function {
            IoFunction::UserDefined => MSG_HEADER_SIZE + self.api_descriptor_size(),
            _ => 0,
        }
    }

    pub fn input_tail_len(&self) -> usize {
        self.packet
            .descriptor
            .input_size
            .saturating_sub(self.input_tail_offset()) as usize
    }

    /// Pull the request's variable-size input bytes through the transport.
    pub fn read_input_tail(&mut self) -> Result<Vec<u8>> {
        let len = self.input_tail_len();
        let mut bytes = vec![0u8; len];
        if len > 0 {
            self.comm
                .read_input(u64::from(self.input_tail_offset()), &mut bytes)?;
        }
        Ok(bytes)
    }

    /// Capacity of the variable-size output region.
    pub fn output_capacity(&self) -> usize {
        let reserved = match self.packet.descriptor.function {
            IoFunction::UserDefined => self.api_descriptor_size(),
            _ => 0,
        };
        self.packet.descriptor.output_size.saturating_sub(reserved) as usize
    }

    /// The output region, zero-filled to capacity on first access.
    pub fn output_buffer(&mut self) -> &mut Vec<u8> {
        let capacity = self.output_capacity();
        self.output.get_or_insert_with(|| vec![0u8; capacity])
    }

    pub fn output_data(&self) -> Option<&[u8]> {
        self.output.as_deref()
    }

    /// Push the reply through the transport. A reply-pending request is
    /// not completed; the caller retains the packet instead.
    pub fn complete(&mut self, reply_pending: bool) -> Result<()> {
        if reply_pending {
            return Ok(());
        }
        if let Some(output) = &self.output {
            if !output.is_empty() {
                self.comm
                    .write_output(u64::from(self.api_descriptor_size()), output)?;
            }
        }
        self.comm.complete_io(&self.completion)
    }
}
