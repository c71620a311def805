//! Demonstration host: wires an in-memory driver transport and terminal to
//! the dispatch engine, runs a short scripted client session, and dumps the
//! rendered screen.

use anyhow::{bail, Context, Result};
use cathode_common::traits::{DeviceComm, IoComplete, MemoryHostIo};
use cathode_common::Status;
use cathode_core::server::protocol::{
    ApiDescriptor, ApiNumber, ConnectionInformation, IoFunction, IoPacket, ModeMsg, MsgHeader,
    Payload, ReadConsoleMsg, UserDefinedPacket, WriteConsoleMsg, MSG_HEADER_SIZE,
};
use cathode_core::server::{dispatch_message, ApiMessage, ReplyPendingQueue, ServerState};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const API_SIZE: u32 = 16;

#[derive(Parser, Debug)]
#[command(author, version, about = "Cathode console host demo", long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Text typed into the cooked line editor
    #[arg(long, default_value = "hello cathode")]
    line: String,

    /// Rows of the screen dump
    #[arg(long, default_value_t = 6)]
    dump_rows: i16,
}

/// In-memory stand-in for the kernel transport: one packet's buffer space
/// at a time.
#[derive(Debug, Default)]
struct LoopbackComm {
    input: Vec<u8>,
    output: Vec<u8>,
    completions: Vec<IoComplete>,
}

impl DeviceComm for LoopbackComm {
    fn read_input(&mut self, offset: u64, dest: &mut [u8]) -> cathode_common::Result<()> {
        let offset = offset as usize;
        if offset + dest.len() > self.input.len() {
            return Err(cathode_common::DeviceError::transport(
                "loopback read_input out of range",
                13,
            ));
        }
        dest.copy_from_slice(&self.input[offset..offset + dest.len()]);
        Ok(())
    }

    fn write_output(&mut self, offset: u64, src: &[u8]) -> cathode_common::Result<()> {
        let offset = offset as usize;
        if self.output.len() < offset + src.len() {
            self.output.resize(offset + src.len(), 0);
        }
        self.output[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn complete_io(&mut self, completion: &IoComplete) -> cathode_common::Result<()> {
        self.completions.push(completion.clone());
        Ok(())
    }
}

fn user_packet(identifier: u64, info: &ConnectionInformation, object: u64, api: ApiNumber, descriptor: ApiDescriptor) -> IoPacket {
    let mut packet = IoPacket::new(identifier, IoFunction::UserDefined);
    packet.descriptor.process = info.process;
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

fn wide_bytes(text: &str) -> Vec<u8> {
    let mut bytes = Vec::new();
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}

struct Session {
    state: ServerState,
    host: MemoryHostIo,
    pending: ReplyPendingQueue,
}

impl Session {
    fn submit(&mut self, packet: IoPacket, input: Vec<u8>) -> Result<(Status, u64, Vec<u8>, Vec<u8>)> {
        let mut comm = LoopbackComm {
            input,
            ..LoopbackComm::default()
        };
        let mut message = ApiMessage::new(&mut comm, packet);
        let outcome = dispatch_message(&mut self.state, &mut message, &mut self.host)
            .context("transport failure")?;
        let status = message.completion().status;
        let information = message.completion().information;
        let write = message.completion().write.clone();
        if outcome.reply_pending {
            debug!("request parked on the reply-pending queue");
            self.pending.push(message.into_packet());
            return Ok((status, 0, write, Vec::new()));
        }
        Ok((status, information, write, comm.output))
    }

    /// Retry everything that was parked; the demo pushes input before
    /// calling this, exactly like the driver would on an input event.
    fn retry_pending(&mut self, input: Vec<u8>) -> Result<Vec<(Status, u64, Vec<u8>)>> {
        let mut results = Vec::new();
        for packet in self.pending.drain() {
            let mut comm = LoopbackComm {
                input: input.clone(),
                ..LoopbackComm::default()
            };
            let mut message = ApiMessage::new(&mut comm, packet);
            let outcome = dispatch_message(&mut self.state, &mut message, &mut self.host)
                .context("transport failure")?;
            if outcome.reply_pending {
                self.pending.push(message.into_packet());
                continue;
            }
            results.push((
                message.completion().status,
                message.completion().information,
                comm.output,
            ));
        }
        Ok(results)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug { "cathode=debug" } else { "cathode=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting cathode host demo");

    let mut session = Session {
        state: ServerState::new(),
        host: MemoryHostIo::new(),
        pending: ReplyPendingQueue::new(),
    };

    // Connect a client.
    let mut connect = IoPacket::new(1, IoFunction::Connect);
    connect.descriptor.process = u64::from(std::process::id());
    connect.descriptor.object = 1;
    let (status, _, write, _) = session.submit(connect, Vec::new())?;
    if status != Status::Success {
        bail!("connect failed: {status:?}");
    }
    let info = ConnectionInformation::from_bytes(&write).context("malformed connect reply")?;
    info!(process = info.process, input = info.input, output = info.output, "client connected");

    // Turn on VT processing and paint a banner.
    let packet = user_packet(
        2,
        &info,
        info.output,
        ApiNumber::SetMode,
        ApiDescriptor::Mode(ModeMsg { mode: 0x07 }),
    );
    session.submit(packet, Vec::new())?;

    let banner = "\x1b[2J\x1b[Hcathode \x1b[32mconsole host\x1b[0m\r\n> ";
    let payload = wide_bytes(banner);
    let mut packet = user_packet(
        3,
        &info,
        info.output,
        ApiNumber::WriteConsole,
        ApiDescriptor::WriteConsole(WriteConsoleMsg {
            num_bytes: payload.len() as u32,
            unicode: true,
        }),
    );
    let offset = (MSG_HEADER_SIZE + API_SIZE) as usize;
    packet.descriptor.input_size = (offset + payload.len()) as u32;
    let mut input = vec![0u8; offset];
    input.extend_from_slice(&payload);
    let (status, ..) = session.submit(packet, input)?;
    if status != Status::Success {
        bail!("WriteConsole failed: {status:?}");
    }

    // Issue a cooked read before any input exists: it must park.
    let mut read = user_packet(
        4,
        &info,
        info.input,
        ApiNumber::ReadConsole,
        ApiDescriptor::ReadConsole(ReadConsoleMsg {
            unicode: true,
            ..ReadConsoleMsg::default()
        }),
    );
    read.descriptor.output_size = API_SIZE + 256;
    session.submit(read, Vec::new())?;
    info!(parked = session.pending.len(), "cooked read is waiting for input");

    // The terminal delivers a line; the parked read completes on retry.
    session.host.push_input(format!("{}\r", args.line).as_bytes());
    let results = session.retry_pending(Vec::new())?;
    for (status, information, output) in results {
        if status != Status::Success {
            bail!("cooked read failed: {status:?}");
        }
        // Reply data sits past the descriptor region of the output buffer.
        let start = API_SIZE as usize;
        let units: Vec<u16> = output[start..start + information as usize]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        info!(line = %String::from_utf16_lossy(&units).escape_debug(), "cooked read completed");
    }

    // Dump the rendered screen.
    let buffer = session
        .state
        .active_screen_buffer()
        .context("no active screen buffer")?;
    {
        let buf = buffer.borrow();
        println!("--- screen ({}x{}) ---", buf.size().x, buf.size().y);
        for y in 0..args.dump_rows.min(buf.size().y) {
            let mut row = String::new();
            for x in 0..buf.size().x {
                let cell = buf
                    .cell(cathode_common::types::Coord::new(x, y))
                    .unwrap_or_default();
                row.push(char::from_u32(u32::from(cell.ch)).unwrap_or(' '));
            }
            println!("|{}|", row.trim_end());
        }
    }
    println!(
        "--- terminal byte stream: {:?}",
        String::from_utf8_lossy(&session.host.output)
    );

    // Disconnect; the engine asks the host to exit with the last client.
    let mut disconnect = IoPacket::new(5, IoFunction::Disconnect);
    disconnect.descriptor.process = info.process;
    let mut comm = LoopbackComm::default();
    let mut message = ApiMessage::new(&mut comm, disconnect);
    let outcome = dispatch_message(&mut session.state, &mut message, &mut session.host)?;
    info!(request_exit = outcome.request_exit, "client disconnected");

    Ok(())
}
