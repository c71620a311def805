use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

use cathode_common::modes::{HistoryFlags, InputMode, OutputMode};
use cathode_common::types::Coord;
use tracing::{debug, warn};

use super::protocol::{object_type, CreateObjectBody, GENERIC_READ, GENERIC_WRITE};
use crate::buffer::screen::ScreenBuffer;
use crate::input::cooked::CookedLineState;
use crate::input::pending::PendingBytes;
use cathode_common::Status;

pub type SharedScreenBuffer = Rc<RefCell<ScreenBuffer>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Input,
    Output,
}

/// A server-allocated object handle: the client's reference to either the
/// input stream or one screen buffer.
#[derive(Debug)]
pub struct ObjectHandle {
    pub kind: HandleKind,
    pub desired_access: u32,
    pub share_mode: u32,
    pub owning_process: u64,
    pub screen_buffer: Option<SharedScreenBuffer>,
    /// A low surrogate held back when the caller's buffer could not fit
    /// the whole pair.
    pub decoded_input_pending: Option<u16>,
    /// Bytes drained from the host stream that do not yet form a token.
    pub pending_input_bytes: PendingBytes,
    pub cooked: CookedLineState,
}

impl ObjectHandle {
    fn input(owning_process: u64, desired_access: u32, share_mode: u32) -> Self {
        Self {
            kind: HandleKind::Input,
            desired_access,
            share_mode,
            owning_process,
            screen_buffer: None,
            decoded_input_pending: None,
            pending_input_bytes: PendingBytes::new(),
            cooked: CookedLineState::default(),
        }
    }

    fn output(
        owning_process: u64,
        desired_access: u32,
        share_mode: u32,
        screen_buffer: SharedScreenBuffer,
    ) -> Self {
        Self {
            kind: HandleKind::Output,
            desired_access,
            share_mode,
            owning_process,
            screen_buffer: Some(screen_buffer),
            decoded_input_pending: None,
            pending_input_bytes: PendingBytes::new(),
            cooked: CookedLineState::default(),
        }
    }

    /// Drop every piece of buffered input decoding state.
    pub fn reset_input_state(&mut self) {
        self.decoded_input_pending = None;
        self.pending_input_bytes.clear();
        self.cooked.reset();
    }
}

#[derive(Debug, Clone)]
pub struct ProcessState {
    pub pid: u32,
    pub tid: u32,
    pub connect_sequence: u64,
    pub process_handle: u64,
    pub initial_input: u64,
    pub initial_output: u64,
    pub exe_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasEntry {
    pub source: Vec<u16>,
    pub target: Vec<u16>,
}

/// All aliases registered under one executable name.
#[derive(Debug, Default)]
pub struct AliasTable {
    /// The exe name as first registered, for enumeration replies.
    pub exe: Vec<u16>,
    pub entries: BTreeMap<String, AliasEntry>,
}

/// Ring of completed lines for one executable.
#[derive(Debug, Default)]
pub struct CommandHistory {
    commands: VecDeque<Vec<u16>>,
    capacity: usize,
}

impl CommandHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            commands: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, line: Vec<u16>, dedup: bool) {
        if line.is_empty() {
            return;
        }
        if dedup {
            self.commands.retain(|existing| existing != &line);
        }
        while self.commands.len() >= self.capacity {
            self.commands.pop_front();
        }
        self.commands.push_back(line);
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.commands.len() > self.capacity {
            self.commands.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn commands(&self) -> impl Iterator<Item = &Vec<u16>> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// The deterministic font the server reports to classic clients.
#[derive(Debug, Clone)]
pub struct FontState {
    pub index: u32,
    pub size: Coord,
    pub family: u32,
    pub weight: u32,
    pub face: Vec<u16>,
}

impl Default for FontState {
    fn default() -> Self {
        Self {
            index: 0,
            size: Coord::new(8, 16),
            family: 0x30,
            weight: 400,
            face: "Consolas".encode_utf16().collect(),
        }
    }
}

pub const DEFAULT_HISTORY_BUFFER_SIZE: u32 = 50;
pub const DEFAULT_NUMBER_OF_HISTORY_BUFFERS: u32 = 4;

/// Everything the console host owns on behalf of its clients.
pub struct ServerState {
    next_id: u64,
    next_connect_sequence: u64,
    processes: HashMap<u64, ProcessState>,
    handles: HashMap<u64, ObjectHandle>,
    active: Option<SharedScreenBuffer>,
    main: Option<SharedScreenBuffer>,
    /// Modes are stored raw: the input side keeps whatever the client set,
    /// including bits this host does not understand.
    pub input_mode_raw: u32,
    pub output_mode_raw: u32,
    input_code_page: u32,
    output_code_page: u32,
    pub title: Vec<u16>,
    pub original_title: Vec<u16>,
    aliases: BTreeMap<String, AliasTable>,
    histories: BTreeMap<String, CommandHistory>,
    pub history_buffer_size: u32,
    pub number_of_history_buffers: u32,
    pub history_flags: u32,
    pub font: FontState,
    pub cursor_mode_blink: bool,
    pub cursor_mode_db_enable: bool,
    pub nls_mode: u32,
}

impl ServerState {
    pub fn new() -> Self {
        let main = match ScreenBuffer::with_default_size() {
            Some(buffer) => Some(Rc::new(RefCell::new(buffer))),
            None => {
                warn!("default screen buffer allocation failed");
                None
            }
        };
        Self {
            next_id: 1,
            next_connect_sequence: 1,
            processes: HashMap::new(),
            handles: HashMap::new(),
            active: main.clone(),
            main,
            input_mode_raw: InputMode::default().bits(),
            output_mode_raw: OutputMode::default().bits(),
            input_code_page: 0,
            output_code_page: 0,
            title: Vec::new(),
            original_title: Vec::new(),
            aliases: BTreeMap::new(),
            histories: BTreeMap::new(),
            history_buffer_size: DEFAULT_HISTORY_BUFFER_SIZE,
            number_of_history_buffers: DEFAULT_NUMBER_OF_HISTORY_BUFFERS,
            history_flags: 0,
            font: FontState::default(),
            cursor_mode_blink: true,
            cursor_mode_db_enable: false,
            nls_mode: 0,
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn input_mode(&self) -> InputMode {
        InputMode::from_bits_truncate(self.input_mode_raw)
    }

    pub fn output_mode(&self) -> OutputMode {
        OutputMode::from_bits_truncate(self.output_mode_raw)
    }

    pub fn history_dedup(&self) -> bool {
        HistoryFlags::from_bits_truncate(self.history_flags).contains(HistoryFlags::NO_DUP)
    }

    pub fn input_code_page(&self) -> u32 {
        self.input_code_page
    }

    pub fn output_code_page(&self) -> u32 {
        self.output_code_page
    }

    pub fn set_code_page(&mut self, output: bool, code_page: u32) {
        if output {
            self.output_code_page = code_page;
        } else {
            self.input_code_page = code_page;
        }
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    pub fn process(&self, process_handle: u64) -> Option<&ProcessState> {
        self.processes.get(&process_handle)
    }

    /// Register a client. Returns the handle triple written back in the
    /// connect reply, or `None` when no screen buffer can be provided.
    pub fn connect(
        &mut self,
        pid: u32,
        tid: u32,
        exe_name: Option<String>,
    ) -> Option<(u64, u64, u64)> {
        let buffer = self.active.clone()?;
        let process_handle = self.allocate_id();
        let input = self.allocate_id();
        let output = self.allocate_id();
        let connect_sequence = self.next_connect_sequence;
        self.next_connect_sequence += 1;

        self.handles
            .insert(input, ObjectHandle::input(process_handle, GENERIC_READ, 0));
        self.handles.insert(
            output,
            ObjectHandle::output(process_handle, GENERIC_WRITE, 0, buffer),
        );

        let exe_name = exe_name.unwrap_or_default();
        if !exe_name.is_empty() {
            let capacity = self.history_buffer_size as usize;
            self.histories
                .entry(fold_name_str(&exe_name))
                .or_insert_with(|| CommandHistory::new(capacity));
        }

        self.processes.insert(
            process_handle,
            ProcessState {
                pid,
                tid,
                connect_sequence,
                process_handle,
                initial_input: input,
                initial_output: output,
                exe_name,
            },
        );
        debug!(pid, tid, process_handle, "client connected");
        Some((process_handle, input, output))
    }

    /// Remove a process and every object it owns. Returns false for an
    /// unknown process handle.
    pub fn disconnect(&mut self, process_handle: u64) -> bool {
        if self.processes.remove(&process_handle).is_none() {
            return false;
        }
        self.handles
            .retain(|_, handle| handle.owning_process != process_handle);
        debug!(process_handle, "client disconnected");
        true
    }

    pub fn create_object(&mut self, process_handle: u64, body: CreateObjectBody) -> Result<u64, Status> {
        if !self.processes.contains_key(&process_handle) {
            return Err(Status::InvalidHandle);
        }
        let resolved = if body.object_type == object_type::GENERIC {
            if body.desired_access & GENERIC_READ != 0 {
                object_type::CURRENT_INPUT
            } else if body.desired_access & GENERIC_WRITE != 0 {
                object_type::CURRENT_OUTPUT
            } else {
                return Err(Status::InvalidParameter);
            }
        } else {
            body.object_type
        };

        let handle = match resolved {
            object_type::CURRENT_INPUT => {
                ObjectHandle::input(process_handle, body.desired_access, body.share_mode)
            }
            object_type::CURRENT_OUTPUT => {
                let Some(buffer) = self.active.clone() else {
                    return Err(Status::NoMemory);
                };
                ObjectHandle::output(process_handle, body.desired_access, body.share_mode, buffer)
            }
            object_type::NEW_OUTPUT => {
                let size = self
                    .active
                    .as_ref()
                    .map(|buffer| buffer.borrow().size())
                    .unwrap_or(crate::buffer::screen::DEFAULT_SIZE);
                let Some(buffer) = ScreenBuffer::new(size) else {
                    return Err(Status::NoMemory);
                };
                ObjectHandle::output(
                    process_handle,
                    body.desired_access,
                    body.share_mode,
                    Rc::new(RefCell::new(buffer)),
                )
            }
            _ => return Err(Status::InvalidParameter),
        };

        let id = self.allocate_id();
        self.handles.insert(id, handle);
        Ok(id)
    }

    pub fn close_object(&mut self, id: u64) -> bool {
        self.handles.remove(&id).is_some()
    }

    pub fn handle(&self, id: u64) -> Option<&ObjectHandle> {
        self.handles.get(&id)
    }

    pub fn handle_mut(&mut self, id: u64) -> Option<&mut ObjectHandle> {
        self.handles.get_mut(&id)
    }

    /// Detach a handle for an operation that also needs the rest of the
    /// server state mutable (the cooked read). Pair with [`Self::put_handle`].
    pub fn take_handle(&mut self, id: u64) -> Option<ObjectHandle> {
        self.handles.remove(&id)
    }

    pub fn put_handle(&mut self, id: u64, handle: ObjectHandle) {
        self.handles.insert(id, handle);
    }

    pub fn screen_buffer_of(&self, id: u64) -> Option<SharedScreenBuffer> {
        self.handles.get(&id).and_then(|h| h.screen_buffer.clone())
    }

    pub fn active_screen_buffer(&self) -> Option<SharedScreenBuffer> {
        self.active.clone()
    }

    pub fn set_active_screen_buffer(&mut self, buffer: SharedScreenBuffer) {
        self.active = Some(buffer);
    }

    pub fn main_screen_buffer(&self) -> Option<SharedScreenBuffer> {
        self.main.clone()
    }

    /// Pids ordered newest connection first.
    pub fn pids_newest_first(&self) -> Vec<u32> {
        let mut processes: Vec<&ProcessState> = self.processes.values().collect();
        processes.sort_by(|a, b| b.connect_sequence.cmp(&a.connect_sequence));
        processes.iter().map(|p| p.pid).collect()
    }

    pub fn reset_all_input_state(&mut self) {
        for handle in self.handles.values_mut() {
            if handle.kind == HandleKind::Input {
                handle.reset_input_state();
            }
        }
    }

    // Aliases.

    pub fn add_alias(&mut self, exe: &[u16], source: &[u16], target: &[u16]) {
        let exe_key = fold_name(exe);
        let source_key = fold_name(source);
        let table = self.aliases.entry(exe_key).or_insert_with(|| AliasTable {
            exe: exe.to_vec(),
            ..AliasTable::default()
        });
        if target.is_empty() {
            table.entries.remove(&source_key);
        } else {
            table.entries.insert(
                source_key,
                AliasEntry {
                    source: source.to_vec(),
                    target: target.to_vec(),
                },
            );
        }
    }

    pub fn alias_target(&self, exe: &[u16], source: &[u16]) -> Option<&[u16]> {
        self.aliases
            .get(&fold_name(exe))
            .and_then(|table| table.entries.get(&fold_name(source)))
            .map(|entry| entry.target.as_slice())
    }

    pub fn alias_table(&self, exe: &[u16]) -> Option<&AliasTable> {
        self.aliases.get(&fold_name(exe))
    }

    pub fn alias_exes(&self) -> impl Iterator<Item = &AliasTable> {
        self.aliases.values().filter(|table| !table.entries.is_empty())
    }

    // Command history.

    pub fn history(&self, exe: &[u16]) -> Option<&CommandHistory> {
        self.histories.get(&fold_name(exe))
    }

    pub fn history_entry(&mut self, exe: &[u16]) -> &mut CommandHistory {
        let capacity = self.history_buffer_size as usize;
        self.histories
            .entry(fold_name(exe))
            .or_insert_with(|| CommandHistory::new(capacity))
    }

    pub fn append_history(&mut self, exe: &[u16], line: Vec<u16>) {
        let dedup = self.history_dedup();
        self.history_entry(exe).push(line, dedup);
    }

    pub fn set_history_buffer_size(&mut self, size: u32) {
        self.history_buffer_size = size;
        for history in self.histories.values_mut() {
            history.set_capacity(size as usize);
        }
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Exe and alias-source names compare case-insensitively.
pub fn fold_name(units: &[u16]) -> String {
    fold_name_str(&String::from_utf16_lossy(units))
}

pub fn fold_name_str(name: &str) -> String {
    name.to_lowercase()
}
