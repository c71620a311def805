//! Dispatch-engine integration tests: lifecycle, modes, screen-buffer
//! inspection, aliases, history, and the deterministic legacy replies.

mod common;

use cathode_common::traits::{MemoryHostIo, NullHostIo};
use cathode_common::types::{Coord, Rect};
use cathode_common::Status;
use cathode_core::server::protocol::*;
use cathode_core::server::state::ServerState;

use common::*;

#[test]
fn test_connect_and_disconnect_lifecycle() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;

    let result = run(&mut state, &mut host, connect_packet(1, 1234, 5678));
    assert_eq!(result.status, Status::Success);
    assert_eq!(result.information, CONNECTION_INFORMATION_SIZE as u64);
    let info = ConnectionInformation::from_bytes(&result.write).unwrap();
    assert_ne!(info.process, 0);
    assert_ne!(info.input, 0);
    assert_ne!(info.output, 0);
    assert_eq!(state.process_count(), 1);

    let result = run(&mut state, &mut host, disconnect_packet(2, info.process));
    assert_eq!(result.status, Status::Success);
    assert!(result.outcome.request_exit);
    assert_eq!(state.process_count(), 0);
}

#[test]
fn test_create_and_close_object() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 42, 7);

    let result = run(
        &mut state,
        &mut host,
        create_object_packet(3, info.process, object_type::GENERIC, GENERIC_READ, 3),
    );
    assert_eq!(result.status, Status::Success);
    let handle_id = result.information;
    assert_ne!(handle_id, 0);

    let result = run(&mut state, &mut host, close_object_packet(4, handle_id));
    assert_eq!(result.status, Status::Success);

    // Closing twice reports the handle as gone.
    let result = run(&mut state, &mut host, close_object_packet(5, handle_id));
    assert_eq!(result.status, Status::InvalidHandle);
}

#[test]
fn test_create_object_requires_process_handle() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let result = run(
        &mut state,
        &mut host,
        create_object_packet(3, 0xDEAD_BEEF, object_type::CURRENT_OUTPUT, GENERIC_WRITE, 3),
    );
    assert_eq!(result.status, Status::InvalidHandle);
}

#[test]
fn test_disconnect_closes_owned_objects() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 200, 300);

    let result = run(
        &mut state,
        &mut host,
        create_object_packet(3, info.process, object_type::NEW_OUTPUT, GENERIC_WRITE, 3),
    );
    assert_eq!(result.status, Status::Success);
    let new_output = result.information;

    let result = run(&mut state, &mut host, disconnect_packet(4, info.process));
    assert_eq!(result.status, Status::Success);

    let result = run(&mut state, &mut host, close_object_packet(5, new_output));
    assert_eq!(result.status, Status::InvalidHandle);
}

fn fill_one(
    state: &mut ServerState,
    process: u64,
    object: u64,
    coord: Coord,
    value: u16,
) -> Status {
    let mut host = NullHostIo;
    let packet = user_packet(
        40,
        process,
        object,
        ApiNumber::FillConsoleOutput,
        ApiDescriptor::FillConsoleOutput(FillConsoleOutputMsg {
            write_coord: coord,
            element_type: element_type::REAL_UNICODE,
            element: value,
            length: 1,
        }),
    );
    let result = run(state, &mut host, packet);
    if result.status == Status::Success {
        match result.descriptor() {
            ApiDescriptor::FillConsoleOutput(body) => assert_eq!(body.length, 1),
            other => panic!("unexpected descriptor {other:?}"),
        }
    }
    result.status
}

fn read_one(state: &mut ServerState, process: u64, object: u64, coord: Coord) -> u16 {
    let mut host = NullHostIo;
    let packet = with_output_capacity(
        user_packet(
            41,
            process,
            object,
            ApiNumber::ReadConsoleOutputString,
            ApiDescriptor::OutputString(OutputStringMsg {
                coord,
                string_type: element_type::REAL_UNICODE,
                num_records: 1,
            }),
        ),
        2,
    );
    let result = run(state, &mut host, packet);
    assert_eq!(result.status, Status::Success);
    u16::from_le_bytes([result.output[0], result.output[1]])
}

#[test]
fn test_new_output_has_independent_screen_buffer_state() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 13, 37);

    let result = run(
        &mut state,
        &mut host,
        create_object_packet(3, info.process, object_type::NEW_OUTPUT, GENERIC_WRITE, 3),
    );
    let new_output = result.information;
    assert_ne!(new_output, 0);

    assert_eq!(
        fill_one(&mut state, info.process, info.output, Coord::new(0, 0), b'A' as u16),
        Status::Success
    );
    assert_eq!(
        fill_one(&mut state, info.process, new_output, Coord::new(0, 0), b'B' as u16),
        Status::Success
    );

    assert_eq!(
        read_one(&mut state, info.process, info.output, Coord::new(0, 0)),
        b'A' as u16
    );
    assert_eq!(
        read_one(&mut state, info.process, new_output, Coord::new(0, 0)),
        b'B' as u16
    );
}

#[test]
fn test_set_active_screen_buffer_affects_current_output_creation() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 17, 23);

    let result = run(
        &mut state,
        &mut host,
        create_object_packet(3, info.process, object_type::NEW_OUTPUT, GENERIC_WRITE, 3),
    );
    let new_output = result.information;

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            50,
            info.process,
            new_output,
            ApiNumber::SetActiveScreenBuffer,
            ApiDescriptor::Empty,
        ),
    );
    assert_eq!(result.status, Status::Success);

    let result = run(
        &mut state,
        &mut host,
        create_object_packet(
            51,
            info.process,
            object_type::CURRENT_OUTPUT,
            GENERIC_WRITE,
            3,
        ),
    );
    let current_output = result.information;
    assert_ne!(current_output, 0);

    assert_eq!(
        fill_one(&mut state, info.process, current_output, Coord::new(1, 0), b'Z' as u16),
        Status::Success
    );
    assert_eq!(
        read_one(&mut state, info.process, new_output, Coord::new(1, 0)),
        b'Z' as u16
    );
    assert_ne!(
        read_one(&mut state, info.process, info.output, Coord::new(1, 0)),
        b'Z' as u16
    );
}

#[test]
fn test_get_set_input_mode_applies_despite_error() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 111, 222);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            10,
            info.process,
            info.input,
            ApiNumber::GetMode,
            ApiDescriptor::Mode(ModeMsg::default()),
        ),
    );
    assert_eq!(result.status, Status::Success);
    match result.descriptor() {
        ApiDescriptor::Mode(body) => assert_eq!(body.mode, 0x97),
        other => panic!("unexpected descriptor {other:?}"),
    }

    // Unknown bits: stored anyway, but the reply is an error.
    let result = run(
        &mut state,
        &mut host,
        user_packet(
            11,
            info.process,
            info.input,
            ApiNumber::SetMode,
            ApiDescriptor::Mode(ModeMsg { mode: 0x1234 }),
        ),
    );
    assert_eq!(result.status, Status::InvalidParameter);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            12,
            info.process,
            info.input,
            ApiNumber::GetMode,
            ApiDescriptor::Mode(ModeMsg::default()),
        ),
    );
    match result.descriptor() {
        ApiDescriptor::Mode(body) => assert_eq!(body.mode, 0x1234),
        other => panic!("unexpected descriptor {other:?}"),
    }
}

#[test]
fn test_set_output_mode_validates_flags() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 123, 456);

    let valid = 0x0F; // processed | wrap | vt | disable-newline-auto-return
    let result = run(
        &mut state,
        &mut host,
        user_packet(
            201,
            info.process,
            info.output,
            ApiNumber::SetMode,
            ApiDescriptor::Mode(ModeMsg { mode: valid }),
        ),
    );
    assert_eq!(result.status, Status::Success);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            202,
            info.process,
            info.output,
            ApiNumber::SetMode,
            ApiDescriptor::Mode(ModeMsg {
                mode: valid | 0x8000_0000,
            }),
        ),
    );
    assert_eq!(result.status, Status::InvalidParameter);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            203,
            info.process,
            info.output,
            ApiNumber::GetMode,
            ApiDescriptor::Mode(ModeMsg::default()),
        ),
    );
    match result.descriptor() {
        ApiDescriptor::Mode(body) => assert_eq!(body.mode, valid),
        other => panic!("unexpected descriptor {other:?}"),
    }
}

#[test]
fn test_get_set_code_page() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 333, 444);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            12,
            info.process,
            info.output,
            ApiNumber::GetCp,
            ApiDescriptor::GetCp(GetCpMsg {
                code_page: 0,
                output: false,
            }),
        ),
    );
    assert_eq!(result.status, Status::Success);
    match result.descriptor() {
        ApiDescriptor::GetCp(body) => assert_ne!(body.code_page, 0),
        other => panic!("unexpected descriptor {other:?}"),
    }

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            13,
            info.process,
            info.output,
            ApiNumber::SetCp,
            ApiDescriptor::SetCp(SetCpMsg {
                code_page: 65001,
                output: false,
            }),
        ),
    );
    assert_eq!(result.status, Status::Success);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            14,
            info.process,
            info.output,
            ApiNumber::GetCp,
            ApiDescriptor::GetCp(GetCpMsg {
                code_page: 0,
                output: false,
            }),
        ),
    );
    match result.descriptor() {
        ApiDescriptor::GetCp(body) => assert_eq!(body.code_page, 65001),
        other => panic!("unexpected descriptor {other:?}"),
    }
}

#[test]
fn test_screen_buffer_info_and_cursor_roundtrip() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 555, 666);

    let get_info = |state: &mut ServerState| {
        let mut host = NullHostIo;
        let result = run(
            state,
            &mut host,
            user_packet(
                20,
                info.process,
                info.output,
                ApiNumber::GetScreenBufferInfo,
                ApiDescriptor::ScreenBufferInfo(ScreenBufferInfoMsg::default()),
            ),
        );
        assert_eq!(result.status, Status::Success);
        match result.descriptor() {
            ApiDescriptor::ScreenBufferInfo(body) => *body,
            other => panic!("unexpected descriptor {other:?}"),
        }
    };

    let initial = get_info(&mut state);
    assert_eq!(initial.size, Coord::new(120, 40));
    assert_eq!(initial.attributes, 0x07);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            21,
            info.process,
            info.output,
            ApiNumber::SetCursorPosition,
            ApiDescriptor::SetCursorPosition(SetCursorPositionMsg {
                cursor_position: Coord::new(10, 5),
            }),
        ),
    );
    assert_eq!(result.status, Status::Success);
    assert_eq!(get_info(&mut state).cursor_position, Coord::new(10, 5));

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            22,
            info.process,
            info.output,
            ApiNumber::SetTextAttribute,
            ApiDescriptor::SetTextAttribute(SetTextAttributeMsg { attributes: 0x1E }),
        ),
    );
    assert_eq!(result.status, Status::Success);
    assert_eq!(get_info(&mut state).attributes, 0x1E);
}

#[test]
fn test_cursor_info_roundtrip() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 777, 888);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            23,
            info.process,
            info.output,
            ApiNumber::GetCursorInfo,
            ApiDescriptor::CursorInfo(CursorInfoMsg::default()),
        ),
    );
    assert_eq!(result.status, Status::Success);
    match result.descriptor() {
        ApiDescriptor::CursorInfo(body) => {
            assert_eq!(body.cursor_size, 25);
            assert!(body.visible);
        }
        other => panic!("unexpected descriptor {other:?}"),
    }

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            24,
            info.process,
            info.output,
            ApiNumber::SetCursorInfo,
            ApiDescriptor::CursorInfo(CursorInfoMsg {
                cursor_size: 50,
                visible: false,
            }),
        ),
    );
    assert_eq!(result.status, Status::Success);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            25,
            info.process,
            info.output,
            ApiNumber::GetCursorInfo,
            ApiDescriptor::CursorInfo(CursorInfoMsg::default()),
        ),
    );
    match result.descriptor() {
        ApiDescriptor::CursorInfo(body) => {
            assert_eq!(body.cursor_size, 50);
            assert!(!body.visible);
        }
        other => panic!("unexpected descriptor {other:?}"),
    }
}

#[test]
fn test_get_largest_window_size() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 999, 1000);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            25,
            info.process,
            info.output,
            ApiNumber::GetLargestWindowSize,
            ApiDescriptor::GetLargestWindowSize(GetLargestWindowSizeMsg::default()),
        ),
    );
    assert_eq!(result.status, Status::Success);
    match result.descriptor() {
        ApiDescriptor::GetLargestWindowSize(body) => assert_eq!(body.size, Coord::new(120, 40)),
        other => panic!("unexpected descriptor {other:?}"),
    }
}

#[test]
fn test_set_screen_buffer_info_round_trips() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 123, 456);

    let mut color_table = [0u32; 16];
    for (index, slot) in color_table.iter_mut().enumerate() {
        *slot = (index as u32) | ((index as u32 + 1) << 8) | ((index as u32 + 2) << 16);
    }
    let set = ScreenBufferInfoMsg {
        size: Coord::new(80, 25),
        cursor_position: Coord::new(3, 4),
        attributes: 0x1E,
        scroll_position: Coord::new(0, 0),
        current_window_size: Coord::new(79, 24),
        maximum_window_size: Coord::new(120, 40),
        popup_attributes: 0,
        fullscreen_supported: false,
        color_table,
    };
    let result = run(
        &mut state,
        &mut host,
        user_packet(
            26,
            info.process,
            info.output,
            ApiNumber::SetScreenBufferInfo,
            ApiDescriptor::ScreenBufferInfo(set),
        ),
    );
    assert_eq!(result.status, Status::Success);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            27,
            info.process,
            info.output,
            ApiNumber::GetScreenBufferInfo,
            ApiDescriptor::ScreenBufferInfo(ScreenBufferInfoMsg::default()),
        ),
    );
    assert_eq!(result.status, Status::Success);
    match result.descriptor() {
        ApiDescriptor::ScreenBufferInfo(body) => {
            assert_eq!(body.size, Coord::new(80, 25));
            assert_eq!(body.cursor_position, Coord::new(3, 4));
            assert_eq!(body.attributes, 0x1E);
            assert_eq!(body.scroll_position, Coord::new(0, 0));
            assert_eq!(body.current_window_size, Coord::new(79, 24));
            assert_eq!(body.color_table[0], color_table[0]);
            assert_eq!(body.color_table[15], color_table[15]);
        }
        other => panic!("unexpected descriptor {other:?}"),
    }
}

#[test]
fn test_set_window_info_relative_resizes_window() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 5009, 5010);

    let window_size = |state: &mut ServerState| {
        let mut host = NullHostIo;
        let result = run(
            state,
            &mut host,
            user_packet(
                102,
                info.process,
                info.output,
                ApiNumber::GetScreenBufferInfo,
                ApiDescriptor::ScreenBufferInfo(ScreenBufferInfoMsg::default()),
            ),
        );
        match result.descriptor() {
            ApiDescriptor::ScreenBufferInfo(body) => (body.current_window_size, body.scroll_position),
            other => panic!("unexpected descriptor {other:?}"),
        }
    };

    let (initial, _) = window_size(&mut state);
    assert!(initial.x > 1 && initial.y > 1);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            103,
            info.process,
            info.output,
            ApiNumber::SetWindowInfo,
            ApiDescriptor::SetWindowInfo(SetWindowInfoMsg {
                absolute: false,
                window: Rect::new(0, 0, -1, -1),
            }),
        ),
    );
    assert_eq!(result.status, Status::Success);
    let (after, _) = window_size(&mut state);
    assert_eq!(after, Coord::new(initial.x - 1, initial.y - 1));
}

#[test]
fn test_window_info_updates_scroll_position() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 5021, 5022);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            111,
            info.process,
            info.output,
            ApiNumber::SetWindowInfo,
            ApiDescriptor::SetWindowInfo(SetWindowInfoMsg {
                absolute: true,
                window: Rect::new(5, 6, 84, 30),
            }),
        ),
    );
    assert_eq!(result.status, Status::Success);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            112,
            info.process,
            info.output,
            ApiNumber::GetScreenBufferInfo,
            ApiDescriptor::ScreenBufferInfo(ScreenBufferInfoMsg::default()),
        ),
    );
    match result.descriptor() {
        ApiDescriptor::ScreenBufferInfo(body) => {
            assert_eq!(body.scroll_position, Coord::new(5, 6));
            assert_eq!(body.current_window_size, Coord::new(79, 24));
        }
        other => panic!("unexpected descriptor {other:?}"),
    }
}

#[test]
fn test_cursor_position_snaps_viewport() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 5023, 5024);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            113,
            info.process,
            info.output,
            ApiNumber::SetWindowInfo,
            ApiDescriptor::SetWindowInfo(SetWindowInfoMsg {
                absolute: true,
                window: Rect::new(0, 0, 9, 9),
            }),
        ),
    );
    assert_eq!(result.status, Status::Success);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            114,
            info.process,
            info.output,
            ApiNumber::SetCursorPosition,
            ApiDescriptor::SetCursorPosition(SetCursorPositionMsg {
                cursor_position: Coord::new(0, 15),
            }),
        ),
    );
    assert_eq!(result.status, Status::Success);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            115,
            info.process,
            info.output,
            ApiNumber::GetScreenBufferInfo,
            ApiDescriptor::ScreenBufferInfo(ScreenBufferInfoMsg::default()),
        ),
    );
    match result.descriptor() {
        ApiDescriptor::ScreenBufferInfo(body) => {
            assert_eq!(body.scroll_position, Coord::new(0, 6));
            assert_eq!(body.current_window_size, Coord::new(9, 9));
        }
        other => panic!("unexpected descriptor {other:?}"),
    }
}

#[test]
fn test_generate_ctrl_event_reaches_all_processes() {
    let mut state = ServerState::new();
    let mut host = MemoryHostIo::new();
    let info = connect_client(&mut state, &mut host, 101, 201);
    let _second = connect_client(&mut state, &mut host, 102, 202);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            50,
            info.process,
            info.input,
            ApiNumber::GenerateCtrlEvent,
            ApiDescriptor::CtrlEvent(CtrlEventMsg {
                ctrl_event: CTRL_C_EVENT,
                process_group_id: 0,
            }),
        ),
    );
    assert_eq!(result.status, Status::Success);

    let mut pids: Vec<u32> = host.end_tasks.iter().map(|&(pid, _, _)| pid).collect();
    pids.sort_unstable();
    assert_eq!(pids, vec![101, 102]);
}

#[test]
fn test_process_list_reports_required_size_and_orders_newest_first() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 101, 201);
    connect_client(&mut state, &mut host, 102, 202);
    connect_client(&mut state, &mut host, 103, 203);

    // Insufficient capacity: required count reported, nothing written.
    let packet = with_output_capacity(
        user_packet(
            93,
            info.process,
            info.output,
            ApiNumber::GetConsoleProcessList,
            ApiDescriptor::GetProcessList(GetProcessListMsg::default()),
        ),
        8,
    );
    let result = run(&mut state, &mut host, packet);
    assert_eq!(result.status, Status::Success);
    assert_eq!(result.information, 0);
    match result.descriptor() {
        ApiDescriptor::GetProcessList(body) => assert_eq!(body.process_count, 3),
        other => panic!("unexpected descriptor {other:?}"),
    }
    assert!(result.output.iter().all(|&byte| byte == 0));

    // Sufficient capacity: pids newest first.
    let packet = with_output_capacity(
        user_packet(
            94,
            info.process,
            info.output,
            ApiNumber::GetConsoleProcessList,
            ApiDescriptor::GetProcessList(GetProcessListMsg::default()),
        ),
        12,
    );
    let result = run(&mut state, &mut host, packet);
    assert_eq!(result.status, Status::Success);
    assert_eq!(result.information, 12);
    let pids: Vec<u32> = result.output[..12]
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    assert_eq!(pids, vec![103, 102, 101]);
}

#[test]
fn test_history_info_round_trips() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 8001, 8002);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            200,
            info.process,
            info.output,
            ApiNumber::GetHistory,
            ApiDescriptor::HistoryInfo(HistoryInfoMsg::default()),
        ),
    );
    assert_eq!(result.status, Status::Success);
    match result.descriptor() {
        ApiDescriptor::HistoryInfo(body) => {
            assert_eq!(body.history_buffer_size, 50);
            assert_eq!(body.number_of_history_buffers, 4);
            assert_eq!(body.flags, 0);
        }
        other => panic!("unexpected descriptor {other:?}"),
    }

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            201,
            info.process,
            info.output,
            ApiNumber::SetHistory,
            ApiDescriptor::HistoryInfo(HistoryInfoMsg {
                history_buffer_size: 123,
                number_of_history_buffers: 9,
                flags: 0x55AA,
            }),
        ),
    );
    assert_eq!(result.status, Status::Success);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            202,
            info.process,
            info.output,
            ApiNumber::GetHistory,
            ApiDescriptor::HistoryInfo(HistoryInfoMsg::default()),
        ),
    );
    match result.descriptor() {
        ApiDescriptor::HistoryInfo(body) => {
            assert_eq!(body.history_buffer_size, 123);
            assert_eq!(body.number_of_history_buffers, 9);
            assert_eq!(body.flags, 0x55AA);
        }
        other => panic!("unexpected descriptor {other:?}"),
    }
}

#[test]
fn test_command_history_apis_with_empty_history() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 8101, 8102);
    let exe = wide_bytes("cmd.exe");

    let mut comm = DummyComm::default();
    let packet = with_input_tail(
        user_packet(
            210,
            info.process,
            info.output,
            ApiNumber::GetCommandHistoryLength,
            ApiDescriptor::CommandHistoryLength(CommandHistoryLengthMsg {
                length: 0,
                unicode: true,
            }),
        ),
        &mut comm,
        &exe,
    );
    let result = run_with(&mut state, &mut comm, &mut host, packet);
    assert_eq!(result.status, Status::Success);
    match result.descriptor() {
        ApiDescriptor::CommandHistoryLength(body) => assert_eq!(body.length, 0),
        other => panic!("unexpected descriptor {other:?}"),
    }

    let mut comm = DummyComm::default();
    let packet = with_output_capacity(
        with_input_tail(
            user_packet(
                211,
                info.process,
                info.output,
                ApiNumber::GetCommandHistory,
                ApiDescriptor::GetCommandHistory(GetCommandHistoryMsg {
                    length: 0,
                    unicode: true,
                }),
            ),
            &mut comm,
            &exe,
        ),
        64,
    );
    let result = run_with(&mut state, &mut comm, &mut host, packet);
    assert_eq!(result.status, Status::Success);
    match result.descriptor() {
        ApiDescriptor::GetCommandHistory(body) => assert_eq!(body.length, 0),
        other => panic!("unexpected descriptor {other:?}"),
    }

    let mut comm = DummyComm::default();
    let packet = with_input_tail(
        user_packet(
            212,
            info.process,
            info.output,
            ApiNumber::SetNumberOfCommands,
            ApiDescriptor::SetNumberOfCommands(SetNumberOfCommandsMsg {
                num_commands: 10,
                unicode: true,
            }),
        ),
        &mut comm,
        &exe,
    );
    let result = run_with(&mut state, &mut comm, &mut host, packet);
    assert_eq!(result.status, Status::Success);

    let mut comm = DummyComm::default();
    let packet = with_input_tail(
        user_packet(
            213,
            info.process,
            info.output,
            ApiNumber::ExpungeCommandHistory,
            ApiDescriptor::ExpungeCommandHistory(ExpungeCommandHistoryMsg { unicode: true }),
        ),
        &mut comm,
        &exe,
    );
    let result = run_with(&mut state, &mut comm, &mut host, packet);
    assert_eq!(result.status, Status::Success);
}

#[test]
fn test_alias_round_trip_with_case_folding() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 9001, 9002);

    let source = wide_bytes("ll");
    let target = wide_bytes("ls -l");
    let exe = wide_bytes("CMD.EXE");
    let mut tail = Vec::new();
    tail.extend_from_slice(&source);
    tail.extend_from_slice(&target);
    tail.extend_from_slice(&exe);

    let mut comm = DummyComm::default();
    let packet = with_input_tail(
        user_packet(
            300,
            info.process,
            info.output,
            ApiNumber::AddAlias,
            ApiDescriptor::AddAlias(AddAliasMsg {
                source_length: source.len() as u16,
                target_length: target.len() as u16,
                exe_length: exe.len() as u16,
                unicode: true,
            }),
        ),
        &mut comm,
        &tail,
    );
    let result = run_with(&mut state, &mut comm, &mut host, packet);
    assert_eq!(result.status, Status::Success);

    // Lookup with different case on both the exe and the source.
    let lookup_source = wide_bytes("LL");
    let lookup_exe = wide_bytes("cmd.exe");
    let mut tail = Vec::new();
    tail.extend_from_slice(&lookup_source);
    tail.extend_from_slice(&lookup_exe);

    let mut comm = DummyComm::default();
    let packet = with_output_capacity(
        with_input_tail(
            user_packet(
                301,
                info.process,
                info.output,
                ApiNumber::GetAlias,
                ApiDescriptor::GetAlias(GetAliasMsg {
                    source_length: lookup_source.len() as u16,
                    target_length: 0,
                    exe_length: lookup_exe.len() as u16,
                    unicode: true,
                }),
            ),
            &mut comm,
            &tail,
        ),
        64,
    );
    let result = run_with(&mut state, &mut comm, &mut host, packet);
    assert_eq!(result.status, Status::Success);
    let expected = {
        let mut bytes = wide_bytes("ls -l");
        bytes.extend_from_slice(&[0, 0]);
        bytes
    };
    assert_eq!(&result.output[..expected.len()], expected.as_slice());

    // Enumeration lengths: "ll=ls -l" + NUL, in UTF-16 units.
    let mut comm = DummyComm::default();
    let packet = with_input_tail(
        user_packet(
            302,
            info.process,
            info.output,
            ApiNumber::GetAliasesLength,
            ApiDescriptor::AliasLength(AliasLengthMsg {
                length: 0,
                unicode: true,
            }),
        ),
        &mut comm,
        &wide_bytes("cmd.exe"),
    );
    let result = run_with(&mut state, &mut comm, &mut host, packet);
    match result.descriptor() {
        ApiDescriptor::AliasLength(body) => {
            assert_eq!(body.length, (2 + 1 + 5 + 1) * 2);
        }
        other => panic!("unexpected descriptor {other:?}"),
    }

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            303,
            info.process,
            info.output,
            ApiNumber::GetAliasExesLength,
            ApiDescriptor::AliasLength(AliasLengthMsg {
                length: 0,
                unicode: true,
            }),
        ),
    );
    match result.descriptor() {
        ApiDescriptor::AliasLength(body) => {
            assert_eq!(body.length, ("CMD.EXE".len() as u32 + 1) * 2);
        }
        other => panic!("unexpected descriptor {other:?}"),
    }
}

#[test]
fn test_title_round_trip_and_ansi_all_or_nothing() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 9101, 9102);

    let title = wide_bytes("cathode");
    let mut comm = DummyComm::default();
    let packet = with_input_tail(
        user_packet(
            310,
            info.process,
            info.output,
            ApiNumber::SetTitle,
            ApiDescriptor::Title(TitleMsg {
                title_length: 0,
                unicode: true,
                original: false,
            }),
        ),
        &mut comm,
        &title,
    );
    let result = run_with(&mut state, &mut comm, &mut host, packet);
    assert_eq!(result.status, Status::Success);

    // Unicode read.
    let packet = with_output_capacity(
        user_packet(
            311,
            info.process,
            info.output,
            ApiNumber::GetTitle,
            ApiDescriptor::Title(TitleMsg {
                title_length: 0,
                unicode: true,
                original: false,
            }),
        ),
        64,
    );
    let result = run(&mut state, &mut host, packet);
    assert_eq!(result.status, Status::Success);
    assert_eq!(&result.output[..title.len()], title.as_slice());
    match result.descriptor() {
        ApiDescriptor::Title(body) => assert_eq!(body.title_length, 7),
        other => panic!("unexpected descriptor {other:?}"),
    }

    // ANSI read with a too-small buffer: single NUL, information 1.
    let packet = with_output_capacity(
        user_packet(
            312,
            info.process,
            info.output,
            ApiNumber::GetTitle,
            ApiDescriptor::Title(TitleMsg {
                title_length: 0,
                unicode: false,
                original: false,
            }),
        ),
        4,
    );
    let result = run(&mut state, &mut host, packet);
    assert_eq!(result.status, Status::Success);
    assert_eq!(result.information, 1);
    assert_eq!(result.output[0], 0);
    match result.descriptor() {
        ApiDescriptor::Title(body) => assert_eq!(body.title_length, 0),
        other => panic!("unexpected descriptor {other:?}"),
    }

    // ANSI read with room: full title plus NUL.
    let packet = with_output_capacity(
        user_packet(
            313,
            info.process,
            info.output,
            ApiNumber::GetTitle,
            ApiDescriptor::Title(TitleMsg {
                title_length: 0,
                unicode: false,
                original: false,
            }),
        ),
        32,
    );
    let result = run(&mut state, &mut host, packet);
    assert_eq!(result.status, Status::Success);
    assert_eq!(&result.output[..8], b"cathode\0");
}

#[test]
fn test_font_apis_round_trip() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 5007, 5008);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            96,
            info.process,
            info.output,
            ApiNumber::GetNumberOfFonts,
            ApiDescriptor::GetNumberOfFonts(GetNumberOfFontsMsg::default()),
        ),
    );
    assert_eq!(result.status, Status::Success);
    match result.descriptor() {
        ApiDescriptor::GetNumberOfFonts(body) => assert_eq!(body.number_of_fonts, 1),
        other => panic!("unexpected descriptor {other:?}"),
    }

    let packet = with_output_capacity(
        user_packet(
            97,
            info.process,
            info.output,
            ApiNumber::GetFontInfo,
            ApiDescriptor::GetFontInfo(GetFontInfoMsg::default()),
        ),
        FONT_INFO_SIZE as u32,
    );
    let result = run(&mut state, &mut host, packet);
    assert_eq!(result.status, Status::Success);
    assert_eq!(result.information, FONT_INFO_SIZE as u64);
    let font_index = u32::from_le_bytes([
        result.output[0],
        result.output[1],
        result.output[2],
        result.output[3],
    ]);
    assert_eq!(font_index, 0);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            98,
            info.process,
            info.output,
            ApiNumber::GetCurrentFont,
            ApiDescriptor::CurrentFont(CurrentFontMsg::default()),
        ),
    );
    assert_eq!(result.status, Status::Success);
    let initial = match result.descriptor() {
        ApiDescriptor::CurrentFont(body) => *body,
        other => panic!("unexpected descriptor {other:?}"),
    };
    assert_eq!(initial.font_index, 0);
    assert_eq!(initial.font_size, Coord::new(8, 16));
    let face: String = char::decode_utf16(initial.face_name.iter().copied().take_while(|&u| u != 0))
        .map(|c| c.unwrap())
        .collect();
    assert_eq!(face, "Consolas");

    let mut set = CurrentFontMsg {
        maximum_window: false,
        font_index: 0,
        font_size: Coord::new(9, 18),
        font_family: 0x30,
        font_weight: 700,
        face_name: [0; LF_FACESIZE],
    };
    for (slot, unit) in set.face_name.iter_mut().zip("TestFace".encode_utf16()) {
        *slot = unit;
    }
    let result = run(
        &mut state,
        &mut host,
        user_packet(
            99,
            info.process,
            info.output,
            ApiNumber::SetCurrentFont,
            ApiDescriptor::CurrentFont(set),
        ),
    );
    assert_eq!(result.status, Status::Success);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            100,
            info.process,
            info.output,
            ApiNumber::GetCurrentFont,
            ApiDescriptor::CurrentFont(CurrentFontMsg::default()),
        ),
    );
    let after = match result.descriptor() {
        ApiDescriptor::CurrentFont(body) => *body,
        other => panic!("unexpected descriptor {other:?}"),
    };
    assert_eq!(after.font_size, Coord::new(9, 18));
    assert_eq!(after.font_weight, 700);
    let face: String = char::decode_utf16(after.face_name.iter().copied().take_while(|&u| u != 0))
        .map(|c| c.unwrap())
        .collect();
    assert_eq!(face, "TestFace");
}

#[test]
fn test_display_mode_and_window_stubs() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 5003, 5004);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            95,
            info.process,
            info.output,
            ApiNumber::GetDisplayMode,
            ApiDescriptor::GetDisplayMode(GetDisplayModeMsg { mode_flags: 99 }),
        ),
    );
    assert_eq!(result.status, Status::Success);
    match result.descriptor() {
        ApiDescriptor::GetDisplayMode(body) => assert_eq!(body.mode_flags, 0),
        other => panic!("unexpected descriptor {other:?}"),
    }

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            101,
            info.process,
            info.output,
            ApiNumber::SetDisplayMode,
            ApiDescriptor::SetDisplayMode(SetDisplayModeMsg::default()),
        ),
    );
    assert_eq!(result.status, Status::Success);
    match result.descriptor() {
        ApiDescriptor::SetDisplayMode(body) => {
            assert_eq!(body.screen_buffer_dimensions, Coord::new(120, 40));
        }
        other => panic!("unexpected descriptor {other:?}"),
    }

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            90,
            info.process,
            info.output,
            ApiNumber::GetConsoleWindow,
            ApiDescriptor::GetConsoleWindow(GetConsoleWindowMsg { hwnd: 42 }),
        ),
    );
    assert_eq!(result.status, Status::Success);
    match result.descriptor() {
        ApiDescriptor::GetConsoleWindow(body) => assert_eq!(body.hwnd, 0),
        other => panic!("unexpected descriptor {other:?}"),
    }
}

#[test]
fn test_keyboard_layout_name_is_hex() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 5005, 5006);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            96,
            info.process,
            info.output,
            ApiNumber::GetKeyboardLayoutName,
            ApiDescriptor::KeyboardLayoutName(KeyboardLayoutNameMsg::default()),
        ),
    );
    assert_eq!(result.status, Status::Success);
    match result.descriptor() {
        ApiDescriptor::KeyboardLayoutName(body) => {
            assert_eq!(body.layout_wide[8], 0);
            for unit in &body.layout_wide[..8] {
                let ch = char::from_u32(u32::from(*unit)).unwrap();
                assert!(ch.is_ascii_hexdigit());
            }
        }
        other => panic!("unexpected descriptor {other:?}"),
    }

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            97,
            info.process,
            info.output,
            ApiNumber::GetKeyboardLayoutName,
            ApiDescriptor::KeyboardLayoutName(KeyboardLayoutNameMsg {
                ansi: true,
                ..KeyboardLayoutNameMsg::default()
            }),
        ),
    );
    match result.descriptor() {
        ApiDescriptor::KeyboardLayoutName(body) => {
            assert_eq!(body.layout_ansi[8], 0);
            for byte in &body.layout_ansi[..8] {
                assert!(byte.is_ascii_hexdigit());
            }
        }
        other => panic!("unexpected descriptor {other:?}"),
    }
}

#[test]
fn test_selection_mouse_char_type_and_misc_stubs() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 5015, 5016);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            92,
            info.process,
            info.output,
            ApiNumber::GetSelectionInfo,
            ApiDescriptor::GetSelectionInfo(GetSelectionInfoMsg::default()),
        ),
    );
    assert_eq!(result.status, Status::Success);
    match result.descriptor() {
        ApiDescriptor::GetSelectionInfo(body) => {
            assert_eq!(body.selection_info, SelectionInfo::default());
        }
        other => panic!("unexpected descriptor {other:?}"),
    }

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            91,
            info.process,
            info.output,
            ApiNumber::GetMouseInfo,
            ApiDescriptor::GetMouseInfo(GetMouseInfoMsg::default()),
        ),
    );
    assert_eq!(result.status, Status::Success);
    match result.descriptor() {
        ApiDescriptor::GetMouseInfo(body) => assert!(body.num_buttons > 0),
        other => panic!("unexpected descriptor {other:?}"),
    }

    // In-range coordinate: SBCS. Out-of-range: invalid parameter.
    let result = run(
        &mut state,
        &mut host,
        user_packet(
            109,
            info.process,
            info.output,
            ApiNumber::CharType,
            ApiDescriptor::CharType(CharTypeMsg {
                coord_check: Coord::new(0, 0),
                char_type: 99,
            }),
        ),
    );
    assert_eq!(result.status, Status::Success);
    match result.descriptor() {
        ApiDescriptor::CharType(body) => assert_eq!(body.char_type, CHAR_TYPE_SBCS),
        other => panic!("unexpected descriptor {other:?}"),
    }

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            110,
            info.process,
            info.output,
            ApiNumber::CharType,
            ApiDescriptor::CharType(CharTypeMsg {
                coord_check: Coord::new(30000, 30000),
                char_type: 0,
            }),
        ),
    );
    assert_eq!(result.status, Status::InvalidParameter);

    // Compatibility setters succeed without doing anything observable.
    for (id, api, descriptor) in [
        (
            111,
            ApiNumber::SetKeyShortcuts,
            ApiDescriptor::SetKeyShortcuts(SetKeyShortcutsMsg {
                set: true,
                reserve_keys: 0,
            }),
        ),
        (
            112,
            ApiNumber::SetMenuClose,
            ApiDescriptor::SetMenuClose(SetMenuCloseMsg { enable: true }),
        ),
        (
            113,
            ApiNumber::SetLocalEudc,
            ApiDescriptor::SetLocalEudc(SetLocalEudcMsg {
                code_point: 0,
                font_size: Coord::new(8, 16),
            }),
        ),
        (
            114,
            ApiNumber::RegisterOs2,
            ApiDescriptor::RegisterOs2(RegisterOs2Msg { os2_register: true }),
        ),
        (
            115,
            ApiNumber::SetOs2OemFormat,
            ApiDescriptor::SetOs2OemFormat(SetOs2OemFormatMsg {
                os2_oem_format: true,
            }),
        ),
    ] {
        let result = run(
            &mut state,
            &mut host,
            user_packet(id, info.process, info.output, api, descriptor),
        );
        assert_eq!(result.status, Status::Success, "api {api:?}");
    }
}

#[test]
fn test_cursor_and_nls_mode_round_trips() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 5011, 5012);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            105,
            info.process,
            info.output,
            ApiNumber::SetCursorMode,
            ApiDescriptor::CursorMode(CursorModeMsg {
                blink: false,
                db_enable: true,
            }),
        ),
    );
    assert_eq!(result.status, Status::Success);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            106,
            info.process,
            info.output,
            ApiNumber::GetCursorMode,
            ApiDescriptor::CursorMode(CursorModeMsg::default()),
        ),
    );
    match result.descriptor() {
        ApiDescriptor::CursorMode(body) => {
            assert!(!body.blink);
            assert!(body.db_enable);
        }
        other => panic!("unexpected descriptor {other:?}"),
    }

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            107,
            info.process,
            info.output,
            ApiNumber::SetNlsMode,
            ApiDescriptor::NlsMode(NlsModeMsg {
                ready: false,
                nls_mode: 42,
            }),
        ),
    );
    assert_eq!(result.status, Status::Success);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            108,
            info.process,
            info.output,
            ApiNumber::GetNlsMode,
            ApiDescriptor::NlsMode(NlsModeMsg::default()),
        ),
    );
    match result.descriptor() {
        ApiDescriptor::NlsMode(body) => {
            assert!(body.ready);
            assert_eq!(body.nls_mode, 42);
        }
        other => panic!("unexpected descriptor {other:?}"),
    }
}

#[test]
fn test_refused_apis_reply_not_implemented_with_zeroed_descriptor() {
    let mut state = ServerState::new();
    let mut host = NullHostIo;
    let info = connect_client(&mut state, &mut host, 6001, 6002);

    let result = run(
        &mut state,
        &mut host,
        user_packet(
            120,
            info.process,
            info.output,
            ApiNumber::MapBitmap,
            ApiDescriptor::Unknown(vec![0xAB; 12]),
        ),
    );
    assert_eq!(result.status, Status::NotImplemented);
    match result.descriptor() {
        ApiDescriptor::Unknown(bytes) => assert!(bytes.iter().all(|&byte| byte == 0)),
        other => panic!("unexpected descriptor {other:?}"),
    }

    // Completely unknown API numbers get the same deterministic reply.
    let mut packet = user_packet(
        121,
        info.process,
        info.output,
        ApiNumber::MapBitmap,
        ApiDescriptor::Unknown(vec![0xCD; 8]),
    );
    if let Some(user) = packet.user_defined_mut() {
        user.header.api_number = 0x0700_0001;
    }
    let result = run(&mut state, &mut host, packet);
    assert_eq!(result.status, Status::NotImplemented);
    match result.descriptor() {
        ApiDescriptor::Unknown(bytes) => assert!(bytes.iter().all(|&byte| byte == 0)),
        other => panic!("unexpected descriptor {other:?}"),
    }
}
