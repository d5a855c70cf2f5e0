use multisdr::error::{stream_code, AggregateError, StreamCode};
use multisdr::hal::mock::{MockDriver, MockProbe, TxCapture};
use multisdr::hal::{Device, Direction, HardwareRegistry, Kwargs, StreamFlags, StreamHandle};
use multisdr::multi::{ChannelGroup, MultiDevice};
use std::sync::Arc;
use std::time::Duration;

fn kwargs(pairs: &[(&str, &str)]) -> Kwargs {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn setup() -> (HardwareRegistry, Arc<MockProbe>) {
    let driver = MockDriver::new();
    let probe = driver.probe();
    let mut registry = HardwareRegistry::new();
    registry.register(driver);
    (registry, probe)
}

/// "A" with 2 rx channels and "B" with 3, both with 2 tx channels
fn aggregate(registry: &HardwareRegistry, extra: &[(&str, &str)]) -> MultiDevice {
    let mut args = kwargs(&[
        ("multi:driver", "mock"),
        ("serial[0]", "A"),
        ("serial[1]", "B"),
        ("rx_channels[1]", "3"),
        ("fill[1]", "16"),
    ]);
    args.extend(kwargs(extra));
    MultiDevice::from_args(&args, registry).unwrap()
}

fn open_all(device: &MultiDevice, direction: Direction) -> StreamHandle {
    let channels: Vec<usize> = (0..device.num_channels(direction)).collect();
    device
        .setup_stream(direction, "CS16", &channels, &Kwargs::new())
        .unwrap()
}

fn aggregate_error(err: &anyhow::Error) -> Option<&AggregateError> {
    err.downcast_ref::<AggregateError>()
}

#[test]
fn test_open_groups_channels_by_device() {
    let (registry, probe) = setup();
    let device = aggregate(&registry, &[]);

    let stream = open_all(&device, Direction::Input);
    assert_eq!(
        device.stream_groups(&stream).unwrap(),
        vec![
            ChannelGroup {
                device: 0,
                channels: vec![0, 1]
            },
            ChannelGroup {
                device: 1,
                channels: vec![0, 1, 2]
            },
        ]
    );
    assert_eq!(
        probe.events_for("setup"),
        vec!["A:setup input CS16 [0, 1]", "B:setup input CS16 [0, 1, 2]"]
    );
    assert_eq!(device.open_streams(), 1);

    device.close_stream(stream);
    assert_eq!(probe.events_for("close"), vec!["A:close 0", "B:close 0"]);
    assert_eq!(device.open_streams(), 0);
}

#[test]
fn test_open_keeps_request_order() {
    let (registry, _probe) = setup();
    let device = aggregate(&registry, &[]);

    let stream = device
        .setup_stream(Direction::Input, "CS16", &[3, 0, 4], &Kwargs::new())
        .unwrap();
    let groups = device.stream_groups(&stream).unwrap();
    assert_eq!(groups.len(), 3);
    assert_eq!(groups[0], ChannelGroup { device: 1, channels: vec![1] });
    assert_eq!(groups[1], ChannelGroup { device: 0, channels: vec![0] });
    assert_eq!(groups[2], ChannelGroup { device: 1, channels: vec![2] });
    device.close_stream(stream);
}

#[test]
fn test_empty_channel_list_opens_channel_zero() {
    let (registry, probe) = setup();
    let device = aggregate(&registry, &[]);

    let stream = device
        .setup_stream(Direction::Output, "CF32", &[], &Kwargs::new())
        .unwrap();
    assert_eq!(
        device.stream_groups(&stream).unwrap(),
        vec![ChannelGroup { device: 0, channels: vec![0] }]
    );
    assert_eq!(probe.events_for("setup"), vec!["A:setup output CF32 [0]"]);
    device.close_stream(stream);
}

#[test]
fn test_failed_open_closes_opened_sub_streams() {
    let (registry, probe) = setup();
    let device = aggregate(&registry, &[("setup_error[1]", "")]);

    let err = device
        .setup_stream(Direction::Input, "CS16", &[0, 2], &Kwargs::new())
        .unwrap_err();
    assert!(err.to_string().contains("cannot open a stream"));
    assert_eq!(probe.events_for("close"), vec!["A:close 0"]);
    assert_eq!(device.open_streams(), 0);
}

#[test]
fn test_open_rejects_unknown_channel() {
    let (registry, probe) = setup();
    let device = aggregate(&registry, &[]);

    let err = device
        .setup_stream(Direction::Output, "CS16", &[0, 4], &Kwargs::new())
        .unwrap_err();
    assert!(matches!(
        aggregate_error(&err),
        Some(AggregateError::IndexOutOfRange { index: 4, len: 4, .. })
    ));
    assert!(probe.events_for("setup").is_empty());
}

#[test]
fn test_activate_stops_at_first_failure() {
    let (registry, probe) = setup();
    let device = aggregate(
        &registry,
        &[("serial[2]", "C"), ("activate_error[1]", "overflow")],
    );

    let stream = open_all(&device, Direction::Input);
    assert_eq!(device.stream_groups(&stream).unwrap().len(), 3);

    let err = device
        .activate_stream(&stream, StreamFlags::empty(), 0, 0)
        .unwrap_err();
    assert_eq!(stream_code(&err), Some(StreamCode::Overflow));
    assert_eq!(probe.events_for("activate"), vec!["A:activate", "B:activate"]);
    device.close_stream(stream);
}

#[test]
fn test_deactivate_stops_at_first_failure() {
    let (registry, probe) = setup();
    let device = aggregate(&registry, &[("deactivate_error[0]", "timeout")]);

    let stream = open_all(&device, Direction::Input);
    device.activate_stream(&stream, StreamFlags::empty(), 0, 0).unwrap();

    let err = device
        .deactivate_stream(&stream, StreamFlags::empty(), 0)
        .unwrap_err();
    assert_eq!(stream_code(&err), Some(StreamCode::Timeout));
    assert_eq!(probe.events_for("deactivate"), vec!["A:deactivate"]);
    device.close_stream(stream);
}

#[test]
fn test_read_fills_each_groups_buffers() {
    let (registry, _probe) = setup();
    let device = aggregate(&registry, &[]);
    let stream = open_all(&device, Direction::Input);
    device.activate_stream(&stream, StreamFlags::empty(), 0, 0).unwrap();

    let mut storage = vec![vec![0xFFu8; 8 * 4]; 5];
    let mut buffs: Vec<&mut [u8]> = storage.iter_mut().map(Vec::as_mut_slice).collect();
    let result = device
        .read_stream(&stream, &mut buffs, 8, StreamFlags::empty(), 1000)
        .unwrap();

    assert_eq!(result.elems, 8);
    let markers: Vec<u8> = storage.iter().map(|b| b[0]).collect();
    assert_eq!(markers, vec![0, 1, 16, 17, 18]);
    assert!(storage.iter().all(|b| b.iter().all(|&x| x == b[0])));
    device.close_stream(stream);
}

#[test]
fn test_read_result_comes_from_first_and_last_groups() {
    let (registry, probe) = setup();
    let device = aggregate(
        &registry,
        &[
            ("time_ns[0]", "100"),
            ("time_ns[1]", "200"),
            ("read_flags[1]", "64"),
            ("read_elems[1]", "5"),
        ],
    );
    let stream = open_all(&device, Direction::Input);
    device.activate_stream(&stream, StreamFlags::empty(), 0, 0).unwrap();

    let mut storage = vec![vec![0u8; 8 * 4]; 5];
    let mut buffs: Vec<&mut [u8]> = storage.iter_mut().map(Vec::as_mut_slice).collect();
    let result = device
        .read_stream(&stream, &mut buffs, 8, StreamFlags::END_BURST, 1000)
        .unwrap();

    assert_eq!(result.elems, 5);
    assert_eq!(result.time_ns, 100);
    assert_eq!(result.flags, StreamFlags::END_BURST | StreamFlags::HAS_TIME);

    // every group sees the caller's flags, not the previous group's output
    assert_eq!(
        probe.events_for("read"),
        vec!["A:read flags=2", "B:read flags=2"]
    );
    device.close_stream(stream);
}

#[test]
fn test_read_stops_on_empty_group() {
    let (registry, probe) = setup();
    let device = aggregate(&registry, &[("read_elems[0]", "0")]);
    let stream = open_all(&device, Direction::Input);
    device.activate_stream(&stream, StreamFlags::empty(), 0, 0).unwrap();

    let mut storage = vec![vec![0u8; 16]; 5];
    let mut buffs: Vec<&mut [u8]> = storage.iter_mut().map(Vec::as_mut_slice).collect();
    let result = device
        .read_stream(&stream, &mut buffs, 4, StreamFlags::empty(), 1000)
        .unwrap();

    assert_eq!(result.elems, 0);
    assert_eq!(probe.events_for("read"), vec!["A:read flags=0"]);
    device.close_stream(stream);
}

#[test]
fn test_read_error_is_forwarded_unchanged() {
    let (registry, probe) = setup();
    let device = aggregate(&registry, &[("read_error[0]", "overflow")]);
    let stream = open_all(&device, Direction::Input);
    device.activate_stream(&stream, StreamFlags::empty(), 0, 0).unwrap();

    let mut storage = vec![vec![0u8; 16]; 5];
    let mut buffs: Vec<&mut [u8]> = storage.iter_mut().map(Vec::as_mut_slice).collect();
    let err = device
        .read_stream(&stream, &mut buffs, 4, StreamFlags::empty(), 1000)
        .unwrap_err();

    assert_eq!(stream_code(&err), Some(StreamCode::Overflow));
    assert_eq!(probe.events_for("read").len(), 1);
    device.close_stream(stream);
}

#[test]
fn test_read_needs_a_buffer_per_channel() {
    let (registry, _probe) = setup();
    let device = aggregate(&registry, &[]);
    let stream = open_all(&device, Direction::Input);

    let mut storage = vec![vec![0u8; 16]; 4];
    let mut buffs: Vec<&mut [u8]> = storage.iter_mut().map(Vec::as_mut_slice).collect();
    let err = device
        .read_stream(&stream, &mut buffs, 4, StreamFlags::empty(), 1000)
        .unwrap_err();
    assert_eq!(
        aggregate_error(&err),
        Some(&AggregateError::ChannelCountMismatch {
            expected: 5,
            actual: 4
        })
    );
    device.close_stream(stream);
}

#[test]
fn test_write_sends_each_groups_buffers() {
    let (registry, probe) = setup();
    let device = aggregate(&registry, &[("write_elems[1]", "2")]);
    let stream = open_all(&device, Direction::Output);
    device.activate_stream(&stream, StreamFlags::empty(), 0, 0).unwrap();

    let storage: Vec<Vec<u8>> = (0..4u8).map(|ch| vec![ch; 4 * 4]).collect();
    let buffs: Vec<&[u8]> = storage.iter().map(Vec::as_slice).collect();
    let result = device
        .write_stream(&stream, &buffs, 4, StreamFlags::END_BURST, 0, 1000)
        .unwrap();

    assert_eq!(result.elems, 2);
    assert_eq!(result.flags, StreamFlags::END_BURST);
    assert_eq!(
        probe.tx_captures(),
        vec![
            TxCapture { serial: "A".into(), channel: 0, data: vec![0; 16] },
            TxCapture { serial: "A".into(), channel: 1, data: vec![1; 16] },
            TxCapture { serial: "B".into(), channel: 0, data: vec![2; 8] },
            TxCapture { serial: "B".into(), channel: 1, data: vec![3; 8] },
        ]
    );
    device.close_stream(stream);
}

#[test]
fn test_write_error_stops_fan_out() {
    let (registry, probe) = setup();
    let device = aggregate(&registry, &[("write_error[0]", "underflow")]);
    let stream = open_all(&device, Direction::Output);
    device.activate_stream(&stream, StreamFlags::empty(), 0, 0).unwrap();

    let storage = vec![vec![0u8; 16]; 4];
    let buffs: Vec<&[u8]> = storage.iter().map(Vec::as_slice).collect();
    let err = device
        .write_stream(&stream, &buffs, 4, StreamFlags::empty(), 0, 1000)
        .unwrap_err();

    assert_eq!(stream_code(&err), Some(StreamCode::Underflow));
    assert!(probe.tx_captures().is_empty());
    assert_eq!(probe.events_for("write"), vec!["A:write flags=0"]);
    device.close_stream(stream);
}

#[test]
fn test_status_mask_is_shifted_to_global_channels() {
    let (registry, _probe) = setup();
    let device = aggregate(
        &registry,
        &[
            ("status_error[0]", "timeout"),
            ("status_mask[0]", "1"),
            ("status_mask[1]", "2"),
        ],
    );
    let stream = open_all(&device, Direction::Input);

    let mut mask = 0u64;
    let event = device.read_stream_status(&stream, &mut mask, 1000).unwrap();
    assert_eq!(mask, 0b1001);
    assert!(event.flags.contains(StreamFlags::END_BURST));
    device.close_stream(stream);
}

#[test]
fn test_status_returns_first_report() {
    let (registry, probe) = setup();
    let device = aggregate(&registry, &[("status_mask[0]", "2"), ("time_ns[0]", "7")]);
    let stream = open_all(&device, Direction::Input);

    let mut mask = 0u64;
    let event = device.read_stream_status(&stream, &mut mask, 1000).unwrap();
    assert_eq!(mask, 0b10);
    assert_eq!(event.time_ns, 7);
    assert_eq!(probe.events_for("status"), vec!["A:status"]);
    device.close_stream(stream);
}

#[test]
fn test_status_without_report_returns_last_error() {
    let (registry, _probe) = setup();
    let device = aggregate(
        &registry,
        &[("status_error[0]", "timeout"), ("status_error[1]", "time_error")],
    );
    let stream = open_all(&device, Direction::Input);

    let mut mask = 0u64;
    let err = device.read_stream_status(&stream, &mut mask, 1000).unwrap_err();
    assert_eq!(stream_code(&err), Some(StreamCode::TimeError));
    assert_eq!(mask, 0);
    device.close_stream(stream);
}

#[test]
fn test_mtu_is_smallest_of_groups() {
    let (registry, _probe) = setup();
    let device = aggregate(&registry, &[("mtu[0]", "512"), ("mtu[1]", "256")]);
    let stream = open_all(&device, Direction::Input);
    assert_eq!(device.stream_mtu(&stream).unwrap(), 256);
    device.close_stream(stream);
}

#[test]
fn test_direct_access_on_single_device_stream() {
    let (registry, probe) = setup();
    let device = aggregate(&registry, &[("mtu[1]", "64")]);

    let stream = device
        .setup_stream(Direction::Input, "CS16", &[2, 3], &Kwargs::new())
        .unwrap();
    assert_eq!(device.num_direct_access_buffers(&stream).unwrap(), 2);
    assert_eq!(device.direct_access_buffer_addrs(&stream, 1).unwrap().len(), 2);

    let buffer = device.acquire_read_buffer(&stream, 1000).unwrap();
    assert_eq!(buffer.handle, 0);
    assert_eq!(buffer.elems, 64);
    device.release_read_buffer(&stream, buffer.handle);
    assert_eq!(probe.events_for("release_read"), vec!["B:release_read 0"]);
    device.close_stream(stream);
}

#[test]
fn test_direct_access_across_devices_is_unsupported() {
    let (registry, _probe) = setup();
    let device = aggregate(&registry, &[]);
    let stream = open_all(&device, Direction::Output);

    let err = device.acquire_write_buffer(&stream, 1000).unwrap_err();
    assert_eq!(
        aggregate_error(&err),
        Some(&AggregateError::UnsupportedMultiDevice { groups: 2 })
    );
    let err = device.num_direct_access_buffers(&stream).unwrap_err();
    assert!(aggregate_error(&err).is_some());
    device.close_stream(stream);
}

#[test]
fn test_unknown_stream_handle() {
    let (registry, _probe) = setup();
    let device = aggregate(&registry, &[]);

    let err = device
        .activate_stream(&StreamHandle::new(42), StreamFlags::empty(), 0, 0)
        .unwrap_err();
    assert_eq!(aggregate_error(&err), Some(&AggregateError::UnknownStream(42)));
}

#[test]
fn test_streams_survive_channel_map_rebuild() {
    let (registry, probe) = setup();
    let device = aggregate(&registry, &[]);
    let stream = device
        .setup_stream(Direction::Input, "CS16", &[2], &Kwargs::new())
        .unwrap();

    device
        .set_frontend_mapping(Direction::Input, "RX0, RX2")
        .unwrap();
    assert_eq!(device.num_channels(Direction::Input), 2);

    // resolved at open time, not re-resolved after the rebuild
    assert_eq!(
        device.stream_groups(&stream).unwrap(),
        vec![ChannelGroup { device: 1, channels: vec![0] }]
    );
    device.activate_stream(&stream, StreamFlags::empty(), 0, 0).unwrap();
    assert_eq!(probe.events_for("activate"), vec!["B:activate"]);
    device.close_stream(stream);
}

#[test]
fn test_open_and_close_do_not_wait_for_reads() {
    let (registry, probe) = setup();
    let device = aggregate(&registry, &[("read_delay_ms[0]", "2000")]);
    let stream = device
        .setup_stream(Direction::Input, "CS16", &[0], &Kwargs::new())
        .unwrap();
    device.activate_stream(&stream, StreamFlags::empty(), 0, 0).unwrap();

    std::thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let mut storage = vec![0u8; 16];
            let mut buffs: Vec<&mut [u8]> = vec![storage.as_mut_slice()];
            device.read_stream(&stream, &mut buffs, 4, StreamFlags::empty(), 1000)
        });

        while probe.events_for("read").is_empty() {
            std::thread::sleep(Duration::from_millis(1));
        }

        // device B's only stream, opened and closed while A is mid-read
        let other = device
            .setup_stream(Direction::Input, "CS16", &[2], &Kwargs::new())
            .unwrap();
        device.close_stream(other);
        assert!(!reader.is_finished());

        assert_eq!(reader.join().unwrap().unwrap().elems, 4);
    });
    device.close_stream(stream);
}

#[test]
fn test_teardown_closes_streams_then_releases_devices() {
    let (registry, probe) = setup();
    let device = aggregate(&registry, &[]);
    let _stream = open_all(&device, Direction::Input);

    drop(device);
    let teardown: Vec<String> = probe
        .events()
        .into_iter()
        .filter(|e| e.contains(":close") || e.contains(":unmake"))
        .collect();
    assert_eq!(teardown, vec!["A:close 0", "B:close 0", "A:unmake", "B:unmake"]);
    assert_eq!(probe.unlocked_lifecycle_calls(), 0);
}
