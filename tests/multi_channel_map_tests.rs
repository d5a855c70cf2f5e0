use multisdr::error::AggregateError;
use multisdr::hal::mock::{MockDevice, MockProbe};
use multisdr::hal::{Device, Direction, FactoryLock, Kwargs};
use multisdr::multi::{ChannelMap, ChannelMapEntry};
use std::sync::Arc;

fn mock(rx: usize, tx: usize) -> Box<dyn Device> {
    let args: Kwargs = [
        ("rx_channels".to_string(), rx.to_string()),
        ("tx_channels".to_string(), tx.to_string()),
    ]
    .into();
    Box::new(MockDevice::from_args(&args, Arc::new(MockProbe::new()), FactoryLock::new()).unwrap())
}

#[test]
fn test_resolve_concatenates_devices() {
    let map = ChannelMap::from_counts(&[2, 3], &[]);

    assert_eq!(
        map.resolve(Direction::Input, 0).unwrap(),
        ChannelMapEntry { local: 0, device: 0 }
    );
    assert_eq!(
        map.resolve(Direction::Input, 2).unwrap(),
        ChannelMapEntry { local: 0, device: 1 }
    );
    assert_eq!(
        map.resolve(Direction::Input, 4).unwrap(),
        ChannelMapEntry { local: 2, device: 1 }
    );

    let err = map.resolve(Direction::Input, 5).unwrap_err();
    assert_eq!(
        err.downcast_ref::<AggregateError>(),
        Some(&AggregateError::IndexOutOfRange {
            what: "channel",
            index: 5,
            len: 5
        })
    );
}

#[test]
fn test_directions_are_independent() {
    let map = ChannelMap::from_counts(&[2, 3], &[1, 1]);
    assert_eq!(map.len(Direction::Input), 5);
    assert_eq!(map.len(Direction::Output), 2);
    assert_eq!(
        map.resolve(Direction::Output, 1).unwrap(),
        ChannelMapEntry { local: 0, device: 1 }
    );
}

#[test]
fn test_rebuild_reads_device_channel_counts() {
    let devices = vec![mock(2, 1), mock(3, 2)];
    let map = ChannelMap::rebuild(&devices);
    assert_eq!(map, ChannelMap::from_counts(&[2, 3], &[1, 2]));

    let locals: Vec<usize> = map.entries_for(Direction::Output).iter().map(|e| e.local).collect();
    assert_eq!(locals, vec![0, 0, 1]);
}

#[test]
fn test_rebuild_follows_topology_changes() {
    let devices = vec![mock(2, 2), mock(2, 2)];
    devices[0]
        .set_frontend_mapping(Direction::Input, "RX1")
        .unwrap();

    let map = ChannelMap::rebuild(&devices);
    assert_eq!(map.len(Direction::Input), 3);
    assert_eq!(
        map.resolve(Direction::Input, 1).unwrap(),
        ChannelMapEntry { local: 0, device: 1 }
    );
}
