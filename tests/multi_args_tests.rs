use multisdr::error::AggregateError;
use multisdr::hal::Kwargs;
use multisdr::multi::{max_index, translate, GUARD_KEY, MAX_DEVICES};

fn kwargs(pairs: &[(&str, &str)]) -> Kwargs {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_translate_splits_per_device() {
    let args = kwargs(&[
        ("a", "1"),
        ("b[0]", "x"),
        ("b[1]", "y"),
        ("multi:c", "z"),
        ("driver", "d"),
    ]);

    let translated = translate(&args).unwrap();
    assert_eq!(translated.len(), 2);
    assert_eq!(
        translated[0],
        kwargs(&[("a", "1"), ("c", "z"), ("b", "x"), (GUARD_KEY, "")])
    );
    assert_eq!(
        translated[1],
        kwargs(&[("a", "1"), ("c", "z"), ("b", "y"), (GUARD_KEY, "")])
    );
}

#[test]
fn test_no_indexed_keys_means_no_aggregate() {
    let args = kwargs(&[("a", "1"), ("multi:c", "z")]);
    assert_eq!(max_index(&args), None);
    assert!(translate(&args).unwrap().is_empty());
}

#[test]
fn test_gaps_still_produce_every_device() {
    let args = kwargs(&[("serial[2]", "C")]);
    let translated = translate(&args).unwrap();
    assert_eq!(translated.len(), 3);
    assert_eq!(translated[0], kwargs(&[(GUARD_KEY, "")]));
    assert_eq!(translated[2]["serial"], "C");
}

#[test]
fn test_guard_key_is_rejected() {
    let args = kwargs(&[("serial[0]", "A"), (GUARD_KEY, "")]);
    let err = translate(&args).unwrap_err();
    assert_eq!(
        err.downcast_ref::<AggregateError>(),
        Some(&AggregateError::Recursion(GUARD_KEY.to_string()))
    );
}

#[test]
fn test_device_index_is_bounded() {
    let last = format!("serial[{}]", MAX_DEVICES - 1);
    assert_eq!(translate(&kwargs(&[(&last, "x")])).unwrap().len(), MAX_DEVICES);

    for index in [MAX_DEVICES, 4_000_000_000, usize::MAX] {
        let key = format!("serial[{}]", index);
        let err = translate(&kwargs(&[(&key, "x")])).unwrap_err();
        assert_eq!(
            err.downcast_ref::<AggregateError>(),
            Some(&AggregateError::IndexOutOfRange {
                what: "device",
                index,
                len: MAX_DEVICES
            })
        );
    }
}

#[test]
fn test_selector_keys_are_not_forwarded() {
    let args = kwargs(&[("driver", "multi"), ("type", "aggregate"), ("serial[0]", "A")]);
    let translated = translate(&args).unwrap();
    assert!(!translated[0].contains_key("driver"));
    assert!(!translated[0].contains_key("type"));
}

#[test]
fn test_local_prefix_forwards_selector_keys() {
    let args = kwargs(&[("multi:driver", "mock"), ("multi:type[1]", "sim"), ("serial[1]", "B")]);
    let translated = translate(&args).unwrap();
    assert_eq!(translated[0]["driver"], "mock");
    assert_eq!(translated[1]["driver"], "mock");
    assert_eq!(translated[1]["type"], "sim");
    assert!(!translated[0].contains_key("type"));
}

#[test]
fn test_indexed_keys_land_in_one_map_only() {
    let args = kwargs(&[("gain[0]", "10"), ("rate[1]", "2e6")]);
    let translated = translate(&args).unwrap();
    assert!(translated[0].contains_key("gain"));
    assert!(!translated[1].contains_key("gain"));
    assert!(translated[1].contains_key("rate"));
    assert!(!translated[0].contains_key("rate"));
    assert!(translated.iter().all(|m| m.contains_key(GUARD_KEY)));
}
