use multisdr::error::AggregateError;
use multisdr::multi::{csv_join, csv_split, decode, encode, is_indexed};

#[test]
fn test_encode() {
    assert_eq!(encode("test", 123), "test[123]");
    assert_eq!(encode("", 0), "[0]");
}

#[test]
fn test_is_indexed() {
    assert!(!is_indexed("test"));
    assert!(!is_indexed("test 123"));
    assert!(is_indexed("test[123]"));
    assert!(is_indexed("[7]"));
    assert!(!is_indexed("test[12a]"));
}

#[test]
fn test_decode() {
    assert_eq!(decode("test[123]").unwrap(), ("test".to_string(), 123));

    let err = decode("test 123").unwrap_err();
    assert_eq!(
        err.downcast_ref::<AggregateError>(),
        Some(&AggregateError::Format("test 123".to_string()))
    );
}

#[test]
fn test_decode_inverts_encode() {
    for base in ["gain", "RFIC", "multi:driver", "a b", ""] {
        for index in [0usize, 1, 9, 10, 4096] {
            assert_eq!(decode(&encode(base, index)).unwrap(), (base.to_string(), index));
        }
    }
}

#[test]
fn test_csv_split_and_join() {
    let split = csv_split("foo1, bar2, baz3");
    assert_eq!(split, vec!["foo1", "bar2", "baz3"]);
    assert_eq!(csv_join(&split), "foo1, bar2, baz3");
}

#[test]
fn test_csv_join_normalises_once() {
    let once = csv_join(&csv_split("a,b ,  c,"));
    assert_eq!(once, "a, b, c");
    assert_eq!(csv_join(&csv_split(&once)), once);
}
