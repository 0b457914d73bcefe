//! Write/take behavior of a space through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};

use memspace::{Field, Space, SpaceError};

static NAME_SEQ: AtomicUsize = AtomicUsize::new(0);

fn unique_name(tag: &str) -> String {
    let seq = NAME_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("/memspace-rt-{tag}-{}-{seq}", std::process::id())
}

fn scratch_space(tag: &str) -> Space {
    let name = unique_name(tag);
    let _ = rustix::shm::unlink(&name);
    Space::open(&name).unwrap()
}

mod matching {
    use super::*;

    #[test]
    fn literal_match_captures_wildcard_field() {
        let space = scratch_space("capture");

        space.write("uu", &[Field::U32(1), Field::U32(42)]).unwrap();
        let got = space.try_take("u?u", &[Field::U32(1)]).unwrap();

        assert_eq!(got, vec![Field::U32(42)]);
        space.unlink().unwrap();
    }

    #[test]
    fn tuple_is_delivered_at_most_once() {
        let space = scratch_space("once");

        space.write("uu", &[Field::U32(1), Field::U32(42)]).unwrap();

        assert!(space.try_take("u?u", &[Field::U32(1)]).is_ok());
        let second = space.try_take("u?u", &[Field::U32(1)]);
        assert!(matches!(second, Err(SpaceError::NotFound)));

        space.unlink().unwrap();
    }

    #[test]
    fn literal_mismatch_leaves_the_tuple_in_place() {
        let space = scratch_space("mismatch");

        space.write("uu", &[Field::U32(1), Field::U32(42)]).unwrap();

        let miss = space.try_take("u?u", &[Field::U32(99)]);
        assert!(matches!(miss, Err(SpaceError::NotFound)));
        assert_eq!(space.live_count(), 1);

        space.unlink().unwrap();
    }

    #[test]
    fn field_count_must_match_exactly() {
        let space = scratch_space("arity");

        space
            .write("uuu", &[Field::U32(1), Field::U32(2), Field::U32(3)])
            .unwrap();

        let miss = space.try_take("u?u", &[Field::U32(1)]);
        assert!(matches!(miss, Err(SpaceError::NotFound)));

        space.unlink().unwrap();
    }

    #[test]
    fn captures_come_back_in_format_order() {
        let space = scratch_space("order");

        space
            .write(
                "usi",
                &[Field::U32(7), Field::Str("job".into()), Field::I64(-1)],
            )
            .unwrap();
        let got = space
            .try_take("?us?i", &[Field::Str("job".into())])
            .unwrap();

        assert_eq!(got, vec![Field::U32(7), Field::I64(-1)]);
        space.unlink().unwrap();
    }

    #[test]
    fn matching_tuples_are_taken_in_store_order() {
        let space = scratch_space("fifo");

        for v in [10u32, 20, 30] {
            space.write("u", &[Field::U32(v)]).unwrap();
        }

        assert_eq!(space.try_take("?u", &[]).unwrap(), vec![Field::U32(10)]);
        assert_eq!(space.try_take("?u", &[]).unwrap(), vec![Field::U32(20)]);
        assert_eq!(space.try_take("?u", &[]).unwrap(), vec![Field::U32(30)]);

        space.unlink().unwrap();
    }

    #[test]
    fn all_field_types_roundtrip() {
        let space = scratch_space("types");

        space
            .write(
                "uisb",
                &[
                    Field::U32(u32::MAX),
                    Field::I64(i64::MIN),
                    Field::Str("héllo".into()),
                    Field::Bytes(vec![0, 1, 255]),
                ],
            )
            .unwrap();

        let got = space.try_take("?u?i?s?b", &[]).unwrap();
        assert_eq!(
            got,
            vec![
                Field::U32(u32::MAX),
                Field::I64(i64::MIN),
                Field::Str("héllo".into()),
                Field::Bytes(vec![0, 1, 255]),
            ]
        );

        space.unlink().unwrap();
    }
}

mod encoding_errors {
    use super::*;

    #[test]
    fn write_rejects_capture_marker() {
        let space = scratch_space("wcap");

        let result = space.write("u?u", &[Field::U32(1), Field::U32(2)]);

        assert!(matches!(result, Err(SpaceError::Encoding { .. })));
        space.unlink().unwrap();
    }

    #[test]
    fn write_rejects_arity_mismatch() {
        let space = scratch_space("warity");

        let result = space.write("uu", &[Field::U32(1)]);

        assert!(matches!(result, Err(SpaceError::Encoding { .. })));
        space.unlink().unwrap();
    }

    #[test]
    fn write_rejects_value_type_mismatch() {
        let space = scratch_space("wtype");

        let result = space.write("u", &[Field::Str("not a number".into())]);

        assert!(matches!(result, Err(SpaceError::Encoding { .. })));
        space.unlink().unwrap();
    }

    #[test]
    fn take_rejects_unknown_type_code() {
        let space = scratch_space("tcode");

        let result = space.try_take("?z", &[]);

        assert!(matches!(result, Err(SpaceError::Encoding { .. })));
        space.unlink().unwrap();
    }

    #[test]
    fn take_rejects_literal_type_mismatch() {
        let space = scratch_space("tlit");

        let result = space.try_take("u?u", &[Field::I64(1)]);

        assert!(matches!(result, Err(SpaceError::Encoding { .. })));
        space.unlink().unwrap();
    }

    #[test]
    fn failed_write_stores_nothing() {
        let space = scratch_space("noop");

        let _ = space.write("uu", &[Field::U32(1)]);

        assert_eq!(space.live_count(), 0);
        space.unlink().unwrap();
    }
}
