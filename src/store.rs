//! # Slot Store
//!
//! The store area follows the superpage and holds tuples in a sequence
//! of slots. Each slot is a 12-byte header followed by its payload
//! region:
//!
//! ```text
//! Offset  Size  Description
//! ------  ----  -------------------------------------------
//! 0       4     slot_len: payload region capacity in bytes
//! 4       4     payload_len: bytes currently used
//! 8       1     state: 0 = FREE, 1 = LIVE
//! 9       1     field_count of the stored tuple
//! 10      2     Reserved, zero
//! 12      N     Payload region (slot_len bytes)
//! ```
//!
//! Slots are carved at the bump offset and never merged or moved, so a
//! slot's capacity is fixed at the payload size it was carved for.
//! Writes reuse the first FREE slot whose capacity fits (first fit) and
//! fall back to carving; takes scan LIVE slots in carve order and return
//! the first match. A slot's payload is copied in full before the state
//! byte flips to LIVE, so a partially copied tuple is never visible as
//! live data.
//!
//! All functions here expect the caller to hold the space lock.

use tracing::trace;
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::{Result, SpaceError};
use crate::pattern::{decode_fields, EncodedTuple, Field, Pattern};
use crate::superpage::StoreMeta;

pub const SLOT_HEADER_SIZE: usize = 12;

pub(crate) const SLOT_FREE: u8 = 0;
pub(crate) const SLOT_LIVE: u8 = 1;

const _: () = assert!(std::mem::size_of::<SlotHeader>() == SLOT_HEADER_SIZE);

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct SlotHeader {
    slot_len: U32,
    payload_len: U32,
    state: u8,
    field_count: u8,
    reserved: [u8; 2],
}

impl SlotHeader {
    fn slot_len(&self) -> usize {
        self.slot_len.get() as usize
    }

    fn payload_len(&self) -> usize {
        self.payload_len.get() as usize
    }
}

fn corrupt(reason: impl Into<String>) -> SpaceError {
    SpaceError::primitive("<store>", reason)
}

fn header_at(area: &[u8], offset: usize) -> Result<&SlotHeader> {
    let end = offset
        .checked_add(SLOT_HEADER_SIZE)
        .filter(|end| *end <= area.len())
        .ok_or_else(|| corrupt(format!("slot header at {offset} runs past the store")))?;
    // The slice has exact header size and SlotHeader is Unaligned, so
    // the cast cannot fail.
    Ok(SlotHeader::ref_from_bytes(&area[offset..end]).expect("header slice has exact size"))
}

fn header_at_mut(area: &mut [u8], offset: usize) -> Result<&mut SlotHeader> {
    let end = offset
        .checked_add(SLOT_HEADER_SIZE)
        .filter(|end| *end <= area.len())
        .ok_or_else(|| corrupt(format!("slot header at {offset} runs past the store")))?;
    Ok(SlotHeader::mut_from_bytes(&mut area[offset..end]).expect("header slice has exact size"))
}

/// Validates the extent of the slot at `offset` and returns the offset
/// one past it. Catching a hostile `slot_len` here, before any payload
/// slicing, keeps corrupt headers an error instead of a panic.
fn slot_end(header: &SlotHeader, offset: usize, bump: usize) -> Result<usize> {
    offset
        .checked_add(SLOT_HEADER_SIZE + header.slot_len())
        .filter(|end| *end <= bump)
        .ok_or_else(|| corrupt(format!("slot at {offset} extends past the bump offset")))
}

fn checked_bump(meta: &StoreMeta, area: &[u8]) -> Result<usize> {
    let bump = meta.bump() as usize;
    if bump > area.len() {
        return Err(corrupt(format!("bump offset {bump} past the store area")));
    }
    Ok(bump)
}

/// Stores an encoded tuple: first-fit over FREE slots, then a carve at
/// the bump offset, else a capacity error. The payload is fully copied
/// before the slot goes LIVE.
pub(crate) fn insert(
    name: &str,
    meta: &mut StoreMeta,
    area: &mut [u8],
    tuple: &EncodedTuple,
) -> Result<()> {
    let need = tuple.payload.len();
    let capacity = meta.store_capacity() as usize;
    let bump = checked_bump(meta, area)?;

    let mut offset = 0;
    while offset + SLOT_HEADER_SIZE <= bump {
        let header = header_at(area, offset)?;
        let next = slot_end(header, offset, bump)?;
        if header.state == SLOT_FREE && header.slot_len() >= need {
            publish(area, offset, tuple)?;
            meta.set_live_count(meta.live_count() + 1);
            trace!(space = %name, offset, len = need, "tuple stored in reused slot");
            return Ok(());
        }
        offset = next;
    }

    let carve_end = bump
        .checked_add(SLOT_HEADER_SIZE + need)
        .filter(|end| *end <= capacity);
    let Some(carve_end) = carve_end else {
        return Err(SpaceError::Capacity {
            requested: need,
            capacity,
        });
    };

    let header = SlotHeader {
        slot_len: U32::new(need as u32),
        payload_len: U32::ZERO,
        state: SLOT_FREE,
        field_count: 0,
        reserved: [0; 2],
    };
    area[bump..bump + SLOT_HEADER_SIZE].copy_from_slice(header.as_bytes());
    publish(area, bump, tuple)?;
    meta.set_bump(carve_end as u32);
    meta.set_live_count(meta.live_count() + 1);
    trace!(space = %name, offset = bump, len = need, "tuple stored in carved slot");
    Ok(())
}

/// Copies the payload into the slot at `offset`, then flips it LIVE.
fn publish(area: &mut [u8], offset: usize, tuple: &EncodedTuple) -> Result<()> {
    let data = offset + SLOT_HEADER_SIZE;
    area[data..data + tuple.payload.len()].copy_from_slice(&tuple.payload);

    let header = header_at_mut(area, offset)?;
    header.payload_len = U32::new(tuple.payload.len() as u32);
    header.field_count = tuple.field_count;
    header.state = SLOT_LIVE;
    Ok(())
}

/// Scans LIVE slots in carve order for the first tuple matching the
/// pattern. On a match the slot is freed, the live count decremented,
/// and the captured fields returned. `Ok(None)` means no match.
pub(crate) fn take_match(
    name: &str,
    meta: &mut StoreMeta,
    area: &mut [u8],
    pattern: &Pattern,
) -> Result<Option<Vec<Field>>> {
    let bump = checked_bump(meta, area)?;

    let mut offset = 0;
    while offset + SLOT_HEADER_SIZE <= bump {
        let header = header_at(area, offset)?;
        let next = slot_end(header, offset, bump)?;
        if header.state == SLOT_LIVE && header.field_count == pattern.field_count() {
            let payload_len = header.payload_len();
            let field_count = header.field_count;
            let data = offset + SLOT_HEADER_SIZE;
            if payload_len > header.slot_len() {
                return Err(corrupt(format!("slot at {offset} claims payload beyond its capacity")));
            }
            // In bounds: payload_len <= slot_len and the slot extent was
            // checked against the bump offset above.
            let fields = decode_fields(&area[data..data + payload_len], field_count)?;
            if let Some(captures) = pattern.match_captures(&fields) {
                header_at_mut(area, offset)?.state = SLOT_FREE;
                meta.set_live_count(meta.live_count().saturating_sub(1));
                trace!(space = %name, offset, "tuple taken");
                return Ok(Some(captures));
            }
        }
        offset = next;
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::encode_tuple;

    fn fresh_store(capacity: u32) -> (StoreMeta, Vec<u8>) {
        (StoreMeta::new(capacity), vec![0u8; capacity as usize])
    }

    fn tuple(format: &str, values: &[Field]) -> EncodedTuple {
        encode_tuple(format, values).unwrap()
    }

    fn pattern(format: &str, literals: &[Field]) -> Pattern {
        Pattern::parse(format, literals).unwrap()
    }

    #[test]
    fn insert_then_take_returns_captures() {
        let (mut meta, mut area) = fresh_store(256);

        insert("/t", &mut meta, &mut area, &tuple("uu", &[Field::U32(1), Field::U32(42)])).unwrap();
        assert_eq!(meta.live_count(), 1);

        let captures = take_match("/t", &mut meta, &mut area, &pattern("u?u", &[Field::U32(1)]))
            .unwrap()
            .unwrap();
        assert_eq!(captures, vec![Field::U32(42)]);
        assert_eq!(meta.live_count(), 0);
    }

    #[test]
    fn take_without_match_returns_none() {
        let (mut meta, mut area) = fresh_store(256);

        insert("/t", &mut meta, &mut area, &tuple("uu", &[Field::U32(1), Field::U32(2)])).unwrap();

        let result = take_match("/t", &mut meta, &mut area, &pattern("u?u", &[Field::U32(9)]));
        assert!(result.unwrap().is_none());
        assert_eq!(meta.live_count(), 1);
    }

    #[test]
    fn take_is_destructive() {
        let (mut meta, mut area) = fresh_store(256);

        insert("/t", &mut meta, &mut area, &tuple("u", &[Field::U32(7)])).unwrap();

        let p = pattern("?u", &[]);
        assert!(take_match("/t", &mut meta, &mut area, &p).unwrap().is_some());
        assert!(take_match("/t", &mut meta, &mut area, &p).unwrap().is_none());
    }

    #[test]
    fn take_returns_earliest_matching_slot() {
        let (mut meta, mut area) = fresh_store(512);

        insert("/t", &mut meta, &mut area, &tuple("u", &[Field::U32(10)])).unwrap();
        insert("/t", &mut meta, &mut area, &tuple("u", &[Field::U32(20)])).unwrap();

        let captures = take_match("/t", &mut meta, &mut area, &pattern("?u", &[]))
            .unwrap()
            .unwrap();
        assert_eq!(captures, vec![Field::U32(10)]);
    }

    #[test]
    fn freed_slot_is_reused_first_fit() {
        let (mut meta, mut area) = fresh_store(512);

        insert("/t", &mut meta, &mut area, &tuple("u", &[Field::U32(1)])).unwrap();
        insert("/t", &mut meta, &mut area, &tuple("u", &[Field::U32(2)])).unwrap();
        let bump_after_two = meta.bump();

        take_match("/t", &mut meta, &mut area, &pattern("u", &[Field::U32(1)]))
            .unwrap()
            .unwrap();
        insert("/t", &mut meta, &mut area, &tuple("u", &[Field::U32(3)])).unwrap();

        // Same-size tuple lands in the freed first slot, not past the bump.
        assert_eq!(meta.bump(), bump_after_two);
        let captures = take_match("/t", &mut meta, &mut area, &pattern("?u", &[]))
            .unwrap()
            .unwrap();
        assert_eq!(captures, vec![Field::U32(3)]);
    }

    #[test]
    fn small_free_slot_is_skipped_for_larger_payload() {
        let (mut meta, mut area) = fresh_store(512);

        insert("/t", &mut meta, &mut area, &tuple("u", &[Field::U32(1)])).unwrap();
        take_match("/t", &mut meta, &mut area, &pattern("?u", &[]))
            .unwrap()
            .unwrap();
        let bump_before = meta.bump();

        insert(
            "/t",
            &mut meta,
            &mut area,
            &tuple("s", &[Field::Str("a longer payload".into())]),
        )
        .unwrap();

        assert!(meta.bump() > bump_before);
    }

    #[test]
    fn insert_fails_when_store_is_full() {
        let (mut meta, mut area) = fresh_store(64);

        insert("/t", &mut meta, &mut area, &tuple("b", &[Field::Bytes(vec![0; 30])])).unwrap();

        let result = insert("/t", &mut meta, &mut area, &tuple("b", &[Field::Bytes(vec![0; 30])]));
        assert!(matches!(result, Err(SpaceError::Capacity { .. })));
        assert_eq!(meta.live_count(), 1);
    }

    #[test]
    fn field_count_mismatch_skips_slot_without_decoding() {
        let (mut meta, mut area) = fresh_store(256);

        insert("/t", &mut meta, &mut area, &tuple("uu", &[Field::U32(1), Field::U32(2)])).unwrap();

        let result = take_match("/t", &mut meta, &mut area, &pattern("?u", &[]));
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn take_rejects_slot_len_past_the_store() {
        let (mut meta, mut area) = fresh_store(1024);
        insert("/t", &mut meta, &mut area, &tuple("u", &[Field::U32(1)])).unwrap();

        let bogus = SlotHeader {
            slot_len: U32::new(0xFFFF_0000),
            payload_len: U32::new(4096),
            state: SLOT_LIVE,
            field_count: 1,
            reserved: [0; 2],
        };
        area[..SLOT_HEADER_SIZE].copy_from_slice(bogus.as_bytes());

        let result = take_match("/t", &mut meta, &mut area, &pattern("?u", &[]));
        assert!(matches!(result, Err(SpaceError::Primitive { .. })));
    }

    #[test]
    fn take_rejects_payload_len_past_the_slot() {
        let (mut meta, mut area) = fresh_store(1024);
        insert("/t", &mut meta, &mut area, &tuple("u", &[Field::U32(1)])).unwrap();

        let header = header_at_mut(&mut area, 0).unwrap();
        header.payload_len = U32::new(4096);

        let result = take_match("/t", &mut meta, &mut area, &pattern("?u", &[]));
        assert!(matches!(result, Err(SpaceError::Primitive { .. })));
    }

    #[test]
    fn insert_rejects_corrupt_free_slot() {
        let (mut meta, mut area) = fresh_store(1024);
        insert("/t", &mut meta, &mut area, &tuple("u", &[Field::U32(1)])).unwrap();
        take_match("/t", &mut meta, &mut area, &pattern("?u", &[]))
            .unwrap()
            .unwrap();

        let header = header_at_mut(&mut area, 0).unwrap();
        header.slot_len = U32::new(0xFFFF_0000);

        let result = insert("/t", &mut meta, &mut area, &tuple("u", &[Field::U32(2)]));
        assert!(matches!(result, Err(SpaceError::Primitive { .. })));
    }

    #[test]
    fn bump_past_the_store_is_rejected() {
        let (mut meta, mut area) = fresh_store(128);
        meta.set_bump(4096);

        let result = take_match("/t", &mut meta, &mut area, &pattern("?u", &[]));
        assert!(matches!(result, Err(SpaceError::Primitive { .. })));

        let result = insert("/t", &mut meta, &mut area, &tuple("u", &[Field::U32(1)]));
        assert!(matches!(result, Err(SpaceError::Primitive { .. })));
    }

    #[test]
    fn mixed_types_roundtrip_through_store() {
        let (mut meta, mut area) = fresh_store(512);

        insert(
            "/t",
            &mut meta,
            &mut area,
            &tuple(
                "sib",
                &[Field::Str("key".into()), Field::I64(-9), Field::Bytes(vec![1, 2])],
            ),
        )
        .unwrap();

        let captures = take_match(
            "/t",
            &mut meta,
            &mut area,
            &pattern("s?i?b", &[Field::Str("key".into())]),
        )
        .unwrap()
        .unwrap();
        assert_eq!(captures, vec![Field::I64(-9), Field::Bytes(vec![1, 2])]);
    }
}
