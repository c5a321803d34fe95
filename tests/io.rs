use std::io::Cursor;

use colograph::io::line::ChunkedReader;
use colograph::io::record::{
    decode_i64, encode_i64, Mapping, MappingCursor, MappingReader, INT_RECORD, PAIR_RECORD,
};

fn collect_delimited(input: &[u8], capacity: usize) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    ChunkedReader::delimited_with_capacity(Cursor::new(input.to_vec()), capacity)
        .for_each(|batch| {
            for part in batch.iter() {
                out.push(part.to_vec());
            }
            Ok(())
        })
        .unwrap();
    out
}

#[test]
fn delimited_splits_lines_across_refills() {
    let input = b"alpha\nbb\nccc\ndddd\ne\n";
    // A buffer much smaller than the input forces several refills with
    // residual carry-over.
    for capacity in [8, 16, 64] {
        let lines = collect_delimited(input, capacity);
        assert_eq!(
            lines,
            vec![
                b"alpha".to_vec(),
                b"bb".to_vec(),
                b"ccc".to_vec(),
                b"dddd".to_vec(),
                b"e".to_vec(),
            ],
            "capacity {capacity}"
        );
    }
}

#[test]
fn delimited_emits_eof_residual_as_final_part() {
    let lines = collect_delimited(b"one\ntwo", 16);
    assert_eq!(lines, vec![b"one".to_vec(), b"two".to_vec()]);
}

#[test]
fn delimited_empty_input_yields_no_batches() {
    let mut batches = 0;
    ChunkedReader::delimited(Cursor::new(Vec::new()))
        .for_each(|_| {
            batches += 1;
            Ok(())
        })
        .unwrap();
    assert_eq!(batches, 0);
}

#[test]
fn delimited_keeps_empty_lines() {
    let lines = collect_delimited(b"a\n\nb\n", 16);
    assert_eq!(lines, vec![b"a".to_vec(), b"".to_vec(), b"b".to_vec()]);
}

#[test]
fn delimited_rejects_record_larger_than_buffer() {
    let err = ChunkedReader::delimited_with_capacity(Cursor::new(vec![b'x'; 32]), 8)
        .for_each(|_| Ok(()))
        .unwrap_err();
    assert!(err.to_string().contains("backing buffer"), "{err}");
}

#[test]
fn fixed_slices_by_width_with_short_tail() {
    let mut parts = Vec::new();
    ChunkedReader::fixed_with_capacity(Cursor::new(b"0123456789".to_vec()), 4, 64)
        .for_each(|batch| {
            for part in batch.iter() {
                parts.push(part.to_vec());
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(
        parts,
        vec![b"0123".to_vec(), b"4567".to_vec(), b"89".to_vec()]
    );
}

#[test]
fn varint_roundtrips() {
    let mut rec = [0u8; INT_RECORD];
    for v in [0i64, 1, -1, 2, -2, 63, 64, -64, 300, -300, 1 << 40, -(1 << 40)] {
        encode_i64(v, &mut rec).unwrap();
        assert_eq!(decode_i64(&rec).unwrap(), v, "value {v}");
    }
}

#[test]
fn varint_wire_format_is_zigzag_leb128() {
    let mut rec = [0u8; INT_RECORD];

    encode_i64(0, &mut rec).unwrap();
    assert_eq!(rec, [0; 8]);

    encode_i64(-1, &mut rec).unwrap();
    assert_eq!(rec, [1, 0, 0, 0, 0, 0, 0, 0]);

    encode_i64(1, &mut rec).unwrap();
    assert_eq!(rec, [2, 0, 0, 0, 0, 0, 0, 0]);

    // zigzag(300) = 600 = 0x258 -> 0xd8 0x04
    encode_i64(300, &mut rec).unwrap();
    assert_eq!(rec, [0xd8, 0x04, 0, 0, 0, 0, 0, 0]);
}

#[test]
fn varint_that_never_terminates_is_an_error() {
    assert!(decode_i64(&[0x80; 8]).is_err());
}

#[test]
fn pair_records_roundtrip() {
    let mut rec = [0u8; PAIR_RECORD];
    let m = Mapping { a: 42, b: -1 };
    m.encode(&mut rec).unwrap();
    assert_eq!(Mapping::decode(&rec).unwrap(), m);
}

#[test]
fn mapping_reader_reports_truncated_tail() {
    // One whole record plus four stray bytes.
    let mut rec = [0u8; PAIR_RECORD];
    Mapping { a: 7, b: 9 }.encode(&mut rec).unwrap();
    let mut bytes = rec.to_vec();
    bytes.extend_from_slice(&[1, 2, 3, 4]);

    let mut records = Vec::new();
    let mut failures = 0;
    MappingReader::new(Cursor::new(bytes))
        .for_each(|rec| match rec {
            Ok(m) => records.push(m),
            Err(_) => failures += 1,
        })
        .unwrap();
    assert_eq!(records, vec![Mapping { a: 7, b: 9 }]);
    assert_eq!(failures, 1);
}

#[test]
fn mapping_cursor_pulls_records_then_ends_cleanly() {
    let mut bytes = Vec::new();
    for m in [Mapping { a: 1, b: 2 }, Mapping { a: 3, b: -1 }] {
        let mut rec = [0u8; PAIR_RECORD];
        m.encode(&mut rec).unwrap();
        bytes.extend_from_slice(&rec);
    }

    let mut cursor = MappingCursor::new(Cursor::new(bytes));
    assert_eq!(cursor.next().unwrap(), Some(Mapping { a: 1, b: 2 }));
    assert_eq!(cursor.next().unwrap(), Some(Mapping { a: 3, b: -1 }));
    assert_eq!(cursor.next().unwrap(), None);
}

#[test]
fn mapping_cursor_rejects_partial_record() {
    let mut cursor = MappingCursor::new(Cursor::new(vec![0u8; 10]));
    assert!(cursor.next().is_err());
}
