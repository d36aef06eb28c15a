//! Write batch behavior: sequence assignment, append semantics, LogData
//! handling, and corruption recovery.

use tablekv::memtable::ValueType;
use tablekv::write_batch::Handler;
use tablekv::{MemTable, WriteBatch};

/// Applies the batch to a fresh memtable and renders the result in
/// comparator order, e.g. `Put(foo, bar)@100`. A decode error is appended
/// to the dump; an entry-count mismatch is flagged.
fn print_contents(batch: &WriteBatch) -> String {
    let memtable = MemTable::new();
    let result = batch.insert_into(&memtable);

    let mut state = String::new();
    let mut count = 0u32;
    for entry in memtable.iter() {
        let key = String::from_utf8_lossy(entry.user_key()).into_owned();
        let value = String::from_utf8_lossy(entry.value()).into_owned();
        match entry.value_type() {
            ValueType::Value => state += &format!("Put({}, {})", key, value),
            ValueType::Merge => state += &format!("Merge({}, {})", key, value),
            ValueType::Deletion => state += &format!("Delete({})", key),
        }
        state += &format!("@{}", entry.sequence());
        count += 1;
    }

    if let Err(e) = result {
        state += &e.to_string();
    } else if count != batch.count() {
        state += "CountMismatch()";
    }
    state
}

#[test]
fn test_empty_batch() {
    let batch = WriteBatch::new();
    assert_eq!(print_contents(&batch), "");
    assert_eq!(batch.count(), 0);
    assert_eq!(batch.data().len(), 12);
}

#[test]
fn test_multiple_ops() {
    let mut batch = WriteBatch::new();
    batch.put(b"foo", b"bar");
    batch.delete(b"box");
    batch.put(b"baz", b"boo");
    batch.set_sequence(100);

    assert_eq!(batch.sequence(), 100);
    assert_eq!(batch.count(), 3);
    assert_eq!(
        print_contents(&batch),
        "Put(baz, boo)@102\
         Delete(box)@101\
         Put(foo, bar)@100"
    );
}

#[test]
fn test_corruption_keeps_applied_prefix() {
    let mut batch = WriteBatch::new();
    batch.put(b"foo", b"bar");
    batch.delete(b"box");
    batch.set_sequence(200);

    let mut data = batch.data().to_vec();
    data.truncate(data.len() - 1);
    let truncated = WriteBatch::from_data(data);

    assert_eq!(
        print_contents(&truncated),
        "Put(foo, bar)@200\
         Corruption: bad WriteBatch Delete"
    );
}

#[test]
fn test_append() {
    let mut b1 = WriteBatch::new();
    let mut b2 = WriteBatch::new();
    b1.set_sequence(200);
    b2.set_sequence(300);

    b1.append(&b2);
    assert_eq!(print_contents(&b1), "");
    assert_eq!(b1.count(), 0);

    b2.put(b"a", b"va");
    b1.append(&b2);
    assert_eq!(print_contents(&b1), "Put(a, va)@200");
    assert_eq!(b1.count(), 1);

    b2.clear();
    b2.put(b"b", b"vb");
    b1.append(&b2);
    assert_eq!(
        print_contents(&b1),
        "Put(a, va)@200\
         Put(b, vb)@201"
    );
    assert_eq!(b1.count(), 2);

    b2.delete(b"foo");
    b1.append(&b2);
    // b2 still holds Put(b, vb), so both of its records land again; within
    // one user key the newer sequence renders first.
    assert_eq!(
        print_contents(&b1),
        "Put(a, va)@200\
         Put(b, vb)@202\
         Put(b, vb)@201\
         Delete(foo)@203"
    );
    assert_eq!(b1.count(), 4);
}

#[test]
fn test_log_data_skipped_by_memtable() {
    let mut batch = WriteBatch::new();
    batch.put(b"k1", b"v1");
    batch.put(b"k2", b"v2");
    batch.put(b"k3", b"v3");
    batch.put_log_data(b"blob1");
    batch.delete(b"k2");
    batch.put_log_data(b"blob2");
    batch.merge(b"foo", b"bar");

    // LogData records are not counted and consume no sequence number.
    assert_eq!(batch.count(), 5);
    assert_eq!(
        print_contents(&batch),
        "Merge(foo, bar)@4\
         Put(k1, v1)@0\
         Delete(k2)@3\
         Put(k2, v2)@1\
         Put(k3, v3)@2"
    );

    // Handlers see all seven records in insertion order.
    #[derive(Default)]
    struct Recorder {
        seen: String,
    }
    impl Handler for Recorder {
        fn put(&mut self, key: &[u8], value: &[u8]) {
            self.seen += &format!(
                "Put({}, {})",
                String::from_utf8_lossy(key),
                String::from_utf8_lossy(value)
            );
        }
        fn merge(&mut self, key: &[u8], value: &[u8]) {
            self.seen += &format!(
                "Merge({}, {})",
                String::from_utf8_lossy(key),
                String::from_utf8_lossy(value)
            );
        }
        fn delete(&mut self, key: &[u8]) {
            self.seen += &format!("Delete({})", String::from_utf8_lossy(key));
        }
        fn log_data(&mut self, blob: &[u8]) {
            self.seen += &format!("LogData({})", String::from_utf8_lossy(blob));
        }
    }

    let mut recorder = Recorder::default();
    batch.iterate(&mut recorder).unwrap();
    assert_eq!(
        recorder.seen,
        "Put(k1, v1)\
         Put(k2, v2)\
         Put(k3, v3)\
         LogData(blob1)\
         Delete(k2)\
         LogData(blob2)\
         Merge(foo, bar)"
    );
}

#[test]
fn test_insert_into_is_noop_for_empty_batch() {
    let batch = WriteBatch::new();
    let memtable = MemTable::new();
    batch.insert_into(&memtable).unwrap();
    assert!(memtable.is_empty());
}
