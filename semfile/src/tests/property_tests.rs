use std::fs::{self, File};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use tempfile::tempdir;

use super::*;
use crate::consumer::Consumer;
use crate::record::{Record, RECORD_LEN};
use crate::sync::SyncBackend;

/// Runs `senders` producer threads writing `per_sender` records each against
/// one consumer, returning what the consumer read and the collected stats.
fn exchange(capacity: u32, senders: usize, per_sender: usize) -> (Vec<String>, Arc<Stats>, u64) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.bin");
    File::create(&path).unwrap();
    let backend = MemoryBackend::new();
    let stats = Arc::new(Stats::default());
    let set = Instrumented::new(backend.create(capacity).unwrap(), &stats);

    let handles: Vec<_> = (0..senders)
        .map(|s| {
            let producer = Producer::new(Instrumented::new(backend.open_existing().unwrap(), &stats), &path, PATIENCE);
            thread::spawn(move || {
                for n in 0..per_sender {
                    let record = Record::encode(&format!("s{}-{}", s, n)).unwrap();
                    producer.send(&record, |_| {}).unwrap();
                }
            })
        })
        .collect();

    let mut consumer = Consumer::open(&set, &path, PATIENCE).unwrap();
    let received: Vec<String> = (0..senders * per_sender).map(|_| consumer.receive().unwrap()).collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let len = fs::metadata(&path).unwrap().len();
    (received, stats, len)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn unread_records_never_exceed_capacity(capacity in 1u32..4, senders in 1usize..4, per_sender in 1usize..8) {
        let (received, stats, _) = exchange(capacity, senders, per_sender);
        prop_assert_eq!(received.len(), senders * per_sender);
        prop_assert!(stats.max_outstanding.load(Ordering::SeqCst) <= capacity as usize);
    }

    #[test]
    fn file_mutex_has_one_holder(capacity in 1u32..4, senders in 2usize..4, per_sender in 1usize..8) {
        let (_, stats, _) = exchange(capacity, senders, per_sender);
        prop_assert_eq!(stats.max_holders.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn every_record_is_whole_and_read_once(capacity in 1u32..6, senders in 1usize..4, per_sender in 1usize..8) {
        let (received, _, len) = exchange(capacity, senders, per_sender);
        prop_assert_eq!(len, (senders * per_sender * RECORD_LEN) as u64);
        for s in 0..senders {
            let prefix = format!("s{}-", s);
            let own: Vec<_> = received.iter().filter(|t| t.starts_with(&prefix)).cloned().collect();
            let expected: Vec<_> = (0..per_sender).map(|n| format!("s{}-{}", s, n)).collect();
            prop_assert_eq!(own, expected);
        }
    }
}
