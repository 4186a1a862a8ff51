//! Concurrent writer lanes and shared partition table stress tests

use shardpage::{StorageEngine, StorageEngineBuilder, StorageError, VirtualPageNumber};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn engine(temp: &TempDir, lanes: u16) -> Arc<StorageEngine> {
    Arc::new(
        StorageEngineBuilder::new()
            .root(temp.path())
            .page_size(256)
            .writer_lanes(lanes)
            .build()
            .unwrap(),
    )
}

#[test]
fn test_one_partition_per_lane() {
    let temp = TempDir::new().unwrap();
    let engine = engine(&temp, 4);
    engine.bootstrap().unwrap();

    let handles: Vec<_> = (0..4u16)
        .map(|lane| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                let mut pages = Vec::new();
                for i in 0..200u32 {
                    let vpn = engine.allocate_page(lane).unwrap().unwrap();
                    engine.write_page(vpn, &[(i % 251) as u8; 256]).unwrap();
                    pages.push(vpn);
                }
                pages
            })
        })
        .collect();

    let mut all = HashSet::new();
    for h in handles {
        for vpn in h.join().unwrap() {
            assert!(all.insert(vpn), "{} handed out twice", vpn);
        }
    }
    assert_eq!(all.len(), 800);

    engine.verify().unwrap();
    let stats = engine.stats();
    assert_eq!(stats.allocated_pages(), 800);
    assert_eq!(stats.unread_pages(), 800);
    assert_eq!(stats.readable_partitions, vec![0, 1, 2, 3]);
}

#[test]
fn test_writer_and_reader_threads() {
    let temp = TempDir::new().unwrap();
    let engine = engine(&temp, 1);
    engine.allocate_partition(0).unwrap();
    let freed = Arc::new(AtomicUsize::new(0));

    let writer = {
        let engine = engine.clone();
        std::thread::spawn(move || {
            for i in 0..300u32 {
                let vpn = engine.allocate_page(0).unwrap().unwrap();
                engine.write_page(vpn, &[(i % 256) as u8; 256]).unwrap();
            }
        })
    };

    let reader = {
        let engine = engine.clone();
        let freed = freed.clone();
        std::thread::spawn(move || {
            let mut out = vec![0u8; 256];
            while freed.load(Ordering::SeqCst) < 300 {
                match engine.next_readable_page(0, 0).unwrap() {
                    Some(vpn) => {
                        engine.read_page(vpn, &mut out).unwrap();
                        assert_eq!(out[0] as u64, vpn.page() % 256);
                        engine.free_page(vpn).unwrap();
                        freed.fetch_add(1, Ordering::SeqCst);
                    }
                    None => std::thread::yield_now(),
                }
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();

    assert_eq!(freed.load(Ordering::SeqCst), 300);
    assert_eq!(engine.next_readable_page(0, 0).unwrap(), None);
    assert!(!engine.metadata().is_readable(0));
    engine.verify().unwrap();
}

#[test]
fn test_concurrent_partition_registration() {
    let temp = TempDir::new().unwrap();
    let engine = engine(&temp, 4);
    let created = Arc::new(AtomicUsize::new(0));

    // every thread races to register the same 16 partitions
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            let created = created.clone();
            std::thread::spawn(move || {
                for id in 0..16u16 {
                    match engine.allocate_partition(id) {
                        Ok(_) => {
                            created.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(StorageError::AlreadyExists(_)) => {}
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(created.load(Ordering::SeqCst), 16);
    assert_eq!(engine.partition_ids(), (0..16).collect::<Vec<_>>());
}

#[test]
fn test_concurrent_lane_handoff() {
    let temp = TempDir::new().unwrap();
    let engine = engine(&temp, 4);
    engine.bootstrap().unwrap();

    // each lane moves to its own fresh partition
    let handles: Vec<_> = (0..4u16)
        .map(|lane| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                let next = 10 + lane;
                engine.allocate_partition(next).unwrap();
                engine.retarget_lane(lane, next).unwrap();
                engine.allocate_page(next).unwrap().unwrap()
            })
        })
        .collect();

    let mut vpns: Vec<VirtualPageNumber> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    vpns.sort();

    assert_eq!(engine.active_slots(), vec![10, 11, 12, 13]);
    assert_eq!(engine.metadata().next_available_partition(), 14);
    assert_eq!(vpns[0], VirtualPageNumber::encode(10, 0));
}
