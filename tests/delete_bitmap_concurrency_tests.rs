// Delete Bitmap Concurrency Tests for SegStore
// These tests verify snapshot isolation and merge atomicity under a
// concurrent writer

use rand::Rng;
use roaring::RoaringBitmap;
use segstore::{BitmapKey, DeleteBitmap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const ROWS_PER_BATCH: u32 = 64;

/// Test snapshots never observe a half-applied batch
///
/// The writer replaces each key's bitmap with `[0, n * ROWS_PER_BATCH)` for
/// growing `n`, so every consistent state of one key is a prefix whose length
/// is a multiple of the batch size.
#[test]
fn test_snapshot_isolation() {
    env_logger::try_init().ok();
    let bitmap = Arc::new(DeleteBitmap::new());
    let keys: Vec<BitmapKey> = (0..4).map(|segment| BitmapKey::new(7, segment, 1)).collect();
    let done = Arc::new(AtomicBool::new(false));
    let barrier = Arc::new(Barrier::new(5));

    let writer = {
        let bitmap = Arc::clone(&bitmap);
        let keys = keys.clone();
        let done = Arc::clone(&done);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            let mut rng = rand::rng();
            for n in 1..=200u32 {
                let key = keys[rng.random_range(0..keys.len())];
                let mut rows = RoaringBitmap::new();
                rows.insert_range(0..n * ROWS_PER_BATCH);
                bitmap.set(key, rows);
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let mut readers = vec![];
    for _ in 0..4 {
        let bitmap = Arc::clone(&bitmap);
        let done = Arc::clone(&done);
        let barrier = Arc::clone(&barrier);
        let handle = thread::spawn(move || {
            barrier.wait();
            let mut checked = 0;
            while !done.load(Ordering::SeqCst) || checked == 0 {
                let snapshot = bitmap.snapshot();
                for key in snapshot.keys() {
                    let rows = snapshot.get(key).unwrap();
                    let len = rows.len() as u32;
                    assert_eq!(len % ROWS_PER_BATCH, 0, "torn bitmap at {}", key);
                    assert_eq!(rows.max().map_or(0, |m| m + 1), len, "gap in bitmap at {}", key);
                }
                checked += 1;
            }
            checked
        });
        readers.push(handle);
    }

    writer.join().unwrap();
    for handle in readers {
        assert!(handle.join().unwrap() > 0);
    }
}

/// Test point mutations interleaved with snapshots
#[test]
fn test_point_mutations_with_readers() {
    let bitmap = Arc::new(DeleteBitmap::new());
    let key = BitmapKey::new(1, 0, 5);
    bitmap.add(key, 0);

    let num_threads = 8;
    let adds_per_thread = 500;
    let mut handles = vec![];

    for thread_id in 0..num_threads {
        let bitmap = Arc::clone(&bitmap);
        let handle = thread::spawn(move || {
            for i in 0..adds_per_thread {
                let row = (thread_id * adds_per_thread + i) as u32;
                bitmap.add(key, row);
                if i % 50 == 0 {
                    let snapshot = bitmap.snapshot();
                    assert!(snapshot.contains(key, row));
                }
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(bitmap.cardinality(), (num_threads * adds_per_thread) as u64);
}

/// Test merges in both directions do not deadlock
#[test]
fn test_cross_merge() {
    let a = Arc::new(DeleteBitmap::new());
    let b = Arc::new(DeleteBitmap::new());
    for version in 0..20 {
        a.add(BitmapKey::new(1, 0, version), version as u32);
        b.add(BitmapKey::new(2, 0, version), version as u32);
    }

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = [(Arc::clone(&a), Arc::clone(&b)), (Arc::clone(&b), Arc::clone(&a))]
        .into_iter()
        .map(|(into, from)| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..100 {
                    into.merge(&from);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(a.keys(), b.keys());
    assert_eq!(a.len(), 40);
}

/// Test version-bounded unions built from subsets
#[test]
fn test_versioned_union() {
    let bitmap = DeleteBitmap::new();
    for version in 1..=4u64 {
        bitmap.add(BitmapKey::new(9, 2, version), version as u32 * 10);
    }
    bitmap.add(BitmapKey::new(9, 3, 1), 99);

    // Rows deleted in segment 2 as of version 3
    let visible = bitmap.subset(BitmapKey::new(9, 2, 0), BitmapKey::new(9, 2, 4));
    let mut union = RoaringBitmap::new();
    for key in visible.keys() {
        visible.with_bitmap(key, |rows| union |= rows);
    }
    assert_eq!(union.iter().collect::<Vec<_>>(), vec![10, 20, 30]);
}

/// Test snapshots under interleaved point adds, point removes and range
/// retirement
///
/// The writer slides a two-row window over one key with `add`/`remove` and
/// retires old versions of another segment with `remove_range`. Every
/// mutation is atomic, so a snapshot must show a state reachable between two
/// of them, and must not change afterwards.
#[test]
fn test_snapshot_under_point_and_range_mutations() {
    env_logger::try_init().ok();
    let bitmap = Arc::new(DeleteBitmap::new());
    let window = BitmapKey::new(3, 0, 1);
    bitmap.add(window, 0);
    let done = Arc::new(AtomicBool::new(false));
    let barrier = Arc::new(Barrier::new(4));

    let writer = {
        let bitmap = Arc::clone(&bitmap);
        let done = Arc::clone(&done);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            for i in 1..2000u32 {
                bitmap.add(window, i);
                bitmap.remove(window, i - 1).unwrap();

                let version = i as u64;
                bitmap.add(BitmapKey::new(9, 0, version), i);
                if version > 2 {
                    bitmap.remove_range(BitmapKey::new(9, 0, 0), BitmapKey::new(9, 0, version - 2));
                }
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let bitmap = Arc::clone(&bitmap);
            let done = Arc::clone(&done);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut rng = rand::rng();
                let mut checked = 0;
                while !done.load(Ordering::SeqCst) || checked == 0 {
                    let snapshot = bitmap.snapshot();
                    let frozen = snapshot.encode().unwrap();

                    // The window holds one row, or two adjacent rows between
                    // an add and the matching remove.
                    let rows: Vec<u32> = snapshot.get(window).unwrap().iter().collect();
                    match rows.as_slice() {
                        [_] => {}
                        [a, b] => assert_eq!(a + 1, *b, "window rows {:?}", rows),
                        other => panic!("torn window {:?}", other),
                    }

                    // Retired versions leave a contiguous tail of at most four.
                    let versions: Vec<u64> = snapshot
                        .keys()
                        .into_iter()
                        .filter(|k| k.rowset_id == 9)
                        .map(|k| k.version)
                        .collect();
                    assert!(versions.len() <= 4, "versions {:?}", versions);
                    assert!(versions.windows(2).all(|w| w[1] == w[0] + 1), "versions {:?}", versions);
                    for version in &versions {
                        assert!(snapshot.contains(BitmapKey::new(9, 0, *version), *version as u32));
                    }

                    for _ in 0..rng.random_range(1..20) {
                        thread::yield_now();
                    }
                    assert_eq!(snapshot.encode().unwrap(), frozen, "snapshot changed after it was taken");
                    checked += 1;
                }
                checked
            })
        })
        .collect();

    writer.join().unwrap();
    for handle in readers {
        assert!(handle.join().unwrap() > 0);
    }
    assert_eq!(bitmap.get(window).unwrap().iter().collect::<Vec<_>>(), vec![1999]);
}

/// Test comparing two bitmaps in both directions while both are written
#[test]
fn test_cross_compare_under_writers() {
    let a = Arc::new(DeleteBitmap::new());
    let b = Arc::new(DeleteBitmap::new());
    let key = BitmapKey::new(4, 0, 1);
    let barrier = Arc::new(Barrier::new(4));

    let mut handles = vec![];
    for (left, right) in [(Arc::clone(&a), Arc::clone(&b)), (Arc::clone(&b), Arc::clone(&a))] {
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..2000 {
                let _ = *left == *right;
            }
        }));
    }
    for target in [Arc::clone(&a), Arc::clone(&b)] {
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for row in 0..2000 {
                target.add(key, row);
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(*a, *b);
}
