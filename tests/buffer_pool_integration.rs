//! Integration tests for the buffer pool manager.
//!
//! These tests verify cross-component behavior that unit tests don't cover.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::{create_bpm, create_bpm_with};
use kerneldb::buffer::BufferPoolManager;
use kerneldb::storage::page::PageType;
use kerneldb::storage::DiskManager;
use kerneldb::{EvictionPolicy, PageId};
use proptest::prelude::*;
use tempfile::tempdir;

fn new_data_page(bpm: &BufferPoolManager, payload: &[u8]) -> PageId {
    let mut guard = bpm.new_page().unwrap();
    guard.init(PageType::Data);
    guard.insert_record(payload).unwrap();
    guard.page_id()
}

/// `count` pages on disk, none of them resident.
fn cold_pages(bpm: &BufferPoolManager, count: u8) -> Vec<PageId> {
    let pages: Vec<PageId> = (0..count).map(|i| new_data_page(bpm, &[i])).collect();
    bpm.flush_all_pages().unwrap();
    for &page_id in &pages {
        bpm.delete_page(page_id).unwrap();
    }
    pages
}

/// Test data persistence across multiple eviction cycles.
#[test]
fn test_data_persistence_across_evictions() {
    let (bpm, _dir) = create_bpm(2);

    // Create 5 pages with unique data (forces evictions)
    let page_ids: Vec<PageId> = (0u8..5)
        .map(|i| new_data_page(&bpm, &[i, i.wrapping_mul(3)]))
        .collect();

    // Read all back - verifies evicted pages were flushed
    for (i, &pid) in page_ids.iter().enumerate() {
        let guard = bpm.fetch_page_read(pid).unwrap();
        let i = i as u8;
        assert_eq!(guard.record(0), Some(&[i, i.wrapping_mul(3)][..]));
    }
    bpm.check_invariants().unwrap();
}

/// Test flush and reload across BPM instances.
#[test]
fn test_flush_and_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let data = b"persistent!";

    let pid;

    // First session: create and write
    {
        let bpm = BufferPoolManager::new(10, DiskManager::create(&path).unwrap());
        pid = new_data_page(&bpm, data);
        bpm.flush_all_pages().unwrap();
    }

    // Second session: verify data
    {
        let bpm = BufferPoolManager::new(10, DiskManager::open(&path).unwrap());
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(guard.page_type(), PageType::Data);
        assert_eq!(guard.record(0), Some(&data[..]));
    }
}

/// Test concurrent writers to different pages.
#[test]
fn test_concurrent_writers() {
    let (bpm, _dir) = create_bpm(10);
    let bpm = Arc::new(bpm);

    let page_ids: Vec<PageId> = (0..5).map(|_| new_data_page(&bpm, &[0])).collect();

    let mut handles = vec![];

    for (i, pid) in page_ids.iter().enumerate() {
        let bpm_clone = Arc::clone(&bpm);
        let pid = *pid;

        handles.push(thread::spawn(move || {
            for j in 0..50 {
                let mut guard = bpm_clone.fetch_page_write(pid).unwrap();
                let value = ((i * 50 + j) % 256) as u8;
                assert!(guard.update_record(0, &[value]));
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    // Verify each page has last written value
    for (i, &pid) in page_ids.iter().enumerate() {
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(guard.record(0), Some(&[((i * 50 + 49) % 256) as u8][..]));
    }
}

/// Threads missing on the same cold page all end up sharing one frame.
#[test]
fn test_concurrent_misses_on_one_page() {
    const THREADS: usize = 8;
    let (bpm, _dir) = create_bpm_with(THREADS * 2, EvictionPolicy::Lru);
    let bpm = Arc::new(bpm);
    let pid = cold_pages(&bpm, 1)[0];

    for _ in 0..300 {
        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let bpm = Arc::clone(&bpm);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let guard = bpm.fetch_page_read(pid).unwrap();
                    assert_eq!(guard.record(0), Some(&[0u8][..]));
                    guard.frame_id()
                })
            })
            .collect();

        let frames: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(frames.iter().all(|&f| f == frames[0]));

        assert_eq!(bpm.get_pin_count(pid), Some(0));
        assert_eq!(bpm.resident_page_count(), 1);
        assert_eq!(bpm.free_frame_count(), THREADS * 2 - 1);
        bpm.check_invariants().unwrap();
        bpm.delete_page(pid).unwrap();
    }
}

/// Readers cycling through more pages than frames never see another
/// page's bytes, even when a hit races the eviction of its page.
#[test]
fn test_hits_racing_evictions() {
    const THREADS: usize = 4;
    // A thread that loses a load race holds two frames for a moment.
    const FRAMES: usize = 2 * THREADS;
    for policy in EvictionPolicy::ALL {
        let (bpm, _dir) = create_bpm_with(FRAMES, policy);
        let bpm = Arc::new(bpm);
        let pages = Arc::new(cold_pages(&bpm, 12));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let bpm = Arc::clone(&bpm);
                let pages = Arc::clone(&pages);
                thread::spawn(move || {
                    for round in 0..400 {
                        let i = (round * (t + 1) + t) % pages.len();
                        let guard = bpm.fetch_page_read(pages[i]).unwrap();
                        assert_eq!(guard.page_id(), pages[i]);
                        assert_eq!(guard.record(0), Some(&[i as u8][..]));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        for &pid in pages.iter() {
            assert!(matches!(bpm.get_pin_count(pid), None | Some(0)));
        }
        assert!(bpm.resident_page_count() <= FRAMES);
        bpm.check_invariants().unwrap();
    }
}

/// Test stats accuracy under load.
#[test]
fn test_stats_accuracy() {
    let (bpm, _dir) = create_bpm(2);

    let pid = new_data_page(&bpm, b"x");

    // Multiple fetches = cache hits
    for _ in 0..5 {
        let _ = bpm.fetch_page_read(pid).unwrap();
    }

    let stats = bpm.stats().snapshot();
    assert_eq!(stats.cache_hits, 5);
    assert_eq!(stats.cache_misses, 0);

    // Force eviction
    new_data_page(&bpm, b"y");
    new_data_page(&bpm, b"z");

    let stats = bpm.stats().snapshot();
    assert!(stats.evictions >= 1);
    assert!(stats.pages_written >= 1);
}

#[test]
fn test_lru_trace_a_b_c_a() {
    let (bpm, _dir) = create_bpm_with(2, EvictionPolicy::Lru);
    let pages = cold_pages(&bpm, 3);
    let (a, b, c) = (pages[0], pages[1], pages[2]);

    for page_id in [a, b, c, a] {
        drop(bpm.fetch_page_read(page_id).unwrap());
    }
    assert!(bpm.is_resident(a));
    assert!(!bpm.is_resident(b));

    drop(bpm.fetch_page_read(b).unwrap());
    assert!(!bpm.is_resident(c));
}

#[test]
fn test_flush_all_twice_writes_nothing_new() {
    let (bpm, _dir) = create_bpm(4);
    for i in 0..3u8 {
        new_data_page(&bpm, &[i]);
    }

    bpm.flush_all_pages().unwrap();
    let after_first = bpm.stats().snapshot();
    bpm.flush_all_pages().unwrap();
    let after_second = bpm.stats().snapshot();

    assert_eq!(after_first.pages_written, 3);
    assert_eq!(after_second.since(&after_first).pages_written, 0);
}

#[test]
fn test_every_policy_preserves_data() {
    for policy in EvictionPolicy::ALL {
        let (bpm, _dir) = create_bpm_with(3, policy);
        let pages: Vec<PageId> = (0..12u8).map(|i| new_data_page(&bpm, &[i; 8])).collect();

        for round in 0..3 {
            for (i, &page_id) in pages.iter().enumerate().skip(round) {
                let guard = bpm.fetch_page_read(page_id).unwrap();
                assert_eq!(guard.record(0), Some(&[i as u8; 8][..]), "{} lost page {}", policy, i);
            }
        }
        bpm.check_invariants().unwrap();
    }
}

#[test]
fn test_policy_switch_mid_workload() {
    let (bpm, _dir) = create_bpm_with(3, EvictionPolicy::Fifo);
    let pages: Vec<PageId> = (0..6u8).map(|i| new_data_page(&bpm, &[i])).collect();

    let pinned = bpm.fetch_page_read(pages[5]).unwrap();
    bpm.set_policy(EvictionPolicy::Lfu);
    assert_eq!(bpm.policy(), EvictionPolicy::Lfu);

    for &page_id in &pages[..5] {
        drop(bpm.fetch_page_read(page_id).unwrap());
    }
    assert!(bpm.is_resident(pages[5]));
    drop(pinned);
    bpm.check_invariants().unwrap();
}

fn policy_strategy() -> impl Strategy<Value = EvictionPolicy> {
    prop::sample::select(EvictionPolicy::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Residency never exceeds capacity, and the same trace leaves the same
    /// pages resident.
    #[test]
    fn prop_capacity_and_determinism(
        policy in policy_strategy(),
        capacity in 2usize..5,
        trace in prop::collection::vec(0usize..8, 1..60),
    ) {
        let run = || {
            let (bpm, dir) = create_bpm_with(capacity, policy);
            let pages = cold_pages(&bpm, 8);
            for &i in &trace {
                drop(bpm.fetch_page_read(pages[i]).unwrap());
                assert!(bpm.resident_page_count() <= capacity);
            }
            bpm.check_invariants().unwrap();
            let resident: Vec<bool> = pages.iter().map(|&p| bpm.is_resident(p)).collect();
            drop(dir);
            resident
        };

        let first = run();
        let second = run();
        prop_assert_eq!(first.iter().filter(|&&r| r).count() <= capacity, true);
        prop_assert_eq!(first, second);
    }
}
