//! Integration tests for the paged file and its cursors.
//!
//! These tests verify cross-component behavior that unit tests don't cover:
//! persistence across sessions, eviction under a small pool, and the
//! optimistic read protocol under concurrent writers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use graphpage::common::config::SwapperConfig;
use graphpage::cursor::{CompositePageCursor, PageCursor};
use graphpage::storage::fs::{DefaultFileSystem, EphemeralFileSystem, FileSystem};
use graphpage::storage::SingleFilePageSwapper;
use graphpage::{CursorMode, Error, PageId, PagedFile};
use tempfile::tempdir;

const PAGE: usize = 128;

fn create_paged_file(fs: Arc<dyn FileSystem>, path: &str, pool_size: usize) -> PagedFile {
    let swapper = SingleFilePageSwapper::open(
        fs,
        path,
        PAGE,
        SwapperConfig::default().with_create(true),
    )
    .unwrap();
    PagedFile::new(Arc::new(swapper), pool_size).unwrap()
}

fn ephemeral(pool_size: usize) -> PagedFile {
    create_paged_file(Arc::new(EphemeralFileSystem::new()), "/db/nodes", pool_size)
}

/// Read the long at `offset` of `page`, retrying until a consistent value
/// is seen.
fn read_long(file: &PagedFile, page: u64, offset: i32) -> i64 {
    let mut cursor = file.io(PageId::new(page), CursorMode::Read).unwrap();
    assert!(cursor.next().unwrap());
    loop {
        let value = cursor.get_long_at(offset);
        if !cursor.should_retry().unwrap() {
            assert!(!cursor.check_and_clear_bounds_flag());
            return value;
        }
    }
}

#[test]
fn test_data_persists_across_evictions() {
    let file = ephemeral(2);

    {
        let mut cursor = file.io(PageId::new(0), CursorMode::Write).unwrap();
        for i in 0..6i64 {
            assert!(cursor.next().unwrap());
            cursor.put_long(i);
            cursor.put_long(i * 3);
        }
    }
    assert_eq!(file.last_page_id(), Some(PageId::new(5)));
    assert!(file.stats().snapshot().evictions >= 4);

    for i in 0..6u64 {
        assert_eq!(read_long(&file, i, 0), i as i64);
        assert_eq!(read_long(&file, i, 8), i as i64 * 3);
    }
}

#[test]
fn test_data_persists_across_sessions() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("relationships.db");
    let path = path.to_str().unwrap();
    let fs: Arc<dyn FileSystem> = Arc::new(DefaultFileSystem::new());

    {
        let file = create_paged_file(Arc::clone(&fs), path, 4);
        let mut cursor = file.io(PageId::new(0), CursorMode::Write).unwrap();
        for i in 0..3u8 {
            assert!(cursor.next().unwrap());
            cursor.put_bytes(b"persistent!");
            cursor.put_byte(i);
        }
        cursor.close();
        file.close().unwrap();
    }

    let file = create_paged_file(fs, path, 4);
    assert_eq!(file.last_page_id(), Some(PageId::new(2)));

    let mut cursor = file.io(PageId::new(0), CursorMode::Read).unwrap();
    let mut seen = 0u8;
    while cursor.next().unwrap() {
        let mut bytes = [0u8; 11];
        cursor.get_bytes(&mut bytes);
        assert_eq!(&bytes, b"persistent!");
        assert_eq!(cursor.get_byte(), seen);
        seen += 1;
    }
    assert_eq!(seen, 3);
}

#[test]
fn test_closed_file_rejects_new_cursors() {
    let file = ephemeral(2);
    file.close().unwrap();
    file.close().unwrap();
    assert!(file.io(PageId::new(0), CursorMode::Read).is_err());
    assert!(file.swapper().force().is_err());
}

#[test]
fn test_record_straddling_two_pages() {
    let file = ephemeral(4);
    {
        let mut first = file.io(PageId::new(0), CursorMode::Write).unwrap();
        assert!(first.next().unwrap());
        let mut second = file.io(PageId::new(1), CursorMode::Write).unwrap();
        assert!(second.next().unwrap());

        first.set_offset(PAGE as i32 - 3);
        let mut record = CompositePageCursor::compose(&mut first, 3, &mut second, 5);
        record.put_long(0x0102_0304_0506_0708);
        assert!(!record.check_and_clear_bounds_flag());
        assert!(record.is_write_locked());
    }

    let mut first = file.io(PageId::new(0), CursorMode::Read).unwrap();
    assert!(first.next().unwrap());
    let mut second = file.io(PageId::new(1), CursorMode::Read).unwrap();
    assert!(second.next().unwrap());
    assert_eq!(first.get_byte_at(PAGE as i32 - 1), 0x03);
    assert_eq!(second.get_byte_at(0), 0x04);

    first.set_offset(PAGE as i32 - 3);
    let mut record = CompositePageCursor::compose(first, 3, second, 5);
    loop {
        let value = record.get_long();
        if !record.should_retry().unwrap() {
            assert_eq!(value, 0x0102_0304_0506_0708);
            break;
        }
    }
    assert!(!record.is_write_locked());
}

#[test]
fn test_concurrent_readers_never_see_torn_pairs() {
    const PAGES: u64 = 12;
    const WRITES: i64 = 500;

    let file = ephemeral(8);
    {
        let mut cursor = file.io(PageId::new(0), CursorMode::Write).unwrap();
        for _ in 0..PAGES {
            assert!(cursor.next().unwrap());
        }
    }

    let done = AtomicBool::new(false);
    thread::scope(|s| {
        let writers: Vec<_> = (0..4u64)
            .map(|w| {
                let file = &file;
                s.spawn(move || {
                    for n in 1..=WRITES {
                        let page = (w * 3 + n as u64) % PAGES;
                        let mut cursor = file.io(PageId::new(page), CursorMode::Write).unwrap();
                        assert!(cursor.next().unwrap());
                        let value = cursor.get_long_at(0) + 1;
                        cursor.put_long_at(0, value);
                        cursor.put_long_at(64, -value);
                    }
                })
            })
            .collect();

        for r in 0..4u64 {
            let file = &file;
            let done = &done;
            s.spawn(move || {
                let mut page = r;
                while !done.load(Ordering::Acquire) {
                    let mut cursor = file.io(PageId::new(page), CursorMode::Read).unwrap();
                    assert!(cursor.next().unwrap());
                    let (a, b) = loop {
                        let a = cursor.get_long_at(0);
                        let b = cursor.get_long_at(64);
                        if !cursor.should_retry().unwrap() {
                            break (a, b);
                        }
                    };
                    assert_eq!(a, -b, "torn read of page {page}");
                    page = (page + 1) % PAGES;
                }
            });
        }

        for writer in writers {
            writer.join().unwrap();
        }
        done.store(true, Ordering::Release);
    });

    let total: i64 = (0..PAGES).map(|p| read_long(&file, p, 0)).sum();
    assert_eq!(total, 4 * WRITES);
}

#[test]
fn test_flush_and_force_writes_dirty_pages() {
    let fs: Arc<dyn FileSystem> = Arc::new(EphemeralFileSystem::new());
    let file = create_paged_file(Arc::clone(&fs), "/db/labels", 4);
    {
        let mut cursor = file.io(PageId::new(2), CursorMode::Write).unwrap();
        assert!(cursor.next().unwrap());
        cursor.put_int(7);
    }
    assert_eq!(fs.file_size("/db/labels".as_ref()).unwrap(), 0);

    file.flush_and_force().unwrap();
    assert_eq!(fs.file_size("/db/labels".as_ref()).unwrap(), 3 * PAGE as u64);
    assert_eq!(file.stats().snapshot().flushes, 1);
}

#[test]
fn test_flush_racing_evictions_keeps_pages_in_place() {
    const PAGES: u64 = 8;
    const ROUNDS: i64 = 300;

    let fs: Arc<dyn FileSystem> = Arc::new(EphemeralFileSystem::new());
    let file = create_paged_file(Arc::clone(&fs), "/db/properties", 2);

    let done = AtomicBool::new(false);
    thread::scope(|s| {
        let flusher = s.spawn(|| {
            while !done.load(Ordering::Acquire) {
                file.flush_and_force().unwrap();
            }
        });

        for round in 0..ROUNDS {
            for page in 0..PAGES {
                let mut cursor = file.io(PageId::new(page), CursorMode::Write).unwrap();
                assert!(cursor.next().unwrap());
                cursor.put_long_at(0, page as i64 + 1000);
                cursor.put_long_at(8, round);
            }
        }
        done.store(true, Ordering::Release);
        flusher.join().unwrap();
    });
    file.close().unwrap();
    drop(file);

    let file = create_paged_file(fs, "/db/properties", 2);
    for page in 0..PAGES {
        assert_eq!(read_long(&file, page, 0), page as i64 + 1000, "page {page}");
        assert_eq!(read_long(&file, page, 8), ROUNDS - 1, "page {page}");
    }
}

#[test]
fn test_close_with_bound_writer_keeps_its_write() {
    let fs: Arc<dyn FileSystem> = Arc::new(EphemeralFileSystem::new());
    let file = create_paged_file(Arc::clone(&fs), "/db/strings", 2);

    let mut writer = file.io(PageId::new(0), CursorMode::Write).unwrap();
    assert!(writer.next().unwrap());
    writer.put_long(77);
    assert!(matches!(file.close(), Err(Error::FileInUse { pinned: 1 })));

    // The file stays usable until the writer lets go.
    assert!(file.io(PageId::new(1), CursorMode::Read).is_ok());
    writer.close();
    drop(writer);
    file.close().unwrap();
    drop(file);

    let file = create_paged_file(fs, "/db/strings", 2);
    assert_eq!(read_long(&file, 0, 0), 77);
}
