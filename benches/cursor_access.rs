use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use graphpage::common::config::SwapperConfig;
use graphpage::cursor::{CompositePageCursor, PageCursor, StandalonePageCursor};
use graphpage::storage::fs::{EphemeralFileSystem, FileSystem};
use graphpage::storage::{PageSwapper, SingleFilePageSwapper};
use graphpage::{CursorMode, PageId, PagedFile, DEFAULT_PAGE_SIZE};

const RECORDS_PER_PAGE: i32 = (DEFAULT_PAGE_SIZE / 8) as i32;

fn cursor_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("cursor/access");

    group.throughput(Throughput::Elements(RECORDS_PER_PAGE as u64));
    group.bench_function("standalone_get_long", |b| {
        let mut cursor = StandalonePageCursor::new(PageId::new(0), DEFAULT_PAGE_SIZE);
        b.iter(|| {
            let mut sum = 0i64;
            for i in 0..RECORDS_PER_PAGE {
                sum = sum.wrapping_add(cursor.get_long_at(i * 8));
            }
            black_box(sum)
        });
    });

    group.throughput(Throughput::Elements(1));
    group.bench_function("composite_straddling_long", |b| {
        let mut first = StandalonePageCursor::new(PageId::new(0), DEFAULT_PAGE_SIZE);
        let mut second = StandalonePageCursor::new(PageId::new(1), DEFAULT_PAGE_SIZE);
        first.set_offset(DEFAULT_PAGE_SIZE as i32 - 3);
        let mut cursor = CompositePageCursor::compose(&mut first, 3, &mut second, 5);
        b.iter(|| black_box(cursor.get_long_at(0)));
    });

    group.finish();
}

fn paged_file_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("paged_file/read");
    let fs: Arc<dyn FileSystem> = Arc::new(EphemeralFileSystem::new());
    let swapper = SingleFilePageSwapper::open(
        fs,
        "/bench/nodes",
        DEFAULT_PAGE_SIZE,
        SwapperConfig::default().with_create(true),
    )
    .expect("swapper");
    let file = PagedFile::new(Arc::new(swapper), 16).expect("paged file");
    {
        let mut writer = file.io(PageId::new(0), CursorMode::Write).expect("cursor");
        for page in 0..64i64 {
            assert!(writer.next().expect("next"));
            writer.put_long(page);
        }
    }

    group.throughput(Throughput::Elements(64));
    group.bench_function("scan_with_retry", |b| {
        b.iter(|| {
            let mut cursor = file.io(PageId::new(0), CursorMode::Read).expect("cursor");
            let mut sum = 0i64;
            while cursor.next().expect("next") {
                loop {
                    let value = cursor.get_long_at(0);
                    if !cursor.should_retry().expect("retry") {
                        sum += value;
                        break;
                    }
                }
            }
            black_box(sum)
        });
    });

    group.bench_function("swapper_read_page", |b| {
        let swapper = file.swapper();
        let mut page = vec![0u8; DEFAULT_PAGE_SIZE];
        file.flush_and_force().expect("flush");
        b.iter(|| black_box(swapper.read(PageId::new(7), &mut page).expect("read")));
    });

    group.finish();
}

criterion_group!(benches, cursor_access, paged_file_access);
criterion_main!(benches);
