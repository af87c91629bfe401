//! Benchmarks for the backup store
//!
//! Performance-critical paths:
//! - `BackupStore::create_backup`: Copy (reflink where supported) before every write
//! - `BackupStore::restore_backup`: Copy back on undo or rollback
//! - `BackupStore::cleanup_expired`: Directory scan during housekeeping

#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use redline_kernel::vfs::BackupStore;
use std::fs;
use std::time::Duration;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Runtime::new().unwrap()
}

fn bench_create_backup(c: &mut Criterion) {
    let mut group = c.benchmark_group("backup_store/create_backup");
    let rt = runtime();

    for size in [1024usize, 65_536, 1_048_576] {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = temp_dir.path().join("source.txt");
        fs::write(&source, vec![b'x'; size]).unwrap();
        let store = BackupStore::new(temp_dir.path().join("backups"));

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{size}_bytes")),
            &size,
            |b, _| {
                b.to_async(&rt).iter(|| async {
                    let backup = store.create_backup(black_box(&source)).await.unwrap();
                    if let Some(backup) = backup {
                        store.delete_backup(&backup).await;
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_restore_backup(c: &mut Criterion) {
    let rt = runtime();
    let temp_dir = tempfile::tempdir().unwrap();
    let source = temp_dir.path().join("source.txt");
    fs::write(&source, vec![b'y'; 65_536]).unwrap();
    let store = BackupStore::new(temp_dir.path().join("backups"));
    let backup = rt
        .block_on(store.create_backup(&source))
        .unwrap()
        .unwrap();
    let target = temp_dir.path().join("restored.txt");

    c.bench_function("backup_store/restore_backup", |b| {
        b.to_async(&rt)
            .iter(|| async { store.restore_backup(black_box(&backup), &target).await.unwrap() });
    });
}

fn bench_cleanup_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("backup_store/cleanup_scan");
    let rt = runtime();

    for count in [10usize, 100, 1000] {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(temp_dir.path());
        for i in 0..count {
            fs::write(temp_dir.path().join(format!("file{i}.txt.bak")), "x").unwrap();
        }

        // Nothing is old enough to remove, so every iteration scans the same set.
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{count}_files")),
            &count,
            |b, _| {
                b.to_async(&rt)
                    .iter(|| async { store.cleanup_expired(Duration::from_secs(3600)).await });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_create_backup,
    bench_restore_backup,
    bench_cleanup_scan
);
criterion_main!(benches);
