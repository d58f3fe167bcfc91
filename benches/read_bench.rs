use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::io::Cursor;
use zipcore::{open_reader, open_writer, AddOptions, Method, WriterOptions};

fn generate_compressible_data(size: usize) -> Vec<u8> {
    let pattern = b"The quick brown fox jumps over the lazy dog. ";
    let mut data = Vec::with_capacity(size);
    while data.len() < size {
        data.extend_from_slice(pattern);
    }
    data.truncate(size);
    data
}

fn generate_random_data(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state = 0x12345678u32;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

fn build_single_entry_archive(data: &[u8], method: Method) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut writer = open_writer(&mut buf, WriterOptions::default()).unwrap();
    writer
        .add_bytes(
            b"test.bin",
            data,
            AddOptions {
                method: Some(method),
                ..Default::default()
            },
        )
        .unwrap();
    writer.close().unwrap();
    buf
}

fn bench_read_compressible_data(c: &mut Criterion) {
    let sizes = vec![
        100 * 1024,       // 100KB
        1024 * 1024,      // 1MB
        10 * 1024 * 1024, // 10MB
    ];

    for size in sizes {
        let mut group = c.benchmark_group(format!("read_compressible_{}", format_size(size)));
        group.throughput(Throughput::Bytes(size as u64));

        let data = generate_compressible_data(size);
        let archive_bytes = build_single_entry_archive(&data, Method::Deflate);

        group.bench_function(BenchmarkId::new("deflate", size), |b| {
            b.iter(|| {
                let mut archive = open_reader(Cursor::new(&archive_bytes)).unwrap();
                let entries: Vec<_> = archive.entries().to_vec();
                let mut buf = Vec::new();
                for entry in &entries {
                    archive.extract(entry, black_box(&mut buf)).unwrap();
                    buf.clear();
                }
            });
        });

        group.finish();
    }
}

fn bench_read_random_data(c: &mut Criterion) {
    let sizes = vec![100 * 1024, 1024 * 1024]; // 100KB, 1MB

    for size in sizes {
        let mut group = c.benchmark_group(format!("read_random_{}", format_size(size)));
        group.throughput(Throughput::Bytes(size as u64));

        let data = generate_random_data(size);
        let archive_bytes = build_single_entry_archive(&data, Method::Deflate);

        group.bench_function(BenchmarkId::new("deflate", size), |b| {
            b.iter(|| {
                let mut archive = open_reader(Cursor::new(&archive_bytes)).unwrap();
                let entries: Vec<_> = archive.entries().to_vec();
                let mut buf = Vec::new();
                for entry in &entries {
                    archive.extract(entry, black_box(&mut buf)).unwrap();
                    buf.clear();
                }
            });
        });

        group.finish();
    }
}

fn bench_read_multiple_entries(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_multiple_entries");

    let entry_count = 100;
    let entry_size = 10 * 1024; // 10KB per entry
    group.throughput(Throughput::Bytes((entry_count * entry_size) as u64));

    let data = generate_compressible_data(entry_size);

    let mut buf = Vec::new();
    let mut writer = open_writer(&mut buf, WriterOptions::default()).unwrap();
    for i in 0..entry_count {
        writer
            .add_bytes(
                format!("file_{}.txt", i).as_bytes(),
                &data,
                AddOptions {
                    method: Some(Method::Deflate),
                    ..Default::default()
                },
            )
            .unwrap();
    }
    writer.close().unwrap();

    group.bench_function("deflate_100_entries", |b| {
        b.iter(|| {
            let mut archive = open_reader(Cursor::new(&buf)).unwrap();
            let entries: Vec<_> = archive.entries().to_vec();
            let mut out = Vec::new();
            for entry in &entries {
                archive.extract(entry, black_box(&mut out)).unwrap();
                out.clear();
            }
        });
    });

    group.finish();
}

fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{}KB", bytes / 1024)
    } else {
        format!("{}MB", bytes / (1024 * 1024))
    }
}

criterion_group!(
    benches,
    bench_read_compressible_data,
    bench_read_random_data,
    bench_read_multiple_entries
);
criterion_main!(benches);
