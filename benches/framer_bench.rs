//! Liu 管线性能基准测试.
//!
//! 覆盖分帧热路径: 起始码扫描、单元提取与长度前缀封装.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use liu::codec::nal::NalUnit;
use liu::stream::AnnexBFramer;

/// 构造含 `count` 个切片单元的 Annex B 码流, 每个单元约 `unit_size` 字节
fn make_annex_b_stream(count: usize, unit_size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(count * (unit_size + 4));
    for i in 0..count {
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
        data.push(if i == 0 { 0x65 } else { 0x41 });
        for j in 0..unit_size {
            // 避开会构成起始码的连续零
            data.push((j % 251 + 1) as u8);
        }
    }
    data.extend_from_slice(&[0x00, 0x00, 0x01]);
    data
}

fn bench_framer_large_chunks(c: &mut Criterion) {
    let stream = make_annex_b_stream(200, 1024);
    c.bench_function("framer_200x1k_64k_chunks", |b| {
        b.iter(|| {
            let mut framer = AnnexBFramer::new();
            let mut total = 0usize;
            for chunk in stream.chunks(64 * 1024) {
                total += framer.push(black_box(chunk)).len();
            }
            black_box(total)
        })
    });
}

fn bench_framer_small_chunks(c: &mut Criterion) {
    let stream = make_annex_b_stream(200, 1024);
    c.bench_function("framer_200x1k_1400b_chunks", |b| {
        b.iter(|| {
            let mut framer = AnnexBFramer::new();
            let mut total = 0usize;
            for chunk in stream.chunks(1400) {
                total += framer.push(black_box(chunk)).len();
            }
            black_box(total)
        })
    });
}

fn bench_length_prefix_wrap(c: &mut Criterion) {
    let mut payload = vec![0x65u8];
    payload.extend((0..4096u32).map(|i| (i % 251 + 1) as u8));
    let nal = NalUnit::parse(payload).unwrap();
    c.bench_function("length_prefix_4k_nal", |b| {
        b.iter(|| black_box(nal.to_length_prefixed()))
    });
}

criterion_group!(
    benches,
    bench_framer_large_chunks,
    bench_framer_small_chunks,
    bench_length_prefix_wrap
);
criterion_main!(benches);
