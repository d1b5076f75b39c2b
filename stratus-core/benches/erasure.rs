//! Benchmarks for Reed-Solomon encode/decode

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use stratus_core::erasure::{ErasureCodec, ErasureConfig};

fn bench_erasure(c: &mut Criterion) {
    let mut group = c.benchmark_group("erasure");

    for &(d, p) in &[(2usize, 1usize), (4, 2), (10, 4)] {
        let codec = ErasureCodec::new(ErasureConfig::new(d, p).unwrap()).unwrap();
        let data = vec![0x5Au8; 1024 * 1024];
        group.throughput(Throughput::Bytes(data.len() as u64));

        group.bench_function(format!("encode/{}+{}", d, p), |b| {
            b.iter(|| codec.encode(black_box(&data)).unwrap())
        });

        let shares = codec.encode(&data).unwrap();
        group.bench_function(format!("decode_degraded/{}+{}", d, p), |b| {
            b.iter(|| {
                let mut opts: Vec<Option<Vec<u8>>> =
                    shares.iter().cloned().map(Some).collect();
                // drop the maximum tolerated number of shares
                for slot in opts.iter_mut().take(p) {
                    *slot = None;
                }
                codec.decode(black_box(&mut opts)).unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_erasure);
criterion_main!(benches);
