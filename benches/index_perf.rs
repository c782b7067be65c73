use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::prelude::*;

use kestrel_index::build::IndexBuilder;
use kestrel_index::smem::{SmemEngine, SmemScratch};
use kestrel_index::IndexOpts;

fn random_text(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect()
}

fn bench_rank_and_extension(c: &mut Criterion) {
    let text = random_text(1 << 20, 42);
    let bwt = IndexBuilder::from_text(&text, 8).expect("build");
    let mut rng = StdRng::seed_from_u64(7);
    let positions: Vec<i64> = (0..1024).map(|_| rng.gen_range(0..bwt.seq_len)).collect();

    let mut group = c.benchmark_group("rank");
    group.throughput(Throughput::Elements(positions.len() as u64));
    group.bench_function("occ_all_bases", |b| {
        b.iter(|| {
            let mut acc = 0i64;
            for &p in &positions {
                let occ = kestrel_index::fm_index::get_occ_all_bases(&bwt, black_box(p));
                acc += occ[0] + occ[3];
            }
            acc
        })
    });
    group.finish();
}

fn bench_sa_lookup(c: &mut Criterion) {
    let text = random_text(1 << 20, 43);
    let bwt = IndexBuilder::from_text(&text, 8).expect("build");
    let mut rng = StdRng::seed_from_u64(8);
    let positions: Vec<i64> = (0..4096).map(|_| rng.gen_range(0..bwt.seq_len)).collect();

    let mut group = c.benchmark_group("sampled_sa");
    group.throughput(Throughput::Elements(positions.len() as u64));
    group.bench_function("scalar_walk", |b| {
        b.iter(|| {
            let mut acc = 0i64;
            for &p in &positions {
                acc ^= bwt.get_sa_entry(black_box(p));
            }
            acc
        })
    });
    group.bench_function("batched_walk", |b| {
        let mut coords = Vec::new();
        b.iter(|| {
            bwt.locate_batch(black_box(&positions), &mut coords);
            coords[0]
        })
    });
    group.finish();
}

fn bench_smem_search(c: &mut Criterion) {
    let text = random_text(1 << 20, 44);
    let bwt = IndexBuilder::from_text(&text, 8).expect("build");
    let opts = IndexOpts::default();
    let engine = SmemEngine::new(&bwt, opts);

    let mut rng = StdRng::seed_from_u64(9);
    let reads: Vec<Vec<u8>> = (0..64)
        .map(|_| {
            let start = rng.gen_range(0..text.len() - 150);
            text[start..start + 150]
                .iter()
                .map(|&b| match b {
                    b'A' => 0u8,
                    b'C' => 1,
                    b'G' => 2,
                    _ => 3,
                })
                .collect()
        })
        .collect();

    let mut group = c.benchmark_group("smem");
    group.throughput(Throughput::Elements(reads.len() as u64));
    group.bench_function("all_pos_150bp", |b| {
        let mut scratch = SmemScratch::new();
        b.iter(|| {
            let mut out = Vec::new();
            for (rid, q) in reads.iter().enumerate() {
                engine.smems_all_pos(q, rid as i32, 1, &mut out, &mut scratch);
            }
            out.len()
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_rank_and_extension,
    bench_sa_lookup,
    bench_smem_search
);
criterion_main!(benches);
