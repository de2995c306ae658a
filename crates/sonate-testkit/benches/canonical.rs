//! Benchmarks for canonicalization, link hashing and Merkle proofs.
//!
//! Run with: cargo bench --package sonate-testkit --bench canonical

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

use sonate_core::{
    canonical_json, genesis_hash, verify_proof, HashChain, LinkSpec, MerkleTree, Sha256Hash,
};
use sonate_testkit::TestFixture;

fn bench_canonical_json(c: &mut Criterion) {
    let small = json!({ "b": 1, "a": [true, null, 2.5], "c": "text" });
    let nested = json!({
        "session_id": "s1",
        "turns": (0..50)
            .map(|i| json!({ "role": "user", "ts_ms": i, "content": format!("turn {i}") }))
            .collect::<Vec<_>>(),
        "derived": { "z": 1, "y": { "x": [1, 2, 3] } },
    });

    let mut group = c.benchmark_group("canonical_json");
    group.bench_function("small", |b| b.iter(|| canonical_json(black_box(&small))));
    group.bench_function("transcript_50_turns", |b| {
        b.iter(|| canonical_json(black_box(&nested)))
    });
    group.finish();
}

fn bench_link_creation(c: &mut Criterion) {
    let genesis = genesis_hash("bench");
    let payload = vec![0u8; 1024];

    let mut group = c.benchmark_group("hash_chain");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("create_link_1k", |b| {
        let chain = HashChain::new();
        b.iter(|| chain.create_link(LinkSpec::after(&genesis, payload.clone()).timestamp(1)))
    });
    group.finish();
}

fn bench_merkle(c: &mut Criterion) {
    let mut group = c.benchmark_group("merkle");
    for size in [16usize, 256, 4096] {
        let leaves: Vec<Sha256Hash> = (0..size)
            .map(|i| Sha256Hash::hash(&(i as u64).to_le_bytes()))
            .collect();
        group.bench_with_input(BenchmarkId::new("build", size), &leaves, |b, leaves| {
            b.iter(|| MerkleTree::build(leaves.clone()))
        });

        let Ok(tree) = MerkleTree::build(leaves.clone()) else {
            continue;
        };
        let leaf = leaves[size / 2];
        let Ok(proof) = tree.proof(&leaf) else {
            continue;
        };
        let root = tree.root();
        group.bench_with_input(BenchmarkId::new("verify_proof", size), &proof, |b, proof| {
            b.iter(|| verify_proof(black_box(&leaf), proof, &root))
        });
    }
    group.finish();
}

fn bench_receipt(c: &mut Criterion) {
    let fixture = TestFixture::with_seed([1u8; 32]);
    c.bench_function("receipt_chain_10", |b| b.iter(|| fixture.receipt_chain(10)));
}

criterion_group!(
    benches,
    bench_canonical_json,
    bench_link_creation,
    bench_merkle,
    bench_receipt
);
criterion_main!(benches);
