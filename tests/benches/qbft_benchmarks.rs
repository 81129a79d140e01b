//! # QBFT Validator Benchmarks
//!
//! Hot paths of one duty:
//!
//! | Group | What | Per duty |
//! |-------|------|----------|
//! | signatures | share sign, verify, multi-signer aggregate verify | ~3n verifies |
//! | threshold | Lagrange reconstruction from a quorum of partials | 1 per operator |
//! | wire | fork codecs, encode + decode of a consensus envelope | ~4n frames |

use std::collections::BTreeMap;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use qv_01_messages::test_utils::{identifier, multi_signed, signed};
use qv_01_messages::{Message, SsvMessage};
use qv_03_controller::{ForkVersion, WireCodec};
use shared_crypto::test_utils::TestCommittee;
use shared_crypto::{reconstruct_signature, signing_root, KeyManager};
use shared_types::{OperatorId, FIRST_ROUND, POST_CONSENSUS_SIG_TYPE, QBFT_SIG_TYPE};

fn bench_signatures(c: &mut Criterion) {
    let mut group = c.benchmark_group("signatures");
    group.measurement_time(Duration::from_secs(10));

    let committee = TestCommittee::new(4);
    let km = committee.key_manager_for(1);
    let share_pk = committee.share_pair(1).public_key();
    let root = [7u8; 32];

    group.bench_function("share_sign_root", |b| {
        b.iter(|| black_box(km.sign_root(&root, QBFT_SIG_TYPE, &committee.domain, &share_pk).unwrap()))
    });

    let signature = km.sign_root(&root, QBFT_SIG_TYPE, &committee.domain, &share_pk).unwrap();
    group.bench_function("share_verify_root", |b| {
        b.iter(|| {
            black_box(
                km.verify(&root, QBFT_SIG_TYPE, &committee.domain, &signature, &share_pk)
                    .is_ok(),
            )
        })
    });

    let operators = committee.operators();
    for signers in [1usize, 3, 4] {
        let ids: Vec<OperatorId> = (1..=signers as u64).collect();
        let msg = Message::commit(0, FIRST_ROUND, identifier(&committee), b"value").unwrap();
        let aggregated = multi_signed(&committee, &ids, msg);
        group.throughput(Throughput::Elements(signers as u64));
        group.bench_with_input(BenchmarkId::new("signed_message_verify", signers), &aggregated, |b, m| {
            b.iter(|| black_box(m.verify(&committee.domain, &operators).is_ok()))
        });
    }

    group.finish();
}

fn bench_threshold(c: &mut Criterion) {
    let mut group = c.benchmark_group("threshold");
    group.measurement_time(Duration::from_secs(10));

    for size in [4u64, 7, 10, 13] {
        let committee = TestCommittee::new(size);
        let quorum = (2 * size as usize + 1).div_ceil(3);
        let root = signing_root(&[3u8; 32], &committee.domain, POST_CONSENSUS_SIG_TYPE);
        let partials: BTreeMap<OperatorId, _> = (1..=size)
            .take(quorum)
            .map(|id| (id, committee.share_pair(id).sign(&root)))
            .collect();

        group.bench_with_input(BenchmarkId::new("reconstruct", size), &partials, |b, p| {
            b.iter(|| black_box(reconstruct_signature(p).unwrap()))
        });
    }

    group.finish();
}

fn bench_wire(c: &mut Criterion) {
    let mut group = c.benchmark_group("wire");

    let committee = TestCommittee::new(4);
    let value = vec![0x5A; 512];
    let msg = Message::prepare(3, FIRST_ROUND, identifier(&committee), &value).unwrap();
    let envelope = SsvMessage::consensus(&signed(&committee, 1, msg)).unwrap();

    for version in [ForkVersion::V0, ForkVersion::V1] {
        let codec = WireCodec::new(version);
        let frame = codec.encode(&envelope).unwrap();
        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::new("encode", version.as_str()), &envelope, |b, e| {
            b.iter(|| black_box(codec.encode(e).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("decode", version.as_str()), &frame, |b, f| {
            b.iter(|| black_box(WireCodec::decode(f).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_signatures, bench_threshold, bench_wire);
criterion_main!(benches);
