//! Shard state table benchmarks.
//!
//! Steady-state reads of existing entries sit on the dispatch hot path and
//! must not take any table-wide lock.

#![allow(clippy::expect_used, clippy::unwrap_used, missing_docs)]

use std::hint::black_box;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use shardmeta_routing::{OpKind, Request, Response, RoleChange, ShardStateTable};
use shardmeta_types::{NodeId, ReplicationRole, ShardId, config::StateTableConfig};

fn populated_table() -> ShardStateTable {
    let table = ShardStateTable::new(StateTableConfig::default(), None);
    for shard in 1..=64 {
        let shard_id = ShardId::new(shard);
        for node in 1..=3 {
            table.group_state(shard_id).ensure_member(NodeId::new(shard_id, node));
        }
        table.update_role(NodeId::new(shard_id, 1), None, ReplicationRole::Master, 1);
    }
    table
}

fn bench_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_table/reads");
    group.throughput(Throughput::Elements(1));
    let table = populated_table();
    let node = NodeId::new(ShardId::new(17), 2);

    group.bench_function("rep_state", |b| {
        b.iter(|| black_box(table.rep_state(black_box(node))));
    });
    group.bench_function("select_write", |b| {
        b.iter(|| black_box(table.select_node(black_box(ShardId::new(17)), OpKind::Write)));
    });
    group.bench_function("select_read", |b| {
        b.iter(|| black_box(table.select_node(black_box(ShardId::new(17)), OpKind::Read)));
    });
    group.bench_function("rep_node_states", |b| {
        b.iter(|| black_box(table.rep_node_states()));
    });

    group.finish();
}

fn bench_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_table/updates");
    group.throughput(Throughput::Elements(1));
    let table = populated_table();
    let request = Request::read(b"user\x0042".to_vec());
    let plain = Response::builder().responder(NodeId::new(ShardId::new(9), 3)).log_position(10).build();
    let with_role = Response::builder()
        .responder(NodeId::new(ShardId::new(9), 2))
        .log_position(10)
        .role_change(RoleChange {
            master_id: Some(NodeId::new(ShardId::new(9), 1)),
            role: ReplicationRole::Replica,
            timestamp: 5,
        })
        .build();

    group.bench_function("response_plain", |b| {
        b.iter(|| table.update_from_response(black_box(&request), black_box(&plain), 3));
    });
    group.bench_function("response_with_role_change", |b| {
        b.iter(|| table.update_from_response(black_box(&request), black_box(&with_role), 3));
    });

    group.finish();
}

criterion_group!(benches, bench_reads, bench_updates);
criterion_main!(benches);
