//! Benchmarks for VANET topology
//!
//! Measures performance of:
//! - Neighbor table construction (the per-tick O(n²) pass)
//! - Neighbor lookups
//! - Centroid and farthest-pair computation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use vanet_topology::{centroid, farthest_pair, NeighborTable, NodeId, Position, DEFAULT_DSRC_RANGE};

/// A four-lane highway strip with vehicles every 25 m.
fn highway(count: u64) -> Vec<(NodeId, Position)> {
    (0..count)
        .map(|i| {
            let lane = (i % 4) as f64;
            let slot = (i / 4) as f64;
            (NodeId(i), Position::new(slot * 25.0, lane * 3.5))
        })
        .collect()
}

/// Benchmark neighbor table construction at different fleet sizes
fn bench_table_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("neighbor_table_build");

    for &count in &[50u64, 200, 500, 1000] {
        let nodes = highway(count);
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::from_parameter(count), &nodes, |b, nodes| {
            b.iter(|| NeighborTable::build(black_box(nodes.clone()), DEFAULT_DSRC_RANGE))
        });
    }
    group.finish();
}

/// Benchmark adjacency queries on a built table
fn bench_lookups(c: &mut Criterion) {
    let table = NeighborTable::build(highway(1000), DEFAULT_DSRC_RANGE);
    let mut group = c.benchmark_group("neighbor_lookup");

    group.bench_function("degree", |b| b.iter(|| table.degree(black_box(NodeId(500)))));
    group.bench_function("are_neighbors", |b| {
        b.iter(|| table.are_neighbors(black_box(NodeId(500)), black_box(NodeId(520))))
    });
    group.finish();
}

/// Benchmark cluster geometry helpers at typical cluster sizes
fn bench_cluster_geometry(c: &mut Criterion) {
    let mut group = c.benchmark_group("cluster_geometry");

    for &count in &[5u64, 10, 20, 40] {
        let nodes = highway(count);
        group.bench_with_input(BenchmarkId::new("centroid", count), &nodes, |b, nodes| {
            b.iter(|| centroid(black_box(nodes).iter().map(|&(_, p)| p)))
        });
        group.bench_with_input(BenchmarkId::new("farthest_pair", count), &nodes, |b, nodes| {
            b.iter(|| farthest_pair(black_box(nodes)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_table_build, bench_lookups, bench_cluster_geometry);

criterion_main!(benches);
