//! Performance benchmarks for skyport
//!
//! This benchmark suite measures:
//! - Storefront initialization over empty and populated storage
//! - Cart mutations, each of which persists the cart
//! - Partition encoding and decoding across partition sizes
//!
//! Run with: cargo bench
//! View results: open target/criterion/report/index.html

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use skyport::entity::EntityId;
use skyport::models::{Product, Series};
use skyport::serialization::{decode_partition, encode_partition};
use skyport::storage::MemoryStorage;
use skyport::Storefront;
use std::collections::BTreeMap;
use std::hint::black_box;

// ============================================================================
// Benchmark Fixtures
// ============================================================================

fn bench_product(id: EntityId) -> Product {
    Product::new(
        id,
        format!("Bench drone {}", id),
        "A drone used for benchmarking",
        799.0 + f64::from(id),
        25,
        249.0,
        34.0,
        Series {
            name: "Mini".to_string(),
            model: "Bench".to_string(),
            description: "Benchmarks".to_string(),
        },
    )
}

fn bench_partition(size: u32) -> BTreeMap<EntityId, Product> {
    (1..=size).map(|id| (id, bench_product(id))).collect()
}

// ============================================================================
// Group 1: Initialization Benchmarks
// ============================================================================

fn initialization_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("initialization");
    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");

    group.bench_function("fresh_storage", |b| {
        b.to_async(&rt).iter(|| async {
            let store = Storefront::new(MemoryStorage::new()).expect("Failed to build");
            store.initialize().await.expect("Failed to initialize");
        });
    });

    // Storage already seeded by another tab
    let storage = MemoryStorage::new();
    rt.block_on(async {
        let seeder = Storefront::new(storage.clone()).expect("Failed to build");
        seeder.initialize().await.expect("Failed to initialize");
    });
    let storage = &storage;
    group.bench_function("seeded_storage", |b| {
        b.to_async(&rt).iter(|| async move {
            let store = Storefront::new(storage.open_tab()).expect("Failed to build");
            store.initialize().await.expect("Failed to initialize");
        });
    });

    group.finish();
}

// ============================================================================
// Group 2: Cart Benchmarks
// ============================================================================

fn cart_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("cart");
    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");

    let store = Storefront::new(MemoryStorage::new()).expect("Failed to build");
    rt.block_on(store.initialize()).expect("Failed to initialize");
    let product_id = store.products().get_all_products()[0].id;

    group.bench_function("add_then_remove", |b| {
        b.iter(|| {
            store
                .products()
                .add_product_to_cart(black_box(product_id), 1)
                .expect("Failed to add");
            store
                .products()
                .remove_product_from_cart(black_box(product_id), 1)
                .expect("Failed to remove");
        });
    });

    group.bench_function("clamped_noop", |b| {
        b.iter(|| {
            store
                .products()
                .remove_product_from_cart(black_box(product_id), 1)
                .expect("Failed to remove")
        });
    });

    group.finish();
}

// ============================================================================
// Group 3: Serialization Benchmarks
// ============================================================================

fn serialization_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization");

    for size in [10u32, 100, 1_000].iter() {
        let partition = bench_partition(*size);

        group
            .throughput(Throughput::Elements(u64::from(*size)))
            .bench_with_input(BenchmarkId::new("encode", size), &partition, |b, partition| {
                b.iter(|| encode_partition(black_box(partition)));
            });

        let encoded = encode_partition(&partition).expect("Failed to encode");
        group
            .throughput(Throughput::Elements(u64::from(*size)))
            .bench_with_input(BenchmarkId::new("decode", size), &encoded, |b, encoded| {
                b.iter(|| decode_partition::<Product>(black_box(encoded)));
            });
    }

    group.finish();
}

// ============================================================================
// Benchmark Registration
// ============================================================================

criterion_group!(
    benches,
    initialization_benchmarks,
    cart_benchmarks,
    serialization_benchmarks
);
criterion_main!(benches);
