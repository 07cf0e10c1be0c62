use std::hint::black_box;

use common::PaymentId;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    CheckoutRequest, ContentSelection, Customer, ServiceCatalog, TransactionRepository, distribute,
    map_gateway_status,
};
use store::InMemoryStore;

fn bench_distribute(c: &mut Criterion) {
    c.bench_function("domain/distribute_5", |b| {
        b.iter(|| distribute(black_box(1_017), black_box(5)).unwrap());
    });

    c.bench_function("domain/distribute_100", |b| {
        b.iter(|| distribute(black_box(1_000_000), black_box(100)).unwrap());
    });
}

fn bench_status_mapping(c: &mut Criterion) {
    let statuses = [
        "approved",
        "completed",
        "pending",
        "in_process",
        "in_mediation",
        "rejected",
        "cancelled",
        "refunded",
        "charged_back",
        "something_unknown",
    ];

    c.bench_function("domain/map_gateway_status", |b| {
        b.iter(|| {
            for status in statuses {
                black_box(map_gateway_status(black_box(status)));
            }
        });
    });
}

fn bench_create_transaction(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("domain/create_transaction_5_items", |b| {
        b.iter(|| {
            rt.block_on(async {
                let repository =
                    TransactionRepository::new(InMemoryStore::new(), ServiceCatalog::builtin());
                let request = CheckoutRequest {
                    customer: Customer::new("Ana", "ana@example.com"),
                    service_id: "instagram-likes".to_owned(),
                    payment_id: PaymentId::new("mp-bench"),
                    target_username: "someuser".to_owned(),
                    amount_cents: 1990,
                    quantity: 1_017,
                    content_items: (0..5)
                        .map(|index| {
                            ContentSelection::new(format!("https://instagram.com/p/C{index}/"))
                        })
                        .collect(),
                    qr_code: None,
                };
                repository.create_transaction(request).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_distribute,
    bench_status_mapping,
    bench_create_transaction,
);
criterion_main!(benches);
