use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use capstream_core::{CoreAccount, Currency};
use capstream_ledger::{InMemoryLedgerStore, LedgerEngine, NewEntry, NewTransaction, ReferenceType};

fn capture(reference_id: String, amount_micros: i64) -> NewTransaction {
    NewTransaction {
        description: "payment capture".to_string(),
        currency: Currency::Usd,
        reference_id,
        reference_type: ReferenceType::PaymentEvent,
        created_by: "bench".to_string(),
        entries: vec![
            NewEntry::new(CoreAccount::AssetTreasury, amount_micros, Currency::Usd),
            NewEntry::new(CoreAccount::LiabilityReserve, -amount_micros, Currency::Usd),
        ],
    }
}

fn bench_record_transaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_transaction");
    group.throughput(Throughput::Elements(1));

    group.bench_function("two_leg_capture", |b| {
        let engine = LedgerEngine::new(InMemoryLedgerStore::new());
        let mut i: u64 = 0;
        b.iter(|| {
            i += 1;
            engine
                .record_transaction(capture(format!("evt_{i}"), 1_000_000))
                .unwrap();
        });
    });

    group.finish();
}

fn bench_balance_recomputation(c: &mut Criterion) {
    let mut group = c.benchmark_group("account_balance");

    for size in [100usize, 1_000, 10_000] {
        let engine = LedgerEngine::new(InMemoryLedgerStore::new());
        for i in 0..size {
            engine
                .record_transaction(capture(format!("evt_{i}"), 1_000_000))
                .unwrap();
        }

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let balance = engine
                    .account_balance(&CoreAccount::AssetTreasury.into(), Currency::Usd)
                    .unwrap();
                black_box(balance.balance_micros)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_record_transaction, bench_balance_recomputation);
criterion_main!(benches);
