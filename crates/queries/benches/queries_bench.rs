use criterion::{Criterion, criterion_group, criterion_main};
use ledger_store::{ActorId, InMemoryStockStore, NewLedgerEntry, StockKey, StockStore};
use queries::{HistoryRequest, InMemoryItemCatalog, ItemInfo, QueryFacade};

/// Populate a store with `warehouses` x `items` records, one entry each.
async fn populate(store: &InMemoryStockStore, warehouses: i64, items: i64) {
    for w in 1..=warehouses {
        for i in 1..=items {
            let quantity = (w * i) % 40 + 1;
            let entry = NewLedgerEntry::builder()
                .key(StockKey::new(w, i))
                .quantity_change(quantity)
                .resulting_quantity(quantity)
                .reason("initial stock")
                .actor_id(ActorId::new(1))
                .build()
                .unwrap();
            store.commit_mutation(0, entry).await.unwrap();
        }
    }
}

fn setup(rt: &tokio::runtime::Runtime) -> QueryFacade<InMemoryStockStore, InMemoryItemCatalog> {
    let store = InMemoryStockStore::new();
    let catalog = InMemoryItemCatalog::new();
    rt.block_on(async {
        populate(&store, 10, 100).await;
        for i in 1..=100 {
            catalog
                .insert(ItemInfo::new(i, format!("Item {i}"), i * 100))
                .await;
        }
    });
    QueryFacade::new(store, catalog)
}

fn bench_list_current_stock(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let facade = setup(&rt);

    c.bench_function("queries/list_current_stock_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                let views = facade.list_current_stock(None).await.unwrap();
                assert_eq!(views.len(), 1000);
            });
        });
    });
}

fn bench_list_low_stock(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let facade = setup(&rt);

    c.bench_function("queries/list_low_stock_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                facade.list_low_stock(10, None).await.unwrap();
            });
        });
    });
}

fn bench_history_page(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let facade = setup(&rt);

    c.bench_function("queries/history_page_50", |b| {
        b.iter(|| {
            rt.block_on(async {
                let page = facade
                    .get_history(HistoryRequest::new(50).offset(200))
                    .await
                    .unwrap();
                assert_eq!(page.entries.len(), 50);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_list_current_stock,
    bench_list_low_stock,
    bench_history_page,
);
criterion_main!(benches);
