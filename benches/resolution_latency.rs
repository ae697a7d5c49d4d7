use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Runtime;
use uuid::Uuid;

use entitlr::catalog::{apply_seed, CatalogSeed};
use entitlr::domain::{Role, SubscriptionStatus};
use entitlr::observability::MetricsRegistry;
use entitlr::rules::{resolve_value, value};
use entitlr::storage::MemoryStorage;
use entitlr::Engine;

const CATALOG: &str = include_str!("../seed/catalog.yaml");

/// Engine over in-memory storage with one Premium business that has a
/// customized loyalty rule.
fn setup(rt: &Runtime) -> (Engine, Uuid) {
    rt.block_on(async {
        let engine = Engine::new(Arc::new(MemoryStorage::new()), Arc::new(MetricsRegistry::new()));
        let seed: CatalogSeed = serde_yaml::from_str(CATALOG).expect("valid catalog");
        apply_seed(engine.catalog(), &seed).await.expect("seed applies");

        let premium = engine
            .catalog()
            .list_plans()
            .await
            .expect("plans")
            .into_iter()
            .find(|p| p.name == "Premium")
            .expect("premium plan");

        let business = Uuid::new_v4();
        engine
            .entitlements()
            .subscribe(business, premium.id, SubscriptionStatus::Active)
            .await
            .expect("subscribe");
        engine
            .assignments()
            .customize(business, "LOYALTY_REFERRAL_POINTS", &json!(750), None)
            .await
            .expect("customize");

        (engine, business)
    })
}

fn bench_resolve_rule(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let (engine, business) = setup(&rt);

    c.bench_function("resolve_rule_custom", |b| {
        b.to_async(&rt).iter(|| async {
            engine
                .rules()
                .resolve_rule(black_box(business), "LOYALTY_REFERRAL_POINTS")
                .await
        })
    });

    c.bench_function("resolve_rule_default", |b| {
        b.to_async(&rt).iter(|| async {
            engine
                .rules()
                .resolve_rule(black_box(business), "BOOKING_BUFFER_MINUTES")
                .await
        })
    });
}

fn bench_resolve_all_rules(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let (engine, business) = setup(&rt);

    c.bench_function("resolve_all_rules", |b| {
        b.to_async(&rt)
            .iter(|| async { engine.rules().resolve_all_rules(black_box(business)).await })
    });
}

fn bench_is_granted(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let (engine, business) = setup(&rt);
    let user = Uuid::new_v4();
    let manager = Role::new("MANAGER");

    c.bench_function("is_granted_role_default", |b| {
        b.to_async(&rt).iter(|| async {
            engine
                .permissions()
                .is_granted(user, black_box(business), &manager, "reports.view")
                .await
        })
    });

    c.bench_function("is_granted_operator", |b| {
        b.to_async(&rt).iter(|| async {
            engine
                .permissions()
                .is_granted(user, black_box(business), &Role::operator(), "reports.view")
                .await
        })
    });
}

fn bench_value_decode(c: &mut Criterion) {
    let template = entitlr::domain::RuleTemplate::new(
        "OPENING_HOURS",
        entitlr::ValueType::Json,
        "booking",
        json!({"mon": ["09:00", "18:00"]}),
    );
    let raw = json!("{\"mon\": [\"09:00\", \"18:00\"], \"sat\": [\"09:00\", \"13:00\"]}");

    c.bench_function("decode_json_string", |b| {
        b.iter(|| value::decode(black_box(template.value_type), black_box(&raw)))
    });

    c.bench_function("resolve_value_default", |b| {
        b.iter(|| resolve_value(black_box(&template), None))
    });
}

criterion_group!(
    benches,
    bench_resolve_rule,
    bench_resolve_all_rules,
    bench_is_granted,
    bench_value_decode,
);

criterion_main!(benches);
