use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use reconbus::{
    pubsub::{EntityKind, EntityMatchesVariable, EventName, SimulationEvent},
    Dispatcher, EventPublisher, Subscription, SubscriptionOptions,
};
use serde_json::{json, Value};

fn bench_publish_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_fan_out");
    for subs in [0usize, 1, 10, 100] {
        let dispatcher: Dispatcher<Value> = Dispatcher::default();
        // маленькая ёмкость: буферы быстро заполняются и дальше работает
        // вытеснение, как у подписчика, который не читает
        let _subs: Vec<Subscription<Value>> = (0..subs)
            .map(|_| {
                dispatcher
                    .subscribe_with_options(["CASE_UPDATED"], SubscriptionOptions::new().capacity(64))
                    .unwrap()
            })
            .collect();
        let payload = json!({"case": {"id": "C1"}, "status": "open"});

        group.throughput(Throughput::Elements(subs.max(1) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(subs), &subs, |b, _| {
            b.iter(|| dispatcher.publish("CASE_UPDATED", black_box(payload.clone())))
        });
    }
    group.finish();
}

fn bench_filtered_fan_out(c: &mut Criterion) {
    let dispatcher: Dispatcher<Value> = Dispatcher::default();
    // 100 подписчиков, из которых сообщение принимает только один
    let _subs: Vec<Subscription<Value>> = (0..100)
        .map(|i| {
            dispatcher
                .subscribe_with_options(
                    ["SIMULATION_COMPLETED"],
                    SubscriptionOptions::new()
                        .capacity(64)
                        .variable("caseId", format!("C{i}"))
                        .filter(EntityMatchesVariable::new(EntityKind::Case, "caseId")),
                )
                .unwrap()
        })
        .collect();
    let payload = json!({"simulation": {"id": "sim-1", "caseId": "C7"}});

    c.bench_function("publish_filtered_100_subs", |b| {
        b.iter(|| dispatcher.publish("SIMULATION_COMPLETED", black_box(payload.clone())))
    });
}

fn bench_facade_publish(c: &mut Criterion) {
    let publisher: EventPublisher<SimulationEvent> = EventPublisher::new(Dispatcher::default());
    let _global = publisher
        .subscribe_global(EventName::SimulationCompleted, SubscriptionOptions::new().capacity(64))
        .unwrap();
    let _scoped = publisher
        .subscribe_scoped(
            EventName::SimulationCompleted,
            "sim-1",
            SubscriptionOptions::new().capacity(64),
        )
        .unwrap();
    let event = SimulationEvent::new("sim-1", "C1").completed();

    c.bench_function("facade_publish_global_and_scoped", |b| {
        b.iter(|| publisher.publish_event(EventName::SimulationCompleted, black_box(event.clone())))
    });
}

fn bench_subscribe_cancel(c: &mut Criterion) {
    let dispatcher: Dispatcher<Value> = Dispatcher::default();
    // предварительно создаём топик, чтобы мерить только регистрацию
    let _keep = dispatcher.subscribe(["CASE_UPDATED"]).unwrap();

    c.bench_function("subscribe_cancel", |b| {
        b.iter(|| {
            let sub = dispatcher.subscribe(black_box(["CASE_UPDATED"])).unwrap();
            sub.cancel()
        })
    });
}

fn bench_recv_drain(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let dispatcher: Dispatcher<u64> = Dispatcher::default();
    let mut sub = dispatcher
        .subscribe_with_options(["T"], SubscriptionOptions::new().capacity(1_024))
        .unwrap();

    c.bench_function("publish_then_recv_1024", |b| {
        b.iter(|| {
            for i in 0..1_024u64 {
                dispatcher.publish("T", i);
            }
            runtime.block_on(async {
                for _ in 0..1_024 {
                    black_box(sub.recv().await.unwrap());
                }
            })
        })
    });
}

criterion_group!(
    benches,
    bench_publish_fan_out,
    bench_filtered_fan_out,
    bench_facade_publish,
    bench_subscribe_cancel,
    bench_recv_drain,
);
criterion_main!(benches);
