use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Barrier,
    },
    thread,
    time::Duration,
};

use reconbus::{
    pubsub::MAX_CAPACITY, Dispatcher, RecvError, SubscriptionOptions, TryRecvError,
};

/// Тест проверяет FIFO на подписчика при нескольких издателях на разных
/// топиках: внутри каждого топика порядок сохраняется.
#[test]
fn test_per_topic_fifo_with_parallel_publishers() {
    const PUBLISHERS: u64 = 4;
    const PER_PUBLISHER: u64 = 500;

    let dispatcher: Dispatcher<(u64, u64)> = Dispatcher::default();
    let topics: Vec<String> = (0..PUBLISHERS).map(|p| format!("SIMULATION_PROGRESS_{p}")).collect();
    let mut sub = dispatcher
        .subscribe_with_options(
            topics.clone(),
            SubscriptionOptions::new().capacity((PUBLISHERS * PER_PUBLISHER) as usize),
        )
        .unwrap();

    let barrier = Arc::new(Barrier::new(PUBLISHERS as usize));
    let handles: Vec<_> = topics
        .into_iter()
        .enumerate()
        .map(|(p, topic)| {
            let dispatcher = dispatcher.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_PUBLISHER {
                    dispatcher.publish(topic.as_str(), (p as u64, i));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let mut next = vec![0u64; PUBLISHERS as usize];
    let mut last_sequence = vec![0u64; PUBLISHERS as usize];
    while let Ok(msg) = sub.try_recv() {
        let (p, i) = *msg.payload();
        let p = p as usize;
        assert_eq!(i, next[p], "reordered within topic {p}");
        next[p] += 1;
        // внутри топика номера публикаций растут в порядке буфера
        assert!(msg.sequence > last_sequence[p]);
        last_sequence[p] = msg.sequence;
    }
    assert!(next.iter().all(|&n| n == PER_PUBLISHER));
}

/// Тест проверяет, что все подписчики одного топика видят публикации
/// конкурентных издателей в одном и том же порядке.
#[test]
fn test_subscribers_agree_on_topic_order() {
    let dispatcher: Dispatcher<u64> = Dispatcher::default();
    let options = || SubscriptionOptions::new().capacity(4_000);
    let mut a = dispatcher.subscribe_with_options(["T"], options()).unwrap();
    let mut b = dispatcher.subscribe_with_options(["T"], options()).unwrap();

    let handles: Vec<_> = (0..4u64)
        .map(|t| {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || {
                for i in 0..1_000 {
                    dispatcher.publish("T", t * 10_000 + i);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let drain = |sub: &mut reconbus::Subscription<u64>| {
        let mut out = Vec::new();
        while let Ok(msg) = sub.try_recv() {
            out.push(*msg.payload());
        }
        out
    };
    let seen_a = drain(&mut a);
    let seen_b = drain(&mut b);
    assert_eq!(seen_a.len(), 4_000);
    assert_eq!(seen_a, seen_b);
}

/// Тест проверяет атомарность отмены относительно идущих публикаций: после
/// возврата `cancel` в буфер не попадает ни одно новое сообщение.
#[test]
fn test_cancel_during_publish_storm() {
    let dispatcher: Dispatcher<u64> = Dispatcher::default();
    let stop = Arc::new(AtomicBool::new(false));

    let publishers: Vec<_> = (0..4)
        .map(|_| {
            let dispatcher = dispatcher.clone();
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut i = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    dispatcher.publish("STORM", i);
                    i += 1;
                }
            })
        })
        .collect();

    for _ in 0..50 {
        let mut sub = dispatcher
            .subscribe_with_options(["STORM"], SubscriptionOptions::new().capacity(MAX_CAPACITY))
            .unwrap();
        thread::sleep(Duration::from_micros(200));
        sub.cancel();

        let frozen = sub.stats().delivered;
        thread::sleep(Duration::from_micros(500));
        assert_eq!(sub.stats().delivered, frozen, "delivery after cancel returned");

        // дочитываем то, что успело прийти до отмены
        loop {
            match sub.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged { .. }) => {}
                Err(TryRecvError::Closed) => break,
                Err(TryRecvError::Empty) => panic!("cancelled subscription reported Empty"),
            }
        }
    }

    stop.store(true, Ordering::Relaxed);
    for p in publishers {
        p.join().unwrap();
    }
    assert_eq!(dispatcher.subscription_count(), 0);
    assert_eq!(dispatcher.listener_count("STORM"), 0);
}

/// Тест проверяет подписку и отписку на разных топиках во время публикаций.
#[test]
fn test_churn_on_unrelated_topics() {
    let dispatcher: Dispatcher<u64> = Dispatcher::default();
    let mut steady = dispatcher
        .subscribe_with_options(["STEADY"], SubscriptionOptions::new().capacity(10_000))
        .unwrap();

    let publisher = {
        let dispatcher = dispatcher.clone();
        thread::spawn(move || {
            for i in 0..5_000 {
                dispatcher.publish("STEADY", i);
            }
        })
    };
    let churners: Vec<_> = (0..4)
        .map(|t| {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || {
                for i in 0..500 {
                    let sub = dispatcher
                        .subscribe([format!("CASE_UPDATED_{t}_{}", i % 7)])
                        .unwrap();
                    drop(sub);
                }
            })
        })
        .collect();

    publisher.join().unwrap();
    for c in churners {
        c.join().unwrap();
    }

    let mut expected = 0;
    while let Ok(msg) = steady.try_recv() {
        assert_eq!(*msg.payload(), expected);
        expected += 1;
    }
    assert_eq!(expected, 5_000);
    assert_eq!(dispatcher.topic_count(), 1);
}

/// Тест проверяет асинхронных потребителей на многопоточном рантайме.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_consumers_receive_everything() {
    let dispatcher: Dispatcher<u64> = Dispatcher::default();
    let mut consumers = Vec::new();
    let mut ids = Vec::new();

    for _ in 0..8 {
        let mut sub = dispatcher
            .subscribe_with_options(["PROGRESS"], SubscriptionOptions::new().capacity(1_024))
            .unwrap();
        ids.push(sub.id());
        consumers.push(tokio::spawn(async move {
            let mut got = Vec::new();
            loop {
                match sub.recv().await {
                    Ok(msg) => got.push(*msg.payload()),
                    Err(RecvError::Lagged { count }) => panic!("lagged by {count}"),
                    Err(RecvError::Closed) => break got,
                }
            }
        }));
    }

    let publisher = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            for i in 0..1_000u64 {
                dispatcher.publish("PROGRESS", i);
                if i % 100 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        })
    };
    publisher.await.unwrap();
    for id in ids {
        dispatcher.cancel(id);
    }

    for consumer in consumers {
        let got = consumer.await.unwrap();
        assert_eq!(got, (0..1_000).collect::<Vec<u64>>());
    }
}
