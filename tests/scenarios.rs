//! End-to-end scenarios exercising `Engine::get_or_run` through the public API
//!
//! Each test here corresponds to one of the six scenarios a faithful
//! implementation of this design is expected to satisfy: memoize-then-
//! invalidate, single-flight under heavy concurrency, failure propagation,
//! TTL expiry, eviction under a byte threshold, and runner death recovery.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use concurrent_memo::{
    CallOptions, DefaultStrategy, Engine, EvictionStrategy, GetOrRunError, Settings, Threshold,
};

fn default_engine(name: &'static str) -> Engine<String, DefaultStrategy<String>> {
    Engine::new(name, Settings::default())
}

#[test]
fn scenario_1_memoize_then_invalidate_then_recompute() {
    let eng = default_engine("scenarios::memoize_then_invalidate");

    let first = eng
        .get_or_run("k", CallOptions::default(), || Ok::<_, ()>("42".to_string()))
        .unwrap();
    assert_eq!(first, "42");

    let memoized = eng
        .get_or_run("k", CallOptions::default(), || Ok::<_, ()>("99".to_string()))
        .unwrap();
    assert_eq!(memoized, "42");

    assert_eq!(eng.invalidate("k").total(), 1);

    let recomputed = eng
        .get_or_run("k", CallOptions::default(), || Ok::<_, ()>("99".to_string()))
        .unwrap();
    assert_eq!(recomputed, "99");
}

#[test]
fn scenario_2_single_flight_under_one_hundred_concurrent_callers() {
    let eng = Arc::new(default_engine("scenarios::single_flight_100"));
    let counter = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(100));

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let eng = Arc::clone(&eng);
            let counter = Arc::clone(&counter);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                eng.get_or_run("k", CallOptions::default(), || {
                    thread::sleep(Duration::from_millis(50));
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>("v".to_string())
                })
                .unwrap()
            })
        })
        .collect();

    let results: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|v| v == "v"));
}

#[test]
fn scenario_3_thunk_failure_reraises_then_a_later_call_succeeds() {
    let eng = default_engine("scenarios::failure_then_success");
    let attempts = AtomicUsize::new(0);

    let err = eng
        .get_or_run("k", CallOptions::default(), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<String, _>("boom")
        })
        .unwrap_err();
    assert!(matches!(err, GetOrRunError::Thunk("boom")));

    let ok = eng
        .get_or_run("k", CallOptions::default(), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            Ok::<_, &str>("recovered".to_string())
        })
        .unwrap();
    assert_eq!(ok, "recovered");
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn scenario_4_ttl_expiry_forces_recomputation() {
    let mut settings = Settings::default();
    settings.default_expires_in = Threshold::Bounded(10);
    let eng: Engine<String, DefaultStrategy<String>> =
        Engine::new("scenarios::ttl_expiry", settings);

    let v1 = eng
        .get_or_run("k", CallOptions::default(), || Ok::<_, ()>("v1".to_string()))
        .unwrap();
    assert_eq!(v1, "v1");

    thread::sleep(Duration::from_millis(25));

    let v2 = eng
        .get_or_run("k", CallOptions::default(), || Ok::<_, ()>("v2".to_string()))
        .unwrap();
    assert_eq!(v2, "v2");
}

#[test]
fn scenario_5_eviction_keeps_the_most_recently_read_and_every_permanent_entry() {
    // `max_threshold` is set far above what 9 entries plus read-history ever
    // reaches, so the insert loop below never triggers an on-insert GC; only
    // the explicit `garbage_collect()` call at the end does the sweep. A
    // `min_threshold` of 700 lands strictly between the byte cost of keeping
    // the 2 most-recently-read entries (640) and keeping 3 (896), so GC stops
    // exactly after evicting the 6 least-recently-read entries.
    let mut settings = Settings::default();
    settings.cache_strategy = concurrent_memo::CacheStrategyKind::Eviction;
    settings.max_threshold = Threshold::Bounded(5_000);
    settings.min_threshold = Some(700);
    let eng: Engine<String, EvictionStrategy<String>> =
        Engine::new("scenarios::eviction_lru", settings);

    let calls = Arc::new(AtomicUsize::new(0));
    for i in 0..8 {
        let k = format!("k{i}");
        let calls = Arc::clone(&calls);
        eng.get_or_run(k.as_str(), CallOptions::default(), move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ()>(format!("v{i}"))
        })
        .unwrap();
    }
    // Re-read the last two, establishing recency order over the rest.
    eng.get_or_run("k6", CallOptions::default(), || Ok::<_, ()>("v6".to_string()))
        .unwrap();
    eng.get_or_run("k7", CallOptions::default(), || Ok::<_, ()>("v7".to_string()))
        .unwrap();

    eng.get_or_run(
        "permanent",
        CallOptions {
            permanent: true,
            ..Default::default()
        },
        || Ok::<_, ()>("forever".to_string()),
    )
    .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 8);
    let removed = eng.garbage_collect().total();
    assert_eq!(removed, 6);

    // k6 and k7 were the two most recently read and must still be memoized.
    let k6 = eng
        .get_or_run("k6", CallOptions::default(), || Ok::<_, ()>("recomputed".to_string()))
        .unwrap();
    assert_eq!(k6, "v6");
    let k7 = eng
        .get_or_run("k7", CallOptions::default(), || Ok::<_, ()>("recomputed".to_string()))
        .unwrap();
    assert_eq!(k7, "v7");

    // k0 was evicted, so a fresh call recomputes it.
    let k0 = eng
        .get_or_run("k0", CallOptions::default(), || Ok::<_, ()>("recomputed".to_string()))
        .unwrap();
    assert_eq!(k0, "recomputed");

    // The permanent entry survives regardless of recency ranking.
    let still_permanent = eng
        .get_or_run(
            "permanent",
            CallOptions {
                permanent: true,
                ..Default::default()
            },
            || Ok::<_, ()>("recomputed".to_string()),
        )
        .unwrap();
    assert_eq!(still_permanent, "forever");
}

#[test]
fn scenario_6_runner_death_frees_waiters_within_the_timeout() {
    let eng = Arc::new(default_engine("scenarios::runner_death"));

    let doomed = Arc::clone(&eng);
    let runner = thread::spawn(move || {
        let _ = doomed.get_or_run("k", CallOptions::default(), || -> Result<String, ()> {
            thread::sleep(Duration::from_millis(50));
            panic!("simulated runner death mid-computation");
        });
    });

    let waiter_eng = Arc::clone(&eng);
    let waiter = thread::spawn(move || {
        waiter_eng
            .get_or_run("k", CallOptions::default(), || Ok::<_, ()>("recovered".to_string()))
            .unwrap()
    });

    assert!(runner.join().is_err());
    assert_eq!(waiter.join().unwrap(), "recovered");
}
