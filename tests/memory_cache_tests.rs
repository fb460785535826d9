use cachemint::{
    memoize, Backend, CacheConfig, CacheError, CacheOptions, CallArgs, CallSignature,
    DependencyGraph, KeyMode,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn options(name: &str) -> CacheOptions {
    CacheOptions::new(name)
        .backend(Backend::Memory)
        .graph(Arc::new(DependencyGraph::new()))
}

fn add_signature() -> CallSignature {
    CallSignature::builder()
        .param("a")
        .param_with_default("b", 2)
        .build()
        .unwrap()
}

fn int(call: &CallArgs, index: usize, name: &str) -> i64 {
    call.get(index, name).and_then(|v| v.as_i64()).unwrap_or(0)
}

#[test]
fn test_repeated_calls_are_cached() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let add = memoize(&CacheConfig::new(), options("add"), add_signature(), move |call: &CallArgs| {
        counter.fetch_add(1, Ordering::SeqCst);
        int(call, 0, "a") + int(call, 1, "b")
    })
    .unwrap();

    assert_eq!(add.call(CallArgs::new().arg(1).arg(2)).unwrap(), 3);
    assert_eq!(add.call(CallArgs::new().arg(1).arg(2)).unwrap(), 3);
    assert_eq!(add.call(CallArgs::new().arg(2).arg(2)).unwrap(), 4);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    #[cfg(feature = "stats")]
    {
        let stats = add.cache().unwrap().stats();
        assert_eq!(stats.hits(), 1);
        assert_eq!(stats.misses(), 2);
    }
}

#[test]
fn test_fast_mode_keeps_call_shapes_apart() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let add = memoize(&CacheConfig::new(), options("add_fast"), add_signature(), move |call: &CallArgs| {
        counter.fetch_add(1, Ordering::SeqCst);
        int(call, 0, "a") + int(call, 1, "b")
    })
    .unwrap();
    assert_eq!(add.cache().unwrap().key_mode(), KeyMode::Fast);

    add.call(CallArgs::new().arg(1).arg(2)).unwrap();
    add.call(CallArgs::new().kwarg("a", 1).kwarg("b", 2)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_strict_mode_unifies_call_shapes() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let add = memoize(
        &CacheConfig::new(),
        options("add_strict").strict(true),
        add_signature(),
        move |call: &CallArgs| {
            counter.fetch_add(1, Ordering::SeqCst);
            int(call, 0, "a") + int(call, 1, "b")
        },
    )
    .unwrap();

    assert_eq!(add.call(CallArgs::new().arg(1)).unwrap(), 3);
    assert_eq!(add.call(CallArgs::new().kwarg("a", 1)).unwrap(), 3);
    assert_eq!(add.call(CallArgs::new().arg(1).arg(2)).unwrap(), 3);
    assert_eq!(add.call(CallArgs::new().kwarg("b", 2).kwarg("a", 1)).unwrap(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_limit_evicts_least_recently_used() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let sig = CallSignature::builder().param("n").build().unwrap();
    let ident = memoize(&CacheConfig::new(), options("ident").limit(2), sig, move |call: &CallArgs| {
        counter.fetch_add(1, Ordering::SeqCst);
        int(call, 0, "n")
    })
    .unwrap();

    for n in [1, 2, 3] {
        ident.call(CallArgs::new().arg(n)).unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // 2 and 3 survived
    ident.call(CallArgs::new().arg(2)).unwrap();
    ident.call(CallArgs::new().arg(3)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // 1 was evicted
    ident.call(CallArgs::new().arg(1)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[test]
fn test_expire_recomputes_after_ttl() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let sig = CallSignature::builder().param("n").build().unwrap();
    let ident = memoize(&CacheConfig::new(), options("ttl").expire(1), sig, move |call: &CallArgs| {
        counter.fetch_add(1, Ordering::SeqCst);
        int(call, 0, "n")
    })
    .unwrap();

    ident.call(CallArgs::new().arg(1)).unwrap();
    ident.call(CallArgs::new().arg(1)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    thread::sleep(Duration::from_millis(1100));
    ident.call(CallArgs::new().arg(1)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    #[cfg(feature = "stats")]
    assert_eq!(ident.cache().unwrap().stats().misses(), 2);
}

#[test]
fn test_never_expire() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let sig = CallSignature::builder().param("n").build().unwrap();
    let ident = memoize(&CacheConfig::new(), options("forever").expire(-1), sig, move |call: &CallArgs| {
        counter.fetch_add(1, Ordering::SeqCst);
        int(call, 0, "n")
    })
    .unwrap();

    ident.call(CallArgs::new().arg(1)).unwrap();
    thread::sleep(Duration::from_millis(1100));
    ident.call(CallArgs::new().arg(1)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_zero_limit_or_expire_creates_no_cache() {
    for opts in [options("off").limit(0), options("off").expire(0)] {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sig = CallSignature::builder().param("n").build().unwrap();
        let ident = memoize(&CacheConfig::new(), opts, sig, move |call: &CallArgs| {
            counter.fetch_add(1, Ordering::SeqCst);
            int(call, 0, "n")
        })
        .unwrap();

        assert!(ident.cache().is_none());
        assert!(ident.cache_clear().is_none());
        ident.call(CallArgs::new().arg(1)).unwrap();
        ident.call(CallArgs::new().arg(1)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

#[test]
fn test_invalid_bounds_are_rejected() {
    let sig = CallSignature::builder().param("n").build().unwrap();
    let result = memoize(&CacheConfig::new(), options("bad").limit(-3), sig, |_: &CallArgs| 0);
    assert!(matches!(result, Err(CacheError::Config(_))));
}

#[test]
fn test_config_defaults_apply() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let config = CacheConfig::new().with_limit(1);
    let sig = CallSignature::builder().param("n").build().unwrap();
    let ident = memoize(&config, options("defaults"), sig, move |call: &CallArgs| {
        counter.fetch_add(1, Ordering::SeqCst);
        int(call, 0, "n")
    })
    .unwrap();
    assert_eq!(ident.cache().unwrap().limit(), 1);

    ident.call(CallArgs::new().arg(1)).unwrap();
    ident.call(CallArgs::new().arg(2)).unwrap();
    ident.call(CallArgs::new().arg(1)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_partial_clear_in_strict_mode() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let add = memoize(
        &CacheConfig::new(),
        options("partial").strict(true),
        add_signature(),
        move |call: &CallArgs| {
            counter.fetch_add(1, Ordering::SeqCst);
            int(call, 0, "a") + int(call, 1, "b")
        },
    )
    .unwrap();

    add.call(CallArgs::new().arg(1)).unwrap();
    add.call(CallArgs::new().arg(1).arg(9)).unwrap();
    add.call(CallArgs::new().arg(2)).unwrap();

    let removed = add.cache_clear_matching(&CallArgs::new().kwarg("a", 1)).unwrap().unwrap();
    assert_eq!(removed, 2);

    add.call(CallArgs::new().arg(2)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    add.call(CallArgs::new().arg(1)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[test]
fn test_partial_clear_unsupported_in_fast_mode() {
    let add = memoize(&CacheConfig::new(), options("fast_clear"), add_signature(), |call: &CallArgs| {
        int(call, 0, "a") + int(call, 1, "b")
    })
    .unwrap();
    add.call(CallArgs::new().arg(1)).unwrap();

    let err = add.cache_clear_matching(&CallArgs::new().arg(1)).unwrap().unwrap_err();
    assert!(err.is_unsupported());
    assert_eq!(add.cache_clear().unwrap().unwrap(), 1);
}

#[test]
fn test_method_receiver_is_not_part_of_key() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let sig = CallSignature::builder()
        .receiver("self")
        .param("a")
        .build()
        .unwrap();
    let method = memoize(
        &CacheConfig::new(),
        options("Point::scale").method(true).strict(true),
        sig,
        move |call: &CallArgs| {
            counter.fetch_add(1, Ordering::SeqCst);
            int(call, 1, "a")
        },
    )
    .unwrap();

    method.call(CallArgs::new().arg(3).with_receiver("p1")).unwrap();
    method.call(CallArgs::new().arg(3).with_receiver("p2")).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_callers_share_entries() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let sig = CallSignature::builder().param("n").build().unwrap();
    let square = Arc::new(
        memoize(&CacheConfig::new(), options("square").limit(64), sig, move |call: &CallArgs| {
            counter.fetch_add(1, Ordering::SeqCst);
            let n = int(call, 0, "n");
            n * n
        })
        .unwrap(),
    );

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let square = square.clone();
            thread::spawn(move || {
                for n in 0..16 {
                    assert_eq!(square.call(CallArgs::new().arg(n)).unwrap(), n * n);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // racing misses may compute twice, but most lookups hit
    let computed = calls.load(Ordering::SeqCst);
    assert!(computed >= 16);
    assert!(computed < 8 * 16);
}
