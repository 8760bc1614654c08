//! Tests for the shared CRL cache under concurrent use

mod common;

use certpath::certificate::{CertOrigin, Certificate, Crl, CrlOrigin, Currency};
use certpath::config::Settings;
use certpath::engine::VerifyContext;
use certpath::policy::PolicyRequest;
use certpath::revocation::{CrlOptions, RevocationCache};
use certpath::utils::StatusCode;
use common::*;
use std::sync::Arc;
use std::thread;

fn network_crl(spec: &CrlSpec) -> Crl {
    Crl::from_der(&FakeLibrary, &spec.der(), CrlOrigin::Network).unwrap()
}

fn cert(spec: &CertSpec) -> Certificate {
    Certificate::from_der(&FakeLibrary, &spec.der(), CertOrigin::Input).unwrap()
}

#[test]
fn test_concurrent_search_and_release() {
    let cache = Arc::new(RevocationCache::new(16));
    cache.release(cache.add(network_crl(&CrlSpec::new("Int")), now()));
    let leaf = Arc::new(cert(&leaf("Leaf", "Int")));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let leaf = Arc::clone(&leaf);
            thread::spawn(move || {
                for _ in 0..100 {
                    let lease = cache.search(&leaf, now()).unwrap();
                    assert_eq!(lease.currency(), Currency::Current);
                    cache.release(lease);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = cache.stats();
    assert_eq!(stats.created, 1);
    assert_eq!(stats.freed, 0);
    assert_eq!(stats.pending, 0);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_concurrent_remove_frees_each_entry_once() {
    let cache = Arc::new(RevocationCache::new(64));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                let issuer = format!("CA-{}", i);
                let leaf = cert(&leaf("Leaf", &issuer));
                let first = cache.add(network_crl(&CrlSpec::new(&issuer)), now());
                let second = cache.search(&leaf, now()).unwrap();
                cache.remove(second);
                cache.release(first);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = cache.stats();
    assert_eq!(stats.created, 8);
    assert_eq!(stats.freed, 8);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.live as u64, stats.created - stats.freed);
    assert!(cache.is_empty());
}

#[test]
fn test_stale_entry_evicted_during_verify() {
    let int = intermediate("Int", "Root");
    let leaf = leaf("Leaf", "Int");
    let root = root("Root");

    let cache = Arc::new(RevocationCache::new(16));
    let stale = CrlSpec::new("Int").window(now() - days(10), now() - days(1));
    cache.release(cache.add(network_crl(&stale), now()));

    let engine = builder().crl_cache(Arc::clone(&cache)).build().unwrap();
    let ctx = VerifyContext::default()
        .with_anchors(vec![root.der()])
        .with_policy(PolicyRequest::Crl(CrlOptions {
            require_per_cert: true,
            ..CrlOptions::default()
        }));

    let outcome = engine
        .verify_chain(&[leaf.der(), int.der()], &ctx)
        .unwrap();
    assert_eq!(outcome.result, Err(StatusCode::CrlExpired));

    let stats = cache.stats();
    assert_eq!(stats.freed, 1);
    assert!(cache.is_empty());
}

#[test]
fn test_engines_share_one_cache() {
    let int = intermediate("Int", "Root");
    let leaf = leaf("Leaf", "Int");
    let root = root("Root");
    let fetcher = Arc::new(FakeFetcher::new().with_crl("Int", &CrlSpec::new("Int")));
    let cache = Arc::new(RevocationCache::default());

    let mut settings = Settings::default();
    settings.network.fetch_enabled = true;
    let engines: Vec<_> = (0..2)
        .map(|_| {
            builder()
                .fetcher(fetcher.clone())
                .crl_cache(Arc::clone(&cache))
                .settings(settings.clone())
                .build()
                .unwrap()
        })
        .collect();

    for engine in &engines {
        let ctx = engine
            .context()
            .with_anchors(vec![root.der()])
            .with_policy(PolicyRequest::Crl(CrlOptions::default()));
        let outcome = engine
            .verify_chain(&[leaf.der(), int.der()], &ctx)
            .unwrap();
        assert_eq!(outcome.result, Ok(()));
    }

    // the second engine found the first engine's CRL for the leaf
    assert_eq!(cache.stats().created, 1);
    assert!(Arc::ptr_eq(engines[0].crl_cache(), engines[1].crl_cache()));
}

/// Small xorshift so each thread takes its own remove/release path
fn next_choice(state: &mut u64) -> u64 {
    *state ^= *state << 13;
    *state ^= *state >> 7;
    *state ^= *state << 17;
    *state
}

#[test]
fn test_contended_entry_removed_and_readded() {
    let cache = Arc::new(RevocationCache::new(8));
    cache.release(cache.add(network_crl(&CrlSpec::new("Int")), now()));
    let leaf = Arc::new(cert(&leaf("Leaf", "Int")));

    let mut handles: Vec<_> = (0..6u64)
        .map(|i| {
            let cache = Arc::clone(&cache);
            let leaf = Arc::clone(&leaf);
            thread::spawn(move || {
                let mut state = 0x9e37_79b9_7f4a_7c15 ^ (i + 1);
                for _ in 0..300 {
                    let Some(lease) = cache.search(&leaf, now()) else {
                        continue;
                    };
                    assert_eq!(lease.crl().origin(), CrlOrigin::LocalCache);
                    if next_choice(&mut state) % 3 == 0 {
                        cache.remove(lease);
                    } else {
                        cache.release(lease);
                    }
                }
            })
        })
        .collect();

    let adder = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            for _ in 0..300 {
                cache.release(cache.add(network_crl(&CrlSpec::new("Int")), now()));
                thread::yield_now();
            }
        })
    };
    handles.push(adder);
    for handle in handles {
        handle.join().unwrap();
    }

    let before = cache.stats();
    assert_eq!(before.created, 301);
    assert_eq!(before.pending, 0);
    assert_eq!(before.live as u64, before.created - before.freed);

    cache.clear();
    let stats = cache.stats();
    assert_eq!(stats.freed, stats.created);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.live, 0);
    assert!(cache.is_empty());
}
