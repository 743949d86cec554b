mod common;

use std::sync::Barrier;

use common::*;
use trade_sim::model::{Resource, RouteId, RouteKind, RouteStatus};
use trade_sim::trade::{RENEWAL_CAUSE, TradeError};

#[test]
fn racing_establishes_of_one_route_commit_exactly_once() {
    let t = build_engine(quiet_config());
    let barrier = Barrier::new(8);

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    t.engine
                        .establish_route(ARDEN, CORVEL, Resource::Iron, RouteKind::Land)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(result, Err(TradeError::RouteExists(_))));
    }
    assert_eq!(t.engine.route_count(), 1);
    assert_eq!(t.count(&t.drain(), "route_established"), 1);
}

#[test]
fn distinct_routes_establish_in_parallel() {
    let t = build_engine(quiet_config());
    let requests = [
        (ARDEN, CORVEL, Resource::Iron),
        (ARDEN, FARHOLD, Resource::Iron),
        (ARDEN, BRASK, Resource::Grain),
        (BRASK, CORVEL, Resource::Salt),
        (BRASK, DUNMERE, Resource::Salt),
        (ESTUARY, CORVEL, Resource::Fish),
    ];

    std::thread::scope(|s| {
        for (source, destination, resource) in requests {
            let engine = &t.engine;
            s.spawn(move || {
                engine
                    .establish_route(source, destination, resource, RouteKind::Land)
                    .unwrap();
            });
        }
    });

    assert_eq!(t.engine.route_count(), requests.len());
    for (source, destination, resource) in requests {
        let id = RouteId::new(source, destination, resource);
        assert!(t.engine.get_route(id).is_some(), "{id} missing");
    }
    assert!(t.engine.routes_for_region(ARDEN).len() >= 3);
}

#[test]
fn batches_and_disruptions_interleave_without_lost_updates() {
    let mut config = quiet_config();
    config.scheduler.route_batch_size = 2;
    let t = build_engine(config);
    for (source, destination, resource) in [
        (ARDEN, CORVEL, Resource::Iron),
        (ARDEN, FARHOLD, Resource::Iron),
        (BRASK, CORVEL, Resource::Salt),
        (BRASK, DUNMERE, Resource::Salt),
    ] {
        t.engine
            .establish_route(source, destination, resource, RouteKind::Land)
            .unwrap();
    }
    let target = RouteId::new(ARDEN, CORVEL, Resource::Iron);

    std::thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..200 {
                t.engine.process_route_batch();
            }
        });
        s.spawn(|| {
            // Only conflicts may fail; every committed disruption must stick.
            let mut first = true;
            for _ in 0..50 {
                let cause = if first { "flood" } else { RENEWAL_CAUSE };
                match t.engine.disrupt_route(target, cause, 1.0) {
                    Ok(_) => first = false,
                    Err(TradeError::Conflict { .. }) => {}
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
        });
        s.spawn(|| {
            for _ in 0..200 {
                let _ = t.engine.all_routes();
                let _ = t.engine.province_balance(ARDEN);
                let _ = t.engine.find_path(ARDEN, FARHOLD, Resource::Iron);
            }
        });
    });

    let route = t.engine.get_route(target).unwrap();
    assert_eq!(route.status, RouteStatus::Disrupted);
    assert_eq!(route.disruption_count, 1);
    assert_eq!(t.engine.route_count(), 4);
    let metrics = t.engine.metrics();
    assert_eq!(metrics.batches_run, 200);
    assert_eq!(metrics.routes_processed, 400);
}

#[test]
fn link_loads_match_live_routes_after_establish_abandon_churn() {
    let t = build_engine(quiet_config());
    let route = RouteId::new(ARDEN, CORVEL, Resource::Iron);
    let barrier = Barrier::new(6);

    std::thread::scope(|s| {
        for worker in 0..6 {
            let (engine, barrier) = (&t.engine, &barrier);
            s.spawn(move || {
                barrier.wait();
                for _ in 0..50 {
                    if worker % 2 == 0 {
                        let _ = engine.establish_route(
                            ARDEN,
                            CORVEL,
                            Resource::Iron,
                            RouteKind::Land,
                        );
                    } else {
                        let _ = engine.abandon_route(route);
                    }
                }
            });
        }
    });

    let regions = [ARDEN, BRASK, CORVEL, DUNMERE, ESTUARY, FARHOLD];
    let live: Vec<_> = t.engine.get_route(route).into_iter().collect();
    for (i, &a) in regions.iter().enumerate() {
        for &b in &regions[i + 1..] {
            let expected = live
                .iter()
                .filter(|r| {
                    r.path
                        .windows(2)
                        .any(|w| (w[0] == a && w[1] == b) || (w[0] == b && w[1] == a))
                })
                .count() as u32;
            assert_eq!(t.engine.link_load(a, b), expected, "link {a}-{b}");
        }
    }

    if !live.is_empty() {
        t.engine.abandon_route(route).unwrap();
    }
    assert_eq!(t.engine.link_load(ARDEN, BRASK), 0);
    assert_eq!(t.engine.link_load(BRASK, CORVEL), 0);
}
