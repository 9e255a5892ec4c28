//! Whole-pipeline tests: one trade from raw feed text to expiry.

use approx::assert_relative_eq;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tradefall_core::{
    AdmissionQueue, Decoded, EntityId, EventDecoder, IdGenerator, Side, Simulation,
    TradefallConfig,
};
use tradefall_sim::{ScenarioId, ScenarioRunner, SimConfig, SimWorld};

const BUY_TRADE: &str = r#"{"e":"trade","m":false,"q":"0.5","p":"60000"}"#;

#[test]
fn test_single_trade_falls_and_expires() {
    let config = TradefallConfig::default();
    let queue = AdmissionQueue::new();
    let decoder = EventDecoder::new(&config.decoder, Arc::new(IdGenerator::default()));
    let mut sim = Simulation::new(&config, queue.clone());

    match decoder.decode(BUY_TRADE).unwrap() {
        Decoded::Trade(event) => queue.enqueue(event),
        Decoded::Skip => panic!("trade was skipped"),
    }
    assert_eq!(sim.admission_tick(), 1);

    let entity = sim.pool().get(EntityId(1)).unwrap();
    assert_eq!(entity.side(), Side::Buy);
    assert_relative_eq!(entity.notional_value(), 30_000.0);
    assert_relative_eq!(entity.position().y, 15.0);

    let mut expired_at = None;
    for frame in 1..=600 {
        if sim.frame_tick(1.0 / 60.0).contains(&EntityId(1)) {
            expired_at = Some(frame);
            break;
        }
        assert_eq!(sim.snapshot().len(), 1);
    }

    // 35 units of drop at v0 = -3, g = 3 takes just under four seconds
    let frame = expired_at.expect("entity never expired");
    assert!((230..=240).contains(&frame), "expired at frame {}", frame);
    assert!(sim.snapshot().is_empty());
    assert_eq!(sim.stats().expired, 1);
}

#[tokio::test]
async fn test_trade_through_scripted_feed() {
    let mut world = SimWorld::new(SimConfig::default()).unwrap();
    world.start().await;

    assert!(world.feed.push(BUY_TRADE));
    world.advance(Duration::from_millis(50)).await;

    let frame = world.latest_frame();
    assert_eq!(frame.entities.len(), 1);
    assert_eq!(frame.entities[0].id, EntityId(1));
    assert_eq!(frame.entities[0].side, Side::Buy);

    world.advance(Duration::from_secs(5)).await;
    assert!(world.latest_frame().entities.is_empty());

    let outcome = world.finish().await.unwrap();
    assert_eq!(outcome.simulation.stats().admitted, 1);
    assert_eq!(outcome.simulation.stats().expired, 1);
}

#[tokio::test]
async fn test_feed_reconnects_and_resubscribes() {
    let mut world = SimWorld::new(SimConfig::default()).unwrap();
    world.start().await;
    assert_eq!(world.feed.connections(), 1);

    world.feed.push(r#"{"e":"trade","m":true,"q":"1","p":"10"}"#);
    world.feed.push("garbage");
    world.feed.drop_connection();
    world.feed.refuse_connections(1);
    world.settle().await;
    assert!(!world.feed.is_connected());
    assert!(!world.feed.push(BUY_TRADE));

    // Backoff 100 ms, refused, 200 ms, connected
    world.advance(Duration::from_millis(400)).await;
    assert!(world.feed.is_connected());
    assert_eq!(world.feed.connect_attempts(), 3);

    let sent = world.feed.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|s| s.contains("btcusdt@trade")));

    assert!(world.feed.push(BUY_TRADE));
    world.advance(Duration::from_millis(100)).await;

    let outcome = world.finish().await.unwrap();
    let feed = outcome.feed.unwrap();
    assert_eq!(feed.trades, 2);
    assert_eq!(feed.decode_errors, 1);
    assert_eq!(feed.connections, 2);
    assert_eq!(outcome.simulation.stats().admitted, 2);
}

#[test]
fn test_every_scenario_passes_short_runs() {
    for scenario in ScenarioId::all() {
        let run = ScenarioRunner::new(1).with_duration(1.0).run(scenario).unwrap();
        assert!(
            run.result.passed,
            "{} failed: {:?}",
            scenario,
            run.result.failure_reason
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn prop_steady_stream_passes_for_any_seed(seed in any::<u64>()) {
        let run = ScenarioRunner::new(seed).with_duration(1.0).run(ScenarioId::SteadyStream).unwrap();
        prop_assert!(run.result.passed, "{:?}", run.result.failure_reason);
        prop_assert_eq!(run.result.metrics.admitted, run.result.metrics.feed.trades);
    }
}
