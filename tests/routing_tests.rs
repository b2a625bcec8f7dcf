/// Routing strategy tests
///
/// Default strategy behaviour and custom strategies seen through the manager
/// Run with: cargo test --test routing_tests
mod common;

use common::{MockConnector, targets};
use pgshard::{DefaultRouter, Result, ShardError, ShardKey, ShardManager, ShardRouter};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

#[test]
fn test_integer_keys_route_by_modulo() {
    for n in 1..=8usize {
        for k in 0..100i64 {
            let index = DefaultRouter.shard_index(&ShardKey::Int(k), n).unwrap();
            assert_eq!(index, k % n as i64);
        }
    }
}

#[test]
fn test_negative_integer_keys_are_normalised() {
    for n in 1..=8usize {
        for k in -100..0i64 {
            let index = DefaultRouter.shard_index(&ShardKey::Int(k), n).unwrap();
            assert!((0..n as i64).contains(&index));
            assert_eq!(index, ((k % n as i64) + n as i64) % n as i64);
        }
    }
}

#[test]
fn test_zero_shard_count_fails() {
    let err = DefaultRouter.shard_index(&ShardKey::Int(7), 0).unwrap_err();
    assert!(matches!(err, ShardError::NoShards));

    let err = DefaultRouter.shard_index(&ShardKey::from("k"), 0).unwrap_err();
    assert!(matches!(err, ShardError::NoShards));
}

#[test]
fn test_text_keys_are_deterministic() {
    let keys = ["alice", "bob", "tenant-a", "tenant-b", "order-1001", ""];
    for n in 1..=16usize {
        for key in keys {
            let first = DefaultRouter.shard_index(&ShardKey::from(key), n).unwrap();
            for _ in 0..5 {
                let again = DefaultRouter.shard_index(&ShardKey::from(key), n).unwrap();
                assert_eq!(first, again);
            }
            assert!((0..n as i64).contains(&first));
        }
    }
}

#[test]
fn test_text_keys_match_crc32_ieee() {
    // Reference checksums from the IEEE polynomial (zlib crc32).
    let cases: [(&str, u32); 5] = [
        ("user-42", 0x7D06_B873),
        ("alice", 0x278E_BC47),
        ("bob", 0xF5CB_B140),
        ("tenant-a", 0x9084_580B),
        ("order-1001", 0x0DC3_1A39),
    ];
    for (key, crc) in cases {
        for n in [2usize, 3, 4, 16] {
            let expected = (crc as u64 % n as u64) as i64;
            let index = DefaultRouter.shard_index(&ShardKey::from(key), n).unwrap();
            assert_eq!(index, expected, "key {} with {} shards", key, n);
        }
    }
}

#[test]
fn test_unsupported_keys_fail() {
    let err = DefaultRouter
        .shard_index(&ShardKey::from(json!(true)), 4)
        .unwrap_err();
    assert!(matches!(err, ShardError::UnsupportedKeyType(_)));
}

#[tokio::test]
async fn test_integer_key_resolves_to_expected_shard() {
    let connector = MockConnector::new();
    let manager = ShardManager::connect(targets(&["A", "B", "C"]), &connector)
        .await
        .unwrap();

    let pool = assert_ok!(manager.resolve_shard(7));
    assert_eq!(pool.target(), "B");
}

#[tokio::test]
async fn test_text_key_resolves_to_expected_shard() {
    let connector = MockConnector::new();
    let manager = ShardManager::connect(targets(&["A", "B"]), &connector)
        .await
        .unwrap();

    // crc32("user-42") = 0x7D06B873, odd
    let pool = assert_ok!(manager.resolve_shard("user-42"));
    assert_eq!(pool.target(), "B");
}

#[tokio::test]
async fn test_json_keys_route_like_native_keys() {
    let connector = MockConnector::new();
    let manager = ShardManager::connect(targets(&["A", "B", "C"]), &connector)
        .await
        .unwrap();

    let body = json!({ "tenant_id": 7, "region": "user-42", "score": 0.5 });
    assert_eq!(
        manager.shard_index(&body["tenant_id"]).unwrap(),
        manager.shard_index(7).unwrap()
    );
    assert_eq!(
        manager.shard_index(&body["region"]).unwrap(),
        manager.shard_index("user-42").unwrap()
    );

    let err = assert_err!(manager.resolve_shard(&body["score"]));
    assert!(matches!(err, ShardError::UnsupportedKeyType(_)));
    let err = assert_err!(manager.resolve_shard(&body["missing"]));
    assert!(matches!(err, ShardError::UnsupportedKeyType(ref kind) if kind == "JSON null"));
}

#[tokio::test]
async fn test_custom_strategy_out_of_range_fails_lookup() {
    let connector = MockConnector::new();
    let manager = ShardManager::connect(targets(&["A", "B", "C"]), &connector)
        .await
        .unwrap();

    manager.set_routing_strategy(|_: &ShardKey, n: usize| -> Result<i64> { Ok(n as i64) });
    let err = assert_err!(manager.resolve_shard(1));
    assert!(matches!(
        err,
        ShardError::ShardIndexOutOfRange { index: 3, num_shards: 3 }
    ));

    manager.set_routing_strategy(|_: &ShardKey, _: usize| -> Result<i64> { Ok(-1) });
    let err = assert_err!(manager.resolve_shard("anything"));
    assert!(matches!(err, ShardError::ShardIndexOutOfRange { index: -1, .. }));
}

#[tokio::test]
async fn test_custom_strategy_errors_propagate() {
    let connector = MockConnector::new();
    let manager = ShardManager::connect(targets(&["A", "B"]), &connector)
        .await
        .unwrap();

    manager.set_routing_strategy(|key: &ShardKey, n: usize| match key {
        ShardKey::Int(_) => DefaultRouter.shard_index(key, n),
        other => Err(ShardError::UnsupportedKeyType(other.kind().to_string())),
    });

    assert_ok!(manager.resolve_shard(5));
    let err = assert_err!(manager.resolve_shard("text"));
    assert!(matches!(err, ShardError::UnsupportedKeyType(ref kind) if kind == "TEXT"));
}

#[tokio::test]
async fn test_strategy_replacement_takes_effect_immediately() {
    let connector = MockConnector::new();
    let manager = ShardManager::connect(targets(&["A", "B", "C", "D"]), &connector)
        .await
        .unwrap();

    assert_eq!(manager.shard_index(1).unwrap(), 1);

    struct Pinned(usize);
    impl ShardRouter for Pinned {
        fn shard_index(&self, _: &ShardKey, _: usize) -> Result<i64> {
            Ok(self.0 as i64)
        }

        fn name(&self) -> &str {
            "pinned"
        }
    }

    manager.set_routing_strategy(Pinned(3));
    assert_eq!(manager.routing_strategy_name(), "pinned");
    for k in 0..20 {
        assert_eq!(manager.resolve_shard(k).unwrap().target(), "D");
    }

    manager.reset_routing_strategy();
    assert_eq!(manager.shard_index(1).unwrap(), 1);
}
