//! Integration tests for the state cache.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use terrakit_state::{
    CacheConfig, ManualClock, Metadata, State, StateCache, StateError, StateOutput,
    StateResource,
};

fn sample_state(serial: u64) -> State {
    State::new("1.6.2", "0b7f6a52-1d3e-4c1a-9f0e-4b2d5c6e7f80")
        .with_serial(serial)
        .with_resource(
            StateResource::new("google_compute_network", "vpc")
                .with_provider("provider[\"registry.terraform.io/hashicorp/google\"]")
                .with_id("projects/demo/global/networks/vpc"),
        )
        .with_output("network", StateOutput::new(json!("vpc")))
}

fn open(clock: &ManualClock, config: CacheConfig) -> StateCache {
    StateCache::with_clock(config, Arc::new(clock.clone())).unwrap()
}

fn open_default(dir: &TempDir, clock: &ManualClock) -> StateCache {
    open(clock, CacheConfig::new(dir.path()))
}

fn snapshot_size(state: &State) -> u64 {
    state.to_vec().unwrap().len() as u64
}

#[test]
fn test_put_then_get_returns_equal_state() {
    let dir = TempDir::new().unwrap();
    let cache = open_default(&dir, &ManualClock::default());
    let state = sample_state(3);

    cache.put("dev", &state, Metadata::new()).unwrap();

    assert_eq!(*cache.get("dev").unwrap(), state);
    let stats = cache.stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.total_size_bytes, snapshot_size(&state));
}

#[test]
fn test_get_unknown_key_is_miss() {
    let dir = TempDir::new().unwrap();
    let cache = open_default(&dir, &ManualClock::default());

    let err = cache.get("missing").unwrap_err();

    assert!(matches!(err, StateError::NotFound(ref key) if key == "missing"));
    assert_eq!(cache.stats().misses, 1);
}

#[test]
fn test_eviction_follows_last_access() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::default();
    let size = snapshot_size(&sample_state(1));
    let cache = open(
        &clock,
        CacheConfig::new(dir.path()).with_max_size(size * 3),
    );

    // Inserted A, B, C; then accessed in the order C, A, B.
    for key in ["a", "b", "c"] {
        cache.put(key, &sample_state(1), Metadata::new()).unwrap();
        clock.advance_secs(1);
    }
    for key in ["c", "a", "b"] {
        cache.get(key).unwrap();
        clock.advance_secs(1);
    }

    cache.put("d", &sample_state(1), Metadata::new()).unwrap();
    assert!(!cache.contains("c"));
    assert!(cache.contains("a") && cache.contains("b") && cache.contains("d"));

    cache.put("e", &sample_state(1), Metadata::new()).unwrap();
    assert!(!cache.contains("a"));

    cache.put("f", &sample_state(1), Metadata::new()).unwrap();
    assert!(!cache.contains("b"));
    assert_eq!(cache.stats().entries, 3);
}

#[test]
fn test_oversized_state_is_rejected_without_eviction() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::default();
    let small = sample_state(1);
    let cache = open(
        &clock,
        CacheConfig::new(dir.path()).with_max_size(snapshot_size(&small) + 10),
    );
    cache.put("small", &small, Metadata::new()).unwrap();

    let mut big = sample_state(2);
    for i in 0..20 {
        big.resources
            .push(StateResource::new("google_storage_bucket", format!("bucket_{}", i)));
    }

    let err = cache.put("big", &big, Metadata::new()).unwrap_err();

    assert!(matches!(err, StateError::CapacityExceeded { .. }));
    assert!(cache.contains("small"));
    assert!(!cache.contains("big"));
}

#[test]
fn test_expired_entry_is_miss_and_removed() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::default();
    let cache = open(
        &clock,
        CacheConfig::new(dir.path()).with_ttl(Duration::from_secs(60)),
    );
    cache.put("dev", &sample_state(1), Metadata::new()).unwrap();
    let path = cache.entry_info("dev").unwrap().path;

    clock.advance_secs(60);
    assert!(cache.get("dev").is_ok());

    clock.advance_secs(1);
    assert!(cache.get("dev").unwrap_err().is_miss());
    assert_eq!(cache.stats().entries, 0);
    assert!(!path.exists());
}

#[test]
fn test_compare_is_antisymmetric() {
    let dir = TempDir::new().unwrap();
    let cache = open_default(&dir, &ManualClock::default());

    let before = sample_state(1);
    let after = sample_state(2)
        .with_resource(StateResource::new("google_compute_subnetwork", "private"))
        .with_output("subnet", StateOutput::new(json!("private")));
    cache.put("before", &before, Metadata::new()).unwrap();
    cache.put("after", &after, Metadata::new()).unwrap();

    let forward = cache.compare("before", "after").unwrap();
    let backward = cache.compare("after", "before").unwrap();

    assert_eq!(forward.added_resources, vec!["google_compute_subnetwork.private"]);
    assert_eq!(forward.added_resources, backward.removed_resources);
    assert_eq!(forward.removed_resources, backward.added_resources);
    assert_eq!(forward.added_outputs, backward.removed_outputs);
    assert!(forward.serial_changed);
    assert!(!forward.version_changed);
}

#[test]
fn test_compare_missing_key() {
    let dir = TempDir::new().unwrap();
    let cache = open_default(&dir, &ManualClock::default());
    cache.put("a", &sample_state(1), Metadata::new()).unwrap();

    assert!(cache.compare("a", "b").unwrap_err().is_miss());
}

#[test]
fn test_merge_takes_max_serial_and_later_outputs() {
    let dir = TempDir::new().unwrap();
    let cache = open_default(&dir, &ManualClock::default());

    let first = sample_state(9).with_output("region", StateOutput::new(json!("europe-west1")));
    let second = State::new("1.6.2", "other-lineage")
        .with_serial(4)
        .with_resource(StateResource::new("google_sql_database_instance", "db"))
        .with_output("region", StateOutput::new(json!("us-central1")))
        .with_output("db_name", StateOutput::new(json!("main")));
    cache.put("network", &first, Metadata::new()).unwrap();
    cache.put("database", &second, Metadata::new()).unwrap();

    let merged = cache.merge(&["network", "database"], "combined").unwrap();

    assert_eq!(merged.serial, 9);
    assert_eq!(merged.lineage, first.lineage);
    assert_eq!(merged.resources.len(), 2);
    assert_eq!(merged.outputs["region"].value, json!("us-central1"));
    assert_eq!(merged.outputs["network"].value, json!("vpc"));
    assert_eq!(merged.outputs["db_name"].value, json!("main"));

    assert_eq!(*cache.get("combined").unwrap(), *merged);
    assert_eq!(
        cache.metadata("combined").unwrap().get("merged_from").map(String::as_str),
        Some("network,database")
    );
}

#[test]
fn test_merge_requires_keys() {
    let dir = TempDir::new().unwrap();
    let cache = open_default(&dir, &ManualClock::default());
    cache.put("a", &sample_state(1), Metadata::new()).unwrap();

    let empty: [&str; 0] = [];
    assert!(matches!(cache.merge(&empty, "t"), Err(StateError::EmptyMerge)));
    assert!(cache.merge(&["a", "missing"], "t").unwrap_err().is_miss());
    assert!(!cache.contains("t"));
}

#[test]
fn test_import_validates_before_storing() {
    let dir = TempDir::new().unwrap();
    let cache = open_default(&dir, &ManualClock::default());

    let unsupported = json!({ "version": 2, "terraform_version": "0.11.0", "lineage": "x" });
    let err = cache
        .import("old", unsupported.to_string().as_bytes())
        .unwrap_err();
    assert!(matches!(err, StateError::Invalid(_)));
    assert!(!cache.contains("old"));

    let garbage = cache.import("bad", &b"not json"[..]).unwrap_err();
    assert!(matches!(garbage, StateError::Invalid(_)));

    let good = serde_json::to_vec(&sample_state(5)).unwrap();
    let imported = cache.import("good", good.as_slice()).unwrap();
    assert_eq!(imported.serial, 5);
    assert_eq!(
        cache.metadata("good").unwrap().get("origin").map(String::as_str),
        Some("import")
    );
}

#[test]
fn test_export_and_stream() {
    let dir = TempDir::new().unwrap();
    let cache = open_default(&dir, &ManualClock::default());
    let state = sample_state(2);
    cache.put("dev", &state, Metadata::new()).unwrap();

    let mut exported = Vec::new();
    cache.export("dev", &mut exported).unwrap();
    let text = String::from_utf8(exported).unwrap();
    assert!(text.contains("\n  \"version\": 4"));
    assert_eq!(State::from_slice(text.as_bytes()).unwrap(), state);

    let mut raw = Vec::new();
    let copied = cache.stream("dev", &mut raw).unwrap();
    assert_eq!(copied, snapshot_size(&state));
    assert_eq!(raw, state.to_vec().unwrap());

    let export_path = dir.path().join("exported.json");
    cache.export_file("dev", &export_path).unwrap();
    let reimported = cache.import_file("copy", &export_path).unwrap();
    assert_eq!(*reimported, state);
}

#[test]
fn test_validate_cached_state() {
    let dir = TempDir::new().unwrap();
    let cache = open_default(&dir, &ManualClock::default());

    cache.put("ok", &sample_state(1), Metadata::new()).unwrap();
    let mut broken = sample_state(1);
    broken.lineage.clear();
    cache.put("broken", &broken, Metadata::new()).unwrap();

    assert!(cache.validate("ok").is_ok());
    assert!(matches!(cache.validate("broken"), Err(StateError::Invalid(_))));
    assert!(cache.validate("missing").unwrap_err().is_miss());
}

#[test]
fn test_delete_and_clear_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let cache = open_default(&dir, &ManualClock::default());
    cache.put("a", &sample_state(1), Metadata::new()).unwrap();
    cache.put("b", &sample_state(2), Metadata::new()).unwrap();

    // A file already removed out from under the cache is not an error.
    std::fs::remove_file(cache.entry_info("a").unwrap().path).unwrap();
    assert!(cache.delete("a").unwrap());
    assert!(!cache.delete("a").unwrap());

    assert_eq!(cache.clear().unwrap(), 1);
    assert_eq!(cache.clear().unwrap(), 0);
    assert_eq!(cache.stats().total_size_bytes, 0);
}

#[test]
fn test_lookup_helpers() {
    let dir = TempDir::new().unwrap();
    let cache = open_default(&dir, &ManualClock::default());
    cache.put("dev", &sample_state(1), Metadata::new()).unwrap();

    let resource = cache
        .resource_by_address("dev", "google_compute_network.vpc")
        .unwrap();
    assert_eq!(resource.id.as_deref(), Some("projects/demo/global/networks/vpc"));
    assert!(matches!(
        cache.resource_by_address("dev", "google_compute_network.other"),
        Err(StateError::ResourceNotFound(_))
    ));
    assert_eq!(cache.output_by_name("dev", "network").unwrap().value, json!("vpc"));
    assert!(matches!(
        cache.output_by_name("dev", "nope"),
        Err(StateError::OutputNotFound(_))
    ));

    cache.set_metadata("dev", "workspace", "dev").unwrap();
    assert_eq!(cache.metadata("dev").unwrap()["workspace"], "dev");
}

#[test]
fn test_refresh_reloads_from_file() {
    let dir = TempDir::new().unwrap();
    let cache = open(
        &ManualClock::default(),
        CacheConfig::new(dir.path()).with_keep_in_memory(false),
    );
    cache.put("dev", &sample_state(6), Metadata::new()).unwrap();
    assert_eq!(cache.stats().in_memory, 0);

    assert_eq!(cache.refresh("dev").unwrap().serial, 6);
    assert_eq!(cache.get("dev").unwrap().serial, 6);
    assert!(cache.refresh("missing").unwrap_err().is_miss());
}

#[test]
fn test_cleanup_expired_sweeps_old_entries() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::default();
    let cache = open(
        &clock,
        CacheConfig::new(dir.path()).with_ttl(Duration::from_secs(100)),
    );

    cache.put("old", &sample_state(1), Metadata::new()).unwrap();
    clock.advance_secs(80);
    cache.put("new", &sample_state(2), Metadata::new()).unwrap();
    clock.advance_secs(30);

    assert_eq!(cache.cleanup_expired(), 1);
    assert_eq!(cache.stats().entries, 1);
    assert!(cache.contains("new"));
    assert_eq!(cache.cleanup_expired(), 0);
}

#[tokio::test]
async fn test_background_cleanup_task() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::default();
    let cache = Arc::new(open(
        &clock,
        CacheConfig::new(dir.path())
            .with_ttl(Duration::from_secs(10))
            .with_cleanup_interval(Duration::from_secs(1)),
    ));
    cache.put("dev", &sample_state(1), Metadata::new()).unwrap();
    clock.advance_secs(11);

    let cancel = cache.spawn_cleanup();

    let mut swept = false;
    for _ in 0..50 {
        if cache.stats().entries == 0 {
            swept = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cancel.cancel();

    assert!(swept);
}

#[test]
fn test_purge_orphans_keeps_live_snapshots() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::default();
    let cache = open_default(&dir, &clock);
    cache.put("dev", &sample_state(1), Metadata::new()).unwrap();

    std::fs::write(dir.path().join("abandoned-0000.tfstate"), b"{}").unwrap();
    std::fs::write(dir.path().join("half.tfstate.1-2.tmp"), b"{").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

    assert_eq!(cache.purge_orphans().unwrap(), 2);
    assert!(cache.entry_info("dev").unwrap().path.exists());
    assert!(dir.path().join("notes.txt").exists());
    assert!(cache.get("dev").is_ok());
}

#[test]
fn test_reopened_cache_can_purge_previous_snapshots() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::default();
    {
        let cache = open_default(&dir, &clock);
        cache.put("dev", &sample_state(1), Metadata::new()).unwrap();
    }

    let reopened = open_default(&dir, &clock);
    assert!(!reopened.contains("dev"));
    assert_eq!(reopened.purge_orphans().unwrap(), 1);
}

#[test]
fn test_racing_puts_to_one_key_leave_a_readable_entry() {
    let dir = TempDir::new().unwrap();
    let cache = open(
        &ManualClock::default(),
        CacheConfig::new(dir.path()).with_keep_in_memory(false),
    );
    let (s1, s2) = (sample_state(1), sample_state(2));
    cache.put("shared", &s1, Metadata::new()).unwrap();

    for _ in 0..300 {
        let barrier = std::sync::Barrier::new(2);
        std::thread::scope(|scope| {
            for state in [&s2, &s1] {
                let (cache, barrier) = (&cache, &barrier);
                scope.spawn(move || {
                    barrier.wait();
                    cache.put("shared", state, Metadata::new()).unwrap();
                });
            }
        });

        let info = cache.entry_info("shared").unwrap();
        assert!(info.path.exists(), "entry points at a removed snapshot");
        let loaded = cache.get("shared").unwrap();
        assert!(loaded.serial == 1 || loaded.serial == 2);
    }

    let snapshots = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "tfstate"))
        .count();
    assert_eq!(snapshots, 1);
    assert_eq!(cache.stats().entries, 1);
}
