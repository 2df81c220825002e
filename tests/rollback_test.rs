//! Rollback and ledger scenarios

mod common;

use chrono::DateTime;
use k8s_openapi::api::core::v1::EphemeralContainer;

use common::{pod, pod_with_containers, service, Call, FakeCluster, Workspace};
use tipsy::chaos::{ChaosContext, ChaosType, MisrouteTarget};
use tipsy::rollback::{filter_actions, RollbackEngine, RollbackFilter, RollbackSummary};
use tipsy::state::{meta, ChaosAction};
use tipsy::ChaosError;

fn named(name: &str) -> EphemeralContainer {
    EphemeralContainer {
        name: name.to_string(),
        ..Default::default()
    }
}

fn container_names(cluster: &FakeCluster, name: &str) -> Vec<String> {
    cluster
        .pod("default", name)
        .and_then(|p| p.spec)
        .and_then(|s| s.ephemeral_containers)
        .unwrap_or_default()
        .into_iter()
        .map(|c| c.name)
        .collect()
}

#[tokio::test]
async fn test_rollback_mixed_ledger() {
    let cluster = FakeCluster::new();
    cluster.add_pod(pod_with_containers(
        pod("default", "pod1", "web", "Running", "10.0.0.1"),
        vec![named("debugger"), named("latency-injector-1700000000")],
    ));
    cluster.add_pod(pod_with_containers(
        pod("default", "pod2", "web", "Running", "10.0.0.2"),
        vec![named("tipsy-cpu-stress-1700000000")],
    ));
    let (svc, endpoints) = service("default", "svc1", "10.0.0.9");
    cluster.add_service(svc, endpoints.clone());

    let ws = Workspace::new();
    ws.backups.save(&endpoints, "svc1", "default").unwrap();

    ws.ledger
        .save(ChaosAction::new(ChaosType::Latency, "pod1", "default"))
        .unwrap();
    ws.ledger
        .save(ChaosAction::new(ChaosType::CpuStress, "pod2", "default"))
        .unwrap();
    ws.ledger
        .save(ChaosAction::new(ChaosType::Misroute, "svc1", "default"))
        .unwrap();
    ws.ledger
        .save(ChaosAction::new(ChaosType::Kill, "pod9", "default"))
        .unwrap();
    let bogus = ws
        .ledger
        .save(ChaosAction {
            action_type: "teleport".to_string(),
            target_pod: "pod1".to_string(),
            namespace: "default".to_string(),
            timestamp: String::new(),
            metadata: Default::default(),
        })
        .unwrap();

    let ctx = ChaosContext::new(&cluster, &ws.ledger, &ws.backups, false);
    let summary = RollbackEngine::new(ctx)
        .rollback_all(&RollbackFilter::default())
        .await
        .unwrap();

    assert_eq!(
        summary,
        RollbackSummary {
            attempted: 5,
            succeeded: 4,
            failed: 1
        }
    );
    assert_eq!(container_names(&cluster, "pod1"), vec!["debugger".to_string()]);
    assert!(container_names(&cluster, "pod2").is_empty());
    assert!(!ws.backups.path_for("svc1", "default").exists());
    assert_eq!(ws.ledger.load().unwrap(), vec![bogus]);
}

#[tokio::test]
async fn test_inject_then_rollback_by_type() {
    let cluster = FakeCluster::new();
    cluster.add_pod(pod_with_containers(
        pod("default", "web-0", "web", "Running", "10.0.0.1"),
        vec![named("tipsy-old-debug")],
    ));
    let (svc, endpoints) = service("default", "web", "10.0.0.9");
    cluster.add_service(svc, endpoints.clone());
    let ws = Workspace::new();

    let ctx = ChaosContext::new(&cluster, &ws.ledger, &ws.backups, false);
    ctx.inject_packet_loss("default", "app=web", "10%", std::time::Duration::from_secs(30))
        .await
        .unwrap();
    ctx.misroute_service("web", "default", &MisrouteTarget::RemoveAll)
        .await
        .unwrap();
    assert_eq!(container_names(&cluster, "web-0").len(), 2);

    let filter = RollbackFilter::new(Some("packetloss".to_string()), None);
    let summary = RollbackEngine::new(ctx).rollback_all(&filter).await.unwrap();
    assert_eq!(summary.succeeded, 1);

    // The id-tagged injector goes, the unrelated container stays
    assert_eq!(
        container_names(&cluster, "web-0"),
        vec!["tipsy-old-debug".to_string()]
    );
    let remaining = ws.ledger.load().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].action_type, "misroute");

    let summary = RollbackEngine::new(ctx)
        .rollback_all(&RollbackFilter::default())
        .await
        .unwrap();
    assert_eq!(summary.succeeded, 1);
    let restored = cluster.endpoints("default", "web").unwrap();
    assert_eq!(restored.subsets, endpoints.subsets);
    assert!(matches!(
        cluster.calls().last(),
        Some(Call::ReplaceEndpoints { subsets: 1, .. })
    ));
    assert!(ws.ledger.load().unwrap().is_empty());
}

#[tokio::test]
async fn test_restore_succeeds_when_backup_cleanup_fails() {
    let cluster = FakeCluster::new();
    let (svc, endpoints) = service("default", "web", "10.0.0.9");
    cluster.add_service(svc, endpoints.clone());
    let ws = Workspace::new();

    let ctx = ChaosContext::new(&cluster, &ws.ledger, &ws.backups, false);
    ctx.misroute_service("web", "default", &MisrouteTarget::RemoveAll)
        .await
        .unwrap();
    let backup = ws.backups.path_for("web", "default");
    assert!(backup.exists());

    // The backup disappears between the restore and its cleanup
    *cluster.remove_on_replace.lock().unwrap() = Some(backup.clone());

    let summary = RollbackEngine::new(ctx)
        .rollback_all(&RollbackFilter::new(Some("misroute".into()), None))
        .await
        .unwrap();

    assert_eq!(
        summary,
        RollbackSummary {
            attempted: 1,
            succeeded: 1,
            failed: 0
        }
    );
    assert_eq!(
        cluster.endpoints("default", "web").unwrap().subsets,
        endpoints.subsets
    );
    assert!(ws.ledger.load().unwrap().is_empty());
}

#[tokio::test]
async fn test_rollback_of_empty_ledger() {
    let cluster = FakeCluster::new();
    let ws = Workspace::new();

    let ctx = ChaosContext::new(&cluster, &ws.ledger, &ws.backups, false);
    let summary = RollbackEngine::new(ctx)
        .rollback_all(&RollbackFilter::new(Some("latency".into()), Some("x".into())))
        .await
        .unwrap();
    assert_eq!(summary, RollbackSummary::default());
    assert!(cluster.calls().is_empty());
}

#[tokio::test]
async fn test_rollback_aborts_on_malformed_ledger() {
    let cluster = FakeCluster::new();
    let ws = Workspace::new();
    std::fs::write(ws.ledger.path(), "{not json").unwrap();

    let ctx = ChaosContext::new(&cluster, &ws.ledger, &ws.backups, false);
    let err = RollbackEngine::new(ctx)
        .rollback_all(&RollbackFilter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ChaosError::LedgerParse { .. }));
}

#[test]
fn test_save_stamps_parseable_timestamp() {
    let ws = Workspace::new();
    ws.ledger
        .save(ChaosAction::new(ChaosType::Kill, "web-0", "default").with_meta(meta::COUNT, "1"))
        .unwrap();

    let loaded = ws.ledger.load().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].target_pod, "web-0");
    assert_eq!(loaded[0].meta(meta::COUNT), Some("1"));
    assert!(DateTime::parse_from_rfc3339(&loaded[0].timestamp).is_ok());
}

#[test]
fn test_delete_distinguishes_by_timestamp() {
    let ws = Workspace::new();
    let mut first = ChaosAction::new(ChaosType::Latency, "web-0", "default");
    first.timestamp = "2024-01-01T00:00:00Z".to_string();
    let mut second = first.clone();
    second.timestamp = "2024-01-01T00:00:01Z".to_string();

    ws.ledger.save(first.clone()).unwrap();
    ws.ledger.save(second.clone()).unwrap();
    ws.ledger.delete(&first).unwrap();

    assert_eq!(ws.ledger.load().unwrap(), vec![second]);
    assert!(matches!(
        ws.ledger.delete(&first),
        Err(ChaosError::ActionNotFound(_))
    ));
}

#[test]
fn test_clear_is_idempotent() {
    let ws = Workspace::new();
    ws.ledger
        .save(ChaosAction::new(ChaosType::Kill, "web-0", "default"))
        .unwrap();

    ws.ledger.clear().unwrap();
    assert!(ws.ledger.load().unwrap().is_empty());
    ws.ledger.clear().unwrap();
    assert!(ws.ledger.load().unwrap().is_empty());
}

#[test]
fn test_filter_keeps_ledger_order() {
    let actions: Vec<ChaosAction> = ["pod3", "pod1", "pod2"]
        .iter()
        .map(|p| ChaosAction::new(ChaosType::Latency, *p, "default"))
        .collect();

    let all = filter_actions(&actions, &RollbackFilter::new(Some(String::new()), None));
    let order: Vec<&str> = all.iter().map(|a| a.target_pod.as_str()).collect();
    assert_eq!(order, vec!["pod3", "pod1", "pod2"]);

    let none = filter_actions(&actions, &RollbackFilter::new(Some("kill".into()), None));
    assert!(none.is_empty());
}
