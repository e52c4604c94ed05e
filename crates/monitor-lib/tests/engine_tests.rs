//! End-to-end engine scenarios driven through the `Monitor` facade

mod common;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{net, storage_path, Harness, HarnessBuilder, Reply, T0};
use monitor_lib::alert::compose::{CRITICAL_TITLE, STORAGE_TITLE};
use monitor_lib::catalog::{endpoint_file_name, CustomEndpoint, FileCatalog};
use monitor_lib::health::{components, ComponentStatus};
use monitor_lib::runner::BatchRun;
use monitor_lib::settings::SettingsFile;
use monitor_lib::state::Clock;
use monitor_lib::{
    Config, ConfigPatch, EngineError, LatencyThresholds, Level, Mode, Probed, Sample, TargetClass,
    TargetOverride,
};

const BATCH_GAP_MS: i64 = 10_000;

#[tokio::test]
async fn test_alert_fires_once_after_threshold() {
    let h = HarnessBuilder::new()
        .targets(Mode::SessionHost, vec![net("gw", "Gateway", "gw.example.com")])
        .executor(|e| e.reply("gw.example.com", Reply::Latency(200.0)))
        .build();
    h.monitor.initialize().await;

    for _ in 0..2 {
        h.monitor.test_now().await;
        h.clock.advance(BATCH_GAP_MS);
    }
    assert_eq!(h.notifier.count(), 0);
    // identical latency every batch still advances the streak
    assert_eq!(h.monitor.alert_snapshot().await.network.consecutive_breaches, 2);

    h.monitor.test_now().await;
    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, CRITICAL_TITLE);
    assert_eq!(sent[0].1, "Average: 200.0ms [CRIT]\nCritical: Gateway: 200ms");

    let alerts = h.monitor.alert_snapshot().await;
    assert_eq!(alerts.network.consecutive_breaches, 0);
    assert_eq!(alerts.network.last_notified_at_ms, Some(T0 + 2 * BATCH_GAP_MS));
    assert!(!alerts.network.send_in_progress);

    // a fourth breach inside the cooldown stays quiet
    h.clock.advance(BATCH_GAP_MS);
    h.monitor.test_now().await;
    assert_eq!(h.notifier.count(), 1);
}

#[tokio::test]
async fn test_batch_without_latency_keeps_breach_streak() {
    let h = HarnessBuilder::new()
        .targets(Mode::SessionHost, vec![net("gw", "Gateway", "gw.example.com")])
        .executor(|e| e.reply("gw.example.com", Reply::Latency(200.0)))
        .build();
    h.monitor.initialize().await;

    for _ in 0..2 {
        h.monitor.test_now().await;
        h.clock.advance(BATCH_GAP_MS);
    }
    h.executor
        .set_reply("gw.example.com", Reply::Fail("connection refused".into()));
    h.monitor.test_now().await;
    h.clock.advance(BATCH_GAP_MS);
    assert_eq!(h.monitor.alert_snapshot().await.network.consecutive_breaches, 2);

    h.executor.set_reply("gw.example.com", Reply::Latency(200.0));
    h.monitor.test_now().await;
    assert_eq!(h.notifier.count(), 1);
}

#[tokio::test]
async fn test_second_notification_waits_for_cooldown() {
    let h = HarnessBuilder::new()
        .targets(Mode::SessionHost, vec![net("gw", "Gateway", "gw.example.com")])
        .executor(|e| e.reply("gw.example.com", Reply::Latency(120.0)))
        .build();
    h.monitor.initialize().await;

    let mut sent_at = Vec::new();
    for _ in 0..10 {
        let before = h.notifier.count();
        h.monitor.test_now().await;
        if h.notifier.count() > before {
            sent_at.push(h.clock.now_ms());
        }
        h.clock.advance(60_000);
    }

    assert!(sent_at.len() >= 2, "expected two notifications, got {:?}", sent_at);
    assert!(sent_at[1] - sent_at[0] >= 300_000);
    assert_eq!(h.notifier.sent()[0].0, "High Latency Warning");
}

#[tokio::test]
async fn test_muting_mid_streak_suppresses_alert() {
    let h = HarnessBuilder::new()
        .targets(
            Mode::SessionHost,
            vec![
                net("slow", "Slow", "slow.example.com"),
                net("fast", "Fast", "fast.example.com"),
            ],
        )
        .executor(|e| {
            e.reply("slow.example.com", Reply::Latency(300.0))
                .reply("fast.example.com", Reply::Latency(10.0))
        })
        .build();
    h.monitor.initialize().await;

    for _ in 0..2 {
        h.monitor.test_now().await;
        h.clock.advance(BATCH_GAP_MS);
    }
    h.monitor
        .set_target_muted(TargetClass::Network, "slow", true)
        .await
        .unwrap();
    h.monitor.test_now().await;

    assert_eq!(h.notifier.count(), 0);
    assert_eq!(h.monitor.alert_snapshot().await.network.consecutive_breaches, 0);

    // muted targets are still probed and updated
    let status = h
        .monitor
        .status_snapshot(TargetClass::Network)
        .await
        .get("slow")
        .cloned()
        .unwrap();
    assert!(status.target.muted());
    assert_eq!(status.last_updated_ms, Some(T0 + 2 * BATCH_GAP_MS));
    assert_eq!(status.level, Level::Critical);
    assert_eq!(h.executor.calls_for("slow.example.com"), 3);
}

#[tokio::test]
async fn test_non_latency_critical_target_never_breaches() {
    let mut relaxed = net("cdn", "CDN", "cdn.example.com");
    relaxed.latency_critical = false;
    let h = HarnessBuilder::new()
        .targets(Mode::SessionHost, vec![relaxed])
        .executor(|e| e.reply("cdn.example.com", Reply::Latency(400.0)))
        .build();
    h.monitor.initialize().await;

    for _ in 0..5 {
        h.monitor.test_now().await;
        h.clock.advance(BATCH_GAP_MS);
    }
    assert_eq!(h.notifier.count(), 0);
}

#[tokio::test]
async fn test_concurrent_test_now_is_single_flight() {
    let h = HarnessBuilder::new()
        .targets(Mode::SessionHost, vec![net("gw", "Gateway", "gw.example.com")])
        .executor(|e| e.hold("gw.example.com"))
        .build();
    h.monitor.initialize().await;

    let monitor = h.monitor.clone();
    let first = tokio::spawn(async move { monitor.test_now().await });
    h.executor.entered.notified().await;

    let second = h.monitor.test_now().await;
    assert_eq!(second, vec![BatchRun::Skipped]);

    h.executor.open_gate();
    let first = first.await.unwrap();
    let summary = first[0].summary().unwrap();
    assert_eq!(summary.probed, 1);
    assert_eq!(summary.stale, 0);
    assert_eq!(h.executor.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_ticks_during_slow_batch_are_skipped() {
    let h = HarnessBuilder::new()
        .targets(Mode::SessionHost, vec![net("gw", "Gateway", "gw.example.com")])
        .executor(|e| e.hold("gw.example.com"))
        .build();
    h.monitor.start().await.unwrap();
    h.executor.entered.notified().await;

    // two more ticks elapse while the first batch is held open
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(h.executor.calls(), 1);

    h.executor.open_gate();
    h.monitor.shutdown("test complete").await;
}

#[tokio::test]
async fn test_mode_switch_discards_in_flight_outcomes() {
    let h = HarnessBuilder::new()
        .targets(
            Mode::SessionHost,
            vec![
                net("sh-a", "Session A", "a.sessionhost.example.com"),
                net("sh-b", "Session B", "b.sessionhost.example.com"),
            ],
        )
        .targets(Mode::EndUser, vec![net("eu-a", "End User A", "a.enduser.example.com")])
        .executor(|e| {
            e.hold("a.sessionhost.example.com")
                .hold("b.sessionhost.example.com")
        })
        .build();
    h.monitor.initialize().await;

    let monitor = h.monitor.clone();
    let old_batch = tokio::spawn(async move { monitor.test_now().await });
    h.executor.entered.notified().await;

    let targets = h.monitor.switch_mode(Mode::EndUser).await.unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].id, "eu-a");
    assert_eq!(h.monitor.config().await.mode, Mode::EndUser);

    h.executor.open_gate();
    let runs = old_batch.await.unwrap();
    assert_eq!(
        runs[0],
        BatchRun::Superseded {
            class: TargetClass::Network,
            stale: 2
        }
    );

    let snapshot = h.monitor.status_snapshot(TargetClass::Network).await;
    assert!(!snapshot.contains_key("sh-a"));
    assert!(!snapshot.contains_key("sh-b"));

    let ordered = h.monitor.ordered_statuses(TargetClass::Network).await;
    let ids: Vec<&str> = ordered.iter().map(|s| s.target.id()).collect();
    assert_eq!(ids, vec!["eu-a"]);
}

async fn wait_for_breaches(h: &Harness, expected: u32) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.monitor.alert_snapshot().await.network.consecutive_breaches != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_stale_batch_finishing_late_does_not_count_a_breach() {
    let h = HarnessBuilder::new()
        .targets(Mode::SessionHost, vec![net("sh-a", "Session A", "a.sessionhost.example.com")])
        .targets(Mode::EndUser, vec![net("eu-a", "End User A", "a.enduser.example.com")])
        .executor(|e| {
            e.hold("a.sessionhost.example.com")
                .reply("a.sessionhost.example.com", Reply::Latency(400.0))
                .reply("a.enduser.example.com", Reply::Latency(200.0))
        })
        .build();
    h.monitor.initialize().await;

    let monitor = h.monitor.clone();
    let old_batch = tokio::spawn(async move { monitor.test_now().await });
    h.executor.entered.notified().await;

    // the switch runs the new set at once while the old batch is still held
    h.monitor.switch_mode(Mode::EndUser).await.unwrap();
    wait_for_breaches(&h, 1).await;

    h.executor.open_gate();
    let runs = old_batch.await.unwrap();
    assert_eq!(
        runs[0],
        BatchRun::Superseded {
            class: TargetClass::Network,
            stale: 1
        }
    );

    assert_eq!(h.monitor.alert_snapshot().await.network.consecutive_breaches, 1);
    assert_eq!(h.notifier.count(), 0);
    assert!(h.sink.published.lock().unwrap().iter().all(|(avg, _)| *avg == 200.0));
    let status = h.monitor.status_snapshot(TargetClass::Network).await["eu-a"].clone();
    assert!(!status.is_loading);

    // two more real batches reach the threshold of three
    h.clock.advance(BATCH_GAP_MS);
    h.monitor.test_now().await;
    assert_eq!(h.notifier.count(), 0);
    h.clock.advance(BATCH_GAP_MS);
    h.monitor.test_now().await;
    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, "Average: 200.0ms [CRIT]\nCritical: End User A: 200ms");
}

#[tokio::test]
async fn test_reload_targets_picks_up_custom_endpoints() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(
        dir.path().join(endpoint_file_name(Mode::SessionHost)),
        serde_json::json!({
            "name": "Session Host",
            "categories": [
                { "name": "Core", "endpoints": [{ "id": "gw", "name": "Gateway", "url": "gw.example.com" }] }
            ]
        })
        .to_string(),
    )
    .unwrap();
    let catalog = Arc::new(FileCatalog::new(dir.path()));

    let h = HarnessBuilder::new()
        .catalog(catalog.clone())
        .executor(|e| e.reply("intranet.corp.local", Reply::Latency(35.0)))
        .build();
    h.monitor.initialize().await;
    h.monitor.test_now().await;
    assert_eq!(h.monitor.ordered_statuses(TargetClass::Network).await.len(), 1);

    catalog
        .set_custom_endpoints(vec![CustomEndpoint {
            id: "intranet".to_string(),
            name: "Intranet".to_string(),
            url: "intranet.corp.local".to_string(),
            port: Some(80),
            protocol: None,
            category: None,
            enabled: true,
            latency_critical: true,
        }])
        .await;
    // the config is unchanged, so only an explicit reload sees the new endpoint
    let unchanged = (*h.monitor.config().await).clone();
    h.monitor.replace_config(unchanged).await.unwrap();
    assert_eq!(h.monitor.ordered_statuses(TargetClass::Network).await.len(), 1);

    let targets = h.monitor.reload_targets().await.unwrap();
    let ids: Vec<&str> = targets.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["gw", "intranet"]);

    tokio::time::timeout(Duration::from_secs(5), async {
        while h.executor.calls_for("intranet.corp.local") == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    let ordered = h.monitor.ordered_statuses(TargetClass::Network).await;
    assert_eq!(ordered[1].target.id(), "intranet");
}

#[tokio::test]
async fn test_consecutive_failures_mark_offline() {
    let h = HarnessBuilder::new()
        .targets(Mode::SessionHost, vec![net("gw", "Gateway", "gw.example.com")])
        .executor(|e| e.reply("gw.example.com", Reply::Fail("connection timed out".into())))
        .build();
    h.monitor.initialize().await;
    let mut offline_rx = h.monitor.subscribe_offline();

    h.monitor.test_now().await;
    h.monitor.test_now().await;
    assert!(!h.monitor.is_offline());

    h.monitor.test_now().await;
    assert!(h.monitor.is_offline());
    assert!(offline_rx.has_changed().unwrap());
    assert!(*offline_rx.borrow_and_update());

    let status = h
        .monitor
        .status_snapshot(TargetClass::Network)
        .await
        .get("gw")
        .cloned()
        .unwrap();
    assert_eq!(status.consecutive_failures, 3);
    assert!(status.current_latency.is_none());
    assert!(status.last_error.is_some());

    // no latency anywhere, so no network alert either
    assert_eq!(h.notifier.count(), 0);

    h.executor.set_reply("gw.example.com", Reply::Latency(15.0));
    h.monitor.test_now().await;
    assert!(!h.monitor.is_offline());
}

#[tokio::test]
async fn test_os_connectivity_report_toggles_offline() {
    let h = HarnessBuilder::new()
        .targets(Mode::SessionHost, vec![net("gw", "Gateway", "gw.example.com")])
        .build();
    h.monitor.initialize().await;

    h.monitor.report_connectivity(false);
    assert!(h.monitor.is_offline());
    h.monitor.report_connectivity(true);
    assert!(!h.monitor.is_offline());
}

#[tokio::test]
async fn test_storage_path_failure_alerts_per_path() {
    let h = HarnessBuilder::new()
        .targets(Mode::SessionHost, vec![net("gw", "Gateway", "gw.example.com")])
        .storage(vec![
            storage_path(0, "down.file.core.windows.net"),
            storage_path(1, "up.file.core.windows.net"),
        ])
        .executor(|e| {
            e.reply(
                "down.file.core.windows.net",
                Reply::Fail("connection refused".into()),
            )
        })
        .build();
    let (network, storage) = h.monitor.initialize().await;
    assert_eq!((network, storage), (1, 2));

    for _ in 0..3 {
        let runs = h.monitor.test_now().await;
        assert_eq!(runs.len(), 2);
        h.clock.advance(60_000);
    }

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, STORAGE_TITLE);
    assert!(sent[0].1.contains(r"\\down.file.core.windows.net\profiles"));
    assert!(sent[0].1.contains("port 445"));

    let alerts = h.monitor.alert_snapshot().await;
    assert!(alerts.storage["storage-profile-0"].last_notified_at_ms.is_some());
    assert!(alerts.storage["storage-profile-1"].last_notified_at_ms.is_none());
}

#[tokio::test]
async fn test_muted_storage_path_does_not_alert() {
    let h = HarnessBuilder::new()
        .targets(Mode::SessionHost, vec![net("gw", "Gateway", "gw.example.com")])
        .storage(vec![storage_path(0, "down.file.core.windows.net")])
        .executor(|e| e.reply("down.file.core.windows.net", Reply::Fail("timed out".into())))
        .build();
    h.monitor.initialize().await;
    h.monitor
        .set_target_muted(TargetClass::Storage, "storage-profile-0", true)
        .await
        .unwrap();

    for _ in 0..4 {
        h.monitor.test_now().await;
        h.clock.advance(60_000);
    }
    assert_eq!(h.notifier.count(), 0);

    let exported = h.monitor.export_settings(SettingsFile::default()).await;
    assert_eq!(exported.storage_muted, vec!["storage-profile-0".to_string()]);
}

#[tokio::test]
async fn test_storage_inactive_in_end_user_mode() {
    let h = HarnessBuilder::new()
        .config(|c| c.mode = Mode::EndUser)
        .targets(Mode::EndUser, vec![net("gw", "Gateway", "gw.example.com")])
        .storage(vec![storage_path(0, "share.file.core.windows.net")])
        .build();
    let (_, storage) = h.monitor.initialize().await;
    assert_eq!(storage, 0);

    let runs = h.monitor.test_now().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(h.executor.calls_for("share.file.core.windows.net"), 0);
}

#[tokio::test]
async fn test_notifications_disabled_never_sends() {
    let h = HarnessBuilder::new()
        .config(|c| c.notifications_enabled = false)
        .targets(Mode::SessionHost, vec![net("gw", "Gateway", "gw.example.com")])
        .executor(|e| e.reply("gw.example.com", Reply::Latency(500.0)))
        .build();
    h.monitor.initialize().await;

    for _ in 0..5 {
        let runs = h.monitor.test_now().await;
        assert!(runs[0].summary().unwrap().alerts.is_empty());
        h.clock.advance(BATCH_GAP_MS);
    }
    assert_eq!(h.notifier.count(), 0);
    assert_eq!(h.monitor.alert_snapshot().await.network.consecutive_breaches, 0);
}

#[tokio::test]
async fn test_failed_notification_retried_next_batch() {
    let h = HarnessBuilder::new()
        .config(|c| c.alert_threshold = 1)
        .targets(Mode::SessionHost, vec![net("gw", "Gateway", "gw.example.com")])
        .executor(|e| e.reply("gw.example.com", Reply::Latency(200.0)))
        .build();
    h.monitor.initialize().await;
    h.notifier.fail.store(true, Ordering::SeqCst);

    let runs = h.monitor.test_now().await;
    let report = &runs[0].summary().unwrap().alerts[0];
    assert_eq!(report.delivered, Some(false));
    let alerts = h.monitor.alert_snapshot().await;
    assert!(!alerts.network.send_in_progress);
    assert!(alerts.network.last_notified_at_ms.is_none());

    h.notifier.fail.store(false, Ordering::SeqCst);
    h.clock.advance(BATCH_GAP_MS);
    h.monitor.test_now().await;
    assert_eq!(h.notifier.count(), 1);
}

#[tokio::test]
async fn test_crashed_batch_marks_probes_unhealthy() {
    let h = HarnessBuilder::new()
        .config(|c| c.alert_threshold = 1)
        .targets(Mode::SessionHost, vec![net("gw", "Gateway", "gw.example.com")])
        .executor(|e| e.reply("gw.example.com", Reply::Latency(200.0)))
        .build();
    h.monitor.initialize().await;
    h.monitor.health().set_ready(true).await;
    h.notifier.panic.store(true, Ordering::SeqCst);

    let runs = h.monitor.test_now().await;
    assert!(runs.is_empty());

    let health = h.monitor.health().health().await;
    let probes = &health.components[components::NETWORK_PROBES];
    assert_eq!(probes.status, ComponentStatus::Unhealthy);
    assert!(probes.message.as_deref().unwrap().contains("batch task failed"));
    assert!(!h.monitor.health().readiness().await.ready);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let h = HarnessBuilder::new()
        .targets(Mode::SessionHost, vec![net("gw", "Gateway", "gw.example.com")])
        .build();
    h.monitor.initialize().await;

    let result = h
        .monitor
        .set_config(ConfigPatch {
            test_interval_sec: Some(0),
            ..Default::default()
        })
        .await;
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));

    let result = h
        .monitor
        .set_config(ConfigPatch {
            thresholds: Some(LatencyThresholds::new(100.0, 50.0, 150.0)),
            ..Default::default()
        })
        .await;
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    assert_eq!(h.monitor.config().await.test_interval_sec, 10);
}

#[tokio::test]
async fn test_out_of_range_config_leaves_schedule_untouched() {
    let h = HarnessBuilder::new()
        .targets(Mode::SessionHost, vec![net("gw", "Gateway", "gw.example.com")])
        .build();
    h.monitor.initialize().await;

    for patch in [
        ConfigPatch {
            test_interval_sec: Some(u64::MAX),
            ..Default::default()
        },
        ConfigPatch {
            alert_cooldown_min: Some(u64::MAX),
            ..Default::default()
        },
        ConfigPatch {
            storage_alert_cooldown_min: Some(1_441),
            ..Default::default()
        },
        ConfigPatch {
            storage_test_interval_sec: Some(86_401),
            ..Default::default()
        },
    ] {
        let result = h.monitor.set_config(patch).await;
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    }

    let config = h.monitor.config().await;
    assert_eq!(config.test_interval_sec, 10);
    assert_eq!(config.alert_cooldown_min, Config::default().alert_cooldown_min);

    let accepted = h
        .monitor
        .set_config(ConfigPatch {
            test_interval_sec: Some(86_400),
            alert_cooldown_min: Some(1_440),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(accepted.test_interval_sec, 86_400);
}

#[tokio::test]
async fn test_threshold_change_reclassifies_statuses() {
    let h = HarnessBuilder::new()
        .targets(Mode::SessionHost, vec![net("gw", "Gateway", "gw.example.com")])
        .executor(|e| e.reply("gw.example.com", Reply::Latency(100.0)))
        .build();
    h.monitor.initialize().await;
    h.monitor.test_now().await;
    assert_eq!(
        h.monitor.status_snapshot(TargetClass::Network).await["gw"].level,
        Level::Warning
    );

    h.monitor
        .set_config(ConfigPatch {
            thresholds: Some(LatencyThresholds::new(50.0, 120.0, 200.0)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(
        h.monitor.status_snapshot(TargetClass::Network).await["gw"].level,
        Level::Good
    );
}

#[tokio::test]
async fn test_unknown_target_mutation_fails() {
    let h = HarnessBuilder::new()
        .targets(Mode::SessionHost, vec![net("gw", "Gateway", "gw.example.com")])
        .build();
    h.monitor.initialize().await;

    let result = h.monitor.set_target_enabled("missing", false).await;
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_disabled_target_is_not_probed() {
    let h = HarnessBuilder::new()
        .targets(
            Mode::SessionHost,
            vec![
                net("gw", "Gateway", "gw.example.com"),
                net("api", "API", "api.example.com"),
            ],
        )
        .build();
    h.monitor.initialize().await;
    h.monitor.set_target_enabled("api", false).await.unwrap();

    let runs = h.monitor.test_now().await;
    assert_eq!(runs[0].summary().unwrap().probed, 1);
    assert_eq!(h.executor.calls_for("api.example.com"), 0);

    let exported = h.monitor.export_settings(SettingsFile::default()).await;
    assert_eq!(exported.target_overrides["api"].enabled, Some(false));
}

#[tokio::test(start_paused = true)]
async fn test_pause_and_interval_reconfigure_tickers() {
    let h = HarnessBuilder::new()
        .targets(Mode::SessionHost, vec![net("gw", "Gateway", "gw.example.com")])
        .storage(vec![storage_path(0, "share.file.core.windows.net")])
        .build();
    h.monitor.start().await.unwrap();

    let specs = h.monitor.ticker_specs().await;
    assert_eq!(specs[&TargetClass::Network].period, Duration::from_secs(10));
    assert_eq!(specs[&TargetClass::Storage].period, Duration::from_secs(60));

    h.monitor
        .set_config(ConfigPatch {
            test_interval_sec: Some(30),
            ..Default::default()
        })
        .await
        .unwrap();
    let specs = h.monitor.ticker_specs().await;
    assert_eq!(specs[&TargetClass::Network].period, Duration::from_secs(30));

    h.monitor.set_paused(true).await;
    assert!(h.monitor.ticker_specs().await.is_empty());
    assert!(h.monitor.engine_snapshot().await.paused);

    h.monitor.set_paused(false).await;
    assert_eq!(h.monitor.ticker_specs().await.len(), 2);

    h.monitor.shutdown("test complete").await;
}

#[tokio::test(start_paused = true)]
async fn test_switch_to_end_user_stops_storage_ticker() {
    let h = HarnessBuilder::new()
        .targets(Mode::SessionHost, vec![net("gw", "Gateway", "gw.example.com")])
        .targets(Mode::EndUser, vec![net("eu", "End User", "eu.example.com")])
        .storage(vec![storage_path(0, "share.file.core.windows.net")])
        .build();
    h.monitor.start().await.unwrap();
    assert!(h.monitor.ticker_specs().await.contains_key(&TargetClass::Storage));

    h.monitor.switch_mode(Mode::EndUser).await.unwrap();
    let specs = h.monitor.ticker_specs().await;
    assert!(!specs.contains_key(&TargetClass::Storage));
    assert!(h
        .monitor
        .ordered_statuses(TargetClass::Storage)
        .await
        .is_empty());

    h.monitor.shutdown("test complete").await;
}

#[tokio::test]
async fn test_history_csv_lists_samples_per_target() {
    let h = HarnessBuilder::new()
        .targets(
            Mode::SessionHost,
            vec![
                net("gw", "Gateway", "gw.example.com"),
                net("login", "Login, EU", "login.example.com"),
            ],
        )
        .executor(|e| {
            e.reply("gw.example.com", Reply::Latency(42.0))
                .reply("login.example.com", Reply::Fail("connection refused".into()))
        })
        .build();
    h.monitor.initialize().await;
    assert_eq!(h.monitor.history_csv().await, Err(EngineError::NoHistory));

    h.monitor.test_now().await;
    h.clock.advance(BATCH_GAP_MS);
    h.executor.set_reply("login.example.com", Reply::Latency(12.5));
    h.monitor.test_now().await;

    let csv = h.monitor.history_csv().await.unwrap();
    let lines: Vec<&str> = csv.trim_start_matches('\u{feff}').split('\n').collect();
    assert_eq!(
        lines,
        vec![
            "Endpoint ID,Endpoint Name,Timestamp,Latency (ms)",
            "gw,Gateway,2023-11-14T22:13:20.000Z,42",
            "gw,Gateway,2023-11-14T22:13:30.000Z,42",
            "login,\"Login, EU\",2023-11-14T22:13:30.000Z,12.5",
        ]
    );
}

#[tokio::test]
async fn test_import_settings_applies_config_and_overrides() {
    let h = HarnessBuilder::new()
        .targets(
            Mode::SessionHost,
            vec![
                net("gw", "Gateway", "gw.example.com"),
                net("login", "Login", "login.example.com"),
            ],
        )
        .storage(vec![storage_path(0, "share.file.core.windows.net")])
        .build();
    h.monitor.initialize().await;

    let mut settings = SettingsFile::default();
    settings.config.test_interval_sec = 30;
    settings.config.alert_threshold = 5;
    settings.target_overrides.insert(
        "login".to_string(),
        TargetOverride {
            enabled: Some(false),
            muted: Some(true),
        },
    );
    settings.storage_muted = vec!["storage-profile-0".to_string()];

    let installed = h.monitor.import_settings(&settings).await.unwrap();
    assert_eq!(installed.test_interval_sec, 30);
    assert_eq!(installed.alert_threshold, 5);

    let network = h.monitor.ordered_statuses(TargetClass::Network).await;
    assert!(network[0].target.enabled());
    assert!(!network[1].target.enabled());
    assert!(network[1].target.muted());
    let storage = h.monitor.ordered_statuses(TargetClass::Storage).await;
    assert!(storage[0].target.muted());

    let exported = h.monitor.export_settings(SettingsFile::default()).await;
    assert_eq!(exported.config, settings.config);
    assert_eq!(exported.target_overrides, settings.target_overrides);
    assert_eq!(exported.storage_muted, settings.storage_muted);
}

#[tokio::test]
async fn test_import_settings_rejects_invalid_config() {
    let h = HarnessBuilder::new()
        .targets(Mode::SessionHost, vec![net("gw", "Gateway", "gw.example.com")])
        .build();
    h.monitor.initialize().await;

    let mut settings = SettingsFile::default();
    settings.config.alert_cooldown_min = u64::MAX;
    settings
        .target_overrides
        .insert("gw".to_string(), TargetOverride { enabled: Some(false), muted: None });

    let result = h.monitor.import_settings(&settings).await;
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    let exported = h.monitor.export_settings(SettingsFile::default()).await;
    assert!(exported.target_overrides.is_empty());
    assert!(h.monitor.ordered_statuses(TargetClass::Network).await[0].target.enabled());
}

#[tokio::test]
async fn test_restore_history_drops_expired_samples() {
    let h = HarnessBuilder::new()
        .targets(Mode::SessionHost, vec![net("gw", "Gateway", "gw.example.com")])
        .build();
    h.monitor.initialize().await;

    let day_ms = 24 * 60 * 60 * 1000;
    let mut history = HashMap::new();
    history.insert(
        "gw".to_string(),
        vec![
            Sample {
                timestamp_ms: T0 - 1_000,
                latency_ms: 25.0,
            },
            Sample {
                timestamp_ms: T0 - day_ms - 1,
                latency_ms: 30.0,
            },
        ],
    );
    history.insert("gone".to_string(), vec![]);

    assert_eq!(h.monitor.restore_history(history).await, 1);
    let status = h.monitor.status_snapshot(TargetClass::Network).await["gw"].clone();
    assert_eq!(status.history.len(), 1);
    assert_eq!(status.history[0].latency_ms, 25.0);
}

#[tokio::test]
async fn test_engine_snapshot_reports_average_level() {
    let h = HarnessBuilder::new()
        .targets(
            Mode::SessionHost,
            vec![
                net("a", "A", "a.example.com"),
                net("b", "B", "b.example.com"),
            ],
        )
        .executor(|e| {
            e.reply("a.example.com", Reply::Latency(20.0))
                .reply("b.example.com", Reply::Latency(60.0))
        })
        .build();
    h.monitor.initialize().await;
    h.monitor.test_now().await;

    let snapshot = h.monitor.engine_snapshot().await;
    assert_eq!(snapshot.average_latency_ms, Some(40.0));
    assert_eq!(snapshot.level, Level::Good);
    assert_eq!(snapshot.network.len(), 2);
    assert!(!snapshot.offline);
    assert!(snapshot.network.iter().all(|s| !s.is_loading));
}
