//! Daemon loop tests against a temporary configuration directory.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use netdevd::{Config, Daemon, DeviceSnapshot, DryRunKernel, StaticLinks};
use netdevd_netdev::{DeviceStatus, VerifyContext};
use tokio::sync::{mpsc, watch};

fn write_config(dir: &Path) {
    fs::write(
        dir.join("10-dummy.netdev"),
        "[NetDev]\nName=dummy0\nKind=dummy\nMTUBytes=1400\n",
    )
    .unwrap();
    fs::write(
        dir.join("20-vx0.netdev"),
        "[NetDev]\nName=vx0\nKind=vxlan\n\n[VXLAN]\nId=42\nGroup=239.1.1.1\nTTL=300\n",
    )
    .unwrap();
    fs::write(
        dir.join("30-broken.netdev"),
        "[NetDev]\nName=vx1\nKind=vxlan\n",
    )
    .unwrap();
    fs::write(
        dir.join("eth0.network"),
        "[Match]\nName=eth0\n\n[Network]\nVXLAN=vx0 vx1\n",
    )
    .unwrap();
}

fn config(dir: &Path, once: bool) -> Config {
    let mut args = vec![
        "netdevd".to_string(),
        "--config-dir".to_string(),
        dir.display().to_string(),
        "--dry-run".to_string(),
        "--link-poll-ms".to_string(),
        "10".to_string(),
    ];
    if once {
        args.push("--once".to_string());
    }
    Config::try_parse_from(args).unwrap()
}

fn daemon(config: Config, links: Arc<StaticLinks>) -> Daemon {
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    Daemon::with_context(
        config,
        Arc::new(DryRunKernel::new(reply_tx)),
        links,
        reply_rx,
        VerifyContext::new("node-1", "x86-64"),
    )
    .unwrap()
}

fn find<'a>(snapshot: &'a [DeviceSnapshot], name: &str) -> &'a DeviceSnapshot {
    snapshot.iter().find(|d| d.name == name).unwrap()
}

#[tokio::test]
async fn test_once_creates_everything_resolvable() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path());
    let links = Arc::new(StaticLinks::new().with_link("eth0", 2, true));

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let (_reload_tx, reload_rx) = mpsc::unbounded_channel();

    let snapshot = daemon(config(dir.path(), true), links)
        .run(shutdown_rx, reload_rx)
        .await
        .unwrap();

    assert_eq!(snapshot.len(), 3);
    assert_eq!(find(&snapshot, "dummy0").status, DeviceStatus::Ready);

    let vx0 = find(&snapshot, "vx0");
    assert_eq!(vx0.status, DeviceStatus::Ready);
    assert_eq!(vx0.ifindex, Some(2));
    assert_eq!(vx0.underlying_link.as_deref(), Some("eth0"));

    let vx1 = find(&snapshot, "vx1");
    assert_eq!(vx1.status, DeviceStatus::Failed);
    assert!(vx1.reason.is_some());

    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json[0]["status"], "ready");
}

#[tokio::test]
async fn test_waiting_device_created_when_link_appears() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path());
    let links = Arc::new(StaticLinks::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (_reload_tx, reload_rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(
        daemon(config(dir.path(), false), links.clone()).run(shutdown_rx, reload_rx),
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    links.insert("eth0", 5, false);
    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown_tx.send(true).unwrap();

    let snapshot = handle.await.unwrap().unwrap();
    let vx0 = find(&snapshot, "vx0");
    assert_eq!(vx0.status, DeviceStatus::Ready);
    assert_eq!(vx0.ifindex, Some(5));
}

#[tokio::test]
async fn test_reload_picks_up_new_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("10-dummy.netdev"),
        "[NetDev]\nName=dummy0\nKind=dummy\n",
    )
    .unwrap();
    let links = Arc::new(StaticLinks::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (reload_tx, reload_rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(
        daemon(config(dir.path(), false), links).run(shutdown_rx, reload_rx),
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    fs::write(
        dir.path().join("20-dummy.netdev"),
        "[NetDev]\nName=dummy1\nKind=dummy\n",
    )
    .unwrap();
    reload_tx.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(true).unwrap();

    let snapshot = handle.await.unwrap().unwrap();
    let names: Vec<_> = snapshot.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["dummy0", "dummy1"]);
    assert!(snapshot.iter().all(|d| d.status == DeviceStatus::Ready));
}

#[tokio::test]
async fn test_empty_directory_settles_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let links = Arc::new(StaticLinks::new());

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let (_reload_tx, reload_rx) = mpsc::unbounded_channel();

    let snapshot = daemon(config(dir.path(), true), links)
        .run(shutdown_rx, reload_rx)
        .await
        .unwrap();
    assert!(snapshot.is_empty());
}
