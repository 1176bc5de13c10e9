use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kameo::actor::Spawn;
use tokio::sync::broadcast;

use rollpatch_core::*;
use rollpatch_exec::error::ExecError;
use rollpatch_exec::result::CommandResult;
use rollpatch_exec::traits::RemoteExecutor;
use rollpatch_k8s::error::K8sError;
use rollpatch_k8s::traits::NodeController;
use rollpatch_os::error::OsError;
use rollpatch_os::traits::OsAdapter;
use rollpatch_os::types::{OsFamily, UpdateOutcome, UpgradablePackage};

/// Shared ordered log of component calls across mocks
type CallLog = Arc<Mutex<Vec<String>>>;

fn log_entry(log: &CallLog, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

fn log_index(log: &CallLog, needle: &str) -> Option<usize> {
    log.lock().unwrap().iter().position(|e| e.contains(needle))
}

fn log_count(log: &CallLog, needle: &str) -> usize {
    log.lock()
        .unwrap()
        .iter()
        .filter(|e| e.contains(needle))
        .count()
}

// Mock implementations

struct RecordingExecutor {
    log: CallLog,
    disk_usage: u8,
    unreachable: bool,
    failed_units: String,
}

fn ok_result(stdout: &str) -> CommandResult {
    CommandResult {
        status: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
        duration: Duration::from_millis(1),
    }
}

#[async_trait]
impl RemoteExecutor for RecordingExecutor {
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        log_entry(&self.log, format!("exec:{cmd}"));

        if self.unreachable {
            return Err(ExecError::ConnectionFailed("no route to host".to_string()));
        }

        let stdout = if cmd.contains("whoami") {
            "root".to_string()
        } else if cmd.contains("os-release") {
            "ID=debian\n".to_string()
        } else if cmd.starts_with("df") {
            format!(
                "Filesystem 1024-blocks Used Available Capacity Mounted on\n\
                 /dev/sda1 100 50 50 {}% /\n",
                self.disk_usage
            )
        } else if cmd.contains("systemctl") {
            self.failed_units.clone()
        } else {
            "ok".to_string()
        };

        Ok(ok_result(&stdout))
    }

    async fn run_with_timeout(
        &self,
        cmd: &str,
        _timeout: Duration,
    ) -> Result<CommandResult, ExecError> {
        self.run(cmd).await
    }

    fn executor_type(&self) -> &'static str {
        "mock"
    }
}

struct MockOsAdapter {
    log: CallLog,
    reboot_required: bool,
    busy: bool,
    fail_update: bool,
}

#[async_trait]
impl OsAdapter for MockOsAdapter {
    fn family(&self) -> OsFamily {
        OsFamily::Debian
    }

    async fn package_manager_busy(&self) -> Result<bool, OsError> {
        log_entry(&self.log, "busy_check");
        Ok(self.busy)
    }

    async fn list_upgradable(&self) -> Result<Vec<UpgradablePackage>, OsError> {
        log_entry(&self.log, "list_upgradable");
        Ok(vec![
            UpgradablePackage::new("vim", "2:9.0"),
            UpgradablePackage::new("curl", "8.5.0"),
        ])
    }

    async fn update_packages(&self) -> Result<UpdateOutcome, OsError> {
        log_entry(&self.log, "update_packages");
        if self.fail_update {
            return Err(OsError::UpdateFailed {
                status: 100,
                detail: "unmet dependencies".to_string(),
            });
        }
        Ok(UpdateOutcome {
            upgraded: 2,
            newly_installed: 0,
            removed: 0,
        })
    }

    async fn reboot_required(&self) -> Result<bool, OsError> {
        log_entry(&self.log, "reboot_check");
        Ok(self.reboot_required)
    }
}

struct MockNodeController {
    log: CallLog,
    member: bool,
    fail_drain: bool,
}

#[async_trait]
impl NodeController for MockNodeController {
    async fn resolve_node(&self, host: &str) -> Result<Option<String>, K8sError> {
        log_entry(&self.log, format!("resolve_node:{host}"));
        Ok(self.member.then(|| format!("{host}.cluster.local")))
    }

    async fn drain(&self, node: &str, timeout: Duration) -> Result<(), K8sError> {
        log_entry(&self.log, format!("drain:{node}"));
        if self.fail_drain {
            return Err(K8sError::DrainTimeout {
                node: node.to_string(),
                timeout,
                remaining: 3,
            });
        }
        Ok(())
    }

    async fn uncordon(&self, node: &str) -> Result<(), K8sError> {
        log_entry(&self.log, format!("uncordon:{node}"));
        Ok(())
    }

    async fn wait_ready(
        &self,
        node: &str,
        _timeout: Duration,
        _poll: Duration,
    ) -> Result<(), K8sError> {
        log_entry(&self.log, format!("wait_ready:{node}"));
        Ok(())
    }
}

struct ScriptedConfirmation {
    answer: bool,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedConfirmation {
    fn new(answer: bool) -> Arc<Self> {
        Arc::new(Self {
            answer,
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ConfirmationProvider for ScriptedConfirmation {
    async fn confirm(&self, prompt: &str) -> bool {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answer
    }
}

struct TestFactory {
    log: CallLog,
    adapter: Arc<MockOsAdapter>,
    controller: Arc<MockNodeController>,
    disk_usage_by_host: HashMap<String, u8>,
    unreachable_hosts: HashSet<String>,
    failed_units: String,
}

impl TestFactory {
    fn new(log: CallLog, adapter: Arc<MockOsAdapter>, controller: Arc<MockNodeController>) -> Self {
        Self {
            log,
            adapter,
            controller,
            disk_usage_by_host: HashMap::new(),
            unreachable_hosts: HashSet::new(),
            failed_units: String::new(),
        }
    }
}

#[async_trait]
impl HostComponentFactory for TestFactory {
    async fn create_executor(
        &self,
        spec: &HostSpec,
    ) -> Result<Arc<dyn RemoteExecutor>, CoreError> {
        Ok(Arc::new(RecordingExecutor {
            log: self.log.clone(),
            disk_usage: *self.disk_usage_by_host.get(&spec.name).unwrap_or(&42),
            unreachable: self.unreachable_hosts.contains(&spec.name),
            failed_units: self.failed_units.clone(),
        }))
    }

    fn create_os_adapter(
        &self,
        _family: OsFamily,
        _executor: Arc<dyn RemoteExecutor>,
        _use_sudo: bool,
        _update_timeout: Duration,
    ) -> Arc<dyn OsAdapter> {
        self.adapter.clone()
    }

    fn node_controller(&self) -> Arc<dyn NodeController> {
        self.controller.clone()
    }
}

// Harness

fn fast_timeouts() -> Timeouts {
    Timeouts {
        connect: Duration::from_secs(1),
        update: Duration::from_secs(5),
        drain: Duration::from_secs(1),
        reboot_grace: Duration::from_millis(10),
        reboot_total: Duration::from_secs(1),
        reboot_poll: Duration::from_millis(10),
        ready_total: Duration::from_secs(1),
        ready_poll: Duration::from_millis(10),
    }
}

fn test_config(mutate: impl FnOnce(&mut RunConfig)) -> Arc<RunConfig> {
    let mut config = RunConfig::for_target(TargetSelection::All);
    config.timeouts = fast_timeouts();
    mutate(&mut config);
    Arc::new(config)
}

async fn run_fleet(
    hosts: &[&str],
    config: Arc<RunConfig>,
    factory: TestFactory,
    confirmation: Arc<ScriptedConfirmation>,
) -> RunSummary {
    let (event_tx, _event_rx) = broadcast::channel(256);

    let orchestrator = OrchestratorActor::spawn(OrchestratorActorArgs {
        config,
        factory: Arc::new(factory),
        confirmation,
        event_tx,
    });

    let summary = orchestrator
        .ask(RunFleet {
            hosts: hosts.iter().map(|h| HostSpec::named(*h)).collect(),
        })
        .await
        .unwrap();

    orchestrator.stop_gracefully().await.unwrap();
    summary
}

fn harness(
    member: bool,
    reboot_required: bool,
) -> (CallLog, Arc<MockOsAdapter>, Arc<MockNodeController>) {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let adapter = Arc::new(MockOsAdapter {
        log: log.clone(),
        reboot_required,
        busy: false,
        fail_update: false,
    });
    let controller = Arc::new(MockNodeController {
        log: log.clone(),
        member,
        fail_drain: false,
    });
    (log, adapter, controller)
}

// Tests

#[tokio::test]
async fn standalone_host_without_reboot_skips_cluster_stages() {
    let (log, adapter, controller) = harness(false, false);
    let factory = TestFactory::new(log.clone(), adapter, controller);

    let summary = run_fleet(
        &["web01"],
        test_config(|_| {}),
        factory,
        ScriptedConfirmation::new(true),
    )
    .await;

    assert_eq!(summary.total, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);
    assert!(summary.all_succeeded());

    let record = &summary.records[0];
    assert_eq!(record.stage, Stage::Done);
    assert_eq!(record.outcome, Outcome::Succeeded);
    assert_eq!(record.upgraded, 2);
    assert!(!record.rebooted);

    // no cluster calls, no reboot issued
    assert_eq!(log_count(&log, "drain"), 0);
    assert_eq!(log_count(&log, "uncordon"), 0);
    assert_eq!(log_count(&log, "wait_ready"), 0);
    assert_eq!(log_count(&log, "shutdown"), 0);
    assert_eq!(log_count(&log, "update_packages"), 1);
}

#[tokio::test]
async fn cluster_host_full_path_runs_in_order() {
    let (log, adapter, controller) = harness(true, true);
    let factory = TestFactory::new(log.clone(), adapter, controller);

    let summary = run_fleet(
        &["node01"],
        test_config(|_| {}),
        factory,
        ScriptedConfirmation::new(true),
    )
    .await;

    assert!(summary.all_succeeded());
    let record = &summary.records[0];
    assert_eq!(record.stage, Stage::Done);
    assert!(record.rebooted);

    let drain = log_index(&log, "drain:").unwrap();
    let update = log_index(&log, "update_packages").unwrap();
    let reboot = log_index(&log, "shutdown").unwrap();
    let uncordon = log_index(&log, "uncordon:").unwrap();
    let ready = log_index(&log, "wait_ready:").unwrap();

    assert!(drain < update, "drain before update");
    assert!(update < reboot, "update before reboot");
    assert!(reboot < uncordon, "reboot before uncordon");
    assert!(uncordon < ready, "uncordon before ready wait");
}

#[tokio::test]
async fn preflight_disk_failure_then_decline_stops_run() {
    let (log, adapter, controller) = harness(false, false);
    let mut factory = TestFactory::new(log.clone(), adapter, controller);
    factory.disk_usage_by_host.insert("web02".to_string(), 95);

    let confirmation = ScriptedConfirmation::new(false);
    let summary = run_fleet(
        &["web01", "web02", "web03"],
        test_config(|_| {}),
        factory,
        confirmation.clone(),
    )
    .await;

    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.unprocessed, vec!["web03"]);
    assert!(summary.aborted);
    assert!(!summary.all_succeeded());

    let failed = &summary.records[1];
    assert_eq!(failed.host, "web02");
    assert!(matches!(
        failed.error,
        Some(HostError::InsufficientDisk { usage: 95, .. })
    ));

    // asked once, after the failing host
    assert_eq!(confirmation.prompt_count(), 1);
}

#[tokio::test]
async fn operator_continue_processes_remaining_hosts() {
    let (log, adapter, controller) = harness(false, false);
    let mut factory = TestFactory::new(log.clone(), adapter, controller);
    factory.disk_usage_by_host.insert("web02".to_string(), 97);

    let confirmation = ScriptedConfirmation::new(true);
    let summary = run_fleet(
        &["web01", "web02", "web03"],
        test_config(|_| {}),
        factory,
        confirmation.clone(),
    )
    .await;

    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert!(summary.unprocessed.is_empty());
    assert!(!summary.aborted);
    assert_eq!(confirmation.prompt_count(), 1);
}

#[tokio::test]
async fn update_failure_after_drain_uncordons_exactly_once() {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let adapter = Arc::new(MockOsAdapter {
        log: log.clone(),
        reboot_required: false,
        busy: false,
        fail_update: true,
    });
    let controller = Arc::new(MockNodeController {
        log: log.clone(),
        member: true,
        fail_drain: false,
    });
    let factory = TestFactory::new(log.clone(), adapter, controller);

    let summary = run_fleet(
        &["node01"],
        test_config(|_| {}),
        factory,
        ScriptedConfirmation::new(true),
    )
    .await;

    assert_eq!(summary.failed, 1);
    let record = &summary.records[0];
    assert_eq!(record.stage, Stage::Failed);
    assert!(matches!(record.error, Some(HostError::PackageUpdate(_))));

    // compensation: uncordon happened exactly once, after the update
    assert_eq!(log_count(&log, "uncordon:"), 1);
    let update = log_index(&log, "update_packages").unwrap();
    let uncordon = log_index(&log, "uncordon:").unwrap();
    assert!(update < uncordon);

    // no reboot was attempted on the failure path
    assert_eq!(log_count(&log, "shutdown"), 0);
}

#[tokio::test]
async fn drain_failure_fails_host_without_uncordon() {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let adapter = Arc::new(MockOsAdapter {
        log: log.clone(),
        reboot_required: false,
        busy: false,
        fail_update: false,
    });
    let controller = Arc::new(MockNodeController {
        log: log.clone(),
        member: true,
        fail_drain: true,
    });
    let factory = TestFactory::new(log.clone(), adapter, controller);

    let summary = run_fleet(
        &["node01"],
        test_config(|_| {}),
        factory,
        ScriptedConfirmation::new(true),
    )
    .await;

    let record = &summary.records[0];
    assert!(matches!(record.error, Some(HostError::Drain(_))));

    // the drain never completed, so there is nothing to compensate
    assert_eq!(log_count(&log, "uncordon:"), 0);
    assert_eq!(log_count(&log, "update_packages"), 0);
}

#[tokio::test]
async fn dry_run_issues_no_mutating_commands() {
    let (log, adapter, controller) = harness(true, true);
    let factory = TestFactory::new(log.clone(), adapter, controller);

    let summary = run_fleet(
        &["node01"],
        test_config(|c| c.dry_run = true),
        factory,
        ScriptedConfirmation::new(true),
    )
    .await;

    assert!(summary.all_succeeded());
    let record = &summary.records[0];
    assert_eq!(record.stage, Stage::Done);
    assert!(!record.rebooted);

    // full stage path, zero mutations
    assert_eq!(log_count(&log, "drain:"), 0);
    assert_eq!(log_count(&log, "uncordon:"), 0);
    assert_eq!(log_count(&log, "update_packages"), 0);
    assert_eq!(log_count(&log, "shutdown"), 0);

    // the preview ran instead of the upgrade
    assert_eq!(log_count(&log, "list_upgradable"), 1);
}

#[tokio::test]
async fn skip_drain_never_touches_scheduling() {
    let (log, adapter, controller) = harness(true, false);
    let factory = TestFactory::new(log.clone(), adapter, controller);

    let summary = run_fleet(
        &["node01"],
        test_config(|c| c.skip_drain = true),
        factory,
        ScriptedConfirmation::new(true),
    )
    .await;

    assert!(summary.all_succeeded());
    assert_eq!(log_count(&log, "drain:"), 0);
    assert_eq!(log_count(&log, "uncordon:"), 0);

    // the host is still a member, so readiness is still validated
    assert_eq!(log_count(&log, "wait_ready:"), 1);
}

#[tokio::test]
async fn skip_reboot_is_a_noop_success() {
    let (log, adapter, controller) = harness(false, true);
    let factory = TestFactory::new(log.clone(), adapter, controller);

    let summary = run_fleet(
        &["web01"],
        test_config(|c| c.skip_reboot = true),
        factory,
        ScriptedConfirmation::new(true),
    )
    .await;

    assert!(summary.all_succeeded());
    assert!(!summary.records[0].rebooted);
    assert_eq!(log_count(&log, "shutdown"), 0);
}

#[tokio::test]
async fn unreachable_host_fails_without_mutation() {
    let (log, adapter, controller) = harness(true, false);
    let mut factory = TestFactory::new(log.clone(), adapter, controller);
    factory.unreachable_hosts.insert("web01".to_string());

    let summary = run_fleet(
        &["web01"],
        test_config(|_| {}),
        factory,
        ScriptedConfirmation::new(true),
    )
    .await;

    assert_eq!(summary.failed, 1);
    assert!(matches!(
        summary.records[0].error,
        Some(HostError::Unreachable(_))
    ));
    assert_eq!(log_count(&log, "update_packages"), 0);
    assert_eq!(log_count(&log, "drain:"), 0);
}

#[tokio::test]
async fn busy_package_manager_fails_preflight() {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let adapter = Arc::new(MockOsAdapter {
        log: log.clone(),
        reboot_required: false,
        busy: true,
        fail_update: false,
    });
    let controller = Arc::new(MockNodeController {
        log: log.clone(),
        member: false,
        fail_drain: false,
    });
    let factory = TestFactory::new(log.clone(), adapter, controller);

    let summary = run_fleet(
        &["web01"],
        test_config(|_| {}),
        factory,
        ScriptedConfirmation::new(true),
    )
    .await;

    assert!(matches!(
        summary.records[0].error,
        Some(HostError::PackageManagerBusy(_))
    ));
    assert_eq!(log_count(&log, "update_packages"), 0);
}

#[tokio::test]
async fn failed_services_become_warnings_not_failures() {
    let (log, adapter, controller) = harness(false, false);
    let mut factory = TestFactory::new(log.clone(), adapter, controller);
    factory.failed_units =
        "cron.service loaded failed failed Regular background program\n".to_string();

    let summary = run_fleet(
        &["web01"],
        test_config(|_| {}),
        factory,
        ScriptedConfirmation::new(true),
    )
    .await;

    assert!(summary.all_succeeded());
    let record = &summary.records[0];
    assert_eq!(record.outcome, Outcome::Succeeded);
    assert_eq!(record.warnings.len(), 1);
    assert!(record.warnings[0].contains("cron.service"));
}

#[tokio::test]
async fn stage_events_cover_the_full_path() {
    let (log, adapter, controller) = harness(false, false);
    let factory = TestFactory::new(log.clone(), adapter, controller);

    let (event_tx, mut event_rx) = broadcast::channel(256);
    let orchestrator = OrchestratorActor::spawn(OrchestratorActorArgs {
        config: test_config(|_| {}),
        factory: Arc::new(factory),
        confirmation: ScriptedConfirmation::new(true),
        event_tx,
    });

    let summary = orchestrator
        .ask(RunFleet {
            hosts: vec![HostSpec::named("web01")],
        })
        .await
        .unwrap();
    orchestrator.stop_gracefully().await.unwrap();

    assert!(summary.all_succeeded());

    let mut stages = Vec::new();
    while let Ok(event) = event_rx.try_recv() {
        if let RunEvent::StageChanged { to, .. } = event {
            stages.push(to);
        }
    }

    assert_eq!(
        stages,
        vec![
            "precheck",
            "draining",
            "patching",
            "reboot_wait",
            "uncordoning",
            "validating",
            "done"
        ]
    );
}
