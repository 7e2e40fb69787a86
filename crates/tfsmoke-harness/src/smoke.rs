use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tfsmoke_config::SmokeConfig;
use tfsmoke_domain::{
    merge_vars, EcsCluster, EnvOverrides, RunId, VarSet, REGION_ENV_VAR, VAR_TEST_NAME, VAR_VPC_AZS,
};
use tfsmoke_driver::{
    copy_module_to_temp, first_availability_zones, random_stable_region, CommandLog, DriverError,
    Inventory, ModuleWorkspace, Provisioner, TerraformOptions,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::SmokeError;
use crate::guard::CleanupGuard;
use crate::report::{DestroyOutcome, Failure, SmokeReport};

/// What the apply/verify body produced, whether or not it passed.
#[derive(Default)]
struct BodyOutcome {
    commands: Vec<CommandLog>,
    cluster: Option<EcsCluster>,
    outputs: BTreeMap<String, serde_json::Value>,
    failure: Option<Failure>,
}

/// Provision the module, check the ECS cluster name, then destroy.
///
/// Steps:
/// 1. Generate a run id and derive `test_name` / expected cluster name
/// 2. Pick a stable, enabled region and its first `zone_count` AZs
/// 3. Copy the module tree to a private temp dir
/// 4. `init` + `apply`; on success look the cluster up and compare names
/// 5. `destroy`, exactly once, whatever happened in step 4
///
/// Returns `Ok` only when verification passed and destroy succeeded. Setup
/// failures (steps 1 to 3) return before anything is created.
pub async fn run_smoke_test(
    config: &SmokeConfig,
    provisioner: Arc<dyn Provisioner>,
    inventory: Arc<dyn Inventory>,
) -> Result<SmokeReport, SmokeError> {
    let started_at = Utc::now();

    // 1. Names
    let run_id = RunId::generate();
    let test_name = config.naming.test_name(&run_id);
    let expected_cluster = config.naming.cluster_name(&test_name);
    info!(%run_id, %test_name, %expected_cluster, "starting smoke test");

    // 2. Region + zones
    let region =
        random_stable_region(inventory.as_ref(), &config.regions, &config.forbidden_regions).await?;
    let zones = first_availability_zones(inventory.as_ref(), &region, config.zone_count).await?;
    info!(%region, ?zones, "using availability zones");

    let mut base = VarSet::new();
    base.insert(VAR_TEST_NAME.into(), test_name.clone().into());
    base.insert(VAR_VPC_AZS.into(), zones.clone().into());
    let vars = merge_vars(base, &config.vars)?;

    let mut env = EnvOverrides::new();
    env.insert(REGION_ENV_VAR.into(), region.clone());

    // 3. Workspace
    let workspace = copy_module_to_temp(&config.module_root, &config.module_dir)?;
    let opts = TerraformOptions {
        dir: workspace.module_path().to_path_buf(),
        vars,
        env,
    };

    // 4. Apply + verify. From here on destroy must run.
    let mut guard = CleanupGuard::arm(&test_name, &region, workspace);
    let body = tokio::spawn(apply_and_verify(
        provisioner.clone(),
        inventory.clone(),
        opts.clone(),
        region.clone(),
        expected_cluster.clone(),
    ));
    guard.track_body(body.abort_handle());

    let mut outcome = match body.await {
        Ok(outcome) => outcome,
        Err(join_err) => {
            let message = if join_err.is_panic() {
                panic_message(join_err.into_panic())
            } else {
                join_err.to_string()
            };
            error!(%test_name, %message, "apply/verify task did not complete");
            BodyOutcome {
                failure: Some(Failure::Panicked { message }),
                ..BodyOutcome::default()
            }
        }
    };

    // 5. Destroy
    info!(%test_name, "destroying");
    let destroyed = provisioner.destroy(&opts).await;
    let workspace = guard.disarm();
    let destroy = match destroyed {
        Ok(log) => {
            outcome.commands.push(log);
            DestroyOutcome::Succeeded
        }
        Err(e) => {
            error!(%test_name, error = %e, "destroy failed");
            if let DriverError::CommandFailed { command, exit_code, log } = &e {
                outcome.commands.push(failed_log(command, *exit_code, log));
            }
            DestroyOutcome::Failed {
                message: e.to_string(),
                retained_workspace: workspace.map(ModuleWorkspace::persist),
            }
        }
    };

    let report = SmokeReport {
        id: Uuid::new_v4(),
        run_id,
        test_name,
        expected_cluster,
        region,
        availability_zones: zones,
        started_at,
        finished_at: Utc::now(),
        commands: outcome.commands,
        cluster: outcome.cluster,
        outputs: outcome.outputs,
        failure: outcome.failure,
        destroy,
    };

    if report.passed() {
        info!(test_name = %report.test_name, "smoke test passed");
        Ok(report)
    } else {
        warn!(test_name = %report.test_name, summary = %report.summary(), "smoke test failed");
        Err(SmokeError::Run(Box::new(report)))
    }
}

async fn apply_and_verify(
    provisioner: Arc<dyn Provisioner>,
    inventory: Arc<dyn Inventory>,
    opts: TerraformOptions,
    region: String,
    expected_cluster: String,
) -> BodyOutcome {
    let mut outcome = BodyOutcome::default();

    info!(engine = provisioner.name(), dir = %opts.dir.display(), "init + apply");
    match provisioner.init_and_apply(&opts).await {
        Ok(logs) => outcome.commands.extend(logs),
        Err(e) => {
            if let DriverError::CommandFailed { command, exit_code, log } = &e {
                outcome.commands.push(failed_log(command, *exit_code, log));
            }
            outcome.failure = Some(Failure::Apply { message: e.to_string() });
            return outcome;
        }
    }

    match inventory.describe_cluster(&region, &expected_cluster).await {
        Ok(cluster) => {
            if cluster.cluster_name != expected_cluster {
                outcome.failure = Some(Failure::Verification {
                    expected: expected_cluster.clone(),
                    actual: Some(cluster.cluster_name.clone()),
                    detail: format!("cluster ARN {}", cluster.cluster_arn),
                });
            }
            outcome.cluster = Some(cluster);
        }
        Err(e) => {
            outcome.failure = Some(Failure::Verification {
                expected: expected_cluster.clone(),
                actual: None,
                detail: e.to_string(),
            });
            return outcome;
        }
    }

    // Outputs are informational only.
    match provisioner.outputs(&opts).await {
        Ok(outputs) => outcome.outputs = outputs,
        Err(e) => warn!(error = %e, "could not read module outputs"),
    }

    outcome
}

/// Rebuild a log record for a command that failed; the error carries the
/// output but not the timing.
fn failed_log(command: &str, exit_code: i32, output: &str) -> CommandLog {
    let now = Utc::now();
    CommandLog {
        id: Uuid::new_v4(),
        command: command.to_string(),
        started_at: now,
        finished_at: now,
        exit_code,
        output: output.to_string(),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Clone, Copy, PartialEq)]
    enum ApplyBehaviour {
        Succeed,
        Fail,
        Panic,
        Hang,
    }

    struct FakeProvisioner {
        apply: ApplyBehaviour,
        destroy_fails: bool,
        applies: AtomicUsize,
        destroys: AtomicUsize,
        seen: Mutex<Vec<TerraformOptions>>,
    }

    impl FakeProvisioner {
        fn new(apply: ApplyBehaviour) -> Self {
            Self {
                apply,
                destroy_fails: false,
                applies: AtomicUsize::new(0),
                destroys: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn log(command: &str) -> CommandLog {
            failed_log(command, 0, "ok")
        }
    }

    #[async_trait]
    impl Provisioner for FakeProvisioner {
        fn name(&self) -> &str {
            "fake"
        }

        async fn init_and_apply(&self, opts: &TerraformOptions) -> Result<Vec<CommandLog>, DriverError> {
            self.applies.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(opts.clone());
            match self.apply {
                ApplyBehaviour::Succeed => Ok(vec![Self::log("terraform init"), Self::log("terraform apply")]),
                ApplyBehaviour::Fail => Err(DriverError::CommandFailed {
                    command: "terraform apply".into(),
                    exit_code: 1,
                    log: "Error: creating ECS Cluster".into(),
                }),
                ApplyBehaviour::Panic => panic!("provider plugin crashed"),
                ApplyBehaviour::Hang => {
                    tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                    Ok(vec![])
                }
            }
        }

        async fn destroy(&self, opts: &TerraformOptions) -> Result<CommandLog, DriverError> {
            self.destroys.fetch_add(1, Ordering::SeqCst);
            assert!(opts.dir.join("main.tf").is_file(), "workspace must exist during destroy");
            if self.destroy_fails {
                return Err(DriverError::CommandFailed {
                    command: "terraform destroy".into(),
                    exit_code: 1,
                    log: "Error: DependencyViolation".into(),
                });
            }
            Ok(Self::log("terraform destroy"))
        }

        async fn outputs(
            &self,
            _opts: &TerraformOptions,
        ) -> Result<BTreeMap<String, serde_json::Value>, DriverError> {
            Ok(BTreeMap::from([("cluster_arn".to_string(), serde_json::json!("arn:aws:ecs:x"))]))
        }
    }

    enum ClusterBehaviour {
        Echo,
        Rename(&'static str),
        Missing,
    }

    struct FakeInventory {
        cluster: ClusterBehaviour,
        zones: Vec<String>,
        describes: AtomicUsize,
        queried: Mutex<Vec<(String, String)>>,
    }

    impl FakeInventory {
        fn new(cluster: ClusterBehaviour) -> Self {
            Self {
                cluster,
                zones: ["a", "b", "c", "d"].iter().map(|z| format!("eu-west-1{}", z)).collect(),
                describes: AtomicUsize::new(0),
                queried: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Inventory for FakeInventory {
        async fn enabled_regions(&self) -> Result<Vec<String>, DriverError> {
            Ok(vec!["eu-west-1".into()])
        }

        async fn availability_zones(&self, _region: &str) -> Result<Vec<String>, DriverError> {
            Ok(self.zones.clone())
        }

        async fn describe_cluster(&self, region: &str, name: &str) -> Result<EcsCluster, DriverError> {
            self.describes.fetch_add(1, Ordering::SeqCst);
            self.queried.lock().unwrap().push((region.to_string(), name.to_string()));
            let cluster_name = match self.cluster {
                ClusterBehaviour::Echo => name.to_string(),
                ClusterBehaviour::Rename(other) => other.to_string(),
                ClusterBehaviour::Missing => {
                    return Err(DriverError::NotFound(format!("ECS cluster {}", name)))
                }
            };
            Ok(EcsCluster {
                cluster_arn: format!("arn:aws:ecs:{}:123456789012:cluster/{}", region, cluster_name),
                cluster_name,
                status: "ACTIVE".into(),
                registered_container_instances: 0,
                running_tasks: 0,
                pending_tasks: 0,
                active_services: 0,
            })
        }
    }

    fn config(root: &Path) -> SmokeConfig {
        let module = root.join("simple");
        std::fs::create_dir_all(&module).unwrap();
        std::fs::write(module.join("main.tf"), "# module").unwrap();
        SmokeConfig {
            module_root: root.to_path_buf(),
            ..SmokeConfig::default()
        }
    }

    #[tokio::test]
    async fn passing_run_queries_suffixed_name_and_destroys_once() {
        let dir = tempfile::tempdir().unwrap();
        let prov = Arc::new(FakeProvisioner::new(ApplyBehaviour::Succeed));
        let inv = Arc::new(FakeInventory::new(ClusterBehaviour::Echo));

        let report = run_smoke_test(&config(dir.path()), prov.clone(), inv.clone())
            .await
            .unwrap();

        assert!(report.passed());
        assert_eq!(report.region, "eu-west-1");
        assert_eq!(report.availability_zones, vec!["eu-west-1a", "eu-west-1b", "eu-west-1c"]);
        assert!(report.test_name.starts_with("terratest-aws-ecs-example-cluster-"));
        assert_eq!(report.expected_cluster, format!("{}-test", report.test_name));
        assert_eq!(
            report.cluster.as_ref().map(|c| c.cluster_name.as_str()),
            Some(report.expected_cluster.as_str())
        );
        assert_eq!(report.commands.len(), 3);
        assert_eq!(report.commands[2].command, "terraform destroy");
        assert!(report.outputs.contains_key("cluster_arn"));

        let queried = inv.queried.lock().unwrap().clone();
        assert_eq!(queried, vec![("eu-west-1".to_string(), report.expected_cluster.clone())]);
        assert_eq!(prov.destroys.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn vars_and_env_reach_the_engine() {
        let dir = tempfile::tempdir().unwrap();
        let prov = Arc::new(FakeProvisioner::new(ApplyBehaviour::Succeed));
        let inv = Arc::new(FakeInventory::new(ClusterBehaviour::Echo));

        let report = run_smoke_test(&config(dir.path()), prov.clone(), inv).await.unwrap();

        let seen = prov.seen.lock().unwrap();
        let opts = &seen[0];
        assert_eq!(
            opts.vars.get(VAR_TEST_NAME),
            Some(&report.test_name.clone().into())
        );
        assert_eq!(
            opts.vars.get(VAR_VPC_AZS),
            Some(&vec!["eu-west-1a", "eu-west-1b", "eu-west-1c"].into())
        );
        assert_eq!(opts.env.get(REGION_ENV_VAR).map(String::as_str), Some("eu-west-1"));
        assert!(!opts.dir.starts_with(dir.path()), "engine must run in the temp copy");
    }

    #[tokio::test]
    async fn name_mismatch_fails_but_still_destroys_once() {
        let dir = tempfile::tempdir().unwrap();
        let prov = Arc::new(FakeProvisioner::new(ApplyBehaviour::Succeed));
        let inv = Arc::new(FakeInventory::new(ClusterBehaviour::Rename("someone-else")));

        let err = run_smoke_test(&config(dir.path()), prov.clone(), inv).await.unwrap_err();
        let report = err.report().expect("run error carries a report");
        match &report.failure {
            Some(Failure::Verification { expected, actual, .. }) => {
                assert_eq!(expected, &report.expected_cluster);
                assert_eq!(actual.as_deref(), Some("someone-else"));
            }
            other => panic!("unexpected failure: {other:?}"),
        }
        assert!(report.destroy.succeeded());
        assert_eq!(prov.destroys.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_cluster_is_a_verification_failure() {
        let dir = tempfile::tempdir().unwrap();
        let prov = Arc::new(FakeProvisioner::new(ApplyBehaviour::Succeed));
        let inv = Arc::new(FakeInventory::new(ClusterBehaviour::Missing));

        let err = run_smoke_test(&config(dir.path()), prov.clone(), inv).await.unwrap_err();
        let report = err.report().unwrap();
        assert!(matches!(report.failure, Some(Failure::Verification { actual: None, .. })));
        assert_eq!(prov.destroys.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn apply_failure_skips_query_and_still_destroys() {
        let dir = tempfile::tempdir().unwrap();
        let prov = Arc::new(FakeProvisioner::new(ApplyBehaviour::Fail));
        let inv = Arc::new(FakeInventory::new(ClusterBehaviour::Echo));

        let err = run_smoke_test(&config(dir.path()), prov.clone(), inv.clone()).await.unwrap_err();
        let report = err.report().unwrap();
        assert!(matches!(report.failure, Some(Failure::Apply { .. })));
        assert_eq!(report.commands[0].exit_code, 1);
        assert!(report.commands[0].output.contains("creating ECS Cluster"));
        assert_eq!(inv.describes.load(Ordering::SeqCst), 0);
        assert_eq!(prov.destroys.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panic_in_apply_still_destroys() {
        let dir = tempfile::tempdir().unwrap();
        let prov = Arc::new(FakeProvisioner::new(ApplyBehaviour::Panic));
        let inv = Arc::new(FakeInventory::new(ClusterBehaviour::Echo));

        let err = run_smoke_test(&config(dir.path()), prov.clone(), inv.clone()).await.unwrap_err();
        let report = err.report().unwrap();
        match &report.failure {
            Some(Failure::Panicked { message }) => assert!(message.contains("provider plugin crashed")),
            other => panic!("unexpected failure: {other:?}"),
        }
        assert_eq!(inv.describes.load(Ordering::SeqCst), 0);
        assert_eq!(prov.destroys.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn destroy_failure_keeps_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let mut prov = FakeProvisioner::new(ApplyBehaviour::Succeed);
        prov.destroy_fails = true;
        let prov = Arc::new(prov);
        let inv = Arc::new(FakeInventory::new(ClusterBehaviour::Echo));

        let err = run_smoke_test(&config(dir.path()), prov.clone(), inv).await.unwrap_err();
        let report = err.report().unwrap();
        assert!(report.failure.is_none());
        match &report.destroy {
            DestroyOutcome::Failed { retained_workspace: Some(path), .. } => {
                assert!(path.join("main.tf").is_file());
                let root = path.parent().unwrap().to_path_buf();
                std::fs::remove_dir_all(root).unwrap();
            }
            other => panic!("unexpected destroy outcome: {other:?}"),
        }
        assert!(report.summary().starts_with("destroy failed"));
        assert_eq!(prov.destroys.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn too_few_zones_fails_before_apply() {
        let dir = tempfile::tempdir().unwrap();
        let prov = Arc::new(FakeProvisioner::new(ApplyBehaviour::Succeed));
        let mut inv = FakeInventory::new(ClusterBehaviour::Echo);
        inv.zones.truncate(2);

        let err = run_smoke_test(&config(dir.path()), prov.clone(), Arc::new(inv)).await.unwrap_err();
        assert!(matches!(
            err,
            SmokeError::Setup(DriverError::InsufficientZones { found: 2, required: 3, .. })
        ));
        assert_eq!(prov.applies.load(Ordering::SeqCst), 0);
        assert_eq!(prov.destroys.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_runs_use_distinct_names_and_workspaces() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Arc::new(config(dir.path()));
        let prov = Arc::new(FakeProvisioner::new(ApplyBehaviour::Succeed));
        let inv = Arc::new(FakeInventory::new(ClusterBehaviour::Echo));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cfg = cfg.clone();
                let prov: Arc<dyn Provisioner> = prov.clone();
                let inv: Arc<dyn Inventory> = inv.clone();
                tokio::spawn(async move { run_smoke_test(&cfg, prov, inv).await })
            })
            .collect();

        let mut names = std::collections::HashSet::new();
        for handle in handles {
            let report = handle.await.unwrap().unwrap();
            names.insert(report.test_name);
        }
        assert_eq!(names.len(), 8);

        let dirs: std::collections::HashSet<_> =
            prov.seen.lock().unwrap().iter().map(|o| o.dir.clone()).collect();
        assert_eq!(dirs.len(), 8);
        assert_eq!(prov.destroys.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn cancelled_run_keeps_workspace_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let prov = Arc::new(FakeProvisioner::new(ApplyBehaviour::Hang));
        let inv = Arc::new(FakeInventory::new(ClusterBehaviour::Echo));

        let cfg = config(dir.path());
        let run = run_smoke_test(&cfg, prov.clone(), inv.clone());
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(300), run).await;
        assert!(timed_out.is_err());

        let module = prov.seen.lock().unwrap()[0].dir.clone();
        assert!(module.join("main.tf").is_file(), "state dir must survive cancellation");
        assert_eq!(prov.destroys.load(Ordering::SeqCst), 0);
        assert_eq!(inv.describes.load(Ordering::SeqCst), 0);
        std::fs::remove_dir_all(module.parent().unwrap()).unwrap();
    }
}
