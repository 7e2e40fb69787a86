use anyhow::{Context, Result};
use serde::Serialize;
use tfsmoke_domain::EcsCluster;
use tfsmoke_harness::{DestroyOutcome, SmokeReport};

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to encode JSON output")
}

/// Render a smoke test report as text or JSON.
pub fn render_report(report: &SmokeReport, json: bool) -> Result<String> {
    if json {
        return to_json(report);
    }

    let verdict = if report.passed() { "PASSED" } else { "FAILED" };
    let mut out = format!("smoke test {}: {}\n", report.test_name, verdict);
    out.push_str(&format!("  region:   {}\n", report.region));
    out.push_str(&format!("  zones:    {}\n", report.availability_zones.join(", ")));
    out.push_str(&format!("  expected: {}\n", report.expected_cluster));
    match &report.cluster {
        Some(c) => out.push_str(&format!("  cluster:  {} ({})\n", c.cluster_name, c.status)),
        None => out.push_str("  cluster:  <not observed>\n"),
    }
    if !report.commands.is_empty() {
        out.push_str("  commands:\n");
        for cmd in &report.commands {
            let secs = (cmd.finished_at - cmd.started_at).num_milliseconds() as f64 / 1000.0;
            out.push_str(&format!(
                "    {} exit={} ({:.1}s)\n",
                cmd.command, cmd.exit_code, secs
            ));
        }
    }
    if let Some(failure) = &report.failure {
        out.push_str(&format!("  failure:  {}\n", failure));
    }
    match &report.destroy {
        DestroyOutcome::Succeeded => out.push_str("  destroy:  succeeded\n"),
        DestroyOutcome::Failed { message, retained_workspace } => {
            out.push_str(&format!("  destroy:  FAILED: {}\n", message));
            if let Some(path) = retained_workspace {
                out.push_str(&format!("  state kept in {}\n", path.display()));
            }
        }
    }
    Ok(out.trim_end().to_string())
}

/// Render a list of names, one per line, or as `{"<key>": [...]}`.
pub fn render_list(key: &str, items: &[String], json: bool) -> Result<String> {
    if json {
        return to_json(&serde_json::json!({ key: items }));
    }
    if items.is_empty() {
        return Ok(format!("No {}.", key.replace('_', " ")));
    }
    Ok(items.join("\n"))
}

pub fn render_cluster(cluster: &EcsCluster, json: bool) -> Result<String> {
    if json {
        return to_json(cluster);
    }
    Ok(format!(
        "{}\n  arn:      {}\n  status:   {}\n  instances: {}  running: {}  pending: {}  services: {}",
        cluster.cluster_name,
        cluster.cluster_arn,
        cluster.status,
        cluster.registered_container_instances,
        cluster.running_tasks,
        cluster.pending_tasks,
        cluster.active_services,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use tfsmoke_domain::RunId;
    use tfsmoke_driver::CommandLog;
    use tfsmoke_harness::Failure;

    fn cluster() -> EcsCluster {
        EcsCluster {
            cluster_name: "terratest-aws-ecs-example-cluster-abc123-test".into(),
            cluster_arn: "arn:aws:ecs:eu-west-1:123456789012:cluster/terratest-aws-ecs-example-cluster-abc123-test".into(),
            status: "ACTIVE".into(),
            registered_container_instances: 0,
            running_tasks: 0,
            pending_tasks: 0,
            active_services: 0,
        }
    }

    fn report() -> SmokeReport {
        let now = chrono::Utc::now();
        SmokeReport {
            id: uuid::Uuid::new_v4(),
            run_id: RunId::new("abc123").unwrap(),
            test_name: "terratest-aws-ecs-example-cluster-abc123".into(),
            expected_cluster: "terratest-aws-ecs-example-cluster-abc123-test".into(),
            region: "eu-west-1".into(),
            availability_zones: vec!["eu-west-1a".into(), "eu-west-1b".into(), "eu-west-1c".into()],
            started_at: now,
            finished_at: now,
            commands: vec![CommandLog {
                id: uuid::Uuid::new_v4(),
                command: "terraform destroy".into(),
                started_at: now,
                finished_at: now + chrono::Duration::milliseconds(1500),
                exit_code: 0,
                output: String::new(),
            }],
            cluster: Some(cluster()),
            outputs: BTreeMap::new(),
            failure: None,
            destroy: DestroyOutcome::Succeeded,
        }
    }

    #[test]
    fn passing_report_text() {
        let out = render_report(&report(), false).unwrap();
        assert!(out.starts_with("smoke test terratest-aws-ecs-example-cluster-abc123: PASSED"));
        assert!(out.contains("zones:    eu-west-1a, eu-west-1b, eu-west-1c"));
        assert!(out.contains("terraform destroy exit=0 (1.5s)"));
        assert!(out.contains("destroy:  succeeded"));
    }

    #[test]
    fn failing_report_shows_failure_and_kept_state() {
        let mut r = report();
        r.cluster = None;
        r.failure = Some(Failure::Apply { message: "exit 1".into() });
        r.destroy = DestroyOutcome::Failed {
            message: "timed out".into(),
            retained_workspace: Some(PathBuf::from("/tmp/tfsmoke-x/simple")),
        };
        let out = render_report(&r, false).unwrap();
        assert!(out.contains(": FAILED"));
        assert!(out.contains("cluster:  <not observed>"));
        assert!(out.contains("failure:  apply failed: exit 1"));
        assert!(out.contains("state kept in /tmp/tfsmoke-x/simple"));
    }

    #[test]
    fn report_json_tags_destroy_status() {
        let out = render_report(&report(), true).unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["destroy"]["status"], "succeeded");
        assert_eq!(v["run_id"], "abc123");
        assert_eq!(v["cluster"]["cluster_name"], "terratest-aws-ecs-example-cluster-abc123-test");
    }

    #[test]
    fn list_text_and_json() {
        let zones = vec!["us-east-1a".to_string(), "us-east-1b".to_string()];
        assert_eq!(render_list("availability_zones", &zones, false).unwrap(), "us-east-1a\nus-east-1b");
        assert_eq!(render_list("regions", &[], false).unwrap(), "No regions.");
        let v: serde_json::Value =
            serde_json::from_str(&render_list("regions", &zones, true).unwrap()).unwrap();
        assert_eq!(v["regions"][1], "us-east-1b");
    }

    #[test]
    fn cluster_text() {
        let out = render_cluster(&cluster(), false).unwrap();
        assert!(out.starts_with("terratest-aws-ecs-example-cluster-abc123-test\n"));
        assert!(out.contains("status:   ACTIVE"));
    }
}
