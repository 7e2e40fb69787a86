use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "tfsmoke",
    about = "Provision an ECS cluster with Terraform, check it exists, tear it down",
    version
)]
pub struct Cli {
    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, env = "TFSMOKE_JSON_LOGS", global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the full smoke test: apply, verify the cluster name, destroy.
    Run {
        /// Path to tfsmoke.yml. Defaults to ./tfsmoke.yml when present.
        #[arg(long, env = "TFSMOKE_CONFIG")]
        config: Option<PathBuf>,

        /// Candidate region (repeatable). Overrides `regions` from the config.
        #[arg(long = "region", env = "TFSMOKE_REGIONS", value_delimiter = ',')]
        regions: Vec<String>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List the stable candidate regions this account has enabled.
    Regions {
        /// Candidate region (repeatable). Empty means every stable region.
        #[arg(long = "region", env = "TFSMOKE_REGIONS", value_delimiter = ',')]
        regions: Vec<String>,

        #[arg(long)]
        json: bool,
    },

    /// List the available zones of a region, in API order.
    Zones {
        #[arg(long, env = "AWS_DEFAULT_REGION")]
        region: String,

        #[arg(long)]
        json: bool,
    },

    /// Look up one ECS cluster by name.
    DescribeCluster {
        #[arg(long, env = "AWS_DEFAULT_REGION")]
        region: String,

        /// Cluster name, e.g. terratest-aws-ecs-example-cluster-abc123-test.
        #[arg(long)]
        name: String,

        #[arg(long)]
        json: bool,
    },
}
