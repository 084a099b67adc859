//! Command-line configuration.
//!
//! Every option can also come from the environment, so the tool drops into
//! deployment pipelines that configure steps through env vars.

use crate::error::CliError;
use clap::{Parser, Subcommand};
use kube_wait::Selector;
use kube_wait::validation::is_dns1123_subdomain;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "kwait")]
#[command(author, version, about = "Wait until Kubernetes resources reach a condition")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Namespace to watch
    #[arg(short, long, env = "KWAIT_NAMESPACE", default_value = "default", global = true)]
    pub namespace: String,

    /// Watch all namespaces (overrides --namespace)
    #[arg(short = 'A', long, global = true)]
    pub all_namespaces: bool,

    /// Label selector, passed through unmodified (e.g. "app=web")
    #[arg(short = 'l', long = "selector", global = true)]
    pub label_selector: Option<String>,

    /// Field selector, passed through unmodified (e.g. "spec.nodeName=node-1")
    #[arg(long, global = true)]
    pub field_selector: Option<String>,

    /// Restrict the wait to a single object by name
    #[arg(long, global = true)]
    pub name: Option<String>,

    /// How long to wait before giving up (e.g. "90s", "5m")
    #[arg(long, env = "KWAIT_TIMEOUT", default_value = "60s", value_parser = humantime::parse_duration, global = true)]
    pub timeout: Duration,

    /// Kubeconfig content to use instead of the default kubeconfig
    #[arg(long, env = "KUBECONFIG_CONTENT", hide_env_values = true, global = true)]
    pub kubeconfig_content: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Wait for pods
    Pod {
        /// Pod phase to wait for (default: Running)
        #[arg(long, conflicts_with = "ready")]
        phase: Option<String>,

        /// Wait for the Ready condition instead of a phase
        #[arg(long)]
        ready: bool,
    },

    /// Wait for any resource kind
    Resource {
        /// API group (empty for the core group)
        #[arg(long, default_value = "")]
        group: String,

        /// API version within the group
        #[arg(long, default_value = "v1")]
        api_version: String,

        /// Kind, exactly as the API serves it (e.g. "Deployment")
        #[arg(long)]
        kind: String,

        /// Field equality check on the object, as path=value (repeatable, all must hold)
        #[arg(long = "field", value_name = "PATH=VALUE")]
        fields: Vec<String>,
    },
}

impl Args {
    /// Namespace scope; `None` means all namespaces
    pub fn namespace(&self) -> Option<&str> {
        if self.all_namespaces {
            None
        } else {
            Some(&self.namespace)
        }
    }

    /// Selector built from --selector, --field-selector and --name
    pub fn selector(&self) -> Result<Selector, CliError> {
        let mut selector = Selector::new();
        if let Some(labels) = &self.label_selector {
            selector = selector.labels(labels);
        }

        let mut fields: Vec<String> = self.field_selector.iter().cloned().collect();
        if let Some(name) = &self.name {
            if !is_dns1123_subdomain(name) {
                return Err(CliError::InvalidArgument(format!(
                    "invalid resource name {:?}: must be a DNS-1123 subdomain",
                    name
                )));
            }
            fields.push(format!("metadata.name={name}"));
        }
        if !fields.is_empty() {
            selector = selector.fields(fields.join(","));
        }

        Ok(selector)
    }
}
