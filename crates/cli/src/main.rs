use std::io::Read;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use krb_api::{Batch, InProcApi, ItemFilter, KrbApi, PolicyFilter, RestoreReport};
use krb_core::{KrbError, Record, RecycleItem, RecyclePolicy, Tuning};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "krbctl", version, about = "Inspect and restore recycled Kubernetes objects")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Per-request timeout against the API server, in seconds
    #[arg(long = "kube-timeout", env = "KRB_REQUEST_TIMEOUT_SECS", global = true)]
    kube_timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
    Yaml,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show recycle items or recycle policies
    Get {
        #[command(subcommand)]
        what: Get,
    },
    /// Re-create the objects held by recycle items, then drop the items
    Restore {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Print the recycled object bodies held by recycle items
    Inspect {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Create a recycle policy for a resource (e.g. "deploy", "certificates.cert-manager.io")
    Recycle {
        resource: String,
        /// Namespaces to cover; none means every namespace
        #[arg(short = 'n', long = "namespace")]
        namespaces: Vec<String>,
    },
    /// Delete recycle items or policies by name
    Delete {
        #[command(subcommand)]
        what: Delete,
    },
    /// List every resource name the cluster serves
    Resources,
    /// Answer an AdmissionReview read from a file, or stdin when omitted
    Review { file: Option<std::path::PathBuf> },
}

#[derive(Subcommand, Debug)]
enum Get {
    #[command(visible_alias = "ri")]
    Recycleitems {
        names: Vec<String>,
        /// Only items whose object belongs to this resource
        #[arg(long = "object-resource")]
        object_resource: Option<String>,
        /// Only items whose object lived in this namespace
        #[arg(long = "object-namespace")]
        object_namespace: Option<String>,
    },
    #[command(visible_alias = "rp")]
    Recyclepolicies {
        names: Vec<String>,
        #[arg(short = 'g', long = "group")]
        group: Option<String>,
        #[arg(long = "resource")]
        resource: Option<String>,
        /// Only policies that cover this namespace
        #[arg(short = 'n', long = "namespace", conflicts_with = "all_namespaces")]
        namespace: Option<String>,
        /// Policies for every namespace (the default when no namespace is given)
        #[arg(short = 'A', long = "all-namespaces")]
        all_namespaces: bool,
    },
}

#[derive(Subcommand, Debug)]
enum Delete {
    #[command(visible_alias = "ri")]
    Recycleitems {
        #[arg(required = true)]
        names: Vec<String>,
    },
    #[command(visible_alias = "rp")]
    Recyclepolicies {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

fn init_tracing() {
    let env = std::env::var("KRB_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("KRB_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid KRB_METRICS_ADDR; expected host:port");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    let mut tuning = Tuning::from_env();
    if let Some(secs) = cli.kube_timeout {
        tuning = tuning.with_request_timeout(Duration::from_secs(secs));
    }
    let api = InProcApi::connect(tuning).await.context("connecting to the cluster")?;

    match cli.command {
        Commands::Get { what: Get::Recycleitems { names, object_resource, object_namespace } } => {
            let items = if names.is_empty() {
                api.list_items(&ItemFilter { object_resource, object_namespace }).await?
            } else {
                report_failures(api.get_items(&names).await)
            };
            match cli.output {
                Output::Human => print_items(&items),
                other => emit(other, &items)?,
            }
        }
        Commands::Get { what: Get::Recyclepolicies { names, group, resource, namespace, all_namespaces } } => {
            let filter = PolicyFilter { group, resource, namespace: namespace.filter(|_| !all_namespaces) };
            let policies = if names.is_empty() {
                api.list_policies(&filter).await?
            } else {
                report_failures(api.get_policies(&names, &filter).await)
            };
            match cli.output {
                Output::Human => print_policies(&policies),
                other => emit(other, &policies)?,
            }
        }
        Commands::Restore { names } => {
            let reports = api.restore(&names).await;
            let failed = reports.iter().filter(|r| !r.object_restored()).count();
            for r in &reports {
                match r {
                    RestoreReport::Restored { item, object } => println!("{item}: restored {object}"),
                    RestoreReport::Lingering { item, object, cleanup } => {
                        println!("{item}: restored {object} (recycle item left behind: {cleanup})")
                    }
                    RestoreReport::Failed { item, stage, error, .. } => eprintln!("{item}: {stage} failed: {error}"),
                }
            }
            info!(total = reports.len(), failed, "restore finished");
        }
        Commands::Inspect { names } => {
            for item in report_failures(api.get_items(&names).await) {
                let rendered = match cli.output {
                    Output::Json => Ok(item.object.json()),
                    Output::Yaml => item.object.yaml(),
                    Output::Human => item.object.indented_json(),
                };
                match rendered {
                    Ok(text) => println!("{text}"),
                    Err(e) => warn!(item = %item.name(), error = %e, "cannot render recycled object"),
                }
            }
        }
        Commands::Recycle { resource, namespaces } => {
            let policy = api.create_policy(&resource, &namespaces).await?;
            match cli.output {
                Output::Human => println!("recyclepolicy/{} created for {}", policy.name(), policy.group_resource()),
                other => emit(other, &policy)?,
            }
        }
        Commands::Delete { what } => {
            let (kind, batch) = match what {
                Delete::Recycleitems { names } => ("recycleitem", api.delete_items(&names).await),
                Delete::Recyclepolicies { names } => ("recyclepolicy", api.delete_policies(&names).await),
            };
            for name in report_failures(batch) {
                println!("{kind}/{name} deleted");
            }
        }
        Commands::Resources => {
            for name in api.resources().await {
                println!("{name}");
            }
        }
        Commands::Review { file } => {
            let body = match file {
                Some(path) => std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?,
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf).context("reading stdin")?;
                    buf
                }
            };
            println!("{}", String::from_utf8_lossy(&api.review(&body).await));
        }
    }

    Ok(())
}

fn report_failures<T>(batch: Batch<T>) -> Vec<T> {
    for (name, e) in &batch.failed {
        eprintln!("{name}: {}", describe(e));
    }
    batch.done
}

fn describe(e: &KrbError) -> String {
    match e {
        KrbError::NotFound(_) => format!("{e} (skipped)"),
        _ => e.to_string(),
    }
}

fn emit<T: Serialize + ?Sized>(output: Output, value: &T) -> Result<()> {
    match output {
        Output::Json | Output::Human => println!("{}", serde_json::to_string_pretty(value)?),
        Output::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

fn print_items(items: &[RecycleItem]) {
    println!("{:<40} {:<28} {:<16} {:<32} AGE", "NAME", "RESOURCE", "NAMESPACE", "OBJECT");
    for item in items {
        let o = &item.object;
        let ns = if o.namespace.is_empty() { "-" } else { o.namespace.as_str() };
        let age = render_age(item.recycled_at().unwrap_or_else(|| item.created_at()));
        println!("{:<40} {:<28} {:<16} {:<32} {}", item.name(), o.group_resource(), ns, o.name, age);
    }
}

fn print_policies(policies: &[RecyclePolicy]) {
    println!("{:<36} {:<32} {:<24} AGE", "NAME", "RESOURCE", "NAMESPACES");
    for p in policies {
        let ns = if p.all_namespaces() { "*".to_string() } else { p.target.namespaces.join(",") };
        println!("{:<36} {:<32} {:<24} {}", p.name(), p.group_resource(), ns, render_age(p.created_at()));
    }
}

fn render_age(ts: i64) -> String {
    if ts <= 0 {
        return "-".to_string();
    }
    let mut secs = (chrono::Utc::now().timestamp() - ts).max(0) as u64;
    let days = secs / 86_400;
    secs %= 86_400;
    let hours = secs / 3600;
    secs %= 3600;
    let mins = secs / 60;
    secs %= 60;
    if days > 0 {
        format!("{}d{}h", days, hours)
    } else if hours > 0 {
        format!("{}h{}m", hours, mins)
    } else if mins > 0 {
        format!("{}m", mins)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_buckets() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(render_age(0), "-");
        assert_eq!(render_age(now - 90_000), "1d1h");
        assert_eq!(render_age(now - 3_700), "1h1m");
    }

    #[test]
    fn policy_flags_conflict() {
        let r = Cli::try_parse_from(["krbctl", "get", "rp", "-n", "a", "-A"]);
        assert!(r.is_err());
        let ok = Cli::try_parse_from(["krbctl", "get", "rp", "-A", "--resource", "deployments"]);
        assert!(ok.is_ok());
    }

    fn policy_filter(args: &[&str]) -> PolicyFilter {
        match Cli::try_parse_from(args.iter().copied()).unwrap().command {
            Commands::Get { what: Get::Recyclepolicies { group, resource, namespace, .. } } => PolicyFilter { group, resource, namespace },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bare_policy_listing_is_unfiltered() {
        assert_eq!(policy_filter(&["krbctl", "get", "rp"]), PolicyFilter::default());
        assert_eq!(policy_filter(&["krbctl", "get", "recyclepolicies", "-A"]).namespace, None);
        assert_eq!(policy_filter(&["krbctl", "get", "rp", "-n", "dev"]).namespace.as_deref(), Some("dev"));
    }

    #[test]
    fn item_alias_and_filters() {
        let cli = Cli::try_parse_from(["krbctl", "-o", "yaml", "get", "ri", "--object-resource", "deploy"]).unwrap();
        assert_eq!(cli.output, Output::Yaml);
        match cli.command {
            Commands::Get { what: Get::Recycleitems { names, object_resource, .. } } => {
                assert!(names.is_empty());
                assert_eq!(object_resource.as_deref(), Some("deploy"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
