use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};

mod api;
mod cache;
mod dashboard;
mod error;
mod filters;
mod models;
mod report;
mod stats;
mod vespa;

use api::ApiClient;
use cache::{
    CacheStore, FileTier, DEFAULT_MEMORY_TTL_MINUTES, DEFAULT_NAMESPACE,
    DEFAULT_PERSISTENT_TTL_MINUTES,
};
use dashboard::DashboardContext;
use error::DashboardError;
use models::{Category, Cycle, FieldFilter, FilterOperator, FilterRule, Scope};

/// Knack field holding the composite student name object.
const NAME_FIELD: &str = "field_187";

#[derive(Parser)]
#[command(name = "vespa-dashboard")]
#[command(about = "VESPA survey dashboard over the remote analytics backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the dashboard overview for one establishment or staff admin
    #[command(group(
        ArgGroup::new("scope")
            .args(["establishment", "staff_admin"])
            .required(true)
            .multiple(false)
    ))]
    Overview {
        #[arg(long)]
        establishment: Option<String>,
        #[arg(long)]
        staff_admin: Option<String>,
        #[arg(long, default_value_t = 1)]
        cycle: u8,
        /// Filter rule, e.g. field_223=12, field_223!=12, field_223~1
        #[arg(long)]
        filter: Vec<String>,
        /// Case-insensitive search across student first and last names
        #[arg(long)]
        search: Option<String>,
        /// Clear cached data before loading
        #[arg(long)]
        refresh: bool,
        /// Print the overall average for every cycle, not just the selected one
        #[arg(long)]
        all_cycles: bool,
    },
    /// Generate a markdown report
    #[command(group(
        ArgGroup::new("scope")
            .args(["establishment", "staff_admin"])
            .required(true)
            .multiple(false)
    ))]
    Report {
        #[arg(long)]
        establishment: Option<String>,
        #[arg(long)]
        staff_admin: Option<String>,
        #[arg(long, default_value_t = 1)]
        cycle: u8,
        #[arg(long)]
        filter: Vec<String>,
        #[arg(long)]
        search: Option<String>,
        /// Clear cached data before loading
        #[arg(long)]
        refresh: bool,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Fetch raw records from one backend object (troubleshooting)
    FetchObject {
        #[arg(long)]
        object_key: String,
        /// Knack filter array as JSON
        #[arg(long, default_value = "[]")]
        filters: String,
    },
    /// Clear both cache tiers for this installation
    ClearCache,
    /// List recently viewed establishments
    Recent,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Overview {
            establishment,
            staff_admin,
            cycle,
            filter,
            search,
            refresh,
            all_cycles,
        } => {
            let mut context = build_context(establishment, staff_admin, cycle)?;
            let rules = parse_rules(&filter, search.as_deref())?;
            context.record_visit();
            if refresh {
                context.refresh().await;
            }
            print_overview(&context, &rules).await;
            if all_cycles {
                print_cycle_comparison(&mut context).await;
            }
        }
        Commands::Report {
            establishment,
            staff_admin,
            cycle,
            filter,
            search,
            refresh,
            out,
        } => {
            let context = build_context(establishment, staff_admin, cycle)?;
            let rules = parse_rules(&filter, search.as_deref())?;
            context.record_visit();
            if refresh {
                context.refresh().await;
            }

            let overview = context.load_overview().await;
            let school_eri = context.load_school_eri().await;
            let national_eri = context.load_national_eri().await;
            let report = report::build_report(
                context.scope().label(),
                context.cycle(),
                &overview,
                &school_eri,
                &national_eri,
                &rules,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::FetchObject {
            object_key,
            filters,
        } => {
            let base_url = std::env::var("VESPA_API_BASE_URL")
                .map_err(|_| DashboardError::ConfigMissing("VESPA_API_BASE_URL".to_string()))?;
            let knack_filters: serde_json::Value =
                serde_json::from_str(&filters).context("--filters must be a JSON array")?;
            let api = ApiClient::new(&base_url);
            let data = api.knack_data(&object_key, &knack_filters).await?;
            println!("{} records from {object_key}.", data.records.len());
            if let Some(first) = data.records.first() {
                println!("{}", serde_json::to_string_pretty(first)?);
            }
        }
        Commands::ClearCache => {
            open_cache().clear().await;
            println!("Cache cleared.");
        }
        Commands::Recent => {
            let recents = open_cache().recent_establishments();
            if recents.is_empty() {
                println!("No establishments viewed yet.");
            } else {
                for id in recents {
                    println!("- {id}");
                }
            }
        }
    }

    Ok(())
}

async fn print_overview(context: &DashboardContext, rules: &[FilterRule]) {
    println!(
        "Overview for {} (cycle {})",
        context.scope().label(),
        context.cycle().number()
    );

    match context.load_overview().await {
        Ok(overview) => {
            let filtered = filters::apply_filters(&overview.records, rules);
            println!(
                "{} of {} records in view.",
                filtered.len(),
                overview.records.len()
            );
            let aggregate = vespa::averages(&filtered, context.cycle());
            for category in Category::ALL {
                println!("- {}: {:.2}", category.label(), aggregate.get(category));
            }
        }
        Err(err) => println!("Overview unavailable: {err}"),
    }

    match context.load_school_eri().await {
        Ok(eri) => match eri.school_eri {
            Some(value) => println!(
                "School ERI {:.2} from {} responses.",
                value, eri.response_count
            ),
            None => println!("No school ERI for this cycle."),
        },
        Err(err) => println!("School ERI unavailable: {err}"),
    }

    match context.load_national_eri().await {
        Ok(eri) => match eri.national_eri {
            Some(value) => println!("National ERI {:.2} ({}).", value, eri.source),
            None => println!("No national ERI published for this cycle."),
        },
        Err(err) => println!("National ERI unavailable: {err}"),
    }
}

/// Reloads the overview once per cycle; each switch clears the cache so no
/// aggregate leaks across cycle boundaries.
async fn print_cycle_comparison(context: &mut DashboardContext) {
    println!("Cycle comparison:");
    for number in 1..=3u8 {
        let Some(cycle) = Cycle::new(number) else {
            continue;
        };
        context.set_cycle(cycle).await;
        match context.load_overview().await {
            Ok(overview) => {
                let aggregate = vespa::averages(&overview.records, cycle);
                println!(
                    "- Cycle {number}: overall {:.2} across {} records",
                    aggregate.overall,
                    overview.records.len()
                );
            }
            Err(err) => println!("- Cycle {number}: unavailable ({err})"),
        }
    }
}

fn build_context(
    establishment: Option<String>,
    staff_admin: Option<String>,
    cycle: u8,
) -> anyhow::Result<DashboardContext> {
    let base_url = std::env::var("VESPA_API_BASE_URL")
        .map_err(|_| DashboardError::ConfigMissing("VESPA_API_BASE_URL".to_string()))?;
    let cycle = Cycle::new(cycle).context("cycle must be 1, 2, or 3")?;
    let scope = match (establishment, staff_admin) {
        (Some(id), _) => Scope::Establishment(id),
        (_, Some(id)) => Scope::StaffAdmin(id),
        (None, None) => {
            return Err(
                DashboardError::ConfigMissing("establishment or staff admin".to_string()).into(),
            )
        }
    };

    Ok(DashboardContext::new(
        ApiClient::new(&base_url),
        open_cache(),
        scope,
        cycle,
    ))
}

fn open_cache() -> CacheStore {
    let dir = std::env::var("VESPA_CACHE_DIR").unwrap_or_else(|_| ".vespa-cache".to_string());
    let memory_ttl = ttl_from_env("VESPA_MEMORY_TTL_MINUTES", DEFAULT_MEMORY_TTL_MINUTES);
    let persistent_ttl =
        ttl_from_env("VESPA_PERSISTENT_TTL_MINUTES", DEFAULT_PERSISTENT_TTL_MINUTES);
    CacheStore::new(DEFAULT_NAMESPACE, Some(Arc::new(FileTier::new(dir))))
        .with_ttls(memory_ttl, persistent_ttl)
}

fn ttl_from_env(var: &str, default_minutes: i64) -> chrono::Duration {
    let minutes = std::env::var(var)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default_minutes);
    chrono::Duration::minutes(minutes)
}

fn parse_rules(filters: &[String], search: Option<&str>) -> anyhow::Result<Vec<FilterRule>> {
    let mut rules = Vec::new();
    for expr in filters {
        rules.push(parse_filter(expr)?);
    }
    if let Some(text) = search {
        rules.push(name_search_rule(text));
    }
    Ok(rules)
}

fn parse_filter(expr: &str) -> anyhow::Result<FilterRule> {
    // Longer operator tokens first so != is not read as =.
    for (token, operator) in [
        ("!=", FilterOperator::IsNot),
        ("!~", FilterOperator::DoesNotContain),
        ("=", FilterOperator::Is),
        ("~", FilterOperator::Contains),
    ] {
        if let Some((field, value)) = expr.split_once(token) {
            if field.is_empty() || value.is_empty() {
                anyhow::bail!("filter {expr:?} needs a field and a value");
            }
            return Ok(FilterRule::Simple(FieldFilter {
                field: field.to_string(),
                subfield: None,
                operator,
                value: value.to_string(),
            }));
        }
    }
    anyhow::bail!("filter {expr:?} has no operator (expected =, !=, ~, or !~)")
}

fn name_search_rule(text: &str) -> FilterRule {
    FilterRule::AnyOf(
        ["first", "last"]
            .into_iter()
            .map(|subfield| FieldFilter {
                field: NAME_FIELD.to_string(),
                subfield: Some(subfield.to_string()),
                operator: FilterOperator::Contains,
                value: text.to_string(),
            })
            .collect(),
    )
}
