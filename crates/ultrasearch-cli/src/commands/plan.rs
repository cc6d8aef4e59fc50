//! Plan command - show the daemon request a search would issue.

use crate::app::App;
use crate::OutputFormat;
use anyhow::Context;
use clap::Args;
use ultrasearch_core::{Config, OptionValue, RawOptions, SearchOptions};

/// Options of a search, as command-line flags.
#[derive(Args, Debug, Default)]
pub struct PlanArgs {
    /// The query, as a user would type it
    #[arg(long, default_value = "")]
    pub query: String,

    /// Page number, starting at 1
    #[arg(long)]
    pub page: Option<i64>,

    /// Results per page
    #[arg(long)]
    pub per_page: Option<i64>,

    /// Restrict to an entity type (can be used multiple times)
    #[arg(long = "class")]
    pub classes: Vec<String>,

    /// Sort mode (relevance, descending, ascending, time, extended)
    #[arg(long)]
    pub sort_mode: Option<String>,

    /// Attribute or clause to sort by
    #[arg(long)]
    pub sort_by: Option<String>,

    /// Field weight as FIELD=WEIGHT (can be used multiple times)
    #[arg(long = "weight")]
    pub weights: Vec<String>,

    /// Filter as FIELD=VALUE, FIELD=A,B or FIELD=MIN..MAX
    #[arg(long = "filter")]
    pub filters: Vec<String>,

    /// Field to facet on (can be used multiple times)
    #[arg(long = "facet")]
    pub facets: Vec<String>,

    /// Daemon configuration to read class ids from
    #[arg(long)]
    pub conf: Option<std::path::PathBuf>,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    pub output: OutputFormat,
}

impl PlanArgs {
    /// Collect the flags into a raw option set.
    pub fn raw_options(&self) -> anyhow::Result<RawOptions> {
        let mut raw = RawOptions::new();
        raw.insert("query".to_string(), self.query.clone().into());

        if let Some(page) = self.page {
            raw.insert("page".to_string(), OptionValue::Int(page));
        }
        if let Some(per_page) = self.per_page {
            raw.insert("per_page".to_string(), OptionValue::Int(per_page));
        }
        if !self.classes.is_empty() {
            raw.insert("class_names".to_string(), names(&self.classes));
        }
        if let Some(mode) = &self.sort_mode {
            raw.insert("sort_mode".to_string(), mode.clone().into());
        }
        if let Some(sort_by) = &self.sort_by {
            raw.insert("sort_by".to_string(), sort_by.clone().into());
        }

        if !self.weights.is_empty() {
            let mut weights = std::collections::BTreeMap::new();
            for arg in &self.weights {
                let (field, weight) = split_pair(arg)?;
                let weight: f64 = weight
                    .parse()
                    .with_context(|| format!("Invalid weight in '{}'", arg))?;
                weights.insert(field.to_string(), OptionValue::Float(weight));
            }
            raw.insert("weights".to_string(), OptionValue::Map(weights));
        }

        if !self.filters.is_empty() {
            let mut filters = std::collections::BTreeMap::new();
            for arg in &self.filters {
                let (field, value) = split_pair(arg)?;
                filters.insert(field.to_string(), filter_value(value));
            }
            raw.insert("filters".to_string(), OptionValue::Map(filters));
        }

        if !self.facets.is_empty() {
            raw.insert("facets".to_string(), names(&self.facets));
        }

        Ok(raw)
    }
}

/// Run the plan command.
pub fn run(config: Config, args: PlanArgs) -> anyhow::Result<()> {
    let raw = args.raw_options()?;
    let app = App::new(config, args.conf.clone());
    let context = &app.context;

    let options = SearchOptions::normalize(&context.config().query_defaults, raw);
    let parsed_query = context.parser().parse(&options.query);
    let request = context.request_for(&options)?;

    match args.output {
        OutputFormat::Text => {
            println!("Query:        {}", parsed_query);
            println!("Index:        {}", context.config().daemon.index_name);
            println!(
                "Sort:         {} ({}){}",
                request.sort_mode,
                request.sort_mode.code(),
                request
                    .sort_by
                    .as_ref()
                    .map(|s| format!(" by {}", s))
                    .unwrap_or_default()
            );
            println!(
                "Window:       offset {} limit {} (max {})",
                request.offset, request.limit, request.max_matches
            );

            if !request.field_weights.is_empty() {
                println!("Weights:");
                for (field, weight) in &request.field_weights {
                    println!("  {:<12} {}", field, weight);
                }
            }

            if !request.filters.is_empty() {
                println!("Filters:");
                for filter in &request.filters {
                    println!(
                        "  {:<12} {}",
                        filter.attribute,
                        serde_json::to_string(&filter.value)?
                    );
                }
            }

            if !options.facets.is_empty() {
                println!("Facets:       {}", options.facets.join(", "));
            }
        }
        OutputFormat::Json => {
            let plan = serde_json::json!({
                "parsed_query": parsed_query,
                "options": options,
                "request": request,
            });
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
    }

    Ok(())
}

fn names(values: &[String]) -> OptionValue {
    OptionValue::List(values.iter().cloned().map(OptionValue::Str).collect())
}

fn split_pair(arg: &str) -> anyhow::Result<(&str, &str)> {
    match arg.split_once('=') {
        Some((field, value)) if !field.trim().is_empty() => Ok((field.trim(), value.trim())),
        _ => anyhow::bail!("Expected FIELD=VALUE, got '{}'", arg),
    }
}

/// A filter value by shape: `a,b` is a set, anything else a single value.
///
/// Ranges are left as text and recognized during normalization.
fn filter_value(value: &str) -> OptionValue {
    if value.contains(',') {
        return OptionValue::List(
            value
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(scalar)
                .collect(),
        );
    }
    scalar(value)
}

fn scalar(value: &str) -> OptionValue {
    if let Ok(int) = value.parse::<i64>() {
        OptionValue::Int(int)
    } else if let Ok(float) = value.parse::<f64>() {
        OptionValue::Float(float)
    } else {
        OptionValue::Str(value.to_string())
    }
}
