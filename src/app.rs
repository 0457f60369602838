//! Command-line surface and the per-invocation pipeline.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::charts;
use crate::client::{QueryClient, Search, Upstream};
use crate::config::{ApiConfig, Config};
use crate::error::Result;
use crate::filters::{FilterSet, ValidationError};
use crate::output::{self, OutputError};
use crate::record::Record;
use crate::similarity;
use crate::ttl::{self, DEFAULT_CACHE_TTL_MINUTES};

#[derive(Debug, Parser)]
#[command(
    name = "bizreg",
    about = "Search the Australian business names register on data.gov.au"
)]
pub struct Cli {
    /// Search term (exact/filtered search)
    #[arg(long, conflicts_with = "searchlike")]
    pub search: Option<String>,

    /// Search by registration date, e.g. 14/05/2012 (exact/filtered search)
    #[arg(long, conflicts_with = "searchlike")]
    pub date: Option<String>,

    /// Restrict to a state of registration (ACT, NSW, NT, QLD, SA, TAS, VIC, WA)
    #[arg(long)]
    pub state: Option<String>,

    /// Restrict to a registration status (registered, deregistered, cancelled, ...)
    #[arg(long)]
    pub status: Option<String>,

    /// Name search through the SQL endpoint; results are ranked by similarity
    #[arg(long)]
    pub searchlike: Option<String>,

    /// Write results to a file (.csv for CSV, anything else for a text table)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Do not print the results table
    #[arg(long)]
    pub no_output: bool,

    /// Cache expiration time in minutes
    #[arg(long, default_value_t = DEFAULT_CACHE_TTL_MINUTES, allow_negative_numbers = true)]
    pub cache_expiration: i64,

    /// Remove expired cache entries and exit
    #[arg(long)]
    pub clean: bool,

    /// Remove every cache entry and exit
    #[arg(long)]
    pub clear_cache: bool,

    /// Neither read from nor write to the cache
    #[arg(long)]
    pub nocache: bool,

    /// Cache directory (default: $BIZREG_CACHE_DIR or the user cache dir)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Also write logs to a timestamped file in this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Print the average age of the returned businesses
    #[arg(long)]
    pub average_age: bool,

    /// Print the registration status distribution
    #[arg(long)]
    pub registration_chart: bool,

    /// Print registrations per year
    #[arg(long)]
    pub registration_distribution_chart: bool,

    /// Print registrations per state
    #[arg(long)]
    pub registration_state_chart: bool,
}

impl Cli {
    /// Resolve runtime configuration, validating `--cache-expiration`.
    pub fn config(&self) -> Result<Config, ValidationError> {
        let cache_ttl =
            ttl::ttl_from_minutes(self.cache_expiration).map_err(ValidationError::InvalidTtl)?;
        let cache_dir = self
            .cache_dir
            .clone()
            .unwrap_or_else(crate::resolve_cache_dir);

        Ok(Config {
            api: ApiConfig::from_env(),
            cache_dir,
            cache_ttl,
            use_cache: !self.nocache,
        })
    }

    /// The search requested on the command line, if any.
    ///
    /// State and status are validated even for `--searchlike`, where they do
    /// not narrow the SQL query.
    pub fn search(&self) -> Result<Option<Search>, ValidationError> {
        let filters = FilterSet::from_flags(self.state.as_deref(), self.status.as_deref())?;

        if let Some(term) = non_blank(&self.searchlike) {
            if !filters.is_empty() {
                warn!("--state and --status are ignored by --searchlike");
            }
            return Ok(Some(Search::Raw {
                term: term.to_string(),
            }));
        }

        let term = non_blank(&self.search).or_else(|| non_blank(&self.date));
        Ok(term.map(|term| Search::Exact {
            term: term.to_string(),
            filters,
        }))
    }

    fn wants_charts(&self) -> bool {
        self.average_age
            || self.registration_chart
            || self.registration_distribution_chart
            || self.registration_state_chart
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Run one invocation end to end, writing user-facing text to `out`.
pub async fn run(
    cli: &Cli,
    config: &Config,
    upstream: Arc<dyn Upstream>,
    out: &mut dyn Write,
) -> Result<()> {
    let cache = CacheStore::new(&config.cache_dir, config.cache_ttl);

    if cli.clear_cache {
        let removed = cache.clear()?;
        info!(removed, dir = %cache.dir().display(), "cache cleared");
        return Ok(());
    }

    if cli.clean {
        let removed = cache.sweep()?;
        info!(removed, dir = %cache.dir().display(), "expired cache entries removed");
        return Ok(());
    }

    let Some(search) = cli.search()? else {
        say(out, "Nothing to search for. Use --search, --date or --searchlike.")?;
        return Ok(());
    };

    if !config.use_cache {
        info!("cache disabled");
    }
    let client = QueryClient::new(
        upstream,
        config.use_cache.then_some(cache),
        config.api.clone(),
    );

    let mut records = client.fetch(&search).await?;
    info!(count = records.len(), "found results");

    let ranked = search.is_raw();
    if ranked {
        records = similarity::rank(records, search.term());
    }

    if records.is_empty() {
        say(out, "No records found")?;
        return Ok(());
    }

    let columns = output::columns(ranked);
    if let Some(path) = &cli.output {
        output::write_file(path, &records, &columns)?;
        info!(path = %path.display(), "results written");
    } else if !cli.no_output {
        output::print_table(out, &records, &columns)?;
    }

    if cli.wants_charts() {
        print_charts(cli, &records, out)?;
    }

    Ok(())
}

fn print_charts(cli: &Cli, records: &[Record], out: &mut dyn Write) -> Result<(), OutputError> {
    let now = Utc::now();

    if cli.average_age {
        match charts::average_age(records, now) {
            Some(age) => say(out, &format!("Average age of businesses: {age:.2} years"))?,
            None => say(out, "No valid registration dates found")?,
        }
    }
    if cli.registration_chart {
        write_text(out, &charts::status_chart(records))?;
    }
    if cli.registration_distribution_chart {
        write_text(out, &charts::year_chart(records, now))?;
    }
    if cli.registration_state_chart {
        write_text(out, &charts::state_chart(records))?;
    }
    Ok(())
}

fn say(out: &mut dyn Write, line: &str) -> Result<(), OutputError> {
    writeln!(out, "{line}").map_err(OutputError::Stdout)
}

fn write_text(out: &mut dyn Write, text: &str) -> Result<(), OutputError> {
    out.write_all(text.as_bytes()).map_err(OutputError::Stdout)
}
