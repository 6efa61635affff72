//! Record database: identifier listing and pipeline activity counts.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use statscollector_core::{Bibcode, MetricTree};
use tracing::{debug, warn};

use super::{FetchError, IdentifierSource, MetricCollector, with_deadline};
use crate::config::PostgresConfig;
use crate::constants::SERIES_DATABASE;

const BIBCODES_SQL: &str = "SELECT bibcode FROM records WHERE bib_data IS NOT NULL";
const PROGRESS_EVERY: usize = 1_000_000;

/// Fixed set of statistics queries run against the `records` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordQuery {
    /// Records created inside the window.
    Created,
    /// Records whose payloads changed inside the window, per payload.
    Updated,
    /// Records pushed to downstream consumers inside the window.
    Processed,
    /// Records holding each payload, regardless of age.
    Registered,
}

impl RecordQuery {
    pub const ALL: [RecordQuery; 4] = [
        RecordQuery::Created,
        RecordQuery::Updated,
        RecordQuery::Processed,
        RecordQuery::Registered,
    ];

    /// Key of the query's subtree in the snapshot.
    pub fn key(self) -> &'static str {
        match self {
            RecordQuery::Created => "created",
            RecordQuery::Updated => "updated",
            RecordQuery::Processed => "processed",
            RecordQuery::Registered => "registered",
        }
    }

    /// `(output name, source column)` pairs. Windowed queries count rows
    /// whose source timestamp falls in the window; `Registered` counts
    /// non-null source values.
    pub fn columns(self) -> &'static [(&'static str, &'static str)] {
        match self {
            RecordQuery::Created => &[("count", "created")],
            RecordQuery::Updated => &[
                ("total", "updated"),
                ("bib_data", "bib_data_updated"),
                ("nonbib_data", "nonbib_data_updated"),
                ("metrics", "metrics_updated"),
                ("orcid_claims", "orcid_claims_updated"),
                ("augments", "augments_updated"),
                ("fulltext", "fulltext_updated"),
            ],
            RecordQuery::Processed => &[
                ("total", "processed"),
                ("solr", "solr_processed"),
                ("metrics", "metrics_processed"),
                ("datalinks", "datalinks_processed"),
            ],
            RecordQuery::Registered => &[
                ("total", "*"),
                ("bib_data", "bib_data"),
                ("nonbib_data", "nonbib_data"),
                ("metrics", "metrics"),
                ("orcid_claims", "orcid_claims"),
                ("augments", "augments"),
                ("fulltext", "fulltext"),
            ],
        }
    }

    /// Whether the query binds the look-back interval as `$1`.
    pub fn uses_interval(self) -> bool {
        !matches!(self, RecordQuery::Registered)
    }

    /// Single-column queries publish a bare value instead of a subtree.
    pub fn is_scalar(self) -> bool {
        matches!(self, RecordQuery::Created)
    }

    pub fn sql(self) -> String {
        let projections: Vec<String> = self
            .columns()
            .iter()
            .map(|(name, column)| {
                if self.uses_interval() {
                    format!(
                        "count(*) FILTER (WHERE {column} BETWEEN NOW() - $1::interval AND NOW()) AS {name}"
                    )
                } else {
                    format!("count({column}) AS {name}")
                }
            })
            .collect();
        format!("SELECT {} FROM records", projections.join(", "))
    }

    fn to_tree(self, row: &PgRow) -> Result<MetricTree, sqlx::Error> {
        if self.is_scalar() {
            let (name, _) = self.columns()[0];
            let value: Option<i64> = row.try_get(name)?;
            return Ok(MetricTree::from(value));
        }
        let mut tree = MetricTree::node();
        for (name, _) in self.columns() {
            let value: Option<i64> = row.try_get(*name)?;
            tree.insert(*name, value);
        }
        Ok(tree)
    }
}

/// Connection to the pipeline's record database.
#[derive(Debug, Clone)]
pub struct PostgresSource {
    pool: PgPool,
    interval: String,
    /// Deadline for each statement and for each row of the listing stream.
    query_timeout: Duration,
}

impl PostgresSource {
    /// Build a lazily-connecting pool; nothing touches the network until the
    /// first query.
    pub fn new(cfg: &PostgresConfig, timeout: Duration) -> Self {
        let options = PgConnectOptions::new()
            .host(&cfg.host)
            .port(cfg.port)
            .username(&cfg.user)
            .password(&cfg.password)
            .database(&cfg.database);

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(timeout)
            .connect_lazy_with(options);

        Self {
            pool,
            interval: cfg.interval.clone(),
            query_timeout: timeout,
        }
    }

    pub async fn run_query(&self, query: RecordQuery) -> Result<MetricTree, FetchError> {
        let sql = query.sql();
        let mut statement = sqlx::query(&sql);
        if query.uses_interval() {
            statement = statement.bind(self.interval.as_str());
        }
        let stage = query.key();
        let row = with_deadline(stage, self.query_timeout, async move {
            statement
                .fetch_one(&self.pool)
                .await
                .map_err(|err| FetchError::database(stage, err))
        })
        .await?;
        query
            .to_tree(&row)
            .map_err(|err| FetchError::database(query.key(), err))
    }
}

#[async_trait]
impl IdentifierSource for PostgresSource {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn fetch(&self) -> Result<Vec<Bibcode>, FetchError> {
        let mut rows = sqlx::query_scalar::<_, String>(BIBCODES_SQL).fetch(&self.pool);
        let mut bibcodes = Vec::new();
        while let Some(raw) = with_deadline("bibcodes", self.query_timeout, async {
            rows.try_next()
                .await
                .map_err(|err| FetchError::database("bibcodes", err))
        })
        .await?
        {
            bibcodes.push(Bibcode::from(raw));
            if bibcodes.len() % PROGRESS_EVERY == 0 {
                debug!(count = bibcodes.len(), "streaming database bibcodes");
            }
        }
        Ok(bibcodes)
    }
}

#[async_trait]
impl MetricCollector for PostgresSource {
    fn series(&self) -> &'static str {
        SERIES_DATABASE
    }

    async fn collect(&self) -> MetricTree {
        let mut results = MetricTree::node();
        for query in RecordQuery::ALL {
            match self.run_query(query).await {
                Ok(tree) => results.insert(query.key(), tree),
                Err(err) => warn!(
                    event = "collector_query_failed",
                    series = SERIES_DATABASE,
                    query = query.key(),
                    error = %err,
                    "database statistics query failed"
                ),
            }
        }
        results
    }
}
