//! One collector run: graylog, solr, postgres, then reconciliation.

use std::sync::Arc;
use std::time::Duration;

use statscollector_core::{Exemptions, IdentifierSet, MetricTree, TargetName, reconcile};
use tracing::{error, info, warn};

use crate::config::{AppConfig, ArchiveBackend, ArchiveConfig};
use crate::constants::SERIES_CLASSIC;
use crate::error::AppError;
use crate::paths::AppPaths;
use crate::services::drive::credential_paths;
use crate::services::{
    ArchiveError, ArchiveStore, DriveArchiveStore, FsArchiveStore, PublishReport, PushGateway,
    UploadReport, Uploader,
};
use crate::sources::{
    CanonicalFile, GraylogClient, MetricCollector, PostgresSource, SolrClient, fetch_or_empty,
};

/// Collectors and side effects selected for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunPlan {
    pub graylog: bool,
    pub solr: bool,
    pub postgres: bool,
    pub classic: bool,
    pub simulate_push: bool,
    pub upload: bool,
    pub simulate_upload: bool,
}

impl RunPlan {
    /// True when no collector is selected.
    pub fn is_empty(&self) -> bool {
        !(self.graylog || self.solr || self.postgres || self.classic)
    }
}

/// What one run published and archived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub published: Vec<(String, PublishReport)>,
    pub upload: Option<UploadReport>,
}

/// Clients for the selected collectors, built before anything runs so a
/// malformed URL is reported as a configuration error.
struct Clients {
    gateway: PushGateway,
    graylog: Option<GraylogClient>,
    solr: Option<SolrClient>,
    postgres: Option<PostgresSource>,
}

impl Clients {
    fn build(cfg: &AppConfig, plan: &RunPlan) -> Result<Self, AppError> {
        let timeout = cfg.http.timeout();
        let graylog = plan
            .graylog
            .then(|| GraylogClient::new(&cfg.graylog, timeout))
            .transpose()?;
        let solr = (plan.solr || plan.classic)
            .then(|| SolrClient::new(&cfg.solr, timeout))
            .transpose()?;
        let postgres =
            (plan.postgres || plan.classic).then(|| PostgresSource::new(&cfg.postgres, timeout));
        Ok(Self {
            gateway: PushGateway::new(&cfg.pushgateway, timeout)?,
            graylog,
            solr,
            postgres,
        })
    }
}

/// Run every selected collector in order. Collector and publish failures are
/// logged, never returned.
pub async fn execute(cfg: &AppConfig, plan: &RunPlan) -> Result<RunReport, AppError> {
    let clients = Clients::build(cfg, plan)?;
    let mut report = RunReport::default();

    info!(
        event = "run_start",
        graylog = plan.graylog,
        solr = plan.solr,
        postgres = plan.postgres,
        classic = plan.classic,
        simulate_push = plan.simulate_push,
        "collector run started"
    );

    if let Some(graylog) = clients.graylog.as_ref().filter(|_| plan.graylog) {
        report
            .published
            .push(collect_and_publish(graylog, &clients.gateway, plan).await);
    }
    if let Some(solr) = clients.solr.as_ref().filter(|_| plan.solr) {
        report
            .published
            .push(collect_and_publish(solr, &clients.gateway, plan).await);
    }
    if let Some(postgres) = clients.postgres.as_ref().filter(|_| plan.postgres) {
        report
            .published
            .push(collect_and_publish(postgres, &clients.gateway, plan).await);
    }
    if plan.classic
        && let (Some(solr), Some(postgres)) = (&clients.solr, &clients.postgres)
    {
        let (published, upload) = run_classic(cfg, plan, &clients.gateway, postgres, solr).await;
        report.published.push((SERIES_CLASSIC.to_string(), published));
        report.upload = upload;
    }

    info!(event = "run_finished", "collector run finished");
    Ok(report)
}

async fn collect_and_publish(
    collector: &dyn MetricCollector,
    gateway: &PushGateway,
    plan: &RunPlan,
) -> (String, PublishReport) {
    let series = collector.series();
    let tree = collector.collect().await;
    if tree.is_empty() {
        warn!(event = "collector_empty", series, "collector returned no metrics");
    }
    let published = gateway.publish(series, &tree, plan.simulate_push).await;
    (series.to_string(), published)
}

async fn run_classic(
    cfg: &AppConfig,
    plan: &RunPlan,
    gateway: &PushGateway,
    postgres: &PostgresSource,
    solr: &SolrClient,
) -> (PublishReport, Option<UploadReport>) {
    let canonical = fetch_or_empty(&CanonicalFile::new(&cfg.classic.canonical_file)).await;
    let database = fetch_or_empty(postgres).await;
    let search_index = fetch_or_empty(solr).await;
    let exemptions = Exemptions::from_markers(&cfg.classic.exempt_markers);

    let targets: [(TargetName, &IdentifierSet); 2] = [
        (TargetName::Database, &database),
        (TargetName::SearchIndex, &search_index),
    ];
    let (summary, batch) = reconcile(&canonical, targets, &exemptions);
    info!(
        event = "reconciled",
        canonical = canonical.len(),
        database = database.len(),
        search_index = search_index.len(),
        discrepancy_files = batch.len(),
        "bibcode sets reconciled"
    );

    let tree: MetricTree = summary.to_metric_tree();
    let published = gateway
        .publish(SERIES_CLASSIC, &tree, plan.simulate_push)
        .await;

    if !plan.upload {
        info!(event = "archive_skipped", "archive upload disabled");
        return (published, None);
    }
    if batch.is_empty() {
        info!(event = "archive_skipped", "no discrepancy files to archive");
        return (published, None);
    }

    let store = match build_archive_store(&cfg.archive, cfg.http.timeout()) {
        Ok(store) => store,
        Err(err) => {
            error!(
                event = "archive_unavailable",
                error = %err,
                "unable to open archive; discrepancy files not uploaded"
            );
            return (published, None);
        }
    };
    let uploader = Uploader::builder()
        .store(store)
        .simulate(plan.simulate_upload)
        .build();
    let upload = uploader.upload(&batch, cfg.archive.keep_last).await;
    (published, Some(upload))
}

/// Open the configured archive backend.
pub fn build_archive_store(
    cfg: &ArchiveConfig,
    timeout: Duration,
) -> Result<Arc<dyn ArchiveStore>, ArchiveError> {
    match cfg.backend {
        ArchiveBackend::Fs => {
            let root = match &cfg.fs_root {
                Some(root) => root.clone(),
                None => AppPaths::from_project_dirs()?.archive_dir()?,
            };
            Ok(Arc::new(FsArchiveStore::builder().root(root).build()))
        }
        ArchiveBackend::Drive => Ok(Arc::new(DriveArchiveStore::from_config(
            &cfg.drive, timeout,
        )?)),
    }
}

/// Check that Drive credentials load, a token refresh succeeds and the parent
/// folder can be listed. Returns the number of folders under the parent.
pub async fn verify_access(cfg: &AppConfig) -> Result<usize, ArchiveError> {
    let drive = &cfg.archive.drive;
    let (credentials_file, token_file) = credential_paths(drive)?;
    if !token_file.exists() {
        error!(
            credentials = %credentials_file.display(),
            token = %token_file.display(),
            "no token file found; create an OAuth desktop client, store its secrets as \
             credentials.json and provision token.json with a refresh token for the \
             drive.file scope"
        );
        return Err(ArchiveError::MissingCredentials {
            what: "token",
            path: token_file,
        });
    }

    let store = DriveArchiveStore::from_config(drive, cfg.http.timeout())?;
    let folders = store.list_folders().await?;
    info!(
        event = "archive_access_verified",
        parent = store.parent_id(),
        folders = folders.len(),
        "drive access verified"
    );
    Ok(folders.len())
}
