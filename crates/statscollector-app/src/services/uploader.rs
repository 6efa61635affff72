//! Writes reconciliation batches into a dated archive folder and prunes old
//! folders.

use std::sync::{Arc, LazyLock};

use chrono::{NaiveDate, Utc};
use regex::Regex;
use statscollector_core::{Batch, IdentifierSet};
use tracing::{error, info, warn};

use super::archive::{ArchiveError, ArchiveStore};

static DATED_FOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{8}$").expect("dated folder pattern"));

/// Outcome of one `upload` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// Id of the folder the files went to, when one was resolved.
    pub folder: Option<String>,
    pub uploaded: usize,
    pub failed: usize,
    pub simulated: usize,
    pub pruned: usize,
}

/// True for folder names of the form `YYYYMMDD`; only those are pruned.
pub fn is_dated_folder(name: &str) -> bool {
    DATED_FOLDER.is_match(name)
}

#[derive(Clone, bon::Builder)]
pub struct Uploader {
    store: Arc<dyn ArchiveStore>,
    /// Log what would happen instead of touching the store.
    #[builder(default)]
    simulate: bool,
}

impl Uploader {
    /// Upload `batch` into today's (UTC) folder, then keep only the newest
    /// `retention` dated folders.
    pub async fn upload(&self, batch: &Batch, retention: usize) -> UploadReport {
        self.upload_on(batch, retention, Utc::now().date_naive()).await
    }

    pub async fn upload_on(&self, batch: &Batch, retention: usize, day: NaiveDate) -> UploadReport {
        let folder_name = day.format("%Y%m%d").to_string();
        let mut report = UploadReport::default();

        if self.simulate {
            for (key, set) in batch {
                info!(
                    event = "archive_upload_simulated",
                    backend = self.store.backend(),
                    folder = %folder_name,
                    file = %file_name(key),
                    count = set.len(),
                    "simulated archive upload"
                );
                report.simulated += 1;
            }
            info!(
                event = "archive_prune_simulated",
                retention, "simulated pruning of dated folders"
            );
            report.folder = Some(folder_name);
            return report;
        }

        match self.resolve_folder(&folder_name).await {
            Ok(folder_id) => {
                for (key, set) in batch {
                    let name = file_name(key);
                    match self
                        .store
                        .put_text(&folder_id, &name, render_file(set))
                        .await
                    {
                        Ok(()) => report.uploaded += 1,
                        Err(err) => {
                            error!(
                                event = "archive_upload_failed",
                                backend = self.store.backend(),
                                file = %name,
                                error = %err,
                                "unable to upload archive file"
                            );
                            report.failed += 1;
                        }
                    }
                }
                report.folder = Some(folder_id);
            }
            Err(err) => {
                error!(
                    event = "archive_folder_unavailable",
                    backend = self.store.backend(),
                    folder = %folder_name,
                    error = %err,
                    "unable to resolve archive folder; skipping uploads"
                );
                report.failed = batch.len();
            }
        }

        report.pruned = self.prune(retention).await;
        info!(
            event = "archive_upload_finished",
            backend = self.store.backend(),
            uploaded = report.uploaded,
            failed = report.failed,
            pruned = report.pruned,
            "archive upload finished"
        );
        report
    }

    /// Reuse the folder named `name` when present, else create it.
    async fn resolve_folder(&self, name: &str) -> Result<String, ArchiveError> {
        if let Some(existing) = self.store.find_folder(name).await? {
            return Ok(existing.id);
        }
        self.store.create_folder(name).await
    }

    /// Delete all but the `retention` most recently modified dated folders.
    /// Returns the number of folders deleted.
    pub async fn prune(&self, retention: usize) -> usize {
        let folders = match self.store.list_folders().await {
            Ok(folders) => folders,
            Err(err) => {
                warn!(
                    event = "archive_prune_failed",
                    backend = self.store.backend(),
                    error = %err,
                    "unable to list archive folders"
                );
                return 0;
            }
        };

        let mut dated: Vec<_> = folders
            .into_iter()
            .filter(|folder| is_dated_folder(&folder.name))
            .collect();
        dated.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.name.cmp(&a.name))
        });

        let mut pruned = 0;
        for folder in dated.into_iter().skip(retention) {
            match self.store.delete_folder(&folder.id).await {
                Ok(()) => {
                    info!(event = "archive_folder_pruned", folder = %folder.name, "old archive folder deleted");
                    pruned += 1;
                }
                Err(err) => warn!(
                    event = "archive_prune_failed",
                    folder = %folder.name,
                    error = %err,
                    "unable to delete archive folder"
                ),
            }
        }
        pruned
    }
}

fn file_name(key: &str) -> String {
    format!("{key}.txt")
}

/// One identifier per line, each newline-terminated, in sorted order.
pub fn render_file(set: &IdentifierSet) -> String {
    let mut out = String::new();
    for bibcode in set.sorted() {
        out.push_str(bibcode.as_str());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashSet};

    use chrono::{DateTime, TimeDelta};
    use tokio::sync::Mutex;

    use super::*;
    use crate::services::archive::FolderEntry;

    #[derive(Default)]
    struct Folder {
        entry: Option<FolderEntry>,
        files: BTreeMap<String, String>,
    }

    // In-memory test double; ids are `id-<name>`.
    #[derive(Default)]
    struct InMem {
        folders: Mutex<BTreeMap<String, Folder>>,
        reject_files: HashSet<String>,
        calls: Mutex<usize>,
    }

    impl InMem {
        async fn seed(&self, name: &str, modified: DateTime<Utc>) {
            let id = format!("id-{name}");
            self.folders.lock().await.insert(
                id.clone(),
                Folder {
                    entry: Some(FolderEntry {
                        id,
                        name: name.to_string(),
                        modified,
                    }),
                    files: BTreeMap::new(),
                },
            );
        }

        async fn names(&self) -> Vec<String> {
            self.folders
                .lock()
                .await
                .values()
                .filter_map(|f| f.entry.as_ref().map(|e| e.name.clone()))
                .collect()
        }

        async fn file(&self, folder: &str, file: &str) -> Option<String> {
            self.folders
                .lock()
                .await
                .get(&format!("id-{folder}"))
                .and_then(|f| f.files.get(file).cloned())
        }
    }

    #[async_trait::async_trait]
    impl ArchiveStore for InMem {
        fn backend(&self) -> &'static str {
            "memory"
        }

        async fn list_folders(&self) -> Result<Vec<FolderEntry>, ArchiveError> {
            *self.calls.lock().await += 1;
            Ok(self
                .folders
                .lock()
                .await
                .values()
                .filter_map(|f| f.entry.clone())
                .collect())
        }

        async fn create_folder(&self, name: &str) -> Result<String, ArchiveError> {
            *self.calls.lock().await += 1;
            self.seed(name, Utc::now()).await;
            Ok(format!("id-{name}"))
        }

        async fn put_text(
            &self,
            folder_id: &str,
            file_name: &str,
            contents: String,
        ) -> Result<(), ArchiveError> {
            *self.calls.lock().await += 1;
            if self.reject_files.contains(file_name) {
                return Err(ArchiveError::InvalidName {
                    name: file_name.to_string(),
                });
            }
            let mut folders = self.folders.lock().await;
            let folder = folders.get_mut(folder_id).ok_or(ArchiveError::NotFound {
                id: folder_id.to_string(),
            })?;
            folder.files.insert(file_name.to_string(), contents);
            Ok(())
        }

        async fn delete_folder(&self, folder_id: &str) -> Result<(), ArchiveError> {
            *self.calls.lock().await += 1;
            self.folders
                .lock()
                .await
                .remove(folder_id)
                .map(|_| ())
                .ok_or(ArchiveError::NotFound {
                    id: folder_id.to_string(),
                })
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn batch() -> Batch {
        let mut batch = Batch::default();
        batch.insert(
            "20240307_0905_extra_in_db",
            IdentifierSet::from_strs(["B", "A"]),
        );
        batch.insert("20240307_0905_missing_in_db", IdentifierSet::new());
        batch
    }

    #[tokio::test]
    async fn uploads_into_new_dated_folder() {
        let store = Arc::new(InMem::default());
        let uploader = Uploader::builder().store(store.clone()).build();

        let report = uploader.upload_on(&batch(), 7, day(2024, 3, 7)).await;

        assert_eq!(report.folder.as_deref(), Some("id-20240307"));
        assert_eq!(report.uploaded, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(
            store
                .file("20240307", "20240307_0905_extra_in_db.txt")
                .await
                .as_deref(),
            Some("A\nB\n")
        );
        assert_eq!(
            store
                .file("20240307", "20240307_0905_missing_in_db.txt")
                .await
                .as_deref(),
            Some("")
        );
    }

    #[tokio::test]
    async fn reuses_existing_folder_for_the_day() {
        let store = Arc::new(InMem::default());
        store.seed("20240307", Utc::now()).await;
        let uploader = Uploader::builder().store(store.clone()).build();

        uploader.upload_on(&batch(), 7, day(2024, 3, 7)).await;

        assert_eq!(store.names().await, vec!["20240307".to_string()]);
    }

    #[tokio::test]
    async fn prune_keeps_newest_dated_folders_only() {
        let store = Arc::new(InMem::default());
        let base = Utc::now() - TimeDelta::days(30);
        for offset in 0..10 {
            let name = format!("202401{:02}", offset + 1);
            store.seed(&name, base + TimeDelta::days(offset)).await;
        }
        store.seed("notes", base - TimeDelta::days(100)).await;
        let uploader = Uploader::builder().store(store.clone()).build();

        let pruned = uploader.prune(7).await;

        assert_eq!(pruned, 3);
        let names = store.names().await;
        assert!(names.contains(&"notes".to_string()));
        for gone in ["20240101", "20240102", "20240103"] {
            assert!(!names.contains(&gone.to_string()), "{gone} should be pruned");
        }
        assert_eq!(names.len(), 8);
    }

    #[tokio::test]
    async fn failed_file_does_not_stop_the_rest() {
        let store = Arc::new(InMem {
            reject_files: HashSet::from(["20240307_0905_extra_in_db.txt".to_string()]),
            ..InMem::default()
        });
        let uploader = Uploader::builder().store(store.clone()).build();

        let report = uploader.upload_on(&batch(), 7, day(2024, 3, 7)).await;

        assert_eq!(report.uploaded, 1);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn simulated_upload_never_touches_store() {
        let store = Arc::new(InMem::default());
        let uploader = Uploader::builder()
            .store(store.clone())
            .simulate(true)
            .build();

        let report = uploader.upload_on(&batch(), 0, day(2024, 3, 7)).await;

        assert_eq!(report.simulated, 2);
        assert_eq!(report.folder.as_deref(), Some("20240307"));
        assert_eq!(*store.calls.lock().await, 0);
    }

    #[test]
    fn dated_folder_names() {
        assert!(is_dated_folder("20240307"));
        assert!(!is_dated_folder("2024030"));
        assert!(!is_dated_folder("20240307_old"));
        assert!(!is_dated_folder("notes"));
    }

    proptest::proptest! {
        #[test]
        fn rendered_files_are_sorted_lines(raw in proptest::collection::vec("[A-Za-z0-9.&]{1,19}", 0..40)) {
            let set = IdentifierSet::from_strs(&raw);
            let rendered = render_file(&set);
            let lines: Vec<&str> = rendered.lines().collect();

            proptest::prop_assert_eq!(lines.len(), set.len());
            proptest::prop_assert!(lines.windows(2).all(|pair| pair[0] < pair[1]));
            proptest::prop_assert!(rendered.is_empty() || rendered.ends_with('\n'));
        }
    }
}
