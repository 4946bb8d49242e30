//! Run orchestration.
//!
//! One run, strictly sequential:
//! 1. make sure the output root and history tree are writable (run-fatal)
//! 2. archive every sector's raw snapshot for today
//! 3. for each sector in configured order: load data, build candidates,
//!    dispatch, persist; a sector's failure is logged and the run moves on
//! 4. rebuild the history index
//!
//! The job decides what is generated per sector: the boardroom strategy
//! report lives here, the editor and comments jobs in their own modules.

use crate::api::{GenerateContent, GenerationRequest};
use crate::config::{AppConfig, CredentialSource};
use crate::credentials::CredentialPool;
use crate::dispatch::{DispatchOutcome, DispatchReport, ResilientDispatcher};
use crate::models::{HistoryIndex, Sector};
use crate::outputs::archive::SnapshotArchiver;
use crate::outputs::artifacts::ArtifactStore;
use crate::outputs::{ArtifactKind, HistoryLayout};
use crate::prompts::boardroom_prompt;
use crate::snapshot::{headline_digest, load_snapshot};
use crate::utils::ensure_writable_dir;
use chrono::NaiveDate;
use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// What a run generates for each sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// Markdown strategy report per sector.
    Boardroom,
    /// Structured JSON analysis per sector.
    Editor,
    /// Persona comment section per sector.
    Comments,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Job::Boardroom => "boardroom",
            Job::Editor => "editor",
            Job::Comments => "comments",
        })
    }
}

/// Why a sector produced nothing without anything going wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Input file missing, unreadable, or without headlines.
    NoData,
    /// No credential resolved for the sector.
    NoCredentials,
    /// Every request came back without usable output.
    NothingGenerated,
}

/// How one sector ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectorStatus {
    /// Artifact persisted; holds the permanent path.
    Saved(PathBuf),
    Skipped(SkipReason),
    /// Every candidate credential hit its quota.
    Exhausted,
    /// Non-quota generation failure or unusable model output.
    Failed(String),
    /// Output was generated but could not be written.
    PersistFailed(String),
}

/// Result of one run.
#[derive(Debug)]
pub struct RunSummary {
    pub job: Job,
    pub date: NaiveDate,
    pub sectors: Vec<(String, SectorStatus)>,
    pub index: HistoryIndex,
}

impl RunSummary {
    pub fn saved(&self) -> usize {
        self.sectors
            .iter()
            .filter(|(_, s)| matches!(s, SectorStatus::Saved(_)))
            .count()
    }

    /// Sectors whose generated output was lost to a write failure.
    pub fn persist_failures(&self) -> Vec<&str> {
        self.sectors
            .iter()
            .filter(|(_, s)| matches!(s, SectorStatus::PersistFailed(_)))
            .map(|(key, _)| key.as_str())
            .collect()
    }

    #[cfg(test)]
    pub fn status_of(&self, sector: &str) -> Option<&SectorStatus> {
        self.sectors
            .iter()
            .find(|(key, _)| key == sector)
            .map(|(_, status)| status)
    }
}

/// Composes credential selection, dispatch and persistence per sector.
#[derive(Debug)]
pub struct PipelineRunner<C> {
    pub(crate) config: AppConfig,
    pub(crate) pool: CredentialPool,
    pub(crate) dispatcher: ResilientDispatcher<C>,
    pub(crate) archiver: SnapshotArchiver,
    pub(crate) store: ArtifactStore,
}

impl<C> PipelineRunner<C>
where
    C: GenerateContent,
{
    pub fn new(config: AppConfig, credentials: CredentialSource, client: C, root: impl Into<PathBuf>) -> Self {
        let layout = HistoryLayout::new(root);
        let pool = CredentialPool::new(credentials, config.credentials.clone());
        let dispatcher = ResilientDispatcher::new(client, config.cooldown());
        Self {
            pool,
            dispatcher,
            archiver: SnapshotArchiver::new(layout.clone()),
            store: ArtifactStore::new(layout),
            config,
        }
    }

    #[cfg(test)]
    pub fn dispatcher(&self) -> &ResilientDispatcher<C> {
        &self.dispatcher
    }

    /// Execute `job` over every configured sector for `as_of`.
    ///
    /// # Errors
    ///
    /// Only shared setup is run-fatal: creating the output tree and the
    /// day's archive directory, and writing the history index. An input
    /// that cannot be archived is skipped. Per-sector problems are
    /// reported in the returned [`RunSummary`].
    #[instrument(level = "info", skip_all, fields(job = %job, date = %as_of))]
    pub async fn run(&self, job: Job, as_of: NaiveDate) -> Result<RunSummary, Box<dyn Error>> {
        let t0 = Instant::now();
        let layout = self.store.layout();
        ensure_writable_dir(layout.root()).await?;
        ensure_writable_dir(&layout.history_dir()).await?;

        let raw_files: Vec<&PathBuf> = self.config.sectors.iter().map(|s| &s.input_path).collect();
        self.archiver.archive(&raw_files, as_of).await?;

        let mut sectors = Vec::with_capacity(self.config.sectors.len());
        for (i, sector) in self.config.sectors.iter().enumerate() {
            if i > 0 && !self.config.sector_delay().is_zero() {
                sleep(self.config.sector_delay()).await;
            }

            let status = match job {
                Job::Boardroom => self.boardroom_sector(sector, as_of).await,
                Job::Editor => self.editor_sector(sector, as_of).await,
                Job::Comments => self.comments_sector(sector, as_of).await,
            };
            log_status(&sector.key, &status);
            sectors.push((sector.key.clone(), status));
        }

        let index = self.store.refresh_index().await?;
        let summary = RunSummary {
            job,
            date: as_of,
            sectors,
            index,
        };
        info!(
            saved = summary.saved(),
            sectors = summary.sectors.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Run complete"
        );
        Ok(summary)
    }

    /// Strategy report for one sector.
    #[instrument(level = "info", skip_all, fields(sector = %sector.key))]
    async fn boardroom_sector(&self, sector: &Sector, as_of: NaiveDate) -> SectorStatus {
        let Some(platforms) = load_snapshot(&sector.input_path).await else {
            return SectorStatus::Skipped(SkipReason::NoData);
        };
        let headlines = headline_digest(&platforms, self.config.boardroom_title_limit);
        if headlines.is_empty() {
            return SectorStatus::Skipped(SkipReason::NoData);
        }

        let request = GenerationRequest::text(
            &self.config.models.strategy,
            boardroom_prompt(sector, &headlines, as_of),
        )
        .with_temperature(self.config.models.strategy_temperature);

        let report = match self.dispatch_for(sector, &request).await {
            Ok(report) => report,
            Err(status) => return status,
        };
        match report.outcome {
            DispatchOutcome::Done(content) => {
                self.persist(ArtifactKind::Strategy, sector, &content, as_of).await
            }
            outcome => failed_outcome(outcome),
        }
    }

    /// Build candidates for `sector` and dispatch `request` over them.
    ///
    /// `Err` carries the status to report when there is nothing to try.
    pub(crate) async fn dispatch_for(
        &self,
        sector: &Sector,
        request: &GenerationRequest,
    ) -> Result<DispatchReport, SectorStatus> {
        let candidates = self.pool.build_candidates(&sector.credential_slot);
        if candidates.is_empty() {
            warn!(sector = %sector.key, slot = %sector.credential_slot, "No credential available for sector");
            return Err(SectorStatus::Skipped(SkipReason::NoCredentials));
        }
        Ok(self.dispatcher.dispatch(&sector.key, &candidates, request).await)
    }

    /// Save through the artifact store, mapping a write failure to a status.
    pub(crate) async fn persist(
        &self,
        kind: ArtifactKind,
        sector: &Sector,
        content: &str,
        as_of: NaiveDate,
    ) -> SectorStatus {
        match self.store.save(kind, &sector.key, content, as_of).await {
            Ok(path) => SectorStatus::Saved(path),
            Err(e) => SectorStatus::PersistFailed(e.to_string()),
        }
    }
}

/// Status for a dispatch that did not produce content.
pub(crate) fn failed_outcome(outcome: DispatchOutcome) -> SectorStatus {
    match outcome {
        DispatchOutcome::Done(_) => SectorStatus::Skipped(SkipReason::NothingGenerated),
        DispatchOutcome::Exhausted => SectorStatus::Exhausted,
        DispatchOutcome::Failed(e) => SectorStatus::Failed(e.to_string()),
    }
}

fn log_status(sector: &str, status: &SectorStatus) {
    match status {
        SectorStatus::Saved(path) => info!(sector, path = %path.display(), "Sector artifact saved"),
        SectorStatus::Skipped(reason) => warn!(sector, ?reason, "Sector skipped"),
        SectorStatus::Exhausted => error!(sector, "Sector skipped: all credentials exhausted"),
        SectorStatus::Failed(e) => error!(sector, error = %e, "Sector failed"),
        SectorStatus::PersistFailed(e) => {
            error!(sector, error = %e, "Sector output could not be saved")
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{Behavior, FakeService};
    use super::*;
    use crate::config::CredentialLayout;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn sector(root: &Path, key: &str) -> Sector {
        Sector {
            key: key.to_string(),
            input_path: root.join(format!("data_{key}.json")),
            display_name: key.to_uppercase(),
            credential_slot: format!("KEY_{}", key.to_uppercase()),
        }
    }

    fn config(root: &Path, keys: &[&str]) -> AppConfig {
        AppConfig {
            cooldown_secs: 0,
            sector_delay_secs: 0,
            batch_delay_secs: 0,
            credentials: CredentialLayout {
                pool_size: 3,
                ..CredentialLayout::default()
            },
            sectors: keys.iter().map(|k| sector(root, k)).collect(),
            ..AppConfig::default()
        }
    }

    fn write_snapshot(path: &Path, titles: &[&str]) {
        let items: Vec<serde_json::Value> = titles
            .iter()
            .map(|t| serde_json::json!({ "title": t, "url": format!("https://example.com/{t}") }))
            .collect();
        let body = serde_json::json!([{ "id": "wallstreetcn-hot", "items": items }]);
        std::fs::write(path, body.to_string()).unwrap();
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 6).unwrap()
    }

    #[tokio::test]
    async fn test_three_sector_scenario() {
        let tmp = tempfile::tempdir().unwrap();
        let inputs = tmp.path().join("inputs");
        let out = tmp.path().join("out");
        std::fs::create_dir_all(&inputs).unwrap();

        // alpha has no input file
        write_snapshot(&inputs.join("data_beta.json"), &["Rates held", "Oil up"]);
        write_snapshot(&inputs.join("data_gamma.json"), &["New phone"]);

        let credentials: CredentialSource = [
            ("KEY_BETA", "beta-key"),
            ("KEY_GAMMA", "gamma-key"),
            ("GOOGLE_API_KEY", "generic-key"),
            ("KEY_1", "pool-key"),
        ]
        .into_iter()
        .collect();
        let service = FakeService::default()
            .with("beta-key", Behavior::Quota)
            .with("generic-key", Behavior::Reply("```markdown\n# Beta verdict\n```".into()))
            .with("pool-key", Behavior::Reply("unused".into()))
            .with("gamma-key", Behavior::Reject);

        let runner = PipelineRunner::new(
            config(&inputs, &["alpha", "beta", "gamma"]),
            credentials,
            service,
            &out,
        );
        let summary = runner.run(Job::Boardroom, date()).await.unwrap();

        assert_eq!(
            summary.status_of("alpha"),
            Some(&SectorStatus::Skipped(SkipReason::NoData))
        );

        let permanent = out.join("history/2025-05-06/reports/beta_strategy.md");
        assert_eq!(summary.status_of("beta"), Some(&SectorStatus::Saved(permanent.clone())));
        assert_eq!(std::fs::read_to_string(&permanent).unwrap(), "# Beta verdict\n");
        assert_eq!(
            std::fs::read_to_string(out.join("beta_strategy.md")).unwrap(),
            "# Beta verdict\n"
        );

        assert!(matches!(summary.status_of("gamma"), Some(SectorStatus::Failed(_))));
        assert!(!out.join("gamma_strategy.md").exists());
        assert!(!out.join("history/2025-05-06/reports/gamma_strategy.md").exists());

        // beta: quota then success; gamma: one rejected call and nothing else
        let service = runner.dispatcher().client();
        assert_eq!(service.calls_with("beta-key"), 1);
        assert_eq!(service.calls_with("generic-key"), 1);
        assert_eq!(service.calls_with("gamma-key"), 1);
        assert_eq!(service.calls_with("pool-key"), 0);

        assert_eq!(summary.index.dates, vec!["2025-05-06"]);
        let on_disk: HistoryIndex =
            serde_json::from_str(&std::fs::read_to_string(out.join("history_index.json")).unwrap())
                .unwrap();
        assert_eq!(on_disk.dates, vec!["2025-05-06"]);

        // raw inputs archived under their original names
        assert!(out.join("history/2025-05-06/data_beta.json").exists());
        assert!(out.join("history/2025-05-06/data_gamma.json").exists());
        assert!(!out.join("history/2025-05-06/data_alpha.json").exists());
    }

    #[tokio::test]
    async fn test_index_includes_today_when_no_sector_succeeds() {
        let tmp = tempfile::tempdir().unwrap();
        write_snapshot(&tmp.path().join("data_solo.json"), &["Headline"]);
        let out = tmp.path().join("out");
        std::fs::create_dir_all(out.join("history/2025-05-01")).unwrap();

        let runner = PipelineRunner::new(
            config(tmp.path(), &["solo"]),
            CredentialSource::default(),
            FakeService::default(),
            &out,
        );
        let summary = runner.run(Job::Boardroom, date()).await.unwrap();

        assert_eq!(
            summary.status_of("solo"),
            Some(&SectorStatus::Skipped(SkipReason::NoCredentials))
        );
        assert_eq!(summary.index.dates, vec!["2025-05-06", "2025-05-01"]);
        assert!(runner.dispatcher().client().calls.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_sector_is_reported_distinctly() {
        let tmp = tempfile::tempdir().unwrap();
        write_snapshot(&tmp.path().join("data_tech.json"), &["Chip news"]);
        let credentials: CredentialSource =
            [("KEY_TECH", "a"), ("KEY_1", "b")].into_iter().collect();
        let service = FakeService::default()
            .with("a", Behavior::Quota)
            .with("b", Behavior::Quota);

        let runner = PipelineRunner::new(config(tmp.path(), &["tech"]), credentials, service, tmp.path());
        let summary = runner.run(Job::Boardroom, date()).await.unwrap();

        assert_eq!(summary.status_of("tech"), Some(&SectorStatus::Exhausted));
        assert_eq!(summary.saved(), 0);
        assert!(summary.persist_failures().is_empty());
    }

    #[tokio::test]
    async fn test_rerun_same_day_overwrites_latest() {
        let tmp = tempfile::tempdir().unwrap();
        write_snapshot(&tmp.path().join("data_tech.json"), &["Chip news"]);
        let out = tmp.path().join("out");

        for reply in ["first", "second"] {
            let credentials: CredentialSource = [("KEY_TECH", "k")].into_iter().collect();
            let service = FakeService::default().with("k", Behavior::Reply(reply.into()));
            let runner = PipelineRunner::new(config(tmp.path(), &["tech"]), credentials, service, &out);
            let summary = runner.run(Job::Boardroom, date()).await.unwrap();
            assert_eq!(summary.index.dates, vec!["2025-05-06"]);
        }

        assert_eq!(std::fs::read_to_string(out.join("tech_strategy.md")).unwrap(), "second");
        // the dated copy follows the last run of the day
        assert_eq!(
            std::fs::read_to_string(out.join("history/2025-05-06/reports/tech_strategy.md")).unwrap(),
            "second"
        );
    }

    #[tokio::test]
    async fn test_unreadable_input_skips_only_its_sector() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        std::fs::create_dir(tmp.path().join("data_tech.json")).unwrap();
        write_snapshot(&tmp.path().join("data_finance.json"), &["Rates held"]);

        let credentials: CredentialSource =
            [("KEY_TECH", "t"), ("KEY_FINANCE", "f")].into_iter().collect();
        let service = FakeService::default()
            .with("t", Behavior::Reply("tech report".into()))
            .with("f", Behavior::Reply("finance report".into()));
        let runner = PipelineRunner::new(
            config(tmp.path(), &["tech", "finance"]),
            credentials,
            service,
            &out,
        );
        let summary = runner.run(Job::Boardroom, date()).await.unwrap();

        assert_eq!(
            summary.status_of("tech"),
            Some(&SectorStatus::Skipped(SkipReason::NoData))
        );
        assert!(matches!(summary.status_of("finance"), Some(SectorStatus::Saved(_))));
        assert_eq!(
            std::fs::read_to_string(out.join("finance_strategy.md")).unwrap(),
            "finance report"
        );
        assert!(out.join("history/2025-05-06/data_finance.json").exists());
        assert!(!out.join("history/2025-05-06/data_tech.json").exists());
        assert!(out.join("history_index.json").exists());
        assert_eq!(runner.dispatcher().client().calls_with("t"), 0);
    }

    #[tokio::test]
    async fn test_unwritable_root_is_run_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "file").unwrap();

        let runner = PipelineRunner::new(
            config(tmp.path(), &["tech"]),
            CredentialSource::default(),
            FakeService::default(),
            blocker.join("out"),
        );
        assert!(runner.run(Job::Boardroom, date()).await.is_err());
    }

    #[test]
    fn test_job_display() {
        assert_eq!(Job::Boardroom.to_string(), "boardroom");
        assert_eq!(Job::Comments.to_string(), "comments");
    }
}
