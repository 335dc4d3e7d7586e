//! End-to-end migration: fetch, match, prepare, clear, apply.
//!
//! Stages run strictly in order on a single task. Any unrecoverable error
//! moves the machine to `Aborted`; stages already completed (including a
//! destructive clear) are not undone.

use crate::api::PlatformClient;
use crate::auth::Authorizer;
use crate::batch;
use crate::catalog::TrackCatalog;
use crate::matcher::{self, MatchReport, Matcher};
use crate::models::{MigrationJob, Service, Track, DEFAULT_DESCRIPTION};
use anyhow::{anyhow, bail, Context, Result};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationState {
    Init,
    Authenticated,
    SourceFetched,
    Matched,
    TargetPrepared,
    Cleared,
    Applied,
    Done,
    /// `after` is the last stage that completed.
    Aborted { after: String, reason: String },
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationState::Init => f.write_str("init"),
            MigrationState::Authenticated => f.write_str("authenticated"),
            MigrationState::SourceFetched => f.write_str("source-fetched"),
            MigrationState::Matched => f.write_str("matched"),
            MigrationState::TargetPrepared => f.write_str("target-prepared"),
            MigrationState::Cleared => f.write_str("cleared"),
            MigrationState::Applied => f.write_str("applied"),
            MigrationState::Done => f.write_str("done"),
            MigrationState::Aborted { after, reason } => {
                write!(f, "aborted after {}: {}", after, reason)
            }
        }
    }
}

/// Consent to wipe the destination playlist. Must be asked, never assumed.
pub trait ClearConfirmation {
    fn confirm_clear(&self, service: Service, playlist_id: &str) -> bool;
}

impl<F> ClearConfirmation for F
where
    F: Fn(Service, &str) -> bool,
{
    fn confirm_clear(&self, service: Service, playlist_id: &str) -> bool {
        self(service, playlist_id)
    }
}

#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub catalog_path: PathBuf,
    pub total: usize,
    pub resolved: usize,
    pub unresolved: Vec<Track>,
    pub target_playlist_id: String,
    pub remove_requests: usize,
    pub append_requests: usize,
}

pub struct Migrator {
    source: Box<dyn PlatformClient>,
    destination: Box<dyn PlatformClient>,
    authorizer: Option<Arc<dyn Authorizer>>,
    storage_dir: PathBuf,
    state: MigrationState,
    transitions: Vec<MigrationState>,

    catalog: Option<TrackCatalog>,
    catalog_path: Option<PathBuf>,
    match_report: MatchReport,
    target_playlist_id: Option<String>,
    remove_requests: usize,
    append_requests: usize,
}

impl Migrator {
    pub fn new(
        source: Box<dyn PlatformClient>,
        destination: Box<dyn PlatformClient>,
        storage_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            destination,
            authorizer: None,
            storage_dir: storage_dir.into(),
            state: MigrationState::Init,
            transitions: vec![MigrationState::Init],
            catalog: None,
            catalog_path: None,
            match_report: MatchReport::default(),
            target_playlist_id: None,
            remove_requests: 0,
            append_requests: 0,
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn state(&self) -> &MigrationState {
        &self.state
    }

    /// Every state entered so far, in order.
    pub fn transitions(&self) -> &[MigrationState] {
        &self.transitions
    }

    pub fn source(&self) -> &dyn PlatformClient {
        self.source.as_ref()
    }

    pub fn destination(&self) -> &dyn PlatformClient {
        self.destination.as_ref()
    }

    pub fn catalog(&self) -> Option<&TrackCatalog> {
        self.catalog.as_ref()
    }

    /// Outcome of the matching stage; empty until it has run.
    pub fn match_report(&self) -> &MatchReport {
        &self.match_report
    }

    fn advance(&mut self, next: MigrationState) {
        info!("migration: {} -> {}", self.state, next);
        self.state = next.clone();
        self.transitions.push(next);
    }

    /// Validate the credentials, re-authorizing once when a token is
    /// rejected. Never fails: the run proceeds with whatever token results.
    pub async fn authenticate(&mut self) {
        if self.state != MigrationState::Init {
            return;
        }
        let authorizer = self.authorizer.as_deref();
        let refreshed = ensure_valid(self.source.as_mut(), authorizer).await;
        if self.destination.service() == self.source.service() {
            // same credentials on both ends: one check, one re-authorization
            if let Some(token) = refreshed {
                self.destination.set_token(token);
            }
        } else {
            ensure_valid(self.destination.as_mut(), authorizer).await;
        }
        self.advance(MigrationState::Authenticated);
    }

    /// Drive the remaining stages for `job`. On error the machine is left in
    /// `Aborted` and the error is returned.
    pub async fn run(
        &mut self,
        job: &MigrationJob,
        confirm: &dyn ClearConfirmation,
    ) -> Result<MigrationReport> {
        match self.drive(job, confirm).await {
            Ok(report) => Ok(report),
            Err(e) => {
                let after = self.state.to_string();
                error!("migration aborted after {}: {:#}", after, e);
                self.advance(MigrationState::Aborted {
                    after,
                    reason: format!("{:#}", e),
                });
                Err(e)
            }
        }
    }

    async fn drive(
        &mut self,
        job: &MigrationJob,
        confirm: &dyn ClearConfirmation,
    ) -> Result<MigrationReport> {
        if matches!(self.state, MigrationState::Done | MigrationState::Aborted { .. }) {
            bail!("migration already finished ({})", self.state);
        }
        if job.source_service != self.source.service()
            || job.target_service != self.destination.service()
        {
            bail!(
                "job is {} -> {} but clients are {} -> {}",
                job.source_service,
                job.target_service,
                self.source.service(),
                self.destination.service()
            );
        }

        if self.state == MigrationState::Init {
            self.authenticate().await;
        }
        if self.state == MigrationState::Authenticated {
            self.fetch_source(job).await?;
            self.advance(MigrationState::SourceFetched);
        }
        if self.state == MigrationState::SourceFetched {
            self.match_tracks().await?;
            self.advance(MigrationState::Matched);
        }
        if self.state == MigrationState::Matched {
            self.prepare_target(job).await?;
            self.advance(MigrationState::TargetPrepared);
        }
        if self.state == MigrationState::TargetPrepared {
            self.clear_target(confirm).await?;
            self.advance(MigrationState::Cleared);
        }
        if self.state == MigrationState::Cleared {
            self.apply().await?;
            self.advance(MigrationState::Applied);
        }
        if self.state == MigrationState::Applied {
            self.advance(MigrationState::Done);
        }
        self.report()
    }

    async fn fetch_source(&mut self, job: &MigrationJob) -> Result<()> {
        let catalog = self
            .source
            .fetch_tracks(&job.source_playlist_id)
            .await
            .with_context(|| {
                format!(
                    "fetching {} playlist {}",
                    job.source_service, job.source_playlist_id
                )
            })?;
        info!(
            "Fetched {} track(s) from {} playlist {}",
            catalog.len(),
            catalog.service,
            catalog.playlist_id
        );
        let path = catalog.save(&self.storage_dir)?;
        info!("Catalog written to {}", path.display());
        self.catalog = Some(catalog);
        self.catalog_path = Some(path);
        Ok(())
    }

    async fn match_tracks(&mut self) -> Result<()> {
        let mut catalog = self
            .catalog
            .take()
            .ok_or_else(|| anyhow!("no catalog to match"))?;
        let report = if catalog.service == self.destination.service() {
            info!("Same platform on both ends; reusing source ids");
            matcher::adopt_source_ids(&mut catalog)
        } else {
            Matcher::new(self.destination.as_ref())
                .match_catalog(&mut catalog)
                .await
        };
        info!(
            "Matched {} of {} track(s) on {}",
            report.resolved,
            catalog.len(),
            self.destination.service()
        );
        let saved = catalog.save(&self.storage_dir);
        self.catalog = Some(catalog);
        self.catalog_path = Some(saved?);
        self.match_report = report;
        Ok(())
    }

    async fn prepare_target(&mut self, job: &MigrationJob) -> Result<()> {
        let id = if job.create_new {
            let name = job.target_name.trim();
            if name.is_empty() {
                bail!("a new playlist needs a name");
            }
            let description = if job.target_description.trim().is_empty() {
                DEFAULT_DESCRIPTION
            } else {
                job.target_description.as_str()
            };
            let id = self
                .destination
                .create_playlist(name, description, false)
                .await
                .with_context(|| format!("creating {} playlist '{}'", job.target_service, name))?;
            info!("Created private {} playlist '{}' ({})", job.target_service, name, id);
            id
        } else {
            let id = job.target_playlist_id.trim();
            if id.is_empty() {
                bail!("no destination playlist id given");
            }
            id.to_string()
        };
        self.target_playlist_id = Some(id);
        Ok(())
    }

    async fn clear_target(&mut self, confirm: &dyn ClearConfirmation) -> Result<()> {
        let id = self.target_id()?;
        let service = self.destination.service();
        if !confirm.confirm_clear(service, &id) {
            bail!("clearing {} playlist {} was not confirmed", service, id);
        }
        self.remove_requests = batch::clear_playlist(self.destination.as_ref(), &id)
            .await
            .with_context(|| format!("listing items of {} playlist {}", service, id))?;
        Ok(())
    }

    async fn apply(&mut self) -> Result<()> {
        let id = self.target_id()?;
        let ids = self
            .catalog
            .as_ref()
            .map(TrackCatalog::resolved_ids)
            .unwrap_or_default();
        self.append_requests = batch::append_tracks(self.destination.as_ref(), &id, &ids).await;
        Ok(())
    }

    fn target_id(&self) -> Result<String> {
        self.target_playlist_id
            .clone()
            .ok_or_else(|| anyhow!("destination playlist not prepared"))
    }

    fn report(&self) -> Result<MigrationReport> {
        let catalog = self
            .catalog
            .as_ref()
            .ok_or_else(|| anyhow!("no catalog"))?;
        let unresolved: Vec<Track> = catalog.unresolved().cloned().collect();
        let report = MigrationReport {
            catalog_path: self.catalog_path.clone().unwrap_or_default(),
            total: catalog.len(),
            resolved: catalog.len() - unresolved.len(),
            unresolved,
            target_playlist_id: self.target_playlist_id.clone().unwrap_or_default(),
            remove_requests: self.remove_requests,
            append_requests: self.append_requests,
        };
        info!(
            "Migration finished: {} of {} track(s) resolved, {} unresolved",
            report.resolved,
            report.total,
            report.unresolved.len()
        );
        Ok(report)
    }
}

/// Check the token; if the platform rejects it, re-authorize once and install
/// the result. Other failures are only logged. Returns the new token when one
/// was obtained.
async fn ensure_valid(
    client: &mut dyn PlatformClient,
    authorizer: Option<&dyn Authorizer>,
) -> Option<String> {
    let service = client.service();
    let err = match client.validate_token().await {
        Ok(()) => {
            info!("{} token is valid", service);
            return None;
        }
        Err(e) => e,
    };
    if !err.is_auth() {
        warn!("could not check {} token, continuing: {}", service, err);
        return None;
    }
    warn!("{} token rejected: {}", service, err);
    let Some(authorizer) = authorizer else {
        warn!("no authorizer configured; continuing with the current {} token", service);
        return None;
    };
    match authorizer.authorize(service).await {
        Ok(token) => {
            client.set_token(token.clone());
            if let Err(e) = client.validate_token().await {
                warn!("{} token still rejected after re-authorization: {}", service, e);
            }
            Some(token)
        }
        Err(e) => {
            warn!("re-authorization for {} failed: {:#}", service, e);
            None
        }
    }
}
