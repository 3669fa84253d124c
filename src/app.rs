//! Application state owned by the foreground controller.
//!
//! All catalogs, selections and the current analysis job live here and are
//! only changed through these methods. A run receives a snapshot of the
//! selections taken when it starts.
use crate::catalog::{discover, ArtifactKind, Catalog, DiscoveryLayout};
use crate::inference::ModelId;
use crate::job::{AnalysisJob, JobRequest, JobServices, SelectionSnapshot};
use crate::prompt::AnalysisScope;
use std::collections::BTreeMap;

pub struct AppState {
    layout: DiscoveryLayout,
    catalogs: BTreeMap<ArtifactKind, Catalog>,
    job: AnalysisJob,
}

impl AppState {
    /// Discover every catalog under `layout` with default selections.
    pub fn discover(layout: DiscoveryLayout) -> Self {
        let mut state = Self {
            layout,
            catalogs: BTreeMap::new(),
            job: AnalysisJob::default(),
        };
        state.refresh();
        state
    }

    /// Rescan from scratch. Prior selections are not carried over.
    pub fn refresh(&mut self) {
        self.catalogs = ArtifactKind::ALL
            .into_iter()
            .map(|kind| (kind, discover(kind, &self.layout)))
            .collect();
    }

    pub fn layout(&self) -> &DiscoveryLayout {
        &self.layout
    }

    pub fn catalog(&self, kind: ArtifactKind) -> &Catalog {
        &self.catalogs[&kind]
    }

    pub fn catalogs(&self) -> impl Iterator<Item = &Catalog> {
        self.catalogs.values()
    }

    /// Change one selection; see [`Catalog::select`] for the range contract.
    pub fn select(&mut self, kind: ArtifactKind, index: Option<usize>) {
        if let Some(catalog) = self.catalogs.get_mut(&kind) {
            catalog.select(index);
        }
    }

    /// Content of the selected artifact of `kind`, with read errors inlined.
    pub fn selected_content(&self, kind: ArtifactKind) -> Option<String> {
        self.catalog(kind).read_selected()
    }

    pub fn snapshot(&self) -> SelectionSnapshot {
        let path = |kind| {
            self.catalog(kind)
                .selected()
                .map(|artifact| artifact.path.clone())
        };
        SelectionSnapshot {
            ruleset: path(ArtifactKind::RuleSpec),
            assertions: path(ArtifactKind::GeneratedAssertions),
            reference_spec: path(ArtifactKind::ReferenceSpec),
            agent_spec: path(ArtifactKind::AgentSpec),
        }
    }

    /// Start a background run over the current selections, replacing any
    /// previous job.
    pub fn start_analysis(&mut self, model: ModelId, scope: AnalysisScope, services: JobServices) {
        let request = JobRequest {
            snapshot: self.snapshot(),
            model,
            scope,
        };
        tracing::info!(model = %model, scope = ?scope, "starting analysis");
        self.job = AnalysisJob::start(request, services);
    }

    pub fn job(&self) -> &AnalysisJob {
        &self.job
    }

    pub fn job_mut(&mut self) -> &mut AnalysisJob {
        &mut self.job
    }
}
