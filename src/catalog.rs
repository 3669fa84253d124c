//! Artifact discovery and per-kind selection.
//!
//! Each [`ArtifactKind`] maps to one fixed location under the project root.
//! Discovery never fails: missing directories simply produce empty catalogs.
//! Entries are sorted by basename so the default selection is reproducible
//! across filesystems.

use crate::util::display_path;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Subdirectory holding generated assertion files.
pub const ASSERTIONS_DIR: &str = "src-gen";
/// Filename suffix identifying generated assertion files.
pub const ASSERTIONS_SUFFIX: &str = "-assertions.csp";
/// Fixed location of the optional verification-assertions file.
pub const VERIFICATION_ASSERTIONS_REL: &str = "csp-gen/timed/verification_assertions.csp";
/// System model preferred by the default-selection rule.
pub const PREFERRED_SYSTEM_MODEL: &str = "system.rct";
/// Inline marker for artifacts that could not be read for display.
pub const READ_ERROR_PREFIX: &str = "Error reading file: ";
/// Inline marker for a ruleset that could not be read into the prompt.
pub const RULESET_READ_ERROR_PREFIX: &str = "Error reading SLEEC file: ";

/// The six artifact categories the tool tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    RuleSpec,
    GeneratedAssertions,
    VerificationAssertions,
    SystemModel,
    ReferenceSpec,
    AgentSpec,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 6] = [
        ArtifactKind::RuleSpec,
        ArtifactKind::GeneratedAssertions,
        ArtifactKind::VerificationAssertions,
        ArtifactKind::SystemModel,
        ArtifactKind::ReferenceSpec,
        ArtifactKind::AgentSpec,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ArtifactKind::RuleSpec => "SLEEC Ruleset",
            ArtifactKind::GeneratedAssertions => "Generated Assertions",
            ArtifactKind::VerificationAssertions => "Verification Assertions",
            ArtifactKind::SystemModel => "System Model",
            ArtifactKind::ReferenceSpec => "SLEEC Specification",
            ArtifactKind::AgentSpec => "Agent Specification",
        }
    }

    /// Supplementary documents are rendered relative to the resources dir
    /// rather than with a leading slash.
    pub fn is_supplement(self) -> bool {
        matches!(self, ArtifactKind::ReferenceSpec | ArtifactKind::AgentSpec)
    }
}

/// Where discovery looks for each kind.
#[derive(Debug, Clone)]
pub struct DiscoveryLayout {
    pub root: PathBuf,
    pub resources_dir: String,
    pub reference_spec_name: String,
}

impl DiscoveryLayout {
    pub fn resources_path(&self) -> PathBuf {
        self.root.join(&self.resources_dir)
    }
}

/// One discovered artifact: absolute path plus basename for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRef {
    pub path: PathBuf,
    pub name: String,
}

impl ArtifactRef {
    fn from_path(path: PathBuf) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().into_owned();
        Some(Self { path, name })
    }
}

/// Ordered artifacts of one kind plus the current selection.
///
/// `selection` is `None` exactly when the catalog is empty after discovery;
/// otherwise it always holds a valid index.
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub kind: ArtifactKind,
    entries: Vec<ArtifactRef>,
    selection: Option<usize>,
}

impl Catalog {
    /// Build a catalog from pre-discovered entries, applying the kind's
    /// ordering and default-selection policy.
    pub fn from_entries(kind: ArtifactKind, mut entries: Vec<ArtifactRef>) -> Self {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        let selection = default_selection(kind, &entries);
        Self {
            kind,
            entries,
            selection,
        }
    }

    pub fn entries(&self) -> &[ArtifactRef] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn selection(&self) -> Option<usize> {
        self.selection
    }

    pub fn selected(&self) -> Option<&ArtifactRef> {
        self.selection.map(|index| &self.entries[index])
    }

    /// Set the selection. `None` clears it.
    ///
    /// # Panics
    /// Panics when `index` is outside the catalog; callers validate user
    /// input before it gets here.
    pub fn select(&mut self, index: Option<usize>) {
        if let Some(index) = index {
            assert!(
                index < self.entries.len(),
                "selection {index} out of range for {} catalog of {} entries",
                self.kind.label(),
                self.entries.len()
            );
        }
        self.selection = index;
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.name == name)
    }

    /// Read the selected artifact as UTF-8 text.
    ///
    /// Returns `None` when nothing is selected. Read failures are folded into
    /// the returned text so the caller can show or embed them directly.
    pub fn read_selected(&self) -> Option<String> {
        self.selected().map(|artifact| read_artifact_text(&artifact.path))
    }
}

/// Pass-through file read with inline error replacement.
pub fn read_artifact_text(path: &Path) -> String {
    read_text_or_marker(path, READ_ERROR_PREFIX)
}

/// Ruleset read for prompt compilation; failures carry their own marker.
pub fn read_ruleset_text(path: &Path) -> String {
    read_text_or_marker(path, RULESET_READ_ERROR_PREFIX)
}

fn read_text_or_marker(path: &Path, prefix: &str) -> String {
    match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "artifact read failed");
            format!("{prefix}{err}")
        }
    }
}

fn default_selection(kind: ArtifactKind, entries: &[ArtifactRef]) -> Option<usize> {
    if entries.is_empty() {
        return None;
    }
    if kind == ArtifactKind::SystemModel {
        if let Some(index) = entries
            .iter()
            .position(|entry| entry.name == PREFERRED_SYSTEM_MODEL)
        {
            return Some(index);
        }
    }
    Some(0)
}

/// Scan the filesystem for one artifact kind.
pub fn discover(kind: ArtifactKind, layout: &DiscoveryLayout) -> Catalog {
    let paths = match kind {
        ArtifactKind::RuleSpec => files_with_extension(&layout.root, "sleec"),
        ArtifactKind::SystemModel => files_with_extension(&layout.root, "rct"),
        ArtifactKind::GeneratedAssertions => {
            files_matching(&layout.root.join(ASSERTIONS_DIR), |name| {
                name.ends_with(ASSERTIONS_SUFFIX)
            })
        }
        ArtifactKind::VerificationAssertions => {
            let path = layout.root.join(VERIFICATION_ASSERTIONS_REL);
            if path.is_file() {
                vec![path]
            } else {
                Vec::new()
            }
        }
        ArtifactKind::ReferenceSpec => {
            let path = layout.resources_path().join(&layout.reference_spec_name);
            if path.is_file() {
                vec![path]
            } else {
                Vec::new()
            }
        }
        ArtifactKind::AgentSpec => files_matching(&layout.resources_path(), |name| {
            name != layout.reference_spec_name
        }),
    };
    let entries: Vec<ArtifactRef> = paths.into_iter().filter_map(ArtifactRef::from_path).collect();
    tracing::debug!(kind = ?kind, count = entries.len(), "discovered artifacts");
    Catalog::from_entries(kind, entries)
}

/// Render an artifact location the way the selectors show it: a leading
/// slash for project files, resources-relative for supplements.
pub fn display_location(artifact: &ArtifactRef, kind: ArtifactKind, layout: &DiscoveryLayout) -> String {
    if kind.is_supplement() {
        return Path::new(&layout.resources_dir)
            .join(&artifact.name)
            .display()
            .to_string();
    }
    let relative = display_path(&artifact.path, Some(&layout.root));
    if Path::new(&relative).is_absolute() {
        relative
    } else {
        format!("/{relative}")
    }
}

fn files_with_extension(dir: &Path, extension: &str) -> Vec<PathBuf> {
    files_matching(dir, |name| {
        Path::new(name)
            .extension()
            .is_some_and(|ext| ext == extension)
    })
}

fn files_matching(dir: &Path, keep: impl Fn(&str) -> bool) -> Vec<PathBuf> {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return Vec::new();
    };
    read_dir
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            let Some(name) = path.file_name() else {
                return false;
            };
            if name.to_str().is_none() {
                tracing::debug!(path = %path.display(), "matching non-UTF-8 file name lossily");
            }
            keep(&name.to_string_lossy())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn layout(root: &Path) -> DiscoveryLayout {
        DiscoveryLayout {
            root: root.to_path_buf(),
            resources_dir: "LLM Resources".to_string(),
            reference_spec_name: "SLEEC Spec.pdf".to_string(),
        }
    }

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "x").unwrap();
    }

    fn names(catalog: &Catalog) -> Vec<&str> {
        catalog.entries().iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn system_model_prefers_system_rct() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.rct", "system.rct", "a.rct"] {
            touch(&dir.path().join(name));
        }
        let catalog = discover(ArtifactKind::SystemModel, &layout(dir.path()));
        assert_eq!(names(&catalog), ["a.rct", "b.rct", "system.rct"]);
        assert_eq!(catalog.selected().unwrap().name, "system.rct");
    }

    #[test]
    fn preferred_model_wins_at_any_position() {
        let entries = ["a.rct", "system.rct", "b.rct"]
            .iter()
            .map(|n| ArtifactRef {
                path: PathBuf::from(format!("/w/{n}")),
                name: n.to_string(),
            })
            .collect();
        let catalog = Catalog::from_entries(ArtifactKind::SystemModel, entries);
        assert_eq!(catalog.selected().unwrap().name, "system.rct");
    }

    #[test]
    fn system_model_defaults_to_first_without_system_rct() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.rct"));
        touch(&dir.path().join("a.rct"));
        let catalog = discover(ArtifactKind::SystemModel, &layout(dir.path()));
        assert_eq!(catalog.selection(), Some(0));
        assert_eq!(catalog.selected().unwrap().name, "a.rct");
    }

    #[test]
    fn empty_catalog_has_no_selection() {
        let dir = tempfile::tempdir().unwrap();
        for kind in ArtifactKind::ALL {
            let catalog = discover(kind, &layout(dir.path()));
            assert!(catalog.is_empty(), "{kind:?}");
            assert_eq!(catalog.selection(), None);
            assert_eq!(catalog.read_selected(), None);
        }
    }

    #[test]
    fn assertions_require_suffix_in_src_gen() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("src-gen/robot-assertions.csp"));
        touch(&dir.path().join("src-gen/robot.csp"));
        touch(&dir.path().join("other-assertions.csp"));
        let catalog = discover(ArtifactKind::GeneratedAssertions, &layout(dir.path()));
        assert_eq!(names(&catalog), ["robot-assertions.csp"]);
    }

    #[test]
    fn verification_assertions_is_single_fixed_path() {
        let dir = tempfile::tempdir().unwrap();
        let lay = layout(dir.path());
        assert!(discover(ArtifactKind::VerificationAssertions, &lay).is_empty());
        touch(&dir.path().join(VERIFICATION_ASSERTIONS_REL));
        let catalog = discover(ArtifactKind::VerificationAssertions, &lay);
        assert_eq!(catalog.len(), 1);
        assert_eq!(
            display_location(catalog.selected().unwrap(), catalog.kind, &lay),
            "/csp-gen/timed/verification_assertions.csp"
        );
    }

    #[test]
    fn supplements_split_reference_from_agent_specs() {
        let dir = tempfile::tempdir().unwrap();
        let res = dir.path().join("LLM Resources");
        touch(&res.join("SLEEC Spec.pdf"));
        touch(&res.join("robot.pdf"));
        touch(&res.join("arm.pdf"));
        fs::create_dir_all(res.join("nested")).unwrap();
        let lay = layout(dir.path());

        let reference = discover(ArtifactKind::ReferenceSpec, &lay);
        assert_eq!(names(&reference), ["SLEEC Spec.pdf"]);
        let agents = discover(ArtifactKind::AgentSpec, &lay);
        assert_eq!(names(&agents), ["arm.pdf", "robot.pdf"]);
        assert_eq!(
            display_location(agents.selected().unwrap(), agents.kind, &lay),
            Path::new("LLM Resources").join("arm.pdf").display().to_string()
        );
    }

    #[test]
    fn rediscovery_resets_selection_to_default() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.sleec"));
        touch(&dir.path().join("b.sleec"));
        let lay = layout(dir.path());
        let mut catalog = discover(ArtifactKind::RuleSpec, &lay);
        catalog.select(Some(1));
        assert_eq!(catalog.selected().unwrap().name, "b.sleec");
        let catalog = discover(ArtifactKind::RuleSpec, &lay);
        assert_eq!(catalog.selection(), Some(0));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn select_out_of_range_panics() {
        let mut catalog = Catalog::from_entries(ArtifactKind::RuleSpec, Vec::new());
        catalog.select(Some(0));
    }

    #[test]
    fn read_selected_inlines_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.sleec");
        touch(&path);
        let catalog = discover(ArtifactKind::RuleSpec, &layout(dir.path()));
        fs::remove_file(&path).unwrap();
        let text = catalog.read_selected().unwrap();
        assert!(text.starts_with("Error reading file: "), "{text}");
        assert!(read_ruleset_text(&path).starts_with("Error reading SLEEC file: "));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_supplement_is_still_an_agent_spec() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let resources = dir.path().join("LLM Resources");
        fs::create_dir_all(&resources).unwrap();
        touch(&resources.join("SLEEC Spec.pdf"));
        touch(&resources.join(OsStr::from_bytes(b"agent-\xff.pdf")));

        let agents = discover(ArtifactKind::AgentSpec, &layout(dir.path()));
        assert_eq!(names(&agents), ["agent-\u{FFFD}.pdf"]);
        assert_eq!(agents.selection(), Some(0));
        let references = discover(ArtifactKind::ReferenceSpec, &layout(dir.path()));
        assert_eq!(names(&references), ["SLEEC Spec.pdf"]);
    }
}
