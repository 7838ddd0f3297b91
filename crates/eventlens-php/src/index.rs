//! Unit index: the table of class-like declarations over one connected forest.
//!
//! Building an index runs the whole front end:
//!
//! 1. discover `*.php` files under the root (sorted by relative path)
//! 2. parse every file into its own forest, in parallel when enabled
//! 3. merge the forests in path order
//! 4. run the connector passes, collecting units between name resolution and
//!    reference injection
//!
//! Each file contributes at most one unit: the first top-level class,
//! interface or trait it declares. When two files declare the same FQN, the
//! file that sorts first wins.
//!
//! An index can be written to a JSON snapshot and loaded back without
//! reparsing.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use eventlens_core::types::NodeId;
use eventlens_core::workspace::{discover_sources, DiscoveryConfig, WorkspaceError};
use eventlens_php_ast::{Forest, NameRole, NodeKind, ParseError, PhpParser};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connect::{connect_forest, ConnectError};
use crate::hierarchy;

/// Snapshot format version written by [`UnitIndex::save`].
pub const SNAPSHOT_VERSION: u32 = 1;

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while building, querying or persisting a unit index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// No unit is indexed under this FQN.
    #[error("unit not found: {fqn}")]
    UnitNotFound { fqn: String },

    /// Source discovery failed.
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// A discovered file could not be read.
    #[error("failed to read {path}: {source}")]
    Read { path: String, source: io::Error },

    /// A file failed to parse under the abort policy.
    #[error("failed to parse {path}: {source}")]
    Parse { path: String, source: ParseError },

    /// The grammar could not be loaded.
    #[error("parser unavailable: {message}")]
    Grammar { message: String },

    /// The snapshot was written by an incompatible version.
    #[error("snapshot schema version {found} is not supported (expected {expected})")]
    SnapshotVersion { found: u32, expected: u32 },

    /// The snapshot is not valid JSON for this schema.
    #[error("invalid snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// Snapshot I/O failed.
    #[error("snapshot I/O error: {0}")]
    Io(#[from] io::Error),

    /// The merged forest is malformed.
    #[error(transparent)]
    Connect(#[from] ConnectError),
}

// ============================================================================
// Options
// ============================================================================

/// What to do with a file that fails to parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseErrorPolicy {
    /// Fail the whole build.
    #[default]
    Abort,
    /// Log a warning and leave the file out of the index.
    Skip,
}

/// Options for [`UnitIndex::build`].
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Source discovery settings (language, exclusion globs).
    pub discovery: DiscoveryConfig,
    /// Parse failure handling.
    pub parse_errors: ParseErrorPolicy,
    /// Parse files on the rayon pool.
    pub parallel: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        IndexOptions {
            discovery: DiscoveryConfig::default(),
            parse_errors: ParseErrorPolicy::Abort,
            parallel: true,
        }
    }
}

impl IndexOptions {
    /// Add an exclusion glob (matched against forward-slash relative paths).
    pub fn exclude(mut self, pattern: &str) -> Self {
        self.discovery = self.discovery.exclude(pattern);
        self
    }

    /// Set the parse failure policy.
    pub fn with_parse_errors(mut self, policy: ParseErrorPolicy) -> Self {
        self.parse_errors = policy;
        self
    }

    /// Parse on the calling thread only.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

// ============================================================================
// Units
// ============================================================================

/// Kind of a class-like declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Class,
    Interface,
    Trait,
}

impl UnitKind {
    /// Lowercase spelling used in output.
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Class => "class",
            UnitKind::Interface => "interface",
            UnitKind::Trait => "trait",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One indexed class, interface or trait.
///
/// Supertype names are fully qualified and may point outside the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub fqn: String,
    pub kind: UnitKind,
    /// Declaration node in the index forest.
    pub node: NodeId,
    /// Relative path of the declaring file.
    pub file: String,
    /// Extended class (classes only).
    pub parent: Option<String>,
    /// Implemented interfaces, or extended interfaces for an interface.
    pub interfaces: Vec<String>,
    pub traits: Vec<String>,
    /// Declared properties, including promoted constructor parameters.
    pub properties: Vec<String>,
    pub methods: Vec<String>,
    pub constants: Vec<String>,
    pub is_abstract: bool,
}

impl Unit {
    fn from_declaration(forest: &Forest, node: NodeId, file: &str) -> Option<Unit> {
        let fqn = forest.node(node).resolved_name.clone()?;
        let (kind, is_abstract) = match forest.kind(node) {
            NodeKind::Class { modifiers, .. } => (UnitKind::Class, modifiers.is_abstract),
            NodeKind::Interface { .. } => (UnitKind::Interface, false),
            NodeKind::Trait { .. } => (UnitKind::Trait, false),
            _ => return None,
        };
        let names = |ids: Vec<NodeId>| -> Vec<String> {
            ids.into_iter()
                .filter_map(|id| forest.name_of(id).map(str::to_string))
                .collect()
        };
        let (parent, interfaces) = match kind {
            UnitKind::Class => (
                names(forest.names_with_role(node, NameRole::Extends))
                    .into_iter()
                    .next(),
                names(forest.names_with_role(node, NameRole::Implements)),
            ),
            UnitKind::Interface => (None, names(forest.names_with_role(node, NameRole::Extends))),
            UnitKind::Trait => (None, Vec::new()),
        };
        let traits = names(
            forest
                .children_where(node, |k| matches!(k, NodeKind::TraitUse))
                .flat_map(|use_node| forest.names_with_role(use_node, NameRole::TraitUse))
                .collect(),
        );
        let member_names = |pred: fn(&NodeKind) -> bool| -> Vec<String> {
            forest
                .members(node)
                .filter(|m| pred(forest.kind(*m)))
                .filter_map(|m| forest.kind(m).name().map(str::to_string))
                .collect()
        };
        let properties = hierarchy::own_properties(forest, node)
            .into_iter()
            .filter_map(|p| forest.kind(p).name().map(str::to_string))
            .collect();

        Some(Unit {
            fqn,
            kind,
            node,
            file: file.to_string(),
            parent,
            interfaces,
            traits,
            properties,
            methods: member_names(|k| matches!(k, NodeKind::Method { .. })),
            constants: member_names(|k| matches!(k, NodeKind::ClassConstant { .. })),
            is_abstract,
        })
    }
}

// ============================================================================
// Snapshot
// ============================================================================

#[derive(Serialize)]
struct SnapshotRef<'a> {
    schema_version: u32,
    units: &'a [Unit],
    forest: &'a Forest,
}

#[derive(Deserialize)]
struct SnapshotHeader {
    schema_version: u32,
}

#[derive(Deserialize)]
struct Snapshot {
    units: Vec<Unit>,
    forest: Forest,
}

// ============================================================================
// Unit Index
// ============================================================================

/// FQN-keyed table of units over a connected forest.
#[derive(Debug, Clone, Default)]
pub struct UnitIndex {
    units: Vec<Unit>,
    forest: Forest,
    /// Normalized FQN to position in `units`.
    by_fqn: HashMap<String, usize>,
    /// Declaration node to position in `units`.
    by_node: HashMap<NodeId, usize>,
}

/// Lookup key: no leading separator, ASCII-lowercased (class names are
/// case-insensitive).
fn fqn_key(fqn: &str) -> String {
    fqn.trim_start_matches('\\').to_ascii_lowercase()
}

impl UnitIndex {
    /// Discover, parse and connect every source file under `root`.
    pub fn build(root: &Path, options: &IndexOptions) -> Result<Self, IndexError> {
        let entries = discover_sources(root, &options.discovery)?;
        // Surface a broken grammar once instead of once per file.
        PhpParser::new().map_err(|e| IndexError::Grammar {
            message: e.to_string(),
        })?;

        let mut sources = Vec::with_capacity(entries.len());
        for entry in &entries {
            let bytes = entry.read().map_err(|source| IndexError::Read {
                path: entry.path.clone(),
                source,
            })?;
            sources.push((entry.path.clone(), bytes));
        }

        let parsed = parse_all(&sources, options.parallel)?;
        let mut forests = Vec::with_capacity(parsed.len());
        for ((path, _), result) in sources.iter().zip(parsed) {
            match result {
                Ok(forest) => forests.push(forest),
                Err(source) => match options.parse_errors {
                    ParseErrorPolicy::Abort => {
                        return Err(IndexError::Parse {
                            path: path.clone(),
                            source,
                        })
                    }
                    ParseErrorPolicy::Skip => {
                        tracing::warn!(path = %path, error = %source, "skipping unparsable file");
                    }
                },
            }
        }
        let index = Self::from_forests(forests)?;
        tracing::info!(
            root = %root.display(),
            files = index.forest.files().len(),
            units = index.units.len(),
            "indexed sources"
        );
        Ok(index)
    }

    /// Build an index from in-memory `(path, source)` pairs.
    ///
    /// Sources are sorted by path first, so the result does not depend on
    /// argument order.
    pub fn from_sources(sources: &[(&str, &str)]) -> Result<Self, IndexError> {
        let mut sorted: Vec<&(&str, &str)> = sources.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let mut parser = PhpParser::new().map_err(|e| IndexError::Grammar {
            message: e.to_string(),
        })?;
        let mut forests = Vec::with_capacity(sorted.len());
        for (path, source) in sorted {
            let forest = parser
                .parse(path, source.as_bytes())
                .map_err(|source| IndexError::Parse {
                    path: path.to_string(),
                    source,
                })?;
            forests.push(forest);
        }
        Self::from_forests(forests)
    }

    /// Merge per-file forests (already in path order) and connect them.
    fn from_forests(forests: Vec<Forest>) -> Result<Self, IndexError> {
        let mut forest = Forest::new();
        for file_forest in forests {
            forest.absorb(file_forest);
        }

        let mut units = Vec::new();
        connect_forest(&mut forest, |forest| {
            units = collect_units(forest);
            units.iter().map(|u| (fqn_key(&u.fqn), u.node)).collect()
        })?;

        let mut index = UnitIndex {
            units,
            forest,
            by_fqn: HashMap::new(),
            by_node: HashMap::new(),
        };
        index.restore_indexes();
        Ok(index)
    }

    /// Rebuild lookup tables after deserialization.
    fn restore_indexes(&mut self) {
        self.forest.restore_indexes();
        self.by_fqn = self
            .units
            .iter()
            .enumerate()
            .map(|(idx, u)| (fqn_key(&u.fqn), idx))
            .collect();
        self.by_node = self
            .units
            .iter()
            .enumerate()
            .map(|(idx, u)| (u.node, idx))
            .collect();
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Write the index to a JSON snapshot.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let snapshot = SnapshotRef {
            schema_version: SNAPSHOT_VERSION,
            units: &self.units,
            forest: &self.forest,
        };
        serde_json::to_writer(&mut writer, &snapshot)?;
        writer.flush()?;
        tracing::debug!(path = %path.display(), units = self.units.len(), "saved snapshot");
        Ok(())
    }

    /// Load an index from a JSON snapshot written by [`UnitIndex::save`].
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let text = fs::read_to_string(path)?;
        let header: SnapshotHeader = serde_json::from_str(&text)?;
        if header.schema_version != SNAPSHOT_VERSION {
            return Err(IndexError::SnapshotVersion {
                found: header.schema_version,
                expected: SNAPSHOT_VERSION,
            });
        }
        let snapshot: Snapshot = serde_json::from_str(&text)?;
        let mut index = UnitIndex {
            units: snapshot.units,
            forest: snapshot.forest,
            by_fqn: HashMap::new(),
            by_node: HashMap::new(),
        };
        index.restore_indexes();
        tracing::debug!(path = %path.display(), units = index.units.len(), "loaded snapshot");
        Ok(index)
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    /// Returns true if a unit is indexed under `fqn`.
    pub fn has(&self, fqn: &str) -> bool {
        self.by_fqn.contains_key(&fqn_key(fqn))
    }

    /// Unit indexed under `fqn`, if any.
    pub fn find(&self, fqn: &str) -> Option<&Unit> {
        self.by_fqn.get(&fqn_key(fqn)).map(|idx| &self.units[*idx])
    }

    /// Unit indexed under `fqn`.
    pub fn get(&self, fqn: &str) -> Result<&Unit, IndexError> {
        self.find(fqn).ok_or_else(|| IndexError::UnitNotFound {
            fqn: fqn.trim_start_matches('\\').to_string(),
        })
    }

    /// Declaration node of the unit indexed under `fqn`.
    pub fn declaration(&self, fqn: &str) -> Option<NodeId> {
        self.find(fqn).map(|u| u.node)
    }

    /// All units in path order.
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Unit whose declaration node is exactly `node`.
    pub fn unit_by_node(&self, node: NodeId) -> Option<&Unit> {
        self.by_node.get(&node).map(|idx| &self.units[*idx])
    }

    /// Unit enclosing `node` (or declared by it).
    pub fn unit_for_node(&self, node: NodeId) -> Option<&Unit> {
        self.forest
            .ancestors_inclusive(node)
            .find_map(|ancestor| self.unit_by_node(ancestor))
    }

    /// The connected forest.
    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    /// Number of indexed units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns true if no unit is indexed.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_all(
    sources: &[(String, Vec<u8>)],
    parallel: bool,
) -> Result<Vec<Result<Forest, ParseError>>, IndexError> {
    if parallel {
        // One parser per rayon worker.
        let parsed: Vec<Result<Forest, ParseError>> = sources
            .par_iter()
            .map_init(PhpParser::new, |parser, (path, bytes)| match parser {
                Ok(parser) => parser.parse(path, bytes),
                Err(err) => Err(ParseError::Language {
                    message: err.to_string(),
                }),
            })
            .collect();
        return Ok(parsed);
    }
    let mut parser = PhpParser::new().map_err(|e| IndexError::Grammar {
        message: e.to_string(),
    })?;
    Ok(sources
        .iter()
        .map(|(path, bytes)| parser.parse(path, bytes))
        .collect())
}

/// Class-like declarations at file or namespace level, in source order.
fn top_level_declarations(forest: &Forest, root: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    for child in forest.children(root) {
        match forest.kind(*child) {
            NodeKind::Namespace { .. } => {
                out.extend(forest.children_where(*child, NodeKind::is_class_like))
            }
            kind if kind.is_class_like() => out.push(*child),
            _ => {}
        }
    }
    out
}

fn collect_units(forest: &Forest) -> Vec<Unit> {
    let mut units = Vec::new();
    let mut seen = HashSet::new();
    for file in forest.files() {
        let declarations = top_level_declarations(forest, file.root);
        let Some((first, rest)) = declarations.split_first() else {
            continue;
        };
        for ignored in rest {
            tracing::info!(
                file = %file.path,
                declaration = %forest.kind(*ignored),
                "ignoring additional declaration in file"
            );
        }
        let Some(unit) = Unit::from_declaration(forest, *first, &file.path) else {
            continue;
        };
        if !seen.insert(fqn_key(&unit.fqn)) {
            tracing::info!(fqn = %unit.fqn, file = %file.path, "duplicate declaration ignored");
            continue;
        }
        units.push(unit);
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> UnitIndex {
        UnitIndex::from_sources(&[
            (
                "src/Order/PlaceOrder.php",
                "<?php\nnamespace App\\Order;\n\nuse App\\Shared\\Handler;\n\nfinal class PlaceOrder extends Base implements Handler\n{\n    use Traceable;\n    public const NAME = 'place';\n    private $items = [];\n    public function __construct(private Repository $repo) {}\n    public function handle(): void {}\n}\n",
            ),
            (
                "src/Order/Base.php",
                "<?php\nnamespace App\\Order;\nabstract class Base {}\n",
            ),
            (
                "src/Shared/Handler.php",
                "<?php\nnamespace App\\Shared;\ninterface Handler extends \\Countable { public function handle(): void; }\n",
            ),
        ])
        .unwrap()
    }

    #[test]
    fn units_are_in_path_order() {
        let index = sample();
        let fqns: Vec<&str> = index.units().iter().map(|u| u.fqn.as_str()).collect();
        assert_eq!(
            fqns,
            vec!["App\\Order\\Base", "App\\Order\\PlaceOrder", "App\\Shared\\Handler"]
        );
    }

    #[test]
    fn unit_records_members_and_supertypes() {
        let index = sample();
        let unit = index.get("App\\Order\\PlaceOrder").unwrap();
        assert_eq!(unit.kind, UnitKind::Class);
        assert_eq!(unit.file, "src/Order/PlaceOrder.php");
        assert_eq!(unit.parent.as_deref(), Some("App\\Order\\Base"));
        assert_eq!(unit.interfaces, vec!["App\\Shared\\Handler"]);
        assert_eq!(unit.traits, vec!["App\\Order\\Traceable"]);
        assert_eq!(unit.properties, vec!["items", "repo"]);
        assert_eq!(unit.methods, vec!["__construct", "handle"]);
        assert_eq!(unit.constants, vec!["NAME"]);
        assert!(!unit.is_abstract);
        assert!(index.get("App\\Order\\Base").unwrap().is_abstract);

        let handler = index.get("App\\Shared\\Handler").unwrap();
        assert_eq!(handler.kind, UnitKind::Interface);
        assert_eq!(handler.interfaces, vec!["Countable"]);
    }

    #[test]
    fn lookup_ignores_leading_separator_and_case() {
        let index = sample();
        assert!(index.has("\\App\\Order\\Base"));
        assert!(index.has("app\\order\\base"));
        assert!(!index.has("App\\Order\\Missing"));
        assert!(matches!(
            index.get("App\\Order\\Missing"),
            Err(IndexError::UnitNotFound { fqn }) if fqn == "App\\Order\\Missing"
        ));
    }

    #[test]
    fn first_declaration_per_file_wins() {
        let index = UnitIndex::from_sources(&[(
            "src/Many.php",
            "<?php\nnamespace App;\nclass First {}\nclass Second {}\ninterface Third {}\n",
        )])
        .unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.has("App\\First"));
        assert!(!index.has("App\\Second"));
    }

    #[test]
    fn duplicate_fqn_keeps_first_path() {
        let index = UnitIndex::from_sources(&[
            ("src/b/Dup.php", "<?php\nnamespace App;\nclass Dup { public function b() {} }\n"),
            ("src/a/Dup.php", "<?php\nnamespace App;\nclass Dup { public function a() {} }\n"),
        ])
        .unwrap();
        let unit = index.get("App\\Dup").unwrap();
        assert_eq!(unit.file, "src/a/Dup.php");
        assert_eq!(unit.methods, vec!["a"]);
    }

    #[test]
    fn nested_nodes_map_to_their_unit() {
        let index = sample();
        let forest = index.forest();
        let unit = index.get("App\\Order\\PlaceOrder").unwrap();
        let method = forest
            .members(unit.node)
            .find(|m| forest.kind(*m).name() == Some("handle"))
            .unwrap();
        assert_eq!(
            index.unit_for_node(method).map(|u| u.fqn.as_str()),
            Some("App\\Order\\PlaceOrder")
        );
        assert!(index.unit_by_node(method).is_none());
        let root = forest.files()[0].root;
        assert!(index.unit_for_node(root).is_none());
    }

    #[test]
    fn references_are_linked_across_files() {
        let index = sample();
        let forest = index.forest();
        let unit = index.get("App\\Order\\PlaceOrder").unwrap();
        let extends = forest.names_with_role(unit.node, NameRole::Extends)[0];
        assert_eq!(
            forest.node(extends).declaration,
            index.declaration("App\\Order\\Base")
        );
    }

    mod build_tests {
        use super::*;

        fn write(dir: &TempDir, rel: &str, content: &str) {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        fn workspace() -> TempDir {
            let dir = TempDir::new().unwrap();
            write(&dir, "src/A.php", "<?php\nnamespace App;\nclass A extends B {}\n");
            write(&dir, "src/B.php", "<?php\nnamespace App;\nclass B {}\n");
            write(&dir, "src/C.php", "<?php\nnamespace App;\ntrait C {}\n");
            write(&dir, "vendor/D.php", "<?php\nnamespace Lib;\nclass D {}\n");
            write(&dir, "README.md", "not php");
            dir
        }

        #[test]
        fn parallel_and_sequential_builds_agree() {
            let dir = workspace();
            let parallel = UnitIndex::build(dir.path(), &IndexOptions::default()).unwrap();
            let sequential =
                UnitIndex::build(dir.path(), &IndexOptions::default().sequential()).unwrap();
            assert_eq!(parallel.units(), sequential.units());
            assert_eq!(parallel.len(), 4);
            assert_eq!(parallel.forest().files().len(), 4);
        }

        #[test]
        fn exclusion_globs_apply() {
            let dir = workspace();
            let options = IndexOptions::default().exclude("vendor/**");
            let index = UnitIndex::build(dir.path(), &options).unwrap();
            assert!(!index.has("Lib\\D"));
            assert_eq!(index.len(), 3);
        }

        #[test]
        fn parse_errors_abort_or_skip() {
            let dir = workspace();
            write(&dir, "src/Broken.php", "<?php\nclass {\n");

            let err = UnitIndex::build(dir.path(), &IndexOptions::default()).unwrap_err();
            assert!(matches!(err, IndexError::Parse { path, .. } if path == "src/Broken.php"));

            let index = UnitIndex::build(
                dir.path(),
                &IndexOptions::default().with_parse_errors(ParseErrorPolicy::Skip),
            )
            .unwrap();
            assert_eq!(index.len(), 4);
        }

        #[test]
        fn missing_root_is_a_workspace_error() {
            let dir = TempDir::new().unwrap();
            let err = UnitIndex::build(&dir.path().join("nope"), &IndexOptions::default())
                .unwrap_err();
            assert!(matches!(err, IndexError::Workspace(_)));
        }
    }

    mod snapshot_tests {
        use super::*;

        #[test]
        fn snapshot_round_trip_preserves_units_and_links() {
            let index = sample();
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("index.json");
            index.save(&path).unwrap();

            let loaded = UnitIndex::load(&path).unwrap();
            assert_eq!(loaded.units(), index.units());
            assert_eq!(loaded.forest().len(), index.forest().len());
            assert!(loaded.has("app\\shared\\handler"));

            let unit = loaded.get("App\\Order\\PlaceOrder").unwrap();
            let extends = loaded.forest().names_with_role(unit.node, NameRole::Extends)[0];
            assert_eq!(
                loaded.forest().node(extends).declaration,
                loaded.declaration("App\\Order\\Base")
            );
            let namespace = loaded.forest().parent(unit.node).unwrap();
            assert!(loaded.forest().name_scope(namespace).is_some());
        }

        #[test]
        fn snapshot_with_other_version_is_rejected() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("index.json");
            fs::write(&path, r#"{"schema_version": 99, "units": [], "forest": {}}"#).unwrap();
            assert!(matches!(
                UnitIndex::load(&path),
                Err(IndexError::SnapshotVersion { found: 99, expected: SNAPSHOT_VERSION })
            ));
        }

        #[test]
        fn malformed_snapshot_is_rejected() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("index.json");
            fs::write(&path, "not json").unwrap();
            assert!(matches!(UnitIndex::load(&path), Err(IndexError::Snapshot(_))));
        }
    }
}
