//! CLI front door.
//!
//! Command helpers behind the `eventlens` binary:
//! - `index` - Parse a source tree and optionally write a snapshot
//! - `facts` - Extract domain facts with a collector configuration
//! - `types` - Show the resolved types of a unit's members
//!
//! Every helper returns a response struct from [`eventlens_core::output`];
//! the caller (typically `main`) renders it as JSON.
//!
//! ## Error Handling
//!
//! All functions return `Result<T, EventlensError>`, which carries stable
//! error codes for JSON output.

use std::path::Path;

use eventlens_core::error::EventlensError;
use eventlens_core::output::{FactsReport, IndexResponse, MemberTypes, TypesResponse, UnitOutput};
use eventlens_core::types::NodeId;
use eventlens_php::{extract_facts, hierarchy, IndexOptions, TypeResolver, UnitIndex};

use crate::config::AnalysisConfig;

// ============================================================================
// Index Loading
// ============================================================================

/// Where an index comes from: a source tree or a saved snapshot.
#[derive(Debug, Clone, Copy)]
pub enum IndexSource<'a> {
    Root(&'a Path),
    Snapshot(&'a Path),
}

impl<'a> IndexSource<'a> {
    /// Pick the source from optional CLI arguments; exactly one must be set.
    pub fn from_args(
        root: Option<&'a Path>,
        snapshot: Option<&'a Path>,
    ) -> Result<Self, EventlensError> {
        match (root, snapshot) {
            (Some(root), None) => Ok(IndexSource::Root(root)),
            (None, Some(snapshot)) => Ok(IndexSource::Snapshot(snapshot)),
            (Some(_), Some(_)) => Err(EventlensError::invalid_args(
                "pass either a source root or --snapshot, not both",
            )),
            (None, None) => Err(EventlensError::invalid_args(
                "a source root or --snapshot is required",
            )),
        }
    }
}

/// Build or load an index.
pub fn open_index(
    source: IndexSource<'_>,
    exclude: &[String],
) -> Result<UnitIndex, EventlensError> {
    let index = match source {
        IndexSource::Root(root) => {
            let options = exclude
                .iter()
                .fold(IndexOptions::default(), |options, pattern| options.exclude(pattern));
            UnitIndex::build(root, &options)?
        }
        IndexSource::Snapshot(path) => {
            if !path.exists() {
                return Err(EventlensError::file_not_found(path.display().to_string()));
            }
            UnitIndex::load(path)?
        }
    };
    Ok(index)
}

// ============================================================================
// Commands
// ============================================================================

/// Index a source tree, writing a snapshot to `out` when given.
pub fn run_index(
    root: &Path,
    out: Option<&Path>,
    exclude: &[String],
) -> Result<IndexResponse, EventlensError> {
    let index = open_index(IndexSource::Root(root), exclude)?;
    if let Some(out) = out {
        index.save(out)?;
    }
    let units = index
        .units()
        .iter()
        .map(|unit| UnitOutput {
            fqn: unit.fqn.clone(),
            kind: unit.kind.as_str().to_string(),
            file: unit.file.clone(),
        })
        .collect();
    Ok(IndexResponse::new(
        index.forest().files().len(),
        units,
        out.map(|p| p.display().to_string()),
    ))
}

/// Extract facts and group them by component.
pub fn run_facts(
    index: &UnitIndex,
    config: &AnalysisConfig,
) -> Result<FactsReport, EventlensError> {
    let facts = extract_facts(index, &config.collectors)?;
    tracing::info!(
        facts = facts.len(),
        skipped = facts.diagnostics().len(),
        "extracted facts"
    );
    Ok(FactsReport::build(&facts, |fact| config.components.component_of(fact)))
}

/// Resolve the members of `class`: every property, method and constant, or
/// one method and its parameters.
pub fn run_types(
    index: &UnitIndex,
    class: &str,
    method: Option<&str>,
) -> Result<TypesResponse, EventlensError> {
    let unit = index.get(class)?;
    let forest = index.forest();
    let mut resolver = TypeResolver::new(index);
    let mut members = Vec::new();

    match method {
        Some(name) => {
            let node = hierarchy::find_method(forest, unit.node, name).ok_or_else(|| {
                EventlensError::ResolutionError {
                    message: format!("method {}::{} not found", unit.fqn, name),
                }
            })?;
            members.push(member_types(&mut resolver, format!("{}()", name), "method", node));
            for parameter in forest.parameters(node) {
                let label = format!("${}", forest.kind(parameter).name().unwrap_or_default());
                members.push(member_types(&mut resolver, label, "parameter", parameter));
            }
        }
        None => {
            for name in &unit.properties {
                let declarations = hierarchy::own_property_declarations(forest, unit.node, name);
                if let Some(decl) = declarations.first() {
                    let label = format!("${}", name);
                    members.push(member_types(&mut resolver, label, "property", *decl));
                }
            }
            for name in &unit.methods {
                if let Some(node) = hierarchy::find_method(forest, unit.node, name) {
                    let label = format!("{}()", name);
                    members.push(member_types(&mut resolver, label, "method", node));
                }
            }
            for name in &unit.constants {
                if let Some(node) = hierarchy::find_constant(forest, unit.node, name) {
                    members.push(member_types(&mut resolver, name.clone(), "constant", node));
                }
            }
        }
    }
    Ok(TypesResponse::new(&unit.fqn, members))
}

fn member_types(
    resolver: &mut TypeResolver<'_>,
    member: String,
    kind: &str,
    node: NodeId,
) -> MemberTypes {
    match resolver.resolve(node) {
        Ok(types) => MemberTypes {
            member,
            kind: kind.to_string(),
            types: types.names().into_iter().map(str::to_string).collect(),
            error: None,
        },
        Err(e) => {
            tracing::warn!(member = %member, error = %e, "member could not be resolved");
            MemberTypes {
                member,
                kind: kind.to_string(),
                types: Vec::new(),
                error: Some(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> UnitIndex {
        UnitIndex::from_sources(&[
            ("src/Item.php", "<?php\nnamespace App;\nclass Item {}\n"),
            (
                "src/Cart.php",
                r#"<?php
namespace App;
class Cart {
    const LIMIT = 10;
    /** @var Item[] */
    private array $items = [];
    public function add(Item $item): self { $this->items[] = $item; return $this; }
    public function first() { return $this->items[0]; }
}
"#,
            ),
        ])
        .unwrap()
    }

    #[test]
    fn index_source_needs_exactly_one_argument() {
        let path = Path::new("src");
        assert!(IndexSource::from_args(Some(path), None).is_ok());
        assert!(IndexSource::from_args(Some(path), Some(path)).is_err());
        assert!(IndexSource::from_args(None, None).is_err());
    }

    #[test]
    fn types_lists_every_member() {
        let index = fixture();
        let response = run_types(&index, "App\\Cart", None).unwrap();
        let by_member: Vec<(&str, Vec<&str>)> = response
            .members
            .iter()
            .map(|m| (m.member.as_str(), m.types.iter().map(String::as_str).collect()))
            .collect();
        assert_eq!(
            by_member,
            vec![
                ("$items", vec!["App\\Item[]", "array"]),
                ("add()", vec!["App\\Cart"]),
                ("first()", vec!["App\\Item"]),
                ("LIMIT", vec!["int"]),
            ]
        );
        assert_eq!(response.short_name, "Cart");
    }

    #[test]
    fn types_for_one_method_include_parameters() {
        let index = fixture();
        let response = run_types(&index, "App\\Cart", Some("add")).unwrap();
        let members: Vec<&str> = response.members.iter().map(|m| m.member.as_str()).collect();
        assert_eq!(members, vec!["add()", "$item"]);

        let err = run_types(&index, "App\\Cart", Some("remove")).unwrap_err();
        assert!(matches!(err, EventlensError::ResolutionError { .. }));
        let err = run_types(&index, "App\\Basket", None).unwrap_err();
        assert!(matches!(err, EventlensError::UnitNotFound { .. }));
    }
}
