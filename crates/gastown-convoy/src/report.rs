//! The stage report: one JSON shape, one human rendering.

use std::fmt::Write as _;

use colored::Colorize;
use gastown_core::bead::BeadKind;
use gastown_core::identifier::BeadId;
use itertools::Itertools;
use ptree::{write_tree_with, PrintConfig, TreeBuilder};

use crate::core::analysis::Finding;
use crate::core::graph::{DepGraph, WorkingShape};
use crate::core::waves::WavePlan;

/// The status line of a stage report.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    StagedReady,
    StagedWarnings,
    Error,
}

/// The machine-readable result of one stage invocation.
#[derive(Debug, Serialize)]
pub struct StageReport {
    pub convoy_id: Option<BeadId>,
    pub status: StageStatus,
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
    pub waves: Vec<WaveReport>,
    pub tree: Vec<TreeNode>,
}

#[derive(Debug, Serialize)]
pub struct WaveReport {
    pub wave: usize,
    pub items: Vec<WaveItem>,
}

#[derive(Debug, Serialize)]
pub struct WaveItem {
    pub id: BeadId,
    pub title: String,
    pub pool: String,
    pub blockers: Vec<BeadId>,
}

/// One node of the working-set hierarchy. Epic input yields one nested
/// root; list and convoy input yield a flat forest.
#[derive(Debug, Serialize)]
pub struct TreeNode {
    pub id: BeadId,
    pub title: String,
    pub kind: BeadKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

/// Assemble the report for a finished stage run.
pub fn build_report(
    graph: &DepGraph,
    plan: &WavePlan,
    analysis: &crate::core::analysis::Analysis,
    extra_warnings: &[Finding],
    convoy_id: Option<BeadId>,
    status: StageStatus,
) -> StageReport {
    let errors: Vec<Finding> = analysis.errors().cloned().collect();
    let warnings: Vec<Finding> = analysis
        .warnings()
        .cloned()
        .chain(extra_warnings.iter().cloned())
        .collect();

    let waves = plan
        .waves()
        .iter()
        .enumerate()
        .map(|(index, wave)| WaveReport {
            wave: index + 1,
            items: wave
                .iter()
                .map(|id| WaveItem {
                    id: id.clone(),
                    title: graph
                        .bead(id)
                        .map(|bead| bead.title.clone())
                        .unwrap_or_default(),
                    pool: analysis.pools.get(id).cloned().unwrap_or_default(),
                    blockers: graph
                        .blocking_predecessors(id)
                        .into_iter()
                        .cloned()
                        .collect(),
                })
                .collect(),
        })
        .collect();

    StageReport {
        convoy_id,
        status,
        errors,
        warnings,
        waves,
        tree: build_tree(graph),
    }
}

fn build_tree(graph: &DepGraph) -> Vec<TreeNode> {
    match graph.shape() {
        WorkingShape::Epic(root) => {
            let mut seen = Vec::new();
            tree_node(graph, root, &mut seen)
                .map(|node| vec![node])
                .unwrap_or_default()
        }
        _ => graph
            .beads()
            .map(|bead| TreeNode {
                id: bead.id.clone(),
                title: bead.title.clone(),
                kind: bead.kind,
                children: Vec::new(),
            })
            .collect(),
    }
}

fn tree_node(graph: &DepGraph, id: &BeadId, seen: &mut Vec<BeadId>) -> Option<TreeNode> {
    if seen.contains(id) {
        return None;
    }
    seen.push(id.clone());
    let bead = graph.bead(id)?;
    let children = graph
        .children(id)
        .into_iter()
        .filter_map(|child| tree_node(graph, child, seen))
        .collect();
    Some(TreeNode {
        id: bead.id.clone(),
        title: bead.title.clone(),
        kind: bead.kind,
        children,
    })
}

/// Render the report for a terminal: tree first, then the wave table,
/// warnings last.
pub fn render_human(report: &StageReport) -> String {
    let mut out = String::new();

    if !report.tree.is_empty() {
        let mut builder = TreeBuilder::new(match &report.convoy_id {
            Some(id) => format!("convoy {}", id),
            None => "working set".to_string(),
        });
        for node in &report.tree {
            append_tree(&mut builder, node);
        }
        let tree = builder.build();

        let mut print_config = PrintConfig::default();
        print_config.characters.down = "|".to_string();
        print_config.characters.down_and_right = "+".to_string();
        print_config.characters.turn_right = "\\".to_string();
        print_config.characters.right = "-".to_string();

        let mut buffer = Vec::new();
        if write_tree_with(&tree, &mut buffer, &print_config).is_ok() {
            out.push_str(&String::from_utf8_lossy(&buffer));
        }
        out.push('\n');
    }

    for wave in &report.waves {
        let _ = writeln!(out, "{}", format!("Wave {}:", wave.wave).bold());
        for item in &wave.items {
            let blockers = if item.blockers.is_empty() {
                String::new()
            } else {
                format!("  (needs: {})", item.blockers.iter().join(", "))
            };
            let _ = writeln!(
                out,
                "  o  {}  {}  -> {}{}",
                item.id,
                item.title,
                item.pool.cyan(),
                blockers
            );
        }
    }

    if !report.errors.is_empty() {
        let _ = writeln!(out, "\n{}", "Errors:".red().bold());
        for finding in &report.errors {
            let _ = writeln!(out, "  - {}", finding.summary());
        }
    }
    if !report.warnings.is_empty() {
        let _ = writeln!(out, "\n{}", "Warnings:".yellow().bold());
        for finding in &report.warnings {
            let _ = writeln!(out, "  - {}", finding.summary());
        }
    }

    let status = match report.status {
        StageStatus::StagedReady => "staged_ready".green().to_string(),
        StageStatus::StagedWarnings => "staged_warnings".yellow().to_string(),
        StageStatus::Error => "error".red().to_string(),
    };
    let _ = writeln!(out, "\nStatus: {}", status);
    out
}

fn append_tree(builder: &mut TreeBuilder, node: &TreeNode) {
    let label = format!("{} [{}] {}", node.id, node.kind, node.title);
    if node.children.is_empty() {
        builder.add_empty_child(label);
    } else {
        builder.begin_child(label);
        for child in &node.children {
            append_tree(builder, child);
        }
        builder.end_child();
    }
}
