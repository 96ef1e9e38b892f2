/// Mapping validation: completeness, contiguity, and bidirectionality,
/// with a positional fallback when any check fails.

use std::collections::BTreeSet;
use std::fmt;
use tracing::warn;

use crate::schema::mapping::NodeMappings;
use crate::schema::story::CustomStory;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingIssue {
    /// A story node has no page.
    Unmapped(String),
    /// The page set is not exactly `{1, ..., expected}`.
    NonContiguous { expected: u32, pages: Vec<u32> },
    /// `page_to_node[page]` disagrees with `node_to_page[node]`.
    Mismatch {
        node: String,
        page: u32,
        found: Option<String>,
    },
}

impl fmt::Display for MappingIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unmapped(node) => write!(f, "node '{}' has no page", node),
            Self::NonContiguous { expected, pages } => {
                write!(f, "pages {:?} are not the range 1..={}", pages, expected)
            }
            Self::Mismatch { node, page, found } => write!(
                f,
                "node '{}' maps to page {} but page {} maps to {:?}",
                node, page, page, found
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub issues: Vec<MappingIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

fn check_completeness(story: &CustomStory, mappings: &NodeMappings) -> Vec<MappingIssue> {
    story
        .ids()
        .filter(|id| mappings.page_of(id).is_none())
        .map(|id| MappingIssue::Unmapped(id.to_string()))
        .collect()
}

fn check_contiguity(story: &CustomStory, mappings: &NodeMappings) -> Vec<MappingIssue> {
    let expected = story.node_count() as u32;
    let pages: BTreeSet<u32> = mappings
        .node_to_page
        .values()
        .copied()
        .chain(mappings.page_to_node.keys().copied())
        .collect();
    let contiguous = pages.len() as u32 == expected && pages.iter().copied().eq(1..=expected);
    if contiguous {
        Vec::new()
    } else {
        vec![MappingIssue::NonContiguous {
            expected,
            pages: pages.into_iter().collect(),
        }]
    }
}

fn check_bidirectional(mappings: &NodeMappings) -> Vec<MappingIssue> {
    let mut issues: Vec<MappingIssue> = mappings
        .node_to_page
        .iter()
        .filter(|(node, page)| mappings.node_at(**page) != Some(node.as_str()))
        .map(|(node, page)| MappingIssue::Mismatch {
            node: node.clone(),
            page: *page,
            found: mappings.node_at(*page).map(str::to_string),
        })
        .collect();
    for (page, node) in &mappings.page_to_node {
        if mappings.page_of(node) != Some(*page) {
            issues.push(MappingIssue::Mismatch {
                node: node.clone(),
                page: *page,
                found: Some(node.clone()),
            });
        }
    }
    issues
}

/// Run the three consistency checks, logging each failure.
pub fn validate(story: &CustomStory, mappings: &NodeMappings) -> ValidationReport {
    let checks: [(&str, Vec<MappingIssue>); 3] = [
        ("completeness", check_completeness(story, mappings)),
        ("contiguity", check_contiguity(story, mappings)),
        ("bidirectionality", check_bidirectional(mappings)),
    ];
    let mut report = ValidationReport::default();
    for (check, issues) in checks {
        if let Some(first) = issues.first() {
            warn!(check, count = issues.len(), first = %first, "page mapping check failed");
        }
        report.issues.extend(issues);
    }
    report
}

/// Positional mapping over nodes in declaration order. Passes all checks
/// by construction.
pub fn fallback_mapping(story: &CustomStory) -> NodeMappings {
    NodeMappings::sequential(story.ids())
}

/// Return `mappings` if it validates, else the fallback, together with the
/// report for `mappings` itself. An invalid report means the fallback was
/// used.
pub fn ensure_consistent(story: &CustomStory, mappings: NodeMappings) -> (NodeMappings, ValidationReport) {
    let report = validate(story, &mappings);
    if report.is_valid() {
        return (mappings, report);
    }
    warn!(nodes = story.node_count(), "replacing inconsistent page mapping with positional fallback");
    (fallback_mapping(story), report)
}
