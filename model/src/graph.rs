//! Similarity graphs over embedded rows.

use crate::{
    embed::{cosine_similarity, EmbeddingTable},
    workspace::{Format, Item, Workspace},
};
use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use strum::{Display, EnumIter, EnumString};

mod html;

pub use html::render_html;

/// How the graph is laid out on the page.
#[derive(
    Clone, Copy, Debug, Default, Display, EnumIter, EnumString, PartialEq, Eq, Hash,
)]
#[strum(ascii_case_insensitive)]
pub enum Style {
    #[strum(to_string = "2d")]
    TwoD,
    #[default]
    #[strum(to_string = "3d")]
    ThreeD,
}

/// Parameters for building a graph.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphOptions {
    /// Links kept per node, to its most similar neighbours.
    pub neighbors: usize,
    /// Pairs less similar than this are never linked.
    pub min_similarity: f32,
    /// Column used to color nodes. Defaults to the sentiment question, if present.
    pub group_by: Option<String>,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            neighbors: 5,
            min_similarity: 0.3,
            group_by: None,
        }
    }
}

/// A node-link graph, in the shape force-graph expects.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Node {
    pub id: usize,
    pub label: String,
    pub group: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Link {
    pub source: usize,
    pub target: usize,
    pub value: f32,
}

/// The column nodes are grouped by: the requested one if it exists, else the first column asking
/// how something makes you feel, else the first column.
fn group_column(table: &EmbeddingTable, requested: Option<&str>) -> Option<usize> {
    if let Some(name) = requested {
        match table.columns.iter().position(|col| col == name) {
            Some(i) => return Some(i),
            None => tracing::warn!("no column {name:?} to group by, using default"),
        }
    }
    table
        .columns
        .iter()
        .position(|col| col.to_lowercase().contains("feel"))
        .or_else(|| (!table.columns.is_empty()).then_some(0))
}

/// Link each row to its nearest neighbours.
pub fn build_graph(table: &EmbeddingTable, options: &GraphOptions) -> Graph {
    let group = group_column(table, options.group_by.as_deref());
    let nodes = table
        .rows
        .iter()
        .map(|row| {
            let label = row
                .values
                .iter()
                .find(|value| !value.is_empty())
                .cloned()
                .unwrap_or_else(|| format!("row {}", row.key));
            let group = group
                .and_then(|i| row.values.get(i))
                .filter(|value| !value.is_empty())
                .cloned()
                .unwrap_or_else(|| "unknown".into());
            Node {
                id: row.key,
                label,
                group,
                text: row.text.clone(),
            }
        })
        .collect();

    // Undirected edges, keyed by (lower index, higher index).
    let mut edges: BTreeMap<(usize, usize), f32> = BTreeMap::new();
    for (i, row) in table.rows.iter().enumerate() {
        let mut candidates = table
            .rows
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .map(|(j, other)| (j, cosine_similarity(&row.embedding, &other.embedding)))
            .filter(|&(_, similarity)| similarity >= options.min_similarity)
            .collect::<Vec<_>>();
        candidates.sort_by(|(a, x), (b, y)| y.total_cmp(x).then_with(|| a.cmp(b)));
        for (j, similarity) in candidates.into_iter().take(options.neighbors) {
            edges.insert((i.min(j), i.max(j)), similarity);
        }
    }

    let links = edges
        .into_iter()
        .map(|((a, b), value)| Link {
            source: table.rows[a].key,
            target: table.rows[b].key,
            value,
        })
        .collect::<Vec<_>>();
    tracing::info!(
        "built graph with {} nodes and {} links",
        table.rows.len(),
        links.len()
    );
    Graph { nodes, links }
}

/// Render the embeddings in `item` as an interactive graph page.
pub fn create_embeddings_graph_view(
    ws: &Workspace,
    item: &Item,
    style: Style,
    options: &GraphOptions,
) -> Result<Item, Error> {
    let table = EmbeddingTable::load(ws, item)?;
    let graph = build_graph(&table, options);

    let mut view = item.derived_copy(format!("{}_graph_{style}", item.title), Format::Html);
    let page = render_html(&graph, style, &view.title)?;
    let target = ws.target_path_for(&view);
    fs::write(&target, page).with_context(|| format!("unable to write {}", target.display()))?;
    ws.save(&mut view)?;
    Ok(view)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::embed::EmbeddedRow;

    fn row(key: usize, values: &[&str], embedding: &[f32]) -> EmbeddedRow {
        EmbeddedRow {
            key,
            values: values.iter().map(|value| value.to_string()).collect(),
            text: format!("row {key}"),
            embedding: embedding.to_vec(),
        }
    }

    fn table() -> EmbeddingTable {
        EmbeddingTable {
            embedder: "test".into(),
            columns: vec!["Gender".into(), "How does AI make you feel?".into()],
            rows: vec![
                row(0, &["female", "excited"], &[1.0, 0.0, 0.0]),
                row(1, &["male", "excited"], &[0.9, 0.1, 0.0]),
                row(2, &["", ""], &[0.8, 0.2, 0.0]),
                row(3, &["male", "concerned"], &[0.0, 0.0, 1.0]),
            ],
        }
    }

    #[test]
    fn test_style() {
        assert_eq!(Style::default(), Style::ThreeD);
        assert_eq!(Style::TwoD.to_string(), "2d");
        assert_eq!("3D".parse::<Style>().unwrap(), Style::ThreeD);
        assert_eq!("2d".parse::<Style>().unwrap(), Style::TwoD);
        "4d".parse::<Style>().unwrap_err();
    }

    #[test]
    fn test_nodes() {
        let graph = build_graph(&table(), &GraphOptions::default());
        let groups = graph
            .nodes
            .iter()
            .map(|node| node.group.as_str())
            .collect::<Vec<_>>();
        assert_eq!(groups, ["excited", "excited", "unknown", "concerned"]);
        assert_eq!(graph.nodes[0].label, "female");
        assert_eq!(graph.nodes[2].label, "row 2");
        assert_eq!(graph.nodes[3].text, "row 3");

        let options = GraphOptions {
            group_by: Some("Gender".into()),
            ..Default::default()
        };
        let graph = build_graph(&table(), &options);
        assert_eq!(graph.nodes[0].group, "female");
    }

    #[test]
    fn test_links() {
        let graph = build_graph(&table(), &GraphOptions::default());
        let pairs = graph
            .links
            .iter()
            .map(|link| (link.source, link.target))
            .collect::<Vec<_>>();
        // Row 3 points elsewhere entirely and stays unlinked.
        assert_eq!(pairs, [(0, 1), (0, 2), (1, 2)]);
        assert!(graph.links.iter().all(|link| link.value >= 0.3));

        // With a single neighbour, each node links only to its closest peer.
        let options = GraphOptions {
            neighbors: 1,
            ..Default::default()
        };
        let graph = build_graph(&table(), &options);
        let pairs = graph
            .links
            .iter()
            .map(|link| (link.source, link.target))
            .collect::<Vec<_>>();
        assert_eq!(pairs, [(0, 1), (1, 2)]);

        let options = GraphOptions {
            min_similarity: 1.5,
            ..Default::default()
        };
        assert!(build_graph(&table(), &options).links.is_empty());
    }

    #[test]
    fn test_create_view() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        let mut item = Item::new("rows_embeddings", Format::Json);
        fs::write(
            ws.target_path_for(&item),
            serde_json::to_string(&table()).unwrap(),
        )
        .unwrap();
        ws.save(&mut item).unwrap();

        let view = create_embeddings_graph_view(&ws, &item, Style::TwoD, &Default::default())
            .unwrap();
        assert_eq!(view.title, "rows_embeddings_graph_2d");
        assert_eq!(view.format, Format::Html);
        let path = ws.path_of(&view).unwrap();
        assert_eq!(path, ws.root().join("exports/rows_embeddings_graph_2d.html"));
        let page = fs::read_to_string(path).unwrap();
        assert!(page.contains("ForceGraph()"));
    }
}
