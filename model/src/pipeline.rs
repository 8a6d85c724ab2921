//! The end-to-end visualization pipeline.

use crate::{
    embed::{embed_table_rows, Embedder},
    graph::{create_embeddings_graph_view, GraphOptions, Style},
    participants::simplify_participants,
    source::Source,
    workspace::Workspace,
};
use anyhow::Error;
use std::path::{Path, PathBuf};

/// Settings for [`create_viz`].
#[derive(Clone, Debug, PartialEq)]
pub struct VizOptions {
    pub style: Style,
    /// Rows to keep from the dataset; `0` keeps all of them.
    pub max_rows: usize,
    /// Download the data again even if the workspace already has it.
    pub refresh: bool,
    pub graph: GraphOptions,
}

impl Default for VizOptions {
    fn default() -> Self {
        Self {
            style: Style::default(),
            max_rows: 500,
            refresh: false,
            graph: GraphOptions::default(),
        }
    }
}

/// Fetch, clean up, embed and graph the participants table at `location`.
///
/// All intermediate items are kept in the workspace at `ws_path`. Returns the absolute path of
/// the final HTML page.
pub async fn create_viz<S: Source + ?Sized>(
    ws_path: impl AsRef<Path>,
    source: &S,
    location: &str,
    embedder: &dyn Embedder,
    options: &VizOptions,
) -> Result<PathBuf, Error> {
    let ws = Workspace::open(ws_path)?;
    ws.log_info();

    tracing::warn!("fetching data: {location}");
    let orig_data = ws.import(source, location, options.refresh).await?;
    tracing::warn!("original data: {orig_data}");

    let simpler_data = simplify_participants(&ws, &orig_data, options.max_rows)?;

    let embedding_data = embed_table_rows(&ws, &simpler_data, embedder).await?;
    tracing::warn!("embeddings: {embedding_data}");

    let view = create_embeddings_graph_view(&ws, &embedding_data, options.style, &options.graph)?;
    let output = ws.path_of(&view)?;
    tracing::warn!("final output file: {}", output.display());
    Ok(output)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        embed::{EmbeddingTable, HashingEmbedder},
        participants::{SENTIMENT_COLUMN, TARGET_COLUMNS},
        source::LocalClient,
        workspace::Item,
    };
    use std::fs;

    fn write_participants(path: &Path, rows: usize) {
        let mut text = String::from("Global AI Dialogues participants\nexported 2024-09-30\n");
        let mut writer = csv::Writer::from_writer(vec![]);
        writer
            .write_record(std::iter::once("Participant Id").chain(TARGET_COLUMNS))
            .unwrap();
        let feelings = [
            "More excited than concerned",
            "More concerned than excited",
            "Equally concerned and excited",
        ];
        for i in 0..rows {
            writer
                .write_record([
                    format!("p{i}"),
                    feelings[i % 3].to_string(),
                    format!("Life in 30 years, take {i}"),
                    ["Female", "Male"][i % 2].to_string(),
                    "26-35".to_string(),
                    ["Kenya", "Brazil", "India"][i % 3].to_string(),
                    "None".to_string(),
                ])
                .unwrap();
        }
        text.push_str(&String::from_utf8(writer.into_inner().unwrap()).unwrap());
        fs::write(path, text).unwrap();
    }

    #[async_std::test]
    async fn test_create_viz() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("particpants.csv");
        write_participants(&input, 12);
        let ws_path = dir.path().join("workspace");

        let options = VizOptions {
            style: Style::TwoD,
            max_rows: 10,
            ..Default::default()
        };
        let output = create_viz(
            &ws_path,
            &LocalClient,
            &input.display().to_string(),
            &HashingEmbedder::default(),
            &options,
        )
        .await
        .unwrap();

        let ws = Workspace::open(&ws_path).unwrap();
        assert_eq!(
            output,
            ws.root()
                .join("exports/participants_simple_embeddings_graph_2d.html")
        );
        let page = fs::read_to_string(&output).unwrap();
        assert!(page.contains("ForceGraph()"));
        assert!(page.contains("10 rows"));

        let mut titles = ws
            .items()
            .into_iter()
            .map(|item| item.title)
            .collect::<Vec<_>>();
        titles.sort();
        assert_eq!(
            titles,
            [
                "participants_simple",
                "participants_simple_embeddings",
                "participants_simple_embeddings_graph_2d",
                "particpants",
            ]
        );

        let embeddings = ws
            .items()
            .into_iter()
            .find(|item: &Item| item.title == "participants_simple_embeddings")
            .unwrap();
        let table = EmbeddingTable::load(&ws, &embeddings).unwrap();
        assert_eq!(table.columns, TARGET_COLUMNS);
        assert_eq!(table.rows.len(), 10);
        assert_eq!(table.columns[0], SENTIMENT_COLUMN);
        assert_eq!(table.rows[0].values[0], "excited");
        assert_eq!(table.rows[1].values[0], "concerned");
        assert_eq!(table.rows[2].values[0], "neutral");
    }
}
