//! The Global AI Dialogues participants table.

use crate::{
    cleanup::{simplify_csv, simplify_sentiment, Transformation},
    workspace::{Format, Item, Workspace},
};
use anyhow::Error;

/// The AI sentiment question, whose answers are collapsed by [`simplify_sentiment`].
pub const SENTIMENT_COLUMN: &str =
    "Overall, would you say the increased use of artificial intelligence (AI) in daily life makes you feel…";

/// The survey questions kept in the simplified table, in output order.
pub const TARGET_COLUMNS: [&str; 6] = [
    SENTIMENT_COLUMN,
    "What do you think your life might be like in 30 years? Alt: Imagine life 30 years from now. What's the biggest difference you notice in daily life compared to today? (English)",
    "What is your gender?",
    "How old are you?",
    "What country or region do you most identify with?",
    "What religious group or faith do you most identify with?",
];

/// Title of the simplified participants item.
pub const SIMPLIFIED_TITLE: &str = "participants_simple";

/// Per-column rewrites applied while simplifying.
pub fn column_transformations() -> Vec<(&'static str, Transformation)> {
    vec![(SENTIMENT_COLUMN, simplify_sentiment as Transformation)]
}

/// Clean up the raw participants table in `item`, keeping at most `max_rows` rows.
pub fn simplify_participants(
    ws: &Workspace,
    item: &Item,
    max_rows: usize,
) -> Result<Item, Error> {
    let input = ws.path_of(item)?;

    let mut simplified = item.derived_copy(SIMPLIFIED_TITLE, Format::Csv);
    let target = ws.target_path_for(&simplified);
    tracing::warn!("simplifying data to {}", target.display());

    let report = simplify_csv(
        &input,
        &target,
        &TARGET_COLUMNS,
        max_rows,
        &column_transformations(),
    )?;
    tracing::debug!(?report, "simplified participants");
    ws.save(&mut simplified)?;

    tracing::warn!("simplified data: {simplified}");
    Ok(simplified)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cleanup::Table;
    use crate::source::LocalClient;
    use std::fs;

    #[async_std::test]
    async fn test_simplify_participants() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("particpants.csv");
        let mut writer = csv::Writer::from_path(&input).unwrap();
        writer
            .write_record(["Participant Id", SENTIMENT_COLUMN, "How old are you?"])
            .unwrap();
        writer
            .write_record(["p1", "More excited than concerned", "18-25"])
            .unwrap();
        writer
            .write_record(["p2", "More concerned than excited", "26-35"])
            .unwrap();
        writer.write_record(["p3", "", "36-45"]).unwrap();
        writer.flush().unwrap();
        drop(writer);

        let ws = Workspace::open(dir.path().join("ws")).unwrap();
        let raw = ws
            .import(&LocalClient, &input.display().to_string(), false)
            .await
            .unwrap();
        let simple = simplify_participants(&ws, &raw, 2).unwrap();
        assert_eq!(simple.title, SIMPLIFIED_TITLE);
        assert_eq!(simple.derived_from, raw.store_path);

        let text = fs::read_to_string(ws.path_of(&simple).unwrap()).unwrap();
        let meta = crate::cleanup::sniff_csv_text(&text).unwrap();
        let table = Table::parse(&text, &meta).unwrap();
        assert_eq!(table.columns, [SENTIMENT_COLUMN, "How old are you?"]);
        assert_eq!(
            table.rows,
            [
                [Some("excited".to_string()), Some("18-25".to_string())],
                [Some("concerned".to_string()), Some("26-35".to_string())],
            ]
        );
    }
}
