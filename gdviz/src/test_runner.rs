#![cfg(test)]

//! End-to-end runs of the `gdviz` command against small local datasets.
//!
//! Each case is a command line. The runner serves a synthetic participants table over HTTP, runs
//! every case in its own workspace, and checks that a graph page of the requested style comes out
//! the other end. Results are reported together, so one failing case doesn't hide the others.

use super::Options;
use ansi_term::Color;
use anyhow::Error;
use clap::Parser;
use futures::future::join_all;
use gdviz_model::{
    embed::EmbedderKind, graph::Style, logging::LogLevel, source::PARTICIPANTS_URL, testing,
};
use std::fmt::{self, Display, Formatter};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const SENTIMENT: &str =
    "Overall, would you say the increased use of artificial intelligence (AI) in daily life makes you feel…";

/// A small participants table with a line of preamble, in the shape of the real export.
fn participants_csv() -> String {
    let mut csv = String::from("Global AI Dialogues - participants\n");
    csv.push_str(&format!(
        "Participant Id,\"{SENTIMENT}\",What is your gender?,How old are you?\n"
    ));
    let feelings = [
        "More excited than concerned",
        "More concerned than excited",
        "Equally concerned and excited",
    ];
    for i in 0..30 {
        csv.push_str(&format!(
            "p{i},{},{},{}\n",
            feelings[i % 3],
            ["Female", "Male"][i % 2],
            ["18-25", "26-35", "36-45", "46-55"][i % 4]
        ));
    }
    csv
}

#[derive(Clone, Debug)]
struct TestCase {
    name: &'static str,
    args: Vec<String>,
    style: Style,
    rows: usize,
}

impl TestCase {
    fn new(name: &'static str, args: &[&str], style: Style, rows: usize) -> Self {
        Self {
            name,
            args: args.iter().map(|arg| arg.to_string()).collect(),
            style,
            rows,
        }
    }

    async fn run(self, base_url: String, input: String) -> TestResult {
        TestResult {
            name: self.name,
            failure: self.do_test(base_url, input).await.err(),
        }
    }

    async fn do_test(&self, base_url: String, input: String) -> Result<(), Error> {
        let ws = TempDir::new()?;
        let args = self.args.iter().map(|arg| {
            arg.replace("{URL}", &format!("{base_url}/particpants.csv"))
                .replace("{INPUT}", &input)
        });
        let opt = Options::try_parse_from(
            ["gdviz", "--workspace", &ws.path().display().to_string()]
                .into_iter()
                .map(String::from)
                .chain(args),
        )?;

        let output = opt.run().await?;
        check_output(&output, self.style, self.rows)
    }
}

fn check_output(path: &Path, style: Style, rows: usize) -> Result<(), Error> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let expected = format!("participants_simple_embeddings_graph_{style}.html");
    if name != expected {
        return Err(Error::msg(format!("expected output {expected}, got {name}")));
    }

    let page = fs::read_to_string(path)?;
    if !page.contains(style.library_url()) {
        return Err(Error::msg(format!(
            "page does not load {}",
            style.library_url()
        )));
    }
    let legend = format!("{rows} rows");
    if !page.contains(&legend) {
        return Err(Error::msg(format!("page legend does not mention {legend:?}")));
    }
    Ok(())
}

struct TestResult {
    name: &'static str,
    failure: Option<Error>,
}

impl TestResult {
    fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

impl Display for TestResult {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}...", self.name)?;
        if let Some(err) = &self.failure {
            writeln!(f, "{}", Color::Red.paint("FAILED"))?;
            write!(f, "{err:#}")?;
        } else {
            write!(f, "{}", Color::Green.paint("OK"))?;
        }
        Ok(())
    }
}

async fn serve_participants() -> Result<String, Error> {
    let mut app = tide::new();
    app.at("/particpants.csv")
        .get(|_| async { Ok(participants_csv()) });
    testing::serve(app).await
}

#[async_std::test]
async fn gdviz_end_to_end_cases() -> Result<(), Error> {
    gdviz_model::init_logging(LogLevel::Info);

    let data = TempDir::new()?;
    let input = data.path().join("particpants.csv");
    fs::write(&input, participants_csv())?;
    let input = input.display().to_string();

    let base_url = serve_participants().await?;

    let cases = [
        TestCase::new("defaults_local_file", &["--input", "{INPUT}"], Style::ThreeD, 30),
        TestCase::new(
            "2d_local_file_truncated",
            &["--input", "{INPUT}", "--style", "2d", "--rows", "10"],
            Style::TwoD,
            10,
        ),
        TestCase::new(
            "http_download",
            &["--url", "{URL}", "--rows", "0", "--quiet"],
            Style::ThreeD,
            30,
        ),
        TestCase::new(
            "http_download_sparse_graph",
            &[
                "--url",
                "{URL}",
                "--style",
                "2D",
                "--neighbors",
                "1",
                "--min-similarity",
                "0.9",
                "--refresh",
            ],
            Style::TwoD,
            30,
        ),
    ];

    let results = join_all(
        cases
            .into_iter()
            .map(|case| case.run(base_url.clone(), input.clone())),
    )
    .await;
    for result in &results {
        println!("{}", result);
    }
    if results.iter().any(TestResult::failed) {
        Err(Error::msg(format!("{}", Color::Red.paint("tests failed"))))
    } else {
        println!("All test cases passed.");
        Ok(())
    }
}

#[test]
fn test_default_options() {
    let opt = Options::try_parse_from(["gdviz"]).unwrap();
    assert_eq!(opt.logging.level(), LogLevel::Warning);
    assert_eq!(opt.style, Style::ThreeD);
    assert_eq!(opt.rows, 500);
    assert_eq!(opt.url.as_str(), PARTICIPANTS_URL);
    assert_eq!(opt.embedder, EmbedderKind::Hashing);
    assert_eq!(opt.input, None);
    assert!(!opt.refresh && !opt.open);
}

#[test]
fn test_flags() {
    let opt = Options::try_parse_from([
        "gdviz",
        "--quiet",
        "--debug",
        "--style",
        "2d",
        "--rows",
        "0",
        "--embedder",
        "openai",
    ])
    .unwrap();
    assert_eq!(opt.logging.level(), LogLevel::Error);
    assert_eq!(opt.style, Style::TwoD);
    assert_eq!(opt.rows, 0);
    assert_eq!(opt.embedder, EmbedderKind::OpenAi);

    Options::try_parse_from(["gdviz", "--style", "4d"]).unwrap_err();
}

#[test]
fn test_openai_requires_key() {
    let mut opt = Options::try_parse_from(["gdviz", "--embedder", "openai"]).unwrap();
    opt.openai.api_key = None;
    let err = opt.embedder().err().unwrap();
    assert!(err.to_string().contains("API key is required"), "{err}");
}
