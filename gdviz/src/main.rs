use ansi_term::Color;
use anyhow::Error;
use clap::Parser;
use gdviz_model::{
    embed::{Embedder, EmbedderKind, HashingEmbedder, OpenAiOptions},
    graph::{GraphOptions, Style},
    init_logging,
    logging::LoggingOptions,
    pipeline::{create_viz, VizOptions},
    source::{Client, LocalClient, PARTICIPANTS_URL},
};
use std::path::{Path, PathBuf};
use std::process::Command;
use surf::Url;

mod test_runner;

/// Visualize Global AI Dialogues data.
///
/// Downloads the participants table, keeps a handful of survey questions, embeds each participant's
/// answers and writes an interactive similarity graph to the workspace.
#[derive(Clone, Debug, Parser)]
#[clap(name = "gdviz", version)]
struct Options {
    #[clap(flatten)]
    logging: LoggingOptions,

    /// Visualization style, '2d' or '3d'.
    #[clap(long, env = "GDVIZ_STYLE", default_value = "3d")]
    style: Style,

    /// Number of rows to use for visualization (0 = no limit).
    #[clap(long, env = "GDVIZ_ROWS", default_value = "500")]
    rows: usize,

    /// Directory holding downloaded data and generated files.
    #[clap(
        short,
        long,
        env = "GDVIZ_WORKSPACE",
        value_name = "DIR",
        default_value = "workspace"
    )]
    workspace: PathBuf,

    /// URL of the participants CSV.
    #[clap(long, env = "GDVIZ_DATA_URL", default_value = PARTICIPANTS_URL)]
    url: Url,

    /// Read the participants CSV from FILE instead of downloading it.
    #[clap(short, long, env = "GDVIZ_INPUT", value_name = "FILE")]
    input: Option<PathBuf>,

    /// Fetch the data again even if the workspace already has a copy.
    #[clap(long, env = "GDVIZ_REFRESH")]
    refresh: bool,

    /// Embedding backend, 'hashing' (offline) or 'openai'.
    #[clap(long, env = "GDVIZ_EMBEDDER", default_value = "hashing")]
    embedder: EmbedderKind,

    #[clap(flatten)]
    openai: OpenAiOptions,

    /// Similar rows to link each row to.
    #[clap(long, env = "GDVIZ_NEIGHBORS", default_value = "5")]
    neighbors: usize,

    /// Minimum cosine similarity for two rows to be linked.
    #[clap(long, env = "GDVIZ_MIN_SIMILARITY", default_value = "0.3")]
    min_similarity: f32,

    /// Open the result in the system's default viewer.
    #[clap(long, env = "GDVIZ_OPEN")]
    open: bool,
}

impl Options {
    fn viz(&self) -> VizOptions {
        VizOptions {
            style: self.style,
            max_rows: self.rows,
            refresh: self.refresh,
            graph: GraphOptions {
                neighbors: self.neighbors,
                min_similarity: self.min_similarity,
                group_by: None,
            },
        }
    }

    fn embedder(&self) -> Result<Box<dyn Embedder>, Error> {
        let embedder: Box<dyn Embedder> = match self.embedder {
            EmbedderKind::Hashing => Box::new(HashingEmbedder::default()),
            EmbedderKind::OpenAi => Box::new(self.openai.connect()?),
        };
        Ok(embedder)
    }

    /// Run the whole pipeline, returning the path of the generated page.
    async fn run(&self) -> Result<PathBuf, Error> {
        let viz = self.viz();
        let embedder = self.embedder()?;
        match &self.input {
            Some(path) => {
                create_viz(
                    &self.workspace,
                    &LocalClient,
                    &path.display().to_string(),
                    embedder.as_ref(),
                    &viz,
                )
                .await
            }
            None => {
                create_viz(
                    &self.workspace,
                    &Client::new(),
                    self.url.as_str(),
                    embedder.as_ref(),
                    &viz,
                )
                .await
            }
        }
    }
}

/// Tell the user where the result is, and open it if they asked.
fn show(path: &Path, open: bool) -> Result<(), Error> {
    eprintln!("{}", Color::Green.bold().paint("Visualization ready:"));
    println!("{}", path.display());
    if open {
        let status = opener(path).status()?;
        if !status.success() {
            return Err(Error::msg(format!(
                "unable to open {}: viewer exited with {status}",
                path.display()
            )));
        }
    }
    Ok(())
}

fn opener(path: &Path) -> Command {
    if cfg!(target_os = "macos") {
        let mut cmd = Command::new("open");
        cmd.arg(path);
        cmd
    } else if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", ""]).arg(path);
        cmd
    } else {
        let mut cmd = Command::new("xdg-open");
        cmd.arg(path);
        cmd
    }
}

#[async_std::main]
async fn main() -> Result<(), Error> {
    let opt = Options::parse();
    init_logging(opt.logging.level());

    let output = opt.run().await?;
    show(&output, opt.open)
}
