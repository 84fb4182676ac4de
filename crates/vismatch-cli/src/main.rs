//! CLI for the vismatch visual product matcher.

// CLI binaries need to print user-facing output
#![allow(
    clippy::print_stdout,
    reason = "CLI binary needs stdout for user output"
)]

use eyre::WrapErr as _;

const MODEL_REPO: &str = "Xenova/clip-vit-base-patch32";
const VISION_MODEL_FILE: &str = "onnx/vision_model.onnx";
const TEXT_MODEL_FILE: &str = "onnx/text_model.onnx";
const TOKENIZER_FILE: &str = "tokenizer.json";

const EMBEDDINGS_FILE: &str = "embeddings.json";
const METADATA_FILE: &str = "metadata.json";
const IMAGES_DIR: &str = "images";

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    match args.command {
        Command::Serve {
            data_dir,
            host,
            port,
            model_dir,
        } => {
            serve(&data_dir, &host, port, model_dir.as_deref())?;
        }
        Command::Index {
            images,
            output,
            model_dir,
            verbose,
        } => {
            index(&images, &output, model_dir.as_deref(), verbose)?;
        }
    }

    Ok(())
}

use clap::Parser as _;

#[derive(clap::Parser)]
#[command(name = "vismatch")]
#[command(about = "Visual product matcher - zero-shot category prediction and similarity search")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Load the catalog and run the HTTP matching API
    Serve {
        /// Data directory containing embeddings.json, metadata.json, and images/
        #[arg(short, long, default_value = "data")]
        data_dir: std::path::PathBuf,

        /// Bind host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Bind port
        #[arg(short, long, default_value = "8000")]
        port: u16,

        /// Directory with local CLIP model files (downloads from HuggingFace if omitted)
        #[arg(long)]
        model_dir: Option<std::path::PathBuf>,
    },

    /// Embed a directory of catalog images and write embeddings.json
    Index {
        /// Directory of catalog images (.jpg/.jpeg/.png)
        images: std::path::PathBuf,

        /// Output path for the embedding table
        #[arg(short, long, default_value = "data/embeddings.json")]
        output: std::path::PathBuf,

        /// Directory with local CLIP model files (downloads from HuggingFace if omitted)
        #[arg(long)]
        model_dir: Option<std::path::PathBuf>,

        /// Show verbose output (files being embedded)
        #[arg(short, long)]
        verbose: bool,
    },
}

/// Load the CLIP encoder from a local directory, or download it from
/// HuggingFace.
fn load_encoder(model_dir: Option<&std::path::Path>) -> eyre::Result<vismatch_clip::ClipEncoder> {
    let (vision_path, text_path, tokenizer_path) = match model_dir {
        Some(dir) => (
            dir.join("vision_model.onnx"),
            dir.join("text_model.onnx"),
            dir.join("tokenizer.json"),
        ),
        None => {
            use hf_hub::api::sync::Api;

            eprintln!("Loading CLIP model from {MODEL_REPO}...");

            let api = Api::new().wrap_err("failed to create HuggingFace API client")?;
            let repo = api.model(MODEL_REPO.to_string());

            let vision_path = repo
                .get(VISION_MODEL_FILE)
                .wrap_err("failed to download vision model")?;
            let text_path = repo
                .get(TEXT_MODEL_FILE)
                .wrap_err("failed to download text model")?;
            let tokenizer_path = repo
                .get(TOKENIZER_FILE)
                .wrap_err("failed to download tokenizer")?;
            (vision_path, text_path, tokenizer_path)
        }
    };

    vismatch_clip::ClipEncoder::load(&vision_path, &text_path, &tokenizer_path)
        .wrap_err("failed to load CLIP encoder")
}

fn serve(
    data_dir: &std::path::Path,
    host: &str,
    port: u16,
    model_dir: Option<&std::path::Path>,
) -> eyre::Result<()> {
    let embeddings_path = data_dir.join(EMBEDDINGS_FILE);
    let metadata_path = data_dir.join(METADATA_FILE);
    if !embeddings_path.exists() {
        eyre::bail!(
            "no embedding table at {}, run `vismatch index <images>` first",
            embeddings_path.display()
        );
    }

    let corpus = vismatch_corpus::CorpusStore::load(&embeddings_path, &metadata_path)
        .wrap_err("failed to load corpus")?;
    eprintln!("Loaded {} catalog items", corpus.len());

    let encoder = std::sync::Arc::new(load_encoder(model_dir)?);

    let engine = vismatch_engine::MatchEngine::new(corpus, encoder.as_ref())
        .wrap_err("failed to build match engine")?;
    eprintln!(
        "Built vocabulary with {} categories",
        engine.vocabulary().len()
    );

    let config = vismatch_server::Config {
        host: host.to_string(),
        port,
        image_dir: data_dir.join(IMAGES_DIR),
    };
    let state = vismatch_server::AppState::new(std::sync::Arc::new(engine), encoder);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err("failed to build tokio runtime")?;
    runtime
        .block_on(vismatch_server::serve(config, state))
        .wrap_err("server failed")?;

    Ok(())
}

fn index(
    images: &std::path::Path,
    output: &std::path::Path,
    model_dir: Option<&std::path::Path>,
    verbose: bool,
) -> eyre::Result<()> {
    let encoder = load_encoder(model_dir)?;

    let mut table = std::collections::BTreeMap::<String, Vec<f32>>::new();
    let mut skipped = 0usize;

    for entry in walkdir::WalkDir::new(images) {
        let entry = entry.wrap_err("failed to read directory entry")?;
        let path = entry.path();

        if !entry.file_type().is_file() || !is_image(path) {
            continue;
        }

        let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
            tracing::debug!(?path, "skipping file with non-utf8 name");
            continue;
        };

        let bytes = std::fs::read(path)
            .wrap_err_with(|| format!("failed to read image {}", path.display()))?;

        match encoder.encode_image_bytes(&bytes) {
            Ok(embedding) => {
                table.insert(id.to_string(), embedding);
            }
            Err(e) => {
                tracing::warn!(?path, ?e, "failed to encode image");
                skipped += 1;
                continue;
            }
        }

        if verbose {
            eprintln!("  {id}");
        } else if table.len() % 25 == 0 {
            eprintln!("Embedded {} images...", table.len());
        }
    }

    if table.is_empty() {
        eyre::bail!("no images found under {}", images.display());
    }

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)
            .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string(&table).wrap_err("failed to serialize embedding table")?;
    std::fs::write(output, json)
        .wrap_err_with(|| format!("failed to write {}", output.display()))?;

    println!(
        "Embedded {} images ({skipped} skipped) -> {}",
        table.len(),
        output.display()
    );

    Ok(())
}

fn is_image(path: &std::path::Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("jpg" | "jpeg" | "png")
    )
}
