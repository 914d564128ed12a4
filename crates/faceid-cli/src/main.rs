use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use faceid_core::{Enrollment, FaceEmbedder, FaceMatcher};
use std::path::PathBuf;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "faceid", about = "Faceid on-device face recognition session runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an identification session over a sequence of face-crop images
    Identify {
        /// Face-crop image files, processed in order
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Enroll the first unmatched face under this label
        #[arg(short, long)]
        label: Option<String>,
        /// Record id used when enrolling
        #[arg(long, default_value = "0")]
        id: String,
        /// Extra JSON payload stored on the enrolled record
        #[arg(long)]
        extra: Option<String>,
    },
    /// Load the model artifacts and print their metadata
    Inspect,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Identify { images, label, id, extra } => {
            run_session(&config, &images, label, id, extra)?;
        }
        Commands::Inspect => {
            let embedder = FaceEmbedder::load(&config.model_path(), &config.labels_path())?;
            println!("model:     {}", config.model_path());
            println!("labels:    {} ({} entries)", config.labels_path(), embedder.labels().len());
            println!("embedding: {} dimensions", faceid_core::EMBEDDING_DIM);
            println!("threshold: {}", config.match_threshold);
        }
    }

    Ok(())
}

/// Replay the per-frame recognition loop over image files: one enrollment
/// session, first clear sighting of an unmatched face enrolls it, later
/// crops match against the gallery.
fn run_session(
    config: &Config,
    images: &[PathBuf],
    label: Option<String>,
    id: String,
    extra: Option<String>,
) -> Result<()> {
    let embedder = FaceEmbedder::load(&config.model_path(), &config.labels_path())?;
    let matcher = FaceMatcher::new(embedder, config.match_threshold);

    let mut session = match label {
        Some(label) => {
            let payload = match extra {
                Some(raw) => serde_json::from_str(&raw).context("parsing --extra as JSON")?,
                None => serde_json::json!({ "source": "faceid-cli" }),
            };
            Some(Enrollment::new(id, label).with_extra(payload))
        }
        None => None,
    };

    for path in images {
        let crop = match image::open(path) {
            Ok(img) => img,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable image");
                continue;
            }
        };

        match matcher.identify(&crop, session.as_mut()) {
            Ok(result) => {
                let [r, g, b] = result.color();
                println!(
                    "{}: {} (known: {}, color: #{r:02x}{g:02x}{b:02x})",
                    path.display(),
                    result.overlay_label(),
                    result.is_known,
                );
            }
            // A failed extraction skips this frame; the next one retries.
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping frame");
            }
        }
    }

    println!(
        "session done: {} identit{} in gallery",
        matcher.gallery().len(),
        if matcher.gallery().len() == 1 { "y" } else { "ies" },
    );

    Ok(())
}
