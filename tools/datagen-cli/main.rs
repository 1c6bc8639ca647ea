use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use gemini_dataset_generator::load_fields;
use gemini_dataset_generator::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Generate a synthetic JSON dataset with Gemini
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Gemini API key (kept in memory only)
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Name of the concept; becomes the top-level key of the dataset
    #[arg(short, long)]
    concept: String,

    /// Free-text context about the concept
    #[arg(short, long, default_value = "")]
    extra_info: String,

    /// Field as name:kind[:meta], kind one of string, number, boolean, image
    #[arg(short, long = "field")]
    fields: Vec<FieldSpec>,

    /// JSON file holding an array of {"name", "type", "meta"} objects
    #[arg(long)]
    fields_file: Option<PathBuf>,

    /// Model to use
    #[arg(long, value_enum, default_value_t = ModelChoice::Flash)]
    model: ModelChoice,

    /// Sampling temperature
    #[arg(long, default_value_t = 0.7)]
    temperature: f32,

    /// Delay of the placeholder image generator, in milliseconds
    #[arg(long, default_value_t = 1000)]
    image_delay_ms: u64,

    /// Write the final dataset to this path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Copy the final dataset to the clipboard
    #[arg(long)]
    copy: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModelChoice {
    Flash,
    Pro,
}

impl From<ModelChoice> for Model {
    fn from(choice: ModelChoice) -> Self {
        match choice {
            ModelChoice::Flash => Model::Gemini25Flash,
            ModelChoice::Pro => Model::Gemini25Pro,
        }
    }
}

/// Prints only the part of the streamed text not yet shown.
#[derive(Default)]
struct TerminalSink {
    printed: Mutex<usize>,
}

impl OutputSink for TerminalSink {
    fn publish(&self, phase: Phase, text: &str) {
        match phase {
            Phase::Streaming => {
                let mut printed = self.printed.lock().unwrap();
                if let Some(delta) = text.get(*printed..) {
                    print!("{delta}");
                    let _ = std::io::stdout().flush();
                }
                *printed = text.len();
            }
            Phase::Enriching => info!("Image field resolved"),
        }
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut fields = match &cli.fields_file {
        Some(path) => load_fields(path)?,
        None => Vec::new(),
    };
    fields.extend(cli.fields.iter().cloned());
    if fields.is_empty() {
        fields.push(FieldSpec::default_id());
    }

    let request = GenerationRequest::new(cli.concept.clone(), fields)
        .with_extra_info(cli.extra_info.clone());

    let client = DatasetClientBuilder::new(cli.api_key.clone())
        .with_model(cli.model.into())
        .with_temperature(cli.temperature)
        .with_image_generator(
            PlaceholderImageGenerator::new()
                .with_delay(Duration::from_millis(cli.image_delay_ms)),
        )
        .build()?;

    let sink = TerminalSink::default();
    let outcome = match client.generate(&request, &sink).await {
        Ok(outcome) => outcome,
        Err(err) => {
            if err.is_retryable() {
                warn!("The model service is busy or rate limited; try again in a moment");
            }
            return Err(err.into());
        }
    };
    println!();

    let pretty = outcome.to_pretty_json();
    if outcome.image_calls > 0 {
        println!("{pretty}");
    }

    info!(
        records = outcome.records(&request.concept_name).len(),
        image_calls = outcome.image_calls,
        elapsed_ms = outcome.elapsed().num_milliseconds(),
        "Done"
    );

    if let Some(path) = &cli.output {
        std::fs::write(path, &pretty)
            .with_context(format!("writing dataset to {}", path.display()))?;
        info!(path = %path.display(), "Dataset written");
    }

    if cli.copy {
        copy_to_clipboard(&pretty);
    }

    Ok(())
}

/// Clipboard failures are logged and otherwise ignored.
fn copy_to_clipboard(text: &str) {
    match arboard::Clipboard::new().and_then(|mut clipboard| clipboard.set_text(text)) {
        Ok(()) => eprintln!("Copied!"),
        Err(err) => error!("Failed to copy text: {err}"),
    }
}
