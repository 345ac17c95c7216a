// Banana - Academic figure generation with retrieval, planning and critique
// Main entry point

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use banana::config::{load_settings, Settings, SettingsOverrides};
use banana::data::{load_plot_data, plot_context};
use banana::evaluation::{format_scores, summarize_batch, Judge};
use banana::pipeline::{GenerationOutput, GenerationRequest, Pipeline, ProgressEvent, RunHooks};
use banana::prompts::PromptLibrary;
use banana::providers::create_vision_model;
use banana::server::{serve, AppState};

#[derive(Parser)]
#[command(name = "banana")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generate publication-ready methodology diagrams and statistical plots", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root directory for run outputs
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct ProviderArgs {
    #[arg(long)]
    vlm_provider: Option<String>,
    #[arg(long)]
    vlm_model: Option<String>,
    #[arg(long)]
    image_provider: Option<String>,
    #[arg(long)]
    image_model: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a methodology diagram from paper text
    Generate {
        /// File containing the methodology section
        #[arg(short, long)]
        input: PathBuf,

        /// Figure caption describing what the diagram should convey
        #[arg(short, long)]
        caption: String,

        /// Copy the final image here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Maximum visualize/critique rounds
        #[arg(long)]
        iterations: Option<u32>,

        #[command(flatten)]
        providers: ProviderArgs,
    },

    /// Generate a statistical plot from CSV or JSON data
    Plot {
        /// CSV (with header row) or JSON data file
        #[arg(short, long)]
        data: PathBuf,

        /// What the plot should communicate
        #[arg(long)]
        intent: String,

        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        iterations: Option<u32>,

        #[command(flatten)]
        providers: ProviderArgs,
    },

    /// Compare generated figures against a human reference
    Evaluate {
        /// One or more generated images
        #[arg(short, long, num_args = 1.., required = true)]
        generated: Vec<PathBuf>,

        /// Human-drawn reference image
        #[arg(short, long)]
        reference: PathBuf,

        /// File containing the source text
        #[arg(long)]
        context: PathBuf,

        #[arg(short, long)]
        caption: String,

        #[command(flatten)]
        providers: ProviderArgs,
    },

    /// Run the HTTP API
    Serve {
        /// Listen address, e.g. 127.0.0.1:8000
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let globals = Globals {
        config: cli.config,
        output_dir: cli.output_dir,
    };

    match cli.command {
        Commands::Generate {
            input,
            caption,
            output,
            iterations,
            providers,
        } => {
            let source_context = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read input file: {}", input.display()))?;
            let settings = settings_for(&globals, &providers, iterations, None)?;
            let request = GenerationRequest::methodology(source_context, caption);
            let result = run_pipeline(settings, request).await?;
            report(&result, output.as_deref())?;
        }
        Commands::Plot {
            data,
            intent,
            output,
            iterations,
            providers,
        } => {
            let raw_data = load_plot_data(&data)?;
            let settings = settings_for(&globals, &providers, iterations, None)?;
            let request =
                GenerationRequest::statistical_plot(plot_context(&raw_data), intent, Some(raw_data));
            let result = run_pipeline(settings, request).await?;
            report(&result, output.as_deref())?;
        }
        Commands::Evaluate {
            generated,
            reference,
            context,
            caption,
            providers,
        } => {
            let source_context = std::fs::read_to_string(&context)
                .with_context(|| format!("Failed to read context file: {}", context.display()))?;
            let settings = settings_for(&globals, &providers, None, None)?;
            evaluate(&settings, &generated, &reference, &source_context, &caption).await?;
        }
        Commands::Serve { bind } => {
            let settings = settings_for(&globals, &ProviderArgs::default(), None, bind)?;
            let bind = settings.server.bind.clone();
            let pipeline = Arc::new(Pipeline::from_settings(settings)?);
            serve(Arc::new(AppState::new(pipeline)), &bind).await?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("banana=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("banana=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Flags shared by every subcommand.
struct Globals {
    config: Option<PathBuf>,
    output_dir: Option<PathBuf>,
}

fn settings_for(
    globals: &Globals,
    providers: &ProviderArgs,
    iterations: Option<u32>,
    bind: Option<String>,
) -> Result<Settings> {
    let mut settings = load_settings(globals.config.as_deref())?;
    SettingsOverrides {
        vlm_provider: providers.vlm_provider.clone(),
        vlm_model: providers.vlm_model.clone(),
        image_provider: providers.image_provider.clone(),
        image_model: providers.image_model.clone(),
        refinement_iterations: iterations,
        output_dir: globals.output_dir.clone(),
        bind,
    }
    .apply(&mut settings)?;
    Ok(settings)
}

async fn run_pipeline(settings: Settings, request: GenerationRequest) -> Result<GenerationOutput> {
    let pipeline = Pipeline::from_settings(settings)?;

    // Ctrl-C stops the run at its next checkpoint; artifacts so far are kept.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let hooks = RunHooks::new()
        .with_cancel(cancel)
        .with_observer(Arc::new(|event: &ProgressEvent| println!("{}", event)));
    Ok(pipeline.run(&request, &hooks).await?)
}

fn report(result: &GenerationOutput, output: Option<&Path>) -> Result<()> {
    println!();
    println!("Run:        {}", result.metadata.run_id);
    println!("Iterations: {}", result.iterations.len());
    println!("Image:      {}", result.image_path.display());
    if let Some(dir) = result.run_dir() {
        println!("Artifacts:  {}", dir.display());
    }
    if let Some(output) = output {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::copy(&result.image_path, output)
            .with_context(|| format!("Failed to copy image to {}", output.display()))?;
        println!("Copied to:  {}", output.display());
    }
    Ok(())
}

async fn evaluate(
    settings: &Settings,
    generated: &[PathBuf],
    reference: &Path,
    source_context: &str,
    caption: &str,
) -> Result<()> {
    if !reference.exists() {
        bail!("Reference image not found: {}", reference.display());
    }
    let vlm = create_vision_model(settings)?;
    let judge = Judge::new(vlm, PromptLibrary::load(settings.pipeline.prompt_dir.as_deref()));

    let mut results = Vec::with_capacity(generated.len());
    for image in generated {
        let result = judge
            .evaluate(image, reference, source_context, caption)
            .await
            .with_context(|| format!("Evaluation failed for {}", image.display()))?;
        println!("{}", image.display());
        println!("{}", format_scores(&result));
        println!();
        results.push(result);
    }
    if results.len() > 1 {
        println!("{}", summarize_batch(&results));
    }
    Ok(())
}
