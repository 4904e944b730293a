use anyhow::{Context, bail};
use capture::{BackendKind, CameraSessionManager, Facing, Readiness};
use clap::{Parser, Subcommand};
use common::{TelemetryGuard, poll_until, setup_logging};
use recognition::RecognitionClient;
use scanner::render::{render_search, render_view};
use scanner::{LoggingMealPlan, Pick, ScanController, ScanPhase, ScannerConfig, UploadFile};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "scanner", version, about = "Recognise food from a photo or a camera still")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze an image file
    Analyze {
        image: PathBuf,
        /// Add the Nth result (1-based) to the meal plan
        #[arg(long)]
        add: Option<usize>,
    },
    /// Take a still from the camera and analyze it
    Camera {
        /// Preferred facing, the opposite one is tried if it fails
        #[arg(long)]
        facing: Option<Facing>,
        /// Use the virtual test-pattern camera
        #[arg(long = "virtual")]
        use_virtual: bool,
        #[arg(long)]
        add: Option<usize>,
    },
    /// Search foods by name
    Search {
        query: String,
        #[arg(long)]
        add: Option<usize>,
    },
    /// Check that the recognition service answers
    Health,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ScannerConfig::from_env()?;

    // Current-thread runtime: every controller command runs on this one task.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;

    runtime.block_on(run(cli, config))
}

async fn run(cli: Cli, config: ScannerConfig) -> anyhow::Result<()> {
    let _telemetry = match config.otel_endpoint.as_deref() {
        Some(endpoint) => Some(TelemetryGuard::init(
            "scanner",
            endpoint,
            config.environment,
            &config.log_level,
        )?),
        None => {
            setup_logging(config.environment, &config.log_level)?;
            None
        }
    };

    tracing::info!(
        environment = config.environment.as_str(),
        base_url = %config.recognition.base_url,
        "Scanner starting"
    );

    let client =
        RecognitionClient::new(&config.recognition).context("Failed to build HTTP client")?;

    if let Command::Health = cli.command {
        let text = client.health().await?;
        println!("Backend is working: {text}");
        return Ok(());
    }

    let mut camera_config = config.camera.clone();
    if let Command::Camera { use_virtual: true, .. } = cli.command {
        camera_config.backend = BackendKind::Virtual;
    }
    let camera = CameraSessionManager::with_resolution(
        camera_config.backend()?,
        camera_config.ideal_width,
        camera_config.ideal_height,
    );
    let controller = ScanController::new(Arc::new(client), camera, Arc::new(LoggingMealPlan));

    match cli.command {
        Command::Analyze { image, add } => {
            let upload = UploadFile::from_path(&image)?;
            controller.select_upload(upload)?;
            if controller.phase() != ScanPhase::HasCapture {
                print!("{}", render_view(&controller.view()));
                bail!("{} was not accepted", image.display());
            }
            analyze_and_report(&controller, add).await
        }
        Command::Camera { facing, add, .. } => {
            let facing = facing.unwrap_or(camera_config.preferred_facing);
            if controller.open_camera(facing).await? == ScanPhase::Error {
                print!("{}", render_view(&controller.view()));
                bail!("camera could not be opened");
            }

            let ready = poll_until(
                || controller.refresh_camera() == Some(Readiness::ActiveReady),
                camera_config.ready_poll(),
                camera_config.ready_timeout(),
                "camera ready",
            )
            .await;
            if !ready {
                controller.close_camera()?;
                bail!("camera did not become ready within {} ms", camera_config.ready_timeout_ms);
            }

            if controller.capture().await? != ScanPhase::HasCapture {
                print!("{}", render_view(&controller.view()));
                controller.close_camera()?;
                bail!("no still captured");
            }
            analyze_and_report(&controller, add).await
        }
        Command::Search { query, add } => {
            controller.search(&query).await?;
            let view = controller.view();
            print!("{}", render_search(&view.search));
            if let Some(n) = add {
                add_to_plan(&controller, Pick::Search(n.saturating_sub(1)))?;
            }
            Ok(())
        }
        Command::Health => Ok(()),
    }
}

async fn analyze_and_report(controller: &ScanController, add: Option<usize>) -> anyhow::Result<()> {
    let phase = controller.analyze().await?;
    print!("{}", render_view(&controller.view()));
    if phase == ScanPhase::Error {
        bail!("analysis failed");
    }
    if let Some(n) = add {
        add_to_plan(controller, Pick::Analysis(n.saturating_sub(1)))?;
    }
    controller.reset();
    Ok(())
}

fn add_to_plan(controller: &ScanController, pick: Pick) -> anyhow::Result<()> {
    controller.add_to_meal_plan(pick)?;
    if let Some(notice) = controller.view().notice {
        println!("{notice}");
    }
    Ok(())
}
