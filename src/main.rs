use clap::{Parser, Subcommand};
use std::path::PathBuf;

use axiplan::action::Job;
use axiplan::config::{load_config, Config};
use axiplan::driver::{self, Command, Device, Event, MockDevice, SerialDevice};
use axiplan::geom::Point;

#[derive(Debug, Parser)]
#[command(name = "axiplan", about = "Pen plotter motion planner and driver")]
struct Cli {
    /// Path to a plotter.toml config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Plan a drawing (a JSON array of polylines in inches) into a job file.
    Plan {
        infile: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        overwrite: bool,
    },
    /// Print the action count and estimated duration of a job file.
    Info { file: PathBuf },
    /// Stream a job file to the device.
    Plot {
        file: PathBuf,
        #[arg(long)]
        mock: bool,
    },
    /// Issue a single manual command against the device.
    Manual {
        #[arg(value_enum)]
        cmd: ManualCommand,
        #[arg(long)]
        mock: bool,
    },
    /// Run the HTTP control surface.
    Server {
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[arg(long)]
        mock: bool,
    },
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum ManualCommand {
    PenUp,
    PenDown,
}

fn load_config_or_default(path: &Option<PathBuf>) -> Result<Config, Box<dyn std::error::Error>> {
    match path {
        Some(p) => Ok(load_config(p)?),
        None => Ok(Config::default()),
    }
}

async fn open_device(
    config: &Config,
    mock: bool,
) -> Result<Box<dyn Device>, Box<dyn std::error::Error>> {
    if mock {
        Ok(Box::new(MockDevice::default()))
    } else {
        Ok(Box::new(SerialDevice::open(&config.device).await?))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let cli = Cli::parse();
    let config = load_config_or_default(&cli.config)?;

    match cli.command {
        Commands::Plan {
            infile,
            out,
            overwrite,
        } => {
            let text = std::fs::read_to_string(&infile)?;
            let drawing: Vec<Vec<Point>> = serde_json::from_str(&text)?;
            let filename = infile.file_name().map(|s| s.to_string_lossy().into_owned());
            let job = axiplan::plan::plan_job(&drawing, &config, filename)?;

            let out_path = out.unwrap_or_else(|| infile.with_extension("job.json"));
            if out_path.exists() && !overwrite {
                return Err(format!("{} already exists; pass --overwrite", out_path.display()).into());
            }
            job.save(&out_path)?;
            tracing::info!(path = %out_path.display(), actions = job.actions.len(), "wrote job file");
        }
        Commands::Info { file } => {
            let job = Job::load(&file)?;
            println!("actions: {}", job.actions.len());
            println!("estimated duration: {:.2}s", job.duration().as_secs_f64());
        }
        Commands::Plot { file, mock } => {
            let job = Job::load(&file)?;
            let device = open_device(&config, mock).await?;
            let (cmd_tx, mut events) = driver::spawn(device, config.clone());

            println!("loaded {} actions, press enter to start plotting...", job.actions.len());
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;

            let (tx, rx) = tokio::sync::oneshot::channel();
            cmd_tx.send(Command::Start { job, respond_to: tx }).await?;
            rx.await??;

            while let Ok(event) = events.recv().await {
                match event {
                    Event::StateChanged(state) => {
                        tracing::info!(action = state.action_index, total = state.total_actions, "progress");
                    }
                    Event::Completed { actual_ms } => {
                        println!("plot complete in {actual_ms}ms");
                        break;
                    }
                    Event::Error(e) => {
                        return Err(e.into());
                    }
                }
            }
        }
        Commands::Manual { cmd, mock } => {
            let device = open_device(&config, mock).await?;
            let (cmd_tx, _events) = driver::spawn(device, config.clone());
            let (tx, rx) = tokio::sync::oneshot::channel();
            let up = matches!(cmd, ManualCommand::PenUp);
            cmd_tx.send(Command::ManualPen { up, respond_to: tx }).await?;
            rx.await??;
        }
        Commands::Server { port, mock } => {
            let device = open_device(&config, mock).await?;
            let (cmd_tx, _events) = driver::spawn(device, config.clone());
            let app = axiplan::web::api::create_router(cmd_tx);
            let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
            tracing::info!(port, "control surface listening");
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
