//! Command-line interface for the uploader.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};

use crate::composer::{
    compose_from_layout, CollectionMode, ComposeOptions, InputLayout, DEFAULT_DEVICE_ID,
};
use crate::config::Config;
use crate::platform::{PlatformClient, PointCloudApi};
use crate::security::InputValidator;
use crate::tutorial::{self, project_type_for, TutorialOptions};
use crate::uploader::{download_first_related_image, download_point_cloud, process_upload_batch};

#[derive(Parser)]
#[command(name = "pcd-uploader")]
#[command(about = "Upload point clouds with context images to an annotation platform", version)]
pub struct Cli {
    /// Extra dotenv file, read before local.env and ~/supervisely.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compose a batch from an input directory and upload it
    Upload {
        /// Directory containing pcd/, img/ and cam_info/
        #[arg(short, long, default_value = "input")]
        input: PathBuf,
        /// Name of the project to create (renamed if taken)
        #[arg(long)]
        project: Option<String>,
        /// Name of the dataset to create
        #[arg(long, default_value = tutorial::DEFAULT_DATASET_NAME)]
        dataset: String,
        /// Upload into an existing dataset instead of creating one
        #[arg(long, conflicts_with = "project")]
        dataset_id: Option<u64>,
        /// Treat the point clouds as ordered episode frames
        #[arg(long)]
        episodes: bool,
        /// Device id written into each context image's metadata
        #[arg(long, default_value = DEFAULT_DEVICE_ID)]
        device_id: String,
        /// Compose and print the plan without uploading
        #[arg(long)]
        dry_run: bool,
    },

    /// Show a point cloud by name or id
    Info {
        /// Dataset to search when looking up by name
        #[arg(long)]
        dataset: Option<u64>,
        #[arg(long, requires = "dataset", conflicts_with = "id")]
        name: Option<String>,
        #[arg(long)]
        id: Option<u64>,
    },

    /// List point clouds in a dataset
    List {
        #[arg(long)]
        dataset: u64,
    },

    /// List context images attached to a point cloud
    Related {
        #[arg(long)]
        id: u64,
    },

    /// Download a point cloud and optionally its first context image
    Download {
        #[arg(long)]
        id: u64,
        /// Target file, or a directory to save under the point cloud name
        #[arg(short, long)]
        output: PathBuf,
        /// Target file or directory for the first context image
        #[arg(long)]
        with_image: Option<PathBuf>,
    },

    /// Remove entities by id
    Remove {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<u64>,
    },

    /// Run the full walkthrough: create, upload, read back, download
    Tutorial {
        #[arg(short, long, default_value = "input")]
        input: PathBuf,
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
        #[arg(long)]
        episodes: bool,
        /// Also remove the uploaded point clouds once the walkthrough is done
        #[arg(long)]
        cleanup: bool,
    },
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<60} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 38 {
            format!("{}...", value.chars().take(35).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<38} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

fn mode_for(episodes: bool) -> CollectionMode {
    if episodes {
        CollectionMode::Episode
    } else {
        CollectionMode::Plain
    }
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG still wins over the -v flags
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    // Dry runs never touch the platform, so they need no credentials.
    if let Commands::Upload {
        input,
        episodes,
        device_id,
        dry_run: true,
        ..
    } = &cli.command
    {
        return cmd_plan(input, *episodes, device_id);
    }

    let config = Config::load(cli.env_file.as_deref()).context("Failed to load configuration")?;
    info!("Using platform at {}", config.server_address);
    let client = PlatformClient::new(&config)?;

    match cli.command {
        Commands::Upload {
            input,
            project,
            dataset,
            dataset_id,
            episodes,
            device_id,
            dry_run: _,
        } => {
            cmd_upload(
                &client, &config, &input, project, &dataset, dataset_id, episodes, device_id,
            )
            .await
        }
        Commands::Info { dataset, name, id } => cmd_info(&client, dataset, name, id).await,
        Commands::List { dataset } => cmd_list(&client, dataset).await,
        Commands::Related { id } => cmd_related(&client, id).await,
        Commands::Download {
            id,
            output,
            with_image,
        } => cmd_download(&client, id, &output, with_image).await,
        Commands::Remove { ids } => cmd_remove(&client, &ids).await,
        Commands::Tutorial {
            input,
            output,
            episodes,
            cleanup,
        } => cmd_tutorial(&client, &config, input, output, episodes, cleanup).await,
    }
}

fn cmd_plan(input: &Path, episodes: bool, device_id: &str) -> anyhow::Result<()> {
    let options = ComposeOptions {
        mode: mode_for(episodes),
        device_id: device_id.to_string(),
    };
    let batch = compose_from_layout(&InputLayout::from_root(input), &options)?;

    println!("DRY RUN: nothing will be uploaded");
    for (pcd, image) in batch.iter() {
        let frame = pcd
            .frame_index
            .map(|i| format!(" [frame {}]", i))
            .unwrap_or_default();
        match image {
            Some(image) => println!("  {}{} <- {}", pcd.name, frame, image.image_name),
            None => println!("  {}{}", pcd.name, frame),
        }
    }

    print_summary(
        "Upload plan",
        &[
            ("Point clouds", batch.len().to_string()),
            ("Context images", batch.image_count().to_string()),
            ("Mode", format!("{:?}", options.mode)),
        ],
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_upload(
    client: &PlatformClient,
    config: &Config,
    input: &Path,
    project: Option<String>,
    dataset: &str,
    dataset_id: Option<u64>,
    episodes: bool,
    device_id: String,
) -> anyhow::Result<()> {
    let options = ComposeOptions {
        mode: mode_for(episodes),
        device_id,
    };
    let batch = compose_from_layout(&InputLayout::from_root(input), &options)?;
    if batch.is_empty() {
        bail!("No point clouds found under {}", input.display());
    }

    let dataset_id = match dataset_id {
        Some(id) => id,
        None => {
            let workspace_id = config.require_workspace_id()?;
            let project_name = project.unwrap_or_else(|| match options.mode {
                CollectionMode::Plain => tutorial::DEFAULT_PROJECT_NAME.to_string(),
                CollectionMode::Episode => tutorial::DEFAULT_EPISODES_PROJECT_NAME.to_string(),
            });
            InputValidator::validate_entity_name(&project_name)?;
            InputValidator::validate_entity_name(dataset)?;

            let project = client
                .create_project_checked(
                    workspace_id,
                    &project_name,
                    project_type_for(options.mode),
                    true,
                )
                .await?;
            println!("Project ID: {}", project.id);

            let dataset = client.create_dataset(project.id, dataset).await?;
            println!("Dataset ID: {}", dataset.id);
            dataset.id
        }
    };

    let result = process_upload_batch(client, dataset_id, &batch).await?;

    print_summary(
        "Upload complete",
        &[
            ("Dataset", dataset_id.to_string()),
            ("Point clouds", result.point_clouds.len().to_string()),
            ("Context images", result.related_images.len().to_string()),
        ],
    );
    Ok(())
}

async fn cmd_info(
    client: &PlatformClient,
    dataset: Option<u64>,
    name: Option<String>,
    id: Option<u64>,
) -> anyhow::Result<()> {
    let info = match (name, id, dataset) {
        (Some(name), _, Some(dataset)) => client
            .get_point_cloud_by_name(dataset, &name)
            .await?
            .with_context(|| format!("No point cloud named '{}' in dataset {}", name, dataset))?,
        (None, Some(id), _) => client.get_point_cloud_by_id(id).await?,
        _ => bail!("Pass either --id or --dataset with --name"),
    };

    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

async fn cmd_list(client: &PlatformClient, dataset: u64) -> anyhow::Result<()> {
    let infos = client.list_point_clouds(dataset).await?;
    for info in &infos {
        match info.frame() {
            Some(frame) => println!("{:>10}  {} [frame {}]", info.id, info.name, frame),
            None => println!("{:>10}  {}", info.id, info.name),
        }
    }
    println!("Dataset contains {} point clouds", infos.len());
    Ok(())
}

async fn cmd_related(client: &PlatformClient, id: u64) -> anyhow::Result<()> {
    let images = client.list_related_images(id).await?;
    println!("{}", serde_json::to_string_pretty(&images)?);
    Ok(())
}

async fn cmd_download(
    client: &PlatformClient,
    id: u64,
    output: &Path,
    with_image: Option<PathBuf>,
) -> anyhow::Result<()> {
    let point_cloud_path = download_point_cloud(client, id, output).await?;
    println!(
        "Point cloud has been successfully downloaded to '{}'",
        point_cloud_path.display()
    );

    if let Some(image_target) = with_image {
        let (_, image_path) = download_first_related_image(client, id, &image_target).await?;
        println!(
            "Context image has been successfully downloaded to '{}'",
            image_path.display()
        );
    }
    Ok(())
}

async fn cmd_remove(client: &PlatformClient, ids: &[u64]) -> anyhow::Result<()> {
    match ids {
        [id] => client.remove(*id).await?,
        _ => client.remove_batch(ids).await?,
    }
    println!("Removed {} entities", ids.len());
    Ok(())
}

async fn cmd_tutorial(
    client: &PlatformClient,
    config: &Config,
    input: PathBuf,
    output: PathBuf,
    episodes: bool,
    cleanup: bool,
) -> anyhow::Result<()> {
    let workspace_id = config.require_workspace_id()?;
    let mut options = TutorialOptions::new(workspace_id, input, output, mode_for(episodes));
    options.cleanup = cleanup;

    let report = tutorial::run_tutorial(client, &options).await?;

    let mut items = vec![
        ("Project", format!("{} ({})", report.project.name, report.project.id)),
        ("Dataset", format!("{} ({})", report.dataset.name, report.dataset.id)),
        ("Point clouds", report.uploaded_point_clouds.to_string()),
        ("Context images", report.uploaded_images.to_string()),
        ("In dataset", report.dataset_point_clouds.to_string()),
        ("Point cloud file", report.point_cloud_path.display().to_string()),
    ];
    if let Some(image_path) = &report.image_path {
        items.push(("Image file", image_path.display().to_string()));
    }
    if report.removed > 0 {
        items.push(("Removed", report.removed.to_string()));
    }
    print_summary("Tutorial complete", &items);
    Ok(())
}
