use anyhow::{Context, Result};
use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand, ValueEnum};
use gcp_inventory::config::{Config, Overrides, Settings};
use gcp_inventory::context::FetchContext;
use gcp_inventory::filter::{RegionFilter, ServiceFilter};
use gcp_inventory::gcp::auth::GcpCredentials;
use gcp_inventory::gcp::client::GcpClient;
use gcp_inventory::orchestrator::{all_service_names, run_aggregation, RegionalService};
use gcp_inventory::query::{resolve_instances, InstanceSelector, PrintOptions};
use gcp_inventory::resource::regions::list_regions;
use gcp_inventory::VERSION;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Inventory every resource of a GCP project across all regions
#[derive(Parser, Debug)]
#[command(name = "gcpinv", version = VERSION, about, long_about = None)]
struct Args {
    /// GCP project to inventory
    #[arg(short, long, global = true)]
    project: Option<String>,

    /// Bearer token to use instead of Application Default Credentials
    #[arg(long, global = true, hide = true)]
    access_token: Option<String>,

    /// Maximum number of API requests in flight at once [default: 50]
    #[arg(long, global = true)]
    max_requests_in_flight: Option<usize>,

    /// Maximum retries per page [default: 9]
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Longest single wait between retries, e.g. "10s" [default: 10s]
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    max_retry_time: Option<Duration>,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// No logging at all
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the inventory and write it to stdout
    Dump(DumpArgs),
    /// Print the regions a dump would cover
    Regions(RegionArgs),
    /// Print the available service names
    Services,
    /// Find instances by name, id or labels and print their addresses
    Resolve(ResolveArgs),
    /// Print the effective settings
    Config {
        /// Write the effective settings to the config file
        #[arg(long)]
        save: bool,
    },
}

#[derive(ClapArgs, Debug)]
struct RegionArgs {
    /// Only these regions (comma separated)
    #[arg(short = 'r', long = "regions", value_delimiter = ',')]
    regions: Vec<String>,

    /// Skip these regions, even when listed in --regions
    #[arg(short = 'R', long = "exclude-regions", value_delimiter = ',')]
    exclude_regions: Vec<String>,
}

#[derive(ClapArgs, Debug)]
struct DumpArgs {
    #[command(flatten)]
    regions: RegionArgs,

    /// Only these services (comma separated)
    #[arg(short = 's', long = "services", value_delimiter = ',')]
    services: Vec<String>,

    /// Skip these services, even when listed in --services
    #[arg(short = 'S', long = "exclude-services", value_delimiter = ',')]
    exclude_services: Vec<String>,

    /// Print the available service names and exit
    #[arg(long)]
    list_services: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(ClapArgs, Debug)]
struct ResolveArgs {
    #[command(flatten)]
    regions: RegionArgs,

    /// Instance name or numeric id
    #[arg(short = 'i', long)]
    instance: Option<String>,

    /// Label key:value pairs that must all match (comma separated)
    #[arg(short = 'l', long = "labels", value_delimiter = ',')]
    labels: Vec<String>,

    /// Label keys to print as an extra column (comma separated)
    #[arg(short = 'L', long = "print-labels", value_delimiter = ',')]
    print_labels: Vec<String>,

    /// Only print the external IP, for instances that have one
    #[arg(short = 'u', long)]
    public: bool,

    /// Only print the internal IP, for instances that have one
    #[arg(long, conflicts_with = "public")]
    private: bool,

    /// Print label values as they are instead of URL-encoded
    #[arg(short = 'E', long)]
    no_url_encode: bool,

    /// Name the printed columns on the first line
    #[arg(short = 'd', long)]
    header: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

fn setup_logging(
    verbose: u8,
    quiet: bool,
    log_file: Option<&Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    if quiet {
        return Ok(None);
    }

    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let (writer, guard) = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {:?}", parent))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(log_file.is_none())
        .with_target(true)
        .init();

    tracing::info!("gcpinv {} started with log level {}", VERSION, level);

    Ok(Some(guard))
}

/// First Ctrl-C cancels the run, the second one exits immediately
fn handle_interrupts(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("Interrupted, cancelling the run");
        eprintln!("Interrupted, finishing in-flight requests (Ctrl-C again to exit now)");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _log_guard = match setup_logging(args.verbose, args.quiet, args.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    handle_interrupts(cancel.clone());

    match run(args, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, cancel: CancellationToken) -> Result<()> {
    if let Command::Services = args.command {
        print_lines(all_service_names());
        return Ok(());
    }
    if let Command::Dump(dump) = &args.command {
        if dump.list_services {
            print_lines(all_service_names());
            return Ok(());
        }
    }

    let config = Config::load();
    let settings = Settings::resolve(
        Overrides {
            project_id: args.project.clone(),
            max_requests_in_flight: args.max_requests_in_flight,
            max_retries: args.max_retries,
            max_retry_time: args.max_retry_time,
        },
        &config,
    )?;
    tracing::info!("Using project: {}", settings.project_id);

    match args.command {
        Command::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            if save {
                let path = settings.to_config().save()?;
                eprintln!("Saved settings to {}", path.display());
            }
            Ok(())
        }
        Command::Regions(region_args) => {
            let ctx = fetch_context(&settings, args.access_token, cancel).await?;
            let filter = region_filter(&region_args, &settings);
            let regions = filter.resolve(|| list_regions(&ctx)).await?;
            print_lines(regions);
            Ok(())
        }
        Command::Dump(dump) => {
            let ctx = fetch_context(&settings, args.access_token, cancel).await?;
            let regions = region_filter(&dump.regions, &settings);
            let services = ServiceFilter::new(
                &dump.services,
                dump.exclude_services.iter().chain(&settings.exclude_services),
            );
            let unknown = services.unknown(&all_service_names());
            if !unknown.is_empty() {
                tracing::warn!("Unknown services ignored: {}", unknown.join(", "));
            }

            let inventory = run_aggregation(ctx, &regions, &services).await?;

            let mut stdout = std::io::stdout().lock();
            match dump.format {
                OutputFormat::Json if dump.pretty => serde_json::to_writer_pretty(&mut stdout, &inventory)?,
                OutputFormat::Json => serde_json::to_writer(&mut stdout, &inventory)?,
                OutputFormat::Yaml => serde_yaml::to_writer(&mut stdout, &inventory)?,
            }
            writeln!(stdout)?;
            Ok(())
        }
        Command::Resolve(resolve) => {
            let selector = InstanceSelector::new(resolve.instance, &resolve.labels)?;
            let options = PrintOptions::new(
                resolve.private,
                resolve.public,
                resolve.print_labels,
                !resolve.no_url_encode,
                resolve.header,
            )?;

            let ctx = fetch_context(&settings, args.access_token, cancel).await?;
            let regions = region_filter(&resolve.regions, &settings);
            let services = ServiceFilter::new([RegionalService::Compute.name()], Vec::<String>::new());
            let inventory = run_aggregation(ctx, &regions, &services)
                .await
                .context("failed while fetching instances")?;

            let instances = resolve_instances(&inventory, &selector);
            tracing::info!("Resolved {} instances", instances.len());
            print_lines(options.render(&instances));
            Ok(())
        }
        Command::Services => Ok(()),
    }
}

async fn fetch_context(
    settings: &Settings,
    access_token: Option<String>,
    cancel: CancellationToken,
) -> Result<FetchContext> {
    let client = match access_token {
        Some(token) => GcpClient::with_credentials(
            &settings.project_id,
            GcpCredentials::from_token(token),
            settings.max_requests_in_flight,
        )?,
        None => GcpClient::new(&settings.project_id, settings.max_requests_in_flight).await?,
    };

    Ok(FetchContext::new(client, settings.loader_options(), cancel))
}

fn region_filter(args: &RegionArgs, settings: &Settings) -> RegionFilter {
    RegionFilter::new(
        &args.regions,
        args.exclude_regions.iter().chain(&settings.exclude_regions),
    )
}

fn print_lines<I, S>(lines: I)
where
    I: IntoIterator<Item = S>,
    S: std::fmt::Display,
{
    for line in lines {
        println!("{}", line);
    }
}
