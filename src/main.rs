use std::fs;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use networth::api::{Cli, Command, RunArgs, run_http_server};
use networth::config::{LoadOptions, load_config};
use networth::core::run_projection;
use networth::logging::init_logging;
use networth::report::{format_currency, render_html, render_json};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match cli.command {
        Command::Run(args) => run(&args),
        Command::Serve { port } => run_http_server(port)
            .await
            .with_context(|| format!("HTTP server on port {port} failed")),
    }
}

fn run(args: &RunArgs) -> Result<()> {
    let options = LoadOptions {
        end_age: args.age,
        ..LoadOptions::default()
    };
    let config = load_config(&args.config, &options)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let projection = run_projection(&config).context("running projection")?;

    if let Some(year) = projection.insolvent_year {
        warn!(year, "destitute in {year}");
    }

    if args.json {
        println!("{}", render_json(&projection, &config)?);
        return Ok(());
    }

    fs::write(&args.output, render_html(&projection, &config))
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!(
        output = %args.output.display(),
        years = projection.years.len(),
        final_net_worth = %format_currency(projection.final_net_worth()),
        "report written"
    );
    Ok(())
}
