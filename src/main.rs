//! ATT filter CLI
//!
//! Inspects captures and settings for the BLE attribute rewriting filter.

use anyhow::Result;
use clap::Parser;
use tracing::info;

use att_filter::replay::{self, OutputFormat};
use att_filter::settings;
use att_filter_core::{ControlCommand, LengthRule, RewriteTemplate, CATALOGUE};

mod cli;
use cli::{Cli, Commands, ReplayFormat};

fn setup_logging(verbose: bool) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("att_filter={level}").parse()?)
        .add_directive(format!("att_filter_core={level}").parse()?);

    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    Ok(())
}

fn describe_length(rule: LengthRule) -> String {
    match rule {
        LengthRule::Exact(n) => format!("=={n}"),
        LengthRule::AtMost(n) => format!("<={n}"),
        LengthRule::MoreThan(n) => format!(">{n}"),
    }
}

fn describe_pattern(template: &RewriteTemplate) -> String {
    template
        .pattern
        .iter()
        .map(|b| match b {
            Some(b) => format!("{b:02x}"),
            None => "__".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_templates() {
    for t in CATALOGUE.iter() {
        println!(
            "{:<28} {:<3} len {:<4} {}",
            t.name,
            t.direction.label(),
            describe_length(t.length),
            describe_pattern(t)
        );
        for m in t.mutations {
            let gate = if m.needs_fix_headers {
                " (fix_headers)"
            } else {
                ""
            };
            println!("    [{}] = {:02x}{}", m.offset, m.value, gate);
        }
        if let Some(len) = t.truncate_length_to {
            let gate = if t.gated_by_fix_headers {
                " (fix_headers)"
            } else {
                ""
            };
            println!("    length = {len}{gate}");
        }
    }
}

fn print_codes() {
    for cmd in ControlCommand::ALL {
        println!("{:<20} 0x{:08X}", cmd.name(), cmd.code());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Replay {
            file,
            flags,
            config,
            format,
        } => {
            let settings = settings::resolve(config.as_deref(), flags.into())?;
            let format = match format {
                ReplayFormat::Text => OutputFormat::Text,
                ReplayFormat::Json => OutputFormat::Json,
            };
            info!("Replaying {}", file.display());
            replay::run_replay(&file, &settings, format).await?;
        }
        Commands::Settings { flags, config } => {
            let settings = settings::resolve(config.as_deref(), flags.into())?;
            print!("{}", settings::to_toml(&settings)?);
        }
        Commands::Templates => print_templates(),
        Commands::Codes => print_codes(),
    }

    Ok(())
}
