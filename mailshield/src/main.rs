use clap::ArgMatches;
use colored::Colorize;
use commands::command_argument_builder;
use indicatif::{ProgressBar, ProgressStyle};
use mailshield::handlers::{
    build_client, effective_config, format_check_result, load_page, parse_url_line,
    print_banner, print_divider, scan_document,
};
use mailshield_core::config::default_config_path;
use mailshield_core::report::{ReportFormat, render_report};
use mailshield_scanner::RiskScorer;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

mod commands;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");
    let verbose = chosen_command.get_flag("verbose");

    tracing_subscriber::fmt()
        .with_max_level(if verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_target(false)
        .init();

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    if chosen_command.subcommand().is_none() {
        // No subcommand provided, just show the banner
        return;
    }

    let config_path = chosen_command.get_one::<PathBuf>("config");

    match chosen_command.subcommand() {
        Some(("scan", primary_command)) => handle_scan(primary_command, config_path, quiet).await,
        Some(("check", primary_command)) => handle_check(primary_command, config_path).await,
        Some(("config", _)) => handle_config(config_path),
        _ => unreachable!("clap should ensure we don't get here"),
    }
}

// Handler functions
async fn handle_scan(args: &ArgMatches, config_path: Option<&PathBuf>, quiet: bool) {
    let config = match effective_config(
        config_path,
        args.get_one::<String>("backend").map(String::as_str),
    ) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    let Some(file) = args.get_one::<PathBuf>("FILE") else {
        unreachable!("clap requires FILE");
    };
    let page_url = args.get_one::<Url>("page-url");
    let format = args
        .get_one::<String>("format")
        .and_then(|f| f.parse::<ReportFormat>().ok())
        .unwrap_or(ReportFormat::Text);

    let document = match load_page(file, page_url) {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    let client = match build_client(&config) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Scanning {} against {}",
        file.display(),
        client.endpoint()
    );

    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            spinner.set_style(style);
        }
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    };
    spinner.set_message("Scoring links...");

    let (summary, html) = match scan_document(document, client, &config).await {
        Ok(out) => out,
        Err(e) => {
            spinner.finish_and_clear();
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };
    spinner.finish_and_clear();

    match render_report(&summary, format) {
        Ok(report) => {
            if !quiet && format == ReportFormat::Text {
                print_divider();
            }
            println!("{}", report);
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }

    if let Some(output) = args.get_one::<PathBuf>("output") {
        if let Err(e) = fs::write(output, html) {
            eprintln!(
                "{} Failed to write {}: {}",
                "Error:".red().bold(),
                output.display(),
                e
            );
            std::process::exit(1);
        }
        if !quiet {
            println!(
                "{} Annotated page written to {}",
                "✓".green().bold(),
                output.display()
            );
        }
    }
}

async fn handle_check(args: &ArgMatches, config_path: Option<&PathBuf>) {
    let config = match effective_config(
        config_path,
        args.get_one::<String>("backend").map(String::as_str),
    ) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    let raw = args.get_one::<String>("URL").map(String::as_str).unwrap_or_default();
    let Some(url) = parse_url_line(raw) else {
        eprintln!("{} Invalid URL: {}", "Error:".red().bold(), raw);
        std::process::exit(1);
    };

    let client = match build_client(&config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    match client.score_url(&url).await {
        Ok(result) => print!("{}", format_check_result(&result)),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn handle_config(config_path: Option<&PathBuf>) {
    let config = match effective_config(config_path, None) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    let source = config_path.cloned().unwrap_or_else(default_config_path);
    println!("{} {}", "Config file:".bright_white().bold(), source.display());

    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
