use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("mailshield")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("mailshield")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .arg(arg!(-v --"verbose" "Enable debug logging").required(false))
        .arg(
            arg!(-c --"config" <PATH>)
                .required(false)
                .global(true)
                .help("Path to a JSON config file (default: ~/.config/mailshield/config.json)")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .subcommand_required(false)
        .subcommand(
            command!("scan")
                .about(
                    "Scan the links of a saved webmail page against the threat API and \
                annotate risky ones.",
                )
                .arg(
                    arg!(<FILE>)
                        .required(true)
                        .help("Saved HTML page to scan")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-u --"page-url" <URL>)
                        .required(false)
                        .help("URL the page was loaded from; resolves relative links and marks the host's own links")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(-b --"backend" <URL>)
                        .required(false)
                        .help("Threat API base URL, overrides the config file"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Write the annotated page to this file")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                ),
        )
        .subcommand(
            command!("check")
                .about("Score a single URL")
                .arg(arg!(<URL>).required(true).help("The URL to score"))
                .arg(
                    arg!(-b --"backend" <URL>)
                        .required(false)
                        .help("Threat API base URL, overrides the config file"),
                ),
        )
        .subcommand(command!("config").about("Print the effective configuration"))
}
