use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Arg, ArgAction, Command, value_parser};
use owo_colors::OwoColorize;
use tracing::{debug, info};

const VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

/// `--pages` accepts the literal `all` as a synonym for omitting the flag
/// (every page); anything else is forwarded to `parse_page_selector`.
fn pages_selector(sub: &clap::ArgMatches) -> Option<&str> {
    match sub.get_one::<String>("pages").map(String::as_str) {
        Some("all") => None,
        other => other,
    }
}

fn cli() -> Command {
    Command::new("pdfstamp")
        .version(VERSION)
        .propagate_version(true)
        .about("Add or remove PDF watermarks and stamps")
        .disable_help_subcommand(true)
        .disable_help_flag(true)
        .disable_version_flag(true)
        .arg(
            Arg::new("help")
                .long("help")
                .long_help("Print help")
                .global(true)
                .hide(true)
                .action(ArgAction::Help),
        )
        .arg(
            Arg::new("version")
                .long("version")
                .long_help("Print version")
                .global(true)
                .hide(true)
                .action(ArgAction::Version),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("add")
                .about("Paint a watermark or stamp onto a PDF")
                .arg(
                    Arg::new("spec")
                        .long("spec")
                        .value_name("SPEC")
                        .help("Watermark configuration string, e.g. \"Confidential,pos:c,op:0.3\"")
                        .required(true),
                )
                .arg(
                    Arg::new("stamp")
                        .long("stamp")
                        .action(ArgAction::SetTrue)
                        .help("Paint on top of page content instead of beneath it"),
                )
                .arg(
                    Arg::new("pages")
                        .long("pages")
                        .value_name("PAGES")
                        .help("Page selector: \"all\" (default), a single page, or \"1,3-5\""),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("OUTPUT")
                        .value_parser(value_parser!(PathBuf))
                        .required(true)
                        .help("Path for the output PDF."),
                )
                .arg(
                    Arg::new("input")
                        .value_name("INPUT")
                        .value_parser(value_parser!(PathBuf))
                        .required(true)
                        .help("Path to the input PDF."),
                ),
        )
        .subcommand(
            Command::new("remove")
                .about("Strip watermarks and stamps previously added by this tool")
                .arg(
                    Arg::new("pages")
                        .long("pages")
                        .value_name("PAGES")
                        .help("Page selector: \"all\" (default), a single page, or \"1,3-5\""),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("OUTPUT")
                        .value_parser(value_parser!(PathBuf))
                        .required(true)
                        .help("Path for the output PDF."),
                )
                .arg(
                    Arg::new("input")
                        .value_name("INPUT")
                        .value_parser(value_parser!(PathBuf))
                        .required(true)
                        .help("Path to the input PDF."),
                ),
        )
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let matches = cli().get_matches();

    let result = match matches.subcommand() {
        Some(("add", sub)) => {
            let input = sub.get_one::<PathBuf>("input").unwrap();
            let output = sub.get_one::<PathBuf>("output").unwrap();
            let spec = sub.get_one::<String>("spec").unwrap();
            let on_top = sub.get_flag("stamp");
            let pages = pages_selector(sub);

            debug!(?input, ?output, ?spec, on_top, ?pages);
            pdfstamp::add_watermarks(input, output, spec, on_top, pages)
        }
        Some(("remove", sub)) => {
            let input = sub.get_one::<PathBuf>("input").unwrap();
            let output = sub.get_one::<PathBuf>("output").unwrap();
            let pages = pages_selector(sub);

            debug!(?input, ?output, ?pages);
            pdfstamp::remove_watermarks(input, output, pages).map(|count| {
                info!(count, "watermarks removed");
            })
        }
        _ => unreachable!("subcommand_required(true) guarantees a match above"),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}: {}", "error".bright_red(), err);
            ExitCode::FAILURE
        }
    }
}
