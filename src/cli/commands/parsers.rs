//! Parsers command: show the dispatch order

use super::shared::load_config;
use crate::cli::args::ParsersArgs;
use crate::constants::PARSER_ORDER_VERSION;
use crate::parsers::{Nem12Parser, ParserKind, TableParser};
use anyhow::Result;
use colored::*;

pub fn run_parsers(args: ParsersArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    let is_default = config.parsers.order.as_slice() == ParserKind::default_order();

    println!(
        "{} {}",
        "Structured parser:".bright_cyan(),
        Nem12Parser.name().bright_white().bold()
    );
    println!(
        "{} {}",
        "Vendor order:".bright_cyan(),
        if is_default {
            format!("default (v{})", PARSER_ORDER_VERSION)
        } else {
            "custom".to_string()
        }
    );
    for (position, kind) in config.parsers.order.iter().enumerate() {
        println!("  {:>2}. {}", position + 1, kind);
    }
    Ok(())
}
