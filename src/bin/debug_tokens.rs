//! Dump extracted tokens per page, marking identifier anchors with `*`

use clap::Parser;
use label_patch::extractor::{extract_tokens_from_file, ExtractOptions};
use label_patch::is_anchor;
use std::ops::RangeInclusive;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "debug_tokens")]
struct Args {
    /// Input PDF file
    file: PathBuf,

    /// Pages to print, as `N` or `FIRST-LAST` (default: all)
    #[arg(short, long, value_parser = parse_pages)]
    pages: Option<RangeInclusive<u32>>,

    /// Only print anchor tokens
    #[arg(long)]
    anchors: bool,
}

fn parse_pages(value: &str) -> Result<RangeInclusive<u32>, String> {
    let number = |s: &str| {
        s.trim()
            .parse::<u32>()
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| format!("invalid page number {:?}", s))
    };

    let (first, last) = match value.split_once('-') {
        Some((a, b)) => (number(a)?, number(b)?),
        None => {
            let n = number(value)?;
            (n, n)
        }
    };
    if first > last {
        return Err(format!("page range {} is reversed", value));
    }
    Ok(first..=last)
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let pages = match extract_tokens_from_file(&args.file, &ExtractOptions::default()) {
        Ok(pages) => pages,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let selected = pages
        .iter()
        .filter(|p| args.pages.as_ref().map_or(true, |r| r.contains(&p.page)));
    for page in selected {
        println!(
            "=== PAGE {} ({} tokens, height {:.1}) ===",
            page.page,
            page.tokens.len(),
            page.page_height
        );
        for token in &page.tokens {
            let anchor = is_anchor(&token.text);
            if args.anchors && !anchor {
                continue;
            }
            println!(
                "  {} x={:7.1} y={:7.1} w={:7.1} fs={:5.1} text={:?}",
                if anchor { "*" } else { " " },
                token.x,
                token.y,
                token.width,
                token.height,
                token.text
            );
        }
        println!();
    }
}
