use cashtag_crawler::extract::extract;
use cashtag_crawler::graph::normalize_search_term;
use cashtag_crawler::utils::print_record;
use std::env;
use std::io::{self, BufRead};
use std::process;

fn print_usage() {
    eprintln!("Usage: extract-record [--search-term <term>] [<json>...]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <json>          One raw stream record per argument");
    eprintln!("  --search-term   Show the graph edges this term would produce");
    eprintln!();
    eprintln!("With no records given, reads newline-delimited records from stdin.");
}

fn main() {
    let mut args = env::args().skip(1);
    let mut search_term = None;
    let mut records = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--search-term" | "-s" => match args.next() {
                Some(term) => search_term = Some(term),
                None => {
                    print_usage();
                    process::exit(1);
                }
            },
            "--help" | "-h" => {
                print_usage();
                return;
            }
            _ => records.push(arg),
        }
    }

    let source = search_term.as_deref().map(normalize_search_term);
    if let Some(source) = &source {
        if source.is_empty() {
            eprintln!("search term has no letters to build a graph source from");
            process::exit(1);
        }
    }

    if records.is_empty() {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => print_record(&extract(line.as_bytes()), source.as_deref()),
                Err(e) => {
                    eprintln!("failed to read stdin: {e}");
                    process::exit(1);
                }
            }
        }
    } else {
        for record in &records {
            print_record(&extract(record.as_bytes()), source.as_deref());
        }
    }
}
