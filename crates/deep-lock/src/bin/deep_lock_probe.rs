#![forbid(unsafe_code)]

use std::fs;

use anyhow::{Context, Result, anyhow, bail};
use deep_lock::probe_cli::{ProbeRequest, render_probe_summary, run_probe, validate_action};

fn main() {
    if let Err(error) = run(std::env::args().skip(1).collect()) {
        eprintln!("{error:#}");
        std::process::exit(2);
    }
}

fn usage() -> String {
    [
        "deep_lock_probe usage:",
        "  deep_lock_probe --input <graph.json> [--action freeze|seal|preventExtensions]",
        "      [--trace-id <id>] [--summary]",
    ]
    .join("\n")
}

fn run(args: Vec<String>) -> Result<()> {
    let mut input_path: Option<&str> = None;
    let mut request = ProbeRequest::default();
    let mut summary = false;

    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--input" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("--input requires a path"))?;
                input_path = Some(value);
            }
            "--action" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("--action requires a value"))?;
                request.action = Some(value.clone());
            }
            "--trace-id" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("--trace-id requires a value"))?;
                request.trace_id = Some(value.clone());
            }
            "--summary" => summary = true,
            "help" | "--help" | "-h" => {
                println!("{}", usage());
                return Ok(());
            }
            flag => bail!("unknown flag: {flag}\n\n{}", usage()),
        }
        index += 1;
    }

    let path = input_path.ok_or_else(|| anyhow!("missing required --input <path>\n\n{}", usage()))?;
    validate_action(request.action.as_deref())
        .with_context(|| format!("invalid --action for {path}"))?;

    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    let document: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {path} as JSON"))?;
    let output = run_probe(&document, &request)?;

    if summary {
        println!("{}", render_probe_summary(&output));
    } else {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("failed to encode probe output")?
        );
    }
    Ok(())
}
