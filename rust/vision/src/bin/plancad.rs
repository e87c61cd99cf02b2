// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CLI tool: reconstruct walls from a plan image, edit DXF files, render
//! previews
//!
//! Usage:
//!   plancad reconstruct <image> <out.dxf> [--config <json>] [--debug-dir <dir>]
//!   plancad edit <in.dxf> <command.json>
//!   plancad preview <in.dxf> [--output <svg>]

use anyhow::{bail, Context, Result};
use plancad_geometry::{render_svg, CadModificationCommand, EditSession};
use plancad_vision::{reconstruct_file, ReconstructionConfig};
use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,plancad_vision=debug,plancad_geometry=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let outcome = match args[1].as_str() {
        "reconstruct" => reconstruct(&args[2..]),
        "edit" => edit(&args[2..]),
        "preview" => preview(&args[2..]),
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = outcome {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  plancad reconstruct <image> <out.dxf> [--config <json>] [--debug-dir <dir>]");
    eprintln!("  plancad edit <in.dxf> <command.json>");
    eprintln!("  plancad preview <in.dxf> [--output <svg>]");
    eprintln!();
    eprintln!("Reconstruction tunables are read from PLANCAD_* environment variables;");
    eprintln!("--config replaces them with a (partial) JSON file over the defaults.");
}

/// Value following an option flag
fn option_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .with_context(|| format!("{} needs a value", flag))
}

fn reconstruct(args: &[String]) -> Result<()> {
    if args.len() < 2 {
        bail!("reconstruct needs <image> and <out.dxf>");
    }
    let image_path = PathBuf::from(&args[0]);
    let dxf_path = PathBuf::from(&args[1]);

    let mut config = ReconstructionConfig::from_env();
    let mut debug_dir: Option<PathBuf> = None;
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                let path = PathBuf::from(option_value(args, &mut i, "--config")?);
                config = ReconstructionConfig::from_json_file(&path)?;
            }
            "--debug-dir" => {
                debug_dir = Some(PathBuf::from(option_value(args, &mut i, "--debug-dir")?));
            }
            other => bail!("Unknown option: {}", other),
        }
        i += 1;
    }
    if debug_dir.is_some() {
        config.detection.debug_dir = debug_dir;
    }

    let result = reconstruct_file(&image_path, &dxf_path, &config, None)
        .with_context(|| format!("reconstructing {}", image_path.display()))?;
    println!("{}", serde_json::to_string_pretty(&result.report)?);
    Ok(())
}

fn edit(args: &[String]) -> Result<()> {
    if args.len() != 2 {
        bail!("edit needs <in.dxf> and <command.json>");
    }
    let json = fs::read_to_string(&args[1]).with_context(|| format!("reading {}", args[1]))?;
    let command = CadModificationCommand::from_json(&json)?;

    let mut session = EditSession::open(&args[0])?;
    let result = session.apply(&command)?;
    println!("{}", result.output_path.display());
    println!("{}", serde_json::to_string_pretty(&result.outcome)?);
    Ok(())
}

fn preview(args: &[String]) -> Result<()> {
    if args.is_empty() {
        bail!("preview needs <in.dxf>");
    }
    let session = EditSession::open(&args[0])?;

    let mut output: Option<PathBuf> = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--output" => output = Some(PathBuf::from(option_value(args, &mut i, "--output")?)),
            other => bail!("Unknown option: {}", other),
        }
        i += 1;
    }

    let svg = render_svg(session.document());
    match output {
        Some(path) => {
            fs::write(&path, svg).with_context(|| format!("writing {}", path.display()))?;
            tracing::info!(path = %path.display(), "Saved preview");
        }
        None => println!("{}", svg),
    }
    Ok(())
}
