use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

/// Easel image generation CLI
#[derive(Debug, Parser)]
#[command(name = "easel", about = "Generate, edit and upscale images across providers from one model catalogue")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "easel.toml", env = "EASEL_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the model catalogue grouped by category
    Models,
    /// Run one generation, edit or upscale
    Generate(GenerateArgs),
    /// Inspect or prune saved generations
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Debug, clap::Args)]
pub struct GenerateArgs {
    /// Model id or route id
    #[arg(short, long)]
    pub model: String,

    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Image file to upload (repeatable)
    #[arg(long = "image")]
    pub images: Vec<PathBuf>,

    /// Remote image URL to use as input (repeatable)
    #[arg(long = "image-url")]
    pub image_urls: Vec<String>,

    /// Mask file for edits
    #[arg(long)]
    pub mask: Option<PathBuf>,

    /// Model parameter as key=value; values are parsed as JSON when possible
    #[arg(long = "param", value_parser = parse_param)]
    pub params: Vec<(String, Value)>,

    /// Save successful results to the history store
    #[arg(long)]
    pub save: bool,
}

#[derive(Debug, Subcommand)]
pub enum HistoryAction {
    /// List saved generations, newest first
    List,
    /// Delete a saved generation
    Delete { id: String },
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing parameter name in '{raw}'"));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));

    Ok((key.to_owned(), value))
}
