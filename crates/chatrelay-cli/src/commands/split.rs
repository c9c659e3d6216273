use std::io::Read;

use anyhow::{Context, Result};
use chatrelay_core::chunk_message;
use serde_json::json;

use crate::cli::SplitArgs;
use crate::output::{OutputFormat, print_json};

pub fn run(args: SplitArgs, default_max_len: usize, format: OutputFormat) -> Result<()> {
    let text = match &args.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read stdin")?;
            buffer
        }
    };
    let text = text.trim_end_matches(['\n', '\r']);
    let chunks = chunk_message(text, args.max_len.unwrap_or(default_max_len));

    if format.is_json() {
        let items: Vec<_> = chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| {
                json!({ "index": index + 1, "chars": chunk.chars().count(), "text": chunk })
            })
            .collect();
        return print_json(&items);
    }

    let total = chunks.len();
    for (index, chunk) in chunks.iter().enumerate() {
        println!(
            "--- chunk {}/{} ({} chars) ---",
            index + 1,
            total,
            chunk.chars().count()
        );
        println!("{chunk}");
    }
    Ok(())
}
