//! `logreplay`: submit a log file to a replay server and show what the
//! detection engine made of it.

mod client;
pub mod input;
pub mod render;

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use logreplay_protocol::ReplayRequest;

pub use client::run_replay;

use crate::input::explain_notice;
use crate::input::read_input;
use crate::input::validate_content;
use crate::input::validate_log_type;
use crate::render::Renderer;
use crate::render::Target;

pub const DEFAULT_URL: &str = "ws://127.0.0.1:3000/ws";

#[derive(Debug, Parser)]
#[command(name = "logreplay", version, about = "Replay log lines through a remote detection engine")]
pub struct Cli {
    /// Log file to replay. Reads stdin when omitted or `-`.
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Log type passed to the engine (e.g. `nginx`, `syslog`).
    #[arg(long = "type", short = 't', value_name = "TYPE")]
    pub log_type: String,

    /// WebSocket endpoint of the replay server.
    #[arg(long, env = "LOGREPLAY_URL", default_value = DEFAULT_URL)]
    pub url: String,

    /// Print the decoded result as JSON instead of the summary.
    #[arg(long)]
    pub json: bool,
}

/// Run the client and return the process exit code.
pub async fn run_main(cli: Cli) -> Result<i32> {
    let log_type = validate_log_type(&cli.log_type)?;
    let bytes = read_input(cli.file.as_deref()).await?;
    let content = validate_content(&bytes)?;
    if let Some(notice) = explain_notice(&content) {
        eprintln!("{notice}");
    }

    let renderer = Renderer::detect();
    let request = ReplayRequest::new(content, log_type);
    let completion = run_replay(&cli.url, request, |event| {
        let Some((target, text)) = renderer.event(event) else {
            return;
        };
        // Keep stdout clean for the JSON document.
        let target = if cli.json { Target::Stderr } else { target };
        match target {
            Target::Stdout => {
                let mut stdout = std::io::stdout().lock();
                let _ = stdout.write_all(text.as_bytes());
                let _ = stdout.flush();
            }
            Target::Stderr => eprint!("{text}"),
        }
    })
    .await?;

    let Some(result) = completion.result else {
        if completion.exit_code == 0 {
            eprintln!("replay finished without a result payload");
            return Ok(1);
        }
        return Ok(completion.exit_code);
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", renderer.summary(&result));
    }
    Ok(completion.exit_code)
}
