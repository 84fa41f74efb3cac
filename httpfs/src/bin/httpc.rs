use std::path::PathBuf;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use tracing::Level;

use httpfs::client;
use httpfs::client::RequestHeaders;

/// HTTP/1.0 command line client.
#[derive(Parser)]
struct Args {
    /// verbose logging
    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// issue a GET request, following redirects
    Get {
        url: String,

        /// request header in 'key:value' form, repeatable
        #[clap(short = 'H', long = "header")]
        headers: Vec<String>,
    },
    /// issue a POST request
    Post {
        url: String,

        /// request header in 'key:value' form, repeatable
        #[clap(short = 'H', long = "header")]
        headers: Vec<String>,

        /// inline request body
        #[clap(short = 'd', long, conflicts_with = "file")]
        data: Option<String>,

        /// read the request body from a file
        #[clap(short = 'f', long)]
        file: Option<PathBuf>,
    },
}

fn parse_headers(raw: &[String]) -> anyhow::Result<RequestHeaders> {
    raw.iter()
        .map(|header| {
            header
                .split_once(':')
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| anyhow!("header {:?} is not in 'key:value' form", header))
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt().with_max_level(level).try_init().ok();

    let response = match args.command {
        Command::Get { url, headers } => {
            let headers = parse_headers(&headers)?;
            let response = client::get(&url, &headers).await?;
            client::follow_redirects(response, &headers).await?
        }
        Command::Post {
            url,
            headers,
            data,
            file,
        } => {
            let headers = parse_headers(&headers)?;
            let body = match (data, file) {
                (Some(data), _) => data,
                (None, Some(path)) => std::fs::read_to_string(path)?,
                (None, None) => String::new(),
            };
            client::post(&url, &headers, &body).await?
        }
    };

    println!("{response}");
    Ok(())
}
