//! restgate CLI
//!
//! Issue a single request through the pipeline:
//!
//! ```text
//! restgate ping
//! restgate <METHOD> <ROUTE> [JSON_PAYLOAD] [FILE...]
//! ```

use anyhow::{bail, Context};
use restgate::{FileAttachment, Method, Request, RestClient};
use std::io::Write;
use std::path::Path;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: restgate ping | restgate <METHOD> <ROUTE> [JSON_PAYLOAD] [FILE...]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("restgate=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let client = RestClient::from_env().context("failed to configure client")?;

    match args.as_slice() {
        [cmd] if cmd == "ping" => {
            let latency = client.ping().await?;
            println!("{} ms", latency.as_millis());
        }
        [method, route, rest @ ..] => {
            let method: Method = method
                .to_ascii_uppercase()
                .parse()
                .with_context(|| format!("invalid HTTP method {:?}", method))?;

            let (payload, paths) = match rest.split_first() {
                Some((json, paths)) if !json.is_empty() && !Path::new(json).exists() => {
                    let value: serde_json::Value =
                        serde_json::from_str(json).context("JSON_PAYLOAD is not valid JSON")?;
                    (Some(value), paths)
                }
                _ => (None, rest),
            };

            let mut files = Vec::with_capacity(paths.len());
            for path in paths {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("failed to open {}", path))?;
                files.push((display_name(path), file));
            }

            let attachments = files
                .iter_mut()
                .map(|(name, file)| FileAttachment::from_file(name.clone(), file));
            let request = Request::new(method, route.as_str()).with_files(attachments);

            let raw = match &payload {
                Some(value) => client.send(request.with_payload(value)).await?,
                None => client.send(request).await?,
            };

            std::io::stdout().write_all(&raw)?;
            if !raw.is_empty() {
                println!();
            }
        }
        _ => bail!(USAGE),
    }

    Ok(())
}

fn display_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}
