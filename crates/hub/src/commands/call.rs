//! Call command - send an arbitrary request through the pipeline.

use anyhow::{Context as _, Result};
use clap::Args;
use hub_client::{Body, RequestSpec};
use reqwest::Method;

use super::Context;

/// Arguments for the call command.
#[derive(Args, Debug)]
pub struct CallArgs {
    /// HTTP method (e.g. GET, POST)
    pub method: String,

    /// Path relative to the API base URL
    pub path: String,

    /// JSON request body
    #[arg(long)]
    pub body: Option<String>,

    /// Query parameter as KEY=VALUE (repeatable)
    #[arg(long = "query", short = 'q', value_parser = parse_query_pair)]
    pub query: Vec<(String, String)>,

    /// Operation name; names on the exempt list are sent without the token
    #[arg(long, default_value = "call")]
    pub operation: String,
}

fn parse_query_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))
}

/// Run the call command.
pub async fn run(args: CallArgs, ctx: &Context) -> Result<()> {
    let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method '{}'", args.method))?;

    let mut spec = RequestSpec::new(args.operation, method, args.path);
    for (key, value) in args.query {
        spec = spec.query(key, value);
    }
    if let Some(body) = args.body {
        let value: serde_json::Value =
            serde_json::from_str(&body).context("--body is not valid JSON")?;
        spec = spec.json(&value)?;
    }

    let response = ctx.client.dispatch(&spec).await?;

    if ctx.json_output {
        ctx.print_json(&serde_json::json!({
            "status": response.status,
            "body": response.body.as_json(),
        }))?;
        return Ok(());
    }

    if ctx.verbose {
        eprintln!("HTTP {}", response.status);
    }
    match &response.body {
        Body::Json(value) => println!("{}", serde_json::to_string_pretty(value)?),
        Body::Text(text) => println!("{}", text),
        Body::Empty => {}
    }
    Ok(())
}
