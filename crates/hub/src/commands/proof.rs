//! Proof command - print a DPoP proof for a request.

use anyhow::Result;
use clap::Args;

use super::Context;

/// Arguments for the proof command.
#[derive(Args, Debug)]
pub struct ProofArgs {
    /// HTTP method (e.g. GET)
    pub method: String,

    /// Absolute URL the proof is bound to
    pub url: String,

    /// Also print the decoded claims
    #[arg(long)]
    pub decode: bool,
}

/// Run the proof command.
pub async fn run(args: ProofArgs, ctx: &Context) -> Result<()> {
    let proof = ctx.client.create_proof(&args.method, &args.url).await?;

    if ctx.json_output {
        let claims = proof.verify()?;
        ctx.print_json(&serde_json::json!({
            "proof": proof.as_str(),
            "claims": claims,
            "thumbprint": ctx.client.key_thumbprint(),
        }))?;
        return Ok(());
    }

    println!("{}", proof.as_str());
    if args.decode {
        let claims = proof.verify()?;
        eprintln!();
        eprintln!("jti: {}", claims.jti);
        eprintln!("htm: {}", claims.htm);
        eprintln!("htu: {}", claims.htu);
        eprintln!("iat: {}", claims.iat);
    }
    Ok(())
}
