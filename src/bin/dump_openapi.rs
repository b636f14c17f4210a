use std::fs;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Write the crew-planner OpenAPI document", long_about = None)]
struct Args {
    /// Destination file
    #[arg(short, long, default_value = "openapi.json")]
    output: String,
    /// Server URL advertised in the document
    #[arg(long, default_value = "http://localhost:8000")]
    server_url: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let doc = crew_planner::docs::build_openapi(&args.server_url)?;
    fs::write(&args.output, serde_json::to_string_pretty(&doc)?)?;
    println!("wrote {}", args.output);
    Ok(())
}
