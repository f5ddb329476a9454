use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use strbridge_config::ConfigLoader;
use strbridge_host::{StringBridge, WasmHost};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "strbridge.toml")]
    config: PathBuf,

    /// Guest module to load, overrides `bridge.module_path`
    #[arg(short, long)]
    module: Option<PathBuf>,

    /// Exported guest function to call
    #[arg(short, long, default_value = "greet")]
    function: String,

    /// String arguments passed to the guest function
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let app = ConfigLoader::new(&args.config).load()?;
    strbridge_logging::init_logging(&app.logging)?;

    let module_path = args
        .module
        .or_else(|| app.bridge.module_path.clone())
        .context("No guest module given: pass --module or set bridge.module_path")?;

    let host = WasmHost::with_config(&app.bridge.engine)?;
    let mut bridge = StringBridge::load(&host, &module_path, &app.bridge)
        .await
        .with_context(|| format!("Failed to load guest module {:?}", module_path))?;

    let inputs: Vec<&str> = args.args.iter().map(String::as_str).collect();
    let output = bridge
        .call(&args.function, &inputs)
        .with_context(|| format!("Guest call '{}' failed", args.function))?;

    println!("{}", output);
    tracing::debug!("Bridge stats: {:?}", bridge.stats());
    Ok(())
}
