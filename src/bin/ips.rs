//! IPS patch applier CLI.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use ips::async_format;

/// Apply an IPS patch to a copy of a source file.
#[derive(Parser)]
#[command(name = "ips")]
#[command(version)]
#[command(about = "Apply an IPS patch to a copy of a source file")]
struct Cli {
    /// IPS patch file
    patch: PathBuf,

    /// Original source file
    source: PathBuf,

    /// Destination output file
    dest: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "Patching <{}> with <{}> to produce <{}>",
        cli.source.display(),
        cli.patch.display(),
        cli.dest.display()
    );

    tokio::fs::copy(&cli.source, &cli.dest).await?;

    let patch_file = tokio::fs::File::open(&cli.patch).await?;
    let reader = tokio::io::BufReader::new(patch_file);

    let dest = tokio::fs::OpenOptions::new()
        .write(true)
        .open(&cli.dest)
        .await?;
    let dest = Arc::new(Mutex::new(dest));

    // The pipelined adapter keeps at most one apply in flight, so the lock
    // is never contended; it only lets each handler future own the target.
    let mut count = 0u64;
    let target = Arc::clone(&dest);
    async_format::for_each_patch_pipelined(reader, move |patch| {
        count += 1;
        let n = count;
        let target = Arc::clone(&target);
        async move {
            println!("Patch {n}: {patch}");
            let mut dest = target.lock().await;
            patch.apply_async(&mut *dest).await
        }
    })
    .await?;

    dest.lock().await.flush().await?;
    Ok(())
}
