use anyhow::Result;

// Commands are processed strictly one at a time.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    ocrw_cli::run().await
}
