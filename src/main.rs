use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    browserflow_cli::cli::app::run().await
}
