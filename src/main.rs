use anyhow::Result;

use tw_client::run_cli;

#[tokio::main]
async fn main() -> Result<()> {
    run_cli().await
}
