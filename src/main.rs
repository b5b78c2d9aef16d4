#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pcd_context_uploader::cli::run().await
}
