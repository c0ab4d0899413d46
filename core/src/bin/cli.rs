/// CLI for poking the sync endpoints
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    groovesync_core::cli_app::run(std::env::args().collect()).await
}
