//! Tessera client entry point.

use tessera::app::Application;
use tessera::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let app = Application::new(args).await?;
    app.run().await
}
