use anyhow::Result;
use std::path::Path;
use tracing::info;

use repomap::config::Config;
use repomap::mcp::server::McpServer;

/// Start MCP server with stdio transport
pub async fn serve_stdio(project: &Path, watch: bool) -> Result<()> {
    let mut config = Config::from_project_dir(project);
    config.validate()?;
    config.server.watch &= watch;

    info!("MCP server (stdio) for project: {}", project.display());

    let server = McpServer::new(project, config)?;
    server.run().await
}
