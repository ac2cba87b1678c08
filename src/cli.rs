use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "recipe-api", version, about = "Recipe management REST API")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create a staff superuser account
    CreateSuperuser {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SUPERUSER_PASSWORD", hide_env_values = true)]
        password: String,
    },
}
