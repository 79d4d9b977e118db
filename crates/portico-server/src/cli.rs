use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "portico-server", about = "Portico live chat relay")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/portico.toml")]
    pub config: String,

    /// Upstream bot token (overrides config)
    #[arg(long, env = "PORTICO_UPSTREAM_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}
