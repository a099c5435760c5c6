// CLI module for gem2openai
// Author: kelexine (https://github.com/kelexine)

use clap::Parser;
use std::path::PathBuf;

/// gem2openai - Cookie-session Gemini web client exposed as an OpenAI-compatible API
#[derive(Parser, Debug)]
#[command(name = "gem2openai", version, about, long_about = None)]
pub struct Args {
    /// Path to a TOML config file (default: ~/.gem2openai/config.toml)
    #[arg(short, long, env = "GEM2OPENAI_CONFIG")]
    pub config: Option<PathBuf>,

    /// `.env` file with SECURE_1PSID / SECURE_1PSIDTS; rotated cookies are written back here
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// Override the bind address
    #[arg(long)]
    pub host: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Validate configuration and credentials, then exit
    #[arg(long)]
    pub check: bool,

    /// Print the effective configuration (secrets redacted) and exit
    #[arg(long)]
    pub print_config: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_overrides() {
        let args = Args::parse_from([
            "gem2openai",
            "--env-file",
            "/tmp/cookies.env",
            "--port",
            "9100",
            "--check",
        ]);
        assert_eq!(args.env_file, Some(PathBuf::from("/tmp/cookies.env")));
        assert_eq!(args.port, Some(9100));
        assert!(args.check);
        assert!(!args.print_config);
        assert!(args.host.is_none());
    }
}
