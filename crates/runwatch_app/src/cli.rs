use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "runwatch", about = "Follow a sync run's progress from its status endpoints")]
pub struct Cli {
    /// RON configuration file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Server base URL, overriding the configuration
    #[arg(long)]
    pub base_url: Option<String>,

    /// Trigger a run on startup
    #[arg(long)]
    pub start: bool,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Exit once the observed run finishes or fails
    #[arg(long)]
    pub until_done: bool,
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::Parser;

    #[test]
    fn flags_parse() {
        let cli = Cli::parse_from([
            "runwatch",
            "--base-url",
            "http://nas.local:8787",
            "--start",
            "--log-file",
            "sync.log",
        ]);
        assert_eq!(cli.base_url.as_deref(), Some("http://nas.local:8787"));
        assert!(cli.start);
        assert!(!cli.until_done);
        assert_eq!(cli.log_file.as_deref(), Some(std::path::Path::new("sync.log")));
        assert!(cli.config.is_none());
    }
}
