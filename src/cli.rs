//! Command-line arguments for the sync server.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "mirrorsync-server",
    about = "Mirror a directory tree to connected clients over WebSocket"
)]
pub struct ServerArgs {
    /// Directory to watch for source files.
    pub watch_dir: PathBuf,

    /// Root against which wire paths are relativized. Defaults to the
    /// watch directory.
    #[arg(long)]
    pub project_root: Option<PathBuf>,

    /// Address to serve the sync channel on.
    #[arg(long, env = "MIRRORSYNC_BIND", default_value = "127.0.0.1:9310")]
    pub bind: String,

    /// Debounce window in milliseconds for collapsing event bursts.
    #[arg(long, default_value_t = 100)]
    pub debounce_ms: u64,

    /// Comma-separated file extensions to mirror.
    #[arg(long = "ext", value_delimiter = ',', default_value = "ts,tsx,js,jsx")]
    pub extensions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = ServerArgs::parse_from(["mirrorsync-server", "/tmp/project"]);
        assert_eq!(args.watch_dir, PathBuf::from("/tmp/project"));
        assert_eq!(args.bind, "127.0.0.1:9310");
        assert_eq!(args.debounce_ms, 100);
        assert_eq!(args.extensions, vec!["ts", "tsx", "js", "jsx"]);
    }

    #[test]
    fn extension_list_splits_on_commas() {
        let args = ServerArgs::parse_from(["mirrorsync-server", "/p", "--ext", "ts,json"]);
        assert_eq!(args.extensions, vec!["ts", "json"]);
    }
}
