use crate::frontend::config::BridgeConfig;
use crate::interop::Bridge;
use crate::logging::{self, LogConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::info;

const USAGE: &str = "Usage: crossbind [OPTIONS] <file>...\n\nOptions:\n  \
     --config PATH      Read configuration from PATH instead of discovering .crossbindrc\n  \
     --guest            Run the files as guest modules instead of host scripts\n  \
     --stats            Print bridge statistics as JSON after each file\n  \
     --log-level LEVEL  trace, debug, info, warn or error\n  \
     --init-config      Write a default .crossbindrc to the current directory\n  \
     --no-color         Disable colored output";

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub paths: Vec<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub guest: bool,
    pub stats: bool,
    pub log_level: Option<String>,
    pub init_config: bool,
    pub color: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            config_path: None,
            guest: false,
            stats: false,
            log_level: None,
            init_config: false,
            color: true,
        }
    }
}

pub struct Cli {
    config: CliConfig,
}

impl Cli {
    pub fn new(config: CliConfig) -> Self {
        Self { config }
    }

    pub fn run(&self) -> Result<i32, String> {
        if self.config.init_config {
            BridgeConfig::default().save(Path::new(".crossbindrc"))?;
            self.print_success("Wrote .crossbindrc");
            if self.config.paths.is_empty() {
                return Ok(0);
            }
        }
        if self.config.paths.is_empty() {
            return Err("No files specified".to_string());
        }

        let bridge_config = match &self.config.config_path {
            Some(path) => BridgeConfig::load(path)?,
            None => BridgeConfig::discover(),
        };

        let mut log_config = LogConfig::from_config(&bridge_config.logging).with_env();
        if let Some(level) = &self.config.log_level {
            log_config.level =
                logging::parse_level(level).ok_or_else(|| format!("Invalid log level: {}", level))?;
        }
        let _guard = logging::init_logging(log_config);

        let mut failures = 0;
        for path in &self.config.paths {
            let bridge = Bridge::new(bridge_config.clone());
            info!(path = %path.display(), guest = self.config.guest, "running file");
            match self.run_file(&bridge, path) {
                Ok(output) => print!("{}", output),
                Err((output, error)) => {
                    print!("{}", output);
                    self.print_error(&format!("{}: {}", path.display(), error));
                    failures += 1;
                }
            }
            if self.config.stats {
                println!("{}", bridge.stats().to_json());
            }
        }

        Ok(if failures == 0 { 0 } else { 1 })
    }

    /// Output produced by the file, and the error it ended with if any
    fn run_file(&self, bridge: &Rc<Bridge>, path: &Path) -> Result<String, (String, String)> {
        let source = fs::read_to_string(path)
            .map_err(|e| (String::new(), format!("Failed to read {}: {}", path.display(), e)))?;
        run_source(bridge, &source, self.config.guest)
    }

    fn print_error(&self, msg: &str) {
        if self.config.color {
            eprintln!("\x1b[31m{}\x1b[0m", msg);
        } else {
            eprintln!("{}", msg);
        }
    }

    fn print_success(&self, msg: &str) {
        if self.config.color {
            println!("\x1b[32m{}\x1b[0m", msg);
        } else {
            println!("{}", msg);
        }
    }
}

/// Run a program and collect what it echoed (host) and printed (guest).
/// Host output comes first.
pub fn run_source(bridge: &Rc<Bridge>, source: &str, guest: bool) -> Result<String, (String, String)> {
    let result = if guest {
        bridge.run_guest(source).map_err(|e| e.to_string())
    } else {
        bridge.run_host(source).map_err(|e| e.to_string())
    };

    let mut output = String::new();
    for value in bridge.host().take_output() {
        match bridge.host().to_display(&value) {
            Ok(text) => output.push_str(&text),
            Err(err) => return Err((output, err.to_string())),
        }
    }
    output.push_str(&bridge.guest().take_output());

    match result {
        Ok(()) => Ok(output),
        Err(err) => Err((output, err)),
    }
}

pub fn parse_args() -> Result<CliConfig, String> {
    parse_arg_list(std::env::args().skip(1))
}

pub fn parse_arg_list(args: impl IntoIterator<Item = String>) -> Result<CliConfig, String> {
    let mut args = args.into_iter();
    let mut config = CliConfig::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--guest" => config.guest = true,
            "--stats" => config.stats = true,
            "--no-color" => config.color = false,
            "--init-config" => config.init_config = true,
            "--config" => {
                let path = args.next().ok_or_else(|| "--config requires an argument".to_string())?;
                config.config_path = Some(PathBuf::from(path));
            }
            "--log-level" => {
                let level = args.next().ok_or_else(|| "--log-level requires an argument".to_string())?;
                config.log_level = Some(level);
            }
            "-h" | "--help" => return Err(USAGE.to_string()),
            flag if flag.starts_with("--") => {
                return Err(format!("Unknown option: {}\n\n{}", flag, USAGE));
            }
            path => config.paths.push(PathBuf::from(path)),
        }
    }

    if config.paths.is_empty() && !config.init_config {
        return Err(USAGE.to_string());
    }

    Ok(config)
}

/// Entry point for CLI binary
pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = parse_args()?;
    let cli = Cli::new(config);
    let exit_code = cli.run()?;
    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_flags_and_paths() {
        let config =
            parse_arg_list(args(&["--guest", "--stats", "--log-level", "debug", "a.gst", "b.gst"])).unwrap();
        assert!(config.guest);
        assert!(config.stats);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.paths, vec![PathBuf::from("a.gst"), PathBuf::from("b.gst")]);
    }

    #[test]
    fn test_parse_rejects_unknown_and_missing_values() {
        assert!(parse_arg_list(args(&["--frobnicate", "x"])).unwrap_err().starts_with("Unknown option"));
        assert_eq!(
            parse_arg_list(args(&["--config"])).unwrap_err(),
            "--config requires an argument"
        );
        assert!(parse_arg_list(Vec::new()).unwrap_err().starts_with("Usage"));
    }

    #[test]
    fn test_run_source_collects_both_outputs() {
        let bridge = Bridge::with_defaults();
        let output = run_source(
            &bridge,
            "$f = embed_guest_func(\"def f(x):\\n    print('guest', x)\\n    return x + 1\");\necho $f(1);",
            false,
        )
        .unwrap();
        assert_eq!(output, "2guest 1\n");
    }

    #[test]
    fn test_run_source_keeps_output_before_error() {
        let bridge = Bridge::with_defaults();
        let (output, error) = run_source(&bridge, "echo 'a'; throw new Exception('stop');", false).unwrap_err();
        assert_eq!(output, "a");
        assert_eq!(error, "Uncaught Exception: stop");
    }
}
