use clap::Parser;
use std::path::PathBuf;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\nAGPLv3 (c) 2021 ",
    env!("CARGO_PKG_AUTHORS")
);

#[derive(Parser, Debug)]
#[command(name = "airdb-install")]
#[command(about = "Install the bundled air quality database to PATH")]
#[command(
    long_about = "Install the bundled air quality database to PATH.\n\
                  WARNING: Make sure you have the correct permission to install the database to PATH"
)]
#[command(after_help = "Example of use:\n  airdb-install /usr/local/share\n  airdb-install C:\\air-database")]
#[command(version, long_version = LONG_VERSION)]
pub struct Cli {
    #[arg(
        value_name = "PATH",
        required_unless_present = "license",
        help = "Path to install the database to"
    )]
    pub path: Option<PathBuf>,

    #[arg(short, long, help = "Print the database license and exit")]
    pub license: bool,

    #[arg(short, long, help = "Accept the database license without prompting")]
    pub yes: bool,

    #[arg(
        long,
        env = "AIRDB_BUNDLE_DIR",
        help = "Directory holding the database, license and pkl/ [default: installer directory]"
    )]
    pub bundle_dir: Option<PathBuf>,

    #[arg(long, help = "Also store flagged observations in the data table")]
    pub with_flags: bool,

    #[arg(short, long, help = "Hide progress bars")]
    pub quiet: bool,

    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, help = "Log file path")]
    pub log_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_path_required_unless_license() {
        assert!(Cli::try_parse_from(["airdb-install"]).is_err());

        let cli = Cli::try_parse_from(["airdb-install", "--license"]).unwrap();
        assert!(cli.license);
        assert!(cli.path.is_none());
    }

    #[test]
    fn test_install_flags() {
        let cli =
            Cli::try_parse_from(["airdb-install", "/opt/air", "-y", "--with-flags", "-q"]).unwrap();

        assert_eq!(cli.path, Some(PathBuf::from("/opt/air")));
        assert!(cli.yes);
        assert!(cli.with_flags);
        assert!(cli.quiet);
        assert!(!cli.verbose);
    }
}
