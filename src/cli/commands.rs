use crate::cli::args::Cli;
use crate::error::{InstallError, Result};
use crate::processors::{InstallOptions, Installer};
use crate::readers::BundleLayout;
use crate::utils::constants::ACCEPT_ANSWERS;
use crate::utils::permissions::ensure_writable;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::info;

pub fn run(cli: Cli) -> Result<()> {
    let bundle_dir = match cli.bundle_dir {
        Some(dir) => dir,
        None => BundleLayout::default_root()?,
    };

    if cli.license {
        let bundle = BundleLayout::resolve(&bundle_dir)?;
        println!("{}", bundle.license_text()?);
        return Ok(());
    }

    let destination: PathBuf = cli
        .path
        .ok_or_else(|| InstallError::Config("PATH is required".to_string()))?;

    // fail before asking about the license if PATH is not writable
    ensure_writable(&destination)?;

    if !cli.yes {
        let bundle = BundleLayout::resolve(&bundle_dir)?;
        let stdin = std::io::stdin();
        let accepted = agree_to_license(&bundle.license_text()?, &mut stdin.lock())?;
        if !accepted {
            println!("License not accepted. Nothing was installed.");
            return Ok(());
        }
    }

    info!(
        "Installing from {} to {}",
        bundle_dir.display(),
        destination.display()
    );

    let options = InstallOptions::new(&destination, &bundle_dir)
        .with_flags(cli.with_flags)
        .with_silent(cli.quiet);
    let report = Installer::new(options).run()?;

    println!("{}", report.summary());
    println!("SUCCESS!");
    Ok(())
}

/// Show the license and read one answer from `input`
pub fn agree_to_license<R: BufRead>(license: &str, input: &mut R) -> Result<bool> {
    println!("{}", license);
    print!("\nDo you accept? (yes or [No]) ");
    std::io::stdout().flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(is_acceptance(&answer))
}

pub fn is_acceptance(answer: &str) -> bool {
    let answer = answer.trim().to_lowercase();
    ACCEPT_ANSWERS.contains(&answer.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_is_acceptance() {
        assert!(is_acceptance("yes\n"));
        assert!(is_acceptance("Y"));
        assert!(is_acceptance("  YES  "));
        assert!(!is_acceptance(""));
        assert!(!is_acceptance("no"));
        assert!(!is_acceptance("yep"));
    }

    #[test]
    fn test_agree_to_license_reads_one_line() -> Result<()> {
        let mut input = Cursor::new("y\nno\n");
        assert!(agree_to_license("LICENSE TEXT", &mut input)?);

        let mut input = Cursor::new("");
        assert!(!agree_to_license("LICENSE TEXT", &mut input)?);
        Ok(())
    }
}
