use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};

use tfimport::settings::{BackupPolicy, DEFAULT_PARALLELISM, Settings, parse_duration};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import an existing remote object into Terraform state
    Import(ImportArgs),
}

#[derive(clap::Args, Debug)]
pub struct ImportArgs {
    /// Resource address to import into, e.g. aws_instance.web or module.net.aws_instance.web[1]
    pub address: String,

    /// Provider-specific ID of the remote object
    pub id: String,

    /// Directory holding the Terraform configuration
    #[arg(long, default_value = ".")]
    pub config: PathBuf,

    /// Path to read and save state (unless --state-out is set)
    #[arg(long)]
    pub state: Option<PathBuf>,

    /// Path to write the updated state file
    #[arg(long)]
    pub state_out: Option<PathBuf>,

    /// Path to back up the existing state file before writing; "-" disables the backup
    #[arg(long)]
    pub backup: Option<String>,

    /// Lock the state file while importing
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub lock: bool,

    /// How long to retry acquiring the state lock, e.g. 30s or 1m
    #[arg(long, env = "TFIMPORT_LOCK_TIMEOUT", default_value = "0s", value_parser = parse_duration)]
    pub lock_timeout: Duration,

    /// Provider configuration to import with, e.g. cloudflare or cloudflare.staging
    #[arg(long, env = "TFIMPORT_PROVIDER")]
    pub provider: Option<String>,

    /// Limit the number of concurrent operations
    #[arg(long, default_value_t = DEFAULT_PARALLELISM)]
    pub parallelism: usize,
}

impl ImportArgs {
    pub fn to_settings(&self) -> Settings {
        Settings {
            config_dir: self.config.clone(),
            state_path: self.state.clone(),
            state_out_path: self.state_out.clone(),
            backup: BackupPolicy::from_arg(self.backup.as_deref()),
            lock: self.lock,
            lock_timeout: self.lock_timeout,
            provider: self.provider.clone(),
            parallelism: self.parallelism,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serial_test::serial;

    fn import_args(cli: Cli) -> ImportArgs {
        match cli.command {
            Command::Import(args) => args,
        }
    }

    #[test]
    fn test_positional_address_and_id() {
        let cli = Cli::parse_from(["tfimport", "import", "aws_instance.foo", "i-123"]);
        let args = import_args(cli);

        assert_eq!(args.address, "aws_instance.foo");
        assert_eq!(args.id, "i-123");
        assert_eq!(args.config, PathBuf::from("."));
        assert!(args.lock);
        assert_eq!(args.parallelism, 10);
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let result = Cli::try_parse_from(["tfimport", "import", "aws_instance.foo"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_state_and_backup_flags() {
        let cli = Cli::parse_from([
            "tfimport",
            "import",
            "--state=prod.tfstate",
            "--state-out=next.tfstate",
            "--backup=-",
            "--lock=false",
            "aws_instance.foo",
            "i-123",
        ]);
        let settings = import_args(cli).to_settings();

        assert_eq!(settings.state_path, Some(PathBuf::from("prod.tfstate")));
        assert_eq!(settings.state_out_path, Some(PathBuf::from("next.tfstate")));
        assert_eq!(settings.backup, BackupPolicy::Disabled);
        assert!(!settings.lock);
    }

    #[test]
    fn test_invalid_lock_timeout_is_rejected() {
        let result = Cli::try_parse_from([
            "tfimport",
            "import",
            "--lock-timeout=soon",
            "aws_instance.foo",
            "i-123",
        ]);
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_defaults_without_env() {
        let timeout_backup = std::env::var("TFIMPORT_LOCK_TIMEOUT").ok();
        let provider_backup = std::env::var("TFIMPORT_PROVIDER").ok();
        unsafe {
            std::env::remove_var("TFIMPORT_LOCK_TIMEOUT");
            std::env::remove_var("TFIMPORT_PROVIDER");
        }

        let cli = Cli::parse_from(["tfimport", "import", "aws_instance.foo", "i-123"]);

        unsafe {
            if let Some(timeout) = timeout_backup {
                std::env::set_var("TFIMPORT_LOCK_TIMEOUT", timeout);
            }
            if let Some(provider) = provider_backup {
                std::env::set_var("TFIMPORT_PROVIDER", provider);
            }
        }

        let args = import_args(cli);
        assert_eq!(args.lock_timeout, Duration::ZERO);
        assert!(args.provider.is_none());
    }

    #[test]
    #[serial]
    fn test_lock_timeout_from_env_var_fallback() {
        let timeout_backup = std::env::var("TFIMPORT_LOCK_TIMEOUT").ok();

        unsafe {
            std::env::set_var("TFIMPORT_LOCK_TIMEOUT", "1m30s");
        }

        let cli = Cli::parse_from(["tfimport", "import", "aws_instance.foo", "i-123"]);

        unsafe {
            match timeout_backup {
                Some(timeout) => std::env::set_var("TFIMPORT_LOCK_TIMEOUT", timeout),
                None => std::env::remove_var("TFIMPORT_LOCK_TIMEOUT"),
            }
        }

        assert_eq!(import_args(cli).lock_timeout, Duration::from_secs(90));
    }

    #[test]
    #[serial]
    fn test_cli_flag_takes_precedence_over_env() {
        let provider_backup = std::env::var("TFIMPORT_PROVIDER").ok();

        unsafe {
            std::env::set_var("TFIMPORT_PROVIDER", "cloudflare.env");
        }

        let cli = Cli::parse_from([
            "tfimport",
            "import",
            "--provider=cloudflare.cli",
            "cloudflare_zone.main",
            "example.com",
        ]);

        unsafe {
            match provider_backup {
                Some(provider) => std::env::set_var("TFIMPORT_PROVIDER", provider),
                None => std::env::remove_var("TFIMPORT_PROVIDER"),
            }
        }

        assert_eq!(
            import_args(cli).provider,
            Some("cloudflare.cli".to_string())
        );
    }
}
