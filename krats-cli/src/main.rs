//! KRATS operator tool.
//!
//! Runs on a clinic machine to read the hardware id, activate and inspect
//! the license, read the audit trail and check a password against the
//! configured policy. On the vendor's machine, `issue` signs new licenses.
//!
//! Usage:
//!   krats hwid
//!   krats activate <LICENSE_KEY>
//!   krats status --json
//!   krats issue --licensee "Klinik" --hwid ABCD-EF01-2345-6789 --seats 5

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use krats_audit::AuditLog;
use krats_auth::PasswordPolicy;
use krats_core::{CoreConfig, telemetry};
use krats_crypto::{KeyStore, SecretKind, SecretSource};
use krats_license::{
    HardwareFingerprint, HardwareId, LicenseIssuer, LicenseManager, LicenseRequest, LicenseStore,
};
use krats_types::ActorId;
use std::io::BufRead;
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "krats")]
#[command(about = "KRATS trust core operator tool")]
struct Args {
    /// Path to config.toml (default: ~/.krats/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print this machine's hardware id
    Hwid {
        /// Also list which identifier sources contributed
        #[arg(long)]
        sources: bool,
    },

    /// Show the license status
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Activate a license key on this machine
    Activate {
        /// The license key (read from stdin if omitted)
        key: Option<String>,
    },

    /// Sign a new license (vendor side)
    Issue {
        #[arg(long)]
        licensee: String,

        /// Hardware id reported by `krats hwid` on the target machine
        #[arg(long)]
        hwid: String,

        /// Maximum user accounts (unlimited if omitted)
        #[arg(long)]
        seats: Option<u32>,

        /// Expiry date, YYYY-MM-DD (perpetual if omitted)
        #[arg(long)]
        expires: Option<NaiveDate>,
    },

    /// Show audit trail entries, newest first
    Audit {
        #[arg(short, long, default_value = "50")]
        limit: usize,

        /// Only entries by this actor
        #[arg(long)]
        actor: Option<String>,

        /// Print entry counts per action instead
        #[arg(long)]
        counts: bool,
    },

    /// Check a password (read from stdin) against the password policy
    CheckPassword {
        /// Username the password belongs to
        #[arg(long)]
        username: Option<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init(args.verbose);

    let config = match &args.config {
        Some(path) => CoreConfig::load_from(path),
        None => CoreConfig::load(),
    }
    .context("Failed to load configuration")?;
    debug!("Data directory: {:?}", config.data_dir());

    match args.command {
        Command::Hwid { sources } => hwid(&config, sources),
        Command::Status { json } => status(&config, json),
        Command::Activate { key } => activate(&config, key),
        Command::Issue {
            licensee,
            hwid,
            seats,
            expires,
        } => issue(&config, licensee, &hwid, seats, expires),
        Command::Audit {
            limit,
            actor,
            counts,
        } => audit(&config, limit, actor, counts),
        Command::CheckPassword { username } => check_password(&config.password, username),
    }
}

fn key_store(config: &CoreConfig) -> KeyStore {
    KeyStore::builder(config.key_dir())
        .env_var(
            SecretKind::EncryptionKey,
            config.env_var(SecretKind::EncryptionKey),
        )
        .env_var(
            SecretKind::LicenseSigning,
            config.env_var(SecretKind::LicenseSigning),
        )
        .build()
}

fn license_manager(config: &CoreConfig) -> Result<(LicenseManager, SecretSource)> {
    let keys = key_store(config);
    let secret = keys
        .resolve(SecretKind::LicenseSigning)
        .context("Failed to resolve the license signing secret")?;
    let source = keys
        .source(SecretKind::LicenseSigning)
        .context("License signing secret resolved without a source")?;
    let manager = LicenseManager::new(
        LicenseStore::new(config.license_path()),
        secret,
        HardwareFingerprint::system(config.hardware.salt.as_str()),
    );
    Ok((manager, source))
}

fn describe_source(config: &CoreConfig, source: SecretSource) -> String {
    match source {
        SecretSource::Environment => format!(
            "environment ({})",
            config.env_var(SecretKind::LicenseSigning)
        ),
        SecretSource::KeyFile => format!(
            "key file ({})",
            config
                .key_dir()
                .join(SecretKind::LicenseSigning.default_file_name())
                .display()
        ),
        SecretSource::Injected => "injected".to_string(),
        SecretSource::Generated => "generated".to_string(),
    }
}

fn hwid(config: &CoreConfig, sources: bool) -> Result<()> {
    let report = HardwareFingerprint::system(config.hardware.salt.as_str()).compute_report();
    println!("{}", report.hardware_id);
    if sources {
        println!("  sources: {}", report.sources.join(", "));
        if report.used_volatile {
            println!("  note: fewer than two stable identifiers; MAC/hostname included");
        }
    }
    if !report.privileged.is_empty() {
        eprintln!(
            "note: uses root-only identifiers ({}); the application must run with the same \
             privileges or it will compute a different hardware id",
            report.privileged.join(", ")
        );
    }
    if sources && !report.unreadable_privileged.is_empty() {
        println!(
            "  note: {} readable by root only; run this command as the account that runs \
             the application",
            report.unreadable_privileged.join(", ")
        );
    }
    Ok(())
}

fn status(config: &CoreConfig, json: bool) -> Result<()> {
    let (manager, secret_source) = license_manager(config)?;
    let status = manager.check().context("Failed to read the license")?;
    let record = manager.current_record().context("Failed to read the license")?;

    if json {
        let value = serde_json::json!({
            "status": status,
            "hardware_id": manager.hardware_id(),
            "signing_secret": describe_source(config, secret_source),
            "license_id": record.as_ref().map(|r| r.redacted_id()),
            "licensee": record.as_ref().map(|r| r.licensee().to_string()),
            "seat_limit": record.as_ref().and_then(|r| r.seat_limit()),
            "expires_at": record.as_ref().and_then(|r| r.expires_at()),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Status:      {status}");
    println!("Hardware id: {}", manager.hardware_id());
    println!("Secret from: {}", describe_source(config, secret_source));
    if let Some(record) = record {
        println!("License:     {}", record.redacted_id());
        println!("Licensee:    {}", record.licensee());
        println!("Bound to:    {}", record.hardware_id());
        match record.seat_limit() {
            Some(seats) => println!("Seats:       {seats}"),
            None => println!("Seats:       unlimited"),
        }
        match record.expires_at() {
            Some(expires) => println!("Expires:     {}", expires.format("%Y-%m-%d %H:%M UTC")),
            None => println!("Expires:     never"),
        }
    }
    if !status.is_valid() {
        bail!("license is not valid ({status})");
    }
    Ok(())
}

fn activate(config: &CoreConfig, key: Option<String>) -> Result<()> {
    let key = match key {
        Some(key) => key,
        None => read_stdin_line("license key")?,
    };
    let (manager, _) = license_manager(config)?;
    let record = manager
        .activate(&key)
        .context("License activation failed")?;
    println!(
        "Activated license {} for {}",
        record.redacted_id(),
        record.licensee()
    );
    Ok(())
}

fn issue(
    config: &CoreConfig,
    licensee: String,
    hwid: &str,
    seats: Option<u32>,
    expires: Option<NaiveDate>,
) -> Result<()> {
    let hardware_id: HardwareId = hwid
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))
        .context("Invalid --hwid")?;
    let mut request = LicenseRequest::new(licensee, hardware_id);
    if let Some(seats) = seats {
        request = request.seat_limit(seats);
    }
    if let Some(date) = expires {
        request = request.expires_at(end_of_day(date)?);
    }

    let secret = key_store(config)
        .resolve(SecretKind::LicenseSigning)
        .context("Failed to resolve the license signing secret")?;
    let record = LicenseIssuer::new(secret).issue(request)?;
    eprintln!("Issued license {}", record.redacted_id());
    println!("{}", record.to_key_string());
    Ok(())
}

fn audit(config: &CoreConfig, limit: usize, actor: Option<String>, counts: bool) -> Result<()> {
    let log = AuditLog::open(config.audit_db_path()).context("Failed to open the audit log")?;

    if counts {
        for (action, count) in log.count_by_action()? {
            println!("{count:>8}  {action}");
        }
        println!("{:>8}  total", log.count()?);
        return Ok(());
    }

    let entries = match actor {
        Some(actor) => {
            let actor = ActorId::new(actor).context("Invalid --actor")?;
            log.by_actor(&actor, limit)?
        }
        None => log.recent(limit)?,
    };
    for stored in entries {
        let e = &stored.entry;
        println!(
            "#{:<6} {} {:<12} {:<18} {:<8} {}",
            stored.seq, e.timestamp, e.actor_id, e.action, e.outcome, e.target
        );
    }
    if let Some(fallback) = log.fallback() {
        let pending = fallback.read_all()?.len();
        if pending > 0 {
            eprintln!(
                "warning: {pending} entries in {} were not written to the audit store",
                fallback.path().display()
            );
        }
    }
    Ok(())
}

fn check_password(policy: &PasswordPolicy, username: Option<String>) -> Result<()> {
    let password = read_stdin_line("password")?;
    let result = policy.check_for(username.as_deref(), &password);
    if result.is_acceptable() {
        println!("Password meets the policy");
        Ok(())
    } else {
        for violation in result.violations() {
            println!("  - {violation}");
        }
        bail!("password rejected")
    }
}

fn read_stdin_line(what: &str) -> Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .with_context(|| format!("Failed to read {what} from stdin"))?;
    let line = line.trim_end_matches(['\r', '\n']).to_string();
    if line.is_empty() {
        bail!("no {what} given");
    }
    Ok(line)
}

fn end_of_day(date: NaiveDate) -> Result<DateTime<Utc>> {
    date.and_hms_opt(23, 59, 59)
        .map(|dt| dt.and_utc())
        .context("Invalid --expires date")
}
