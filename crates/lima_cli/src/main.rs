//! Command-line status report for the address core.
//!
//! # Responsibility
//! - Load configuration, start logging and open the configured database.
//! - Print a deterministic status summary for quick sanity checks.
//!
//! Usage: `lima_cli [CONFIG_PATH]` (falls back to `LIMA_CONFIG`, then to
//! defaults with an in-memory database).

use lima_core::db::migrations::current_user_version;
use lima_core::repo::suggestion_repo::{SqliteSuggestionRepository, SuggestionRepository};
use lima_core::{AuditTrail, ChangeEventFilter, CoreConfig};
use log::info;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("lima_cli: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = CoreConfig::load(config_path.as_deref())?;
    let logging_started = lima_core::init_from_config(&config.logging)?;

    let conn = match config.database.path.as_deref() {
        Some(path) => lima_core::open_db_with_timeout(path, config.busy_timeout())?,
        None => lima_core::open_db_in_memory()?,
    };
    let schema_version = current_user_version(&conn)?;
    let suggestions = SqliteSuggestionRepository::new(&conn).counts()?;
    let audit_events = AuditTrail::new(&conn).count(&ChangeEventFilter::default())?;

    if logging_started {
        info!(
            "event=cli_status module=cli status=ok schema_version={} pending={} audit_events={}",
            schema_version, suggestions.pending, audit_events
        );
    }

    println!("lima_core version={}", lima_core::core_version());
    println!("schema_version={schema_version}");
    println!("pending_suggestions={}", suggestions.pending);
    println!("audit_events={audit_events}");
    Ok(())
}
