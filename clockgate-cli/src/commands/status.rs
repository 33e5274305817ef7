//! Today's attendance status.

use anyhow::Result;
use chrono::Utc;
use clockgate_core::ClockAction;
use colored::Colorize;

use crate::dashboard::{service_failure, Connection, Dashboard};
use crate::exit_codes::NOT_PERMITTED;
use crate::utils::{format_hours, format_time};

/// Show today's clock-in/out and which clock action is available.
pub async fn execute(connection: Connection, quiet: bool) -> Result<()> {
    let dashboard = Dashboard::connect(connection).await?;
    let history = dashboard
        .attendance
        .fetch_history(&dashboard.user.id)
        .await
        .map_err(|e| {
            service_failure("Could not fetch today's attendance status", e, NOT_PERMITTED)
        })?;

    if quiet {
        return Ok(());
    }

    let today = Utc::now().date_naive();
    let record = history.iter().find(|r| r.date == today);
    let (clock_in, clock_out) = record.map_or((None, None), |r| (r.clock_in, r.clock_out));

    println!();
    println!(
        "{} {}",
        dashboard.user.name.bold(),
        format!("<{}>", dashboard.user.email).dimmed()
    );
    println!("   {} {}", "Date:".dimmed(), today.format("%A, %d %B %Y"));
    println!("   {} {}", "Clock in:".dimmed(), format_time(clock_in));
    println!("   {} {}", "Clock out:".dimmed(), format_time(clock_out));
    if let Some(hours) = record.and_then(|r| r.total_hours) {
        println!("   {} {}", "Worked:".dimmed(), format_hours(Some(hours)));
    }

    let next = match (clock_in, clock_out) {
        (None, _) => Some(ClockAction::ClockIn),
        (Some(_), None) => Some(ClockAction::ClockOut),
        (Some(_), Some(_)) => None,
    };
    match next {
        Some(action) => println!("   {} {}", "Next:".dimmed(), action.label().cyan()),
        None => println!("   {} {}", "Next:".dimmed(), "Done for today".green()),
    }
    Ok(())
}
