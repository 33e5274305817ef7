//! Attendance history.

use anyhow::Result;
use colored::Colorize;

use crate::dashboard::{service_failure, Connection, Dashboard};
use crate::exit_codes::NOT_PERMITTED;
use crate::utils::{format_hours, format_time};

pub async fn execute(connection: Connection, user: Option<String>, quiet: bool) -> Result<()> {
    let dashboard = Dashboard::connect(connection).await?;
    let user_id = match user {
        Some(id) if id != dashboard.user.id => {
            dashboard.require_staff()?;
            id
        }
        _ => dashboard.user.id.clone(),
    };

    let records = dashboard
        .attendance
        .fetch_history(&user_id)
        .await
        .map_err(|e| service_failure("Could not load attendance history", e, NOT_PERMITTED))?;

    if quiet {
        return Ok(());
    }
    if records.is_empty() {
        println!("{}", "No attendance records.".dimmed());
        return Ok(());
    }

    println!(
        "{}",
        format!("{:<12} {:>6} {:>6} {:>7}  {}", "Date", "In", "Out", "Hours", "").bold()
    );
    for record in &records {
        let late = if record.is_late {
            "late".yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "{:<12} {:>6} {:>6} {:>7}  {}",
            record.date.format("%Y-%m-%d").to_string(),
            format_time(record.clock_in),
            format_time(record.clock_out),
            format_hours(record.total_hours),
            late
        );
    }
    Ok(())
}
