//! Admin and HR views: employees, attendance logs, today's headcount and
//! reports.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime, Utc};
use clockgate_core::{AttendanceRecord, DailySummary, LogFilter, UserStatus};
use colored::Colorize;
use serde::Serialize;
use tracing::info;

use crate::dashboard::{service_failure, Connection, Dashboard};
use crate::exit_codes::NOT_PERMITTED;
use crate::utils::{format_hours, format_time};

async fn staff_dashboard(connection: Connection) -> Result<Dashboard> {
    let dashboard = Dashboard::connect(connection).await?;
    dashboard.require_staff()?;
    Ok(dashboard)
}

pub async fn employees(connection: Connection, quiet: bool) -> Result<()> {
    let dashboard = staff_dashboard(connection).await?;
    let users = dashboard
        .attendance
        .list_employees()
        .await
        .map_err(|e| service_failure("Could not list employees", e, NOT_PERMITTED))?;

    if quiet {
        return Ok(());
    }
    println!(
        "{}",
        format!(
            "{:<4} {:<20} {:<24} {:<9} {:<12} {}",
            "ID", "Name", "Email", "Role", "Department", "Status"
        )
        .bold()
    );
    for user in &users {
        let status = match user.status {
            UserStatus::Active => "Active".green(),
            UserStatus::Inactive => "Inactive".red(),
        };
        println!(
            "{:<4} {:<20} {:<24} {:<9} {:<12} {}",
            user.id,
            user.name,
            user.email,
            format!("{:?}", user.role).to_lowercase(),
            user.department,
            status
        );
    }
    Ok(())
}

/// Columns of an exported attendance log.
const EXPORT_COLUMNS: [&str; 5] = ["Employee Name", "Date", "Clock In", "Clock Out", "Total Hours"];

/// One exported log line. A missing time is an empty field, missing hours are 0.
#[derive(Serialize)]
struct ExportRow<'a> {
    employee_name: &'a str,
    date: NaiveDate,
    clock_in: Option<NaiveTime>,
    clock_out: Option<NaiveTime>,
    total_hours: f64,
}

impl<'a> From<&'a AttendanceRecord> for ExportRow<'a> {
    fn from(record: &'a AttendanceRecord) -> Self {
        Self {
            employee_name: &record.user_name,
            date: record.date,
            clock_in: record.clock_in,
            clock_out: record.clock_out,
            total_hours: record.total_hours.unwrap_or(0.0),
        }
    }
}

/// Write `records` as CSV, header first.
fn write_csv<W: Write>(records: &[AttendanceRecord], out: W) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(out);
    writer.write_record(EXPORT_COLUMNS)?;
    for record in records {
        writer.serialize(ExportRow::from(record))?;
    }
    writer.flush()?;
    Ok(())
}

/// Export to `target`, `-` being stdout.
fn export_logs(records: &[AttendanceRecord], target: &Path) -> Result<()> {
    if target == Path::new("-") {
        return write_csv(records, io::stdout().lock());
    }
    let file = File::create(target)
        .with_context(|| format!("Could not create {}", target.display()))?;
    write_csv(records, file).with_context(|| format!("Could not write {}", target.display()))
}

pub async fn logs(
    connection: Connection,
    date: Option<NaiveDate>,
    search: Option<String>,
    export: Option<PathBuf>,
    quiet: bool,
) -> Result<()> {
    let dashboard = staff_dashboard(connection).await?;
    let filter = LogFilter { date, search };
    let records = dashboard
        .attendance
        .list_attendance_logs(&filter)
        .await
        .map_err(|e| service_failure("Could not load attendance logs", e, NOT_PERMITTED))?;

    if let Some(target) = export {
        export_logs(&records, &target)?;
        info!(records = records.len(), path = %target.display(), "Exported attendance logs");
        if !quiet && target != Path::new("-") {
            println!(
                "{} Exported {} records to {}",
                "✓".green().bold(),
                records.len(),
                target.display()
            );
        }
        return Ok(());
    }

    if quiet {
        return Ok(());
    }
    if records.is_empty() {
        println!("{}", "No matching records.".dimmed());
        return Ok(());
    }
    println!(
        "{}",
        format!(
            "{:<20} {:<12} {:>6} {:>6} {:>7}",
            "Employee", "Date", "In", "Out", "Hours"
        )
        .bold()
    );
    for record in &records {
        let line = format!(
            "{:<20} {:<12} {:>6} {:>6} {:>7}",
            record.user_name,
            record.date.format("%Y-%m-%d").to_string(),
            format_time(record.clock_in),
            format_time(record.clock_out),
            format_hours(record.total_hours)
        );
        if record.is_late {
            println!("{} {}", line, "late".yellow());
        } else {
            println!("{line}");
        }
    }
    println!("{}", format!("{} records", records.len()).dimmed());
    Ok(())
}

/// Today's headcount: active employees, present, absent and late.
pub async fn stats(connection: Connection, quiet: bool) -> Result<()> {
    let dashboard = staff_dashboard(connection).await?;
    let employees = dashboard
        .attendance
        .list_employees()
        .await
        .map_err(|e| service_failure("Could not list employees", e, NOT_PERMITTED))?;
    let today = LogFilter {
        date: Some(Utc::now().date_naive()),
        search: None,
    };
    let records = dashboard
        .attendance
        .list_attendance_logs(&today)
        .await
        .map_err(|e| service_failure("Could not load attendance logs", e, NOT_PERMITTED))?;

    if quiet {
        return Ok(());
    }
    let summary = DailySummary::tally(&employees, &records);
    println!("{}", "Today".bold());
    println!("   {:<16} {}", "Total employees", summary.total_employees);
    println!("   {:<16} {}", "Present today", summary.present_today.to_string().green());
    println!("   {:<16} {}", "Absent today", summary.absent_today.to_string().red());
    println!("   {:<16} {}", "Late arrivals", summary.late_arrivals.to_string().yellow());
    Ok(())
}

pub async fn reports(connection: Connection, quiet: bool) -> Result<()> {
    let dashboard = staff_dashboard(connection).await?;
    let reports = dashboard
        .attendance
        .get_reports()
        .await
        .map_err(|e| service_failure("Could not load reports", e, NOT_PERMITTED))?;

    if quiet {
        return Ok(());
    }
    println!("{}", "Absenteeism trends".bold());
    for point in &reports.absenteeism_trends {
        println!(
            "   {:<4} {} {:>4}   {} {:>3}",
            point.name,
            "present".dimmed(),
            point.present,
            "absent".dimmed(),
            point.absent
        );
    }
    println!();
    println!("{}", "Average working hours".bold());
    for point in &reports.working_hours {
        println!("   {:<4} {}", point.name, format_hours(Some(point.avg_hours)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, clock_out: Option<(u32, u32, u32)>, hours: Option<f64>) -> AttendanceRecord {
        AttendanceRecord {
            id: "a1".into(),
            user_id: "4".into(),
            user_name: name.into(),
            date: NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
            clock_in: NaiveTime::from_hms_opt(8, 58, 11),
            clock_out: clock_out.and_then(|(h, m, s)| NaiveTime::from_hms_opt(h, m, s)),
            total_hours: hours,
            is_late: false,
        }
    }

    #[test]
    fn test_csv_export_columns() {
        let records = [
            record("David Developer", None, None),
            record("Bob Employee", Some((17, 5, 30)), Some(8.17)),
        ];
        let mut out = Vec::new();
        write_csv(&records, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Employee Name,Date,Clock In,Clock Out,Total Hours");
        assert_eq!(lines[1], "David Developer,2024-05-06,08:58:11,,0.0");
        assert_eq!(lines[2], "Bob Employee,2024-05-06,08:58:11,17:05:30,8.17");
    }

    #[test]
    fn test_csv_export_quotes_names() {
        let mut out = Vec::new();
        write_csv(&[record("Doe, Jane", None, None)], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\"Doe, Jane\",2024-05-06"));
    }

    #[test]
    fn test_csv_export_without_records_keeps_header() {
        let mut out = Vec::new();
        write_csv(&[], &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Employee Name,Date,Clock In,Clock Out,Total Hours\n"
        );
    }
}
