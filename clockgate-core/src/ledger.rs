//! In-memory attendance ledger: employees and one attendance record per
//! employee per day.
//!
//! Shared by [`crate::backend::MemoryBackend`] and `clockgate-server`.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::info;

use crate::error::LedgerError;
use crate::types::{
    AbsenteeismPoint, AttendanceRecord, EmployeeDraft, LogFilter, Reports, Role, User, UserStatus,
    WorkingHoursPoint,
};

/// Clock-ins at or after this hour are late.
const LATE_HOUR: u32 = 9;

/// Credential enrolled for the demo employee in the fixture data.
pub const FIXTURE_CREDENTIAL: &[u8] = b"bob-device-1";

/// User owning [`FIXTURE_CREDENTIAL`].
pub const FIXTURE_CREDENTIAL_OWNER: &str = "2";

type DayKey = (String, NaiveDate);

#[derive(Debug, Default)]
pub struct AttendanceLedger {
    users: DashMap<String, User>,
    records: DashMap<DayKey, AttendanceRecord>,
    next_user: AtomicU64,
    next_record: AtomicU64,
}

impl AttendanceLedger {
    pub fn new() -> Self {
        Self {
            next_user: AtomicU64::new(1),
            next_record: AtomicU64::new(1),
            ..Self::default()
        }
    }

    /// A ledger seeded with demo employees and recent attendance relative
    /// to `today`.
    pub fn with_fixtures(today: NaiveDate) -> Self {
        let ledger = Self::new();
        for (id, name, email, role, department, status) in FIXTURE_USERS {
            ledger.users.insert(
                id.to_string(),
                User {
                    id: id.to_string(),
                    name: name.to_string(),
                    email: email.to_string(),
                    role,
                    department: department.to_string(),
                    status,
                },
            );
        }
        ledger
            .next_user
            .store(FIXTURE_USERS.len() as u64 + 1, Ordering::Relaxed);

        for (days_ago, user_id, clock_in, clock_out) in FIXTURE_ATTENDANCE {
            let Some(date) = today.checked_sub_days(Days::new(days_ago)) else {
                continue;
            };
            let Some(name) = ledger.users.get(user_id).map(|u| u.name.clone()) else {
                continue;
            };
            let clock_in = parse_time(clock_in);
            let clock_out = clock_out.and_then(parse_time);
            let record = AttendanceRecord {
                id: ledger.next_record_id(),
                user_id: user_id.to_string(),
                user_name: name,
                date,
                clock_in,
                clock_out,
                total_hours: clock_in.zip(clock_out).map(|(i, o)| hours_between(i, o)),
                is_late: clock_in.is_some_and(is_late),
            };
            ledger.records.insert((user_id.to_string(), date), record);
        }
        ledger
    }

    fn next_record_id(&self) -> String {
        format!("a{}", self.next_record.fetch_add(1, Ordering::Relaxed))
    }

    /// All employees in creation order.
    pub fn users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.iter().map(|u| u.value().clone()).collect();
        users.sort_by(|a, b| (a.id.len(), &a.id).cmp(&(b.id.len(), &b.id)));
        users
    }

    pub fn user(&self, id: &str) -> Option<User> {
        self.users.get(id).map(|u| u.clone())
    }

    pub fn find_by_email(&self, email: &str) -> Option<User> {
        self.users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .map(|u| u.value().clone())
    }

    fn email_taken(&self, email: &str, except: Option<&str>) -> bool {
        self.users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(email) && Some(u.id.as_str()) != except)
    }

    pub fn create_user(&self, draft: EmployeeDraft) -> Result<User, LedgerError> {
        let name = required(draft.name, "name")?;
        let email = required(draft.email, "email")?;
        let department = required(draft.department, "department")?;
        let role = draft.role.ok_or(LedgerError::MissingField("role"))?;

        if self.email_taken(&email, None) {
            return Err(LedgerError::DuplicateEmail(email));
        }

        let user = User {
            id: format!("u-{}", self.next_user.fetch_add(1, Ordering::Relaxed)),
            name,
            email,
            role,
            department,
            status: UserStatus::Active,
        };
        self.users.insert(user.id.clone(), user.clone());
        info!(user_id = %user.id, "Employee created");
        Ok(user)
    }

    pub fn update_user(&self, id: &str, draft: EmployeeDraft) -> Result<User, LedgerError> {
        if let Some(email) = &draft.email {
            if self.email_taken(email, Some(id)) {
                return Err(LedgerError::DuplicateEmail(email.clone()));
            }
        }

        let mut user = self
            .users
            .get_mut(id)
            .ok_or_else(|| LedgerError::UnknownUser(id.to_string()))?;
        if let Some(name) = draft.name {
            user.name = name;
        }
        if let Some(email) = draft.email {
            user.email = email;
        }
        if let Some(role) = draft.role {
            user.role = role;
        }
        if let Some(department) = draft.department {
            user.department = department;
        }
        if let Some(status) = draft.status {
            user.status = status;
        }
        Ok(user.clone())
    }

    /// Soft delete: the employee stays listed as inactive.
    pub fn deactivate_user(&self, id: &str) -> Result<User, LedgerError> {
        let mut user = self
            .users
            .get_mut(id)
            .ok_or_else(|| LedgerError::UnknownUser(id.to_string()))?;
        user.status = UserStatus::Inactive;
        info!(user_id = %id, "Employee deactivated");
        Ok(user.clone())
    }

    fn active_user(&self, id: &str) -> Result<User, LedgerError> {
        let user = self
            .user(id)
            .ok_or_else(|| LedgerError::UnknownUser(id.to_string()))?;
        if !user.is_active() {
            return Err(LedgerError::InactiveUser(id.to_string()));
        }
        Ok(user)
    }

    /// Attendance of `user_id`, newest first.
    pub fn history(&self, user_id: &str) -> Vec<AttendanceRecord> {
        sorted(
            self.records
                .iter()
                .filter(|r| r.user_id == user_id)
                .map(|r| r.value().clone())
                .collect(),
        )
    }

    pub fn record_for(&self, user_id: &str, date: NaiveDate) -> Option<AttendanceRecord> {
        self.records
            .get(&(user_id.to_string(), date))
            .map(|r| r.clone())
    }

    /// Open today's record for `user_id`.
    pub fn clock_in(&self, user_id: &str, at: NaiveDateTime) -> Result<AttendanceRecord, LedgerError> {
        let user = self.active_user(user_id)?;
        let date = at.date();
        let time = truncate_seconds(at.time());

        match self.records.entry((user.id.clone(), date)) {
            Entry::Occupied(_) => Err(LedgerError::AlreadyClockedIn),
            Entry::Vacant(slot) => {
                let record = AttendanceRecord {
                    id: self.next_record_id(),
                    user_id: user.id,
                    user_name: user.name,
                    date,
                    clock_in: Some(time),
                    clock_out: None,
                    total_hours: None,
                    is_late: is_late(time),
                };
                slot.insert(record.clone());
                info!(user_id, %date, clock_in = %time, late = record.is_late, "Clocked in");
                Ok(record)
            }
        }
    }

    /// Close today's record for `user_id`.
    pub fn clock_out(&self, user_id: &str, at: NaiveDateTime) -> Result<AttendanceRecord, LedgerError> {
        self.active_user(user_id)?;
        let date = at.date();
        let time = truncate_seconds(at.time());

        let mut record = self
            .records
            .get_mut(&(user_id.to_string(), date))
            .ok_or(LedgerError::NotClockedIn)?;
        if record.clock_out.is_some() {
            return Err(LedgerError::AlreadyClockedOut);
        }
        record.clock_out = Some(time);
        record.total_hours = record.clock_in.map(|clock_in| hours_between(clock_in, time));
        info!(user_id, %date, clock_out = %time, hours = ?record.total_hours, "Clocked out");
        Ok(record.clone())
    }

    /// Every record matching `filter`, newest first.
    pub fn logs(&self, filter: &LogFilter) -> Vec<AttendanceRecord> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);
        sorted(
            self.records
                .iter()
                .filter(|r| filter.date.map_or(true, |date| r.date == date))
                .filter(|r| {
                    search
                        .as_deref()
                        .map_or(true, |s| r.user_name.to_lowercase().contains(s))
                })
                .map(|r| r.value().clone())
                .collect(),
        )
    }

    /// Weekly absenteeism and working-hours series.
    pub fn reports(&self) -> Reports {
        const WEEK: [(&str, u32, u32, f64); 5] = [
            ("Mon", 140, 10, 7.8),
            ("Tue", 145, 5, 8.1),
            ("Wed", 142, 8, 7.9),
            ("Thu", 148, 2, 8.2),
            ("Fri", 135, 15, 7.5),
        ];
        Reports {
            absenteeism_trends: WEEK
                .iter()
                .map(|(day, present, absent, _)| AbsenteeismPoint {
                    name: day.to_string(),
                    present: *present,
                    absent: *absent,
                })
                .collect(),
            working_hours: WEEK
                .iter()
                .map(|(day, _, _, hours)| WorkingHoursPoint {
                    name: day.to_string(),
                    avg_hours: *hours,
                })
                .collect(),
        }
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, LedgerError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(LedgerError::MissingField(field))
}

fn sorted(mut records: Vec<AttendanceRecord>) -> Vec<AttendanceRecord> {
    records.sort_by(|a, b| b.date.cmp(&a.date).then(b.clock_in.cmp(&a.clock_in)));
    records
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text, "%H:%M:%S").ok()
}

fn truncate_seconds(time: NaiveTime) -> NaiveTime {
    time.with_nanosecond(0).unwrap_or(time)
}

fn is_late(clock_in: NaiveTime) -> bool {
    clock_in.hour() >= LATE_HOUR
}

/// Hours between two times of the same day, rounded to two decimals.
fn hours_between(clock_in: NaiveTime, clock_out: NaiveTime) -> f64 {
    let seconds = (clock_out - clock_in).num_seconds() as f64;
    (seconds / 36.0).round() / 100.0
}

const FIXTURE_USERS: [(&str, &str, &str, Role, &str, UserStatus); 6] = [
    ("1", "Alice Admin", "admin@pardee.com", Role::Admin, "Management", UserStatus::Active),
    ("2", "Bob Employee", "employee@pardee.com", Role::Employee, "Engineering", UserStatus::Active),
    ("3", "Charlie HR", "hr@pardee.com", Role::Hr, "Human Resources", UserStatus::Active),
    ("4", "David Developer", "dev@pardee.com", Role::Employee, "Engineering", UserStatus::Active),
    ("5", "Eve Engineer", "eng@pardee.com", Role::Employee, "Engineering", UserStatus::Inactive),
    ("6", "Frank Finance", "finance@pardee.com", Role::Employee, "Finance", UserStatus::Active),
];

/// (days before today, user, clock in, clock out)
const FIXTURE_ATTENDANCE: [(u64, &str, &str, Option<&str>); 8] = [
    (1, "2", "08:55:12", Some("17:05:30")),
    (2, "2", "09:15:05", Some("17:30:15")),
    (3, "2", "08:59:00", Some("17:01:00")),
    (0, "4", "08:58:11", None),
    (1, "4", "09:01:45", Some("17:00:50")),
    (2, "4", "08:45:20", Some("16:45:30")),
    (1, "6", "08:30:00", Some("17:30:00")),
    (2, "6", "08:25:00", Some("17:35:00")),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 14).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        today().and_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_fixtures_are_relative_to_today() {
        let ledger = AttendanceLedger::with_fixtures(today());
        assert_eq!(ledger.users().len(), 6);
        assert_eq!(ledger.users()[0].id, "1");

        let history = ledger.history("2");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].date, NaiveDate::from_ymd_opt(2024, 3, 13).unwrap());
        assert_eq!(history[0].total_hours, Some(8.17));
        assert!(history[1].is_late);

        let david = ledger.record_for("4", today()).unwrap();
        assert!(david.clock_out.is_none());
    }

    #[test]
    fn test_one_record_per_user_per_day() {
        let ledger = AttendanceLedger::with_fixtures(today());

        let record = ledger.clock_in("2", at(8, 50, 0)).unwrap();
        assert!(!record.is_late);
        assert_eq!(
            ledger.clock_in("2", at(8, 51, 0)),
            Err(LedgerError::AlreadyClockedIn)
        );

        let closed = ledger.clock_out("2", at(17, 20, 0)).unwrap();
        assert_eq!(closed.total_hours, Some(8.5));
        assert_eq!(
            ledger.clock_out("2", at(17, 21, 0)),
            Err(LedgerError::AlreadyClockedOut)
        );
        assert_eq!(
            ledger.clock_in("2", at(18, 0, 0)),
            Err(LedgerError::AlreadyClockedIn)
        );
    }

    #[test]
    fn test_clock_out_requires_clock_in() {
        let ledger = AttendanceLedger::with_fixtures(today());
        assert_eq!(
            ledger.clock_out("6", at(17, 0, 0)),
            Err(LedgerError::NotClockedIn)
        );
        assert_eq!(
            LedgerError::NotClockedIn.to_string(),
            "You haven't clocked in today."
        );
    }

    #[test]
    fn test_late_and_inactive() {
        let ledger = AttendanceLedger::with_fixtures(today());
        assert!(ledger.clock_in("6", at(9, 0, 0)).unwrap().is_late);
        assert_eq!(
            ledger.clock_in("5", at(8, 0, 0)),
            Err(LedgerError::InactiveUser("5".into()))
        );
        assert_eq!(
            ledger.clock_in("99", at(8, 0, 0)),
            Err(LedgerError::UnknownUser("99".into()))
        );
    }

    #[test]
    fn test_employee_lifecycle() {
        let ledger = AttendanceLedger::with_fixtures(today());
        let draft = EmployeeDraft {
            name: Some("Grace Hopper".into()),
            email: Some("grace@pardee.com".into()),
            role: Some(Role::Employee),
            department: Some("Engineering".into()),
            status: None,
        };
        let grace = ledger.create_user(draft.clone()).unwrap();
        assert_eq!(grace.id, "u-7");
        assert!(grace.is_active());
        assert_eq!(
            ledger.create_user(draft),
            Err(LedgerError::DuplicateEmail("grace@pardee.com".into()))
        );
        assert_eq!(
            ledger.create_user(EmployeeDraft::default()),
            Err(LedgerError::MissingField("name"))
        );

        let moved = ledger
            .update_user(
                &grace.id,
                EmployeeDraft {
                    department: Some("Research".into()),
                    ..EmployeeDraft::default()
                },
            )
            .unwrap();
        assert_eq!(moved.department, "Research");
        assert_eq!(moved.email, "grace@pardee.com");

        let gone = ledger.deactivate_user(&grace.id).unwrap();
        assert_eq!(gone.status, UserStatus::Inactive);
        assert_eq!(ledger.users().last().unwrap().id, "u-7");
    }

    #[test]
    fn test_log_filters() {
        let ledger = AttendanceLedger::with_fixtures(today());
        assert_eq!(ledger.logs(&LogFilter::default()).len(), 8);

        let yesterday = LogFilter {
            date: Some(NaiveDate::from_ymd_opt(2024, 3, 13).unwrap()),
            search: None,
        };
        assert_eq!(ledger.logs(&yesterday).len(), 3);

        let frank = LogFilter {
            date: None,
            search: Some("FRANK".into()),
        };
        let logs = ledger.logs(&frank);
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|r| r.user_name == "Frank Finance"));
    }

    #[test]
    fn test_reports_cover_the_work_week() {
        let reports = AttendanceLedger::new().reports();
        assert_eq!(reports.absenteeism_trends.len(), 5);
        assert_eq!(reports.working_hours[3].avg_hours, 8.2);
    }
}
