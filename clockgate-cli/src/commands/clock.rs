//! Clock-in and clock-out commands.

use anyhow::Result;
use clockgate_core::{ActionFailure, FailureReason, ServiceError, StatusKind};
use colored::Colorize;
use tracing::{info, warn};

use crate::dashboard::{Connection, Dashboard, Device};
use crate::exit_codes::{CliFailure, ACTION_REFUSED, NETWORK_ERROR, NOT_PERMITTED};
use crate::utils::format_instant;

/// Execute a clock action behind a biometric verification.
pub async fn execute(
    connection: Connection,
    device: Device,
    clock_in: bool,
    quiet: bool,
) -> Result<()> {
    let dashboard = Dashboard::connect(connection).await?;
    let coordinator = dashboard.coordinator(&device)?;

    if let Some(message) = coordinator.refresh().await {
        warn!(%message, "Continuing without today's status");
    }

    let status = if clock_in {
        coordinator.clock_in().await
    } else {
        coordinator.clock_out().await
    };

    match status.kind {
        StatusKind::Success => {
            info!(user_id = %dashboard.user.id, clock_in, "Clock action recorded");
            if !quiet {
                println!("{} {}", "✓".green().bold(), status.text.green());
                let today = coordinator.clock_status();
                println!(
                    "   {} {}   {} {}",
                    "In:".dimmed(),
                    format_instant(today.clock_in),
                    "Out:".dimmed(),
                    format_instant(today.clock_out)
                );
            }
            Ok(())
        }
        StatusKind::Error | StatusKind::Info => {
            let code = status.failure.as_ref().map_or(ACTION_REFUSED, failure_code);
            Err(CliFailure::new(code, status.text).into())
        }
    }
}

/// Exit code for a clock action that did not go through.
fn failure_code(failure: &ActionFailure) -> i32 {
    match failure {
        ActionFailure::Refused => ACTION_REFUSED,
        ActionFailure::Verification(FailureReason::NetworkError) => NETWORK_ERROR,
        ActionFailure::Verification(_) => NOT_PERMITTED,
        ActionFailure::Service(ServiceError::Network(_)) => NETWORK_ERROR,
        ActionFailure::Service(ServiceError::Unauthorized) => NOT_PERMITTED,
        ActionFailure::Service(_) => ACTION_REFUSED,
    }
}
