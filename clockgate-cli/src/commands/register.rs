//! Device registration.

use anyhow::Result;
use clockgate_core::{codec, CreationOptions, PlatformAuthenticator, SerializedRegistration};
use colored::Colorize;
use tracing::{debug, info};

use crate::dashboard::{service_failure, Connection, Dashboard, Device};
use crate::exit_codes::{CliFailure, GENERAL_ERROR, NOT_PERMITTED};

/// Enroll the device's authenticator for the signed-in user.
pub async fn execute(connection: Connection, device: Device, quiet: bool) -> Result<()> {
    let dashboard = Dashboard::connect(connection).await?;
    let user_id = dashboard.user.id.clone();

    let options = dashboard
        .registration
        .begin_registration(&user_id)
        .await
        .map_err(|e| service_failure("Could not start registration", e, NOT_PERMITTED))?;
    let options = CreationOptions::from_public_key_json(
        &options,
        &dashboard.config.app_origin(),
        dashboard.config.ceremony_timeout,
    )
    .map_err(|e| CliFailure::new(GENERAL_ERROR, format!("Unexpected creation options: {e}")))?;
    debug!(rp_id = %options.rp_id, "Creating credential");

    let authenticator = device.authenticator()?;
    if !authenticator.is_available().await {
        return Err(CliFailure::new(
            NOT_PERMITTED,
            "Biometric verification is not supported on this device or browser.",
        )
        .into());
    }
    let created = authenticator
        .create_credential(&options)
        .await
        .map_err(|e| CliFailure::new(NOT_PERMITTED, format!("Registration failed: {e}")))?;

    let payload = serde_json::to_value(SerializedRegistration::from(&created))?;
    let verified = dashboard
        .registration
        .finish_registration(&user_id, &payload)
        .await
        .map_err(|e| service_failure("Registration failed", e, NOT_PERMITTED))?;
    if !verified {
        return Err(CliFailure::new(NOT_PERMITTED, "Registration was not verified").into());
    }

    let credential_id = codec::encode(&created.credential_id);
    info!(%user_id, %credential_id, "Device registered");
    if !quiet {
        println!("{} {}", "✓".green().bold(), "Device registered".green());
        println!("   {} {}", "Credential:".dimmed(), credential_id);
        println!(
            "   {} clockgate clock-in --credential {}",
            "Use it with:".dimmed(),
            credential_id
        );
    }
    Ok(())
}
