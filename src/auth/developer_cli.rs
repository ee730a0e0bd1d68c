//! Developer identity borrowed from a logged-in `az` CLI session.

use super::{scope_to_resource, AccessToken, TokenCredential};
use crate::error::AuthError;
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct DeveloperCliCredential {
    program: String,
}

impl Default for DeveloperCliCredential {
    fn default() -> Self {
        Self {
            program: "az".to_string(),
        }
    }
}

impl DeveloperCliCredential {
    /// Use a different executable (e.g. a wrapper script)
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenOutput {
    access_token: String,
    /// Local time, `2024-01-01 12:00:00.000000`
    #[serde(default)]
    expires_on: Option<String>,
    /// Unix seconds, present on newer CLI versions
    #[serde(default, rename = "expires_on")]
    expires_on_unix: Option<i64>,
}

fn parse_cli_output(stdout: &[u8]) -> Result<AccessToken, AuthError> {
    let output: CliTokenOutput =
        serde_json::from_slice(stdout).map_err(|err| AuthError::Parse(err.to_string()))?;

    let expires_on = output
        .expires_on_unix
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .or_else(|| {
            output.expires_on.as_deref().and_then(|s| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                    .ok()
                    .and_then(|naive| Local.from_local_datetime(&naive).single())
                    .map(|local| local.with_timezone(&Utc))
            })
        })
        .ok_or_else(|| AuthError::Parse("CLI token output has no expiry".to_string()))?;

    Ok(AccessToken::new(output.access_token, expires_on))
}

#[async_trait]
impl TokenCredential for DeveloperCliCredential {
    fn source_name(&self) -> &'static str {
        "developer cli"
    }

    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken, AuthError> {
        let scope = scopes
            .first()
            .ok_or_else(|| AuthError::Cli("a scope is required".to_string()))?;
        let resource = scope_to_resource(scope);
        debug!(program = %self.program, resource = %resource, "Requesting token from CLI");

        let output = Command::new(&self.program)
            .args(["account", "get-access-token", "--output", "json", "--resource", resource])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| AuthError::Cli(format!("failed to run {}: {err}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AuthError::Cli(stderr.trim().to_string()));
        }

        parse_cli_output(&output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unix_expiry() {
        let token = parse_cli_output(
            br#"{"accessToken":"tok","expiresOn":"2100-01-01 00:00:00.000000","expires_on":4102444800}"#,
        )
        .unwrap();
        assert_eq!(token.token.as_str(), "tok");
        assert_eq!(token.expires_on.timestamp(), 4_102_444_800);
    }

    #[test]
    fn test_parse_local_expiry() {
        let token =
            parse_cli_output(br#"{"accessToken":"tok","expiresOn":"2100-01-01 00:00:00.000000"}"#)
                .unwrap();
        assert!(token.expires_on > Utc::now());
    }

    #[test]
    fn test_parse_missing_expiry() {
        let err = parse_cli_output(br#"{"accessToken":"tok"}"#).unwrap_err();
        assert!(matches!(err, AuthError::Parse(_)));
    }

    #[tokio::test]
    async fn test_missing_program_is_cli_error() {
        let credential = DeveloperCliCredential::with_program("definitely-not-an-installed-az");
        let err = credential
            .get_token(&["https://vault.azure.net/.default"])
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Cli(_)));
    }
}
