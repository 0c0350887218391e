use serde::Serialize;

use crate::error::{AppError, EmailError};
use crate::validators::is_valid_email;

/// HTTP client for the email relay. The only capability the identity core
/// needs from it is delivering a verification link.
#[derive(Clone)]
pub struct EmailClient {
    http_client: reqwest::Client,
    relay_url: String,
    sender: SenderAddress,
    /// Public base URL of this application, used to build the link
    verification_base_url: String,
}

#[derive(Clone)]
pub struct SenderAddress(String);

impl SenderAddress {
    pub fn parse(s: String) -> Result<Self, AppError> {
        let email = is_valid_email(&s)?;
        Ok(Self(email))
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

#[derive(Serialize)]
struct SendEmailRequest {
    from: String,
    to: String,
    #[serde(rename = "Subject")]
    subject: String,
    #[serde(rename = "Html")]
    html: String,
}

impl EmailClient {
    pub fn new(
        relay_url: String,
        sender: SenderAddress,
        verification_base_url: String,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            http_client,
            relay_url,
            sender,
            verification_base_url,
        }
    }

    /// Deliver the account-activation link for a freshly issued
    /// verification token.
    pub async fn send_verification_email(
        &self,
        recipient: &str,
        token: &str,
    ) -> Result<(), AppError> {
        let link = format!("{}/auth/verify?token={}", self.verification_base_url, token);
        let html = format!(
            "Welcome! Click <a href=\"{}\">here</a> to verify your account. \
             The link is valid for 24 hours.",
            link
        );

        self.send_email(recipient, "Verify your account", &html).await
    }

    async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        html_content: &str,
    ) -> Result<(), AppError> {
        let url = format!("{}/email", self.relay_url);
        let request = SendEmailRequest {
            from: self.sender.inner().to_string(),
            to: recipient.to_string(),
            subject: subject.to_string(),
            html: html_content.to_string(),
        };

        self.http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send email: {}", e);
                AppError::Email(EmailError::SendFailed(e.to_string()))
            })?
            .error_for_status()
            .map_err(|e| {
                tracing::error!("Email service returned error: {}", e);
                AppError::Email(EmailError::ServiceUnavailable(e.to_string()))
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_parse_valid_email() {
        let sender = SenderAddress::parse("no-reply@school.example".to_string());
        assert!(sender.is_ok());
    }

    #[test]
    fn test_sender_parse_invalid_email() {
        let sender = SenderAddress::parse("invalid-email".to_string());
        assert!(sender.is_err());
    }
}
