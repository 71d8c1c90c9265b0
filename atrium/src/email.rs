//! Email service for activation, rejection and password-reset mail.

use lettre::{
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use std::path::Path;

use crate::{config::Config, errors::Error};

pub struct EmailService {
    transport: EmailTransport,
    from_email: String,
    from_name: String,
    dashboard_url: String,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

impl EmailService {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let email_config = &config.email;

        let transport = match &email_config.transport {
            crate::config::EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let smtp_builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                }
                .map_err(|e| Error::Internal {
                    operation: format!("create SMTP transport: {e}"),
                })?
                .port(*port)
                .credentials(Credentials::new(username.clone(), password.clone()));

                EmailTransport::Smtp(smtp_builder.build())
            }
            crate::config::EmailTransportConfig::File { path } => {
                // File transport for development/testing
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir).map_err(|e| Error::Internal {
                        operation: format!("create emails directory: {e}"),
                    })?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
        };

        Ok(Self {
            transport,
            from_email: email_config.from_email.clone(),
            from_name: email_config.from_name.clone(),
            dashboard_url: config.dashboard_url.clone(),
        })
    }

    /// Send the activation email for an approved applicant or invited
    /// collaborator. The link embeds the token id and the raw token.
    pub async fn send_activation_email(
        &self,
        to_email: &str,
        to_name: Option<&str>,
        token_id: &uuid::Uuid,
        token: &str,
    ) -> Result<(), Error> {
        let activation_link = format!("{}/activate-account?id={}&token={}", self.dashboard_url, token_id, token);

        let subject = "Welcome - activate your membership";
        let body = self.create_activation_body(to_name, &activation_link);

        self.send_email(to_email, to_name, subject, &body).await
    }

    /// Notify a rejected applicant. Best-effort at every call site.
    pub async fn send_rejection_email(&self, to_email: &str, to_name: Option<&str>, reason: &str) -> Result<(), Error> {
        let subject = "Your membership application";
        let body = self.create_rejection_body(to_name, reason);

        self.send_email(to_email, to_name, subject, &body).await
    }

    pub async fn send_password_reset_email(
        &self,
        to_email: &str,
        to_name: Option<&str>,
        token_id: &uuid::Uuid,
        token: &str,
    ) -> Result<(), Error> {
        let reset_link = format!("{}/reset-password?id={}&token={}", self.dashboard_url, token_id, token);

        let subject = "Password Reset Request";
        let body = self.create_password_reset_body(to_name, &reset_link);

        self.send_email(to_email, to_name, subject, &body).await
    }

    async fn send_email(&self, to_email: &str, to_name: Option<&str>, subject: &str, body: &str) -> Result<(), Error> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| Error::Internal {
                operation: format!("parse from email: {e}"),
            })?;

        let to = if let Some(name) = to_name {
            format!("{name} <{to_email}>")
        } else {
            to_email.to_string()
        }
        .parse::<Mailbox>()
        .map_err(|e| Error::Internal {
            operation: format!("parse to email: {e}"),
        })?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body.to_string())
            .map_err(|e| Error::Internal {
                operation: format!("build email message: {e}"),
            })?;

        match &self.transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message).await.map_err(|e| Error::EmailDelivery {
                    message: format!("SMTP send failed: {e}"),
                })?;
            }
            EmailTransport::File(file) => {
                file.send(message).await.map_err(|e| Error::EmailDelivery {
                    message: format!("file transport send failed: {e}"),
                })?;
            }
        }

        Ok(())
    }

    fn create_activation_body(&self, to_name: Option<&str>, activation_link: &str) -> String {
        let greeting = match to_name {
            Some(name) => format!("Hello {name},"),
            None => "Hello,".to_string(),
        };

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Activate your membership</title>
    <style>
        body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
        .footer {{ margin-top: 30px; font-size: 12px; color: #666; }}
    </style>
</head>
<body>
    <div class="container">
        <h2>Your application has been approved</h2>

        <p>{greeting}</p>

        <p>Welcome to the community. Set your password to activate your account:</p>

        <p><a href="{activation_link}">Activate your account</a></p>

        <p>Or copy and paste this link into your browser:</p>
        <p>{activation_link}</p>

        <p>The link is valid for 48 hours.</p>

        <div class="footer">
            <p>This is an automated message, please do not reply to this email.</p>
        </div>
    </div>
</body>
</html>"#
        )
    }

    fn create_rejection_body(&self, to_name: Option<&str>, reason: &str) -> String {
        let greeting = match to_name {
            Some(name) => format!("Hello {name},"),
            None => "Hello,".to_string(),
        };

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Your membership application</title>
    <style>
        body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
    </style>
</head>
<body>
    <div class="container">
        <p>{greeting}</p>

        <p>Thank you for your interest in joining. After review, we are unable to
        offer you membership at this time.</p>

        <p>{reason}</p>

        <p>You are welcome to apply again in the future.</p>
    </div>
</body>
</html>"#
        )
    }

    fn create_password_reset_body(&self, to_name: Option<&str>, reset_link: &str) -> String {
        let greeting = match to_name {
            Some(name) => format!("Hello {name},"),
            None => "Hello,".to_string(),
        };

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Password Reset Request</title>
    <style>
        body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
        .footer {{ margin-top: 30px; font-size: 12px; color: #666; }}
    </style>
</head>
<body>
    <div class="container">
        <h2>Password Reset Request</h2>

        <p>{greeting}</p>

        <p>We received a request to reset your password. If you didn't make this request, you can safely ignore this email.</p>

        <p><a href="{reset_link}">Reset your password</a></p>

        <p>Or copy and paste this link into your browser:</p>
        <p>{reset_link}</p>

        <p>This link will expire in 30 minutes for security reasons.</p>

        <div class="footer">
            <p>This is an automated message, please do not reply to this email.</p>
        </div>
    </div>
</body>
</html>"#
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_config;

    #[tokio::test]
    async fn test_email_service_creation() {
        let config = create_test_config();
        assert!(EmailService::new(&config).is_ok());
    }

    #[tokio::test]
    async fn test_activation_email_body() {
        let config = create_test_config();
        let email_service = EmailService::new(&config).unwrap();

        let body = email_service.create_activation_body(Some("Ada Lovelace"), "https://example.com/activate?id=1&token=abc");

        assert!(body.contains("Hello Ada Lovelace,"));
        assert!(body.contains("https://example.com/activate?id=1&token=abc"));
        assert!(body.contains("Activate your account"));
    }

    #[tokio::test]
    async fn test_rejection_email_body() {
        let config = create_test_config();
        let email_service = EmailService::new(&config).unwrap();

        let body = email_service.create_rejection_body(None, "Application incomplete");

        assert!(body.contains("Hello,"));
        assert!(body.contains("Application incomplete"));
    }

    #[tokio::test]
    async fn test_file_transport_writes_mail() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config();
        config.email.transport = crate::config::EmailTransportConfig::File {
            path: temp_dir.path().to_string_lossy().to_string(),
        };

        let email_service = EmailService::new(&config).unwrap();
        email_service
            .send_rejection_email("applicant@example.com", Some("Applicant"), "Not a fit")
            .await
            .unwrap();

        let written: Vec<_> = std::fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(written.len(), 1);
    }
}
