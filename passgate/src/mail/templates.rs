//! Plain-text bodies for token mail.
//!
//! Bodies are built from the token's kind, validation id, expiry and, for
//! code kinds, the code. Client context never reaches a template.

use super::OutgoingMail;
use crate::token::{TokenKind, ValidationToken};
use chrono::Duration;

/// Renders token mail with links rooted at a public base URL
#[derive(Debug, Clone)]
pub struct MailComposer {
    base_url: String,
}

impl MailComposer {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    /// Link a user follows to act on `token`
    pub fn link(&self, token: &ValidationToken) -> String {
        format!("{}/{}/{}", self.base_url, link_path(token.kind), token.validation_id)
    }

    /// Render the message for a freshly created or re-delivered token
    pub fn compose(&self, token: &ValidationToken) -> OutgoingMail {
        let lifetime = describe(token.expires_at - token.created_at);
        let link = self.link(token);

        let mut body = format!(
            "{}\n\n{}\n\n{}\n",
            greeting(token.kind),
            link,
            instruction(token.kind),
        );

        if token.kind.mail_includes_code() {
            body.push_str(&format!("\nOr enter this code: {}\n", token.secret));
        }

        body.push_str(&format!(
            "\nThis link expires in {lifetime}. If you did not request it, you can ignore this email.\n"
        ));

        OutgoingMail {
            to: token.email.clone(),
            subject: subject(token.kind).to_string(),
            body,
        }
    }
}

fn link_path(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::EmailVerification
        | TokenKind::EmailChange
        | TokenKind::PhoneVerification
        | TokenKind::TwoFactor => "verify",
        TokenKind::LoginVerification => "login",
        TokenKind::PasswordReset => "reset-password",
        TokenKind::AccountRecovery => "recover",
    }
}

fn subject(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::EmailVerification => "Confirm your email address",
        TokenKind::LoginVerification => "Your sign-in link",
        TokenKind::PasswordReset => "Reset your password",
        TokenKind::EmailChange => "Confirm your new email address",
        TokenKind::PhoneVerification => "Confirm your phone number",
        TokenKind::TwoFactor => "Your verification code",
        TokenKind::AccountRecovery => "Recover your account",
    }
}

fn greeting(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::EmailVerification => "Welcome! Please confirm your email address:",
        TokenKind::LoginVerification => "Someone asked to sign in to your account. To continue, open:",
        TokenKind::PasswordReset => "We received a request to reset your password. To choose a new one, open:",
        TokenKind::EmailChange => "Please confirm this address for your account:",
        TokenKind::PhoneVerification => "Please confirm your phone number:",
        TokenKind::TwoFactor => "Complete your sign-in:",
        TokenKind::AccountRecovery => "To recover access to your account, open:",
    }
}

fn instruction(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::LoginVerification => "The link signs you in once and cannot be reused.",
        TokenKind::PasswordReset | TokenKind::AccountRecovery => {
            "The link works once, after you have set a new password."
        }
        _ => "The link can be used once.",
    }
}

fn describe(lifetime: Duration) -> String {
    let minutes = lifetime.num_minutes();
    if minutes >= 60 && minutes % 60 == 0 {
        let hours = minutes / 60;
        if hours == 1 {
            "1 hour".to_string()
        } else {
            format!("{hours} hours")
        }
    } else {
        format!("{minutes} minutes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ClientContext;
    use crate::token::NewToken;
    use chrono::Utc;
    use uuid::Uuid;

    fn token(kind: TokenKind) -> ValidationToken {
        let context = ClientContext {
            ip: Some("203.0.113.77".to_string()),
            country: Some("NL".to_string()),
            browser: Some("Firefox".to_string()),
            os: Some("Linux".to_string()),
            device: Some("Desktop".to_string()),
        };
        NewToken::generate(Uuid::new_v4(), "ada@example.com", kind, context, Utc::now()).into_token(7)
    }

    #[test]
    fn test_login_mail_carries_link_only() {
        let composer = MailComposer::new("https://auth.example.com/");
        let t = token(TokenKind::LoginVerification);
        let mail = composer.compose(&t);

        assert_eq!(mail.to, "ada@example.com");
        assert!(mail.body.contains(&format!("https://auth.example.com/login/{}", t.validation_id)));
        assert!(!mail.body.contains(&t.secret));
        for leaked in ["203.0.113.77", "NL", "Firefox", "Linux", "Desktop"] {
            assert!(!mail.body.contains(leaked), "body leaked {leaked}");
        }
        assert!(mail.body.contains("15 minutes"));
    }

    #[test]
    fn test_verification_mail_includes_code() {
        let composer = MailComposer::new("https://auth.example.com");
        let t = token(TokenKind::EmailVerification);
        let mail = composer.compose(&t);
        assert!(mail.body.contains(&t.secret));
        assert!(mail.body.contains("/verify/"));
        assert!(mail.body.contains("24 hours"));
    }

    #[test]
    fn test_reset_mail_never_includes_secret() {
        let composer = MailComposer::new("https://auth.example.com");
        let t = token(TokenKind::PasswordReset);
        let mail = composer.compose(&t);
        assert!(!mail.body.contains(&t.secret));
        assert!(mail.body.contains("/reset-password/"));
        assert!(mail.body.contains("1 hour"));
    }
}
