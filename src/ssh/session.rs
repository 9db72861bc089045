// Session setup and password retries
use crate::config::{self, ConnectionSettings};
use crate::ssh::SshClient;
use crate::utils::error::TransferError;
use crate::utils::interrupt::Interrupt;
use anyhow::Result;
use log::{error, info, warn};

/// Interactive password attempts before giving up.
pub const MAX_PASSWORD_ATTEMPTS: usize = 3;

/// Open the session used for the whole batch, prompting on the terminal when
/// the rule stores no password.
pub fn open_session(settings: &ConnectionSettings, interrupt: &Interrupt) -> Result<SshClient> {
    info!("Connecting to {}@{}:{}...", settings.user, settings.host, settings.port);
    authenticate(
        settings.password.as_deref(),
        |password| SshClient::connect(settings, password),
        || deferred_prompt(interrupt, || config::prompt_password(settings)),
    )
}

/// Run `prompt` with interrupts deferred, so the terminal gets its echo back
/// before an interrupt is acted upon.
pub fn deferred_prompt<P>(interrupt: &Interrupt, prompt: P) -> Result<String>
where
    P: FnOnce() -> Result<String>,
{
    let _deferral = interrupt.defer();
    let password = prompt();
    if interrupt.is_requested() {
        return Err(TransferError::Interrupted.into());
    }
    password
}

/// Drive `connect` until it authenticates.
///
/// A stored password gets exactly one attempt. Prompted passwords are asked
/// again after each rejection, up to [`MAX_PASSWORD_ATTEMPTS`].
pub fn authenticate<H, C, P>(stored: Option<&str>, mut connect: C, mut prompt: P) -> Result<H>
where
    C: FnMut(&str) -> Result<H>,
    P: FnMut() -> Result<String>,
{
    if let Some(password) = stored {
        return connect(password).map_err(|e| {
            if is_auth_failure(&e) {
                error!("Please check the password provided in the configuration file");
                TransferError::StoredPasswordRejected.into()
            } else {
                e
            }
        });
    }

    for attempt in 1..=MAX_PASSWORD_ATTEMPTS {
        let password = prompt()?;
        match connect(&password) {
            Ok(host) => return Ok(host),
            Err(e) if is_auth_failure(&e) => {
                if attempt < MAX_PASSWORD_ATTEMPTS {
                    warn!("Wrong password, try again");
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(TransferError::PasswordAttemptsExhausted {
        attempts: MAX_PASSWORD_ATTEMPTS,
    }
    .into())
}

fn is_auth_failure(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<TransferError>(),
        Some(TransferError::AuthenticationFailed)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn connector<'a>(good: &'static str, calls: &'a mut Vec<String>) -> impl FnMut(&str) -> Result<&'static str> + 'a {
        move |password: &str| {
            calls.push(password.to_string());
            if password == good {
                Ok("session")
            } else {
                Err(TransferError::AuthenticationFailed.into())
            }
        }
    }

    #[test]
    fn prompted_password_is_retried() {
        let mut calls = Vec::new();
        let mut answers = vec!["secret", "oops"];
        let session = authenticate(None, connector("secret", &mut calls), || {
            Ok(answers.pop().unwrap().to_string())
        })
        .unwrap();

        assert_eq!(session, "session");
        assert_eq!(calls, vec!["oops", "secret"]);
    }

    #[test]
    fn stored_password_is_not_retried() {
        let mut calls = Vec::new();
        let mut prompts = 0;
        let err = authenticate(Some("stale"), connector("secret", &mut calls), || {
            prompts += 1;
            Ok("secret".to_string())
        })
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<TransferError>(),
            Some(TransferError::StoredPasswordRejected)
        ));
        assert_eq!(calls, vec!["stale"]);
        assert_eq!(prompts, 0);
    }

    #[test]
    fn retries_are_bounded() {
        let mut calls = Vec::new();
        let err = authenticate(None, connector("secret", &mut calls), || Ok("nope".to_string())).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<TransferError>(),
            Some(TransferError::PasswordAttemptsExhausted { attempts: MAX_PASSWORD_ATTEMPTS })
        ));
        assert_eq!(calls.len(), MAX_PASSWORD_ATTEMPTS);
    }

    #[test]
    fn transport_errors_stop_immediately() {
        let mut prompts = 0;
        let err = authenticate::<(), _, _>(
            None,
            |_| Err(anyhow!("connection refused")),
            || {
                prompts += 1;
                Ok("pw".to_string())
            },
        )
        .unwrap_err();

        assert_eq!(err.to_string(), "connection refused");
        assert_eq!(prompts, 1);
    }

    #[test]
    fn interrupt_at_the_prompt_stops_before_connecting() {
        let interrupt = Interrupt::new();
        let mut calls = Vec::new();
        let err = authenticate(None, connector("secret", &mut calls), || {
            deferred_prompt(&interrupt, || {
                interrupt.request();
                Ok("secret".to_string())
            })
        })
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<TransferError>(),
            Some(TransferError::Interrupted)
        ));
        assert!(calls.is_empty());
    }

    #[test]
    fn earlier_interrupt_does_not_leak_into_the_prompt() {
        let interrupt = Interrupt::new();
        interrupt.request();
        let password = deferred_prompt(&interrupt, || Ok("pw".to_string())).unwrap();
        assert_eq!(password, "pw");
    }
}
