use super::*;
use once_cell::sync::Lazy;
use regex::Regex;

/// Matches prompts asking for the account password.
static PASSWORD_CUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)password").expect("password cue pattern is valid"));

/// Answers keyboard-interactive challenges with the stored secret.
///
/// Every prompt whose text contains "password" (any case) receives the
/// secret; every other prompt is left unanswered. The responder keeps no
/// state between rounds, so the transport may call it as often as the
/// server re-prompts.
#[derive(Clone)]
pub struct PasswordPromptResponder {
    secret: Arc<str>,
}

impl PasswordPromptResponder {
    pub fn new(secret: impl Into<Arc<str>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Whether `prompt` asks for the password.
    pub fn is_password_prompt(prompt: &str) -> bool {
        PASSWORD_CUE.is_match(prompt)
    }

    /// Builds one response per prompt, in prompt order.
    ///
    /// `None` marks a prompt this responder does not answer.
    pub fn respond<'a, I>(&self, prompts: I) -> Vec<Option<String>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        prompts
            .into_iter()
            .map(|prompt| {
                if Self::is_password_prompt(prompt) {
                    trace!("Answering password prompt {:?}", prompt);
                    Some(self.secret.to_string())
                } else {
                    trace!("Leaving prompt {:?} unanswered", prompt);
                    None
                }
            })
            .collect()
    }
}

impl fmt::Debug for PasswordPromptResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordPromptResponder")
            .field("secret", &"<redacted>")
            .finish()
    }
}
