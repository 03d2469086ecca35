//! Operator confirmation policy.
//!
//! Destructive or ambiguous steps ask a [`Confirm`] implementation instead of
//! reading the terminal directly. Unattended runs use [`AutoConfirm`], which
//! answers with the default every time.

use console::Term;
use dialoguer::Confirm as Prompt;
use dialoguer::theme::ColorfulTheme;
use std::io::{self, Write};
use tracing::{info, warn};

pub trait Confirm {
    /// Yes/no question; `default` is the answer when the operator just hits enter.
    fn confirm(&self, question: &str, default: bool) -> bool;

    /// Stop until the operator has seen `message`.
    fn acknowledge(&self, message: &str);
}

impl<C: Confirm + ?Sized> Confirm for &C {
    fn confirm(&self, question: &str, default: bool) -> bool {
        (**self).confirm(question, default)
    }

    fn acknowledge(&self, message: &str) {
        (**self).acknowledge(message)
    }
}

impl<C: Confirm + ?Sized> Confirm for Box<C> {
    fn confirm(&self, question: &str, default: bool) -> bool {
        (**self).confirm(question, default)
    }

    fn acknowledge(&self, message: &str) {
        (**self).acknowledge(message)
    }
}

/// Non-interactive policy: every question resolves to its default.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

impl Confirm for AutoConfirm {
    fn confirm(&self, question: &str, default: bool) -> bool {
        info!(
            question,
            answer = if default { "y" } else { "n" },
            "[auto] confirmation resolved to default"
        );
        default
    }

    fn acknowledge(&self, message: &str) {
        warn!(message, "[auto] continuing without operator acknowledgment");
    }
}

/// Terminal prompts through `dialoguer`.
///
/// Falls back to the default answer when the terminal cannot be read.
#[derive(Debug, Default)]
pub struct PromptConfirm;

impl Confirm for PromptConfirm {
    fn confirm(&self, question: &str, default: bool) -> bool {
        match Prompt::with_theme(&ColorfulTheme::default())
            .with_prompt(question)
            .default(default)
            .interact()
        {
            Ok(answer) => answer,
            Err(e) => {
                warn!(question, error = %e, "Prompt failed, using default answer");
                default
            }
        }
    }

    fn acknowledge(&self, message: &str) {
        let mut term = Term::stderr();
        if let Err(e) = write_acknowledgment(&mut term, message) {
            warn!(error = %e, "Could not show acknowledgment prompt, continuing");
            return;
        }
        if let Err(e) = term.read_line() {
            warn!(error = %e, "Could not read acknowledgment, continuing");
        }
    }
}

fn write_acknowledgment(out: &mut impl Write, message: &str) -> io::Result<()> {
    writeln!(out, "{message}")?;
    write!(out, "Press Enter to continue... ")?;
    out.flush()
}

/// Policy for the run: prompts when interactive, defaults otherwise.
pub fn policy(interactive: bool) -> Box<dyn Confirm> {
    if interactive {
        Box::new(PromptConfirm)
    } else {
        Box::new(AutoConfirm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_confirm_returns_default() {
        assert!(AutoConfirm.confirm("Remove header?", true));
        assert!(!AutoConfirm.confirm("Remove header?", false));
    }

    #[test]
    fn test_policy_non_interactive_is_deterministic() {
        let confirm = policy(false);
        for _ in 0..3 {
            assert!(!confirm.confirm("Remove LUKS header?", false));
        }
        confirm.acknowledge("cryptsetup failed");
    }

    #[test]
    fn test_acknowledgment_prompt() {
        let mut out = Vec::new();
        write_acknowledgment(&mut out, "close failed").unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "close failed\nPress Enter to continue... "
        );
    }

    #[test]
    fn test_acknowledgment_write_error_is_returned() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::from(io::ErrorKind::BrokenPipe))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let err = write_acknowledgment(&mut Closed, "close failed").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
