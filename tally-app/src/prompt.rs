use std::io::{BufRead, Write};

use async_trait::async_trait;
use tally_common::TallyError;
use tally_social::twitter::PinPrompt;
use url::Url;

/// Asks for the OAuth PIN on the controlling terminal.
///
/// Prompts go to stderr so stdout stays clean for the JSON report.
pub struct StdinPrompt;

#[async_trait]
impl PinPrompt for StdinPrompt {
    async fn verifier(&self, authorize_url: &Url) -> anyhow::Result<String> {
        let url = authorize_url.to_string();
        let pin = tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
            let mut err = std::io::stderr().lock();
            writeln!(err, "Please go here and authorize: {url}")?;
            write!(err, "Paste the PIN here: ")?;
            err.flush()?;

            let mut line = String::new();
            let read = std::io::stdin().lock().read_line(&mut line)?;
            if read == 0 {
                return Err(TallyError::Aborted("stdin closed before a PIN was entered".into()).into());
            }
            Ok(line.trim().to_string())
        })
        .await??;
        Ok(pin)
    }
}
