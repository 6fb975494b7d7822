//! Human participants

use async_trait::async_trait;
use sdk::types::Role;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;

use super::{Participant, ParticipantError, Reply};
use crate::conversation::transcript::{Transcript, TurnBody};

/// Human whose turns arrive from outside the loop (HTTP, one-shot CLI).
///
/// Always yields, so the loop pauses until the next human turn is appended.
#[derive(Debug, Default)]
pub struct DetachedHuman;

#[async_trait]
impl Participant for DetachedHuman {
    fn role(&self) -> Role {
        Role::Human
    }

    fn timeout(&self, _default: Duration) -> Option<Duration> {
        None
    }

    async fn respond(&self, _transcript: &Transcript) -> Result<Reply, ParticipantError> {
        Ok(Reply::Yield)
    }
}

/// Human at the terminal.
///
/// Prints the turns added since its last prompt, then reads one line from
/// stdin. End of input yields.
pub struct ConsoleHuman {
    stdin: Mutex<BufReader<Stdin>>,
    shown_seq: AtomicU64,
}

impl ConsoleHuman {
    pub fn new() -> Self {
        Self {
            stdin: Mutex::new(BufReader::new(tokio::io::stdin())),
            shown_seq: AtomicU64::new(0),
        }
    }

    /// Sequence number of the last turn already shown
    pub fn shown_seq(&self) -> u64 {
        self.shown_seq.load(Ordering::SeqCst)
    }
}

impl Default for ConsoleHuman {
    fn default() -> Self {
        Self::new()
    }
}

/// Lines a person should see for the turns after `after_seq`
pub fn render_for_console(transcript: &Transcript, after_seq: u64) -> Vec<String> {
    transcript
        .since(after_seq)
        .iter()
        .filter(|t| t.source != Role::Human)
        .filter_map(|t| match &t.body {
            TurnBody::Text { content } => Some(format!("{}: {}", t.source, content)),
            TurnBody::Error { message } => Some(format!("{} (error): {}", t.source, message)),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl Participant for ConsoleHuman {
    fn role(&self) -> Role {
        Role::Human
    }

    // Dropping a pending read_line loses the input buffered so far
    fn timeout(&self, _default: Duration) -> Option<Duration> {
        None
    }

    async fn respond(&self, transcript: &Transcript) -> Result<Reply, ParticipantError> {
        for line in render_for_console(transcript, self.shown_seq.load(Ordering::SeqCst)) {
            println!("{}", line);
        }
        self.shown_seq.store(transcript.last_seq(), Ordering::SeqCst);

        let mut stdin = self.stdin.lock().await;
        loop {
            print!("you: ");
            std::io::stdout()
                .flush()
                .map_err(|e| ParticipantError::Input(e.to_string()))?;

            let mut line = String::new();
            let read = stdin
                .read_line(&mut line)
                .await
                .map_err(|e| ParticipantError::Input(e.to_string()))?;

            if read == 0 {
                return Ok(Reply::Yield);
            }

            let line = line.trim();
            if !line.is_empty() {
                return Ok(Reply::text(line));
            }
        }
    }
}
