//! Operator-facing adapters: the console challenge prompt and the notice log.
//!
//! Challenges are asked one at a time.  A second phone connecting while the
//! operator is still deciding about the first waits for the prompt lock, and
//! its challenge timeout keeps running while it waits.
//!
//! Each challenge gets a number and the answer has to name it (`y 3`,
//! `n 3`).  A challenge can end without an answer (it timed out, or the phone
//! hung up), and whatever the operator types for it afterwards must not be
//! taken as the answer to the next phone.  Answers naming any other number
//! are ignored.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::application::authorize::{
    ChallengeAnswer, ChallengePrompt, ConnectRequest, Notice, OperatorNotifier,
};

/// Asks the operator on a line-oriented terminal.
pub struct LinePrompt<R, W> {
    io: Mutex<Terminal<R, W>>,
}

struct Terminal<R, W> {
    lines: Lines<R>,
    out: W,
    last_ticket: u64,
    /// Ticket of a challenge that was dropped before it was answered.
    unanswered: Option<u64>,
}

/// The prompt wired to the process's stdin and stdout.
pub type ConsolePrompt = LinePrompt<BufReader<tokio::io::Stdin>, tokio::io::Stdout>;

impl ConsolePrompt {
    pub fn stdio() -> Self {
        LinePrompt::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> LinePrompt<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new(Terminal {
                lines: reader.lines(),
                out: writer,
                last_ticket: 0,
                unanswered: None,
            }),
        }
    }
}

impl<R, W> Terminal<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn say(&mut self, text: &str) -> std::io::Result<()> {
        self.out.write_all(text.as_bytes()).await?;
        self.out.flush().await
    }
}

#[async_trait]
impl<R, W> ChallengePrompt for LinePrompt<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn ask(&self, request: &ConnectRequest) -> ChallengeAnswer {
        let mut term = self.io.lock().await;

        let mut preamble = String::new();
        if let Some(expired) = term.unanswered.take() {
            preamble = format!("Challenge #{expired} has closed; answers to it are ignored.\n");
        }
        term.last_ticket += 1;
        let ticket = term.last_ticket;
        // Cleared again below once this challenge gets its answer.
        term.unanswered = Some(ticket);
        let question = format!("{preamble}{}", question_for(request, ticket));

        loop {
            if term.say(&question).await.is_err() {
                warn!("cannot write challenge prompt; declining");
                term.unanswered = None;
                return ChallengeAnswer::Decline;
            }
            let answer = match term.lines.next_line().await {
                Ok(Some(line)) => parse_answer(&line, ticket),
                Ok(None) => {
                    warn!("operator input closed; declining challenge #{ticket}");
                    Some(ChallengeAnswer::Decline)
                }
                Err(e) => {
                    warn!("failed to read operator input: {e}; declining challenge #{ticket}");
                    Some(ChallengeAnswer::Decline)
                }
            };
            if let Some(answer) = answer {
                term.unanswered = None;
                return answer;
            }
        }
    }
}

fn question_for(request: &ConnectRequest, ticket: u64) -> String {
    let pin = if request.pin.is_empty() {
        "(none)"
    } else {
        request.pin.as_str()
    };
    format!(
        "#{ticket}: phone at {} wants to connect. PIN: {pin}. Allow? [y {ticket} / n {ticket}] ",
        request.source
    )
}

/// `y N`/`yes N` accepts and `n N`/`no N` declines challenge `N`.  Anything
/// else, including an answer for a different challenge, asks again.
fn parse_answer(line: &str, ticket: u64) -> Option<ChallengeAnswer> {
    let mut words = line.split_whitespace();
    let verdict = match words.next()?.to_ascii_lowercase().as_str() {
        "y" | "yes" => ChallengeAnswer::Accept,
        "n" | "no" => ChallengeAnswer::Decline,
        _ => return None,
    };
    let named = words.next()?.trim_start_matches('#').parse::<u64>().ok()?;
    (named == ticket && words.next().is_none()).then_some(verdict)
}

/// Writes operator notices to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl OperatorNotifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice {
            Notice::Running => info!("{}: {}", notice.title(), notice.body()),
            Notice::Connected(addr) | Notice::Disconnected(addr) => {
                info!("{} ({addr}): {}", notice.title(), notice.body())
            }
        }
    }
}
