use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::dispatcher::{ChatSnapshot, DispatchOutcome, Dispatcher};
use crate::progress::ProfileProgress;
use crate::session::{Message, QuickReply, Sender, last_quick_replies};

const BAR_WIDTH: usize = 20;

#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Text(&'a str),
    Choice(usize),
    Progress,
    Reset,
    Quit,
    Unknown(&'a str),
}

fn parse_line(line: &str) -> Line<'_> {
    let trimmed = line.trim();
    let Some(cmd) = trimmed.strip_prefix(':') else {
        return Line::Text(line.trim_end_matches(['\r', '\n']));
    };
    match cmd {
        "q" | "quit" | "exit" => Line::Quit,
        "p" | "progress" => Line::Progress,
        "reset" => Line::Reset,
        n => match n.parse::<usize>() {
            Ok(i) if i > 0 => Line::Choice(i),
            _ => Line::Unknown(cmd),
        },
    }
}

fn render_message(msg: &Message) -> String {
    let who = match msg.sender {
        Sender::User => "you",
        Sender::Bot => "bot",
    };
    let mut out = format!("[{}] {who}: {}\n", msg.timestamp.format("%H:%M"), msg.text);
    if let Some(buttons) = &msg.buttons {
        out.push_str(&render_buttons(buttons));
    }
    out
}

fn render_buttons(buttons: &[QuickReply]) -> String {
    let mut out = String::new();
    for (i, b) in buttons.iter().enumerate() {
        out.push_str(&format!("    :{} {}", i + 1, b.label()));
        if let Some(desc) = b.description() {
            out.push_str(&format!(" - {desc}"));
        }
        out.push('\n');
    }
    out
}

fn bar(percent: f64) -> String {
    let filled = ((percent / 100.0) * BAR_WIDTH as f64).round() as usize;
    let filled = filled.min(BAR_WIDTH);
    format!("[{}{}]", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

fn render_progress(progress: &ProfileProgress) -> String {
    let mut out = format!(
        "profile {} {:>3}% ({}/{} fields)\n",
        bar(progress.overall_progress),
        progress.rounded(),
        progress.completed_fields(),
        progress.total_fields()
    );
    for s in &progress.sections {
        let mark = if s.completed { "done" } else { "" };
        out.push_str(&format!(
            "  {:<22} {}/{} {} {}\n",
            s.name,
            s.completed_fields.len(),
            s.fields.len(),
            bar(s.percent()),
            mark
        ));
    }
    out
}

fn render_since(snapshot: &ChatSnapshot, seen: usize) -> String {
    let mut out: String = snapshot.messages.iter().skip(seen).map(render_message).collect();
    if snapshot.connection_degraded {
        out.push_str("(connection degraded)\n");
    }
    out
}

/// Line-oriented chat loop on stdin/stdout.
pub async fn run(dispatcher: &Dispatcher) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    tracing::debug!(sender = %dispatcher.sender_id().await, "terminal chat started");
    let snap = dispatcher.snapshot().await;
    let mut seen = snap.messages.len();
    stdout.write_all(render_since(&snap, 0).as_bytes()).await?;
    stdout.write_all(b"(:N picks a button, :progress, :reset, :quit)\n").await?;
    stdout.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let outcome = match parse_line(&line) {
            Line::Quit => break,
            Line::Text(text) => dispatcher.send_text(text).await,
            Line::Choice(n) => {
                let snap = dispatcher.snapshot().await;
                let payload = last_quick_replies(&snap.messages).get(n - 1).map(|b| b.payload.clone());
                match payload {
                    Some(payload) => dispatcher.send_quick_reply(&payload).await,
                    None => {
                        stdout.write_all(format!("no button :{n}\n").as_bytes()).await?;
                        DispatchOutcome::Ignored
                    }
                }
            }
            Line::Progress => {
                let snap = dispatcher.snapshot().await;
                stdout.write_all(render_progress(&snap.progress).as_bytes()).await?;
                DispatchOutcome::Ignored
            }
            Line::Reset => {
                dispatcher.reset().await;
                seen = 0;
                DispatchOutcome::Ignored
            }
            Line::Unknown(cmd) => {
                stdout.write_all(format!("unknown command :{cmd}\n").as_bytes()).await?;
                DispatchOutcome::Ignored
            }
        };

        let snap = dispatcher.snapshot().await;
        if snap.messages.len() > seen {
            stdout.write_all(render_since(&snap, seen).as_bytes()).await?;
            seen = snap.messages.len();
        }
        if !matches!(outcome, DispatchOutcome::Ignored) {
            let line = format!("profile {} {}%\n", bar(snap.progress.overall_progress), snap.progress.rounded());
            stdout.write_all(line.as_bytes()).await?;
        }
        stdout.flush().await?;
    }
    Ok(())
}
