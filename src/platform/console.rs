use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;

use crate::agent::Agent;
use crate::session::{ChatSession, Message, Visibility};

#[derive(Debug, PartialEq)]
enum Command<'a> {
    Open,
    Close,
    Minimize,
    Restore,
    /// 1-based index into the last bot message's quick replies
    Quick(usize),
    Transcript,
    Help,
    Quit,
    Say(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    let line = line.trim();
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("/open") => Command::Open,
        Some("/close") => Command::Close,
        Some("/min") => Command::Minimize,
        Some("/restore") => Command::Restore,
        Some("/transcript") => Command::Transcript,
        Some("/help") => Command::Help,
        Some("/quit") => Command::Quit,
        Some("/quick") => match parts.next().and_then(|n| n.parse().ok()) {
            Some(n) if n > 0 => Command::Quick(n),
            _ => Command::Help,
        },
        _ => Command::Say(line),
    }
}

fn render_bot_message(name: &str, message: &Message) -> String {
    let mut out = format!("{}:\n{}\n", name, message.text);
    if let Some(replies) = &message.quick_replies {
        let options: Vec<String> = replies
            .iter()
            .enumerate()
            .map(|(i, label)| format!("[{}] {}", i + 1, label))
            .collect();
        out.push_str(&format!("  {}\n", options.join("  ")));
    }
    out
}

const HELP: &str = "Commands: /open /close /min /restore /quick <n> /transcript /quit";

/// Run a single chat session on stdin/stdout
pub async fn run(agent: Arc<Agent>) -> Result<()> {
    info!("Starting console platform...");

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let name = agent.config.assistant_name.clone();
    let printer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            println!("{}", render_bot_message(&name, &message));
        }
    });

    let mut session = ChatSession::new(agent, Some(tx));
    session.set_on_toggle(Box::new(|open: bool| {
        println!("[chat {}]", if open { "opened" } else { "closed" });
    }));
    session.set_visible(true);
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read from stdin")?
    {
        match parse_command(&line) {
            Command::Open => session.set_visible(true),
            Command::Close => session.close(),
            Command::Minimize => session.minimize(),
            Command::Restore => session.restore(),
            Command::Quick(n) => {
                let label = session
                    .last_quick_replies()
                    .await
                    .and_then(|replies| replies.get(n - 1).cloned());
                match label {
                    Some(label) => {
                        println!("> {}", label);
                        session.choose_quick_reply(&label).await;
                    }
                    None => println!("No quick reply #{}", n),
                }
            }
            Command::Transcript => println!("{}", session.transcript_json().await?),
            Command::Help => println!("{}", HELP),
            Command::Quit => break,
            Command::Say(text) => {
                if session.send_text(text).await.is_none() && session.visibility() != Visibility::Open {
                    println!(
                        "[chat is {:?}; kept draft {:?}]",
                        session.visibility(),
                        session.input()
                    );
                }
            }
        }
    }

    // Dropping the session cancels pending replies and closes the outbox
    drop(session);
    printer.await.ok();
    info!("Console session ended");
    Ok(())
}
