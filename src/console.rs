// ABOUTME: Console space - talks to the bot through standard input and output.
// ABOUTME: Every input line is a direct message, every reply is printed.

use async_trait::async_trait;
use serde_json::json;
use shelly_core::channels::{Inbound, Reply};
use shelly_core::Space;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::Mutex;

pub const CONSOLE_ROOM: &str = "console";

pub struct ConsoleSpace<R, W> {
    lines: Mutex<Lines<R>>,
    output: Mutex<W>,
    sequence: AtomicU64,
}

impl ConsoleSpace<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> ConsoleSpace<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(input: R, output: W) -> Self {
        Self {
            lines: Mutex::new(input.lines()),
            output: Mutex::new(output),
            sequence: AtomicU64::new(0),
        }
    }

    /// Give back the output sink
    pub fn into_output(self) -> W {
        self.output.into_inner()
    }
}

#[async_trait]
impl<R, W> Space for ConsoleSpace<R, W>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, reply: &Reply) -> anyhow::Result<()> {
        let mut output = self.output.lock().await;
        let text = reply.markdown.as_deref().unwrap_or(&reply.text);
        output.write_all(text.as_bytes()).await?;
        output.write_all(b"\n").await?;
        if let Some(file) = &reply.file {
            output
                .write_all(format!("[file: {file}]\n").as_bytes())
                .await?;
        }
        output.flush().await?;
        Ok(())
    }

    async fn receive(&self) -> anyhow::Result<Option<Inbound>> {
        let mut lines = self.lines.lock().await;
        let Some(line) = lines.next_line().await? else {
            return Ok(None);
        };

        let id = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(Inbound::Payload(json!({
            "id": format!("console-{id}"),
            "room_id": CONSOLE_ROOM,
            "room_type": "direct",
            "from_id": "console-user",
            "text": line,
        }))))
    }

    async fn register(&self, url: &str) -> anyhow::Result<()> {
        tracing::info!(url = %url, "Console space has no webhooks, ignoring registration");
        Ok(())
    }

    async fn add_participants(
        &self,
        room_id: &str,
        participants: &[String],
    ) -> anyhow::Result<()> {
        tracing::info!(room_id = %room_id, participants = ?participants, "Participants joined the console");
        Ok(())
    }
}
