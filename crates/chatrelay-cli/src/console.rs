//! Console transport: replies are printed to stdout.

use std::io::Write;

use async_trait::async_trait;
use chatrelay_core::Transport;

pub struct ConsoleTransport;

#[async_trait]
impl Transport for ConsoleTransport {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, _channel_id: &str, text: &str) -> chatrelay_core::Result<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{text}")?;
        stdout.flush()?;
        Ok(())
    }
}
