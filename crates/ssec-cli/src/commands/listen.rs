//! Listen command - print events as they arrive

use anyhow::{Context, Result};
use futures::stream::{self, BoxStream, StreamExt};
use ssec::{Event, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::output::OutputContext;

/// Events buffered between the blocking reader thread and the printer
const BLOCKING_BUFFER: usize = 64;

type Events = BoxStream<'static, ssec::Result<Event>>;

/// Stream events from `url` until the server stops, the stream fails,
/// `limit` events were printed, or Ctrl+C is pressed
pub async fn listen(
    url: &str,
    config: StreamConfig,
    blocking: bool,
    limit: Option<usize>,
    ctx: &OutputContext,
) -> Result<()> {
    ctx.info(&format!("Listening to {} ({})...", url, config.method));
    ctx.info("Press Ctrl+C to stop");

    let mut events = if blocking {
        spawn_blocking_reader(url.to_string(), config)
    } else {
        ssec::stream(url, config)
            .context("Failed to open event stream")?
            .boxed()
    };

    // Set up Ctrl+C handler; a second press exits even if a read is blocked
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        if !r.swap(false, Ordering::SeqCst) {
            std::process::exit(130);
        }
    })
    .context("Failed to install Ctrl+C handler")?;

    let mut received = 0usize;
    while running.load(Ordering::SeqCst) && !limit.is_some_and(|n| received >= n) {
        tokio::select! {
            item = events.next() => {
                match item {
                    Some(Ok(event)) => {
                        ctx.print_event(&event);
                        received += 1;
                    }
                    Some(Err(e)) => return Err(e).context("Event stream failed"),
                    None => {
                        ctx.info("Server closed the stream");
                        break;
                    }
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                // Check running flag periodically
            }
        }
    }

    if !running.load(Ordering::SeqCst) {
        ctx.warn("Interrupted");
    }
    ctx.success(&format!("Received {} event(s)", received));

    Ok(())
}

/// Drive the blocking client on its own thread and forward its items.
///
/// The thread is detached: a read blocked on an idle server must not keep
/// the process alive once the printer is done.
fn spawn_blocking_reader(url: String, config: StreamConfig) -> Events {
    let (tx, rx) = mpsc::channel(BLOCKING_BUFFER);

    std::thread::spawn(move || {
        let events = match ssec::blocking::stream(&url, config) {
            Ok(events) => events,
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                return;
            }
        };
        for item in events {
            if tx.blocking_send(item).is_err() {
                break;
            }
        }
    });

    stream::unfold(rx, |mut rx| async move {
        let item = rx.recv().await?;
        Some((item, rx))
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_blocking_reader_forwards_eager_error() {
        let mut events = spawn_blocking_reader("not a url".into(), StreamConfig::default());

        let item = events.next().await.unwrap();
        assert!(matches!(item, Err(ssec::StreamError::InvalidUrl(_))));
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn test_blocking_reader_forwards_validation_error() {
        let config = StreamConfig::builder().chunk_size(0).build();
        let mut events = spawn_blocking_reader("http://localhost/events".into(), config);

        let item = events.next().await.unwrap();
        assert_eq!(
            item.unwrap_err().to_string(),
            "Invalid configuration: chunk_size must be > 0"
        );
    }
}
