//! The sampling loop that feeds RAM events to the bar.

use crate::ram::{MemoryReader, MemorySnapshot};
use crate::source::MemorySource;
use sketchysensor_core::{BarCommand, Dispatcher, EventTrigger, ProviderConfig};
use std::convert::Infallible;
use tokio::time;

/// Build the trigger command carrying one snapshot.
///
/// # Examples
///
/// ```rust
/// use sketchysensor_ram::{trigger_command, MemorySnapshot};
///
/// let snapshot = MemorySnapshot {
///     used_percent: 7,
///     swap_used_mb: 512,
///     swap_total_mb: 2048,
///     pressure: 7,
/// };
/// assert_eq!(
///     trigger_command("ram_update", &snapshot).to_string(),
///     "--trigger 'ram_update' used_percent='07' swap_used='512' swap_total='2048'"
/// );
/// ```
#[must_use]
pub fn trigger_command(event_name: &str, snapshot: &MemorySnapshot) -> BarCommand {
    EventTrigger::new(event_name)
        .with_field("used_percent", format!("{:02}", snapshot.used_percent))
        .with_field("swap_used", snapshot.swap_used_mb)
        .with_field("swap_total", snapshot.swap_total_mb)
        .into()
}

/// Periodically samples memory and triggers the configured bar event.
///
/// The event is registered once, before the first trigger. Every tick then
/// samples, dispatches and sleeps for the configured interval. Dispatch
/// failures are logged and never stop the loop.
#[derive(Debug)]
pub struct Reporter<S, D> {
    config: ProviderConfig,
    reader: MemoryReader<S>,
    dispatcher: D,
    registered: bool,
}

impl<S, D> Reporter<S, D>
where
    S: MemorySource,
    D: Dispatcher,
{
    /// Create a reporter that has not registered its event yet.
    pub fn new(config: ProviderConfig, reader: MemoryReader<S>, dispatcher: D) -> Self {
        Self {
            config,
            reader,
            dispatcher,
            registered: false,
        }
    }

    /// Settings the reporter was built with.
    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Whether the `--add event` command has been sent.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Register the event with the bar. Only the first call dispatches.
    pub async fn register(&mut self) {
        if self.registered {
            return;
        }
        let command = BarCommand::add_event(self.config.event_name.as_str());
        self.send(&command).await;
        self.registered = true;
        tracing::info!(event = %self.config.event_name, "registered bar event");
    }

    /// Run one tick: sample, then trigger the event with the new values.
    pub async fn tick(&mut self) -> MemorySnapshot {
        let snapshot = self.reader.sample();
        let command = trigger_command(&self.config.event_name, &snapshot);
        self.send(&command).await;
        snapshot
    }

    /// Register and report forever. Only process termination ends the loop.
    pub async fn run(mut self) -> Infallible {
        self.register().await;
        tracing::debug!(
            interval = ?self.config.update_interval,
            "entering reporting loop"
        );

        loop {
            self.tick().await;
            time::sleep(self.config.update_interval).await;
        }
    }

    async fn send(&mut self, command: &BarCommand) {
        if let Err(e) = self.dispatcher.send(command).await {
            tracing::warn!(event = %command.event_name(), "failed to dispatch bar command: {e}");
        }
    }
}
