use std::{sync::Arc, time::Duration};

use shared::protocol::{is_response_command, Command};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, warn};

use crate::{
    error::{CommandError, TransportError},
    message_log::{Message, MessageLog},
    transport::FrameSink,
};

// Responses are matched by command name, not `requestId`, so one command is
// in flight at a time. A late response can still answer the next command.
pub struct Correlator {
    sink: Arc<dyn FrameSink>,
    log: MessageLog,
    poll_interval: Duration,
    in_flight: Mutex<()>,
}

impl Correlator {
    pub fn new(sink: Arc<dyn FrameSink>, log: MessageLog, poll_interval: Duration) -> Self {
        Self {
            sink,
            log,
            poll_interval,
            in_flight: Mutex::new(()),
        }
    }

    /// `timeout` includes any wait for an earlier command. Not retried.
    pub async fn send_and_await(
        &self,
        command: &Command,
        timeout: Duration,
    ) -> Result<Message, CommandError> {
        let started = Instant::now();
        let deadline = started + timeout;
        let Ok(_turn) = tokio::time::timeout_at(deadline, self.in_flight.lock()).await else {
            warn!(
                command = %command.command,
                timeout_ms = timeout.as_millis() as u64,
                "command: another command still in flight, not sent"
            );
            return Err(CommandError::Timeout {
                command: command.command,
                waited: started.elapsed(),
            });
        };

        let frame = serde_json::to_string(command).map_err(TransportError::from)?;
        let mut next = self.log.len().await;
        debug!(
            command = %command.command,
            request_id = %command.request_id,
            "command: sending"
        );
        self.sink.send_text(frame).await?;

        loop {
            for message in self.log.since(next).await {
                next = message.sequence + 1;
                if is_response_command(&message.command) {
                    debug!(
                        command = %command.command,
                        response = %message.command,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "command: response received"
                    );
                    return Ok(message);
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(
                    command = %command.command,
                    request_id = %command.request_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "command: no response before timeout"
                );
                return Err(CommandError::Timeout {
                    command: command.command,
                    waited: started.elapsed(),
                });
            }
            self.log
                .wait_for_growth(next, remaining.min(self.poll_interval))
                .await;
        }
    }
}

#[cfg(test)]
#[path = "tests/correlator_tests.rs"]
mod tests;
