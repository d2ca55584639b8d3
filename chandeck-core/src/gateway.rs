//! Start/stop command dispatch.
//!
//! The gateway only talks to the backend and classifies the reply. Flipping
//! the toggle before the request and reverting it afterwards is the
//! reconciliation cache's job (`optimistic_toggle` / `settle_command`), so
//! the UI gets a structured outcome instead of a blocking alert.

use std::sync::Arc;

use tracing::{error, info};

use crate::api::{ApiError, ChannelAction, ChannelCommand, ControlPlane};
use crate::model::ChannelName;

#[derive(Debug, Clone, thiserror::Error)]
pub enum CommandError {
    #[error("could not {action} {channel}: {source}")]
    Transport {
        channel: ChannelName,
        action: ChannelAction,
        #[source]
        source: ApiError,
    },
    #[error("{action} {channel} rejected: {message}")]
    Rejected {
        channel: ChannelName,
        action: ChannelAction,
        message: String,
    },
}

impl CommandError {
    pub fn channel(&self) -> &str {
        match self {
            CommandError::Transport { channel, .. } | CommandError::Rejected { channel, .. } => {
                channel
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum CommandOutcome {
    Accepted {
        channel: ChannelName,
        should_start: bool,
        message: Option<String>,
    },
    Failed {
        should_start: bool,
        error: CommandError,
    },
}

impl CommandOutcome {
    pub fn channel(&self) -> &str {
        match self {
            CommandOutcome::Accepted { channel, .. } => channel,
            CommandOutcome::Failed { error, .. } => error.channel(),
        }
    }

    pub fn should_start(&self) -> bool {
        match self {
            CommandOutcome::Accepted { should_start, .. }
            | CommandOutcome::Failed { should_start, .. } => *should_start,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, CommandOutcome::Accepted { .. })
    }
}

#[derive(Clone)]
pub struct ControlGateway {
    backend: Arc<dyn ControlPlane>,
}

impl ControlGateway {
    pub fn new(backend: Arc<dyn ControlPlane>) -> Self {
        Self { backend }
    }

    /// Send the command and classify the reply. An acknowledgement with
    /// `status: "error"` is a failure even though the request succeeded.
    pub async fn send(&self, channel: &str, should_start: bool) -> Result<Option<String>, CommandError> {
        let action = ChannelAction::from_should_start(should_start);
        let command = ChannelCommand::new(channel, action);

        let ack = self
            .backend
            .send_command(&command)
            .await
            .map_err(|source| CommandError::Transport {
                channel: channel.to_string(),
                action,
                source,
            })?;

        if ack.is_error() {
            return Err(CommandError::Rejected {
                channel: channel.to_string(),
                action,
                message: ack
                    .message
                    .unwrap_or_else(|| "server reported an error".to_string()),
            });
        }
        Ok(ack.message)
    }

    pub async fn toggle(&self, channel: ChannelName, should_start: bool) -> CommandOutcome {
        match self.send(&channel, should_start).await {
            Ok(message) => {
                info!(
                    "{} {} accepted",
                    ChannelAction::from_should_start(should_start),
                    channel
                );
                CommandOutcome::Accepted {
                    channel,
                    should_start,
                    message,
                }
            }
            Err(e) => {
                error!("{}", e);
                CommandOutcome::Failed {
                    should_start,
                    error: e,
                }
            }
        }
    }
}
