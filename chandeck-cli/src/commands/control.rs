use std::sync::Arc;

use chandeck_core::api::{ChannelAction, ControlPlane};
use chandeck_core::gateway::{CommandError, ControlGateway};

use crate::context::AppContext;

pub async fn run_control(ctx: &AppContext, channel: &str, should_start: bool) -> anyhow::Result<()> {
    let server = super::target_server(ctx)?;
    let backend = ctx.factory().connect(&server);
    let line = send(backend, channel, should_start).await?;
    println!("{}", line);
    Ok(())
}

async fn send(
    backend: Arc<dyn ControlPlane>,
    channel: &str,
    should_start: bool,
) -> Result<String, CommandError> {
    let action = ChannelAction::from_should_start(should_start);
    let message = ControlGateway::new(backend).send(channel, should_start).await?;
    Ok(match message {
        Some(message) => format!("{} {}: {}", action, channel, message),
        None => format!("{} {}: ok", action, channel),
    })
}
