mod control;
mod list;
mod servers;

pub use control::run_control;
pub use list::run_list;
pub use servers::run_servers;

use crate::context::AppContext;

/// The server a one-shot command talks to.
fn target_server(ctx: &AppContext) -> anyhow::Result<String> {
    ctx.initial_server().ok_or_else(|| {
        anyhow::anyhow!("no server configured; pass --server or list one in the servers file")
    })
}
