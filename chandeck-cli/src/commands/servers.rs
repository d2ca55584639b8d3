use crate::context::AppContext;

pub fn run_servers(ctx: &AppContext) -> anyhow::Result<()> {
    let current = ctx.initial_server();
    if ctx.servers.servers.is_empty() {
        println!(
            "No candidate servers (looked in {}).",
            ctx.config.servers_file.display()
        );
    }
    for server in &ctx.servers.servers {
        let marker = if current.as_deref() == Some(server.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{} {}", marker, server);
    }
    match (&ctx.state.server, &ctx.state_path) {
        (Some(server), Some(path)) => println!("\npersisted: {} ({})", server, path.display()),
        _ => println!("\npersisted: none"),
    }
    if let Some(server) = current.filter(|s| !ctx.servers.servers.contains(s)) {
        println!("active: {} (not in the candidate list)", server);
    }
    Ok(())
}
