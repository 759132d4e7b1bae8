//! `login` and `logout` commands.

use std::io::{BufRead, Write};

use tracing::info;

use super::{CliError, Context};

/// Authenticates and persists the token into the config file.
pub async fn login(
    mut ctx: Context,
    user: Option<String>,
    password_stdin: bool,
) -> Result<(), CliError> {
    if ctx.config.server.is_empty() {
        return Err(CliError::Usage(
            "no server configured: pass --server <URL> on first login".to_string(),
        ));
    }

    let username = match user {
        Some(user) if !user.is_empty() => user,
        _ => prompt("Username: ")?,
    };
    let password = if password_stdin {
        read_stdin_line()?
    } else {
        prompt("Password: ")?
    };

    let client = ctx.client_for(&ctx.config.server.clone())?;
    let auth = client.authenticate_by_name(&username, &password).await?;

    ctx.config.token = auth.access_token;
    ctx.config.user_id = auth.user.id;
    ctx.config.last_username = auth.user.name.clone();
    ctx.config.save(&ctx.store_dir)?;

    info!(user = %auth.user.name, server = %ctx.config.server, "authenticated");
    println!("Logged in as {} on {}", auth.user.name, ctx.config.server);
    Ok(())
}

/// Drops the stored credentials, keeping server and device identity.
pub fn logout(ctx: &Context) -> Result<(), CliError> {
    let mut config = ctx.config.clone();
    if config.token.is_empty() {
        println!("Not logged in");
        return Ok(());
    }
    config.clear_auth();
    config.save(&ctx.store_dir)?;
    println!("Logged out");
    Ok(())
}

/// Prompts on stderr and reads one line from stdin.
///
/// The password prompt echoes; `--password-stdin` is the non-interactive
/// path for scripts.
fn prompt(label: &str) -> Result<String, CliError> {
    eprint!("{label}");
    std::io::stderr().flush().map_err(|source| CliError::Io {
        context: "prompt".to_string(),
        source,
    })?;
    read_stdin_line()
}

fn read_stdin_line() -> Result<String, CliError> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|source| CliError::Io {
            context: "reading stdin".to_string(),
            source,
        })?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
