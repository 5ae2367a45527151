//! Slack slash command router.
//!
//! All subcommands arrive through a single `/relay` command. `id` and
//! `whoami` are open to everyone; channel browsing and subscriptions need
//! an active user; channel and token management need an admin.

use std::fmt::Write as _;
use std::sync::Arc;

use slack_morphism::prelude::{
    SlackClient, SlackClientEventsUserState, SlackClientHyperHttpsConnector, SlackCommandEvent,
    SlackCommandEventResponse, SlackMessageContent, SlackMessageResponseType,
};
use tracing::{error, info, warn};

use crate::models::token::Capability;
use crate::models::user::User;
use crate::persistence::token_repo::{generate_secret, hash_secret};
use crate::state::AppState;
use crate::validation::is_valid_name;
use crate::{AppError, Result};

const INSUFFICIENT_PERMISSION: &str = "You may not use this command";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const USAGE: &str = "Usage: /relay <command> [args]\n\
     \n\
     Everyone: id, whoami\n\
     Users: list, subscribe <channel>, unsubscribe <channel>\n\
     Admins: mkchan <channel>, rmchan <channel>, tokens, \
     mktoken <name> <channels,> <capabilities,>, rmtoken <name>";

/// Permission tier a subcommand requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Anyone,
    Active,
    Admin,
}

fn access_for(command: &str) -> Access {
    match command {
        "list" | "subscribe" | "unsubscribe" => Access::Active,
        "mkchan" | "rmchan" | "tokens" | "mktoken" | "rmtoken" => Access::Admin,
        _ => Access::Anyone,
    }
}

/// Handle incoming slash commands routed via Socket Mode.
///
/// # Errors
///
/// Never fails; command errors are logged and reported as a generic reply.
pub async fn handle_command(
    event: SlackCommandEvent,
    _client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    state: SlackClientEventsUserState,
) -> slack_morphism::AnyStdResult<SlackCommandEventResponse> {
    info!(command = ?event.command, user = ?event.user_id, "received slash command");

    let app_state: Option<Arc<AppState>> = {
        let guard = state.read().await;
        guard.get_user_state::<Arc<AppState>>().cloned()
    };

    let reply = match app_state {
        Some(app) => {
            execute(
                &app,
                &event.user_id.to_string(),
                &event.channel_id.to_string(),
                event.text.as_deref().unwrap_or_default(),
            )
            .await
        }
        None => {
            warn!("app state not available; cannot process command");
            "Service is not ready, try again later.".to_owned()
        }
    };

    Ok(SlackCommandEventResponse {
        content: SlackMessageContent {
            text: Some(reply),
            markdown_text: None,
            blocks: None,
            attachments: None,
            upload: None,
            files: None,
            reactions: None,
            metadata: None,
        },
        response_type: Some(SlackMessageResponseType::Ephemeral),
    })
}

/// Run the subcommand in `text` on behalf of `user_id` and return the
/// reply to show.
pub async fn execute(state: &AppState, user_id: &str, channel_id: &str, text: &str) -> String {
    let args: Vec<&str> = text.split_whitespace().collect();
    let Some((&command, args)) = args.split_first() else {
        return USAGE.to_owned();
    };

    match run(state, user_id, channel_id, command, args).await {
        Ok(reply) => reply,
        Err(err) => {
            error!(%err, command, user_id, "slash command failed");
            "Something went wrong, please try again later.".to_owned()
        }
    }
}

async fn run(
    state: &AppState,
    user_id: &str,
    channel_id: &str,
    command: &str,
    args: &[&str],
) -> Result<String> {
    let user = state
        .users()
        .get_by_id(user_id)
        .await?
        .filter(|user| user.active);

    let permitted = match access_for(command) {
        Access::Anyone => true,
        Access::Active => user.is_some(),
        Access::Admin => user.as_ref().is_some_and(|user| user.admin),
    };
    if !permitted {
        warn!(user_id, command, "insufficient permission for slash command");
        return Ok(INSUFFICIENT_PERMISSION.to_owned());
    }

    match (command, user) {
        ("id", _) => Ok(format!(
            "The ID of this chat: {channel_id}\n\nID of sender: {user_id}"
        )),
        ("whoami", user) => Ok(whoami(user.as_ref())),
        ("list", Some(user)) => list(state, &user).await,
        ("subscribe", Some(user)) => change_subscription(state, &user, args, true).await,
        ("unsubscribe", Some(user)) => change_subscription(state, &user, args, false).await,
        ("mkchan", Some(user)) => make_channel(state, &user, args).await,
        ("rmchan", Some(user)) => remove_channel(state, &user, args).await,
        ("tokens", _) => list_tokens(state).await,
        ("mktoken", Some(user)) => make_token(state, &user, args).await,
        ("rmtoken", Some(user)) => remove_token(state, &user, args).await,
        _ => Ok(USAGE.to_owned()),
    }
}

fn whoami(user: Option<&User>) -> String {
    let Some(user) = user else {
        return "Sorry, I don't know you.".to_owned();
    };
    let mut reply = format!("You are {}.", user.greet());
    if user.admin {
        reply.push_str("\nYou are an admin!");
    }
    reply
}

async fn list(state: &AppState, user: &User) -> Result<String> {
    let channels = state.channels().list().await?;
    let subscribed = state.users().list_subscriptions(&user.id).await?;

    let mut reply = String::from("Available channels:\n");
    for channel in channels {
        let prefix = if subscribed.iter().any(|s| s.id == channel.id) {
            "+"
        } else {
            "-"
        };
        let _ = writeln!(reply, " {prefix} {}", channel.name);
    }
    Ok(reply)
}

async fn change_subscription(
    state: &AppState,
    user: &User,
    args: &[&str],
    subscribed: bool,
) -> Result<String> {
    let [name] = args else {
        let verb = if subscribed { "subscribe" } else { "unsubscribe" };
        return Ok(format!("Usage: /relay {verb} <channel>"));
    };

    let Some(channel) = state.channels().get_by_name(name).await? else {
        return Ok("channel not found".to_owned());
    };

    let changed = state
        .channels()
        .change_subscription(&user.id, channel.id, subscribed)
        .await?;
    info!(user_id = %user.id, channel = %name, subscribed, changed, "subscription change");

    Ok(match (changed, subscribed) {
        (true, true) => format!("Successfully subscribed to {name}"),
        (true, false) => format!("Successfully unsubscribed from {name}"),
        (false, true) => format!("Already subscribed to {name}"),
        (false, false) => format!("Not subscribed to {name}"),
    })
}

async fn make_channel(state: &AppState, user: &User, args: &[&str]) -> Result<String> {
    let [name] = args else {
        return Ok("Usage: /relay mkchan <channel>".to_owned());
    };
    if !is_valid_name(name) {
        return Ok("Invalid channel name!".to_owned());
    }

    match state.channels().create(name, Some(&user.id)).await {
        Ok(_) => {
            info!(user_id = %user.id, channel = %name, "channel created");
            Ok("Channel created!".to_owned())
        }
        Err(AppError::AlreadyExists(_)) => Ok(
            "Channel name already used by current or past channels!\n\
             Channels may not be re-created for security reasons."
                .to_owned(),
        ),
        Err(err) => Err(err),
    }
}

async fn remove_channel(state: &AppState, user: &User, args: &[&str]) -> Result<String> {
    let [name] = args else {
        return Ok("Usage: /relay rmchan <channel>".to_owned());
    };
    if !is_valid_name(name) {
        return Ok("Invalid channel name!".to_owned());
    }

    match state.channels().delete_by_name(name).await {
        Ok(()) => {
            info!(user_id = %user.id, channel = %name, "channel deleted");
            Ok(format!("Channel {name} deleted!"))
        }
        Err(AppError::NotFound(_)) => Ok("Channel not found!".to_owned()),
        Err(err) => Err(err),
    }
}

fn flag(enabled: bool) -> &'static str {
    if enabled {
        "\u{2705}"
    } else {
        "\u{274c}"
    }
}

async fn list_tokens(state: &AppState) -> Result<String> {
    let tokens = state.tokens().list().await?;

    let mut reply = String::from("Currently active tokens:\n");
    for token in tokens {
        let allowed = if token.allowed_channels.is_empty() {
            " _NONE!_\n".to_owned()
        } else {
            token
                .allowed_channels
                .iter()
                .fold(String::from("\n"), |mut acc, channel| {
                    let _ = writeln!(acc, "    - {}", channel.name);
                    acc
                })
        };
        let last_used = token.last_used.map_or_else(
            || "Never".to_owned(),
            |at| at.format(TIMESTAMP_FORMAT).to_string(),
        );

        let _ = write!(
            reply,
            "- {}\n  *created*: {}\n  *last used*: {}\n  *allowed channels*:{}  \
             *notify*: {}\n  *question*: {}\n\n",
            token.name,
            token.created_at.format(TIMESTAMP_FORMAT),
            last_used,
            allowed,
            flag(token.cap_notify),
            flag(token.cap_question),
        );
    }
    Ok(reply)
}

async fn make_token(state: &AppState, user: &User, args: &[&str]) -> Result<String> {
    let [name, channels, capabilities] = args else {
        return Ok(format!(
            "Usage: /relay mktoken <name> <channels comma separated> \
             <capabilities comma separated>\nValid capabilities: {}, {}",
            Capability::Question.as_str(),
            Capability::Notify.as_str(),
        ));
    };
    if !is_valid_name(name) {
        return Ok("Invalid token name!".to_owned());
    }

    let channels: Vec<String> = channels.split(',').map(str::to_owned).collect();
    if let Some(bad) = channels.iter().find(|c| !is_valid_name(c)) {
        return Ok(format!("Invalid channel name: {bad}!"));
    }

    let mut caps = Vec::new();
    for raw in capabilities.split(',').filter(|c| !c.is_empty()) {
        let Some(cap) = Capability::parse(raw) else {
            return Ok(format!("Invalid capability: {raw}!"));
        };
        caps.push(cap);
    }
    if caps.is_empty() {
        return Ok("Please set at least one capability!".to_owned());
    }

    let secret = generate_secret();
    match state
        .tokens()
        .create(name, &hash_secret(&secret), &channels, &caps)
        .await
    {
        Ok(_) => {
            info!(user_id = %user.id, token = %name, "token created");
            Ok(format!(
                "*New token created!*\n*Name:* {name}\n*Token:* `{secret}`\n\n\
                 _Keep this token a secret, it will not be shown again!_"
            ))
        }
        Err(AppError::AlreadyExists(_)) => Ok("This name is already in use!".to_owned()),
        Err(AppError::NotFound(_)) => Ok("Channel not found!".to_owned()),
        Err(err) => Err(err),
    }
}

async fn remove_token(state: &AppState, user: &User, args: &[&str]) -> Result<String> {
    let [name] = args else {
        return Ok("Usage: /relay rmtoken <name>".to_owned());
    };
    if !is_valid_name(name) {
        return Ok("Invalid token name!".to_owned());
    }

    match state.tokens().delete_by_name(name).await {
        Ok(()) => {
            info!(user_id = %user.id, token = %name, "token deleted");
            Ok(format!("Token {name} deleted!"))
        }
        Err(AppError::NotFound(_)) => Ok(format!("Token not found: {name}!")),
        Err(err) => Err(err),
    }
}
