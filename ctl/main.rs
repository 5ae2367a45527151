#![forbid(unsafe_code)]

//! `question-relay-ctl`: command-line producer for `question-relay`.
//!
//! Sends notifications and questions through the HTTP API and reads or
//! long-polls answers. Useful from shell scripts and cron jobs.

use clap::{Parser, Subcommand};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};

#[derive(Debug, Parser)]
#[command(
    name = "question-relay-ctl",
    about = "CLI producer for the question-relay HTTP API",
    version,
    long_about = None
)]
struct Cli {
    /// Base URL of the relay API.
    #[arg(long, default_value = "http://localhost:8081")]
    url: String,

    /// API token secret.
    #[arg(long, env = "RELAY_TOKEN", hide_env_values = true)]
    token: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send a notification to every subscriber of a channel.
    Notify {
        /// Target channel name.
        channel: String,
        /// Message text.
        text: String,
    },

    /// Ask a question; prints the new question id.
    Ask {
        /// Target channel name.
        channel: String,
        /// Question text.
        text: String,
        /// Answer option as `data` or `data:label`; repeat for each option.
        #[arg(long = "option", short = 'o', required = true)]
        options: Vec<String>,
    },

    /// Show the current state of a question.
    Status {
        /// Question id.
        id: String,
    },

    /// Wait for the answer of a question.
    Poll {
        /// Question id.
        id: String,
    },
}

/// Split `data[:label]` into an option object.
fn parse_option(raw: &str) -> Value {
    match raw.split_once(':') {
        Some((data, label)) => json!({ "data": data, "label": label }),
        None => json!({ "data": raw, "label": "" }),
    }
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}{path}", base.trim_end_matches('/'))
}

async fn send(request: RequestBuilder) -> Result<(StatusCode, Option<Value>), reqwest::Error> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;
    Ok((status, serde_json::from_str(&body).ok()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Cli::parse();
    let client = Client::new();
    let auth = |builder: RequestBuilder| builder.bearer_auth(&args.token);

    let request = match &args.command {
        Command::Notify { channel, text } => auth(
            client
                .post(endpoint(&args.url, "/notify"))
                .json(&json!({ "channel": channel, "text": text })),
        ),
        Command::Ask {
            channel,
            text,
            options,
        } => {
            let options: Vec<Value> = options.iter().map(|o| parse_option(o)).collect();
            auth(client.post(endpoint(&args.url, "/question")).json(&json!({
                "channel": channel,
                "text": text,
                "options": options,
            })))
        }
        Command::Status { id } => auth(client.get(endpoint(&args.url, &format!("/question/{id}")))),
        Command::Poll { id } => {
            auth(client.get(endpoint(&args.url, &format!("/question/{id}/poll"))))
        }
    };

    match send(request).await {
        Ok((status, body)) if status.is_success() => match body {
            Some(Value::Object(obj)) if matches!(args.command, Command::Ask { .. }) => {
                println!(
                    "{}",
                    obj.get("id").and_then(Value::as_str).unwrap_or_default()
                );
            }
            Some(body) => {
                println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
            }
            None if status == StatusCode::NO_CONTENT => {
                eprintln!("No answer yet");
                std::process::exit(2);
            }
            None => println!("OK"),
        },
        Ok((status, body)) => {
            let reason = body
                .as_ref()
                .and_then(|b| b.get("reason").or_else(|| b.get("error")))
                .and_then(Value::as_str)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed"));
            eprintln!("Error ({}): {reason}", status.as_u16());
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("Failed to reach server: {err}");
            eprintln!("Is question-relay listening on '{}'?", args.url);
            std::process::exit(1);
        }
    }
}
