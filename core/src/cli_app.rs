/// One-shot commands against the sync endpoints, for poking a server by hand
use crate::badge::{message_badge_count, BadgeState};
use crate::config::Config;
use crate::sync_types::{MessageQuery, NotificationQuery, ReadReceipt};
use crate::transport::{HttpTransport, SyncTransport};
use crate::utils::time::{format_timestamp, now_iso};
use colored::*;
use tokio_util::sync::CancellationToken;

pub async fn run(args: Vec<String>) -> anyhow::Result<()> {
    let bin = args
        .first()
        .map(|s| s.as_str())
        .unwrap_or("groovesync-cli")
        .to_string();

    if args.len() < 3 {
        print_usage(&bin);
        return Ok(());
    }

    let command = args[1].as_str();
    let transport = connect(&args[2])?;

    match command {
        "notifications" => {
            let since = args.get(3).cloned().unwrap_or_else(now_iso);
            show_notifications(&transport, since).await?;
        }
        "messages" => {
            let Some(peer_id) = args.get(3).and_then(|s| s.parse::<u64>().ok()) else {
                eprintln!("{}", format!("Usage: {} messages <base_url> <peer_id> [after]", bin).yellow());
                return Ok(());
            };
            let after = args.get(4).and_then(|s| s.parse::<u64>().ok()).unwrap_or(0);
            show_messages(&transport, peer_id, after).await?;
        }
        "read" => {
            let peer_id = args.get(3).and_then(|s| s.parse::<u64>().ok());
            let message_id = args.get(4).and_then(|s| s.parse::<u64>().ok());
            let (Some(peer_id), Some(message_id)) = (peer_id, message_id) else {
                eprintln!("{}", format!("Usage: {} read <base_url> <peer_id> <message_id>", bin).yellow());
                return Ok(());
            };
            let receipt = ReadReceipt {
                last_message_id: message_id,
                last_message_at: None,
            };
            transport.send_read_receipt(peer_id, &receipt).await?;
            println!("{} Marked conversation {} read up to {}", "✓".green().bold(), peer_id, message_id);
        }
        "react" => {
            let Some(action) = args.get(3) else {
                eprintln!("{}", format!("Usage: {} react <base_url> <action> [field=value]...", bin).yellow());
                return Ok(());
            };
            let fields: Vec<(String, String)> = args[4..]
                .iter()
                .filter_map(|kv| kv.split_once('='))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            let payload = transport.submit_reaction(action, &fields).await?;
            println!(
                "{} {} {}: {} likes, {} dislikes, you: {}",
                "✓".green().bold(),
                payload.target_type.bold(),
                payload.target_id.bold(),
                payload.likes.to_string().green(),
                payload.dislikes.to_string().red(),
                i8::from(payload.user_reaction)
            );
        }
        _ => {
            eprintln!("{} Unknown command: {}", "✗".red().bold(), command.red());
            print_usage(&bin);
        }
    }

    Ok(())
}

fn connect(base_url: &str) -> anyhow::Result<HttpTransport> {
    let config = Config {
        base_url: base_url.trim_end_matches('/').to_string(),
        session_cookie: std::env::var("GROOVESYNC_COOKIE").ok(),
        ..Default::default()
    };
    Ok(HttpTransport::new(&config)?)
}

async fn show_notifications(transport: &HttpTransport, since: String) -> anyhow::Result<()> {
    let query = NotificationQuery {
        since,
        unread_snapshot: 0,
        hold: None,
    };
    let payload = transport
        .fetch_notifications(&query, &CancellationToken::new())
        .await?;
    let follow = BadgeState::with_count(payload.new_followers.len() as u32);
    let message = BadgeState::with_count(message_badge_count(
        &payload.new_messages,
        payload.total_unread_messages,
    ));

    println!("{}", "Notifications".bold().cyan());
    println!("  Server time: {}", payload.server_time.as_deref().unwrap_or("-"));
    println!("  Followers:   {}", badge_text(&follow));
    println!("  Messages:    {}", badge_text(&message));
    for entry in &payload.new_messages {
        println!(
            "    {} user {} ({} unread) {}",
            "•".cyan(),
            entry
                .contact_id()
                .map(|id| id.to_string())
                .unwrap_or_else(|| "?".to_string()),
            entry.unread(),
            format_timestamp(entry.created_at.as_deref()).dimmed()
        );
    }
    Ok(())
}

async fn show_messages(transport: &HttpTransport, peer_id: u64, after: u64) -> anyhow::Result<()> {
    let query = MessageQuery {
        after,
        hold: None,
        active: false,
    };
    let payload = transport
        .fetch_messages(peer_id, &query, &CancellationToken::new())
        .await?;

    println!("{}", format!("Conversation with {}", peer_id).bold().cyan());
    if payload.messages.is_empty() {
        println!("  {}", "No new messages".dimmed());
    }
    for msg in &payload.messages {
        let who = if msg.from_me { "me".cyan() } else { "them".white() };
        println!(
            "  #{} {:>4}: {} {}",
            msg.id.map(|id| id.to_string()).unwrap_or_else(|| "?".to_string()),
            who,
            msg.content.as_deref().unwrap_or(""),
            format_timestamp(msg.created_at.as_deref()).dimmed()
        );
    }
    if let Some(last_id) = payload.last_id {
        println!("  last_id: {}", last_id);
    }
    Ok(())
}

fn badge_text(badge: &BadgeState) -> ColoredString {
    if badge.has_notification {
        badge.text.yellow().bold()
    } else {
        "0".dimmed()
    }
}

fn print_usage(bin: &str) {
    println!("GrooveSync CLI");
    println!();
    println!("Usage: {} <command> <base_url> [args]", bin);
    println!();
    println!("Commands:");
    println!("  notifications <base_url> [since]              Fetch notifications once");
    println!("  messages <base_url> <peer_id> [after]         Fetch a conversation after an id");
    println!("  read <base_url> <peer_id> <message_id>        Send a read receipt");
    println!("  react <base_url> <action> [field=value]...    Submit a reaction form");
    println!();
    println!("Set GROOVESYNC_COOKIE to send a session cookie.");
}
