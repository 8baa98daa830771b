//! `taskmeet` -- Kanban board and call room client.
//!
//! ```bash
//! # Board demo against an in-memory store
//! cargo run --bin taskmeet -- board
//! cargo run --bin taskmeet -- board --identity ayse --employee
//!
//! # Join a call room through a relay
//! cargo run --bin taskmeet -- --relay-url ws://127.0.0.1:9000/ws \
//!     call --room standup --name Ayse --audio
//! ```
//!
//! Logs go to a file so they never interleave with the interactive output.

use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use taskmeet::board::{
    AccessScope, BoardNotice, BoardSession, ColumnSet, Destination, MemoryTaskStore, Viewer,
};
use taskmeet::call::{
    CallClient, CallEvent, CallSession, SignalingChannel, VirtualDevices, WsSignalingChannel,
};
use taskmeet::config::{BoardArgs, CallArgs, CliArgs, ClientConfig, Command};
use taskmeet_proto::call::ConnectionId;
use taskmeet_proto::signal::TrackKind;
use taskmeet_proto::task::{Priority, STATUS_DONE, STATUS_IN_PROGRESS, Task, TaskId};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!("taskmeet starting");

    let result = match &cli.command {
        Some(Command::Call(args)) => run_call(&config, args).await,
        Some(Command::Board(args)) => run_board(&config, args).await,
        None => run_board(&config, &BoardArgs::default()).await,
    };

    tracing::info!("taskmeet exiting");
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskmeet.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

type AppResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

// ---------------------------------------------------------------------------
// call
// ---------------------------------------------------------------------------

async fn run_call(config: &ClientConfig, args: &CallArgs) -> AppResult {
    let (Some(room), Some(name)) = (config.room.as_deref(), config.display_name.as_deref()) else {
        return Err("call needs --room and --name \
                    (or [call] room / display_name in the config file)"
            .into());
    };

    let mut kinds = Vec::new();
    if args.audio {
        kinds.push(TrackKind::Audio);
    }
    if args.video {
        kinds.push(TrackKind::Video);
    }
    let mut session = CallSession::new(name, Box::new(VirtualDevices::with(&kinds)))?;
    for kind in &kinds {
        for event in session.set_track(*kind, true).events {
            print_event(&session, &event);
        }
    }

    let channel = WsSignalingChannel::connect(&config.relay_url, config.connect_timeout).await?;
    let mut client = CallClient::new(Arc::new(channel), session, config.join_timeout);
    for event in client.join(room).await? {
        print_event(client.session(), &event);
    }
    println!("commands: /who  /host <name>  /end  /audio on|off  /video on|off  /leave");

    // Relay messages are read on their own task so stdin and the relay can
    // be awaited together.
    let (relay_tx, mut relay_rx) = mpsc::channel(256);
    let reader_channel = client.channel();
    let reader = tokio::spawn(async move {
        loop {
            let msg = reader_channel.recv().await;
            let closed = msg.is_err();
            if relay_tx.send(msg).await.is_err() || closed {
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            msg = relay_rx.recv() => {
                let events = match msg {
                    Some(Ok(msg)) => client.apply(msg).await,
                    Some(Err(_)) | None => client.relay_lost(),
                };
                let done = events
                    .iter()
                    .any(|e| matches!(e, CallEvent::MeetingEnded | CallEvent::RelayLost));
                for event in &events {
                    print_event(client.session(), event);
                }
                if done {
                    break;
                }
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !handle_call_command(&mut client, line.trim()).await? {
                            break;
                        }
                    }
                    None => {
                        client.leave().await?;
                        break;
                    }
                }
            }
        }
    }

    reader.abort();
    Ok(())
}

/// Runs one stdin line. Returns false when the user left.
async fn handle_call_command<C: SignalingChannel>(
    client: &mut CallClient<C>,
    line: &str,
) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
    let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
    match cmd {
        "" => {}
        "/leave" => {
            client.leave().await?;
            println!("* left the room");
            return Ok(false);
        }
        "/who" => {
            let session = client.session();
            for p in session.roster() {
                let host = if session.host_id() == Some(&p.connection_id) { " (host)" } else { "" };
                let link = session
                    .link(&p.connection_id)
                    .map_or("none".to_string(), |l| format!("{:?}", l.state()));
                println!("  {}{host} [{}] link={link}", p.display_name, p.connection_id);
            }
        }
        "/host" => {
            let target = resolve_participant(client.session(), rest.trim());
            let sent = match target {
                Some(id) => client.transfer_host(&id).await?,
                None => false,
            };
            if !sent {
                println!("* cannot transfer host to {}", rest.trim());
            }
        }
        "/end" => {
            if !client.end_meeting().await? {
                println!("* only the host can end the meeting");
            }
        }
        "/audio" | "/video" => {
            let kind = if cmd == "/audio" { TrackKind::Audio } else { TrackKind::Video };
            let enabled = rest.trim() != "off";
            for event in client.set_track(kind, enabled).await {
                print_event(client.session(), &event);
            }
        }
        _ if cmd.starts_with('/') => println!("* unknown command {cmd}"),
        _ => client.chat(line).await?,
    }
    Ok(true)
}

fn resolve_participant(session: &CallSession, needle: &str) -> Option<ConnectionId> {
    session
        .roster()
        .iter()
        .find(|p| p.display_name == needle || p.connection_id.as_str() == needle)
        .map(|p| p.connection_id.clone())
}

fn print_event(session: &CallSession, event: &CallEvent) {
    let name = |id: &ConnectionId| {
        session
            .display_name_of(id)
            .map_or_else(|| id.to_string(), str::to_string)
    };
    match event {
        CallEvent::Joined {
            room_id,
            roster,
            host_id,
            ..
        } => {
            println!(
                "* joined {room_id} with {} other participant(s), host is {}",
                roster.len(),
                name(host_id)
            );
        }
        CallEvent::ParticipantJoined(p) => println!("* {} joined", p.display_name),
        CallEvent::ParticipantLeft {
            connection_id,
            display_name,
        } => {
            let who = display_name
                .clone()
                .unwrap_or_else(|| connection_id.to_string());
            println!("* {who} left");
        }
        CallEvent::HostChanged { host_id, is_self } => {
            if *is_self {
                println!("* you are now the host");
            } else {
                println!("* {} is now the host", name(host_id));
            }
        }
        CallEvent::LinkUp(peer) => println!("* connected to {}", name(peer)),
        CallEvent::LinkFailed { peer, reason } => {
            println!("* connection to {} failed: {reason}", name(peer));
        }
        CallEvent::RemoteTracks { peer, tracks } => {
            println!("* {} is sending {tracks:?}", name(peer));
        }
        CallEvent::LocalTracks(tracks) => println!("* sending {tracks:?}"),
        CallEvent::MediaFailed(e) => println!("* {e}"),
        CallEvent::Chat { display_name, text, .. } => println!("<{display_name}> {text}"),
        CallEvent::MeetingEnded => println!("* the host ended the meeting"),
        CallEvent::RelayLost => println!("* lost connection to the relay; restart to reconnect"),
        CallEvent::RelayError(reason) => println!("* relay: {reason}"),
    }
}

// ---------------------------------------------------------------------------
// board
// ---------------------------------------------------------------------------

fn demo_tasks(identity: &str) -> Vec<Task> {
    vec![
        Task::new("Sprint planı hazırla", identity).with_priority(Priority::High),
        Task::new("API dokümantasyonu", "mehmet").with_priority(Priority::Low),
        Task::new("Giriş sayfası testleri", identity)
            .with_status(STATUS_IN_PROGRESS)
            .with_priority(Priority::Medium)
            .with_label("frontend"),
        Task::new("Veritabanı yedeği", "zeynep").with_status(STATUS_IN_PROGRESS),
        Task::new("Toplantı notları", identity).with_status(STATUS_DONE),
    ]
}

async fn run_board(config: &ClientConfig, args: &BoardArgs) -> AppResult {
    let viewer = Viewer {
        identity: config.board_identity.clone(),
        scope: if args.employee { AccessScope::OwnCardsOnly } else { AccessScope::AllCards },
    };
    let store = Arc::new(MemoryTaskStore::new(demo_tasks(&viewer.identity)));
    let columns = ColumnSet::with_extra(&config.board_columns);
    let mut session = BoardSession::new(store, viewer, columns);
    session.refresh().await?;
    session.labels().add("frontend", Some("#1e88e5"))?;

    println!(
        "commands: show | move <n> <column> | drop <n> <m> | add-column <name> | \
         delete-column <name> | label <name> [color] | fail on|off | quit"
    );
    let mut listing = print_board(&session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => continue,
            ["quit" | "exit"] => break,
            ["show"] => {}
            ["move", n, column] => {
                let Some(task_id) = pick(&listing, n) else { continue };
                let target = Destination::Column((*column).to_string());
                let notice = session.drop_card(task_id, Some(&target)).await?;
                print_notice(&notice);
            }
            ["drop", n, m] => {
                let (Some(task_id), Some(over)) = (pick(&listing, n), pick(&listing, m)) else {
                    continue;
                };
                let notice = session.drop_card(task_id, Some(&Destination::Task(over))).await?;
                print_notice(&notice);
            }
            ["add-column", name] => report(session.board_mut().add_column(name)),
            ["delete-column", name] => report(session.board_mut().delete_column(name)),
            ["label", name] => report(session.labels().add(name, None).map(|_| ())),
            ["label", name, color] => {
                report(session.labels().add(name, Some(*color)).map(|_| ()));
            }
            ["fail", mode] => session.store().set_failing(*mode == "on"),
            _ => {
                println!("? {line}");
                continue;
            }
        }
        listing = print_board(&session);
    }
    Ok(())
}

fn pick(listing: &[TaskId], n: &str) -> Option<TaskId> {
    let picked = n
        .parse::<usize>()
        .ok()
        .and_then(|i| i.checked_sub(1))
        .and_then(|i| listing.get(i))
        .copied();
    if picked.is_none() {
        println!("? no card {n}");
    }
    picked
}

fn report<E: std::fmt::Display>(result: Result<(), E>) {
    if let Err(e) = result {
        println!("! {e}");
    }
}

fn print_notice(notice: &BoardNotice) {
    match notice {
        BoardNotice::Unchanged => println!("  (no change)"),
        BoardNotice::Saved => {}
        BoardNotice::Resynced(e) => println!("! {e}; board reloaded"),
    }
}

/// Prints the board and returns task ids in printed order for numbering.
fn print_board(session: &BoardSession<MemoryTaskStore>) -> Vec<TaskId> {
    let labels = session.labels();
    let mut listing = Vec::new();
    let mut out = io::stdout().lock();
    for (column, tasks) in session.board().board_view() {
        let _ = writeln!(out, "== {column} ({})", tasks.len());
        for task in tasks {
            listing.push(task.id);
            let tags: Vec<String> = labels
                .resolve(&task.labels)
                .into_iter()
                .map(|l| format!("{}{}", l.name, l.color))
                .collect();
            let done = if task.completed { "x" } else { " " };
            let _ = writeln!(
                out,
                "  {:>2}. [{done}] {} ({}, {}) {}",
                listing.len(),
                task.title,
                task.priority,
                task.assigned_to,
                tags.join(",")
            );
        }
    }
    listing
}
