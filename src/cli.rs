//! Command-line interface and REPL
//!
//! Line editing runs on its own thread (rustyline blocks); parsed commands
//! are executed against the console handle on the async side.

use crate::group::SceneItem;
use crate::state::{ChannelRecord, ConsoleHandle, ConsoleSnapshot, GroupId};
use anyhow::{anyhow, bail, Context, Result};
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;
use tracing::debug;

/// One parsed REPL line
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    List,
    Status { json: bool },
    Groups,
    Mute(String),
    Unmute(String),
    Solo(String),
    Unsolo(String),
    Level(String, u8),
    /// Drag a free block (runs snap detection on drop)
    Move(String, f64, f64),
    MoveGroup(GroupId, f64, f64),
    Pair(String, String),
    Ungroup(GroupId),
    Macro(GroupId, u8),
    Balance(GroupId, u8),
    GroupMute(GroupId),
    GroupSolo(GroupId),
    ClearSolo,
    Help,
    Quit,
}

/// Split a line into words; double quotes keep spaces inside a name
pub fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_word = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_word = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_word {
                    words.push(std::mem::take(&mut current));
                    has_word = false;
                }
            }
            c => {
                current.push(c);
                has_word = true;
            }
        }
    }
    if in_quotes {
        bail!("Unterminated quote");
    }
    if has_word {
        words.push(current);
    }
    Ok(words)
}

/// Parse a group id written as `G3` or `3`
pub fn parse_group_id(word: &str) -> Result<GroupId> {
    let digits = word
        .strip_prefix('G')
        .or_else(|| word.strip_prefix('g'))
        .unwrap_or(word);
    digits
        .parse()
        .map(GroupId)
        .with_context(|| format!("Invalid group id: {}", word))
}

fn parse_level(word: &str) -> Result<u8> {
    let value: u8 = word
        .parse()
        .with_context(|| format!("Invalid level: {}", word))?;
    if value > 100 {
        bail!("Level {} out of range (0-100)", value);
    }
    Ok(value)
}

fn parse_coord(word: &str) -> Result<f64> {
    let value: f64 = word
        .parse()
        .with_context(|| format!("Invalid coordinate: {}", word))?;
    if !value.is_finite() {
        bail!("Invalid coordinate: {}", word);
    }
    Ok(value)
}

fn looks_like_group(word: &str) -> bool {
    word.len() > 1
        && (word.starts_with('G') || word.starts_with('g'))
        && word[1..].chars().all(|c| c.is_ascii_digit())
}

/// Parse one REPL line. Blank lines parse to `None`.
pub fn parse_line(line: &str) -> Result<Option<ReplCommand>> {
    let words = tokenize(line)?;
    let Some((verb, args)) = words.split_first() else {
        return Ok(None);
    };

    let arity = |n: usize, usage: &str| -> Result<()> {
        if args.len() == n {
            Ok(())
        } else {
            Err(anyhow!("Usage: {}", usage))
        }
    };

    let cmd = match verb.to_lowercase().as_str() {
        "list" | "ls" => ReplCommand::List,
        "status" => match args {
            [] => ReplCommand::Status { json: false },
            [flag] if flag == "--json" => ReplCommand::Status { json: true },
            _ => bail!("Usage: status [--json]"),
        },
        "groups" => ReplCommand::Groups,
        "mute" => {
            arity(1, "mute <channel>")?;
            ReplCommand::Mute(args[0].clone())
        }
        "unmute" => {
            arity(1, "unmute <channel>")?;
            ReplCommand::Unmute(args[0].clone())
        }
        "solo" => {
            arity(1, "solo <channel>")?;
            ReplCommand::Solo(args[0].clone())
        }
        "unsolo" => {
            arity(1, "unsolo <channel>")?;
            ReplCommand::Unsolo(args[0].clone())
        }
        "level" => {
            arity(2, "level <channel> <0-100>")?;
            ReplCommand::Level(args[0].clone(), parse_level(&args[1])?)
        }
        "move" => {
            arity(3, "move <channel|group> <x> <y>")?;
            let (x, y) = (parse_coord(&args[1])?, parse_coord(&args[2])?);
            if looks_like_group(&args[0]) {
                ReplCommand::MoveGroup(parse_group_id(&args[0])?, x, y)
            } else {
                ReplCommand::Move(args[0].clone(), x, y)
            }
        }
        "pair" => {
            arity(2, "pair <channel> <channel>")?;
            ReplCommand::Pair(args[0].clone(), args[1].clone())
        }
        "ungroup" => {
            arity(1, "ungroup <group>")?;
            ReplCommand::Ungroup(parse_group_id(&args[0])?)
        }
        "macro" => {
            arity(2, "macro <group> <0-100>")?;
            ReplCommand::Macro(parse_group_id(&args[0])?, parse_level(&args[1])?)
        }
        "balance" => {
            arity(2, "balance <group> <0-100>")?;
            ReplCommand::Balance(parse_group_id(&args[0])?, parse_level(&args[1])?)
        }
        "gmute" => {
            arity(1, "gmute <group>")?;
            ReplCommand::GroupMute(parse_group_id(&args[0])?)
        }
        "gsolo" => {
            arity(1, "gsolo <group>")?;
            ReplCommand::GroupSolo(parse_group_id(&args[0])?)
        }
        "clear-solo" => ReplCommand::ClearSolo,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        other => bail!("Unknown command: {} (type 'help')", other),
    };
    Ok(Some(cmd))
}

// ============================================================================
// Output formatting
// ============================================================================

fn level_bar(level: u8) -> String {
    let filled = (level as usize + 5) / 10;
    format!("{}{}", "█".repeat(filled), "·".repeat(10 - filled.min(10)))
}

/// One line per channel: name, fader level, flags
pub fn format_channel(record: &ChannelRecord, solo_active: bool) -> String {
    let level = record.fader_level();
    let bar = if record.muted {
        level_bar(level).bright_black()
    } else {
        level_bar(level).green()
    };

    let mute = match (record.muted, record.explicit_mute) {
        (true, true) => "M".red().bold(),
        (true, false) => "m".red(),
        _ => " ".normal(),
    };
    let solo = if record.soloed {
        "S".yellow().bold()
    } else {
        " ".normal()
    };
    let kind = if record.kind.is_output() {
        "out".cyan()
    } else {
        "in ".normal()
    };
    let dimmed = solo_active && !record.soloed && !record.kind.is_output();
    let name = if dimmed {
        record.name.bright_black()
    } else {
        record.name.normal()
    };

    format!(
        "  {} {:<24} {:>3} {} {}{}",
        kind, name, level, bar, mute, solo
    )
}

fn print_channels(snapshot: &ConsoleSnapshot) {
    println!("{}", "Channels:".bold());
    for record in &snapshot.channels {
        println!("{}", format_channel(record, snapshot.solo_active));
    }
}

fn print_groups(snapshot: &ConsoleSnapshot) {
    let mut any = false;
    for group in snapshot.groups() {
        any = true;
        println!(
            "  {} {} + {}  level={} balance={}  at ({:.0}, {:.0})",
            group.id.to_string().bold().cyan(),
            group.member_a,
            group.member_b,
            group.macro_level.to_string().green(),
            group.balance.to_string().yellow(),
            group.rect.x,
            group.rect.y
        );
    }
    if !any {
        println!("  {}", "(no groups)".bright_black());
    }
}

fn print_status(snapshot: &ConsoleSnapshot) {
    let solos: Vec<&str> = snapshot
        .channels
        .iter()
        .filter(|c| c.soloed)
        .map(|c| c.name.as_str())
        .collect();
    let mutes = snapshot.channels.iter().filter(|c| c.muted).count();

    println!(
        "{} {} channels, {} muted, solo: {}",
        "Status:".bold(),
        snapshot.channels.len(),
        mutes,
        if solos.is_empty() {
            "none".to_string()
        } else {
            solos.join(", ")
        }
    );
    print_channels(snapshot);
    println!("{}", "Groups:".bold());
    print_groups(snapshot);

    let free: Vec<String> = snapshot
        .scene
        .iter()
        .filter_map(|item| match item {
            SceneItem::Block { name, rect } => {
                Some(format!("{} ({:.0}, {:.0})", name, rect.x, rect.y))
            }
            SceneItem::Group(_) => None,
        })
        .collect();
    println!("{} {}", "Blocks:".bold(), free.join(", "));
}

fn print_help() {
    println!("{}", "Commands:".bold());
    let rows = [
        ("list", "channels with level and mute/solo flags"),
        ("status [--json]", "full console state"),
        ("groups", "active groups"),
        ("mute|unmute <ch>", "explicit mute"),
        ("solo|unsolo <ch>", "explicit solo"),
        ("level <ch> <0-100>", "set a channel level"),
        ("move <ch|G#> <x> <y>", "drag a block (snaps on drop) or a group"),
        ("pair <ch> <ch>", "group two free blocks"),
        ("ungroup <G#>", "split a group"),
        ("macro <G#> <0-100>", "group level"),
        ("balance <G#> <0-100>", "group balance (0 = A, 100 = B)"),
        ("gmute|gsolo <G#>", "toggle mute/solo on both members"),
        ("clear-solo", "release every solo"),
        ("quit", "exit"),
    ];
    for (usage, what) in rows {
        println!("  {:<22} {}", usage.cyan(), what);
    }
    println!("  Quote names containing spaces: mute \"Main-Out AN1\"");
}

async fn fetch_snapshot(console: &ConsoleHandle) -> Result<ConsoleSnapshot> {
    console
        .snapshot()
        .await
        .ok_or_else(|| anyhow!("Console is not running"))
}

async fn report_channel(console: &ConsoleHandle, name: &str) -> Result<()> {
    let snapshot = fetch_snapshot(console).await?;
    match snapshot.channel(name) {
        Some(record) => println!("{}", format_channel(record, snapshot.solo_active)),
        None => println!("{} unknown channel {}", "✗".red(), name),
    }
    Ok(())
}

async fn report_group(console: &ConsoleHandle, id: GroupId) -> Result<()> {
    let snapshot = fetch_snapshot(console).await?;
    match snapshot.group(id) {
        Some(group) => {
            println!(
                "  {} level={} balance={}",
                id.to_string().bold().cyan(),
                group.macro_level,
                group.balance
            );
            for name in group.members() {
                if let Some(record) = snapshot.channel(name) {
                    println!("{}", format_channel(record, snapshot.solo_active));
                }
            }
        }
        None => println!("{} unknown group {}", "✗".red(), id),
    }
    Ok(())
}

/// Execute one command. Returns false when the REPL should stop.
pub async fn execute(cmd: ReplCommand, console: &ConsoleHandle) -> Result<bool> {
    debug!(?cmd, "REPL command");
    match cmd {
        ReplCommand::List => print_channels(&fetch_snapshot(console).await?),
        ReplCommand::Status { json } => {
            let snapshot = fetch_snapshot(console).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_status(&snapshot);
            }
        }
        ReplCommand::Groups => print_groups(&fetch_snapshot(console).await?),
        ReplCommand::Mute(name) => {
            console.set_mute(name.as_str(), true);
            report_channel(console, &name).await?;
        }
        ReplCommand::Unmute(name) => {
            console.set_mute(name.as_str(), false);
            report_channel(console, &name).await?;
        }
        ReplCommand::Solo(name) => {
            console.set_solo(name.as_str(), true);
            report_channel(console, &name).await?;
        }
        ReplCommand::Unsolo(name) => {
            console.set_solo(name.as_str(), false);
            report_channel(console, &name).await?;
        }
        ReplCommand::Level(name, level) => {
            console.set_level(name.as_str(), level);
            report_channel(console, &name).await?;
        }
        ReplCommand::Move(name, x, y) => match console.drag_block(name.as_str(), x, y).await {
            Some(id) => {
                println!("{} {} snapped into {}", "🔗".green(), name, id);
                report_group(console, id).await?;
            }
            None => println!("  moved {} to ({:.0}, {:.0})", name, x, y),
        },
        ReplCommand::MoveGroup(id, x, y) => {
            console.move_group(id, x, y);
            report_group(console, id).await?;
        }
        ReplCommand::Pair(a, b) => match console.pair(a.as_str(), b.as_str()).await {
            Some(Ok(id)) => {
                println!("{} grouped {} + {} as {}", "🔗".green(), a, b, id);
                report_group(console, id).await?;
            }
            Some(Err(e)) => println!("{} {}", "✗".red(), e),
            None => bail!("Console is not running"),
        },
        ReplCommand::Ungroup(id) => {
            if console.ungroup(id).await {
                println!("  {} ungrouped", id);
            } else {
                println!("{} unknown group {}", "✗".red(), id);
            }
        }
        ReplCommand::Macro(id, level) => {
            console.set_macro_level(id, level);
            report_group(console, id).await?;
        }
        ReplCommand::Balance(id, balance) => {
            console.set_balance(id, balance);
            report_group(console, id).await?;
        }
        ReplCommand::GroupMute(id) => {
            console.toggle_group_mute(id);
            report_group(console, id).await?;
        }
        ReplCommand::GroupSolo(id) => {
            console.toggle_group_solo(id);
            report_group(console, id).await?;
        }
        ReplCommand::ClearSolo => {
            console.clear_all_solo();
            print_channels(&fetch_snapshot(console).await?);
        }
        ReplCommand::Help => print_help(),
        ReplCommand::Quit => return Ok(false),
    }
    Ok(true)
}

/// Run the interactive prompt until `quit`, EOF or Ctrl+C
pub async fn run_repl(console: ConsoleHandle) -> Result<()> {
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();

    std::thread::Builder::new()
        .name("repl-input".to_string())
        .spawn(move || {
            let mut rl = match DefaultEditor::new() {
                Ok(rl) => rl,
                Err(e) => {
                    eprintln!("Failed to start line editor: {}", e);
                    return;
                }
            };
            loop {
                match rl.readline("patchbay> ") {
                    Ok(line) => {
                        if !line.trim().is_empty() {
                            let _ = rl.add_history_entry(line.as_str());
                        }
                        if line_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                    Err(e) => {
                        eprintln!("Input error: {}", e);
                        break;
                    }
                }
            }
        })
        .context("Failed to spawn REPL input thread")?;

    println!(
        "{} type {} for commands",
        "patchbay ready,".bold().green(),
        "help".cyan()
    );

    while let Some(line) = line_rx.recv().await {
        match parse_line(&line) {
            Ok(Some(cmd)) => match execute(cmd, &console).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    println!("{} {:#}", "✗".red(), e);
                    if !console.is_alive() {
                        break;
                    }
                }
            },
            Ok(None) => {}
            Err(e) => println!("{} {:#}", "✗".red(), e),
        }
    }

    Ok(())
}
