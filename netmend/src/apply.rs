//! Replaying missing configuration onto a device.
//!
//! Line-level entries are sent one at a time from global configuration mode,
//! each acknowledged by the configuration prompt. Blocks are replayed by
//! walking their indentation: a decrease in depth is closed with one `exit`
//! per level, and whatever depth is left at the end is unwound the same way.
//! Inside a block the echo of each command is drained after a short settle
//! instead of being matched, since sub-mode prompts vary.
//!
//! Nothing is rolled back: re-running the repair against a fresh diff is the
//! recovery path, so every command sent here must be safe to send twice.

use std::fmt;

use log::{debug, info, warn};

use crate::channel::Session;
use crate::config::DeviceProfile;
use crate::diff::{Category, MissingBlocksReport};
use crate::driver::execute_commands;
use crate::error::Result;
use crate::normalize::indent_depth;
use crate::transport::Transport;

/// One command of a repair, with how its completion is observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairCommand {
    /// Global command, acknowledged by the configuration prompt.
    Acknowledged(String),
    /// Command inside a block; its echo is drained after a settle delay.
    Drained(String),
}

impl RepairCommand {
    /// The command text.
    pub fn text(&self) -> &str {
        match self {
            RepairCommand::Acknowledged(text) | RepairCommand::Drained(text) => text,
        }
    }
}

impl fmt::Display for RepairCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Commands that replay one configuration block.
///
/// Blank and comment lines are skipped, as is any `shutdown` line. An
/// interface block that leaves its sub-mode open gets an explicit
/// `no shutdown` before it is closed.
pub fn block_commands(block: &str) -> Vec<String> {
    let lines: Vec<&str> = block
        .lines()
        .filter(|l| {
            let t = l.trim();
            !t.is_empty() && !t.starts_with('!')
        })
        .collect();
    let Some(first) = lines.first() else {
        return Vec::new();
    };
    let is_interface = first.trim().starts_with("interface ");

    let mut commands = Vec::new();
    let mut depth = 0;
    for line in lines.iter().filter(|l| l.trim() != "shutdown") {
        let indent = indent_depth(line);
        if indent < depth {
            commands.extend(std::iter::repeat_n(String::from("exit"), depth - indent));
        }
        commands.push(line.trim().to_string());
        depth = indent;
    }

    if is_interface && depth > 0 {
        commands.push(String::from("no shutdown"));
    }
    commands.extend(std::iter::repeat_n(String::from("exit"), depth));
    commands
}

/// The full command sequence for a report, excluding the enter and leave
/// of configuration mode. Line-level categories come first, then blocks,
/// each in report order.
pub fn repair_plan(report: &MissingBlocksReport) -> Vec<RepairCommand> {
    let lines = Category::ALL
        .iter()
        .filter(|c| !c.is_block())
        .flat_map(|c| report.get(*c))
        .map(|line| RepairCommand::Acknowledged(line.trim().to_string()));

    let blocks = Category::ALL
        .iter()
        .filter(|c| c.is_block())
        .flat_map(|c| report.get(*c))
        .flat_map(|block| block_commands(block))
        .map(RepairCommand::Drained);

    lines.chain(blocks).collect()
}

/// Replay everything in `report` onto the device.
///
/// Expects the session at the privileged prompt and leaves it there.
/// Returns the number of repair commands sent; an empty report sends
/// nothing.
pub async fn apply_missing_config<T: Transport>(
    session: &mut Session<T>,
    report: &MissingBlocksReport,
    profile: &DeviceProfile,
) -> Result<usize> {
    if report.is_empty() {
        debug!("[{}] nothing to repair", session.device());
        return Ok(0);
    }

    let plan = repair_plan(report);
    info!(
        "[{}] repairing {} ({} commands)",
        session.device(),
        report,
        plan.len()
    );

    session.send("configure terminal").await?;
    session.read_until(&profile.config_prompt).await?;

    for command in &plan {
        match command {
            RepairCommand::Acknowledged(text) => {
                execute_commands(session, &[text], &profile.config_prompt).await?;
            }
            RepairCommand::Drained(text) => {
                session.send(text).await?;
                let echo = session.drain(profile.echo_read_bytes).await?;
                if echo.lines().any(|l| l.trim_start().starts_with('%')) {
                    warn!("[{}] command rejected: {:?}", session.device(), text);
                }
            }
        }
    }

    let privileged = session.prompts().privileged.clone();
    let timeout = session.timing().read_timeout();
    session.send("end").await?;
    session.read_until_match(&privileged, timeout).await?;

    info!("[{}] repair applied", session.device());
    Ok(plan.len())
}
