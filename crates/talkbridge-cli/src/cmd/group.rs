//! `tb group`: pair talks into sync groups.

use std::io::Write;

use clap::{Args, Subcommand};
use serde::Serialize;
use talkbridge_core::error::ErrorCode;
use talkbridge_core::ledger::{GroupStats, get_sync_group_stats};
use talkbridge_core::signups::find_talk;
use talkbridge_core::sync_group::{SyncGroup, SyncGroupError, create_sync_group, get_sync_groups};

use super::CmdContext;
use crate::output::{OutputMode, fail, pretty_kv, pretty_section, render};

#[derive(Subcommand, Debug)]
pub enum GroupCommand {
    #[command(
        about = "Pair two talks",
        long_about = "Pair two imported talks and record their overlap. Each unordered pair \
                      of titles can only be grouped once.",
        after_help = "EXAMPLES:\n    # Pair two talks\n    tb group create \"Rust in Production\" \"SQLite Internals\""
    )]
    Create(GroupCreateArgs),

    #[command(
        about = "List sync groups, newest first",
        after_help = "EXAMPLES:\n    # List groups\n    tb group list --json"
    )]
    List,

    #[command(
        about = "Show one sync group with its ledger progress",
        after_help = "EXAMPLES:\n    # Show group 1\n    tb group show 1"
    )]
    Show(GroupShowArgs),
}

#[derive(Args, Debug)]
pub struct GroupCreateArgs {
    /// First talk title.
    pub talk_a: String,
    /// Second talk title.
    pub talk_b: String,
}

#[derive(Args, Debug)]
pub struct GroupShowArgs {
    /// Sync group id.
    pub id: i64,
}

#[derive(Debug, Serialize)]
struct GroupDetail {
    #[serde(flatten)]
    group: SyncGroup,
    progress: GroupStats,
}

/// Execute a `tb group` subcommand.
pub fn run_group(command: &GroupCommand, ctx: &CmdContext) -> anyhow::Result<()> {
    match command {
        GroupCommand::Create(args) => run_create(args, ctx),
        GroupCommand::List => run_list(ctx),
        GroupCommand::Show(args) => run_show(args, ctx),
    }
}

fn run_create(args: &GroupCreateArgs, ctx: &CmdContext) -> anyhow::Result<()> {
    let conn = ctx.open_store()?;
    let mut resolved = Vec::with_capacity(2);
    for title in [args.talk_a.trim(), args.talk_b.trim()] {
        let talk = find_talk(&conn, title)?.ok_or_else(|| {
            fail(
                ctx.output,
                ErrorCode::TalkNotFound,
                format!("talk '{title}' not found"),
            )
        })?;
        resolved.push(talk);
    }
    let (talk_a, talk_b) = (&resolved[0], &resolved[1]);

    let id = match create_sync_group(
        &conn,
        &talk_a.talk_title,
        &talk_a.talk_url,
        &talk_b.talk_title,
        &talk_b.talk_url,
    ) {
        Ok(id) => id,
        Err(SyncGroupError::Storage(err)) => return Err(err),
        Err(err) => return Err(fail(ctx.output, err.code(), err.to_string())),
    };

    let group = ctx.require_group(&conn, id)?;
    render(ctx.output, &group, |group, w| {
        writeln!(w, "Created sync group {}", group.id)?;
        render_group_human(group, w)
    })
}

fn run_list(ctx: &CmdContext) -> anyhow::Result<()> {
    let conn = ctx.open_store()?;
    let groups = get_sync_groups(&conn)?;
    let mode = ctx.output;
    render(mode, &groups, |groups, w| render_list_human(groups, mode, w))
}

fn run_show(args: &GroupShowArgs, ctx: &CmdContext) -> anyhow::Result<()> {
    let conn = ctx.open_store()?;
    let group = ctx.require_group(&conn, args.id)?;
    let progress = get_sync_group_stats(&conn, group.id)?;
    let detail = GroupDetail { group, progress };

    render(ctx.output, &detail, |detail, w| {
        render_group_human(&detail.group, w)?;
        writeln!(w)?;
        pretty_section(w, "Ledger")?;
        pretty_kv(w, "total", detail.progress.total.to_string())?;
        pretty_kv(w, "successful", detail.progress.successful.to_string())?;
        pretty_kv(w, "failed", detail.progress.failed.to_string())?;
        pretty_kv(w, "pending", detail.progress.pending.to_string())
    })
}

fn render_group_human(group: &SyncGroup, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &format!("Sync group {}", group.id))?;
    pretty_kv(w, "talk a", format!("{} <{}>", group.talk_a_title, group.talk_a_url))?;
    pretty_kv(w, "talk b", format!("{} <{}>", group.talk_b_title, group.talk_b_url))?;
    pretty_kv(w, "status", group.status.as_str())?;
    pretty_kv(w, "overlap", group.overlap_count.to_string())?;
    pretty_kv(w, "missing from a", group.missing_from_a.to_string())?;
    pretty_kv(w, "missing from b", group.missing_from_b.to_string())
}

fn render_list_human(groups: &[SyncGroup], mode: OutputMode, w: &mut dyn Write) -> std::io::Result<()> {
    if !mode.is_pretty() {
        for g in groups {
            writeln!(
                w,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                g.id,
                g.status,
                g.talk_a_title,
                g.talk_b_title,
                g.overlap_count,
                g.missing_from_a,
                g.missing_from_b
            )?;
        }
        return Ok(());
    }

    pretty_section(w, &format!("Sync groups ({})", groups.len()))?;
    if groups.is_empty() {
        writeln!(w, "No sync groups yet. Run `tb group create <A> <B>`.")?;
    }
    for g in groups {
        writeln!(
            w,
            "#{:<4} {:<12} {} <-> {}  (overlap {}, missing {}/{})",
            g.id,
            g.status.as_str(),
            g.talk_a_title,
            g.talk_b_title,
            g.overlap_count,
            g.missing_from_a,
            g.missing_from_b
        )?;
    }
    Ok(())
}
