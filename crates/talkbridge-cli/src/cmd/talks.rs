//! `tb talks`: list imported talks.

use std::io::Write;

use clap::Args;
use talkbridge_core::signups::{TalkSummary, get_all_talks};

use super::CmdContext;
use crate::output::{OutputMode, pretty_section, render};

/// Arguments for `tb talks`.
#[derive(Args, Debug, Default)]
pub struct TalksArgs {}

/// Execute `tb talks`.
pub fn run_talks(_args: &TalksArgs, ctx: &CmdContext) -> anyhow::Result<()> {
    let conn = ctx.open_store()?;
    let talks = get_all_talks(&conn)?;
    let mode = ctx.output;
    render(mode, &talks, |talks, w| render_talks_human(talks, mode, w))
}

fn render_talks_human(
    talks: &[TalkSummary],
    mode: OutputMode,
    w: &mut dyn Write,
) -> std::io::Result<()> {
    if !mode.is_pretty() {
        for talk in talks {
            writeln!(w, "{}\t{}\t{}", talk.signup_count, talk.talk_title, talk.talk_url)?;
        }
        return Ok(());
    }

    pretty_section(w, &format!("Talks ({})", talks.len()))?;
    if talks.is_empty() {
        writeln!(w, "No talks imported yet. Run `tb import <PATH>` first.")?;
        return Ok(());
    }
    for talk in talks {
        writeln!(w, "{:>6}  {}", talk.signup_count, talk.talk_title)?;
        writeln!(w, "        {}", talk.talk_url)?;
    }
    Ok(())
}
