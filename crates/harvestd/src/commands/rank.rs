use harvestgrid_scheduler::refresh_ranking;

use super::Context;
use super::fleet::target_count;

pub fn rank(ctx: &Context, targets: Option<u32>) -> anyhow::Result<()> {
    let count = target_count(targets, ctx.config.selection.top_k);
    let ranked = refresh_ranking(&ctx.store, count)?;

    if ranked.is_empty() {
        println!("no eligible targets");
        return Ok(());
    }
    for (i, entry) in ranked.iter().enumerate() {
        println!("{:>3}. {:<24} {:>14.2}", i + 1, entry.target, entry.score);
    }
    Ok(())
}
