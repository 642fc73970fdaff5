//! `grove fetch` command implementation.

use std::time::Instant;

use grove_core::error::GroveResult;
use grove_resolver::ResolverSession;

use super::CommandContext;

/// Resolve every target, unpack the closure and print where each target landed
pub async fn execute(targets: &[String], rebuild_key: Option<&str>, ctx: &CommandContext) -> GroveResult<()> {
    let start_time = Instant::now();
    let mut session = ResolverSession::new(&ctx.settings)?;

    for target in targets {
        for package in session.resolve_target(target).await? {
            match session.config(&package).and_then(|c| c.source_dir.as_ref()) {
                Some(dir) => ctx.output.success(&format!("{} -> {}", package, dir)),
                None => ctx.output.success(&package.to_string()),
            }
        }
    }

    ctx.output.info(&format!(
        "{} package(s) in closure, {} downloaded in {:.2}s",
        session.packages().count(),
        session.download_count(),
        start_time.elapsed().as_secs_f64()
    ));

    if let Some(key) = rebuild_key {
        if session.check_rebuild(key)? {
            ctx.output.warn(&format!("Dependencies of {} changed, rebuild needed", key));
        } else {
            ctx.output.info(&format!("Dependencies of {} are up to date", key));
        }
    }
    Ok(())
}
