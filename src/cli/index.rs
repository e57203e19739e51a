use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::Path;
use tracing::info;

use repomap::config::Config;
use repomap::indexer::{Indexer, RunOutcome};

/// Index `project` in the foreground with a progress bar on stderr
pub fn index_project(project: &Path, force: bool, quiet: bool) -> Result<()> {
    let config = Config::from_project_dir(project);
    config.validate()?;
    let indexer = Indexer::new(project, config).context("opening index store")?;

    if force {
        indexer.invalidate_cache()?;
    } else {
        let staleness = indexer.check_staleness();
        if !staleness.stale {
            println!("Index is up to date");
            return Ok(());
        }
        info!("Index is stale: {}", staleness.reason);
    }

    let Some(run_id) = indexer.begin_run()? else {
        println!("Indexing already in progress");
        return Ok(());
    };

    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(0);
        pb.set_draw_target(ProgressDrawTarget::stderr());
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")
                .context("progress template")?
                .progress_chars("=>-"),
        );
        pb
    };

    let outcome = indexer.run(run_id, &mut |progress| {
        pb.set_length(progress.files_total);
        pb.set_position(progress.files_scanned);
        pb.set_message(format!("{} symbols", progress.symbols_found));
    });
    pb.finish_and_clear();

    match outcome? {
        RunOutcome::Completed(summary) => {
            println!(
                "Indexed {} symbols from {} files ({} reparsed, {} cached, {} failed), {} similar pairs",
                summary.symbols,
                summary.files,
                summary.reparsed,
                summary.reused,
                summary.parse_failures,
                summary.similar_pairs
            );
        }
        RunOutcome::Superseded => {
            println!("Run {} was superseded; results discarded", run_id);
        }
    }

    Ok(())
}
