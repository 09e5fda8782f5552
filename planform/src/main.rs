#![warn(clippy::pedantic)]

mod settings;

use anyhow::{Context, Result as AnyResult};
use planform_core::io::{self, LoadedWorkspace};
use planform_core::{EngineConfig, SharedRegistry, SnapshotManager, Urgency};
use std::fmt::Write as _;

/// Open one store, revalidate every planform in it, and render the report.
fn inspect_store(path: &std::path::Path, config: &EngineConfig) -> AnyResult<String> {
    let file = std::fs::File::open(path)?;
    let LoadedWorkspace {
        registry,
        planforms,
    } = io::read_workspace(std::io::BufReader::new(file))?;

    log::debug!(
        "{path:?}: {} objects, {} planforms",
        registry.object_count(),
        planforms.len()
    );
    let manager = SnapshotManager::new(SharedRegistry::new(registry), config.clone())?;

    let mut report = String::new();
    for planform in planforms {
        let planform = match planform {
            Ok(planform) => planform,
            Err(e) => {
                log::error!("{path:?}: skipping planform: {e}");
                writeln!(report, "{}: <unreadable planform: {e}>", path.display())?;
                continue;
            }
        };
        let id = manager.restore(planform);
        let result = manager.request_membership(id, Urgency::Immediate)?;
        writeln!(
            report,
            "{}: {id} {} {} with {} objects at {}",
            path.display(),
            result.freshness.as_ref(),
            result.completeness.as_ref(),
            result.objects.len(),
            result
                .version
                .map_or_else(|| "-".to_owned(), |v| v.to_string()),
        )?;
        if log::log_enabled!(log::Level::Debug) {
            for object in manager.inspect(id)? {
                log::debug!("{object}");
            }
        }
    }
    Ok(report)
}

fn main() -> AnyResult<()> {
    let has_term = std::io::IsTerminal::is_terminal(&std::io::stdin());
    // Log to a terminal, if available. Else, log to "log.out" in the working directory.
    if has_term {
        env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        let _ = simple_logging::log_to_file("log.out", log::LevelFilter::Debug);
    }

    let settings = settings::Settings::load();
    if settings.is_file_missing() {
        // Leave a documented file behind for the user to edit.
        if let Err(e) = settings.save() {
            log::warn!("Failed to save engine settings:\n{e:?}");
        }
    }
    settings
        .engine
        .validate()
        .context("invalid engine settings")?;

    let loading_succeeded = {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
        // Args are a simple list of stores to inspect.
        let paths: Vec<std::path::PathBuf> = std::env::args_os().skip(1).map(Into::into).collect();
        // Did we have at least one success? No paths is a success.
        let had_success: std::sync::atomic::AtomicBool = paths.is_empty().into();
        paths.into_par_iter().for_each(|path| {
            match inspect_store(&path, &settings.engine) {
                Err(e) => {
                    log::error!("failed to open store {path:?}: {e:#}");
                }
                Ok(report) => {
                    had_success.store(true, std::sync::atomic::Ordering::Relaxed);
                    // One store at a time, so reports don't interleave.
                    print!("{report}");
                }
            }
        });

        had_success.into_inner()
    };
    if !loading_succeeded {
        anyhow::bail!("failed to load any provided store");
    }
    Ok(())
}
