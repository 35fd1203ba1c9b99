//! File watching for `--watch` hot reload.
//!
//! Watches a config folder and invokes a callback when YAML files
//! change. Events are debounced: bursts of writes (editor save, git
//! checkout) collapse into one reload.

use crate::error::{ConfigError, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEBOUNCE: Duration = Duration::from_millis(300);

/// Watch a config folder, calling `on_change` after each settled burst of
/// modifications. Blocks the current thread until the watcher errors;
/// intended to be spawned on a dedicated thread.
pub fn watch_config_dir<F>(dir: &Path, mut on_change: F) -> Result<()>
where
    F: FnMut() + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(tx).map_err(|e| ConfigError::Watch(e.to_string()))?;
    watcher
        .watch(dir, RecursiveMode::Recursive)
        .map_err(|e| ConfigError::Watch(e.to_string()))?;
    info!(dir = %dir.display(), "watching config folder for changes");

    loop {
        let event = match rx.recv() {
            Ok(Ok(event)) => event,
            Ok(Err(e)) => {
                warn!(error = %e, "watch event error");
                continue;
            }
            Err(_) => return Err(ConfigError::Watch("watch channel closed".to_string())),
        };
        if !is_relevant(&event) {
            continue;
        }
        // Drain the burst before reloading.
        while rx.recv_timeout(DEBOUNCE).is_ok() {}
        debug!("config change settled, reloading");
        on_change();
    }
}

fn is_relevant(event: &Event) -> bool {
    let kind_matches = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    kind_matches
        && event.paths.iter().any(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| ext == "yaml" || ext == "yml")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind};

    fn event(kind: EventKind, path: &str) -> Event {
        let mut e = Event::new(kind);
        e.paths.push(path.into());
        e
    }

    #[test]
    fn yaml_changes_are_relevant() {
        assert!(is_relevant(&event(EventKind::Create(CreateKind::File), "/cfg/api.yaml")));
        assert!(is_relevant(&event(EventKind::Modify(ModifyKind::Any), "/cfg/api.yml")));
    }

    #[test]
    fn non_yaml_changes_are_ignored() {
        assert!(!is_relevant(&event(EventKind::Create(CreateKind::File), "/cfg/readme.md")));
        assert!(!is_relevant(&event(EventKind::Access(notify::event::AccessKind::Any), "/cfg/api.yaml")));
    }
}
