pub mod analyze_cmd;
pub mod default;
pub mod learning_cmd;
pub mod serve_cmd;
pub mod whitelist_cmd;

use std::sync::Arc;

use fleetgate::catalog::Catalog;
use fleetgate::classify::Classifier;
use fleetgate::learning::LearningStore;
use fleetgate::Settings;

/// Build the catalog → classifier → learning chain shared by subcommands.
pub fn learning_store(settings: &Arc<Settings>) -> anyhow::Result<Arc<LearningStore>> {
    let catalog = Arc::new(Catalog::builtin()?);
    let classifier = Arc::new(Classifier::new(catalog));
    let stats_path = settings
        .log_dir
        .clone()
        .unwrap_or_else(|| std::path::PathBuf::from("logs"))
        .join("command_stats.json");
    Ok(Arc::new(LearningStore::new(stats_path, classifier)))
}
