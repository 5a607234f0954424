pub mod graph;
pub mod simulate;
pub mod tax;

use flow_tax_core::repository::InMemoryRepository;
use flow_tax_core::simulation::GraphState;

use crate::input;

/// The repository snapshot named by `--snapshot`, or the bundled sample.
pub fn load_repository(snapshot: Option<&str>) -> Result<InMemoryRepository, Box<dyn std::error::Error>> {
    match snapshot {
        Some(path) => {
            let repo: InMemoryRepository = input::file::read_json_or_yaml(path)?;
            tracing::debug!(path, entities = repo.entities.len(), "snapshot read");
            Ok(repo)
        }
        None => Ok(InMemoryRepository::sample()?),
    }
}

/// Load graph state at `version`, or the snapshot's active version.
pub fn load_state(
    snapshot: Option<&str>,
    version: Option<&str>,
) -> Result<GraphState, Box<dyn std::error::Error>> {
    let repo = load_repository(snapshot)?;
    let state = match version {
        Some(v) => GraphState::load_version(&repo, v)?,
        None => GraphState::load(&repo)?,
    };
    Ok(state)
}
