//! Assembles one running [`Engine`] from a resolved [`EngineConfig`] and a
//! caller-supplied [`AnalysisWorkflow`] — the composition root every other
//! module in this crate is built to be driven from, analogous to how the
//! teacher's node binary wires a `NetworkManager`/`ContextManager` pair
//! together from its own config before calling `.start()`.

use std::sync::Arc;

use actix::Actor;
use wayline_aggregator::AggregatorClassifier;
use wayline_config::EngineConfig;
use wayline_content::{ContentStore, RocksDbContentStore};
use wayline_reconciler::TreeReconciler;
use wayline_store::StructuredStore;
use wayline_workflow::{AnalysisWorkflow, Dispatcher};

use crate::actor::Engine;
use crate::client::EngineClient;
use crate::error::EngineFatal;

/// Opens the structured store and content store named in `config`, wires
/// the Reconciler and Dispatcher around them, and starts the engine actor
/// on the current arbiter.
pub async fn start<W: AnalysisWorkflow + 'static>(
    config: &EngineConfig,
    workflow: W,
) -> Result<EngineClient<W>, EngineFatal> {
    let store = StructuredStore::connect(&config.database_path)
        .await
        .map_err(|err| EngineFatal(err.to_string()))?;

    let content: Arc<dyn ContentStore> = Arc::new(
        RocksDbContentStore::open(config.content_store_path.as_std_path())
            .map_err(|err| EngineFatal(err.to_string()))?,
    );

    let classifier = AggregatorClassifier::new(config.aggregator_hosts.clone());
    let reconciler = TreeReconciler::new(store.clone(), classifier);
    let dispatcher = Dispatcher::new(workflow, content, store.clone());

    let engine = Engine::new(config, store, reconciler, dispatcher);
    let addr = engine.start();
    Ok(EngineClient::new(addr))
}
