// src/pipeline.rs

//! Survey module → households → clusters.

use anyhow::Result;
use tracing::{info, instrument};

use crate::clusters::{aggregate_clusters, ClusterAggregate};
use crate::config::ProjectDirs;
use crate::enaho::{extract_data, SurveyTable};
use crate::households::{process_households, IndexedHousehold};
use crate::store;
use crate::wealth::calculate_wealth_index;

#[derive(Debug, Clone)]
pub struct HouseholdTables {
    pub households: Vec<IndexedHousehold>,
    pub clusters: Vec<ClusterAggregate>,
}

/// Map, index and aggregate an already-read survey table.
pub fn index_households(enaho: &SurveyTable) -> Result<HouseholdTables> {
    let households = process_households(enaho)?;
    let households = calculate_wealth_index(households)?;
    let clusters = aggregate_clusters(&households)?;
    Ok(HouseholdTables {
        households,
        clusters,
    })
}

/// Run the households stage and persist both tables under `interim/`.
#[instrument(level = "info", skip(dirs))]
pub fn build_households(dirs: &ProjectDirs, year: i32, module_code: u32) -> Result<HouseholdTables> {
    // 1) pull the whitelisted columns out of the module archive
    let enaho = extract_data(&dirs.raw, year, module_code)?;
    info!(rows = enaho.num_rows(), "extracted survey rows");

    // 2) features, wealth index, clusters
    let tables = index_households(&enaho)?;

    // 3) persist
    store::write_rows(&dirs.households_path(), &tables.households)?;
    store::write_rows(&dirs.clusters_path(), &tables.clusters)?;
    Ok(tables)
}
